//! nRF24L01-style radio
//!
//! ShockBurst PRX with auto-ack on a single receive pipe (P0). The SPI
//! slave interface decodes the standard command set against a 32-byte
//! register file and 3-deep RX/TX FIFOs; over-the-air rate is simulated by
//! granting a receive opportunity at fixed simulated-time intervals while
//! CE is high. Packets come and go through the per-address network hub.

use crate::cpu::Exception;
use crate::network::{NetworkHub, PAYLOAD_MAX};
use crate::tracer::Tracer;
use crate::vtime::TickDeadline;

/// Receive opportunity period: roughly one 32-byte packet time plus ACK
const RX_INTERVAL_US: u64 = 440;

// SPI commands
const CMD_R_REGISTER: u8 = 0x00;
const CMD_W_REGISTER: u8 = 0x20;
const CMD_R_RX_PL_WID: u8 = 0x60;
const CMD_R_RX_PAYLOAD: u8 = 0x61;
const CMD_W_TX_PAYLOAD: u8 = 0xA0;
const CMD_W_ACK_PAYLOAD: u8 = 0xA8;
const CMD_W_TX_PAYLOAD_NO_ACK: u8 = 0xB0;
const CMD_FLUSH_TX: u8 = 0xE1;
const CMD_FLUSH_RX: u8 = 0xE2;

// Registers
const REG_CONFIG: u8 = 0x00;
const REG_EN_AA: u8 = 0x01;
const REG_EN_RXADDR: u8 = 0x02;
const REG_SETUP_AW: u8 = 0x03;
const REG_SETUP_RETR: u8 = 0x04;
const REG_RF_CH: u8 = 0x05;
const REG_RF_SETUP: u8 = 0x06;
const REG_STATUS: u8 = 0x07;
const REG_RX_ADDR_P0: u8 = 0x0A;
const REG_RX_ADDR_P1: u8 = 0x0B;
const REG_RX_ADDR_P2: u8 = 0x0C;
const REG_RX_ADDR_P3: u8 = 0x0D;
const REG_RX_ADDR_P4: u8 = 0x0E;
const REG_RX_ADDR_P5: u8 = 0x0F;
const REG_TX_ADDR: u8 = 0x10;
const REG_RX_PW_P0: u8 = 0x11;
const REG_FIFO_STATUS: u8 = 0x17;

// STATUS bits
pub const STATUS_TX_FULL: u8 = 0x01;
pub const STATUS_RX_P_MASK: u8 = 0x0E;
pub const STATUS_MAX_RT: u8 = 0x10;
pub const STATUS_TX_DS: u8 = 0x20;
pub const STATUS_RX_DR: u8 = 0x40;

// FIFO_STATUS bits
const FIFO_RX_EMPTY: u8 = 0x01;
const FIFO_RX_FULL: u8 = 0x02;
const FIFO_TX_EMPTY: u8 = 0x10;
const FIFO_TX_FULL: u8 = 0x20;

const FIFO_SIZE: u8 = 3;

#[derive(Debug, Clone, Copy)]
struct RadioPacket {
    len: u8,
    payload: [u8; PAYLOAD_MAX],
}

impl RadioPacket {
    const fn empty() -> Self {
        Self {
            len: 0,
            payload: [0; PAYLOAD_MAX],
        }
    }
}

pub struct Radio {
    regs: [u8; 0x20],
    // High bytes of the three multi-byte address registers
    addr_tx_high: [u8; 4],
    addr_rx0_high: [u8; 4],
    addr_rx1_high: [u8; 4],

    rx_fifo: [RadioPacket; FIFO_SIZE as usize],
    tx_fifo: [RadioPacket; FIFO_SIZE as usize],
    rx_fifo_count: u8,
    tx_fifo_count: u8,
    rx_fifo_head: u8,
    rx_fifo_tail: u8,
    tx_fifo_head: u8,
    tx_fifo_tail: u8,

    /// Chip select level (low = selected)
    csn: bool,
    /// Chip enable level
    ce: bool,
    spi_cmd: u8,
    spi_index: i32,

    irq_state: u8,
    irq_edge: bool,
    rx_deadline: u64,

    // Statistics for the front-end
    byte_count: u32,
    packet_count: u32,
}

impl Radio {
    pub fn new() -> Self {
        let mut radio = Self {
            regs: [0; 0x20],
            addr_tx_high: [0xE7; 4],
            addr_rx0_high: [0xE7; 4],
            addr_rx1_high: [0xC2; 4],
            rx_fifo: [RadioPacket::empty(); FIFO_SIZE as usize],
            tx_fifo: [RadioPacket::empty(); FIFO_SIZE as usize],
            rx_fifo_count: 0,
            tx_fifo_count: 0,
            rx_fifo_head: 0,
            rx_fifo_tail: 0,
            tx_fifo_head: 0,
            tx_fifo_tail: 0,
            csn: true,
            ce: false,
            spi_cmd: 0,
            spi_index: -1,
            irq_state: 0,
            irq_edge: false,
            rx_deadline: 0,
            byte_count: 0,
            packet_count: 0,
        };

        radio.regs[REG_CONFIG as usize] = 0x08;
        radio.regs[REG_EN_AA as usize] = 0x3F;
        radio.regs[REG_EN_RXADDR as usize] = 0x03;
        radio.regs[REG_SETUP_AW as usize] = 0x03;
        radio.regs[REG_SETUP_RETR as usize] = 0x03;
        radio.regs[REG_RF_CH as usize] = 0x02;
        radio.regs[REG_RF_SETUP as usize] = 0x0E;
        radio.regs[REG_STATUS as usize] = 0x0E;
        radio.regs[REG_RX_ADDR_P0 as usize] = 0xE7;
        radio.regs[REG_RX_ADDR_P1 as usize] = 0xC2;
        radio.regs[REG_RX_ADDR_P2 as usize] = 0xC3;
        radio.regs[REG_RX_ADDR_P3 as usize] = 0xC4;
        radio.regs[REG_RX_ADDR_P4 as usize] = 0xC5;
        radio.regs[REG_RX_ADDR_P5 as usize] = 0xC6;
        radio.regs[REG_TX_ADDR as usize] = 0xE7;
        radio.regs[REG_FIFO_STATUS as usize] = 0x11;

        radio
    }

    pub fn regs(&self) -> &[u8; 0x20] {
        &self.regs
    }

    pub fn status(&self) -> u8 {
        self.regs[REG_STATUS as usize]
    }

    /// Packets received since the last call
    pub fn take_packet_count(&mut self) -> u32 {
        std::mem::take(&mut self.packet_count)
    }

    /// Payload bytes moved since the last call
    pub fn take_byte_count(&mut self) -> u32 {
        std::mem::take(&mut self.byte_count)
    }

    /// The 64-bit hub address this radio currently listens on
    pub fn rx_address(&mut self) -> u64 {
        self.pack_addr(REG_RX_ADDR_P0)
    }

    /// Drive the CSN/CE control lines
    pub fn set_control(&mut self, csn: bool, ce: bool) -> Option<Exception> {
        let mut fault = None;

        if csn && !self.csn {
            // CSN deasserted: finalize the SPI command
            fault = self.spi_cmd_end(self.spi_cmd);
        }
        if !csn && self.csn {
            // CSN asserted: a new command begins with the next byte
            self.spi_index = -1;
        }

        self.csn = csn;
        self.ce = ce;
        fault
    }

    /// Transfer one SPI byte; returns the MISO byte
    pub fn spi_byte(&mut self, mosi: u8, tracer: &mut Tracer) -> u8 {
        if self.csn {
            // Not selected
            return 0xFF;
        }

        if self.spi_index < 0 {
            self.spi_cmd = mosi;
            self.spi_cmd_begin(mosi);
            self.spi_index = 0;
            if tracer.enabled() {
                tracer.log("RADIO", &format!("cmd {:02x}", mosi));
            }
            return self.regs[REG_STATUS as usize];
        }

        let index = self.spi_index as usize;
        self.spi_index += 1;
        self.spi_cmd_data(self.spi_cmd, index, mosi)
    }

    /// Periodic work: receive opportunities and the IRQ edge detector
    ///
    /// Returns true when the IRQ output just asserted.
    pub fn tick(
        &mut self,
        deadline: &mut TickDeadline,
        hub: &mut NetworkHub,
        tracer: &mut Tracer,
    ) -> (bool, Option<Exception>) {
        let mut fault = None;

        // Over-the-air pacing: one receive opportunity per interval while
        // the receiver is enabled
        if self.ce {
            if deadline.has_passed(self.rx_deadline) {
                self.rx_deadline = deadline.set_relative(deadline.usec(RX_INTERVAL_US));
                fault = self.rx_opportunity(hub, tracer);
            } else {
                deadline.set(self.rx_deadline);
            }
        }

        let edge = self.irq_edge;
        self.irq_edge = false;
        (edge, fault)
    }

    fn update_irq(&mut self) {
        let irq_prev = self.irq_state;
        let mask =
            (STATUS_RX_DR | STATUS_TX_DS | STATUS_MAX_RT) & !self.regs[REG_CONFIG as usize];

        self.irq_state = self.regs[REG_STATUS as usize] & mask;
        self.irq_edge |= self.irq_state != 0 && irq_prev == 0;
    }

    fn update_status(&mut self) {
        self.regs[REG_FIFO_STATUS as usize] = (if self.rx_fifo_count == 0 { FIFO_RX_EMPTY } else { 0 })
            | (if self.rx_fifo_count == FIFO_SIZE { FIFO_RX_FULL } else { 0 })
            | (if self.tx_fifo_count == 0 { FIFO_TX_EMPTY } else { 0 })
            | (if self.tx_fifo_count == FIFO_SIZE { FIFO_TX_FULL } else { 0 });

        let status = &mut self.regs[REG_STATUS as usize];
        *status &= STATUS_RX_DR | STATUS_TX_DS | STATUS_MAX_RT;
        if self.tx_fifo_count == FIFO_SIZE {
            *status |= STATUS_TX_FULL;
        }
        if self.rx_fifo_count == 0 {
            // "RX FIFO empty" pipe number
            *status |= STATUS_RX_P_MASK;
        }

        self.regs[REG_RX_PW_P0 as usize] = self.rx_fifo[self.rx_fifo_tail as usize].len;

        self.update_irq();
    }

    fn rx_opportunity(&mut self, hub: &mut NetworkHub, tracer: &mut Tracer) -> Option<Exception> {
        let rx_addr = self.pack_addr(REG_RX_ADDR_P0);
        let message = hub.rx(rx_addr)?;
        let mut fault = None;

        if self.rx_fifo_count < FIFO_SIZE {
            let head = &mut self.rx_fifo[self.rx_fifo_head as usize];
            head.len = message.len;
            head.payload = message.payload;

            self.rx_fifo_head = (self.rx_fifo_head + 1) % FIFO_SIZE;
            self.rx_fifo_count += 1;
            self.regs[REG_STATUS as usize] |= STATUS_RX_DR;

            self.packet_count += 1;
            self.byte_count += message.len as u32;

            if tracer.enabled() {
                tracer.log("RADIO", &format!("rx {} bytes", message.len));
            }

            if self.tx_fifo_count > 0 {
                // ACK with payload
                let tail = self.tx_fifo[self.tx_fifo_tail as usize];
                self.byte_count += tail.len as u32;
                hub.tx(message.src, rx_addr, &tail.payload[..tail.len as usize]);
                self.tx_fifo_tail = (self.tx_fifo_tail + 1) % FIFO_SIZE;
                self.tx_fifo_count -= 1;
                self.regs[REG_STATUS as usize] |= STATUS_TX_DS;
            } else {
                // Empty ACK
                hub.tx(message.src, rx_addr, &[]);
            }
        } else {
            fault = Some(Exception::RadioXrun);
        }

        self.update_status();
        fault
    }

    fn spi_cmd_begin(&mut self, cmd: u8) {
        // Commands whose side effect lands before any data bytes
        match cmd {
            CMD_FLUSH_TX => {
                self.tx_fifo_head = 0;
                self.tx_fifo_tail = 0;
                self.tx_fifo_count = 0;
                self.update_status();
            }
            CMD_FLUSH_RX => {
                self.rx_fifo_head = 0;
                self.rx_fifo_tail = 0;
                self.rx_fifo_count = 0;
                self.update_status();
            }
            _ => {}
        }
    }

    fn spi_cmd_data(&mut self, cmd: u8, index: usize, mosi: u8) -> u8 {
        match cmd {
            CMD_R_RX_PAYLOAD => {
                self.rx_fifo[self.rx_fifo_tail as usize].payload[index % PAYLOAD_MAX]
            }

            CMD_W_TX_PAYLOAD | CMD_W_TX_PAYLOAD_NO_ACK | CMD_W_ACK_PAYLOAD => {
                self.tx_fifo[self.tx_fifo_head as usize].payload[index % PAYLOAD_MAX] = mosi;
                0xFF
            }

            // STATUS has write-1-to-clear bits
            cmd if cmd == CMD_W_REGISTER | REG_STATUS => {
                let mask = mosi & (STATUS_RX_DR | STATUS_TX_DS | STATUS_MAX_RT);
                self.regs[REG_STATUS as usize] &= !mask;
                self.update_irq();
                0xFF
            }

            CMD_R_RX_PL_WID => self.rx_fifo[self.rx_fifo_tail as usize].len,

            cmd if cmd < CMD_R_REGISTER + 0x20 => *self.reg_ref(cmd, index),

            cmd if cmd < CMD_W_REGISTER + 0x20 => {
                *self.reg_ref(cmd, index) = mosi;
                self.update_irq();
                0xFF
            }

            _ => 0xFF,
        }
    }

    /// Finalize a command at CSN deassert
    fn spi_cmd_end(&mut self, cmd: u8) -> Option<Exception> {
        match cmd {
            CMD_W_TX_PAYLOAD | CMD_W_TX_PAYLOAD_NO_ACK | CMD_W_ACK_PAYLOAD => {
                self.tx_fifo[self.tx_fifo_head as usize].len = self.spi_index.max(0) as u8;
                if self.tx_fifo_count < FIFO_SIZE {
                    self.tx_fifo_count += 1;
                    self.tx_fifo_head = (self.tx_fifo_head + 1) % FIFO_SIZE;
                    self.update_status();
                    None
                } else {
                    Some(Exception::RadioXrun)
                }
            }

            CMD_R_RX_PAYLOAD => {
                if self.rx_fifo_count > 0 {
                    self.rx_fifo_count -= 1;
                    self.rx_fifo_tail = (self.rx_fifo_tail + 1) % FIFO_SIZE;
                    self.update_status();
                    None
                } else {
                    Some(Exception::RadioXrun)
                }
            }

            _ => None,
        }
    }

    /// Resolve `(register, byte index)` to a register cell, covering the
    /// multi-byte address registers whose high bytes live off to the side
    fn reg_ref(&mut self, reg: u8, byte_index: usize) -> &mut u8 {
        let reg = reg & 0x1F;
        let byte_index = byte_index.min(4);

        if byte_index > 0 {
            match reg {
                REG_TX_ADDR => return &mut self.addr_tx_high[byte_index - 1],
                REG_RX_ADDR_P0 => return &mut self.addr_rx0_high[byte_index - 1],
                REG_RX_ADDR_P1 => return &mut self.addr_rx1_high[byte_index - 1],
                _ => {}
            }
        }

        &mut self.regs[reg as usize]
    }

    /// Encode a 5-byte packet address plus channel as the 64-bit hub key
    fn pack_addr(&mut self, reg: u8) -> u64 {
        let mut addr: u64 = 0;
        for i in (0..5).rev() {
            addr = (addr << 8) | *self.reg_ref(reg, i) as u64;
        }
        addr | ((self.regs[REG_RF_CH as usize] as u64) << 56)
    }
}

impl Default for Radio {
    fn default() -> Self {
        Self::new()
    }
}
