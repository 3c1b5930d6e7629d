//! 2-wire (I2C) master and the accelerometer behind it
//!
//! The controller clocks one byte per byte period (~100 kHz bus, 9 bits
//! with the ACK). Firmware drives it through W2CON0 (enable/master/clock,
//! START, STOP), W2DAT (data in/out) and W2CON1 (READY, NACK; READY clears
//! on read). Each completed byte raises the shared serial interrupt.
//!
//! The only slave is the accelerometer: a register-pointer device whose
//! six output bytes (X/Y/Z low/high) are latched as a set when a read
//! burst starts, so a burst never sees a torn sample.

use crate::cpu::sfr::{self, idx};
use crate::cpu::Exception;
use crate::tracer::Tracer;
use crate::vtime::TickDeadline;

// W2CON0 bits
pub const W2CON0_ENABLE: u8 = 0x01;
pub const W2CON0_MASTER: u8 = 0x02;
pub const W2CON0_START: u8 = 0x10;
pub const W2CON0_STOP: u8 = 0x20;

// W2CON1 bits
pub const W2CON1_READY: u8 = 0x01;
pub const W2CON1_NACK: u8 = 0x02;

/// 7-bit device address 0x1D, shifted; +1 selects read
pub const ACCEL_ADDR_TX: u8 = 0x3A;
pub const ACCEL_ADDR_RX: u8 = 0x3B;

/// One byte period: 9 bit times at 100 kHz
const BYTE_TIME_US: u64 = 90;

/// Counts per g at the +/-2g full scale used by the firmware
const COUNTS_PER_G: f32 = 16384.0;

/// The modelled accelerometer
#[derive(Debug, Clone)]
pub struct Accelerometer {
    /// Live sample, updated by the front-end
    sample: [u8; 6],
    /// Sample latched at read-burst start
    latched: [u8; 6],
    pointer: u8,
    index: usize,
}

impl Accelerometer {
    pub fn new() -> Self {
        Self {
            sample: [0; 6],
            latched: [0; 6],
            pointer: 0,
            index: 0,
        }
    }

    /// Update the live sample from accelerations in g
    pub fn set_acceleration(&mut self, x_g: f32, y_g: f32, z_g: f32) {
        for (i, g) in [x_g, y_g, z_g].into_iter().enumerate() {
            let counts = (g * COUNTS_PER_G).clamp(-32768.0, 32767.0) as i16;
            let bytes = counts.to_le_bytes();
            self.sample[i * 2] = bytes[0];
            self.sample[i * 2 + 1] = bytes[1];
        }
    }

    /// Register-pointer write; the pointer indexes the 6-byte output block
    fn write_pointer(&mut self, pointer: u8) {
        self.pointer = pointer;
    }

    /// Latch the sample set for a new burst
    fn begin_read(&mut self) {
        self.latched = self.sample;
        self.index = (self.pointer as usize) % 6;
    }

    fn next_byte(&mut self) -> u8 {
        let byte = self.latched[self.index];
        self.index = (self.index + 1) % 6;
        byte
    }
}

impl Default for Accelerometer {
    fn default() -> Self {
        Self::new()
    }
}

/// Transfer phases of the master state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    /// Clocking out an address byte (START preceded it)
    Address,
    /// Clocking out a register-pointer byte
    RegisterWrite,
    /// Clocking in one slave data byte
    ReadData,
}

pub struct I2cBus {
    pub accel: Accelerometer,

    phase: Phase,
    /// Byte currently on the wire (master -> slave phases)
    wire_byte: u8,
    /// Completion deadline, 0 = nothing in flight
    timer: u64,
    /// A START condition precedes the next byte
    start_pending: bool,
    /// Addressed for reading; data bytes flow until STOP
    reading: bool,
    /// Received byte waiting in W2DAT
    rx_byte: u8,
}

impl I2cBus {
    pub fn new() -> Self {
        Self {
            accel: Accelerometer::new(),
            phase: Phase::Idle,
            wire_byte: 0,
            timer: 0,
            start_pending: false,
            reading: false,
            rx_byte: 0,
        }
    }

    /// W2CON0 write side effects
    pub fn control_write(&mut self, value: u8) {
        if value & W2CON0_ENABLE == 0 {
            // Controller reset
            self.phase = Phase::Idle;
            self.timer = 0;
            self.start_pending = false;
            self.reading = false;
            return;
        }
        if value & W2CON0_START != 0 {
            // Fresh or repeated START before the next address byte
            self.start_pending = true;
        }
        if value & W2CON0_STOP != 0 {
            self.phase = Phase::Idle;
            self.reading = false;
        }
    }

    /// W2DAT write: transmit an address or data byte
    pub fn data_write(&mut self, value: u8, con0: u8) -> Option<Exception> {
        if con0 & (W2CON0_ENABLE | W2CON0_MASTER) != (W2CON0_ENABLE | W2CON0_MASTER) {
            return Some(Exception::I2cError);
        }
        if self.phase != Phase::Idle && self.timer != 0 {
            // Byte still on the wire
            return Some(Exception::I2cError);
        }

        self.wire_byte = value;
        self.phase = if self.start_pending || self.phase == Phase::Idle {
            Phase::Address
        } else {
            Phase::RegisterWrite
        };
        self.timer = 0; // armed on the next tick
        None
    }

    /// W2DAT read: take the received byte, keep the burst moving
    pub fn data_read(&mut self, con0: u8) -> (u8, Option<Exception>) {
        let byte = self.rx_byte;
        if con0 & W2CON0_ENABLE == 0 {
            return (byte, Some(Exception::I2cError));
        }
        if self.reading && self.phase == Phase::Idle {
            // Clock the next data byte
            self.phase = Phase::ReadData;
            self.timer = 0;
        }
        (byte, None)
    }

    /// A byte is queued but its timer is not armed yet
    pub fn needs_tick(&self) -> bool {
        self.phase != Phase::Idle && self.timer == 0
    }

    /// Advance the wire
    pub fn tick(
        &mut self,
        deadline: &mut TickDeadline,
        sfr: &mut [u8; 128],
        tracer: &mut Tracer,
    ) {
        if self.phase == Phase::Idle {
            return;
        }

        if self.timer == 0 {
            self.timer = deadline.set_relative(deadline.usec(BYTE_TIME_US));
            return;
        }
        if !deadline.has_passed(self.timer) {
            deadline.set(self.timer);
            return;
        }
        self.timer = 0;

        match self.phase {
            Phase::Address => {
                self.start_pending = false;
                match self.wire_byte {
                    ACCEL_ADDR_TX => {
                        self.reading = false;
                        self.phase = Phase::Idle;
                    }
                    ACCEL_ADDR_RX => {
                        self.reading = true;
                        self.accel.begin_read();
                        // First data byte starts clocking immediately
                        self.phase = Phase::ReadData;
                    }
                    _ => {
                        // No such device
                        sfr[idx(sfr::REG_W2CON1)] |= W2CON1_NACK;
                        self.reading = false;
                        self.phase = Phase::Idle;
                    }
                }
                if tracer.enabled() {
                    tracer.log("I2C", &format!("address {:02x}", self.wire_byte));
                }
            }

            Phase::RegisterWrite => {
                self.accel.write_pointer(self.wire_byte);
                self.phase = Phase::Idle;
            }

            Phase::ReadData => {
                self.rx_byte = self.accel.next_byte();
                self.phase = Phase::Idle;
                if tracer.enabled() {
                    tracer.log("I2C", &format!("read {:02x}", self.rx_byte));
                }
            }

            Phase::Idle => {}
        }

        // Byte complete: READY plus the shared serial interrupt
        sfr[idx(sfr::REG_W2CON1)] |= W2CON1_READY;
        sfr[idx(sfr::REG_IRCON)] |= sfr::IRCON_SPI;
    }
}

impl Default for I2cBus {
    fn default() -> Self {
        Self::new()
    }
}
