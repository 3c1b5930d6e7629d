//! Memory, SFR routing and the peripheral bus
//!
//! The bus owns every byte the CPU can address: IDATA, XDATA, code memory
//! and the SFR block, plus all of the peripherals and the pin-level decode
//! state of the shared parallel port bus. SFR reads and writes funnel
//! through [`Bus::sfr_read`]/[`Bus::sfr_write`], which apply the side
//! effects the hardware wires to those registers: port writes run the
//! flash/LCD pin path, SPI data moves FIFO bytes, RFCON drives the radio
//! control lines, and so on.
//!
//! Side effects that must reach the CPU (exceptions, interrupt requests,
//! power-down, the cycle-paced peripheral deadlines) are queued on the bus
//! and drained at instruction boundaries, so the CPU core itself stays
//! unaware of any particular peripheral.

use crate::cpu::sfr::{self, idx};
use crate::cpu::{Cpu, Exception, CODE_SIZE, XDATA_SIZE};
use crate::network::NetworkHub;
use crate::peripherals::flash::FlashPins;
use crate::peripherals::lcd::LcdPins;
use crate::peripherals::{Adc, Flash, FlashStorage, I2cBus, Lcd, Mdu, Neighbors, Rng, SpiBus};
use crate::tracer::Tracer;
use crate::vtime::{TickDeadline, VirtualTime};

// Port roles on the shared bus
pub const ADDR_PORT: u8 = sfr::REG_P0;
pub const MISC_PORT: u8 = sfr::REG_P1;
pub const BUS_PORT: u8 = sfr::REG_P2;
pub const CTRL_PORT: u8 = sfr::REG_P3;

// Control port bits
pub const CTRL_LCD_DCX: u8 = 1 << 0;
pub const CTRL_FLASH_LAT1: u8 = 1 << 1;
pub const CTRL_FLASH_LAT2: u8 = 1 << 2;
pub const CTRL_3V3_EN: u8 = 1 << 3;
pub const CTRL_LCD_BACKLIGHT: u8 = 1 << 4;
pub const CTRL_FLASH_WE: u8 = 1 << 5;
pub const CTRL_FLASH_OE: u8 = 1 << 6;

/// LCD write strobe lives on the address port's low bit; the seven upper
/// bits carry flash A0..A6
const ADDR_LCD_WRX: u8 = 1 << 0;

/// Watchdog seed registers: WDSV is written and read low byte then high
/// byte, alternating. Loading the high byte arms the watchdog.
#[derive(Debug, Clone, Default)]
pub struct Watchdog {
    pub enabled: bool,
    /// 24-bit countdown at the 32 kHz tick
    pub counter: u32,
    seed_low: u8,
    seed_high: u8,
    write_high: bool,
    read_high: bool,
}

impl Watchdog {
    pub fn write(&mut self, value: u8) {
        if self.write_high {
            self.seed_high = value;
            // The 256x prescale folds into the counter's low byte
            self.counter =
                ((self.seed_high as u32) << 16) | ((self.seed_low as u32) << 8) | 0xFF;
            self.enabled = true;
        } else {
            self.seed_low = value;
        }
        self.write_high = !self.write_high;
    }

    pub fn read(&mut self) -> u8 {
        let value = if self.read_high {
            self.seed_high
        } else {
            self.seed_low
        };
        self.read_high = !self.read_high;
        value
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Everything on the far side of the CPU core
pub struct Bus {
    pub sfr: [u8; 128],
    pub data: [u8; 256],
    pub xdata: [u8; XDATA_SIZE],
    pub code: Vec<u8>,

    /// Copy of the shared clock, refreshed every cycle
    pub clock: u64,
    /// Running translated basic blocks (relaxes MDU read checks)
    pub sbt: bool,

    pub flash: Flash,
    pub lcd: Lcd,
    pub spi: SpiBus,
    pub i2c: I2cBus,
    pub adc: Adc,
    pub mdu: Mdu,
    pub rng: Rng,
    pub neighbors: Neighbors,
    pub wdt: Watchdog,
    pub tracer: Tracer,

    // Parallel bus decode state
    lat1: u8,
    lat2: u8,
    prev_ctrl: u8,
    flash_drv: bool,
    rfcken: bool,

    // Deadline gate for the slow path
    hw_deadline: u64,

    // Queued side effects, drained at instruction boundaries
    pub need_timer_edge_check: bool,
    pub need_hardware_tick: bool,
    pending_exceptions: Vec<Exception>,
    irq_request: bool,
    power_down_request: bool,
}

impl Bus {
    pub fn new(cube_id: usize, storage: FlashStorage) -> Self {
        Self {
            sfr: [0; 128],
            data: [0; 256],
            xdata: [0; XDATA_SIZE],
            code: vec![0; CODE_SIZE],
            clock: 0,
            sbt: false,
            flash: Flash::new(storage),
            lcd: Lcd::new(),
            spi: SpiBus::new(),
            i2c: I2cBus::new(),
            adc: Adc::new(),
            mdu: Mdu::new(),
            rng: Rng::new(),
            neighbors: Neighbors::new(),
            wdt: Watchdog::default(),
            tracer: Tracer::new(cube_id),
            lat1: 0,
            lat2: 0,
            prev_ctrl: 0xFF,
            flash_drv: false,
            rfcken: false,
            hw_deadline: 0,
            need_timer_edge_check: false,
            need_hardware_tick: false,
            pending_exceptions: Vec::new(),
            irq_request: false,
            power_down_request: false,
        }
    }

    /// Reset the decode latches (chip reset)
    pub fn reset_decode_state(&mut self) {
        self.lat1 = 0;
        self.lat2 = 0;
        self.prev_ctrl = 0xFF;
        self.flash_drv = false;
        self.rfcken = false;
        self.hw_deadline = 0;
        self.need_timer_edge_check = false;
        self.need_hardware_tick = true;
        self.wdt.reset();
    }

    // ========== Side-effect queues ==========

    fn pend(&mut self, fault: Option<Exception>) {
        if let Some(kind) = fault {
            self.pending_exceptions.push(kind);
        }
    }

    pub fn has_pending_events(&self) -> bool {
        !self.pending_exceptions.is_empty() || self.irq_request || self.power_down_request
    }

    pub fn take_exceptions(&mut self) -> Vec<Exception> {
        std::mem::take(&mut self.pending_exceptions)
    }

    pub fn take_irq_request(&mut self) -> bool {
        std::mem::take(&mut self.irq_request)
    }

    pub fn take_power_down_request(&mut self) -> bool {
        std::mem::take(&mut self.power_down_request)
    }

    // ========== SFR access ==========

    /// Read a special function register, applying side effects
    pub fn sfr_read(&mut self, reg: u8) -> u8 {
        match reg {
            sfr::REG_SPIRDAT => {
                let (value, fault) = self.spi.read_data();
                self.pend(fault);
                self.need_hardware_tick = true;
                value
            }

            sfr::REG_RNGCTL => self.rng.control_read(self.sfr[idx(reg)]),
            sfr::REG_RNGDAT => {
                let ctl = self.sfr[idx(sfr::REG_RNGCTL)];
                let (value, fault) = self.rng.data_read(ctl);
                self.pend(fault);
                value
            }

            sfr::REG_W2DAT => {
                let con0 = self.sfr[idx(sfr::REG_W2CON0)];
                let (value, fault) = self.i2c.data_read(con0);
                self.pend(fault);
                if self.i2c.needs_tick() {
                    self.need_hardware_tick = true;
                }
                value
            }
            sfr::REG_W2CON1 => {
                // Status bits clear on read; configuration bits stay
                let value = self.sfr[idx(reg)];
                self.sfr[idx(reg)] =
                    value & !(crate::peripherals::i2c::W2CON1_READY | crate::peripherals::i2c::W2CON1_NACK);
                value
            }

            sfr::REG_WDSV => self.wdt.read(),

            sfr::REG_MD0..=sfr::REG_MD5 => {
                let fault = self.mdu.read_check(self.clock, self.sbt);
                self.pend(fault);
                self.sfr[idx(reg)]
            }

            sfr::REG_PSW => {
                // Parity of the accumulator is synthesized on demand
                let parity = (self.sfr[idx(sfr::REG_ACC)].count_ones() & 1) as u8;
                let psw = (self.sfr[idx(reg)] & !sfr::PSW_P) | parity;
                self.sfr[idx(reg)] = psw;
                psw
            }

            _ => self.sfr[idx(reg)],
        }
    }

    /// Inspect a register without side effects (debugger/trace use)
    pub fn sfr_peek(&self, reg: u8) -> u8 {
        self.sfr[idx(reg)]
    }

    /// Write a special function register, applying side effects
    pub fn sfr_write(&mut self, reg: u8, value: u8) {
        match reg {
            // Ports wired to the flash/LCD parallel bus
            sfr::REG_P0 | sfr::REG_P2 | sfr::REG_P3 | sfr::REG_P0DIR | sfr::REG_P2DIR
            | sfr::REG_P3DIR => {
                self.sfr[idx(reg)] = value;
                self.graphics_cycle();
            }

            // The MISC port carries neighbor pins and timer inputs
            sfr::REG_P1 | sfr::REG_P1DIR => {
                self.sfr[idx(reg)] = value;
                self.need_timer_edge_check = true;
            }

            sfr::REG_SPIRDAT => {
                let fault = self.spi.write_data(value);
                self.pend(fault);
                self.need_hardware_tick = true;
            }
            sfr::REG_SPIRCON0 | sfr::REG_SPIRCON1 => {
                self.sfr[idx(reg)] = value;
                self.need_hardware_tick = true;
            }

            sfr::REG_RFCON => {
                self.sfr[idx(reg)] = value;
                self.rfcken = value & sfr::RFCON_RFCKEN != 0;
                let csn = value & sfr::RFCON_RFCSN != 0;
                let ce = value & sfr::RFCON_RFCE != 0;
                let fault = self.spi.radio.set_control(csn, ce);
                self.pend(fault);
                self.need_hardware_tick = true;
            }

            sfr::REG_MD0..=sfr::REG_ARCON => {
                self.sfr[idx(reg)] = value;
                let fault =
                    self.mdu
                        .write(self.clock, &mut self.sfr, reg - sfr::REG_MD0, &mut self.tracer);
                self.pend(fault);
            }

            sfr::REG_ADCCON1 => {
                self.sfr[idx(reg)] = value;
                self.adc.start();
                self.need_hardware_tick = true;
            }

            sfr::REG_W2CON0 => {
                self.sfr[idx(reg)] = value;
                self.i2c.control_write(value);
            }
            sfr::REG_W2DAT => {
                let con0 = self.sfr[idx(sfr::REG_W2CON0)];
                let fault = self.i2c.data_write(value, con0);
                self.pend(fault);
                self.need_hardware_tick = true;
            }

            sfr::REG_WDSV => self.wdt.write(value),

            sfr::REG_PWRDWN => {
                self.sfr[idx(reg)] = value;
                if value & sfr::PWRDWN_MODE_MASK != 0 {
                    self.power_down_request = true;
                }
            }

            // Arming an interrupt may unmask something already pending
            sfr::REG_IEN0 | sfr::REG_IEN1 | sfr::REG_IRCON | sfr::REG_TCON => {
                self.sfr[idx(reg)] = value;
                self.irq_request = true;
                self.need_timer_edge_check = true;
            }
            sfr::REG_TMOD | sfr::REG_T2CON => {
                self.sfr[idx(reg)] = value;
                self.need_timer_edge_check = true;
            }

            _ => self.sfr[idx(reg)] = value,
        }
    }

    // ========== Parallel bus ==========

    /// Pin-level path run on every port write: rebuild the flash and LCD
    /// pin state and let both react
    fn graphics_cycle(&mut self) {
        let ctrl = self.sfr[idx(CTRL_PORT)];
        let addr_port = self.sfr[idx(ADDR_PORT)];
        let bus_value = self.sfr[idx(BUS_PORT)];

        // Address latches capture A7..A20 on LAT rising edges
        let rising = ctrl & !self.prev_ctrl;
        if rising & CTRL_FLASH_LAT1 != 0 {
            self.lat1 = addr_port >> 1;
        }
        if rising & CTRL_FLASH_LAT2 != 0 {
            self.lat2 = addr_port >> 1;
        }
        self.prev_ctrl = ctrl;

        let power = ctrl & CTRL_3V3_EN != 0;

        let mut flash_pins = FlashPins {
            addr: ((self.lat2 as u32) << 14) | ((self.lat1 as u32) << 7) | (addr_port >> 1) as u32,
            power,
            oe_n: ctrl & CTRL_FLASH_OE != 0,
            ce_n: false,
            we_n: ctrl & CTRL_FLASH_WE != 0,
            data_in: bus_value,
            data_drv: false,
        };
        let fault = self.flash.cycle(&mut flash_pins, &mut self.tracer);
        self.pend(fault);
        self.flash_drv = flash_pins.data_drv;
        if self.flash.needs_tick() {
            self.need_hardware_tick = true;
        }

        let lcd_pins = LcdPins {
            power,
            csx_n: false,
            dcx: ctrl & CTRL_LCD_DCX != 0,
            wrx: addr_port & ADDR_LCD_WRX != 0,
            rdx: false,
            data_in: bus_value,
        };
        self.lcd.cycle(&lcd_pins, &mut self.tracer);

        if self.flash_drv {
            // The flash owns the bus; the port reads back its data.
            // Firmware driving the port at the same time is a wiring fault.
            self.sfr[idx(BUS_PORT)] = self.flash.data_out();
            if self.sfr[idx(sfr::REG_P2DIR)] != 0xFF {
                self.pend(Some(Exception::BusContention));
            }
        }
    }

    /// True while the backlight/reset line is up
    pub fn backlight_on(&self) -> bool {
        self.sfr[idx(CTRL_PORT)] & CTRL_LCD_BACKLIGHT != 0
    }

    /// Refresh the data port while the flash drives it (fast path,
    /// called every cycle)
    pub fn refresh_flash_bus(&mut self) {
        if self.flash_drv {
            self.sfr[idx(BUS_PORT)] = self.flash.data_out();
        }
    }

    // ========== Deadline-driven slow path ==========

    /// The slow path must run this cycle
    pub fn slow_path_due(&self, clocks: u64) -> bool {
        self.need_hardware_tick || clocks >= self.hw_deadline
    }

    /// Pump every deadline-driven peripheral and collect the next wake-up
    pub fn hardware_tick(&mut self, cpu: &mut Cpu, vtime: &VirtualTime, hub: &mut NetworkHub) {
        self.need_hardware_tick = false;
        let mut deadline = TickDeadline::new(vtime);
        let ircon_before = self.sfr[idx(sfr::REG_IRCON)];

        self.flash.tick(&mut deadline, &mut self.tracer);
        self.lcd.tick(&mut deadline);

        if self.rfcken {
            let (irq_edge, fault) = self.spi.radio.tick(&mut deadline, hub, &mut self.tracer);
            self.pend(fault);
            if irq_edge {
                self.sfr[idx(sfr::REG_IRCON)] |= sfr::IRCON_RF;
            }
        }

        let fault = self.spi.tick(&mut deadline, &mut self.sfr, &mut self.tracer);
        self.pend(fault);

        self.adc.tick(&mut deadline, &mut self.sfr);
        self.i2c.tick(&mut deadline, &mut self.sfr, &mut self.tracer);

        if self.sfr[idx(sfr::REG_IRCON)] != ircon_before {
            cpu.need_interrupt_dispatch = true;
        }

        self.hw_deadline = deadline.next();

        for kind in self.take_exceptions() {
            cpu.except(kind);
        }
    }
}
