//! 8051 CPU core
//!
//! Emulates the nRF24LE1 flavour of the 8051: standard instruction set plus
//! the vendor SFR blocks handled by the bus, a 12-cycle machine prescaler,
//! the synthesized 32 kHz low-frequency clock, watchdog, RTC2 and the
//! extended IEN1/IRCON interrupt sources.
//!
//! # Module Organization
//!
//! - `sfr`: register addresses and bit masks
//! - `opcodes`: instruction decode/execute with per-opcode cycle counts
//! - `irq`: interrupt dispatch and RETI verification
//! - `timers`: timers 0/1/2, CLKLF synthesis, watchdog, RTC2
//! - `disasm`: one-instruction disassembler
//!
//! The CPU owns no memory; all of IDATA, XDATA, code and the SFR block live
//! on the [`Bus`], which also applies SFR side effects. One call to
//! [`Cpu::tick`] advances exactly one clock cycle.

pub mod disasm;
pub mod sfr;

mod irq;
mod opcodes;
mod timers;

#[cfg(test)]
mod tests;

use crate::bus::Bus;
use crate::profiler::Profiler;

/// Code memory size (64 KiB address space)
pub const CODE_SIZE: usize = 0x10000;

/// External data memory size
pub const XDATA_SIZE: usize = 0x400;

/// Hardware exception kinds
///
/// Delivered to the host through [`Cpu::except`]; none of them halt
/// execution. Unit tests treat any delivery as a failure signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Exception {
    Breakpoint = 0,
    StackOverflow,
    AccToA,
    PswNotPreserved,
    SpNotPreserved,
    AccNotPreserved,
    DptrNotPreserved,
    RegsNotPreserved,
    IllegalOpcodeA5,
    BusContention,
    SpiXrun,
    RadioXrun,
    I2cError,
    XdataError,
    SbtError,
    MduError,
    RngError,
    NvmWriteError,
    ClklfError,
    BadFlashCommand,
    FlashBusy,
}

impl Exception {
    /// Human-readable description, for front-end display
    pub fn message(&self) -> &'static str {
        match self {
            Exception::Breakpoint => "Breakpoint reached",
            Exception::StackOverflow => "Stack overflow",
            Exception::AccToA => "Invalid operation: acc-to-a move",
            Exception::PswNotPreserved => "PSW not preserved over interrupt call",
            Exception::SpNotPreserved => "SP not preserved over interrupt call",
            Exception::AccNotPreserved => "ACC not preserved over interrupt call",
            Exception::DptrNotPreserved => "DPTR not preserved over interrupt call",
            Exception::RegsNotPreserved => "R0-R7 not preserved over interrupt call",
            Exception::IllegalOpcodeA5 => "Invalid opcode: 0xA5 encountered",
            Exception::BusContention => "Hardware bus contention occurred",
            Exception::SpiXrun => "SPI FIFO overrun/underrun",
            Exception::RadioXrun => "Radio FIFO overrun/underrun",
            Exception::I2cError => "I2C error",
            Exception::XdataError => "XDATA error",
            Exception::SbtError => "Binary translator error",
            Exception::MduError => "MDU error",
            Exception::RngError => "RNG error",
            Exception::NvmWriteError => "Nonvolatile memory write error",
            Exception::ClklfError => "Unsupported or invalid LF clock configuration",
            Exception::BadFlashCommand => "Badly formatted flash memory command",
            Exception::FlashBusy => "Operation attempted while flash is busy",
        }
    }
}

/// Host callback invoked on every exception
pub type ExceptHook = Box<dyn FnMut(Exception) + Send>;

/// Register snapshot taken at interrupt entry, verified on RETI
#[derive(Debug, Clone, Copy, Default)]
struct IrqFrame {
    psw: u8,
    sp: u8,
    acc: u8,
    dptr: [u8; 4],
    dps: u8,
    regs: [u8; 8],
}

/// CPU execution state
///
/// Memory and SFRs live on the [`Bus`]; this struct is the part of the chip
/// the bus cannot see: program counter, cycle pacing, interrupt depth,
/// power/watchdog machinery and the prescaler chain.
pub struct Cpu {
    /// Program counter
    pub pc: u16,
    /// PC of the most recently completed instruction
    pub prev_pc: u16,
    /// Cycles remaining for the current instruction
    tick_delay: u32,

    // Prescaler chain: 12-cycle machine tick, /40 low-frequency synthesis
    // (as 20 per phase edge), timer 2's extra /2
    prescaler12: u8,
    prescaler_lf: u8,
    prescaler24: u8,

    /// Previously sampled timer-input pins, for edge detection
    t012: u8,
    /// RTC2 counter, clocked from the synthesized 32 kHz source
    rtc2: u16,

    /// Set while a power-down mode is in effect; instructions stop
    pub power_down: bool,

    /// An enabled interrupt source may be pending; check at the next boundary
    pub need_interrupt_dispatch: bool,
    irq_count: u8,
    irq_frame: IrqFrame,

    /// Running translated basic blocks; relaxes MDU early-read checks
    pub sbt: bool,

    /// Cube index, used in trace and log lines
    pub id: usize,

    exception_count: u32,
    except_hook: Option<ExceptHook>,

    /// Optional per-PC profiling
    pub profiler: Option<Box<Profiler>>,
}

impl Cpu {
    pub fn new(id: usize) -> Self {
        Self {
            pc: 0,
            prev_pc: 0,
            tick_delay: 1,
            prescaler12: 12,
            prescaler_lf: 0,
            prescaler24: 0,
            t012: 0,
            rtc2: 0,
            power_down: false,
            need_interrupt_dispatch: false,
            irq_count: 0,
            irq_frame: IrqFrame::default(),
            sbt: false,
            id,
            exception_count: 0,
            except_hook: None,
            profiler: None,
        }
    }

    /// Reset the chip
    ///
    /// Zeroes the SFR block and applies the power-on defaults; `wipe` also
    /// clears IDATA and XDATA (a cold boot rather than a watchdog or
    /// retained-memory wake).
    pub fn reset(&mut self, bus: &mut Bus, wipe: bool) {
        if wipe {
            bus.data.fill(0);
            bus.xdata.fill(0);
        }

        bus.sfr.fill(0);

        self.pc = 0;
        self.prev_pc = 0;
        self.tick_delay = 1;
        self.prescaler12 = 12;
        self.prescaler_lf = 0;
        self.prescaler24 = 0;
        self.t012 = 0;
        self.rtc2 = 0;

        self.power_down = false;

        self.irq_count = 0;
        self.need_interrupt_dispatch = false;

        bus.sfr[sfr::idx(sfr::REG_SP)] = 7;
        bus.sfr[sfr::idx(sfr::REG_P0)] = 0xFF;
        bus.sfr[sfr::idx(sfr::REG_P1)] = 0xFF;
        bus.sfr[sfr::idx(sfr::REG_P2)] = 0xFF;
        bus.sfr[sfr::idx(sfr::REG_P3)] = 0xFF;

        // All pins default to inputs
        bus.sfr[sfr::idx(sfr::REG_P0DIR)] = 0xFF;
        bus.sfr[sfr::idx(sfr::REG_P1DIR)] = 0xFF;
        bus.sfr[sfr::idx(sfr::REG_P2DIR)] = 0xFF;
        bus.sfr[sfr::idx(sfr::REG_P3DIR)] = 0xFF;

        bus.sfr[sfr::idx(sfr::REG_SPIRCON0)] = 0x01;
        bus.sfr[sfr::idx(sfr::REG_SPIRCON1)] = 0x0F;
        bus.sfr[sfr::idx(sfr::REG_SPIRSTAT)] = 0x03;
        bus.sfr[sfr::idx(sfr::REG_RFCON)] = sfr::RFCON_RFCSN;

        // Pretend the 16 MHz xtal is ready immediately
        bus.sfr[sfr::idx(sfr::REG_CLKLFCTRL)] = 0x0F;

        bus.reset_decode_state();
    }

    /// Advance one clock cycle
    ///
    /// Returns true iff a new instruction completed this cycle.
    pub fn tick(&mut self, bus: &mut Bus) -> bool {
        let mut ticked = false;

        self.prescaler12 -= 1;
        let tick12 = self.prescaler12 == 0;
        if tick12 {
            self.prescaler12 = 12;
        }

        if !self.power_down {
            if self.tick_delay > 1 {
                self.tick_delay -= 1;
            } else {
                self.prev_pc = self.pc;
                self.tick_delay = self.step(bus);
                ticked = true;

                if self.profiler.is_some() {
                    self.profile_tick(bus);
                }

                if bus.tracer.enabled() {
                    self.trace_execution(bus);
                }

                self.drain_bus(bus);

                if self.need_interrupt_dispatch && self.irq_count == 0 {
                    self.dispatch_irq(bus);
                }
            }
        } else if bus.has_pending_events() {
            self.drain_bus(bus);
        }

        if tick12 || bus.need_timer_edge_check {
            self.timer_tick(bus, tick12);
        }

        ticked
    }

    /// Report a hardware exception
    ///
    /// Counts it, logs it, and forwards it to the host hook. Execution is
    /// never halted here.
    pub fn except(&mut self, kind: Exception) {
        self.exception_count += 1;
        log::warn!(
            "cube {}: {} (pc={:04x})",
            self.id,
            kind.message(),
            self.prev_pc
        );
        if let Some(hook) = self.except_hook.as_mut() {
            hook(kind);
        }
    }

    /// Install the host exception callback
    pub fn set_except_hook(&mut self, hook: ExceptHook) {
        self.except_hook = Some(hook);
    }

    /// Exceptions delivered so far, resetting the counter
    pub fn take_exception_count(&mut self) -> u32 {
        std::mem::take(&mut self.exception_count)
    }

    pub fn exception_count(&self) -> u32 {
        self.exception_count
    }

    /// Wake from a power-down mode
    ///
    /// Not used for watchdog wake, which is always a plain reset. `reason`
    /// is OR-ed into the PWRDWN register for the firmware to inspect.
    pub fn wake(&mut self, bus: &mut Bus, reason: u8) {
        let reason = reason | bus.sfr[sfr::idx(sfr::REG_PWRDWN)];
        match reason & sfr::PWRDWN_MODE_MASK {
            sfr::PWRDWN_OFF | sfr::PWRDWN_DEEP_SLEEP => {
                self.reset(bus, true);
            }
            sfr::PWRDWN_MEMORY | sfr::PWRDWN_MEMORY_TIMERS => {
                self.reset(bus, false);
            }
            _ => {
                self.power_down = false;
            }
        }
        bus.sfr[sfr::idx(sfr::REG_PWRDWN)] = reason;
    }

    /// Cycle count of the most recently fetched instruction
    pub fn tick_delay(&self) -> u32 {
        self.tick_delay
    }

    fn profile_tick(&mut self, bus: &Bus) {
        let prev_pc = self.prev_pc;
        let cycles = self.tick_delay as u64;
        let flash_idle = !bus.flash.is_busy();
        if let Some(p) = self.profiler.as_mut() {
            p.record(prev_pc, cycles, bus.clock);
            if flash_idle {
                p.record_flash_idle(prev_pc);
            }
        }
    }

    fn trace_execution(&mut self, bus: &mut Bus) {
        let mut text = String::new();
        disasm::decode(&bus.code, self.prev_pc, &mut text);
        let line = format!("EXEC {:04x}: {}", self.prev_pc, text);
        bus.tracer.log("CPU", &line);
    }

    /// Apply side effects queued by the bus during opcode execution
    fn drain_bus(&mut self, bus: &mut Bus) {
        for kind in bus.take_exceptions() {
            self.except(kind);
        }
        if bus.take_irq_request() {
            self.need_interrupt_dispatch = true;
        }
        if bus.take_power_down_request() {
            self.power_down = true;
        }
    }
}
