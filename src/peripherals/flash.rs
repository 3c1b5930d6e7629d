//! External NOR flash
//!
//! Cycle-level model of the parallel flash on the cube's shared bus.
//! Write cycles land in a small FIFO whose most recent entries are matched
//! against the part's unlock patterns; a match kicks off a timed busy
//! period during which reads return the toggling status byte instead of
//! array data.

use crate::cpu::Exception;
use crate::tracer::Tracer;
use crate::vtime::TickDeadline;

use super::flash_model as model;
use super::flash_storage::FlashStorage;

// Busy states, OR-able so the UI latch can accumulate them
pub const BF_IDLE: u8 = 0;
pub const BF_PROGRAM: u8 = 1 << 0;
pub const BF_ERASE_BLOCK: u8 = 1 << 1;
pub const BF_ERASE_SECTOR: u8 = 1 << 2;
pub const BF_ERASE_CHIP: u8 = 1 << 3;
pub const BF_ERASE: u8 = BF_ERASE_BLOCK | BF_ERASE_SECTOR | BF_ERASE_CHIP;

/// Pin state presented to [`Flash::cycle`]
///
/// Control lines carry their electrical sense: `ce_n`, `oe_n` and `we_n`
/// are active-low, `power` is active-high. `data_drv` is the one output:
/// whether the flash is driving the shared data bus this cycle.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlashPins {
    pub addr: u32,
    pub power: bool,
    pub oe_n: bool,
    pub ce_n: bool,
    pub we_n: bool,
    pub data_in: u8,

    pub data_drv: bool,
}

#[derive(Debug, Clone, Copy, Default)]
struct CmdState {
    addr: u32,
    data: u8,
}

const CMD_FIFO_MASK: u8 = 0xF;

/// The flash device state machine
pub struct Flash {
    storage: FlashStorage,

    // Clock/power metrics
    cycle_count: u32,
    write_count: u32,
    erase_count: u32,
    busy_ticks: u64,
    idle_ticks: u64,
    busy_status: u8,
    previous_clocks: u64,

    // Command state
    latched_addr: u32,
    busy_timer: u64,
    busy: u8,
    cmd_fifo_head: u8,
    prev_we_n: bool,
    prev_oe_n: bool,
    status_byte: u8,
    cmd_fifo: [CmdState; (CMD_FIFO_MASK + 1) as usize],
}

impl Flash {
    pub fn new(storage: FlashStorage) -> Self {
        Self {
            storage,
            cycle_count: 0,
            write_count: 0,
            erase_count: 0,
            busy_ticks: 0,
            idle_ticks: 0,
            busy_status: BF_IDLE,
            previous_clocks: 0,
            latched_addr: 0,
            busy_timer: 0,
            busy: BF_IDLE,
            cmd_fifo_head: 0,
            prev_we_n: true,
            prev_oe_n: true,
            status_byte: 0,
            cmd_fifo: [CmdState::default(); 16],
        }
    }

    pub fn storage(&self) -> &FlashStorage {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut FlashStorage {
        &mut self.storage
    }

    pub fn is_busy(&self) -> bool {
        self.busy != BF_IDLE
    }

    /// Busy but the timer is not armed yet; the owner must schedule a tick
    pub fn needs_tick(&self) -> bool {
        self.busy != BF_IDLE && self.busy_timer == 0
    }

    /// Read cycles since the last call (power accounting)
    pub fn take_cycle_count(&mut self) -> u32 {
        std::mem::take(&mut self.cycle_count)
    }

    /// Busy states seen since the last call
    pub fn take_busy_flags(&mut self) -> u8 {
        std::mem::take(&mut self.busy_status)
    }

    /// Percentage of recent time spent busy, then reset the accumulators
    pub fn take_busy_percent(&mut self) -> u32 {
        let total = self.busy_ticks + self.idle_ticks;
        let percent = if total != 0 {
            self.busy_ticks * 100 / total
        } else {
            0
        };
        self.busy_ticks = 0;
        self.idle_ticks = 0;
        percent as u32
    }

    pub fn write_count(&self) -> u32 {
        self.write_count
    }

    pub fn erase_count(&self) -> u32 {
        self.erase_count
    }

    /// March time forward on the current operation, if any
    pub fn tick(&mut self, deadline: &mut TickDeadline, tracer: &mut Tracer) {
        let elapsed = deadline.clock() - self.previous_clocks;
        self.previous_clocks = deadline.clock();

        if self.busy != BF_IDLE {
            // Latch busy flags long enough for the UI to see them
            self.busy_status |= self.busy;

            if self.busy_timer == 0 {
                // Just became busy; arm the timer now
                let duration = match self.busy {
                    BF_PROGRAM => deadline.usec(model::PROGRAM_TIME_US),
                    BF_ERASE_SECTOR => deadline.usec(model::ERASE_SECTOR_TIME_US),
                    BF_ERASE_BLOCK => deadline.usec(model::ERASE_BLOCK_TIME_US),
                    _ => deadline.usec(model::ERASE_CHIP_TIME_US),
                };
                self.busy_timer = deadline.set_relative(duration);
            } else if deadline.has_passed(self.busy_timer) {
                if tracer.enabled() {
                    tracer.log("FLASH", "no longer busy");
                }
                self.busy = BF_IDLE;
                self.busy_timer = 0;
            } else {
                // Still busy
                deadline.set(self.busy_timer);
            }

            self.busy_ticks += elapsed;
        } else {
            self.idle_ticks += elapsed;
        }
    }

    /// One bus cycle: react to pin changes
    pub fn cycle(&mut self, pins: &mut FlashPins, tracer: &mut Tracer) -> Option<Exception> {
        let mut fault = None;

        if pins.ce_n || !pins.power {
            // Chip disabled
            pins.data_drv = false;
            self.prev_we_n = true;
            self.prev_oe_n = true;
            return None;
        }

        let addr = (model::SIZE as u32 - 1) & pins.addr;

        // Command writes trigger on a falling WE edge
        if !pins.we_n && self.prev_we_n {
            self.cycle_count += 1;
            self.latched_addr = addr;

            self.cmd_fifo[self.cmd_fifo_head as usize] = CmdState {
                addr,
                data: pins.data_in,
            };
            fault = self.match_commands(tracer);
            self.cmd_fifo_head = CMD_FIFO_MASK & (self.cmd_fifo_head + 1);
        }

        // Reads occur on any cycle with OE asserted. Busy parts return the
        // status byte; idle parts return array data. An OE edge or address
        // change counts as a fresh read cycle.
        if pins.oe_n {
            pins.data_drv = false;
        } else {
            // Toggle bits only change on an OE edge
            if self.prev_oe_n {
                self.update_status_byte();
            }

            pins.data_drv = true;
            if addr != self.latched_addr || self.prev_oe_n {
                self.cycle_count += 1;
                self.latched_addr = addr;

                if tracer.enabled() {
                    let msg = format!(
                        "read addr [{:06x}] -> {:02x} (busy={})",
                        addr,
                        self.data_out(),
                        self.busy
                    );
                    tracer.log("FLASH", &msg);
                }
            }
        }

        self.prev_we_n = pins.we_n;
        self.prev_oe_n = pins.oe_n;
        fault
    }

    /// Byte currently driven onto the data bus
    ///
    /// The value can change between bus cycles (busy completion), so the
    /// aggregate re-reads this every tick while `data_drv` is set.
    pub fn data_out(&self) -> u8 {
        if self.busy != BF_IDLE {
            self.status_byte
        } else {
            self.storage.data[self.latched_addr as usize]
        }
    }

    fn match_one(&self, seq: &[model::CommandStep; model::CMD_LENGTH]) -> bool {
        let mut fifo_index = self
            .cmd_fifo_head
            .wrapping_sub(model::CMD_LENGTH as u8 - 1);

        for step in seq {
            let entry = &self.cmd_fifo[(fifo_index & CMD_FIFO_MASK) as usize];
            if (entry.addr as u16 & step.addr_mask) != step.addr
                || (entry.data & step.data_mask) != step.data
            {
                return false;
            }
            fifo_index = fifo_index.wrapping_add(1);
        }
        true
    }

    fn erase(&mut self, addr: u32, size: usize) {
        let addr = (addr as usize) & !(size - 1);
        self.storage.data[addr..addr + size].fill(0xFF);

        let first = addr / model::SECTOR_SIZE;
        let last = (addr + size) / model::SECTOR_SIZE;
        for sector in first..last {
            self.storage.erase_counts[sector] += 1;
        }
    }

    fn match_commands(&mut self, tracer: &mut Tracer) -> Option<Exception> {
        let st = self.cmd_fifo[self.cmd_fifo_head as usize];

        if self.busy != BF_IDLE {
            // The part ignores everything while busy, but a firmware that
            // gets a full command through deserves to hear about it
            if self.match_one(&model::CMD_BYTE_PROGRAM)
                || self.match_one(&model::CMD_SECTOR_ERASE)
                || self.match_one(&model::CMD_BLOCK_ERASE)
                || self.match_one(&model::CMD_CHIP_ERASE)
            {
                return Some(Exception::FlashBusy);
            }
            return None;
        }

        if self.match_one(&model::CMD_BYTE_PROGRAM) {
            if tracer.enabled() {
                let msg = format!(
                    "programming addr [{:06x}], {:02x} -> {:02x}",
                    st.addr, self.storage.data[st.addr as usize], st.data
                );
                tracer.log("FLASH", &msg);
            }

            // NOR programming can only clear bits
            self.storage.data[st.addr as usize] &= st.data;
            self.status_byte = model::STATUS_DATA_INV & !st.data;
            self.busy = BF_PROGRAM;
            self.write_count += 1;
        } else if self.match_one(&model::CMD_SECTOR_ERASE) {
            if tracer.enabled() {
                tracer.log("FLASH", &format!("sector erase [{:06x}]", st.addr));
            }
            self.erase(st.addr, model::SECTOR_SIZE);
            self.status_byte = 0;
            self.busy = BF_ERASE_SECTOR;
            self.erase_count += 1;
        } else if self.match_one(&model::CMD_BLOCK_ERASE) {
            if tracer.enabled() {
                tracer.log("FLASH", &format!("block erase [{:06x}]", st.addr));
            }
            self.erase(st.addr, model::BLOCK_SIZE);
            self.status_byte = 0;
            self.busy = BF_ERASE_BLOCK;
            self.erase_count += 1;
        } else if self.match_one(&model::CMD_CHIP_ERASE) {
            if tracer.enabled() {
                tracer.log("FLASH", &format!("chip erase [{:06x}]", st.addr));
            }
            self.erase(0, model::SIZE);
            self.status_byte = 0;
            self.busy = BF_ERASE_CHIP;
            self.erase_count += 1;
        } else if self.match_one(&model::CMD_ERASE_PREFIX) {
            // A full unlock followed by an unknown confirm byte
            return Some(Exception::BadFlashCommand);
        }

        None
    }

    fn update_status_byte(&mut self) {
        self.status_byte ^= model::STATUS_TOGGLE;

        if self.busy & BF_ERASE != 0 {
            self.status_byte ^= model::STATUS_ERASE_TOGGLE;
        }
    }
}
