//! One cube's hardware
//!
//! The aggregate of the CPU core and its bus of peripherals, advanced one
//! clock cycle at a time. The outer loop belongs to [`crate::system`],
//! which owns the shared clock and the network hub and routes neighbor
//! pulses between cubes.

use std::path::Path;

use crate::bus::Bus;
use crate::cpu::{Cpu, Exception};
use crate::loader::{self, LoadError};
use crate::network::NetworkHub;
use crate::peripherals::adc::{BATTERY_CHANNEL, TOUCH_CHANNEL};
use crate::peripherals::neighbors::{Neighbors, PulseEvent};
use crate::peripherals::FlashStorage;
use crate::profiler::Profiler;
use crate::vtime::VirtualTime;

pub struct Hardware {
    pub cpu: Cpu,
    pub bus: Bus,
}

impl Hardware {
    /// Build a cube with the given flash backing storage
    pub fn new(id: usize, storage: FlashStorage) -> Self {
        let mut hw = Self {
            cpu: Cpu::new(id),
            bus: Bus::new(id, storage),
        };
        hw.reset(true);
        hw
    }

    /// Chip reset; `wipe` clears RAM as well
    pub fn reset(&mut self, wipe: bool) {
        self.cpu.reset(&mut self.bus, wipe);
    }

    /// Load firmware from an Intel-HEX image
    pub fn load_firmware(&mut self, path: &Path) -> Result<(), LoadError> {
        loader::load_ihx(path, &mut self.bus.code)
    }

    /// Advance one clock cycle
    ///
    /// Returns true iff an instruction completed. Neighbor pulses bound
    /// for other cubes are appended to `pulses`.
    pub fn tick(
        &mut self,
        vtime: &VirtualTime,
        hub: &mut NetworkHub,
        pulses: &mut Vec<PulseEvent>,
    ) -> bool {
        self.bus.clock = vtime.clocks;
        self.bus.tracer.set_clock(vtime.clocks);

        let ticked = self.cpu.tick(&mut self.bus);

        // Deadline-gated slow path
        if self.bus.slow_path_due(vtime.clocks) {
            self.bus.hardware_tick(&mut self.cpu, vtime, hub);
        }

        // Per-cycle fast path: neighbor edges and the flash data bus
        if self
            .bus
            .neighbors
            .io_tick(&mut self.bus.sfr, pulses, &mut self.bus.tracer)
        {
            self.bus.need_timer_edge_check = true;
        }
        self.bus.refresh_flash_bus();

        ticked
    }

    /// Deliver a neighbor pulse to one of this cube's sides
    pub fn receive_pulse(&mut self, side: usize) {
        if !self.bus.neighbors.can_receive(side) {
            if self.bus.tracer.enabled() {
                self.bus
                    .tracer
                    .log("NEIGHBOR", &format!("pulse on side {} was masked", side));
            }
            return;
        }

        if self.bus.tracer.enabled() {
            self.bus
                .tracer
                .log("NEIGHBOR", &format!("received pulse on side {}", side));
        }
        Neighbors::receive_pulse(&mut self.bus.sfr);
        self.bus.need_timer_edge_check = true;

        // A pulse is also a wake-up source
        if self.cpu.power_down {
            self.cpu.wake(&mut self.bus, 0);
        }
    }

    /// Arm the LCD tearing-effect pulse
    pub fn lcd_pulse_te(&mut self, vtime: &VirtualTime) {
        self.bus.lcd.pulse_te(vtime);
    }

    /// Feed the accelerometer, in g
    pub fn set_acceleration(&mut self, x_g: f32, y_g: f32, z_g: f32) {
        self.bus.i2c.accel.set_acceleration(x_g, y_g, z_g);
    }

    /// Feed the touch-sense ADC channel; `amount` in [0, 1]
    pub fn set_touch(&mut self, amount: f32) {
        let value = (amount.clamp(0.0, 1.0) * u16::MAX as f32) as u16;
        self.bus.adc.set_input(TOUCH_CHANNEL, value);
    }

    /// Feed the battery measurement channel, in volts
    ///
    /// The input samples a third of VDD against the 1.2 V reference.
    pub fn set_battery_voltage(&mut self, volts: f32) {
        let ratio = (volts / 3.0 / 1.2).clamp(0.0, 1.0);
        let value = (ratio * u16::MAX as f32) as u16;
        self.bus.adc.set_input(BATTERY_CHANNEL, value);
    }

    /// Start tracing to a file
    pub fn attach_tracer(&mut self, path: &Path) -> std::io::Result<()> {
        self.bus.tracer.attach(path)
    }

    /// Start per-PC profiling
    pub fn enable_profiler(&mut self) {
        self.cpu.profiler = Some(Box::new(Profiler::new()));
    }

    /// Write the profile report, if profiling was enabled
    pub fn write_profile(&self, path: &Path) -> std::io::Result<()> {
        if let Some(profiler) = self.cpu.profiler.as_ref() {
            profiler.write_report(path, &self.bus.code)?;
        }
        Ok(())
    }

    /// Install the host exception callback
    pub fn set_except_hook(&mut self, hook: Box<dyn FnMut(Exception) + Send>) {
        self.cpu.set_except_hook(hook);
    }

    /// Persist flash contents if a backing file is bound
    pub fn save_flash(&self) -> Result<(), crate::peripherals::flash_storage::StorageError> {
        self.bus.flash.storage().save()
    }
}
