//! Multi-cube system
//!
//! Owns the shared virtual clock, the network hub and up to 24 cubes, and
//! advances everything in lock step: every cube sees every cycle, so no
//! cube ever runs ahead of another, and cross-cube effects (radio
//! delivery, neighbor pulses) land within one cycle of their cause.
//!
//! The neighbor adjacency matrix is configured here: `set_contact(a, sa,
//! b, sb)` records that side `sa` of cube `a` touches side `sb` of cube
//! `b`, in both directions. Firmware re-reads neighbor state every sensor
//! period, so mid-poll matrix edits are harmless.

use std::path::Path;

use crate::hardware::Hardware;
use crate::loader::LoadError;
use crate::network::NetworkHub;
use crate::peripherals::neighbors::PulseEvent;
use crate::peripherals::FlashStorage;
use crate::vtime::VirtualTime;

/// Radio addressing limits the system to two dozen cubes
pub const MAX_CUBES: usize = 24;

pub struct System {
    pub time: VirtualTime,
    pub hub: NetworkHub,
    cubes: Vec<Hardware>,
    /// Scratch list reused every tick
    pulses: Vec<PulseEvent>,
}

impl System {
    pub fn new() -> Self {
        Self {
            time: VirtualTime::new(),
            hub: NetworkHub::new(),
            cubes: Vec::new(),
            pulses: Vec::new(),
        }
    }

    pub fn with_clock_rate(hz: u64) -> Self {
        Self {
            time: VirtualTime::with_rate(hz),
            ..Self::new()
        }
    }

    /// Add a cube; returns its index
    pub fn add_cube(&mut self, storage: FlashStorage) -> usize {
        assert!(self.cubes.len() < MAX_CUBES);
        let id = self.cubes.len();
        self.cubes.push(Hardware::new(id, storage));
        id
    }

    pub fn num_cubes(&self) -> usize {
        self.cubes.len()
    }

    pub fn cube(&self, id: usize) -> &Hardware {
        &self.cubes[id]
    }

    pub fn cube_mut(&mut self, id: usize) -> &mut Hardware {
        &mut self.cubes[id]
    }

    /// Load the same firmware image into every cube
    pub fn load_firmware(&mut self, path: &Path) -> Result<(), LoadError> {
        for cube in &mut self.cubes {
            cube.load_firmware(path)?;
        }
        Ok(())
    }

    /// Advance the whole system one clock cycle
    pub fn tick(&mut self) {
        self.time.elapse(1);

        for index in 0..self.cubes.len() {
            self.pulses.clear();
            self.cubes[index].tick(&self.time, &mut self.hub, &mut self.pulses);

            // Route this cube's neighbor pulses. A cube never lists
            // itself in its own matrix, so the indexing cannot alias.
            for i in 0..self.pulses.len() {
                let pulse = self.pulses[i];
                if pulse.cube != index && pulse.cube < self.cubes.len() {
                    self.cubes[pulse.cube].receive_pulse(pulse.side);
                }
            }
        }
    }

    /// Run for `cycles` clock cycles
    pub fn run(&mut self, cycles: u64) {
        for _ in 0..cycles {
            self.tick();
        }
    }

    /// Mark side `side_a` of cube `a` as touching side `side_b` of cube `b`
    pub fn set_contact(&mut self, a: usize, side_a: usize, b: usize, side_b: usize) {
        self.cubes[a].bus.neighbors.set_contact(side_a, side_b, b);
        self.cubes[b].bus.neighbors.set_contact(side_b, side_a, a);
    }

    pub fn clear_contact(&mut self, a: usize, side_a: usize, b: usize, side_b: usize) {
        self.cubes[a].bus.neighbors.clear_contact(side_a, side_b, b);
        self.cubes[b].bus.neighbors.clear_contact(side_b, side_a, a);
    }

    /// Total exceptions across all cubes, resetting the counters
    pub fn take_exception_count(&mut self) -> u32 {
        self.cubes
            .iter_mut()
            .map(|c| c.cpu.take_exception_count())
            .sum()
    }
}

impl Default for System {
    fn default() -> Self {
        Self::new()
    }
}
