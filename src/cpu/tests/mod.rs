//! CPU core tests
//!
//! Shared harness: a CPU plus a bus with fresh flash storage, a program
//! poked into code memory, and helpers to run whole instructions.

mod instructions;

use crate::bus::Bus;
use crate::cpu::sfr::{self, idx};
use crate::cpu::Cpu;
use crate::peripherals::FlashStorage;

pub(super) fn rig() -> (Cpu, Bus) {
    let mut cpu = Cpu::new(0);
    let mut bus = Bus::new(0, FlashStorage::new());
    cpu.reset(&mut bus, true);
    (cpu, bus)
}

pub(super) fn load(bus: &mut Bus, program: &[u8]) {
    bus.code[..program.len()].copy_from_slice(program);
}

/// Tick until one instruction completes; returns the cycles it took
pub(super) fn step(cpu: &mut Cpu, bus: &mut Bus) -> u32 {
    let mut cycles = 0;
    loop {
        cycles += 1;
        bus.clock += 1;
        if cpu.tick(bus) {
            return cycles;
        }
        assert!(cycles < 1000, "instruction never completed");
    }
}

pub(super) fn step_n(cpu: &mut Cpu, bus: &mut Bus, n: usize) {
    for _ in 0..n {
        step(cpu, bus);
    }
}

pub(super) fn acc(bus: &Bus) -> u8 {
    bus.sfr[idx(sfr::REG_ACC)]
}

pub(super) fn psw(bus: &Bus) -> u8 {
    bus.sfr[idx(sfr::REG_PSW)]
}
