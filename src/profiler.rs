//! Per-PC execution profiling
//!
//! Optional accounting attached to a CPU: total cycles charged to each
//! program-counter location, cycles where the flash was idle when an
//! instruction completed, and a back-edge estimator that measures the mean
//! period of loops revisiting the same address.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::cpu::{disasm, CODE_SIZE};

/// Counters for one program-counter location
#[derive(Debug, Clone, Copy, Default)]
pub struct ProfileData {
    /// Cycles spent executing the instruction at this PC
    pub total_cycles: u64,
    /// Completions at this PC while the flash was not busy
    pub flash_idle: u64,
    /// Revisits observed by the loop estimator
    pub loop_hits: u64,
    /// Cycles accumulated between revisits
    pub loop_cycles: u64,
    /// Clock at the previous visit, 0 = never visited
    pub loop_prev: u64,
}

/// Per-PC profile for one cube
#[derive(Debug, Clone)]
pub struct Profiler {
    data: Vec<ProfileData>,
    total_cycles: u64,
}

impl Profiler {
    pub fn new() -> Self {
        Self {
            data: vec![ProfileData::default(); CODE_SIZE],
            total_cycles: 0,
        }
    }

    /// Charge `cycles` at `pc`, observed at absolute time `clock`
    pub fn record(&mut self, pc: u16, cycles: u64, clock: u64) {
        let pd = &mut self.data[pc as usize];
        pd.total_cycles += cycles;
        if pd.loop_prev != 0 {
            pd.loop_cycles += clock - pd.loop_prev;
            pd.loop_hits += 1;
        }
        pd.loop_prev = clock;
        self.total_cycles += cycles;
    }

    /// Note that the flash was idle when the instruction at `pc` completed
    pub fn record_flash_idle(&mut self, pc: u16) {
        self.data[pc as usize].flash_idle += 1;
    }

    pub fn data(&self, pc: u16) -> &ProfileData {
        &self.data[pc as usize]
    }

    pub fn total_cycles(&self) -> u64 {
        self.total_cycles
    }

    /// Write the annotated-disassembly report
    ///
    /// One line per PC that accumulated any cycles, in address order.
    pub fn write_report(&self, path: &Path, code: &[u8]) -> io::Result<()> {
        let mut f = BufWriter::new(File::create(path)?);

        writeln!(f, "# profile written {}", chrono::Local::now().to_rfc3339())?;
        writeln!(
            f,
            "total_cycles  %_cycles  fl_idle  loop_len  loop_count    addr   disassembly"
        )?;

        let mut text = String::new();
        for addr in 0..CODE_SIZE {
            let pd = &self.data[addr];
            if pd.total_cycles == 0 {
                continue;
            }

            text.clear();
            disasm::decode(code, addr as u16, &mut text);

            let loop_len = if pd.loop_hits != 0 {
                pd.loop_cycles / pd.loop_hits
            } else {
                0
            };

            writeln!(
                f,
                "{:12} {:8.4}% {:8} [{:8} x {:9} ]  {:04x}:  {}",
                pd.total_cycles,
                (pd.total_cycles * 100) as f64 / self.total_cycles.max(1) as f64,
                pd.flash_idle,
                loop_len,
                pd.loop_hits,
                addr,
                text
            )?;
        }

        Ok(())
    }
}

impl Default for Profiler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_accumulates() {
        let mut p = Profiler::new();
        p.record(0x100, 2, 10);
        p.record(0x100, 2, 30);
        p.record(0x100, 2, 50);

        let pd = p.data(0x100);
        assert_eq!(pd.total_cycles, 6);
        assert_eq!(pd.loop_hits, 2);
        assert_eq!(pd.loop_cycles, 40);
        assert_eq!(p.total_cycles(), 6);
    }

    #[test]
    fn test_flash_idle() {
        let mut p = Profiler::new();
        p.record_flash_idle(0x20);
        p.record_flash_idle(0x20);
        assert_eq!(p.data(0x20).flash_idle, 2);
    }

    #[test]
    fn test_report_roundtrip() {
        let mut p = Profiler::new();
        let code = vec![0u8; CODE_SIZE];
        p.record(0, 1, 1);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profile.txt");
        p.write_report(&path, &code).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("0000:"));
        assert!(text.contains("NOP"));
    }
}
