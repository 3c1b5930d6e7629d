//! Execution tracing
//!
//! A per-cube, globally gated event log: radio commands, SPI bytes, flash
//! commands, MDU operations, neighbor pulses, LCD commands and executed
//! instructions, each stamped with the cycle counter (relative to the
//! first logged event, so timestamps start at zero). Events also mirror
//! to the `log` facade at trace level, which stays available when no
//! trace file is attached.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

pub struct Tracer {
    file: Option<BufWriter<File>>,
    enabled: bool,
    epoch: Option<u64>,
    clock: u64,
    cube_id: usize,
}

impl Tracer {
    pub fn new(cube_id: usize) -> Self {
        Self {
            file: None,
            enabled: false,
            epoch: None,
            clock: 0,
            cube_id,
        }
    }

    /// Open a trace file and start logging
    pub fn attach(&mut self, path: &Path) -> std::io::Result<()> {
        let mut file = BufWriter::new(File::create(path)?);
        writeln!(
            file,
            "# cube {} trace started {}",
            self.cube_id,
            chrono::Local::now().to_rfc3339()
        )?;
        self.file = Some(file);
        self.enabled = true;
        self.epoch = None;
        Ok(())
    }

    /// Stop logging and flush
    pub fn close(&mut self) {
        if let Some(mut file) = self.file.take() {
            let _ = file.flush();
        }
        self.enabled = false;
    }

    #[inline]
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Update the timestamp used for subsequent events
    #[inline]
    pub fn set_clock(&mut self, clocks: u64) {
        self.clock = clocks;
    }

    /// Record one event
    pub fn log(&mut self, subsys: &str, msg: &str) {
        if !self.enabled {
            return;
        }

        let epoch = *self.epoch.get_or_insert(self.clock);
        let stamp = self.clock - epoch;

        if let Some(file) = self.file.as_mut() {
            let _ = writeln!(file, "[{:>12}] {}: {}", stamp, subsys, msg);
        }
        log::trace!("cube {} [{}] {}: {}", self.cube_id, stamp, subsys, msg);
    }
}

impl Drop for Tracer {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_by_default() {
        let tracer = Tracer::new(0);
        assert!(!tracer.enabled());
    }

    #[test]
    fn test_timestamps_relative_to_first_event() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.txt");

        let mut tracer = Tracer::new(1);
        tracer.attach(&path).unwrap();

        tracer.set_clock(5000);
        tracer.log("FLASH", "sector erase [000000]");
        tracer.set_clock(5100);
        tracer.log("SPI", "ff -> 0e");
        tracer.close();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("           0] FLASH: sector erase"));
        assert!(text.contains("         100] SPI: ff -> 0e"));
        assert!(text.starts_with("# cube 1 trace"));
    }
}
