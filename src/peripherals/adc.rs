//! ADC
//!
//! Single-shot and continuous conversions over 16 input channels, with
//! acquisition time and resolution straight from the part's conversion
//! table. Touch sensing feeds channel 8. Completion clears BUSY, raises
//! the MISC interrupt and stores the result with the configured
//! justification.

use crate::cpu::sfr::{self, idx};
use crate::vtime::TickDeadline;

const ADCCON1_PWRUP: u8 = 0x80;
const ADCCON1_BUSY: u8 = 0x40;
const ADCCON1_CHSEL_MASK: u8 = 0x3C;
const ADCCON1_CHSEL_SHIFT: u8 = 2;
const ADCCON2_CONT: u8 = 0x20;
const ADCCON2_RATE_MASK: u8 = 0x1C;
const ADCCON2_TACQ_MASK: u8 = 0x03;
const ADCCON3_RESOL_MASK: u8 = 0xC0;
const ADCCON3_RLJUST: u8 = 0x20;

/// Touch sensing input channel
pub const TOUCH_CHANNEL: usize = 8;

/// Battery measurement input (1/3 VDD on the real part)
pub const BATTERY_CHANNEL: usize = 13;

pub struct Adc {
    inputs: [u16; 16],
    triggered: bool,
    conversion_channel: usize,
    conversion_timer: u64,
    period_timer: u64,
}

impl Adc {
    pub fn new() -> Self {
        Self {
            inputs: [0; 16],
            triggered: false,
            conversion_channel: 0,
            conversion_timer: 0,
            period_timer: 0,
        }
    }

    /// Kick off a conversion (ADCCON1 write side effect)
    pub fn start(&mut self) {
        if self.period_timer == 0 {
            self.triggered = true;
        }
    }

    /// Drive an input channel, 16-bit left-justified
    pub fn set_input(&mut self, channel: usize, value: u16) {
        self.inputs[channel] = value;
    }

    /// A conversion is queued but not yet scheduled
    pub fn needs_tick(&self) -> bool {
        self.triggered
    }

    pub fn tick(&mut self, deadline: &mut TickDeadline, sfr: &mut [u8; 128]) {
        if sfr[idx(sfr::REG_ADCCON1)] & ADCCON1_PWRUP == 0 {
            return;
        }

        if self.period_timer != 0 {
            if deadline.has_passed(self.period_timer) {
                self.period_timer = 0;
                self.triggered = true;
            } else {
                deadline.set(self.period_timer);
            }
        }

        if self.triggered && self.conversion_timer == 0 {
            self.triggered = false;
            self.conversion_timer =
                deadline.set_relative(deadline.nsec(Self::conversion_nsec(sfr)));
            self.conversion_channel = ((sfr[idx(sfr::REG_ADCCON1)] & ADCCON1_CHSEL_MASK)
                >> ADCCON1_CHSEL_SHIFT) as usize;
        }

        if self.conversion_timer != 0 {
            if !deadline.has_passed(self.conversion_timer) {
                sfr[idx(sfr::REG_ADCCON1)] |= ADCCON1_BUSY;
                deadline.set(self.conversion_timer);
            } else {
                // Conversion done: clear BUSY, interrupt, store, and in
                // continuous mode arm the next period
                self.conversion_timer = 0;

                sfr[idx(sfr::REG_ADCCON1)] &= !ADCCON1_BUSY;
                sfr[idx(sfr::REG_IRCON)] |= sfr::IRCON_MISC;

                if sfr[idx(sfr::REG_ADCCON2)] & ADCCON2_CONT != 0 {
                    let period = deadline.hz_period(Self::rate_hz(sfr));
                    let conversion = deadline.nsec(Self::conversion_nsec(sfr));
                    self.period_timer =
                        deadline.set_relative(period.saturating_sub(conversion).max(1));
                }

                Self::store_result(sfr, self.inputs[self.conversion_channel]);
            }
        }
    }

    /// Conversion duration by acquisition window and resolution
    fn conversion_nsec(sfr: &[u8; 128]) -> u64 {
        match (sfr[idx(sfr::REG_ADCCON2)] & ADCCON2_TACQ_MASK)
            | (sfr[idx(sfr::REG_ADCCON3)] & ADCCON3_RESOL_MASK)
        {
            // tAcq = 0.75us
            0x00 => 3000,
            0x40 => 3200,
            0x80 => 3400,
            0xC0 => 3600,

            // tAcq = 3us
            0x01 => 5300,
            0x41 => 5400,
            0x81 => 5600,
            0xC1 => 5800,

            // tAcq = 12us
            0x02 => 14300,
            0x42 => 14400,
            0x82 => 14600,
            0xC2 => 14800,

            // tAcq = 36us
            0x03 => 38300,
            0x43 => 38400,
            0x83 => 38600,
            0xC3 => 38800,

            _ => 3000,
        }
    }

    fn rate_hz(sfr: &[u8; 128]) -> u64 {
        match sfr[idx(sfr::REG_ADCCON2)] & ADCCON2_RATE_MASK {
            0x04 => 4000,
            0x08 => 8000,
            0x0C => 16000,
            _ => 2000,
        }
    }

    fn store_result(sfr: &mut [u8; 128], result: u16) {
        let (high, low) = match sfr[idx(sfr::REG_ADCCON3)] & (ADCCON3_RESOL_MASK | ADCCON3_RLJUST)
        {
            // Left justified: 6, 8, 10, 12 bits
            0x00 => (((result >> 8) & 0xFC) as u8, 0),
            0x40 => ((result >> 8) as u8, 0),
            0x80 => ((result >> 8) as u8, (result & 0xC0) as u8),
            0xC0 => ((result >> 8) as u8, (result & 0xF0) as u8),

            // Right justified: 6, 8, 10, 12 bits
            0x20 => (0, (result >> 10) as u8),
            0x60 => (0, (result >> 8) as u8),
            0xA0 => ((result >> 14) as u8, (result >> 6) as u8),
            0xE0 => ((result >> 12) as u8, (result >> 4) as u8),

            _ => (0, 0),
        };
        sfr[idx(sfr::REG_ADCDATH)] = high;
        sfr[idx(sfr::REG_ADCDATL)] = low;
    }
}

impl Default for Adc {
    fn default() -> Self {
        Self::new()
    }
}
