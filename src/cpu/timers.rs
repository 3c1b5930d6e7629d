//! Timer subsystem
//!
//! Timers 0/1/2 run from the 12-cycle machine prescaler or count falling
//! edges on their input pins. A divide-by-40 stage behind the prescaler
//! synthesizes the 32 kHz low-frequency clock (16 MHz / 12 / 40 = 33.3 kHz,
//! slightly fast so borderline watchdog timing fails loudly in simulation),
//! which in turn drives the watchdog and RTC2.

use super::sfr::*;
use super::{Cpu, Exception};
use crate::bus::Bus;
use crate::peripherals::neighbors::Neighbors;

impl Cpu {
    /// One pass over the timer hardware
    ///
    /// Runs on every 12-cycle machine tick, and additionally whenever a
    /// timer input pin may have changed (`need_timer_edge_check`).
    pub(super) fn timer_tick(&mut self, bus: &mut Bus, tick12: bool) {
        let next_t012 = bus.sfr[idx(PORT_T012)] & (PIN_T0 | PIN_T1 | PIN_T2);
        let falling = self.t012 & !next_t012;
        self.t012 = next_t012;
        bus.need_timer_edge_check = false;

        // Neighbor pulses are instantaneous; drop the input again right
        // after it has been sampled, which produces the falling edge the
        // counters react to.
        if Neighbors::clear_input(&mut bus.sfr) {
            bus.need_timer_edge_check = true;
        }

        if self.power_down {
            match bus.sfr[idx(REG_PWRDWN)] & PWRDWN_MODE_MASK {
                PWRDWN_DEEP_SLEEP | PWRDWN_MEMORY => return,
                _ => {}
            }
        }

        if tick12 {
            self.clklf_synthesis(bus);
        }

        let tmod = bus.sfr[idx(REG_TMOD)];
        let tcon = bus.sfr[idx(REG_TCON)];
        let t0_mode3 = tmod & (TMOD_M0_0 | TMOD_M1_0) == (TMOD_M0_0 | TMOD_M1_0);

        // Timer 0, mode 3: TL0 and TH0 become two independent 8-bit
        // counters. TH0 reuses timer 1's run/overflow plumbing.
        if t0_mode3 {
            let run0 = tmod & TMOD_GATE_0 == 0 && tcon & TCON_TR0 != 0;
            let inc0 = run0
                && if tmod & TMOD_CT_0 != 0 {
                    falling & PIN_T0 != 0
                } else {
                    tick12
                };
            if inc0 {
                let (v, overflow) = bus.sfr[idx(REG_TL0)].overflowing_add(1);
                bus.sfr[idx(REG_TL0)] = v;
                if overflow {
                    bus.sfr[idx(REG_TCON)] |= TCON_TF0;
                    self.need_interrupt_dispatch = true;
                }
            }

            let run1 = tmod & TMOD_GATE_1 == 0 && tcon & TCON_TR1 != 0;
            let inc1 = run1
                && if tmod & TMOD_CT_1 != 0 {
                    falling & PIN_T1 != 0
                } else {
                    tick12
                };
            if inc1 {
                let (v, overflow) = bus.sfr[idx(REG_TH0)].overflowing_add(1);
                bus.sfr[idx(REG_TH0)] = v;
                if overflow {
                    bus.sfr[idx(REG_TCON)] |= TCON_TF1;
                    self.need_interrupt_dispatch = true;
                }
            }
        } else {
            // Timer 0, modes 0..2
            let run = tmod & TMOD_GATE_0 == 0 && tcon & TCON_TR0 != 0;
            let increment = run
                && if tmod & TMOD_CT_0 != 0 {
                    falling & PIN_T0 != 0
                } else {
                    tick12
                };
            if increment && self.count_timer01(bus, tmod & (TMOD_M0_0 | TMOD_M1_0), REG_TL0, REG_TH0)
            {
                bus.sfr[idx(REG_TCON)] |= TCON_TF0;
                self.need_interrupt_dispatch = true;
            }
        }

        // Timer 1. While timer 0 is in mode 3 this still counts, but its
        // overflow flag is taken over by TH0 above.
        {
            let run = tmod & TMOD_GATE_1 == 0 && tcon & TCON_TR1 != 0;
            let increment = run
                && if tmod & TMOD_CT_1 != 0 {
                    falling & PIN_T1 != 0
                } else {
                    tick12
                };
            let mode = (tmod & (TMOD_M0_1 | TMOD_M1_1)) >> 4;
            if mode != 3
                && increment
                && self.count_timer01(bus, mode, REG_TL1, REG_TH1)
                && !t0_mode3
            {
                bus.sfr[idx(REG_TCON)] |= TCON_TF1;
                self.need_interrupt_dispatch = true;
            }
        }

        self.timer2_tick(bus, falling, tick12);
    }

    /// Advance a 13/16-bit or auto-reload counter; true on overflow
    fn count_timer01(&mut self, bus: &mut Bus, mode: u8, tl: u8, th: u8) -> bool {
        match mode {
            // 13-bit: 5 bits of TL cascade into TH
            0 => {
                let low = (bus.sfr[idx(tl)] & 0x1F) + 1;
                bus.sfr[idx(tl)] = (bus.sfr[idx(tl)] & !0x1F) | (low & 0x1F);
                if low > 0x1F {
                    let (v, overflow) = bus.sfr[idx(th)].overflowing_add(1);
                    bus.sfr[idx(th)] = v;
                    return overflow;
                }
                false
            }
            // 16-bit
            1 => {
                let (low, carry) = bus.sfr[idx(tl)].overflowing_add(1);
                bus.sfr[idx(tl)] = low;
                if carry {
                    let (v, overflow) = bus.sfr[idx(th)].overflowing_add(1);
                    bus.sfr[idx(th)] = v;
                    return overflow;
                }
                false
            }
            // 8-bit auto-reload from TH
            2 => {
                let (low, overflow) = bus.sfr[idx(tl)].overflowing_add(1);
                bus.sfr[idx(tl)] = if overflow { bus.sfr[idx(th)] } else { low };
                overflow
            }
            _ => false,
        }
    }

    fn timer2_tick(&mut self, bus: &mut Bus, falling: u8, tick12: bool) {
        let mut tick24 = false;
        if tick12 {
            self.prescaler24 += 1;
            if self.prescaler24 == 2 {
                tick24 = true;
                self.prescaler24 = 0;
            }
        }

        let t2con = bus.sfr[idx(REG_T2CON)];
        let t2_clk = if t2con & 0x80 != 0 { tick24 } else { tick12 };

        let increment = match t2con & 0x03 {
            0 => false,
            1 => t2_clk,
            2 => falling & PIN_T2 != 0,
            _ => t2_clk && self.t012 & PIN_T2 != 0,
        };
        if !increment {
            return;
        }

        let (low, carry) = bus.sfr[idx(REG_TL2)].overflowing_add(1);
        bus.sfr[idx(REG_TL2)] = low;
        if !carry {
            return;
        }

        let (high, overflow) = bus.sfr[idx(REG_TH2)].overflowing_add(1);
        bus.sfr[idx(REG_TH2)] = high;
        if !overflow {
            return;
        }

        // Reload mode 0 refills from the CRC pair; mode 1 (t2ex capture)
        // is not modelled
        if t2con & 0x18 == 0x10 {
            bus.sfr[idx(REG_TL2)] = bus.sfr[idx(REG_CRCL)];
            bus.sfr[idx(REG_TH2)] = bus.sfr[idx(REG_CRCH)];
        }

        bus.sfr[idx(REG_IRCON)] |= IRCON_TF2;
        self.need_interrupt_dispatch = true;
    }

    /// Synthesize CLKLF edges from the machine tick
    fn clklf_synthesis(&mut self, bus: &mut Bus) {
        let clklf = bus.sfr[idx(REG_CLKLFCTRL)];
        match clklf & CLKLF_SOURCE_MASK {
            CLKLF_SRC_NONE => {
                // Clock stopped; fatal for an armed watchdog
                if bus.wdt.enabled {
                    self.except(Exception::ClklfError);
                }
            }

            CLKLF_SRC_RC | CLKLF_SRC_SYNTH => {
                if self.prescaler_lf > 0 {
                    self.prescaler_lf -= 1;
                    return;
                }
                self.prescaler_lf = 20;

                let mut clklf = clklf;
                clklf |= CLKLF_XOSC16M | CLKLF_READY;
                clklf ^= CLKLF_PHASE;
                bus.sfr[idx(REG_CLKLFCTRL)] = clklf;

                if clklf & CLKLF_PHASE != 0 {
                    self.clklf_tick(bus);
                }
            }

            _ => self.except(Exception::ClklfError),
        }
    }

    /// One 32 kHz tick: watchdog countdown and RTC2
    fn clklf_tick(&mut self, bus: &mut Bus) {
        if bus.wdt.enabled {
            let wdt = bus.wdt.counter.wrapping_sub(1) & 0xFFFFFF;
            bus.wdt.counter = wdt;
            if wdt == 0 {
                log::info!("cube {}: watchdog reset", self.id);
                self.reset(bus, false);
                return;
            }
        }

        let rtc2con = bus.sfr[idx(REG_RTC2CON)];
        if rtc2con & RTC2CON_ENABLE != 0 {
            let mut rtc2 = self.rtc2.wrapping_add(1);

            if rtc2con & RTC2CON_COMPARE_EN != 0 {
                let cmp = bus.sfr[idx(REG_RTC2CMP0)] as u16
                    | ((bus.sfr[idx(REG_RTC2CMP1)] as u16) << 8);
                if cmp == rtc2 {
                    bus.sfr[idx(REG_IRCON)] |= IRCON_TICK;
                    self.need_interrupt_dispatch = true;
                    if rtc2con & RTC2CON_COMPARE_RST != 0 {
                        rtc2 = 0;
                    }
                }
            }

            self.rtc2 = rtc2;
        } else {
            self.rtc2 = 0;
        }
    }
}
