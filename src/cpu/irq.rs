//! Interrupt dispatch
//!
//! Twelve sources: the six classic IEN0 interrupts (vectors 0x0003 + 8n)
//! and the six vendor IEN1 sources latched in IRCON (vectors 0x0043 + 8n).
//! Per-source priority comes from the paired IP1:IP0 bits. Only one
//! outstanding interrupt is accepted; a second request waits for RETI.
//!
//! On dispatch the core snapshots PSW, SP, ACC, both data pointers and the
//! active register bank. RETI verifies the snapshot and reports any
//! clobbered state as the matching exception kind, since firmware bugs of
//! this class are otherwise nearly impossible to catch in a simulator.

use super::sfr::*;
use super::{Cpu, Exception, IrqFrame};
use crate::bus::Bus;

/// One interrupt source: enable/priority bit and pending flag location
struct IrqSource {
    /// Bit within IEN0/IEN1 (and IP0/IP1)
    mask: u8,
    /// Register holding the pending flag
    pending_reg: u8,
    /// Pending flag mask, 0 for sources with no modelled peripheral
    pending_mask: u8,
    /// Hardware clears the flag when vectoring (classic timer flags only)
    auto_clear: bool,
}

/// IEN0 sources, vector = 0x0003 + 8 * position
const IEN0_SOURCES: [IrqSource; 6] = [
    // External interrupt pin
    IrqSource { mask: IEN0_IFP, pending_reg: REG_TCON, pending_mask: TCON_IE0, auto_clear: true },
    IrqSource { mask: IEN0_TF0, pending_reg: REG_TCON, pending_mask: TCON_TF0, auto_clear: true },
    // Power failure: not modelled
    IrqSource { mask: IEN0_POF, pending_reg: REG_TCON, pending_mask: 0, auto_clear: false },
    IrqSource { mask: IEN0_TF1, pending_reg: REG_TCON, pending_mask: TCON_TF1, auto_clear: true },
    // Serial port: not modelled
    IrqSource { mask: IEN0_SER, pending_reg: REG_TCON, pending_mask: 0, auto_clear: false },
    IrqSource { mask: IEN0_TF2, pending_reg: REG_IRCON, pending_mask: IRCON_TF2, auto_clear: false },
];

/// IEN1 sources, vector = 0x0043 + 8 * position; pending bits live in IRCON
const IEN1_SOURCES: [IrqSource; 6] = [
    IrqSource { mask: IEN1_RFSPI, pending_reg: REG_IRCON, pending_mask: IRCON_RFSPI, auto_clear: false },
    IrqSource { mask: IEN1_RF, pending_reg: REG_IRCON, pending_mask: IRCON_RF, auto_clear: false },
    IrqSource { mask: IEN1_SPI, pending_reg: REG_IRCON, pending_mask: IRCON_SPI, auto_clear: false },
    IrqSource { mask: IEN1_WUOP, pending_reg: REG_IRCON, pending_mask: IRCON_WUOP, auto_clear: false },
    IrqSource { mask: IEN1_MISC, pending_reg: REG_IRCON, pending_mask: IRCON_MISC, auto_clear: false },
    IrqSource { mask: IEN1_TICK, pending_reg: REG_IRCON, pending_mask: IRCON_TICK, auto_clear: false },
];

impl Cpu {
    /// Try to vector the highest-priority pending interrupt
    ///
    /// Called at instruction boundaries while `need_interrupt_dispatch` is
    /// set and no interrupt is outstanding.
    pub(super) fn dispatch_irq(&mut self, bus: &mut Bus) {
        self.need_interrupt_dispatch = false;

        let ien0 = bus.sfr[idx(REG_IEN0)];
        if ien0 & IEN0_EA == 0 {
            return;
        }
        let ien1 = bus.sfr[idx(REG_IEN1)];
        let ip0 = bus.sfr[idx(REG_IP0)];
        let ip1 = bus.sfr[idx(REG_IP1)];

        let mut best: Option<(u8, usize)> = None;
        for (i, src) in IEN0_SOURCES.iter().chain(IEN1_SOURCES.iter()).enumerate() {
            let enable = if i < 6 { ien0 } else { ien1 };
            if enable & src.mask == 0 || src.pending_mask == 0 {
                continue;
            }
            if bus.sfr[idx(src.pending_reg)] & src.pending_mask == 0 {
                continue;
            }

            let prio_bit = (i % 6) as u8;
            let prio = (((ip1 >> prio_bit) & 1) << 1) | ((ip0 >> prio_bit) & 1);
            match best {
                Some((p, _)) if p >= prio => {}
                _ => best = Some((prio, i)),
            }
        }

        let Some((_, index)) = best else {
            return;
        };
        let src = if index < 6 {
            &IEN0_SOURCES[index]
        } else {
            &IEN1_SOURCES[index - 6]
        };

        self.irq_frame = self.snapshot(bus);
        self.irq_count += 1;

        if src.auto_clear {
            bus.sfr[idx(src.pending_reg)] &= !src.pending_mask;
        }

        let pc = self.pc;
        self.push(bus, pc as u8);
        self.push(bus, (pc >> 8) as u8);

        self.pc = if index < 6 {
            VECTOR_BASE_IEN0 + 8 * index as u16
        } else {
            VECTOR_BASE_IEN1 + 8 * (index - 6) as u16
        };

        // Vectoring costs an LCALL
        self.tick_delay += 2;
    }

    /// RETI: return and verify that the ISR preserved machine state
    pub(super) fn reti(&mut self, bus: &mut Bus) {
        let hi = self.pop(bus);
        let lo = self.pop(bus);
        self.pc = ((hi as u16) << 8) | lo as u16;

        if self.irq_count == 0 {
            // Stray RETI behaves like RET
            return;
        }
        self.irq_count -= 1;

        let frame = self.irq_frame;
        if bus.sfr[idx(REG_PSW)] != frame.psw {
            self.except(Exception::PswNotPreserved);
        }
        if bus.sfr[idx(REG_SP)] != frame.sp {
            self.except(Exception::SpNotPreserved);
        }
        if bus.sfr[idx(REG_ACC)] != frame.acc {
            self.except(Exception::AccNotPreserved);
        }
        let dptr = [
            bus.sfr[idx(REG_DPL)],
            bus.sfr[idx(REG_DPH)],
            bus.sfr[idx(REG_DPL1)],
            bus.sfr[idx(REG_DPH1)],
        ];
        if dptr != frame.dptr || bus.sfr[idx(REG_DPS)] != frame.dps {
            self.except(Exception::DptrNotPreserved);
        }
        let bank = (frame.psw & PSW_RS_MASK) as usize;
        if bus.data[bank..bank + 8] != frame.regs {
            self.except(Exception::RegsNotPreserved);
        }

        // Another source may already be waiting
        self.need_interrupt_dispatch = true;
    }

    fn snapshot(&self, bus: &Bus) -> IrqFrame {
        let psw = bus.sfr[idx(REG_PSW)];
        let bank = (psw & PSW_RS_MASK) as usize;
        let mut regs = [0u8; 8];
        regs.copy_from_slice(&bus.data[bank..bank + 8]);

        IrqFrame {
            psw,
            sp: bus.sfr[idx(REG_SP)],
            acc: bus.sfr[idx(REG_ACC)],
            dptr: [
                bus.sfr[idx(REG_DPL)],
                bus.sfr[idx(REG_DPH)],
                bus.sfr[idx(REG_DPL1)],
                bus.sfr[idx(REG_DPH1)],
            ],
            dps: bus.sfr[idx(REG_DPS)],
            regs,
        }
    }
}
