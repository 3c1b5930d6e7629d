//! Special function register map
//!
//! Addresses and bit masks for the nRF24LE1-style SFR block at 0x80..0xFF.
//! Only registers the emulator acts on are named; everything else behaves
//! as plain latched memory.

/// Index into the 128-byte SFR array for a register address
#[inline]
pub fn idx(reg: u8) -> usize {
    debug_assert!(reg >= 0x80);
    (reg & 0x7F) as usize
}

// I/O ports and direction registers (direction bit 1 = input)
pub const REG_P0: u8 = 0x80;
pub const REG_P1: u8 = 0x90;
pub const REG_P2: u8 = 0xA0;
pub const REG_P3: u8 = 0xB0;
pub const REG_P0DIR: u8 = 0x93;
pub const REG_P1DIR: u8 = 0x94;
pub const REG_P2DIR: u8 = 0x95;
pub const REG_P3DIR: u8 = 0x96;

// Core registers
pub const REG_SP: u8 = 0x81;
pub const REG_DPL: u8 = 0x82;
pub const REG_DPH: u8 = 0x83;
pub const REG_DPL1: u8 = 0x84;
pub const REG_DPH1: u8 = 0x85;
pub const REG_PCON: u8 = 0x87;
pub const REG_DPS: u8 = 0x92;
pub const REG_PSW: u8 = 0xD0;
pub const REG_ACC: u8 = 0xE0;
pub const REG_B: u8 = 0xF0;

// Timers
pub const REG_TCON: u8 = 0x88;
pub const REG_TMOD: u8 = 0x89;
pub const REG_TL0: u8 = 0x8A;
pub const REG_TL1: u8 = 0x8B;
pub const REG_TH0: u8 = 0x8C;
pub const REG_TH1: u8 = 0x8D;
pub const REG_T2CON: u8 = 0xC8;
pub const REG_CRCL: u8 = 0xCA;
pub const REG_CRCH: u8 = 0xCB;
pub const REG_TL2: u8 = 0xCC;
pub const REG_TH2: u8 = 0xCD;

// Interrupt control
pub const REG_IEN0: u8 = 0xA8;
pub const REG_IP0: u8 = 0xA9;
pub const REG_IEN1: u8 = 0xB8;
pub const REG_IP1: u8 = 0xB9;
pub const REG_IRCON: u8 = 0xC0;

// Power, clocks, watchdog
pub const REG_PWRDWN: u8 = 0xA1;
pub const REG_CLKLFCTRL: u8 = 0xAD;
pub const REG_WDSV: u8 = 0xAF;

// RTC2 (32 kHz real-time counter)
pub const REG_RTC2CON: u8 = 0xA3;
pub const REG_RTC2CMP0: u8 = 0xA4;
pub const REG_RTC2CMP1: u8 = 0xA5;

// ADC
pub const REG_ADCCON3: u8 = 0xD1;
pub const REG_ADCCON2: u8 = 0xD2;
pub const REG_ADCCON1: u8 = 0xD3;
pub const REG_ADCDATH: u8 = 0xD4;
pub const REG_ADCDATL: u8 = 0xD5;

// Random number generator
pub const REG_RNGCTL: u8 = 0xD6;
pub const REG_RNGDAT: u8 = 0xD7;

// 2-wire (I2C) master
pub const REG_W2SADR: u8 = 0xD9;
pub const REG_W2DAT: u8 = 0xDA;
pub const REG_W2CON1: u8 = 0xE1;
pub const REG_W2CON0: u8 = 0xE2;

// Radio SPI master and radio control
pub const REG_SPIRCON0: u8 = 0xE4;
pub const REG_SPIRCON1: u8 = 0xE5;
pub const REG_SPIRSTAT: u8 = 0xE6;
pub const REG_SPIRDAT: u8 = 0xE7;
pub const REG_RFCON: u8 = 0xE8;

// Multiply/divide unit
pub const REG_MD0: u8 = 0xE9;
pub const REG_MD1: u8 = 0xEA;
pub const REG_MD2: u8 = 0xEB;
pub const REG_MD3: u8 = 0xEC;
pub const REG_MD4: u8 = 0xED;
pub const REG_MD5: u8 = 0xEE;
pub const REG_ARCON: u8 = 0xEF;

// PSW bits
pub const PSW_CY: u8 = 0x80;
pub const PSW_AC: u8 = 0x40;
pub const PSW_F0: u8 = 0x20;
pub const PSW_RS_MASK: u8 = 0x18;
pub const PSW_OV: u8 = 0x04;
pub const PSW_P: u8 = 0x01;

// TCON bits
pub const TCON_TF1: u8 = 0x80;
pub const TCON_TR1: u8 = 0x40;
pub const TCON_TF0: u8 = 0x20;
pub const TCON_TR0: u8 = 0x10;
pub const TCON_IE1: u8 = 0x08;
pub const TCON_IT1: u8 = 0x04;
pub const TCON_IE0: u8 = 0x02;
pub const TCON_IT0: u8 = 0x01;

// TMOD bits
pub const TMOD_M0_0: u8 = 0x01;
pub const TMOD_M1_0: u8 = 0x02;
pub const TMOD_CT_0: u8 = 0x04;
pub const TMOD_GATE_0: u8 = 0x08;
pub const TMOD_M0_1: u8 = 0x10;
pub const TMOD_M1_1: u8 = 0x20;
pub const TMOD_CT_1: u8 = 0x40;
pub const TMOD_GATE_1: u8 = 0x80;

// IEN0 bits (shared layout with IP0)
pub const IEN0_EA: u8 = 0x80;
pub const IEN0_IFP: u8 = 0x01;
pub const IEN0_TF0: u8 = 0x02;
pub const IEN0_POF: u8 = 0x04;
pub const IEN0_TF1: u8 = 0x08;
pub const IEN0_SER: u8 = 0x10;
pub const IEN0_TF2: u8 = 0x20;

// IEN1 bits (shared layout with IP1 and IRCON bits 0..5)
pub const IEN1_RFSPI: u8 = 0x01;
pub const IEN1_RF: u8 = 0x02;
pub const IEN1_SPI: u8 = 0x04;
pub const IEN1_WUOP: u8 = 0x08;
pub const IEN1_MISC: u8 = 0x10;
pub const IEN1_TICK: u8 = 0x20;

// IRCON bits
pub const IRCON_RFSPI: u8 = 0x01;
pub const IRCON_RF: u8 = 0x02;
pub const IRCON_SPI: u8 = 0x04;
pub const IRCON_WUOP: u8 = 0x08;
pub const IRCON_MISC: u8 = 0x10;
pub const IRCON_TICK: u8 = 0x20;
pub const IRCON_TF2: u8 = 0x40;
pub const IRCON_EXF2: u8 = 0x80;

// PWRDWN modes
pub const PWRDWN_MODE_MASK: u8 = 0x07;
pub const PWRDWN_OFF: u8 = 0x01;
pub const PWRDWN_DEEP_SLEEP: u8 = 0x02;
pub const PWRDWN_MEMORY: u8 = 0x03;
pub const PWRDWN_MEMORY_TIMERS: u8 = 0x04;
pub const PWRDWN_STANDBY: u8 = 0x05;

// CLKLFCTRL fields
pub const CLKLF_SOURCE_MASK: u8 = 0x07;
pub const CLKLF_SRC_NONE: u8 = 0x00;
pub const CLKLF_SRC_RC: u8 = 0x01;
pub const CLKLF_SRC_SYNTH: u8 = 0x07;
pub const CLKLF_XOSC16M: u8 = 0x08;
pub const CLKLF_PHASE: u8 = 0x40;
pub const CLKLF_READY: u8 = 0x80;

// RTC2CON bits
pub const RTC2CON_ENABLE: u8 = 0x01;
pub const RTC2CON_COMPARE_EN: u8 = 0x02;
pub const RTC2CON_COMPARE_RST: u8 = 0x04;

// RFCON bits
pub const RFCON_RFCE: u8 = 0x01;
pub const RFCON_RFCSN: u8 = 0x02;
pub const RFCON_RFCKEN: u8 = 0x04;

// Timer count inputs sampled from the MISC port
pub const PORT_T012: u8 = REG_P1;
pub const PIN_T0: u8 = 0x04;
pub const PIN_T1: u8 = 0x40;
pub const PIN_T2: u8 = 0x10;

// Interrupt vectors
pub const NUM_IRQ: usize = 12;
pub const VECTOR_BASE_IEN0: u16 = 0x0003;
pub const VECTOR_BASE_IEN1: u16 = 0x0043;
