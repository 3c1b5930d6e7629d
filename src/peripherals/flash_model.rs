//! Flash part model
//!
//! Geometry, timing and command patterns for the emulated NOR part, kept
//! apart from the state machine so another part can be dropped in. The
//! emulated chip is a 4Mx8 NOR with AMD-style unlock sequences, 64 KiB
//! sectors grouped eight to a block, and typical datasheet timings.

/// Total array size: 4 MiB
pub const SIZE: usize = 4 * 1024 * 1024;

/// Erase sector: 64 KiB
pub const SECTOR_SIZE: usize = 64 * 1024;

/// Erase block: 8 sectors
pub const BLOCK_SIZE: usize = 8 * SECTOR_SIZE;

/// Number of sectors tracked by the erase counters
pub const NUM_SECTORS: usize = SIZE / SECTOR_SIZE;

// Status byte returned while the part is busy
/// Inverted bit 7 of the data being programmed
pub const STATUS_DATA_INV: u8 = 0x80;
/// Toggles on every status poll during any busy state
pub const STATUS_TOGGLE: u8 = 0x40;
/// Additionally toggles while erasing
pub const STATUS_ERASE_TOGGLE: u8 = 0x04;

// Typical program/erase durations
pub const PROGRAM_TIME_US: u64 = 6;
pub const ERASE_SECTOR_TIME_US: u64 = 18_000;
pub const ERASE_BLOCK_TIME_US: u64 = 30_000;
pub const ERASE_CHIP_TIME_US: u64 = 40_000;

/// Write cycles examined by the command matcher
pub const CMD_LENGTH: usize = 6;

/// One step of a command pattern, matched against a `{addr, data}` write
#[derive(Debug, Clone, Copy)]
pub struct CommandStep {
    pub addr_mask: u16,
    pub addr: u16,
    pub data_mask: u8,
    pub data: u8,
}

const fn step(addr_mask: u16, addr: u16, data_mask: u8, data: u8) -> CommandStep {
    CommandStep {
        addr_mask,
        addr,
        data_mask,
        data,
    }
}

pub const CMD_BYTE_PROGRAM: [CommandStep; CMD_LENGTH] = [
    step(0x000, 0x000, 0x00, 0x00), // Don't care
    step(0x000, 0x000, 0x00, 0x00), // Don't care
    step(0xFFF, 0xAAA, 0xFF, 0xAA), // Unlock
    step(0xFFF, 0x555, 0xFF, 0x55), //   ...
    step(0xFFF, 0xAAA, 0xFF, 0xA0), //   ...
    step(0x000, 0x000, 0x00, 0x00), // Data address/byte
];

pub const CMD_SECTOR_ERASE: [CommandStep; CMD_LENGTH] = [
    step(0xFFF, 0xAAA, 0xFF, 0xAA), // Unlock
    step(0xFFF, 0x555, 0xFF, 0x55), //   ...
    step(0xFFF, 0xAAA, 0xFF, 0x80), //   ...
    step(0xFFF, 0xAAA, 0xFF, 0xAA), //   ...
    step(0xFFF, 0x555, 0xFF, 0x55), //   ...
    step(0x000, 0x000, 0xFF, 0x30), // Erase address
];

pub const CMD_BLOCK_ERASE: [CommandStep; CMD_LENGTH] = [
    step(0xFFF, 0xAAA, 0xFF, 0xAA), // Unlock
    step(0xFFF, 0x555, 0xFF, 0x55), //   ...
    step(0xFFF, 0xAAA, 0xFF, 0x80), //   ...
    step(0xFFF, 0xAAA, 0xFF, 0xAA), //   ...
    step(0xFFF, 0x555, 0xFF, 0x55), //   ...
    step(0x000, 0x000, 0xFF, 0x50), // Erase address
];

pub const CMD_CHIP_ERASE: [CommandStep; CMD_LENGTH] = [
    step(0xFFF, 0xAAA, 0xFF, 0xAA), // Unlock
    step(0xFFF, 0x555, 0xFF, 0x55), //   ...
    step(0xFFF, 0xAAA, 0xFF, 0x80), //   ...
    step(0xFFF, 0xAAA, 0xFF, 0xAA), //   ...
    step(0xFFF, 0x555, 0xFF, 0x55), //   ...
    step(0xFFF, 0xAAA, 0xFF, 0x10), // Confirm
];

/// The erase unlock with an open final step; a window matching this but
/// none of the full patterns is a malformed command
pub const CMD_ERASE_PREFIX: [CommandStep; CMD_LENGTH] = [
    step(0xFFF, 0xAAA, 0xFF, 0xAA),
    step(0xFFF, 0x555, 0xFF, 0x55),
    step(0xFFF, 0xAAA, 0xFF, 0x80),
    step(0xFFF, 0xAAA, 0xFF, 0xAA),
    step(0xFFF, 0x555, 0xFF, 0x55),
    step(0x000, 0x000, 0x00, 0x00), // Any final write
];
