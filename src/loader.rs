//! Intel-HEX firmware images
//!
//! Loads `.ihx` files into code memory and writes them back out. Records
//! are `:LL AAAA TT DD.. CC` with a two's-complement checksum over every
//! byte after the colon. Only data (00) and end-of-file (01) records are
//! supported; an EOF record ends parsing wherever it appears.

use std::fs;
use std::io;
use std::path::Path;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot open firmware image: {0}")]
    Open(#[from] io::Error),
    #[error("not an Intel-HEX file")]
    BadFormat,
    #[error("unsupported record type {0:#04x}")]
    UnsupportedRecord(u8),
    #[error("record checksum mismatch at line {0}")]
    BadChecksum(usize),
    #[error("image ends without an end-of-file record")]
    MissingEof,
}

impl LoadError {
    /// Stable negative code for C-style front-ends
    pub fn code(&self) -> i32 {
        match self {
            LoadError::Open(_) => -1,
            LoadError::BadFormat => -2,
            LoadError::UnsupportedRecord(_) => -3,
            LoadError::BadChecksum(_) => -4,
            LoadError::MissingEof => -5,
        }
    }
}

/// Load an image file into `code`
pub fn load_ihx(path: &Path, code: &mut [u8]) -> Result<(), LoadError> {
    let text = fs::read_to_string(path)?;
    load_ihx_str(&text, code)
}

/// Parse Intel-HEX text into `code`
pub fn load_ihx_str(text: &str, code: &mut [u8]) -> Result<(), LoadError> {
    if !text.starts_with(':') {
        return Err(LoadError::BadFormat);
    }

    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let record = line.strip_prefix(':').ok_or(LoadError::BadFormat)?;

        let bytes = parse_hex_bytes(record)?;
        if bytes.len() < 5 {
            return Err(LoadError::BadFormat);
        }

        let length = bytes[0] as usize;
        let address = ((bytes[1] as usize) << 8) | bytes[2] as usize;
        let record_type = bytes[3];
        if bytes.len() != length + 5 {
            return Err(LoadError::BadFormat);
        }

        let sum: u8 = bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
        if sum != 0 {
            return Err(LoadError::BadChecksum(line_no + 1));
        }

        match record_type {
            0x00 => {
                for (i, &byte) in bytes[4..4 + length].iter().enumerate() {
                    let dest = (address + i) % code.len();
                    code[dest] = byte;
                }
            }
            // EOF stops parsing even mid-file
            0x01 => return Ok(()),
            other => return Err(LoadError::UnsupportedRecord(other)),
        }
    }

    Err(LoadError::MissingEof)
}

/// Write `code` as Intel-HEX, 16 bytes per record
pub fn save_ihx(path: &Path, code: &[u8]) -> io::Result<()> {
    let mut out = String::with_capacity(code.len() * 3);
    for (chunk_index, chunk) in code.chunks(16).enumerate() {
        let address = chunk_index * 16;
        let mut sum = chunk.len() as u8;
        sum = sum
            .wrapping_add((address >> 8) as u8)
            .wrapping_add(address as u8);

        out.push(':');
        out.push_str(&format!("{:02X}{:04X}00", chunk.len(), address));
        for &byte in chunk {
            out.push_str(&format!("{:02X}", byte));
            sum = sum.wrapping_add(byte);
        }
        out.push_str(&format!("{:02X}\n", sum.wrapping_neg()));
    }
    out.push_str(":00000001FF\n");
    fs::write(path, out)
}

fn parse_hex_bytes(record: &str) -> Result<Vec<u8>, LoadError> {
    if record.len() % 2 != 0 {
        return Err(LoadError::BadFormat);
    }
    record
        .as_bytes()
        .chunks(2)
        .map(|pair| {
            let text = std::str::from_utf8(pair).map_err(|_| LoadError::BadFormat)?;
            u8::from_str_radix(text, 16).map_err(|_| LoadError::BadFormat)
        })
        .collect()
}
