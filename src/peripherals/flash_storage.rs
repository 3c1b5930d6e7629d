//! Flash backing storage
//!
//! The 4 MiB array plus per-sector erase counters, optionally bound to an
//! on-disk file so asset state and wear statistics survive across runs.
//! The file layout is a little-endian header followed by the counters and
//! the raw array; load and save round-trip exactly.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::flash_model;

const MAGIC: &[u8; 8] = b"CUBEFLSH";
const VERSION: u32 = 1;
const HEADER_LEN: usize = MAGIC.len() + 4;
const COUNTS_LEN: usize = flash_model::NUM_SECTORS * 4;
const FILE_LEN: usize = HEADER_LEN + COUNTS_LEN + flash_model::SIZE;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("flash file I/O: {0}")]
    Io(#[from] io::Error),
    #[error("not a flash image (bad magic)")]
    BadMagic,
    #[error("unsupported flash image version {0}")]
    BadVersion(u32),
    #[error("flash image truncated ({0} bytes)")]
    Truncated(usize),
}

/// Byte array and wear counters for one cube's external flash
#[derive(Debug, Clone)]
pub struct FlashStorage {
    /// The NOR array; a fresh part reads all 0xFF
    pub data: Vec<u8>,
    /// Erase operations applied to each 64 KiB sector
    pub erase_counts: Vec<u32>,
    path: Option<PathBuf>,
}

impl FlashStorage {
    /// A fresh, unbound part
    pub fn new() -> Self {
        Self {
            data: vec![0xFF; flash_model::SIZE],
            erase_counts: vec![0; flash_model::NUM_SECTORS],
            path: None,
        }
    }

    /// Bind to a backing file, loading it if it already exists
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let mut storage = if path.exists() {
            Self::load(path)?
        } else {
            Self::new()
        };
        storage.path = Some(path.to_owned());
        Ok(storage)
    }

    /// Parse a flash image file
    pub fn load(path: &Path) -> Result<Self, StorageError> {
        let bytes = fs::read(path)?;
        if bytes.len() < HEADER_LEN {
            return Err(StorageError::Truncated(bytes.len()));
        }
        if &bytes[..8] != MAGIC {
            return Err(StorageError::BadMagic);
        }
        let version = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
        if version != VERSION {
            return Err(StorageError::BadVersion(version));
        }
        if bytes.len() < FILE_LEN {
            return Err(StorageError::Truncated(bytes.len()));
        }

        let mut erase_counts = Vec::with_capacity(flash_model::NUM_SECTORS);
        for chunk in bytes[HEADER_LEN..HEADER_LEN + COUNTS_LEN].chunks_exact(4) {
            erase_counts.push(u32::from_le_bytes(chunk.try_into().unwrap()));
        }

        Ok(Self {
            data: bytes[HEADER_LEN + COUNTS_LEN..FILE_LEN].to_vec(),
            erase_counts,
            path: Some(path.to_owned()),
        })
    }

    /// Write the image back to the bound file, if any
    pub fn save(&self) -> Result<(), StorageError> {
        match &self.path {
            Some(path) => self.save_to(path),
            None => Ok(()),
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<(), StorageError> {
        let mut bytes = Vec::with_capacity(FILE_LEN);
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&VERSION.to_le_bytes());
        for count in &self.erase_counts {
            bytes.extend_from_slice(&count.to_le_bytes());
        }
        bytes.extend_from_slice(&self.data);
        fs::write(path, bytes)?;
        Ok(())
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl Default for FlashStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_part_is_blank() {
        let storage = FlashStorage::new();
        assert!(storage.data.iter().all(|&b| b == 0xFF));
        assert!(storage.erase_counts.iter().all(|&c| c == 0));
    }

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flash.bin");

        let mut storage = FlashStorage::new();
        storage.data[0x12345] = 0x42;
        storage.data[flash_model::SIZE - 1] = 0x01;
        storage.erase_counts[3] = 7;
        storage.save_to(&path).unwrap();

        let loaded = FlashStorage::load(&path).unwrap();
        assert_eq!(loaded.data, storage.data);
        assert_eq!(loaded.erase_counts, storage.erase_counts);
    }

    #[test]
    fn test_open_creates_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.bin");
        let storage = FlashStorage::open(&path).unwrap();
        assert_eq!(storage.path(), Some(path.as_path()));
        assert!(storage.data.iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn test_bad_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bogus.bin");
        std::fs::write(&path, b"NOTFLASHxxxxxxxxxxx").unwrap();
        assert!(matches!(
            FlashStorage::load(&path),
            Err(StorageError::BadMagic)
        ));
    }

    #[test]
    fn test_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.bin");
        let mut bytes = Vec::new();
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&VERSION.to_le_bytes());
        std::fs::write(&path, bytes).unwrap();
        assert!(matches!(
            FlashStorage::load(&path),
            Err(StorageError::Truncated(_))
        ));
    }
}
