//! Entry table records.
//!
//! The first `file_count * PKG_ENTRY_SIZE` bytes of the data region
//! hold the encrypted directory of the archive. Decoded once into an
//! array of [`PkgEntry`] records and never mutated afterwards.

use byteorder::{BigEndian, ReadBytesExt};
use std::io::Cursor;

use crate::error::{Error, Result};

/// On-disk size of one entry record.
pub const PKG_ENTRY_SIZE: usize = 32;

/// File-category type codes.
pub const PKG_FILE_ENTRY_NPDRM: u32 = 0x1;
pub const PKG_FILE_ENTRY_NPDRMEDAT: u32 = 0x2;
pub const PKG_FILE_ENTRY_REGULAR: u32 = 0x3;
pub const PKG_FILE_ENTRY_FOLDER: u32 = 0x4;
pub const PKG_FILE_ENTRY_UNK0: u32 = 0x5;
pub const PKG_FILE_ENTRY_UNK1: u32 = 0x6;
pub const PKG_FILE_ENTRY_SDAT: u32 = 0x9;

/// Flag bit: entry payload and name are keyed with the PSP key.
pub const PKG_FILE_ENTRY_PSP: u32 = 0x1000_0000;

/// Flag bit: entry may replace an existing file.
pub const PKG_FILE_ENTRY_OVERWRITE: u32 = 0x8000_0000;

/// How an entry is materialised on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryCategory {
    File,
    Directory,
    Unknown,
}

/// One directory-table record.
#[derive(Debug, Clone)]
pub struct PkgEntry {
    /// Offset of the encrypted name within the data region.
    pub name_offset: u32,
    /// Length of the encrypted name in bytes.
    pub name_size: u32,
    /// Offset of the payload within the data region.
    pub file_offset: u64,
    /// Payload size in bytes.
    pub file_size: u64,
    /// Category code in the low byte plus flag bits.
    pub entry_type: u32,
    pub pad: u32,
}

impl PkgEntry {
    /// Deserialise `count` fixed-size records from a decrypted table.
    pub fn decode_table(data: &[u8], count: u32) -> Result<Vec<Self>> {
        let need = count as usize * PKG_ENTRY_SIZE;
        if data.len() < need {
            return Err(Error::Truncated {
                expected: need as u64,
                actual: data.len() as u64,
            });
        }

        let mut cursor = Cursor::new(data);
        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            entries.push(Self {
                name_offset: cursor.read_u32::<BigEndian>()?,
                name_size: cursor.read_u32::<BigEndian>()?,
                file_offset: cursor.read_u64::<BigEndian>()?,
                file_size: cursor.read_u64::<BigEndian>()?,
                entry_type: cursor.read_u32::<BigEndian>()?,
                pad: cursor.read_u32::<BigEndian>()?,
            });
        }
        Ok(entries)
    }

    /// Whether the entry is keyed with the PSP key.
    pub fn is_psp(&self) -> bool {
        self.entry_type & PKG_FILE_ENTRY_PSP != 0
    }

    /// Whether the entry may replace an existing file.
    pub fn overwrite(&self) -> bool {
        self.entry_type & PKG_FILE_ENTRY_OVERWRITE != 0
    }

    /// Category from the low byte of the type field.
    ///
    /// Beyond the named codes, a handful of reserved codes observed in
    /// real packages are treated as plain files (and 0x12 as a
    /// directory).
    pub fn category(&self) -> EntryCategory {
        match self.entry_type & 0xFF {
            PKG_FILE_ENTRY_NPDRM
            | PKG_FILE_ENTRY_NPDRMEDAT
            | PKG_FILE_ENTRY_REGULAR
            | PKG_FILE_ENTRY_UNK0
            | PKG_FILE_ENTRY_UNK1
            | PKG_FILE_ENTRY_SDAT
            | 0xE
            | 0x10
            | 0x11
            | 0x13
            | 0x15
            | 0x16
            | 0x19 => EntryCategory::File,
            PKG_FILE_ENTRY_FOLDER | 0x12 => EntryCategory::Directory,
            _ => EntryCategory::Unknown,
        }
    }
}
