//! PKG header and extended header parsing.

use byteorder::{BigEndian, ReadBytesExt};
use std::io::{Cursor, Read, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use pkg_crypto::Keystream;

use crate::error::{Error, Result};
use crate::stream::MultiVolumeStream;

/// PKG container magic, `\x7FPKG`.
pub const PKG_MAGIC: [u8; 4] = *b"\x7FPKG";

/// Extended header magic, `\x7Fext`.
pub const PKG_EXT_MAGIC: [u8; 4] = *b"\x7Fext";

/// On-disk size of the fixed header.
pub const PKG_HEADER_SIZE: usize = 0xC0;

/// On-disk size of the extended header.
pub const PKG_EXT_HEADER_SIZE: usize = 0x40;

/// Offset of the 9-byte install id within the content id field.
const INSTALL_ID_START: usize = 7;
const INSTALL_ID_LEN: usize = 9;

/// Package build type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PkgType {
    /// Debug package, SHA-1 derived keystream.
    Debug,
    /// Retail package, AES counter-mode keystream.
    Release,
}

impl PkgType {
    fn from_raw(raw: u16) -> Result<Self> {
        match raw {
            0x0000 => Ok(Self::Debug),
            0x8000 => Ok(Self::Release),
            other => Err(Error::UnknownPkgType(other)),
        }
    }
}

/// Target platform of the package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PkgPlatform {
    Ps3,
    PspPsVita,
}

impl PkgPlatform {
    fn from_raw(raw: u16) -> Result<Self> {
        match raw {
            0x0001 => Ok(Self::Ps3),
            0x0002 => Ok(Self::PspPsVita),
            other => Err(Error::UnknownPlatform(other)),
        }
    }
}

/// Fixed PKG header. Immutable once parsed.
#[derive(Debug, Clone)]
pub struct PkgHeader {
    pub pkg_type: PkgType,
    pub platform: PkgPlatform,
    /// Offset of the metadata packet table.
    pub info_offset: u32,
    /// Number of metadata packets.
    pub info_count: u32,
    /// Total header size declared by the package.
    pub header_size: u32,
    /// Number of entry-table records.
    pub file_count: u32,
    /// Declared size of the whole (possibly multi-volume) archive.
    pub pkg_size: u64,
    /// Start of the encrypted data region.
    pub data_offset: u64,
    /// Size of the encrypted data region.
    pub data_size: u64,
    /// Raw 48-byte content id field.
    pub content_id: [u8; 48],
    /// Raw QA digest bytes (two big-endian u64 lanes).
    pub qa_digest: [u8; 16],
    /// Raw licensee value, the retail keystream counter seed.
    pub klicensee: [u8; 16],
}

impl PkgHeader {
    /// Read and validate the fixed header, and the extended header for
    /// PSP/PSVita packages.
    ///
    /// Expects the stream to hold at least the first volume; the
    /// multi-volume check happens afterwards via
    /// [`open_extra_volumes`] once `pkg_size` is known.
    pub fn parse(stream: &mut MultiVolumeStream) -> Result<(Self, Option<PkgExtHeader>)> {
        let mut buf = [0u8; PKG_HEADER_SIZE];
        stream.seek(SeekFrom::Start(0))?;
        stream.read_exact(&mut buf)?;

        let mut cursor = Cursor::new(&buf[..]);

        let mut magic = [0u8; 4];
        cursor.read_exact(&mut magic)?;
        if magic != PKG_MAGIC {
            return Err(Error::InvalidMagic(magic));
        }

        let raw_type = cursor.read_u16::<BigEndian>()?;
        let raw_platform = cursor.read_u16::<BigEndian>()?;
        let info_offset = cursor.read_u32::<BigEndian>()?;
        let info_count = cursor.read_u32::<BigEndian>()?;
        let header_size = cursor.read_u32::<BigEndian>()?;
        let file_count = cursor.read_u32::<BigEndian>()?;
        let pkg_size = cursor.read_u64::<BigEndian>()?;
        let data_offset = cursor.read_u64::<BigEndian>()?;
        let data_size = cursor.read_u64::<BigEndian>()?;

        let mut content_id = [0u8; 48];
        cursor.read_exact(&mut content_id)?;
        let mut qa_digest = [0u8; 16];
        cursor.read_exact(&mut qa_digest)?;
        let mut klicensee = [0u8; 16];
        cursor.read_exact(&mut klicensee)?;
        // The remaining 0x40 bytes hold header digests, unused here.

        let pkg_type = PkgType::from_raw(raw_type)?;
        let platform = PkgPlatform::from_raw(raw_platform)?;

        debug!("header: pkg_type = {pkg_type:?} ({raw_type:#06x})");
        debug!("header: platform = {platform:?} ({raw_platform:#06x})");
        debug!("header: info_offset = {info_offset:#x}, info_count = {info_count}");
        debug!("header: header_size = {header_size:#x}, file_count = {file_count}");
        debug!("header: pkg_size = {pkg_size:#x}");
        debug!("header: data_offset = {data_offset:#x}, data_size = {data_size:#x}");
        debug!(
            "header: content_id = {}",
            String::from_utf8_lossy(&content_id)
        );
        debug!("header: qa_digest = {}", hex::encode(qa_digest));

        let header = Self {
            pkg_type,
            platform,
            info_offset,
            info_count,
            header_size,
            file_count,
            pkg_size,
            data_offset,
            data_size,
            content_id,
            qa_digest,
            klicensee,
        };

        let ext = if platform == PkgPlatform::PspPsVita {
            stream.seek(SeekFrom::Start(PKG_HEADER_SIZE as u64))?;
            Some(PkgExtHeader::parse(stream)?)
        } else {
            None
        };

        Ok((header, ext))
    }

    /// The 9-character install id carried inside the content id,
    /// used as the default destination directory name.
    pub fn install_id(&self) -> String {
        let raw = &self.content_id[INSTALL_ID_START..INSTALL_ID_START + INSTALL_ID_LEN];
        String::from_utf8_lossy(raw).into_owned()
    }

    /// Keystream matching the package build type.
    pub fn keystream(&self) -> Keystream {
        match self.pkg_type {
            PkgType::Debug => Keystream::debug(self.qa_digest),
            PkgType::Release => Keystream::retail(self.klicensee),
        }
    }

    /// Check that the data region fits inside the declared archive.
    pub fn validate_data_region(&self) -> Result<()> {
        let end = self.data_offset.checked_add(self.data_size);
        if end.is_none_or(|end| end > self.pkg_size) {
            return Err(Error::DataRegionOutOfBounds {
                data_offset: self.data_offset,
                data_size: self.data_size,
                pkg_size: self.pkg_size,
            });
        }
        Ok(())
    }
}

/// Extended header present on PSP/PSVita packages.
///
/// The HMAC bookkeeping offsets are retained for completeness but are
/// not needed for extraction.
#[derive(Debug, Clone)]
pub struct PkgExtHeader {
    pub magic: [u8; 4],
    pub unknown_1: u32,
    pub ext_hdr_size: u32,
    pub ext_data_size: u32,
    pub main_and_ext_headers_hmac_offset: u32,
    pub metadata_header_hmac_offset: u32,
    pub tail_offset: u64,
    /// Selects one of three fixed platform keys.
    pub pkg_key_id: u32,
    pub full_header_hmac_offset: u32,
}

impl PkgExtHeader {
    /// Read the extended header at the stream's current position.
    pub fn parse(stream: &mut MultiVolumeStream) -> Result<Self> {
        let mut buf = [0u8; PKG_EXT_HEADER_SIZE];
        stream.read_exact(&mut buf)?;

        let mut cursor = Cursor::new(&buf[..]);

        let mut magic = [0u8; 4];
        cursor.read_exact(&mut magic)?;
        if magic != PKG_EXT_MAGIC {
            warn!("extended header magic mismatch: {magic:02x?}");
        }

        let unknown_1 = cursor.read_u32::<BigEndian>()?;
        let ext_hdr_size = cursor.read_u32::<BigEndian>()?;
        let ext_data_size = cursor.read_u32::<BigEndian>()?;
        let main_and_ext_headers_hmac_offset = cursor.read_u32::<BigEndian>()?;
        let metadata_header_hmac_offset = cursor.read_u32::<BigEndian>()?;
        let tail_offset = cursor.read_u64::<BigEndian>()?;
        let _padding = cursor.read_u32::<BigEndian>()?;
        let pkg_key_id = cursor.read_u32::<BigEndian>()?;
        let full_header_hmac_offset = cursor.read_u32::<BigEndian>()?;

        debug!("extended header: ext_hdr_size = {ext_hdr_size:#x}");
        debug!("extended header: ext_data_size = {ext_data_size:#x}");
        debug!("extended header: pkg_key_id = {pkg_key_id}");

        Ok(Self {
            magic,
            unknown_1,
            ext_hdr_size,
            ext_data_size,
            main_and_ext_headers_hmac_offset,
            metadata_header_hmac_offset,
            tail_offset,
            pkg_key_id,
            full_header_hmac_offset,
        })
    }
}

/// Open the remaining volumes of a multi-part archive.
///
/// When `pkg_size` exceeds the volumes opened so far, the archive path
/// must end with `_00.pkg`; successive parts (`_01.pkg`, `_02.pkg`, …)
/// are opened from the same directory until their sizes cover
/// `pkg_size`.
pub fn open_extra_volumes(
    stream: &mut MultiVolumeStream,
    path: &Path,
    pkg_size: u64,
) -> Result<()> {
    if pkg_size <= stream.total_size() {
        return Ok(());
    }

    let name = path.to_string_lossy();
    let Some(base) = name.strip_suffix("_00.pkg") else {
        return Err(Error::SizeMismatch {
            pkg_size,
            available: stream.total_size(),
        });
    };

    while stream.total_size() < pkg_size {
        let part = PathBuf::from(format!("{base}_{:02}.pkg", stream.volume_count()));
        stream.push_volume(&part)?;
    }

    debug!(
        "multi-part archive: {} volumes, {} bytes",
        stream.volume_count(),
        stream.total_size()
    );
    Ok(())
}
