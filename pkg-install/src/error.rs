//! Error types for PKG installation.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for installation operations.
pub type Result<T> = std::result::Result<T, Error>;

/// PKG installation error types.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The archive path does not point at a file.
    #[error("archive not found: {0}")]
    ArchiveNotFound(PathBuf),

    /// A read came up short against the declared structure.
    #[error("truncated archive: expected {expected} bytes, got {actual}")]
    Truncated { expected: u64, actual: u64 },

    /// Magic bytes did not match the PKG sentinel.
    #[error("not a PKG file: magic {0:02x?}")]
    InvalidMagic([u8; 4]),

    /// Unrecognised package build type.
    #[error("unknown PKG type {0:#06x}")]
    UnknownPkgType(u16),

    /// Unrecognised platform value.
    #[error("unknown PKG platform {0:#06x}")]
    UnknownPlatform(u16),

    /// Declared size exceeds the opened volumes and the path does not
    /// follow the multi-part naming convention.
    #[error("PKG size mismatch: pkg_size={pkg_size:#x}, volumes cover {available:#x}")]
    SizeMismatch { pkg_size: u64, available: u64 },

    /// A numbered part of a multi-part archive is missing.
    #[error("missing part of multi-part PKG: {0}")]
    MissingVolume(PathBuf),

    /// The data region does not fit inside the declared archive size.
    #[error(
        "PKG data region out of bounds: data_offset={data_offset:#x}, \
         data_size={data_size:#x}, pkg_size={pkg_size:#x}"
    )]
    DataRegionOutOfBounds {
        data_offset: u64,
        data_size: u64,
        pkg_size: u64,
    },

    /// The destination root could not be created.
    #[error("could not create installation directory {0}")]
    CreateInstallDir(PathBuf),

    /// Installation was cancelled through the shared progress cell.
    #[error("installation cancelled")]
    Cancelled,

    /// One or more entries failed to extract; the destination has been
    /// rolled back.
    #[error("{failures} of {total} entries failed to extract")]
    EntriesFailed { failures: usize, total: usize },

    /// Key derivation failed.
    #[error("crypto error: {0}")]
    Crypto(#[from] pkg_crypto::CryptoError),
}
