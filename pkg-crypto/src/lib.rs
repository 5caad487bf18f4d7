//! Keystream ciphers and key material for PlayStation PKG archives.
//!
//! PKG payloads are encrypted with a position-dependent XOR keystream
//! applied in 16-byte blocks. Retail packages run AES-128 in counter
//! mode, with the counter seeded by the package licensee value; debug
//! packages derive each block from a SHA-1 digest of the QA digest and
//! the block counter. This crate provides:
//! - The block counter / keystream derivation for both package types
//! - The fixed, publicly known PKG entry keys
//! - Per-archive key derivation for PSVita content types

pub mod error;
pub mod keys;
pub mod keystream;

pub use error::CryptoError;
pub use keystream::Keystream;

/// Result type for crypto operations.
pub type Result<T> = std::result::Result<T, CryptoError>;

/// Width of one keystream block in bytes.
pub const BLOCK_SIZE: usize = 16;
