//! Error types for pkg-crypto operations.

use thiserror::Error;

/// Errors that can occur during crypto operations.
#[derive(Error, Debug)]
pub enum CryptoError {
    /// Content type has no associated derivation key.
    #[error("no derivation key for content type {0:#x}")]
    UnsupportedContentType(u32),

    /// Invalid key size.
    #[error("invalid key size: expected {expected}, got {actual}")]
    InvalidKeySize { expected: usize, actual: usize },
}
