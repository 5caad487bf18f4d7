//! Fixed key material for PKG archives.
//!
//! These keys are publicly known and shipped on every console; they are
//! lookup constants, not secrets.

use aes::Aes128;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockEncrypt, KeyInit};
use tracing::debug;

use crate::{CryptoError, Result};

/// AES key for retail PS3 package entries.
pub const PKG_AES_KEY: [u8; 16] = [
    0x2e, 0x7b, 0x71, 0xd7, 0xc9, 0xc9, 0xa1, 0x4e, 0xa3, 0x22, 0x1f, 0x18, 0x88, 0x28, 0xb8, 0xf8,
];

/// AES key for PSP-flagged entries and PSP/PSVita entry tables.
pub const PKG_AES_KEY2: [u8; 16] = [
    0x07, 0xf2, 0xc6, 0x82, 0x90, 0xb5, 0x0d, 0x2c, 0x33, 0x81, 0x8d, 0x70, 0x9b, 0x60, 0xe6, 0x2b,
];

/// PSVita derivation key for content type 0x15.
pub const PSP2_KEY_1: [u8; 16] = [
    0xe3, 0x1a, 0x70, 0xc9, 0xce, 0x1d, 0xd7, 0x2b, 0xf3, 0xc0, 0x62, 0x29, 0x63, 0xf2, 0xec, 0xcb,
];

/// PSVita derivation key for content type 0x16.
pub const PSP2_KEY_2: [u8; 16] = [
    0x42, 0x3a, 0xca, 0x3a, 0x2b, 0xd5, 0x64, 0x9f, 0x96, 0x86, 0xab, 0xad, 0x6f, 0xd8, 0x80, 0x1f,
];

/// PSVita derivation key for content type 0x17.
pub const PSP2_KEY_3: [u8; 16] = [
    0xaf, 0x07, 0xfd, 0x59, 0x65, 0x25, 0x27, 0xba, 0xf1, 0x33, 0x89, 0x66, 0x8b, 0x17, 0xd9, 0xea,
];

/// Derive the per-archive entry key for PSVita content.
///
/// Content types 0x15 through 0x17 each select one of three fixed
/// platform keys; the archive licensee value is AES-ECB-encrypted under
/// the selected key to produce the entry key.
pub fn vita_entry_key(content_type: u32, klicensee: &[u8; 16]) -> Result<[u8; 16]> {
    let platform_key = match content_type {
        0x15 => &PSP2_KEY_1,
        0x16 => &PSP2_KEY_2,
        0x17 => &PSP2_KEY_3,
        other => return Err(CryptoError::UnsupportedContentType(other)),
    };

    debug!("deriving PSVita entry key for content type {content_type:#x}");

    let cipher = Aes128::new(GenericArray::from_slice(platform_key));
    let mut block = GenericArray::clone_from_slice(klicensee);
    cipher.encrypt_block(&mut block);
    Ok(block.into())
}

/// Convert a byte slice into a 128-bit key.
pub fn key_from_slice(data: &[u8]) -> Result<[u8; 16]> {
    data.try_into().map_err(|_| CryptoError::InvalidKeySize {
        expected: 16,
        actual: data.len(),
    })
}
