//! Position-dependent keystream derivation and application.
//!
//! Every 16-byte block of the encrypted data region is XORed with a
//! keystream block derived from the block's absolute position, so any
//! byte range can be decrypted independently as long as its offset
//! within the data region is known.

use aes::Aes128;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockEncrypt, KeyInit};
use sha1::{Digest, Sha1};

use crate::BLOCK_SIZE;

/// Keystream source for one archive.
///
/// The variant is fixed by the package build type; the block counter is
/// `offset / 16` where `offset` is relative to the start of the
/// encrypted data region.
#[derive(Debug, Clone)]
pub enum Keystream {
    /// Debug packages: SHA-1 over the QA digest and the block counter.
    Debug {
        /// Raw 16-byte QA digest from the package header.
        qa_digest: [u8; 16],
    },
    /// Retail packages: AES-128 counter mode seeded by the licensee
    /// value. The AES key is chosen per call.
    Retail {
        /// Licensee value interpreted as a big-endian 128-bit integer.
        counter_base: u128,
    },
}

impl Keystream {
    /// Keystream for a debug package.
    pub fn debug(qa_digest: [u8; 16]) -> Self {
        Self::Debug { qa_digest }
    }

    /// Keystream for a retail package.
    pub fn retail(klicensee: [u8; 16]) -> Self {
        Self::Retail {
            counter_base: u128::from_be_bytes(klicensee),
        }
    }

    /// XOR the keystream for `offset` into `data`, in place.
    ///
    /// `offset` is the byte offset of `data[0]` relative to the start
    /// of the encrypted data region; block counters are derived from
    /// it, so decrypting disjoint ranges gives the same bytes as one
    /// call over their union. `key` selects the AES key for retail
    /// packages and is ignored for debug packages. A trailing partial
    /// block is XORed only over the bytes present.
    ///
    /// Applying the keystream twice restores the input, so the same
    /// routine encrypts.
    pub fn apply(&self, data: &mut [u8], offset: u64, key: &[u8; 16]) {
        let base_block = offset / BLOCK_SIZE as u64;
        match self {
            Self::Debug { qa_digest } => apply_debug(data, base_block, qa_digest),
            Self::Retail { counter_base } => apply_retail(data, base_block, *counter_base, key),
        }
    }
}

fn apply_debug(data: &mut [u8], base_block: u64, qa_digest: &[u8; 16]) {
    // Eight big-endian u64 lanes: qa0, qa0, qa1, qa1, 0, 0, 0, counter.
    let mut input = [0u8; 64];
    input[0..8].copy_from_slice(&qa_digest[0..8]);
    input[8..16].copy_from_slice(&qa_digest[0..8]);
    input[16..24].copy_from_slice(&qa_digest[8..16]);
    input[24..32].copy_from_slice(&qa_digest[8..16]);

    for (i, chunk) in data.chunks_mut(BLOCK_SIZE).enumerate() {
        input[56..64].copy_from_slice(&(base_block + i as u64).to_be_bytes());
        let digest = Sha1::digest(input);
        for (byte, mask) in chunk.iter_mut().zip(digest.iter()) {
            *byte ^= mask;
        }
    }
}

fn apply_retail(data: &mut [u8], base_block: u64, counter_base: u128, key: &[u8; 16]) {
    let cipher = Aes128::new(GenericArray::from_slice(key));
    let counter_base = counter_base.wrapping_add(u128::from(base_block));

    for (i, chunk) in data.chunks_mut(BLOCK_SIZE).enumerate() {
        let counter = counter_base.wrapping_add(i as u128);
        let mut block = GenericArray::from(counter.to_be_bytes());
        cipher.encrypt_block(&mut block);
        for (byte, mask) in chunk.iter_mut().zip(block.iter()) {
            *byte ^= mask;
        }
    }
}
