//! Entry extraction loop.
//!
//! Drives the keystream cipher over per-entry byte ranges of the data
//! region and writes the decrypted payloads to the destination
//! directory, updating the shared progress cell after every chunk and
//! checking it for a cancellation request.

use std::fs::{self, File};
use std::io::{ErrorKind, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

use pkg_crypto::{Keystream, keys};

use crate::entry::{EntryCategory, PKG_ENTRY_SIZE, PkgEntry};
use crate::error::{Error, Result};
use crate::header::PkgHeader;
use crate::path::escape_entry_name;
use crate::progress::AtomicF64;
use crate::stream::MultiVolumeStream;

/// Payloads are decrypted and written in chunks of this size;
/// cancellation latency is bounded by one chunk's IO time.
pub const CHUNK_SIZE: usize = 8192 * 1024;

/// Longest accepted entry name in bytes.
const MAX_NAME_SIZE: u32 = 256;

/// Streams decrypted entry payloads to the destination directory.
pub struct Extractor<'a> {
    stream: &'a mut MultiVolumeStream,
    keystream: Keystream,
    data_offset: u64,
    data_size: u64,
    /// Key for entries without the PSP flag; PSP-flagged entries always
    /// use [`keys::PKG_AES_KEY2`].
    entry_key: [u8; 16],
    install_dir: PathBuf,
    progress: &'a AtomicF64,
    /// Whether this run created the destination directory. Cancellation
    /// can only be honored when it did.
    fresh_install: bool,
    scratch: Vec<u8>,
}

impl<'a> Extractor<'a> {
    pub fn new(
        stream: &'a mut MultiVolumeStream,
        header: &PkgHeader,
        entry_key: [u8; 16],
        install_dir: PathBuf,
        progress: &'a AtomicF64,
        fresh_install: bool,
    ) -> Self {
        Self {
            stream,
            keystream: header.keystream(),
            data_offset: header.data_offset,
            data_size: header.data_size,
            entry_key,
            install_dir,
            progress,
            fresh_install,
            scratch: Vec::new(),
        }
    }

    /// Read and decrypt `size` bytes at `offset` within the data
    /// region into the scratch buffer.
    ///
    /// Returns the number of bytes actually read, which is short only
    /// at end-of-archive. Offsets a decrypted entry record can carry
    /// are untrusted, so the position arithmetic must not overflow.
    fn decrypt(&mut self, offset: u64, size: usize, key: &[u8; 16]) -> Result<usize> {
        let Some(position) = self.data_offset.checked_add(offset) else {
            return Err(Error::Io(std::io::Error::new(
                ErrorKind::InvalidInput,
                "entry offset overflows the archive",
            )));
        };
        self.stream.seek(SeekFrom::Start(position))?;
        self.scratch.resize(size, 0);
        let read = self.stream.read(&mut self.scratch[..size])?;
        self.keystream.apply(&mut self.scratch[..read], offset, key);
        Ok(read)
    }

    /// Decrypt and decode the entry table at data-region offset 0.
    ///
    /// A short read here fails the whole operation; malformed
    /// individual entries are handled by [`extract_all`][Self::extract_all].
    pub fn read_entry_table(&mut self, file_count: u32, table_key: &[u8; 16]) -> Result<Vec<PkgEntry>> {
        let size = file_count as usize * PKG_ENTRY_SIZE;
        let read = self.decrypt(0, size, table_key)?;
        if read < size {
            return Err(Error::Truncated {
                expected: size as u64,
                actual: read as u64,
            });
        }
        PkgEntry::decode_table(&self.scratch[..size], file_count)
    }

    /// Extract every entry, returning the per-entry failure count.
    ///
    /// Only cancellation aborts the loop; every other problem is
    /// counted against the affected entry and extraction moves on.
    pub fn extract_all(&mut self, entries: &[PkgEntry]) -> Result<usize> {
        let mut failures = 0usize;

        for entry in entries {
            if entry.name_size > MAX_NAME_SIZE {
                failures += 1;
                error!("entry name too long ({:#x} bytes)", entry.name_size);
                continue;
            }

            let key = if entry.is_psp() {
                keys::PKG_AES_KEY2
            } else {
                self.entry_key
            };

            let name_size = entry.name_size as usize;
            let name = match self.decrypt(u64::from(entry.name_offset), name_size, &key) {
                Ok(read) if read == name_size => {
                    String::from_utf8_lossy(&self.scratch[..name_size]).into_owned()
                }
                Ok(read) => {
                    failures += 1;
                    error!("entry name truncated ({read} of {name_size} bytes)");
                    continue;
                }
                Err(e) => {
                    failures += 1;
                    error!("failed to read entry name: {e}");
                    continue;
                }
            };

            let target = self.install_dir.join(escape_entry_name(&name));
            debug!("entry {:#010x}: {name}", entry.entry_type);

            match entry.category() {
                EntryCategory::File => {
                    if !self.extract_file(entry, &key, &target)? {
                        failures += 1;
                    }
                }
                EntryCategory::Directory => match fs::create_dir(&target) {
                    Ok(()) => debug!("created directory {}", target.display()),
                    Err(_) if target.is_dir() => {
                        warn!("reused existing directory {}", target.display());
                    }
                    Err(e) => {
                        failures += 1;
                        error!("failed to create directory {}: {e}", target.display());
                    }
                },
                EntryCategory::Unknown => {
                    failures += 1;
                    error!("unknown entry type ({:#x}) {name}", entry.entry_type);
                }
            }
        }

        Ok(failures)
    }

    /// Write one file entry. Returns `Ok(false)` on a per-entry
    /// failure and `Err(Cancelled)` when a cancellation request was
    /// honored (the destination tree has been removed already).
    fn extract_file(&mut self, entry: &PkgEntry, key: &[u8; 16], target: &Path) -> Result<bool> {
        let existed = target.is_file();
        if existed && !entry.overwrite() {
            debug!("didn't overwrite {}", target.display());
            return Ok(true);
        }

        let mut out = match File::create(target) {
            Ok(file) => file,
            Err(e) => {
                error!("failed to create file {}: {e}", target.display());
                return Ok(false);
            }
        };

        let mut pos = 0u64;
        while pos < entry.file_size {
            let chunk = (CHUNK_SIZE as u64).min(entry.file_size - pos) as usize;

            let Some(offset) = entry.file_offset.checked_add(pos) else {
                error!("failed to extract file {}", target.display());
                return Ok(false);
            };
            match self.decrypt(offset, chunk, key) {
                Ok(read) if read == chunk => {}
                Ok(_) | Err(Error::Io(_)) => {
                    error!("failed to extract file {}", target.display());
                    return Ok(false);
                }
                Err(e) => return Err(e),
            }

            if out.write_all(&self.scratch[..chunk]).is_err() {
                error!("failed to write file {}", target.display());
                return Ok(false);
            }

            pos += chunk as u64;

            if self.progress.fetch_add(chunk as f64 / self.data_size as f64) < 0.0 {
                if self.fresh_install {
                    error!(
                        "package installation cancelled: {}",
                        self.install_dir.display()
                    );
                    drop(out);
                    let _ = fs::remove_dir_all(&self.install_dir);
                    return Err(Error::Cancelled);
                }

                // The destination pre-existed, so rolling back would
                // destroy prior data; the cancellation request is
                // absorbed by re-adding 1 to the counter.
                self.progress.fetch_add(1.0);
            }
        }

        if existed {
            warn!("overwritten file {}", target.display());
        } else {
            debug!("created file {}", target.display());
        }
        Ok(true)
    }
}
