//! Install session orchestration.
//!
//! Runs header parsing, metadata scanning, entry-table decryption and
//! extraction in sequence, and enforces the all-or-nothing contract at
//! the destination-directory level.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

use pkg_crypto::keys;

use crate::error::{Error, Result};
use crate::extract::Extractor;
use crate::header::{PkgHeader, PkgPlatform, open_extra_volumes};
use crate::metadata::PkgMetadata;
use crate::path::escape_entry_name;
use crate::progress::AtomicF64;
use crate::stream::MultiVolumeStream;

/// Install a package archive below `<install_root>/game/`.
///
/// `progress` accumulates `completed_bytes / data_size` over the run;
/// the caller may drive it negative at any time to request
/// cancellation. Returns overall success; on failure the destination
/// directory has been rolled back (removed), unless the failure
/// happened before anything was written.
pub fn install(archive: &Path, install_root: &Path, progress: &AtomicF64) -> bool {
    match run(archive, install_root, progress) {
        Ok(dir) => {
            info!("package successfully installed to {}", dir.display());
            true
        }
        Err(e) => {
            error!("package installation failed: {e}");
            false
        }
    }
}

fn run(archive: &Path, install_root: &Path, progress: &AtomicF64) -> Result<PathBuf> {
    let mut stream = MultiVolumeStream::open(archive)?;
    let (header, _ext) = PkgHeader::parse(&mut stream)?;
    open_extra_volumes(&mut stream, archive, header.pkg_size)?;
    header.validate_data_region()?;

    let metadata = PkgMetadata::scan(&mut stream, header.info_offset, header.info_count)?;
    let install_id = metadata
        .install_dir
        .clone()
        .unwrap_or_else(|| header.install_id());

    // The metadata override is archive-supplied and must not be able
    // to point outside the install root.
    let dir = install_root.join("game").join(escape_entry_name(&install_id));

    // If the destination already exists this run is overwriting prior
    // data and cancellation cannot be honored.
    let fresh_install = !dir.is_dir();

    fs::create_dir_all(&dir).map_err(|_| Error::CreateInstallDir(dir.clone()))?;

    let (entry_key, table_key) = select_keys(&header, &metadata)?;

    let mut extractor = Extractor::new(
        &mut stream,
        &header,
        entry_key,
        dir.clone(),
        progress,
        fresh_install,
    );

    let failures = match extract(&mut extractor, &header, &table_key) {
        Ok(failures) => failures,
        Err(Error::Cancelled) => return Err(Error::Cancelled),
        Err(e) => {
            let _ = fs::remove_dir_all(&dir);
            return Err(e);
        }
    };

    if failures != 0 {
        let _ = fs::remove_dir_all(&dir);
        return Err(Error::EntriesFailed {
            failures,
            total: header.file_count as usize,
        });
    }

    Ok(dir)
}

fn extract(extractor: &mut Extractor<'_>, header: &PkgHeader, table_key: &[u8; 16]) -> Result<usize> {
    let entries = extractor.read_entry_table(header.file_count, table_key)?;
    extractor.extract_all(&entries)
}

/// Pick the entry key and the entry-table key for this archive.
///
/// PSVita content (content types 0x15-0x17) derives a per-archive key
/// from the licensee value; otherwise entries use the fixed retail key
/// and PSP/PSVita entry tables are keyed with the PSP key. Debug
/// packages ignore the key entirely (see [`pkg_crypto::Keystream`]).
fn select_keys(header: &PkgHeader, metadata: &PkgMetadata) -> Result<([u8; 16], [u8; 16])> {
    let content_type = metadata.content_type.unwrap_or(0);

    if header.platform == PkgPlatform::PspPsVita && (0x15..=0x17).contains(&content_type) {
        let derived = keys::vita_entry_key(content_type, &header.klicensee)?;
        return Ok((derived, derived));
    }

    let table_key = if header.platform == PkgPlatform::PspPsVita {
        keys::PKG_AES_KEY2
    } else {
        keys::PKG_AES_KEY
    };
    Ok((keys::PKG_AES_KEY, table_key))
}
