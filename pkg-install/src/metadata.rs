//! Metadata packet scan.
//!
//! The header points at a table of `(id, size)` packets. Each known id
//! fills one optional field at most once; size mismatches and unknown
//! ids are logged and skipped without aborting the scan.

use std::io::SeekFrom;
use tracing::{debug, warn};

use crate::error::Result;
use crate::stream::MultiVolumeStream;

/// Optional fields accumulated from the metadata packet table.
///
/// Mutated only during [`PkgMetadata::scan`]; immutable afterwards.
#[derive(Debug, Default, Clone)]
pub struct PkgMetadata {
    pub drm_type: Option<u32>,
    pub content_type: Option<u32>,
    pub package_type: Option<u32>,
    pub package_size: Option<u64>,
    pub package_revision: Option<u32>,
    pub title_id: Option<[u8; 12]>,
    pub software_revision: Option<u32>,
    /// Install-directory override (DLC packages).
    pub install_dir: Option<String>,
}

impl PkgMetadata {
    /// Run the packet loop for exactly `info_count` iterations.
    pub fn scan(
        stream: &mut MultiVolumeStream,
        info_offset: u32,
        info_count: u32,
    ) -> Result<Self> {
        let mut metadata = Self::default();
        stream.seek(SeekFrom::Start(u64::from(info_offset)))?;

        for _ in 0..info_count {
            let mut packet = [0u8; 8];
            stream.read_exact(&mut packet)?;
            let id = u32::from_be_bytes([packet[0], packet[1], packet[2], packet[3]]);
            let size = u32::from_be_bytes([packet[4], packet[5], packet[6], packet[7]]);

            match id {
                0x1 => {
                    if size == 4 {
                        metadata.drm_type = Some(read_u32(stream)?);
                        debug!("metadata: drm_type = {:#x}", metadata.drm_type.unwrap_or(0));
                        continue;
                    }
                    warn!("metadata: DRM type size mismatch ({size:#x})");
                }
                0x2 => {
                    if size == 4 {
                        metadata.content_type = Some(read_u32(stream)?);
                        debug!(
                            "metadata: content_type = {:#x}",
                            metadata.content_type.unwrap_or(0)
                        );
                        continue;
                    }
                    warn!("metadata: content type size mismatch ({size:#x})");
                }
                0x3 => {
                    if size == 4 {
                        metadata.package_type = Some(read_u32(stream)?);
                        continue;
                    }
                    warn!("metadata: package type size mismatch ({size:#x})");
                }
                0x4 => {
                    if size == 8 {
                        metadata.package_size = Some(read_u64(stream)?);
                        continue;
                    }
                    warn!("metadata: package size size mismatch ({size:#x})");
                }
                0x5 => {
                    if size == 4 {
                        metadata.package_revision = Some(read_u32(stream)?);
                        continue;
                    }
                    warn!("metadata: package revision size mismatch ({size:#x})");
                }
                0x6 => {
                    if size == 12 {
                        let mut title_id = [0u8; 12];
                        stream.read_exact(&mut title_id)?;
                        debug!("metadata: title_id = {}", String::from_utf8_lossy(&title_id));
                        metadata.title_id = Some(title_id);
                        continue;
                    }
                    warn!("metadata: title id size mismatch ({size:#x})");
                }
                // QA digest (0x7) and the 8-byte unknowns (0x9, 0xB),
                // 0xC, and the PSVita range 0xD-0x12 are recognised but
                // not needed for extraction.
                0x7 | 0x9 | 0xB | 0xC | 0xD..=0x12 => {}
                0x8 => {
                    if size == 4 {
                        metadata.software_revision = Some(read_u32(stream)?);
                        continue;
                    }
                    warn!("metadata: software revision size mismatch ({size:#x})");
                }
                0xA => {
                    if size > 8 {
                        // The actual installation directory (DLC): the
                        // payload carries an 8-byte header before the
                        // NUL-terminated directory name.
                        let mut payload = vec![0u8; size as usize];
                        stream.read_exact(&mut payload)?;
                        let raw = &payload[8..];
                        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
                        let dir = String::from_utf8_lossy(&raw[..end]).into_owned();
                        debug!("metadata: install_dir = {dir}");
                        metadata.install_dir = Some(dir);
                        continue;
                    }
                    warn!("metadata: install dir size mismatch ({size:#x})");
                }
                other => {
                    warn!("metadata: unknown packet id {other:#x} ({size} bytes)");
                }
            }

            // Packet not consumed: advance past its declared payload.
            stream.seek(SeekFrom::Current(i64::from(size)))?;
        }

        Ok(metadata)
    }
}

fn read_u32(stream: &mut MultiVolumeStream) -> Result<u32> {
    let mut buf = [0u8; 4];
    stream.read_exact(&mut buf)?;
    Ok(u32::from_be_bytes(buf))
}

fn read_u64(stream: &mut MultiVolumeStream) -> Result<u64> {
    let mut buf = [0u8; 8];
    stream.read_exact(&mut buf)?;
    Ok(u64::from_be_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn packet(id: u32, payload: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&id.to_be_bytes());
        buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        buf.extend_from_slice(payload);
        buf
    }

    fn scan_packets(packets: &[Vec<u8>]) -> PkgMetadata {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("meta.pkg");
        let bytes: Vec<u8> = packets.iter().flatten().copied().collect();
        fs::write(&path, &bytes).unwrap();

        let mut stream = MultiVolumeStream::open(&path).unwrap();
        PkgMetadata::scan(&mut stream, 0, packets.len() as u32).unwrap()
    }

    #[test]
    fn test_scan_known_packets() {
        let metadata = scan_packets(&[
            packet(0x1, &3u32.to_be_bytes()),
            packet(0x2, &0x15u32.to_be_bytes()),
            packet(0x4, &0x123456u64.to_be_bytes()),
            packet(0x6, b"TEST00001000"),
        ]);

        assert_eq!(metadata.drm_type, Some(3));
        assert_eq!(metadata.content_type, Some(0x15));
        assert_eq!(metadata.package_size, Some(0x123456));
        assert_eq!(metadata.title_id, Some(*b"TEST00001000"));
    }

    #[test]
    fn test_unknown_and_mismatched_packets_are_skipped() {
        let metadata = scan_packets(&[
            packet(0xFF, b"junk-payload"),
            packet(0x1, b"toolong"), // size mismatch for DRM type
            packet(0x2, &7u32.to_be_bytes()),
        ]);

        // The scan must keep going past the bad packets
        assert_eq!(metadata.drm_type, None);
        assert_eq!(metadata.content_type, Some(7));
    }

    #[test]
    fn test_install_dir_override() {
        let mut payload = vec![0u8; 8];
        payload.extend_from_slice(b"CUSTOMDIR\0\0\0");

        let metadata = scan_packets(&[packet(0xA, &payload)]);
        assert_eq!(metadata.install_dir.as_deref(), Some("CUSTOMDIR"));
    }

    #[test]
    fn test_install_dir_too_short() {
        let metadata = scan_packets(&[packet(0xA, &[0u8; 8])]);
        assert_eq!(metadata.install_dir, None);
    }
}
