//! Seekable view over a multi-volume archive.
//!
//! A large package may be split into numbered volume files whose
//! concatenation is the logical archive. [`MultiVolumeStream`] presents
//! the ordered volume list as one contiguous byte stream so that all
//! parsing and decryption can work with logical offsets only.

use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::Path;
use tracing::debug;

use crate::error::{Error, Result};

#[derive(Debug)]
struct Volume {
    file: File,
    size: u64,
}

/// One logical, seekable byte stream over N physical volumes.
///
/// The cursor state (current volume, logical offset, offset within the
/// current volume) is owned exclusively by the stream.
#[derive(Debug)]
pub struct MultiVolumeStream {
    volumes: Vec<Volume>,
    cur_volume: usize,
    logical_offset: u64,
    volume_offset: u64,
}

impl MultiVolumeStream {
    /// Open the first (or only) volume of an archive.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::ArchiveNotFound(path.to_path_buf()));
        }

        let file = File::open(path)?;
        let size = file.metadata()?.len();
        debug!("opened volume {} ({size} bytes)", path.display());

        Ok(Self {
            volumes: vec![Volume { file, size }],
            cur_volume: 0,
            logical_offset: 0,
            volume_offset: 0,
        })
    }

    /// Append the next volume of a multi-part archive.
    ///
    /// Returns the size of the appended volume.
    pub fn push_volume(&mut self, path: &Path) -> Result<u64> {
        if !path.is_file() {
            return Err(Error::MissingVolume(path.to_path_buf()));
        }

        let file = File::open(path).map_err(|_| Error::MissingVolume(path.to_path_buf()))?;
        let size = file.metadata()?.len();
        debug!("opened volume {} ({size} bytes)", path.display());

        self.volumes.push(Volume { file, size });
        Ok(size)
    }

    /// Number of opened volumes.
    pub fn volume_count(&self) -> usize {
        self.volumes.len()
    }

    /// Sum of all opened volume sizes.
    pub fn total_size(&self) -> u64 {
        self.volumes.iter().map(|v| v.size).sum()
    }

    /// Current logical offset.
    pub fn position(&self) -> u64 {
        self.logical_offset
    }

    /// Reposition the logical cursor.
    ///
    /// A linear scan locates the volume containing the new offset; the
    /// volume count is single-digit in practice, so the scan cost is
    /// irrelevant. Offsets at or past the end park the cursor at
    /// end-of-archive.
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::Current(delta) => self.logical_offset.checked_add_signed(delta),
            SeekFrom::End(delta) => self.total_size().checked_add_signed(delta),
        };
        let Some(target) = target else {
            return Err(Error::Io(std::io::Error::new(
                ErrorKind::InvalidInput,
                "seek before start of archive",
            )));
        };
        self.logical_offset = target;

        let mut base = 0u64;
        for (i, volume) in self.volumes.iter_mut().enumerate() {
            if target < base + volume.size {
                self.cur_volume = i;
                self.volume_offset = target - base;
                volume.file.seek(SeekFrom::Start(self.volume_offset))?;
                return Ok(target);
            }
            base += volume.size;
        }

        // Past the end of the last volume
        self.cur_volume = self.volumes.len() - 1;
        self.volume_offset = self.volumes[self.cur_volume].size;
        self.volumes[self.cur_volume].file.seek(SeekFrom::End(0))?;
        Ok(target)
    }

    /// Read up to `buf.len()` bytes at the current logical offset.
    ///
    /// Reads continue across volume boundaries; the returned count is
    /// short only at true end-of-archive.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut total = 0usize;

        while total < buf.len() {
            let volume = &mut self.volumes[self.cur_volume];
            let available = volume.size - self.volume_offset;

            if available == 0 {
                if self.cur_volume + 1 < self.volumes.len() {
                    self.cur_volume += 1;
                    self.volume_offset = 0;
                    self.volumes[self.cur_volume].file.seek(SeekFrom::Start(0))?;
                    continue;
                }
                break;
            }

            let want = (buf.len() - total).min(available as usize);
            let read = volume.file.read(&mut buf[total..total + want])?;
            if read == 0 {
                break;
            }

            total += read;
            self.volume_offset += read as u64;
            self.logical_offset += read as u64;
        }

        Ok(total)
    }

    /// Read exactly `buf.len()` bytes or fail with [`Error::Truncated`].
    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let read = self.read(buf)?;
        if read != buf.len() {
            return Err(Error::Truncated {
                expected: buf.len() as u64,
                actual: read as u64,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    /// Write `parts` into numbered files and open them as one stream.
    fn stream_over(dir: &TempDir, parts: &[&[u8]]) -> MultiVolumeStream {
        let mut paths = Vec::new();
        for (i, part) in parts.iter().enumerate() {
            let path = dir.path().join(format!("part_{i:02}.pkg"));
            let mut file = File::create(&path).unwrap();
            file.write_all(part).unwrap();
            paths.push(path);
        }

        let mut stream = MultiVolumeStream::open(&paths[0]).unwrap();
        for path in &paths[1..] {
            stream.push_volume(path).unwrap();
        }
        stream
    }

    #[test]
    fn test_read_within_single_volume() {
        let dir = TempDir::new().unwrap();
        let mut stream = stream_over(&dir, &[b"hello world"]);

        let mut buf = [0u8; 5];
        stream.seek(SeekFrom::Start(6)).unwrap();
        assert_eq!(stream.read(&mut buf).unwrap(), 5);
        assert_eq!(&buf, b"world");
        assert_eq!(stream.position(), 11);
    }

    #[test]
    fn test_read_spans_all_volumes() {
        let dir = TempDir::new().unwrap();
        let mut stream = stream_over(&dir, &[b"abc", b"defg", b"hij"]);
        assert_eq!(stream.total_size(), 10);

        // One read covering every volume boundary
        let mut buf = [0u8; 10];
        assert_eq!(stream.read(&mut buf).unwrap(), 10);
        assert_eq!(&buf, b"abcdefghij");

        // Short read at true end-of-archive
        let mut buf = [0u8; 4];
        assert_eq!(stream.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_read_across_one_boundary() {
        let dir = TempDir::new().unwrap();
        let mut stream = stream_over(&dir, &[b"abcde", b"fghij"]);

        stream.seek(SeekFrom::Start(3)).unwrap();
        let mut buf = [0u8; 4];
        stream.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"defg");
    }

    #[test]
    fn test_relative_seek() {
        let dir = TempDir::new().unwrap();
        let mut stream = stream_over(&dir, &[b"abcde", b"fghij"]);

        stream.seek(SeekFrom::Start(2)).unwrap();
        stream.seek(SeekFrom::Current(5)).unwrap();
        let mut buf = [0u8; 3];
        stream.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hij");
    }

    #[test]
    fn test_seek_past_end_reads_nothing() {
        let dir = TempDir::new().unwrap();
        let mut stream = stream_over(&dir, &[b"abc", b"def"]);

        stream.seek(SeekFrom::Start(100)).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(stream.read(&mut buf).unwrap(), 0);

        let err = stream.read_exact(&mut buf).unwrap_err();
        assert!(matches!(
            err,
            Error::Truncated {
                expected: 4,
                actual: 0
            }
        ));
    }

    #[test]
    fn test_missing_volume() {
        let dir = TempDir::new().unwrap();
        let mut stream = stream_over(&dir, &[b"abc"]);

        let missing = dir.path().join("part_01.pkg");
        let err = stream.push_volume(&missing).unwrap_err();
        assert!(matches!(err, Error::MissingVolume(_)));
    }

    #[test]
    fn test_open_missing_archive() {
        let dir = TempDir::new().unwrap();
        let err = MultiVolumeStream::open(&dir.path().join("nope.pkg")).unwrap_err();
        assert!(matches!(err, Error::ArchiveNotFound(_)));
    }
}
