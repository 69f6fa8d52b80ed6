// Target handling: a seekable, block-addressable byte range backed by a
// regular file or a block device. The target owns the position cursor; the
// cursor only moves by sequential advance after a successful block step or
// by an explicit reseek on the error paths.

use crate::{WipeError, WipeResult};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Span of partition-layout metadata cleared before a destructive run:
/// protective MBR, GPT header and the standard 32-sector entry array.
const LAYOUT_METADATA_BYTES: u64 = 34 * 512;

#[cfg(target_os = "linux")]
mod sys {
    use nix::{ioctl_none, ioctl_read};

    // 0x12 is the kernel's block-layer ioctl group
    ioctl_read!(blkgetsize64, 0x12, 114, u64);
    ioctl_none!(blkrrpart, 0x12, 95);
}

#[derive(Debug)]
pub struct Target {
    file: File,
    path: PathBuf,
    size: u64,
    cursor: u64,
    is_physical: bool,
    writable: bool,
    blocks_written: u64,
}

impl Target {
    /// Opens the device or file and fixes its size for the lifetime of the
    /// run. Verification-only runs pass `writable = false` and get a
    /// read-only handle.
    pub fn open(path: &Path, writable: bool) -> WipeResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(writable)
            .open(path)
            .map_err(|source| WipeError::Open {
                path: path.to_path_buf(),
                source,
            })?;

        let metadata = file.metadata().map_err(|source| WipeError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        let is_physical = {
            #[cfg(unix)]
            {
                use std::os::unix::fs::FileTypeExt;
                metadata.file_type().is_block_device()
            }
            #[cfg(not(unix))]
            {
                false
            }
        };

        let size = if metadata.is_file() {
            metadata.len()
        } else {
            Self::device_size(&file, path)?
        };

        Ok(Self {
            file,
            path: path.to_path_buf(),
            size,
            cursor: 0,
            is_physical,
            writable,
            blocks_written: 0,
        })
    }

    #[cfg(target_os = "linux")]
    fn device_size(file: &File, path: &Path) -> WipeResult<u64> {
        use std::os::unix::io::AsRawFd;

        let mut size = 0u64;
        unsafe { sys::blkgetsize64(file.as_raw_fd(), &mut size) }.map_err(|errno| {
            WipeError::SizeUnknown {
                path: path.to_path_buf(),
                source: io::Error::from_raw_os_error(errno as i32),
            }
        })?;
        Ok(size)
    }

    #[cfg(not(target_os = "linux"))]
    fn device_size(mut file: &File, path: &Path) -> WipeResult<u64> {
        let size = file
            .seek(SeekFrom::End(0))
            .and_then(|size| file.seek(SeekFrom::Start(0)).map(|_| size))
            .map_err(|source| WipeError::SizeUnknown {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(size)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    pub fn is_physical(&self) -> bool {
        self.is_physical
    }

    /// Blocks written so far across all passes, including the trailing
    /// partial block.
    pub fn blocks_written(&self) -> u64 {
        self.blocks_written
    }

    pub fn full_blocks(&self, block_size: u32) -> u64 {
        self.size / u64::from(block_size)
    }

    pub fn trailing_bytes(&self, block_size: u32) -> u32 {
        (self.size % u64::from(block_size)) as u32
    }

    /// Repositions the OS file offset back to the cursor (the current block
    /// start). A failed seek signals device-level failure, not a bad block,
    /// and is fatal to the run.
    pub fn reseek_cursor(&mut self) -> WipeResult<()> {
        self.seek_to(self.cursor)
    }

    /// Repositions past a block that could not be read or written so the
    /// pass is not stalled on it.
    pub fn seek_past(&mut self, len: u64) -> WipeResult<()> {
        self.seek_to(self.cursor + len)
    }

    /// Back to byte 0, resetting the cursor, before a new pass.
    pub fn rewind(&mut self) -> WipeResult<()> {
        self.seek_to(0)?;
        self.cursor = 0;
        Ok(())
    }

    fn seek_to(&mut self, offset: u64) -> WipeResult<()> {
        self.file
            .seek(SeekFrom::Start(offset))
            .map(drop)
            .map_err(|source| WipeError::Seek {
                path: self.path.clone(),
                offset,
                source,
            })
    }

    /// Advances the cursor after a completed block step.
    pub fn advance(&mut self, len: u64) {
        self.cursor += len;
    }

    /// Exact-length read at the current OS offset; a short read is an error
    /// and leaves the offset unspecified, so callers reseek before reusing
    /// the position.
    pub fn read_block(&mut self, buf: &mut [u8]) -> io::Result<()> {
        self.file.read_exact(buf)
    }

    /// Exact-length write at the current OS offset.
    pub fn write_block(&mut self, buf: &[u8]) -> io::Result<()> {
        self.file.write_all(buf)?;
        self.blocks_written += 1;
        Ok(())
    }

    /// Clears the partition-layout metadata of a physical target before a
    /// destructive run: zeros the MBR/GPT region, flushes, and asks the
    /// kernel to re-read the (now empty) partition table. The overwrite
    /// failing is fatal; the rescan failing is only a warning.
    pub fn clear_layout(&mut self) -> WipeResult<()> {
        let span = LAYOUT_METADATA_BYTES.min(self.size);
        if span == 0 {
            return Ok(());
        }
        let zeros = vec![0u8; span as usize];
        self.wipe_layout_region(&zeros)
            .map_err(|source| WipeError::ClearLayout {
                path: self.path.clone(),
                source,
            })?;
        if let Err(err) = self.rescan_partitions() {
            warn!(
                path = %self.path.display(),
                error = %err,
                "partition table rescan after clearing layout failed"
            );
        }
        Ok(())
    }

    fn wipe_layout_region(&mut self, zeros: &[u8]) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(zeros)?;
        self.file.sync_all()?;
        self.file.seek(SeekFrom::Start(0))?;
        Ok(())
    }

    #[cfg(target_os = "linux")]
    fn rescan_partitions(&self) -> io::Result<()> {
        use std::os::unix::io::AsRawFd;

        unsafe { sys::blkrrpart(self.file.as_raw_fd()) }
            .map(drop)
            .map_err(|errno| io::Error::from_raw_os_error(errno as i32))
    }

    #[cfg(not(target_os = "linux"))]
    fn rescan_partitions(&self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for Target {
    // Clean close: flush whatever was written and let the host refresh its
    // view of a physical drive's layout. Neither failure changes the exit
    // status.
    fn drop(&mut self) {
        if self.writable {
            if let Err(err) = self.file.sync_all() {
                warn!(
                    path = %self.path.display(),
                    error = %err,
                    "could not flush target before close"
                );
            }
        }
        if self.is_physical {
            if let Err(err) = self.rescan_partitions() {
                warn!(
                    path = %self.path.display(),
                    error = %err,
                    "could not refresh the drive's partition layout view"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Write as _;
    use tempfile::NamedTempFile;

    fn file_target(len: usize, writable: bool) -> (NamedTempFile, Target) {
        let mut tmp = NamedTempFile::new().unwrap();
        tmp.write_all(&vec![0u8; len]).unwrap();
        tmp.flush().unwrap();
        let target = Target::open(tmp.path(), writable).unwrap();
        (tmp, target)
    }

    #[test]
    fn open_fixes_size_and_starts_at_zero() {
        let (_tmp, target) = file_target(10_000, false);
        assert_eq!(target.size(), 10_000);
        assert_eq!(target.cursor(), 0);
        assert!(!target.is_physical());
    }

    #[test]
    fn open_missing_path_fails() {
        let err = Target::open(Path::new("/nonexistent/scour-target"), false).unwrap_err();
        assert!(matches!(err, WipeError::Open { .. }));
    }

    #[test]
    fn cursor_advances_and_reseeks() {
        let (_tmp, mut target) = file_target(4096, true);
        let mut buf = [0u8; 512];
        target.read_block(&mut buf).unwrap();
        target.advance(512);
        assert_eq!(target.cursor(), 512);

        // Reseek lands back on the cursor, not the OS offset
        target.reseek_cursor().unwrap();
        target.write_block(&[0xEE; 512]).unwrap();
        target.rewind().unwrap();
        assert_eq!(target.cursor(), 0);

        let mut check = [0u8; 1024];
        target.read_block(&mut check).unwrap();
        assert!(check[..512].iter().all(|&b| b == 0));
        assert!(check[512..].iter().all(|&b| b == 0xEE));
    }

    #[test]
    fn seek_past_skips_a_failed_block() {
        let (_tmp, mut target) = file_target(2048, false);
        target.seek_past(512).unwrap();
        let mut buf = [0u8; 512];
        target.read_block(&mut buf).unwrap();
        // cursor itself is untouched until the caller advances
        assert_eq!(target.cursor(), 0);
    }

    #[test]
    fn write_block_counts_blocks() {
        let (_tmp, mut target) = file_target(2048, true);
        assert_eq!(target.blocks_written(), 0);
        target.write_block(&[1u8; 512]).unwrap();
        target.write_block(&[2u8; 512]).unwrap();
        assert_eq!(target.blocks_written(), 2);
    }

    #[test]
    fn clear_layout_zeros_metadata_region_only() {
        let (tmp, mut target) = file_target(40_000, true);
        // Paint the whole file first
        target.write_block(&vec![0xAB; 40_000]).unwrap();
        target.rewind().unwrap();

        target.clear_layout().unwrap();

        let content = std::fs::read(tmp.path()).unwrap();
        assert!(content[..(34 * 512)].iter().all(|&b| b == 0));
        assert!(content[(34 * 512)..].iter().all(|&b| b == 0xAB));
    }

    #[test]
    fn clear_layout_clamps_to_small_targets() {
        let (tmp, mut target) = file_target(1000, true);
        std::fs::write(tmp.path(), vec![0x11u8; 1000]).unwrap();
        target.clear_layout().unwrap();
        let content = std::fs::read(tmp.path()).unwrap();
        assert_eq!(content.len(), 1000);
        assert!(content.iter().all(|&b| b == 0));
    }

    proptest! {
        /// full_blocks * block_size + trailing_bytes always reassembles the
        /// target size.
        #[test]
        fn geometry_identity(size in 0u64..1 << 40, bs_factor in 1u32..=64) {
            let bs = bs_factor * 512;
            let full = size / u64::from(bs);
            let trailing = (size % u64::from(bs)) as u32;
            prop_assert_eq!(full * u64::from(bs) + u64::from(trailing), size);
        }
    }

    #[test]
    fn geometry_on_real_target() {
        let (_tmp, target) = file_target(10_000, false);
        assert_eq!(target.full_blocks(512), 19);
        assert_eq!(target.trailing_bytes(512), 272);
        assert_eq!(target.full_blocks(4096), 2);
        assert_eq!(target.trailing_bytes(4096), 1808);
    }
}
