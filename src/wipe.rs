// One wipe pass over the target. Selective mode reads first and overwrites
// only blocks that do not already match the fill pattern; force-all writes
// every block unconditionally. Write failures go through the reseek-and-
// retry path; read failures during a wipe pass are not separately retried
// or recorded, they just force the write (content that cannot be read
// cannot be trusted to already match the pattern).

use crate::badblocks::{BadBlockKind, BadBlockTracker};
use crate::config::WipeConfig;
use crate::target::Target;
use crate::ui::ProgressReporter;
use crate::WipeResult;

#[derive(Debug, Clone, Copy)]
pub struct PassStats {
    pub blocks_written: u64,
}

pub struct WipeEngine<'a> {
    target: &'a mut Target,
    config: &'a WipeConfig,
    tracker: &'a mut BadBlockTracker,
}

impl<'a> WipeEngine<'a> {
    pub fn new(
        target: &'a mut Target,
        config: &'a WipeConfig,
        tracker: &'a mut BadBlockTracker,
    ) -> Self {
        Self {
            target,
            config,
            tracker,
        }
    }

    /// Read/compare/write pass: minimizes writes on already-erased media at
    /// the cost of one read per block.
    pub fn run_selective(&mut self, progress: &mut ProgressReporter) -> WipeResult<PassStats> {
        let written_before = self.target.blocks_written();
        let bs = self.config.block_size();
        let full_blocks = self.target.full_blocks(bs);
        let mut read_buf = vec![0u8; bs as usize];

        progress.begin();
        for _ in 0..full_blocks {
            let needs_write = match self.target.read_block(&mut read_buf) {
                Ok(()) => !self.config.block_matches(&read_buf),
                Err(_) => true,
            };
            if needs_write {
                let fill = self.config.fill_buffer();
                self.write_current(fill)?;
            }
            self.target.advance(u64::from(bs));
            progress.tick(self.target.cursor());
        }

        let trailing = self.target.trailing_bytes(bs) as usize;
        if trailing > 0 {
            let needs_write = match self.target.read_block(&mut read_buf[..trailing]) {
                Ok(()) => !self.config.bytes_match(&read_buf[..trailing]),
                Err(_) => true,
            };
            if needs_write {
                let fill = &self.config.fill_buffer()[..trailing];
                self.write_current(fill)?;
            }
            self.target.advance(trailing as u64);
        }

        progress.finish(self.target.cursor());
        Ok(PassStats {
            blocks_written: self.target.blocks_written() - written_before,
        })
    }

    /// Unconditional write pass. `buffer` is the fill buffer, or the
    /// transient random buffer for the first sub-pass of a two-pass wipe.
    pub fn run_force_all(
        &mut self,
        buffer: &[u8],
        progress: &mut ProgressReporter,
    ) -> WipeResult<PassStats> {
        let written_before = self.target.blocks_written();
        let bs = self.config.block_size();
        let full_blocks = self.target.full_blocks(bs);

        progress.begin();
        for _ in 0..full_blocks {
            if self.target.write_block(buffer).is_err() {
                self.tracker.run_with_retry(
                    &mut *self.target,
                    BadBlockKind::Write,
                    u64::from(bs),
                    |t| t.write_block(buffer),
                )?;
            }
            self.target.advance(u64::from(bs));
            progress.tick(self.target.cursor());
        }

        let trailing = self.target.trailing_bytes(bs) as usize;
        if trailing > 0 {
            let tail = &buffer[..trailing];
            if self.target.write_block(tail).is_err() {
                self.tracker.run_with_retry(
                    &mut *self.target,
                    BadBlockKind::Write,
                    trailing as u64,
                    |t| t.write_block(tail),
                )?;
            }
            self.target.advance(trailing as u64);
        }

        progress.finish(self.target.cursor());
        Ok(PassStats {
            blocks_written: self.target.blocks_written() - written_before,
        })
    }

    // A block that was just read (or failed to read) leaves the OS offset
    // off the block start, so the write always reseeks first. One initial
    // attempt, then the retry path.
    fn write_current(&mut self, buf: &[u8]) -> WipeResult<()> {
        self.target.reseek_cursor()?;
        if self.target.write_block(buf).is_err() {
            self.tracker
                .run_with_retry(&mut *self.target, BadBlockKind::Write, buf.len() as u64, |t| {
                    t.write_block(buf)
                })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use tempfile::NamedTempFile;

    fn setup(content: &[u8]) -> (NamedTempFile, Target, WipeConfig, BadBlockTracker) {
        let mut tmp = NamedTempFile::new().unwrap();
        tmp.write_all(content).unwrap();
        tmp.flush().unwrap();
        let target = Target::open(tmp.path(), true).unwrap();
        let config = WipeConfig::new(512, 0).unwrap();
        let tracker = BadBlockTracker::new(200, 3);
        (tmp, target, config, tracker)
    }

    #[test]
    fn selective_issues_no_writes_on_clean_target() {
        // Three full blocks plus a trailing partial block, all already zero
        let (_tmp, mut target, config, mut tracker) = setup(&vec![0u8; 3 * 512 + 100]);
        let mut engine = WipeEngine::new(&mut target, &config, &mut tracker);
        let mut progress = ProgressReporter::new(3 * 512 + 100);

        let stats = engine.run_selective(&mut progress).unwrap();
        assert_eq!(stats.blocks_written, 0);
        assert_eq!(tracker.total(), 0);
    }

    #[test]
    fn selective_rewrites_only_dirty_blocks() {
        let mut content = vec![0u8; 4 * 512 + 100];
        content[512] = 1; // second block dirty
        content[4 * 512 + 3] = 7; // trailing dirty
        let (tmp, mut target, config, mut tracker) = setup(&content);
        let mut progress = ProgressReporter::new(content.len() as u64);

        let stats = WipeEngine::new(&mut target, &config, &mut tracker)
            .run_selective(&mut progress)
            .unwrap();
        assert_eq!(stats.blocks_written, 2);

        drop(target);
        let after = std::fs::read(tmp.path()).unwrap();
        assert!(after.iter().all(|&b| b == 0));
    }

    #[test]
    fn selective_wipes_target_smaller_than_one_block() {
        let (tmp, mut target, config, mut tracker) = setup(&[0xEEu8; 100]);
        let mut progress = ProgressReporter::new(100);

        let stats = WipeEngine::new(&mut target, &config, &mut tracker)
            .run_selective(&mut progress)
            .unwrap();
        assert_eq!(stats.blocks_written, 1);

        drop(target);
        let after = std::fs::read(tmp.path()).unwrap();
        assert_eq!(after.len(), 100);
        assert!(after.iter().all(|&b| b == 0));
    }

    #[test]
    fn unreadable_block_is_rewritten_without_comparison() {
        // Fix the size at two blocks, then shrink the file underneath the
        // open handle: reading the second block now fails, which must route
        // straight to the write path (no separate comparison attempt).
        let (tmp, mut target, config, mut tracker) = setup(&vec![3u8; 2 * 512]);
        std::fs::OpenOptions::new()
            .write(true)
            .open(tmp.path())
            .unwrap()
            .set_len(512)
            .unwrap();

        let mut progress = ProgressReporter::new(2 * 512);
        let stats = WipeEngine::new(&mut target, &config, &mut tracker)
            .run_selective(&mut progress)
            .unwrap();

        // Block one was dirty, block two was unreadable; both written
        assert_eq!(stats.blocks_written, 2);
        assert_eq!(tracker.total(), 0);

        drop(target);
        let after = std::fs::read(tmp.path()).unwrap();
        assert_eq!(after.len(), 2 * 512);
        assert!(after.iter().all(|&b| b == 0));
    }

    #[test]
    fn force_all_overwrites_every_block_and_the_tail() {
        let (tmp, mut target, config, mut tracker) = setup(&vec![0u8; 10_000]);
        let config_ff = WipeConfig::new(512, 0xFF).unwrap();
        let mut progress = ProgressReporter::new(10_000);

        let stats = WipeEngine::new(&mut target, &config_ff, &mut tracker)
            .run_force_all(config_ff.fill_buffer(), &mut progress)
            .unwrap();
        // 19 full blocks plus the 272-byte tail
        assert_eq!(stats.blocks_written, 20);
        let _ = config;

        drop(target);
        let after = std::fs::read(tmp.path()).unwrap();
        assert_eq!(after.len(), 10_000);
        assert!(after.iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn force_all_with_transient_random_buffer() {
        let (tmp, mut target, config, mut tracker) = setup(&vec![0u8; 2 * 512]);
        let random = config.random_buffer();
        let mut progress = ProgressReporter::new(2 * 512);

        WipeEngine::new(&mut target, &config, &mut tracker)
            .run_force_all(&random[..512], &mut progress)
            .unwrap();

        drop(target);
        let after = std::fs::read(tmp.path()).unwrap();
        assert_eq!(&after[..512], &random[..512]);
        assert_eq!(&after[512..], &random[..512]);
    }
}
