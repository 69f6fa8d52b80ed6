// Read-only verification pass: every full block (and the trailing partial
// block) is compared against the fill pattern. Reads go through the retry
// path; a block whose reads are exhausted is recorded as a read error and
// skipped, with the cursor still advancing. A content mismatch is a
// terminal observation for that block and is recorded without retrying.

use crate::badblocks::{BadBlockKind, BadBlockTracker, BlockStatus};
use crate::config::WipeConfig;
use crate::target::Target;
use crate::ui::ProgressReporter;
use crate::WipeResult;

pub struct VerifyEngine<'a> {
    target: &'a mut Target,
    config: &'a WipeConfig,
    tracker: &'a mut BadBlockTracker,
}

impl<'a> VerifyEngine<'a> {
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

    pub fn run(&mut self, progress: &mut ProgressReporter) -> WipeResult<()> {
        let bs = self.config.block_size();
        let full_blocks = self.target.full_blocks(bs);
        let mut buf = vec![0u8; bs as usize];

        progress.begin();
        for _ in 0..full_blocks {
            let readable = match self.target.read_block(&mut buf) {
                Ok(()) => true,
                Err(_) => {
                    // Retries re-read into the same buffer, so a recovered
                    // read is compared against what was actually read.
                    let status = self.tracker.run_with_retry(
                        &mut *self.target,
                        BadBlockKind::Read,
                        u64::from(bs),
                        |t| t.read_block(&mut buf),
                    )?;
                    status == BlockStatus::Recovered
                }
            };
            if readable && !self.config.block_matches(&buf) {
                self.tracker
                    .record(self.target.cursor(), BadBlockKind::Unwiped)?;
            }
            self.target.advance(u64::from(bs));
            progress.tick(self.target.cursor());
        }

        let trailing = self.target.trailing_bytes(bs) as usize;
        if trailing > 0 {
            let readable = match self.target.read_block(&mut buf[..trailing]) {
                Ok(()) => true,
                Err(_) => {
                    let status = self.tracker.run_with_retry(
                        &mut *self.target,
                        BadBlockKind::Read,
                        trailing as u64,
                        |t| t.read_block(&mut buf[..trailing]),
                    )?;
                    status == BlockStatus::Recovered
                }
            };
            if readable && !self.config.bytes_match(&buf[..trailing]) {
                self.tracker
                    .record(self.target.cursor(), BadBlockKind::Unwiped)?;
            }
            self.target.advance(trailing as u64);
        }

        progress.finish(self.target.cursor());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WipeError;
    use std::io::Write as _;
    use tempfile::NamedTempFile;

    fn setup(content: &[u8]) -> (NamedTempFile, Target, WipeConfig, BadBlockTracker) {
        let mut tmp = NamedTempFile::new().unwrap();
        tmp.write_all(content).unwrap();
        tmp.flush().unwrap();
        let target = Target::open(tmp.path(), false).unwrap();
        let config = WipeConfig::new(512, 0).unwrap();
        let tracker = BadBlockTracker::new(200, 3);
        (tmp, target, config, tracker)
    }

    fn run(target: &mut Target, config: &WipeConfig, tracker: &mut BadBlockTracker) -> WipeResult<()> {
        let mut progress = ProgressReporter::new(target.size());
        VerifyEngine::new(target, config, tracker).run(&mut progress)
    }

    #[test]
    fn clean_target_verifies_without_findings() {
        let (_tmp, mut target, config, mut tracker) = setup(&vec![0u8; 4 * 512 + 100]);
        run(&mut target, &config, &mut tracker).unwrap();
        assert!(!tracker.has_bad_blocks());
        assert_eq!(target.cursor(), 4 * 512 + 100);
    }

    #[test]
    fn mismatching_blocks_are_recorded_as_unwiped() {
        // Two corrupted blocks out of one hundred
        let mut content = vec![0u8; 100 * 512];
        content[10 * 512 + 1] = 0xFF;
        content[97 * 512] = 0x01;
        let (_tmp, mut target, config, mut tracker) = setup(&content);

        run(&mut target, &config, &mut tracker).unwrap();

        let report = tracker.report();
        assert_eq!(report.unwiped, 2);
        assert_eq!(report.read_errors, 0);
        assert_eq!(report.write_errors, 0);
        assert_eq!(report.blocks[0].offset, 10 * 512);
        assert_eq!(report.blocks[1].offset, 97 * 512);
    }

    #[test]
    fn trailing_mismatch_uses_byte_compare() {
        let mut content = vec![0u8; 512 + 100];
        content[512 + 99] = 0x42;
        let (_tmp, mut target, config, mut tracker) = setup(&content);

        run(&mut target, &config, &mut tracker).unwrap();

        let report = tracker.report();
        assert_eq!(report.unwiped, 1);
        assert_eq!(report.blocks[0].offset, 512);
    }

    #[test]
    fn exhausted_read_is_recorded_and_the_block_skipped() {
        // Shrink the file underneath the open handle so the second block
        // cannot be read back
        let (tmp, mut target, config, mut tracker) = setup(&vec![0u8; 3 * 512]);
        std::fs::OpenOptions::new()
            .write(true)
            .open(tmp.path())
            .unwrap()
            .set_len(512)
            .unwrap();

        run(&mut target, &config, &mut tracker).unwrap();

        let report = tracker.report();
        assert_eq!(report.read_errors, 2);
        assert_eq!(report.unwiped, 0);
        assert_eq!(report.blocks[0].offset, 512);
        assert_eq!(report.blocks[1].offset, 1024);
        // The pass still covered the whole target
        assert_eq!(target.cursor(), 3 * 512);
    }

    #[test]
    fn threshold_breach_aborts_the_pass() {
        let mut content = vec![0u8; 4 * 512];
        content[0] = 1;
        content[512] = 1;
        content[1024] = 1;
        let (_tmp, mut target, config, mut tracker) = setup(&content);
        let mut strict = BadBlockTracker::new(1, 3);

        let err = run(&mut target, &config, &mut strict).unwrap_err();
        match err {
            WipeError::TooManyBadBlocks { report, limit } => {
                assert_eq!(limit, 1);
                assert_eq!(report.unwiped, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
        let _ = tracker;
    }

    #[test]
    fn fill_byte_other_than_zero_is_honored() {
        let (_tmp, mut target, _config, mut tracker) = setup(&vec![0xFFu8; 2 * 512 + 16]);
        let config = WipeConfig::new(512, 0xFF).unwrap();
        run(&mut target, &config, &mut tracker).unwrap();
        assert!(!tracker.has_bad_blocks());
    }
}
