// Bad-block accounting: read errors, write errors and verification
// mismatches are counted separately, against one combined abort threshold.
// The tracker is the only place where accumulated errors turn into an abort
// outcome; single-shot fatal errors (open, size probe, seek) never pass
// through it.

use crate::target::Target;
use crate::{WipeError, WipeResult};
use serde::Serialize;
use std::io;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BadBlockKind {
    /// Read failed after exhausting retries.
    Read,
    /// Write failed after exhausting retries.
    Write,
    /// Content did not match the fill pattern during verification.
    Unwiped,
}

impl BadBlockKind {
    /// Single-letter tag used in the offset listing.
    pub fn tag(self) -> char {
        match self {
            BadBlockKind::Read => 'r',
            BadBlockKind::Write => 'w',
            BadBlockKind::Unwiped => 'u',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BadBlock {
    pub offset: u64,
    pub kind: BadBlockKind,
}

/// Outcome of a retried block operation. `Failed` means the block was
/// recorded and skipped; the caller still advances the cursor itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockStatus {
    Recovered,
    Failed,
}

pub struct BadBlockTracker {
    blocks: Vec<BadBlock>,
    read_errors: u32,
    write_errors: u32,
    unwiped: u32,
    max_total: u32,
    max_retries: u32,
}

impl BadBlockTracker {
    pub fn new(max_total: u32, max_retries: u32) -> Self {
        Self {
            blocks: Vec::new(),
            read_errors: 0,
            write_errors: 0,
            unwiped: 0,
            max_total,
            max_retries,
        }
    }

    /// Records one bad block and evaluates the abort predicate: the run
    /// aborts as soon as the combined count exceeds the limit, so a limit
    /// of zero aborts on the first recorded error of any kind.
    pub fn record(&mut self, offset: u64, kind: BadBlockKind) -> WipeResult<()> {
        self.blocks.push(BadBlock { offset, kind });
        match kind {
            BadBlockKind::Read => self.read_errors += 1,
            BadBlockKind::Write => self.write_errors += 1,
            BadBlockKind::Unwiped => self.unwiped += 1,
        }
        if self.total() > self.max_total {
            return Err(WipeError::TooManyBadBlocks {
                report: self.report(),
                limit: self.max_total,
            });
        }
        Ok(())
    }

    /// Retries a failed read or write at the current block, reseeking to
    /// the block start before every attempt. On the first success nothing
    /// is recorded; a fault absorbed by a retry leaves no trace. When all
    /// retries are exhausted the block is recorded under `kind` and the
    /// file offset is moved past it so the pass is not stalled.
    pub fn run_with_retry<F>(
        &mut self,
        target: &mut Target,
        kind: BadBlockKind,
        len: u64,
        mut op: F,
    ) -> WipeResult<BlockStatus>
    where
        F: FnMut(&mut Target) -> io::Result<()>,
    {
        for _ in 0..self.max_retries {
            target.reseek_cursor()?;
            if op(target).is_ok() {
                return Ok(BlockStatus::Recovered);
            }
        }
        self.record(target.cursor(), kind)?;
        target.seek_past(len)?;
        Ok(BlockStatus::Failed)
    }

    pub fn total(&self) -> u32 {
        self.read_errors + self.write_errors + self.unwiped
    }

    pub fn has_bad_blocks(&self) -> bool {
        !self.blocks.is_empty()
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Starts a fresh accounting window for the next pass.
    pub fn reset(&mut self) {
        self.blocks.clear();
        self.read_errors = 0;
        self.write_errors = 0;
        self.unwiped = 0;
    }

    pub fn report(&self) -> BadBlockReport {
        BadBlockReport {
            read_errors: self.read_errors,
            write_errors: self.write_errors,
            unwiped: self.unwiped,
            blocks: self.blocks.clone(),
        }
    }
}

/// Counts by kind plus the offset/kind list, for the end-of-pass warnings
/// and the final summary.
#[derive(Debug, Clone, Serialize)]
pub struct BadBlockReport {
    pub read_errors: u32,
    pub write_errors: u32,
    pub unwiped: u32,
    pub blocks: Vec<BadBlock>,
}

impl BadBlockReport {
    pub fn total(&self) -> u32 {
        self.read_errors + self.write_errors + self.unwiped
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Human-readable listing: a header with the counts, then the
    /// offset/kind pairs four per line.
    pub fn render(&self) -> String {
        let mut out = format!(
            "Found {} bad block(s): {} read error(s), {} write error(s), {} unwiped \
             (OFFSET/KIND, r = read error, w = write error, u = unwiped block):",
            self.total(),
            self.read_errors,
            self.write_errors,
            self.unwiped,
        );
        for (i, block) in self.blocks.iter().enumerate() {
            if i % 4 == 0 {
                out.push('\n');
            } else {
                out.push_str("  ");
            }
            out.push_str(&format!("{:>20}/{}", block.offset, block.kind.tag()));
        }
        out
    }
}
