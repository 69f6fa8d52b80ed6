// scour - secure erasure and verification of block-addressable targets
//
// The library drives one invocation over a single target (a physical drive
// or a large file): zero, one or two wipe passes followed by exactly one
// verification pass, with bad-block accounting throughout. Device handling
// is synchronous and single-threaded; nothing here spawns or locks.

pub mod badblocks;
pub mod config;
pub mod orchestrator;
pub mod target;
pub mod ui;
pub mod verify;
pub mod wipe;

// Re-export the types a driver needs for one run
pub use badblocks::{BadBlock, BadBlockKind, BadBlockReport, BadBlockTracker};
pub use config::WipeConfig;
pub use orchestrator::{RunSummary, WipeRun};
pub use target::Target;

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// How a run traverses the target. Selected once from the command line;
/// conflicting selections are rejected during argument parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum WipeMode {
    /// Read each block first and overwrite only those not already matching
    /// the fill pattern.
    Selective,
    /// Overwrite every block unconditionally.
    ForceAll,
    /// Overwrite everything with random bytes, then again with the fill
    /// pattern.
    TwoPass,
    /// Skip wiping and only verify against the fill pattern.
    VerifyOnly,
}

impl WipeMode {
    /// Verification-only runs open the target read-only and leave the
    /// partition layout alone.
    pub fn is_destructive(self) -> bool {
        self != WipeMode::VerifyOnly
    }
}

/// Fatal and threshold outcomes. Components return these instead of
/// terminating; the binary maps them to the exit status after attempting a
/// clean close of the target.
#[derive(Error, Debug)]
pub enum WipeError {
    #[error("could not open {}: {source}", .path.display())]
    Open { path: PathBuf, source: io::Error },

    #[error("could not determine the size of {}: {source}", .path.display())]
    SizeUnknown { path: PathBuf, source: io::Error },

    #[error("could not seek to byte {offset} in {}: {source}", .path.display())]
    Seek {
        path: PathBuf,
        offset: u64,
        source: io::Error,
    },

    #[error("could not clear the partition layout of {}: {source}", .path.display())]
    ClearLayout { path: PathBuf, source: io::Error },

    #[error("block size {0} is invalid: must be a multiple of 512 between 512 and 32768")]
    InvalidBlockSize(u32),

    #[error("aborting after {} bad blocks (limit {limit})", .report.total())]
    TooManyBadBlocks { report: BadBlockReport, limit: u32 },
}

pub type WipeResult<T> = Result<T, WipeError>;
