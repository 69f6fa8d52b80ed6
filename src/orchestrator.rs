// Pass sequencing for one invocation: zero, one or two wipe passes followed
// by exactly one verification pass, each with its own timer and bad-block
// accounting window. The orchestrator owns the target for the whole run and
// is the only component that prints banners and summaries; the engines
// report outcomes and never terminate anything.

use crate::badblocks::{BadBlockReport, BadBlockTracker};
use crate::config::WipeConfig;
use crate::target::Target;
use crate::ui::{format_elapsed, ProgressReporter};
use crate::verify::VerifyEngine;
use crate::wipe::WipeEngine;
use crate::{WipeMode, WipeResult};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Outcome of a completed run. A run with under-threshold bad blocks still
/// completes; the caller decides what to do with the report.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub mode: WipeMode,
    pub bytes: u64,
    pub blocks_written: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub bad_blocks: BadBlockReport,
}

impl RunSummary {
    pub fn verified_clean(&self) -> bool {
        self.bad_blocks.is_empty()
    }
}

pub struct WipeRun {
    target: Target,
    config: WipeConfig,
    tracker: BadBlockTracker,
    mode: WipeMode,
}

impl WipeRun {
    pub fn new(
        target: Target,
        config: WipeConfig,
        tracker: BadBlockTracker,
        mode: WipeMode,
    ) -> Self {
        Self {
            target,
            config,
            tracker,
            mode,
        }
    }

    /// Runs the selected wipe passes and the verification pass. Consumes
    /// the run so the target is closed on every exit path, including the
    /// abort and fatal ones.
    pub fn execute(mut self) -> WipeResult<RunSummary> {
        let started_at = Utc::now();
        let size = self.target.size();

        match self.mode {
            WipeMode::Selective => {
                println!("Wiping, pass 1 of 2");
                let mut progress = ProgressReporter::new(size);
                WipeEngine::new(&mut self.target, &self.config, &mut self.tracker)
                    .run_selective(&mut progress)?;
                self.finish_wipe_pass(&progress, "wiping")?;
            }
            WipeMode::ForceAll => {
                println!("Wiping, pass 1 of 2");
                let mut progress = ProgressReporter::new(size);
                let fill = self.config.fill_buffer().to_vec();
                WipeEngine::new(&mut self.target, &self.config, &mut self.tracker)
                    .run_force_all(&fill, &mut progress)?;
                self.finish_wipe_pass(&progress, "wiping")?;
            }
            WipeMode::TwoPass => {
                // Transient non-deterministic buffer, regenerated per
                // invocation; the config's fill buffer is untouched.
                let random = self.config.random_buffer();
                println!("Wiping, pass 1 of 3");
                let mut progress = ProgressReporter::new(size);
                WipeEngine::new(&mut self.target, &self.config, &mut self.tracker)
                    .run_force_all(&random, &mut progress)?;
                self.finish_wipe_pass(&progress, "the first pass")?;

                println!("Wiping, pass 2 of 3");
                let mut progress = ProgressReporter::new(size);
                let fill = self.config.fill_buffer().to_vec();
                WipeEngine::new(&mut self.target, &self.config, &mut self.tracker)
                    .run_force_all(&fill, &mut progress)?;
                self.finish_wipe_pass(&progress, "wiping")?;
            }
            WipeMode::VerifyOnly => {}
        }

        match self.mode {
            WipeMode::VerifyOnly => println!("Verifying"),
            WipeMode::TwoPass => println!("Verifying, pass 3 of 3"),
            _ => println!("Verifying, pass 2 of 2"),
        }
        let mut progress = ProgressReporter::new(size);
        VerifyEngine::new(&mut self.target, &self.config, &mut self.tracker)
            .run(&mut progress)?;
        println!(
            "\n\nProcess took {}",
            format_elapsed(progress.elapsed_seconds())
        );

        let summary = RunSummary {
            mode: self.mode,
            bytes: size,
            blocks_written: self.target.blocks_written(),
            started_at,
            finished_at: Utc::now(),
            bad_blocks: self.tracker.report(),
        };
        if summary.verified_clean() {
            println!("Verification was successful, all done");
        } else {
            println!(
                "Warning: all done but found {} bad block(s) in {}",
                summary.bad_blocks.total(),
                self.target.path().display()
            );
            println!("{}", summary.bad_blocks.render());
        }
        Ok(summary)
    }

    // End of one wipe pass: elapsed summary, bad-block warning, and a fresh
    // accounting window and cursor for whatever comes next.
    fn finish_wipe_pass(&mut self, progress: &ProgressReporter, label: &str) -> WipeResult<()> {
        println!(
            "\n\nProcess took {}",
            format_elapsed(progress.elapsed_seconds())
        );
        if self.tracker.has_bad_blocks() {
            println!("Warning: finished {label} but found bad block(s)");
            println!("{}", self.tracker.report().render());
        }
        self.tracker.reset();
        self.target.rewind()?;
        Ok(())
    }
}
