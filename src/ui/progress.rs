// Single-line progress rendering for one pass: percent complete, bytes
// processed and an estimated time remaining, overwritten in place with a
// carriage return. Rendering is throttled to once per elapsed wall-clock
// second so block-sized iterations do not flood stdout.

use std::io::{self, Write};
use std::time::Instant;

pub struct ProgressReporter {
    total: u64,
    started: Instant,
    /// Elapsed whole second of the previous render; ticks re-render only
    /// when this changes.
    last_second: u64,
}

impl ProgressReporter {
    /// A reporter covers exactly one pass; each pass gets a fresh timer and
    /// therefore a fresh ETA baseline.
    pub fn new(total: u64) -> Self {
        Self {
            total,
            started: Instant::now(),
            last_second: 0,
        }
    }

    /// Unconditional first render at the start of a pass.
    pub fn begin(&mut self) {
        self.render(0);
    }

    /// Called once per block iteration; renders only when the elapsed
    /// second has changed since the previous render.
    pub fn tick(&mut self, bytes_done: u64) {
        let second = self.started.elapsed().as_secs();
        if second != self.last_second {
            self.last_second = second;
            self.render(bytes_done);
        }
    }

    /// Unconditional final render at the end of a pass.
    pub fn finish(&mut self, bytes_done: u64) {
        self.render(bytes_done);
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.started.elapsed().as_secs()
    }

    fn render(&self, bytes_done: u64) {
        let percent = percent_done(bytes_done, self.total);
        print!(
            "\r... {percent:>3}% / {bytes_done} of {} bytes",
            self.total
        );
        if let Some(eta) = eta_seconds(self.elapsed_seconds(), percent) {
            print!(", about {} left", format_elapsed(eta));
        }
        io::stdout().flush().ok();
    }
}

/// Integer-truncated completion percentage. An empty target is complete by
/// definition.
pub fn percent_done(bytes_done: u64, total: u64) -> u64 {
    if total == 0 {
        return 100;
    }
    ((u128::from(bytes_done) * 100) / u128::from(total)) as u64
}

/// Remaining-time estimate from elapsed time and completion percentage.
/// Undefined (and suppressed) until any progress is measurable, and once
/// the pass is complete.
pub fn eta_seconds(elapsed: u64, percent: u64) -> Option<u64> {
    if percent == 0 || percent >= 100 {
        return None;
    }
    Some(elapsed * (100 - percent) / percent)
}

/// "2 hours, 1 minute, 30 seconds" — non-zero components only, singular
/// forms for one.
pub fn format_elapsed(total_secs: u64) -> String {
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    let mut parts = Vec::new();
    if hours > 0 {
        parts.push(unit(hours, "hour"));
    }
    if minutes > 0 {
        parts.push(unit(minutes, "minute"));
    }
    if seconds > 0 || parts.is_empty() {
        parts.push(unit(seconds, "second"));
    }
    parts.join(", ")
}

fn unit(value: u64, name: &str) -> String {
    if value == 1 {
        format!("1 {name}")
    } else {
        format!("{value} {name}s")
    }
}
