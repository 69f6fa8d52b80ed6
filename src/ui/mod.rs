pub mod progress;

pub use progress::{format_elapsed, ProgressReporter};
