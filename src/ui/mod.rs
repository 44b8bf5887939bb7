//! User interface abstraction
//!
//! The [`UI`] trait carries everything the command line prints. Live progress
//! during a run is shown by [`console::ConsoleObserver`].

use crate::error::Result;
use crate::run_info::RunInfo;
use std::io::{self, Write};

pub mod console;
pub mod test_ui;

/// Abstract UI trait for command interaction
pub trait UI {
    /// Output a message to the user
    fn output(&mut self, message: &str) -> Result<()>;

    /// Output an error message
    fn error(&mut self, message: &str) -> Result<()>;

    /// Output a warning message
    fn warning(&mut self, message: &str) -> Result<()>;

    /// Output the summary of a finished run
    fn summary(&mut self, info: &RunInfo) -> Result<()> {
        self.output(&format_summary(info))?;
        if let Some(failed) = &info.failed_test_id {
            self.output(&format!("First failure: {}", failed))?;
        }
        Ok(())
    }
}

/// One-line summary of a run, e.g. `Ran 4 tests in 0.012s: 3 passed, 1 failed`.
pub fn format_summary(info: &RunInfo) -> String {
    let seconds = info.session_run_time.num_milliseconds() as f64 / 1000.0;
    let mut parts = vec![format!("{} passed", info.success_count)];
    let counters = [
        (info.failed_count, "failed"),
        (info.error_count, "errors"),
        (info.skip_count, "skipped"),
        (info.expected_failure_count, "expected failures"),
        (info.unexpected_success_count, "unexpected successes"),
    ];
    for (count, label) in counters {
        if count > 0 {
            parts.push(format!("{} {}", count, label));
        }
    }
    format!(
        "Ran {} tests in {:.3}s: {}",
        info.run_count,
        seconds,
        parts.join(", ")
    )
}

/// Command-line UI implementation
pub struct CliUI {
    stdout: Box<dyn Write>,
    stderr: Box<dyn Write>,
}

impl CliUI {
    /// Creates a new command-line UI instance using stdout and stderr.
    pub fn new() -> Self {
        CliUI {
            stdout: Box::new(io::stdout()),
            stderr: Box::new(io::stderr()),
        }
    }
}

impl Default for CliUI {
    fn default() -> Self {
        Self::new()
    }
}

impl UI for CliUI {
    fn output(&mut self, message: &str) -> Result<()> {
        writeln!(self.stdout, "{}", message)?;
        Ok(())
    }

    fn error(&mut self, message: &str) -> Result<()> {
        writeln!(self.stderr, "{} {}", ::console::style("Error:").red().bold(), message)?;
        Ok(())
    }

    fn warning(&mut self, message: &str) -> Result<()> {
        writeln!(self.stderr, "{} {}", ::console::style("Warning:").yellow(), message)?;
        Ok(())
    }
}
