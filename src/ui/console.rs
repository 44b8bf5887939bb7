//! Live run display on the terminal

use crate::bridge::{RunObserver, Severity};
use crate::test_id::TestId;
use chrono::{DateTime, Duration, Utc};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Shows a spinner with the running test and prints every test that did not
/// pass.
pub struct ConsoleObserver {
    bar: ProgressBar,
    results: Mutex<BTreeMap<TestId, Severity>>,
}

impl ConsoleObserver {
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        if let Ok(progress_style) =
            ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {pos} tests {msg}")
        {
            bar.set_style(progress_style);
        }
        Self::with_bar(bar)
    }

    /// An observer that draws nothing.
    pub fn hidden() -> Self {
        Self::with_bar(ProgressBar::hidden())
    }

    fn with_bar(bar: ProgressBar) -> Self {
        ConsoleObserver {
            bar,
            results: Mutex::new(BTreeMap::new()),
        }
    }

    /// Worst result seen per base id.
    pub fn results(&self) -> BTreeMap<TestId, Severity> {
        self.results
            .lock()
            .map(|results| results.clone())
            .unwrap_or_default()
    }
}

impl Default for ConsoleObserver {
    fn default() -> Self {
        Self::new()
    }
}

fn label(severity: Severity) -> String {
    match severity {
        Severity::Success => style("ok").green().to_string(),
        Severity::Skipped => style("skip").yellow().to_string(),
        Severity::Failed => style("FAIL").red().to_string(),
        Severity::Error => style("ERROR").red().bold().to_string(),
    }
}

impl RunObserver for ConsoleObserver {
    fn on_session_start(&self) {
        self.bar.reset();
        if let Ok(mut results) = self.results.lock() {
            results.clear();
        }
    }

    fn on_test_start(&self, base_id: &TestId, _at: DateTime<Utc>) {
        self.bar.set_message(base_id.to_string());
    }

    fn on_test_stop(&self, _base_id: &TestId, _elapsed: Duration) {
        self.bar.inc(1);
    }

    fn show_result(&self, base_id: &TestId, severity: Severity) {
        let previous = self
            .results
            .lock()
            .ok()
            .and_then(|mut results| results.insert(base_id.clone(), severity));
        if severity >= Severity::Failed && previous != Some(severity) {
            self.bar
                .println(format!("{} {}", label(severity), base_id));
        }
    }

    fn on_all_tests_finished(&self) {
        self.bar.finish_and_clear();
    }

    fn repaint(&self) {
        self.bar.tick();
    }
}
