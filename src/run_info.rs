//! Per-run aggregation of test results

use crate::test_id::TestId;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

/// Counters and timings of one test run.
///
/// Written only by the [`EventBridge`](crate::bridge::EventBridge) that owns
/// it during the run; callers get a copy afterwards.
#[derive(Debug, Clone)]
pub struct RunInfo {
    /// Unique base ids in the order they started.
    pub run_test_ids: Vec<TestId>,
    /// Raw number of started tests, parameterized repeats included.
    pub run_count: usize,
    /// Base id of the first test that failed or errored; sticky for the run.
    pub failed_test_id: Option<TestId>,
    pub success_count: usize,
    pub failed_count: usize,
    pub error_count: usize,
    pub skip_count: usize,
    pub expected_failure_count: usize,
    pub unexpected_success_count: usize,
    pub session_start: Option<DateTime<Utc>>,
    pub session_run_time: Duration,
    pub last_test_run_time: Duration,
    test_start_times: HashMap<TestId, DateTime<Utc>>,
}

impl Default for RunInfo {
    fn default() -> Self {
        RunInfo {
            run_test_ids: Vec::new(),
            run_count: 0,
            failed_test_id: None,
            success_count: 0,
            failed_count: 0,
            error_count: 0,
            skip_count: 0,
            expected_failure_count: 0,
            unexpected_success_count: 0,
            session_start: None,
            session_run_time: Duration::zero(),
            last_test_run_time: Duration::zero(),
            test_start_times: HashMap::new(),
        }
    }
}

impl RunInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget everything recorded so far.
    pub fn reset(&mut self) {
        *self = RunInfo::default();
    }

    /// Sum of all outcome counters.
    pub fn outcome_total(&self) -> usize {
        self.success_count
            + self.failed_count
            + self.error_count
            + self.skip_count
            + self.expected_failure_count
            + self.unexpected_success_count
    }

    /// True when nothing failed or errored.
    pub fn was_successful(&self) -> bool {
        self.failed_count == 0 && self.error_count == 0
    }

    /// Record the first failing base id unless one is already recorded.
    pub(crate) fn record_failed_test_id(&mut self, base_id: &TestId) {
        if self.failed_test_id.is_none() {
            self.failed_test_id = Some(base_id.clone());
        }
    }

    pub(crate) fn record_start(&mut self, raw_id: &TestId, at: DateTime<Utc>) {
        self.test_start_times.insert(raw_id.clone(), at);
    }

    /// When `raw_id` started, falling back to the session start.
    pub(crate) fn start_time_of(&self, raw_id: &TestId) -> Option<DateTime<Utc>> {
        self.test_start_times
            .get(raw_id)
            .copied()
            .or(self.session_start)
    }

    pub(crate) fn clear_start_times(&mut self) {
        self.test_start_times.clear();
    }
}
