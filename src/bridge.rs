//! Normalizing backend lifecycle callbacks into observer notifications
//!
//! Every runner backend reports through the [`TestListener`] calls of an
//! [`EventBridge`]. The bridge keeps the [`RunInfo`] of the run up to date and
//! pushes per-test notifications, keyed by base id, to an optional
//! [`RunObserver`].

use crate::partial::TestListener;
use crate::run_info::RunInfo;
use crate::test_id::TestId;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// Raw outcome of one test as a backend reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendOutcome {
    Pass,
    Fail,
    Error,
    Skip,
    /// Anything the backend could not classify.
    Unknown,
}

/// Normalized result of one test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultKind {
    Error,
    Fail,
    ExpectedFail,
    Skip,
    Pass,
    UnexpectedPass,
}

impl ResultKind {
    /// Combine a backend outcome with whether it was the expected one.
    ///
    /// ```
    /// use testrig::bridge::{BackendOutcome, ResultKind};
    ///
    /// assert_eq!(ResultKind::from_backend(BackendOutcome::Fail, true), Some(ResultKind::ExpectedFail));
    /// assert_eq!(ResultKind::from_backend(BackendOutcome::Pass, false), Some(ResultKind::UnexpectedPass));
    /// assert_eq!(ResultKind::from_backend(BackendOutcome::Unknown, true), None);
    /// ```
    pub fn from_backend(outcome: BackendOutcome, expected: bool) -> Option<Self> {
        match (outcome, expected) {
            (BackendOutcome::Error, _) => Some(ResultKind::Error),
            (BackendOutcome::Fail, true) => Some(ResultKind::ExpectedFail),
            (BackendOutcome::Fail, false) => Some(ResultKind::Fail),
            (BackendOutcome::Skip, _) => Some(ResultKind::Skip),
            (BackendOutcome::Pass, true) => Some(ResultKind::Pass),
            (BackendOutcome::Pass, false) => Some(ResultKind::UnexpectedPass),
            (BackendOutcome::Unknown, _) => None,
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            ResultKind::Error => Severity::Error,
            ResultKind::Fail | ResultKind::ExpectedFail => Severity::Failed,
            ResultKind::Skip => Severity::Skipped,
            ResultKind::Pass | ResultKind::UnexpectedPass => Severity::Success,
        }
    }

    /// Whether this result makes the test the run's failed test.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            ResultKind::Error | ResultKind::Fail | ResultKind::ExpectedFail
        )
    }
}

/// How bad a test's result is, for display. Ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Success,
    Skipped,
    Failed,
    Error,
}

/// Observer of a test run. Every notification has a no-op default.
pub trait RunObserver: Send + Sync {
    fn on_session_start(&self) {}

    fn on_test_start(&self, _base_id: &TestId, _at: DateTime<Utc>) {}

    fn on_test_stop(&self, _base_id: &TestId, _elapsed: Duration) {}

    /// `severity` is the worst seen for `base_id` in this run so far.
    fn show_result(&self, _base_id: &TestId, _severity: Severity) {}

    fn on_all_tests_finished(&self) {}

    fn repaint(&self) {}
}

/// Turns lifecycle callbacks of one run into [`RunInfo`] updates and
/// observer notifications.
pub struct EventBridge {
    info: RunInfo,
    observer: Option<Arc<dyn RunObserver>>,
    severities: HashMap<TestId, Severity>,
    started: HashSet<TestId>,
}

impl EventBridge {
    pub fn new(observer: Option<Arc<dyn RunObserver>>) -> Self {
        EventBridge {
            info: RunInfo::new(),
            observer,
            severities: HashMap::new(),
            started: HashSet::new(),
        }
    }

    fn notify(&self, f: impl FnOnce(&dyn RunObserver)) {
        if let Some(observer) = &self.observer {
            f(observer.as_ref());
        }
    }

    pub fn start_run(&mut self) {
        self.notify(|o| o.repaint());
        self.info.failed_test_id = None;
        self.info.session_start = Some(Utc::now());
        self.info.clear_start_times();
        self.severities.clear();
        self.started = self.info.run_test_ids.iter().cloned().collect();
        self.notify(|o| o.on_session_start());
    }

    pub fn stop_run(&mut self) {
        if let Some(start) = self.info.session_start {
            self.info.session_run_time = Utc::now() - start;
        }
        debug!(
            "Run finished: {} tests in {}ms",
            self.info.run_count,
            self.info.session_run_time.num_milliseconds()
        );
        self.notify(|o| o.on_all_tests_finished());
    }

    pub fn run_info(&self) -> &RunInfo {
        &self.info
    }

    pub fn into_run_info(self) -> RunInfo {
        self.info
    }
}

impl TestListener for EventBridge {
    fn start_test(&mut self, test_id: &TestId) {
        let now = Utc::now();
        self.info.run_count += 1;
        self.info.record_start(test_id, now);
        let base_id = test_id.base_id();
        if self.started.insert(base_id.clone()) {
            self.info.run_test_ids.push(base_id.clone());
            self.notify(|o| o.on_test_start(&base_id, now));
        }
    }

    fn outcome(&mut self, test_id: &TestId, outcome: BackendOutcome, expected: bool) {
        let Some(kind) = ResultKind::from_backend(outcome, expected) else {
            warn!("Unknown outcome reported for {}", test_id);
            return;
        };
        let base_id = test_id.base_id();
        match kind {
            ResultKind::Error => self.info.error_count += 1,
            ResultKind::Fail => self.info.failed_count += 1,
            ResultKind::ExpectedFail => self.info.expected_failure_count += 1,
            ResultKind::Skip => self.info.skip_count += 1,
            ResultKind::Pass => self.info.success_count += 1,
            ResultKind::UnexpectedPass => self.info.unexpected_success_count += 1,
        }
        if kind.is_failure() {
            self.info.record_failed_test_id(&base_id);
        }

        let severity = self
            .severities
            .entry(base_id.clone())
            .and_modify(|s| *s = (*s).max(kind.severity()))
            .or_insert(kind.severity());
        let severity = *severity;
        self.notify(|o| o.show_result(&base_id, severity));
    }

    fn stop_test(&mut self, test_id: &TestId) {
        let now = Utc::now();
        let elapsed = match self.info.start_time_of(test_id) {
            Some(start) => now - start,
            None => Duration::zero(),
        };
        self.info.last_test_run_time = elapsed;
        let base_id = test_id.base_id();
        self.notify(|o| o.on_test_stop(&base_id, elapsed));
        self.notify(|o| o.repaint());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl RunObserver for Recorder {
        fn on_session_start(&self) {
            self.events.lock().unwrap().push("session".to_string());
        }

        fn on_test_start(&self, base_id: &TestId, _at: DateTime<Utc>) {
            self.events.lock().unwrap().push(format!("start {}", base_id));
        }

        fn show_result(&self, base_id: &TestId, severity: Severity) {
            self.events
                .lock()
                .unwrap()
                .push(format!("result {} {:?}", base_id, severity));
        }

        fn on_all_tests_finished(&self) {
            self.events.lock().unwrap().push("finished".to_string());
        }
    }

    fn report(bridge: &mut EventBridge, id: &str, outcome: BackendOutcome, expected: bool) {
        let id = TestId::new(id);
        bridge.start_test(&id);
        bridge.outcome(&id, outcome, expected);
        bridge.stop_test(&id);
    }

    #[test]
    fn test_severity_order() {
        assert!(Severity::Success < Severity::Skipped);
        assert!(Severity::Skipped < Severity::Failed);
        assert!(Severity::Failed < Severity::Error);
    }

    #[test]
    fn test_parameterized_instances_share_base_id() {
        let mut bridge = EventBridge::new(None);
        bridge.start_run();
        report(&mut bridge, "m.C.test_p:1", BackendOutcome::Pass, true);
        report(&mut bridge, "m.C.test_p:2", BackendOutcome::Pass, true);
        report(&mut bridge, "m.C.test_q", BackendOutcome::Pass, true);
        bridge.stop_run();

        let info = bridge.into_run_info();
        assert_eq!(info.run_count, 3);
        assert_eq!(
            info.run_test_ids,
            vec![TestId::new("m.C.test_p"), TestId::new("m.C.test_q")]
        );
        assert_eq!(info.success_count, 3);
    }

    #[test]
    fn test_interleaved_instances_start_each_base_id_once() {
        let recorder = Arc::new(Recorder::default());
        let observer: Arc<dyn RunObserver> = recorder.clone();
        let mut bridge = EventBridge::new(Some(observer));
        bridge.start_run();
        for index in 0..200 {
            let id = format!("m.C.test_{}:{}", index % 3, index);
            report(&mut bridge, &id, BackendOutcome::Pass, true);
        }
        bridge.stop_run();

        let info = bridge.into_run_info();
        assert_eq!(info.run_count, 200);
        assert_eq!(
            info.run_test_ids,
            vec![
                TestId::new("m.C.test_0"),
                TestId::new("m.C.test_1"),
                TestId::new("m.C.test_2"),
            ]
        );
        let starts = recorder
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.starts_with("start "))
            .count();
        assert_eq!(starts, 3);
    }

    #[test]
    fn test_counters_and_sticky_failure() {
        let mut bridge = EventBridge::new(None);
        bridge.start_run();
        report(&mut bridge, "m.C.test_a", BackendOutcome::Pass, true);
        report(&mut bridge, "m.C.test_b", BackendOutcome::Fail, false);
        report(&mut bridge, "m.C.test_c", BackendOutcome::Error, true);
        report(&mut bridge, "m.C.test_d", BackendOutcome::Skip, true);
        report(&mut bridge, "m.C.test_e", BackendOutcome::Fail, true);
        report(&mut bridge, "m.C.test_f", BackendOutcome::Pass, false);
        let info = bridge.run_info();
        assert_eq!(info.success_count, 1);
        assert_eq!(info.failed_count, 1);
        assert_eq!(info.error_count, 1);
        assert_eq!(info.skip_count, 1);
        assert_eq!(info.expected_failure_count, 1);
        assert_eq!(info.unexpected_success_count, 1);
        assert_eq!(info.failed_test_id, Some(TestId::new("m.C.test_b")));
        assert!(info.outcome_total() <= info.run_count);
    }

    #[test]
    fn test_unknown_outcome_counts_nothing() {
        let mut bridge = EventBridge::new(None);
        bridge.start_run();
        report(&mut bridge, "m.C.test_a", BackendOutcome::Unknown, true);
        let info = bridge.run_info();
        assert_eq!(info.run_count, 1);
        assert_eq!(info.outcome_total(), 0);
        assert!(info.failed_test_id.is_none());
    }

    #[test]
    fn test_severity_per_base_id_never_decreases() {
        let observer = Arc::new(Recorder::default());
        let mut bridge = EventBridge::new(Some(observer.clone()));
        bridge.start_run();
        report(&mut bridge, "m.C.test_p:1", BackendOutcome::Fail, false);
        report(&mut bridge, "m.C.test_p:2", BackendOutcome::Pass, true);
        bridge.stop_run();

        let events = observer.events.lock().unwrap().clone();
        assert_eq!(
            events,
            vec![
                "session",
                "start m.C.test_p",
                "result m.C.test_p Failed",
                "result m.C.test_p Failed",
                "finished",
            ]
        );
    }

    #[test]
    fn test_start_run_clears_failed_id() {
        let mut bridge = EventBridge::new(None);
        bridge.start_run();
        report(&mut bridge, "m.C.test_a", BackendOutcome::Error, true);
        bridge.start_run();
        assert!(bridge.run_info().failed_test_id.is_none());
    }
}
