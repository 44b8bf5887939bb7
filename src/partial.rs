//! Single-test lifecycle execution with partial run modes
//!
//! A test runs as `set_up`, body, `tear_down`. A [`RunMode`] other than
//! [`RunMode::Full`] replaces the skipped phases with no-ops that only log.

use crate::bridge::BackendOutcome;
use crate::error::Error;
use crate::suite::{StepError, StepResult, TestInstance, TestNode};
use crate::test_id::TestId;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::str::FromStr;
use tracing::{debug, error, info};

/// Which lifecycle phases of a test are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RunMode {
    /// `set_up`, body and `tear_down`.
    #[default]
    Full,
    /// Only `set_up`.
    SetupOnly,
    /// `set_up` and body; `tear_down` is skipped so fixtures stay around.
    NoTeardown,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Full => "full",
            RunMode::SetupOnly => "setup-only",
            RunMode::NoTeardown => "no-teardown",
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(RunMode::Full),
            "setup-only" => Ok(RunMode::SetupOnly),
            "no-teardown" => Ok(RunMode::NoTeardown),
            other => Err(Error::Configuration(format!(
                "Unknown run mode '{}', expected full, setup-only or no-teardown",
                other
            ))),
        }
    }
}

/// Receiver of the lifecycle events of executed tests.
///
/// Ids passed in are raw: they keep any parameter suffix.
pub trait TestListener {
    fn start_test(&mut self, test_id: &TestId);

    /// `expected` tells whether the outcome is the one the test expected:
    /// false for a failing ordinary test or a passing expected-failure test.
    fn outcome(&mut self, test_id: &TestId, outcome: BackendOutcome, expected: bool);

    fn stop_test(&mut self, test_id: &TestId);
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panicked".to_string()
    }
}

fn guarded<F>(step: F, on_panic: fn(String) -> StepError) -> StepResult
where
    F: FnOnce() -> StepResult,
{
    match panic::catch_unwind(AssertUnwindSafe(step)) {
        Ok(result) => result,
        Err(payload) => Err(on_panic(panic_message(payload.as_ref()))),
    }
}

fn log_step_error(test_id: &TestId, phase: &str, err: &StepError) {
    let err = Error::Execution {
        test_id: test_id.to_string(),
        message: format!("{} {}", phase, err),
    };
    debug!("{}", err);
}

/// Run the lifecycle of one test and report it to `listener`.
fn run_test(
    instance: &TestInstance,
    mode: RunMode,
    listener: &mut dyn TestListener,
) -> (BackendOutcome, bool) {
    let test_id = instance.id();
    let case = instance.case_name();
    listener.start_test(test_id);

    let (outcome, expected) = match guarded(|| instance.set_up(), StepError::Error) {
        Err(StepError::Skip(reason)) => {
            debug!("{} skipped in set_up: {}", test_id, reason);
            (BackendOutcome::Skip, true)
        }
        Err(err) => {
            log_step_error(test_id, "set_up", &err);
            (BackendOutcome::Error, true)
        }
        Ok(()) if mode == RunMode::SetupOnly => {
            info!("Run {}.set_up() only, skipped the test body and {}.tear_down()", case, case);
            (BackendOutcome::Pass, true)
        }
        Ok(()) => {
            let body = guarded(|| instance.body(), StepError::Failure);
            let mut outcome = match &body {
                Ok(()) => BackendOutcome::Pass,
                Err(StepError::Failure(_)) => BackendOutcome::Fail,
                Err(StepError::Error(_)) => BackendOutcome::Error,
                Err(StepError::Skip(_)) => BackendOutcome::Skip,
            };
            if let Err(err) = &body {
                log_step_error(test_id, "body", err);
            }

            if mode == RunMode::NoTeardown {
                info!("Skipped {}.tear_down()", case);
            } else {
                match guarded(|| instance.tear_down(), StepError::Error) {
                    Ok(()) | Err(StepError::Skip(_)) => {}
                    Err(err) => {
                        log_step_error(test_id, "tear_down", &err);
                        if outcome == BackendOutcome::Pass {
                            outcome = BackendOutcome::Error;
                        }
                    }
                }
            }

            let expected = match outcome {
                BackendOutcome::Pass => !instance.is_expected_failure(),
                BackendOutcome::Fail => instance.is_expected_failure(),
                _ => true,
            };
            (outcome, expected)
        }
    };

    listener.outcome(test_id, outcome, expected);
    listener.stop_test(test_id);
    (outcome, expected)
}

/// Run one leaf of a loaded tree.
///
/// A [`TestNode::FailedToLoad`] leaf reports an error without running
/// anything. Returns None when `leaf` is a suite.
pub fn run_instance(
    leaf: &TestNode,
    mode: RunMode,
    listener: &mut dyn TestListener,
) -> Option<BackendOutcome> {
    match leaf {
        TestNode::Test(instance) => Some(run_test(instance, mode, listener).0),
        TestNode::FailedToLoad { id, reason } => {
            debug!("{} failed to load: {}", id, reason);
            listener.start_test(id);
            listener.outcome(id, BackendOutcome::Error, true);
            listener.stop_test(id);
            Some(BackendOutcome::Error)
        }
        TestNode::Suite { .. } => None,
    }
}

/// Run every leaf of `node` in order.
///
/// With `stop_on_error` the run ends after the first failure or error;
/// expected failures do not stop it.
pub fn run_all(
    node: &TestNode,
    mode: RunMode,
    stop_on_error: bool,
    listener: &mut dyn TestListener,
) {
    for leaf in node.leaves() {
        let failed = match leaf {
            TestNode::Test(instance) => match run_test(instance, mode, listener) {
                (BackendOutcome::Error, _) => true,
                (BackendOutcome::Fail, expected) => !expected,
                _ => false,
            },
            other => run_instance(other, mode, listener).is_some(),
        };
        if stop_on_error && failed {
            info!("Stopping the run after {} did not pass", leaf.id());
            break;
        }
    }
}

/// Run the single concrete test `node` resolves to in `mode`.
///
/// A container resolves to its first leaf. Nothing runs and nothing is
/// reported when no test resolves, including ids that failed to load.
pub fn run_partially(
    node: &TestNode,
    mode: RunMode,
    listener: &mut dyn TestListener,
) -> Option<BackendOutcome> {
    match node.first_leaf() {
        Some(TestNode::Test(instance)) => Some(run_test(instance, mode, listener).0),
        Some(TestNode::FailedToLoad { id, reason }) => {
            error!("No test found to run partially for {}: {}", id, reason);
            None
        }
        _ => {
            error!("No test found to run partially in {}", node.id());
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suite::{ensure, TestCase, TestModule};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
    }

    impl TestListener for Recorder {
        fn start_test(&mut self, test_id: &TestId) {
            self.events.push(format!("start {}", test_id));
        }

        fn outcome(&mut self, test_id: &TestId, outcome: BackendOutcome, expected: bool) {
            self.events
                .push(format!("outcome {} {:?} {}", test_id, outcome, expected));
        }

        fn stop_test(&mut self, test_id: &TestId) {
            self.events.push(format!("stop {}", test_id));
        }
    }

    /// A case whose steps append to a shared trace.
    fn traced_case(trace: &Arc<Mutex<Vec<&'static str>>>) -> TestModule {
        let (s, b, t) = (trace.clone(), trace.clone(), trace.clone());
        TestModule::new("m").with_case(
            TestCase::new("Case")
                .with_set_up(move || {
                    s.lock().unwrap().push("set_up");
                    Ok(())
                })
                .with_tear_down(move || {
                    t.lock().unwrap().push("tear_down");
                    Ok(())
                })
                .test("test_it", move || {
                    b.lock().unwrap().push("body");
                    Ok(())
                }),
        )
    }

    fn run_traced(mode: RunMode) -> (Vec<&'static str>, Option<BackendOutcome>) {
        let trace = Arc::new(Mutex::new(Vec::new()));
        let node = traced_case(&trace).to_node();
        let mut recorder = Recorder::default();
        let outcome = run_partially(&node, mode, &mut recorder);
        let trace = trace.lock().unwrap().clone();
        (trace, outcome)
    }

    #[test]
    fn test_run_mode_round_trip() {
        for mode in [RunMode::Full, RunMode::SetupOnly, RunMode::NoTeardown] {
            assert_eq!(mode.to_string().parse::<RunMode>().unwrap(), mode);
        }
        assert!("teardown-only".parse::<RunMode>().is_err());
        assert_eq!(RunMode::default(), RunMode::Full);
    }

    #[test]
    fn test_full_runs_every_phase() {
        let (trace, outcome) = run_traced(RunMode::Full);
        assert_eq!(trace, vec!["set_up", "body", "tear_down"]);
        assert_eq!(outcome, Some(BackendOutcome::Pass));
    }

    #[test]
    fn test_setup_only() {
        let (trace, outcome) = run_traced(RunMode::SetupOnly);
        assert_eq!(trace, vec!["set_up"]);
        assert_eq!(outcome, Some(BackendOutcome::Pass));
    }

    #[test]
    fn test_no_teardown() {
        let (trace, outcome) = run_traced(RunMode::NoTeardown);
        assert_eq!(trace, vec!["set_up", "body"]);
        assert_eq!(outcome, Some(BackendOutcome::Pass));
    }

    #[test]
    fn test_failing_set_up_is_error_and_skips_tear_down() {
        let torn_down = Arc::new(Mutex::new(false));
        let flag = torn_down.clone();
        let node = TestModule::new("m")
            .with_case(
                TestCase::new("Case")
                    .with_set_up(|| ensure(false, "no fixture"))
                    .with_tear_down(move || {
                        *flag.lock().unwrap() = true;
                        Ok(())
                    })
                    .test("test_it", || Ok(())),
            )
            .to_node();
        let mut recorder = Recorder::default();
        let outcome = run_partially(&node, RunMode::SetupOnly, &mut recorder);
        assert_eq!(outcome, Some(BackendOutcome::Error));
        assert!(!*torn_down.lock().unwrap());
    }

    #[test]
    fn test_panicking_body_is_failure() {
        let node = TestModule::new("m")
            .with_case(TestCase::new("Case").test("test_it", || panic!("boom")))
            .to_node();
        let mut recorder = Recorder::default();
        let outcome = run_partially(&node, RunMode::Full, &mut recorder);
        assert_eq!(outcome, Some(BackendOutcome::Fail));
        assert_eq!(
            recorder.events,
            vec![
                "start m.Case.test_it",
                "outcome m.Case.test_it Fail false",
                "stop m.Case.test_it",
            ]
        );
    }

    #[test]
    fn test_failing_tear_down_turns_pass_into_error() {
        let node = TestModule::new("m")
            .with_case(
                TestCase::new("Case")
                    .with_tear_down(|| panic!("cleanup failed"))
                    .test("test_it", || Ok(())),
            )
            .to_node();
        let mut recorder = Recorder::default();
        assert_eq!(
            run_partially(&node, RunMode::Full, &mut recorder),
            Some(BackendOutcome::Error)
        );
    }

    #[test]
    fn test_expected_failure_flags() {
        let node = TestModule::new("m")
            .with_case(
                TestCase::new("Case")
                    .expected_failure("test_known", || ensure(false, "known"))
                    .expected_failure("test_fixed", || Ok(())),
            )
            .to_node();
        let mut recorder = Recorder::default();
        run_all(&node, RunMode::Full, false, &mut recorder);
        assert!(recorder
            .events
            .contains(&"outcome m.Case.test_known Fail true".to_string()));
        assert!(recorder
            .events
            .contains(&"outcome m.Case.test_fixed Pass false".to_string()));
    }

    #[test]
    fn test_failed_to_load_runs_as_error() {
        let node = TestNode::FailedToLoad {
            id: TestId::new("pkg.test_broken"),
            reason: "bad import".to_string(),
        };
        let mut recorder = Recorder::default();
        assert_eq!(
            run_instance(&node, RunMode::Full, &mut recorder),
            Some(BackendOutcome::Error)
        );
    }

    #[test]
    fn test_nothing_to_run_partially() {
        let mut recorder = Recorder::default();
        assert_eq!(
            run_partially(&TestNode::empty(), RunMode::Full, &mut recorder),
            None
        );
        assert!(recorder.events.is_empty());
    }

    #[test]
    fn test_failed_to_load_is_not_run_partially() {
        let node = TestNode::suite(
            "pkg",
            vec![TestNode::FailedToLoad {
                id: TestId::new("pkg.test_a.Case.test_missing"),
                reason: "module 'pkg.test_a' has no attribute 'Case.test_missing'".to_string(),
            }],
        );
        let mut recorder = Recorder::default();
        assert_eq!(
            run_partially(&node, RunMode::SetupOnly, &mut recorder),
            None
        );
        assert!(recorder.events.is_empty());
    }

    #[test]
    fn test_stop_on_error() {
        let node = TestModule::new("m")
            .with_case(
                TestCase::new("Case")
                    .test("test_a", || ensure(false, "nope"))
                    .test("test_b", || Ok(())),
            )
            .to_node();
        let mut recorder = Recorder::default();
        run_all(&node, RunMode::Full, true, &mut recorder);
        assert_eq!(recorder.events.len(), 3);
    }
}
