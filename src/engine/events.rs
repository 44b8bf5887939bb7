//! Events passed to engine plugins

use crate::bridge::BackendOutcome;
use crate::partial::RunMode;
use crate::suite::{Catalog, TestNode};
use crate::test_id::TestId;
use regex::Regex;
use std::path::Path;

/// Request to load every test below a directory.
pub struct LoadFromDirEvent<'a> {
    pub catalog: &'a Catalog,
    pub start_dir: &'a Path,
    pub top_level_dir: &'a Path,
    pub pattern: &'a Regex,
    /// Trees contributed by the plugins handling the event so far.
    pub extra_tests: Vec<TestNode>,
}

/// Request to load the tests of one dotted name.
pub struct LoadFromNameEvent<'a> {
    pub catalog: &'a Catalog,
    pub name: &'a str,
    pub extra_tests: Vec<TestNode>,
}

/// What the engine does with the loaded suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Execution {
    /// Run every test.
    Run,
    /// Collect the tests without running them.
    Collect,
    /// Run only the first test, in the given mode.
    Partial(RunMode),
}

/// Sent once the suite is loaded; plugins may change how it is executed.
pub struct StartTestRunEvent<'a> {
    pub suite: &'a TestNode,
    pub execution: Execution,
    pub fail_fast: bool,
    /// Number of `-v` flags given to the engine.
    pub verbosity: u8,
}

pub struct TestOutcomeEvent<'a> {
    pub test_id: &'a TestId,
    pub outcome: BackendOutcome,
    pub expected: bool,
}

/// Sent after the suite was executed.
#[derive(Debug, Clone, Copy)]
pub struct StopTestRunEvent {
    pub execution: Execution,
    pub tests_run: usize,
    pub failures: usize,
}
