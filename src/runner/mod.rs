//! Test runners
//!
//! A [`TestRunner`] discovers, runs and partially runs tests through one
//! backend. Runners never fail: problems are logged and give empty results.
//! The set of runners is closed; [`create`] builds one per [`RunnerKind`].

use crate::bridge::RunObserver;
use crate::error::Error;
use crate::partial::RunMode;
use crate::run_info::RunInfo;
use crate::suite::Catalog;
use crate::test_id::TestId;
use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

pub mod basic;
pub mod plugin;
pub mod stub;

pub use basic::BasicRunner;
pub use plugin::PluginRunner;
pub use stub::StubRunner;

/// The available runner backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RunnerKind {
    /// Native loader and executor.
    Basic,
    /// The multi-plugin engine.
    Plugin,
    /// Placeholder that is never valid and does nothing.
    Stub,
}

impl RunnerKind {
    /// Every kind, in registry order.
    pub fn all() -> [RunnerKind; 3] {
        [RunnerKind::Basic, RunnerKind::Plugin, RunnerKind::Stub]
    }

    pub fn name(&self) -> &'static str {
        match self {
            RunnerKind::Basic => "basic",
            RunnerKind::Plugin => "plugin",
            RunnerKind::Stub => "stub",
        }
    }
}

impl fmt::Display for RunnerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RunnerKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RunnerKind::all()
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| Error::Configuration(format!("Invalid runner name: {}", s)))
    }
}

/// Settings a runner needs for one call.
pub struct RunContext<'a> {
    /// A directory path or a dotted module path to discover from.
    pub start_dir_or_module: &'a str,
    pub top_dir: &'a str,
    pub stop_on_error: bool,
    pub observer: Option<Arc<dyn RunObserver>>,
    /// File name pattern of test sources.
    pub pattern: &'a Regex,
}

/// Uniform contract over the runner backends.
pub trait TestRunner {
    fn kind(&self) -> RunnerKind;

    fn name(&self) -> &'static str {
        self.kind().name()
    }

    /// Whether the backend can run in this build.
    fn is_valid(&self) -> bool;

    /// Report on readiness. Only logs.
    fn check(&self) {
        if self.is_valid() {
            debug!("The test runner {} is ready", self.name());
        } else {
            warn!("The test runner {} is not usable", self.name());
        }
    }

    fn run_tests(&mut self, ctx: &RunContext<'_>, test_ids: &[TestId]) -> RunInfo;

    fn run_single_test_partially(
        &mut self,
        ctx: &RunContext<'_>,
        test_id: &TestId,
        mode: RunMode,
    ) -> RunInfo;

    /// Discover every test under the context's start, as unique base ids.
    fn iter_all_test_ids(&mut self, ctx: &RunContext<'_>) -> std::vec::IntoIter<TestId>;

    /// Whether the last discovery hit a module that failed to import.
    fn has_last_lister_error(&self) -> bool;

    fn last_run_info(&self) -> &RunInfo;

    fn last_run_test_ids(&self) -> &[TestId] {
        &self.last_run_info().run_test_ids
    }

    fn last_failed_test_id(&self) -> Option<&TestId> {
        self.last_run_info().failed_test_id.as_ref()
    }

    /// Whether package-level ids have to be split into module ids before
    /// they are passed to [`TestRunner::run_tests`].
    fn avoid_run_tests_on_package_level(&self) -> bool {
        false
    }
}

/// Create the runner of `kind` for the tests of `catalog`.
pub fn create(kind: RunnerKind, catalog: Arc<Catalog>) -> Box<dyn TestRunner> {
    match kind {
        RunnerKind::Basic => Box::new(BasicRunner::new(catalog)),
        RunnerKind::Plugin => Box::new(PluginRunner::new(catalog)),
        RunnerKind::Stub => Box::new(StubRunner::new()),
    }
}
