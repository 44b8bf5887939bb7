//! The test manager
//!
//! [`TestManager`] owns the discovery settings, selects the active runner and
//! forwards every operation to it. Runners are created lazily, once per kind.
//! Without an active runner every operation is a no-op.

use crate::bridge::RunObserver;
use crate::config::RigConfig;
use crate::error::Result;
use crate::partial::RunMode;
use crate::run_info::RunInfo;
use crate::runner::{self, RunContext, RunnerKind, TestRunner};
use crate::suite::loader::{compile_pattern, DEFAULT_TEST_PATTERN};
use crate::suite::Catalog;
use crate::test_id::{self, TestId};
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, warn};

pub struct TestManager {
    catalog: Arc<Catalog>,
    start_dir_or_module: String,
    top_dir: String,
    stop_on_error: bool,
    pattern: Regex,
    observer: Option<Arc<dyn RunObserver>>,
    runner_mode: Option<RunnerKind>,
    runners: HashMap<RunnerKind, Box<dyn TestRunner>>,
}

impl TestManager {
    /// A manager using the basic runner with the default test file pattern.
    pub fn new(catalog: Arc<Catalog>) -> Result<Self> {
        let mut manager = TestManager {
            catalog,
            start_dir_or_module: String::new(),
            top_dir: String::new(),
            stop_on_error: false,
            pattern: compile_pattern(DEFAULT_TEST_PATTERN)?,
            observer: None,
            runner_mode: Some(RunnerKind::Basic),
            runners: HashMap::new(),
        };
        manager.runner_by_kind(RunnerKind::Basic);
        Ok(manager)
    }

    /// A manager set up from persisted settings.
    pub fn from_config(catalog: Arc<Catalog>, config: &RigConfig) -> Result<Self> {
        let mut manager = TestManager::new(catalog)?;
        manager.set_test_pattern(config.test_pattern())?;
        manager.set_dirs(
            config.start_dir_or_module.as_deref().unwrap_or(""),
            config.top_dir.as_deref(),
        );
        manager.set_stop_on_error(config.stop_on_error);
        if let Some(kind) = config.runner_kind()? {
            manager.set_runner_mode(kind);
        }
        Ok(manager)
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn set_observer(&mut self, observer: Option<Arc<dyn RunObserver>>) {
        self.observer = observer;
    }

    pub fn set_test_pattern(&mut self, pattern: &str) -> Result<()> {
        self.pattern = compile_pattern(pattern)?;
        Ok(())
    }

    pub fn test_pattern(&self) -> &str {
        self.pattern.as_str()
    }

    /// Set where discovery starts; the top directory follows when the two
    /// are no longer nested.
    pub fn set_start_dir_or_module(&mut self, start: &str) {
        self.start_dir_or_module = start.to_string();
        if !start.is_empty() && (self.top_dir.is_empty() || !start.starts_with(&self.top_dir)) {
            self.top_dir = start.to_string();
        }
    }

    pub fn start_dir_or_module(&self) -> &str {
        &self.start_dir_or_module
    }

    /// Set the top directory; the start follows when it is not below it.
    pub fn set_top_dir(&mut self, top: &str) {
        self.top_dir = top.to_string();
        if !top.is_empty()
            && (self.start_dir_or_module.is_empty() || !self.start_dir_or_module.starts_with(top))
        {
            self.start_dir_or_module = top.to_string();
        }
    }

    pub fn top_dir(&self) -> &str {
        &self.top_dir
    }

    /// Set both at once. An explicit `top` is kept unless it is nested below
    /// the current top; without one the start is used.
    pub fn set_dirs(&mut self, start: &str, top: Option<&str>) {
        self.set_start_dir_or_module(start);
        let top = match top {
            Some(top) if !top.is_empty() => top.to_string(),
            _ => self.top_dir.clone(),
        };
        if start.is_empty() {
            return;
        }
        let candidate = if top.is_empty() { start.to_string() } else { top };
        if self.top_dir.is_empty() || !candidate.starts_with(&self.top_dir) {
            self.top_dir = candidate;
        }
    }

    pub fn set_stop_on_error(&mut self, stop: bool) {
        self.stop_on_error = stop;
    }

    pub fn stop_on_error(&self) -> bool {
        self.stop_on_error
    }

    fn runner_by_kind(&mut self, kind: RunnerKind) -> &mut Box<dyn TestRunner> {
        let catalog = &self.catalog;
        self.runners.entry(kind).or_insert_with(|| {
            debug!("Creating the {} runner", kind);
            runner::create(kind, catalog.clone())
        })
    }

    /// Switch to the runner of `kind`, creating it on first use.
    pub fn set_runner_mode(&mut self, kind: RunnerKind) {
        self.runner_by_kind(kind).check();
        self.runner_mode = Some(kind);
    }

    /// Switch runners by name. An unknown name leaves no active runner.
    pub fn set_runner_mode_by_name(&mut self, name: &str) {
        match name.parse::<RunnerKind>() {
            Ok(kind) => self.set_runner_mode(kind),
            Err(e) => {
                error!("The runner {} is invalid: {}", name, e);
                self.runner_mode = None;
            }
        }
    }

    pub fn runner_mode(&self) -> Option<RunnerKind> {
        self.runner_mode
    }

    /// The active runner, if any.
    pub fn get_runner(&self) -> Option<&dyn TestRunner> {
        let kind = self.runner_mode?;
        self.runners.get(&kind).map(|runner| runner.as_ref())
    }

    /// Every runner, in registry order.
    pub fn iter_runners(&mut self) -> impl Iterator<Item = &dyn TestRunner> + '_ {
        for kind in RunnerKind::all() {
            self.runner_by_kind(kind);
        }
        let runners = &self.runners;
        RunnerKind::all()
            .into_iter()
            .filter_map(move |kind| runners.get(&kind).map(|runner| runner.as_ref()))
    }

    /// The first valid runner kind, or the basic runner when none is.
    pub fn feasible_runner_mode(&mut self) -> RunnerKind {
        RunnerKind::all()
            .into_iter()
            .find(|kind| self.runner_by_kind(*kind).is_valid())
            .unwrap_or(RunnerKind::Basic)
    }

    fn with_runner<R, F>(&mut self, f: F) -> Option<R>
    where
        F: FnOnce(&mut dyn TestRunner, &RunContext<'_>) -> R,
    {
        let Some(kind) = self.runner_mode else {
            debug!("No active runner");
            return None;
        };
        let ctx = RunContext {
            start_dir_or_module: &self.start_dir_or_module,
            top_dir: &self.top_dir,
            stop_on_error: self.stop_on_error,
            observer: self.observer.clone(),
            pattern: &self.pattern,
        };
        let runner = self.runners.get_mut(&kind)?;
        Some(f(runner.as_mut(), &ctx))
    }

    /// Split package ids into the ids of their modules.
    fn expand_packages(&self, test_ids: &[TestId]) -> Vec<TestId> {
        let mut expanded = Vec::new();
        for id in test_ids {
            let modules = self.catalog.package_modules(id.as_str());
            if modules.is_empty() {
                expanded.push(id.clone());
            } else {
                debug!("Running package {} as {} modules", id, modules.len());
                expanded.extend(modules.into_iter().map(TestId::new));
            }
        }
        expanded
    }

    /// Run the given tests with the active runner.
    pub fn run_tests(&mut self, test_ids: &[TestId]) -> RunInfo {
        if test_ids.is_empty() {
            warn!("No test to run.");
            return RunInfo::default();
        }
        let test_ids = if self.avoid_run_tests_on_package_level() {
            self.expand_packages(test_ids)
        } else {
            test_ids.to_vec()
        };
        self.with_runner(|runner, ctx| runner.run_tests(ctx, &test_ids))
            .unwrap_or_default()
    }

    /// All test ids under the start, discovered on the first pull.
    pub fn iter_all_test_ids(&mut self) -> impl Iterator<Item = TestId> + '_ {
        std::iter::once_with(move || {
            self.with_runner(|runner, ctx| runner.iter_all_test_ids(ctx))
                .unwrap_or_else(|| Vec::new().into_iter())
        })
        .flatten()
    }

    /// Discover every test and run them.
    pub fn run_all_tests(&mut self) -> RunInfo {
        let test_ids: Vec<TestId> = self.iter_all_test_ids().collect();
        if test_ids.is_empty() {
            warn!("No tests found to run.");
            return RunInfo::default();
        }
        self.run_tests(&test_ids)
    }

    /// Run part of the lifecycle of a single test.
    pub fn run_single_test_partially(&mut self, test_id: &TestId, mode: RunMode) -> RunInfo {
        self.with_runner(|runner, ctx| runner.run_single_test_partially(ctx, test_id, mode))
            .unwrap_or_default()
    }

    pub fn last_run_info(&self) -> RunInfo {
        self.get_runner()
            .map(|runner| runner.last_run_info().clone())
            .unwrap_or_default()
    }

    pub fn last_run_test_ids(&self) -> Vec<TestId> {
        self.get_runner()
            .map(|runner| runner.last_run_test_ids().to_vec())
            .unwrap_or_default()
    }

    pub fn last_failed_test_id(&self) -> Option<TestId> {
        self.get_runner()?.last_failed_test_id().cloned()
    }

    pub fn has_last_lister_error(&self) -> bool {
        self.get_runner()
            .is_some_and(|runner| runner.has_last_lister_error())
    }

    pub fn avoid_run_tests_on_package_level(&self) -> bool {
        self.get_runner()
            .is_some_and(|runner| runner.avoid_run_tests_on_package_level())
    }

    pub fn parse_parameterized_test_id<'a>(&self, test_id: &'a str) -> (bool, &'a str) {
        test_id::parse_parameterized_test_id(test_id)
    }
}
