//! Multi-plugin discovery and execution engine
//!
//! The engine is driven like a command-line program: it parses an argv,
//! instantiates the selected [`Plugin`]s from a [`PluginRegistry`], lets the
//! discovery plugins load a suite, gives every plugin a chance to change how
//! the suite is executed, and runs it while forwarding the lifecycle of each
//! test to the plugins.
//!
//! ```
//! use std::sync::Arc;
//! use testrig::engine::{Engine, PluginRegistry};
//! use testrig::suite::{loader, Catalog, TestCase, TestModule};
//!
//! let catalog = Catalog::new().with_module(
//!     TestModule::new("pkg.test_it").with_case(TestCase::new("Case").test("test_ok", || Ok(()))),
//! );
//! let pattern = loader::compile_pattern(loader::DEFAULT_TEST_PATTERN).unwrap();
//! let engine = Engine::load(Arc::new(catalog), pattern).unwrap();
//! let report = engine
//!     .discover(&["testrig-engine", "pkg.test_it"], &PluginRegistry::with_builtins())
//!     .unwrap();
//! assert_eq!(report.tests_run, 1);
//! ```

pub mod events;
pub mod plugins;
pub mod worker;

pub use events::{Execution, StartTestRunEvent, StopTestRunEvent};
pub use plugins::{Listing, Plugin, PluginRegistry, Stage};
pub use worker::{PluginSpec, WorkerConfig};

use crate::error::{Error, Result};
use crate::partial::{run_all, run_partially, RunMode};
use crate::resolver::is_path;
use crate::suite::{Catalog, TestNode};
use clap::{ArgAction, Parser};
use events::{LoadFromDirEvent, LoadFromNameEvent};
use plugins::{PluginDispatch, DEFAULT_PLUGINS};
use regex::Regex;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Program name used as `argv[0]`.
pub const ENGINE_PROGRAM: &str = "testrig-engine";

/// Command-line arguments of the engine.
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "testrig-engine")]
pub struct EngineArgs {
    /// Increase verbosity
    #[arg(short = 'v', action = ArgAction::Count)]
    pub verbose: u8,

    /// Load a plugin by name
    #[arg(long = "plugin", value_name = "NAME")]
    pub plugins: Vec<String>,

    /// Do not load a plugin, even a default one
    #[arg(long = "exclude-plugin", value_name = "NAME")]
    pub exclude_plugins: Vec<String>,

    /// Directory to start discovery in
    #[arg(short = 's', long = "start-dir")]
    pub start_dir: Option<String>,

    /// Top level directory of the project, module names are relative to it
    #[arg(short = 't', long = "top-level-dir")]
    pub top_level_dir: Option<String>,

    /// Stop the run after the first failure or error
    #[arg(long)]
    pub fail_fast: bool,

    /// List tests instead of running them
    #[arg(long)]
    pub list_tests: bool,

    /// Run only part of a single test
    #[arg(long)]
    pub partial_test: bool,

    /// Names of the tests to load
    pub names: Vec<String>,
}

impl EngineArgs {
    /// Whether the plugin switch `name` was given.
    pub fn switch_enabled(&self, name: &str) -> bool {
        match name {
            "list-tests" => self.list_tests,
            "partial-test" => self.partial_test,
            _ => false,
        }
    }
}

/// Result of one engine session.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub execution: Execution,
    /// Number of tests started.
    pub tests_run: usize,
    /// Failures and errors, expected failures excluded.
    pub failures: usize,
    /// The session as a worker would rebuild it.
    pub worker: WorkerConfig,
}

impl SessionReport {
    pub fn was_successful(&self) -> bool {
        self.failures == 0
    }
}

/// The engine bound to the tests of one catalog.
pub struct Engine {
    catalog: Arc<Catalog>,
    pattern: Regex,
}

impl Engine {
    /// Load the engine.
    ///
    /// Fails with [`Error::DependencyUnavailable`] when the crate was built
    /// without the `plugin-engine` feature.
    pub fn load(catalog: Arc<Catalog>, pattern: Regex) -> Result<Self> {
        if !cfg!(feature = "plugin-engine") {
            return Err(Error::DependencyUnavailable {
                name: "plugin".to_string(),
                remedy: "build testrig with the `plugin-engine` feature".to_string(),
            });
        }
        Ok(Engine { catalog, pattern })
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Parse `argv` and run one session with the plugins of `registry`.
    pub fn discover<S: AsRef<str>>(
        &self,
        argv: &[S],
        registry: &PluginRegistry,
    ) -> Result<SessionReport> {
        let args = EngineArgs::try_parse_from(argv.iter().map(|a| a.as_ref()))
            .map_err(|e| Error::Configuration(e.to_string()))?;
        self.run_session(&args, registry)
    }

    /// Rebuild and run the session described by a worker configuration.
    pub fn run_worker(
        &self,
        config: &WorkerConfig,
        registry: &mut PluginRegistry,
    ) -> Result<SessionReport> {
        registry.apply_worker_options(config);
        self.discover(&config.to_argv(DEFAULT_PLUGINS), registry)
    }

    fn load_suite(&self, args: &EngineArgs, plugins: &mut [Box<dyn Plugin>]) -> TestNode {
        if !args.names.is_empty() {
            let mut children = Vec::new();
            for name in &args.names {
                let mut event = LoadFromNameEvent {
                    catalog: &self.catalog,
                    name,
                    extra_tests: Vec::new(),
                };
                for plugin in plugins.iter_mut() {
                    plugin.load_tests_from_name(&mut event);
                }
                children.extend(event.extra_tests);
            }
            return TestNode::suite("", children);
        }

        let start = args.start_dir.as_deref().unwrap_or(".");
        let top = args.top_level_dir.as_deref().unwrap_or(start);
        if !is_path(start) && !Path::new(start).is_dir() {
            debug!("{} is not a directory, loading it by name", start);
            let mut event = LoadFromNameEvent {
                catalog: &self.catalog,
                name: start,
                extra_tests: Vec::new(),
            };
            for plugin in plugins.iter_mut() {
                plugin.load_tests_from_name(&mut event);
            }
            return TestNode::suite("", event.extra_tests);
        }

        let mut event = LoadFromDirEvent {
            catalog: &self.catalog,
            start_dir: Path::new(start),
            top_level_dir: Path::new(top),
            pattern: &self.pattern,
            extra_tests: Vec::new(),
        };
        for plugin in plugins.iter_mut() {
            plugin.load_tests_from_dir(&mut event);
        }
        TestNode::suite("", event.extra_tests)
    }

    fn run_session(&self, args: &EngineArgs, registry: &PluginRegistry) -> Result<SessionReport> {
        let mut plugins = registry.build(args);
        debug!(
            "Engine plugins: {}",
            plugins.iter().map(|p| p.name()).collect::<Vec<_>>().join(", ")
        );

        let mut worker = WorkerConfig {
            start_dir: args.start_dir.clone(),
            top_level_dir: args.top_level_dir.clone(),
            fail_fast: args.fail_fast,
            names: args.names.clone(),
            ..WorkerConfig::default()
        };
        for plugin in &plugins {
            plugin.register_in_subprocess(&mut worker);
        }

        let suite = self.load_suite(args, &mut plugins);
        let mut start = StartTestRunEvent {
            suite: &suite,
            execution: Execution::Run,
            fail_fast: args.fail_fast,
            verbosity: args.verbose,
        };
        for plugin in plugins.iter_mut() {
            plugin.start_test_run(&mut start);
        }
        let (execution, fail_fast) = (start.execution, start.fail_fast);

        let mut dispatch = PluginDispatch {
            plugins: &mut plugins,
            tests_run: 0,
            failures: 0,
        };
        match execution {
            Execution::Run => run_all(&suite, RunMode::Full, fail_fast, &mut dispatch),
            Execution::Partial(mode) => {
                info!("Running the first test of the suite in {} mode", mode);
                run_partially(&suite, mode, &mut dispatch);
            }
            Execution::Collect => debug!("Collected {} tests", suite.count_leaves()),
        }
        let (tests_run, failures) = (dispatch.tests_run, dispatch.failures);

        let stop = StopTestRunEvent {
            execution,
            tests_run,
            failures,
        };
        for plugin in plugins.iter_mut() {
            plugin.stop_test_run(&stop);
        }

        Ok(SessionReport {
            execution,
            tests_run,
            failures,
            worker,
        })
    }
}
