//! Runner backed by the multi-plugin engine
//!
//! Every call assembles an engine argv from an include list and an exclude
//! list of plugins, registers the in-process plugins that report back to this
//! runner, and runs one engine session.

use super::{RunContext, RunnerKind, TestRunner};
use crate::bridge::EventBridge;
use crate::engine::plugins::{
    TestListerPlugin, UiHooksPlugin, ARCHIVE_DISCOVERY, DEDUP, PARTIAL_TEST, RESULT,
    TEST_LISTER, UI_HOOKS,
};
use crate::engine::{Engine, Listing, PluginRegistry, ENGINE_PROGRAM};
use crate::error::{Error, Result};
use crate::partial::RunMode;
use crate::resolver::is_path;
use crate::run_info::RunInfo;
use crate::suite::Catalog;
use crate::test_id::TestId;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Plugins loaded and excluded for one kind of call, plus extra arguments.
struct Invocation {
    plugins: &'static [&'static str],
    excludes: &'static [&'static str],
    extra_args: &'static [&'static str],
}

const RUN: Invocation = Invocation {
    plugins: &[UI_HOOKS, ARCHIVE_DISCOVERY, DEDUP],
    excludes: &[TEST_LISTER, PARTIAL_TEST],
    extra_args: &[],
};

const PARTIAL: Invocation = Invocation {
    plugins: &[UI_HOOKS, ARCHIVE_DISCOVERY, PARTIAL_TEST, DEDUP],
    excludes: &[TEST_LISTER, RESULT],
    extra_args: &["--partial-test"],
};

const LIST: Invocation = Invocation {
    plugins: &[TEST_LISTER, ARCHIVE_DISCOVERY, DEDUP],
    excludes: &[RESULT],
    extra_args: &["--list-tests"],
};

pub struct PluginRunner {
    catalog: Arc<Catalog>,
    available: bool,
    run_mode: RunMode,
    last_argv: Vec<String>,
    last_run: RunInfo,
    lister_error: bool,
}

impl PluginRunner {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        PluginRunner {
            catalog,
            available: cfg!(feature = "plugin-engine"),
            run_mode: RunMode::default(),
            last_argv: Vec::new(),
            last_run: RunInfo::default(),
            lister_error: false,
        }
    }

    /// A runner whose engine cannot be loaded.
    pub fn unavailable(catalog: Arc<Catalog>) -> Self {
        PluginRunner {
            available: false,
            ..PluginRunner::new(catalog)
        }
    }

    /// Mode of the last partial run.
    pub fn run_mode(&self) -> RunMode {
        self.run_mode
    }

    /// Arguments of the last engine session.
    pub fn last_argv(&self) -> &[String] {
        &self.last_argv
    }

    fn engine(&self, ctx: &RunContext<'_>) -> Result<Engine> {
        if !self.available {
            return Err(Error::DependencyUnavailable {
                name: RunnerKind::Plugin.name().to_string(),
                remedy: "build testrig with the `plugin-engine` feature".to_string(),
            });
        }
        Engine::load(self.catalog.clone(), ctx.pattern.clone())
    }

    /// Engine argv for `invocation`.
    ///
    /// `-s`/`-t` are only passed when the start is a filesystem path.
    fn argv(ctx: &RunContext<'_>, invocation: &Invocation, names: &[String]) -> Vec<String> {
        let mut argv = vec![ENGINE_PROGRAM.to_string(), "-v".to_string()];
        for plugin in invocation.plugins {
            argv.push("--plugin".to_string());
            argv.push(plugin.to_string());
        }
        for plugin in invocation.excludes {
            argv.push("--exclude-plugin".to_string());
            argv.push(plugin.to_string());
        }
        argv.extend(invocation.extra_args.iter().map(|a| a.to_string()));
        if is_path(ctx.start_dir_or_module) {
            argv.push("-s".to_string());
            argv.push(ctx.start_dir_or_module.to_string());
            argv.push("-t".to_string());
            argv.push(ctx.top_dir.to_string());
        }
        argv.extend(names.iter().cloned());
        if ctx.stop_on_error {
            argv.push("--fail-fast".to_string());
        }
        argv
    }

    /// Run one session reporting to a fresh bridge and record its run info.
    fn run_session(
        &mut self,
        ctx: &RunContext<'_>,
        invocation: &Invocation,
        names: &[String],
    ) -> RunInfo {
        let engine = match self.engine(ctx) {
            Ok(engine) => engine,
            Err(e) => {
                warn!("{}", e);
                return RunInfo::default();
            }
        };

        let bridge = Rc::new(RefCell::new(EventBridge::new(ctx.observer.clone())));
        let mut registry = PluginRegistry::with_builtins();
        let hooks = bridge.clone();
        registry.register(UI_HOOKS, move |_| Box::new(UiHooksPlugin::new(hooks.clone())));
        registry.set_option(PARTIAL_TEST, "run_mode", self.run_mode.as_str());

        self.last_argv = Self::argv(ctx, invocation, names);
        debug!("Engine argv: {}", self.last_argv.join(" "));
        if let Err(e) = engine.discover(&self.last_argv, &registry) {
            error!("{}", e);
        }

        let info = bridge.borrow().run_info().clone();
        self.last_run = info.clone();
        info
    }
}

impl TestRunner for PluginRunner {
    fn kind(&self) -> RunnerKind {
        RunnerKind::Plugin
    }

    fn is_valid(&self) -> bool {
        self.available
    }

    fn check(&self) {
        if self.available {
            debug!("The test runner {} is ready", self.name());
        } else {
            warn!(
                "{}",
                Error::DependencyUnavailable {
                    name: self.name().to_string(),
                    remedy: "build testrig with the `plugin-engine` feature".to_string(),
                }
            );
        }
    }

    fn run_tests(&mut self, ctx: &RunContext<'_>, test_ids: &[TestId]) -> RunInfo {
        let names: Vec<String> = test_ids.iter().map(|id| id.to_string()).collect();
        self.run_session(ctx, &RUN, &names)
    }

    fn run_single_test_partially(
        &mut self,
        ctx: &RunContext<'_>,
        test_id: &TestId,
        mode: RunMode,
    ) -> RunInfo {
        self.run_mode = mode;
        self.run_session(ctx, &PARTIAL, &[test_id.to_string()])
    }

    fn iter_all_test_ids(&mut self, ctx: &RunContext<'_>) -> std::vec::IntoIter<TestId> {
        let engine = match self.engine(ctx) {
            Ok(engine) => engine,
            Err(e) => {
                warn!("{}", e);
                return Vec::new().into_iter();
            }
        };

        let listing = Rc::new(RefCell::new(Listing::default()));
        let mut registry = PluginRegistry::with_builtins();
        let shared = listing.clone();
        registry.register(TEST_LISTER, move |_| {
            Box::new(TestListerPlugin::new(shared.clone()))
        });

        let start = ctx.start_dir_or_module;
        let names: Vec<String> = if is_path(start) || start.is_empty() {
            Vec::new()
        } else {
            vec![start.to_string()]
        };
        self.last_argv = Self::argv(ctx, &LIST, &names);
        debug!("Engine argv: {}", self.last_argv.join(" "));
        self.lister_error = false;
        if let Err(e) = engine.discover(&self.last_argv, &registry) {
            error!("{}", e);
            self.lister_error = true;
        }

        let listing = listing.borrow();
        self.lister_error |= listing.got_error;
        listing.ids.clone().into_iter()
    }

    fn has_last_lister_error(&self) -> bool {
        self.lister_error
    }

    fn last_run_info(&self) -> &RunInfo {
        &self.last_run
    }
}
