//! Command line entry point for test harness binaries
//!
//! A harness binary builds its [`Catalog`] and hands it to [`main`]:
//!
//! ```no_run
//! use testrig::suite::{Catalog, TestCase, TestModule};
//!
//! fn main() {
//!     let mut catalog = Catalog::new();
//!     catalog.register(
//!         TestModule::new("tests.test_math")
//!             .with_case(TestCase::new("Case").test("test_add", || Ok(()))),
//!     );
//!     std::process::exit(testrig::cli::main(catalog));
//! }
//! ```

use crate::bridge::RunObserver;
use crate::config::{RigConfig, CONFIG_FILE};
use crate::error::Result;
use crate::manager::TestManager;
use crate::partial::RunMode;
use crate::runner::RunnerKind;
use crate::suite::Catalog;
use crate::test_id::TestId;
use crate::testlist;
use crate::ui::console::ConsoleObserver;
use crate::ui::{CliUI, UI};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug, Default)]
#[command(name = "testrig")]
#[command(about = "Discover, run and partially run registered tests", long_about = None)]
pub struct Cli {
    /// Directory holding the settings file (defaults to current directory)
    #[arg(short = 'C', long)]
    pub directory: Option<PathBuf>,

    /// Runner backend: basic, plugin or stub
    #[arg(short = 'm', long)]
    pub runner: Option<String>,

    /// Discover and run every test below a directory or dotted module
    #[arg(short = 'a', long = "run-all", value_name = "ROOT")]
    pub run_all: Option<String>,

    /// Directory module names are relative to
    #[arg(short = 't', long)]
    pub top_dir: Option<String>,

    /// Run the given test id (repeatable)
    #[arg(short = 'r', long = "run-test", value_name = "ID")]
    pub run_test: Vec<String>,

    /// Only run tests listed in the named file (one test ID per line)
    #[arg(long)]
    pub load_list: Option<PathBuf>,

    /// Partially run a single test: full, setup-only or no-teardown
    #[arg(short = 'p', long, value_name = "MODE")]
    pub partial: Option<String>,

    /// List test ids instead of running them
    #[arg(short = 'l', long)]
    pub list: bool,

    /// Stop at the first failure or error
    #[arg(short = 'e', long)]
    pub stop_on_error: bool,

    /// Show live progress while tests run
    #[arg(short = 'u', long)]
    pub ui: bool,

    /// Store the runner and discovery settings in the settings file
    #[arg(long)]
    pub save_settings: bool,
}

/// Execute `cli` against `catalog`, returning the process exit code.
pub fn run(cli: Cli, catalog: Arc<Catalog>, ui: &mut dyn UI) -> Result<i32> {
    let directory = cli.directory.clone().unwrap_or_else(|| PathBuf::from("."));
    let mut config = match RigConfig::load_from_dir(&directory) {
        Ok(config) => config,
        Err(e) => {
            ui.error(&e.to_string())?;
            return Ok(1);
        }
    };

    let mut manager = TestManager::from_config(catalog, &config)?;

    if let Some(name) = &cli.runner {
        match name.parse::<RunnerKind>() {
            Ok(kind) => manager.set_runner_mode(kind),
            Err(e) => {
                ui.error(&e.to_string())?;
                return Ok(1);
            }
        }
    }

    match (&cli.run_all, &cli.top_dir) {
        (Some(root), top) => manager.set_dirs(root, top.as_deref()),
        (None, Some(top)) => manager.set_top_dir(top),
        (None, None) => {}
    }
    if cli.stop_on_error {
        manager.set_stop_on_error(true);
    }

    if cli.ui {
        let observer: Arc<dyn RunObserver> = Arc::new(ConsoleObserver::new());
        manager.set_observer(Some(observer));
    }

    let mut test_ids: Vec<TestId> = cli.run_test.iter().map(TestId::new).collect();
    if let Some(path) = &cli.load_list {
        match testlist::parse_list_file(path) {
            Ok(ids) => test_ids.extend(ids),
            Err(e) => {
                ui.error(&format!("Failed to read {}: {}", path.display(), e))?;
                return Ok(1);
            }
        }
    }

    if cli.save_settings {
        config.runner = manager.runner_mode().map(|kind| kind.name().to_string());
        config.stop_on_error = manager.stop_on_error();
        config.start_dir_or_module =
            Some(manager.start_dir_or_module().to_string()).filter(|s| !s.is_empty());
        config.top_dir = Some(manager.top_dir().to_string()).filter(|s| !s.is_empty());
        let path = directory.join(CONFIG_FILE);
        config.save_to_file(&path)?;
        debug!("Saved settings to {}", path.display());
    }

    if cli.list {
        for id in manager.iter_all_test_ids() {
            ui.output(id.as_str())?;
        }
        return Ok(if manager.has_last_lister_error() { 1 } else { 0 });
    }

    let info = if let Some(mode) = &cli.partial {
        let mode: RunMode = match mode.parse() {
            Ok(mode) => mode,
            Err(e) => {
                ui.error(&e.to_string())?;
                return Ok(1);
            }
        };
        let [test_id] = test_ids.as_slice() else {
            ui.error("--partial needs exactly one test id")?;
            return Ok(1);
        };
        manager.run_single_test_partially(test_id, mode)
    } else if !test_ids.is_empty() {
        manager.run_tests(&test_ids)
    } else if !manager.start_dir_or_module().is_empty() {
        manager.run_all_tests()
    } else {
        ui.error("Nothing to run: pass --run-all, --run-test or --load-list")?;
        return Ok(1);
    };

    ui.summary(&info)?;
    Ok(if info.was_successful() { 0 } else { 1 })
}

/// Parse the process arguments, run them and return the exit code.
pub fn main(catalog: Catalog) -> i32 {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();

    let cli = Cli::parse();
    let mut ui = CliUI::new();
    match run(cli, Arc::new(catalog), &mut ui) {
        Ok(code) => code,
        Err(e) => {
            let _ = ui.error(&e.to_string());
            1
        }
    }
}
