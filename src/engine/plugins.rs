//! Engine plugins and the registry that instantiates them

use super::events::{
    Execution, LoadFromDirEvent, LoadFromNameEvent, StartTestRunEvent, StopTestRunEvent,
    TestOutcomeEvent,
};
use super::worker::{PluginSpec, WorkerConfig};
use super::EngineArgs;
use crate::bridge::{BackendOutcome, EventBridge};
use crate::dedup::{remove_duplicates, remove_duplicates_by_key};
use crate::partial::{RunMode, TestListener};
use crate::suite::loader::{discover_archives, discover_dir, load_name};
use crate::suite::TestNode;
use crate::test_id::TestId;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use tracing::{debug, error, info, warn};

/// When a plugin gets to handle an event, relative to the others.
///
/// Plugins are ordered by stage first and registration order second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    /// Loads tests.
    Discovery,
    /// Rewrites what the discovery plugins loaded.
    Filter,
    /// Controls or observes execution.
    Execution,
    /// Reports on execution.
    Report,
}

/// A unit of engine behaviour. Every hook defaults to doing nothing.
pub trait Plugin {
    fn name(&self) -> &str;

    fn stage(&self) -> Stage;

    /// Command-line switch (without dashes) that must be given for the plugin
    /// to activate.
    fn switch(&self) -> Option<&str> {
        None
    }

    /// Describe this plugin to a worker process. Plugins that do not add
    /// themselves are not loaded by workers.
    fn register_in_subprocess(&self, _config: &mut WorkerConfig) {}

    fn load_tests_from_dir(&mut self, _event: &mut LoadFromDirEvent<'_>) {}

    fn load_tests_from_name(&mut self, _event: &mut LoadFromNameEvent<'_>) {}

    fn start_test_run(&mut self, _event: &mut StartTestRunEvent<'_>) {}

    fn start_test(&mut self, _test_id: &TestId) {}

    fn test_outcome(&mut self, _event: &TestOutcomeEvent<'_>) {}

    fn stop_test(&mut self, _test_id: &TestId) {}

    fn stop_test_run(&mut self, _event: &StopTestRunEvent) {}
}

pub type PluginOptions = BTreeMap<String, String>;

type Factory = Box<dyn Fn(&PluginOptions) -> Box<dyn Plugin>>;

/// Plugins loaded even when not asked for.
pub const DEFAULT_PLUGINS: &[&str] = &[DISCOVERY, RESULT];

pub const DISCOVERY: &str = "discovery";
pub const ARCHIVE_DISCOVERY: &str = "archive-discovery";
pub const DEDUP: &str = "dedup";
pub const RESULT: &str = "result";
pub const TEST_LISTER: &str = "test-lister";
pub const PARTIAL_TEST: &str = "partial-test";
pub const UI_HOOKS: &str = "ui-hooks";

/// Named plugin factories plus per-plugin options.
#[derive(Default)]
pub struct PluginRegistry {
    factories: BTreeMap<String, Factory>,
    options: BTreeMap<String, PluginOptions>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every built-in plugin except `ui-hooks`, which needs
    /// an [`EventBridge`] to forward to.
    pub fn with_builtins() -> Self {
        let mut registry = PluginRegistry::new();
        registry
            .register(DISCOVERY, |_| Box::new(DiscoveryPlugin))
            .register(ARCHIVE_DISCOVERY, |_| Box::new(ArchiveDiscoveryPlugin))
            .register(DEDUP, |_| Box::new(DedupPlugin))
            .register(RESULT, |_| Box::new(ResultPlugin::default()))
            .register(TEST_LISTER, |_| {
                Box::new(TestListerPlugin::new(Rc::new(RefCell::new(Listing::default()))))
            })
            .register(PARTIAL_TEST, |options| {
                Box::new(PartialTestPlugin::from_options(options))
            });
        registry
    }

    /// Register a factory, replacing any previous one of that name.
    pub fn register<F>(&mut self, name: &str, factory: F) -> &mut Self
    where
        F: Fn(&PluginOptions) -> Box<dyn Plugin> + 'static,
    {
        self.factories.insert(name.to_string(), Box::new(factory));
        self
    }

    pub fn set_option(&mut self, plugin: &str, key: &str, value: &str) -> &mut Self {
        self.options
            .entry(plugin.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
        self
    }

    /// Take over the options recorded in a worker configuration.
    pub fn apply_worker_options(&mut self, config: &WorkerConfig) {
        for spec in &config.plugins {
            for (key, value) in &spec.options {
                self.set_option(&spec.name, key, value);
            }
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Instantiate the plugins selected by `args`, ordered by stage.
    ///
    /// Unknown names are skipped with a warning; plugins whose switch was not
    /// given stay inactive.
    pub fn build(&self, args: &EngineArgs) -> Vec<Box<dyn Plugin>> {
        let mut names: Vec<&str> = DEFAULT_PLUGINS.to_vec();
        for name in &args.plugins {
            if !names.contains(&name.as_str()) {
                names.push(name.as_str());
            }
        }
        names.retain(|name| !args.exclude_plugins.iter().any(|e| e == name));

        let empty = PluginOptions::new();
        let mut plugins = Vec::new();
        for name in names {
            let Some(factory) = self.factories.get(name) else {
                warn!("Unknown plugin {}, skipped", name);
                continue;
            };
            let plugin = factory(self.options.get(name).unwrap_or(&empty));
            if let Some(switch) = plugin.switch() {
                if !args.switch_enabled(switch) {
                    debug!("Plugin {} inactive without --{}", name, switch);
                    continue;
                }
            }
            plugins.push(plugin);
        }
        plugins.sort_by_key(|p| p.stage());
        plugins
    }
}

/// Forwards the lifecycle of executed tests to every plugin.
pub(crate) struct PluginDispatch<'a> {
    pub plugins: &'a mut [Box<dyn Plugin>],
    pub tests_run: usize,
    pub failures: usize,
}

impl TestListener for PluginDispatch<'_> {
    fn start_test(&mut self, test_id: &TestId) {
        self.tests_run += 1;
        for plugin in self.plugins.iter_mut() {
            plugin.start_test(test_id);
        }
    }

    fn outcome(&mut self, test_id: &TestId, outcome: BackendOutcome, expected: bool) {
        let failed = match outcome {
            BackendOutcome::Error => true,
            BackendOutcome::Fail => !expected,
            _ => false,
        };
        if failed {
            self.failures += 1;
        }
        let event = TestOutcomeEvent {
            test_id,
            outcome,
            expected,
        };
        for plugin in self.plugins.iter_mut() {
            plugin.test_outcome(&event);
        }
    }

    fn stop_test(&mut self, test_id: &TestId) {
        for plugin in self.plugins.iter_mut() {
            plugin.stop_test(test_id);
        }
    }
}

/// Loads tests from directories and dotted names.
pub struct DiscoveryPlugin;

impl Plugin for DiscoveryPlugin {
    fn name(&self) -> &str {
        DISCOVERY
    }

    fn stage(&self) -> Stage {
        Stage::Discovery
    }

    fn register_in_subprocess(&self, config: &mut WorkerConfig) {
        config.plugins.push(PluginSpec::named(DISCOVERY));
    }

    fn load_tests_from_dir(&mut self, event: &mut LoadFromDirEvent<'_>) {
        let node = discover_dir(event.catalog, event.start_dir, event.top_level_dir, event.pattern);
        event.extra_tests.push(node);
    }

    fn load_tests_from_name(&mut self, event: &mut LoadFromNameEvent<'_>) {
        event
            .extra_tests
            .push(load_name(event.catalog, event.name, true));
    }
}

/// Discovery that also descends into archive directories.
///
/// It loads everything plain discovery loads as well, so it is meant to run
/// together with the `dedup` plugin.
pub struct ArchiveDiscoveryPlugin;

impl Plugin for ArchiveDiscoveryPlugin {
    fn name(&self) -> &str {
        ARCHIVE_DISCOVERY
    }

    fn stage(&self) -> Stage {
        Stage::Discovery
    }

    fn register_in_subprocess(&self, config: &mut WorkerConfig) {
        config.plugins.push(PluginSpec::named(ARCHIVE_DISCOVERY));
    }

    fn load_tests_from_dir(&mut self, event: &mut LoadFromDirEvent<'_>) {
        event.extra_tests.push(discover_dir(
            event.catalog,
            event.start_dir,
            event.top_level_dir,
            event.pattern,
        ));
        event
            .extra_tests
            .push(discover_archives(event.catalog, event.start_dir, event.pattern));
    }

    fn load_tests_from_name(&mut self, event: &mut LoadFromNameEvent<'_>) {
        event
            .extra_tests
            .push(load_name(event.catalog, event.name, true));
    }
}

/// Drops tests loaded more than once, keeping the first.
pub struct DedupPlugin;

impl DedupPlugin {
    fn dedup(extra_tests: &mut Vec<TestNode>, label: &str) {
        let leaves: Vec<TestNode> = extra_tests
            .iter()
            .flat_map(|node| node.leaves().into_iter().cloned())
            .collect();
        let total = leaves.len();
        let unique = remove_duplicates_by_key(leaves, |leaf| leaf.id().to_string());
        if unique.len() < total {
            debug!(
                "Removed {} duplicated tests loaded from {}",
                total - unique.len(),
                label
            );
        }
        *extra_tests = vec![TestNode::suite(label, unique)];
    }
}

impl Plugin for DedupPlugin {
    fn name(&self) -> &str {
        DEDUP
    }

    fn stage(&self) -> Stage {
        Stage::Filter
    }

    fn register_in_subprocess(&self, config: &mut WorkerConfig) {
        config.plugins.push(PluginSpec::named(DEDUP));
    }

    fn load_tests_from_dir(&mut self, event: &mut LoadFromDirEvent<'_>) {
        let label = event.start_dir.display().to_string();
        Self::dedup(&mut event.extra_tests, &label);
    }

    fn load_tests_from_name(&mut self, event: &mut LoadFromNameEvent<'_>) {
        Self::dedup(&mut event.extra_tests, event.name);
    }
}

/// Logs every outcome and a summary of the run.
#[derive(Default)]
pub struct ResultPlugin {
    verbosity: u8,
    passed: usize,
    failed: usize,
    errors: usize,
    skipped: usize,
}

impl Plugin for ResultPlugin {
    fn name(&self) -> &str {
        RESULT
    }

    fn stage(&self) -> Stage {
        Stage::Report
    }

    fn register_in_subprocess(&self, config: &mut WorkerConfig) {
        config.plugins.push(PluginSpec::named(RESULT));
    }

    fn start_test_run(&mut self, event: &mut StartTestRunEvent<'_>) {
        self.verbosity = event.verbosity;
    }

    fn test_outcome(&mut self, event: &TestOutcomeEvent<'_>) {
        match (event.outcome, event.expected) {
            (BackendOutcome::Pass, _) | (BackendOutcome::Fail, true) => self.passed += 1,
            (BackendOutcome::Fail, false) => self.failed += 1,
            (BackendOutcome::Error, _) => self.errors += 1,
            (BackendOutcome::Skip, _) => self.skipped += 1,
            (BackendOutcome::Unknown, _) => {}
        }
        if self.verbosity > 0 {
            info!("{} ... {:?}", event.test_id, event.outcome);
        } else {
            debug!("{} ... {:?}", event.test_id, event.outcome);
        }
    }

    fn stop_test_run(&mut self, event: &StopTestRunEvent) {
        if event.execution == Execution::Collect {
            return;
        }
        info!(
            "Ran {} tests: {} passed, {} failed, {} errors, {} skipped",
            event.tests_run, self.passed, self.failed, self.errors, self.skipped
        );
    }
}

/// Ids collected by the `test-lister` plugin.
#[derive(Debug, Default, Clone)]
pub struct Listing {
    /// Unique base ids in discovery order.
    pub ids: Vec<TestId>,
    /// Whether a module failed to import while listing.
    pub got_error: bool,
}

/// Collects the base ids of the loaded suite instead of running it.
pub struct TestListerPlugin {
    listing: Rc<RefCell<Listing>>,
}

impl TestListerPlugin {
    pub fn new(listing: Rc<RefCell<Listing>>) -> Self {
        TestListerPlugin { listing }
    }
}

impl Plugin for TestListerPlugin {
    fn name(&self) -> &str {
        TEST_LISTER
    }

    fn stage(&self) -> Stage {
        Stage::Execution
    }

    fn switch(&self) -> Option<&str> {
        Some("list-tests")
    }

    fn register_in_subprocess(&self, config: &mut WorkerConfig) {
        config
            .plugins
            .push(PluginSpec::named(TEST_LISTER).with_switch("list-tests"));
    }

    fn start_test_run(&mut self, event: &mut StartTestRunEvent<'_>) {
        event.execution = Execution::Collect;
        let mut listing = self.listing.borrow_mut();
        *listing = Listing::default();
        for leaf in event.suite.leaves() {
            if let TestNode::FailedToLoad { id, reason } = leaf {
                error!("Unable to import the module {}: {}", id, reason);
                listing.got_error = true;
            }
            listing.ids.push(TestId::new(leaf.id()).base_id());
        }
        let ids = std::mem::take(&mut listing.ids);
        listing.ids = remove_duplicates(ids);
    }
}

/// Runs only the first loaded test, in a partial [`RunMode`].
pub struct PartialTestPlugin {
    run_mode: RunMode,
}

impl PartialTestPlugin {
    pub fn new(run_mode: RunMode) -> Self {
        PartialTestPlugin { run_mode }
    }

    /// Read the `run_mode` option, defaulting to set-up only.
    pub fn from_options(options: &PluginOptions) -> Self {
        let run_mode = match options.get("run_mode").map(|m| m.parse::<RunMode>()) {
            Some(Ok(mode)) => mode,
            Some(Err(e)) => {
                warn!("{}; running set_up only", e);
                RunMode::SetupOnly
            }
            None => RunMode::SetupOnly,
        };
        PartialTestPlugin::new(run_mode)
    }

    pub fn run_mode(&self) -> RunMode {
        self.run_mode
    }
}

impl Plugin for PartialTestPlugin {
    fn name(&self) -> &str {
        PARTIAL_TEST
    }

    fn stage(&self) -> Stage {
        Stage::Execution
    }

    fn switch(&self) -> Option<&str> {
        Some("partial-test")
    }

    fn register_in_subprocess(&self, config: &mut WorkerConfig) {
        config.plugins.push(
            PluginSpec::named(PARTIAL_TEST)
                .with_switch("partial-test")
                .with_option("run_mode", self.run_mode.as_str()),
        );
    }

    fn start_test_run(&mut self, event: &mut StartTestRunEvent<'_>) {
        event.execution = Execution::Partial(self.run_mode);
    }
}

/// Forwards the run lifecycle to an [`EventBridge`].
pub struct UiHooksPlugin {
    bridge: Rc<RefCell<EventBridge>>,
}

impl UiHooksPlugin {
    pub fn new(bridge: Rc<RefCell<EventBridge>>) -> Self {
        UiHooksPlugin { bridge }
    }
}

impl Plugin for UiHooksPlugin {
    fn name(&self) -> &str {
        UI_HOOKS
    }

    fn stage(&self) -> Stage {
        Stage::Report
    }

    fn start_test_run(&mut self, _event: &mut StartTestRunEvent<'_>) {
        self.bridge.borrow_mut().start_run();
    }

    fn start_test(&mut self, test_id: &TestId) {
        self.bridge.borrow_mut().start_test(test_id);
    }

    fn test_outcome(&mut self, event: &TestOutcomeEvent<'_>) {
        self.bridge
            .borrow_mut()
            .outcome(event.test_id, event.outcome, event.expected);
    }

    fn stop_test(&mut self, test_id: &TestId) {
        self.bridge.borrow_mut().stop_test(test_id);
    }

    fn stop_test_run(&mut self, _event: &StopTestRunEvent) {
        self.bridge.borrow_mut().stop_run();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn args(argv: &[&str]) -> EngineArgs {
        EngineArgs::parse_from(argv)
    }

    fn names(plugins: &[Box<dyn Plugin>]) -> Vec<&str> {
        plugins.iter().map(|p| p.name()).collect()
    }

    #[test]
    fn test_defaults_are_loaded() {
        let plugins = PluginRegistry::with_builtins().build(&args(&["testrig-engine"]));
        assert_eq!(names(&plugins), vec![DISCOVERY, RESULT]);
    }

    #[test]
    fn test_dedup_runs_after_all_discovery() {
        let plugins = PluginRegistry::with_builtins().build(&args(&[
            "testrig-engine",
            "--plugin",
            "dedup",
            "--plugin",
            "archive-discovery",
        ]));
        assert_eq!(
            names(&plugins),
            vec![DISCOVERY, ARCHIVE_DISCOVERY, DEDUP, RESULT]
        );
    }

    #[test]
    fn test_exclude_and_unknown_plugins() {
        let plugins = PluginRegistry::with_builtins().build(&args(&[
            "testrig-engine",
            "--plugin",
            "no-such-plugin",
            "--exclude-plugin",
            "result",
        ]));
        assert_eq!(names(&plugins), vec![DISCOVERY]);
    }

    #[test]
    fn test_switch_required() {
        let registry = PluginRegistry::with_builtins();
        let plugins = registry.build(&args(&["testrig-engine", "--plugin", "test-lister"]));
        assert!(!names(&plugins).contains(&TEST_LISTER));

        let plugins = registry.build(&args(&[
            "testrig-engine",
            "--plugin",
            "test-lister",
            "--list-tests",
        ]));
        assert!(names(&plugins).contains(&TEST_LISTER));
    }

    #[test]
    fn test_partial_test_options() {
        let mut options = PluginOptions::new();
        assert_eq!(
            PartialTestPlugin::from_options(&options).run_mode(),
            RunMode::SetupOnly
        );
        options.insert("run_mode".to_string(), "no-teardown".to_string());
        assert_eq!(
            PartialTestPlugin::from_options(&options).run_mode(),
            RunMode::NoTeardown
        );
        options.insert("run_mode".to_string(), "bogus".to_string());
        assert_eq!(
            PartialTestPlugin::from_options(&options).run_mode(),
            RunMode::SetupOnly
        );
    }

    #[test]
    fn test_dedup_keeps_first_leaf() {
        let leaf = |id: &str| TestNode::FailedToLoad {
            id: TestId::new(id),
            reason: String::new(),
        };
        let mut extra = vec![
            TestNode::suite("a", vec![leaf("m.x"), leaf("m.y")]),
            TestNode::suite("b", vec![leaf("m.y"), leaf("m.z")]),
        ];
        DedupPlugin::dedup(&mut extra, "m");
        let ids: Vec<String> = extra
            .iter()
            .flat_map(|n| n.leaf_ids())
            .map(|id| id.to_string())
            .collect();
        assert_eq!(ids, vec!["m.x", "m.y", "m.z"]);
    }

    #[test]
    fn test_lister_collapses_instances_in_order() {
        let leaves: Vec<TestNode> = (0..300)
            .map(|index| TestNode::FailedToLoad {
                id: TestId::new(format!("m.C.test_{}:{}", index % 2, index)),
                reason: String::new(),
            })
            .collect();
        let suite = TestNode::suite("m", leaves);
        let listing = Rc::new(RefCell::new(Listing::default()));
        let mut plugin = TestListerPlugin::new(listing.clone());
        let mut event = StartTestRunEvent {
            suite: &suite,
            execution: Execution::Run,
            fail_fast: false,
            verbosity: 0,
        };

        plugin.start_test_run(&mut event);

        assert_eq!(event.execution, Execution::Collect);
        let listing = listing.borrow();
        assert_eq!(
            listing.ids,
            vec![TestId::new("m.C.test_0"), TestId::new("m.C.test_1")]
        );
        assert!(listing.got_error);
    }

    #[test]
    fn test_register_in_subprocess() {
        let mut config = WorkerConfig::default();
        PartialTestPlugin::new(RunMode::NoTeardown).register_in_subprocess(&mut config);
        UiHooksPlugin::new(Rc::new(RefCell::new(EventBridge::new(None))))
            .register_in_subprocess(&mut config);
        assert_eq!(config.plugins.len(), 1);
        assert_eq!(
            config.plugins[0].options.get("run_mode").map(String::as_str),
            Some("no-teardown")
        );
    }
}
