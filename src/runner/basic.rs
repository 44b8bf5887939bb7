//! Runner built directly on the native loader and executor

use super::{RunContext, RunnerKind, TestRunner};
use crate::bridge::EventBridge;
use crate::dedup::remove_duplicates;
use crate::partial::{run_all, run_partially, RunMode};
use crate::run_info::RunInfo;
use crate::suite::loader::{discover, load_name, load_names};
use crate::suite::{Catalog, TestNode};
use crate::test_id::TestId;
use std::sync::Arc;
use tracing::{debug, error};

/// Loads tests by name without expanding packages, so package ids must be
/// split into module ids first.
pub struct BasicRunner {
    catalog: Arc<Catalog>,
    last_run: RunInfo,
    lister_error: bool,
}

impl BasicRunner {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        BasicRunner {
            catalog,
            last_run: RunInfo::default(),
            lister_error: false,
        }
    }

    fn execute<F>(&mut self, ctx: &RunContext<'_>, run: F) -> RunInfo
    where
        F: FnOnce(&mut EventBridge),
    {
        let mut bridge = EventBridge::new(ctx.observer.clone());
        bridge.start_run();
        run(&mut bridge);
        bridge.stop_run();
        let info = bridge.into_run_info();
        self.last_run = info.clone();
        info
    }
}

impl TestRunner for BasicRunner {
    fn kind(&self) -> RunnerKind {
        RunnerKind::Basic
    }

    fn is_valid(&self) -> bool {
        true
    }

    fn run_tests(&mut self, ctx: &RunContext<'_>, test_ids: &[TestId]) -> RunInfo {
        let suite = load_names(&self.catalog, test_ids, false);
        debug!("Running {} tests", suite.count_leaves());
        self.execute(ctx, |bridge| {
            run_all(&suite, RunMode::Full, ctx.stop_on_error, bridge)
        })
    }

    fn run_single_test_partially(
        &mut self,
        ctx: &RunContext<'_>,
        test_id: &TestId,
        mode: RunMode,
    ) -> RunInfo {
        let node = load_name(&self.catalog, test_id.as_str(), false);
        if !matches!(node.first_leaf(), Some(TestNode::Test(_))) {
            error!("No test found for {}", test_id);
            return RunInfo::default();
        }
        self.execute(ctx, |bridge| {
            run_partially(&node, mode, bridge);
        })
    }

    fn iter_all_test_ids(&mut self, ctx: &RunContext<'_>) -> std::vec::IntoIter<TestId> {
        let suite = discover(
            &self.catalog,
            ctx.start_dir_or_module,
            ctx.top_dir,
            ctx.pattern,
        );
        let mut ids: Vec<TestId> = Vec::new();
        self.lister_error = false;
        for leaf in suite.leaves() {
            if let TestNode::FailedToLoad { id, reason } = leaf {
                error!("Unable to import the module {}: {}", id, reason);
                self.lister_error = true;
            }
            ids.push(TestId::new(leaf.id()).base_id());
        }
        remove_duplicates(ids).into_iter()
    }

    fn has_last_lister_error(&self) -> bool {
        self.lister_error
    }

    fn last_run_info(&self) -> &RunInfo {
        &self.last_run
    }

    fn avoid_run_tests_on_package_level(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suite::loader::{compile_pattern, DEFAULT_TEST_PATTERN};
    use crate::suite::{ensure, TestCase, TestModule};
    use regex::Regex;

    fn runner() -> BasicRunner {
        let mut catalog = Catalog::new();
        catalog
            .register(
                TestModule::new("pkg.test_a").with_case(
                    TestCase::new("ACase")
                        .test("test_ok", || Ok(()))
                        .test("test_bad", || ensure(false, "bad"))
                        .parameterized("test_p", 2, |_| Ok(())),
                ),
            )
            .register_broken("pkg.test_b", "syntax error");
        BasicRunner::new(Arc::new(catalog))
    }

    fn ctx<'a>(start: &'a str, pattern: &'a Regex) -> RunContext<'a> {
        RunContext {
            start_dir_or_module: start,
            top_dir: "",
            stop_on_error: false,
            observer: None,
            pattern,
        }
    }

    #[test]
    fn test_iter_all_test_ids() {
        let pattern = compile_pattern(DEFAULT_TEST_PATTERN).unwrap();
        let mut runner = runner();
        let ids: Vec<String> = runner
            .iter_all_test_ids(&ctx("pkg", &pattern))
            .map(|id| id.to_string())
            .collect();
        assert_eq!(
            ids,
            vec![
                "pkg.test_a.ACase.test_ok",
                "pkg.test_a.ACase.test_bad",
                "pkg.test_a.ACase.test_p",
                "pkg.test_b",
            ]
        );
        assert!(runner.has_last_lister_error());
    }

    #[test]
    fn test_run_tests_records_last_run() {
        let pattern = compile_pattern(DEFAULT_TEST_PATTERN).unwrap();
        let mut runner = runner();
        let info = runner.run_tests(&ctx("pkg", &pattern), &[TestId::new("pkg.test_a")]);
        assert_eq!(info.run_count, 4);
        assert_eq!(info.success_count, 3);
        assert_eq!(info.failed_count, 1);
        assert_eq!(
            runner.last_failed_test_id(),
            Some(&TestId::new("pkg.test_a.ACase.test_bad"))
        );
        assert_eq!(runner.last_run_test_ids().len(), 3);
    }

    #[test]
    fn test_package_ids_are_not_expanded() {
        let pattern = compile_pattern(DEFAULT_TEST_PATTERN).unwrap();
        let mut runner = runner();
        let info = runner.run_tests(&ctx("pkg", &pattern), &[TestId::new("pkg")]);
        assert_eq!(info.run_count, 0);
        assert!(runner.avoid_run_tests_on_package_level());
    }

    #[test]
    fn test_partial_run_resolves_first_leaf() {
        let pattern = compile_pattern(DEFAULT_TEST_PATTERN).unwrap();
        let mut runner = runner();
        let info = runner.run_single_test_partially(
            &ctx("pkg", &pattern),
            &TestId::new("pkg.test_a.ACase"),
            RunMode::SetupOnly,
        );
        assert_eq!(info.run_count, 1);
        assert_eq!(info.run_test_ids, vec![TestId::new("pkg.test_a.ACase.test_ok")]);
    }

    #[test]
    fn test_partial_run_of_unknown_test_reports_nothing() {
        let pattern = compile_pattern(DEFAULT_TEST_PATTERN).unwrap();
        let mut runner = runner();
        let info = runner.run_single_test_partially(
            &ctx("pkg", &pattern),
            &TestId::new("pkg.test_a.ACase.test_missing"),
            RunMode::SetupOnly,
        );
        assert_eq!(info.run_count, 0);
        assert_eq!(info.failed_test_id, None);
    }

    #[test]
    fn test_listing_collapses_many_instances() {
        let pattern = compile_pattern(DEFAULT_TEST_PATTERN).unwrap();
        let mut catalog = Catalog::new();
        catalog.register(
            TestModule::new("pkg.test_wide").with_case(
                TestCase::new("Case")
                    .parameterized("test_a", 500, |_| Ok(()))
                    .test("test_b", || Ok(()))
                    .parameterized("test_c", 500, |_| Ok(())),
            ),
        );
        let mut runner = BasicRunner::new(Arc::new(catalog));
        let ids: Vec<String> = runner
            .iter_all_test_ids(&ctx("pkg.test_wide", &pattern))
            .map(|id| id.to_string())
            .collect();
        assert_eq!(
            ids,
            vec![
                "pkg.test_wide.Case.test_a",
                "pkg.test_wide.Case.test_b",
                "pkg.test_wide.Case.test_c",
            ]
        );
        assert!(!runner.has_last_lister_error());
    }
}
