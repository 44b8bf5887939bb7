//! A runner that is never valid and never runs anything

use super::{RunContext, RunnerKind, TestRunner};
use crate::partial::RunMode;
use crate::run_info::RunInfo;
use crate::test_id::TestId;
use tracing::debug;

#[derive(Debug, Default)]
pub struct StubRunner {
    last_run: RunInfo,
}

impl StubRunner {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TestRunner for StubRunner {
    fn kind(&self) -> RunnerKind {
        RunnerKind::Stub
    }

    fn is_valid(&self) -> bool {
        false
    }

    fn run_tests(&mut self, _ctx: &RunContext<'_>, test_ids: &[TestId]) -> RunInfo {
        debug!("Stub runner ignores {} tests", test_ids.len());
        RunInfo::default()
    }

    fn run_single_test_partially(
        &mut self,
        _ctx: &RunContext<'_>,
        _test_id: &TestId,
        _mode: RunMode,
    ) -> RunInfo {
        RunInfo::default()
    }

    fn iter_all_test_ids(&mut self, _ctx: &RunContext<'_>) -> std::vec::IntoIter<TestId> {
        Vec::new().into_iter()
    }

    fn has_last_lister_error(&self) -> bool {
        false
    }

    fn last_run_info(&self) -> &RunInfo {
        &self.last_run
    }
}
