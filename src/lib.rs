//! testrig - discover, run and partially run tests through swappable runners
//!
//! # Overview
//!
//! A test binary registers its test modules in a [`suite::Catalog`]. A
//! [`manager::TestManager`] then discovers, runs and partially runs those
//! tests through one of several runner backends, hiding which one is active.
//! Results of a run are aggregated in a [`run_info::RunInfo`] and pushed live
//! to an optional [`bridge::RunObserver`].
//!
//! # Architecture
//!
//! - [`test_id`]: parameterized test id codec (`module.Case.test:N`)
//! - [`suite`]: test model, catalog, discovery and name resolution
//! - [`dedup`]: first-occurrence filtering of discovered tests
//! - [`partial`]: run modes and the single-test lifecycle executor
//! - [`run_info`] and [`bridge`]: result aggregation and observer callbacks
//! - [`engine`]: the multi-plugin engine behind the plugin runner
//! - [`runner`]: the [`runner::TestRunner`] trait and its backends
//! - [`manager`]: runner selection and the public entry points
//! - [`config`]: .testrig.conf settings file parsing
//! - [`testlist`]: test id list files
//! - [`ui`] and [`cli`]: terminal output and the harness command line
//! - [`error`]: Error types and Result alias
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use testrig::manager::TestManager;
//! use testrig::suite::{ensure, Catalog, TestCase, TestModule};
//! use testrig::test_id::TestId;
//!
//! # fn main() -> testrig::Result<()> {
//! let mut catalog = Catalog::new();
//! catalog.register(
//!     TestModule::new("tests.test_math").with_case(
//!         TestCase::new("Case")
//!             .test("test_add", || ensure(1 + 1 == 2, "1 + 1 is 2"))
//!             .parameterized("test_even", 3, |i| ensure(i * 2 % 2 == 0, "even")),
//!     ),
//! );
//!
//! let mut manager = TestManager::new(Arc::new(catalog))?;
//! let info = manager.run_tests(&[TestId::new("tests.test_math")]);
//! assert_eq!(info.run_count, 4);
//! assert_eq!(info.run_test_ids.len(), 2);
//! assert!(info.was_successful());
//! # Ok(())
//! # }
//! ```

pub mod bridge;
pub mod cli;
pub mod config;
pub mod dedup;
pub mod engine;
pub mod error;
pub mod manager;
pub mod partial;
pub mod resolver;
pub mod run_info;
pub mod runner;
pub mod suite;
pub mod test_id;
pub mod testlist;
pub mod ui;

pub use error::{Error, Result};
