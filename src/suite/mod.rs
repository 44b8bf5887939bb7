//! In-process test model
//!
//! Test binaries describe their tests as [`TestModule`]s made of
//! [`TestCase`]s. A case has optional `set_up`/`tear_down` steps and a list of
//! test methods, some of which may be parameterized. Modules are registered
//! in a [`Catalog`], which the loader uses to import them by dotted name.
//!
//! # Example
//!
//! ```
//! use testrig::suite::{ensure, Catalog, TestCase, TestModule};
//!
//! let mut catalog = Catalog::new();
//! catalog.register(
//!     TestModule::new("pkg.test_math").with_case(
//!         TestCase::new("MathCase")
//!             .test("test_add", || ensure(1 + 1 == 2, "addition is broken"))
//!             .parameterized("test_square", 3, |i| ensure(i * i >= i, "square shrank")),
//!     ),
//! );
//! assert!(catalog.contains_module("pkg.test_math"));
//! ```

use crate::test_id::{parameterized_test_id, TestId};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub mod catalog;
pub mod loader;

pub use catalog::Catalog;

/// Why a test step did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepError {
    /// An assertion did not hold.
    Failure(String),
    /// The step raised something other than an assertion.
    Error(String),
    /// The step asked for the test to be skipped.
    Skip(String),
}

impl StepError {
    pub fn failure(message: impl Into<String>) -> Self {
        StepError::Failure(message.into())
    }

    pub fn error(message: impl Into<String>) -> Self {
        StepError::Error(message.into())
    }

    pub fn skip(reason: impl Into<String>) -> Self {
        StepError::Skip(reason.into())
    }
}

impl fmt::Display for StepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepError::Failure(m) => write!(f, "failure: {}", m),
            StepError::Error(m) => write!(f, "error: {}", m),
            StepError::Skip(m) => write!(f, "skipped: {}", m),
        }
    }
}

/// Outcome of one lifecycle step.
pub type StepResult = std::result::Result<(), StepError>;

/// Fail the current step unless `condition` holds.
pub fn ensure(condition: bool, message: impl Into<String>) -> StepResult {
    if condition {
        Ok(())
    } else {
        Err(StepError::failure(message))
    }
}

/// A `set_up` or `tear_down` step.
pub type Step = Arc<dyn Fn() -> StepResult + Send + Sync>;

/// A test body; receives the 1-based parameter index, or 0 when not parameterized.
pub type Body = Arc<dyn Fn(usize) -> StepResult + Send + Sync>;

/// One test method of a case.
#[derive(Clone)]
pub struct TestMethod {
    name: String,
    body: Body,
    params: Option<usize>,
    expected_failure: bool,
    line: Option<u32>,
}

impl TestMethod {
    pub fn new<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn() -> StepResult + Send + Sync + 'static,
    {
        TestMethod {
            name: name.into(),
            body: Arc::new(move |_| body()),
            params: None,
            expected_failure: false,
            line: None,
        }
    }

    /// A method run once per parameter index `1..=count`.
    pub fn parameterized<F>(name: impl Into<String>, count: usize, body: F) -> Self
    where
        F: Fn(usize) -> StepResult + Send + Sync + 'static,
    {
        TestMethod {
            name: name.into(),
            body: Arc::new(body),
            params: Some(count),
            expected_failure: false,
            line: None,
        }
    }

    /// Mark the method as expected to fail.
    pub fn expecting_failure(mut self) -> Self {
        self.expected_failure = true;
        self
    }

    /// Record the source line of the method for navigation.
    pub fn at_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn line(&self) -> Option<u32> {
        self.line
    }

    pub fn param_count(&self) -> Option<usize> {
        self.params
    }

    fn instance(&self, case: &TestCase, id: String, param: usize) -> TestInstance {
        TestInstance {
            id: TestId::new(id),
            case_name: case.name.clone(),
            set_up: case.set_up.clone(),
            tear_down: case.tear_down.clone(),
            body: self.body.clone(),
            param,
            expected_failure: self.expected_failure,
        }
    }

    /// All runnable instances of this method inside `case` of `module`.
    pub fn instances(&self, module: &str, case: &TestCase) -> Vec<TestInstance> {
        let base = format!("{}.{}.{}", module, case.name, self.name);
        match self.params {
            None => vec![self.instance(case, base, 0)],
            Some(count) => (1..=count)
                .map(|i| self.instance(case, parameterized_test_id(&base, i), i))
                .collect(),
        }
    }

    /// Tree node for this method: a single test, or a suite of instances.
    pub fn to_node(&self, module: &str, case: &TestCase) -> TestNode {
        let mut instances = self.instances(module, case);
        if self.params.is_none() && instances.len() == 1 {
            return TestNode::Test(instances.remove(0));
        }
        TestNode::Suite {
            id: format!("{}.{}.{}", module, case.name, self.name),
            children: instances.into_iter().map(TestNode::Test).collect(),
        }
    }
}

impl fmt::Debug for TestMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestMethod")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("expected_failure", &self.expected_failure)
            .finish()
    }
}

/// A test case: shared fixture steps around a set of test methods.
#[derive(Clone)]
pub struct TestCase {
    name: String,
    set_up: Option<Step>,
    tear_down: Option<Step>,
    methods: Vec<TestMethod>,
}

impl TestCase {
    pub fn new(name: impl Into<String>) -> Self {
        TestCase {
            name: name.into(),
            set_up: None,
            tear_down: None,
            methods: Vec::new(),
        }
    }

    pub fn with_set_up<F>(mut self, step: F) -> Self
    where
        F: Fn() -> StepResult + Send + Sync + 'static,
    {
        self.set_up = Some(Arc::new(step));
        self
    }

    pub fn with_tear_down<F>(mut self, step: F) -> Self
    where
        F: Fn() -> StepResult + Send + Sync + 'static,
    {
        self.tear_down = Some(Arc::new(step));
        self
    }

    pub fn with_method(mut self, method: TestMethod) -> Self {
        self.methods.push(method);
        self
    }

    pub fn test<F>(self, name: impl Into<String>, body: F) -> Self
    where
        F: Fn() -> StepResult + Send + Sync + 'static,
    {
        self.with_method(TestMethod::new(name, body))
    }

    pub fn parameterized<F>(self, name: impl Into<String>, count: usize, body: F) -> Self
    where
        F: Fn(usize) -> StepResult + Send + Sync + 'static,
    {
        self.with_method(TestMethod::parameterized(name, count, body))
    }

    pub fn expected_failure<F>(self, name: impl Into<String>, body: F) -> Self
    where
        F: Fn() -> StepResult + Send + Sync + 'static,
    {
        self.with_method(TestMethod::new(name, body).expecting_failure())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn methods(&self) -> &[TestMethod] {
        &self.methods
    }

    pub fn method(&self, name: &str) -> Option<&TestMethod> {
        self.methods.iter().find(|m| m.name == name)
    }

    pub fn to_node(&self, module: &str) -> TestNode {
        TestNode::Suite {
            id: format!("{}.{}", module, self.name),
            children: self
                .methods
                .iter()
                .map(|m| m.to_node(module, self))
                .collect(),
        }
    }
}

impl fmt::Debug for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCase")
            .field("name", &self.name)
            .field("methods", &self.methods)
            .finish()
    }
}

/// A named, importable collection of test cases.
#[derive(Debug, Clone)]
pub struct TestModule {
    name: String,
    source: Option<PathBuf>,
    cases: Vec<TestCase>,
}

impl TestModule {
    pub fn new(name: impl Into<String>) -> Self {
        TestModule {
            name: name.into(),
            source: None,
            cases: Vec::new(),
        }
    }

    /// Record the source file the module was written in.
    pub fn with_source(mut self, path: impl Into<PathBuf>) -> Self {
        self.source = Some(path.into());
        self
    }

    pub fn with_case(mut self, case: TestCase) -> Self {
        self.cases.push(case);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn cases(&self) -> &[TestCase] {
        &self.cases
    }

    pub fn case(&self, name: &str) -> Option<&TestCase> {
        self.cases.iter().find(|c| c.name == name)
    }

    pub fn to_node(&self) -> TestNode {
        TestNode::Suite {
            id: self.name.clone(),
            children: self.cases.iter().map(|c| c.to_node(&self.name)).collect(),
        }
    }
}

/// One runnable test: a single method, or one instance of a parameterized one.
#[derive(Clone)]
pub struct TestInstance {
    id: TestId,
    case_name: String,
    set_up: Option<Step>,
    tear_down: Option<Step>,
    body: Body,
    param: usize,
    expected_failure: bool,
}

impl TestInstance {
    pub fn id(&self) -> &TestId {
        &self.id
    }

    pub fn case_name(&self) -> &str {
        &self.case_name
    }

    pub fn is_expected_failure(&self) -> bool {
        self.expected_failure
    }

    pub(crate) fn set_up(&self) -> StepResult {
        match &self.set_up {
            Some(step) => step(),
            None => Ok(()),
        }
    }

    pub(crate) fn body(&self) -> StepResult {
        (self.body)(self.param)
    }

    pub(crate) fn tear_down(&self) -> StepResult {
        match &self.tear_down {
            Some(step) => step(),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for TestInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestInstance")
            .field("id", &self.id)
            .field("case_name", &self.case_name)
            .field("expected_failure", &self.expected_failure)
            .finish()
    }
}

/// A loaded test tree.
#[derive(Debug, Clone)]
pub enum TestNode {
    Suite { id: String, children: Vec<TestNode> },
    Test(TestInstance),
    /// Stand-in for a module that could not be imported; runs as an error.
    FailedToLoad { id: TestId, reason: String },
}

impl TestNode {
    pub fn empty() -> Self {
        TestNode::Suite {
            id: String::new(),
            children: Vec::new(),
        }
    }

    pub fn suite(id: impl Into<String>, children: Vec<TestNode>) -> Self {
        TestNode::Suite {
            id: id.into(),
            children,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            TestNode::Suite { id, .. } => id,
            TestNode::Test(instance) => instance.id.as_str(),
            TestNode::FailedToLoad { id, .. } => id.as_str(),
        }
    }

    pub fn is_leaf(&self) -> bool {
        !matches!(self, TestNode::Suite { .. })
    }

    /// All leaves in depth-first order.
    pub fn leaves(&self) -> Vec<&TestNode> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a TestNode>) {
        match self {
            TestNode::Suite { children, .. } => {
                for child in children {
                    child.collect_leaves(out);
                }
            }
            leaf => out.push(leaf),
        }
    }

    /// The first concrete test of this tree.
    pub fn first_leaf(&self) -> Option<&TestNode> {
        match self {
            TestNode::Suite { children, .. } => children.iter().find_map(|c| c.first_leaf()),
            leaf => Some(leaf),
        }
    }

    /// Ids of all leaves, raw (parameter suffixes kept).
    pub fn leaf_ids(&self) -> Vec<TestId> {
        self.leaves()
            .into_iter()
            .map(|leaf| TestId::new(leaf.id()))
            .collect()
    }

    pub fn count_leaves(&self) -> usize {
        self.leaves().len()
    }
}
