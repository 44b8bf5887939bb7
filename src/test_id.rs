//! Test identifiers and the parameterized-id codec
//!
//! A test id names one runnable unit in dotted form, `module.Case.method`.
//! Parameterized tests run several instances that share one base id and are
//! told apart by a `:N` suffix, e.g. `pkg.test_math.MathCase.test_square:2`.

use std::fmt;

/// Separator between a base id and the instance index of a parameterized test.
pub const PARAM_SEPARATOR: char = ':';

/// Split a test id into `(is_parameterized, base_id)`.
///
/// The base id is everything before the first `:`.
///
/// ```
/// use testrig::test_id::parse_parameterized_test_id;
///
/// assert_eq!(parse_parameterized_test_id("pkg.Case.test_x"), (false, "pkg.Case.test_x"));
/// assert_eq!(parse_parameterized_test_id("pkg.Case.test_x:3"), (true, "pkg.Case.test_x"));
/// ```
pub fn parse_parameterized_test_id(test_id: &str) -> (bool, &str) {
    match test_id.split_once(PARAM_SEPARATOR) {
        Some((base, _)) => (true, base),
        None => (false, test_id),
    }
}

/// Build the id of the `index`th instance of a parameterized test.
pub fn parameterized_test_id(base_id: &str, index: usize) -> String {
    format!("{}{}{}", base_id, PARAM_SEPARATOR, index)
}

/// Unique identifier for a test
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TestId(String);

impl TestId {
    /// Creates a new test identifier from a string.
    pub fn new(id: impl Into<String>) -> Self {
        TestId(id.into())
    }

    /// Returns the test identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this id names one instance of a parameterized test.
    pub fn is_parameterized(&self) -> bool {
        parse_parameterized_test_id(&self.0).0
    }

    /// The grouping key shared by every instance of a parameterized test.
    pub fn base_id(&self) -> TestId {
        TestId::new(parse_parameterized_test_id(&self.0).1)
    }
}

impl fmt::Display for TestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TestId {
    fn from(s: String) -> Self {
        TestId(s)
    }
}

impl From<&str> for TestId {
    fn from(s: &str) -> Self {
        TestId(s.to_string())
    }
}

impl AsRef<str> for TestId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
