//! Error types for testrig

use std::io;
use thiserror::Error;

/// Result type alias for testrig operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for testrig
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid runner kind, invalid settings or engine arguments.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A module could not be imported while discovering tests.
    #[error("Unable to import the module {module}: {reason}")]
    Discovery { module: String, reason: String },

    /// A test step raised. Captured per test and never propagated to the manager.
    #[error("Test {test_id} raised: {message}")]
    Execution { test_id: String, message: String },

    /// A runner backend is not available in this build.
    #[error("The test runner {name} is unavailable, consider installing it: {remedy}")]
    DependencyUnavailable { name: String, remedy: String },

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The test file pattern is not a valid regular expression.
    #[error("Invalid test pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// Worker configuration could not be (de)serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other error with custom message.
    #[error("{0}")]
    Other(String),
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Other(s.to_string())
    }
}
