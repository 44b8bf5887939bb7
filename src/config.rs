//! Settings file (.testrig.conf) parsing and persistence
//!
//! The .testrig.conf file uses INI format with a [DEFAULT] section holding the
//! runner selection and discovery settings of a project.

use crate::error::{Error, Result};
use crate::runner::RunnerKind;
use crate::suite::loader::{compile_pattern, DEFAULT_TEST_PATTERN};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

/// File name of the settings file.
pub const CONFIG_FILE: &str = ".testrig.conf";

/// Settings loaded from .testrig.conf
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RigConfig {
    /// Name of the last selected runner
    pub runner: Option<String>,

    /// Stop a run at the first failure or error
    pub stop_on_error: bool,

    /// Directory path or dotted module path to discover tests from
    pub start_dir_or_module: Option<String>,

    /// Directory module names are relative to
    pub top_dir: Option<String>,

    /// Regular expression test source file names must match
    pub test_pattern: Option<String>,
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(Error::Configuration(format!(
            "{} must be a boolean, got '{}'",
            key, other
        ))),
    }
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl RigConfig {
    /// Load settings from a .testrig.conf file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("Failed to read {}: {}", path.display(), e))
        })?;

        Self::parse(&contents)
    }

    /// Load the settings file of `dir`, or defaults when it has none.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE);
        if path.exists() {
            Self::load_from_file(&path)
        } else {
            Ok(RigConfig::default())
        }
    }

    /// Parse settings from a string
    pub fn parse(contents: &str) -> Result<Self> {
        let ini: HashMap<String, HashMap<String, String>> = serde_ini::from_str(contents)
            .map_err(|e| Error::Configuration(format!("Failed to parse {}: {}", CONFIG_FILE, e)))?;

        let default = ini.get("DEFAULT").ok_or_else(|| {
            Error::Configuration(format!("No [DEFAULT] section in {}", CONFIG_FILE))
        })?;

        let config = RigConfig {
            runner: non_empty(default.get("runner")),
            stop_on_error: match default.get("stop_on_error") {
                Some(value) => parse_bool("stop_on_error", value)?,
                None => false,
            },
            start_dir_or_module: non_empty(default.get("start_dir_or_module")),
            top_dir: non_empty(default.get("top_dir")),
            test_pattern: non_empty(default.get("test_pattern")),
        };

        config.runner_kind()?;
        compile_pattern(config.test_pattern())?;

        Ok(config)
    }

    /// The configured runner, if any.
    pub fn runner_kind(&self) -> Result<Option<RunnerKind>> {
        self.runner.as_deref().map(str::parse).transpose()
    }

    /// The test file pattern, falling back to the default one.
    pub fn test_pattern(&self) -> &str {
        self.test_pattern.as_deref().unwrap_or(DEFAULT_TEST_PATTERN)
    }

    /// Render the settings as a .testrig.conf file.
    pub fn to_ini(&self) -> String {
        let mut out = String::from("[DEFAULT]\n");
        let mut entry = |key: &str, value: &str| {
            let _ = writeln!(out, "{}={}", key, value);
        };
        if let Some(runner) = &self.runner {
            entry("runner", runner);
        }
        entry(
            "stop_on_error",
            if self.stop_on_error { "true" } else { "false" },
        );
        if let Some(start) = &self.start_dir_or_module {
            entry("start_dir_or_module", start);
        }
        if let Some(top) = &self.top_dir {
            entry("top_dir", top);
        }
        if let Some(pattern) = &self.test_pattern {
            entry("test_pattern", pattern);
        }
        out
    }

    /// Write the settings to `path`, replacing any previous file.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_ini())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_basic_config() {
        let config_str = r#"
[DEFAULT]
runner=plugin
"#;

        let config = RigConfig::parse(config_str).unwrap();
        assert_eq!(config.runner.as_deref(), Some("plugin"));
        assert_eq!(config.runner_kind().unwrap(), Some(RunnerKind::Plugin));
        assert!(!config.stop_on_error);
        assert_eq!(config.test_pattern(), DEFAULT_TEST_PATTERN);
    }

    #[test]
    fn test_parse_full_config() {
        let config_str = r#"
[DEFAULT]
runner=basic
stop_on_error=yes
start_dir_or_module=tests/unit
top_dir=tests
test_pattern=^check_.*\.rs$
"#;

        let config = RigConfig::parse(config_str).unwrap();
        assert_eq!(config.runner_kind().unwrap(), Some(RunnerKind::Basic));
        assert!(config.stop_on_error);
        assert_eq!(config.start_dir_or_module.as_deref(), Some("tests/unit"));
        assert_eq!(config.top_dir.as_deref(), Some("tests"));
        assert_eq!(config.test_pattern(), "^check_.*\\.rs$");
    }

    #[test]
    fn test_invalid_runner_name() {
        let config_str = r#"
[DEFAULT]
runner=nose
"#;

        let result = RigConfig::parse(config_str);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("nose"));
    }

    #[test]
    fn test_invalid_pattern() {
        let config_str = r#"
[DEFAULT]
test_pattern=test_(
"#;

        let result = RigConfig::parse(config_str);
        assert!(matches!(result, Err(Error::Pattern(_))));
    }

    #[test]
    fn test_invalid_bool() {
        let config_str = r#"
[DEFAULT]
stop_on_error=maybe
"#;

        let result = RigConfig::parse(config_str);
        assert!(result.unwrap_err().to_string().contains("stop_on_error"));
    }

    #[test]
    fn test_missing_default_section() {
        let config_str = r#"
[OTHER]
runner=basic
"#;

        let result = RigConfig::parse(config_str);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("DEFAULT"));
    }

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let config = RigConfig {
            runner: Some("stub".to_string()),
            stop_on_error: true,
            start_dir_or_module: Some("pkg.tests".to_string()),
            top_dir: None,
            test_pattern: None,
        };
        config.save_to_file(&temp.path().join(CONFIG_FILE)).unwrap();

        let loaded = RigConfig::load_from_dir(temp.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_from_dir_without_file() {
        let temp = TempDir::new().unwrap();
        assert_eq!(
            RigConfig::load_from_dir(temp.path()).unwrap(),
            RigConfig::default()
        );
    }
}
