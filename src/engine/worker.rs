//! Serializable description of an engine session
//!
//! A worker process rebuilds the session it belongs to from a
//! [`WorkerConfig`]: which plugins to load with which options, where to
//! discover and what to run.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One plugin a worker has to load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginSpec {
    pub name: String,
    /// Command-line switch the plugin needs to be active, without dashes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub switch: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, String>,
}

impl PluginSpec {
    pub fn named(name: impl Into<String>) -> Self {
        PluginSpec {
            name: name.into(),
            switch: None,
            options: BTreeMap::new(),
        }
    }

    pub fn with_switch(mut self, switch: impl Into<String>) -> Self {
        self.switch = Some(switch.into());
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub plugins: Vec<PluginSpec>,
    #[serde(default)]
    pub start_dir: Option<String>,
    #[serde(default)]
    pub top_level_dir: Option<String>,
    #[serde(default)]
    pub fail_fast: bool,
    #[serde(default)]
    pub names: Vec<String>,
}

impl WorkerConfig {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn plugin(&self, name: &str) -> Option<&PluginSpec> {
        self.plugins.iter().find(|p| p.name == name)
    }

    /// Engine arguments reproducing the session.
    ///
    /// Default plugins a worker does not register are excluded explicitly.
    pub fn to_argv(&self, default_plugins: &[&str]) -> Vec<String> {
        let mut argv = vec![super::ENGINE_PROGRAM.to_string()];
        for spec in &self.plugins {
            argv.push("--plugin".to_string());
            argv.push(spec.name.clone());
        }
        for name in default_plugins {
            if self.plugin(name).is_none() {
                argv.push("--exclude-plugin".to_string());
                argv.push(name.to_string());
            }
        }
        for switch in self.plugins.iter().filter_map(|p| p.switch.as_ref()) {
            argv.push(format!("--{}", switch));
        }
        if let Some(start) = &self.start_dir {
            argv.push("-s".to_string());
            argv.push(start.clone());
        }
        if let Some(top) = &self.top_level_dir {
            argv.push("-t".to_string());
            argv.push(top.clone());
        }
        argv.extend(self.names.iter().cloned());
        if self.fail_fast {
            argv.push("--fail-fast".to_string());
        }
        argv
    }
}
