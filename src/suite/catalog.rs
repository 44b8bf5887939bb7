//! Registry of importable test modules

use crate::error::{Error, Result};
use crate::suite::TestModule;
use crate::test_id::parse_parameterized_test_id;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Every test module a test binary can import, keyed by dotted name.
///
/// Modules registered as broken stand for sources that exist but fail to
/// import; discovery turns them into failing nodes.
#[derive(Debug, Default, Clone)]
pub struct Catalog {
    modules: BTreeMap<String, Arc<TestModule>>,
    broken: BTreeMap<String, String>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, module: TestModule) -> &mut Self {
        self.broken.remove(module.name());
        self.modules
            .insert(module.name().to_string(), Arc::new(module));
        self
    }

    /// Builder form of [`Catalog::register`].
    pub fn with_module(mut self, module: TestModule) -> Self {
        self.register(module);
        self
    }

    /// Register a module that fails to import with `reason`.
    pub fn register_broken(&mut self, name: impl Into<String>, reason: impl Into<String>) -> &mut Self {
        let name = name.into();
        self.modules.remove(&name);
        self.broken.insert(name, reason.into());
        self
    }

    pub fn contains_module(&self, name: &str) -> bool {
        self.modules.contains_key(name) || self.broken.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty() && self.broken.is_empty()
    }

    /// Import a module by its dotted name.
    pub fn import(&self, name: &str) -> Result<Arc<TestModule>> {
        if let Some(module) = self.modules.get(name) {
            return Ok(module.clone());
        }
        let reason = match self.broken.get(name) {
            Some(reason) => reason.clone(),
            None => format!("No module named '{}'", name),
        };
        Err(Error::Discovery {
            module: name.to_string(),
            reason,
        })
    }

    /// Names of all modules equal to `prefix` or nested below it, sorted.
    pub fn modules_under(&self, prefix: &str) -> Vec<String> {
        let under = |name: &&String| {
            name.as_str() == prefix
                || (name.starts_with(prefix) && name.as_bytes().get(prefix.len()) == Some(&b'.'))
        };
        let mut names: Vec<String> = self
            .modules
            .keys()
            .chain(self.broken.keys())
            .filter(under)
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Modules of the package `name`; empty when `name` is a module itself or
    /// no module lives below it.
    pub fn package_modules(&self, name: &str) -> Vec<String> {
        if name.is_empty() || self.contains_module(name) {
            return Vec::new();
        }
        self.modules_under(name)
    }

    /// Split a dotted name into the longest importable module prefix and the
    /// attribute path that follows it.
    pub fn split_module<'a>(&self, name: &'a str) -> Option<(&'a str, &'a str)> {
        let (_, base) = parse_parameterized_test_id(name);
        let mut end = base.len();
        loop {
            let candidate = &base[..end];
            if self.contains_module(candidate) {
                let rest = name.get(end + 1..).unwrap_or("");
                return Some((candidate, rest));
            }
            end = candidate.rfind('.')?;
        }
    }

    /// Source file and line of the module, case or method named by `id`.
    pub fn source_location(&self, id: &str) -> Option<(PathBuf, Option<u32>)> {
        let (module_name, rest) = self.split_module(id)?;
        let module = self.modules.get(module_name)?;
        let source = module.source()?.to_path_buf();
        let (_, rest) = parse_parameterized_test_id(rest);
        let mut parts = rest.split('.').filter(|p| !p.is_empty());
        let line = match (parts.next(), parts.next()) {
            (Some(case), Some(method)) => module
                .case(case)
                .and_then(|c| c.method(method))
                .and_then(|m| m.line()),
            _ => None,
        };
        Some((source, line))
    }
}
