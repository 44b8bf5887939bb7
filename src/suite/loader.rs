//! Test discovery and loading by name
//!
//! Discovery maps source files below a start directory to dotted module names
//! (relative to the top directory) and imports them from the [`Catalog`].
//! Modules that fail to import become [`TestNode::FailedToLoad`] nodes so a
//! single broken module never aborts a whole discovery pass.

use crate::error::Result;
use crate::resolver::{is_identifier, is_path, module_name_from_path};
use crate::suite::{Catalog, TestNode};
use crate::test_id::{parse_parameterized_test_id, TestId};
use regex::Regex;
use std::path::Path;
use tracing::{debug, error, warn};
use walkdir::WalkDir;

/// Default file name pattern for test sources.
pub const DEFAULT_TEST_PATTERN: &str = r"^test.*\.rs$";

/// Directory suffix of archives only the archive-aware loader descends into.
pub const ARCHIVE_SUFFIX: &str = ".archive";

/// Compile a test file name pattern.
pub fn compile_pattern(pattern: &str) -> Result<Regex> {
    Ok(Regex::new(pattern)?)
}

/// Import `module` and return its tree, or a failing stand-in node.
pub fn import_node(catalog: &Catalog, module: &str) -> TestNode {
    match catalog.import(module) {
        Ok(m) => m.to_node(),
        Err(e) => {
            error!("Unable to load tests from {}: {}", module, e);
            TestNode::FailedToLoad {
                id: TestId::new(module),
                reason: e.to_string(),
            }
        }
    }
}

/// Discover tests from a directory path or a dotted module path.
///
/// `top` is the directory module names are relative to; when it is empty or
/// not a directory the start directory is used.
pub fn discover(catalog: &Catalog, start: &str, top: &str, pattern: &Regex) -> TestNode {
    let start_path = Path::new(start);
    if is_path(start) || start_path.is_dir() {
        let top_path = Path::new(top);
        let top_path = if !top.is_empty() && top_path.is_dir() {
            top_path
        } else {
            start_path
        };
        discover_dir(catalog, start_path, top_path, pattern)
    } else {
        discover_module(catalog, start)
    }
}

/// Walk `start` for files matching `pattern` and import them.
///
/// Directories whose names are not identifiers (including archives and hidden
/// directories) are not descended into.
pub fn discover_dir(catalog: &Catalog, start: &Path, top: &Path, pattern: &Regex) -> TestNode {
    let walker = WalkDir::new(start)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || !entry.file_type().is_dir()
                || entry.file_name().to_str().is_some_and(is_identifier)
        });

    let mut children = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Failed to walk {}: {}", start.display(), e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let matches = entry
            .file_name()
            .to_str()
            .is_some_and(|name| pattern.is_match(name));
        if !matches {
            continue;
        }
        match module_name_from_path(entry.path(), top) {
            Some(module) => {
                debug!("Discovered {} at {}", module, entry.path().display());
                children.push(import_node(catalog, &module));
            }
            None => warn!(
                "{} is not importable from {}",
                entry.path().display(),
                top.display()
            ),
        }
    }
    TestNode::suite(start.display().to_string(), children)
}

/// Find every archive directory below `start` and discover inside it.
///
/// Each archive is its own import root.
pub fn discover_archives(catalog: &Catalog, start: &Path, pattern: &Regex) -> TestNode {
    let mut children = Vec::new();
    for entry in WalkDir::new(start).sort_by_file_name().into_iter().flatten() {
        let is_archive = entry.file_type().is_dir()
            && entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.ends_with(ARCHIVE_SUFFIX));
        if is_archive {
            debug!("Descending into archive {}", entry.path().display());
            children.push(discover_dir(catalog, entry.path(), entry.path(), pattern));
        }
    }
    TestNode::suite(start.display().to_string(), children)
}

/// Import the module `name` and every module nested below it.
pub fn discover_module(catalog: &Catalog, name: &str) -> TestNode {
    let modules = catalog.modules_under(name);
    if modules.is_empty() {
        return import_node(catalog, name);
    }
    TestNode::suite(
        name,
        modules.iter().map(|m| import_node(catalog, m)).collect(),
    )
}

/// Load the tests named by a dotted id: a module, a case, a method, or one
/// instance of a parameterized method (`...method:N`).
///
/// A package name (a prefix of modules that is not itself a module) loads
/// all its modules when `expand_packages` is set and nothing otherwise.
pub fn load_name(catalog: &Catalog, name: &str, expand_packages: bool) -> TestNode {
    let Some((module_name, rest)) = catalog.split_module(name) else {
        let package = catalog.package_modules(name);
        if package.is_empty() {
            return import_node(catalog, name);
        }
        if expand_packages {
            return TestNode::suite(
                name,
                package.iter().map(|m| import_node(catalog, m)).collect(),
            );
        }
        warn!(
            "{} is a package; its modules have to be loaded individually",
            name
        );
        return TestNode::suite(name, Vec::new());
    };

    let module = match catalog.import(module_name) {
        Ok(module) => module,
        Err(_) => return import_node(catalog, module_name),
    };
    if rest.is_empty() {
        return module.to_node();
    }

    let missing = || {
        error!("Module {} has no attribute {}", module_name, rest);
        TestNode::FailedToLoad {
            id: TestId::new(name),
            reason: format!("module '{}' has no attribute '{}'", module_name, rest),
        }
    };

    let (parameterized, attr) = parse_parameterized_test_id(rest);
    let mut parts = attr.split('.');
    let (Some(case_name), method_name, None) = (parts.next(), parts.next(), parts.next()) else {
        return missing();
    };
    let Some(case) = module.case(case_name) else {
        return missing();
    };
    let Some(method_name) = method_name else {
        if parameterized {
            return missing();
        }
        return case.to_node(module_name);
    };
    let Some(method) = case.method(method_name) else {
        return missing();
    };
    if !parameterized {
        return method.to_node(module_name, case);
    }
    let index = rest
        .split_once(':')
        .and_then(|(_, index)| index.parse::<usize>().ok());
    let instance = index.and_then(|index| {
        method
            .instances(module_name, case)
            .into_iter()
            .find(|instance| instance.id().as_str() == name)
            .filter(|_| index > 0)
    });
    match instance {
        Some(instance) => TestNode::Test(instance),
        None => missing(),
    }
}

/// Load several names into one suite, in order.
pub fn load_names(catalog: &Catalog, names: &[TestId], expand_packages: bool) -> TestNode {
    TestNode::suite(
        "",
        names
            .iter()
            .map(|name| load_name(catalog, name.as_str(), expand_packages))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suite::{TestCase, TestModule};
    use std::fs;
    use tempfile::TempDir;

    fn default_pattern() -> Regex {
        compile_pattern(DEFAULT_TEST_PATTERN).unwrap()
    }

    fn catalog() -> Catalog {
        let mut catalog = Catalog::new();
        catalog
            .register(
                TestModule::new("pkg.test_one").with_case(
                    TestCase::new("OneCase")
                        .test("test_a", || Ok(()))
                        .parameterized("test_p", 2, |_| Ok(())),
                ),
            )
            .register(
                TestModule::new("pkg.test_two")
                    .with_case(TestCase::new("TwoCase").test("test_b", || Ok(()))),
            )
            .register_broken("pkg.test_broken", "cannot import helpers");
        catalog
    }

    fn ids(node: &TestNode) -> Vec<String> {
        node.leaf_ids()
            .into_iter()
            .map(|id| id.as_str().to_string())
            .collect()
    }

    #[test]
    fn test_load_method() {
        let node = load_name(&catalog(), "pkg.test_one.OneCase.test_a", false);
        assert_eq!(ids(&node), vec!["pkg.test_one.OneCase.test_a"]);
        assert!(matches!(node, TestNode::Test(_)));
    }

    #[test]
    fn test_load_parameterized_method() {
        let node = load_name(&catalog(), "pkg.test_one.OneCase.test_p", false);
        assert_eq!(
            ids(&node),
            vec!["pkg.test_one.OneCase.test_p:1", "pkg.test_one.OneCase.test_p:2"]
        );
    }

    #[test]
    fn test_load_parameter_instance() {
        let node = load_name(&catalog(), "pkg.test_one.OneCase.test_p:2", false);
        assert_eq!(ids(&node), vec!["pkg.test_one.OneCase.test_p:2"]);

        let node = load_name(&catalog(), "pkg.test_one.OneCase.test_p:9", false);
        assert!(matches!(node, TestNode::FailedToLoad { .. }));
    }

    #[test]
    fn test_load_case_and_module() {
        let node = load_name(&catalog(), "pkg.test_one.OneCase", false);
        assert_eq!(node.count_leaves(), 3);
        let node = load_name(&catalog(), "pkg.test_two", false);
        assert_eq!(ids(&node), vec!["pkg.test_two.TwoCase.test_b"]);
    }

    #[test]
    fn test_load_missing_attribute() {
        let node = load_name(&catalog(), "pkg.test_one.OneCase.test_zzz", false);
        match node {
            TestNode::FailedToLoad { id, reason } => {
                assert_eq!(id.as_str(), "pkg.test_one.OneCase.test_zzz");
                assert!(reason.contains("no attribute"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_load_broken_module() {
        let node = load_name(&catalog(), "pkg.test_broken.Case.test", false);
        match node {
            TestNode::FailedToLoad { id, reason } => {
                assert_eq!(id.as_str(), "pkg.test_broken");
                assert!(reason.contains("cannot import helpers"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_load_package() {
        let catalog = catalog();
        let node = load_name(&catalog, "pkg", false);
        assert_eq!(node.count_leaves(), 0);

        let node = load_name(&catalog, "pkg", true);
        let ids = ids(&node);
        assert_eq!(ids.len(), 5);
        assert!(ids.contains(&"pkg.test_broken".to_string()));
    }

    #[test]
    fn test_load_unknown_name() {
        let node = load_name(&catalog(), "nothing.here", true);
        assert!(matches!(node, TestNode::FailedToLoad { .. }));
    }

    #[test]
    fn test_discover_module_includes_submodules() {
        let node = discover(&catalog(), "pkg", "", &default_pattern());
        assert_eq!(node.count_leaves(), 5);
    }

    #[test]
    fn test_discover_dir() {
        let temp = TempDir::new().unwrap();
        let pkg = temp.path().join("pkg");
        fs::create_dir_all(&pkg).unwrap();
        fs::write(pkg.join("test_one.rs"), "").unwrap();
        fs::write(pkg.join("test_two.rs"), "").unwrap();
        fs::write(pkg.join("helpers.rs"), "").unwrap();

        let node = discover_dir(&catalog(), &pkg, temp.path(), &default_pattern());
        assert_eq!(
            ids(&node),
            vec![
                "pkg.test_one.OneCase.test_a",
                "pkg.test_one.OneCase.test_p:1",
                "pkg.test_one.OneCase.test_p:2",
                "pkg.test_two.TwoCase.test_b",
            ]
        );
    }

    #[test]
    fn test_discover_dir_unknown_module_fails_to_load() {
        let temp = TempDir::new().unwrap();
        let pkg = temp.path().join("pkg");
        fs::create_dir_all(&pkg).unwrap();
        fs::write(pkg.join("test_unregistered.rs"), "").unwrap();

        let node = discover_dir(&catalog(), &pkg, temp.path(), &default_pattern());
        let leaves = node.leaves();
        assert_eq!(leaves.len(), 1);
        assert!(matches!(leaves[0], TestNode::FailedToLoad { .. }));
        assert_eq!(leaves[0].id(), "pkg.test_unregistered");
    }

    #[test]
    fn test_discover_dir_skips_archives() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("vendored.archive").join("pkg");
        fs::create_dir_all(&archive).unwrap();
        fs::write(archive.join("test_two.rs"), "").unwrap();

        let plain = discover_dir(&catalog(), temp.path(), temp.path(), &default_pattern());
        assert_eq!(plain.count_leaves(), 0);

        let archived = discover_archives(&catalog(), temp.path(), &default_pattern());
        assert_eq!(ids(&archived), vec!["pkg.test_two.TwoCase.test_b"]);
    }

    #[test]
    fn test_discover_falls_back_to_start_as_top() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("test_x.rs"), "").unwrap();
        let mut catalog = Catalog::new();
        catalog.register(
            TestModule::new("test_x").with_case(TestCase::new("X").test("test_it", || Ok(()))),
        );

        let start = format!("{}/", temp.path().display());
        let node = discover(&catalog, &start, "", &default_pattern());
        assert_eq!(ids(&node), vec!["test_x.X.test_it"]);
    }
}
