//! Telling filesystem paths from dotted module paths

use std::path::{Component, Path};

/// Whether `value` names a filesystem path rather than a dotted module path.
pub fn is_path(value: &str) -> bool {
    value.contains('/') || value.contains('\\')
}

/// Whether `name` is usable as one component of a dotted module path.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_alphanumeric())
}

/// Dotted module name of `file` relative to `top`, without the extension.
///
/// Returns None when `file` is not under `top` or a component is not an
/// identifier.
pub fn module_name_from_path(file: &Path, top: &Path) -> Option<String> {
    let relative = file.strip_prefix(top).ok()?;
    let stem = relative.file_stem()?.to_str()?;
    let mut parts = Vec::new();
    if let Some(parent) = relative.parent() {
        for component in parent.components() {
            match component {
                Component::Normal(part) => parts.push(part.to_str()?),
                Component::CurDir => continue,
                _ => return None,
            }
        }
    }
    parts.push(stem);
    if parts.iter().all(|p| is_identifier(p)) {
        Some(parts.join("."))
    } else {
        None
    }
}
