//! Files listing test ids, one per line, for --load-list

use crate::error::Result;
use crate::test_id::TestId;
use std::fs;
use std::path::Path;

/// Parse a test list file into test ids
///
/// Blank lines and lines starting with `#` are ignored; surrounding whitespace
/// is trimmed.
pub fn parse_list_file(path: &Path) -> Result<Vec<TestId>> {
    let content = fs::read_to_string(path)?;
    Ok(parse_list(&content))
}

/// Parse a test list from a string
pub fn parse_list(content: &str) -> Vec<TestId> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(TestId::new)
        .collect()
}

/// Write `ids` to `path`, one per line.
pub fn write_list_file(path: &Path, ids: &[TestId]) -> Result<()> {
    let mut content = String::new();
    for id in ids {
        content.push_str(id.as_str());
        content.push('\n');
    }
    fs::write(path, content)?;
    Ok(())
}
