//! Duplicate suppression for discovered tests
//!
//! Two discovery mechanisms running in one session can enumerate the same
//! nodes. Everything here keeps the first occurrence and preserves order.

use std::collections::HashSet;
use std::hash::Hash;

/// Keep the first occurrence of every item, in original order.
///
/// ```
/// use testrig::dedup::remove_duplicates;
///
/// let ids = vec!["m.T.test_a", "m.T.test_a", "m.T.test_b"];
/// assert_eq!(remove_duplicates(ids), vec!["m.T.test_a", "m.T.test_b"]);
/// ```
pub fn remove_duplicates<T>(items: Vec<T>) -> Vec<T>
where
    T: Eq + Hash + Clone,
{
    remove_duplicates_by_key(items, |item| item.clone())
}

/// Keep the first item for every distinct key, in original order.
pub fn remove_duplicates_by_key<T, K, F>(items: Vec<T>, mut key: F) -> Vec<T>
where
    K: Eq + Hash,
    F: FnMut(&T) -> K,
{
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(key(item)))
        .collect()
}
