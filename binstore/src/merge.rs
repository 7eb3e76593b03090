//! Id-keyed list operations applied between fetch and replace.
//!
//! All functions take the list by value and return the new list; entry order
//! is preserved for everything that survives.

use crate::entry::Entry;
use std::collections::HashSet;

/// What dedup does with entries that carry no usable id.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdlessPolicy {
    /// Used on normal append and delete: entries without an id are never
    /// dropped as a side effect of someone else's write.
    Keep,
    /// Used by repair: entries without an id cannot be addressed, so they go.
    Drop,
}

/// Keeps the first occurrence of each id and drops later ones.
pub fn dedup_by_id(entries: Vec<Entry>, policy: IdlessPolicy) -> Vec<Entry> {
    let mut seen: HashSet<String> = HashSet::with_capacity(entries.len());

    entries
        .into_iter()
        .filter(|entry| match entry.id() {
            Some(id) => seen.insert(id.to_string()),
            None => policy == IdlessPolicy::Keep,
        })
        .collect()
}

/// Replaces the entry sharing `entry`'s id in place, or appends it.
///
/// Further entries with the same id are removed so a re-submission also heals
/// earlier duplicates. An entry without an id is always appended.
pub fn merge_append(entries: Vec<Entry>, entry: Entry) -> Vec<Entry> {
    let Some(id) = entry.id().map(str::to_string) else {
        let mut entries = entries;
        entries.push(entry);
        return entries;
    };

    let mut merged = Vec::with_capacity(entries.len() + 1);
    let mut pending = Some(entry);

    for existing in entries {
        if existing.id() != Some(id.as_str()) {
            merged.push(existing);
        } else if let Some(replacement) = pending.take() {
            merged.push(replacement);
        }
    }

    if let Some(entry) = pending {
        merged.push(entry);
    }

    merged
}

/// Removes every entry whose id equals `id` and reports how many went.
pub fn merge_delete(entries: Vec<Entry>, id: &str) -> (Vec<Entry>, usize) {
    let before = entries.len();
    let kept: Vec<Entry> = entries
        .into_iter()
        .filter(|entry| entry.id() != Some(id))
        .collect();
    let removed = before - kept.len();
    (kept, removed)
}
