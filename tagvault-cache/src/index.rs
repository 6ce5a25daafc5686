//! Tag index key scheme and helpers.
//!
//! The index is three kinds of store records: a global set of all live ids,
//! a global set of all tags in use, and one membership set per tag holding
//! the ids currently carrying it. The prefixes are shared with existing
//! deployments and must not change.

use std::collections::HashSet;

/// Global set of all known entry ids.
pub const ID_SET: &str = "zc:ids";
/// Global set of all tags in use.
pub const TAG_SET: &str = "zc:tags";
/// Prefix for per-entry hash records.
pub const ENTRY_PREFIX: &str = "zc:k:";
/// Prefix for per-tag membership sets.
pub const TAG_PREFIX: &str = "zc:ti:";

/// Store key of the hash record for an entry id.
pub fn entry_key(id: &str) -> String {
    format!("{ENTRY_PREFIX}{id}")
}

/// Store key of the membership set for a tag.
pub fn tag_key(tag: &str) -> String {
    format!("{TAG_PREFIX}{tag}")
}

/// Entry keys for a batch of ids.
pub fn entry_keys(ids: &[String]) -> Vec<String> {
    ids.iter().map(|id| entry_key(id)).collect()
}

/// Membership-set keys for a batch of tags.
pub fn tag_keys(tags: &[String]) -> Vec<String> {
    tags.iter().map(|tag| tag_key(tag)).collect()
}

/// Tags gained and lost between two saves of the same entry.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct TagDiff {
    /// Tags in the new list but not the old.
    pub added: Vec<String>,
    /// Tags in the old list but not the new.
    pub removed: Vec<String>,
}

/// Compute which memberships a save must create and which it must drop.
pub fn diff_tags(old: &[String], new: &[String]) -> TagDiff {
    let old_set: HashSet<&str> = old.iter().map(String::as_str).collect();
    let new_set: HashSet<&str> = new.iter().map(String::as_str).collect();

    TagDiff {
        added: new
            .iter()
            .filter(|t| !old_set.contains(t.as_str()))
            .cloned()
            .collect(),
        removed: old
            .iter()
            .filter(|t| !new_set.contains(t.as_str()))
            .cloned()
            .collect(),
    }
}
