//! Entry codec: maps a cache entry to and from its stored hash record.
//!
//! Each entry is one hash with four fields: payload, comma-joined tag list,
//! modification time and an infinite-lifetime flag. The field names and the
//! comma join are part of the on-wire format shared with existing
//! deployments, so they must not change.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{CacheError, CacheResult};

/// Hash field holding the opaque payload bytes.
pub const FIELD_DATA: &str = "d";
/// Hash field holding the comma-joined tag list.
pub const FIELD_TAGS: &str = "t";
/// Hash field holding the integer unix modification time.
pub const FIELD_MTIME: &str = "m";
/// Hash field holding the infinite-lifetime flag ("0" or "1").
pub const FIELD_INF: &str = "i";

/// Hard ceiling on any stored TTL: 30 days. The store forbids unbounded
/// keys, so "infinite" entries are flagged and re-expired at this bound.
pub const MAX_LIFETIME: u64 = 2_592_000;

const TAG_SEPARATOR: char = ',';

/// Requested lifetime for a save operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifetime {
    /// Use the backend's configured default.
    Default,
    /// Never expire (from the caller's perspective).
    Infinite,
    /// Explicit lifetime in seconds. Zero means infinite.
    Secs(u64),
}

impl Lifetime {
    /// Resolve against the backend default. `None` means infinite; finite
    /// values are capped at [`MAX_LIFETIME`].
    pub fn resolve(self, default: Option<u64>) -> Option<u64> {
        let secs = match self {
            Lifetime::Default => default?,
            Lifetime::Infinite => return None,
            Lifetime::Secs(secs) => secs,
        };
        if secs == 0 {
            None
        } else {
            Some(secs.min(MAX_LIFETIME))
        }
    }
}

/// One cached payload plus its metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Opaque payload bytes chosen by the caller.
    pub payload: Vec<u8>,
    /// Tags attached to this entry.
    pub tags: Vec<String>,
    /// Unix timestamp of the last save.
    pub modified_at: i64,
    /// True when the entry should never expire for the caller.
    pub infinite: bool,
}

impl CacheEntry {
    /// Encode into the stored hash fields.
    pub fn to_fields(&self) -> Vec<(String, Vec<u8>)> {
        vec![
            (FIELD_DATA.to_string(), self.payload.clone()),
            (FIELD_TAGS.to_string(), join_tags(&self.tags).into_bytes()),
            (
                FIELD_MTIME.to_string(),
                self.modified_at.to_string().into_bytes(),
            ),
            (
                FIELD_INF.to_string(),
                if self.infinite { b"1".to_vec() } else { b"0".to_vec() },
            ),
        ]
    }

    /// Decode from the stored hash fields. Returns `None` when the
    /// modification-time field is absent or unreadable, which is how a
    /// missing or foreign record is recognized.
    pub fn from_fields(fields: &HashMap<String, Vec<u8>>) -> Option<Self> {
        let modified_at = parse_mtime(fields.get(FIELD_MTIME)?)?;
        let tags = fields
            .get(FIELD_TAGS)
            .map(|raw| split_tags(&String::from_utf8_lossy(raw)))
            .unwrap_or_default();
        let payload = fields.get(FIELD_DATA).cloned().unwrap_or_default();
        let infinite = fields.get(FIELD_INF).is_some_and(|v| v.as_slice() == b"1");
        Some(Self {
            payload,
            tags,
            modified_at,
            infinite,
        })
    }
}

/// Parse the mtime field bytes into a timestamp.
pub fn parse_mtime(raw: &[u8]) -> Option<i64> {
    std::str::from_utf8(raw).ok()?.trim().parse().ok()
}

/// Join tags into the stored comma-separated form.
pub fn join_tags(tags: &[String]) -> String {
    tags.join(",")
}

/// Split the stored comma-separated tag field, dropping empty segments (an
/// entry saved with no tags stores an empty string).
pub fn split_tags(raw: &str) -> Vec<String> {
    raw.split(TAG_SEPARATOR)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Reject tags the comma-joined field cannot represent unambiguously.
pub fn validate_tags(tags: &[String]) -> CacheResult<()> {
    for tag in tags {
        if tag.is_empty() || tag.contains(TAG_SEPARATOR) {
            return Err(CacheError::InvalidTag(tag.clone()));
        }
    }
    Ok(())
}

/// Current unix time in seconds.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
