//! Freshness rules for cache entries.

use std::time::{SystemTime, UNIX_EPOCH};

/// Observable state of a cache entry relative to its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// No cache file exists yet.
    Missing,
    /// A zero-length placeholder exists.
    PlaceholderEmpty,
    /// Cache mtime equals source mtime and the file has content.
    Fresh,
    /// Cache mtime differs from the source mtime.
    Stale,
}

impl EntryState {
    /// Classify an entry from the source mtime and the cache file's
    /// `(mtime, size)`, if a cache file exists.
    pub fn classify(source_modified: SystemTime, cache: Option<(SystemTime, u64)>) -> Self {
        match cache {
            None => Self::Missing,
            Some((_, 0)) => Self::PlaceholderEmpty,
            Some((cache_modified, size)) => {
                if is_stale(source_modified, cache_modified, size) {
                    Self::Stale
                } else {
                    Self::Fresh
                }
            }
        }
    }

    pub fn is_fresh(self) -> bool {
        matches!(self, Self::Fresh)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Missing => "missing",
            Self::PlaceholderEmpty => "placeholder",
            Self::Fresh => "fresh",
            Self::Stale => "stale",
        }
    }
}

/// An entry is stale unless its mtime equals the source mtime and it is
/// non-empty. Equality rather than ordering also catches sources that move
/// backwards in time, e.g. restored backups.
///
/// Timestamps are compared at the coarser precision of the two: when either
/// side carries no sub-second part (a cache root on a filesystem that stores
/// whole seconds, such as some network mounts) only the seconds must match.
pub fn is_stale(source_modified: SystemTime, cache_modified: SystemTime, cache_size: u64) -> bool {
    cache_size == 0 || !same_mtime(source_modified, cache_modified)
}

fn same_mtime(a: SystemTime, b: SystemTime) -> bool {
    match (a.duration_since(UNIX_EPOCH), b.duration_since(UNIX_EPOCH)) {
        (Ok(left), Ok(right)) if left.subsec_nanos() == 0 || right.subsec_nanos() == 0 => {
            left.as_secs() == right.as_secs()
        }
        _ => a == b,
    }
}
