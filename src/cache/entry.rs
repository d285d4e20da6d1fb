//! Cache entry definitions.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::scanner::Digest;

/// Represents a single file entry in the hash cache.
///
/// `path` is relative to the target root and is the cache's primary key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Target-relative path, `/`-separated
    pub path: String,
    /// Modification time recorded when the digest was computed
    pub mtime: SystemTime,
    /// Content digest
    pub digest: Digest,
}

impl CacheEntry {
    /// Create a new entry.
    #[must_use]
    pub fn new(path: impl Into<String>, mtime: SystemTime, digest: Digest) -> Self {
        Self {
            path: path.into(),
            mtime,
            digest,
        }
    }

    /// Whether this entry is still valid for a file with the given mtime.
    ///
    /// Comparison happens at the stored nanosecond resolution, so a value
    /// that went through the database compares equal to the live one.
    #[must_use]
    pub fn is_fresh(&self, mtime: SystemTime) -> bool {
        mtime_to_nanos(self.mtime) == mtime_to_nanos(mtime)
    }
}

/// Convert a timestamp to signed nanoseconds since the Unix epoch.
///
/// Values outside the `i64` range saturate.
#[must_use]
pub fn mtime_to_nanos(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(after) => i64::try_from(after.as_nanos()).unwrap_or(i64::MAX),
        Err(before) => i64::try_from(before.duration().as_nanos())
            .map(|n| -n)
            .unwrap_or(i64::MIN),
    }
}

/// Convert signed nanoseconds since the Unix epoch back to a timestamp.
#[must_use]
pub fn nanos_to_mtime(nanos: i64) -> SystemTime {
    if nanos >= 0 {
        UNIX_EPOCH + Duration::from_nanos(nanos.unsigned_abs())
    } else {
        UNIX_EPOCH - Duration::from_nanos(nanos.unsigned_abs())
    }
}
