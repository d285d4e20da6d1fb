//! Digest caching module for relocase.
//!
//! This module provides persistent storage for target-file digests so that
//! repeated runs avoid re-hashing unchanged files.
//!
//! # Architecture
//!
//! * [`database`]: SQLite persistence, schema management, journaled writes.
//! * [`entry`]: The data model stored in the cache and its freshness check.
//!
//! # Cache Invalidation
//!
//! Entries are keyed by target-relative path and validated by modification
//! time. An entry whose mtime no longer matches the live file is stale and
//! the file is re-hashed. Entries whose path vanished from the target are
//! pruned at the start of every run.
//!
//! # Example
//!
//! ```no_run
//! use relocase::cache::HashCache;
//! use relocase::scanner::{Digest, HashAlgorithm};
//! use std::path::Path;
//! use std::time::SystemTime;
//!
//! let mut cache = HashCache::open(Path::new("/data/target/.relocase.db"), HashAlgorithm::Blake3)?;
//! cache.put("photos/a.jpg", SystemTime::now(), Digest::new("ab12"));
//! cache.commit()?;
//! # Ok::<(), relocase::cache::CacheError>(())
//! ```

pub mod database;
pub mod entry;

pub use database::{CacheError, CacheResult, HashCache};
pub use entry::CacheEntry;
