//! SQLite-backed digest cache.
//!
//! The cache keeps every row in memory for lookups and journals mutations
//! until [`HashCache::commit`], which applies them in one SQLite
//! transaction. A crash between two commits therefore loses at most the
//! writes of the batch in flight, and never leaves half of a rename behind.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

use super::entry::{mtime_to_nanos, nanos_to_mtime, CacheEntry};
use crate::scanner::{Digest, HashAlgorithm};

/// Current on-disk schema version.
pub const SCHEMA_VERSION: i64 = 1;

/// Errors raised by the cache store.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The underlying SQLite call failed.
    #[error("cache database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The database was written by a newer relocase.
    #[error("cache schema version {found} is newer than supported version {supported}")]
    SchemaVersion {
        /// Version found in the database
        found: i64,
        /// Highest version this build understands
        supported: i64,
    },

    /// The metadata table names an unknown digest algorithm.
    #[error("cache records unknown digest algorithm '{0}'")]
    UnknownAlgorithm(String),
}

/// Result alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// A mutation waiting for the next commit.
#[derive(Debug, Clone)]
enum PendingWrite {
    Put(CacheEntry),
    Delete(String),
    Rename { from: String, entry: CacheEntry },
}

/// Persistent cache for file digests using SQLite.
pub struct HashCache {
    conn: Connection,
    path: Option<PathBuf>,
    algorithm: HashAlgorithm,
    entries: HashMap<String, CacheEntry>,
    pending: Vec<PendingWrite>,
}

impl std::fmt::Debug for HashCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashCache")
            .field("path", &self.path)
            .field("algorithm", &self.algorithm)
            .field("entries", &self.entries.len())
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl HashCache {
    /// Opens or creates the cache database at `path`.
    ///
    /// If the database was filled with a different digest algorithm its
    /// entries are discarded, since none of them could ever match.
    ///
    /// # Errors
    ///
    /// Fails if the file is not a SQLite database, the schema is newer than
    /// supported, or the database cannot be written.
    pub fn open(path: &Path, algorithm: HashAlgorithm) -> CacheResult<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })?;
        let cache = Self::initialize(conn, Some(path.to_path_buf()), algorithm)?;
        log::debug!(
            "Opened cache {} with {} entries",
            path.display(),
            cache.entries.len()
        );
        Ok(cache)
    }

    /// Creates a transient cache that is never written to disk.
    ///
    /// Used for dry runs: it starts empty and vanishes with the process.
    ///
    /// # Errors
    ///
    /// Fails only if SQLite cannot allocate the in-memory database.
    pub fn in_memory(algorithm: HashAlgorithm) -> CacheResult<Self> {
        Self::initialize(Connection::open_in_memory()?, None, algorithm)
    }

    fn initialize(
        mut conn: Connection,
        path: Option<PathBuf>,
        algorithm: HashAlgorithm,
    ) -> CacheResult<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS cache_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS hash_cache (
                path TEXT PRIMARY KEY,
                mtime_ns INTEGER NOT NULL,
                digest TEXT NOT NULL
            );",
        )?;

        Self::check_meta(&mut conn, algorithm)?;
        let entries = Self::load_entries(&conn)?;

        Ok(Self {
            conn,
            path,
            algorithm,
            entries,
            pending: Vec::new(),
        })
    }

    fn read_meta(conn: &Connection, key: &str) -> CacheResult<Option<String>> {
        Ok(conn
            .query_row(
                "SELECT value FROM cache_meta WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn check_meta(conn: &mut Connection, algorithm: HashAlgorithm) -> CacheResult<()> {
        if let Some(version) = Self::read_meta(conn, "schema_version")? {
            let found = version.parse::<i64>().unwrap_or(i64::MAX);
            if found > SCHEMA_VERSION {
                return Err(CacheError::SchemaVersion {
                    found,
                    supported: SCHEMA_VERSION,
                });
            }
        }

        let recorded = Self::read_meta(conn, "algorithm")?;
        let tx = conn.transaction()?;
        match recorded.as_deref() {
            Some(name) if name == algorithm.as_str() => {}
            Some(name) => {
                let previous = HashAlgorithm::from_name(name)
                    .ok_or_else(|| CacheError::UnknownAlgorithm(name.to_string()))?;
                log::info!(
                    "Cache was built with {}, now using {}; discarding cached digests",
                    previous,
                    algorithm
                );
                tx.execute("DELETE FROM hash_cache", [])?;
            }
            None => {}
        }
        tx.execute(
            "INSERT OR REPLACE INTO cache_meta (key, value) VALUES ('algorithm', ?1)",
            params![algorithm.as_str()],
        )?;
        tx.execute(
            "INSERT OR REPLACE INTO cache_meta (key, value) VALUES ('schema_version', ?1)",
            params![SCHEMA_VERSION.to_string()],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn load_entries(conn: &Connection) -> CacheResult<HashMap<String, CacheEntry>> {
        let mut stmt = conn.prepare("SELECT path, mtime_ns, digest FROM hash_cache")?;
        let rows = stmt.query_map([], |row| {
            let path: String = row.get(0)?;
            let mtime_ns: i64 = row.get(1)?;
            let digest: String = row.get(2)?;
            Ok(CacheEntry::new(path, nanos_to_mtime(mtime_ns), Digest::new(digest)))
        })?;

        let mut entries = HashMap::new();
        for row in rows {
            let entry = row?;
            entries.insert(entry.path.clone(), entry);
        }
        Ok(entries)
    }

    /// Location of the database file, `None` for in-memory caches.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Whether this cache is persisted.
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        self.path.is_some()
    }

    /// Digest algorithm the cached digests were produced with.
    #[must_use]
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Number of cached paths (including uncommitted changes).
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of mutations waiting for [`HashCache::commit`].
    #[must_use]
    pub fn pending_writes(&self) -> usize {
        self.pending.len()
    }

    /// Look up the cached entry for a target-relative path.
    #[must_use]
    pub fn lookup(&self, path: &str) -> Option<&CacheEntry> {
        self.entries.get(path)
    }

    /// Iterate over all entries in unspecified order.
    pub fn entries(&self) -> impl Iterator<Item = &CacheEntry> {
        self.entries.values()
    }

    /// Record (or replace) the digest of `path`.
    pub fn put(&mut self, path: &str, mtime: SystemTime, digest: Digest) {
        let entry = CacheEntry::new(path, mtime, digest);
        self.entries.insert(entry.path.clone(), entry.clone());
        self.pending.push(PendingWrite::Put(entry));
    }

    /// Move the entry for `from` to `to`, stamping it with `mtime`.
    ///
    /// Returns `false` (and changes nothing) if `from` is not cached. Old and
    /// new keys are swapped inside the same commit.
    pub fn rename(&mut self, from: &str, to: &str, mtime: SystemTime) -> bool {
        let Some(old) = self.entries.remove(from) else {
            return false;
        };
        let entry = CacheEntry::new(to, mtime, old.digest);
        self.entries.insert(entry.path.clone(), entry.clone());
        self.pending.push(PendingWrite::Rename {
            from: from.to_string(),
            entry,
        });
        true
    }

    /// Forget `path`. Returns whether an entry existed.
    pub fn delete(&mut self, path: &str) -> bool {
        if self.entries.remove(path).is_some() {
            self.pending.push(PendingWrite::Delete(path.to_string()));
            true
        } else {
            false
        }
    }

    /// Delete every entry whose path is not in `existing`.
    ///
    /// Returns the number of entries removed.
    pub fn prune(&mut self, existing: &HashSet<String>) -> usize {
        let stale: Vec<String> = self
            .entries
            .keys()
            .filter(|path| !existing.contains(*path))
            .cloned()
            .collect();

        for path in &stale {
            log::trace!("Pruning stale cache entry: {}", path);
            self.entries.remove(path);
            self.pending.push(PendingWrite::Delete(path.clone()));
        }
        stale.len()
    }

    /// Flush all pending writes as one transaction.
    ///
    /// # Errors
    ///
    /// Any SQLite failure aborts the transaction; the pending writes stay
    /// queued and nothing from this batch reaches the disk.
    pub fn commit(&mut self) -> CacheResult<()> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let tx = self.conn.transaction()?;
        {
            let mut upsert = tx.prepare_cached(
                "INSERT OR REPLACE INTO hash_cache (path, mtime_ns, digest) VALUES (?1, ?2, ?3)",
            )?;
            let mut remove = tx.prepare_cached("DELETE FROM hash_cache WHERE path = ?1")?;

            for write in &self.pending {
                match write {
                    PendingWrite::Put(entry) => {
                        upsert.execute(params![
                            entry.path,
                            mtime_to_nanos(entry.mtime),
                            entry.digest.as_str()
                        ])?;
                    }
                    PendingWrite::Delete(path) => {
                        remove.execute(params![path])?;
                    }
                    PendingWrite::Rename { from, entry } => {
                        remove.execute(params![from])?;
                        upsert.execute(params![
                            entry.path,
                            mtime_to_nanos(entry.mtime),
                            entry.digest.as_str()
                        ])?;
                    }
                }
            }
        }
        tx.commit()?;

        log::trace!("Committed {} cache writes", self.pending.len());
        self.pending.clear();
        Ok(())
    }

    /// Remove every entry immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete statement fails.
    pub fn clear(&mut self) -> CacheResult<()> {
        self.conn.execute("DELETE FROM hash_cache", [])?;
        self.entries.clear();
        self.pending.clear();
        Ok(())
    }

    /// Commit outstanding writes and close the connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the final commit or the close fails.
    pub fn close(mut self) -> CacheResult<()> {
        self.commit()?;
        let conn = std::mem::replace(&mut self.conn, Connection::open_in_memory()?);
        conn.close().map_err(|(_, e)| CacheError::Sqlite(e))
    }
}

impl Drop for HashCache {
    fn drop(&mut self) {
        if !self.pending.is_empty() {
            log::debug!(
                "Dropping cache with {} uncommitted writes",
                self.pending.len()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};
    use tempfile::TempDir;

    fn t(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    fn open(dir: &TempDir) -> HashCache {
        HashCache::open(&dir.path().join("cache.db"), HashAlgorithm::Blake3).unwrap()
    }

    #[test]
    fn test_put_lookup_before_commit() {
        let mut cache = HashCache::in_memory(HashAlgorithm::Blake3).unwrap();
        cache.put("a.txt", t(10), Digest::new("aa"));

        let entry = cache.lookup("a.txt").unwrap();
        assert_eq!(entry.digest, Digest::new("aa"));
        assert!(entry.is_fresh(t(10)));
        assert_eq!(cache.pending_writes(), 1);
        assert!(!cache.is_persistent());
    }

    #[test]
    fn test_commit_persists() {
        let dir = TempDir::new().unwrap();
        {
            let mut cache = open(&dir);
            cache.put("a.txt", t(10), Digest::new("aa"));
            cache.put("b/c.txt", t(20), Digest::new("bb"));
            cache.commit().unwrap();
            assert_eq!(cache.pending_writes(), 0);
        }

        let cache = open(&dir);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.lookup("b/c.txt").unwrap().digest, Digest::new("bb"));
    }

    #[test]
    fn test_uncommitted_writes_are_lost() {
        let dir = TempDir::new().unwrap();
        {
            let mut cache = open(&dir);
            cache.put("a.txt", t(10), Digest::new("aa"));
        }

        assert!(open(&dir).is_empty());
    }

    #[test]
    fn test_put_replaces_existing_path() {
        let dir = TempDir::new().unwrap();
        {
            let mut cache = open(&dir);
            cache.put("a.txt", t(10), Digest::new("aa"));
            cache.put("a.txt", t(11), Digest::new("ab"));
            cache.commit().unwrap();
        }

        let cache = open(&dir);
        assert_eq!(cache.len(), 1);
        let entry = cache.lookup("a.txt").unwrap();
        assert_eq!(entry.digest, Digest::new("ab"));
        assert!(entry.is_fresh(t(11)));
    }

    #[test]
    fn test_rename_swaps_keys() {
        let dir = TempDir::new().unwrap();
        {
            let mut cache = open(&dir);
            cache.put("old/a.txt", t(10), Digest::new("aa"));
            cache.commit().unwrap();

            assert!(cache.rename("old/a.txt", "a.txt", t(12)));
            assert!(!cache.rename("missing", "x", t(1)));
            cache.commit().unwrap();
        }

        let cache = open(&dir);
        assert!(cache.lookup("old/a.txt").is_none());
        let entry = cache.lookup("a.txt").unwrap();
        assert_eq!(entry.digest, Digest::new("aa"));
        assert!(entry.is_fresh(t(12)));
    }

    #[test]
    fn test_delete() {
        let mut cache = HashCache::in_memory(HashAlgorithm::Blake3).unwrap();
        cache.put("a.txt", t(1), Digest::new("aa"));
        assert!(cache.delete("a.txt"));
        assert!(!cache.delete("a.txt"));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_prune_removes_absent_paths() {
        let dir = TempDir::new().unwrap();
        {
            let mut cache = open(&dir);
            cache.put("keep.txt", t(1), Digest::new("aa"));
            cache.put("gone.txt", t(2), Digest::new("bb"));
            cache.put("dir/gone.txt", t(3), Digest::new("cc"));
            cache.commit().unwrap();

            let existing: HashSet<String> = ["keep.txt".to_string()].into_iter().collect();
            assert_eq!(cache.prune(&existing), 2);
            cache.commit().unwrap();
        }

        let cache = open(&dir);
        assert_eq!(cache.len(), 1);
        assert!(cache.lookup("keep.txt").is_some());
    }

    #[test]
    fn test_algorithm_change_discards_entries() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.db");
        {
            let mut cache = HashCache::open(&path, HashAlgorithm::Blake3).unwrap();
            cache.put("a.txt", t(1), Digest::new("aa"));
            cache.commit().unwrap();
        }

        let cache = HashCache::open(&path, HashAlgorithm::Sha256).unwrap();
        assert!(cache.is_empty());
        assert_eq!(cache.algorithm(), HashAlgorithm::Sha256);
    }

    #[test]
    fn test_newer_schema_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE cache_meta (key TEXT PRIMARY KEY, value TEXT NOT NULL);
                 INSERT INTO cache_meta (key, value) VALUES ('schema_version', '99');",
            )
            .unwrap();
        }

        let err = HashCache::open(&path, HashAlgorithm::Blake3).unwrap_err();
        assert!(matches!(
            err,
            CacheError::SchemaVersion {
                found: 99,
                supported: SCHEMA_VERSION
            }
        ));
    }

    #[test]
    fn test_clear_and_close() {
        let dir = TempDir::new().unwrap();
        let mut cache = open(&dir);
        cache.put("a.txt", t(1), Digest::new("aa"));
        cache.commit().unwrap();
        cache.clear().unwrap();
        assert!(cache.is_empty());
        cache.close().unwrap();

        assert!(open(&dir).is_empty());
    }
}
