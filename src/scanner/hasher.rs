//! Streaming file hasher.
//!
//! # Overview
//! The [`Hasher`] computes a content [`Digest`] for a file. The digest is
//! only ever compared for equality, so the algorithm is a strategy: BLAKE3
//! by default, SHA-256 when a cache or a peer expects it. Large files are
//! hashed through a memory map with BLAKE3's rayon backend.

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::Digest as _;

use super::HashError;

/// Read buffer size for streaming hashes.
pub const BUFFER_SIZE: usize = 64 * 1024;

/// Files at least this large are hashed via mmap (BLAKE3 only).
pub const MMAP_THRESHOLD: u64 = 16 * 1024 * 1024;

/// Content digest algorithm.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum HashAlgorithm {
    /// BLAKE3 (fast, parallel)
    #[default]
    Blake3,
    /// SHA-256
    Sha256,
}

impl HashAlgorithm {
    /// Stable name, also recorded in the cache metadata.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Blake3 => "blake3",
            Self::Sha256 => "sha256",
        }
    }

    /// Parse a name written by [`HashAlgorithm::as_str`].
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "blake3" => Some(Self::Blake3),
            "sha256" => Some(Self::Sha256),
            _ => None,
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hex-encoded content digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Digest(String);

impl Digest {
    /// Wrap an already hex-encoded digest.
    #[must_use]
    pub fn new(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    /// The hex string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Shortened form for log lines.
    #[must_use]
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// File hasher.
#[derive(Debug, Clone, Default)]
pub struct Hasher {
    algorithm: HashAlgorithm,
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl Hasher {
    /// Create a hasher for the given algorithm.
    #[must_use]
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self {
            algorithm,
            shutdown_flag: None,
        }
    }

    /// Abort long reads when the flag is set.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// Algorithm in use.
    #[must_use]
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    /// Hash a file's full contents.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] when the file cannot be opened or read, or when
    /// a shutdown is requested mid-read.
    pub fn hash_file(&self, path: &Path) -> Result<Digest, HashError> {
        let file = File::open(path).map_err(|e| HashError::from_io(path, e))?;

        match self.algorithm {
            HashAlgorithm::Blake3 => {
                let size = file
                    .metadata()
                    .map_err(|e| HashError::from_io(path, e))?
                    .len();
                if size >= MMAP_THRESHOLD {
                    let mut hasher = blake3::Hasher::new();
                    hasher
                        .update_mmap_rayon(path)
                        .map_err(|e| HashError::from_io(path, e))?;
                    return Ok(Digest(hasher.finalize().to_hex().to_string()));
                }

                let mut hasher = blake3::Hasher::new();
                self.stream(path, file, |chunk| {
                    hasher.update(chunk);
                })?;
                Ok(Digest(hasher.finalize().to_hex().to_string()))
            }
            HashAlgorithm::Sha256 => {
                let mut hasher = sha2::Sha256::new();
                self.stream(path, file, |chunk| hasher.update(chunk))?;
                Ok(Digest(format!("{:x}", hasher.finalize())))
            }
        }
    }

    /// Hash an in-memory buffer with the configured algorithm.
    #[must_use]
    pub fn hash_bytes(&self, bytes: &[u8]) -> Digest {
        match self.algorithm {
            HashAlgorithm::Blake3 => Digest(blake3::hash(bytes).to_hex().to_string()),
            HashAlgorithm::Sha256 => Digest(format!("{:x}", sha2::Sha256::digest(bytes))),
        }
    }

    fn stream(
        &self,
        path: &Path,
        mut file: File,
        mut update: impl FnMut(&[u8]),
    ) -> Result<(), HashError> {
        let mut buffer = vec![0u8; BUFFER_SIZE];
        loop {
            if self.is_shutdown_requested() {
                return Err(HashError::Interrupted(path.to_path_buf()));
            }
            let n = match file.read(&mut buffer) {
                Ok(0) => return Ok(()),
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(HashError::from_io(path, e)),
            };
            update(&buffer[..n]);
        }
    }
}
