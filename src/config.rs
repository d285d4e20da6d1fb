//! Application configuration management.
//!
//! Settings are layered with figment, later layers winning:
//!
//! 1. Built-in defaults
//! 2. TOML file (`relocase/config.toml` in the platform config directory, or
//!    the file given with `--config`)
//! 3. Environment variables prefixed with `RELOCASE_` (e.g. `RELOCASE_DB_NAME`)
//! 4. Command-line flags
//!
//! ```toml
//! db_name = ".relocase.db"
//! cache_location = "filesystem-root"
//! algorithm = "blake3"
//! overwrite = "backup"
//! ignore_patterns = ["*.tmp", ".DS_Store"]
//! ```

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::actions::TransferMode;
use crate::cli::Cli;
use crate::scanner::path_utils::filesystem_root;
use crate::scanner::{HashAlgorithm, ReservedPaths, WalkerConfig};
use crate::sync::OverwritePolicy;

/// Default file name of the cache database.
pub const DEFAULT_DB_NAME: &str = ".relocase.db";

/// Where the cache database lives.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum CacheLocation {
    /// Inside the target directory
    #[default]
    Target,
    /// At the root of the filesystem holding the target
    FilesystemRoot,
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// File name of the cache database.
    pub db_name: String,
    /// Directory the cache database is placed in.
    pub cache_location: CacheLocation,
    /// Content digest algorithm.
    pub algorithm: HashAlgorithm,
    /// Transfer executor.
    pub transfer: TransferMode,
    /// Policy for replacing different content.
    pub overwrite: OverwritePolicy,
    /// Number of hashing threads.
    pub io_threads: usize,
    /// Gitignore-style patterns excluded from both trees.
    pub ignore_patterns: Vec<String>,
    /// Skip hidden files and directories.
    pub skip_hidden: bool,
    /// Follow symbolic links.
    pub follow_symlinks: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_name: DEFAULT_DB_NAME.to_string(),
            cache_location: CacheLocation::default(),
            algorithm: HashAlgorithm::default(),
            transfer: TransferMode::default(),
            overwrite: OverwritePolicy::default(),
            io_threads: 4,
            ignore_patterns: Vec::new(),
            skip_hidden: false,
            follow_symlinks: false,
        }
    }
}

impl Config {
    /// Build the figment for defaults, config file and environment.
    ///
    /// `path` overrides the default config file location.
    #[must_use]
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(file) = path.map(Path::to_path_buf).or_else(Self::default_path) {
            figment = figment.merge(Toml::file(file));
        }
        figment.merge(Env::prefixed("RELOCASE_"))
    }

    /// Load the configuration.
    ///
    /// A missing default config file is fine; a missing explicit one, or a
    /// file that does not parse, is an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be read or is invalid.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            if !path.is_file() {
                bail!("config file not found: {}", path.display());
            }
        }

        let config: Self = Self::figment(path)
            .extract()
            .context("failed to load configuration")?;
        config.validate()?;
        log::debug!("Loaded configuration: {:?}", config);
        Ok(config)
    }

    /// Default platform-specific configuration path.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "relocase").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Check values no layer can be trusted to get right.
    ///
    /// # Errors
    ///
    /// Returns an error if the database name is empty or contains a path
    /// separator.
    pub fn validate(&self) -> Result<()> {
        if self.db_name.is_empty() {
            bail!("db_name must not be empty");
        }
        if self.db_name.contains('/') || self.db_name.contains(std::path::MAIN_SEPARATOR) {
            bail!("db_name must be a file name, got '{}'", self.db_name);
        }
        if self.db_name == "." || self.db_name == ".." {
            bail!("db_name must be a file name, got '{}'", self.db_name);
        }
        Ok(())
    }

    /// Apply command-line flags on top of the loaded layers.
    ///
    /// # Errors
    ///
    /// Returns an error if the result fails validation.
    pub fn apply_cli(&mut self, cli: &Cli) -> Result<()> {
        if let Some(ref db_name) = cli.db_name {
            self.db_name.clone_from(db_name);
        }
        if let Some(location) = cli.cache_location {
            self.cache_location = location;
        }
        if let Some(algorithm) = cli.algorithm {
            self.algorithm = algorithm;
        }
        if let Some(transfer) = cli.transfer {
            self.transfer = transfer;
        }
        if let Some(overwrite) = cli.overwrite {
            self.overwrite = overwrite;
        }
        if let Some(threads) = cli.io_threads {
            self.io_threads = threads;
        }
        self.ignore_patterns
            .extend(cli.ignore_patterns.iter().cloned());
        self.skip_hidden |= cli.skip_hidden;
        self.follow_symlinks |= cli.follow_symlinks;
        self.validate()
    }

    /// Location of the cache database for `target`.
    ///
    /// # Errors
    ///
    /// Returns an error if the filesystem root of `target` cannot be found.
    pub fn database_path(&self, target: &Path) -> Result<PathBuf> {
        let dir = match self.cache_location {
            CacheLocation::Target => target.to_path_buf(),
            CacheLocation::FilesystemRoot => filesystem_root(target).with_context(|| {
                format!("cannot find filesystem root of {}", target.display())
            })?,
        };
        Ok(dir.join(&self.db_name))
    }

    /// Walker configuration shared by both trees.
    #[must_use]
    pub fn walker_config(&self, reserved: ReservedPaths) -> WalkerConfig {
        WalkerConfig::new(
            self.follow_symlinks,
            self.skip_hidden,
            self.ignore_patterns.clone(),
        )
        .with_reserved(reserved)
    }

    /// Render as TOML, suitable for a config file.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("failed to serialize configuration")
    }
}
