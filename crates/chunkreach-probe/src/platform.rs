//! Directory resolution for the probe.
//!
//! Config lives in the OS configuration directory (XDG on Linux, Known
//! Folders on Windows, Library on macOS) unless `--config` points elsewhere.
//! Logs go to a `logs` directory beside it.

use std::io;
use std::path::{Path, PathBuf};

/// Errors that can occur while preparing directories.
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    /// The OS did not provide a configuration directory.
    #[error("could not determine OS configuration directory")]
    NoConfigDir,
    #[error("platform I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Where the probe reads config and writes logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformDirs {
    /// Holds `config.ron`.
    pub config_dir: PathBuf,
    pub log_dir: PathBuf,
}

impl PlatformDirs {
    /// Resolve directories without creating them. `config_override` replaces
    /// the OS default.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::NoConfigDir`] if no override is given and the
    /// OS does not expose a configuration directory.
    pub fn resolve(config_override: Option<&Path>) -> Result<Self, PlatformError> {
        let config_dir = match config_override {
            Some(dir) => dir.to_path_buf(),
            None => chunkreach_config::default_config_dir().ok_or(PlatformError::NoConfigDir)?,
        };
        Ok(Self::resolve_with_root(&config_dir))
    }

    /// Resolve directories and create them on disk.
    pub fn resolve_and_create(config_override: Option<&Path>) -> Result<Self, PlatformError> {
        let dirs = Self::resolve(config_override)?;
        dirs.create_dirs()?;
        Ok(dirs)
    }

    /// Directories rooted at `config_dir`.
    pub fn resolve_with_root(config_dir: &Path) -> Self {
        Self {
            config_dir: config_dir.to_path_buf(),
            log_dir: config_dir.join("logs"),
        }
    }

    pub fn create_dirs(&self) -> Result<(), PlatformError> {
        std::fs::create_dir_all(&self.config_dir)?;
        std::fs::create_dir_all(&self.log_dir)?;
        Ok(())
    }
}
