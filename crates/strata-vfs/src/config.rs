//! Mount tables loaded from TOML.
//!
//! ```toml
//! [[mount]]
//! physical = "/srv/base"
//!
//! [[mount]]
//! physical = "/srv/patches"
//! at = "/docs"
//!
//! [[mount]]
//! physical = "ramdisk://scratch"
//! at = "/tmp"
//!
//! [writer]
//! kind = "folder"        # or "ramdisk"
//! path = "/srv/overrides"
//! ```
//!
//! The default file is `$XDG_CONFIG_HOME/strata/config.toml`. Mounts are
//! applied in file order, so later entries win.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::filesystem::FileSystem;
use crate::mount::MountPoint;
use crate::provider::{Provider, RamDisk, RamDiskProvider, RAMDISK_SCHEME};
use crate::writer::FileSystemWriter;
use crate::VfsResult;

/// Errors while reading a config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrataConfig {
    #[serde(rename = "mount")]
    pub mounts: Vec<MountConfig>,
    pub writer: Option<WriterConfig>,
}

/// One `[[mount]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountConfig {
    /// OS directory, file, or `ramdisk://<name>`.
    pub physical: String,
    /// Virtual location; defaults to `/`.
    #[serde(default = "default_location")]
    pub at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriterConfig {
    pub kind: WriterKind,
    /// Directory for `folder`, disk name for `ramdisk`.
    pub path: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriterKind {
    Folder,
    #[serde(rename = "ramdisk")]
    RamDisk,
}

/// Disk name used when a ram disk writer has no `path`.
const DEFAULT_RAMDISK: &str = "writer";

fn default_location() -> String {
    crate::paths::ROOT.to_string()
}

impl StrataConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Load the default config file. A missing file is an empty config.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = config_file();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Names of every ram disk the config refers to.
    pub fn ram_disks(&self) -> BTreeSet<String> {
        let prefix = format!("{RAMDISK_SCHEME}://");
        let mut names: BTreeSet<String> = self
            .mounts
            .iter()
            .filter_map(|m| m.physical.strip_prefix(&prefix))
            .map(|rest| rest.trim_end_matches('/').to_string())
            .filter(|name| !name.is_empty())
            .collect();
        if let Some(WriterConfig {
            kind: WriterKind::RamDisk,
            path,
        }) = &self.writer
        {
            names.insert(path.clone().unwrap_or_else(|| DEFAULT_RAMDISK.to_string()));
        }
        names
    }

    /// Mount every entry on `fs`, in order.
    pub fn apply(&self, fs: &FileSystem) -> VfsResult<Vec<MountPoint>> {
        self.mounts
            .iter()
            .map(|m| fs.mount(&m.physical, &m.at))
            .collect()
    }

    /// Build a filesystem with a provider for each ram disk, apply the
    /// mounts, and mount the writer if one is configured.
    pub fn build(&self) -> VfsResult<(Arc<FileSystem>, Option<FileSystemWriter>)> {
        let disks: Vec<Arc<RamDiskProvider>> = self
            .ram_disks()
            .into_iter()
            .map(|name| Arc::new(RamDiskProvider::new(Arc::new(RamDisk::new(name)))))
            .collect();
        let fs = Arc::new(FileSystem::with_providers(
            disks.iter().map(|d| d.clone() as Arc<dyn Provider>),
        ));
        self.apply(&fs)?;

        let writer = match &self.writer {
            None => None,
            Some(WriterConfig {
                kind: WriterKind::Folder,
                path,
            }) => {
                let dir = path.clone().unwrap_or_else(|| ".".to_string());
                Some(FileSystemWriter::folder(fs.clone(), dir)?)
            }
            Some(WriterConfig {
                kind: WriterKind::RamDisk,
                path,
            }) => {
                let name = path.as_deref().unwrap_or(DEFAULT_RAMDISK);
                let provider = disks
                    .iter()
                    .find(|d| d.disk().name() == name)
                    .ok_or_else(|| crate::VfsError::no_compatible_provider(name))?;
                Some(FileSystemWriter::ram_disk(fs.clone(), provider)?)
            }
        };
        if let Some(writer) = &writer {
            writer.mount()?;
        }

        tracing::info!(
            mounts = self.mounts.len(),
            writer = writer.is_some(),
            "filesystem built from config"
        );
        Ok((fs, writer))
    }
}

/// Get the config directory.
///
/// Uses `$XDG_CONFIG_HOME/strata` or falls back to `~/.config/strata`.
pub fn config_dir() -> PathBuf {
    BaseDirs::new()
        .map(|d| d.config_dir().to_path_buf())
        .unwrap_or_else(|| home_fallback().join(".config"))
        .join("strata")
}

/// Get the default config file path.
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

/// Fallback home directory when BaseDirs fails.
fn home_fallback() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| std::env::temp_dir())
}
