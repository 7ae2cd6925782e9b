//! Providers: pluggable readers for physical sources.
//!
//! A provider turns a physical source into a flat listing of virtual
//! directories and files, then serves file contents on demand. The
//! filesystem never reads physical data itself.
//!
//! Shipped providers:
//!
//! - **FolderProvider**: plain OS directories, the implicit default
//! - **RamDiskProvider**: an in-memory [`RamDisk`] at `ramdisk://<name>`
//!
//! Packed formats (zip and friends) live outside this crate and implement
//! [`Provider`] the same way.

mod folder;
mod ramdisk;

pub use folder::FolderProvider;
pub use ramdisk::{RamDisk, RamDiskProvider, RAMDISK_SCHEME};

use std::fmt;
use std::io::{self, Read};
use std::time::SystemTime;

use crate::mount::MountPoint;

/// Physical backing of a virtual file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhysicalFileInfo {
    /// File name as the source stores it.
    pub name: String,
    /// Full physical path, meaningful to the owning provider only.
    pub full_path: String,
    /// Virtual path the file appears at.
    pub virtual_path: String,
    /// Creation time, when the source records one.
    pub created: Option<SystemTime>,
    /// Last modification time, when the source records one.
    pub modified: Option<SystemTime>,
    /// Size in bytes.
    pub length: u64,
    /// Byte offset inside a packed source. Zero for loose files.
    pub offset: u64,
}

impl PhysicalFileInfo {
    /// File info with no timestamps and zero offset.
    pub fn new(full_path: impl Into<String>, virtual_path: impl Into<String>, length: u64) -> Self {
        let virtual_path = virtual_path.into();
        Self {
            name: crate::paths::file_name(&virtual_path).to_string(),
            full_path: full_path.into(),
            virtual_path,
            created: None,
            modified: None,
            length,
            offset: 0,
        }
    }

    /// Set the timestamps.
    pub fn with_times(mut self, created: Option<SystemTime>, modified: Option<SystemTime>) -> Self {
        self.created = created;
        self.modified = modified;
        self
    }

    /// Set the packed-source offset.
    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }
}

/// Everything a provider found under a physical root.
#[derive(Debug, Clone, Default)]
pub struct PhysicalListing {
    /// Virtual directory paths, parents before children.
    pub directories: Vec<String>,
    /// Files with their virtual paths filled in.
    pub files: Vec<PhysicalFileInfo>,
}

impl PhysicalListing {
    /// True when the source holds nothing.
    pub fn is_empty(&self) -> bool {
        self.directories.is_empty() && self.files.is_empty()
    }
}

/// A reader for one kind of physical source.
///
/// Providers are shared between mount points and filesystems, so they must
/// be `Send + Sync` and keep any mutable state behind their own locks.
pub trait Provider: Send + Sync {
    /// Registry key; unique per filesystem, compared case-insensitively.
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str {
        ""
    }

    /// Whether this provider understands the given physical source.
    fn can_read(&self, physical_path: &str) -> bool;

    /// List everything under `physical_root`, mapping it below `mount_location`.
    fn enumerate(&self, physical_root: &str, mount_location: &str) -> io::Result<PhysicalListing>;

    /// Open a file's contents for reading.
    fn open_stream(&self, file: &PhysicalFileInfo) -> io::Result<Box<dyn Read + Send>>;

    /// Read a file's contents fully.
    fn read(&self, file: &PhysicalFileInfo) -> io::Result<Vec<u8>> {
        let mut stream = self.open_stream(file)?;
        let mut buf = Vec::with_capacity(usize::try_from(file.length).unwrap_or(0));
        stream.read_to_end(&mut buf)?;
        Ok(buf)
    }

    /// Map a virtual path under `mount_point` back to this provider's
    /// physical path form.
    fn map_to_physical_path(&self, virtual_path: &str, mount_point: &MountPoint) -> String;

    /// Whether sources read by this provider are read-only.
    fn is_read_only(&self) -> bool {
        true
    }
}

impl fmt::Debug for dyn Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider").field("name", &self.name()).finish()
    }
}

/// The part of `virtual_path` below `mount_location`, without a leading `/`.
pub(crate) fn relative_to_mount<'a>(virtual_path: &'a str, mount_location: &str) -> &'a str {
    let prefix_len = mount_location.len();
    let has_prefix = virtual_path
        .get(..prefix_len)
        .is_some_and(|p| crate::paths::eq_ignore_case(p, mount_location));
    let rest = if has_prefix {
        &virtual_path[prefix_len..]
    } else {
        virtual_path
    };
    rest.trim_start_matches('/')
}
