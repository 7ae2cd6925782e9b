//! Snapshot types handed out by lookups.
//!
//! The live tree sits behind the filesystem lock. Lookups copy out what a
//! caller needs (handle, path, owner, physical info) so nothing borrows
//! locked state.

use std::io::{self, Read};
use std::time::SystemTime;

use crate::mount::MountPoint;
use crate::provider::PhysicalFileInfo;

/// Stable handle for a virtual directory. Never reused within a filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DirId(pub(crate) u64);

/// Stable handle for a virtual file. Never reused within a filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(pub(crate) u64);

/// A directory in the virtual tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualDirectory {
    pub id: DirId,
    /// Directory name; empty for the root.
    pub name: String,
    /// Full virtual path with trailing `/`.
    pub full_path: String,
    /// Parent handle; `None` only for the root.
    pub parent: Option<DirId>,
    /// The mount point that currently owns this directory.
    pub mount_point: MountPoint,
    /// Number of direct child directories.
    pub directory_count: usize,
    /// Number of files directly inside.
    pub file_count: usize,
}

impl VirtualDirectory {
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn is_empty(&self) -> bool {
        self.directory_count == 0 && self.file_count == 0
    }
}

/// A file in the virtual tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualFile {
    pub id: FileId,
    pub name: String,
    /// Full virtual path.
    pub full_path: String,
    /// Handle of the containing directory.
    pub directory: DirId,
    /// Where the bytes actually live.
    pub physical_file: PhysicalFileInfo,
    /// The mount point that currently owns this file.
    pub mount_point: MountPoint,
}

impl VirtualFile {
    /// Extension without the dot; empty when there is none.
    pub fn extension(&self) -> &str {
        match self.name.rfind('.') {
            Some(idx) if idx > 0 => &self.name[idx + 1..],
            _ => "",
        }
    }

    /// Name without its extension.
    pub fn base_name(&self) -> &str {
        match self.name.rfind('.') {
            Some(idx) if idx > 0 => &self.name[..idx],
            _ => &self.name,
        }
    }

    /// Size in bytes.
    pub fn size(&self) -> u64 {
        self.physical_file.length
    }

    pub fn last_modified(&self) -> Option<SystemTime> {
        self.physical_file.modified
    }

    /// Open the file's contents through its owning provider.
    pub fn open(&self) -> io::Result<Box<dyn Read + Send>> {
        self.mount_point.provider().open_stream(&self.physical_file)
    }

    /// Read the file's contents through its owning provider.
    pub fn read(&self) -> io::Result<Vec<u8>> {
        self.mount_point.provider().read(&self.physical_file)
    }

    /// Virtual path of the containing directory.
    pub fn directory_path(&self) -> &str {
        let cut = self.full_path.len().saturating_sub(self.name.len());
        self.full_path.get(..cut).unwrap_or(crate::paths::ROOT)
    }
}
