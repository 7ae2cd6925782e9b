//! In-memory disk and its provider.
//!
//! A [`RamDisk`] is a small flat store of directories and files keyed by
//! case-folded path. It is shared (`Arc`) between the provider that mounts
//! it and the ram-disk writer that fills it. All data is lost when dropped.

use std::collections::BTreeMap;
use std::io::{self, Cursor, Read};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::SystemTime;

use super::{relative_to_mount, PhysicalFileInfo, PhysicalListing, Provider};
use crate::mount::MountPoint;
use crate::paths::{self, fold_case};

/// Scheme used for ram-disk locations.
pub const RAMDISK_SCHEME: &str = "ramdisk";

#[derive(Debug, Clone)]
enum Entry {
    File {
        data: Vec<u8>,
        created: SystemTime,
        modified: SystemTime,
    },
    Directory,
}

#[derive(Debug, Clone)]
struct Node {
    /// Display path: `/a/b/` for directories, `/a/b.txt` for files.
    path: String,
    entry: Entry,
}

/// Metadata for a file stored on a ram disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RamFileInfo {
    pub length: u64,
    pub created: SystemTime,
    pub modified: SystemTime,
}

/// An in-memory store of directories and files.
///
/// Paths are virtual-style (`/dir/`, `/dir/file.txt`) and compare
/// case-insensitively. The root directory always exists.
#[derive(Debug)]
pub struct RamDisk {
    name: String,
    nodes: RwLock<BTreeMap<String, Node>>,
}

impl RamDisk {
    /// Create an empty disk. The name becomes part of its location.
    pub fn new(name: impl Into<String>) -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(
            paths::ROOT.to_string(),
            Node {
                path: paths::ROOT.to_string(),
                entry: Entry::Directory,
            },
        );
        Self {
            name: name.into(),
            nodes: RwLock::new(nodes),
        }
    }

    /// Disk name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fake location naming this disk, e.g. `ramdisk://scratch`.
    pub fn location(&self) -> String {
        format!("{RAMDISK_SCHEME}://{}", self.name)
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, Node>> {
        self.nodes.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Node>> {
        self.nodes.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn dir_key(path: &str) -> io::Result<String> {
        paths::virtual_directory(path)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))
    }

    fn file_key(path: &str) -> io::Result<String> {
        let normalized = paths::normalize_path(path)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;
        if paths::file_name(&normalized).is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("not a file path: {path}"),
            ));
        }
        Ok(normalized)
    }

    /// Create missing directories along `dir` (which must be normalized).
    fn ensure_chain(nodes: &mut BTreeMap<String, Node>, dir: &str) {
        let mut current = String::from(paths::ROOT);
        for segment in paths::split_virtual_path(dir) {
            current.push_str(segment);
            current.push('/');
            nodes.entry(fold_case(&current)).or_insert_with(|| Node {
                path: current.clone(),
                entry: Entry::Directory,
            });
        }
    }

    /// Create a directory and any missing parents.
    pub fn create_directory(&self, path: &str) -> io::Result<()> {
        let dir = Self::dir_key(path)?;
        let mut nodes = self.write();
        if let Some(Node {
            entry: Entry::File { .. },
            ..
        }) = nodes.get(&fold_case(dir.trim_end_matches('/')))
        {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("file exists: {dir}"),
            ));
        }
        Self::ensure_chain(&mut nodes, &dir);
        Ok(())
    }

    /// True if the directory exists.
    pub fn contains_directory(&self, path: &str) -> bool {
        Self::dir_key(path).is_ok_and(|dir| self.read().contains_key(&fold_case(&dir)))
    }

    /// True if the file exists.
    pub fn contains_file(&self, path: &str) -> bool {
        self.file_info(path).is_some()
    }

    /// Remove a directory and everything below it. The root keeps itself
    /// and loses its contents. Returns false when nothing existed.
    pub fn remove_directory(&self, path: &str) -> io::Result<bool> {
        let dir = fold_case(&Self::dir_key(path)?);
        let mut nodes = self.write();
        if !nodes.contains_key(&dir) {
            return Ok(false);
        }
        nodes.retain(|key, _| !key.starts_with(&dir) || (dir == paths::ROOT && key == paths::ROOT));
        Ok(true)
    }

    /// Store a file, creating parent directories as needed.
    pub fn write_file(&self, path: &str, data: Vec<u8>) -> io::Result<()> {
        let file = Self::file_key(path)?;
        let key = fold_case(&file);
        let mut nodes = self.write();

        if nodes.contains_key(&format!("{key}/")) {
            return Err(io::Error::new(
                io::ErrorKind::IsADirectory,
                format!("is a directory: {file}"),
            ));
        }
        Self::ensure_chain(&mut nodes, &paths::parent_directory(&file));

        let now = SystemTime::now();
        let created = match nodes.get(&key) {
            Some(Node {
                entry: Entry::File { created, .. },
                ..
            }) => *created,
            _ => now,
        };
        nodes.insert(
            key,
            Node {
                path: file,
                entry: Entry::File {
                    data,
                    created,
                    modified: now,
                },
            },
        );
        Ok(())
    }

    /// Read a file's bytes.
    pub fn read_file(&self, path: &str) -> io::Result<Vec<u8>> {
        let file = Self::file_key(path)?;
        match self.read().get(&fold_case(&file)) {
            Some(Node {
                entry: Entry::File { data, .. },
                ..
            }) => Ok(data.clone()),
            _ => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("not found: {file}"),
            )),
        }
    }

    /// Remove a file. Returns false when it did not exist.
    pub fn remove_file(&self, path: &str) -> io::Result<bool> {
        let key = fold_case(&Self::file_key(path)?);
        let mut nodes = self.write();
        match nodes.get(&key) {
            Some(Node {
                entry: Entry::File { .. },
                ..
            }) => {
                nodes.remove(&key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Move a file. Returns false when the source did not exist.
    pub fn rename_file(&self, from: &str, to: &str) -> io::Result<bool> {
        let from_key = fold_case(&Self::file_key(from)?);
        let to_path = Self::file_key(to)?;
        let mut nodes = self.write();

        let Some(mut node) = nodes.remove(&from_key) else {
            return Ok(false);
        };
        if !matches!(node.entry, Entry::File { .. }) {
            nodes.insert(from_key, node);
            return Ok(false);
        }
        Self::ensure_chain(&mut nodes, &paths::parent_directory(&to_path));
        node.path = to_path.clone();
        nodes.insert(fold_case(&to_path), node);
        Ok(true)
    }

    /// Move a directory and its contents. Returns false when the source did
    /// not exist.
    pub fn rename_directory(&self, from: &str, to: &str) -> io::Result<bool> {
        let from_dir = Self::dir_key(from)?;
        let to_dir = Self::dir_key(to)?;
        let from_key = fold_case(&from_dir);
        let mut nodes = self.write();

        if from_key == paths::ROOT || !nodes.contains_key(&from_key) {
            return Ok(false);
        }

        let moved: Vec<String> = nodes
            .keys()
            .filter(|k| k.starts_with(&from_key))
            .cloned()
            .collect();
        Self::ensure_chain(&mut nodes, &paths::parent_directory(&to_dir));
        for key in moved {
            if let Some(mut node) = nodes.remove(&key) {
                let suffix = node.path.get(from_dir.len()..).unwrap_or_default().to_string();
                node.path = format!("{to_dir}{suffix}");
                nodes.insert(fold_case(&node.path), node);
            }
        }
        Ok(true)
    }

    /// Metadata for a file, if present.
    pub fn file_info(&self, path: &str) -> Option<RamFileInfo> {
        let key = fold_case(&Self::file_key(path).ok()?);
        match self.read().get(&key) {
            Some(Node {
                entry:
                    Entry::File {
                        data,
                        created,
                        modified,
                    },
                ..
            }) => Some(RamFileInfo {
                length: data.len() as u64,
                created: *created,
                modified: *modified,
            }),
            _ => None,
        }
    }

    /// List everything strictly below `dir`, shallow entries first.
    fn list_below(&self, dir: &str) -> (Vec<String>, Vec<(String, RamFileInfo)>) {
        let prefix = fold_case(dir);
        let nodes = self.read();
        let mut below: Vec<&Node> = nodes
            .iter()
            .filter(|(k, _)| k.starts_with(&prefix) && **k != prefix)
            .map(|(_, n)| n)
            .collect();
        below.sort_by_key(|n| (n.path.trim_end_matches('/').matches('/').count(), fold_case(&n.path)));

        let mut dirs = Vec::new();
        let mut files = Vec::new();
        for node in below {
            match &node.entry {
                Entry::Directory => dirs.push(node.path.clone()),
                Entry::File {
                    data,
                    created,
                    modified,
                } => files.push((
                    node.path.clone(),
                    RamFileInfo {
                        length: data.len() as u64,
                        created: *created,
                        modified: *modified,
                    },
                )),
            }
        }
        (dirs, files)
    }

    /// Number of files stored.
    pub fn file_count(&self) -> usize {
        self.read()
            .values()
            .filter(|n| matches!(n.entry, Entry::File { .. }))
            .count()
    }
}

/// Provider that mounts a [`RamDisk`] from its `ramdisk://<name>` location.
#[derive(Debug, Clone)]
pub struct RamDiskProvider {
    name: String,
    disk: Arc<RamDisk>,
}

impl RamDiskProvider {
    pub fn new(disk: Arc<RamDisk>) -> Self {
        Self {
            name: format!("{RAMDISK_SCHEME}:{}", disk.name()),
            disk,
        }
    }

    /// The disk this provider serves.
    pub fn disk(&self) -> &Arc<RamDisk> {
        &self.disk
    }

    /// Location to pass to `FileSystem::mount`.
    pub fn location(&self) -> String {
        self.disk.location()
    }

    /// Strip this disk's location from a physical path.
    fn disk_path<'a>(&self, physical: &'a str) -> Option<&'a str> {
        let location = self.disk.location();
        let head = physical.get(..location.len())?;
        if !paths::eq_ignore_case(head, &location) {
            return None;
        }
        let rest = &physical[location.len()..];
        if rest.is_empty() || rest.starts_with('/') {
            Some(if rest.is_empty() { paths::ROOT } else { rest })
        } else {
            None
        }
    }
}

impl Provider for RamDiskProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "In-memory ram disk"
    }

    fn can_read(&self, physical_path: &str) -> bool {
        self.disk_path(physical_path).is_some()
    }

    fn enumerate(&self, physical_root: &str, mount_location: &str) -> io::Result<PhysicalListing> {
        let disk_dir = self.disk_path(physical_root).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("{physical_root} is not on {}", self.disk.location()),
            )
        })?;
        let disk_dir = RamDisk::dir_key(disk_dir)?;
        if !self.disk.contains_directory(&disk_dir) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("not found: {physical_root}"),
            ));
        }

        let location = self.disk.location();
        let (dirs, files) = self.disk.list_below(&disk_dir);
        let below = |path: &str| path.get(disk_dir.len()..).unwrap_or_default().to_string();

        let mut listing = PhysicalListing::default();
        for dir in dirs {
            listing.directories.push(format!("{mount_location}{}", below(&dir)));
        }
        for (path, info) in files {
            listing.files.push(
                PhysicalFileInfo::new(
                    format!("{location}{path}"),
                    format!("{mount_location}{}", below(&path)),
                    info.length,
                )
                .with_times(Some(info.created), Some(info.modified)),
            );
        }
        Ok(listing)
    }

    fn open_stream(&self, file: &PhysicalFileInfo) -> io::Result<Box<dyn Read + Send>> {
        let path = self.disk_path(&file.full_path).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} is not on {}", file.full_path, self.disk.location()),
            )
        })?;
        Ok(Box::new(Cursor::new(self.disk.read_file(path)?)))
    }

    fn map_to_physical_path(&self, virtual_path: &str, mount_point: &MountPoint) -> String {
        let relative = relative_to_mount(virtual_path, mount_point.mount_location());
        let base = mount_point.physical_path().trim_end_matches('/');
        format!("{base}/{relative}")
    }

    fn is_read_only(&self) -> bool {
        false
    }
}
