//! Writers: mutate the virtual tree and persist to a write area.
//!
//! A writer owns a backing store (an OS directory or a ram disk) that is
//! mounted at `/` of its filesystem. Because it is mounted last, anything it
//! writes overrides what other mounts provide.
//!
//! ```text
//! FileSystemWriter ── WriteArea (FolderWriteArea | RamDiskWriteArea)
//!        │
//!        └── Arc<FileSystem>  (tree updated in step with the store)
//! ```
//!
//! Lock order is always writer lock, then filesystem lock.
//!
//! Files that live in another mount are copied into the write area before
//! they are modified in place (opened without truncation or renamed), so the
//! write area always holds what the tree shows for its own files.

mod area;
mod copy;
mod folder;
mod ramdisk;
mod stream;

pub use area::WriteArea;
pub use copy::{CopyCount, CopyProgress};
pub use folder::FolderWriteArea;
pub use ramdisk::RamDiskWriteArea;
pub use stream::WriteStream;

use std::fmt;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;

use crate::events::{WriterEvent, EVENT_CAPACITY};
use crate::filesystem::{normalize_file_path, FileSystem};
use crate::mount::MountPoint;
use crate::node::{DirId, FileId, VirtualDirectory, VirtualFile};
use crate::paths::{self, fold_case};
use crate::provider::{PhysicalFileInfo, Provider, RamDiskProvider};
use crate::{VfsError, VfsResult};

/// How `open_stream` treats existing and missing files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Create; fail if the file exists.
    CreateNew,
    /// Create or truncate.
    Create,
    /// Open, creating if missing; content kept.
    OpenOrCreate,
    /// Open an existing file; content kept, writes start at the beginning.
    Open,
    /// Open an existing file and truncate it.
    Truncate,
    /// Open an existing file and write at its end.
    Append,
}

impl OpenMode {
    /// Modes that fail when the file does not exist.
    pub fn requires_existing(self) -> bool {
        matches!(self, Self::Open | Self::Truncate | Self::Append)
    }

    /// Modes that keep the current content.
    pub fn keeps_content(self) -> bool {
        matches!(self, Self::OpenOrCreate | Self::Open | Self::Append)
    }
}

/// Writes into a filesystem through a backing [`WriteArea`].
pub struct FileSystemWriter {
    fs: Arc<FileSystem>,
    area: Arc<dyn WriteArea>,
    mount: Mutex<Option<MountPoint>>,
    events: broadcast::Sender<WriterEvent>,
}

impl fmt::Debug for FileSystemWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileSystemWriter")
            .field("location", &self.area.location())
            .field("mount", &*self.lock())
            .finish()
    }
}

impl FileSystemWriter {
    /// A writer over any write area. Call [`mount`](Self::mount) before
    /// writing.
    pub fn new(fs: Arc<FileSystem>, area: Arc<dyn WriteArea>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            fs,
            area,
            mount: Mutex::new(None),
            events,
        }
    }

    /// A writer persisting to an OS directory.
    pub fn folder(fs: Arc<FileSystem>, dir: impl AsRef<Path>) -> VfsResult<Self> {
        let area = FolderWriteArea::new(dir)?;
        Ok(Self::new(fs, Arc::new(area)))
    }

    /// A writer persisting to a ram disk. The disk's provider must be
    /// registered with `fs` so the write area can be mounted.
    pub fn ram_disk(fs: Arc<FileSystem>, provider: &RamDiskProvider) -> VfsResult<Self> {
        if fs.provider(provider.name()).is_none() {
            return Err(VfsError::no_compatible_provider(provider.location()));
        }
        let area = RamDiskWriteArea::new(provider.disk().clone());
        Ok(Self::new(fs, Arc::new(area)))
    }

    pub fn file_system(&self) -> &Arc<FileSystem> {
        &self.fs
    }

    /// Physical location of the write area.
    pub fn write_location(&self) -> &str {
        self.area.location()
    }

    /// The write area's mount point, if mounted.
    pub fn mount_point(&self) -> Option<MountPoint> {
        self.lock().clone()
    }

    /// True when the write area is mounted and still active.
    pub fn is_mounted(&self) -> bool {
        let guard = self.lock();
        self.active_mount(&guard).is_ok()
    }

    /// Receive events for every mutation made through this writer.
    pub fn subscribe(&self) -> broadcast::Receiver<WriterEvent> {
        self.events.subscribe()
    }

    pub(crate) fn emit(&self, event: WriterEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn lock(&self) -> MutexGuard<'_, Option<MountPoint>> {
        self.mount.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn active_mount(&self, guard: &Option<MountPoint>) -> VfsResult<MountPoint> {
        match guard {
            Some(mount) if self.fs.lock().mounts.contains(mount) => Ok(mount.clone()),
            _ => Err(VfsError::mount_point_not_found(self.area.location())),
        }
    }

    /// Prepare the write area and mount it at `/`, replacing any earlier
    /// mount of it.
    pub fn mount(&self) -> VfsResult<MountPoint> {
        let mut guard = self.lock();
        self.area.prepare()?;

        if let Some(stale) = guard.take() {
            match self.fs.unmount(&stale) {
                Ok(()) | Err(VfsError::MountPointNotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        let mount = self.fs.mount(self.area.location(), paths::ROOT)?;
        tracing::info!(location = self.area.location(), "write area mounted");
        *guard = Some(mount.clone());
        Ok(mount)
    }

    /// Unmount the write area. Does nothing when it is not mounted.
    pub fn unmount(&self) -> VfsResult<()> {
        let mut guard = self.lock();
        let Some(mount) = guard.take() else {
            return Ok(());
        };
        match self.fs.unmount(&mount) {
            Ok(()) | Err(VfsError::MountPointNotFound(_)) => {
                tracing::info!(location = self.area.location(), "write area unmounted");
                Ok(())
            }
            Err(e) => {
                *guard = Some(mount);
                Err(e)
            }
        }
    }

    /// Create a directory (and missing parents) in the write area and the
    /// tree. Existing directories are claimed by the write area.
    pub fn create_directory(&self, path: &str) -> VfsResult<VirtualDirectory> {
        let guard = self.lock();
        let mount = self.active_mount(&guard)?;
        let dir = paths::virtual_directory(path)?;

        self.area.create_directory(&dir)?;
        let snapshot = {
            let mut state = self.fs.lock();
            let (id, _) = state.tree.ensure_directory(&dir, &mount);
            state.tree.claim_chain(id, &mount);
            state
                .tree
                .directory_snapshot(id)
                .ok_or_else(|| VfsError::not_found(&dir))?
        };

        tracing::debug!(path = %dir, "directory created");
        self.emit(WriterEvent::DirectoryAdded(snapshot.clone()));
        Ok(snapshot)
    }

    /// Delete a directory with everything below it. Deleting `/` empties the
    /// whole tree and the write area but keeps the write root.
    ///
    /// Returns the virtual paths of the deleted directories.
    pub fn delete_directory(&self, path: &str) -> VfsResult<Vec<String>> {
        let guard = self.lock();
        self.active_mount(&guard)?;
        let dir = paths::virtual_directory(path)?;

        let removed = {
            let mut state = self.fs.lock();
            let id = state
                .tree
                .find_directory(&dir)
                .ok_or_else(|| VfsError::not_found(&dir))?;
            self.area.delete_directory(&dir)?;
            state.tree.remove_directory(id)
        };

        tracing::debug!(path = %dir, directories = removed.len(), "directory deleted");
        self.emit(WriterEvent::DirectoryDeleted {
            paths: removed.clone(),
        });
        Ok(removed)
    }

    /// Open a file for writing.
    ///
    /// `Open`, `Truncate` and `Append` need an existing virtual file;
    /// `CreateNew` needs a missing one. Create modes need the parent
    /// directory to exist. If opening the backing file fails, a virtual file
    /// added for it is removed again.
    pub fn open_stream(&self, path: &str, mode: OpenMode) -> VfsResult<WriteStream> {
        let guard = self.lock();
        let mount = self.active_mount(&guard)?;
        let path = normalize_file_path(path)?;
        let name = paths::file_name(&path).to_string();
        let dir_path = paths::parent_directory(&path);

        let mut state = self.fs.lock();
        let dir = state
            .tree
            .find_directory(&dir_path)
            .ok_or_else(|| VfsError::not_found(&dir_path))?;
        let existing = state.tree.child_file(dir, &name);
        match existing {
            None if mode.requires_existing() => return Err(VfsError::not_found(path)),
            Some(_) if mode == OpenMode::CreateNew => return Err(VfsError::file_exists(path)),
            _ => {}
        }

        self.area.create_directory(&dir_path)?;
        let had_backing = self.area.file_info(&path).is_some();

        let mut area_mode = mode;
        if let Some(node) = existing.and_then(|id| state.tree.file(id)) {
            if node.mount != mount {
                if mode.keeps_content() {
                    self.copy_up(&node.mount, &node.physical, &path)?;
                } else if mode == OpenMode::Truncate {
                    area_mode = OpenMode::Create;
                }
            }
        }

        let created = existing.is_none();
        let id = match existing {
            Some(id) => id,
            None => {
                let info = PhysicalFileInfo::new(self.area.physical_file_path(&path), path.clone(), 0);
                state
                    .tree
                    .add_file(dir, &name, info, mount.clone())
                    .ok_or_else(|| VfsError::not_found(&dir_path))?
            }
        };

        let inner = match self.area.open_write(&path, area_mode) {
            Ok(inner) => inner,
            Err(e) => {
                if created {
                    state.tree.remove_file(id);
                    if !had_backing {
                        if let Err(cleanup) = self.area.delete_file(&path) {
                            tracing::warn!(path = %path, error = %cleanup, "rollback could not remove backing file");
                        }
                    }
                }
                return Err(e.into());
            }
        };
        drop(state);

        tracing::debug!(path = %path, ?mode, created, "write stream opened");
        Ok(WriteStream::new(
            inner,
            path,
            created,
            mount,
            self.fs.clone(),
            self.area.clone(),
            self.events.clone(),
        ))
    }

    /// Delete a file from the tree and, if present, from the write area.
    pub fn delete_file(&self, path: &str) -> VfsResult<VirtualFile> {
        let mut deleted = self.delete_files([path])?;
        deleted
            .pop()
            .ok_or_else(|| VfsError::not_found(path.trim()))
    }

    /// Delete several files. Every path must exist before anything is
    /// deleted.
    pub fn delete_files<I, S>(&self, paths: I) -> VfsResult<Vec<VirtualFile>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let guard = self.lock();
        self.active_mount(&guard)?;
        let normalized = paths
            .into_iter()
            .map(|p| normalize_file_path(p.as_ref()))
            .collect::<VfsResult<Vec<_>>>()?;

        let deleted = {
            let mut state = self.fs.lock();
            let ids = normalized
                .iter()
                .map(|p| state.tree.find_file(p).ok_or_else(|| VfsError::not_found(p)))
                .collect::<VfsResult<Vec<FileId>>>()?;

            let mut deleted = Vec::with_capacity(ids.len());
            for (path, id) in normalized.iter().zip(ids) {
                // Listed twice: already gone.
                let Some(file) = state.tree.file_snapshot(id) else {
                    continue;
                };
                self.area.delete_file(path)?;
                state.tree.remove_file(id);
                deleted.push(file);
            }
            deleted
        };

        tracing::debug!(files = deleted.len(), "files deleted");
        self.emit(WriterEvent::FileDeleted {
            files: deleted.clone(),
        });
        Ok(deleted)
    }

    /// Rename a file within its directory.
    pub fn rename_file(&self, path: &str, new_name: &str) -> VfsResult<VirtualFile> {
        let guard = self.lock();
        let mount = self.active_mount(&guard)?;
        let path = normalize_file_path(path)?;
        let new_name = validate_name(new_name)?;

        let mut state = self.fs.lock();
        let id = state
            .tree
            .find_file(&path)
            .ok_or_else(|| VfsError::not_found(&path))?;
        let Some((dir, old_name, owner, physical)) = state
            .tree
            .file(id)
            .map(|n| (n.directory, n.name.clone(), n.mount.clone(), n.physical.clone()))
        else {
            return Err(VfsError::not_found(path));
        };

        if old_name == new_name {
            return state.tree.file_snapshot(id).ok_or_else(|| VfsError::not_found(path));
        }
        let dir_path = paths::parent_directory(&path);
        let new_path = paths::join_virtual(&dir_path, &new_name);
        if fold_case(&old_name) != fold_case(&new_name) && sibling_exists(&state.tree, dir, &new_name) {
            return Err(VfsError::file_exists(new_path));
        }

        self.area.create_directory(&dir_path)?;
        if owner == mount && self.area.file_info(&path).is_some() {
            self.area.rename_file(&path, &new_path)?;
        } else {
            self.copy_up(&owner, &physical, &new_path)?;
        }
        let info = self
            .area
            .file_info(&new_path)
            .ok_or_else(|| VfsError::not_found(&new_path))?;

        state.tree.rename_file(id, &new_name);
        state.tree.update_file(id, info, mount);
        let file = state
            .tree
            .file_snapshot(id)
            .ok_or_else(|| VfsError::not_found(&new_path))?;
        drop(state);

        tracing::debug!(from = %path, to = %new_path, "file renamed");
        self.emit(WriterEvent::FileRenamed {
            file: file.clone(),
            old_path: path,
        });
        Ok(file)
    }

    /// Rename a directory within its parent. Renaming `/` does nothing.
    pub fn rename_directory(&self, path: &str, new_name: &str) -> VfsResult<VirtualDirectory> {
        let guard = self.lock();
        let mount = self.active_mount(&guard)?;
        let requested = paths::virtual_directory(path)?;
        let new_name = validate_name(new_name)?;

        let mut state = self.fs.lock();
        let id = state
            .tree
            .find_directory(&requested)
            .ok_or_else(|| VfsError::not_found(&requested))?;
        let Some((parent, old_name)) = state
            .tree
            .dir(id)
            .and_then(|n| n.parent.map(|p| (p, n.name.clone())))
        else {
            return state
                .tree
                .directory_snapshot(id)
                .ok_or_else(|| VfsError::not_found(&requested));
        };

        let dir = state.tree.directory_path(id);
        if old_name == new_name {
            return state.tree.directory_snapshot(id).ok_or_else(|| VfsError::not_found(dir));
        }
        let new_dir = format!("{}{new_name}/", paths::parent_directory(&dir));
        if fold_case(&old_name) != fold_case(&new_name) && sibling_exists(&state.tree, parent, &new_name) {
            return Err(VfsError::file_exists(new_dir));
        }

        // Capture the subtree before anything moves.
        let subtree: Vec<(DirId, String)> = state
            .tree
            .subtree(id)
            .into_iter()
            .map(|d| (d, state.tree.directory_path(d)))
            .collect();
        let mut files: Vec<(FileId, String, MountPoint, PhysicalFileInfo)> = Vec::new();
        for (d, _) in &subtree {
            for f in state.tree.files_in(*d) {
                if let (Some(node), Some(file_path)) = (state.tree.file(f), state.tree.file_path(f)) {
                    files.push((f, file_path, node.mount.clone(), node.physical.clone()));
                }
            }
        }
        let rebase = |old: &str| format!("{new_dir}{}", old.get(dir.len()..).unwrap_or_default());

        self.area.rename_directory(&dir, &new_dir)?;
        for (_, old) in &subtree {
            self.area.create_directory(&rebase(old))?;
        }
        for (_, old, owner, physical) in &files {
            let new_path = rebase(old);
            if *owner != mount || self.area.file_info(&new_path).is_none() {
                self.copy_up(owner, physical, &new_path)?;
            }
        }

        state.tree.rename_directory(id, &new_name);
        for (d, _) in &subtree {
            state.tree.set_directory_owner(*d, mount.clone());
        }
        for (f, old, _, _) in &files {
            if let Some(info) = self.area.file_info(&rebase(old)) {
                state.tree.update_file(*f, info, mount.clone());
            }
        }
        let directory = state
            .tree
            .directory_snapshot(id)
            .ok_or_else(|| VfsError::not_found(&new_dir))?;
        drop(state);

        tracing::debug!(from = %dir, to = %new_dir, files = files.len(), "directory renamed");
        self.emit(WriterEvent::DirectoryRenamed {
            directory: directory.clone(),
            old_path: dir,
        });
        Ok(directory)
    }

    /// Copy a file owned by another mount into the write area at `dest`.
    fn copy_up(&self, owner: &MountPoint, physical: &PhysicalFileInfo, dest: &str) -> VfsResult<()> {
        let data = owner.provider().read(physical)?;
        let mut out = self.area.open_write(dest, OpenMode::Create)?;
        out.write_all(&data)?;
        out.flush()?;
        tracing::debug!(path = dest, from = %owner, bytes = data.len(), "copied into write area");
        Ok(())
    }
}

/// Check a new name for a file or directory: non-empty, no separators or
/// illegal characters.
fn validate_name(name: &str) -> VfsResult<String> {
    let trimmed = name.trim();
    let clean = paths::normalize_file_name(trimmed);
    if clean.is_empty() || clean != trimmed || clean == "." || clean == ".." {
        return Err(VfsError::invalid_path(format!("invalid name {name:?}")));
    }
    Ok(clean)
}

fn sibling_exists(tree: &crate::tree::Tree, dir: DirId, name: &str) -> bool {
    tree.child_file(dir, name).is_some() || tree.child_directory(dir, name).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::plain("notes.txt", true)]
    #[case::spaces_trimmed(" notes.txt ", true)]
    #[case::separator("a/b", false)]
    #[case::wildcard("a*", false)]
    #[case::empty("  ", false)]
    #[case::dotdot("..", false)]
    fn name_validation(#[case] name: &str, #[case] ok: bool) {
        assert_eq!(validate_name(name).is_ok(), ok, "{name:?}");
    }

    #[test]
    fn mode_predicates() {
        assert!(OpenMode::Append.requires_existing());
        assert!(!OpenMode::OpenOrCreate.requires_existing());
        assert!(OpenMode::OpenOrCreate.keeps_content());
        assert!(!OpenMode::Truncate.keeps_content());
    }
}
