//! The overlay filesystem.
//!
//! Every mount merges a provider's listing into one virtual tree. When two
//! sources provide the same path, the later mount wins and takes ownership of
//! that node; everything else keeps its original owner. Unmounting hands
//! ownership back to whatever is left underneath.
//!
//! ```text
//! mount A at /        /x.txt -> A   /docs/ -> A
//! mount B at /        /x.txt -> B   /docs/ -> B   /b.txt -> B
//! unmount B           /x.txt -> A   /docs/ -> A
//! ```
//!
//! An override replaces the file in place, so unmounting B first removes
//! everything B owned and then replays the remaining mounts, oldest first,
//! at exactly the paths B gave up. Paths B never owned are left alone, so a
//! writer's deletions survive unrelated unmounts.

use std::collections::HashSet;
use std::fmt;
use std::io::Read;
use std::path::MAIN_SEPARATOR;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use strata_glob::FileMask;

use crate::mount::MountPoint;
use crate::node::{DirId, FileId, VirtualDirectory, VirtualFile};
use crate::paths::{self, fold_case};
use crate::provider::{FolderProvider, PhysicalListing, Provider};
use crate::tree::Tree;
use crate::{VfsError, VfsResult};

/// Tree and active mounts, guarded together by the filesystem lock.
#[derive(Debug)]
pub(crate) struct State {
    pub tree: Tree,
    pub mounts: Vec<MountPoint>,
}

/// A virtual filesystem assembled from mounted physical sources.
pub struct FileSystem {
    providers: Vec<Arc<dyn Provider>>,
    default_provider: Arc<dyn Provider>,
    state: Mutex<State>,
}

impl Default for FileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FileSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileSystem")
            .field(
                "providers",
                &self.providers.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .field("mounts", &self.lock().mounts)
            .finish()
    }
}

impl FileSystem {
    /// A filesystem that only knows the default folder provider.
    pub fn new() -> Self {
        Self::with_providers(Vec::new())
    }

    /// A filesystem with extra providers, tried in order before the default.
    ///
    /// Provider names are unique case-insensitively; later duplicates are
    /// ignored.
    pub fn with_providers<I>(providers: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn Provider>>,
    {
        let mut registered: Vec<Arc<dyn Provider>> = Vec::new();
        for provider in providers {
            if registered
                .iter()
                .any(|p| paths::eq_ignore_case(p.name(), provider.name()))
            {
                tracing::warn!(provider = provider.name(), "duplicate provider name ignored");
                continue;
            }
            registered.push(provider);
        }

        let default_provider: Arc<dyn Provider> = Arc::new(FolderProvider::new());
        let root_owner = Self::detached_owner(&default_provider);
        Self {
            providers: registered,
            default_provider,
            state: Mutex::new(State {
                tree: Tree::new(root_owner),
                mounts: Vec::new(),
            }),
        }
    }

    /// Owner of the root before anything is mounted.
    fn detached_owner(provider: &Arc<dyn Provider>) -> MountPoint {
        MountPoint::new(provider.clone(), "", paths::ROOT, false)
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registered providers, in lookup order.
    pub fn providers(&self) -> &[Arc<dyn Provider>] {
        &self.providers
    }

    /// Find a registered provider by name (case-insensitive).
    pub fn provider(&self, name: &str) -> Option<&Arc<dyn Provider>> {
        self.providers
            .iter()
            .find(|p| paths::eq_ignore_case(p.name(), name))
    }

    /// The provider used for plain directories nobody else claims.
    pub fn default_provider(&self) -> &Arc<dyn Provider> {
        &self.default_provider
    }

    /// Active mount points in registration order.
    pub fn mount_points(&self) -> Vec<MountPoint> {
        self.lock().mounts.clone()
    }

    pub fn root_directory(&self) -> VirtualDirectory {
        let state = self.lock();
        let root = state.tree.root();
        state
            .tree
            .directory_snapshot(root)
            .unwrap_or_else(|| VirtualDirectory {
                id: root,
                name: String::new(),
                full_path: paths::ROOT.to_string(),
                parent: None,
                mount_point: Self::detached_owner(&self.default_provider),
                directory_count: 0,
                file_count: 0,
            })
    }

    fn first_reader(&self, physical_path: &str) -> Option<Arc<dyn Provider>> {
        self.providers
            .iter()
            .find(|p| p.can_read(physical_path))
            .cloned()
    }

    /// Mount a physical source at a virtual location.
    ///
    /// `physical_path` may be an OS directory, a packed file some provider
    /// understands, or a provider-defined `scheme://` location.
    pub fn mount(&self, physical_path: &str, mount_location: &str) -> VfsResult<MountPoint> {
        let location = paths::virtual_directory(mount_location)?;
        let mount = self.resolve_mount(physical_path, &location)?;
        let mut state = self.lock();
        self.mount_locked(&mut state, &mount)?;
        Ok(mount)
    }

    fn resolve_mount(&self, physical_path: &str, location: &str) -> VfsResult<MountPoint> {
        let physical = physical_path.trim();
        if physical.is_empty() {
            return Err(VfsError::invalid_path("empty physical path"));
        }

        if paths::is_fake_location(physical) {
            let provider = self
                .first_reader(physical)
                .ok_or_else(|| VfsError::no_compatible_provider(physical))?;
            return Ok(MountPoint::new(provider, physical, location, true));
        }

        let absolute = std::path::absolute(physical)?;
        let meta = match std::fs::metadata(&absolute) {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(VfsError::not_found(physical));
            }
            Err(e) => return Err(e.into()),
        };

        if meta.is_dir() {
            let dir = paths::normalize_directory(&absolute.to_string_lossy(), MAIN_SEPARATOR)?;
            let provider = self
                .first_reader(&dir)
                .unwrap_or_else(|| self.default_provider.clone());
            Ok(MountPoint::new(provider, dir, location, false))
        } else {
            let file = absolute.to_string_lossy().into_owned();
            let provider = self
                .first_reader(&file)
                .ok_or_else(|| VfsError::no_compatible_provider(&file))?;
            Ok(MountPoint::new(provider, file, location, false))
        }
    }

    fn mount_locked(&self, state: &mut State, mount: &MountPoint) -> VfsResult<()> {
        let listing = mount
            .provider()
            .enumerate(mount.physical_path(), mount.mount_location())?;
        let (directories, files) = merge(&mut state.tree, mount, mount.mount_location(), &listing)?;

        state.mounts.retain(|m| m != mount);
        state.mounts.push(mount.clone());

        tracing::info!(
            physical = mount.physical_path(),
            location = mount.mount_location(),
            provider = mount.provider().name(),
            directories,
            files,
            "mounted"
        );
        Ok(())
    }

    /// Remove a mount point. Its exclusive files and empty directories go
    /// away; directories still holding other content are handed to another
    /// owner.
    pub fn unmount(&self, mount: &MountPoint) -> VfsResult<()> {
        let mut state = self.lock();
        self.unmount_locked(&mut state, mount)
    }

    fn unmount_locked(&self, state: &mut State, mount: &MountPoint) -> VfsResult<()> {
        let Some(index) = state.mounts.iter().position(|m| m == mount) else {
            return Err(VfsError::mount_point_not_found(mount.to_string()));
        };

        let tree = &mut state.tree;
        let Some(location) = tree.find_directory(mount.mount_location()) else {
            state.mounts.remove(index);
            tracing::info!(mount = %mount, "unmounted; mount location was already gone");
            return Ok(());
        };

        let subtree = tree.subtree(location);
        let owned_files: Vec<FileId> = subtree
            .iter()
            .flat_map(|d| tree.files_in(*d))
            .filter(|f| tree.file(*f).is_some_and(|n| n.mount == *mount))
            .collect();
        // Folded paths the mount gives up; only these are restored.
        let mut vacated: HashSet<String> = owned_files
            .iter()
            .filter_map(|f| tree.file_path(*f))
            .map(|p| fold_case(&p))
            .collect();
        for file in &owned_files {
            tree.remove_file(*file);
        }

        let mut owned_dirs: Vec<(String, DirId)> = subtree
            .iter()
            .filter(|d| tree.dir(**d).is_some_and(|n| n.mount == *mount))
            .map(|d| (fold_case(&tree.directory_path(*d)), *d))
            .collect();
        // Ancestors created when the mount location did not exist yet.
        let mut parent = tree.dir(location).and_then(|n| n.parent);
        while let Some(id) = parent {
            let Some(node) = tree.dir(id) else {
                break;
            };
            if node.mount == *mount {
                owned_dirs.push((fold_case(&tree.directory_path(id)), id));
            }
            parent = node.parent;
        }

        // Deepest first; equal depth in descending name order.
        owned_dirs.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| b.0.cmp(&a.0)));
        vacated.extend(owned_dirs.iter().map(|(path, _)| path.clone()));

        let mut removed = 0;
        for (_, id) in &owned_dirs {
            if self.release_directory(tree, *id) {
                removed += 1;
            }
        }

        state.mounts.remove(index);
        let restored = self.restore_shadowed(state, &vacated);
        tracing::info!(
            mount = %mount,
            files = owned_files.len(),
            directories_removed = removed,
            directories_reassigned = owned_dirs.len() - removed,
            restored,
            "unmounted"
        );
        Ok(())
    }

    /// Replay the remaining mounts, oldest first, at the `vacated` paths so
    /// whatever was shadowed there comes back with last-mount-wins intact.
    fn restore_shadowed(&self, state: &mut State, vacated: &HashSet<String>) -> usize {
        let candidates: Vec<MountPoint> = state
            .mounts
            .iter()
            .filter(|m| vacated.iter().any(|p| paths::is_within(p, m.mount_location())))
            .cloned()
            .collect();

        let mut restored = 0;
        for mount in &candidates {
            let listing = match mount
                .provider()
                .enumerate(mount.physical_path(), mount.mount_location())
            {
                Ok(listing) => listing,
                Err(e) => {
                    tracing::warn!(mount = %mount, error = %e, "could not restore shadowed entries");
                    continue;
                }
            };
            restored += restore_entries(&mut state.tree, mount, &listing, vacated);
        }
        restored
    }

    /// Delete an owned directory if it is empty (and not the root), otherwise
    /// give it to the owner of its first child directory, else its first
    /// file, else a default-provider mount. Returns true when removed.
    fn release_directory(&self, tree: &mut Tree, id: DirId) -> bool {
        let Some(node) = tree.dir(id) else {
            return false;
        };

        if node.parent.is_some() && node.is_empty() {
            let path = tree.directory_path(id);
            tree.remove_directory(id);
            tracing::debug!(path = %path, "removed empty directory");
            return true;
        }

        let heir = node
            .dirs
            .values()
            .next()
            .and_then(|c| tree.dir(*c))
            .map(|c| c.mount.clone())
            .or_else(|| {
                node.files
                    .values()
                    .next()
                    .and_then(|f| tree.file(*f))
                    .map(|f| f.mount.clone())
            })
            .unwrap_or_else(|| {
                MountPoint::new(
                    self.default_provider.clone(),
                    node.mount.physical_path(),
                    node.mount.mount_location(),
                    false,
                )
            });

        tracing::debug!(path = %tree.directory_path(id), owner = %heir, "directory ownership reassigned");
        tree.set_directory_owner(id, heir);
        false
    }

    /// Unmount every active mount of `physical_path`, wherever it is attached.
    pub fn unmount_physical(&self, physical_path: &str) -> VfsResult<usize> {
        let key = physical_key(physical_path);
        self.unmount_matching(physical_path, |m| physical_key(m.physical_path()) == key)
    }

    /// Unmount every active mount of `physical_path` at `mount_location`.
    pub fn unmount_at(&self, physical_path: &str, mount_location: &str) -> VfsResult<usize> {
        let key = physical_key(physical_path);
        let location = paths::virtual_directory(mount_location)?;
        self.unmount_matching(physical_path, |m| {
            physical_key(m.physical_path()) == key
                && paths::eq_ignore_case(m.mount_location(), &location)
        })
    }

    fn unmount_matching<F>(&self, what: &str, mut matches: F) -> VfsResult<usize>
    where
        F: FnMut(&MountPoint) -> bool,
    {
        let mut state = self.lock();
        let targets: Vec<MountPoint> = state.mounts.iter().filter(|&m| matches(m)).cloned().collect();
        if targets.is_empty() {
            return Err(VfsError::mount_point_not_found(what));
        }
        for mount in &targets {
            self.unmount_locked(&mut state, mount)?;
        }
        Ok(targets.len())
    }

    /// Rebuild the tree by remounting every active mount in its original
    /// order.
    ///
    /// A mount that fails to re-enumerate is dropped; the first such error
    /// is returned after the others have been remounted.
    pub fn refresh(&self) -> VfsResult<()> {
        let mut state = self.lock();
        self.refresh_locked(&mut state)
    }

    fn refresh_locked(&self, state: &mut State) -> VfsResult<()> {
        let mounts = std::mem::take(&mut state.mounts);
        state.tree.clear(Self::detached_owner(&self.default_provider));

        let mut first_error = None;
        for mount in &mounts {
            if let Err(e) = self.mount_locked(state, mount) {
                tracing::warn!(mount = %mount, error = %e, "mount dropped during refresh");
                first_error.get_or_insert(e);
            }
        }

        tracing::info!(
            mounts = state.mounts.len(),
            directories = state.tree.directory_count(),
            files = state.tree.file_count(),
            "refreshed"
        );
        first_error.map_or(Ok(()), Err)
    }

    /// Re-read one directory from the mount that owns it.
    ///
    /// `/`, directories owned by an inactive mount, and directories that
    /// are their owner's physical root all fall back to a full refresh.
    pub fn refresh_directory(&self, path: &str) -> VfsResult<()> {
        let dir = paths::virtual_directory(path)?;
        let mut state = self.lock();
        let owner = state
            .tree
            .find_directory(&dir)
            .and_then(|id| state.tree.dir(id).map(|n| (id, n.mount.clone())));
        let Some((id, owner)) = owner else {
            return Err(VfsError::not_found(dir));
        };
        if id == state.tree.root() || !state.mounts.contains(&owner) {
            return self.refresh_locked(&mut state);
        }

        let physical = owner.provider().map_to_physical_path(&dir, &owner);
        if physical_key(&physical) == physical_key(owner.physical_path()) {
            return self.refresh_locked(&mut state);
        }

        let listing = owner.provider().enumerate(&physical, &dir)?;
        state.tree.clear_children(id);
        let (directories, files) = merge(&mut state.tree, &owner, &dir, &listing)?;
        tracing::info!(path = %dir, directories, files, "directory refreshed");
        Ok(())
    }

    /// Look up a directory. `Ok(None)` when it does not exist.
    pub fn get_directory(&self, path: &str) -> VfsResult<Option<VirtualDirectory>> {
        let dir = paths::virtual_directory(path)?;
        let state = self.lock();
        Ok(state
            .tree
            .find_directory(&dir)
            .and_then(|id| state.tree.directory_snapshot(id)))
    }

    /// Look up a file. `Ok(None)` when it does not exist.
    pub fn get_file(&self, path: &str) -> VfsResult<Option<VirtualFile>> {
        let file = normalize_file_path(path)?;
        let state = self.lock();
        Ok(state
            .tree
            .find_file(&file)
            .and_then(|id| state.tree.file_snapshot(id)))
    }

    /// Directories below `path` whose names match `mask`.
    ///
    /// Recursive results come breadth-first: each level before the next,
    /// siblings in case-insensitive name order.
    pub fn find_directories(
        &self,
        path: &str,
        mask: &str,
        recursive: bool,
    ) -> VfsResult<Vec<VirtualDirectory>> {
        let dir = paths::virtual_directory(path)?;
        let mask = compile_mask(mask)?;
        let state = self.lock();
        let tree = &state.tree;
        let start = tree
            .find_directory(&dir)
            .ok_or_else(|| VfsError::not_found(&dir))?;

        let candidates: Vec<DirId> = if recursive {
            tree.subtree(start).into_iter().skip(1).collect()
        } else {
            tree.dir(start)
                .map(|n| n.dirs.values().copied().collect())
                .unwrap_or_default()
        };

        Ok(candidates
            .into_iter()
            .filter_map(|id| tree.directory_snapshot(id))
            .filter(|d| mask.is_match(&d.name))
            .collect())
    }

    /// Files in (and, if `recursive`, below) `path` whose names match `mask`.
    ///
    /// The start directory's files come first, then each descendant
    /// directory's files in breadth-first order.
    pub fn find_files(&self, path: &str, mask: &str, recursive: bool) -> VfsResult<Vec<VirtualFile>> {
        let dir = paths::virtual_directory(path)?;
        let mask = compile_mask(mask)?;
        let state = self.lock();
        let tree = &state.tree;
        let start = tree
            .find_directory(&dir)
            .ok_or_else(|| VfsError::not_found(&dir))?;

        let dirs = if recursive { tree.subtree(start) } else { vec![start] };
        Ok(dirs
            .into_iter()
            .flat_map(|d| tree.files_in(d))
            .filter_map(|f| tree.file_snapshot(f))
            .filter(|f| mask.is_match(&f.name))
            .collect())
    }

    /// Direct children of a directory.
    pub fn directory_children(
        &self,
        path: &str,
    ) -> VfsResult<(Vec<VirtualDirectory>, Vec<VirtualFile>)> {
        let dir = paths::virtual_directory(path)?;
        let state = self.lock();
        let tree = &state.tree;
        let node = tree
            .find_directory(&dir)
            .and_then(|id| tree.dir(id))
            .ok_or_else(|| VfsError::not_found(&dir))?;

        let dirs = node
            .dirs
            .values()
            .filter_map(|d| tree.directory_snapshot(*d))
            .collect();
        let files = node
            .files
            .values()
            .filter_map(|f| tree.file_snapshot(*f))
            .collect();
        Ok((dirs, files))
    }

    /// Read a file's contents through its owning provider.
    pub fn read_file(&self, path: &str) -> VfsResult<Vec<u8>> {
        let file = self.require_file(path)?;
        Ok(file.read()?)
    }

    /// Open a file's contents through its owning provider.
    pub fn open_file(&self, path: &str) -> VfsResult<Box<dyn Read + Send>> {
        let file = self.require_file(path)?;
        Ok(file.open()?)
    }

    fn require_file(&self, path: &str) -> VfsResult<VirtualFile> {
        self.get_file(path)?
            .ok_or_else(|| VfsError::not_found(path.trim()))
    }
}

/// Normalize a path that must name a file.
pub(crate) fn normalize_file_path(path: &str) -> VfsResult<String> {
    let file = paths::normalize_path(path)?;
    if paths::file_name(&file).is_empty() {
        return Err(VfsError::invalid_path(format!("no file name in {path:?}")));
    }
    Ok(file)
}

fn compile_mask(mask: &str) -> VfsResult<FileMask> {
    FileMask::new(mask).map_err(|e| VfsError::invalid_path(e.to_string()))
}

/// Comparable form of a physical path: absolute, no trailing separator,
/// case-folded.
fn physical_key(path: &str) -> String {
    let trimmed = path.trim();
    let absolute = if paths::is_fake_location(trimmed) {
        trimmed.to_string()
    } else {
        std::path::absolute(trimmed)
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|_| trimmed.to_string())
    };
    fold_case(absolute.trim_end_matches(['/', '\\']))
}

/// Merge a provider listing into the tree under `location`.
///
/// Paths are validated before anything changes, so a bad listing leaves the
/// tree untouched. Returns the directory and file counts.
fn merge(
    tree: &mut Tree,
    mount: &MountPoint,
    location: &str,
    listing: &PhysicalListing,
) -> VfsResult<(usize, usize)> {
    fn remember(dir: &str, known: &mut HashSet<String>) {
        let mut current = String::from(paths::ROOT);
        known.insert(current.clone());
        for segment in paths::split_virtual_path(dir) {
            current.push_str(&fold_case(segment));
            current.push(paths::SEPARATOR);
            known.insert(current.clone());
        }
    }

    let mut known: HashSet<String> = HashSet::new();
    remember(location, &mut known);

    let mut directories = Vec::with_capacity(listing.directories.len());
    for dir in &listing.directories {
        let dir = paths::virtual_directory(dir)?;
        remember(&dir, &mut known);
        directories.push(dir);
    }

    let mut files = Vec::with_capacity(listing.files.len());
    for info in &listing.files {
        let path = normalize_file_path(&info.virtual_path)?;
        let parent = paths::parent_directory(&path);
        if !known.contains(&fold_case(&parent)) && tree.find_directory(&parent).is_none() {
            return Err(VfsError::not_found(parent));
        }
        let name = paths::file_name(&path).to_string();
        let mut info = info.clone();
        info.virtual_path = path;
        files.push((parent, name, info));
    }

    let (location_id, created) = tree.ensure_directory(location, mount);
    if !created {
        tree.set_directory_owner(location_id, mount.clone());
    }

    for dir in &directories {
        match tree.find_directory(dir) {
            Some(id) => {
                if tree.dir(id).is_some_and(|n| n.mount != *mount) {
                    tracing::debug!(path = %dir, mount = %mount, "directory overridden");
                }
                tree.set_directory_owner(id, mount.clone());
            }
            None => {
                tree.ensure_directory(dir, mount);
            }
        }
    }

    let file_count = files.len();
    for (parent, name, info) in files {
        let Some(dir) = tree.find_directory(&parent) else {
            return Err(VfsError::not_found(parent));
        };
        match tree.child_file(dir, &name) {
            Some(id) => {
                tracing::debug!(path = %info.virtual_path, mount = %mount, "file overridden");
                tree.update_file(id, info, mount.clone());
            }
            None => {
                tree.add_file(dir, &name, info, mount.clone());
            }
        }
    }

    Ok((directories.len(), file_count))
}

/// Re-add the entries of `listing` whose folded paths are in `vacated`,
/// owned by `mount`. Returns how many were restored.
fn restore_entries(
    tree: &mut Tree,
    mount: &MountPoint,
    listing: &PhysicalListing,
    vacated: &HashSet<String>,
) -> usize {
    let mut restored = 0;

    let directories = std::iter::once(mount.mount_location().to_string()).chain(
        listing
            .directories
            .iter()
            .filter_map(|d| paths::virtual_directory(d).ok()),
    );
    for dir in directories {
        if !vacated.contains(&fold_case(&dir)) {
            continue;
        }
        let (id, _) = tree.ensure_directory(&dir, mount);
        tree.set_directory_owner(id, mount.clone());
        restored += 1;
    }

    for info in &listing.files {
        let Ok(path) = normalize_file_path(&info.virtual_path) else {
            continue;
        };
        if !vacated.contains(&fold_case(&path)) {
            continue;
        }
        let (dir, _) = tree.ensure_directory(&paths::parent_directory(&path), mount);
        let name = paths::file_name(&path).to_string();
        let mut info = info.clone();
        info.virtual_path = path;
        match tree.child_file(dir, &name) {
            Some(id) => tree.update_file(id, info, mount.clone()),
            None => {
                tree.add_file(dir, &name, info, mount.clone());
            }
        }
        restored += 1;
    }
    restored
}
