//! Arena-backed virtual tree.
//!
//! Directories and files live in maps keyed by handles that are never
//! reused. A directory knows its parent handle and keeps its children in
//! ordered maps keyed by case-folded name, so "first child" always means
//! first in case-insensitive name order.

use std::collections::{BTreeMap, HashMap, VecDeque};

use crate::mount::MountPoint;
use crate::node::{DirId, FileId, VirtualDirectory, VirtualFile};
use crate::paths::{self, fold_case};
use crate::provider::PhysicalFileInfo;

#[derive(Debug)]
pub(crate) struct DirNode {
    pub name: String,
    pub parent: Option<DirId>,
    pub dirs: BTreeMap<String, DirId>,
    pub files: BTreeMap<String, FileId>,
    pub mount: MountPoint,
}

impl DirNode {
    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty() && self.files.is_empty()
    }
}

#[derive(Debug)]
pub(crate) struct FileNode {
    pub name: String,
    pub directory: DirId,
    pub physical: PhysicalFileInfo,
    pub mount: MountPoint,
}

#[derive(Debug)]
pub(crate) struct Tree {
    dirs: HashMap<DirId, DirNode>,
    files: HashMap<FileId, FileNode>,
    root: DirId,
    next_id: u64,
}

impl Tree {
    pub fn new(root_owner: MountPoint) -> Self {
        let root = DirId(0);
        let mut dirs = HashMap::new();
        dirs.insert(
            root,
            DirNode {
                name: String::new(),
                parent: None,
                dirs: BTreeMap::new(),
                files: BTreeMap::new(),
                mount: root_owner,
            },
        );
        Self {
            dirs,
            files: HashMap::new(),
            root,
            next_id: 1,
        }
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn root(&self) -> DirId {
        self.root
    }

    pub fn dir(&self, id: DirId) -> Option<&DirNode> {
        self.dirs.get(&id)
    }

    pub fn file(&self, id: FileId) -> Option<&FileNode> {
        self.files.get(&id)
    }

    pub fn directory_count(&self) -> usize {
        self.dirs.len()
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Full virtual path of a directory, `/` for the root.
    pub fn directory_path(&self, id: DirId) -> String {
        let mut names = Vec::new();
        let mut current = Some(id);
        while let Some(cur) = current {
            let Some(node) = self.dirs.get(&cur) else {
                break;
            };
            if node.parent.is_some() {
                names.push(node.name.as_str());
            }
            current = node.parent;
        }

        let mut path = String::from(paths::ROOT);
        for name in names.iter().rev() {
            path.push_str(name);
            path.push(paths::SEPARATOR);
        }
        path
    }

    pub fn file_path(&self, id: FileId) -> Option<String> {
        let node = self.files.get(&id)?;
        Some(format!("{}{}", self.directory_path(node.directory), node.name))
    }

    pub fn child_directory(&self, parent: DirId, name: &str) -> Option<DirId> {
        self.dirs.get(&parent)?.dirs.get(&fold_case(name)).copied()
    }

    pub fn child_file(&self, parent: DirId, name: &str) -> Option<FileId> {
        self.dirs.get(&parent)?.files.get(&fold_case(name)).copied()
    }

    /// Walk from the root through a normalized directory path.
    pub fn find_directory(&self, path: &str) -> Option<DirId> {
        let mut current = self.root;
        for segment in paths::split_virtual_path(path) {
            current = self.child_directory(current, segment)?;
        }
        Some(current)
    }

    /// Find a file by normalized path.
    pub fn find_file(&self, path: &str) -> Option<FileId> {
        let name = paths::file_name(path);
        if name.is_empty() {
            return None;
        }
        let dir = self.find_directory(&paths::parent_directory(path))?;
        self.child_file(dir, name)
    }

    fn insert_directory(&mut self, parent: DirId, name: &str, mount: MountPoint) -> DirId {
        let id = DirId(self.next_id());
        self.dirs.insert(
            id,
            DirNode {
                name: name.to_string(),
                parent: Some(parent),
                dirs: BTreeMap::new(),
                files: BTreeMap::new(),
                mount,
            },
        );
        if let Some(parent) = self.dirs.get_mut(&parent) {
            parent.dirs.insert(fold_case(name), id);
        }
        id
    }

    /// Find or create the directory at `path`. Missing directories along the
    /// way are created and owned by `mount`; existing ones keep their owner.
    /// The flag tells whether the final directory was created.
    pub fn ensure_directory(&mut self, path: &str, mount: &MountPoint) -> (DirId, bool) {
        let mut current = self.root;
        let mut created = false;
        for segment in paths::split_virtual_path(path) {
            match self.child_directory(current, segment) {
                Some(id) => {
                    current = id;
                    created = false;
                }
                None => {
                    current = self.insert_directory(current, segment, mount.clone());
                    created = true;
                }
            }
        }
        (current, created)
    }

    pub fn set_directory_owner(&mut self, id: DirId, mount: MountPoint) {
        if let Some(node) = self.dirs.get_mut(&id) {
            node.mount = mount;
        }
    }

    /// Set the owner of a directory and every ancestor up to the root.
    pub fn claim_chain(&mut self, id: DirId, mount: &MountPoint) {
        let mut current = Some(id);
        while let Some(cur) = current {
            let Some(node) = self.dirs.get_mut(&cur) else {
                break;
            };
            node.mount = mount.clone();
            current = node.parent;
        }
    }

    /// Add a file to an existing directory. Returns `None` if the directory
    /// is gone.
    pub fn add_file(
        &mut self,
        directory: DirId,
        name: &str,
        physical: PhysicalFileInfo,
        mount: MountPoint,
    ) -> Option<FileId> {
        if !self.dirs.contains_key(&directory) {
            return None;
        }
        let id = FileId(self.next_id());
        self.files.insert(
            id,
            FileNode {
                name: name.to_string(),
                directory,
                physical,
                mount,
            },
        );
        if let Some(dir) = self.dirs.get_mut(&directory) {
            dir.files.insert(fold_case(name), id);
        }
        Some(id)
    }

    /// Overwrite a file's physical info and owner in place.
    pub fn update_file(&mut self, id: FileId, physical: PhysicalFileInfo, mount: MountPoint) {
        if let Some(node) = self.files.get_mut(&id) {
            node.physical = physical;
            node.mount = mount;
        }
    }

    pub fn remove_file(&mut self, id: FileId) -> Option<FileNode> {
        let node = self.files.remove(&id)?;
        if let Some(dir) = self.dirs.get_mut(&node.directory) {
            dir.files.remove(&fold_case(&node.name));
        }
        Some(node)
    }

    /// Breadth-first list of `start` and every directory below it.
    pub fn subtree(&self, start: DirId) -> Vec<DirId> {
        let mut out = Vec::new();
        let mut queue = VecDeque::from([start]);
        while let Some(id) = queue.pop_front() {
            let Some(node) = self.dirs.get(&id) else {
                continue;
            };
            out.push(id);
            queue.extend(node.dirs.values().copied());
        }
        out
    }

    /// Files directly inside a directory, in name order.
    pub fn files_in(&self, dir: DirId) -> Vec<FileId> {
        self.dirs
            .get(&dir)
            .map(|d| d.files.values().copied().collect())
            .unwrap_or_default()
    }

    /// Remove a directory with everything below it and return the removed
    /// directory paths. The root is never removed, only emptied.
    pub fn remove_directory(&mut self, id: DirId) -> Vec<String> {
        if id == self.root {
            return self.clear_children(id);
        }

        let subtree = self.subtree(id);
        let removed: Vec<String> = subtree.iter().map(|d| self.directory_path(*d)).collect();

        let detach = self.dirs.get(&id).map(|n| (n.parent, fold_case(&n.name)));
        if let Some((Some(parent), key)) = detach {
            if let Some(parent) = self.dirs.get_mut(&parent) {
                parent.dirs.remove(&key);
            }
        }
        for dir in subtree {
            if let Some(node) = self.dirs.remove(&dir) {
                for file in node.files.values() {
                    self.files.remove(file);
                }
            }
        }
        removed
    }

    /// Drop every child directory and file of `id`, keeping `id` itself.
    pub fn clear_children(&mut self, id: DirId) -> Vec<String> {
        let Some(node) = self.dirs.get(&id) else {
            return Vec::new();
        };
        let children: Vec<DirId> = node.dirs.values().copied().collect();
        let files: Vec<FileId> = node.files.values().copied().collect();

        let mut removed = Vec::new();
        for child in children {
            removed.extend(self.remove_directory(child));
        }
        for file in files {
            self.remove_file(file);
        }
        removed
    }

    /// Reset to a bare root owned by `root_owner`.
    pub fn clear(&mut self, root_owner: MountPoint) {
        let root = self.root;
        self.clear_children(root);
        self.set_directory_owner(root, root_owner);
    }

    pub fn rename_directory(&mut self, id: DirId, new_name: &str) {
        let Some(node) = self.dirs.get_mut(&id) else {
            return;
        };
        let old_key = fold_case(&node.name);
        node.name = new_name.to_string();
        let parent = node.parent;
        if let Some(parent) = parent.and_then(|p| self.dirs.get_mut(&p)) {
            parent.dirs.remove(&old_key);
            parent.dirs.insert(fold_case(new_name), id);
        }
    }

    pub fn rename_file(&mut self, id: FileId, new_name: &str) {
        let Some(node) = self.files.get_mut(&id) else {
            return;
        };
        let old_key = fold_case(&node.name);
        node.name = new_name.to_string();
        let directory = node.directory;
        if let Some(dir) = self.dirs.get_mut(&directory) {
            dir.files.remove(&old_key);
            dir.files.insert(fold_case(new_name), id);
        }
    }

    pub fn directory_snapshot(&self, id: DirId) -> Option<VirtualDirectory> {
        let node = self.dirs.get(&id)?;
        Some(VirtualDirectory {
            id,
            name: node.name.clone(),
            full_path: self.directory_path(id),
            parent: node.parent,
            mount_point: node.mount.clone(),
            directory_count: node.dirs.len(),
            file_count: node.files.len(),
        })
    }

    pub fn file_snapshot(&self, id: FileId) -> Option<VirtualFile> {
        let node = self.files.get(&id)?;
        Some(VirtualFile {
            id,
            name: node.name.clone(),
            full_path: format!("{}{}", self.directory_path(node.directory), node.name),
            directory: node.directory,
            physical_file: node.physical.clone(),
            mount_point: node.mount.clone(),
        })
    }
}
