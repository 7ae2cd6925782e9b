//! Plain OS directory provider.

use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf, MAIN_SEPARATOR};

use super::{relative_to_mount, PhysicalFileInfo, PhysicalListing, Provider};
use crate::mount::MountPoint;
use crate::paths;

/// Reads loose files from an OS directory.
///
/// The filesystem uses one of these as its default provider for any
/// directory no registered provider claims.
#[derive(Debug, Clone, Default)]
pub struct FolderProvider {
    _private: (),
}

impl FolderProvider {
    /// Registry name of the folder provider.
    pub const NAME: &'static str = "folder";

    pub fn new() -> Self {
        Self::default()
    }
}

impl Provider for FolderProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Loose files in an OS directory"
    }

    fn can_read(&self, physical_path: &str) -> bool {
        !paths::is_fake_location(physical_path) && Path::new(physical_path).is_dir()
    }

    fn enumerate(&self, physical_root: &str, mount_location: &str) -> io::Result<PhysicalListing> {
        let mut listing = PhysicalListing::default();
        let mut queue = VecDeque::from([(PathBuf::from(physical_root), mount_location.to_string())]);

        while let Some((dir, virtual_dir)) = queue.pop_front() {
            let mut entries = fs::read_dir(&dir)?.collect::<Result<Vec<_>, _>>()?;
            entries.sort_by_key(|e| e.file_name());

            for entry in entries {
                let raw_name = entry.file_name().to_string_lossy().into_owned();
                let name = paths::normalize_file_name(&raw_name);
                if name.is_empty() {
                    continue;
                }

                let path = entry.path();
                // Follow symlinks to files, never to directories.
                let file_type = entry.file_type()?;
                if file_type.is_dir() {
                    let child = format!("{virtual_dir}{name}/");
                    listing.directories.push(child.clone());
                    queue.push_back((path, child));
                    continue;
                }

                let meta = match fs::metadata(&path) {
                    Ok(meta) if meta.is_file() => meta,
                    Ok(_) => continue,
                    Err(e) if file_type.is_symlink() => {
                        tracing::debug!(path = %path.display(), error = %e, "skipping dangling symlink");
                        continue;
                    }
                    Err(e) => return Err(e),
                };

                let info = PhysicalFileInfo::new(
                    path.to_string_lossy().into_owned(),
                    format!("{virtual_dir}{name}"),
                    meta.len(),
                )
                .with_times(meta.created().ok(), meta.modified().ok());
                listing.files.push(info);
            }
        }

        Ok(listing)
    }

    fn open_stream(&self, file: &PhysicalFileInfo) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(File::open(&file.full_path)?))
    }

    fn map_to_physical_path(&self, virtual_path: &str, mount_point: &MountPoint) -> String {
        let relative = relative_to_mount(virtual_path, mount_point.mount_location());
        let mut physical = mount_point.physical_path().to_string();
        if !physical.ends_with(['/', '\\']) && !relative.is_empty() {
            physical.push(MAIN_SEPARATOR);
        }
        for (i, segment) in paths::split_virtual_path(relative).into_iter().enumerate() {
            if i > 0 {
                physical.push(MAIN_SEPARATOR);
            }
            physical.push_str(segment);
        }
        if virtual_path.ends_with('/') && !physical.ends_with(['/', '\\']) {
            physical.push(MAIN_SEPARATOR);
        }
        physical
    }

    fn is_read_only(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn enumerates_breadth_first() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("b/deep")).unwrap();
        fs::create_dir_all(dir.path().join("a")).unwrap();
        fs::write(dir.path().join("root.txt"), b"root").unwrap();
        fs::write(dir.path().join("b/deep/x.bin"), b"12345").unwrap();

        let provider = FolderProvider::new();
        let listing = provider
            .enumerate(&dir.path().to_string_lossy(), "/mnt/")
            .unwrap();

        assert_eq!(listing.directories, vec!["/mnt/a/", "/mnt/b/", "/mnt/b/deep/"]);
        let files: Vec<_> = listing.files.iter().map(|f| f.virtual_path.as_str()).collect();
        assert_eq!(files, vec!["/mnt/root.txt", "/mnt/b/deep/x.bin"]);
        assert_eq!(listing.files[1].length, 5);
        assert!(listing.files[1].modified.is_some());
    }

    #[test]
    fn reads_file_contents() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("hello.txt"), b"hello").unwrap();

        let provider = FolderProvider::new();
        let listing = provider.enumerate(&dir.path().to_string_lossy(), "/").unwrap();
        assert_eq!(provider.read(&listing.files[0]).unwrap(), b"hello");
    }

    #[test]
    fn maps_virtual_to_physical() {
        let provider: Arc<dyn Provider> = Arc::new(FolderProvider::new());
        let root = format!("{MAIN_SEPARATOR}data{MAIN_SEPARATOR}");
        let mount = MountPoint::new(provider.clone(), root.clone(), "/game/", false);

        assert_eq!(provider.map_to_physical_path("/game/", &mount), root);
        assert_eq!(
            provider.map_to_physical_path("/game/maps/", &mount),
            format!("{root}maps{MAIN_SEPARATOR}")
        );
        assert_eq!(
            provider.map_to_physical_path("/game/maps/a.map", &mount),
            format!("{root}maps{MAIN_SEPARATOR}a.map")
        );
    }

    #[test]
    fn only_reads_directories() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("f.txt");
        fs::write(&file, b"x").unwrap();

        let provider = FolderProvider::new();
        assert!(provider.can_read(&dir.path().to_string_lossy()));
        assert!(!provider.can_read(&file.to_string_lossy()));
        assert!(!provider.can_read("ramdisk://scratch"));
    }
}
