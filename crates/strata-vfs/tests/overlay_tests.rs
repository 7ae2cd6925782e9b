//! Overlay behavior across mounts: last-mount-wins, unmount isolation,
//! refresh, and searches.
//!
//! Physical sources are temp directories, so these exercise the folder
//! provider end to end.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use rstest::rstest;
use strata_vfs::{FileSystem, MountPoint, Provider, RamDisk, RamDiskProvider, VfsError};
use tempfile::{tempdir, TempDir};

/// Create a temp directory holding `files` (relative paths with `/`).
fn tree_with(files: &[(&str, &str)]) -> TempDir {
    let dir = tempdir().unwrap();
    for (path, content) in files {
        let full = dir.path().join(path);
        fs::create_dir_all(full.parent().unwrap()).unwrap();
        fs::write(full, content).unwrap();
    }
    dir
}

fn mount_dir(fs: &FileSystem, dir: &Path, at: &str) -> MountPoint {
    fs.mount(&dir.to_string_lossy(), at).unwrap()
}

/// Every (path, owner) pair in the tree.
fn snapshot(fs: &FileSystem) -> BTreeSet<(String, String)> {
    let dirs = fs.find_directories("/", "*", true).unwrap();
    let files = fs.find_files("/", "*", true).unwrap();
    dirs.into_iter()
        .map(|d| (d.full_path, d.mount_point.to_string()))
        .chain(files.into_iter().map(|f| (f.full_path, f.mount_point.to_string())))
        .collect()
}

// ============================================================================
// Last mount wins
// ============================================================================

#[test]
fn test_later_mount_overrides_file() {
    let a = tree_with(&[("x.txt", "from a"), ("only_a.txt", "a")]);
    let b = tree_with(&[("x.txt", "from b"), ("only_b.txt", "b")]);
    let fs = FileSystem::new();

    let mount_a = mount_dir(&fs, a.path(), "/");
    let mount_b = mount_dir(&fs, b.path(), "/");

    let x = fs.get_file("/x.txt").unwrap().unwrap();
    assert_eq!(x.mount_point, mount_b);
    assert_eq!(fs.read_file("/x.txt").unwrap(), b"from b");
    assert_eq!(fs.get_file("/only_a.txt").unwrap().unwrap().mount_point, mount_a);
    assert_eq!(fs.get_file("/only_b.txt").unwrap().unwrap().mount_point, mount_b);
    assert_eq!(fs.root_directory().mount_point, mount_b);
}

#[test]
fn test_unmount_restores_shadowed_file() {
    let a = tree_with(&[("x.txt", "from a")]);
    let b = tree_with(&[("x.txt", "from b")]);
    let fs = FileSystem::new();

    let mount_a = mount_dir(&fs, a.path(), "/");
    let mount_b = mount_dir(&fs, b.path(), "/");
    let physical_b = fs.get_file("/x.txt").unwrap().unwrap().physical_file.full_path;
    assert!(Path::new(&physical_b).starts_with(b.path()));

    fs.unmount(&mount_b).unwrap();
    let x = fs.get_file("/x.txt").unwrap().unwrap();
    assert_eq!(x.mount_point, mount_a);
    assert_eq!(fs.read_file("/x.txt").unwrap(), b"from a");
    assert_eq!(fs.mount_points(), vec![mount_a]);
}

#[test]
fn test_directory_override_keeps_other_children() {
    let a = tree_with(&[("docs/a.md", "a")]);
    let b = tree_with(&[("docs/b.md", "b")]);
    let fs = FileSystem::new();

    let mount_a = mount_dir(&fs, a.path(), "/");
    let mount_b = mount_dir(&fs, b.path(), "/");

    let docs = fs.get_directory("/docs").unwrap().unwrap();
    assert_eq!(docs.mount_point, mount_b);
    assert_eq!(docs.file_count, 2);
    assert_eq!(fs.get_file("/docs/a.md").unwrap().unwrap().mount_point, mount_a);
}

#[test]
fn test_names_are_case_insensitive_across_mounts() {
    let a = tree_with(&[("Docs/Readme.TXT", "a")]);
    let b = tree_with(&[("docs/README.txt", "b")]);
    let fs = FileSystem::new();

    mount_dir(&fs, a.path(), "/");
    let mount_b = mount_dir(&fs, b.path(), "/");

    let files = fs.find_files("/", "*", true).unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].mount_point, mount_b);
    assert_eq!(fs.read_file("/DOCS/readme.txt").unwrap(), b"b");
}

// ============================================================================
// Unmount isolation
// ============================================================================

#[test]
fn test_unmount_outer_keeps_nested_mount() {
    let outer = tree_with(&[("top.txt", "t"), ("b/shadow.txt", "s")]);
    let inner = tree_with(&[("leaf.txt", "l"), ("deep/more.txt", "m")]);
    let fs = FileSystem::new();

    let m1 = mount_dir(&fs, outer.path(), "/a");
    let m2 = mount_dir(&fs, inner.path(), "/a/b");

    fs.unmount(&m1).unwrap();

    assert!(fs.get_file("/a/top.txt").unwrap().is_none());
    assert!(fs.get_file("/a/b/shadow.txt").unwrap().is_none());
    for file in fs.find_files("/a/b", "*", true).unwrap() {
        assert_eq!(file.mount_point, m2, "{}", file.full_path);
    }
    for dir in fs.find_directories("/a/b", "*", true).unwrap() {
        assert_eq!(dir.mount_point, m2, "{}", dir.full_path);
    }
    assert_eq!(fs.get_directory("/a/b").unwrap().unwrap().mount_point, m2);

    // /a still holds /a/b, so it survives with a new owner.
    let a = fs.get_directory("/a").unwrap().unwrap();
    assert_ne!(a.mount_point, m1);
}

#[test]
fn test_unmount_removes_exclusive_content() {
    let a = tree_with(&[("one/two/three.txt", "3")]);
    let fs = FileSystem::new();
    let mount = mount_dir(&fs, a.path(), "/mnt/data");

    fs.unmount(&mount).unwrap();

    assert!(fs.get_directory("/mnt/data").unwrap().is_none());
    assert!(fs.get_directory("/mnt").unwrap().is_none());
    assert!(fs.find_files("/", "*", true).unwrap().is_empty());
    assert!(fs.mount_points().is_empty());
}

#[test]
fn test_unmount_twice_fails() {
    let a = tree_with(&[("a.txt", "a")]);
    let fs = FileSystem::new();
    let mount = mount_dir(&fs, a.path(), "/");

    fs.unmount(&mount).unwrap();
    assert!(matches!(fs.unmount(&mount), Err(VfsError::MountPointNotFound(_))));
}

// ============================================================================
// Refresh
// ============================================================================

#[test]
fn test_refresh_is_idempotent() {
    let a = tree_with(&[("x.txt", "a"), ("d/e/f.txt", "f")]);
    let b = tree_with(&[("x.txt", "b"), ("d/g.txt", "g")]);
    let fs = FileSystem::new();
    mount_dir(&fs, a.path(), "/");
    mount_dir(&fs, b.path(), "/sub");
    mount_dir(&fs, b.path(), "/");

    let before = snapshot(&fs);
    fs.refresh().unwrap();
    let once = snapshot(&fs);
    fs.refresh().unwrap();
    let twice = snapshot(&fs);

    assert_eq!(before, once);
    assert_eq!(once, twice);
}

#[test]
fn test_refresh_picks_up_physical_changes() {
    let a = tree_with(&[("old.txt", "old")]);
    let fs = FileSystem::new();
    mount_dir(&fs, a.path(), "/");

    fs::remove_file(a.path().join("old.txt")).unwrap();
    fs::write(a.path().join("new.txt"), "new").unwrap();
    fs.refresh().unwrap();

    assert!(fs.get_file("/old.txt").unwrap().is_none());
    assert_eq!(fs.read_file("/new.txt").unwrap(), b"new");
}

#[test]
fn test_refresh_drops_vanished_mount() {
    let a = tree_with(&[("keep.txt", "k")]);
    let gone = tree_with(&[("lost.txt", "l")]);
    let fs = FileSystem::new();
    let keep = mount_dir(&fs, a.path(), "/");
    mount_dir(&fs, gone.path(), "/gone");

    let gone_path = gone.path().to_path_buf();
    drop(gone);
    assert!(!gone_path.exists());

    assert!(fs.refresh().is_err());
    assert_eq!(fs.mount_points(), vec![keep]);
    assert!(fs.get_file("/keep.txt").unwrap().is_some());
    assert!(fs.get_directory("/gone").unwrap().is_none());
}

// ============================================================================
// Searches
// ============================================================================

fn search_fixture() -> (TempDir, FileSystem) {
    let dir = tree_with(&[
        ("a.txt", ""),
        ("b.log", ""),
        ("one/c.txt", ""),
        ("one/two/d.TXT", ""),
        ("one/two/e.md", ""),
        ("three/f.txt.bak", ""),
    ]);
    let fs = FileSystem::new();
    mount_dir(&fs, dir.path(), "/");
    (dir, fs)
}

fn names<T>(items: &[T], name: impl Fn(&T) -> &str) -> Vec<String> {
    let mut out: Vec<String> = items.iter().map(|i| name(i).to_string()).collect();
    out.sort();
    out
}

#[rstest]
#[case::recursive_txt("/", "*.txt", true, &["a.txt", "c.txt", "d.TXT"])]
#[case::direct_only("/", "*", false, &["a.txt", "b.log"])]
#[case::single_char("/one/two", "?.*", false, &["d.TXT", "e.md"])]
#[case::nested_start("/one", "*.txt", true, &["c.txt", "d.TXT"])]
#[case::exact_name("/", "e.md", true, &["e.md"])]
#[case::no_match("/", "*.rs", true, &[])]
fn test_find_files(
    #[case] start: &str,
    #[case] mask: &str,
    #[case] recursive: bool,
    #[case] expected: &[&str],
) {
    let (_dir, fs) = search_fixture();
    let found = fs.find_files(start, mask, recursive).unwrap();
    assert_eq!(names(&found, |f| f.name.as_str()), expected);
}

#[test]
fn test_find_directories() {
    let (_dir, fs) = search_fixture();

    let all = fs.find_directories("/", "*", true).unwrap();
    assert_eq!(names(&all, |d| d.name.as_str()), ["one", "three", "two"]);

    let top = fs.find_directories("/", "*", false).unwrap();
    assert_eq!(names(&top, |d| d.name.as_str()), ["one", "three"]);

    let t = fs.find_directories("/", "t*", true).unwrap();
    assert_eq!(names(&t, |d| d.name.as_str()), ["three", "two"]);
}

#[test]
fn test_find_in_missing_directory() {
    let (_dir, fs) = search_fixture();
    assert!(matches!(
        fs.find_files("/nope", "*", true),
        Err(VfsError::NotFound(_))
    ));
}

// ============================================================================
// Ram disks
// ============================================================================

#[test]
fn test_ram_disk_overrides_folder() {
    let base = tree_with(&[("conf/app.toml", "disk")]);
    let disk = Arc::new(RamDisk::new("patch"));
    disk.write_file("/conf/app.toml", b"ram".to_vec()).unwrap();
    let provider: Arc<dyn Provider> = Arc::new(RamDiskProvider::new(disk));
    let fs = FileSystem::with_providers([provider]);

    mount_dir(&fs, base.path(), "/");
    let ram = fs.mount("ramdisk://patch", "/").unwrap();

    let file = fs.get_file("/conf/app.toml").unwrap().unwrap();
    assert_eq!(file.mount_point, ram);
    assert_eq!(fs.read_file("/conf/app.toml").unwrap(), b"ram");

    fs.unmount(&ram).unwrap();
    assert_eq!(fs.read_file("/conf/app.toml").unwrap(), b"disk");
}

#[test]
fn test_unknown_scheme_has_no_provider() {
    let fs = FileSystem::new();
    assert!(matches!(
        fs.mount("zipfs://bundle", "/"),
        Err(VfsError::NoCompatibleProvider(_))
    ));
}
