//! Writers over folder and ram disk write areas.

use std::fs;
use std::io::Write;
use std::sync::Arc;

use strata_vfs::{
    FileSystem, FileSystemWriter, OpenMode, Provider, RamDisk, RamDiskProvider, VfsError,
    WriterEvent,
};
use tempfile::{tempdir, TempDir};

struct Setup {
    base: TempDir,
    out: TempDir,
    fs: Arc<FileSystem>,
    writer: FileSystemWriter,
}

/// A base folder mounted at `/` with a folder writer mounted over it.
fn setup(files: &[(&str, &str)]) -> Setup {
    let base = tempdir().unwrap();
    for (path, content) in files {
        let full = base.path().join(path);
        fs::create_dir_all(full.parent().unwrap()).unwrap();
        fs::write(full, content).unwrap();
    }
    let out = tempdir().unwrap();

    let fs = Arc::new(FileSystem::new());
    fs.mount(&base.path().to_string_lossy(), "/").unwrap();
    let writer = FileSystemWriter::folder(fs.clone(), out.path()).unwrap();
    writer.mount().unwrap();
    Setup {
        base,
        out,
        fs,
        writer,
    }
}

fn write_file(writer: &FileSystemWriter, path: &str, mode: OpenMode, data: &[u8]) {
    let mut stream = writer.open_stream(path, mode).unwrap();
    stream.write_all(data).unwrap();
    stream.close().unwrap();
}

// ============================================================================
// Directories
// ============================================================================

#[test]
fn test_create_then_delete_directory() {
    let s = setup(&[]);

    let dir = s.writer.create_directory("/new").unwrap();
    assert_eq!(dir.full_path, "/new/");
    assert_eq!(Some(dir.mount_point), s.writer.mount_point());
    assert!(s.out.path().join("new").is_dir());

    let removed = s.writer.delete_directory("/new").unwrap();
    assert_eq!(removed, vec!["/new/".to_string()]);
    assert!(s.fs.get_directory("/new").unwrap().is_none());
    assert!(!s.out.path().join("new").exists());
}

#[test]
fn test_create_nested_directory_creates_parents() {
    let s = setup(&[]);
    s.writer.create_directory("/a/b/c").unwrap();

    for path in ["/a", "/a/b", "/a/b/c"] {
        let dir = s.fs.get_directory(path).unwrap().unwrap();
        assert_eq!(Some(dir.mount_point), s.writer.mount_point(), "{path}");
    }
    assert!(s.out.path().join("a").join("b").join("c").is_dir());
}

#[test]
fn test_delete_missing_directory() {
    let s = setup(&[]);
    assert!(matches!(
        s.writer.delete_directory("/nope"),
        Err(VfsError::NotFound(_))
    ));
}

#[test]
fn test_delete_root_empties_tree() {
    let s = setup(&[("base.txt", "b")]);
    write_file(&s.writer, "/mine.txt", OpenMode::Create, b"m");

    s.writer.delete_directory("/").unwrap();

    assert!(s.fs.find_files("/", "*", true).unwrap().is_empty());
    assert!(s.out.path().is_dir());
    assert!(!s.out.path().join("mine.txt").exists());
    // Other mounts are untouched on disk.
    assert!(s.base.path().join("base.txt").exists());
}

// ============================================================================
// Streams
// ============================================================================

#[test]
fn test_write_new_file() {
    let s = setup(&[]);
    let mut stream = s.writer.open_stream("/notes/today.txt", OpenMode::Create);
    // Parent must exist first.
    assert!(matches!(stream, Err(VfsError::NotFound(_))));

    s.writer.create_directory("/notes").unwrap();
    stream = s.writer.open_stream("/notes/today.txt", OpenMode::Create);
    let mut stream = stream.unwrap();
    assert!(stream.created());
    stream.write_all(b"hello").unwrap();
    let file = stream.close().unwrap();

    assert_eq!(file.size(), 5);
    assert_eq!(file.full_path, "/notes/today.txt");
    assert_eq!(s.fs.read_file("/notes/today.txt").unwrap(), b"hello");
    assert_eq!(
        fs::read(s.out.path().join("notes").join("today.txt")).unwrap(),
        b"hello"
    );
}

#[test]
fn test_append_copies_up_shadowed_file() {
    let s = setup(&[("log.txt", "hello")]);

    write_file(&s.writer, "/log.txt", OpenMode::Append, b" world");

    let file = s.fs.get_file("/log.txt").unwrap().unwrap();
    assert_eq!(Some(file.mount_point), s.writer.mount_point());
    assert_eq!(s.fs.read_file("/log.txt").unwrap(), b"hello world");
    assert_eq!(fs::read(s.base.path().join("log.txt")).unwrap(), b"hello");
}

#[test]
fn test_truncate_shadowed_file() {
    let s = setup(&[("big.txt", "lots of content")]);

    write_file(&s.writer, "/big.txt", OpenMode::Truncate, b"x");

    assert_eq!(s.fs.read_file("/big.txt").unwrap(), b"x");
    assert_eq!(fs::read(s.base.path().join("big.txt")).unwrap(), b"lots of content");
}

#[test]
fn test_open_mode_preconditions() {
    let s = setup(&[("a.txt", "a")]);

    assert!(matches!(
        s.writer.open_stream("/a.txt", OpenMode::CreateNew),
        Err(VfsError::FileExists(_))
    ));
    for mode in [OpenMode::Open, OpenMode::Truncate, OpenMode::Append] {
        assert!(
            matches!(s.writer.open_stream("/missing.txt", mode), Err(VfsError::NotFound(_))),
            "{mode:?}"
        );
    }
    assert!(s.fs.get_file("/missing.txt").unwrap().is_none());
}

#[test]
fn test_failed_open_rolls_back_virtual_file() {
    let s = setup(&[]);
    // A directory where the backing file should go makes the open fail.
    fs::create_dir(s.out.path().join("blocked.txt")).unwrap();

    let result = s.writer.open_stream("/blocked.txt", OpenMode::Create);
    assert!(matches!(result, Err(VfsError::Io(_))));
    assert!(s.fs.get_file("/blocked.txt").unwrap().is_none());
    assert!(s.out.path().join("blocked.txt").is_dir());
}

#[test]
fn test_dropped_stream_still_closes() {
    let s = setup(&[]);
    let mut events = s.writer.subscribe();
    {
        let mut stream = s.writer.open_stream("/dropped.txt", OpenMode::CreateNew).unwrap();
        stream.write_all(b"abc").unwrap();
    }

    assert_eq!(s.fs.get_file("/dropped.txt").unwrap().unwrap().size(), 3);
    match events.try_recv().unwrap() {
        WriterEvent::FileClosed { file, created } => {
            assert!(created);
            assert_eq!(file.full_path, "/dropped.txt");
        }
        other => panic!("unexpected event {other:?}"),
    }
}

// ============================================================================
// Deletes and renames
// ============================================================================

#[test]
fn test_delete_files_checks_all_first() {
    let s = setup(&[]);
    write_file(&s.writer, "/one.txt", OpenMode::Create, b"1");
    write_file(&s.writer, "/two.txt", OpenMode::Create, b"2");

    let err = s.writer.delete_files(["/one.txt", "/three.txt"]).unwrap_err();
    assert!(matches!(err, VfsError::NotFound(_)));
    assert!(s.fs.get_file("/one.txt").unwrap().is_some());

    let deleted = s.writer.delete_files(["/one.txt", "/two.txt"]).unwrap();
    assert_eq!(deleted.len(), 2);
    assert!(s.fs.find_files("/", "*", false).unwrap().is_empty());
    assert!(!s.out.path().join("one.txt").exists());
}

#[test]
fn test_rename_own_file() {
    let s = setup(&[]);
    write_file(&s.writer, "/draft.txt", OpenMode::Create, b"draft");
    let mut events = s.writer.subscribe();

    let file = s.writer.rename_file("/draft.txt", "final.txt").unwrap();
    assert_eq!(file.full_path, "/final.txt");
    assert!(s.fs.get_file("/draft.txt").unwrap().is_none());
    assert_eq!(s.fs.read_file("/final.txt").unwrap(), b"draft");
    assert!(s.out.path().join("final.txt").exists());
    assert!(!s.out.path().join("draft.txt").exists());

    match events.try_recv().unwrap() {
        WriterEvent::FileRenamed { old_path, .. } => assert_eq!(old_path, "/draft.txt"),
        other => panic!("unexpected event {other:?}"),
    }
}

#[test]
fn test_rename_shadowed_file_copies_up() {
    let s = setup(&[("orig.txt", "base")]);

    s.writer.rename_file("/orig.txt", "moved.txt").unwrap();

    assert_eq!(s.fs.read_file("/moved.txt").unwrap(), b"base");
    assert!(s.fs.get_file("/orig.txt").unwrap().is_none());
    assert!(s.base.path().join("orig.txt").exists());
}

#[test]
fn test_rename_conflicts() {
    let s = setup(&[("a.txt", "a"), ("b.txt", "b")]);

    assert!(matches!(
        s.writer.rename_file("/a.txt", "B.TXT"),
        Err(VfsError::FileExists(_))
    ));
    assert!(matches!(
        s.writer.rename_file("/a.txt", "sub/c.txt"),
        Err(VfsError::InvalidPath(_))
    ));
    // Case-only rename is allowed.
    let file = s.writer.rename_file("/a.txt", "A.txt").unwrap();
    assert_eq!(file.name, "A.txt");
}

#[test]
fn test_rename_directory_moves_subtree() {
    let s = setup(&[("src/lib.rs", "lib"), ("src/bin/main.rs", "main")]);
    write_file(&s.writer, "/src/extra.rs", OpenMode::Create, b"extra");

    let dir = s.writer.rename_directory("/src", "code").unwrap();
    assert_eq!(dir.full_path, "/code/");

    assert!(s.fs.get_directory("/src").unwrap().is_none());
    assert_eq!(s.fs.read_file("/code/lib.rs").unwrap(), b"lib");
    assert_eq!(s.fs.read_file("/code/bin/main.rs").unwrap(), b"main");
    assert_eq!(s.fs.read_file("/code/extra.rs").unwrap(), b"extra");
    assert!(s.out.path().join("code").join("bin").join("main.rs").exists());
    for file in s.fs.find_files("/code", "*", true).unwrap() {
        assert_eq!(Some(file.mount_point), s.writer.mount_point());
    }
}

// ============================================================================
// Mount state
// ============================================================================

#[test]
fn test_unmounted_writer_rejects_writes() {
    let s = setup(&[]);
    s.writer.unmount().unwrap();
    assert!(!s.writer.is_mounted());
    assert!(matches!(
        s.writer.create_directory("/x"),
        Err(VfsError::MountPointNotFound(_))
    ));

    // Unmounting again is a no-op; mounting again works.
    s.writer.unmount().unwrap();
    s.writer.mount().unwrap();
    assert!(s.writer.is_mounted());
}

#[test]
fn test_writer_survives_refresh() {
    let s = setup(&[]);
    write_file(&s.writer, "/kept.txt", OpenMode::Create, b"k");

    s.fs.refresh().unwrap();

    assert!(s.writer.is_mounted());
    assert_eq!(s.fs.read_file("/kept.txt").unwrap(), b"k");
}

#[test]
fn test_deleted_file_stays_gone_after_unrelated_unmount() {
    let s = setup(&[("x.txt", "x")]);
    s.writer.delete_file("/x.txt").unwrap();

    let other = tempdir().unwrap();
    fs::write(other.path().join("c.txt"), "c").unwrap();
    let mount = s.fs.mount(&other.path().to_string_lossy(), "/c").unwrap();
    s.fs.unmount(&mount).unwrap();

    assert!(s.fs.get_file("/x.txt").unwrap().is_none());
    assert!(s.fs.get_directory("/c").unwrap().is_none());

    // Only a refresh brings the lower layer's copy back.
    s.fs.refresh().unwrap();
    assert_eq!(s.fs.read_file("/x.txt").unwrap(), b"x");
}

#[test]
fn test_ram_disk_writer() {
    let disk = Arc::new(RamDisk::new("scratch"));
    let provider = Arc::new(RamDiskProvider::new(disk.clone()));
    let fs = Arc::new(FileSystem::with_providers([provider.clone() as Arc<dyn Provider>]));
    let writer = FileSystemWriter::ram_disk(fs.clone(), &provider).unwrap();
    writer.mount().unwrap();
    let mut events = writer.subscribe();

    writer.create_directory("/tmp").unwrap();
    write_file(&writer, "/tmp/a.bin", OpenMode::Create, &[1, 2, 3]);

    assert_eq!(disk.read_file("/tmp/a.bin").unwrap(), vec![1u8, 2, 3]);
    assert_eq!(fs.read_file("/tmp/a.bin").unwrap(), vec![1u8, 2, 3]);
    assert!(matches!(events.try_recv().unwrap(), WriterEvent::DirectoryAdded(_)));
    assert!(matches!(
        events.try_recv().unwrap(),
        WriterEvent::FileClosed { created: true, .. }
    ));

    fs.refresh().unwrap();
    assert_eq!(fs.read_file("/tmp/a.bin").unwrap(), vec![1u8, 2, 3]);
}

#[test]
fn test_ram_disk_writer_needs_registered_provider() {
    let provider = RamDiskProvider::new(Arc::new(RamDisk::new("loose")));
    let fs = Arc::new(FileSystem::new());
    assert!(matches!(
        FileSystemWriter::ram_disk(fs, &provider),
        Err(VfsError::NoCompatibleProvider(_))
    ));
}
