//! Bulk copies from one filesystem into a writer.

use std::collections::BTreeMap;
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use strata_vfs::{
    CopyCount, FileSystem, FileSystemWriter, Provider, RamDisk, RamDiskProvider, VfsError,
    WriterEvent,
};
use tempfile::{tempdir, TempDir};
use tokio_util::sync::CancellationToken;

fn source_with(files: &[(&str, &str)]) -> (TempDir, Arc<FileSystem>) {
    let dir = tempdir().unwrap();
    for (path, content) in files {
        let full = dir.path().join(path);
        fs::create_dir_all(full.parent().unwrap()).unwrap();
        fs::write(full, content).unwrap();
    }
    fs::create_dir_all(dir.path().join("empty")).unwrap();
    let fs = Arc::new(FileSystem::new());
    fs.mount(&dir.path().to_string_lossy(), "/").unwrap();
    (dir, fs)
}

fn ram_writer() -> (Arc<RamDisk>, Arc<FileSystem>, FileSystemWriter) {
    let disk = Arc::new(RamDisk::new("dest"));
    let provider = Arc::new(RamDiskProvider::new(disk.clone()));
    let fs = Arc::new(FileSystem::with_providers([provider.clone() as Arc<dyn Provider>]));
    let writer = FileSystemWriter::ram_disk(fs.clone(), &provider).unwrap();
    writer.mount().unwrap();
    (disk, fs, writer)
}

/// Path -> contents for every file, plus every directory path.
fn contents(fs: &FileSystem) -> (Vec<String>, BTreeMap<String, Vec<u8>>) {
    let mut dirs: Vec<String> = fs
        .find_directories("/", "*", true)
        .unwrap()
        .into_iter()
        .map(|d| d.full_path)
        .collect();
    dirs.sort();
    let files = fs
        .find_files("/", "*", true)
        .unwrap()
        .into_iter()
        .map(|f| {
            let data = f.read().unwrap();
            (f.full_path, data)
        })
        .collect();
    (dirs, files)
}

const FILES: &[(&str, &str)] = &[
    ("readme.md", "# hi"),
    ("src/main.rs", "fn main() {}"),
    ("src/util/mod.rs", "pub mod x;"),
    ("assets/logo.svg", "<svg/>"),
];

#[test]
fn test_copy_round_trip() {
    let (_src, source) = source_with(FILES);
    let (_disk, dest, writer) = ram_writer();
    let mut events = writer.subscribe();

    let mut reports = Vec::new();
    let count = writer
        .copy_from(&source, false, |p| {
            reports.push((p.files_copied, p.total_files));
            true
        })
        .unwrap();

    assert_eq!(
        count,
        Some(CopyCount {
            directories: 4,
            files: 4
        })
    );
    assert_eq!(contents(&source), contents(&dest));
    assert_eq!(reports, vec![(1, 4), (2, 4), (3, 4), (4, 4)]);

    let copied = std::iter::from_fn(|| events.try_recv().ok())
        .filter(|e| matches!(e, WriterEvent::Copied(_)))
        .count();
    assert_eq!(copied, 1);
}

#[test]
fn test_copy_empty_source() {
    let source = FileSystem::new();
    let (_disk, _dest, writer) = ram_writer();
    let count = writer.copy_from(&source, false, |_| true).unwrap();
    assert_eq!(count, Some(CopyCount::default()));
}

#[test]
fn test_copy_refuses_overwrite() {
    let (_src, source) = source_with(FILES);
    let (_disk, _dest, writer) = ram_writer();
    writer.copy_from(&source, false, |_| true).unwrap();

    let err = writer.copy_from(&source, false, |_| true).unwrap_err();
    assert!(matches!(err, VfsError::FileExists(_)));

    let again = writer.copy_from(&source, true, |_| true).unwrap();
    assert_eq!(again.map(|c| c.files), Some(4));
}

#[test]
fn test_copy_aborted_by_progress() {
    let (_src, source) = source_with(FILES);
    let (disk, _dest, writer) = ram_writer();

    let count = writer.copy_from(&source, false, |p| p.files_copied < 2).unwrap();

    assert_eq!(count, None);
    // Files copied before the abort stay.
    assert_eq!(disk.file_count(), 2);
}

#[test]
fn test_copy_into_folder_writer() {
    let (_src, source) = source_with(FILES);
    let out = tempdir().unwrap();
    let dest = Arc::new(FileSystem::new());
    let writer = FileSystemWriter::folder(dest.clone(), out.path()).unwrap();
    writer.mount().unwrap();

    writer.copy_from(&source, false, |_| true).unwrap();

    assert_eq!(contents(&source), contents(&dest));
    assert_eq!(
        fs::read_to_string(out.path().join("src").join("util").join("mod.rs")).unwrap(),
        "pub mod x;"
    );
    assert!(out.path().join("empty").is_dir());
}

#[tokio::test]
async fn test_copy_async() {
    let (_src, source) = source_with(FILES);
    let (_disk, dest, writer) = ram_writer();
    let writer = Arc::new(writer);

    let count = writer
        .copy_from_async(source.clone(), CancellationToken::new(), false, |_| true)
        .await
        .unwrap();

    assert_eq!(count.map(|c| c.files), Some(4));
    assert_eq!(contents(&source), contents(&dest));
}

#[tokio::test]
async fn test_copy_async_cancelled_before_start() {
    let (_src, source) = source_with(FILES);
    let (disk, _dest, writer) = ram_writer();
    let writer = Arc::new(writer);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let count = writer
        .copy_from_async(source, cancel, false, |_| true)
        .await
        .unwrap();

    assert_eq!(count, None);
    assert_eq!(disk.file_count(), 0);
}

#[tokio::test]
async fn test_copy_async_cancelled_midway() {
    let (_src, source) = source_with(FILES);
    let (disk, _dest, writer) = ram_writer();
    let writer = Arc::new(writer);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();
    let count = writer
        .copy_from_async(source, cancel, false, move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                trigger.cancel();
            }
            true
        })
        .await
        .unwrap();

    assert_eq!(count, None);
    assert_eq!(seen.load(Ordering::SeqCst), 1);
    assert_eq!(disk.file_count(), 1);
}
