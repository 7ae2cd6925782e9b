//! Bulk copy from another filesystem into a writer.

use std::io;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::{FileSystemWriter, OpenMode};
use crate::events::WriterEvent;
use crate::filesystem::FileSystem;
use crate::node::VirtualFile;
use crate::{VfsError, VfsResult};

/// Number of directories and files a copy produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyCount {
    pub directories: usize,
    pub files: usize,
}

/// Progress report, sent after each copied file.
#[derive(Debug, Clone, Copy)]
pub struct CopyProgress<'a> {
    pub file: &'a VirtualFile,
    pub files_copied: usize,
    pub total_files: usize,
    pub total_directories: usize,
}

impl FileSystemWriter {
    /// Copy every directory and file of `source` into this writer.
    ///
    /// Returns `Some(count)` when done and `None` when `progress` returned
    /// false. Files already copied stay in place either way. An existing
    /// destination file fails with `FileExists` unless `allow_overwrite`.
    pub fn copy_from<F>(
        &self,
        source: &FileSystem,
        allow_overwrite: bool,
        progress: F,
    ) -> VfsResult<Option<CopyCount>>
    where
        F: FnMut(&CopyProgress<'_>) -> bool,
    {
        self.copy_internal(source, allow_overwrite, progress, &CancellationToken::new())
    }

    /// [`copy_from`](Self::copy_from) on the blocking pool, stopping early
    /// with `Ok(None)` once `cancel` fires.
    pub async fn copy_from_async<F>(
        self: &Arc<Self>,
        source: Arc<FileSystem>,
        cancel: CancellationToken,
        allow_overwrite: bool,
        progress: F,
    ) -> VfsResult<Option<CopyCount>>
    where
        F: FnMut(&CopyProgress<'_>) -> bool + Send + 'static,
    {
        let writer = Arc::clone(self);
        tokio::task::spawn_blocking(move || {
            writer.copy_internal(&source, allow_overwrite, progress, &cancel)
        })
        .await
        .map_err(|e| VfsError::Io(io::Error::other(e)))?
    }

    fn copy_internal<F>(
        &self,
        source: &FileSystem,
        allow_overwrite: bool,
        mut progress: F,
        cancel: &CancellationToken,
    ) -> VfsResult<Option<CopyCount>>
    where
        F: FnMut(&CopyProgress<'_>) -> bool,
    {
        let directories = source.find_directories("/", "*", true)?;
        let files = source.find_files("/", "*", true)?;
        if directories.is_empty() && files.is_empty() {
            return Ok(Some(CopyCount::default()));
        }

        let mut count = CopyCount::default();
        for dir in &directories {
            if cancel.is_cancelled() {
                tracing::info!(copied = ?count, "copy cancelled");
                return Ok(None);
            }
            self.create_directory(&dir.full_path)?;
            count.directories += 1;
        }

        for file in &files {
            if cancel.is_cancelled() {
                tracing::info!(copied = ?count, "copy cancelled");
                return Ok(None);
            }
            if !allow_overwrite && self.file_system().get_file(&file.full_path)?.is_some() {
                return Err(VfsError::file_exists(&file.full_path));
            }

            let mut reader = file.open()?;
            let mut stream = self.open_stream(&file.full_path, OpenMode::Create)?;
            io::copy(&mut reader, &mut stream)?;
            stream.close()?;
            count.files += 1;

            let report = CopyProgress {
                file,
                files_copied: count.files,
                total_files: files.len(),
                total_directories: directories.len(),
            };
            if !progress(&report) {
                tracing::info!(copied = ?count, "copy aborted by progress callback");
                return Ok(None);
            }
        }

        tracing::info!(directories = count.directories, files = count.files, "copy finished");
        self.emit(WriterEvent::Copied(count));
        Ok(Some(count))
    }
}
