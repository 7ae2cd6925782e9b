//! Write streams handed out by `FileSystemWriter::open_stream`.

use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;

use tokio::sync::broadcast;

use super::WriteArea;
use crate::events::WriterEvent;
use crate::filesystem::FileSystem;
use crate::mount::MountPoint;
use crate::node::VirtualFile;
use crate::paths;
use crate::{VfsError, VfsResult};

/// A stream writing one file into the write area.
///
/// Closing it (explicitly with [`WriteStream::close`] or by dropping it)
/// refreshes the virtual file from the backing store and broadcasts
/// [`WriterEvent::FileClosed`].
pub struct WriteStream {
    inner: Option<Box<dyn Write + Send>>,
    path: String,
    created: bool,
    mount: MountPoint,
    fs: Arc<FileSystem>,
    area: Arc<dyn WriteArea>,
    events: broadcast::Sender<WriterEvent>,
}

impl WriteStream {
    pub(crate) fn new(
        inner: Box<dyn Write + Send>,
        path: String,
        created: bool,
        mount: MountPoint,
        fs: Arc<FileSystem>,
        area: Arc<dyn WriteArea>,
        events: broadcast::Sender<WriterEvent>,
    ) -> Self {
        Self {
            inner: Some(inner),
            path,
            created,
            mount,
            fs,
            area,
            events,
        }
    }

    /// Virtual path being written.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// True when this stream created the virtual file.
    pub fn created(&self) -> bool {
        self.created
    }

    /// Flush, close, and return the updated virtual file.
    pub fn close(mut self) -> VfsResult<VirtualFile> {
        self.finish()
    }

    fn finish(&mut self) -> VfsResult<VirtualFile> {
        let Some(mut inner) = self.inner.take() else {
            return Err(VfsError::Io(io::Error::other("write stream already closed")));
        };
        inner.flush()?;
        drop(inner);

        let info = self
            .area
            .file_info(&self.path)
            .ok_or_else(|| VfsError::not_found(&self.path))?;

        let file = {
            let mut state = self.fs.lock();
            let tree = &mut state.tree;
            let id = match tree.find_file(&self.path) {
                Some(id) => id,
                // Deleted from the tree while the stream was open.
                None => {
                    let dir_path = paths::parent_directory(&self.path);
                    let dir = tree
                        .find_directory(&dir_path)
                        .ok_or_else(|| VfsError::not_found(&dir_path))?;
                    tree.add_file(dir, paths::file_name(&self.path), info.clone(), self.mount.clone())
                        .ok_or_else(|| VfsError::not_found(&dir_path))?
                }
            };
            tree.update_file(id, info, self.mount.clone());
            tree.file_snapshot(id)
                .ok_or_else(|| VfsError::not_found(&self.path))?
        };

        tracing::debug!(path = %self.path, size = file.size(), "write stream closed");
        // No subscribers is fine.
        let _ = self.events.send(WriterEvent::FileClosed {
            file: file.clone(),
            created: self.created,
        });
        Ok(file)
    }

    fn stream(&mut self) -> io::Result<&mut (dyn Write + Send)> {
        match self.inner.as_mut() {
            Some(inner) => Ok(&mut **inner),
            None => Err(io::Error::other("write stream closed")),
        }
    }
}

impl Write for WriteStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream()?.flush()
    }
}

impl Drop for WriteStream {
    fn drop(&mut self) {
        if self.inner.is_some() {
            if let Err(e) = self.finish() {
                tracing::warn!(path = %self.path, error = %e, "closing write stream failed");
            }
        }
    }
}

impl fmt::Debug for WriteStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteStream")
            .field("path", &self.path)
            .field("created", &self.created)
            .field("open", &self.inner.is_some())
            .finish()
    }
}
