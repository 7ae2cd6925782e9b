//! Write area on a shared ram disk.

use std::io::{self, Cursor, Seek, SeekFrom, Write};
use std::sync::Arc;

use super::{OpenMode, WriteArea};
use crate::provider::{PhysicalFileInfo, RamDisk};

/// Writes into a [`RamDisk`], which is mounted at `/` through its provider.
#[derive(Debug, Clone)]
pub struct RamDiskWriteArea {
    disk: Arc<RamDisk>,
    location: String,
}

impl RamDiskWriteArea {
    pub fn new(disk: Arc<RamDisk>) -> Self {
        let location = disk.location();
        Self { disk, location }
    }

    pub fn disk(&self) -> &Arc<RamDisk> {
        &self.disk
    }
}

impl WriteArea for RamDiskWriteArea {
    fn location(&self) -> &str {
        &self.location
    }

    fn prepare(&self) -> io::Result<()> {
        Ok(())
    }

    fn create_directory(&self, dir: &str) -> io::Result<()> {
        self.disk.create_directory(dir)
    }

    fn delete_directory(&self, dir: &str) -> io::Result<bool> {
        self.disk.remove_directory(dir)
    }

    fn delete_file(&self, path: &str) -> io::Result<bool> {
        self.disk.remove_file(path)
    }

    fn rename_file(&self, from: &str, to: &str) -> io::Result<bool> {
        self.disk.rename_file(from, to)
    }

    fn rename_directory(&self, from: &str, to: &str) -> io::Result<bool> {
        self.disk.rename_directory(from, to)
    }

    fn physical_file_path(&self, path: &str) -> String {
        format!("{}{path}", self.location)
    }

    fn file_info(&self, path: &str) -> Option<PhysicalFileInfo> {
        let info = self.disk.file_info(path)?;
        Some(
            PhysicalFileInfo::new(self.physical_file_path(path), path, info.length)
                .with_times(Some(info.created), Some(info.modified)),
        )
    }

    fn open_write(&self, path: &str, mode: OpenMode) -> io::Result<Box<dyn Write + Send>> {
        let existing = self.disk.read_file(path).ok();
        match (&existing, mode) {
            (Some(_), OpenMode::CreateNew) => {
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("file exists: {path}"),
                ));
            }
            (None, OpenMode::Open | OpenMode::Truncate | OpenMode::Append) => {
                return Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("not found: {path}"),
                ));
            }
            _ => {}
        }

        let initial = match mode {
            OpenMode::OpenOrCreate | OpenMode::Open | OpenMode::Append => existing.unwrap_or_default(),
            OpenMode::CreateNew | OpenMode::Create | OpenMode::Truncate => Vec::new(),
        };
        // The file exists as soon as the stream does.
        self.disk.write_file(path, initial.clone())?;

        let mut buffer = Cursor::new(initial);
        if mode == OpenMode::Append {
            buffer.seek(SeekFrom::End(0))?;
        }
        Ok(Box::new(RamFileWriter {
            disk: self.disk.clone(),
            path: path.to_string(),
            buffer,
        }))
    }
}

/// Buffers writes and commits the whole file to the disk on flush and drop.
struct RamFileWriter {
    disk: Arc<RamDisk>,
    path: String,
    buffer: Cursor<Vec<u8>>,
}

impl RamFileWriter {
    fn commit(&self) -> io::Result<()> {
        self.disk.write_file(&self.path, self.buffer.get_ref().clone())
    }
}

impl Write for RamFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.commit()
    }
}

impl Drop for RamFileWriter {
    fn drop(&mut self) {
        if let Err(e) = self.commit() {
            tracing::warn!(path = %self.path, error = %e, "ram disk commit failed");
        }
    }
}
