//! Write area on an OS directory.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf, MAIN_SEPARATOR};

use super::{OpenMode, WriteArea};
use crate::paths;
use crate::provider::PhysicalFileInfo;
use crate::{VfsError, VfsResult};

/// Writes into a physical directory, which is mounted at `/`.
#[derive(Debug, Clone)]
pub struct FolderWriteArea {
    root: PathBuf,
    location: String,
}

impl FolderWriteArea {
    /// Use `dir` as the write root. It is created on `prepare`.
    pub fn new(dir: impl AsRef<Path>) -> VfsResult<Self> {
        let dir = dir.as_ref();
        if dir.as_os_str().to_string_lossy().trim().is_empty() {
            return Err(VfsError::invalid_path("empty write directory"));
        }
        let absolute = std::path::absolute(dir)?;
        let location = paths::normalize_directory(&absolute.to_string_lossy(), MAIN_SEPARATOR)?;
        Ok(Self {
            root: PathBuf::from(&location),
            location,
        })
    }

    /// The write root on disk.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn physical(&self, virtual_path: &str) -> PathBuf {
        let mut path = self.root.clone();
        for segment in paths::split_virtual_path(virtual_path) {
            path.push(segment);
        }
        path
    }
}

impl WriteArea for FolderWriteArea {
    fn location(&self) -> &str {
        &self.location
    }

    fn prepare(&self) -> io::Result<()> {
        fs::create_dir_all(&self.root)
    }

    fn create_directory(&self, dir: &str) -> io::Result<()> {
        fs::create_dir_all(self.physical(dir))
    }

    fn delete_directory(&self, dir: &str) -> io::Result<bool> {
        let path = self.physical(dir);
        if !path.is_dir() {
            return Ok(false);
        }

        if paths::split_virtual_path(dir).is_empty() {
            for entry in fs::read_dir(&path)? {
                let entry = entry?;
                if entry.file_type()?.is_dir() {
                    fs::remove_dir_all(entry.path())?;
                } else {
                    fs::remove_file(entry.path())?;
                }
            }
        } else {
            fs::remove_dir_all(&path)?;
        }
        Ok(true)
    }

    fn delete_file(&self, path: &str) -> io::Result<bool> {
        match fs::remove_file(self.physical(path)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn rename_file(&self, from: &str, to: &str) -> io::Result<bool> {
        let source = self.physical(from);
        if !source.is_file() {
            return Ok(false);
        }
        let dest = self.physical(to);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(source, dest)?;
        Ok(true)
    }

    fn rename_directory(&self, from: &str, to: &str) -> io::Result<bool> {
        let source = self.physical(from);
        if paths::split_virtual_path(from).is_empty() || !source.is_dir() {
            return Ok(false);
        }
        let dest = self.physical(to);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(source, dest)?;
        Ok(true)
    }

    fn physical_file_path(&self, path: &str) -> String {
        self.physical(path).to_string_lossy().into_owned()
    }

    fn file_info(&self, path: &str) -> Option<PhysicalFileInfo> {
        let physical = self.physical(path);
        let meta = fs::metadata(&physical).ok().filter(|m| m.is_file())?;
        Some(
            PhysicalFileInfo::new(physical.to_string_lossy().into_owned(), path, meta.len())
                .with_times(meta.created().ok(), meta.modified().ok()),
        )
    }

    fn open_write(&self, path: &str, mode: OpenMode) -> io::Result<Box<dyn Write + Send>> {
        let physical = self.physical(path);
        if let Some(parent) = physical.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut options = OpenOptions::new();
        options.write(true);
        match mode {
            OpenMode::CreateNew => {
                options.create_new(true);
            }
            OpenMode::Create => {
                options.create(true).truncate(true);
            }
            OpenMode::OpenOrCreate => {
                options.create(true);
            }
            OpenMode::Open => {}
            OpenMode::Truncate => {
                options.truncate(true);
            }
            OpenMode::Append => {
                options.append(true);
            }
        }
        Ok(Box::new(options.open(physical)?))
    }
}
