//! Backing stores for writers.

use std::io::{self, Write};

use super::OpenMode;
use crate::provider::PhysicalFileInfo;

/// The physical side of a writer.
///
/// All paths are normalized virtual paths (`/dir/`, `/dir/file.txt`). The
/// writer keeps the virtual tree in step; an area only touches its store.
pub trait WriteArea: Send + Sync {
    /// Physical location mounted into the filesystem at `/`.
    fn location(&self) -> &str;

    /// Make the store ready for mounting.
    fn prepare(&self) -> io::Result<()>;

    /// Create a directory and any missing parents.
    fn create_directory(&self, dir: &str) -> io::Result<()>;

    /// Delete a directory recursively. For `/` only the contents go.
    /// Returns false when nothing existed.
    fn delete_directory(&self, dir: &str) -> io::Result<bool>;

    /// Delete a file. Returns false when nothing existed.
    fn delete_file(&self, path: &str) -> io::Result<bool>;

    /// Move a file. Returns false when the source does not exist.
    fn rename_file(&self, from: &str, to: &str) -> io::Result<bool>;

    /// Move a directory. Returns false when the source does not exist.
    fn rename_directory(&self, from: &str, to: &str) -> io::Result<bool>;

    /// The physical path a virtual file maps to in this store.
    fn physical_file_path(&self, path: &str) -> String;

    /// Current physical info for a stored file.
    fn file_info(&self, path: &str) -> Option<PhysicalFileInfo>;

    /// Open a file for writing with the given mode.
    fn open_write(&self, path: &str, mode: OpenMode) -> io::Result<Box<dyn Write + Send>>;
}
