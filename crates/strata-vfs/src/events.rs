//! Post-mutation notifications from a writer.
//!
//! Events are broadcast after the tree has been updated, so a subscriber
//! that looks the node up again sees the new state. Slow subscribers lag
//! and lose events rather than blocking writes.

use crate::node::{VirtualDirectory, VirtualFile};
use crate::writer::CopyCount;

/// Broadcast channel capacity for writer events.
pub const EVENT_CAPACITY: usize = 256;

/// Something a writer changed.
#[derive(Debug, Clone)]
pub enum WriterEvent {
    /// A directory was created (or claimed) in the write area.
    DirectoryAdded(VirtualDirectory),
    /// A directory and everything below it was deleted.
    DirectoryDeleted { paths: Vec<String> },
    DirectoryRenamed {
        directory: VirtualDirectory,
        old_path: String,
    },
    /// A write stream was closed and the file's metadata updated.
    FileClosed { file: VirtualFile, created: bool },
    FileDeleted { files: Vec<VirtualFile> },
    FileRenamed { file: VirtualFile, old_path: String },
    /// A bulk copy finished.
    Copied(CopyCount),
}
