//! strata-vfs: an overlay virtual filesystem.
//!
//! Physical sources (OS directories, single files, ram disks) are mounted at
//! virtual locations and merged into one case-insensitive tree. When two
//! mounts provide the same path the later one wins; unmounting gives the
//! path back to whatever is underneath.
//!
//! ```text
//! FileSystem
//!   ├── providers: folder (default), ramdisk:<name>, ...
//!   ├── mounts:    [MountPoint; registration order]
//!   └── tree:      / ── docs/ ── readme.txt   (owner per node)
//!
//! FileSystemWriter ── WriteArea (folder | ram disk), mounted at /
//! ```
//!
//! Lookups return snapshots ([`VirtualDirectory`], [`VirtualFile`]) that
//! stay valid after the tree changes. Writers mutate the tree and their
//! backing store together and broadcast [`WriterEvent`]s.

mod error;
mod filesystem;
mod mount;
mod node;
mod tree;

pub mod config;
pub mod events;
pub mod paths;
pub mod provider;
pub mod writer;

pub use config::{ConfigError, StrataConfig};
pub use error::{VfsError, VfsResult};
pub use events::WriterEvent;
pub use filesystem::FileSystem;
pub use mount::MountPoint;
pub use node::{DirId, FileId, VirtualDirectory, VirtualFile};
pub use provider::{FolderProvider, PhysicalFileInfo, Provider, RamDisk, RamDiskProvider};
pub use writer::{CopyCount, CopyProgress, FileSystemWriter, OpenMode, WriteStream};
