//! Mount points: a provider attached at a virtual location.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::paths::fold_case;
use crate::provider::Provider;

/// A physical source attached to the virtual tree.
///
/// Two mount points are equal when they share provider name, physical path,
/// mount location and fake flag, all compared case-insensitively.
#[derive(Clone)]
pub struct MountPoint {
    provider: Arc<dyn Provider>,
    physical_path: String,
    mount_location: String,
    is_fake_mount: bool,
}

impl MountPoint {
    /// Create a mount point. `mount_location` should already be a normalized
    /// virtual directory.
    pub fn new(
        provider: Arc<dyn Provider>,
        physical_path: impl Into<String>,
        mount_location: impl Into<String>,
        is_fake_mount: bool,
    ) -> Self {
        Self {
            provider,
            physical_path: physical_path.into(),
            mount_location: mount_location.into(),
            is_fake_mount,
        }
    }

    /// The provider that reads this source.
    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    /// The physical source path (directory, packed file, or fake location).
    pub fn physical_path(&self) -> &str {
        &self.physical_path
    }

    /// The virtual directory this source is attached at.
    pub fn mount_location(&self) -> &str {
        &self.mount_location
    }

    /// True for provider-defined locations that are not OS paths.
    pub fn is_fake_mount(&self) -> bool {
        self.is_fake_mount
    }

    fn key(&self) -> (String, String, String, bool) {
        (
            fold_case(self.provider.name()),
            fold_case(&self.physical_path),
            fold_case(&self.mount_location),
            self.is_fake_mount,
        )
    }
}

impl PartialEq for MountPoint {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for MountPoint {}

impl Hash for MountPoint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl fmt::Debug for MountPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountPoint")
            .field("provider", &self.provider.name())
            .field("physical_path", &self.physical_path)
            .field("mount_location", &self.mount_location)
            .field("is_fake_mount", &self.is_fake_mount)
            .finish()
    }
}

impl fmt::Display for MountPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} [{}]",
            self.physical_path,
            self.mount_location,
            self.provider.name()
        )
    }
}
