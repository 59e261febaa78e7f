use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::VolumeConfig;

/// Enumerates the storage volumes visible right now.
pub trait MountPoints: Send + Sync {
    fn mount_points(&self) -> Vec<PathBuf>;
}

/// Primary storage, its external card directory, and every volume mounted
/// directly under the storage root.
#[derive(Debug, Clone)]
pub struct StorageVolumes {
    primary: PathBuf,
    storage_root: PathBuf,
    external_card: String,
}

impl StorageVolumes {
    pub fn new(primary: impl Into<PathBuf>, storage_root: impl Into<PathBuf>, external_card: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            storage_root: storage_root.into(),
            external_card: external_card.into(),
        }
    }

    pub fn from_config(config: &VolumeConfig) -> Self {
        Self::new(&config.primary, &config.storage_root, &config.external_card)
    }
}

impl MountPoints for StorageVolumes {
    fn mount_points(&self) -> Vec<PathBuf> {
        let mut mounts = vec![self.primary.clone(), self.primary.join(&self.external_card)];

        let entries = match std::fs::read_dir(&self.storage_root) {
            Ok(e) => e,
            Err(_) => return mounts,
        };

        let mut volumes: Vec<PathBuf> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.is_dir() && !same_path(path, &self.primary))
            .collect();
        volumes.sort();

        for volume in volumes {
            debug!("Adding mount point {:?}", volume);
            mounts.push(volume);
        }
        mounts
    }
}

fn same_path(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
