//! Incremental indexing of photo directories.
//!
//! A directory is reindexed only when its modification time is at or after
//! the last recorded scan of its root. A directory's mtime changes when its
//! immediate entry list changes, so unchanged directories keep their rows
//! without any per-file bookkeeping.

pub mod metadata;
pub mod volumes;

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::ffi::OsStr;
use std::path::Path;
use tracing::{debug, info, trace, warn};
use walkdir::{DirEntry, WalkDir};

use crate::config::ScannerConfig;
use crate::db::{PhotoStore, ScanRoot};
use crate::diagnostics::Diagnostics;
use crate::photo::PhotoRecord;

pub use metadata::{ExifExtractor, ExtractError, PhotoExtractor};
pub use volumes::{MountPoints, StorageVolumes};

/// Counters for one indexing pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// (root, mount point) pairs that were scanned and had their timestamp advanced.
    pub roots_completed: usize,
    /// Pairs whose root directory was absent from the mount point.
    pub roots_missing: usize,
    pub directories_reindexed: usize,
    pub directories_removed: usize,
    pub directories_opted_out: usize,
    /// Directories left out because their path is not valid UTF-8.
    pub directories_skipped: usize,
    pub photos_added: usize,
    /// Store failures reported to diagnostics.
    pub failures: usize,
}

/// What happened when a single directory was visited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanFlow {
    Descended,
    OptedOut,
    Unreadable,
    NotUnicode,
}

/// Per (root, mount point) state.
struct RootPass<'s> {
    last_scan: i64,
    failed: bool,
    summary: &'s mut ScanSummary,
}

/// Brings the store in line with the filesystem.
///
/// Borrows everything it needs; [`crate::catalog::Catalog`] constructs one
/// while holding its lock.
pub struct Indexer<'a> {
    store: &'a PhotoStore,
    extractor: &'a dyn PhotoExtractor,
    diagnostics: &'a dyn Diagnostics,
    mounts: &'a dyn MountPoints,
    config: &'a ScannerConfig,
}

impl<'a> Indexer<'a> {
    pub fn new(
        store: &'a PhotoStore,
        extractor: &'a dyn PhotoExtractor,
        diagnostics: &'a dyn Diagnostics,
        mounts: &'a dyn MountPoints,
        config: &'a ScannerConfig,
    ) -> Self {
        Self {
            store,
            extractor,
            diagnostics,
            mounts,
            config,
        }
    }

    /// Scan every root under every mount point.
    ///
    /// Never fails: store errors are reported and the affected root keeps its
    /// old timestamp so the next pass retries it.
    pub fn create_or_update_index(&self) -> ScanSummary {
        let mut summary = ScanSummary::default();
        info!("Starting photo index scan");

        let roots = match self.store.scan_roots() {
            Ok(roots) => roots,
            Err(e) => {
                self.diagnostics.report(&e, "Failed to read scan roots");
                summary.failures += 1;
                return summary;
            }
        };
        let mounts = self.mounts.mount_points();

        // Timestamps are read once per pass, so a root updated under one mount
        // point is still compared against the old time under the next one
        for root in &roots {
            debug!("Root {} last scanned at {}", root.name, root.last_scan);
            for mount in &mounts {
                self.scan_root(root, mount, &mut summary);
            }
        }

        info!(
            "Scan finished: {} roots, {} directories reindexed, {} photos added, {} failures",
            summary.roots_completed, summary.directories_reindexed, summary.photos_added, summary.failures
        );
        summary
    }

    fn scan_root(&self, root: &ScanRoot, mount: &Path, summary: &mut ScanSummary) {
        let candidate = mount.join(&root.name);
        if candidate.to_str().is_none() {
            warn!("Skipping {:?}, path is not valid UTF-8", candidate);
            summary.directories_skipped += 1;
            return;
        }
        let mut pass = RootPass {
            last_scan: root.last_scan,
            failed: false,
            summary,
        };

        if !candidate.is_dir() {
            debug!("Directory {:?} doesn't exist", candidate);
            pass.summary.roots_missing += 1;
            self.checked(
                self.store.delete_photos_under_path(&candidate),
                "Failed to remove photos of missing root",
                &mut pass,
            );
            return;
        }

        debug!("Scanning directory {:?}", candidate);
        self.remove_vanished_directories(&candidate, &mut pass);
        self.scan_dir(&candidate, &mut pass);

        if pass.failed {
            warn!("Not advancing last scan of {:?} after store failures", candidate);
            return;
        }

        // Keyed by the directory's own name, shared by all mount points
        let key = candidate
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| root.name.clone());
        let now = Utc::now().timestamp_millis();
        debug!("Updating last scan for {} to {}", key, now);
        if self
            .checked(self.store.update_last_scan(&key, now), "Failed to update last scan", &mut pass)
            .is_some()
        {
            pass.summary.roots_completed += 1;
        }
    }

    /// Drop rows for indexed directories below `root` that no longer exist.
    fn remove_vanished_directories(&self, root: &Path, pass: &mut RootPass) {
        let dirs = match self.checked(
            self.store.list_distinct_directories_under(root),
            "Failed to list indexed directories",
            pass,
        ) {
            Some(dirs) => dirs,
            None => return,
        };

        for dir in dirs.iter().filter(|d| !d.exists()) {
            debug!("Deleting entries for gone dir {:?}", dir);
            if self
                .checked(
                    self.store.delete_photos_exact_path(dir),
                    "Failed to remove photos of deleted directory",
                    pass,
                )
                .is_some()
            {
                pass.summary.directories_removed += 1;
            }
        }
    }

    /// Visit `dir` and everything below it.
    ///
    /// Each level owns only the rows of its immediate files, so a dirty
    /// directory never touches rows of its subdirectories.
    fn scan_dir(&self, dir: &Path, pass: &mut RootPass) -> ScanFlow {
        // Rows are keyed by the path text, which must round-trip to the same directory
        if dir.to_str().is_none() {
            warn!("Skipping {:?}, path is not valid UTF-8", dir);
            pass.summary.directories_skipped += 1;
            return ScanFlow::NotUnicode;
        }

        let dirty = match modified_millis(dir) {
            Some(mtime) => mtime >= pass.last_scan,
            None => true,
        };

        if dirty {
            trace!("Deleting refs of {:?} for reindex", dir);
            self.checked(
                self.store.delete_photos_exact_path(dir),
                "Failed to clear directory for reindex",
                pass,
            );
            pass.summary.directories_reindexed += 1;
        }

        let entries = match list_entries(dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!("Cannot list {:?}: {}", dir, e);
                return ScanFlow::Unreadable;
            }
        };

        let marker = OsStr::new(&self.config.opt_out_marker);
        if entries.iter().any(|e| e.file_name() == marker) {
            debug!("Skipping {:?}, found {}", dir, self.config.opt_out_marker);
            pass.summary.directories_opted_out += 1;
            return ScanFlow::OptedOut;
        }

        for entry in &entries {
            let path = entry.path();
            if entry.file_type().is_dir() {
                self.scan_dir(path, pass);
            } else if dirty && self.config.is_image(path) {
                match self.add_photo(dir, path) {
                    Ok(Some(_)) => pass.summary.photos_added += 1,
                    Ok(None) => {}
                    Err(e) => {
                        self.diagnostics.report(&e, "Failed to store photo");
                        pass.failed = true;
                        pass.summary.failures += 1;
                    }
                }
            }
        }

        ScanFlow::Descended
    }

    /// Extract a photo and store it.
    ///
    /// Returns `Ok(None)` when the file has no usable location, and an error
    /// only when the store rejected the record.
    pub fn add_photo(&self, dir: &Path, file: &Path) -> Result<Option<PhotoRecord>> {
        if dir.to_str().is_none() || file.file_name().and_then(OsStr::to_str).is_none() {
            debug!("Skipping {:?}, path is not valid UTF-8", file);
            return Ok(None);
        }

        let photo = match self.extractor.extract(dir, file) {
            Ok(photo) => photo,
            Err(e) if e.is_expected() => {
                trace!("Skipping {:?}: {}", file, e);
                return Ok(None);
            }
            Err(e) => {
                self.diagnostics.report(&anyhow::Error::new(e), "Failed to read photo");
                return Ok(None);
            }
        };

        self.store.upsert_photo(&photo)?;
        Ok(Some(photo))
    }

    fn checked<T>(&self, result: Result<T>, message: &str, pass: &mut RootPass) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                self.diagnostics.report(&e, message);
                pass.failed = true;
                pass.summary.failures += 1;
                None
            }
        }
    }
}

/// Immediate entries of `dir`, sorted by name. Symlinks are not followed.
fn list_entries(dir: &Path) -> walkdir::Result<Vec<DirEntry>> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .collect()
}

fn modified_millis(path: &Path) -> Option<i64> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    let modified: DateTime<Utc> = modified.into();
    Some(modified.timestamp_millis())
}
