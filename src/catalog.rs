//! Coordinates the photo store and the in-memory spatial index.
//!
//! A single lock guards the (store, index) pair. Scans, fills, queries and
//! single-photo additions each hold it for their whole body, so a query never
//! sees a half-filled index and a scan never deletes rows a fill is reading.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use tracing::{debug, info};

use crate::config::{Config, ScannerConfig};
use crate::db::PhotoStore;
use crate::diagnostics::{Diagnostics, TracingDiagnostics};
use crate::index::SpatialIndex;
use crate::photo::{BoundingBox, PhotoRecord};
use crate::scanner::{ExifExtractor, Indexer, MountPoints, PhotoExtractor, ScanSummary, StorageVolumes};

struct CatalogState {
    store: PhotoStore,
    /// `None` until the first fill.
    index: Option<SpatialIndex>,
}

pub struct Catalog {
    state: Mutex<CatalogState>,
    extractor: Box<dyn PhotoExtractor>,
    diagnostics: Box<dyn Diagnostics>,
    mounts: Box<dyn MountPoints>,
    scanner: ScannerConfig,
}

impl Catalog {
    /// Catalog with EXIF extraction, tracing diagnostics and the configured volumes.
    pub fn new(store: PhotoStore, config: &Config) -> Self {
        Self {
            state: Mutex::new(CatalogState { store, index: None }),
            extractor: Box::new(ExifExtractor),
            diagnostics: Box::new(TracingDiagnostics),
            mounts: Box::new(StorageVolumes::from_config(&config.volumes)),
            scanner: config.scanner.clone(),
        }
    }

    pub fn with_extractor(mut self, extractor: impl PhotoExtractor + 'static) -> Self {
        self.extractor = Box::new(extractor);
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: impl Diagnostics + 'static) -> Self {
        self.diagnostics = Box::new(diagnostics);
        self
    }

    pub fn with_mount_points(mut self, mounts: impl MountPoints + 'static) -> Self {
        self.mounts = Box::new(mounts);
        self
    }

    fn lock(&self) -> MutexGuard<'_, CatalogState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn indexer<'a>(&'a self, store: &'a PhotoStore) -> Indexer<'a> {
        Indexer::new(
            store,
            self.extractor.as_ref(),
            self.diagnostics.as_ref(),
            self.mounts.as_ref(),
            &self.scanner,
        )
    }

    /// Bring the store in line with the filesystem.
    ///
    /// The spatial index is left alone; call [`Catalog::fill`] afterwards to
    /// pick up the changes.
    pub fn create_or_update_index(&self) -> ScanSummary {
        let state = self.lock();
        self.indexer(&state.store).create_or_update_index()
    }

    /// Run [`Catalog::create_or_update_index`] on a background thread.
    pub fn spawn_scan(self: &Arc<Self>) -> std::io::Result<JoinHandle<ScanSummary>> {
        let catalog = Arc::clone(self);
        std::thread::Builder::new()
            .name("photomap-scan".to_string())
            .spawn(move || catalog.create_or_update_index())
    }

    /// Load every stored photo into `index`, or into a fresh index when `None`,
    /// and make it the catalog's index.
    ///
    /// If the store cannot be read the failure is reported and the index is
    /// installed with whatever it already held.
    pub fn fill(&self, index: Option<SpatialIndex>) {
        let mut state = self.lock();

        let photos = match state.store.all_photos() {
            Ok(photos) => photos,
            Err(e) => {
                self.diagnostics.report(&e, "Failed to read photos for the spatial index");
                state.index = Some(index.unwrap_or_default());
                return;
            }
        };
        info!("Loading {} photos into the spatial index", photos.len());

        let index = match index {
            Some(mut index) => {
                for photo in photos {
                    index.insert(photo);
                }
                index
            }
            None => SpatialIndex::bulk_load(photos),
        };
        state.index = Some(index);
    }

    /// Drop the in-memory index. Queries return nothing until the next fill.
    pub fn reset_index(&self) {
        self.lock().index = None;
    }

    pub fn is_filled(&self) -> bool {
        self.lock().index.is_some()
    }

    /// Photos inside `bbox`. Empty if the index has not been filled; this
    /// never fills implicitly.
    pub fn get_photos(&self, bbox: &BoundingBox) -> Vec<PhotoRecord> {
        let state = self.lock();
        match state.index {
            Some(ref index) => {
                let photos = index.query(bbox);
                debug!("Result count {}", photos.len());
                photos
            }
            None => Vec::new(),
        }
    }

    /// Index a single newly discovered file.
    ///
    /// A relative `file` is resolved against the current directory. The photo
    /// is stored and, if the spatial index has been filled, inserted there
    /// too. Returns `None` if the file has no usable location or could not be
    /// stored.
    pub fn add_photo(&self, file: &Path) -> Option<PhotoRecord> {
        let file = match std::path::absolute(file) {
            Ok(file) => file,
            Err(e) => {
                self.diagnostics.report(&anyhow::Error::new(e), "Failed to resolve photo path");
                return None;
            }
        };
        let dir = file.parent().unwrap_or_else(|| Path::new("/"));

        let mut state = self.lock();
        let previous = match file.file_name().and_then(|n| n.to_str()) {
            Some(name) if state.index.is_some() => state.store.find_photo(dir, name).ok().flatten(),
            _ => None,
        };

        let photo = match self.indexer(&state.store).add_photo(dir, &file) {
            Ok(Some(photo)) => photo,
            Ok(None) => return None,
            Err(e) => {
                self.diagnostics.report(&e, "Failed to store photo");
                return None;
            }
        };

        if let Some(ref mut index) = state.index {
            index.replace(previous.as_ref(), photo.clone());
        }
        Some(photo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::tests::{write_photo, FixedMounts, RecordingDiagnostics, TextExtractor};
    use std::fs;
    use std::path::PathBuf;
    use tempfile::{tempdir, TempDir};

    struct Fixture {
        tmp: TempDir,
        mount: PathBuf,
        catalog: Arc<Catalog>,
        diagnostics: Arc<RecordingDiagnostics>,
    }

    fn fixture() -> Fixture {
        fixture_in(tempdir().unwrap())
    }

    fn fixture_in(tmp: TempDir) -> Fixture {
        let mount = tmp.path().join("sdcard");
        fs::create_dir_all(&mount).unwrap();

        let config = Config::default();
        let store = PhotoStore::open(&tmp.path().join("index.db"), &config.scanner.roots).unwrap();
        let diagnostics = Arc::new(RecordingDiagnostics::default());
        let catalog = Catalog::new(store, &config)
            .with_extractor(TextExtractor)
            .with_diagnostics(Arc::clone(&diagnostics))
            .with_mount_points(FixedMounts(vec![mount.clone()]));

        Fixture {
            tmp,
            mount,
            catalog: Arc::new(catalog),
            diagnostics,
        }
    }

    fn world() -> BoundingBox {
        BoundingBox::from_degrees(-90.0, -180.0, 90.0, 180.0).unwrap()
    }

    fn store(fx: &Fixture) -> PhotoStore {
        fx.catalog.lock().store.clone()
    }

    #[test]
    fn test_empty_store_fill_allocates_empty_index() {
        let fx = fixture();
        assert!(!fx.catalog.is_filled());

        fx.catalog.fill(None);

        assert!(fx.catalog.is_filled());
        assert!(fx.catalog.get_photos(&world()).is_empty());
    }

    #[test]
    fn test_get_photos_before_fill_is_empty() {
        let fx = fixture();
        store(&fx)
            .upsert_photo(&PhotoRecord::from_degrees(10.0, 20.0, None, "/p", "a.jpg").unwrap())
            .unwrap();

        assert!(fx.catalog.get_photos(&world()).is_empty());
        assert!(!fx.catalog.is_filled());
    }

    #[test]
    fn test_fill_then_query_single_record() {
        let fx = fixture();
        let photo = PhotoRecord::from_degrees(10.0, 20.0, None, "/p", "a.jpg").unwrap();
        store(&fx).upsert_photo(&photo).unwrap();

        fx.catalog.fill(None);

        let bbox = BoundingBox::from_degrees(9.0, 19.0, 11.0, 21.0).unwrap();
        let result = fx.catalog.get_photos(&bbox);
        assert_eq!(result, vec![photo]);
        assert_eq!(result[0].direction(), None);
    }

    #[test]
    fn test_fill_matches_store_filter() {
        let fx = fixture();
        let store = store(&fx);
        let coords = [(0.0, 0.0), (1.0, 1.0), (1.0, 2.0), (2.0, 1.0), (-1.0, 1.5), (1.5, 1.5)];
        for (i, (lat, lon)) in coords.iter().enumerate() {
            store
                .upsert_photo(&PhotoRecord::from_degrees(*lat, *lon, None, "/p", format!("{}.jpg", i)).unwrap())
                .unwrap();
        }

        fx.catalog.fill(None);

        let bbox = BoundingBox::from_degrees(1.0, 1.0, 2.0, 2.0).unwrap();
        let mut expected: Vec<String> = store
            .all_photos()
            .unwrap()
            .into_iter()
            .filter(|p| bbox.contains(p.lat(), p.lon()))
            .map(|p| p.name().to_string())
            .collect();
        let mut actual: Vec<String> = fx
            .catalog
            .get_photos(&bbox)
            .into_iter()
            .map(|p| p.name().to_string())
            .collect();
        expected.sort();
        actual.sort();
        assert_eq!(actual, vec!["1.jpg", "2.jpg", "3.jpg", "5.jpg"]);
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_fill_into_supplied_index() {
        let fx = fixture();
        store(&fx)
            .upsert_photo(&PhotoRecord::from_degrees(10.0, 20.0, None, "/p", "stored.jpg").unwrap())
            .unwrap();
        let mut index = SpatialIndex::new();
        index.insert(PhotoRecord::from_degrees(-10.0, -20.0, None, "/q", "preloaded.jpg").unwrap());

        fx.catalog.fill(Some(index));

        assert_eq!(fx.catalog.get_photos(&world()).len(), 2);
    }

    #[test]
    fn test_fill_with_none_resets_index() {
        let fx = fixture();
        fx.catalog.fill(None);
        let mut index = SpatialIndex::new();
        index.insert(PhotoRecord::from_degrees(-10.0, -20.0, None, "/q", "preloaded.jpg").unwrap());
        fx.catalog.fill(Some(index));
        assert_eq!(fx.catalog.get_photos(&world()).len(), 1);

        fx.catalog.fill(None);
        assert!(fx.catalog.get_photos(&world()).is_empty());
    }

    #[test]
    fn test_add_photo_is_visible_without_refill() {
        let fx = fixture();
        fx.catalog.fill(None);
        let file = fx.mount.join("DCIM/new.jpg");
        write_photo(&file, 45.0, 7.0);

        let added = fx.catalog.add_photo(&file).unwrap();
        assert_eq!(added.directory(), fx.mount.join("DCIM"));

        let bbox = BoundingBox::from_degrees(44.0, 6.0, 46.0, 8.0).unwrap();
        assert_eq!(fx.catalog.get_photos(&bbox), vec![added]);
        assert_eq!(store(&fx).photo_count().unwrap(), 1);
    }

    #[test]
    fn test_add_photo_twice_keeps_one_entry() {
        let fx = fixture();
        fx.catalog.fill(None);
        let file = fx.mount.join("DCIM/new.jpg");
        write_photo(&file, 45.0, 7.0);

        fx.catalog.add_photo(&file).unwrap();
        fx.catalog.add_photo(&file).unwrap();

        assert_eq!(fx.catalog.get_photos(&world()).len(), 1);
        assert_eq!(store(&fx).photo_count().unwrap(), 1);
    }

    #[test]
    fn test_add_photo_again_moves_indexed_location() {
        let fx = fixture();
        fx.catalog.fill(None);
        let file = fx.mount.join("DCIM/new.jpg");
        write_photo(&file, 45.0, 7.0);
        fx.catalog.add_photo(&file).unwrap();

        write_photo(&file, -45.0, -7.0);
        fx.catalog.add_photo(&file).unwrap();

        let old = BoundingBox::from_degrees(44.0, 6.0, 46.0, 8.0).unwrap();
        assert!(fx.catalog.get_photos(&old).is_empty());
        assert_eq!(fx.catalog.get_photos(&world()).len(), 1);
    }

    #[test]
    fn test_add_photo_with_relative_path_is_reconciled_by_scan() {
        let cwd = std::env::current_dir().unwrap();
        let fx = fixture_in(tempfile::tempdir_in(&cwd).unwrap());
        fx.catalog.fill(None);
        let file = fx.mount.join("DCIM/a.jpg");
        write_photo(&file, 10.0, 20.0);
        let relative = file.strip_prefix(&cwd).unwrap();
        assert!(relative.is_relative());

        let added = fx.catalog.add_photo(relative).unwrap();
        assert_eq!(added.directory(), fx.mount.join("DCIM"));

        fx.catalog.create_or_update_index();
        fx.catalog.fill(None);
        assert_eq!(store(&fx).photo_count().unwrap(), 1);
        assert_eq!(fx.catalog.get_photos(&world()).len(), 1);

        fs::remove_dir_all(fx.mount.join("DCIM")).unwrap();
        fx.catalog.create_or_update_index();
        assert_eq!(store(&fx).photo_count().unwrap(), 0);
    }

    #[test]
    fn test_add_photo_before_fill_only_stores() {
        let fx = fixture();
        let file = fx.mount.join("DCIM/new.jpg");
        write_photo(&file, 45.0, 7.0);

        assert!(fx.catalog.add_photo(&file).is_some());
        assert!(!fx.catalog.is_filled());

        fx.catalog.fill(None);
        assert_eq!(fx.catalog.get_photos(&world()).len(), 1);
    }

    #[test]
    fn test_add_photo_without_location() {
        let fx = fixture();
        fx.catalog.fill(None);
        let file = fx.mount.join("DCIM/broken.jpg");
        fs::create_dir_all(file.parent().unwrap()).unwrap();
        fs::write(&file, "north,east").unwrap();

        assert!(fx.catalog.add_photo(&file).is_none());
        assert!(fx.catalog.get_photos(&world()).is_empty());
        assert!(fx.diagnostics.messages.lock().unwrap().is_empty());
    }

    #[test]
    fn test_scan_then_fill() {
        let fx = fixture();
        write_photo(&fx.mount.join("DCIM/a.jpg"), 10.0, 20.0);
        write_photo(&fx.mount.join("osmtracker/b.jpg"), -33.9, 151.2);

        let summary = fx.catalog.create_or_update_index();
        assert_eq!(summary.photos_added, 2);
        // Scanning does not touch the in-memory index
        assert!(!fx.catalog.is_filled());

        fx.catalog.fill(None);
        let bbox = BoundingBox::from_degrees(-34.0, 151.0, -33.0, 152.0).unwrap();
        let result = fx.catalog.get_photos(&bbox);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].name(), "b.jpg");
    }

    #[test]
    fn test_deleted_directory_disappears_after_rescan_and_fill() {
        let fx = fixture();
        write_photo(&fx.mount.join("DCIM/Trip/a.jpg"), 10.0, 20.0);
        fx.catalog.create_or_update_index();
        fx.catalog.fill(None);
        assert_eq!(fx.catalog.get_photos(&world()).len(), 1);

        fs::remove_dir_all(fx.mount.join("DCIM/Trip")).unwrap();
        fx.catalog.create_or_update_index();
        fx.catalog.fill(None);

        assert!(fx.catalog.get_photos(&world()).is_empty());
    }

    #[test]
    fn test_spawn_scan_runs_in_background() {
        let fx = fixture();
        write_photo(&fx.mount.join("Vespucci/a.jpg"), 10.0, 20.0);

        let handle = fx.catalog.spawn_scan().unwrap();
        let summary = handle.join().unwrap();

        assert_eq!(summary.photos_added, 1);
        fx.catalog.fill(None);
        assert_eq!(fx.catalog.get_photos(&world()).len(), 1);
    }

    #[test]
    fn test_fill_reports_store_failure() {
        let fx = fixture();
        rusqlite::Connection::open(fx.tmp.path().join("index.db"))
            .unwrap()
            .execute_batch("DROP TABLE photos;")
            .unwrap();

        fx.catalog.fill(None);

        assert!(fx.catalog.is_filled());
        assert!(fx.catalog.get_photos(&world()).is_empty());
        assert_eq!(fx.diagnostics.messages.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_reset_index() {
        let fx = fixture();
        fx.catalog.fill(None);
        fx.catalog.reset_index();
        assert!(!fx.catalog.is_filled());
    }
}
