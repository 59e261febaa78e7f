//! In-memory R-tree over photo locations.
//!
//! The tree is never persisted. It is rebuilt from the database by
//! [`crate::catalog::Catalog::fill`] and kept current afterwards by single
//! inserts.

use rstar::{RTree, RTreeObject, AABB};

use crate::photo::{BoundingBox, PhotoRecord};

/// A photo stored as a point in (lat, lon) space.
///
/// Scaled coordinates fit exactly into an `f64`, which keeps the tree's
/// area computations clear of integer overflow.
#[derive(Debug, Clone, PartialEq)]
struct IndexedPhoto(PhotoRecord);

impl RTreeObject for IndexedPhoto {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.0.lat() as f64, self.0.lon() as f64])
    }
}

#[derive(Default)]
pub struct SpatialIndex {
    tree: RTree<IndexedPhoto>,
}

impl std::fmt::Debug for SpatialIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpatialIndex").field("len", &self.len()).finish()
    }
}

impl SpatialIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a balanced tree from a complete set of records in one pass.
    pub fn bulk_load(photos: Vec<PhotoRecord>) -> Self {
        Self {
            tree: RTree::bulk_load(photos.into_iter().map(IndexedPhoto).collect()),
        }
    }

    pub fn insert(&mut self, photo: PhotoRecord) {
        self.tree.insert(IndexedPhoto(photo));
    }

    /// Insert `photo`, first dropping `previous`, the entry last indexed for
    /// the same file.
    ///
    /// Only the point `previous` sits on is searched, so callers look it up
    /// in the store rather than in the tree.
    pub fn replace(&mut self, previous: Option<&PhotoRecord>, photo: PhotoRecord) {
        if let Some(previous) = previous {
            let point = AABB::from_point([previous.lat() as f64, previous.lon() as f64]);
            let stale: Vec<IndexedPhoto> = self
                .tree
                .locate_in_envelope(&point)
                .filter(|entry| entry.0.same_file(&photo))
                .cloned()
                .collect();
            for entry in &stale {
                self.tree.remove(entry);
            }
        }
        self.insert(photo);
    }

    /// All photos located inside `bbox`, boundary included, in no particular order.
    pub fn query(&self, bbox: &BoundingBox) -> Vec<PhotoRecord> {
        let envelope = AABB::from_corners(
            [bbox.min_lat as f64, bbox.min_lon as f64],
            [bbox.max_lat as f64, bbox.max_lon as f64],
        );
        self.tree
            .locate_in_envelope(&envelope)
            .map(|entry| entry.0.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
