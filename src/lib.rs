//! Catalogue of geo-tagged photos found on local storage.
//!
//! Photo locations are kept in a SQLite database that is updated
//! incrementally by rescanning only directories that changed since the last
//! pass. Bounding box queries are answered from an in-memory R-tree filled
//! from that database.

pub mod catalog;
pub mod config;
pub mod db;
pub mod diagnostics;
pub mod index;
pub mod logging;
pub mod photo;
pub mod scanner;

pub use catalog::Catalog;
pub use config::Config;
pub use db::PhotoStore;
pub use index::SpatialIndex;
pub use photo::{BoundingBox, PhotoRecord};
pub use scanner::ScanSummary;
