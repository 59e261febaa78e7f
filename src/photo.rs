//! Geo-tagged photo records and the bounding boxes used to query them.
//!
//! Coordinates are stored as integers scaled by [`COORDINATE_SCALE`], which
//! is what the database persists and what the spatial index is keyed on.

use serde::Serialize;
use std::path::{Path, PathBuf};

/// Degrees are multiplied by this factor before being stored.
pub const COORDINATE_SCALE: f64 = 1e7;

const MAX_LAT: i32 = 90 * 10_000_000;
const MAX_LON: i32 = 180 * 10_000_000;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PhotoError {
    #[error("latitude {0} is outside of -90..=90 degrees")]
    LatitudeOutOfRange(i64),

    #[error("longitude {0} is outside of -180..=180 degrees")]
    LongitudeOutOfRange(i64),

    #[error("coordinate is not a finite number")]
    NotFinite,

    #[error("bounding box minimum exceeds its maximum")]
    InvertedBoundingBox,
}

/// Convert degrees to the scaled integer representation.
pub fn scale_degrees(degrees: f64) -> Result<i64, PhotoError> {
    if !degrees.is_finite() {
        return Err(PhotoError::NotFinite);
    }
    Ok((degrees * COORDINATE_SCALE).round() as i64)
}

fn check_lat(lat: i64) -> Result<i32, PhotoError> {
    if !(-(MAX_LAT as i64)..=MAX_LAT as i64).contains(&lat) {
        return Err(PhotoError::LatitudeOutOfRange(lat));
    }
    Ok(lat as i32)
}

fn check_lon(lon: i64) -> Result<i32, PhotoError> {
    if !(-(MAX_LON as i64)..=MAX_LON as i64).contains(&lon) {
        return Err(PhotoError::LongitudeOutOfRange(lon));
    }
    Ok(lon as i32)
}

/// Location of a single photo on disk.
///
/// Two records describe the same photo when their directory and file name
/// match, see [`PhotoRecord::same_file`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhotoRecord {
    lat: i32,
    lon: i32,
    direction: Option<i32>,
    directory: PathBuf,
    name: String,
}

impl PhotoRecord {
    /// Build a record from scaled coordinates.
    ///
    /// The direction is normalised into `0..360`.
    pub fn new(
        lat: i64,
        lon: i64,
        direction: Option<i64>,
        directory: impl Into<PathBuf>,
        name: impl Into<String>,
    ) -> Result<Self, PhotoError> {
        Ok(Self {
            lat: check_lat(lat)?,
            lon: check_lon(lon)?,
            direction: direction.map(|d| d.rem_euclid(360) as i32),
            directory: directory.into(),
            name: name.into(),
        })
    }

    pub fn from_degrees(
        lat: f64,
        lon: f64,
        direction: Option<f64>,
        directory: impl Into<PathBuf>,
        name: impl Into<String>,
    ) -> Result<Self, PhotoError> {
        let direction = match direction {
            Some(d) if !d.is_finite() => return Err(PhotoError::NotFinite),
            Some(d) => Some(d.round() as i64),
            None => None,
        };
        Self::new(
            scale_degrees(lat)?,
            scale_degrees(lon)?,
            direction,
            directory,
            name,
        )
    }

    pub fn lat(&self) -> i32 {
        self.lat
    }

    pub fn lon(&self) -> i32 {
        self.lon
    }

    pub fn lat_degrees(&self) -> f64 {
        self.lat as f64 / COORDINATE_SCALE
    }

    pub fn lon_degrees(&self) -> f64 {
        self.lon as f64 / COORDINATE_SCALE
    }

    pub fn direction(&self) -> Option<i32> {
        self.direction
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Full path of the photo file.
    pub fn path(&self) -> PathBuf {
        self.directory.join(&self.name)
    }

    pub fn same_file(&self, other: &PhotoRecord) -> bool {
        self.directory == other.directory && self.name == other.name
    }
}

/// Axis-aligned query rectangle in scaled coordinates. Bounds are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BoundingBox {
    pub min_lat: i32,
    pub min_lon: i32,
    pub max_lat: i32,
    pub max_lon: i32,
}

impl BoundingBox {
    pub fn new(min_lat: i64, min_lon: i64, max_lat: i64, max_lon: i64) -> Result<Self, PhotoError> {
        let bbox = Self {
            min_lat: check_lat(min_lat)?,
            min_lon: check_lon(min_lon)?,
            max_lat: check_lat(max_lat)?,
            max_lon: check_lon(max_lon)?,
        };
        if bbox.min_lat > bbox.max_lat || bbox.min_lon > bbox.max_lon {
            return Err(PhotoError::InvertedBoundingBox);
        }
        Ok(bbox)
    }

    pub fn from_degrees(min_lat: f64, min_lon: f64, max_lat: f64, max_lon: f64) -> Result<Self, PhotoError> {
        Self::new(
            scale_degrees(min_lat)?,
            scale_degrees(min_lon)?,
            scale_degrees(max_lat)?,
            scale_degrees(max_lon)?,
        )
    }

    pub fn contains(&self, lat: i32, lon: i32) -> bool {
        (self.min_lat..=self.max_lat).contains(&lat) && (self.min_lon..=self.max_lon).contains(&lon)
    }
}
