//! Durable photo catalogue backed by SQLite.
//!
//! Every operation opens its own connection and closes it on return, so the
//! database file is never held open between calls.

mod photos;
mod roots;
mod schema;

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use roots::ScanRoot;
pub use schema::SCHEMA_VERSION;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct PhotoStore {
    path: PathBuf,
}

impl PhotoStore {
    /// Open the store at `path`, creating or upgrading the schema as needed.
    ///
    /// `roots` seeds the scan root table of a newly created database and is
    /// ignored for an existing one.
    pub fn open(path: &Path, roots: &[String]) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {:?}", parent))?;
            }
        }
        let store = Self {
            path: path.to_path_buf(),
        };
        let mut conn = store.connect()?;
        schema::initialize(&mut conn, roots)?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)
            .with_context(|| format!("Failed to open database {:?}", self.path))?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }
}

/// Directory paths are stored as text, so only UTF-8 paths can be keyed.
fn path_key(path: &Path) -> Result<&str> {
    path.to_str()
        .with_context(|| format!("Path {:?} is not valid UTF-8", path))
}

/// Prefix shared by every strict descendant of `key`.
fn descendants_prefix(key: &str) -> String {
    if key.ends_with('/') {
        key.to_string()
    } else {
        format!("{}/", key)
    }
}
