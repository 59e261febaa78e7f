use anyhow::Result;
use rusqlite::{params, OptionalExtension};
use std::path::{Path, PathBuf};
use tracing::warn;

use super::{descendants_prefix, path_key, PhotoStore};
use crate::photo::PhotoRecord;

impl PhotoStore {
    /// Store a photo, replacing any row already recorded for the same file.
    pub fn upsert_photo(&self, photo: &PhotoRecord) -> Result<()> {
        let dir = path_key(photo.directory())?;
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM photos WHERE dir = ? AND name = ?",
            params![dir, photo.name()],
        )?;
        tx.execute(
            "INSERT INTO photos (lat, lon, direction, dir, name) VALUES (?, ?, ?, ?, ?)",
            params![photo.lat(), photo.lon(), photo.direction(), dir, photo.name()],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Remove rows for `path` itself and every directory below it.
    pub fn delete_photos_under_path(&self, path: &Path) -> Result<usize> {
        let key = path_key(path)?;
        let prefix = descendants_prefix(key);
        let conn = self.connect()?;
        let deleted = conn.execute(
            "DELETE FROM photos WHERE dir = ?1 OR substr(dir, 1, ?2) = ?3",
            params![key, prefix.chars().count() as i64, prefix],
        )?;
        Ok(deleted)
    }

    /// Remove rows for files directly inside `path`.
    pub fn delete_photos_exact_path(&self, path: &Path) -> Result<usize> {
        let key = path_key(path)?;
        let conn = self.connect()?;
        let deleted = conn.execute("DELETE FROM photos WHERE dir = ?", params![key])?;
        Ok(deleted)
    }

    /// Directories with at least one photo row at or below `path`.
    pub fn list_distinct_directories_under(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let key = path_key(path)?;
        let prefix = descendants_prefix(key);
        let conn = self.connect()?;
        let mut stmt =
            conn.prepare("SELECT DISTINCT dir FROM photos WHERE dir = ?1 OR substr(dir, 1, ?2) = ?3")?;
        let dirs = stmt
            .query_map(params![key, prefix.chars().count() as i64, prefix], |row| {
                row.get::<_, String>(0)
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(dirs.into_iter().map(PathBuf::from).collect())
    }

    /// The stored row for the file `name` inside `directory`, if any.
    pub fn find_photo(&self, directory: &Path, name: &str) -> Result<Option<PhotoRecord>> {
        let dir = path_key(directory)?;
        let conn = self.connect()?;
        let row = conn
            .query_row(
                "SELECT lat, lon, direction FROM photos WHERE dir = ? AND name = ? LIMIT 1",
                params![dir, name],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, Option<i64>>(2)?,
                    ))
                },
            )
            .optional()?;

        Ok(row.and_then(|(lat, lon, direction)| {
            PhotoRecord::new(lat, lon, direction, directory, name).ok()
        }))
    }

    /// Every stored photo. Rows that no longer validate are skipped.
    pub fn all_photos(&self) -> Result<Vec<PhotoRecord>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT lat, lon, direction, dir, name FROM photos")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, Option<i64>>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let photos = rows
            .into_iter()
            .filter_map(|(lat, lon, direction, dir, name)| {
                match PhotoRecord::new(lat, lon, direction, &dir, &name) {
                    Ok(photo) => Some(photo),
                    Err(e) => {
                        warn!("Skipping invalid row for {}/{}: {}", dir, name, e);
                        None
                    }
                }
            })
            .collect();
        Ok(photos)
    }

    pub fn photo_count(&self) -> Result<i64> {
        let conn = self.connect()?;
        let count = conn.query_row("SELECT COUNT(*) FROM photos", [], |row| row.get(0))?;
        Ok(count)
    }
}
