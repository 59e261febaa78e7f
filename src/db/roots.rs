use anyhow::Result;
use rusqlite::params;

use super::PhotoStore;

/// A configured root directory name and when it was last scanned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRoot {
    pub name: String,
    /// Epoch milliseconds, 0 if never scanned.
    pub last_scan: i64,
}

impl PhotoStore {
    pub fn scan_roots(&self) -> Result<Vec<ScanRoot>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT dir, last_scan FROM directories ORDER BY rowid")?;
        let roots = stmt
            .query_map([], |row| {
                Ok(ScanRoot {
                    name: row.get(0)?,
                    last_scan: row.get::<_, Option<i64>>(1)?.unwrap_or(0),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(roots)
    }

    /// Record a completed scan. Rows are keyed by root name, not by path.
    pub fn update_last_scan(&self, root_name: &str, timestamp: i64) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "UPDATE directories SET last_scan = ? WHERE dir = ?",
            params![timestamp, root_name],
        )?;
        Ok(())
    }
}
