use anyhow::{bail, Result};
use rusqlite::{params, Connection};
use tracing::{debug, info};

/// Current on-disk schema version, stored in `PRAGMA user_version`.
pub const SCHEMA_VERSION: i64 = 3;

pub const SCHEMA: &str = r#"
-- Photo locations, one row per indexed file
CREATE TABLE IF NOT EXISTS photos (
    lat INTEGER,
    lon INTEGER,
    direction INTEGER DEFAULT NULL,
    dir TEXT,
    name TEXT
);

-- Legacy range indexes; bounding box queries go through the in-memory R-tree
CREATE INDEX IF NOT EXISTS latidx ON photos (lat);
CREATE INDEX IF NOT EXISTS lonidx ON photos (lon);

-- Scan roots keyed by root name, last_scan in epoch milliseconds
CREATE TABLE IF NOT EXISTS directories (
    dir TEXT,
    last_scan INTEGER
);
"#;

/// Upgrade steps, indexed by the version they upgrade *from*.
pub const MIGRATIONS: &[(i64, &str)] = &[
    (2, "ALTER TABLE photos ADD COLUMN direction INTEGER DEFAULT NULL"),
];

/// Create or upgrade the schema to [`SCHEMA_VERSION`].
///
/// Root names are only seeded when the database is created.
pub fn initialize(conn: &mut Connection, roots: &[String]) -> Result<()> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    if version > SCHEMA_VERSION {
        bail!(
            "database schema version {} is newer than supported version {}",
            version,
            SCHEMA_VERSION
        );
    }

    let tx = conn.transaction()?;
    if version == 0 {
        info!("Creating photo index database");
        tx.execute_batch(SCHEMA)?;
        for root in roots {
            tx.execute("INSERT INTO directories (dir, last_scan) VALUES (?, 0)", params![root])?;
        }
    } else if version < SCHEMA_VERSION {
        info!("Upgrading photo index database from version {}", version);
        for (from, sql) in MIGRATIONS {
            if version <= *from {
                debug!("Applying migration: {}", sql);
                tx.execute_batch(sql)?;
            }
        }
    }
    tx.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    tx.commit()?;

    Ok(())
}
