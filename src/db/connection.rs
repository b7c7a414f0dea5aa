use std::fs;
use std::path::Path;

use rusqlite::Connection;

use crate::error::{Error, Result};

/// Open (creating if needed) the SQLite file at `path` with foreign keys
/// enforced. Any failure here means the location is unusable.
pub fn open_database(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| Error::storage_init(path, err))?;
    }

    let conn = Connection::open(path).map_err(|err| Error::storage_init(path, err))?;
    conn.execute("PRAGMA foreign_keys = ON", [])
        .map_err(|err| Error::storage_init(path, err))?;

    Ok(conn)
}

/// Create the melt tables when they do not exist yet. Safe to run on every
/// start-up; existing rows are never touched.
pub fn ensure_schema(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS plavki (
            id TEXT PRIMARY KEY,
            uchet_number TEXT,
            date TEXT,
            plavka_number TEXT NOT NULL,
            cluster_number TEXT,
            senior_shift TEXT,
            participant1 TEXT,
            participant2 TEXT,
            participant3 TEXT,
            participant4 TEXT,
            casting_name TEXT,
            experiment_type TEXT,
            comment TEXT,
            created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS sectors (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            plavka_id TEXT,
            sector_name TEXT,
            sector_number TEXT,
            heating_time TEXT,
            movement_time TEXT,
            pouring_time TEXT,
            temperature REAL,
            FOREIGN KEY(plavka_id) REFERENCES plavki(id),
            UNIQUE(plavka_id, sector_name)
        )",
        [],
    )?;

    Ok(())
}
