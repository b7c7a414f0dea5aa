use std::path::{Path, PathBuf};

use rusqlite::Connection;
use tracing::info;

use super::connection::{ensure_schema, open_database};
use super::{decode_rows, melts, RecordStore};
use crate::config::{BackendKind, JournalConfig};
use crate::error::{Error, Result};
use crate::models::MeltRecord;

/// Relational backend: a `plavki` table keyed by id and a `sectors` table with
/// one row per `(plavka_id, sector_name)`.
pub struct SqliteStore {
    conn: Connection,
    path: PathBuf,
    config: JournalConfig,
}

impl SqliteStore {
    /// Open the database file at `path`. Tables are created by
    /// [`RecordStore::initialize`].
    pub fn open(path: impl Into<PathBuf>, config: &JournalConfig) -> Result<Self> {
        let path = path.into();
        let conn = open_database(&path)?;
        Ok(Self {
            conn,
            path,
            config: config.clone(),
        })
    }

    /// Direct access for administrative repairs that bypass the record API.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl RecordStore for SqliteStore {
    fn initialize(&mut self) -> Result<()> {
        ensure_schema(&self.conn).map_err(|err| Error::storage_init(&self.path, err))?;
        info!(path = %self.path.display(), "melt database ready");
        Ok(())
    }

    fn insert(&mut self, record: &MeltRecord) -> Result<()> {
        record.validate(&self.config)?;
        if melts::melt_exists(&self.conn, &record.id)? {
            return Err(Error::DuplicateId {
                id: record.id.clone(),
            });
        }
        melts::insert_melt(&mut self.conn, record)?;
        info!(id = %record.id, sequence = %record.sequence_number, "melt recorded");
        Ok(())
    }

    fn update(&mut self, record: &MeltRecord) -> Result<()> {
        record.validate(&self.config)?;
        melts::update_melt(&mut self.conn, record)?;
        info!(id = %record.id, "melt updated");
        Ok(())
    }

    fn get_by_id(&self, id: &str) -> Result<Option<MeltRecord>> {
        let Some(fields) = melts::fetch_melt(&self.conn, id)? else {
            return Ok(None);
        };
        MeltRecord::from_flat_fields(&fields)
            .map(Some)
            .map_err(|err| Error::CorruptRecord {
                id: id.to_string(),
                reason: err.to_string(),
            })
    }

    fn list_all(&self) -> Result<Vec<MeltRecord>> {
        let rows = melts::fetch_melts(&self.conn)?;
        Ok(decode_rows(rows, &self.path))
    }

    fn exists_id(&self, id: &str) -> Result<bool> {
        melts::melt_exists(&self.conn, id)
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn backend(&self) -> BackendKind {
        BackendKind::Sqlite
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{NaiveDate, NaiveTime};
    use rusqlite::params;

    use super::*;
    use crate::models::{SectorData, SectorLabel, SequenceNumber};

    fn record(id: &str, ordinal: u32) -> MeltRecord {
        let mut record = MeltRecord {
            id: id.to_string(),
            accounting_number: format!("2-{ordinal:03}/25"),
            date: NaiveDate::from_ymd_opt(2025, 2, 10).unwrap(),
            sequence_number: SequenceNumber::new(2, ordinal),
            cluster_number: "7".into(),
            senior_shift: "Волков".into(),
            participants: ["Левин".into(), String::new(), String::new(), String::new()],
            casting_name: "Кольцо".into(),
            experiment_type: None,
            comment: String::new(),
            sectors: Default::default(),
        };
        record.set_sector(
            SectorLabel::B,
            Some(SectorData {
                sector_number: "12".into(),
                heating_time: NaiveTime::from_hms_opt(9, 0, 0),
                movement_time: None,
                pouring_time: NaiveTime::from_hms_opt(9, 20, 0),
                temperature: Some(1505.0),
            }),
        );
        record
    }

    fn store() -> (tempfile::TempDir, SqliteStore) {
        let dir = tempfile::tempdir().unwrap();
        let config = JournalConfig::in_dir(dir.path());
        let mut store = SqliteStore::open(config.storage_path(), &config).unwrap();
        store.initialize().unwrap();
        (dir, store)
    }

    fn count(store: &SqliteStore, table: &str) -> i64 {
        store
            .connection()
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn insert_writes_primary_and_four_sector_rows() {
        let (_dir, mut store) = store();
        let melt = record("202502001", 1);
        store.insert(&melt).unwrap();

        assert_eq!(count(&store, "plavki"), 1);
        assert_eq!(count(&store, "sectors"), 4);
        assert_eq!(store.get_by_id("202502001").unwrap(), Some(melt));
        assert!(store.exists_id("202502001").unwrap());
        assert!(!store.exists_id("202502002").unwrap());
    }

    #[test]
    fn initialize_is_idempotent() {
        let (_dir, mut store) = store();
        store.insert(&record("202502001", 1)).unwrap();
        store.initialize().unwrap();
        assert_eq!(store.list_all().unwrap().len(), 1);
    }

    #[test]
    fn rejected_insert_leaves_no_sector_rows() {
        let (_dir, mut store) = store();
        let mut melt = record("202502001", 1);
        melt.set_sector(
            SectorLabel::D,
            Some(SectorData {
                temperature: Some(2500.0),
                ..SectorData::default()
            }),
        );
        assert!(matches!(store.insert(&melt), Err(Error::Validation(_))));
        assert_eq!(count(&store, "plavki"), 0);
        assert_eq!(count(&store, "sectors"), 0);
    }

    #[test]
    fn failed_sector_write_rolls_back_the_primary_row() {
        let (_dir, mut store) = store();
        store
            .connection()
            .execute_batch(
                "CREATE TRIGGER reject_sector_d BEFORE INSERT ON sectors
                 WHEN NEW.sector_name = 'D'
                 BEGIN SELECT RAISE(ABORT, 'sector D rejected'); END;",
            )
            .unwrap();

        let err = store.insert(&record("202502001", 1)).unwrap_err();
        assert!(matches!(err, Error::Database(_)));
        assert_eq!(count(&store, "plavki"), 0);
        assert_eq!(count(&store, "sectors"), 0);
        assert!(store.get_by_id("202502001").unwrap().is_none());
    }

    #[test]
    fn update_of_missing_record_rolls_back() {
        let (_dir, mut store) = store();
        let err = store.update(&record("202502009", 9)).unwrap_err();
        assert!(matches!(err, Error::RecordNotFound { .. }));
        assert_eq!(count(&store, "sectors"), 0);
    }

    #[test]
    fn update_moves_sector_data_and_clears_old_sector() {
        let (_dir, mut store) = store();
        let mut melt = record("202502001", 1);
        store.insert(&melt).unwrap();

        let moved = melt.sector(SectorLabel::B).cloned();
        melt.set_sector(SectorLabel::B, None);
        melt.set_sector(SectorLabel::A, moved);
        melt.comment = "перелив".into();
        store.update(&melt).unwrap();

        let stored = store.get_by_id("202502001").unwrap().unwrap();
        assert_eq!(stored, melt);
        assert!(stored.sector(SectorLabel::B).is_none());
        assert_eq!(count(&store, "sectors"), 4);
    }

    #[test]
    fn legacy_blank_temperature_text_reads_as_absent() {
        let (_dir, mut store) = store();
        store.insert(&record("202502001", 1)).unwrap();
        store
            .connection()
            .execute(
                "UPDATE sectors SET sector_number = '3', temperature = '' WHERE plavka_id = ?1 AND sector_name = 'C'",
                params!["202502001"],
            )
            .unwrap();

        let stored = store.get_by_id("202502001").unwrap().unwrap();
        let sector_c = stored.sector(SectorLabel::C).unwrap();
        assert_eq!(sector_c.sector_number, "3");
        assert_eq!(sector_c.temperature, None);
    }

    #[test]
    fn unreadable_row_is_skipped_by_listing_but_reported_by_lookup() {
        let (_dir, mut store) = store();
        store.insert(&record("202502001", 1)).unwrap();
        store.insert(&record("202502002", 2)).unwrap();
        store
            .connection()
            .execute(
                "UPDATE plavki SET plavka_number = 'второй' WHERE id = '202502002'",
                [],
            )
            .unwrap();

        let listed = store.list_all().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, "202502001");
        assert!(matches!(
            store.get_by_id("202502002"),
            Err(Error::CorruptRecord { .. })
        ));
    }
}
