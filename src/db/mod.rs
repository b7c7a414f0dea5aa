//! Persistence module split across logical submodules. [`RecordStore`] is the
//! one contract the numbering, search and backup components see; the SQLite
//! and sheet backends sit behind it and are chosen by configuration.

mod connection;
mod melts;
mod retry;
mod sheet;
mod sqlite;

use std::path::Path;

use tracing::warn;

use crate::columns::{Column, FlatFields};
use crate::config::{BackendKind, JournalConfig};
use crate::error::Result;
use crate::models::MeltRecord;

pub use connection::{ensure_schema, open_database};
pub use sheet::SheetStore;
pub use sqlite::SqliteStore;

/// Storage of melt records. Writes are all-or-nothing from the caller's point
/// of view; reads never return a partially populated record.
pub trait RecordStore {
    /// Create the backing file and layout if missing. Never drops data.
    fn initialize(&mut self) -> Result<()>;

    /// Fails with `DuplicateId` instead of overwriting.
    fn insert(&mut self, record: &MeltRecord) -> Result<()>;

    /// Rewrite every mutable field of the record with `record.id`.
    fn update(&mut self, record: &MeltRecord) -> Result<()>;

    fn get_by_id(&self, id: &str) -> Result<Option<MeltRecord>>;

    /// Every readable record, in no particular order. Unreadable rows are
    /// logged and skipped.
    fn list_all(&self) -> Result<Vec<MeltRecord>>;

    fn exists_id(&self, id: &str) -> Result<bool>;

    /// File the backend persists to (what the backup manager copies).
    fn path(&self) -> &Path;

    fn backend(&self) -> BackendKind;
}

/// Open and initialize the backend selected by `config.backend`.
pub fn open_store(config: &JournalConfig) -> Result<Box<dyn RecordStore>> {
    let path = config.storage_path();
    let mut store: Box<dyn RecordStore> = match config.backend {
        BackendKind::Sqlite => Box::new(SqliteStore::open(&path, config)?),
        BackendKind::Sheet => Box::new(SheetStore::new(&path, config)),
    };
    store.initialize()?;
    Ok(store)
}

/// Decode stored rows, dropping (and logging) the ones that do not parse.
pub(crate) fn decode_rows(
    rows: impl IntoIterator<Item = FlatFields>,
    source: &Path,
) -> Vec<MeltRecord> {
    rows.into_iter()
        .filter_map(|fields| match MeltRecord::from_flat_fields(&fields) {
            Ok(record) => Some(record),
            Err(err) => {
                warn!(
                    source = %source.display(),
                    record_id = fields.get(Column::RecordId),
                    column = err.column,
                    reason = %err.reason,
                    "skipping unreadable melt record"
                );
                None
            }
        })
        .collect()
}
