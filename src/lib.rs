//! Core library for the melt (plavka) journal.
//!
//! The UI is an external collaborator: it builds a [`MeltDraft`], asks the
//! [`Journal`] for a sequence number, and hands the draft back to be stored.
//! Everything behind that call (numbering, the two storage backends, search and
//! backups) lives in the modules below.
pub mod backup;
pub mod columns;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod journal;
pub mod models;
pub mod numbering;
pub mod search;
pub mod validation;

/// The facade most callers need.
pub use journal::Journal;

/// Configuration and the errors every operation reports.
pub use config::{BackendKind, JournalConfig};
pub use error::{Error, Result, ValidationError, ValidationErrorKind};

/// Domain types passed across the API.
pub use models::{ExperimentType, MeltRecord, SectorData, SectorLabel, SequenceNumber};
pub use search::{CastingFilter, SearchFilter, Statistics, TemperatureRange};
pub use validation::{MeltDraft, SectorInput};

/// Lower-level pieces for tooling that works on a store directly.
pub use backup::BackupManager;
pub use db::{open_store, RecordStore, SheetStore, SqliteStore};
