//! Error taxonomy shared by every layer of the journal. Store, numbering and
//! backup operations all return [`Result`], so the UI collaborator can branch
//! on the variant instead of parsing messages.

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong while recording, reading or backing up melts.
#[derive(Debug, Error)]
pub enum Error {
    /// Form input was rejected before any write happened.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A record with this id is already stored. Callers re-mint and retry.
    #[error("melt record {id} already exists")]
    DuplicateId { id: String },

    #[error("melt record {id} not found")]
    RecordNotFound { id: String },

    /// The row exists but could not be decoded into a full record.
    #[error("melt record {id} is unreadable: {reason}")]
    CorruptRecord { id: String, reason: String },

    #[error("failed to initialize storage at {}: {reason}", path.display())]
    StorageInit { path: PathBuf, reason: String },

    #[error("storage I/O failed on {}: {source}", path.display())]
    StorageIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The storage file stayed locked by another process for every retry.
    #[error("{} is locked by another process (gave up after {attempts} attempts)", path.display())]
    Locked { path: PathBuf, attempts: u32 },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("sheet error: {0}")]
    Csv(#[from] csv::Error),

    #[error("backup failed on {}: {source}", path.display())]
    BackupIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether repeating the operation (possibly after re-minting an id) can
    /// succeed without the user changing their input.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Locked { .. } | Error::StorageIo { .. } | Error::DuplicateId { .. }
        )
    }

    pub(crate) fn storage_io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::StorageIo {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn storage_init(path: impl Into<PathBuf>, reason: impl fmt::Display) -> Self {
        Error::StorageInit {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn backup_io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::BackupIo {
            path: path.into(),
            source,
        }
    }
}

/// A rejected form field. `field` carries the name the UI highlights.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid {field}: {kind}")]
pub struct ValidationError {
    pub field: String,
    pub kind: ValidationErrorKind,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, kind: ValidationErrorKind) -> Self {
        Self {
            field: field.into(),
            kind,
        }
    }
}

/// Reason a field failed validation.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationErrorKind {
    Missing,
    NoSector,
    MalformedTime(String),
    MalformedTemperature(String),
    TemperatureOutOfRange { value: f64, min: f64, max: f64 },
    MalformedSequenceNumber(String),
    SequenceMonthMismatch { sequence_month: u32, date_month: u32 },
    /// Another melt of the same month already carries this number.
    SequenceTaken { sequence: String, held_by: String },
    UnknownCasting(String),
    UnknownExperimentType(String),
}

impl fmt::Display for ValidationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => write!(f, "value is required"),
            Self::NoSector => write!(f, "at least one sector must be filled in"),
            Self::MalformedTime(raw) => write!(f, "'{raw}' is not a time in HH:MM format"),
            Self::MalformedTemperature(raw) => write!(f, "'{raw}' is not a number"),
            Self::TemperatureOutOfRange { value, min, max } => {
                write!(f, "{value} is outside [{min}, {max}]")
            }
            Self::MalformedSequenceNumber(raw) => {
                write!(f, "'{raw}' is not a month-ordinal number")
            }
            Self::SequenceMonthMismatch {
                sequence_month,
                date_month,
            } => write!(
                f,
                "sequence month {sequence_month} does not match melt date month {date_month}"
            ),
            Self::SequenceTaken { sequence, held_by } => {
                write!(f, "sequence number {sequence} is already used by melt {held_by}")
            }
            Self::UnknownCasting(name) => write!(f, "'{name}' is not a known casting"),
            Self::UnknownExperimentType(raw) => write!(f, "'{raw}' is not an experiment type"),
        }
    }
}

/// A stored row that could not be turned into a record. Listing logs these
/// and moves on.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("column {column}: {reason}")]
pub struct RowError {
    pub column: &'static str,
    pub reason: String,
}

impl RowError {
    pub(crate) fn new(column: &'static str, reason: impl Into<String>) -> Self {
        Self {
            column,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_names_the_field() {
        let err = ValidationError::new(
            "temperature_A",
            ValidationErrorKind::TemperatureOutOfRange {
                value: 2001.0,
                min: 500.0,
                max: 2000.0,
            },
        );
        assert_eq!(
            err.to_string(),
            "invalid temperature_A: 2001 is outside [500, 2000]"
        );
    }

    #[test]
    fn retryable_classification() {
        assert!(Error::DuplicateId { id: "202502006".into() }.is_retryable());
        assert!(Error::Locked {
            path: "plavka.csv".into(),
            attempts: 3
        }
        .is_retryable());
        assert!(!Error::RecordNotFound { id: "x".into() }.is_retryable());
        assert!(!Error::Config("bad".into()).is_retryable());
        let validation: Error = ValidationError::new("date", ValidationErrorKind::Missing).into();
        assert!(!validation.is_retryable());
    }

    #[test]
    fn error_implements_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Error>();
    }
}
