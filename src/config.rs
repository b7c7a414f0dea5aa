//! The journal's single immutable configuration. Storage locations,
//! temperature limits and the crew/casting rosters all live here and are handed
//! to the store, numbering and backup components when they are built.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::BaseDirs;
use serde::Deserialize;

use crate::error::{Error, Result};

/// Folder name used beneath the user's home directory for application data.
const DATA_DIR_NAME: &str = ".plavka-journal";
/// Optional TOML file looked up inside the data directory.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Which record store implementation backs the journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Two-table SQLite database.
    #[default]
    Sqlite,
    /// One-row-per-record CSV sheet.
    Sheet,
}

/// Bounded retry applied when the sheet file is held open elsewhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay_ms: u64,
}

impl RetryPolicy {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            delay_ms: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct JournalConfig {
    pub backend: BackendKind,
    pub data_dir: PathBuf,
    pub database_file: String,
    pub sheet_file: String,
    /// Relative paths resolve against `data_dir`.
    pub backup_dir: PathBuf,
    pub max_backups: usize,
    pub temperature_min: f64,
    pub temperature_max: f64,
    pub lock_retry: RetryPolicy,
    pub participants: Vec<String>,
    /// Roster entry meaning "nobody"; never counted as a participant.
    pub absent_participant: String,
    pub castings: Vec<String>,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            data_dir: default_data_dir(),
            database_file: "plavka.db".to_string(),
            sheet_file: "plavka.csv".to_string(),
            backup_dir: PathBuf::from("backups"),
            max_backups: 5,
            temperature_min: 500.0,
            temperature_max: 2000.0,
            lock_retry: RetryPolicy::default(),
            participants: [
                "Белков",
                "Карасев",
                "Ермаков",
                "Рабинович",
                "Валиулин",
                "Волков",
                "Семенов",
                "Левин",
                "Исмаилов",
                "Беляев",
                "Политов",
                "Кокшин",
                "Терентьев",
                "отсутствует",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            absent_participant: "отсутствует".to_string(),
            castings: [
                "Вороток",
                "Ригель",
                "Ригель optima",
                "Блок-картер",
                "Колесо РИТМ",
                "Накладка резьб",
                "Блок цилиндров",
                "Диагональ optima",
                "Кольцо",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

impl JournalConfig {
    /// Default configuration rooted in an explicit directory.
    pub fn in_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Read a TOML file; keys it omits keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Load `config.toml` from the default data directory when it exists.
    pub fn load_or_default() -> Result<Self> {
        let path = default_data_dir().join(CONFIG_FILE_NAME);
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.temperature_min.is_nan()
            || self.temperature_max.is_nan()
            || self.temperature_min > self.temperature_max
        {
            return Err(Error::Config(format!(
                "temperature range [{}, {}] is empty",
                self.temperature_min, self.temperature_max
            )));
        }
        if self.lock_retry.attempts == 0 {
            return Err(Error::Config(
                "lock_retry.attempts must be at least 1".to_string(),
            ));
        }
        if self.max_backups == 0 {
            return Err(Error::Config("max_backups must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Path of the file the configured backend persists to.
    pub fn storage_path(&self) -> PathBuf {
        match self.backend {
            BackendKind::Sqlite => self.data_dir.join(&self.database_file),
            BackendKind::Sheet => self.data_dir.join(&self.sheet_file),
        }
    }

    pub fn backup_path(&self) -> PathBuf {
        if self.backup_dir.is_absolute() {
            self.backup_dir.clone()
        } else {
            self.data_dir.join(&self.backup_dir)
        }
    }

    pub fn temperature_in_range(&self, value: f64) -> bool {
        (self.temperature_min..=self.temperature_max).contains(&value)
    }

    pub fn is_known_participant(&self, name: &str) -> bool {
        self.participants.iter().any(|p| p == name)
    }

    pub fn is_known_casting(&self, name: &str) -> bool {
        self.castings.iter().any(|c| c == name)
    }
}

/// Resolve `~/.plavka-journal`, falling back to the working directory when no
/// home directory can be found.
fn default_data_dir() -> PathBuf {
    BaseDirs::new()
        .map(|dirs| dirs.home_dir().join(DATA_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from(DATA_DIR_NAME))
}
