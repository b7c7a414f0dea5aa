//! Timestamped copies of the storage file, with a fixed retention count.
//!
//! Backups are named `plavka_backup_YYYYMMDD_HHMMSS.<ext>` so that sorting by
//! name is sorting by age. Only files following that scheme are ever pruned.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime};
use tracing::{debug, info, warn};

use crate::config::JournalConfig;
use crate::error::{Error, Result};

pub const BACKUP_PREFIX: &str = "plavka_backup_";
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Copies one storage file into a backup directory and keeps the newest
/// `max_backups` copies.
#[derive(Debug, Clone)]
pub struct BackupManager {
    source: PathBuf,
    backup_dir: PathBuf,
    max_backups: usize,
}

impl BackupManager {
    pub fn new(source: impl Into<PathBuf>, backup_dir: impl Into<PathBuf>, max_backups: usize) -> Self {
        Self {
            source: source.into(),
            backup_dir: backup_dir.into(),
            max_backups: max_backups.max(1),
        }
    }

    /// Back up whichever file the configured backend writes to.
    pub fn from_config(config: &JournalConfig) -> Self {
        Self::new(config.storage_path(), config.backup_path(), config.max_backups)
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Back up now, using local time for the name.
    pub fn create_backup(&self) -> Result<PathBuf> {
        self.create_backup_at(Local::now().naive_local())
    }

    /// Copy the storage file under a name built from `at`, then prune.
    pub fn create_backup_at(&self, at: NaiveDateTime) -> Result<PathBuf> {
        let target = self.snapshot(at)?;
        info!(backup = %target.display(), "backup created");
        self.prune()?;
        Ok(target)
    }

    /// Managed backups, oldest first.
    pub fn list_backups(&self) -> Result<Vec<PathBuf>> {
        let entries = match fs::read_dir(&self.backup_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(Error::backup_io(&self.backup_dir, err)),
        };

        let extension = self.extension();
        let mut backups = Vec::new();
        for entry in entries {
            let path = entry.map_err(|err| Error::backup_io(&self.backup_dir, err))?.path();
            let managed = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(BACKUP_PREFIX))
                && path.extension().and_then(|ext| ext.to_str()) == Some(extension.as_str());
            if managed && path.is_file() {
                backups.push(path);
            }
        }
        backups.sort();
        Ok(backups)
    }

    /// Delete the oldest backups until at most `max_backups` remain. Returns
    /// the files removed.
    pub fn prune(&self) -> Result<Vec<PathBuf>> {
        let backups = self.list_backups()?;
        let excess = backups.len().saturating_sub(self.max_backups);
        let mut removed = Vec::with_capacity(excess);
        for path in backups.into_iter().take(excess) {
            match fs::remove_file(&path) {
                Ok(()) => {
                    debug!(backup = %path.display(), "old backup removed");
                    removed.push(path);
                }
                Err(err) => warn!(backup = %path.display(), error = %err, "failed to remove old backup"),
            }
        }
        Ok(removed)
    }

    /// Put `backup` in place of the storage file. The current file is
    /// snapshotted first so a restore can itself be undone.
    ///
    /// The store must not hold the file open while this runs.
    pub fn restore(&self, backup: &Path) -> Result<()> {
        if !backup.is_file() {
            return Err(Error::backup_io(
                backup,
                io::Error::new(io::ErrorKind::NotFound, "backup file does not exist"),
            ));
        }

        if self.source.exists() {
            let snapshot = self.snapshot(Local::now().naive_local())?;
            info!(backup = %snapshot.display(), "current storage saved before restore");
        }

        fs::copy(backup, &self.source).map_err(|err| Error::storage_io(&self.source, err))?;
        info!(backup = %backup.display(), target = %self.source.display(), "backup restored");
        self.prune()?;
        Ok(())
    }

    fn snapshot(&self, at: NaiveDateTime) -> Result<PathBuf> {
        fs::create_dir_all(&self.backup_dir).map_err(|err| Error::backup_io(&self.backup_dir, err))?;
        let target = self.unused_name(at)?;
        fs::copy(&self.source, &target).map_err(|err| Error::backup_io(&target, err))?;
        Ok(target)
    }

    /// `plavka_backup_<ts>.<ext>` for the first backup of a second, then
    /// `_001`, `_002`, ... Each new suffix is one past the highest already
    /// present for that second, so a name freed by pruning is never handed
    /// out again and name order stays creation order.
    fn unused_name(&self, at: NaiveDateTime) -> Result<PathBuf> {
        let stem = format!("{BACKUP_PREFIX}{}", at.format(TIMESTAMP_FORMAT));
        let extension = self.extension();

        let highest = self
            .list_backups()?
            .iter()
            .filter_map(|path| path.file_stem()?.to_str().and_then(|name| suffix_of(name, &stem)))
            .max();
        let name = match highest {
            None => format!("{stem}.{extension}"),
            Some(taken) => format!("{stem}_{:03}.{extension}", taken + 1),
        };
        Ok(self.backup_dir.join(name))
    }

    fn extension(&self) -> String {
        self.source
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("bak")
            .to_string()
    }
}

/// Position of `name` within the backups of `stem`'s second: 0 for the plain
/// name, `n` for `_nnn`, `None` for anything else.
fn suffix_of(name: &str, stem: &str) -> Option<u32> {
    let rest = name.strip_prefix(stem)?;
    if rest.is_empty() {
        return Some(0);
    }
    let digits = rest.strip_prefix('_')?;
    if digits.len() < 3 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}
