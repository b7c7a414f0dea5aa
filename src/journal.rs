//! [`Journal`] is the surface the UI collaborator talks to: one object that
//! owns the configured store and routes create, read, update, search and
//! backup requests to the right component.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tracing::info;

use crate::backup::BackupManager;
use crate::config::JournalConfig;
use crate::db::{open_store, RecordStore};
use crate::error::{Error, Result};
use crate::models::{MeltRecord, SequenceNumber};
use crate::numbering::{self, NumberingService};
use crate::search::{self, SearchFilter, Statistics};
use crate::validation::MeltDraft;

pub struct Journal {
    store: Box<dyn RecordStore>,
    config: JournalConfig,
    backups: BackupManager,
}

impl Journal {
    /// Validate `config`, then open and initialize the backend it selects.
    pub fn open(config: JournalConfig) -> Result<Self> {
        config.validate()?;
        let store = open_store(&config)?;
        let backups = BackupManager::from_config(&config);
        info!(
            backend = ?store.backend(),
            path = %store.path().display(),
            "journal opened"
        );
        Ok(Self {
            store,
            config,
            backups,
        })
    }

    pub fn config(&self) -> &JournalConfig {
        &self.config
    }

    pub fn store(&self) -> &dyn RecordStore {
        self.store.as_ref()
    }

    fn numbering(&self) -> NumberingService<'_> {
        NumberingService::new(self.store.as_ref(), &self.config)
    }

    /// Suggested sequence number for a melt dated `date`.
    pub fn next_sequence_number(&self, date: NaiveDate) -> Result<SequenceNumber> {
        self.numbering().next_sequence_number(date)
    }

    pub fn accounting_number(&self, sequence: SequenceNumber, date: NaiveDate) -> String {
        numbering::accounting_number(sequence, date)
    }

    /// Validate the draft, mint its id and store it. Nothing is written when
    /// any step fails.
    pub fn create(&mut self, draft: &MeltDraft) -> Result<MeltRecord> {
        let record = self.numbering().mint(draft)?;
        self.store.insert(&record)?;
        Ok(record)
    }

    /// Rewrite an existing record and return it as stored.
    ///
    /// The id stays fixed. The accounting number is re-derived from the date
    /// and sequence number, which must agree on the month and must not be
    /// held by another melt of that month.
    pub fn update(&mut self, record: &MeltRecord) -> Result<MeltRecord> {
        let prepared = self.numbering().prepare_update(record)?;
        self.store.update(&prepared)?;
        Ok(prepared)
    }

    pub fn get(&self, id: &str) -> Result<Option<MeltRecord>> {
        self.store.get_by_id(id)
    }

    /// Like [`Journal::get`], but a missing record is an error.
    pub fn require(&self, id: &str) -> Result<MeltRecord> {
        self.get(id)?.ok_or_else(|| Error::RecordNotFound { id: id.to_string() })
    }

    /// Every readable record, in store order.
    pub fn list(&self) -> Result<Vec<MeltRecord>> {
        self.store.list_all()
    }

    pub fn search(&self, filter: &SearchFilter) -> Result<Vec<MeltRecord>> {
        Ok(search::search(&self.store.list_all()?, filter))
    }

    pub fn statistics(&self, filter: &SearchFilter) -> Result<Statistics> {
        let matching = self.search(filter)?;
        Ok(Statistics::compute(&matching, &self.config.absent_participant))
    }

    /// Copy the storage file into the backup directory and prune old copies.
    pub fn backup(&self) -> Result<PathBuf> {
        self.backups.create_backup()
    }

    pub fn list_backups(&self) -> Result<Vec<PathBuf>> {
        self.backups.list_backups()
    }

    /// Replace the storage file with `backup` and reopen. The journal is
    /// consumed because its store must release the file first.
    pub fn restore_backup(self, backup: &Path) -> Result<Journal> {
        let Journal {
            store,
            config,
            backups,
        } = self;
        drop(store);
        backups.restore(backup)?;
        Journal::open(config)
    }
}
