//! Monthly sequence numbers and the identifiers derived from them.
//!
//! Numbering is scoped to a calendar `(year, month)`: March 2025 and March
//! 2026 each start again at `3-001`.

use chrono::{Datelike, NaiveDate};
use tracing::{debug, warn};

use crate::config::JournalConfig;
use crate::db::RecordStore;
use crate::error::{Error, Result, ValidationError, ValidationErrorKind};
use crate::models::{MeltRecord, SequenceNumber};
use crate::validation::MeltDraft;

/// Mints sequence numbers and ids against the current contents of a store.
pub struct NumberingService<'a> {
    store: &'a dyn RecordStore,
    config: &'a JournalConfig,
}

impl<'a> NumberingService<'a> {
    pub fn new(store: &'a dyn RecordStore, config: &'a JournalConfig) -> Self {
        Self { store, config }
    }

    /// The number the next melt dated `date` should get.
    ///
    /// Ordinals whose derived id is already stored (for instance by a row
    /// whose own sequence number no longer reads back) are skipped, so the
    /// suggestion can always be minted.
    pub fn next_sequence_number(&self, date: NaiveDate) -> Result<SequenceNumber> {
        let records = self.store.list_all()?;
        let mut next = next_sequence_in(&records, date);
        while self.store.exists_id(&record_id(date, next))? {
            debug!(%date, sequence = %next, "id already taken, skipping ordinal");
            next = next.next();
        }
        debug!(%date, sequence = %next, "next sequence number");
        Ok(next)
    }

    /// Validate `draft` and turn it into a record with its id and accounting
    /// number filled in. Fails with `DuplicateId` when the id is taken; the
    /// caller should fetch a fresh number and try again. A sequence number
    /// already held by another melt of the same month is rejected as a
    /// validation error.
    pub fn mint(&self, draft: &MeltDraft) -> Result<MeltRecord> {
        let melt = draft.validate(self.config)?;
        let id = record_id(melt.date, melt.sequence_number);
        if self.store.exists_id(&id)? {
            return Err(Error::DuplicateId { id });
        }
        let records = self.store.list_all()?;
        ensure_sequence_free(&records, melt.date, melt.sequence_number, &id)?;
        let accounting = accounting_number(melt.sequence_number, melt.date);
        Ok(melt.into_record(id, accounting))
    }

    /// Check an edited record before it replaces the stored one, returning
    /// it with the accounting number re-derived from its date and sequence.
    ///
    /// The id is never changed: it was minted once and stays the key. An id
    /// the store does not hold is `RecordNotFound`.
    pub fn prepare_update(&self, record: &MeltRecord) -> Result<MeltRecord> {
        record.validate(self.config)?;
        if !self.store.exists_id(&record.id)? {
            return Err(Error::RecordNotFound {
                id: record.id.clone(),
            });
        }
        let records = self.store.list_all()?;
        ensure_sequence_free(&records, record.date, record.sequence_number, &record.id)?;
        let mut prepared = record.clone();
        prepared.accounting_number = accounting_number(record.sequence_number, record.date);
        Ok(prepared)
    }
}

/// Fail when a melt other than `own_id` already holds `sequence` in the
/// `(year, month)` of `date`.
pub fn ensure_sequence_free(
    records: &[MeltRecord],
    date: NaiveDate,
    sequence: SequenceNumber,
    own_id: &str,
) -> std::result::Result<(), ValidationError> {
    let holder = records.iter().find(|r| {
        r.id != own_id
            && r.date.year() == date.year()
            && r.date.month() == date.month()
            && r.sequence_number == sequence
    });
    match holder {
        Some(other) => Err(ValidationError::new(
            "sequence_number",
            ValidationErrorKind::SequenceTaken {
                sequence: sequence.to_string(),
                held_by: other.id.clone(),
            },
        )),
        None => Ok(()),
    }
}

/// Highest ordinal already used in the month of `date`, plus one.
pub fn next_sequence_in(records: &[MeltRecord], date: NaiveDate) -> SequenceNumber {
    records
        .iter()
        .filter(|r| r.date.year() == date.year() && r.date.month() == date.month())
        .filter(|r| {
            let consistent = r.sequence_number.month == date.month();
            if !consistent {
                warn!(
                    id = %r.id,
                    sequence = %r.sequence_number,
                    "sequence number belongs to another month, ignoring"
                );
            }
            consistent
        })
        .map(|r| r.sequence_number)
        .max()
        .map(SequenceNumber::next)
        .unwrap_or_else(|| SequenceNumber::first_of(date))
}

/// `"{sequence}/{yy}"`, e.g. `2-007/25`.
pub fn accounting_number(sequence: SequenceNumber, date: NaiveDate) -> String {
    format!("{sequence}/{:02}", date.year().rem_euclid(100))
}

/// `YYYYMMNNN`. Ordinals past 999 widen the id rather than wrap.
pub fn record_id(date: NaiveDate, sequence: SequenceNumber) -> String {
    format!("{:04}{:02}{:03}", date.year(), date.month(), sequence.ordinal)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::db::SqliteStore;
    use crate::models::{SectorData, SectorLabel};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn melt(on: NaiveDate, sequence: SequenceNumber) -> MeltRecord {
        MeltRecord {
            id: record_id(on, sequence),
            accounting_number: accounting_number(sequence, on),
            date: on,
            sequence_number: sequence,
            cluster_number: String::new(),
            senior_shift: String::new(),
            participants: Default::default(),
            casting_name: String::new(),
            experiment_type: None,
            comment: String::new(),
            sectors: Default::default(),
        }
    }

    #[test]
    fn continues_after_the_highest_ordinal_of_the_month() {
        let records: Vec<_> = (1..=5)
            .map(|n| melt(date(2025, 2, n), SequenceNumber::new(2, n)))
            .collect();
        let next = next_sequence_in(&records, date(2025, 2, 20));
        assert_eq!(next.to_string(), "2-006");
    }

    #[test]
    fn new_month_starts_at_one() {
        let records = vec![melt(date(2025, 2, 3), SequenceNumber::new(2, 5))];
        assert_eq!(next_sequence_in(&records, date(2025, 3, 1)).to_string(), "3-001");
    }

    #[test]
    fn same_month_of_another_year_is_ignored() {
        let records = vec![melt(date(2024, 2, 3), SequenceNumber::new(2, 40))];
        assert_eq!(next_sequence_in(&records, date(2025, 2, 3)).to_string(), "2-001");
    }

    #[test]
    fn gaps_do_not_get_refilled() {
        let records = vec![
            melt(date(2025, 2, 1), SequenceNumber::new(2, 1)),
            melt(date(2025, 2, 2), SequenceNumber::new(2, 9)),
        ];
        assert_eq!(next_sequence_in(&records, date(2025, 2, 3)).to_string(), "2-010");
    }

    #[test]
    fn numbers_past_999_lose_padding_but_stay_ordered() {
        let records = vec![melt(date(2025, 2, 1), SequenceNumber::new(2, 999))];
        let next = next_sequence_in(&records, date(2025, 2, 1));
        assert_eq!(next.to_string(), "2-1000");
        assert_eq!(record_id(date(2025, 2, 1), next), "2025021000");
        assert!(next > SequenceNumber::new(2, 999));
    }

    #[test]
    fn derived_identifiers() {
        let seq = SequenceNumber::new(2, 7);
        assert_eq!(accounting_number(seq, date(2025, 2, 14)), "2-007/25");
        assert_eq!(accounting_number(seq, date(2100, 2, 14)), "2-007/00");
        assert_eq!(record_id(date(2025, 2, 14), seq), "202502007");
    }

    #[test]
    fn mint_refuses_an_id_already_in_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let config = JournalConfig::in_dir(dir.path());
        let mut store = SqliteStore::open(config.storage_path(), &config).unwrap();
        store.initialize().unwrap();

        let mut draft = MeltDraft::new(date(2025, 2, 14), "2-001");
        draft.sector_mut(SectorLabel::A).temperature = "1500".into();

        let record = NumberingService::new(&store, &config).mint(&draft).unwrap();
        assert_eq!(record.id, "202502001");
        assert_eq!(record.accounting_number, "2-001/25");
        store.insert(&record).unwrap();

        let service = NumberingService::new(&store, &config);
        let err = service.mint(&draft).unwrap_err();
        assert!(matches!(err, Error::DuplicateId { ref id } if id == "202502001"));
        assert_eq!(
            service.next_sequence_number(date(2025, 2, 28)).unwrap().to_string(),
            "2-002"
        );
    }

    fn poured(mut record: MeltRecord) -> MeltRecord {
        record.set_sector(
            SectorLabel::A,
            Some(SectorData {
                temperature: Some(1500.0),
                ..SectorData::default()
            }),
        );
        record
    }

    fn sqlite(dir: &std::path::Path) -> (SqliteStore, JournalConfig) {
        let config = JournalConfig::in_dir(dir);
        let mut store = SqliteStore::open(config.storage_path(), &config).unwrap();
        store.initialize().unwrap();
        (store, config)
    }

    #[test]
    fn suggestion_skips_an_id_held_by_an_unreadable_row() {
        let dir = tempfile::tempdir().unwrap();
        let (mut store, config) = sqlite(dir.path());
        store.insert(&poured(melt(date(2025, 2, 3), SequenceNumber::new(2, 1)))).unwrap();
        store.insert(&poured(melt(date(2025, 2, 4), SequenceNumber::new(2, 2)))).unwrap();
        store
            .connection()
            .execute("UPDATE plavki SET plavka_number = 'x-y' WHERE id = '202502002'", [])
            .unwrap();

        let service = NumberingService::new(&store, &config);
        let next = service.next_sequence_number(date(2025, 2, 5)).unwrap();
        assert_eq!(next.to_string(), "2-003");

        let mut draft = MeltDraft::new(date(2025, 2, 5), next.to_string());
        draft.sector_mut(SectorLabel::A).temperature = "1500".into();
        assert_eq!(service.mint(&draft).unwrap().id, "202502003");
    }

    #[test]
    fn mint_refuses_a_sequence_held_by_another_melt_of_the_month() {
        let dir = tempfile::tempdir().unwrap();
        let (mut store, config) = sqlite(dir.path());
        let mut legacy = poured(melt(date(2025, 2, 3), SequenceNumber::new(2, 2)));
        legacy.id = "legacy-2".into();
        store.insert(&legacy).unwrap();

        let mut draft = MeltDraft::new(date(2025, 2, 9), "2-002");
        draft.sector_mut(SectorLabel::A).temperature = "1500".into();
        let err = NumberingService::new(&store, &config).mint(&draft).unwrap_err();
        match err {
            Error::Validation(err) => assert_eq!(
                err.kind,
                ValidationErrorKind::SequenceTaken {
                    sequence: "2-002".into(),
                    held_by: "legacy-2".into(),
                }
            ),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn prepare_update_rederives_the_accounting_number() {
        let dir = tempfile::tempdir().unwrap();
        let (mut store, config) = sqlite(dir.path());
        let first = poured(melt(date(2025, 2, 3), SequenceNumber::new(2, 1)));
        let second = poured(melt(date(2025, 2, 4), SequenceNumber::new(2, 2)));
        store.insert(&first).unwrap();
        store.insert(&second).unwrap();
        let service = NumberingService::new(&store, &config);

        let mut relabelled = second.clone();
        relabelled.sequence_number = SequenceNumber::new(2, 5);
        let prepared = service.prepare_update(&relabelled).unwrap();
        assert_eq!(prepared.id, "202502002");
        assert_eq!(prepared.accounting_number, "2-005/25");

        relabelled.sequence_number = SequenceNumber::new(2, 1);
        let err = service.prepare_update(&relabelled).unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError { kind: ValidationErrorKind::SequenceTaken { .. }, .. })
        ));

        assert!(service.prepare_update(&second).is_ok());
    }

    #[test]
    fn mint_rejects_invalid_drafts_before_touching_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let config = JournalConfig::in_dir(dir.path());
        let mut store = SqliteStore::open(config.storage_path(), &config).unwrap();
        store.initialize().unwrap();

        let draft = MeltDraft::new(date(2025, 2, 14), "2-001");
        let err = NumberingService::new(&store, &config).mint(&draft).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
