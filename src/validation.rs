//! Form input as the UI collects it, and the checks that turn it into typed
//! values. Nothing here touches storage: a draft is fully validated before the
//! numbering service mints an id for it.

use chrono::{Datelike, NaiveDate, NaiveTime};
use tracing::warn;

use crate::config::JournalConfig;
use crate::error::{ValidationError, ValidationErrorKind};
use crate::models::{ExperimentType, MeltRecord, SectorData, SectorLabel, SequenceNumber};

/// Raw text of one sector's inputs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SectorInput {
    pub sector_number: String,
    pub heating_time: String,
    pub movement_time: String,
    pub pouring_time: String,
    pub temperature: String,
}

impl SectorInput {
    pub fn is_blank(&self) -> bool {
        [
            &self.sector_number,
            &self.heating_time,
            &self.movement_time,
            &self.pouring_time,
            &self.temperature,
        ]
        .iter()
        .all(|value| value.trim().is_empty())
    }

    fn parse(
        &self,
        label: SectorLabel,
        config: &JournalConfig,
    ) -> Result<Option<SectorData>, ValidationError> {
        if self.is_blank() {
            return Ok(None);
        }
        let time = |field: &str, raw: &str| {
            parse_time(raw).map_err(|kind| ValidationError::new(format!("{field}_{label}"), kind))
        };
        let sector = SectorData {
            sector_number: self.sector_number.trim().to_string(),
            heating_time: time("heating_time", &self.heating_time)?,
            movement_time: time("movement_time", &self.movement_time)?,
            pouring_time: time("pouring_time", &self.pouring_time)?,
            temperature: parse_temperature(&self.temperature)
                .map_err(|kind| ValidationError::new(format!("temperature_{label}"), kind))?,
        };
        check_temperature(label, sector.temperature, config)?;
        Ok(Some(sector))
    }
}

/// Everything an operator typed for a new melt. The date comes from a date
/// picker and is therefore already typed.
#[derive(Debug, Clone, PartialEq)]
pub struct MeltDraft {
    pub date: NaiveDate,
    pub sequence_number: String,
    pub cluster_number: String,
    pub senior_shift: String,
    pub participants: [String; 4],
    pub casting_name: String,
    pub experiment_type: String,
    pub comment: String,
    pub sectors: [SectorInput; 4],
}

impl MeltDraft {
    pub fn new(date: NaiveDate, sequence_number: impl Into<String>) -> Self {
        Self {
            date,
            sequence_number: sequence_number.into(),
            cluster_number: String::new(),
            senior_shift: String::new(),
            participants: Default::default(),
            casting_name: String::new(),
            experiment_type: String::new(),
            comment: String::new(),
            sectors: Default::default(),
        }
    }

    pub fn sector_mut(&mut self, label: SectorLabel) -> &mut SectorInput {
        &mut self.sectors[label.index()]
    }

    /// Check every field, reporting the first one that is wrong.
    pub fn validate(&self, config: &JournalConfig) -> Result<ValidatedMelt, ValidationError> {
        let raw_sequence = self.sequence_number.trim();
        if raw_sequence.is_empty() {
            return Err(ValidationError::new(
                "sequence_number",
                ValidationErrorKind::Missing,
            ));
        }
        let sequence_number: SequenceNumber = raw_sequence.parse()?;
        if sequence_number.month != self.date.month() {
            return Err(ValidationError::new(
                "sequence_number",
                ValidationErrorKind::SequenceMonthMismatch {
                    sequence_month: sequence_number.month,
                    date_month: self.date.month(),
                },
            ));
        }

        let casting_name = self.casting_name.trim().to_string();
        if !casting_name.is_empty() && !config.is_known_casting(&casting_name) {
            return Err(ValidationError::new(
                "casting_name",
                ValidationErrorKind::UnknownCasting(casting_name),
            ));
        }

        let experiment_type = match self.experiment_type.trim() {
            "" => None,
            raw => Some(raw.parse::<ExperimentType>()?),
        };

        let mut sectors: [Option<SectorData>; 4] = Default::default();
        for label in SectorLabel::ALL {
            sectors[label.index()] = self.sectors[label.index()].parse(label, config)?;
        }
        if sectors.iter().all(Option::is_none) {
            return Err(ValidationError::new("sectors", ValidationErrorKind::NoSector));
        }

        let senior_shift = self.senior_shift.trim().to_string();
        let participants = self.participants.clone().map(|p| p.trim().to_string());
        for name in std::iter::once(&senior_shift).chain(participants.iter()) {
            if !name.is_empty() && !config.is_known_participant(name) {
                warn!(participant = %name, "crew member is not on the roster");
            }
        }

        Ok(ValidatedMelt {
            date: self.date,
            sequence_number,
            cluster_number: self.cluster_number.trim().to_string(),
            senior_shift,
            participants,
            casting_name,
            experiment_type,
            comment: self.comment.clone(),
            sectors,
        })
    }
}

/// A draft whose fields all parsed and passed range checks. Only the
/// numbering service can turn it into a [`MeltRecord`], since that needs an id.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedMelt {
    pub date: NaiveDate,
    pub sequence_number: SequenceNumber,
    pub cluster_number: String,
    pub senior_shift: String,
    pub participants: [String; 4],
    pub casting_name: String,
    pub experiment_type: Option<ExperimentType>,
    pub comment: String,
    pub sectors: [Option<SectorData>; 4],
}

impl ValidatedMelt {
    pub(crate) fn into_record(self, id: String, accounting_number: String) -> MeltRecord {
        MeltRecord {
            id,
            accounting_number,
            date: self.date,
            sequence_number: self.sequence_number,
            cluster_number: self.cluster_number,
            senior_shift: self.senior_shift,
            participants: self.participants,
            casting_name: self.casting_name,
            experiment_type: self.experiment_type,
            comment: self.comment,
            sectors: self.sectors,
        }
    }
}

impl MeltRecord {
    /// Invariants a record must satisfy before any store accepts it.
    pub fn validate(&self, config: &JournalConfig) -> Result<(), ValidationError> {
        if self.id.trim().is_empty() {
            return Err(ValidationError::new("id", ValidationErrorKind::Missing));
        }
        if self.sequence_number.month != self.date.month() {
            return Err(ValidationError::new(
                "sequence_number",
                ValidationErrorKind::SequenceMonthMismatch {
                    sequence_month: self.sequence_number.month,
                    date_month: self.date.month(),
                },
            ));
        }
        if self.present_sectors().next().is_none() {
            return Err(ValidationError::new("sectors", ValidationErrorKind::NoSector));
        }
        for (label, sector) in self.present_sectors() {
            check_temperature(label, sector.temperature, config)?;
        }
        Ok(())
    }
}

fn check_temperature(
    label: SectorLabel,
    temperature: Option<f64>,
    config: &JournalConfig,
) -> Result<(), ValidationError> {
    match temperature {
        Some(value) if !config.temperature_in_range(value) => Err(ValidationError::new(
            format!("temperature_{label}"),
            ValidationErrorKind::TemperatureOutOfRange {
                value,
                min: config.temperature_min,
                max: config.temperature_max,
            },
        )),
        _ => Ok(()),
    }
}

/// Parse `H:MM`, `HH:MM` or `HH:MM:SS` (seconds dropped). Blank means absent.
pub fn parse_time(raw: &str) -> Result<Option<NaiveTime>, ValidationErrorKind> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    let malformed = || ValidationErrorKind::MalformedTime(raw.to_string());
    let parts: Vec<&str> = raw.split(':').collect();
    if !(2..=3).contains(&parts.len()) {
        return Err(malformed());
    }
    let mut numbers = [0u32; 3];
    for (slot, part) in numbers.iter_mut().zip(&parts) {
        if part.is_empty() || part.len() > 2 || !part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed());
        }
        *slot = part.parse().map_err(|_| malformed())?;
    }
    let [hours, minutes, seconds] = numbers;
    if parts[1].len() != 2 || seconds > 59 {
        return Err(malformed());
    }
    NaiveTime::from_hms_opt(hours, minutes, 0)
        .map(Some)
        .ok_or_else(malformed)
}

/// Parse a temperature in °C, tolerating a decimal comma and a `°C` suffix.
pub fn parse_temperature(raw: &str) -> Result<Option<f64>, ValidationErrorKind> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let cleaned = trimmed
        .trim_end_matches("°C")
        .trim_end_matches('°')
        .trim()
        .replace(',', ".");
    match cleaned.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(Some(value)),
        _ => Err(ValidationErrorKind::MalformedTemperature(trimmed.to_string())),
    }
}

/// Parse `dd.MM.yyyy` (sheet) or `yyyy-MM-dd` (database).
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%d.%m.%Y")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .ok()
}
