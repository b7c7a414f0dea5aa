//! Domain models for one melt (plavka) and its four pouring sectors. These are
//! plain value types: the store layer persists them through the canonical
//! column table in [`crate::columns`], and validation of raw form input lives
//! in [`crate::validation`].

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate, NaiveTime};

use crate::error::{ValidationError, ValidationErrorKind};

/// Display format for sector times.
pub const TIME_FORMAT: &str = "%H:%M";

/// One of the four independently tracked pouring stations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SectorLabel {
    A,
    B,
    C,
    D,
}

impl SectorLabel {
    pub const ALL: [SectorLabel; 4] = [SectorLabel::A, SectorLabel::B, SectorLabel::C, SectorLabel::D];

    pub fn as_str(self) -> &'static str {
        match self {
            SectorLabel::A => "A",
            SectorLabel::B => "B",
            SectorLabel::C => "C",
            SectorLabel::D => "D",
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for SectorLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mold lining material being trialled during the melt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExperimentType {
    Paper,
    Fiber,
}

impl ExperimentType {
    /// Label stored on disk and shown to operators.
    pub fn label(self) -> &'static str {
        match self {
            ExperimentType::Paper => "Бумага",
            ExperimentType::Fiber => "Волокно",
        }
    }
}

impl fmt::Display for ExperimentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ExperimentType {
    type Err = ValidationError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim() {
            "Бумага" | "Paper" | "paper" => Ok(ExperimentType::Paper),
            "Волокно" | "Fiber" | "fiber" => Ok(ExperimentType::Fiber),
            other => Err(ValidationError::new(
                "experiment_type",
                ValidationErrorKind::UnknownExperimentType(other.to_string()),
            )),
        }
    }
}

/// The `month-ordinal` number of a melt within its calendar month, e.g.
/// `2-007`. Ordinals above 999 render without padding loss (`2-1000`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SequenceNumber {
    pub month: u32,
    pub ordinal: u32,
}

impl SequenceNumber {
    pub fn new(month: u32, ordinal: u32) -> Self {
        Self { month, ordinal }
    }

    /// First number of the month containing `date`.
    pub fn first_of(date: NaiveDate) -> Self {
        Self::new(date.month(), 1)
    }

    pub fn next(self) -> Self {
        Self::new(self.month, self.ordinal.saturating_add(1))
    }
}

impl fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:03}", self.month, self.ordinal)
    }
}

impl FromStr for SequenceNumber {
    type Err = ValidationError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let malformed = || {
            ValidationError::new(
                "sequence_number",
                ValidationErrorKind::MalformedSequenceNumber(raw.to_string()),
            )
        };
        let (month, ordinal) = raw.trim().split_once('-').ok_or_else(malformed)?;
        let all_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
        if !all_digits(month) || !all_digits(ordinal) {
            return Err(malformed());
        }
        let month: u32 = month.parse().map_err(|_| malformed())?;
        let ordinal: u32 = ordinal.parse().map_err(|_| malformed())?;
        if !(1..=12).contains(&month) || ordinal == 0 {
            return Err(malformed());
        }
        Ok(Self { month, ordinal })
    }
}

/// Telemetry for one sector. A sector is only stored when at least one of its
/// fields carries a value.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SectorData {
    /// Mold/flask identifier.
    pub sector_number: String,
    pub heating_time: Option<NaiveTime>,
    pub movement_time: Option<NaiveTime>,
    pub pouring_time: Option<NaiveTime>,
    /// Pouring temperature in °C.
    pub temperature: Option<f64>,
}

impl SectorData {
    pub fn is_empty(&self) -> bool {
        self.sector_number.trim().is_empty()
            && self.heating_time.is_none()
            && self.movement_time.is_none()
            && self.pouring_time.is_none()
            && self.temperature.is_none()
    }
}

/// One casting event. `id` is minted once by the numbering service and never
/// changes; every other field may be rewritten through an update.
#[derive(Debug, Clone, PartialEq)]
pub struct MeltRecord {
    /// `YYYYMMNNN`, derived from the date and sequence ordinal.
    pub id: String,
    /// `"{sequence}/{yy}"`.
    pub accounting_number: String,
    pub date: NaiveDate,
    pub sequence_number: SequenceNumber,
    pub cluster_number: String,
    pub senior_shift: String,
    pub participants: [String; 4],
    pub casting_name: String,
    pub experiment_type: Option<ExperimentType>,
    pub comment: String,
    /// Indexed by [`SectorLabel`]; `None` for sectors not poured.
    pub sectors: [Option<SectorData>; 4],
}

impl MeltRecord {
    /// Data for `label`, or `None` when the sector was not poured. A slot
    /// holding only blank fields counts as not poured.
    pub fn sector(&self, label: SectorLabel) -> Option<&SectorData> {
        self.sectors[label.index()]
            .as_ref()
            .filter(|sector| !sector.is_empty())
    }

    pub fn set_sector(&mut self, label: SectorLabel, data: Option<SectorData>) {
        self.sectors[label.index()] = data.filter(|sector| !sector.is_empty());
    }

    /// Present sectors paired with their labels, in A–D order.
    pub fn present_sectors(&self) -> impl Iterator<Item = (SectorLabel, &SectorData)> {
        SectorLabel::ALL
            .into_iter()
            .filter_map(move |label| self.sector(label).map(|data| (label, data)))
    }

    /// Every recorded pouring temperature, skipping sectors without one.
    pub fn temperatures(&self) -> impl Iterator<Item = f64> + '_ {
        self.present_sectors().filter_map(|(_, data)| data.temperature)
    }

    /// The senior of the shift followed by the four participants.
    pub fn crew(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.senior_shift.as_str()).chain(self.participants.iter().map(String::as_str))
    }
}

pub(crate) fn format_time(time: Option<NaiveTime>) -> String {
    time.map(|t| t.format(TIME_FORMAT).to_string())
        .unwrap_or_default()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn sequence_number_pads_to_three_digits() {
        assert_eq!(SequenceNumber::new(2, 6).to_string(), "2-006");
        assert_eq!(SequenceNumber::new(12, 145).to_string(), "12-145");
        assert_eq!(SequenceNumber::new(2, 1000).to_string(), "2-1000");
    }

    #[test]
    fn sequence_number_parses_unpadded_legacy_values() {
        assert_eq!("2-5".parse::<SequenceNumber>().unwrap(), SequenceNumber::new(2, 5));
        assert_eq!(" 11-012 ".parse::<SequenceNumber>().unwrap(), SequenceNumber::new(11, 12));
    }

    #[test]
    fn sequence_number_rejects_garbage() {
        for raw in ["", "2", "2-", "-5", "2.005", "13-001", "0-001", "2-000", "2-0x1", "+2-001"] {
            let err = raw.parse::<SequenceNumber>().unwrap_err();
            assert_eq!(err.field, "sequence_number", "{raw}");
        }
    }

    #[test]
    fn experiment_type_accepts_both_spellings() {
        assert_eq!("Бумага".parse::<ExperimentType>().unwrap(), ExperimentType::Paper);
        assert_eq!("Fiber".parse::<ExperimentType>().unwrap(), ExperimentType::Fiber);
        assert!("Стекло".parse::<ExperimentType>().is_err());
    }

    #[test]
    fn empty_sector_is_dropped_on_set() {
        let mut record = MeltRecord {
            id: "202502001".into(),
            accounting_number: "2-001/25".into(),
            date: NaiveDate::from_ymd_opt(2025, 2, 3).unwrap(),
            sequence_number: SequenceNumber::new(2, 1),
            cluster_number: String::new(),
            senior_shift: String::new(),
            participants: Default::default(),
            casting_name: String::new(),
            experiment_type: None,
            comment: String::new(),
            sectors: Default::default(),
        };
        record.set_sector(SectorLabel::B, Some(SectorData::default()));
        assert!(record.sector(SectorLabel::B).is_none());

        record.set_sector(
            SectorLabel::C,
            Some(SectorData {
                temperature: Some(1510.0),
                ..SectorData::default()
            }),
        );
        assert_eq!(record.temperatures().collect::<Vec<_>>(), vec![1510.0]);
        assert_eq!(record.present_sectors().count(), 1);
    }
}
