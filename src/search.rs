//! Read-side filtering and aggregation over whatever `list_all` returned.
//! Nothing in here touches storage.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::NaiveDate;

use crate::models::MeltRecord;

/// Casting criterion of a search; `All` is the "Все" choice of the form.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum CastingFilter {
    #[default]
    All,
    Named(String),
}

/// Inclusive temperature window in °C.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemperatureRange {
    pub from: f64,
    pub to: f64,
}

impl TemperatureRange {
    pub fn new(from: f64, to: f64) -> Self {
        Self { from, to }
    }

    pub fn contains(&self, value: f64) -> bool {
        (self.from..=self.to).contains(&value)
    }
}

/// Every criterion is optional; an empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchFilter {
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub casting: CastingFilter,
    /// Matches when any of the five crew fields equals this name.
    pub participant: Option<String>,
    /// Matches when any present sector temperature falls in the window.
    pub temperature: Option<TemperatureRange>,
    /// Case-insensitive substring over every stored field.
    pub text: Option<String>,
}

impl SearchFilter {
    pub fn matches(&self, record: &MeltRecord) -> bool {
        if self.date_from.is_some_and(|from| record.date < from)
            || self.date_to.is_some_and(|to| record.date > to)
        {
            return false;
        }

        if let CastingFilter::Named(name) = &self.casting {
            if record.casting_name.trim() != name.trim() {
                return false;
            }
        }

        if let Some(name) = self.participant.as_deref().map(str::trim) {
            if !name.is_empty() && !record.crew().any(|member| member.trim() == name) {
                return false;
            }
        }

        if let Some(range) = self.temperature {
            if !record.temperatures().any(|t| range.contains(t)) {
                return false;
            }
        }

        if let Some(needle) = self.text.as_deref().map(str::trim) {
            if !needle.is_empty() {
                let needle = needle.to_lowercase();
                let fields = record.to_flat_fields();
                if !fields
                    .iter()
                    .any(|(_, value)| value.to_lowercase().contains(&needle))
                {
                    return false;
                }
            }
        }

        true
    }
}

/// Matching records, newest first.
pub fn search(records: &[MeltRecord], filter: &SearchFilter) -> Vec<MeltRecord> {
    let mut found: Vec<MeltRecord> = records
        .iter()
        .filter(|record| filter.matches(record))
        .cloned()
        .collect();
    found.sort_by(|a, b| {
        b.date
            .cmp(&a.date)
            .then_with(|| b.sequence_number.cmp(&a.sequence_number))
    });
    found
}

/// How often one casting appears among the counted records.
#[derive(Debug, Clone, PartialEq)]
pub struct CastingShare {
    /// Casting name as stored; records without one count under an empty name.
    pub name: String,
    /// Records with this casting.
    pub count: usize,
    /// Share of all records in the statistics, 0–100.
    pub percent: f64,
}

/// Spread of the pouring temperatures, in °C, over every present sector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemperatureSummary {
    pub min: f64,
    pub max: f64,
    /// Arithmetic mean of all samples.
    pub mean: f64,
    /// Number of sector temperatures that went into the summary.
    pub samples: usize,
}

/// Aggregates over a set of records, usually the result of [`search`].
#[derive(Debug, Clone, PartialEq)]
pub struct Statistics {
    /// Records the statistics were computed over.
    pub total: usize,
    /// Sorted by casting name.
    pub castings: Vec<CastingShare>,
    /// `None` when no record carried a temperature.
    pub temperature: Option<TemperatureSummary>,
    /// Distinct crew names across the records.
    pub participant_count: usize,
}

impl Statistics {
    /// `absent_marker` is the roster entry meaning "nobody"; it is not
    /// counted as a participant, nor are blank crew fields.
    pub fn compute(records: &[MeltRecord], absent_marker: &str) -> Self {
        let total = records.len();

        let mut by_casting: BTreeMap<&str, usize> = BTreeMap::new();
        for record in records {
            *by_casting.entry(record.casting_name.trim()).or_default() += 1;
        }
        let castings = by_casting
            .into_iter()
            .map(|(name, count)| CastingShare {
                name: name.to_string(),
                count,
                percent: count as f64 * 100.0 / total as f64,
            })
            .collect();

        let temperatures: Vec<f64> = records.iter().flat_map(|r| r.temperatures()).collect();
        let temperature = summarize(&temperatures);

        let participants: BTreeSet<&str> = records
            .iter()
            .flat_map(|r| r.crew())
            .map(str::trim)
            .filter(|name| !name.is_empty() && *name != absent_marker)
            .collect();

        Self {
            total,
            castings,
            temperature,
            participant_count: participants.len(),
        }
    }
}

fn summarize(values: &[f64]) -> Option<TemperatureSummary> {
    let (&first, rest) = values.split_first()?;
    let (min, max) = rest
        .iter()
        .fold((first, first), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    Some(TemperatureSummary {
        min,
        max,
        mean,
        samples: values.len(),
    })
}

impl fmt::Display for Statistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Общая статистика ===")?;
        writeln!(f, "Всего записей: {}", self.total)?;
        writeln!(f, "Количество участников: {}", self.participant_count)?;
        writeln!(f)?;
        writeln!(f, "=== Температура заливки ===")?;
        match &self.temperature {
            Some(t) => {
                writeln!(f, "Средняя: {:.1}°C", t.mean)?;
                writeln!(f, "Минимальная: {}°C", t.min)?;
                writeln!(f, "Максимальная: {}°C", t.max)?;
            }
            None => writeln!(f, "Нет данных")?,
        }
        writeln!(f)?;
        write!(f, "=== Распределение по типам отливок ===")?;
        for share in &self.castings {
            let name = if share.name.is_empty() {
                "(не указано)"
            } else {
                share.name.as_str()
            };
            write!(f, "\n{name}: {} ({:.1}%)", share.count, share.percent)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Datelike;

    use super::*;
    use crate::models::{SectorData, SectorLabel, SequenceNumber};

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, m, d).unwrap()
    }

    fn melt(on: NaiveDate, ordinal: u32, casting: &str, temps: &[(SectorLabel, f64)]) -> MeltRecord {
        let mut record = MeltRecord {
            id: format!("2025{:02}{ordinal:03}", on.month()),
            accounting_number: String::new(),
            date: on,
            sequence_number: SequenceNumber::new(on.month(), ordinal),
            cluster_number: String::new(),
            senior_shift: "Иванов".into(),
            participants: ["Петров".into(), "отсутствует".into(), String::new(), String::new()],
            casting_name: casting.into(),
            experiment_type: None,
            comment: String::new(),
            sectors: Default::default(),
        };
        for &(label, t) in temps {
            record.set_sector(
                label,
                Some(SectorData {
                    temperature: Some(t),
                    ..SectorData::default()
                }),
            );
        }
        record
    }

    #[test]
    fn temperature_filter_matches_any_present_sector() {
        let record = melt(date(2, 1), 1, "Кольцо", &[(SectorLabel::A, 1500.0)]);
        let within = SearchFilter {
            temperature: Some(TemperatureRange::new(1400.0, 1600.0)),
            ..SearchFilter::default()
        };
        let outside = SearchFilter {
            temperature: Some(TemperatureRange::new(1700.0, 1800.0)),
            ..SearchFilter::default()
        };
        assert!(within.matches(&record));
        assert!(!outside.matches(&record));

        let no_temperature = melt(date(2, 1), 2, "Кольцо", &[]);
        assert!(!within.matches(&no_temperature));
    }

    #[test]
    fn date_bounds_are_inclusive() {
        let record = melt(date(2, 10), 1, "Кольцо", &[]);
        let filter = SearchFilter {
            date_from: Some(date(2, 10)),
            date_to: Some(date(2, 10)),
            ..SearchFilter::default()
        };
        assert!(filter.matches(&record));
        let later = SearchFilter {
            date_from: Some(date(2, 11)),
            ..SearchFilter::default()
        };
        assert!(!later.matches(&record));
    }

    #[test]
    fn casting_participant_and_text_filters() {
        let record = melt(date(2, 10), 1, "Кольцо", &[]);

        let casting = |name: &str| SearchFilter {
            casting: CastingFilter::Named(name.into()),
            ..SearchFilter::default()
        };
        assert!(casting("Кольцо").matches(&record));
        assert!(!casting("Крышка").matches(&record));

        let participant = |name: &str| SearchFilter {
            participant: Some(name.into()),
            ..SearchFilter::default()
        };
        assert!(participant("Иванов").matches(&record));
        assert!(participant("Петров").matches(&record));
        assert!(!participant("Сидоров").matches(&record));

        let text = |needle: &str| SearchFilter {
            text: Some(needle.into()),
            ..SearchFilter::default()
        };
        assert!(text("кольц").matches(&record));
        assert!(text("2-001").matches(&record));
        assert!(!text("шестерня").matches(&record));
    }

    #[test]
    fn search_sorts_newest_first() {
        let records = vec![
            melt(date(2, 1), 1, "Кольцо", &[]),
            melt(date(2, 3), 3, "Кольцо", &[]),
            melt(date(2, 3), 2, "Кольцо", &[]),
            melt(date(1, 30), 9, "Крышка", &[]),
        ];
        let found = search(&records, &SearchFilter::default());
        let order: Vec<String> = found.iter().map(|r| r.sequence_number.to_string()).collect();
        assert_eq!(order, ["2-003", "2-002", "2-001", "1-009"]);
    }

    #[test]
    fn statistics_skip_missing_temperatures_and_absent_crew() {
        let records = vec![
            melt(date(2, 1), 1, "Кольцо", &[(SectorLabel::A, 1500.0), (SectorLabel::C, 1400.0)]),
            melt(date(2, 2), 2, "Кольцо", &[]),
            melt(date(2, 3), 3, "Крышка", &[(SectorLabel::D, 1600.0)]),
            melt(date(2, 4), 4, "Блок", &[]),
        ];
        let stats = Statistics::compute(&records, "отсутствует");

        assert_eq!(stats.total, 4);
        assert_eq!(stats.participant_count, 2);
        let t = stats.temperature.unwrap();
        assert_eq!((t.min, t.max, t.samples), (1400.0, 1600.0, 3));
        assert!((t.mean - 1500.0).abs() < f64::EPSILON);

        let names: Vec<&str> = stats.castings.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["Блок", "Кольцо", "Крышка"]);
        assert_eq!(stats.castings[1].count, 2);
        assert!((stats.castings[1].percent - 50.0).abs() < 1e-9);
    }

    #[test]
    fn statistics_report_renders_without_data() {
        let stats = Statistics::compute(&[], "отсутствует");
        assert_eq!(stats.total, 0);
        assert!(stats.temperature.is_none());
        assert!(stats.castings.is_empty());

        let report = stats.to_string();
        assert!(report.contains("Всего записей: 0"));
        assert!(report.contains("Нет данных"));
    }

    #[test]
    fn statistics_report_lists_casting_shares() {
        let records = vec![
            melt(date(2, 1), 1, "Кольцо", &[(SectorLabel::A, 1510.0)]),
            melt(date(2, 2), 2, "", &[]),
        ];
        let report = Statistics::compute(&records, "отсутствует").to_string();
        assert!(report.contains("Средняя: 1510.0°C"));
        assert!(report.contains("Кольцо: 1 (50.0%)"));
        assert!(report.contains("(не указано): 1 (50.0%)"));
    }
}
