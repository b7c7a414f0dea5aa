//! The canonical column table. Every stored field of a melt has exactly one
//! [`Column`], and [`Column::ALL`] fixes the header order of the sheet file.
//! Both backends encode and decode records through [`FlatFields`], so there is
//! a single place where a field name maps to a value.

use std::collections::HashMap;

use crate::error::RowError;
use crate::models::{format_time, ExperimentType, MeltRecord, SectorData, SectorLabel, SequenceNumber};
use crate::validation::{parse_date, parse_temperature, parse_time};

/// Date format used by the sheet file and `FlatFields`.
pub const FLAT_DATE_FORMAT: &str = "%d.%m.%Y";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    RecordId,
    AccountingNumber,
    Date,
    SequenceNumber,
    ClusterNumber,
    SeniorShift,
    Participant1,
    Participant2,
    Participant3,
    Participant4,
    CastingName,
    ExperimentType,
    SectorNumber(SectorLabel),
    HeatingTime(SectorLabel),
    MovementTime(SectorLabel),
    PouringTime(SectorLabel),
    Temperature(SectorLabel),
    Comment,
    /// Single pour time from the pre-sector layout. Kept, never written.
    LegacyPouringTime,
    /// 1-based data row number in the sheet file.
    RowOrdinal,
}

use SectorLabel::{A, B, C, D};

impl Column {
    pub const ALL: [Column; 35] = [
        Column::RecordId,
        Column::AccountingNumber,
        Column::Date,
        Column::SequenceNumber,
        Column::ClusterNumber,
        Column::SeniorShift,
        Column::Participant1,
        Column::Participant2,
        Column::Participant3,
        Column::Participant4,
        Column::CastingName,
        Column::ExperimentType,
        Column::SectorNumber(A),
        Column::SectorNumber(B),
        Column::SectorNumber(C),
        Column::SectorNumber(D),
        Column::HeatingTime(A),
        Column::MovementTime(A),
        Column::PouringTime(A),
        Column::Temperature(A),
        Column::HeatingTime(B),
        Column::MovementTime(B),
        Column::PouringTime(B),
        Column::Temperature(B),
        Column::HeatingTime(C),
        Column::MovementTime(C),
        Column::PouringTime(C),
        Column::Temperature(C),
        Column::HeatingTime(D),
        Column::MovementTime(D),
        Column::PouringTime(D),
        Column::Temperature(D),
        Column::Comment,
        Column::LegacyPouringTime,
        Column::RowOrdinal,
    ];

    /// Header text in the sheet file.
    pub const fn header(self) -> &'static str {
        match self {
            Column::RecordId => "id_plavka",
            Column::AccountingNumber => "Учетный_номер",
            Column::Date => "Плавка_дата",
            Column::SequenceNumber => "Номер_плавки",
            Column::ClusterNumber => "Номер_кластера",
            Column::SeniorShift => "Старший_смены_плавки",
            Column::Participant1 => "Первый_участник_смены_плавки",
            Column::Participant2 => "Второй_участник_смены_плавки",
            Column::Participant3 => "Третий_участник_смены_плавки",
            Column::Participant4 => "Четвертый_участник_смены_плавки",
            Column::CastingName => "Наименование_отливки",
            Column::ExperimentType => "Тип_эксперемента",
            Column::SectorNumber(A) => "Сектор_A_опоки",
            Column::SectorNumber(B) => "Сектор_B_опоки",
            Column::SectorNumber(C) => "Сектор_C_опоки",
            Column::SectorNumber(D) => "Сектор_D_опоки",
            Column::HeatingTime(A) => "Плавка_время_прогрева_ковша_A",
            Column::HeatingTime(B) => "Плавка_время_прогрева_ковша_B",
            Column::HeatingTime(C) => "Плавка_время_прогрева_ковша_C",
            Column::HeatingTime(D) => "Плавка_время_прогрева_ковша_D",
            Column::MovementTime(A) => "Плавка_время_перемещения_A",
            Column::MovementTime(B) => "Плавка_время_перемещения_B",
            Column::MovementTime(C) => "Плавка_время_перемещения_C",
            Column::MovementTime(D) => "Плавка_время_перемещения_D",
            Column::PouringTime(A) => "Плавка_время_заливки_A",
            Column::PouringTime(B) => "Плавка_время_заливки_B",
            Column::PouringTime(C) => "Плавка_время_заливки_C",
            Column::PouringTime(D) => "Плавка_время_заливки_D",
            Column::Temperature(A) => "Плавка_температура_заливки_A",
            Column::Temperature(B) => "Плавка_температура_заливки_B",
            Column::Temperature(C) => "Плавка_температура_заливки_C",
            Column::Temperature(D) => "Плавка_температура_заливки_D",
            Column::Comment => "Комментарий",
            Column::LegacyPouringTime => "Плавка_время_заливки",
            Column::RowOrdinal => "id",
        }
    }

    pub fn from_header(header: &str) -> Option<Column> {
        let header = header.trim();
        Column::ALL.into_iter().find(|column| column.header() == header)
    }

    /// Columns owned by a record, i.e. everything an update rewrites.
    pub fn is_record_field(self) -> bool {
        !matches!(self, Column::LegacyPouringTime | Column::RowOrdinal)
    }

    pub fn sector_fields(label: SectorLabel) -> [Column; 5] {
        [
            Column::SectorNumber(label),
            Column::HeatingTime(label),
            Column::MovementTime(label),
            Column::PouringTime(label),
            Column::Temperature(label),
        ]
    }
}

/// A flat `Column -> text` view of one stored row. Blank cells and missing
/// cells are the same thing.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FlatFields {
    values: HashMap<Column, String>,
}

impl FlatFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from parallel header/cell sequences, ignoring unknown headers.
    pub fn from_row<'a>(
        headers: impl IntoIterator<Item = &'a str>,
        cells: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        let mut fields = Self::new();
        for (header, cell) in headers.into_iter().zip(cells) {
            if let Some(column) = Column::from_header(header) {
                fields.set(column, cell);
            }
        }
        fields
    }

    pub fn get(&self, column: Column) -> &str {
        self.values.get(&column).map(String::as_str).unwrap_or("")
    }

    pub fn set(&mut self, column: Column, value: impl Into<String>) {
        let value = value.into();
        if value.is_empty() {
            self.values.remove(&column);
        } else {
            self.values.insert(column, value);
        }
    }

    /// All columns in canonical header order.
    pub fn iter(&self) -> impl Iterator<Item = (Column, &str)> + '_ {
        Column::ALL.into_iter().map(move |column| (column, self.get(column)))
    }

    fn is_blank(&self, column: Column) -> bool {
        self.get(column).trim().is_empty()
    }
}

impl MeltRecord {
    pub fn to_flat_fields(&self) -> FlatFields {
        let mut fields = FlatFields::new();
        fields.set(Column::RecordId, self.id.as_str());
        fields.set(Column::AccountingNumber, self.accounting_number.as_str());
        fields.set(Column::Date, self.date.format(FLAT_DATE_FORMAT).to_string());
        fields.set(Column::SequenceNumber, self.sequence_number.to_string());
        fields.set(Column::ClusterNumber, self.cluster_number.as_str());
        fields.set(Column::SeniorShift, self.senior_shift.as_str());
        let [p1, p2, p3, p4] = &self.participants;
        fields.set(Column::Participant1, p1.as_str());
        fields.set(Column::Participant2, p2.as_str());
        fields.set(Column::Participant3, p3.as_str());
        fields.set(Column::Participant4, p4.as_str());
        fields.set(Column::CastingName, self.casting_name.as_str());
        fields.set(
            Column::ExperimentType,
            self.experiment_type.map(|t| t.label()).unwrap_or(""),
        );
        for (label, sector) in self.present_sectors() {
            fields.set(Column::SectorNumber(label), sector.sector_number.as_str());
            fields.set(Column::HeatingTime(label), format_time(sector.heating_time));
            fields.set(Column::MovementTime(label), format_time(sector.movement_time));
            fields.set(Column::PouringTime(label), format_time(sector.pouring_time));
            fields.set(
                Column::Temperature(label),
                sector.temperature.map(|t| t.to_string()).unwrap_or_default(),
            );
        }
        fields.set(Column::Comment, self.comment.as_str());
        fields
    }

    /// Inverse of [`MeltRecord::to_flat_fields`]. A sector whose cells are all
    /// blank decodes as absent.
    pub fn from_flat_fields(fields: &FlatFields) -> Result<MeltRecord, RowError> {
        let header = |column: Column| column.header();

        let id = fields.get(Column::RecordId).trim();
        if id.is_empty() {
            return Err(RowError::new(header(Column::RecordId), "empty record id"));
        }

        let raw_date = fields.get(Column::Date);
        let date = parse_date(raw_date).ok_or_else(|| {
            RowError::new(header(Column::Date), format!("unreadable date '{raw_date}'"))
        })?;

        let sequence_number = fields
            .get(Column::SequenceNumber)
            .parse::<SequenceNumber>()
            .map_err(|err| {
                RowError::new(header(Column::SequenceNumber), err.kind.to_string())
            })?;

        let experiment_type = match fields.get(Column::ExperimentType).trim() {
            "" => None,
            raw => Some(raw.parse::<ExperimentType>().map_err(|err| {
                RowError::new(header(Column::ExperimentType), err.kind.to_string())
            })?),
        };

        let mut sectors: [Option<SectorData>; 4] = Default::default();
        for label in SectorLabel::ALL {
            if Column::sector_fields(label)
                .into_iter()
                .all(|column| fields.is_blank(column))
            {
                continue;
            }
            let time = |column: Column| {
                parse_time(fields.get(column))
                    .map_err(|kind| RowError::new(header(column), kind.to_string()))
            };
            let temperature_column = Column::Temperature(label);
            sectors[label.index()] = Some(SectorData {
                sector_number: fields.get(Column::SectorNumber(label)).to_string(),
                heating_time: time(Column::HeatingTime(label))?,
                movement_time: time(Column::MovementTime(label))?,
                pouring_time: time(Column::PouringTime(label))?,
                temperature: parse_temperature(fields.get(temperature_column))
                    .map_err(|kind| RowError::new(header(temperature_column), kind.to_string()))?,
            });
        }

        Ok(MeltRecord {
            id: id.to_string(),
            accounting_number: fields.get(Column::AccountingNumber).to_string(),
            date,
            sequence_number,
            cluster_number: fields.get(Column::ClusterNumber).to_string(),
            senior_shift: fields.get(Column::SeniorShift).to_string(),
            participants: [
                fields.get(Column::Participant1).to_string(),
                fields.get(Column::Participant2).to_string(),
                fields.get(Column::Participant3).to_string(),
                fields.get(Column::Participant4).to_string(),
            ],
            casting_name: fields.get(Column::CastingName).to_string(),
            experiment_type,
            comment: fields.get(Column::Comment).to_string(),
            sectors,
        })
    }
}
