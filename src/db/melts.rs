//! SQL for the two-table melt layout. Each function wraps one logical
//! operation; the writing ones run inside a single transaction so the primary
//! row and its four sector rows commit or roll back together.

use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, Error as SqlError, ErrorCode, OptionalExtension, Row, Transaction};

use crate::columns::{Column, FlatFields};
use crate::error::{Error, Result};
use crate::models::{format_time, MeltRecord, SectorData, SectorLabel};

/// Storage format of `plavki.date`.
pub(crate) const SQL_DATE_FORMAT: &str = "%Y-%m-%d";

/// One row per melt, sectors folded in through four left joins. The selected
/// columns line up with [`selected_columns`].
const SELECT_MELTS: &str = "
    SELECT p.id, p.uchet_number, p.date, p.plavka_number, p.cluster_number,
           p.senior_shift, p.participant1, p.participant2, p.participant3, p.participant4,
           p.casting_name, p.experiment_type, p.comment,
           sa.sector_number, sa.heating_time, sa.movement_time, sa.pouring_time, sa.temperature,
           sb.sector_number, sb.heating_time, sb.movement_time, sb.pouring_time, sb.temperature,
           sc.sector_number, sc.heating_time, sc.movement_time, sc.pouring_time, sc.temperature,
           sd.sector_number, sd.heating_time, sd.movement_time, sd.pouring_time, sd.temperature
    FROM plavki p
    LEFT JOIN sectors sa ON sa.plavka_id = p.id AND sa.sector_name = 'A'
    LEFT JOIN sectors sb ON sb.plavka_id = p.id AND sb.sector_name = 'B'
    LEFT JOIN sectors sc ON sc.plavka_id = p.id AND sc.sector_name = 'C'
    LEFT JOIN sectors sd ON sd.plavka_id = p.id AND sd.sector_name = 'D'";

fn selected_columns() -> impl Iterator<Item = Column> {
    [
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
        Column::Comment,
    ]
    .into_iter()
    .chain(SectorLabel::ALL.into_iter().flat_map(Column::sector_fields))
}

/// Read the joined row as text. Legacy rows may hold `''` in the REAL column,
/// so values are taken by storage class rather than by declared type.
fn read_fields(row: &Row<'_>) -> rusqlite::Result<FlatFields> {
    let mut fields = FlatFields::new();
    for (idx, column) in selected_columns().enumerate() {
        let text = match row.get_ref(idx)? {
            ValueRef::Null => String::new(),
            ValueRef::Integer(value) => value.to_string(),
            ValueRef::Real(value) => value.to_string(),
            ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
                String::from_utf8_lossy(bytes).into_owned()
            }
        };
        fields.set(column, text);
    }
    Ok(fields)
}

/// Every melt row, newest date first.
pub(crate) fn fetch_melts(conn: &Connection) -> Result<Vec<FlatFields>> {
    let mut stmt = conn.prepare(&format!("{SELECT_MELTS} ORDER BY p.date DESC"))?;
    let rows = stmt
        .query_map([], read_fields)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// The row for `id`, or `None` when no melt carries it.
pub(crate) fn fetch_melt(conn: &Connection, id: &str) -> Result<Option<FlatFields>> {
    let fields = conn
        .query_row(&format!("{SELECT_MELTS} WHERE p.id = ?1"), [id], read_fields)
        .optional()?;
    Ok(fields)
}

/// Whether a primary row with `id` exists. Sector rows are not consulted.
pub(crate) fn melt_exists(conn: &Connection, id: &str) -> Result<bool> {
    let exists = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM plavki WHERE id = ?1)",
        [id],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// Insert the primary row and all four sector rows in one transaction.
pub(crate) fn insert_melt(conn: &mut Connection, record: &MeltRecord) -> Result<()> {
    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO plavki (
            id, uchet_number, date, plavka_number, cluster_number,
            senior_shift, participant1, participant2, participant3, participant4,
            casting_name, experiment_type, comment
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            record.id,
            record.accounting_number,
            record.date.format(SQL_DATE_FORMAT).to_string(),
            record.sequence_number.to_string(),
            record.cluster_number,
            record.senior_shift,
            record.participants[0],
            record.participants[1],
            record.participants[2],
            record.participants[3],
            record.casting_name,
            record.experiment_type.map(|t| t.label()),
            record.comment,
        ],
    )
    .map_err(|err| map_duplicate_id(err, &record.id))?;

    write_sectors(&tx, record)?;
    tx.commit()?;
    Ok(())
}

/// Rewrite every mutable column. The transaction is dropped (rolled back) when
/// no primary row matches.
pub(crate) fn update_melt(conn: &mut Connection, record: &MeltRecord) -> Result<()> {
    let tx = conn.transaction()?;
    let updated = tx.execute(
        "UPDATE plavki SET
            uchet_number = ?1, date = ?2, plavka_number = ?3, cluster_number = ?4,
            senior_shift = ?5, participant1 = ?6, participant2 = ?7, participant3 = ?8,
            participant4 = ?9, casting_name = ?10, experiment_type = ?11, comment = ?12
         WHERE id = ?13",
        params![
            record.accounting_number,
            record.date.format(SQL_DATE_FORMAT).to_string(),
            record.sequence_number.to_string(),
            record.cluster_number,
            record.senior_shift,
            record.participants[0],
            record.participants[1],
            record.participants[2],
            record.participants[3],
            record.casting_name,
            record.experiment_type.map(|t| t.label()),
            record.comment,
            record.id,
        ],
    )?;

    if updated == 0 {
        return Err(Error::RecordNotFound {
            id: record.id.clone(),
        });
    }

    write_sectors(&tx, record)?;
    tx.commit()?;
    Ok(())
}

/// Upsert one row per sector label. Absent sectors are stored as all-NULL
/// rows so every melt keeps exactly four sector rows.
fn write_sectors(tx: &Transaction<'_>, record: &MeltRecord) -> Result<()> {
    let mut stmt = tx.prepare(
        "INSERT INTO sectors (
            plavka_id, sector_name, sector_number,
            heating_time, movement_time, pouring_time, temperature
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ON CONFLICT(plavka_id, sector_name) DO UPDATE SET
            sector_number = excluded.sector_number,
            heating_time = excluded.heating_time,
            movement_time = excluded.movement_time,
            pouring_time = excluded.pouring_time,
            temperature = excluded.temperature",
    )?;

    for label in SectorLabel::ALL {
        let empty = SectorData::default();
        let sector = record.sector(label).unwrap_or(&empty);
        stmt.execute(params![
            record.id,
            label.as_str(),
            non_blank(sector.sector_number.clone()),
            non_blank(format_time(sector.heating_time)),
            non_blank(format_time(sector.movement_time)),
            non_blank(format_time(sector.pouring_time)),
            sector.temperature,
        ])?;
    }
    Ok(())
}

fn non_blank(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

/// A constraint violation on the primary insert can only be a reused id.
fn map_duplicate_id(err: SqlError, id: &str) -> Error {
    if matches!(
        err.sqlite_error_code(),
        Some(ErrorCode::ConstraintViolation)
    ) {
        Error::DuplicateId { id: id.to_string() }
    } else {
        err.into()
    }
}
