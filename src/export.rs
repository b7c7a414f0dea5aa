//! CSV export of search results in the canonical sheet layout, so an export
//! can be opened next to (or imported into) the flat-file journal.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use tracing::info;

use crate::columns::Column;
use crate::error::{Error, Result};
use crate::models::MeltRecord;

/// Write `records` under the canonical header. The trailing `id` column is
/// filled with the 1-based row number.
pub fn write_csv<W: Write>(records: &[MeltRecord], writer: W) -> Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    writer.write_record(Column::ALL.iter().map(|column| column.header()))?;

    for (idx, record) in records.iter().enumerate() {
        let fields = record.to_flat_fields();
        let ordinal = (idx + 1).to_string();
        writer.write_record(Column::ALL.iter().map(|&column| match column {
            Column::RowOrdinal => ordinal.as_str(),
            column => fields.get(column),
        }))?;
    }

    writer.flush().map_err(csv::Error::from)?;
    Ok(())
}

pub fn export_csv_file(records: &[MeltRecord], path: &Path) -> Result<()> {
    let file = File::create(path).map_err(|err| Error::storage_io(path, err))?;
    write_csv(records, file)?;
    info!(path = %path.display(), records = records.len(), "exported melts");
    Ok(())
}
