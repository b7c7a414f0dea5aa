//! Flat-file backend: one CSV row per melt, laid out by [`Column::ALL`]. The
//! header row of the file is authoritative, so cells are always located by
//! header name and columns this crate does not know about survive rewrites.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use csv::{ByteRecord, ReaderBuilder, WriterBuilder};
use tracing::{error, info, warn};

use super::retry::with_retry;
use super::{decode_rows, RecordStore};
use crate::columns::{Column, FlatFields};
use crate::config::{BackendKind, JournalConfig};
use crate::error::{Error, Result};
use crate::models::MeltRecord;

/// Melt records kept in a CSV sheet that people also open by hand.
///
/// Appends go straight to the end of the file. Updates rewrite it whole,
/// behind a safety copy in the backup directory.
pub struct SheetStore {
    path: PathBuf,
    config: JournalConfig,
    #[cfg(test)]
    fault: Option<WriteFault>,
}

/// Write failures tests can force on the next file write.
#[cfg(test)]
#[derive(Debug, Clone, Copy)]
enum WriteFault {
    /// Creating the file for a rewrite keeps reporting a lock.
    Create,
    /// Only this many bytes reach the file before the write fails.
    After(usize),
}

/// The sheet as read from disk: raw bytes per cell plus the column each
/// header resolves to.
struct Sheet {
    headers: ByteRecord,
    columns: Vec<Option<Column>>,
    rows: Vec<ByteRecord>,
}

impl Sheet {
    fn position(&self, column: Column) -> Option<usize> {
        self.columns.iter().position(|c| *c == Some(column))
    }

    fn fields(&self, row: &ByteRecord) -> FlatFields {
        let mut fields = FlatFields::new();
        for (column, cell) in self.columns.iter().zip(row.iter()) {
            if let Some(column) = column {
                fields.set(*column, String::from_utf8_lossy(cell).into_owned());
            }
        }
        fields
    }

    fn find(&self, id: &str) -> Option<usize> {
        let id_at = self.position(Column::RecordId)?;
        self.rows.iter().position(|row| {
            row.get(id_at)
                .map(|cell| String::from_utf8_lossy(cell).trim() == id)
                .unwrap_or(false)
        })
    }

    /// Cells for `record` in this file's header order.
    fn encode(&self, record: &MeltRecord, ordinal: usize) -> ByteRecord {
        let fields = record.to_flat_fields();
        let mut row = ByteRecord::new();
        for column in &self.columns {
            match column {
                Some(Column::RowOrdinal) => row.push_field(ordinal.to_string().as_bytes()),
                Some(column) if column.is_record_field() => {
                    row.push_field(fields.get(*column).as_bytes())
                }
                _ => row.push_field(b""),
            }
        }
        row
    }

    /// Overwrite the record's own cells in `row`, leaving every other cell as is.
    fn rewrite(&self, row: &ByteRecord, record: &MeltRecord) -> ByteRecord {
        let fields = record.to_flat_fields();
        let width = row.len().max(self.columns.len());
        let mut rewritten = ByteRecord::new();
        for idx in 0..width {
            match self.columns.get(idx).copied().flatten() {
                Some(column) if column.is_record_field() => {
                    rewritten.push_field(fields.get(column).as_bytes())
                }
                _ => rewritten.push_field(row.get(idx).unwrap_or(b"")),
            }
        }
        rewritten
    }
}

impl SheetStore {
    /// A store over `path`. Nothing touches the disk until
    /// [`RecordStore::initialize`].
    pub fn new(path: impl Into<PathBuf>, config: &JournalConfig) -> Self {
        Self {
            path: path.into(),
            config: config.clone(),
            #[cfg(test)]
            fault: None,
        }
    }

    /// Write `bytes` and flush them to disk.
    fn write_payload(&self, file: &mut File, bytes: &[u8]) -> io::Result<()> {
        #[cfg(test)]
        if let Some(WriteFault::After(limit)) = self.fault {
            file.write_all(&bytes[..limit.min(bytes.len())])?;
            return Err(io::Error::other("write interrupted"));
        }
        file.write_all(bytes)?;
        file.sync_all()
    }

    fn create_for_rewrite(&self) -> io::Result<File> {
        #[cfg(test)]
        if let Some(WriteFault::Create) = self.fault {
            return Err(io::ErrorKind::WouldBlock.into());
        }
        File::create(&self.path)
    }

    fn read_sheet(&self) -> Result<Option<Sheet>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let file = with_retry(&self.config.lock_retry, &self.path, || File::open(&self.path))?;
        let mut reader = ReaderBuilder::new()
            .flexible(true)
            .from_reader(BufReader::new(file));

        let headers = reader.byte_headers()?.clone();
        let columns = headers
            .iter()
            .map(|header| Column::from_header(&String::from_utf8_lossy(header)))
            .collect();
        let rows = reader
            .byte_records()
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Some(Sheet {
            headers,
            columns,
            rows,
        }))
    }

    /// Read the sheet, treating a missing file as an empty one laid out by the
    /// canonical table.
    fn read_or_empty(&self) -> Result<Sheet> {
        Ok(self.read_sheet()?.unwrap_or_else(|| Sheet {
            headers: canonical_headers(),
            columns: Column::ALL.into_iter().map(Some).collect(),
            rows: Vec::new(),
        }))
    }

    /// Append one encoded row. A failed write truncates the file back to its
    /// previous length so no partial row is left behind.
    fn append(&self, bytes: &[u8]) -> Result<()> {
        let mut file = with_retry(&self.config.lock_retry, &self.path, || {
            OpenOptions::new().read(true).append(true).open(&self.path)
        })?;
        let before = file
            .metadata()
            .map_err(|err| Error::storage_io(&self.path, err))?
            .len();

        let mut payload = Vec::with_capacity(bytes.len() + 1);
        if before > 0 && !ends_with_newline(&mut file, before) {
            payload.push(b'\n');
        }
        payload.extend_from_slice(bytes);

        if let Err(err) = self.write_payload(&mut file, &payload) {
            if let Err(truncate_err) = file.set_len(before) {
                error!(path = %self.path.display(), error = %truncate_err, "failed to trim partial row");
            }
            return Err(Error::storage_io(&self.path, err));
        }
        Ok(())
    }

    /// Replace the whole file. A safety copy is taken first and put back if
    /// the rewrite fails part way.
    fn rewrite_file(&self, bytes: &[u8]) -> Result<()> {
        let safety = self.safety_copy()?;

        let mut file = match with_retry(&self.config.lock_retry, &self.path, || self.create_for_rewrite()) {
            Ok(file) => file,
            Err(err) => {
                remove_safety_copy(&safety);
                return Err(err);
            }
        };
        if let Err(err) = self.write_payload(&mut file, bytes) {
            drop(file);
            match with_retry(&self.config.lock_retry, &self.path, || fs::copy(&safety, &self.path)) {
                Ok(_) => {
                    warn!(path = %self.path.display(), "sheet rewrite failed, previous contents restored");
                    remove_safety_copy(&safety);
                }
                Err(restore_err) => error!(
                    path = %self.path.display(),
                    safety_copy = %safety.display(),
                    error = %restore_err,
                    "sheet rewrite failed and could not be restored"
                ),
            }
            return Err(Error::storage_io(&self.path, err));
        }

        remove_safety_copy(&safety);
        Ok(())
    }

    fn safety_copy(&self) -> Result<PathBuf> {
        let dir = self.config.backup_path();
        fs::create_dir_all(&dir).map_err(|err| Error::backup_io(&dir, err))?;
        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "sheet".to_string());
        let target = dir.join(format!(
            "{stem}_prewrite_{}.csv",
            Local::now().format(crate::backup::TIMESTAMP_FORMAT)
        ));
        with_retry(&self.config.lock_retry, &self.path, || fs::copy(&self.path, &target))
            .map_err(|err| match err {
                Error::StorageIo { source, .. } => Error::backup_io(&target, source),
                other => other,
            })?;
        Ok(target)
    }
}

impl RecordStore for SheetStore {
    fn initialize(&mut self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|err| Error::storage_init(&self.path, err))?;
        }

        let is_empty = fs::metadata(&self.path).map(|m| m.len() == 0).unwrap_or(true);
        if is_empty {
            let bytes = encode_rows(std::iter::once(&canonical_headers()))?;
            fs::write(&self.path, bytes).map_err(|err| Error::storage_init(&self.path, err))?;
            info!(path = %self.path.display(), "created melt sheet");
            return Ok(());
        }

        let sheet = self
            .read_sheet()
            .map_err(|err| Error::storage_init(&self.path, err))?
            .ok_or_else(|| Error::storage_init(&self.path, "sheet disappeared during start-up"))?;
        if sheet.position(Column::RecordId).is_none() {
            return Err(Error::storage_init(
                &self.path,
                format!("header row has no '{}' column", Column::RecordId.header()),
            ));
        }
        for column in Column::ALL {
            if sheet.position(column).is_none() {
                warn!(path = %self.path.display(), column = column.header(), "sheet is missing a column");
            }
        }
        info!(path = %self.path.display(), rows = sheet.rows.len(), "melt sheet ready");
        Ok(())
    }

    fn insert(&mut self, record: &MeltRecord) -> Result<()> {
        record.validate(&self.config)?;
        let sheet = self.read_or_empty()?;
        if sheet.find(&record.id).is_some() {
            return Err(Error::DuplicateId {
                id: record.id.clone(),
            });
        }

        let row = sheet.encode(record, sheet.rows.len() + 1);
        if self.path.exists() {
            self.append(&encode_rows(std::iter::once(&row))?)?;
        } else {
            let bytes = encode_rows([&sheet.headers, &row])?;
            fs::write(&self.path, bytes).map_err(|err| Error::storage_io(&self.path, err))?;
        }
        info!(id = %record.id, sequence = %record.sequence_number, "melt recorded");
        Ok(())
    }

    fn update(&mut self, record: &MeltRecord) -> Result<()> {
        record.validate(&self.config)?;
        let mut sheet = self.read_or_empty()?;
        let idx = sheet.find(&record.id).ok_or_else(|| Error::RecordNotFound {
            id: record.id.clone(),
        })?;

        let rewritten = sheet.rewrite(&sheet.rows[idx], record);
        sheet.rows[idx] = rewritten;
        let bytes = encode_rows(std::iter::once(&sheet.headers).chain(sheet.rows.iter()))?;
        self.rewrite_file(&bytes)?;
        info!(id = %record.id, "melt updated");
        Ok(())
    }

    fn get_by_id(&self, id: &str) -> Result<Option<MeltRecord>> {
        let Some(sheet) = self.read_sheet()? else {
            return Ok(None);
        };
        let Some(idx) = sheet.find(id) else {
            return Ok(None);
        };
        MeltRecord::from_flat_fields(&sheet.fields(&sheet.rows[idx]))
            .map(Some)
            .map_err(|err| Error::CorruptRecord {
                id: id.to_string(),
                reason: err.to_string(),
            })
    }

    fn list_all(&self) -> Result<Vec<MeltRecord>> {
        let Some(sheet) = self.read_sheet()? else {
            return Ok(Vec::new());
        };
        let rows = sheet.rows.iter().map(|row| sheet.fields(row));
        Ok(decode_rows(rows, &self.path))
    }

    fn exists_id(&self, id: &str) -> Result<bool> {
        Ok(self
            .read_sheet()?
            .map(|sheet| sheet.find(id).is_some())
            .unwrap_or(false))
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn backend(&self) -> BackendKind {
        BackendKind::Sheet
    }
}

fn remove_safety_copy(path: &Path) {
    if let Err(err) = fs::remove_file(path) {
        warn!(path = %path.display(), error = %err, "failed to remove safety copy");
    }
}

fn canonical_headers() -> ByteRecord {
    Column::ALL.iter().map(|column| column.header()).collect()
}

fn encode_rows<'a>(rows: impl IntoIterator<Item = &'a ByteRecord>) -> Result<Vec<u8>> {
    let mut writer = WriterBuilder::new().flexible(true).from_writer(Vec::new());
    for row in rows {
        writer.write_byte_record(row)?;
    }
    writer
        .into_inner()
        .map_err(|err| Error::Csv(err.into_error().into()))
}

fn ends_with_newline(file: &mut File, len: u64) -> bool {
    let mut last = [0u8; 1];
    file.seek(SeekFrom::Start(len - 1))
        .and_then(|_| file.read_exact(&mut last))
        .map(|()| last[0] == b'\n')
        .unwrap_or(true)
}
