//! Append-only record log with fsync per append
//!
//! Reading is strict: a checksum failure, a truncated tail or a gap in the
//! sequence numbers is corruption and aborts the read. Nothing after the
//! first bad record is returned.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use super::errors::{LedgerError, LedgerResult};
use super::record::{LedgerRecord, RecordKind, MIN_RECORD_SIZE};

pub struct RecordLog {
    path: PathBuf,
    file: File,
    next_sequence: u64,
}

impl RecordLog {
    /// Opens or creates the log at `path`, creating parent directories.
    /// Returns the log and the records already in it.
    pub fn open(path: &Path) -> LedgerResult<(Self, Vec<LedgerRecord>)> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                LedgerError::io(
                    format!("Failed to create ledger directory: {}", parent.display()),
                    e,
                )
            })?;
        }

        let records = read_records(path)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| {
                LedgerError::io(format!("Failed to open ledger file: {}", path.display()), e)
            })?;

        let next_sequence = records.last().map_or(1, |r| r.sequence_number + 1);
        Ok((
            Self {
                path: path.to_path_buf(),
                file,
                next_sequence,
            },
            records,
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn next_sequence_number(&self) -> u64 {
        self.next_sequence
    }

    pub fn append(&mut self, kind: RecordKind, body: Vec<u8>) -> LedgerResult<u64> {
        self.append_many(kind, vec![body])
    }

    /// Writes all bodies with a single fsync.
    pub fn append_many(&mut self, kind: RecordKind, bodies: Vec<Vec<u8>>) -> LedgerResult<u64> {
        let first = self.next_sequence;
        let count = bodies.len() as u64;
        let mut buf = Vec::new();
        for (offset, body) in bodies.into_iter().enumerate() {
            let record = LedgerRecord::new(kind, first + offset as u64, body);
            buf.extend_from_slice(&record.serialize());
        }

        self.file.write_all(&buf).map_err(|e| {
            LedgerError::append_failed(
                format!("Failed to write ledger record at sequence {}", first),
                e,
            )
        })?;
        self.file.sync_all().map_err(|e| {
            LedgerError::append_failed(
                format!("fsync failed after ledger append at sequence {}", first),
                e,
            )
        })?;

        self.next_sequence += count;
        Ok(self.next_sequence - 1)
    }

    /// Discards every record.
    pub fn truncate(&mut self) -> LedgerResult<()> {
        self.file
            .set_len(0)
            .and_then(|_| self.file.sync_all())
            .map_err(|e| {
                LedgerError::io(format!("Failed to truncate {}", self.path.display()), e)
            })?;
        self.next_sequence = 1;
        Ok(())
    }
}

/// Reads every record of the log at `path`. A missing file is an empty log.
pub fn read_records(path: &Path) -> LedgerResult<Vec<LedgerRecord>> {
    let mut data = Vec::new();
    match File::open(path) {
        Ok(mut file) => {
            file.read_to_end(&mut data).map_err(|e| {
                LedgerError::io(format!("Failed to read ledger file: {}", path.display()), e)
            })?;
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(LedgerError::io(
                format!("Failed to open ledger file: {}", path.display()),
                e,
            ))
        }
    }

    let mut records = Vec::new();
    let mut offset = 0usize;
    let mut last_sequence = 0u64;
    while offset < data.len() {
        let remaining = data.len() - offset;
        if remaining < MIN_RECORD_SIZE {
            return Err(LedgerError::corruption_at_offset(
                offset as u64,
                format!(
                    "Truncated ledger: {} bytes remaining, minimum record size is {}",
                    remaining, MIN_RECORD_SIZE
                ),
            ));
        }

        let (record, consumed) = LedgerRecord::deserialize(&data[offset..])
            .map_err(|e| LedgerError::corruption_at_offset(offset as u64, e.to_string()))?;

        if record.sequence_number != last_sequence + 1 {
            return Err(LedgerError::corruption_at_sequence(
                record.sequence_number,
                format!(
                    "Non-sequential sequence number: expected {}, got {}",
                    last_sequence + 1,
                    record.sequence_number
                ),
            ));
        }

        last_sequence = record.sequence_number;
        offset += consumed;
        records.push(record);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LedgerErrorCode;
    use tempfile::TempDir;

    #[test]
    fn test_append_and_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger").join("test.log");

        {
            let (mut log, records) = RecordLog::open(&path).unwrap();
            assert!(records.is_empty());
            assert_eq!(log.append(RecordKind::Transaction, b"a".to_vec()).unwrap(), 1);
            assert_eq!(
                log.append_many(RecordKind::Transaction, vec![b"b".to_vec(), b"c".to_vec()])
                    .unwrap(),
                3
            );
        }

        let (log, records) = RecordLog::open(&path).unwrap();
        assert_eq!(log.next_sequence_number(), 4);
        let bodies: Vec<_> = records.iter().map(|r| r.body.clone()).collect();
        assert_eq!(bodies, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn test_corruption_halts_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.log");
        {
            let (mut log, _) = RecordLog::open(&path).unwrap();
            log.append(RecordKind::Transaction, b"first".to_vec()).unwrap();
            log.append(RecordKind::Transaction, b"second".to_vec()).unwrap();
        }

        let mut data = fs::read(&path).unwrap();
        let last = data.len() - 6;
        data[last] ^= 0xff;
        fs::write(&path, &data).unwrap();

        let err = read_records(&path).unwrap_err();
        assert_eq!(err.code(), LedgerErrorCode::LedgerCorruption);
        assert!(err.is_fatal());
    }

    #[test]
    fn test_truncated_tail_is_corruption() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.log");
        {
            let (mut log, _) = RecordLog::open(&path).unwrap();
            log.append(RecordKind::Transaction, b"first".to_vec()).unwrap();
        }

        let data = fs::read(&path).unwrap();
        fs::write(&path, &data[..data.len() - 3]).unwrap();

        assert_eq!(
            read_records(&path).unwrap_err().code(),
            LedgerErrorCode::LedgerCorruption
        );
    }

    #[test]
    fn test_truncate_resets_sequence() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.log");
        let (mut log, _) = RecordLog::open(&path).unwrap();
        log.append(RecordKind::DraftAppend, b"x".to_vec()).unwrap();
        log.truncate().unwrap();

        assert_eq!(log.next_sequence_number(), 1);
        assert!(read_records(&path).unwrap().is_empty());
        assert_eq!(log.append(RecordKind::DraftAppend, b"y".to_vec()).unwrap(), 1);
    }
}
