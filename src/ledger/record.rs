//! Ledger log record framing
//!
//! Each record on disk:
//! - Record Length (u32 LE), total including this field and the checksum
//! - Record Kind (u8)
//! - Sequence Number (u64 LE), per file, starting at 1
//! - Body (variable)
//! - Checksum (u32 LE), CRC32 over everything before it

use std::io;

use crc32fast::Hasher;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordKind {
    /// A committed transaction as JSON
    Transaction = 0,
    /// A draft record as JSON
    DraftAppend = 1,
    /// Removal of a draft record; body is its seq (u64 LE)
    DraftRemove = 2,
    /// Removal of every draft record; empty body
    DraftClear = 3,
}

impl RecordKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(RecordKind::Transaction),
            1 => Some(RecordKind::DraftAppend),
            2 => Some(RecordKind::DraftRemove),
            3 => Some(RecordKind::DraftClear),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Smallest valid record: length + kind + sequence + checksum
pub const MIN_RECORD_SIZE: usize = 4 + 1 + 8 + 4;

pub fn compute_checksum(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerRecord {
    pub kind: RecordKind,
    pub sequence_number: u64,
    pub body: Vec<u8>,
}

impl LedgerRecord {
    pub fn new(kind: RecordKind, sequence_number: u64, body: Vec<u8>) -> Self {
        Self {
            kind,
            sequence_number,
            body,
        }
    }

    pub fn serialize(&self) -> Vec<u8> {
        let record_length = (MIN_RECORD_SIZE + self.body.len()) as u32;

        let mut record = Vec::with_capacity(record_length as usize);
        record.extend_from_slice(&record_length.to_le_bytes());
        record.push(self.kind.as_u8());
        record.extend_from_slice(&self.sequence_number.to_le_bytes());
        record.extend_from_slice(&self.body);

        let checksum = compute_checksum(&record);
        record.extend_from_slice(&checksum.to_le_bytes());
        record
    }

    /// Parses one record from the front of `data`, verifying its checksum.
    /// Returns the record and the number of bytes consumed.
    pub fn deserialize(data: &[u8]) -> io::Result<(Self, usize)> {
        if data.len() < MIN_RECORD_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "Record too short",
            ));
        }

        let record_length = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
        if record_length < MIN_RECORD_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Invalid record length: {}", record_length),
            ));
        }
        if data.len() < record_length {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "Record truncated: expected {} bytes, got {}",
                    record_length,
                    data.len()
                ),
            ));
        }

        let checksum_offset = record_length - 4;
        let stored = u32::from_le_bytes([
            data[checksum_offset],
            data[checksum_offset + 1],
            data[checksum_offset + 2],
            data[checksum_offset + 3],
        ]);
        let computed = compute_checksum(&data[..checksum_offset]);
        if computed != stored {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Checksum mismatch: computed {:08x}, stored {:08x}",
                    computed, stored
                ),
            ));
        }

        let kind = RecordKind::from_u8(data[4]).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Invalid record kind: {}", data[4]),
            )
        })?;

        let mut sequence = [0u8; 8];
        sequence.copy_from_slice(&data[5..13]);

        Ok((
            LedgerRecord {
                kind,
                sequence_number: u64::from_le_bytes(sequence),
                body: data[13..checksum_offset].to_vec(),
            },
            record_length,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_layout() {
        let record = LedgerRecord::new(RecordKind::DraftAppend, 7, b"{}".to_vec());
        let bytes = record.serialize();

        assert_eq!(bytes.len(), MIN_RECORD_SIZE + 2);
        assert_eq!(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]), 19);
        assert_eq!(bytes[4], 1);
        assert_eq!(&bytes[13..15], b"{}");

        let (back, consumed) = LedgerRecord::deserialize(&bytes).unwrap();
        assert_eq!(back, record);
        assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn test_flipped_bit_fails_checksum() {
        let mut bytes = LedgerRecord::new(RecordKind::Transaction, 1, b"payload".to_vec()).serialize();
        bytes[14] ^= 0x01;

        let err = LedgerRecord::deserialize(&bytes).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert!(err.to_string().contains("Checksum mismatch"));
    }

    #[test]
    fn test_truncated_record() {
        let bytes = LedgerRecord::new(RecordKind::Transaction, 1, b"payload".to_vec()).serialize();
        let err = LedgerRecord::deserialize(&bytes[..bytes.len() - 1]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let mut bytes = LedgerRecord::new(RecordKind::DraftClear, 1, Vec::new()).serialize();
        bytes[4] = 9;
        let checksum_offset = bytes.len() - 4;
        let checksum = compute_checksum(&bytes[..checksum_offset]);
        bytes[checksum_offset..].copy_from_slice(&checksum.to_le_bytes());

        let err = LedgerRecord::deserialize(&bytes).unwrap_err();
        assert!(err.to_string().contains("Invalid record kind"));
    }
}
