//! Append-only file format shared by the account journal and the
//! transaction log.
//!
//! A type-extensible, binary format with:
//! - 20-byte naturally aligned header
//! - CRC32 checksum for integrity
//! - bincode serialization for payloads
//! - replay that keeps the longest valid prefix and truncates a torn tail
//!
//! # Header Layout (20 bytes)
//!
//! ```text
//! ┌────────────┬───────────┬────────────────────────────────────┐
//! │ payload_len│ 2 bytes   │ Payload size (max 64KB)            │
//! │ entry_type │ 1 byte    │ Entry type (Open/Delta/...)        │
//! │ version    │ 1 byte    │ Payload format version (0-255)     │
//! │ epoch      │ 4 bytes   │ EPOCH (restarts bump the epoch)    │
//! │ seq_id     │ 8 bytes   │ Monotonic sequence within EPOCH    │
//! │ checksum   │ 4 bytes   │ CRC32 of payload                   │
//! └────────────┴───────────┴────────────────────────────────────┘
//! ```

use crc32fast::Hasher;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use thiserror::Error;

// ============================================================
// CONSTANTS
// ============================================================

/// Header size in bytes (20 bytes, naturally aligned)
pub const WAL_HEADER_SIZE: usize = 20;

// ============================================================
// HEADER (20 bytes)
// ============================================================

/// Universal WAL header (20 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalHeader {
    /// Monotonic sequence within EPOCH (8 bytes)
    pub seq_id: u64,
    /// EPOCH number (incremented every time the file is reopened) (4 bytes)
    pub epoch: u32,
    /// CRC32 checksum of payload (4 bytes)
    pub checksum: u32,
    /// Payload size in bytes (max 64KB) (2 bytes)
    pub payload_len: u16,
    /// Entry type (see WalEntryType enum) (1 byte)
    pub entry_type: u8,
    /// Payload format version (0-255) (1 byte)
    pub version: u8,
}

impl WalHeader {
    /// Create a new header with CRC32 checksum calculated from payload
    pub fn new(entry_type: WalEntryType, epoch: u32, seq_id: u64, payload: &[u8]) -> Self {
        let checksum = crc32_checksum(payload);
        Self {
            payload_len: payload.len() as u16,
            entry_type: entry_type as u8,
            version: 0,
            epoch,
            seq_id,
            checksum,
        }
    }

    /// Serialize header to bytes (20 bytes)
    pub fn to_bytes(&self) -> [u8; WAL_HEADER_SIZE] {
        let mut buf = [0u8; WAL_HEADER_SIZE];
        buf[0..2].copy_from_slice(&self.payload_len.to_le_bytes());
        buf[2] = self.entry_type;
        buf[3] = self.version;
        buf[4..8].copy_from_slice(&self.epoch.to_le_bytes());
        buf[8..16].copy_from_slice(&self.seq_id.to_le_bytes());
        buf[16..20].copy_from_slice(&self.checksum.to_le_bytes());
        buf
    }

    /// Deserialize header from bytes
    pub fn from_bytes(buf: &[u8; WAL_HEADER_SIZE]) -> Self {
        Self {
            payload_len: u16::from_le_bytes([buf[0], buf[1]]),
            entry_type: buf[2],
            version: buf[3],
            epoch: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
            seq_id: u64::from_le_bytes([
                buf[8], buf[9], buf[10], buf[11], buf[12], buf[13], buf[14], buf[15],
            ]),
            checksum: u32::from_le_bytes([buf[16], buf[17], buf[18], buf[19]]),
        }
    }

    /// Verify CRC32 checksum against payload
    pub fn verify_checksum(&self, payload: &[u8]) -> bool {
        self.checksum == crc32_checksum(payload)
    }
}

// ============================================================
// ENTRY TYPES
// ============================================================

/// Entry types across both durable files
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalEntryType {
    /// Account journal: account opened with an initial balance
    AccountOpen = 1,
    /// Account journal: single-account balance delta
    BalanceDelta = 2,
    /// Account journal: two-sided transfer apply (debit + credit, one entry)
    TransferApply = 3,
    /// Transaction log: transfer record state
    TransferRecord = 4,
}

impl TryFrom<u8> for WalEntryType {
    type Error = io::Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::AccountOpen),
            2 => Ok(Self::BalanceDelta),
            3 => Ok(Self::TransferApply),
            4 => Ok(Self::TransferRecord),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Unknown WalEntryType: {}", value),
            )),
        }
    }
}

// ============================================================
// CRC32 HELPER
// ============================================================

/// Calculate CRC32 checksum of data
#[inline]
pub fn crc32_checksum(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

// ============================================================
// APPEND ERRORS
// ============================================================

/// Failure modes of a durable append.
///
/// `Withdrawn` means the partial entry was truncated away: the caller may
/// safely report "nothing happened". `Indeterminate` means the file may or
/// may not contain the entry; only replay can tell.
#[derive(Debug, Error, Clone)]
pub enum WalAppendError {
    #[error("wal append failed, entry withdrawn: {0}")]
    Withdrawn(String),

    #[error("wal append failed, entry state unknown: {0}")]
    Indeterminate(String),
}

// ============================================================
// WAL FILE (append side)
// ============================================================

/// Append-only WAL file with write-through durability.
///
/// Every `append` writes header + payload and (if `sync` is set) fsyncs
/// before returning. If any step fails the writer attempts to truncate the
/// file back to the last durable entry so a half-written entry is never
/// left behind; if even the truncate fails the error is reported as
/// indeterminate.
pub struct WalFile {
    file: File,
    offset: u64,
    epoch: u32,
    next_seq: u64,
    sync: bool,
}

/// A single replayed entry (header + payload)
#[derive(Debug)]
pub struct WalEntry {
    pub header: WalHeader,
    pub payload: Vec<u8>,
}

/// Result of opening a WAL file: the writer plus the valid entries found.
pub struct WalOpen {
    pub wal: WalFile,
    pub entries: Vec<WalEntry>,
    /// True if a torn/corrupt tail was truncated during replay
    pub truncated: bool,
}

impl WalFile {
    /// Open (or create) a WAL file, replaying existing entries.
    ///
    /// The longest valid prefix is returned; a torn or corrupt tail is
    /// truncated. The epoch of new entries is one higher than the highest
    /// epoch seen, so restarts are visible in the entry stream.
    pub fn open(path: impl AsRef<Path>, sync: bool) -> io::Result<WalOpen> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;

        let mut entries = Vec::new();
        let mut valid_len: u64 = 0;
        let mut max_epoch: u32 = 0;
        let mut truncated = false;

        loop {
            match read_entry(&mut file) {
                Ok(Some(entry)) => {
                    valid_len += WAL_HEADER_SIZE as u64 + entry.payload.len() as u64;
                    max_epoch = max_epoch.max(entry.header.epoch);
                    entries.push(entry);
                }
                Ok(None) => break,
                Err(e) => {
                    // Torn or corrupt tail: keep the valid prefix only.
                    tracing::warn!(
                        error = %e,
                        valid_len = valid_len,
                        "wal tail invalid, truncating to last durable entry"
                    );
                    truncated = true;
                    break;
                }
            }
        }

        file.set_len(valid_len)?;
        file.seek(SeekFrom::Start(valid_len))?;
        if truncated && sync {
            file.sync_data()?;
        }

        let wal = WalFile {
            file,
            offset: valid_len,
            epoch: max_epoch + 1,
            next_seq: 1,
            sync,
        };

        Ok(WalOpen {
            wal,
            entries,
            truncated,
        })
    }

    /// Append an entry and make it durable.
    ///
    /// Returns the assigned seq_id.
    pub fn append(
        &mut self,
        entry_type: WalEntryType,
        payload: &[u8],
    ) -> Result<u64, WalAppendError> {
        let seq_id = self.next_seq;
        let header = WalHeader::new(entry_type, self.epoch, seq_id, payload);

        let result = self
            .file
            .write_all(&header.to_bytes())
            .and_then(|_| self.file.write_all(payload))
            .and_then(|_| if self.sync { self.file.sync_data() } else { Ok(()) });

        match result {
            Ok(()) => {
                self.offset += WAL_HEADER_SIZE as u64 + payload.len() as u64;
                self.next_seq += 1;
                Ok(seq_id)
            }
            Err(e) => {
                // Withdraw the partial entry so the file never holds
                // unacknowledged bytes.
                match self
                    .file
                    .set_len(self.offset)
                    .and_then(|_| self.file.seek(SeekFrom::Start(self.offset)).map(|_| ()))
                {
                    Ok(()) => Err(WalAppendError::Withdrawn(e.to_string())),
                    Err(trunc_err) => Err(WalAppendError::Indeterminate(format!(
                        "write failed ({}) and truncate failed ({})",
                        e, trunc_err
                    ))),
                }
            }
        }
    }

    /// Bytes of durable entries in the file
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Epoch stamped on new entries
    pub fn epoch(&self) -> u32 {
        self.epoch
    }
}

/// Read the next entry from a reader, returning `Ok(None)` at a clean EOF.
///
/// A partial header at EOF is also treated as a clean end (torn tail is the
/// caller's concern); a partial payload or checksum mismatch is an error.
pub fn read_entry<R: Read>(reader: &mut R) -> io::Result<Option<WalEntry>> {
    let mut header_buf = [0u8; WAL_HEADER_SIZE];
    match reader.read_exact(&mut header_buf) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let header = WalHeader::from_bytes(&header_buf);

    let mut payload = vec![0u8; header.payload_len as usize];
    reader.read_exact(&mut payload)?;

    if !header.verify_checksum(&payload) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "CRC32 checksum mismatch at seq_id={}, expected={}, got={}",
                header.seq_id,
                header.checksum,
                crc32_checksum(&payload)
            ),
        ));
    }

    Ok(Some(WalEntry { header, payload }))
}

// ============================================================
// TESTS
// ============================================================
