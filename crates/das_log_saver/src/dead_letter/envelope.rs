//! Dead-letter entry framing.
//!
//! ```text
//! magic "DASF" (4) | version u16 LE (2) | length u32 LE (4) | payload | crc32 u32 LE (4)
//! ```
//!
//! The payload is a CBOR array of insert rows. The CRC covers everything
//! before it.
//!
//! A bad or incomplete entry followed by a valid one is reported as a
//! [`DamagedRegion`] and scanning resumes at the valid entry, so a torn
//! append in the middle of the file never hides later spills.

use crate::error::{SaverError, SaverResult};
use das_codec::{from_cbor, to_cbor, Value};

/// Magic bytes opening every dead-letter entry.
pub const ENTRY_MAGIC: [u8; 4] = *b"DASF";

/// Current entry format version.
pub const ENTRY_VERSION: u16 = 1;

/// magic (4) + version (2) + length (4)
const HEADER_SIZE: usize = 10;

const CRC_SIZE: usize = 4;

/// Frames a batch of insert rows as one entry.
///
/// # Errors
///
/// Returns an error if the rows cannot be encoded or the payload exceeds
/// the 4-byte length field.
pub fn encode_entry(rows: &[Vec<Value>]) -> SaverResult<Vec<u8>> {
    let payload = to_cbor(&Value::Array(rows.iter().cloned().map(Value::Array).collect()))?;
    let len = u32::try_from(payload.len()).map_err(|_| SaverError::EntryTooLarge {
        size: payload.len(),
    })?;

    let mut data = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
    data.extend_from_slice(&ENTRY_MAGIC);
    data.extend_from_slice(&ENTRY_VERSION.to_le_bytes());
    data.extend_from_slice(&len.to_le_bytes());
    data.extend_from_slice(&payload);
    let crc = compute_crc32(&data);
    data.extend_from_slice(&crc.to_le_bytes());
    Ok(data)
}

/// One decoded entry.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedEntry {
    /// Byte offset of the entry in the file.
    pub offset: usize,
    /// Encoded size including the envelope.
    pub size: usize,
    /// Insert rows, each a `Value::Array`.
    pub rows: Vec<Value>,
}

/// How decoding of a file ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEnd {
    /// Every byte belonged to a valid entry.
    Clean,
    /// The file ends inside an entry, as left by a crash mid-append.
    Truncated {
        /// Offset of the incomplete entry.
        offset: usize,
    },
    /// An entry failed validation; nothing after it was decoded.
    Corrupt {
        /// Offset of the first bad byte.
        offset: usize,
        /// What failed.
        reason: String,
    },
}

/// Undecodable bytes between two valid entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DamagedRegion {
    /// Offset of the first bad byte.
    pub offset: usize,
    /// Bytes skipped up to the next valid entry.
    pub size: usize,
    /// What failed at `offset`.
    pub reason: String,
}

/// Result of decoding a whole dead-letter file.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanResult {
    /// Valid entries, in file order.
    pub entries: Vec<DecodedEntry>,
    /// Regions skipped to reach a later valid entry, in file order.
    pub damaged: Vec<DamagedRegion>,
    /// How decoding ended.
    pub end: ScanEnd,
    /// Total bytes scanned.
    pub total_bytes: usize,
}

impl ScanResult {
    /// Offset just past the last valid entry.
    pub fn valid_end(&self) -> usize {
        self.entries.last().map_or(0, |e| e.offset + e.size)
    }

    /// Total bytes in damaged regions.
    pub fn damaged_bytes(&self) -> usize {
        self.damaged.iter().map(|d| d.size).sum()
    }

    /// Total rows across valid entries.
    pub fn row_count(&self) -> usize {
        self.entries.iter().map(|e| e.rows.len()).sum()
    }
}

/// Decodes every entry of a dead-letter file.
///
/// Never fails. A bad entry with a valid entry somewhere after it becomes a
/// [`DamagedRegion`]; otherwise a truncated tail or a corrupt entry ends the
/// scan and is reported through [`ScanResult::end`].
pub fn scan_entries(data: &[u8]) -> ScanResult {
    let mut entries = Vec::new();
    let mut damaged = Vec::new();
    let mut offset = 0;

    let end = loop {
        let remaining = &data[offset..];
        if remaining.is_empty() {
            break ScanEnd::Clean;
        }
        let reason = match decode_one(remaining) {
            Step::Entry { size, rows } => {
                entries.push(DecodedEntry { offset, size, rows });
                offset += size;
                continue;
            }
            Step::Truncated => None,
            Step::Corrupt(reason) => Some(reason),
        };
        match next_valid_entry(data, offset + 1) {
            Some(next) => {
                damaged.push(DamagedRegion {
                    offset,
                    size: next - offset,
                    reason: reason.unwrap_or_else(|| "incomplete entry".into()),
                });
                offset = next;
            }
            None => match reason {
                None => break ScanEnd::Truncated { offset },
                Some(reason) => break ScanEnd::Corrupt { offset, reason },
            },
        }
    };

    ScanResult {
        entries,
        damaged,
        end,
        total_bytes: data.len(),
    }
}

/// Offset of the first checksum-valid entry at or after `from`.
fn next_valid_entry(data: &[u8], from: usize) -> Option<usize> {
    let mut offset = from;
    while offset + ENTRY_MAGIC.len() <= data.len() {
        let found = data[offset..]
            .windows(ENTRY_MAGIC.len())
            .position(|window| window == ENTRY_MAGIC)?;
        offset += found;
        if let Step::Entry { .. } = decode_one(&data[offset..]) {
            return Some(offset);
        }
        offset += 1;
    }
    None
}

enum Step {
    Entry { size: usize, rows: Vec<Value> },
    Truncated,
    Corrupt(String),
}

fn decode_one(data: &[u8]) -> Step {
    // A partial magic is still a truncated tail, a wrong one is not.
    let magic_len = data.len().min(ENTRY_MAGIC.len());
    if data[..magic_len] != ENTRY_MAGIC[..magic_len] {
        return Step::Corrupt("bad magic".into());
    }
    if data.len() < HEADER_SIZE {
        return Step::Truncated;
    }

    let version = u16::from_le_bytes([data[4], data[5]]);
    if version != ENTRY_VERSION {
        return Step::Corrupt(format!("unsupported version {version}"));
    }

    let len = u32::from_le_bytes([data[6], data[7], data[8], data[9]]) as usize;
    let size = HEADER_SIZE + len + CRC_SIZE;
    if data.len() < size {
        return Step::Truncated;
    }

    let body_end = HEADER_SIZE + len;
    let stored_crc = u32::from_le_bytes([
        data[body_end],
        data[body_end + 1],
        data[body_end + 2],
        data[body_end + 3],
    ]);
    if compute_crc32(&data[..body_end]) != stored_crc {
        return Step::Corrupt("checksum mismatch".into());
    }

    match from_cbor(&data[HEADER_SIZE..body_end]) {
        Ok(Value::Array(rows)) => Step::Entry { size, rows },
        Ok(other) => Step::Corrupt(format!("payload is {}, expected array", other.type_name())),
        Err(e) => Step::Corrupt(format!("payload: {e}")),
    }
}

/// Computes CRC32 checksum for data (IEEE polynomial).
pub fn compute_crc32(data: &[u8]) -> u32 {
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    !crc
}
