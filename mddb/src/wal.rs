//! WAL codec and state machine.
//!
//! On disk the WAL is `body || footer`: newline-terminated JSON
//! records followed by exactly 32 bytes of magic, body length and its
//! complement, CRC-32C and its complement. A frame is only considered
//! committed once the footer passes every structural check; anything
//! short of that is an uncommitted remnant and safe to truncate. A
//! structurally valid footer whose checksum does not match the body is
//! a hard stop: the writes may have been acknowledged, so the file is
//! left untouched for inspection.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};

use serde::{Deserialize, Serialize};

use mddb_core::errors::WalError;

/// Magic bytes opening the footer.
pub const WAL_MAGIC: &[u8; 8] = b"MDDB0001";

/// Fixed footer size in bytes.
pub const FOOTER_LEN: u64 = 32;

/// Operation kind of a WAL record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalOp {
    Put,
    Delete,
}

/// One logical file operation, JSON-encoded in the WAL body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalRecord {
    pub op: WalOp,
    pub id: String,
    pub path: String,
    /// Full file content for puts; absent for deletes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Classification of the on-disk WAL.
#[derive(Debug)]
pub enum WalState {
    /// Size zero; nothing pending.
    Empty,
    /// A partial body without a valid footer. Truncate and proceed.
    Uncommitted,
    /// A complete, checksummed frame. Must be replayed.
    Committed(Vec<WalRecord>),
}

fn io_err(op: &'static str) -> impl FnOnce(std::io::Error) -> WalError {
    move |source| WalError::Io { op, source }
}

/// Frame a record sequence: JSON-lines body plus footer.
pub fn encode_frame(records: &[WalRecord]) -> Result<Vec<u8>, WalError> {
    let mut frame = Vec::new();
    for rec in records {
        serde_json::to_writer(&mut frame, rec).map_err(|e| WalError::Io {
            op: "encode",
            source: std::io::Error::other(e),
        })?;
        frame.push(b'\n');
    }
    let body_len = frame.len() as u64;
    let crc = crc32c::crc32c(&frame);
    frame.extend_from_slice(WAL_MAGIC);
    frame.extend_from_slice(&body_len.to_le_bytes());
    frame.extend_from_slice(&(!body_len).to_le_bytes());
    frame.extend_from_slice(&crc.to_le_bytes());
    frame.extend_from_slice(&(!crc).to_le_bytes());
    Ok(frame)
}

/// Current WAL size in bytes.
pub fn size(file: &File) -> Result<u64, WalError> {
    Ok(file.metadata().map_err(io_err("stat"))?.len())
}

/// Overwrite the WAL with a frame and fsync it. Once this returns,
/// the frame is the durable point of its commit.
pub fn write_frame(file: &File, frame: &[u8]) -> Result<(), WalError> {
    file.set_len(0).map_err(io_err("truncate"))?;
    let mut f = file;
    f.seek(SeekFrom::Start(0)).map_err(io_err("seek"))?;
    f.write_all(frame).map_err(io_err("write"))?;
    file.sync_data().map_err(io_err("fsync"))?;
    Ok(())
}

/// Truncate the WAL to zero after a successful apply or for an
/// uncommitted remnant.
pub fn truncate(file: &File) -> Result<(), WalError> {
    file.set_len(0).map_err(io_err("truncate"))?;
    file.sync_data().map_err(io_err("fsync"))?;
    Ok(())
}

fn le_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    u64::from_le_bytes(buf)
}

fn le_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(bytes);
    u32::from_le_bytes(buf)
}

/// Classify the WAL given only the file handle.
///
/// Total over every byte sequence: empty, uncommitted, or committed.
/// The one hard failure is a structurally valid footer over a body
/// that fails its checksum.
pub fn classify(file: &File) -> Result<WalState, WalError> {
    let len = size(file)?;
    if len == 0 {
        return Ok(WalState::Empty);
    }
    if len < FOOTER_LEN {
        return Ok(WalState::Uncommitted);
    }

    let mut f = file;
    f.seek(SeekFrom::Start(len - FOOTER_LEN))
        .map_err(io_err("seek"))?;
    let mut footer = [0u8; FOOTER_LEN as usize];
    f.read_exact(&mut footer).map_err(io_err("read"))?;

    if &footer[0..8] != WAL_MAGIC {
        return Ok(WalState::Uncommitted);
    }
    let body_len = le_u64(&footer[8..16]);
    let inv_len = le_u64(&footer[16..24]);
    let crc = le_u32(&footer[24..28]);
    let inv_crc = le_u32(&footer[28..32]);
    if body_len != !inv_len || crc != !inv_crc || body_len > len - FOOTER_LEN {
        return Ok(WalState::Uncommitted);
    }

    let mut body = vec![0u8; body_len as usize];
    f.seek(SeekFrom::Start(0)).map_err(io_err("seek"))?;
    f.read_exact(&mut body).map_err(io_err("read"))?;
    if crc32c::crc32c(&body) != crc {
        return Err(WalError::Corrupt {
            reason: "body checksum mismatch".to_string(),
        });
    }

    Ok(WalState::Committed(decode_body(&body)?))
}

/// Decode a checksummed body into validated records.
pub fn decode_body(body: &[u8]) -> Result<Vec<WalRecord>, WalError> {
    let mut records = Vec::new();
    let mut rest = body;
    let mut n = 0usize;
    while !rest.is_empty() {
        n += 1;
        let end = rest
            .iter()
            .position(|&b| b == b'\n')
            .ok_or_else(|| WalError::Corrupt {
                reason: format!("record {n}: missing terminator"),
            })?;
        let rec: WalRecord =
            serde_json::from_slice(&rest[..end]).map_err(|e| WalError::Corrupt {
                reason: format!("record {n}: {e}"),
            })?;
        validate_record(&rec, n)?;
        records.push(rec);
        rest = &rest[end + 1..];
    }
    Ok(records)
}

fn validate_record(rec: &WalRecord, n: usize) -> Result<(), WalError> {
    if rec.id.is_empty() {
        return Err(WalError::Corrupt {
            reason: format!("record {n}: empty id"),
        });
    }
    if rec.path.is_empty() {
        return Err(WalError::Corrupt {
            reason: format!("record {n}: empty path"),
        });
    }
    if rec.op == WalOp::Put && rec.content.as_deref().unwrap_or("").is_empty() {
        return Err(WalError::Corrupt {
            reason: format!("record {n}: put without content"),
        });
    }
    Ok(())
}
