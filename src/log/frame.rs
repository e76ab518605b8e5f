//! Record framing
//!
//! Encodes and decodes the on-storage frame of a single record.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{LogError, Result};

use super::LoggedRecord;

/// Header size: Len (4) + CRC (4) + Position (8) = 16 bytes
pub const FRAME_HEADER_SIZE: usize = 16;

/// Size of the frame holding a payload of `payload_len` bytes
pub fn frame_length(payload_len: usize) -> usize {
    FRAME_HEADER_SIZE + payload_len
}

fn checksum(position: i64, payload: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&position.to_le_bytes());
    hasher.update(payload);
    hasher.finalize()
}

/// Append the frame for (`position`, `payload`) to `dst`
pub fn encode_frame(dst: &mut BytesMut, position: i64, payload: &[u8]) {
    dst.reserve(frame_length(payload.len()));
    dst.put_u32_le(payload.len() as u32);
    dst.put_u32_le(checksum(position, payload));
    dst.put_i64_le(position);
    dst.put_slice(payload);
}

/// Decode the frame at the start of `src`
///
/// `address` is only used to build the record and error messages.
/// Returns `Ok(None)` if `src` is empty (end of log). A frame that is cut off
/// or fails its checksum is reported as corruption.
pub fn decode_frame(src: &Bytes, address: u64) -> Result<Option<LoggedRecord>> {
    if src.is_empty() {
        return Ok(None);
    }
    if src.len() < FRAME_HEADER_SIZE {
        return Err(LogError::Corruption {
            address,
            reason: format!("partial frame header ({} bytes)", src.len()),
        });
    }

    let mut header = &src[..FRAME_HEADER_SIZE];
    let len = header.get_u32_le() as usize;
    let crc = header.get_u32_le();
    let position = header.get_i64_le();

    let end = FRAME_HEADER_SIZE + len;
    if src.len() < end {
        return Err(LogError::Corruption {
            address,
            reason: format!(
                "partial frame: expected {} payload bytes, found {}",
                len,
                src.len() - FRAME_HEADER_SIZE
            ),
        });
    }

    let payload = src.slice(FRAME_HEADER_SIZE..end);
    if checksum(position, &payload) != crc {
        return Err(LogError::Corruption {
            address,
            reason: format!("checksum mismatch for position {}", position),
        });
    }

    Ok(Some(LoggedRecord {
        position,
        address,
        payload,
    }))
}
