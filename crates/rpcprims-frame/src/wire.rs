use bytes::{BufMut, BytesMut};

use crate::error::{FrameError, Result};

/// Frame header: compression flag (1) + length (4) = 5 bytes.
pub const HEADER_SIZE: usize = 5;

/// Default maximum payload size: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Whether the payload is compressed. Any non-zero flag byte counts.
    pub compressed: bool,
    /// Payload length in bytes.
    pub length: u32,
}

impl FrameHeader {
    /// Decode a header from exactly [`HEADER_SIZE`] bytes.
    pub fn decode(src: &[u8]) -> Result<Self> {
        let Ok(header) = <[u8; HEADER_SIZE]>::try_from(src) else {
            return Err(FrameError::IncompleteHeader { actual: src.len() });
        };
        Ok(Self {
            compressed: header[0] != 0,
            length: u32::from_be_bytes([header[1], header[2], header[3], header[4]]),
        })
    }
}

/// Encode a payload into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────┬──────────────┬──────────────────┐
/// │ Compressed   │ Length       │ Payload          │
/// │ (1B, 0x00)   │ (4B BE)      │ (Length bytes)   │
/// └──────────────┴──────────────┴──────────────────┘
/// ```
pub fn encode_frame(payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    let Ok(length) = u32::try_from(payload.len()) else {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: u32::MAX as usize,
        });
    };
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_u8(0);
    dst.put_u32(length);
    dst.put_slice(payload);
    Ok(())
}
