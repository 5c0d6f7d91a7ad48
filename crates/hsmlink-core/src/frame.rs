//! Binary codec for the channel frame that wraps every request and response.
//!
//! Wire format:
//! ```text
//! [magic:2][kind:2][seq:2][len:2][payload:N]
//! ```
//! Total header size: 8 bytes.  All multi-byte integers are little-endian;
//! the magic value tells the peer which encoding the sender used, and this
//! client only ever produces and accepts the native encoding.

use crate::error::WireError;
use crate::kind::Kind;

/// Total size of the frame header in bytes.
pub const HEADER_SIZE: usize = 8;

/// Maximum payload length in bytes (the transport MTU minus the header).
pub const DATA_LEN: usize = 1280;

/// Maximum total frame size.
pub const MTU: usize = HEADER_SIZE + DATA_LEN;

/// Magic value for native (little-endian, no translation) encoding.
pub const MAGIC_NATIVE: u16 = 0x4C48;

/// Byte-swapped magic, seen when the peer uses the opposite byte order.
pub const MAGIC_SWAPPED: u16 = MAGIC_NATIVE.swap_bytes();

/// Decoded frame header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Encoding marker; must match exactly between request and response.
    pub magic: u16,
    /// Packed (group, action) pair.
    pub kind: Kind,
    /// Correlation id matching a response to its request.
    pub seq: u16,
    /// Payload length in bytes (not including the header).
    pub len: u16,
}

impl FrameHeader {
    /// Decodes the 8-byte header from the start of `bytes`.
    ///
    /// The payload itself is not required to be present; see
    /// [`decode_frame`] for full-frame decoding.
    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        if bytes.len() < HEADER_SIZE {
            return Err(WireError::InsufficientData {
                needed: HEADER_SIZE,
                available: bytes.len(),
            });
        }
        let magic = u16::from_le_bytes([bytes[0], bytes[1]]);
        let kind = Kind::from_raw(u16::from_le_bytes([bytes[2], bytes[3]]));
        let seq = u16::from_le_bytes([bytes[4], bytes[5]]);
        let len = u16::from_le_bytes([bytes[6], bytes[7]]);
        if len as usize > DATA_LEN {
            // A peer-supplied length is never allowed to exceed the fixed
            // buffer bound, no matter what the header claims.
            return Err(WireError::PayloadTooLarge {
                size: len as usize,
                max: DATA_LEN,
            });
        }
        Ok(FrameHeader { magic, kind, seq, len })
    }
}

/// Encodes a complete frame: header plus payload.
///
/// # Errors
///
/// Returns [`WireError::PayloadTooLarge`] if `payload` exceeds [`DATA_LEN`].
pub fn encode_frame(
    magic: u16,
    kind: Kind,
    seq: u16,
    payload: &[u8],
) -> Result<Vec<u8>, WireError> {
    if payload.len() > DATA_LEN {
        return Err(WireError::PayloadTooLarge {
            size: payload.len(),
            max: DATA_LEN,
        });
    }
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.extend_from_slice(&magic.to_le_bytes());
    buf.extend_from_slice(&kind.raw().to_le_bytes());
    buf.extend_from_slice(&seq.to_le_bytes());
    buf.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Decodes one frame from the beginning of `bytes`, returning the header and
/// a borrowed view of the payload.
pub fn decode_frame(bytes: &[u8]) -> Result<(FrameHeader, &[u8]), WireError> {
    let header = FrameHeader::decode(bytes)?;
    let total = HEADER_SIZE + header.len as usize;
    if bytes.len() < total {
        return Err(WireError::LengthMismatch {
            declared: header.len as usize,
            available: bytes.len() - HEADER_SIZE,
        });
    }
    Ok((header, &bytes[HEADER_SIZE..total]))
}
