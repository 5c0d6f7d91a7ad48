//! Key-group payloads ("Packets").
//!
//! Every Key payload begins with a fixed 8-byte stub holding the generic
//! status code `rc`, so a response's outcome is readable at a constant
//! offset before any operation-specific field is interpreted.  Requests
//! carry the stub too (zeroed) to keep the operation fields at the same
//! offset in both directions.
//!
//! Variable-length fields (key bytes on cache, exported bytes on export) are
//! written immediately after the fixed fields; the encoded size is always
//! `stub + fixed + variable`.

use serde::{Deserialize, Serialize};

use crate::error::WireError;
use crate::frame::DATA_LEN;

/// Size of the generic packet stub: `rc:i32 | reserved:u32`.
pub const PACKET_STUB_SIZE: usize = 8;

/// Fixed maximum label length in bytes.
pub const LABEL_LEN: usize = 24;

/// Maximum raw key bytes that fit in a single cache request.
pub const KEY_DATA_MAX: usize = DATA_LEN - PACKET_STUB_SIZE - KeyCacheRequest::FIXED_SIZE;

/// Handle naming a key resident on the server, scoped to the tenant that
/// cached it.  Meaningless once evicted or erased.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyId(pub u16);

impl KeyId {
    /// Sentinel meaning "unassigned; the server allocates a fresh id on cache".
    pub const ERASED: KeyId = KeyId(0);

    pub fn is_erased(self) -> bool {
        self == Self::ERASED
    }
}

impl std::fmt::Display for KeyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:04X}", self.0)
    }
}

/// Fixed-length key label.  Longer input is silently truncated on both write
/// and read-out; shorter input is zero-padded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Label([u8; LABEL_LEN]);

impl Label {
    /// Builds a label from arbitrary bytes, truncating to [`LABEL_LEN`].
    pub fn new(bytes: &[u8]) -> Self {
        let mut buf = [0u8; LABEL_LEN];
        let take = bytes.len().min(LABEL_LEN);
        buf[..take].copy_from_slice(&bytes[..take]);
        Label(buf)
    }

    pub fn as_bytes(&self) -> &[u8; LABEL_LEN] {
        &self.0
    }
}

/// Writes the zeroed/populated packet stub into `buf`.
fn write_stub(buf: &mut Vec<u8>, rc: i32) {
    buf.extend_from_slice(&rc.to_le_bytes());
    buf.extend_from_slice(&0u32.to_le_bytes());
}

/// Reads the generic status code from the start of any Key-group payload.
pub fn read_rc(payload: &[u8]) -> Result<i32, WireError> {
    if payload.len() < PACKET_STUB_SIZE {
        return Err(WireError::InsufficientData {
            needed: PACKET_STUB_SIZE,
            available: payload.len(),
        });
    }
    Ok(i32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]))
}

// ── Cache ─────────────────────────────────────────────────────────────────────

/// Cache request: place raw key material in the server's in-memory cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyCacheRequest {
    /// Requested id; [`KeyId::ERASED`] asks the server to allocate one.
    pub id: KeyId,
    /// Usage flags, opaque to this layer.
    pub flags: u32,
    /// Optional label; `None` encodes a zero label length.
    pub label: Option<Label>,
    /// Raw key bytes; must be non-empty (enforced by the client API).
    pub key: Vec<u8>,
}

impl KeyCacheRequest {
    /// Fixed fields after the stub: `id:2 | flags:4 | key_len:2 |
    /// label_len:2 | label:24`.
    pub const FIXED_SIZE: usize = 2 + 4 + 2 + 2 + LABEL_LEN;

    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        if self.key.len() > KEY_DATA_MAX {
            return Err(WireError::PayloadTooLarge {
                size: self.key.len(),
                max: KEY_DATA_MAX,
            });
        }
        let mut buf = Vec::with_capacity(PACKET_STUB_SIZE + Self::FIXED_SIZE + self.key.len());
        write_stub(&mut buf, 0);
        buf.extend_from_slice(&self.id.0.to_le_bytes());
        buf.extend_from_slice(&self.flags.to_le_bytes());
        buf.extend_from_slice(&(self.key.len() as u16).to_le_bytes());
        match &self.label {
            Some(label) => {
                buf.extend_from_slice(&(LABEL_LEN as u16).to_le_bytes());
                buf.extend_from_slice(label.as_bytes());
            }
            None => {
                buf.extend_from_slice(&0u16.to_le_bytes());
                buf.extend_from_slice(&[0u8; LABEL_LEN]);
            }
        }
        buf.extend_from_slice(&self.key);
        Ok(buf)
    }

    pub fn decode(payload: &[u8]) -> Result<Self, WireError> {
        let fixed_end = PACKET_STUB_SIZE + Self::FIXED_SIZE;
        if payload.len() < fixed_end {
            return Err(WireError::InsufficientData {
                needed: fixed_end,
                available: payload.len(),
            });
        }
        let p = &payload[PACKET_STUB_SIZE..];
        let id = KeyId(u16::from_le_bytes([p[0], p[1]]));
        let flags = u32::from_le_bytes([p[2], p[3], p[4], p[5]]);
        let key_len = u16::from_le_bytes([p[6], p[7]]) as usize;
        let label_len = u16::from_le_bytes([p[8], p[9]]) as usize;
        let label = if label_len == 0 {
            None
        } else {
            // Truncation on read-out: never read past the fixed field.
            Some(Label::new(&p[10..10 + label_len.min(LABEL_LEN)]))
        };
        if payload.len() < fixed_end + key_len {
            return Err(WireError::LengthMismatch {
                declared: key_len,
                available: payload.len() - fixed_end,
            });
        }
        let key = payload[fixed_end..fixed_end + key_len].to_vec();
        Ok(KeyCacheRequest { id, flags, label, key })
    }
}

/// Cache response: the allocated or confirmed key id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyCacheResponse {
    /// Generic status; non-zero means the cache operation failed.
    pub rc: i32,
    /// Key id under which the material is now cached (valid when `rc == 0`).
    pub id: KeyId,
}

impl KeyCacheResponse {
    pub const WIRE_SIZE: usize = PACKET_STUB_SIZE + 2;

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::WIRE_SIZE);
        write_stub(&mut buf, self.rc);
        buf.extend_from_slice(&self.id.0.to_le_bytes());
        buf
    }

    pub fn decode(payload: &[u8]) -> Result<Self, WireError> {
        if payload.len() < Self::WIRE_SIZE {
            return Err(WireError::InsufficientData {
                needed: Self::WIRE_SIZE,
                available: payload.len(),
            });
        }
        Ok(KeyCacheResponse {
            rc: read_rc(payload)?,
            id: KeyId(u16::from_le_bytes([
                payload[PACKET_STUB_SIZE],
                payload[PACKET_STUB_SIZE + 1],
            ])),
        })
    }
}

// ── Evict / Commit / Export / Erase requests ─────────────────────────────────

/// Request payload naming an existing key id; shared by evict, commit,
/// export, and erase (the operation is selected by the message kind).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRefRequest {
    pub id: KeyId,
}

impl KeyRefRequest {
    pub const WIRE_SIZE: usize = PACKET_STUB_SIZE + 2;

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::WIRE_SIZE);
        write_stub(&mut buf, 0);
        buf.extend_from_slice(&self.id.0.to_le_bytes());
        buf
    }

    pub fn decode(payload: &[u8]) -> Result<Self, WireError> {
        if payload.len() < Self::WIRE_SIZE {
            return Err(WireError::InsufficientData {
                needed: Self::WIRE_SIZE,
                available: payload.len(),
            });
        }
        Ok(KeyRefRequest {
            id: KeyId(u16::from_le_bytes([
                payload[PACKET_STUB_SIZE],
                payload[PACKET_STUB_SIZE + 1],
            ])),
        })
    }
}

/// Status-only response for evict, commit, and erase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub rc: i32,
}

impl StatusResponse {
    pub const WIRE_SIZE: usize = PACKET_STUB_SIZE;

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::WIRE_SIZE);
        write_stub(&mut buf, self.rc);
        buf
    }

    pub fn decode(payload: &[u8]) -> Result<Self, WireError> {
        Ok(StatusResponse { rc: read_rc(payload)? })
    }
}

// ── Export response ───────────────────────────────────────────────────────────

/// Maximum exported key bytes in a single response.
pub const KEY_EXPORT_MAX: usize =
    DATA_LEN - PACKET_STUB_SIZE - KeyExportResponse::FIXED_SIZE;

/// Export response: key bytes and label, without destroying the entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyExportResponse {
    pub rc: i32,
    /// Stored key size in bytes.
    pub len: u16,
    pub label: Label,
    /// Exported bytes; `len` of them (empty when `rc != 0`).
    pub key: Vec<u8>,
}

impl KeyExportResponse {
    /// Fixed fields after the stub: `len:2 | label:24`.
    pub const FIXED_SIZE: usize = 2 + LABEL_LEN;

    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        if self.key.len() > KEY_EXPORT_MAX {
            return Err(WireError::PayloadTooLarge {
                size: self.key.len(),
                max: KEY_EXPORT_MAX,
            });
        }
        let mut buf =
            Vec::with_capacity(PACKET_STUB_SIZE + Self::FIXED_SIZE + self.key.len());
        write_stub(&mut buf, self.rc);
        buf.extend_from_slice(&self.len.to_le_bytes());
        buf.extend_from_slice(self.label.as_bytes());
        buf.extend_from_slice(&self.key);
        Ok(buf)
    }

    pub fn decode(payload: &[u8]) -> Result<Self, WireError> {
        let fixed_end = PACKET_STUB_SIZE + Self::FIXED_SIZE;
        if payload.len() < fixed_end {
            return Err(WireError::InsufficientData {
                needed: fixed_end,
                available: payload.len(),
            });
        }
        let rc = read_rc(payload)?;
        let p = &payload[PACKET_STUB_SIZE..];
        let len = u16::from_le_bytes([p[0], p[1]]);
        let label = Label::new(&p[2..2 + LABEL_LEN]);
        let key = if rc == 0 {
            if payload.len() < fixed_end + len as usize {
                return Err(WireError::LengthMismatch {
                    declared: len as usize,
                    available: payload.len() - fixed_end,
                });
            }
            payload[fixed_end..fixed_end + len as usize].to_vec()
        } else {
            Vec::new()
        };
        Ok(KeyExportResponse { rc, len, label, key })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status;

    #[test]
    fn test_key_id_sentinel() {
        assert!(KeyId::ERASED.is_erased());
        assert!(!KeyId(7).is_erased());
    }

    #[test]
    fn test_label_truncates_and_pads() {
        let long = Label::new(&[0xFF; LABEL_LEN + 10]);
        assert_eq!(long.as_bytes(), &[0xFF; LABEL_LEN]);

        let short = Label::new(b"aes-wrap");
        assert_eq!(&short.as_bytes()[..8], b"aes-wrap");
        assert!(short.as_bytes()[8..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_cache_request_round_trip_with_label() {
        let req = KeyCacheRequest {
            id: KeyId::ERASED,
            flags: 0x0000_0003,
            label: Some(Label::new(b"tls-server-key")),
            key: vec![0x11; 32],
        };
        let bytes = req.encode().unwrap();
        assert_eq!(
            bytes.len(),
            PACKET_STUB_SIZE + KeyCacheRequest::FIXED_SIZE + 32
        );
        assert_eq!(KeyCacheRequest::decode(&bytes).unwrap(), req);
    }

    #[test]
    fn test_cache_request_without_label_encodes_zero_length() {
        let req = KeyCacheRequest {
            id: KeyId(9),
            flags: 0,
            label: None,
            key: vec![1, 2, 3],
        };
        let bytes = req.encode().unwrap();
        let decoded = KeyCacheRequest::decode(&bytes).unwrap();
        assert_eq!(decoded.label, None);
        assert_eq!(decoded.key, vec![1, 2, 3]);
    }

    #[test]
    fn test_cache_request_rejects_key_over_capacity() {
        let req = KeyCacheRequest {
            id: KeyId::ERASED,
            flags: 0,
            label: None,
            key: vec![0; KEY_DATA_MAX + 1],
        };
        assert!(matches!(
            req.encode(),
            Err(WireError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn test_rc_is_readable_at_constant_offset_for_every_response() {
        let cache = KeyCacheResponse { rc: status::NOSPACE, id: KeyId::ERASED }.encode();
        let stat = StatusResponse { rc: status::NOTFOUND }.encode();
        let export = KeyExportResponse {
            rc: status::NOTFOUND,
            len: 0,
            label: Label::default(),
            key: Vec::new(),
        }
        .encode()
        .unwrap();

        assert_eq!(read_rc(&cache).unwrap(), status::NOSPACE);
        assert_eq!(read_rc(&stat).unwrap(), status::NOTFOUND);
        assert_eq!(read_rc(&export).unwrap(), status::NOTFOUND);
    }

    #[test]
    fn test_key_ref_round_trip() {
        let req = KeyRefRequest { id: KeyId(0x00FE) };
        assert_eq!(KeyRefRequest::decode(&req.encode()).unwrap(), req);
    }

    #[test]
    fn test_export_response_round_trip() {
        let rsp = KeyExportResponse {
            rc: 0,
            len: 16,
            label: Label::new(b"session"),
            key: vec![0xAB; 16],
        };
        let bytes = rsp.encode().unwrap();
        assert_eq!(KeyExportResponse::decode(&bytes).unwrap(), rsp);
    }

    #[test]
    fn test_export_response_rejects_declared_length_past_buffer() {
        let rsp = KeyExportResponse {
            rc: 0,
            len: 16,
            label: Label::default(),
            key: vec![0xAB; 16],
        };
        let mut bytes = rsp.encode().unwrap();
        let off = PACKET_STUB_SIZE;
        bytes[off..off + 2].copy_from_slice(&500u16.to_le_bytes());
        assert!(matches!(
            KeyExportResponse::decode(&bytes),
            Err(WireError::LengthMismatch { declared: 500, .. })
        ));
    }

    #[test]
    fn test_export_response_with_error_rc_carries_no_key_bytes() {
        let rsp = KeyExportResponse {
            rc: status::NOTFOUND,
            len: 0,
            label: Label::default(),
            key: Vec::new(),
        };
        let decoded = KeyExportResponse::decode(&rsp.encode().unwrap()).unwrap();
        assert_eq!(decoded.rc, status::NOTFOUND);
        assert!(decoded.key.is_empty());
    }
}
