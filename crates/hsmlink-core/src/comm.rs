//! Comm-group payloads: session init/close and the echo diagnostic.

use serde::{Deserialize, Serialize};

use crate::error::WireError;
use crate::frame::DATA_LEN;

/// Maximum number of echo payload bytes.  The echo message is a fixed-size
/// structure filling the whole MTU: a 2-byte length followed by the data
/// area, zero-padded.
pub const ECHO_DATA_LEN: usize = DATA_LEN - 2;

/// INIT request: the client announces its own identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitRequest {
    /// The connecting client's identity (the tenant under which all key
    /// operations will be scoped).
    pub client_id: u32,
}

impl InitRequest {
    /// Exact encoded size in bytes.
    pub const WIRE_SIZE: usize = 4;

    pub fn encode(&self) -> Vec<u8> {
        self.client_id.to_le_bytes().to_vec()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        if bytes.len() < Self::WIRE_SIZE {
            return Err(WireError::InsufficientData {
                needed: Self::WIRE_SIZE,
                available: bytes.len(),
            });
        }
        Ok(InitRequest {
            client_id: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        })
    }
}

/// INIT response: the server confirms the client identity and reports its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitResponse {
    /// Client identifier as assigned/echoed by the server.
    pub client_id: u32,
    /// Identifier of the server instance.
    pub server_id: u32,
}

impl InitResponse {
    /// Exact encoded size in bytes.
    pub const WIRE_SIZE: usize = 8;

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::WIRE_SIZE);
        buf.extend_from_slice(&self.client_id.to_le_bytes());
        buf.extend_from_slice(&self.server_id.to_le_bytes());
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        if bytes.len() < Self::WIRE_SIZE {
            return Err(WireError::InsufficientData {
                needed: Self::WIRE_SIZE,
                available: bytes.len(),
            });
        }
        Ok(InitResponse {
            client_id: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            server_id: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        })
    }
}

/// ECHO payload, used in both directions.
///
/// The wire size is always `2 + ECHO_DATA_LEN` regardless of how many bytes
/// are meaningful: `len:u16 | data[ECHO_DATA_LEN]`, zero-padded.  Input
/// longer than the bound is silently truncated on construction, and a
/// peer-reported length beyond the bound is clamped back on decode, so a
/// hostile length field can never outrun the statically sized buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EchoPayload {
    /// Meaningful bytes; at most [`ECHO_DATA_LEN`].
    pub data: Vec<u8>,
}

impl EchoPayload {
    /// Exact encoded size in bytes.
    pub const WIRE_SIZE: usize = 2 + ECHO_DATA_LEN;

    /// Builds a payload, truncating to [`ECHO_DATA_LEN`] if needed.
    pub fn new(data: &[u8]) -> Self {
        let take = data.len().min(ECHO_DATA_LEN);
        EchoPayload { data: data[..take].to_vec() }
    }

    pub fn encode(&self) -> Vec<u8> {
        let len = self.data.len().min(ECHO_DATA_LEN);
        let mut buf = vec![0u8; Self::WIRE_SIZE];
        buf[0..2].copy_from_slice(&(len as u16).to_le_bytes());
        buf[2..2 + len].copy_from_slice(&self.data[..len]);
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        if bytes.len() < Self::WIRE_SIZE {
            return Err(WireError::InsufficientData {
                needed: Self::WIRE_SIZE,
                available: bytes.len(),
            });
        }
        let mut len = u16::from_le_bytes([bytes[0], bytes[1]]) as usize;
        if len > ECHO_DATA_LEN {
            // Bad incoming length; truncate rather than trust it.
            len = ECHO_DATA_LEN;
        }
        Ok(EchoPayload { data: bytes[2..2 + len].to_vec() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_request_round_trip() {
        let msg = InitRequest { client_id: 0xAABBCCDD };
        let bytes = msg.encode();
        assert_eq!(bytes.len(), InitRequest::WIRE_SIZE);
        assert_eq!(InitRequest::decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn test_init_response_round_trip() {
        let msg = InitResponse { client_id: 12, server_id: 0x5748_0001 };
        let bytes = msg.encode();
        assert_eq!(bytes.len(), InitResponse::WIRE_SIZE);
        assert_eq!(InitResponse::decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn test_init_response_rejects_short_buffer() {
        assert!(matches!(
            InitResponse::decode(&[0u8; 7]),
            Err(WireError::InsufficientData { needed: 8, available: 7 })
        ));
    }

    #[test]
    fn test_echo_payload_is_fixed_wire_size() {
        let short = EchoPayload::new(b"hi");
        assert_eq!(short.encode().len(), EchoPayload::WIRE_SIZE);
    }

    #[test]
    fn test_echo_round_trip_preserves_data() {
        let msg = EchoPayload::new(b"the quick brown fox");
        let decoded = EchoPayload::decode(&msg.encode()).unwrap();
        assert_eq!(decoded.data, b"the quick brown fox");
    }

    #[test]
    fn test_echo_new_truncates_oversized_input() {
        let big = vec![0xA5u8; ECHO_DATA_LEN + 100];
        let msg = EchoPayload::new(&big);
        assert_eq!(msg.data.len(), ECHO_DATA_LEN);
        assert_eq!(&msg.data[..], &big[..ECHO_DATA_LEN]);
    }

    #[test]
    fn test_echo_truncation_is_a_fixed_point() {
        let big = vec![0x3Cu8; ECHO_DATA_LEN * 2];
        let once = EchoPayload::new(&big);
        let twice = EchoPayload::new(&once.data);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_echo_decode_clamps_hostile_length_field() {
        let mut bytes = EchoPayload::new(b"x").encode();
        // Peer claims more data than the buffer can ever hold.
        bytes[0..2].copy_from_slice(&u16::MAX.to_le_bytes());
        let decoded = EchoPayload::decode(&bytes).unwrap();
        assert_eq!(decoded.data.len(), ECHO_DATA_LEN);
    }
}
