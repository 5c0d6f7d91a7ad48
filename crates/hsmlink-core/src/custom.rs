//! Custom-callback payloads.
//!
//! The Custom group carries operator-defined extensions: a request names a
//! callback slot and a data-shape discriminant, the response echoes both and
//! adds two status fields (`rc` from the callback itself, `err` from the
//! dispatch layer).  The QUERY shape is reserved for asking whether a slot
//! has a handler registered at all.

use serde::{Deserialize, Serialize};

use crate::error::WireError;

/// Number of callback slots a server exposes.
pub const CUSTOM_CB_COUNT: usize = 8;

/// Fixed inline data area carried by both directions.
pub const CUSTOM_DATA_LEN: usize = 256;

/// First data-shape value available for operator-defined shapes.
pub const CUSTOM_TYPE_USER_MIN: u32 = 8;

/// Discriminant describing how [`CustomData`] should be interpreted.
///
/// Values 3 through 7 are reserved and rejected on decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CustomType {
    /// Registration probe; carries no meaningful data.
    Query,
    /// Data area holds a 32-bit address/length descriptor pair.
    Dma32,
    /// Data area holds a 64-bit address/length descriptor pair.
    Dma64,
    /// Operator-defined shape, `CUSTOM_TYPE_USER_MIN` or above.
    User(u32),
}

impl CustomType {
    pub fn to_raw(self) -> u32 {
        match self {
            CustomType::Query => 0,
            CustomType::Dma32 => 1,
            CustomType::Dma64 => 2,
            CustomType::User(v) => v,
        }
    }

    pub fn from_raw(raw: u32) -> Result<Self, WireError> {
        match raw {
            0 => Ok(CustomType::Query),
            1 => Ok(CustomType::Dma32),
            2 => Ok(CustomType::Dma64),
            v if v >= CUSTOM_TYPE_USER_MIN => Ok(CustomType::User(v)),
            v => Err(WireError::MalformedPayload(format!(
                "reserved custom type {v}"
            ))),
        }
    }
}

/// Fixed-size opaque data area.  Shorter input is zero-padded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CustomData(pub [u8; CUSTOM_DATA_LEN]);

impl CustomData {
    pub fn new(bytes: &[u8]) -> Result<Self, WireError> {
        if bytes.len() > CUSTOM_DATA_LEN {
            return Err(WireError::PayloadTooLarge {
                size: bytes.len(),
                max: CUSTOM_DATA_LEN,
            });
        }
        let mut buf = [0u8; CUSTOM_DATA_LEN];
        buf[..bytes.len()].copy_from_slice(bytes);
        Ok(CustomData(buf))
    }
}

impl Default for CustomData {
    fn default() -> Self {
        CustomData([0u8; CUSTOM_DATA_LEN])
    }
}

/// Custom-callback request: `id:4 | type:4 | data:256`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CustomRequest {
    /// Callback slot index, `0..CUSTOM_CB_COUNT`.
    pub id: u32,
    pub shape: CustomType,
    pub data: CustomData,
}

impl CustomRequest {
    pub const WIRE_SIZE: usize = 4 + 4 + CUSTOM_DATA_LEN;

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::WIRE_SIZE);
        buf.extend_from_slice(&self.id.to_le_bytes());
        buf.extend_from_slice(&self.shape.to_raw().to_le_bytes());
        buf.extend_from_slice(&self.data.0);
        buf
    }

    pub fn decode(payload: &[u8]) -> Result<Self, WireError> {
        if payload.len() < Self::WIRE_SIZE {
            return Err(WireError::InsufficientData {
                needed: Self::WIRE_SIZE,
                available: payload.len(),
            });
        }
        let id = u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]);
        let shape =
            CustomType::from_raw(u32::from_le_bytes([payload[4], payload[5], payload[6], payload[7]]))?;
        let mut data = [0u8; CUSTOM_DATA_LEN];
        data.copy_from_slice(&payload[8..8 + CUSTOM_DATA_LEN]);
        Ok(CustomRequest { id, shape, data: CustomData(data) })
    }
}

/// Custom-callback response: `id:4 | type:4 | rc:4 | err:4 | data:256`.
///
/// `err` reports the dispatch outcome (slot valid, handler present); `rc` is
/// whatever the handler itself returned and is only meaningful when `err` is
/// zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CustomResponse {
    pub id: u32,
    pub shape: CustomType,
    pub rc: i32,
    pub err: i32,
    pub data: CustomData,
}

impl CustomResponse {
    pub const WIRE_SIZE: usize = 4 + 4 + 4 + 4 + CUSTOM_DATA_LEN;

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::WIRE_SIZE);
        buf.extend_from_slice(&self.id.to_le_bytes());
        buf.extend_from_slice(&self.shape.to_raw().to_le_bytes());
        buf.extend_from_slice(&self.rc.to_le_bytes());
        buf.extend_from_slice(&self.err.to_le_bytes());
        buf.extend_from_slice(&self.data.0);
        buf
    }

    pub fn decode(payload: &[u8]) -> Result<Self, WireError> {
        if payload.len() < Self::WIRE_SIZE {
            return Err(WireError::InsufficientData {
                needed: Self::WIRE_SIZE,
                available: payload.len(),
            });
        }
        let id = u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]);
        let shape =
            CustomType::from_raw(u32::from_le_bytes([payload[4], payload[5], payload[6], payload[7]]))?;
        let rc = i32::from_le_bytes([payload[8], payload[9], payload[10], payload[11]]);
        let err = i32::from_le_bytes([payload[12], payload[13], payload[14], payload[15]]);
        let mut data = [0u8; CUSTOM_DATA_LEN];
        data.copy_from_slice(&payload[16..16 + CUSTOM_DATA_LEN]);
        Ok(CustomResponse { id, shape, rc, err, data: CustomData(data) })
    }
}
