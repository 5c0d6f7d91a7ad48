//! # hsmlink-core
//!
//! Shared library for HSM-Link containing the wire framing, message kinds,
//! payload codecs, and status code tables for talking to an HSM server.
//!
//! This crate is used by the client library and the in-process simulator.
//! It has zero dependencies on OS APIs, sockets, or threads.
//!
//! # Architecture overview (for beginners)
//!
//! HSM-Link is a host-side client for a hardware security module: a tiny
//! server (usually a dedicated core or a separate chip) that stores key
//! material and performs operations on the host's behalf.  The host and the
//! server exchange fixed-maximum-size frames over some shared transport and
//! the host polls rather than blocks, because on embedded targets there is
//! often no OS to sleep in.
//!
//! This crate (`hsmlink-core`) is the shared foundation.  It defines:
//!
//! - **`frame`** – How bytes travel over the transport.  Every exchange is a
//!   single frame: an 8-byte header (magic, kind, sequence, length) followed
//!   by at most [`frame::DATA_LEN`] payload bytes.
//!
//! - **`kind`** – The 16-bit message kind: a group byte (Comm, Key, Custom)
//!   packed with an action byte, so dispatch needs only one comparison.
//!
//! - **`comm`**, **`keystore`**, **`custom`** – Typed payload structs for
//!   each group, with hand-written little-endian encode/decode that is
//!   bit-for-bit stable across releases.
//!
//! - **`status`** – The signed status codes a server embeds in responses.

pub mod comm;
pub mod custom;
pub mod error;
pub mod frame;
pub mod keystore;
pub mod kind;
pub mod status;

// Re-export the most-used types at the crate root so callers can write
// `hsmlink_core::Kind` instead of `hsmlink_core::kind::Kind`.
pub use error::WireError;
pub use frame::{decode_frame, encode_frame, FrameHeader, DATA_LEN, HEADER_SIZE, MAGIC_NATIVE, MTU};
pub use keystore::{KeyId, Label};
pub use kind::{CommAction, Group, KeyAction, Kind};
