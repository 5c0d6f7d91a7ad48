//! Numeric status codes shared with the server.
//!
//! These travel inside payloads (the `rc`/`err` fields), never in the frame
//! header.  Zero is success; everything else is an operation-specific failure
//! reported by the server after the message itself was delivered intact.

/// Success.
pub const OK: i32 = 0;
/// Invalid arguments; no side effects occurred.
pub const BADARGS: i32 = -400;
/// Not ready yet; retry the operation.
pub const NOTREADY: i32 = -401;
/// Fatal failure; the current exchange must be abandoned.
pub const ABORTED: i32 = -402;
/// No matching object (key id unknown or owned by another tenant).
pub const NOTFOUND: i32 = -414;
/// No storage space available.
pub const NOSPACE: i32 = -415;
/// No custom callback handler registered for the requested id.
pub const NOHANDLER: i32 = -420;
