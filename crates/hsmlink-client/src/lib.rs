//! hsmlink-client library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the demo binary share the same module tree.
//!
//! # What does hsmlink-client do? (for beginners)
//!
//! The *client* runs on the host side of a host/HSM split: key material and
//! sensitive operations live on a small dedicated server, and this library
//! is how host code talks to it.  A typical exchange:
//!
//! 1. Open a transport (shared-memory mailbox or TCP) and build a
//!    [`Client`] with this host's tenant identity.
//! 2. `comm_init` the session; the server's identity comes back.
//! 3. Cache key material, commit it to the server's persistent store, and
//!    later export or erase it, all by key id.
//! 4. Probe and invoke operator-defined callback slots for anything the
//!    fixed catalog does not cover.
//! 5. `comm_close` when done.
//!
//! Nothing here ever blocks: the server signals "not yet" with a dedicated
//! status, and the client polls, so the same code runs under an OS or in a
//! bare-metal loop.

/// Framing layer: transport ownership and sequence numbering.
pub mod comm;
/// TOML configuration.
pub mod config;
/// Client context: correlation and the polling loop.
pub mod context;
/// Custom-callback protocol.
pub mod custom;
/// Error taxonomy.
pub mod error;
/// Key lifecycle protocol.
pub mod keystore;
/// Crypto offload key binding.
pub mod offload;
/// Session protocol: init, close, echo.
pub mod session;
/// In-process server simulator for tests and demos.
pub mod sim;
/// Frame transports.
pub mod transport;

pub use config::{ClientConfig, ConfigError};
pub use context::{Client, PollPolicy};
pub use custom::CallbackStatus;
pub use error::{AbortReason, ClientError, ServerStatus};
pub use keystore::KeyExportInfo;
pub use offload::{Algorithm, KeySource, OffloadKey};
pub use transport::{mem_pair, MemTransport, TcpTransport, Transport, TransportError};
