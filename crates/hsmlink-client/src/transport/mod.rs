//! Frame transports.
//!
//! A transport moves whole frames between the client and a server without
//! blocking: both `send` and `recv` either complete immediately or return
//! [`TransportError::NotReady`], and the caller polls.  Delivery is reliable
//! and ordered; the transport never splits or merges frames as seen by the
//! caller.

use thiserror::Error;

pub mod mem;
pub mod tcp;

pub use mem::{mem_pair, MemTransport};
pub use tcp::TcpTransport;

/// Errors raised by a transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The operation could not complete right now; poll again.
    #[error("transport not ready")]
    NotReady,

    /// The peer is gone.  No further frames will move in either direction.
    #[error("transport closed by peer")]
    Closed,

    /// Frame exceeds what this transport can carry.
    #[error("frame of {size} bytes exceeds transport limit {max}")]
    FrameTooLarge { size: usize, max: usize },

    /// Underlying socket failure.
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),
}

/// One end of a reliable, ordered, non-blocking frame channel.
#[cfg_attr(test, mockall::automock)]
pub trait Transport {
    /// Attempts to hand one complete frame to the peer.
    ///
    /// On [`TransportError::NotReady`] nothing was consumed and the same
    /// frame must be re-offered.
    fn send(&mut self, frame: &[u8]) -> Result<(), TransportError>;

    /// Attempts to take one complete frame from the peer.
    fn recv(&mut self) -> Result<Vec<u8>, TransportError>;
}
