//! In-process shared-memory transport.
//!
//! Models the single-slot mailbox found on dual-core parts: each direction
//! holds at most one frame, and a send while the peer has not drained the
//! previous frame reports not-ready instead of queueing.  The two endpoints
//! may live on different threads.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use hsmlink_core::MTU;

use super::{Transport, TransportError};

/// One mailbox direction: a single frame slot.
#[derive(Default)]
struct Slot {
    frame: Mutex<Option<Vec<u8>>>,
}

struct Shared {
    a_to_b: Slot,
    b_to_a: Slot,
    closed: AtomicBool,
}

/// One endpoint of an in-process mailbox pair.
pub struct MemTransport {
    shared: Arc<Shared>,
    /// True for the endpoint that writes into `a_to_b`.
    is_a: bool,
}

/// Creates a connected pair of mailbox endpoints.
pub fn mem_pair() -> (MemTransport, MemTransport) {
    let shared = Arc::new(Shared {
        a_to_b: Slot::default(),
        b_to_a: Slot::default(),
        closed: AtomicBool::new(false),
    });
    (
        MemTransport { shared: Arc::clone(&shared), is_a: true },
        MemTransport { shared, is_a: false },
    )
}

impl MemTransport {
    fn tx_slot(&self) -> &Slot {
        if self.is_a { &self.shared.a_to_b } else { &self.shared.b_to_a }
    }

    fn rx_slot(&self) -> &Slot {
        if self.is_a { &self.shared.b_to_a } else { &self.shared.a_to_b }
    }
}

impl Transport for MemTransport {
    fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        if frame.len() > MTU {
            return Err(TransportError::FrameTooLarge { size: frame.len(), max: MTU });
        }
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        let mut slot = self
            .tx_slot()
            .frame
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if slot.is_some() {
            return Err(TransportError::NotReady);
        }
        *slot = Some(frame.to_vec());
        Ok(())
    }

    fn recv(&mut self) -> Result<Vec<u8>, TransportError> {
        let mut slot = self
            .rx_slot()
            .frame
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match slot.take() {
            Some(frame) => Ok(frame),
            // Drain any frame left in the slot before reporting the close.
            None if self.shared.closed.load(Ordering::Acquire) => Err(TransportError::Closed),
            None => Err(TransportError::NotReady),
        }
    }
}

impl Drop for MemTransport {
    fn drop(&mut self) {
        self.shared.closed.store(true, Ordering::Release);
    }
}
