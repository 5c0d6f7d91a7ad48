//! In-process server simulator.
//!
//! Implements the server side of every operation well enough to exercise a
//! real client over a real transport: a shared [`SimHsm`] holds the key
//! store, and one [`SimServer`] per connected client services requests in a
//! poll loop.  Tests and the demo binary host a server on another thread;
//! the simulator is not a product server.
//!
//! Key semantics mirror a cache-in-front-of-storage layout: cache holds
//! uncommitted material, commit copies it to the persistent map, evict drops
//! only the cached copy, erase removes both.  All lookups are scoped to the
//! tenant learned from the session handshake, so one tenant's ids simply do
//! not exist in another tenant's view.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use hsmlink_core::comm::{EchoPayload, InitRequest, InitResponse};
use hsmlink_core::custom::{CustomRequest, CustomResponse, CustomType};
use hsmlink_core::keystore::{
    KeyCacheRequest, KeyCacheResponse, KeyExportResponse, KeyRefRequest, Label, StatusResponse,
};
use hsmlink_core::{
    decode_frame, encode_frame, status, CommAction, Group, KeyAction, KeyId, Kind, MAGIC_NATIVE,
};
use tracing::{debug, trace, warn};

use crate::transport::{Transport, TransportError};

/// Cache slots available to each tenant.
pub const CACHE_SLOTS: usize = 8;

/// Highest id the allocator hands out; allocation walks downward.
const ALLOC_TOP: u16 = 0xFFFE;

#[derive(Debug, Clone)]
struct KeyEntry {
    label: Option<Label>,
    key: Vec<u8>,
}

#[derive(Default)]
struct SimState {
    cache: HashMap<(u32, u16), KeyEntry>,
    stored: HashMap<(u32, u16), KeyEntry>,
    registered: HashSet<u32>,
}

/// Shared simulator state; clone one handle per [`SimServer`].
#[derive(Clone)]
pub struct SimHsm {
    state: Arc<Mutex<SimState>>,
    server_id: u32,
}

impl SimHsm {
    pub fn new(server_id: u32) -> Self {
        SimHsm {
            state: Arc::new(Mutex::new(SimState::default())),
            server_id,
        }
    }

    /// Installs a handler in a callback slot.  The simulated handler echoes
    /// the request data back with a zero return code.
    pub fn register_callback(&self, id: u32) {
        self.lock().registered.insert(id);
    }

    /// Builds a server around the server end of a transport.
    pub fn server(&self, transport: Box<dyn Transport + Send>) -> SimServer {
        SimServer {
            hsm: self.clone(),
            transport,
            tenant: None,
            pending_reply: None,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Services one client connection against the shared [`SimHsm`].
pub struct SimServer {
    hsm: SimHsm,
    transport: Box<dyn Transport + Send>,
    /// Tenant identity, learned from the session handshake.
    tenant: Option<u32>,
    /// Reply the transport refused to take; re-offered on the next poll.
    pending_reply: Option<Vec<u8>>,
}

impl SimServer {
    /// Services at most one request.  Returns whether progress was made.
    pub fn poll(&mut self) -> Result<bool, TransportError> {
        if let Some(reply) = self.pending_reply.take() {
            match self.transport.send(&reply) {
                Ok(()) => {}
                Err(TransportError::NotReady) => {
                    self.pending_reply = Some(reply);
                    return Ok(false);
                }
                Err(e) => return Err(e),
            }
        }

        let frame = match self.transport.recv() {
            Ok(frame) => frame,
            Err(TransportError::NotReady) => return Ok(false),
            Err(e) => return Err(e),
        };
        let (header, payload) = match decode_frame(&frame) {
            Ok(parts) => parts,
            Err(e) => {
                warn!(error = %e, "dropping malformed request frame");
                return Ok(true);
            }
        };
        trace!(kind = header.kind.raw(), seq = header.seq, "servicing request");

        let body = self.dispatch(header.kind, payload);
        let reply = match encode_frame(MAGIC_NATIVE, header.kind, header.seq, &body) {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "reply body did not fit a frame, answering empty");
                match encode_frame(MAGIC_NATIVE, header.kind, header.seq, &[]) {
                    Ok(reply) => reply,
                    Err(_) => return Ok(true),
                }
            }
        };
        match self.transport.send(&reply) {
            Ok(()) => {}
            Err(TransportError::NotReady) => self.pending_reply = Some(reply),
            Err(e) => return Err(e),
        }
        Ok(true)
    }

    /// Poll loop with a cooperative yield, until `running` is cleared or the
    /// peer goes away.
    pub fn run(mut self, running: Arc<AtomicBool>) {
        while running.load(Ordering::Relaxed) {
            match self.poll() {
                Ok(true) => {}
                Ok(false) => std::thread::yield_now(),
                Err(TransportError::Closed) => break,
                Err(e) => {
                    warn!(error = %e, "simulator transport failed");
                    break;
                }
            }
        }
    }

    fn dispatch(&mut self, kind: Kind, payload: &[u8]) -> Vec<u8> {
        match kind.group() {
            Ok(Group::Comm) => self.dispatch_comm(kind.action(), payload),
            Ok(Group::Key) => self.dispatch_key(kind.action(), payload),
            Ok(Group::Custom) => self.dispatch_custom(kind.action() as u32, payload),
            Err(_) => Vec::new(),
        }
    }

    // ── Comm group ────────────────────────────────────────────────────────

    fn dispatch_comm(&mut self, action: u8, payload: &[u8]) -> Vec<u8> {
        if action == CommAction::Init as u8 {
            let client_id = match InitRequest::decode(payload) {
                Ok(req) => req.client_id,
                Err(_) => 0,
            };
            self.tenant = Some(client_id);
            debug!(client_id, "simulator session established");
            return InitResponse { client_id, server_id: self.hsm.server_id }.encode();
        }
        if action == CommAction::Close as u8 {
            self.tenant = None;
            return Vec::new();
        }
        if action == CommAction::Echo as u8 {
            return match EchoPayload::decode(payload) {
                Ok(echo) => echo.encode(),
                Err(_) => EchoPayload::new(&[]).encode(),
            };
        }
        Vec::new()
    }

    // ── Key group ─────────────────────────────────────────────────────────

    fn dispatch_key(&mut self, action: u8, payload: &[u8]) -> Vec<u8> {
        let tenant = self.tenant.unwrap_or(0);
        let mut state = self.hsm.lock();

        if action == KeyAction::Cache as u8 {
            let req = match KeyCacheRequest::decode(payload) {
                Ok(req) => req,
                Err(_) => {
                    return KeyCacheResponse { rc: status::BADARGS, id: KeyId::ERASED }.encode()
                }
            };
            let id = if req.id.is_erased() {
                match allocate_id(&state, tenant) {
                    Some(id) => id,
                    None => {
                        return KeyCacheResponse { rc: status::NOSPACE, id: KeyId::ERASED }
                            .encode()
                    }
                }
            } else {
                req.id
            };
            let occupied = state
                .cache
                .keys()
                .filter(|(t, _)| *t == tenant)
                .count();
            if occupied >= CACHE_SLOTS && !state.cache.contains_key(&(tenant, id.0)) {
                return KeyCacheResponse { rc: status::NOSPACE, id: KeyId::ERASED }.encode();
            }
            state.cache.insert(
                (tenant, id.0),
                KeyEntry { label: req.label, key: req.key },
            );
            return KeyCacheResponse { rc: 0, id }.encode();
        }

        let id = match KeyRefRequest::decode(payload) {
            Ok(req) => req.id,
            Err(_) => return StatusResponse { rc: status::BADARGS }.encode(),
        };
        let slot = (tenant, id.0);

        if action == KeyAction::Evict as u8 {
            let rc = if state.cache.remove(&slot).is_some() { 0 } else { status::NOTFOUND };
            return StatusResponse { rc }.encode();
        }
        if action == KeyAction::Commit as u8 {
            let rc = match state.cache.get(&slot).cloned() {
                Some(entry) => {
                    state.stored.insert(slot, entry);
                    0
                }
                None => status::NOTFOUND,
            };
            return StatusResponse { rc }.encode();
        }
        if action == KeyAction::Erase as u8 {
            let in_cache = state.cache.remove(&slot).is_some();
            let in_stored = state.stored.remove(&slot).is_some();
            let rc = if in_cache || in_stored { 0 } else { status::NOTFOUND };
            return StatusResponse { rc }.encode();
        }
        if action == KeyAction::Export as u8 {
            let entry = state.cache.get(&slot).or_else(|| state.stored.get(&slot));
            return match entry {
                Some(entry) => {
                    let rsp = KeyExportResponse {
                        rc: 0,
                        len: entry.key.len() as u16,
                        label: entry.label.unwrap_or_default(),
                        key: entry.key.clone(),
                    };
                    match rsp.encode() {
                        Ok(body) => body,
                        Err(_) => export_status(status::BADARGS),
                    }
                }
                None => export_status(status::NOTFOUND),
            };
        }

        StatusResponse { rc: status::BADARGS }.encode()
    }

    // ── Custom group ──────────────────────────────────────────────────────

    fn dispatch_custom(&mut self, id: u32, payload: &[u8]) -> Vec<u8> {
        let req = match CustomRequest::decode(payload) {
            Ok(req) => req,
            Err(_) => CustomRequest {
                id,
                shape: CustomType::Query,
                data: Default::default(),
            },
        };
        let registered = self.hsm.lock().registered.contains(&id);

        if req.shape == CustomType::Query {
            let err = if registered { status::OK } else { status::NOHANDLER };
            return CustomResponse {
                id,
                shape: CustomType::Query,
                rc: 0,
                err,
                data: Default::default(),
            }
            .encode();
        }
        if !registered {
            return CustomResponse {
                id,
                shape: req.shape,
                rc: 0,
                err: status::NOHANDLER,
                data: Default::default(),
            }
            .encode();
        }
        // The simulated handler echoes its input.
        CustomResponse {
            id,
            shape: req.shape,
            rc: 0,
            err: status::OK,
            data: req.data,
        }
        .encode()
    }
}

/// Export reply carrying a status and no key material.  An empty key always
/// fits the frame, so this never reaches the bare-stub fallback.
fn export_status(rc: i32) -> Vec<u8> {
    let rsp = KeyExportResponse { rc, len: 0, label: Label::default(), key: Vec::new() };
    match rsp.encode() {
        Ok(body) => body,
        Err(_) => StatusResponse { rc }.encode(),
    }
}

/// Walks downward from [`ALLOC_TOP`] for a free id in this tenant's view.
fn allocate_id(state: &SimState, tenant: u32) -> Option<KeyId> {
    let mut id = ALLOC_TOP;
    while id > 0 {
        if !state.cache.contains_key(&(tenant, id)) && !state.stored.contains_key(&(tenant, id)) {
            return Some(KeyId(id));
        }
        id -= 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mem_pair;

    fn serviced_pair(hsm: &SimHsm) -> (crate::transport::MemTransport, SimServer) {
        let (client_end, server_end) = mem_pair();
        (client_end, hsm.server(Box::new(server_end)))
    }

    #[test]
    fn test_poll_reports_idle_when_nothing_is_pending() {
        let hsm = SimHsm::new(1);
        let (_client_end, mut server) = serviced_pair(&hsm);
        assert!(!server.poll().unwrap());
    }

    #[test]
    fn test_init_reply_carries_the_server_id() {
        let hsm = SimHsm::new(99);
        let (mut client_end, mut server) = serviced_pair(&hsm);

        let kind = Kind::new(Group::Comm, CommAction::Init as u8);
        let req = InitRequest { client_id: 7 }.encode();
        let frame = encode_frame(MAGIC_NATIVE, kind, 1, &req).unwrap();
        use crate::transport::Transport as _;
        client_end.send(&frame).unwrap();

        assert!(server.poll().unwrap());
        let reply = client_end.recv().unwrap();
        let (header, body) = decode_frame(&reply).unwrap();
        assert_eq!(header.kind, kind);
        assert_eq!(header.seq, 1);
        let rsp = InitResponse::decode(body).unwrap();
        assert_eq!(rsp.client_id, 7);
        assert_eq!(rsp.server_id, 99);
    }

    #[test]
    fn test_export_of_missing_key_replies_with_not_found() {
        // Arrange: a fresh store with no key cached or committed.
        let hsm = SimHsm::new(1);
        let (mut client_end, mut server) = serviced_pair(&hsm);
        use crate::transport::Transport as _;

        let kind = Kind::new(Group::Key, KeyAction::Export as u8);
        let req = KeyRefRequest { id: KeyId(42) }.encode();
        let frame = encode_frame(MAGIC_NATIVE, kind, 3, &req).unwrap();
        client_end.send(&frame).unwrap();

        // Act.
        assert!(server.poll().unwrap());
        let reply = client_end.recv().unwrap();

        // Assert: the reply is a well-formed export frame carrying NOTFOUND.
        let (header, body) = decode_frame(&reply).unwrap();
        assert_eq!(header.kind, kind);
        assert_eq!(header.seq, 3);
        let rsp = KeyExportResponse::decode(body).unwrap();
        assert_eq!(rsp.rc, status::NOTFOUND);
        assert_eq!(rsp.len, 0);
        assert!(rsp.key.is_empty());
    }

    #[test]
    fn test_allocator_hands_out_descending_ids() {
        let state = SimState::default();
        assert_eq!(allocate_id(&state, 0), Some(KeyId(ALLOC_TOP)));

        let mut state = state;
        state.cache.insert(
            (0, ALLOC_TOP),
            KeyEntry { label: None, key: vec![1] },
        );
        assert_eq!(allocate_id(&state, 0), Some(KeyId(ALLOC_TOP - 1)));
        // A different tenant still sees the top id as free.
        assert_eq!(allocate_id(&state, 1), Some(KeyId(ALLOC_TOP)));
    }
}
