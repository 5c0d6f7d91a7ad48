//! Key lifecycle protocol: cache, evict, commit, export, erase.
//!
//! Every operation is two-phase.  A completed exchange whose embedded `rc`
//! is non-zero surfaces as [`ClientError::Server`]: delivery worked, the
//! operation did not.  Argument mistakes are caught before anything is sent.

use hsmlink_core::keystore::{
    KeyCacheRequest, KeyCacheResponse, KeyExportResponse, KeyRefRequest, Label,
    StatusResponse, KEY_DATA_MAX,
};
use hsmlink_core::{Group, KeyAction, KeyId, Kind};
use tracing::debug;

use crate::context::Client;
use crate::error::{AbortReason, ClientError, ServerStatus};

fn key_kind(action: KeyAction) -> Kind {
    Kind::new(Group::Key, action as u8)
}

/// Size and label of an exported key, reported without the material itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyExportInfo {
    pub len: u16,
    pub label: Label,
}

fn check_rc(rc: i32) -> Result<(), ClientError> {
    if rc != 0 {
        return Err(ClientError::Server(ServerStatus::from_code(rc)));
    }
    Ok(())
}

impl Client {
    // ── Cache ─────────────────────────────────────────────────────────────

    /// Sends key material to the server's cache under an explicit id, or
    /// [`KeyId::ERASED`] to let the server allocate one.
    pub fn key_cache_request(
        &mut self,
        id: KeyId,
        flags: u32,
        label: Option<Label>,
        key: &[u8],
    ) -> Result<(), ClientError> {
        if key.is_empty() {
            return Err(ClientError::BadArguments("key material must be non-empty"));
        }
        if key.len() > KEY_DATA_MAX {
            return Err(ClientError::BadArguments("key material exceeds one frame"));
        }
        let req = KeyCacheRequest { id, flags, label, key: key.to_vec() };
        self.send_request(key_kind(KeyAction::Cache), &req.encode()?)
    }

    /// Receives the cache response: the id the material now lives under.
    pub fn key_cache_response(&mut self) -> Result<KeyId, ClientError> {
        let (_, _, body) = self.recv_response()?;
        let rsp = KeyCacheResponse::decode(&body)?;
        check_rc(rsp.rc)?;
        debug!(key_id = %rsp.id, "key cached");
        Ok(rsp.id)
    }

    /// Polling cache with server-allocated id.
    pub fn key_cache(
        &mut self,
        flags: u32,
        label: Option<Label>,
        key: &[u8],
    ) -> Result<KeyId, ClientError> {
        self.key_cache_with_id(KeyId::ERASED, flags, label, key)
    }

    /// Polling cache under a caller-chosen id.
    pub fn key_cache_with_id(
        &mut self,
        id: KeyId,
        flags: u32,
        label: Option<Label>,
        key: &[u8],
    ) -> Result<KeyId, ClientError> {
        if key.is_empty() {
            return Err(ClientError::BadArguments("key material must be non-empty"));
        }
        if key.len() > KEY_DATA_MAX {
            return Err(ClientError::BadArguments("key material exceeds one frame"));
        }
        let req = KeyCacheRequest { id, flags, label, key: key.to_vec() };
        let body = self.exchange(key_kind(KeyAction::Cache), &req.encode()?)?;
        let rsp = KeyCacheResponse::decode(&body)?;
        check_rc(rsp.rc)?;
        debug!(key_id = %rsp.id, "key cached");
        Ok(rsp.id)
    }

    // ── Evict ─────────────────────────────────────────────────────────────

    pub fn key_evict_request(&mut self, id: KeyId) -> Result<(), ClientError> {
        self.send_key_ref(KeyAction::Evict, id)
    }

    pub fn key_evict_response(&mut self) -> Result<(), ClientError> {
        self.recv_status()
    }

    /// Polling evict: drops the cached copy, leaving committed storage alone.
    pub fn key_evict(&mut self, id: KeyId) -> Result<(), ClientError> {
        self.round_trip_status(KeyAction::Evict, id)
    }

    // ── Commit ────────────────────────────────────────────────────────────

    pub fn key_commit_request(&mut self, id: KeyId) -> Result<(), ClientError> {
        self.send_key_ref(KeyAction::Commit, id)
    }

    pub fn key_commit_response(&mut self) -> Result<(), ClientError> {
        self.recv_status()
    }

    /// Polling commit: persists the cached key to the server's storage.
    pub fn key_commit(&mut self, id: KeyId) -> Result<(), ClientError> {
        self.round_trip_status(KeyAction::Commit, id)
    }

    // ── Erase ─────────────────────────────────────────────────────────────

    pub fn key_erase_request(&mut self, id: KeyId) -> Result<(), ClientError> {
        self.send_key_ref(KeyAction::Erase, id)
    }

    pub fn key_erase_response(&mut self) -> Result<(), ClientError> {
        self.recv_status()
    }

    /// Polling erase: permanently removes the key from cache and storage.
    pub fn key_erase(&mut self, id: KeyId) -> Result<(), ClientError> {
        self.round_trip_status(KeyAction::Erase, id)
    }

    // ── Export ────────────────────────────────────────────────────────────

    pub fn key_export_request(&mut self, id: KeyId) -> Result<(), ClientError> {
        self.send_key_ref(KeyAction::Export, id)
    }

    /// Receives exported key material into `out`.
    ///
    /// `None` is size-probe mode: the size and label are reported and no
    /// bytes are copied.  A too-small buffer fails with
    /// `Aborted(BufferTooSmall)` and writes nothing.
    pub fn key_export_response(
        &mut self,
        out: Option<&mut [u8]>,
    ) -> Result<KeyExportInfo, ClientError> {
        let (_, _, body) = self.recv_response()?;
        Self::parse_export(&body, out)
    }

    /// Polling export into a caller buffer.
    pub fn key_export(
        &mut self,
        id: KeyId,
        out: &mut [u8],
    ) -> Result<KeyExportInfo, ClientError> {
        if id.is_erased() {
            return Err(ClientError::BadArguments("export requires a concrete key id"));
        }
        let req = KeyRefRequest { id };
        let body = self.exchange(key_kind(KeyAction::Export), &req.encode())?;
        Self::parse_export(&body, Some(out))
    }

    /// Polling size probe: reports the stored size and label only.
    pub fn key_export_size(&mut self, id: KeyId) -> Result<KeyExportInfo, ClientError> {
        if id.is_erased() {
            return Err(ClientError::BadArguments("export requires a concrete key id"));
        }
        let req = KeyRefRequest { id };
        let body = self.exchange(key_kind(KeyAction::Export), &req.encode())?;
        Self::parse_export(&body, None)
    }

    fn parse_export(
        body: &[u8],
        out: Option<&mut [u8]>,
    ) -> Result<KeyExportInfo, ClientError> {
        let rsp = KeyExportResponse::decode(body)?;
        check_rc(rsp.rc)?;
        let info = KeyExportInfo { len: rsp.len, label: rsp.label };
        if let Some(buf) = out {
            if buf.len() < rsp.key.len() {
                return Err(ClientError::Aborted(AbortReason::BufferTooSmall {
                    needed: rsp.key.len(),
                    capacity: buf.len(),
                }));
            }
            buf[..rsp.key.len()].copy_from_slice(&rsp.key);
        }
        Ok(info)
    }

    // ── Shared plumbing ───────────────────────────────────────────────────

    fn send_key_ref(&mut self, action: KeyAction, id: KeyId) -> Result<(), ClientError> {
        if id.is_erased() {
            return Err(ClientError::BadArguments("operation requires a concrete key id"));
        }
        let req = KeyRefRequest { id };
        self.send_request(key_kind(action), &req.encode())
    }

    fn recv_status(&mut self) -> Result<(), ClientError> {
        let (_, _, body) = self.recv_response()?;
        check_rc(StatusResponse::decode(&body)?.rc)
    }

    fn round_trip_status(&mut self, action: KeyAction, id: KeyId) -> Result<(), ClientError> {
        if id.is_erased() {
            return Err(ClientError::BadArguments("operation requires a concrete key id"));
        }
        let req = KeyRefRequest { id };
        let body = self.exchange(key_kind(action), &req.encode())?;
        check_rc(StatusResponse::decode(&body)?.rc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{mem_pair, MemTransport, Transport};
    use hsmlink_core::{decode_frame, encode_frame, status, MAGIC_NATIVE};

    fn answer(peer: &mut MemTransport, body: &[u8]) {
        let frame = peer.recv().expect("request pending");
        let (header, _) = decode_frame(&frame).unwrap();
        let reply = encode_frame(MAGIC_NATIVE, header.kind, header.seq, body).unwrap();
        peer.send(&reply).unwrap();
    }

    #[test]
    fn test_empty_key_material_is_rejected_before_send() {
        let (client_end, mut peer) = mem_pair();
        let mut client = Client::new(Box::new(client_end), 1);
        assert!(matches!(
            client.key_cache(0, None, &[]),
            Err(ClientError::BadArguments(_))
        ));
        // Nothing left the client.
        assert!(matches!(
            peer.recv(),
            Err(crate::transport::TransportError::NotReady)
        ));
    }

    #[test]
    fn test_sentinel_id_is_rejected_for_reference_operations() {
        let (client_end, _peer) = mem_pair();
        let mut client = Client::new(Box::new(client_end), 1);
        assert!(matches!(
            client.key_evict(KeyId::ERASED),
            Err(ClientError::BadArguments(_))
        ));
        assert!(matches!(
            client.key_export_size(KeyId::ERASED),
            Err(ClientError::BadArguments(_))
        ));
    }

    #[test]
    fn test_non_zero_rc_becomes_server_error() {
        let (client_end, mut peer) = mem_pair();
        let mut client = Client::new(Box::new(client_end), 1);

        client.key_evict_request(KeyId(5)).unwrap();
        answer(&mut peer, &StatusResponse { rc: status::NOTFOUND }.encode());

        assert!(matches!(
            client.key_evict_response(),
            Err(ClientError::Server(ServerStatus::NotFound))
        ));
    }

    #[test]
    fn test_cache_returns_the_allocated_id() {
        let (client_end, mut peer) = mem_pair();
        let mut client = Client::new(Box::new(client_end), 1);

        client
            .key_cache_request(KeyId::ERASED, 0, Some(Label::new(b"k")), &[1, 2, 3])
            .unwrap();
        answer(&mut peer, &KeyCacheResponse { rc: 0, id: KeyId(0xFFFE) }.encode());

        assert_eq!(client.key_cache_response().unwrap(), KeyId(0xFFFE));
    }

    #[test]
    fn test_export_small_buffer_aborts_without_partial_copy() {
        let (client_end, mut peer) = mem_pair();
        let mut client = Client::new(Box::new(client_end), 1);

        client.key_export_request(KeyId(5)).unwrap();
        let rsp = KeyExportResponse {
            rc: 0,
            len: 8,
            label: Label::new(b"big"),
            key: vec![0xEE; 8],
        };
        answer(&mut peer, &rsp.encode().unwrap());

        let mut small = [0u8; 4];
        assert!(matches!(
            client.key_export_response(Some(&mut small)),
            Err(ClientError::Aborted(AbortReason::BufferTooSmall {
                needed: 8,
                capacity: 4,
            }))
        ));
        assert_eq!(small, [0u8; 4]);
    }

    #[test]
    fn test_export_size_probe_copies_nothing() {
        let (client_end, mut peer) = mem_pair();
        let mut client = Client::new(Box::new(client_end), 1);

        client.key_export_request(KeyId(5)).unwrap();
        let rsp = KeyExportResponse {
            rc: 0,
            len: 16,
            label: Label::new(b"probe"),
            key: vec![0xEE; 16],
        };
        answer(&mut peer, &rsp.encode().unwrap());

        let info = client.key_export_response(None).unwrap();
        assert_eq!(info.len, 16);
        assert_eq!(info.label, Label::new(b"probe"));
    }
}
