//! Session protocol: init, close, and echo.
//!
//! Each operation comes as a request/response pair for callers that own
//! their poll loop, plus a polling wrapper that absorbs `NotReady`.

use hsmlink_core::comm::{EchoPayload, InitRequest, InitResponse};
use hsmlink_core::{CommAction, Group, Kind};
use tracing::{debug, info};

use crate::context::Client;
use crate::error::{AbortReason, ClientError};

fn comm_kind(action: CommAction) -> Kind {
    Kind::new(Group::Comm, action as u8)
}

fn require_exact(body: &[u8], expected: usize) -> Result<(), ClientError> {
    if body.len() != expected {
        return Err(ClientError::Aborted(AbortReason::BadResponseSize {
            expected,
            actual: body.len(),
        }));
    }
    Ok(())
}

impl Client {
    // ── Init ──────────────────────────────────────────────────────────────

    /// Sends the session handshake carrying this context's tenant identity.
    pub fn comm_init_request(&mut self) -> Result<(), ClientError> {
        let req = InitRequest { client_id: self.client_id() };
        self.send_request(comm_kind(CommAction::Init), &req.encode())
    }

    /// Receives the handshake response and records the learned server id.
    pub fn comm_init_response(&mut self) -> Result<(u32, u32), ClientError> {
        let (_, _, body) = self.recv_response()?;
        self.parse_init(&body)
    }

    /// Polling handshake; returns `(client_id, server_id)`.
    pub fn comm_init(&mut self) -> Result<(u32, u32), ClientError> {
        let req = InitRequest { client_id: self.client_id() };
        let body = self.exchange(comm_kind(CommAction::Init), &req.encode())?;
        self.parse_init(&body)
    }

    fn parse_init(&mut self, body: &[u8]) -> Result<(u32, u32), ClientError> {
        require_exact(body, InitResponse::WIRE_SIZE)?;
        let rsp = InitResponse::decode(body)?;
        self.record_server_id(rsp.server_id);
        info!(
            client_id = rsp.client_id,
            server_id = rsp.server_id,
            "session established"
        );
        Ok((rsp.client_id, rsp.server_id))
    }

    // ── Close ─────────────────────────────────────────────────────────────

    /// Sends the session-close notice.  Empty payload.
    pub fn comm_close_request(&mut self) -> Result<(), ClientError> {
        self.send_request(comm_kind(CommAction::Close), &[])
    }

    /// Receives the header-only close acknowledgment.
    pub fn comm_close_response(&mut self) -> Result<(), ClientError> {
        let (_, _, body) = self.recv_response()?;
        require_exact(&body, 0)?;
        debug!("session closed");
        Ok(())
    }

    /// Polling close.
    pub fn comm_close(&mut self) -> Result<(), ClientError> {
        let body = self.exchange(comm_kind(CommAction::Close), &[])?;
        require_exact(&body, 0)?;
        debug!("session closed");
        Ok(())
    }

    // ── Echo ──────────────────────────────────────────────────────────────

    /// Sends an echo request.  Oversized input is silently truncated to
    /// [`hsmlink_core::comm::ECHO_DATA_LEN`].
    pub fn echo_request(&mut self, data: &[u8]) -> Result<(), ClientError> {
        let payload = EchoPayload::new(data);
        self.send_request(comm_kind(CommAction::Echo), &payload.encode())
    }

    /// Receives the echoed bytes.
    pub fn echo_response(&mut self) -> Result<Vec<u8>, ClientError> {
        let (_, _, body) = self.recv_response()?;
        require_exact(&body, EchoPayload::WIRE_SIZE)?;
        Ok(EchoPayload::decode(&body)?.data)
    }

    /// Polling echo round-trip.
    pub fn echo(&mut self, data: &[u8]) -> Result<Vec<u8>, ClientError> {
        let payload = EchoPayload::new(data);
        let body = self.exchange(comm_kind(CommAction::Echo), &payload.encode())?;
        require_exact(&body, EchoPayload::WIRE_SIZE)?;
        Ok(EchoPayload::decode(&body)?.data)
    }
}
