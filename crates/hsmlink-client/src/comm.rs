//! Framing layer over a transport.
//!
//! `CommClient` owns the transport, the connection identity, and the
//! correlation sequence counter.  It knows nothing about request/response
//! pairing; that is the context's job (see [`crate::context`]).

use hsmlink_core::{decode_frame, encode_frame, Kind};
use tracing::trace;

use crate::error::{AbortReason, ClientError};
use crate::transport::Transport;

pub struct CommClient {
    transport: Box<dyn Transport>,
    /// Tenant identity reported in the session handshake.
    client_id: u32,
    /// Learned from the init response; `None` before the first handshake.
    server_id: Option<u32>,
    /// Sequence of the last request that actually left the transport.
    seq: u16,
}

impl CommClient {
    pub fn new(transport: Box<dyn Transport>, client_id: u32) -> Self {
        CommClient {
            transport,
            client_id,
            server_id: None,
            seq: 0,
        }
    }

    pub fn client_id(&self) -> u32 {
        self.client_id
    }

    /// Changes the tenant identity used by the next handshake.
    pub fn set_client_id(&mut self, client_id: u32) {
        self.client_id = client_id;
    }

    pub fn server_id(&self) -> Option<u32> {
        self.server_id
    }

    pub(crate) fn set_server_id(&mut self, server_id: u32) {
        self.server_id = Some(server_id);
    }

    /// Encodes and sends one request frame, returning its sequence number.
    ///
    /// The sequence is committed only when the transport accepts the frame,
    /// so a `NotReady` retry reuses the same number.
    pub fn send_request(
        &mut self,
        magic: u16,
        kind: Kind,
        payload: &[u8],
    ) -> Result<u16, ClientError> {
        let seq = self.seq.wrapping_add(1);
        let frame = encode_frame(magic, kind, seq, payload)?;
        self.transport.send(&frame)?;
        self.seq = seq;
        trace!(kind = kind.raw(), seq, len = payload.len(), "request sent");
        Ok(seq)
    }

    /// Polls the transport once for a response frame and decodes its header.
    ///
    /// No correlation checks happen here; the raw header fields are handed
    /// up so the context can validate them against its outstanding request.
    pub fn recv_response(&mut self) -> Result<(u16, Kind, u16, Vec<u8>), ClientError> {
        let frame = self.transport.recv()?;
        let (header, payload) = decode_frame(&frame)
            .map_err(|_| ClientError::Aborted(AbortReason::MalformedFrame))?;
        trace!(
            kind = header.kind.raw(),
            seq = header.seq,
            len = payload.len(),
            "response received"
        );
        Ok((header.magic, header.kind, header.seq, payload.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MockTransport, TransportError};
    use hsmlink_core::{CommAction, Group, MAGIC_NATIVE};

    #[test]
    fn test_sequence_commits_only_on_successful_send() {
        let mut transport = MockTransport::new();
        transport
            .expect_send()
            .times(1)
            .returning(|_| Err(TransportError::NotReady));
        transport.expect_send().times(2).returning(|_| Ok(()));

        let mut comm = CommClient::new(Box::new(transport), 1);
        let kind = Kind::new(Group::Comm, CommAction::Echo as u8);

        assert!(matches!(
            comm.send_request(MAGIC_NATIVE, kind, &[]),
            Err(ClientError::NotReady)
        ));
        // Retry reuses sequence 1; only then does 2 get issued.
        assert_eq!(comm.send_request(MAGIC_NATIVE, kind, &[]).unwrap(), 1);
        assert_eq!(comm.send_request(MAGIC_NATIVE, kind, &[]).unwrap(), 2);
    }

    #[test]
    fn test_recv_passes_not_ready_through() {
        let mut transport = MockTransport::new();
        transport
            .expect_recv()
            .returning(|| Err(TransportError::NotReady));

        let mut comm = CommClient::new(Box::new(transport), 1);
        assert!(matches!(comm.recv_response(), Err(ClientError::NotReady)));
    }

    #[test]
    fn test_recv_rejects_truncated_frame() {
        let mut transport = MockTransport::new();
        transport.expect_recv().returning(|| Ok(vec![0x48, 0x4C, 0x01]));

        let mut comm = CommClient::new(Box::new(transport), 1);
        assert!(matches!(
            comm.recv_response(),
            Err(ClientError::Aborted(AbortReason::MalformedFrame))
        ));
    }
}
