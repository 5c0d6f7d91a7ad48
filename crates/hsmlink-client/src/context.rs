//! Client context: request/response pairing and the polling loop.
//!
//! A [`Client`] allows at most one request in flight.  Every response is
//! validated against the outstanding request's kind and sequence before any
//! payload byte is interpreted; a mismatch marks the session stale and the
//! caller must [`Client::reset`] (and usually re-initialize) before using
//! the context again.

use hsmlink_core::{Group, Kind, MAGIC_NATIVE};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::comm::CommClient;
use crate::error::{AbortReason, ClientError};
use crate::transport::Transport;

/// How the blocking-by-polling wrappers spend the wait.
///
/// `max_polls: None` polls forever, matching callers that own their event
/// loop; a bounded budget turns a wedged server into [`ClientError::Timeout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollPolicy {
    pub max_polls: Option<u32>,
    /// Cooperatively yield the thread between polls.  Never a sleep; the
    /// protocol path stays free of blocking syscalls.
    pub yield_between_polls: bool,
}

impl Default for PollPolicy {
    fn default() -> Self {
        PollPolicy {
            max_polls: None,
            yield_between_polls: true,
        }
    }
}

pub struct Client {
    comm: CommClient,
    /// Kind and sequence of the request awaiting its response.
    last_req: Option<(Kind, u16)>,
    policy: PollPolicy,
}

impl Client {
    pub fn new(transport: Box<dyn Transport>, client_id: u32) -> Self {
        Self::with_policy(transport, client_id, PollPolicy::default())
    }

    pub fn with_policy(
        transport: Box<dyn Transport>,
        client_id: u32,
        policy: PollPolicy,
    ) -> Self {
        Client {
            comm: CommClient::new(transport, client_id),
            last_req: None,
            policy,
        }
    }

    pub fn client_id(&self) -> u32 {
        self.comm.client_id()
    }

    pub fn set_client_id(&mut self, client_id: u32) {
        self.comm.set_client_id(client_id);
    }

    pub fn server_id(&self) -> Option<u32> {
        self.comm.server_id()
    }

    pub(crate) fn record_server_id(&mut self, server_id: u32) {
        self.comm.set_server_id(server_id);
    }

    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    /// Discards the outstanding-request marker after an abort.
    ///
    /// The server may still emit a response to the abandoned request; the
    /// session protocol must be re-initialized before the context is trusted
    /// again.
    pub fn reset(&mut self) {
        self.last_req = None;
    }

    /// Sends one request, recording it as outstanding.
    ///
    /// `NotReady` means nothing was sent; repeat the identical call.
    pub fn send_request(&mut self, kind: Kind, payload: &[u8]) -> Result<(), ClientError> {
        if self.last_req.is_some() {
            return Err(ClientError::BadArguments("a request is already outstanding"));
        }
        let seq = self.comm.send_request(MAGIC_NATIVE, kind, payload)?;
        self.last_req = Some((kind, seq));
        Ok(())
    }

    /// Receives and validates the response to the outstanding request.
    ///
    /// On a correlation failure the outstanding marker is kept so further
    /// receives also fail, until [`Client::reset`] re-arms the context.
    pub fn recv_response(&mut self) -> Result<(Group, u8, Vec<u8>), ClientError> {
        let (expected_kind, expected_seq) = self
            .last_req
            .ok_or(ClientError::BadArguments("no request outstanding"))?;

        let (magic, kind, seq, payload) = self.comm.recv_response()?;

        if magic != MAGIC_NATIVE {
            warn!(actual = magic, "response magic mismatch, session stale");
            return Err(ClientError::Aborted(AbortReason::MagicMismatch { actual: magic }));
        }
        if kind != expected_kind {
            warn!(
                expected = expected_kind.raw(),
                actual = kind.raw(),
                "response kind mismatch, session stale"
            );
            return Err(ClientError::Aborted(AbortReason::KindMismatch {
                expected: expected_kind,
                actual: kind,
            }));
        }
        if seq != expected_seq {
            warn!(
                expected = expected_seq,
                actual = seq,
                "response sequence mismatch, session stale"
            );
            return Err(ClientError::Aborted(AbortReason::CorrelationMismatch {
                expected: expected_seq,
                actual: seq,
            }));
        }

        self.last_req = None;
        let group = kind
            .group()
            .map_err(|_| ClientError::Aborted(AbortReason::MalformedFrame))?;
        Ok((group, kind.action(), payload))
    }

    /// Full request/response round-trip, absorbing `NotReady` per the poll
    /// policy.  Returns the validated response payload.
    pub fn exchange(&mut self, kind: Kind, payload: &[u8]) -> Result<Vec<u8>, ClientError> {
        let mut polls: u32 = 0;

        loop {
            match self.send_request(kind, payload) {
                Ok(()) => break,
                Err(ClientError::NotReady) => self.wait_one(&mut polls)?,
                Err(e) => return Err(e),
            }
        }
        loop {
            match self.recv_response() {
                Ok((_, _, body)) => return Ok(body),
                Err(ClientError::NotReady) => self.wait_one(&mut polls)?,
                Err(e) => return Err(e),
            }
        }
    }

    fn wait_one(&self, polls: &mut u32) -> Result<(), ClientError> {
        *polls += 1;
        if let Some(max) = self.policy.max_polls {
            if *polls >= max {
                return Err(ClientError::Timeout(*polls));
            }
        }
        if self.policy.yield_between_polls {
            std::thread::yield_now();
        }
        Ok(())
    }
}
