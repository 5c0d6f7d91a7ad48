//! Custom-callback protocol.
//!
//! The callback slot id doubles as the action byte of the message kind, so
//! each slot correlates independently.  The QUERY shape is reserved for the
//! registration probe: "is anything installed in this slot?" is answerable
//! without invoking the handler.

use hsmlink_core::custom::{CustomRequest, CustomResponse, CustomType, CUSTOM_CB_COUNT};
use hsmlink_core::{status, Group, Kind};
use tracing::debug;

use crate::context::Client;
use crate::error::{AbortReason, ClientError};

/// Outcome of a registration probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackStatus {
    Registered,
    NoHandler,
}

fn custom_kind(id: u32) -> Kind {
    Kind::new(Group::Custom, id as u8)
}

fn check_slot(id: u32) -> Result<(), ClientError> {
    if id as usize >= CUSTOM_CB_COUNT {
        return Err(ClientError::BadArguments("callback slot out of range"));
    }
    Ok(())
}

impl Client {
    // ── Generic invocation ────────────────────────────────────────────────

    /// Sends an operator-defined callback request.
    pub fn custom_request(&mut self, req: &CustomRequest) -> Result<(), ClientError> {
        check_slot(req.id)?;
        self.send_request(custom_kind(req.id), &req.encode())
    }

    /// Receives a callback response.
    pub fn custom_response(&mut self) -> Result<CustomResponse, ClientError> {
        let (_, _, body) = self.recv_response()?;
        Self::parse_custom(&body)
    }

    /// Polling callback round-trip.
    pub fn custom(&mut self, req: &CustomRequest) -> Result<CustomResponse, ClientError> {
        check_slot(req.id)?;
        let body = self.exchange(custom_kind(req.id), &req.encode())?;
        Self::parse_custom(&body)
    }

    fn parse_custom(body: &[u8]) -> Result<CustomResponse, ClientError> {
        if body.len() != CustomResponse::WIRE_SIZE {
            return Err(ClientError::Aborted(AbortReason::BadResponseSize {
                expected: CustomResponse::WIRE_SIZE,
                actual: body.len(),
            }));
        }
        Ok(CustomResponse::decode(body)?)
    }

    // ── Registration probe ────────────────────────────────────────────────

    /// Asks whether a handler is installed in `id` without invoking it.
    pub fn custom_check_registered_request(&mut self, id: u32) -> Result<(), ClientError> {
        check_slot(id)?;
        let req = CustomRequest {
            id,
            shape: CustomType::Query,
            data: Default::default(),
        };
        self.send_request(custom_kind(id), &req.encode())
    }

    /// Receives the probe verdict.
    ///
    /// An absent handler is an answer, not an error; any embedded status
    /// other than OK or NOHANDLER breaks the probe contract and aborts.
    pub fn custom_check_registered_response(
        &mut self,
    ) -> Result<(u32, CallbackStatus), ClientError> {
        let (_, _, body) = self.recv_response()?;
        Self::parse_probe(&body)
    }

    /// Polling registration probe.
    pub fn custom_check_registered(&mut self, id: u32) -> Result<CallbackStatus, ClientError> {
        check_slot(id)?;
        let req = CustomRequest {
            id,
            shape: CustomType::Query,
            data: Default::default(),
        };
        let body = self.exchange(custom_kind(id), &req.encode())?;
        let (_, verdict) = Self::parse_probe(&body)?;
        Ok(verdict)
    }

    fn parse_probe(body: &[u8]) -> Result<(u32, CallbackStatus), ClientError> {
        let rsp = Self::parse_custom(body)?;
        if rsp.shape != CustomType::Query {
            return Err(ClientError::Aborted(AbortReason::UnexpectedType));
        }
        let verdict = match rsp.err {
            status::OK => CallbackStatus::Registered,
            status::NOHANDLER => CallbackStatus::NoHandler,
            other => return Err(ClientError::Aborted(AbortReason::UnexpectedStatus(other))),
        };
        debug!(slot = rsp.id, ?verdict, "registration probe answered");
        Ok((rsp.id, verdict))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{mem_pair, MemTransport, Transport};
    use hsmlink_core::custom::CustomData;
    use hsmlink_core::{decode_frame, encode_frame, MAGIC_NATIVE};

    fn answer(peer: &mut MemTransport, body: &[u8]) {
        let frame = peer.recv().expect("request pending");
        let (header, _) = decode_frame(&frame).unwrap();
        let reply = encode_frame(MAGIC_NATIVE, header.kind, header.seq, body).unwrap();
        peer.send(&reply).unwrap();
    }

    fn probe_reply(id: u32, shape: CustomType, err: i32) -> Vec<u8> {
        CustomResponse {
            id,
            shape,
            rc: 0,
            err,
            data: CustomData::default(),
        }
        .encode()
    }

    #[test]
    fn test_out_of_range_slot_is_rejected_locally() {
        let (client_end, _peer) = mem_pair();
        let mut client = Client::new(Box::new(client_end), 1);
        assert!(matches!(
            client.custom_check_registered(CUSTOM_CB_COUNT as u32),
            Err(ClientError::BadArguments(_))
        ));
    }

    #[test]
    fn test_probe_reports_registered_handler() {
        let (client_end, mut peer) = mem_pair();
        let mut client = Client::new(Box::new(client_end), 1);

        client.custom_check_registered_request(3).unwrap();
        answer(&mut peer, &probe_reply(3, CustomType::Query, status::OK));
        assert_eq!(
            client.custom_check_registered_response().unwrap(),
            (3, CallbackStatus::Registered)
        );
    }

    #[test]
    fn test_probe_reports_missing_handler_as_an_answer() {
        let (client_end, mut peer) = mem_pair();
        let mut client = Client::new(Box::new(client_end), 1);

        client.custom_check_registered_request(3).unwrap();
        answer(&mut peer, &probe_reply(3, CustomType::Query, status::NOHANDLER));
        assert_eq!(
            client.custom_check_registered_response().unwrap(),
            (3, CallbackStatus::NoHandler)
        );
    }

    #[test]
    fn test_probe_aborts_on_out_of_contract_status() {
        let (client_end, mut peer) = mem_pair();
        let mut client = Client::new(Box::new(client_end), 1);

        client.custom_check_registered_request(3).unwrap();
        answer(&mut peer, &probe_reply(3, CustomType::Query, status::BADARGS));
        assert!(matches!(
            client.custom_check_registered_response(),
            Err(ClientError::Aborted(AbortReason::UnexpectedStatus(status::BADARGS)))
        ));
    }

    #[test]
    fn test_probe_aborts_on_non_probe_shape() {
        let (client_end, mut peer) = mem_pair();
        let mut client = Client::new(Box::new(client_end), 1);

        client.custom_check_registered_request(3).unwrap();
        answer(&mut peer, &probe_reply(3, CustomType::Dma32, status::OK));
        assert!(matches!(
            client.custom_check_registered_response(),
            Err(ClientError::Aborted(AbortReason::UnexpectedType))
        ));
    }

    #[test]
    fn test_generic_invocation_round_trip() {
        let (client_end, mut peer) = mem_pair();
        let mut client = Client::new(Box::new(client_end), 1);

        let req = CustomRequest {
            id: 2,
            shape: CustomType::User(9),
            data: CustomData::new(b"args").unwrap(),
        };
        client.custom_request(&req).unwrap();
        let reply = CustomResponse {
            id: 2,
            shape: CustomType::User(9),
            rc: 17,
            err: status::OK,
            data: CustomData::new(b"result").unwrap(),
        };
        answer(&mut peer, &reply.encode());

        assert_eq!(client.custom_response().unwrap(), reply);
    }
}
