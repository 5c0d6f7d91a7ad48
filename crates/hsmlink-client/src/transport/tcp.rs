//! TCP transport.
//!
//! Wraps a non-blocking `std::net::TcpStream` and restores frame boundaries
//! on top of the byte stream: the 8-byte header carries the payload length,
//! so the receiver accumulates bytes until one whole frame is present.
//!
//! Writes may also land partially.  The unsent tail is kept in a pending
//! buffer; because the protocol allows only one frame in flight per context,
//! a `send` that reports not-ready is always re-offered the same frame, and
//! the pending buffer simply keeps flushing it.

use std::io::{ErrorKind, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};

use hsmlink_core::{HEADER_SIZE, MTU};
use tracing::{debug, trace};

use super::{Transport, TransportError};

pub struct TcpTransport {
    stream: TcpStream,
    /// Unsent tail of the frame currently being written.
    pending_out: Vec<u8>,
    /// Bytes received but not yet assembled into a full frame.
    rx_buf: Vec<u8>,
}

impl TcpTransport {
    /// Connects to a server and switches the socket to non-blocking mode.
    pub fn connect<A: ToSocketAddrs>(addr: A) -> std::io::Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        stream.set_nonblocking(true)?;
        debug!(peer = ?stream.peer_addr().ok(), "tcp transport connected");
        Ok(Self::from_stream_unchecked(stream))
    }

    /// Wraps an accepted stream.  The socket must already be non-blocking.
    pub fn from_stream(stream: TcpStream) -> std::io::Result<Self> {
        stream.set_nodelay(true)?;
        stream.set_nonblocking(true)?;
        Ok(Self::from_stream_unchecked(stream))
    }

    fn from_stream_unchecked(stream: TcpStream) -> Self {
        TcpTransport {
            stream,
            pending_out: Vec::new(),
            rx_buf: Vec::with_capacity(MTU),
        }
    }

    /// Pushes pending output to the socket.  Ok(true) means fully flushed.
    fn flush_pending(&mut self) -> Result<bool, TransportError> {
        while !self.pending_out.is_empty() {
            match self.stream.write(&self.pending_out) {
                Ok(0) => return Err(TransportError::Closed),
                Ok(n) => {
                    trace!(bytes = n, "tcp transport wrote");
                    self.pending_out.drain(..n);
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(false),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(TransportError::Io(e)),
            }
        }
        Ok(true)
    }

    /// Pulls whatever the socket has into the reassembly buffer.
    fn fill_rx(&mut self) -> Result<(), TransportError> {
        let mut chunk = [0u8; 4096];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => return Err(TransportError::Closed),
                Ok(n) => {
                    trace!(bytes = n, "tcp transport read");
                    self.rx_buf.extend_from_slice(&chunk[..n]);
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(()),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(TransportError::Io(e)),
            }
        }
    }

    /// Pops one complete frame from the reassembly buffer, if present.
    fn pop_frame(&mut self) -> Option<Vec<u8>> {
        if self.rx_buf.len() < HEADER_SIZE {
            return None;
        }
        // Frame by the raw length field; validation of magic, kind, and
        // length bounds happens above this layer.
        let len = u16::from_le_bytes([self.rx_buf[6], self.rx_buf[7]]) as usize;
        let total = HEADER_SIZE + len;
        if self.rx_buf.len() < total {
            return None;
        }
        let frame: Vec<u8> = self.rx_buf.drain(..total).collect();
        Some(frame)
    }
}

impl Transport for TcpTransport {
    fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        if frame.len() > MTU {
            return Err(TransportError::FrameTooLarge { size: frame.len(), max: MTU });
        }
        if self.pending_out.is_empty() {
            self.pending_out.extend_from_slice(frame);
        }
        // Otherwise this is the re-offer of the frame already queued.
        if self.flush_pending()? {
            Ok(())
        } else {
            Err(TransportError::NotReady)
        }
    }

    fn recv(&mut self) -> Result<Vec<u8>, TransportError> {
        if let Some(frame) = self.pop_frame() {
            return Ok(frame);
        }
        match self.fill_rx() {
            Ok(()) => {}
            // Hand over frames that arrived before the close.
            Err(TransportError::Closed) => {
                return self.pop_frame().ok_or(TransportError::Closed);
            }
            Err(e) => return Err(e),
        }
        self.pop_frame().ok_or(TransportError::NotReady)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    fn pair() -> (TcpTransport, TcpTransport) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpTransport::connect(addr).unwrap();
        let (accepted, _) = listener.accept().unwrap();
        let server = TcpTransport::from_stream(accepted).unwrap();
        (client, server)
    }

    fn recv_blocking(t: &mut TcpTransport) -> Vec<u8> {
        loop {
            match t.recv() {
                Ok(frame) => return frame,
                Err(TransportError::NotReady) => std::thread::yield_now(),
                Err(e) => panic!("recv failed: {e}"),
            }
        }
    }

    #[test]
    fn test_frame_survives_the_socket() {
        let (mut client, mut server) = pair();
        let frame = hsmlink_core::encode_frame(
            hsmlink_core::MAGIC_NATIVE,
            hsmlink_core::Kind::from_raw(0x0103),
            1,
            &[0xAA; 16],
        )
        .unwrap();

        client.send(&frame).unwrap();
        assert_eq!(recv_blocking(&mut server), frame);
    }

    #[test]
    fn test_back_to_back_frames_keep_their_boundaries() {
        let (mut client, mut server) = pair();
        let f1 = hsmlink_core::encode_frame(
            hsmlink_core::MAGIC_NATIVE,
            hsmlink_core::Kind::from_raw(0x0103),
            1,
            &[0x01; 8],
        )
        .unwrap();
        let f2 = hsmlink_core::encode_frame(
            hsmlink_core::MAGIC_NATIVE,
            hsmlink_core::Kind::from_raw(0x0103),
            2,
            &[0x02; 32],
        )
        .unwrap();

        client.send(&f1).unwrap();
        client.send(&f2).unwrap();
        assert_eq!(recv_blocking(&mut server), f1);
        assert_eq!(recv_blocking(&mut server), f2);
    }

    #[test]
    fn test_empty_socket_reports_not_ready() {
        let (mut client, _server) = pair();
        assert!(matches!(client.recv(), Err(TransportError::NotReady)));
    }

    #[test]
    fn test_oversized_frame_is_rejected_locally() {
        let (mut client, _server) = pair();
        let big = vec![0u8; MTU + 1];
        assert!(matches!(
            client.send(&big),
            Err(TransportError::FrameTooLarge { .. })
        ));
    }
}
