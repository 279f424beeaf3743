//! Request/reply transport used by [`IndexClient`](crate::client::IndexClient).
//!
//! The client only needs ordered, reliable delivery of multipart messages and
//! a receive that gives up after a deadline. [`ZmqTransport`] provides that
//! over a REQ socket; tests substitute scripted transports.

use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{debug, info};

use crate::socket_config::{create_req_and_connect, DEFAULT_SEND_TIMEOUT_MS};

/// Transport failures. All of them mean the channel is unusable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Failed to connect to {endpoint}: {message}")]
    Connect { endpoint: String, message: String },
    #[error("Send failed: {0}")]
    Send(String),
    #[error("Send timed out after {0:?}")]
    SendTimeout(Duration),
    #[error("Receive failed: {0}")]
    Receive(String),
    #[error("Channel closed")]
    Closed,
}

/// Ordered multipart request/reply channel.
pub trait Transport {
    /// Send every part as one logical message.
    fn send_parts(&mut self, parts: &[Bytes]) -> Result<(), TransportError>;

    /// Wait up to `timeout` for one reply. `Ok(None)` means nothing arrived.
    fn recv_parts(&mut self, timeout: Duration) -> Result<Option<Vec<Bytes>>, TransportError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send_parts(&mut self, parts: &[Bytes]) -> Result<(), TransportError> {
        (**self).send_parts(parts)
    }

    fn recv_parts(&mut self, timeout: Duration) -> Result<Option<Vec<Bytes>>, TransportError> {
        (**self).recv_parts(timeout)
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn send_parts(&mut self, parts: &[Bytes]) -> Result<(), TransportError> {
        (**self).send_parts(parts)
    }

    fn recv_parts(&mut self, timeout: Duration) -> Result<Option<Vec<Bytes>>, TransportError> {
        (**self).recv_parts(timeout)
    }
}

/// REQ socket transport with poll-based timed receive.
pub struct ZmqTransport {
    endpoint: String,
    send_timeout: Duration,
    socket: zmq::Socket,
    /// Context must outlive the socket - keep it alive here
    #[allow(dead_code)]
    context: zmq::Context,
}

impl ZmqTransport {
    /// Connect with the default send timeout.
    ///
    /// ZMQ connects asynchronously, so this succeeds even when the server is
    /// not up yet; requests queue until it appears or the send times out.
    pub fn connect(endpoint: &str) -> Result<Self, TransportError> {
        Self::connect_with_timeout(
            endpoint,
            Duration::from_millis(DEFAULT_SEND_TIMEOUT_MS as u64),
        )
    }

    pub fn connect_with_timeout(
        endpoint: &str,
        send_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let context = zmq::Context::new();
        let send_timeout_ms = i32::try_from(send_timeout.as_millis()).unwrap_or(i32::MAX);
        let socket = create_req_and_connect(&context, endpoint, send_timeout_ms).map_err(|e| {
            TransportError::Connect {
                endpoint: endpoint.to_string(),
                message: e.to_string(),
            }
        })?;

        info!("REQ socket connecting to {}", endpoint);

        Ok(Self {
            endpoint: endpoint.to_string(),
            send_timeout,
            socket,
            context,
        })
    }
}

impl Transport for ZmqTransport {
    fn send_parts(&mut self, parts: &[Bytes]) -> Result<(), TransportError> {
        let frames: Vec<&[u8]> = parts.iter().map(|p| p.as_ref()).collect();
        match self.socket.send_multipart(frames, 0) {
            Ok(()) => Ok(()),
            Err(zmq::Error::EAGAIN) => Err(TransportError::SendTimeout(self.send_timeout)),
            Err(zmq::Error::ETERM) => Err(TransportError::Closed),
            Err(e) => Err(TransportError::Send(e.to_string())),
        }
    }

    fn recv_parts(&mut self, timeout: Duration) -> Result<Option<Vec<Bytes>>, TransportError> {
        let deadline = Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let timeout_ms = i64::try_from(remaining.as_millis()).unwrap_or(i64::MAX);
            let ready = self
                .socket
                .poll(zmq::POLLIN, timeout_ms)
                .map_err(|e| TransportError::Receive(e.to_string()))?;

            if ready == 0 {
                debug!("{}: no reply within {:?}", self.endpoint, timeout);
                return Ok(None);
            }

            match self.socket.recv_multipart(zmq::DONTWAIT) {
                Ok(frames) => return Ok(Some(frames.into_iter().map(Bytes::from).collect())),
                // A late reply to an earlier request; REQ_CORRELATE discarded it
                Err(zmq::Error::EAGAIN) => {
                    if remaining.is_zero() {
                        return Ok(None);
                    }
                }
                Err(zmq::Error::ETERM) => return Err(TransportError::Closed),
                Err(e) => return Err(TransportError::Receive(e.to_string())),
            }
        }
    }
}

impl Drop for ZmqTransport {
    fn drop(&mut self) {
        debug!("Closing REQ socket to {}", self.endpoint);
    }
}
