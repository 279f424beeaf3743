//! Index client: one request/reply session with the index server.
//!
//! The protocol is strictly one-at-a-time:
//!
//! ```text
//! Idle --send--> AwaitingReply(cmd) --receive (reply | timeout | error)--> Idle
//! ```
//!
//! A second `send` while a reply is outstanding is refused, never queued.
//! There is no automatic retry; one send/receive pair is one exchange and the
//! caller decides what a timeout means.

use tracing::{debug, trace, warn};

use crate::frame::{decode_reply, Command, ProtocolError, Reply, WireMessage};
use crate::transport::{Transport, TransportError};

/// Where the client is in the request/reply cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Idle,
    AwaitingReply(Command),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    #[error("A {0:?} request is still awaiting its reply")]
    Busy(Command),
    #[error("No request is awaiting a reply")]
    NotAwaiting,
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Exchange counters for the session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExchangeStats {
    pub sent: u32,
    pub replies: u32,
    pub timeouts: u32,
    /// Timeouts since the last reply
    pub consecutive_timeouts: u32,
}

/// Request/reply client over any [`Transport`].
pub struct IndexClient<T: Transport> {
    transport: T,
    state: ClientState,
    stats: ExchangeStats,
}

impl<T: Transport> IndexClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            state: ClientState::Idle,
            stats: ExchangeStats::default(),
        }
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn stats(&self) -> ExchangeStats {
        self.stats
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Transmit all parts of `message` as one request.
    pub fn send(&mut self, message: &WireMessage) -> Result<(), ClientError> {
        if let ClientState::AwaitingReply(pending) = self.state {
            return Err(ClientError::Busy(pending));
        }

        trace!(
            "Sending {} request: {} parts, {} bytes",
            message.command().as_str(),
            message.parts().len(),
            message.byte_len()
        );
        self.transport.send_parts(message.parts())?;

        self.state = ClientState::AwaitingReply(message.command());
        self.stats.sent += 1;
        Ok(())
    }

    /// Wait for the outstanding reply within its command's budget.
    ///
    /// Returns `Ok(None)` when the budget elapses. The client is Idle again
    /// afterwards whatever the result.
    pub fn receive(&mut self) -> Result<Option<Reply>, ClientError> {
        let command = match self.state {
            ClientState::AwaitingReply(command) => command,
            ClientState::Idle => return Err(ClientError::NotAwaiting),
        };

        let timeout = command.reply_timeout();
        let received = self.transport.recv_parts(timeout);
        self.state = ClientState::Idle;

        match received? {
            Some(parts) => {
                self.stats.replies += 1;
                self.stats.consecutive_timeouts = 0;
                debug!("Received {} reply in {} parts", command.as_str(), parts.len());
                Ok(Some(decode_reply(command, &parts)?))
            }
            None => {
                self.stats.timeouts += 1;
                self.stats.consecutive_timeouts += 1;
                warn!(
                    "No {} reply within {:?} ({} in a row)",
                    command.as_str(),
                    timeout,
                    self.stats.consecutive_timeouts
                );
                Ok(None)
            }
        }
    }

    /// One full exchange: send, then receive.
    pub fn exchange(&mut self, message: &WireMessage) -> Result<Option<Reply>, ClientError> {
        self.send(message)?;
        self.receive()
    }
}
