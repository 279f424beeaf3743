//! scoutproto - wire protocol and request/reply client for the Audio Scout index
//!
//! The index server speaks a small binary protocol over a ZMQ REQ/REP pair.
//! A client sends one request (Query or Submit), then waits a bounded time
//! for exactly one reply before it may send again.
//!
//! ## Layers
//!
//! - `fingerprint` - the per-track hash and toggle sequence that gets sent
//! - `metadata` - the nine-field inline descriptor attached to submissions
//! - `frame` - request encoding and reply decoding (all integers little-endian)
//! - `timing` - reply budgets per command
//! - `transport` - the multipart send/timed-receive seam, with a ZMQ backend
//! - `client` - the Idle / AwaitingReply state machine on top
//!
//! ## Example
//!
//! ```no_run
//! use scoutproto::{FingerprintResult, IndexClient, WireMessage, ZmqTransport};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = ZmqTransport::connect("tcp://localhost:4005")?;
//! let mut client = IndexClient::new(transport);
//!
//! let fp = FingerprintResult::without_toggles(vec![17, 42]);
//! match client.exchange(&WireMessage::query(&fp)?)? {
//!     Some(reply) => println!("{}", reply),
//!     None => println!("no reply"),
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod fingerprint;
pub mod frame;
pub mod metadata;
pub mod socket_config;
pub mod timing;
pub mod transport;

pub use client::{ClientError, ClientState, ExchangeStats, IndexClient};
pub use fingerprint::{FingerprintError, FingerprintResult};
pub use frame::{decode_reply, Command, ParsedRequest, ProtocolError, Reply, WireMessage};
pub use metadata::{FormatError, MetadataRecord};
pub use timing::{QUERY_REPLY_TIMEOUT, SUBMIT_REPLY_TIMEOUT};
pub use transport::{Transport, TransportError, ZmqTransport};
