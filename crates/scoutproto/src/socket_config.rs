//! ZMQ socket setup for the index client.
//!
//! All socket options are applied here so every REQ socket behaves the same.
//!
//! - `LINGER` = 0: closing never blocks on unsent requests
//! - `SNDTIMEO`: a send that cannot be queued fails instead of hanging
//! - `REQ_RELAXED`: a new request may follow one that never got a reply
//! - `REQ_CORRELATE`: late replies to abandoned requests are dropped

use tracing::warn;

/// Default send timeout in milliseconds
pub const DEFAULT_SEND_TIMEOUT_MS: i32 = 5000;

/// Create a REQ socket with the standard options, then connect it.
pub fn create_req_and_connect(
    ctx: &zmq::Context,
    endpoint: &str,
    send_timeout_ms: i32,
) -> Result<zmq::Socket, zmq::Error> {
    let socket = ctx.socket(zmq::REQ)?;
    configure_req(&socket, send_timeout_ms)?;
    socket.connect(endpoint)?;
    Ok(socket)
}

/// Apply the standard REQ options.
///
/// `REQ_RELAXED` and `REQ_CORRELATE` are required: without them a timed-out
/// exchange would leave the socket unable to send. Linger and send timeout
/// failures are only logged.
pub fn configure_req(socket: &zmq::Socket, send_timeout_ms: i32) -> Result<(), zmq::Error> {
    if let Err(e) = socket.set_linger(0) {
        warn!("Failed to set LINGER: {}", e);
    }
    if let Err(e) = socket.set_sndtimeo(send_timeout_ms) {
        warn!("Failed to set SNDTIMEO: {}", e);
    }
    socket.set_req_relaxed(true)?;
    socket.set_req_correlate(true)?;
    Ok(())
}
