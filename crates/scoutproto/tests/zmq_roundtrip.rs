//! REQ client against a real REP socket over loopback TCP

use std::sync::atomic::{AtomicU16, Ordering};
use std::thread;
use std::time::Duration;

use scoutproto::{
    ClientState, FingerprintResult, IndexClient, MetadataRecord, Reply, WireMessage, ZmqTransport,
};

static PORT: AtomicU16 = AtomicU16::new(17620);

fn next_endpoint() -> String {
    let port = PORT.fetch_add(1, Ordering::SeqCst);
    format!("tcp://127.0.0.1:{}", port)
}

/// Bind a REP socket and answer requests with `respond`, one per request.
///
/// `respond` returns the reply parts plus a delay before sending them. The
/// thread exits after `count` requests and hands back every request it saw.
fn spawn_server<F>(endpoint: &str, count: usize, respond: F) -> thread::JoinHandle<Vec<Vec<Vec<u8>>>>
where
    F: Fn(usize, &[Vec<u8>]) -> (Vec<Vec<u8>>, Duration) + Send + 'static,
{
    let ctx = zmq::Context::new();
    let socket = ctx.socket(zmq::REP).unwrap();
    socket.set_linger(0).unwrap();
    socket.bind(endpoint).unwrap();

    thread::spawn(move || {
        let _ctx = ctx;
        let mut seen = Vec::new();
        for i in 0..count {
            let request = socket.recv_multipart(0).unwrap();
            let (reply, delay) = respond(i, &request);
            seen.push(request);
            thread::sleep(delay);
            socket.send_multipart(reply, 0).unwrap();
        }
        seen
    })
}

#[test]
fn query_roundtrip_exact_bytes() {
    let endpoint = next_endpoint();
    let server = spawn_server(&endpoint, 1, |_, _| {
        (vec![b"match: track 7\0".to_vec()], Duration::ZERO)
    });

    let mut client = IndexClient::new(ZmqTransport::connect(&endpoint).unwrap());
    let fp = FingerprintResult::without_toggles(vec![17, 42]);
    let reply = client.exchange(&WireMessage::query(&fp).unwrap()).unwrap();

    assert_eq!(
        reply,
        Some(Reply::Matched {
            text: "match: track 7".to_string()
        })
    );

    let seen = server.join().unwrap();
    assert_eq!(
        seen[0],
        vec![
            vec![0x01],
            vec![0x02, 0, 0, 0],
            vec![0x11, 0, 0, 0, 0x2A, 0, 0, 0],
        ]
    );
}

#[test]
fn submit_returns_uid() {
    let endpoint = next_endpoint();
    let server = spawn_server(&endpoint, 1, |_, _| {
        (vec![1234i32.to_le_bytes().to_vec()], Duration::ZERO)
    });

    let mut client = IndexClient::new(ZmqTransport::connect(&endpoint).unwrap());
    let fp = FingerprintResult::without_toggles(vec![5, 6, 7]);
    let mut md = MetadataRecord::default();
    md.composer = Some("Bach".to_string());
    md.year = 1722;

    let reply = client
        .exchange(&WireMessage::submit(&fp, &md).unwrap())
        .unwrap();
    assert_eq!(reply, Some(Reply::Registered { uid: 1234 }));

    let seen = server.join().unwrap();
    assert_eq!(seen[0].len(), 4);
    assert_eq!(seen[0][0], vec![0x02]);
    let decoded = MetadataRecord::from_wire_bytes(&seen[0][3]).unwrap();
    assert_eq!(decoded.composer.as_deref(), Some("Bach"));
    assert_eq!(decoded.year, 1722);
}

#[test]
fn client_recovers_after_query_timeout() {
    let endpoint = next_endpoint();
    let server = spawn_server(&endpoint, 2, |i, _| {
        if i == 0 {
            (vec![b"late".to_vec()], Duration::from_millis(1200))
        } else {
            (vec![b"fresh".to_vec()], Duration::ZERO)
        }
    });

    let mut client = IndexClient::new(ZmqTransport::connect(&endpoint).unwrap());
    let fp = FingerprintResult::without_toggles(vec![1]);
    let query = WireMessage::query(&fp).unwrap();

    assert_eq!(client.exchange(&query).unwrap(), None);
    assert_eq!(client.state(), ClientState::Idle);

    // The late reply to the first request must not be mistaken for this one
    let reply = client.exchange(&query).unwrap();
    assert_eq!(
        reply,
        Some(Reply::Matched {
            text: "fresh".to_string()
        })
    );
    assert_eq!(client.stats().timeouts, 1);

    server.join().unwrap();
}
