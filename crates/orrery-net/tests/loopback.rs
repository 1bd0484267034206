//! End-to-end tests over real TCP on the fixed service port.
//!
//! The port is part of the protocol contract, so every test that binds it
//! takes `net_lock()` to serialize against the others.

use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use orrery_crypto::CryptoError;
use orrery_net::{
    CancelToken, LinkError, RawLink, RawListener, SecureLink, SecureListener, TypedLink,
    TypedListener,
};

static NET_LOCK: Mutex<()> = Mutex::new(());

fn net_lock() -> MutexGuard<'static, ()> {
    NET_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

const MESSAGE: [u8; 16] = [0, 1, 2, 3, 4, 5, 6, 7, 0, 1, 2, 3, 4, 5, 6, 7];

#[test]
fn test_can_bind_listener() {
    let _guard = net_lock();
    let cancel = CancelToken::new();
    RawListener::bind(&cancel).unwrap();
}

#[test]
fn test_raw_client_sends_to_server() {
    let _guard = net_lock();
    let cancel = CancelToken::new();
    let listener = RawListener::bind(&cancel).unwrap();

    let client_cancel = cancel.clone();
    let sender = thread::spawn(move || {
        let mut link = RawLink::dial("127.0.0.1", &client_cancel).unwrap();
        link.write_all(&MESSAGE).unwrap();
    });

    let mut connection = listener.accept().unwrap();
    let mut received = [0u8; 16];
    connection.read_exact(&mut received).unwrap();
    assert_eq!(received, MESSAGE);
    sender.join().unwrap();
}

#[test]
fn test_raw_server_sends_to_client() {
    let _guard = net_lock();
    let cancel = CancelToken::new();
    let listener = RawListener::bind(&cancel).unwrap();

    let client_cancel = cancel.clone();
    let receiver = thread::spawn(move || {
        let mut link = RawLink::dial("127.0.0.1", &client_cancel).unwrap();
        let mut received = [0u8; 16];
        link.read_exact(&mut received).unwrap();
        received
    });

    let mut connection = listener.accept().unwrap();
    connection.write_all(&MESSAGE).unwrap();
    assert_eq!(receiver.join().unwrap(), MESSAGE);
}

#[test]
fn test_secure_client_sends_to_server() {
    let _guard = net_lock();
    let cancel = CancelToken::new();
    let listener = SecureListener::bind(b"password", &cancel).unwrap();

    let client_cancel = cancel.clone();
    let sender = thread::spawn(move || {
        let mut link = SecureLink::dial("127.0.0.1", b"password", &client_cancel).unwrap();
        link.write(&MESSAGE).unwrap();
        link.flush().unwrap();
        link
    });

    let mut connection = listener.accept().unwrap();
    let mut received = [0u8; 16];
    connection.read(&mut received).unwrap();
    assert_eq!(received, MESSAGE);
    sender.join().unwrap();
}

#[test]
fn test_secure_server_sends_to_client() {
    let _guard = net_lock();
    let cancel = CancelToken::new();
    let listener = SecureListener::bind(b"password", &cancel).unwrap();

    let client_cancel = cancel.clone();
    let receiver = thread::spawn(move || {
        let mut link = SecureLink::dial("127.0.0.1", b"password", &client_cancel).unwrap();
        let mut received = [0u8; 16];
        link.read(&mut received).unwrap();
        received
    });

    let mut connection = listener.accept().unwrap();
    connection.write(&MESSAGE).unwrap();
    connection.flush().unwrap();
    assert_eq!(receiver.join().unwrap(), MESSAGE);
}

#[test]
fn test_wrong_password_fails_both_sides_before_any_data() {
    let _guard = net_lock();
    let cancel = CancelToken::new();
    let listener = SecureListener::bind(b"password", &cancel).unwrap();

    let client_cancel = cancel.clone();
    let client = thread::spawn(move || {
        SecureLink::dial("127.0.0.1", b"bad", &client_cancel).map(|_| ())
    });

    let server_result = listener.accept().map(|_| ());
    let client_result = client.join().unwrap();

    for result in [server_result, client_result] {
        assert!(matches!(
            result,
            Err(LinkError::Crypto(CryptoError::InvalidMessage))
                | Err(LinkError::PasswordMismatch)
        ));
    }
}

#[test]
fn test_typed_roundtrip_over_tcp() {
    let _guard = net_lock();
    let cancel = CancelToken::new();
    let listener = TypedListener::bind(b"password", &cancel).unwrap();

    let client_cancel = cancel.clone();
    let client = thread::spawn(move || {
        let mut link = TypedLink::dial("127.0.0.1", b"password", &client_cancel).unwrap();
        link.send_u8(0xDB).unwrap();
        link.send_i64(-(1i64 << 40)).unwrap();
        link.send_str("ready").unwrap();
        link.flush().unwrap();

        assert!(link.recv_bool().unwrap());
        link
    });

    let mut connection = listener.accept().unwrap();
    assert_eq!(connection.recv_u8().unwrap(), 0xDB);
    assert_eq!(connection.recv_i64().unwrap(), -(1i64 << 40));
    assert_eq!(connection.recv_str().unwrap(), "ready");

    connection.send_bool(true).unwrap();
    connection.flush().unwrap();
    client.join().unwrap();
}

#[test]
fn test_large_payload_over_tcp() {
    let _guard = net_lock();
    let cancel = CancelToken::new();
    let listener = SecureListener::bind(b"password", &cancel).unwrap();

    let payload: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
    let sent = payload.clone();
    let client_cancel = cancel.clone();
    let sender = thread::spawn(move || {
        let mut link = SecureLink::dial("127.0.0.1", b"password", &client_cancel).unwrap();
        link.write(&sent).unwrap();
        link.flush().unwrap();
        link
    });

    let mut connection = listener.accept().unwrap();
    let mut received = vec![0u8; payload.len()];
    connection.read(&mut received).unwrap();
    assert_eq!(received, payload);
    sender.join().unwrap();
}

#[test]
fn test_cancelled_read_returns_promptly() {
    let _guard = net_lock();
    let cancel = CancelToken::new();
    let listener = RawListener::bind(&cancel).unwrap();

    let client_cancel = cancel.clone();
    let reader = thread::spawn(move || {
        let mut link = RawLink::dial("127.0.0.1", &client_cancel).unwrap();
        let mut buf = [0u8; 1];
        link.read_exact(&mut buf)
    });

    // Keep the server end alive so the reader blocks rather than hanging up.
    let _connection = listener.accept().unwrap();
    thread::sleep(Duration::from_millis(30));

    let stopped_at = Instant::now();
    cancel.stop();
    let result = reader.join().unwrap();
    assert!(matches!(result, Err(LinkError::Cancelled)));
    assert!(
        stopped_at.elapsed() < Duration::from_millis(50),
        "cancellation took {:?}",
        stopped_at.elapsed()
    );
}

#[test]
fn test_cancelled_accept_returns_promptly() {
    let _guard = net_lock();
    let cancel = CancelToken::new();
    let listener = RawListener::bind(&cancel).unwrap();

    let acceptor = thread::spawn(move || listener.accept().map(|_| ()));
    thread::sleep(Duration::from_millis(30));

    let stopped_at = Instant::now();
    cancel.stop();
    let result = acceptor.join().unwrap();
    assert!(matches!(result, Err(LinkError::Cancelled)));
    assert!(
        stopped_at.elapsed() < Duration::from_millis(50),
        "cancellation took {:?}",
        stopped_at.elapsed()
    );
}

#[test]
fn test_peer_disappearing_reads_as_hangup() {
    let _guard = net_lock();
    let cancel = CancelToken::new();
    let listener = RawListener::bind(&cancel).unwrap();

    let client_cancel = cancel.clone();
    let client = thread::spawn(move || {
        // Connect and immediately drop the link.
        drop(RawLink::dial("127.0.0.1", &client_cancel).unwrap());
    });

    let mut connection = listener.accept().unwrap();
    client.join().unwrap();

    let mut buf = [0u8; 1];
    assert!(matches!(
        connection.read_exact(&mut buf),
        Err(LinkError::Hangup)
    ));
}
