//! Password-authenticated encrypted links.
//!
//! A [`SecureLink`] wraps a byte pipe in two independent secret-streams,
//! one per direction, keyed from a shared password. Establishment runs the
//! same sequence on both peers:
//!
//! 1. send a fresh salt, derive the outbound key, send the outbound
//!    stream header;
//! 2. read the peer's salt, derive the inbound key, read the peer's
//!    header;
//! 3. exchange sealed 32-byte challenge nonces and echo the peer's nonce
//!    back;
//! 4. check, in constant time, that the echoed nonce is the one sent.
//!
//! Each side picks its own salt and header, so nothing distinguishes the
//! dialing peer from the accepting one cryptographically, and no key or
//! stream state ever carries over between connections. A peer holding the
//! wrong password fails to open the challenge or echo (`InvalidMessage`);
//! a peer whose inbound stream verified but whose echo came back wrong
//! sees `PasswordMismatch`. The handshake completes before any
//! application byte is exchanged.
//!
//! After establishment, application bytes travel as framed chunks: a
//! sealed 2-byte little-endian length, then the sealed body it announces.
//! Sealing the length separately lets the receiver allocate the exact
//! body size without ever trusting an unauthenticated prefix.
//!
//! Writes are buffered: [`write`](SecureLink::write) queues plaintext and
//! only transmits once the buffer reaches 4096 bytes, or on an explicit
//! [`flush`](SecureLink::flush). Callers expecting request/response
//! semantics must flush at message boundaries.

use std::collections::VecDeque;

use rand::rngs::OsRng;
use rand::RngCore;
use tracing::{debug, trace};

use orrery_crypto::{ct_eq, derive_key, generate_salt, PullStream, PushStream};
use orrery_crypto::{ABYTES, HEADERBYTES, SALTBYTES};

use crate::cancel::CancelToken;
use crate::error::LinkError;
use crate::raw::{RawLink, RawListener};
use crate::traits::ByteLink;

/// Challenge nonce length for the handshake.
const VERIFY_LEN: usize = 32;

/// Buffered plaintext size that forces an implicit flush.
const FLUSH_THRESHOLD: usize = 4096;

/// Largest body a chunk's 16-bit length header can announce.
const MAX_CHUNK: usize = u16::MAX as usize;

/// An encrypted, authenticated byte stream over a lower-level link.
pub struct SecureLink<L: ByteLink = RawLink> {
    link: L,
    tx: PushStream,
    rx: PullStream,
    /// Verified plaintext chunks not yet handed to the caller, oldest first.
    recv_buffer: VecDeque<Vec<u8>>,
    /// Plaintext queued by `write` and never yet transmitted.
    send_buffer: Vec<u8>,
    closed: bool,
}

impl SecureLink {
    /// Connect to `hostname` and establish an encrypted session.
    pub fn dial(hostname: &str, password: &[u8], cancel: &CancelToken) -> Result<Self, LinkError> {
        let raw = RawLink::dial(hostname, cancel)?;
        Self::establish(raw, password)
    }
}

impl<L: ByteLink> SecureLink<L> {
    /// Run the password handshake over an already-connected byte pipe.
    pub fn establish(mut link: L, password: &[u8]) -> Result<Self, LinkError> {
        trace!("establishing encrypted session");

        // Outbound direction: our salt, our key, our stream header.
        let salt_out = generate_salt();
        link.write_all(&salt_out)?;
        let key_out = derive_key(password, &salt_out)?;
        let (mut tx, header_out) = PushStream::init(&key_out);
        link.write_all(&header_out)?;

        // Inbound direction: the peer's salt and header.
        let mut salt_in = [0u8; SALTBYTES];
        link.read_exact(&mut salt_in)?;
        let key_in = derive_key(password, &salt_in)?;
        let mut header_in = [0u8; HEADERBYTES];
        link.read_exact(&mut header_in)?;
        let mut rx = PullStream::init(&header_in, &key_in)?;

        // Challenge: prove both ends derived the same keys before any
        // application byte moves.
        let mut nonce_out = [0u8; VERIFY_LEN];
        OsRng.fill_bytes(&mut nonce_out);
        link.write_all(&tx.push(&nonce_out))?;

        let mut challenge_in = [0u8; VERIFY_LEN + ABYTES];
        link.read_exact(&mut challenge_in)?;
        let nonce_in = rx.pull(&challenge_in)?;
        link.write_all(&tx.push(&nonce_in))?;

        let mut echo_in = [0u8; VERIFY_LEN + ABYTES];
        link.read_exact(&mut echo_in)?;
        let nonce_echo = rx.pull(&echo_in)?;

        if !ct_eq(&nonce_echo, &nonce_out) {
            return Err(LinkError::PasswordMismatch);
        }

        debug!("encrypted session established");
        Ok(Self {
            link,
            tx,
            rx,
            recv_buffer: VecDeque::new(),
            send_buffer: Vec::new(),
            closed: false,
        })
    }

    /// Fill `buf` from the decrypted stream, blocking as needed.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<(), LinkError> {
        self.guarded(|this| this.read_inner(buf))
    }

    /// Queue plaintext for transmission, flushing if the buffer is full.
    pub fn write(&mut self, data: &[u8]) -> Result<(), LinkError> {
        self.guarded(|this| {
            this.send_buffer.extend_from_slice(data);
            if this.send_buffer.len() >= FLUSH_THRESHOLD {
                this.flush_inner()?;
            }
            Ok(())
        })
    }

    /// Seal and transmit everything queued by `write`.
    pub fn flush(&mut self) -> Result<(), LinkError> {
        self.guarded(Self::flush_inner)
    }

    /// Run `op`, poisoning the link on any failure.
    fn guarded<T>(
        &mut self,
        op: impl FnOnce(&mut Self) -> Result<T, LinkError>,
    ) -> Result<T, LinkError> {
        if self.closed {
            return Err(LinkError::Closed);
        }
        let result = op(self);
        if result.is_err() {
            self.closed = true;
        }
        result
    }

    fn read_inner(&mut self, buf: &mut [u8]) -> Result<(), LinkError> {
        let mut filled = 0;
        while filled < buf.len() {
            let Some(chunk) = self.recv_buffer.front_mut() else {
                self.pull()?;
                continue;
            };

            let take = chunk.len().min(buf.len() - filled);
            buf[filled..filled + take].copy_from_slice(&chunk[..take]);
            filled += take;

            if take == chunk.len() {
                self.recv_buffer.pop_front();
            } else {
                chunk.drain(..take);
            }
        }
        Ok(())
    }

    fn flush_inner(&mut self) -> Result<(), LinkError> {
        while !self.send_buffer.is_empty() {
            let len = self.send_buffer.len().min(MAX_CHUNK);

            let header = (len as u16).to_le_bytes();
            self.link.write_all(&self.tx.push(&header))?;
            self.link.write_all(&self.tx.push(&self.send_buffer[..len]))?;

            self.send_buffer.drain(..len);
            trace!(len, "chunk sent");
        }
        Ok(())
    }

    /// Receive and verify one chunk into `recv_buffer`.
    fn pull(&mut self) -> Result<(), LinkError> {
        let mut sealed_header = [0u8; 2 + ABYTES];
        self.link.read_exact(&mut sealed_header)?;
        let header = self.rx.pull(&sealed_header)?;
        let header: [u8; 2] = header
            .as_slice()
            .try_into()
            .map_err(|_| LinkError::Crypto(orrery_crypto::CryptoError::InvalidMessage))?;
        let len = u16::from_le_bytes(header) as usize;

        let mut sealed_body = vec![0u8; len + ABYTES];
        self.link.read_exact(&mut sealed_body)?;
        let body = self.rx.pull(&sealed_body)?;
        trace!(len, "chunk received");

        // An empty chunk carries no data; buffering it would stall `read`.
        if !body.is_empty() {
            self.recv_buffer.push_back(body);
        }
        Ok(())
    }
}

/// Accepts connections and establishes an encrypted session on each.
pub struct SecureListener {
    raw: RawListener,
    password: Vec<u8>,
}

impl SecureListener {
    /// Bind the service port; `password` is held for the listener's
    /// lifetime and used to establish every accepted link.
    pub fn bind(password: &[u8], cancel: &CancelToken) -> Result<Self, LinkError> {
        Ok(Self {
            raw: RawListener::bind(cancel)?,
            password: password.to_vec(),
        })
    }

    /// Accept one connection and run the handshake over it.
    pub fn accept(&self) -> Result<SecureLink, LinkError> {
        let raw = self.raw.accept()?;
        SecureLink::establish(raw, &self.password)
    }
}

/// Build a connected in-memory pair directly from known keys, skipping the
/// scrypt handshake so stream-level tests stay fast.
#[cfg(test)]
pub(crate) fn secure_pair_over(
    link_a: crate::testing::MemoryLink,
    link_b: crate::testing::MemoryLink,
) -> (
    SecureLink<crate::testing::MemoryLink>,
    SecureLink<crate::testing::MemoryLink>,
) {
    use orrery_crypto::{Key, KEYBYTES};

    let key_ab = Key::from_bytes([0x07u8; KEYBYTES]);
    let key_ba = Key::from_bytes([0x0Bu8; KEYBYTES]);
    let (tx_a, header_a) = PushStream::init(&key_ab);
    let rx_b = PullStream::init(&header_a, &key_ab).unwrap();
    let (tx_b, header_b) = PushStream::init(&key_ba);
    let rx_a = PullStream::init(&header_b, &key_ba).unwrap();

    let a = SecureLink {
        link: link_a,
        tx: tx_a,
        rx: rx_a,
        recv_buffer: VecDeque::new(),
        send_buffer: Vec::new(),
        closed: false,
    };
    let b = SecureLink {
        link: link_b,
        tx: tx_b,
        rx: rx_b,
        recv_buffer: VecDeque::new(),
        send_buffer: Vec::new(),
        closed: false,
    };
    (a, b)
}

#[cfg(test)]
pub(crate) fn secure_pair() -> (
    SecureLink<crate::testing::MemoryLink>,
    SecureLink<crate::testing::MemoryLink>,
) {
    let (link_a, link_b) = crate::testing::memory_pair();
    secure_pair_over(link_a, link_b)
}
