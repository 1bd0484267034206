//! Authenticated secret-stream encryption.
//!
//! A secret-stream seals an ordered sequence of messages under one session
//! key. The sending side creates a [`PushStream`], which produces a public
//! 24-byte header; the receiving side feeds that header into
//! [`PullStream::init`]. Each sealed message carries a 16-byte
//! Poly1305 tag ([`ABYTES`] of overhead), and both sides ratchet their
//! nonce state after every message.
//!
//! # Nonce layout and ratchet
//!
//! The 24-byte XChaCha20-Poly1305 nonce starts out as the stream header
//! (random per stream, so state is never reused across connections):
//!
//! ```text
//! [ counter: 8 bytes LE ][ feedback: 8 bytes ][ fixed: 8 bytes ]
//! ```
//!
//! After each successful seal or open, the counter increments and the
//! feedback bytes absorb the first 8 bytes of the message tag. Every
//! nonce therefore depends on the entire ciphertext sequence so far:
//! a reordered, spliced, or dropped message leaves the receiver with a
//! nonce the sender never used, and the next [`PullStream::pull`] fails
//! with [`CryptoError::InvalidMessage`]. A failed `pull` does not advance
//! the state.

use chacha20poly1305::aead::{AeadInPlace, KeyInit};
use chacha20poly1305::{Tag, XChaCha20Poly1305, XNonce};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroize;

use crate::error::CryptoError;
use crate::kdf::Key;

/// Stream key length in bytes.
pub const KEYBYTES: usize = 32;
/// Public per-stream header length in bytes.
pub const HEADERBYTES: usize = 24;
/// Per-message overhead in bytes (the authentication tag).
pub const ABYTES: usize = 16;

const TAG_FEEDBACK: usize = 8;

struct StreamState {
    cipher: XChaCha20Poly1305,
    nonce: [u8; HEADERBYTES],
}

impl StreamState {
    fn new(key: &Key, nonce: [u8; HEADERBYTES]) -> Self {
        Self {
            cipher: XChaCha20Poly1305::new(key.as_bytes().into()),
            nonce,
        }
    }

    /// Advance the nonce: bump the counter, fold in the message tag.
    fn ratchet(&mut self, tag: &[u8]) {
        let mut counter = [0u8; 8];
        counter.copy_from_slice(&self.nonce[..8]);
        let next = u64::from_le_bytes(counter).wrapping_add(1);
        self.nonce[..8].copy_from_slice(&next.to_le_bytes());

        for (n, t) in self.nonce[8..8 + TAG_FEEDBACK].iter_mut().zip(tag) {
            *n ^= t;
        }
    }
}

impl Drop for StreamState {
    fn drop(&mut self) {
        // The cipher wipes its own key; the evolved nonce goes with it.
        self.nonce.zeroize();
    }
}

/// The sending half of a secret-stream.
pub struct PushStream {
    state: StreamState,
}

impl PushStream {
    /// Create a stream for sending, returning the public header the
    /// receiving side needs to open it.
    pub fn init(key: &Key) -> (Self, [u8; HEADERBYTES]) {
        let mut header = [0u8; HEADERBYTES];
        OsRng.fill_bytes(&mut header);
        (
            Self {
                state: StreamState::new(key, header),
            },
            header,
        )
    }

    /// Seal one message, returning `plaintext.len() + ABYTES` bytes.
    pub fn push(&mut self, plaintext: &[u8]) -> Vec<u8> {
        let mut sealed = Vec::with_capacity(plaintext.len() + ABYTES);
        sealed.extend_from_slice(plaintext);
        let tag = self
            .state
            .cipher
            .encrypt_in_place_detached(XNonce::from_slice(&self.state.nonce), &[], &mut sealed)
            .expect("message fits within the AEAD length bound");
        sealed.extend_from_slice(&tag);
        self.state.ratchet(&tag);
        sealed
    }
}

/// The receiving half of a secret-stream.
pub struct PullStream {
    state: StreamState,
}

impl PullStream {
    /// Create a stream for receiving from a peer's public header.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidHeader`] if `header` is not exactly
    /// [`HEADERBYTES`] long.
    pub fn init(header: &[u8], key: &Key) -> Result<Self, CryptoError> {
        let header: [u8; HEADERBYTES] =
            header.try_into().map_err(|_| CryptoError::InvalidHeader)?;
        Ok(Self {
            state: StreamState::new(key, header),
        })
    }

    /// Verify and open one sealed message.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidMessage`] if the message fails
    /// authentication, is shorter than [`ABYTES`], or does not match the
    /// stream position. The state is unchanged on failure.
    pub fn pull(&mut self, sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if sealed.len() < ABYTES {
            return Err(CryptoError::InvalidMessage);
        }
        let (body, tag) = sealed.split_at(sealed.len() - ABYTES);

        let mut plaintext = body.to_vec();
        self.state
            .cipher
            .decrypt_in_place_detached(
                XNonce::from_slice(&self.state.nonce),
                &[],
                &mut plaintext,
                Tag::from_slice(tag),
            )
            .map_err(|_| CryptoError::InvalidMessage)?;
        self.state.ratchet(tag);
        Ok(plaintext)
    }
}
