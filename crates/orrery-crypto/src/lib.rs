//! Cryptographic primitives for the Orrery transport.
//!
//! This crate provides the two operations the encrypted link layer is built
//! from: deriving per-direction session keys from a shared password
//! ([`kdf`]), and sealing an ordered stream of messages under such a key
//! ([`secretstream`]). Both directions of a connection use independent
//! streams; nothing here is shared between connections.

pub mod error;
pub mod kdf;
pub mod secretstream;
pub mod verify;

pub use error::CryptoError;
pub use kdf::{derive_key, generate_salt, Key, KEYBYTES, SALTBYTES};
pub use secretstream::{PullStream, PushStream, ABYTES, HEADERBYTES};
pub use verify::ct_eq;
