//! Networking stack for the Orrery client–server game.
//!
//! Three layers, each a `Link` with a matching `Listener`:
//!
//! - [`RawLink`] — a cancellable, blocking, ordered byte pipe over TCP.
//! - [`SecureLink`] — the raw pipe after a password handshake, carrying an
//!   authenticated encrypted byte stream in each direction.
//! - [`TypedLink`] — tagged primitive values over the secure stream.
//!
//! All I/O is blocking; a link belongs to one thread at a time, and peers
//! or multiple accepted links run on their own threads. Every blocking
//! operation observes a shared [`CancelToken`] with bounded latency, so a
//! whole mesh of links can be torn down from anywhere.
//!
//! The service port is fixed: game clients dial [`PORT`] and servers
//! listen on it.

pub mod cancel;
pub mod error;
pub mod raw;
pub mod secure;
pub mod testing;
pub mod traits;
pub mod typed;

pub use cancel::CancelToken;
pub use error::LinkError;
pub use raw::{RawLink, RawListener, PORT};
pub use secure::{SecureLink, SecureListener};
pub use traits::ByteLink;
pub use typed::{TypedLink, TypedListener};
