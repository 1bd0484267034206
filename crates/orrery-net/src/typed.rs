//! Typed value framing over an encrypted link.
//!
//! A [`TypedLink`] sends and receives tagged primitives: one type-tag byte,
//! then a fixed-width little-endian payload (strings carry a 16-bit length
//! before their bytes). Receiving a value of the wrong type fails with a
//! tag mismatch; the tag byte is consumed and the session should be
//! considered corrupt — there is no resynchronisation.
//!
//! Sends are buffered by the encrypted layer underneath;
//! [`flush`](TypedLink::flush) at message boundaries.

use orrery_wire as wire;
use orrery_wire::{Tag, WireError};

use crate::cancel::CancelToken;
use crate::error::LinkError;
use crate::raw::RawLink;
use crate::secure::{SecureLink, SecureListener};
use crate::traits::ByteLink;

/// Sends and receives tagged primitive values over a [`SecureLink`].
pub struct TypedLink<L: ByteLink = RawLink> {
    link: SecureLink<L>,
}

impl TypedLink {
    /// Connect to `hostname` and establish an encrypted, typed session.
    pub fn dial(hostname: &str, password: &[u8], cancel: &CancelToken) -> Result<Self, LinkError> {
        Ok(Self::new(SecureLink::dial(hostname, password, cancel)?))
    }
}

impl<L: ByteLink> TypedLink<L> {
    /// Wrap an established encrypted link.
    pub fn new(link: SecureLink<L>) -> Self {
        Self { link }
    }

    pub fn send_u8(&mut self, v: u8) -> Result<(), LinkError> {
        self.link.write(&wire::encode_u8(v))
    }

    pub fn send_u16(&mut self, v: u16) -> Result<(), LinkError> {
        self.link.write(&wire::encode_u16(v))
    }

    pub fn send_u32(&mut self, v: u32) -> Result<(), LinkError> {
        self.link.write(&wire::encode_u32(v))
    }

    pub fn send_u64(&mut self, v: u64) -> Result<(), LinkError> {
        self.link.write(&wire::encode_u64(v))
    }

    pub fn send_i8(&mut self, v: i8) -> Result<(), LinkError> {
        self.link.write(&wire::encode_i8(v))
    }

    pub fn send_i16(&mut self, v: i16) -> Result<(), LinkError> {
        self.link.write(&wire::encode_i16(v))
    }

    pub fn send_i32(&mut self, v: i32) -> Result<(), LinkError> {
        self.link.write(&wire::encode_i32(v))
    }

    pub fn send_i64(&mut self, v: i64) -> Result<(), LinkError> {
        self.link.write(&wire::encode_i64(v))
    }

    /// Send a one-byte character. Non-ASCII characters do not fit and fail
    /// with [`WireError::NonAsciiChar`].
    pub fn send_char(&mut self, c: char) -> Result<(), LinkError> {
        self.link.write(&wire::encode_char(c)?)
    }

    pub fn send_bool(&mut self, v: bool) -> Result<(), LinkError> {
        self.link.write(&wire::encode_bool(v))
    }

    /// Send a length-prefixed string of at most 65535 bytes.
    pub fn send_str(&mut self, s: &str) -> Result<(), LinkError> {
        self.link.write(&wire::encode_str_header(s.len())?)?;
        self.link.write(s.as_bytes())
    }

    /// Transmit everything queued so far.
    pub fn flush(&mut self) -> Result<(), LinkError> {
        self.link.flush()
    }

    /// Read one tag byte and require it to announce `expected`.
    ///
    /// On mismatch the tag is consumed; the stream is out of step with the
    /// caller and the session should be dropped.
    fn expect_tag(&mut self, expected: Tag) -> Result<(), LinkError> {
        let mut tag = [0u8; 1];
        self.link.read(&mut tag)?;
        if tag[0] != expected.byte() {
            return Err(WireError::TagMismatch {
                expected,
                actual: tag[0],
            }
            .into());
        }
        Ok(())
    }

    pub fn recv_u8(&mut self) -> Result<u8, LinkError> {
        self.expect_tag(Tag::U8)?;
        let mut payload = [0u8; 1];
        self.link.read(&mut payload)?;
        Ok(payload[0])
    }

    pub fn recv_u16(&mut self) -> Result<u16, LinkError> {
        self.expect_tag(Tag::U16)?;
        let mut payload = [0u8; 2];
        self.link.read(&mut payload)?;
        Ok(wire::decode_u16(payload))
    }

    pub fn recv_u32(&mut self) -> Result<u32, LinkError> {
        self.expect_tag(Tag::U32)?;
        let mut payload = [0u8; 4];
        self.link.read(&mut payload)?;
        Ok(wire::decode_u32(payload))
    }

    pub fn recv_u64(&mut self) -> Result<u64, LinkError> {
        self.expect_tag(Tag::U64)?;
        let mut payload = [0u8; 8];
        self.link.read(&mut payload)?;
        Ok(wire::decode_u64(payload))
    }

    pub fn recv_i8(&mut self) -> Result<i8, LinkError> {
        self.expect_tag(Tag::I8)?;
        let mut payload = [0u8; 1];
        self.link.read(&mut payload)?;
        Ok(wire::decode_i8(payload[0]))
    }

    pub fn recv_i16(&mut self) -> Result<i16, LinkError> {
        self.expect_tag(Tag::I16)?;
        let mut payload = [0u8; 2];
        self.link.read(&mut payload)?;
        Ok(wire::decode_i16(payload))
    }

    pub fn recv_i32(&mut self) -> Result<i32, LinkError> {
        self.expect_tag(Tag::I32)?;
        let mut payload = [0u8; 4];
        self.link.read(&mut payload)?;
        Ok(wire::decode_i32(payload))
    }

    pub fn recv_i64(&mut self) -> Result<i64, LinkError> {
        self.expect_tag(Tag::I64)?;
        let mut payload = [0u8; 8];
        self.link.read(&mut payload)?;
        Ok(wire::decode_i64(payload))
    }

    pub fn recv_char(&mut self) -> Result<char, LinkError> {
        self.expect_tag(Tag::Char)?;
        let mut payload = [0u8; 1];
        self.link.read(&mut payload)?;
        Ok(wire::decode_char(payload[0]))
    }

    pub fn recv_bool(&mut self) -> Result<bool, LinkError> {
        self.expect_tag(Tag::Bool)?;
        let mut payload = [0u8; 1];
        self.link.read(&mut payload)?;
        Ok(wire::decode_bool(payload[0])?)
    }

    pub fn recv_str(&mut self) -> Result<String, LinkError> {
        self.expect_tag(Tag::Str)?;
        let mut len = [0u8; 2];
        self.link.read(&mut len)?;
        let mut bytes = vec![0u8; u16::from_le_bytes(len) as usize];
        self.link.read(&mut bytes)?;
        String::from_utf8(bytes).map_err(|_| WireError::InvalidUtf8.into())
    }
}

/// Accepts connections and wraps each in a [`TypedLink`].
pub struct TypedListener {
    secure: SecureListener,
}

impl TypedListener {
    /// Bind the service port with the password used for every accepted link.
    pub fn bind(password: &[u8], cancel: &CancelToken) -> Result<Self, LinkError> {
        Ok(Self {
            secure: SecureListener::bind(password, cancel)?,
        })
    }

    /// Accept one connection, handshake, and wrap it.
    pub fn accept(&self) -> Result<TypedLink, LinkError> {
        Ok(TypedLink::new(self.secure.accept()?))
    }
}
