//! The byte-transport seam between the raw and encrypted layers.

use crate::error::LinkError;

/// A reliable, ordered, blocking byte pipe.
///
/// [`RawLink`](crate::RawLink) is the production implementation; the
/// [`testing`](crate::testing) module provides an in-memory one so the
/// layers above can be exercised without sockets.
pub trait ByteLink {
    /// Fill `buf` completely or fail.
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), LinkError>;

    /// Write all of `buf` or fail.
    fn write_all(&mut self, buf: &[u8]) -> Result<(), LinkError>;
}
