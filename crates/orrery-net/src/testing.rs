//! In-memory transport for exercising links without sockets.

use std::collections::VecDeque;
use std::sync::mpsc;

use crate::error::LinkError;
use crate::traits::ByteLink;

/// One end of an in-memory byte pipe.
///
/// Reads block until the other end writes; dropping either end makes the
/// peer's reads and writes fail with
/// [`LinkError::Hangup`](crate::LinkError::Hangup), mirroring a closed
/// socket.
pub struct MemoryLink {
    pub(crate) tx: mpsc::Sender<Vec<u8>>,
    pub(crate) rx: mpsc::Receiver<Vec<u8>>,
    pub(crate) pending: VecDeque<u8>,
}

/// Create a connected pair of in-memory links.
pub fn memory_pair() -> (MemoryLink, MemoryLink) {
    let (a_tx, b_rx) = mpsc::channel();
    let (b_tx, a_rx) = mpsc::channel();
    (
        MemoryLink {
            tx: a_tx,
            rx: a_rx,
            pending: VecDeque::new(),
        },
        MemoryLink {
            tx: b_tx,
            rx: b_rx,
            pending: VecDeque::new(),
        },
    )
}

impl ByteLink for MemoryLink {
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), LinkError> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.pending.pop_front() {
                Some(byte) => {
                    buf[filled] = byte;
                    filled += 1;
                }
                None => {
                    let chunk = self.rx.recv().map_err(|_| LinkError::Hangup)?;
                    self.pending.extend(chunk);
                }
            }
        }
        Ok(())
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<(), LinkError> {
        self.tx.send(buf.to_vec()).map_err(|_| LinkError::Hangup)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_pair_carries_bytes_both_ways() {
        let (mut a, mut b) = memory_pair();
        a.write_all(b"ping").unwrap();
        b.write_all(b"pong").unwrap();

        let mut buf = [0u8; 4];
        b.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");
        a.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"pong");
    }

    #[test]
    fn test_reads_respect_write_boundaries_being_invisible() {
        let (mut a, mut b) = memory_pair();
        a.write_all(b"he").unwrap();
        a.write_all(b"llo wo").unwrap();
        a.write_all(b"rld").unwrap();

        let mut buf = [0u8; 11];
        b.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hello world");
    }

    #[test]
    fn test_dropped_peer_reads_as_hangup() {
        let (a, mut b) = memory_pair();
        drop(a);
        let mut buf = [0u8; 1];
        assert!(matches!(b.read_exact(&mut buf), Err(LinkError::Hangup)));
    }
}
