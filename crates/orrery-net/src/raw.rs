//! Cancellable blocking TCP links.
//!
//! A [`RawLink`] owns one connected stream socket; a [`RawListener`] owns a
//! passive one and yields new links on [`accept`](RawListener::accept).
//! Every blocking operation runs a 10 ms `poll(2)` loop that re-checks the
//! shared [`CancelToken`] between ticks, so the latency between stopping a
//! token and a blocked call returning [`LinkError::Cancelled`] is bounded
//! by one tick.
//!
//! Links and listeners are move-only: a socket has exactly one owner and
//! is closed exactly once, on drop.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs};
use std::os::fd::RawFd;

use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags};
use nix::sys::socket::{
    accept4, bind, connect, getsockopt, listen, setsockopt, socket, sockopt, AddressFamily,
    SockFlag, SockType, SockaddrIn, SockaddrIn6,
};
use nix::unistd::{close, read, write};
use tracing::{debug, trace};

use crate::cancel::CancelToken;
use crate::error::LinkError;
use crate::traits::ByteLink;

/// The fixed service port.
pub const PORT: u16 = 0x4E50;

/// Pending-connection queue length for listeners.
const BACKLOG: usize = 4;

/// Poll timeout; bounds cancellation latency.
const POLL_TICK_MS: i32 = 10;

fn errno_io(err: Errno) -> LinkError {
    LinkError::Io(std::io::Error::from_raw_os_error(err as i32))
}

fn stream_socket(addr: &SocketAddr) -> nix::Result<RawFd> {
    let family = match addr {
        SocketAddr::V4(_) => AddressFamily::Inet,
        SocketAddr::V6(_) => AddressFamily::Inet6,
    };
    socket(family, SockType::Stream, SockFlag::SOCK_CLOEXEC, None)
}

fn connect_to(fd: RawFd, addr: &SocketAddr) -> nix::Result<()> {
    match addr {
        SocketAddr::V4(v4) => connect(fd, &SockaddrIn::from(*v4)),
        SocketAddr::V6(v6) => connect(fd, &SockaddrIn6::from(*v6)),
    }
}

fn bind_to(fd: RawFd, addr: &SocketAddr) -> nix::Result<()> {
    match addr {
        SocketAddr::V4(v4) => bind(fd, &SockaddrIn::from(*v4)),
        SocketAddr::V6(v6) => bind(fd, &SockaddrIn6::from(*v6)),
    }
}

/// Poll a single descriptor for `events` with the standard tick,
/// returning the revents (empty on timeout).
fn poll_tick(fd: RawFd, events: PollFlags) -> Result<PollFlags, LinkError> {
    let mut fds = [PollFd::new(fd, events)];
    match poll(&mut fds, POLL_TICK_MS) {
        Ok(0) => Ok(PollFlags::empty()),
        Ok(_) => Ok(fds[0].revents().unwrap_or_else(PollFlags::empty)),
        Err(Errno::EINTR) => Ok(PollFlags::empty()),
        Err(err) => Err(errno_io(err)),
    }
}

/// Read `SO_ERROR` after `POLLERR` and surface it.
fn socket_error(fd: RawFd) -> LinkError {
    match getsockopt(fd, sockopt::SocketError) {
        Ok(code) => LinkError::Io(std::io::Error::from_raw_os_error(code)),
        Err(err) => errno_io(err),
    }
}

/// An open, connected byte pipe over TCP.
#[derive(Debug)]
pub struct RawLink {
    fd: RawFd,
    cancel: CancelToken,
}

impl RawLink {
    /// Connect to `hostname` on the service port.
    ///
    /// Resolution is address-family agnostic; candidates are tried in
    /// resolver order and the first that accepts a connection wins.
    ///
    /// # Errors
    ///
    /// [`LinkError::ConnectFailed`] if the name does not resolve or no
    /// candidate accepts.
    pub fn dial(hostname: &str, cancel: &CancelToken) -> Result<Self, LinkError> {
        let addrs = match (hostname, PORT).to_socket_addrs() {
            Ok(addrs) => addrs,
            Err(err) => {
                debug!(hostname, %err, "host lookup failed");
                return Err(LinkError::ConnectFailed {
                    host: hostname.to_string(),
                });
            }
        };

        for addr in addrs {
            let fd = match stream_socket(&addr) {
                Ok(fd) => fd,
                Err(_) => continue,
            };
            match connect_to(fd, &addr) {
                Ok(()) => {
                    debug!(%addr, "connected");
                    return Ok(Self {
                        fd,
                        cancel: cancel.clone(),
                    });
                }
                Err(err) => {
                    trace!(%addr, %err, "connect attempt failed");
                    let _ = close(fd);
                }
            }
        }

        Err(LinkError::ConnectFailed {
            host: hostname.to_string(),
        })
    }

    fn from_fd(fd: RawFd, cancel: CancelToken) -> Self {
        Self { fd, cancel }
    }

    /// Fill `buf` completely, blocking as needed.
    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), LinkError> {
        let mut filled = 0;
        while filled < buf.len() {
            if self.cancel.is_stopped() {
                return Err(LinkError::Cancelled);
            }

            let revents = poll_tick(self.fd, PollFlags::POLLIN)?;
            if revents.contains(PollFlags::POLLERR) {
                return Err(socket_error(self.fd));
            }
            if revents.contains(PollFlags::POLLNVAL) {
                return Err(LinkError::InvalidFd { fd: self.fd });
            }
            if revents.contains(PollFlags::POLLIN) {
                match read(self.fd, &mut buf[filled..]) {
                    Ok(0) => return Err(LinkError::Hangup),
                    Ok(n) => filled += n,
                    Err(Errno::EAGAIN | Errno::EINTR) => continue,
                    Err(Errno::EPIPE) => return Err(LinkError::Hangup),
                    Err(err) => return Err(errno_io(err)),
                }
            } else if revents.contains(PollFlags::POLLHUP) {
                // Peer gone and nothing left to drain.
                return Err(LinkError::Hangup);
            }
        }
        Ok(())
    }

    /// Write all of `buf`, blocking as needed.
    pub fn write_all(&mut self, buf: &[u8]) -> Result<(), LinkError> {
        let mut written = 0;
        while written < buf.len() {
            if self.cancel.is_stopped() {
                return Err(LinkError::Cancelled);
            }

            let revents = poll_tick(self.fd, PollFlags::POLLOUT)?;
            if revents.contains(PollFlags::POLLERR) {
                return Err(socket_error(self.fd));
            }
            if revents.contains(PollFlags::POLLNVAL) {
                return Err(LinkError::InvalidFd { fd: self.fd });
            }
            if revents.contains(PollFlags::POLLHUP) {
                return Err(LinkError::Hangup);
            }
            if revents.contains(PollFlags::POLLOUT) {
                match write(self.fd, &buf[written..]) {
                    Ok(n) => written += n,
                    Err(Errno::EAGAIN | Errno::EINTR) => continue,
                    Err(Errno::EPIPE) => return Err(LinkError::Hangup),
                    Err(err) => return Err(errno_io(err)),
                }
            }
        }
        Ok(())
    }
}

impl ByteLink for RawLink {
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), LinkError> {
        RawLink::read_exact(self, buf)
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<(), LinkError> {
        RawLink::write_all(self, buf)
    }
}

impl Drop for RawLink {
    fn drop(&mut self) {
        let _ = close(self.fd);
    }
}

/// A passive socket listening on the service port.
pub struct RawListener {
    fd: RawFd,
    cancel: CancelToken,
}

impl RawListener {
    /// Bind and listen on the service port.
    ///
    /// Tries the IPv6 wildcard first (dual-stack where the OS allows it),
    /// then IPv4. `SO_REUSEADDR` is set so a restarted server does not
    /// trip over lingering sockets.
    ///
    /// # Errors
    ///
    /// [`LinkError::BindFailed`] if no wildcard address binds.
    pub fn bind(cancel: &CancelToken) -> Result<Self, LinkError> {
        let candidates = [
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, PORT)),
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, PORT)),
        ];

        for addr in candidates {
            let fd = match stream_socket(&addr) {
                Ok(fd) => fd,
                Err(_) => continue,
            };
            let _ = setsockopt(fd, sockopt::ReuseAddr, &true);
            match bind_to(fd, &addr) {
                Ok(()) => {
                    if let Err(err) = listen(fd, BACKLOG) {
                        let _ = close(fd);
                        return Err(errno_io(err));
                    }
                    debug!(%addr, "listening");
                    return Ok(Self {
                        fd,
                        cancel: cancel.clone(),
                    });
                }
                Err(err) => {
                    trace!(%addr, %err, "bind attempt failed");
                    let _ = close(fd);
                }
            }
        }

        Err(LinkError::BindFailed)
    }

    /// Wait for and accept one connection.
    pub fn accept(&self) -> Result<RawLink, LinkError> {
        loop {
            if self.cancel.is_stopped() {
                return Err(LinkError::Cancelled);
            }

            let revents = poll_tick(self.fd, PollFlags::POLLIN)?;
            if revents.contains(PollFlags::POLLERR) {
                return Err(socket_error(self.fd));
            }
            if revents.contains(PollFlags::POLLNVAL) {
                return Err(LinkError::InvalidFd { fd: self.fd });
            }
            if revents.contains(PollFlags::POLLIN) {
                match accept4(self.fd, SockFlag::SOCK_CLOEXEC) {
                    Ok(fd) => {
                        debug!("accepted connection");
                        return Ok(RawLink::from_fd(fd, self.cancel.clone()));
                    }
                    // The connection died between arrival and accept, or a
                    // transient network condition; keep listening.
                    Err(Errno::EAGAIN
                    | Errno::EINTR
                    | Errno::ECONNABORTED
                    | Errno::ENETDOWN
                    | Errno::EPROTO
                    | Errno::ENOPROTOOPT
                    | Errno::EHOSTDOWN
                    | Errno::ENONET
                    | Errno::EHOSTUNREACH
                    | Errno::EOPNOTSUPP
                    | Errno::ENETUNREACH) => continue,
                    Err(err) => return Err(errno_io(err)),
                }
            } else if revents.contains(PollFlags::POLLHUP) {
                return Err(LinkError::Io(std::io::Error::other(
                    "hangup on passive socket",
                )));
            }
        }
    }
}

impl Drop for RawListener {
    fn drop(&mut self) {
        let _ = close(self.fd);
    }
}
