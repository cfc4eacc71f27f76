//! TCP, UDP, and Unix-domain sockets.
//!
//! Construction creates a non-blocking, close-on-exec socket, applies the
//! reuse options, and hands `accept`/`recv`/`send`/`close` off to whichever
//! drive model (native backend submit, or a raw syscall + yield loop) the
//! current capabilities support. A `Socket` carries no backend reference at
//! all — `io_await` resolves the current scheduler via thread-local state,
//! so there is nothing to thread through a constructor.

use crate::addr;
use crate::fallback::{classify_wouldblock, yield_until};
use fiberio_core::backend::Capabilities;
use fiberio_core::completion::CompletionResult;
use fiberio_core::error::{RtError, RtResult};
use fiberio_core::job::{AioOp, RawSockAddr};
use fiberio_runtime::{current_capabilities, io_await};

/// The endpoint a [`Socket::init`] call constructs.
pub enum Endpoint<'a> {
    Tcp { host: &'a str, port: u16 },
    Udp { host: &'a str, port: u16 },
    Unix { path: &'a str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Tcp,
    Udp,
    Unix,
}

/// A socket handle: `{tcp|udp|unix, fd, addr}` plus the listening flag
/// `accept` checks.
pub struct Socket {
    kind: Kind,
    fd: i32,
    endpoint_addr: Option<RawSockAddr>,
    listening: bool,
}

impl Socket {
    /// Construct a non-blocking, close-on-exec socket for `endpoint`.
    /// Resolves TCP/UDP hostnames via `getaddrinfo`; does not bind yet.
    pub fn init(endpoint: Endpoint) -> RtResult<Socket> {
        let (kind, domain, sock_type, endpoint_addr) = match endpoint {
            Endpoint::Tcp { host, port } => {
                let resolved = addr::resolve(host, port)?;
                let domain = if resolved.is_ipv4() { libc::AF_INET } else { libc::AF_INET6 };
                (Kind::Tcp, domain, libc::SOCK_STREAM, addr::raw_from_socket_addr(resolved))
            }
            Endpoint::Udp { host, port } => {
                let resolved = addr::resolve(host, port)?;
                let domain = if resolved.is_ipv4() { libc::AF_INET } else { libc::AF_INET6 };
                (Kind::Udp, domain, libc::SOCK_DGRAM, addr::raw_from_socket_addr(resolved))
            }
            Endpoint::Unix { path } => (Kind::Unix, libc::AF_UNIX, libc::SOCK_STREAM, addr::raw_from_unix_path(path)?),
        };

        let fd = unsafe { libc::socket(domain, sock_type | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC, 0) };
        if fd < 0 {
            return Err(RtError::from(std::io::Error::last_os_error()));
        }

        if kind != Kind::Unix {
            apply_reuse_options(fd);
        }

        Ok(Socket { kind, fd, endpoint_addr: Some(endpoint_addr), listening: false })
    }

    /// Bind to the endpoint given at [`Socket::init`]. Returns
    /// `NotASocket` for a socket produced by [`Socket::accept`], which
    /// carries no endpoint to bind to.
    pub fn bind(&self) -> RtResult<()> {
        let addr = self.endpoint_addr.as_ref().ok_or(RtError::NotASocket)?;
        let ret = unsafe { libc::bind(self.fd, &addr.storage as *const _ as *const libc::sockaddr, addr.len) };
        if ret != 0 {
            return Err(RtError::from(std::io::Error::last_os_error()));
        }
        Ok(())
    }

    /// Mark a bound TCP/Unix socket as listening. Not valid for UDP.
    pub fn listen(&mut self, backlog: i32) -> RtResult<()> {
        if self.kind == Kind::Udp {
            return Err(RtError::OperationNotSupported);
        }
        let ret = unsafe { libc::listen(self.fd, backlog) };
        if ret != 0 {
            return Err(RtError::from(std::io::Error::last_os_error()));
        }
        self.listening = true;
        Ok(())
    }

    /// Accept one connection. A peer that resets or aborts before the
    /// accept completes is benign — retried rather than surfaced, so a
    /// burst of pre-accept resets cannot take a listener down.
    pub fn accept(&self) -> RtResult<Socket> {
        if !self.listening {
            return Err(RtError::NotListening);
        }
        loop {
            let attempt = if current_capabilities().contains(Capabilities::ACCEPT) {
                match io_await(AioOp::Accept { listen_fd: self.fd }) {
                    Ok(CompletionResult::Fd(fd)) => Ok(fd),
                    Ok(other) => unreachable!("accept completion must carry a fd, got {:?}", other),
                    Err(e) => Err(e),
                }
            } else {
                yield_until(|| raw_accept(self.fd))
            };
            match attempt {
                Ok(fd) => return Ok(Socket { kind: self.kind, fd, endpoint_addr: None, listening: false }),
                Err(RtError::Closed) => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Connect to the endpoint given at [`Socket::init`]. Returns
    /// `NotASocket` for a socket produced by [`Socket::accept`], which
    /// carries no endpoint to connect to.
    pub fn connect(&self) -> RtResult<()> {
        let addr = *self.endpoint_addr.as_ref().ok_or(RtError::NotASocket)?;
        if current_capabilities().contains(Capabilities::CONNECT) {
            io_await(AioOp::Connect { fd: self.fd, addr })?;
            Ok(())
        } else {
            let mut connecting = false;
            yield_until(|| raw_connect_step(self.fd, &addr, &mut connecting))
        }
    }

    /// Receive into `buf`, returning the number of bytes read (`0` at EOF).
    pub fn recv(&self, buf: &mut [u8]) -> RtResult<usize> {
        let ptr = buf.as_mut_ptr();
        let len = buf.len();
        let n = if current_capabilities().contains(Capabilities::RECV) {
            match io_await(AioOp::Recv { fd: self.fd, buf: ptr, len })? {
                CompletionResult::Value(n) => n,
                other => unreachable!("recv completion must carry a value, got {:?}", other),
            }
        } else {
            yield_until(|| raw_recv(self.fd, ptr, len))?
        };
        Ok(n as usize)
    }

    /// Send `buf`, returning the number of bytes actually written.
    pub fn send(&self, buf: &[u8]) -> RtResult<usize> {
        let ptr = buf.as_ptr();
        let len = buf.len();
        let n = if current_capabilities().contains(Capabilities::SEND) {
            match io_await(AioOp::Send { fd: self.fd, buf: ptr, len })? {
                CompletionResult::Value(n) => n,
                other => unreachable!("send completion must carry a value, got {:?}", other),
            }
        } else {
            yield_until(|| raw_send(self.fd, ptr, len))?
        };
        Ok(n as usize)
    }

    /// Receive exactly `buf.len()` bytes, or fewer if the peer closes
    /// partway through — the short count is returned rather than an error.
    pub fn recv_all(&self, buf: &mut [u8]) -> RtResult<usize> {
        let mut total = 0;
        while total < buf.len() {
            match self.recv(&mut buf[total..]) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(e) if e.is_closed() => break,
                Err(e) => return Err(e),
            }
        }
        Ok(total)
    }

    /// Send exactly `buf.len()` bytes, or fewer if the peer closes partway
    /// through.
    pub fn send_all(&self, buf: &[u8]) -> RtResult<usize> {
        let mut total = 0;
        while total < buf.len() {
            match self.send(&buf[total..]) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(e) if e.is_closed() => break,
                Err(e) => return Err(e),
            }
        }
        Ok(total)
    }

    /// Close through the runtime, suspending the frame if the backend
    /// needs to (io_uring); idempotent.
    pub fn close(&mut self) -> RtResult<()> {
        if self.fd < 0 {
            return Ok(());
        }
        let fd = self.fd;
        self.fd = -1;
        if current_capabilities().contains(Capabilities::CLOSE) {
            io_await(AioOp::Close { fd })?;
        } else {
            let ret = unsafe { libc::close(fd) };
            if ret != 0 {
                return Err(RtError::from(std::io::Error::last_os_error()));
            }
        }
        Ok(())
    }

    /// Synchronous close, safe to call from clean-up paths outside any
    /// frame (e.g. after a frame panics and unwinds past this socket).
    pub fn close_blocking(&mut self) {
        if self.fd < 0 {
            return;
        }
        let fd = self.fd;
        self.fd = -1;
        unsafe { libc::close(fd) };
    }

    pub fn as_raw_fd(&self) -> i32 {
        self.fd
    }

    /// The local port this socket is bound to, for TCP/UDP sockets bound
    /// with an ephemeral port (`0`) — useful for tests that need to know
    /// which port the kernel actually picked.
    pub fn local_port(&self) -> RtResult<u16> {
        let mut storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
        let mut len = std::mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;
        let ret = unsafe { libc::getsockname(self.fd, &mut storage as *mut _ as *mut libc::sockaddr, &mut len) };
        if ret != 0 {
            return Err(RtError::from(std::io::Error::last_os_error()));
        }
        match storage.ss_family as i32 {
            libc::AF_INET => {
                let sin = unsafe { &*(&storage as *const _ as *const libc::sockaddr_in) };
                Ok(u16::from_be(sin.sin_port))
            }
            libc::AF_INET6 => {
                let sin6 = unsafe { &*(&storage as *const _ as *const libc::sockaddr_in6) };
                Ok(u16::from_be(sin6.sin6_port))
            }
            _ => Err(RtError::NotASocket),
        }
    }
}

impl Drop for Socket {
    fn drop(&mut self) {
        if self.fd >= 0 {
            unsafe { libc::close(self.fd) };
        }
    }
}

fn apply_reuse_options(fd: i32) {
    let one: libc::c_int = 1;
    let optlen = std::mem::size_of::<libc::c_int>() as libc::socklen_t;
    unsafe {
        // Prefer SO_REUSEPORT (load-balances accepted connections across
        // every listener bound to the same port); fall back to
        // SO_REUSEADDR alone on platforms/kernels that reject it.
        let ret = libc::setsockopt(fd, libc::SOL_SOCKET, libc::SO_REUSEPORT, &one as *const _ as *const libc::c_void, optlen);
        if ret != 0 {
            libc::setsockopt(fd, libc::SOL_SOCKET, libc::SO_REUSEADDR, &one as *const _ as *const libc::c_void, optlen);
        }
    }
}

fn raw_accept(listen_fd: i32) -> RtResult<Option<i32>> {
    let ret = unsafe { libc::accept4(listen_fd, std::ptr::null_mut(), std::ptr::null_mut(), libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC) };
    if ret >= 0 {
        return Ok(Some(ret));
    }
    classify_wouldblock()
}

fn raw_connect_step(fd: i32, addr: &RawSockAddr, connecting: &mut bool) -> RtResult<Option<()>> {
    if !*connecting {
        let ret = unsafe { libc::connect(fd, &addr.storage as *const _ as *const libc::sockaddr, addr.len) };
        if ret == 0 {
            return Ok(Some(()));
        }
        let errno = std::io::Error::last_os_error().raw_os_error().unwrap_or(libc::EIO);
        if errno == libc::EINPROGRESS {
            *connecting = true;
            return Ok(None);
        }
        return match RtError::from_errno(errno) {
            None => Ok(None),
            Some(e) => Err(e),
        };
    }

    let mut err: libc::c_int = 0;
    let mut len = std::mem::size_of::<libc::c_int>() as libc::socklen_t;
    let ret = unsafe { libc::getsockopt(fd, libc::SOL_SOCKET, libc::SO_ERROR, &mut err as *mut _ as *mut libc::c_void, &mut len) };
    if ret != 0 {
        return Err(RtError::from(std::io::Error::last_os_error()));
    }
    match err {
        0 => Ok(Some(())),
        libc::EINPROGRESS => Ok(None),
        _ => match RtError::from_errno(err) {
            None => Ok(None),
            Some(e) => Err(e),
        },
    }
}

fn raw_recv(fd: i32, buf: *mut u8, len: usize) -> RtResult<Option<i64>> {
    let ret = unsafe { libc::recv(fd, buf as *mut libc::c_void, len, 0) };
    if ret >= 0 {
        return Ok(Some(ret as i64));
    }
    classify_wouldblock()
}

fn raw_send(fd: i32, buf: *const u8, len: usize) -> RtResult<Option<i64>> {
    let ret = unsafe { libc::send(fd, buf as *const libc::c_void, len, libc::MSG_NOSIGNAL) };
    if ret >= 0 {
        return Ok(Some(ret as i64));
    }
    classify_wouldblock()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_tcp_produces_a_nonblocking_socket() {
        let sock = Socket::init(Endpoint::Tcp { host: "127.0.0.1", port: 0 }).unwrap();
        let flags = unsafe { libc::fcntl(sock.as_raw_fd(), libc::F_GETFL) };
        assert_ne!(flags & libc::O_NONBLOCK, 0);
    }

    #[test]
    fn listen_rejects_udp() {
        let mut sock = Socket::init(Endpoint::Udp { host: "127.0.0.1", port: 0 }).unwrap();
        sock.bind().unwrap();
        assert!(matches!(sock.listen(8), Err(RtError::OperationNotSupported)));
    }

    #[test]
    fn accept_before_listen_is_rejected() {
        let sock = Socket::init(Endpoint::Tcp { host: "127.0.0.1", port: 0 }).unwrap();
        sock.bind().unwrap();
        // No scheduler is driving this thread in a unit test, but
        // `listening` is checked before anything touches the backend.
        assert!(matches!(sock.accept(), Err(RtError::NotListening)));
    }
}
