//! Building raw socket addresses for `connect`/`bind`.
//!
//! TCP/UDP endpoints are resolved through `std::net::ToSocketAddrs`
//! (`getaddrinfo` under the hood) rather than a hand-rolled resolver.
//! Unix endpoints are a bare path, no resolution needed.

use fiberio_core::error::{RtError, RtResult};
use fiberio_core::job::RawSockAddr;
use std::net::{SocketAddr, ToSocketAddrs};

pub(crate) fn resolve(host: &str, port: u16) -> RtResult<SocketAddr> {
    (host, port)
        .to_socket_addrs()
        .map_err(RtError::from)?
        .next()
        .ok_or_else(|| RtError::Unexpected(std::io::Error::new(std::io::ErrorKind::AddrNotAvailable, "no addresses resolved")))
}

pub(crate) fn raw_from_socket_addr(addr: SocketAddr) -> RawSockAddr {
    match addr {
        SocketAddr::V4(v4) => {
            let mut storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
            let sin = unsafe { &mut *(&mut storage as *mut libc::sockaddr_storage as *mut libc::sockaddr_in) };
            sin.sin_family = libc::AF_INET as libc::sa_family_t;
            sin.sin_port = v4.port().to_be();
            sin.sin_addr = libc::in_addr { s_addr: u32::from_ne_bytes(v4.ip().octets()) };
            RawSockAddr { storage, len: std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t }
        }
        SocketAddr::V6(v6) => {
            let mut storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
            let sin6 = unsafe { &mut *(&mut storage as *mut libc::sockaddr_storage as *mut libc::sockaddr_in6) };
            sin6.sin6_family = libc::AF_INET6 as libc::sa_family_t;
            sin6.sin6_port = v6.port().to_be();
            sin6.sin6_addr = libc::in6_addr { s6_addr: v6.ip().octets() };
            sin6.sin6_flowinfo = v6.flowinfo();
            sin6.sin6_scope_id = v6.scope_id();
            RawSockAddr { storage, len: std::mem::size_of::<libc::sockaddr_in6>() as libc::socklen_t }
        }
    }
}

/// `AF_UNIX` paths share `sockaddr_un`'s 108-byte `sun_path`, including the
/// terminating NUL this encoding requires.
pub(crate) fn raw_from_unix_path(path: &str) -> RtResult<RawSockAddr> {
    let bytes = path.as_bytes();
    // Strict `<` (not `<=`): a full path leaves no room for the NUL
    // terminator `sockaddr_un` expects.
    if bytes.len() >= 108 {
        return Err(RtError::Unexpected(std::io::Error::new(std::io::ErrorKind::InvalidInput, "unix socket path too long")));
    }
    let mut storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
    let sun = unsafe { &mut *(&mut storage as *mut libc::sockaddr_storage as *mut libc::sockaddr_un) };
    sun.sun_family = libc::AF_UNIX as libc::sa_family_t;
    for (slot, byte) in sun.sun_path.iter_mut().zip(bytes.iter()) {
        *slot = *byte as libc::c_char;
    }
    let len = (std::mem::size_of::<libc::sa_family_t>() + bytes.len() + 1) as libc::socklen_t;
    Ok(RawSockAddr { storage, len })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_loopback() {
        let addr = resolve("127.0.0.1", 9000).unwrap();
        assert!(addr.is_ipv4());
        assert_eq!(addr.port(), 9000);
    }

    #[test]
    fn unix_path_round_trips_family() {
        let raw = raw_from_unix_path("/tmp/fiberio-test.sock").unwrap();
        assert_eq!(raw.storage.ss_family as i32, libc::AF_UNIX);
    }

    #[test]
    fn unix_path_too_long_rejected() {
        let long = "/".to_string() + &"a".repeat(200);
        assert!(raw_from_unix_path(&long).is_err());
    }
}
