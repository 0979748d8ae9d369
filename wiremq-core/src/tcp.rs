//! TCP socket tuning.
//!
//! # Safety
//!
//! compio streams do not expose socket options directly, so this module
//! briefly rehydrates the raw fd/socket into a `socket2::Socket`. The
//! borrowed socket is `mem::forget`-ed so the fd is not closed twice.

#![allow(unsafe_code)]

use std::io;

/// Enable `TCP_NODELAY` on a compio `TcpStream`.
///
/// Disables Nagle's algorithm; request-reply round-trips and small
/// publishes should not wait for segment coalescing.
///
/// # Errors
///
/// Returns an error if the socket option cannot be set.
#[inline]
pub fn enable_nodelay(stream: &compio::net::TcpStream) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::io::{AsRawFd, FromRawFd};
        let fd = stream.as_raw_fd();
        let sock = unsafe { socket2::Socket::from_raw_fd(fd) };
        let res = sock.set_nodelay(true);
        std::mem::forget(sock);
        res
    }

    #[cfg(windows)]
    {
        use std::os::windows::io::{AsRawSocket, FromRawSocket};
        let raw = stream.as_raw_socket();
        let sock = unsafe { socket2::Socket::from_raw_socket(raw) };
        let res = sock.set_nodelay(true);
        std::mem::forget(sock);
        res
    }

    #[cfg(not(any(unix, windows)))]
    {
        Ok(())
    }
}
