//! Thin non-blocking `recv`/`send` wrappers shared by the connection state
//! machine and the body reader — both operate on a bare `RawFd` rather
//! than a typed stream, so TCP and UNIX-domain connections share one code
//! path after `accept`.

use std::io;
use std::os::unix::io::RawFd;

pub(crate) fn recv_nonblocking(fd: RawFd, buf: &mut [u8]) -> io::Result<usize> {
    // SAFETY: `buf` is a valid, uniquely-borrowed slice of `buf.len()`
    // bytes for the duration of the call.
    let rc = unsafe { libc::recv(fd, buf.as_mut_ptr().cast(), buf.len(), 0) };
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(rc as usize)
    }
}

pub(crate) fn send_nonblocking(fd: RawFd, buf: &[u8]) -> io::Result<usize> {
    // SAFETY: `buf` is valid for `buf.len()` bytes for the duration of the
    // call; `send` does not retain the pointer afterwards.
    let rc = unsafe { libc::send(fd, buf.as_ptr().cast(), buf.len(), libc::MSG_NOSIGNAL) };
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(rc as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recv_and_send_round_trip_over_a_socketpair() {
        let mut fds = [0i32; 2];
        assert_eq!(
            unsafe { libc::socketpair(libc::AF_UNIX, libc::SOCK_STREAM | libc::SOCK_NONBLOCK, 0, fds.as_mut_ptr()) },
            0
        );
        let [a, b] = fds;
        assert_eq!(send_nonblocking(a, b"hello").unwrap(), 5);
        let mut buf = [0u8; 16];
        let n = recv_nonblocking(b, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"hello");
        unsafe {
            libc::close(a);
            libc::close(b);
        }
    }

    #[test]
    fn recv_on_empty_nonblocking_socket_would_block() {
        let mut fds = [0i32; 2];
        assert_eq!(
            unsafe { libc::socketpair(libc::AF_UNIX, libc::SOCK_STREAM | libc::SOCK_NONBLOCK, 0, fds.as_mut_ptr()) },
            0
        );
        let [a, b] = fds;
        let mut buf = [0u8; 16];
        let err = recv_nonblocking(a, &mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
        unsafe {
            libc::close(a);
            libc::close(b);
        }
    }
}
