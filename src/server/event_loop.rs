//! The readiness loop: one listening descriptor, one wakeup descriptor, and
//! a map from connection descriptor number to connection state.
//!
//! Grounded on the teacher's `launch`/`get_stream` accept loop for the
//! overall shape (accept, hand off, keep looping) but rebuilt around `mio`
//! readiness events instead of `tokio`'s per-connection task spawn — this
//! core drives every connection from one thread, one `Poll::poll` call at a
//! time.

use crate::{
    descriptor::DescriptorHandle,
    errors::Error,
    limits::{ReqLimits, ServerLimits},
    route::{ConnectionData, ConnectionFilter, RouteTable},
    server::connection::{ConnectionState, DriveOutcome},
};
use mio::{unix::SourceFd, Events, Interest, Poll, Token};
use std::collections::HashMap;
use std::io;
use std::mem::ManuallyDrop;
use std::os::unix::io::{FromRawFd, IntoRawFd, RawFd};

pub(crate) const LISTENER_TOKEN: Token = Token(0);
pub(crate) const WAKE_TOKEN: Token = Token(1);

// Connection tokens are offset past the two reserved tokens above so a
// low-numbered fd (never 0 or 1 in a process that keeps its standard
// streams open) can't collide with them.
const FD_TOKEN_OFFSET: usize = 2;

fn token_for_fd(fd: RawFd) -> Token {
    Token(fd as usize + FD_TOKEN_OFFSET)
}

fn fd_for_token(token: Token) -> RawFd {
    (token.0 - FD_TOKEN_OFFSET) as RawFd
}

/// Runs until `Kill` (the wakeup token fires) or a fatal condition on the
/// listening descriptor. Blocks the calling thread for its entire duration.
pub(crate) fn run<S: ConnectionData>(
    poll: &mut Poll,
    listener: &DescriptorHandle,
    routes: &RouteTable<S>,
    filter: &dyn ConnectionFilter,
    server_limits: &ServerLimits,
    req_limits: &ReqLimits,
) -> Result<(), Error> {
    listener.register(poll.registry(), LISTENER_TOKEN, Interest::READABLE).map_err(Error::System)?;

    let mut connections: HashMap<RawFd, ConnectionState<S>> = HashMap::new();
    let mut events = Events::with_capacity(server_limits.max_events_per_loop);

    loop {
        poll.poll(&mut events, None).map_err(Error::LoopFatal)?;

        for event in events.iter() {
            match event.token() {
                WAKE_TOKEN => return Ok(()),
                LISTENER_TOKEN => {
                    if event.is_error() {
                        return Err(Error::LoopFatal(socket_error(listener.raw())));
                    }
                    if event.is_read_closed() || event.is_write_closed() {
                        return Ok(());
                    }
                    accept_all(poll, listener.raw(), filter, server_limits, req_limits, &mut connections);
                }
                token => {
                    let fd = fd_for_token(token);
                    let Some(conn) = connections.get_mut(&fd) else {
                        // A stray readiness event for a descriptor this map
                        // never held (or no longer holds) — make sure the
                        // notifier isn't still watching it.
                        let _ = poll.registry().deregister(&mut SourceFd(&fd));
                        continue;
                    };
                    if event.is_error() || (event.is_read_closed() && event.is_write_closed()) {
                        connections.remove(&fd);
                        continue;
                    }
                    let mut outcome = DriveOutcome::Continue;
                    if event.is_readable() {
                        outcome = conn.drive_readable(routes);
                    }
                    if matches!(outcome, DriveOutcome::Continue) && event.is_writable() {
                        outcome = conn.drive_writable();
                    }
                    if matches!(outcome, DriveOutcome::Close) {
                        connections.remove(&fd);
                    }
                }
            }
        }
    }
}

/// Drains every pending connection on the listening descriptor (`accept`
/// until "would block"), applying the connection filter and registering
/// each survivor for both readable and writable readiness.
fn accept_all<S: ConnectionData>(
    poll: &Poll,
    listener_fd: RawFd,
    filter: &dyn ConnectionFilter,
    server_limits: &ServerLimits,
    req_limits: &ReqLimits,
    connections: &mut HashMap<RawFd, ConnectionState<S>>,
) {
    loop {
        // Borrowed, not owned: `ManuallyDrop` stops this wrapper's `Drop`
        // from closing a descriptor the `DescriptorHandle` still owns.
        let listener_sock = ManuallyDrop::new(unsafe { socket2::Socket::from_raw_fd(listener_fd) });
        match listener_sock.accept() {
            Ok((conn_sock, peer)) => {
                if let Some(addr) = peer.as_socket() {
                    if !filter.accept(addr) {
                        continue;
                    }
                }
                if conn_sock.set_nonblocking(true).is_err() {
                    continue;
                }
                let _ = conn_sock.set_recv_buffer_size(server_limits.socket_buffer_size);
                let _ = conn_sock.set_send_buffer_size(server_limits.socket_buffer_size);

                let fd = conn_sock.into_raw_fd();
                let descriptor = DescriptorHandle::new(fd);
                let interest = Interest::READABLE | Interest::WRITABLE;
                if descriptor.register(poll.registry(), token_for_fd(fd), interest).is_err() {
                    continue;
                }
                connections
                    .insert(fd, ConnectionState::new(descriptor, req_limits, server_limits.socket_buffer_size));
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => return,
            // Transient accept failures (e.g. ECONNABORTED) are ignored, per
            // the connection state machine's terminal-conditions policy —
            // they affect only the one peer, never the listener itself.
            Err(_) => return,
        }
    }
}

fn socket_error(fd: RawFd) -> io::Error {
    let mut errno: libc::c_int = 0;
    let mut len = std::mem::size_of::<libc::c_int>() as libc::socklen_t;
    // SAFETY: `errno`/`len` are valid, appropriately-sized out-parameters
    // for the duration of this one syscall.
    let rc = unsafe {
        libc::getsockopt(fd, libc::SOL_SOCKET, libc::SO_ERROR, (&mut errno as *mut libc::c_int).cast(), &mut len)
    };
    if rc == 0 && errno != 0 {
        io::Error::from_raw_os_error(errno)
    } else {
        io::Error::last_os_error()
    }
}
