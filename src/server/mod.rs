//! The server facade: socket construction, route registration, and the
//! blocking `serve`/`kill` lifecycle.
//!
//! Grounded on the teacher's `Server`/`ServerBuilder` split, but the
//! teacher accepts an already-bound `tokio::net::TcpListener` from its
//! caller — here the server builds and owns its own socket end to end
//! (per the external-interface contract this crate implements), so the
//! builder's required-first-argument is the address or path, not a
//! pre-built listener.

pub(crate) mod connection;
mod event_loop;

use crate::{
    descriptor::DescriptorHandle,
    errors::Error,
    http::types::Method,
    limits::{ReqLimits, ServerLimits},
    route::{ConnectionData, ConnectionFilter, Handler, RouteTable},
};
use mio::{Poll, Waker};
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::os::unix::io::IntoRawFd;
use std::path::Path;
use std::sync::Arc;

/// An embeddable, single-threaded HTTP/1.1 server core.
///
/// # Examples
///
/// ```no_run
/// use loop_web::{Server, Handler, Request, Response, Handled, Method};
/// use std::io;
///
/// struct Ping;
///
/// #[async_trait::async_trait]
/// impl Handler for Ping {
///     async fn handle(
///         &self,
///         _data: &mut (),
///         _req: &Request,
///         resp: &mut Response,
///         _body: &mut loop_web::BodyReader,
///     ) -> io::Result<Handled> {
///         Ok(resp.body("pong"))
///     }
/// }
///
/// let mut server = Server::<()>::tcp("127.0.0.1", 8080).unwrap();
/// server.register("/ping", Method::Get, Ping);
/// server.serve().unwrap();
/// ```
pub struct Server<S: ConnectionData = ()> {
    listener: Arc<DescriptorHandle>,
    routes: RouteTable<S>,
    filter: Arc<dyn ConnectionFilter>,
    server_limits: ServerLimits,
    req_limits: ReqLimits,
    poll: Poll,
    waker: Arc<Waker>,
}

impl<S: ConnectionData> Server<S> {
    /// Binds an IPv4 TCP listening socket: `SO_REUSEADDR | SO_REUSEPORT`,
    /// 8192-byte send/receive buffers, non-blocking. Does not `listen` yet
    /// — that happens in [`Server::serve`].
    pub fn tcp(addr: &str, port: u16) -> Result<Self, Error> {
        let ip: Ipv4Addr = addr.parse().map_err(|_| Error::InvalidAddress(addr.to_string()))?;
        let sock_addr: SocketAddr = SocketAddr::V4(SocketAddrV4::new(ip, port));

        let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        socket.set_reuse_port(true)?;
        socket.set_recv_buffer_size(ServerLimits::default().socket_buffer_size)?;
        socket.set_send_buffer_size(ServerLimits::default().socket_buffer_size)?;
        socket.bind(&sock_addr.into())?;
        socket.set_nonblocking(true)?;

        Self::from_descriptor(DescriptorHandle::new(socket.into_raw_fd()))
    }

    /// Binds a UNIX-domain stream listening socket at `path`: creates the
    /// parent directory if missing, unlinks a stale socket file at `path`
    /// (ignoring the error if there is none), non-blocking.
    pub fn unix(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|err| Error::InvalidSocketPath(path.to_path_buf(), err))?;
        }
        let _ = std::fs::remove_file(path);

        let socket = Socket::new(Domain::UNIX, Type::STREAM, None)?;
        let addr = socket2::SockAddr::unix(path).map_err(|err| Error::InvalidSocketPath(path.to_path_buf(), err))?;
        socket.bind(&addr).map_err(|err| Error::InvalidSocketPath(path.to_path_buf(), err))?;
        socket.set_nonblocking(true)?;

        Self::from_descriptor(DescriptorHandle::new(socket.into_raw_fd()))
    }

    fn from_descriptor(listener: DescriptorHandle) -> Result<Self, Error> {
        let poll = Poll::new().map_err(Error::System)?;
        let waker = Waker::new(poll.registry(), event_loop::WAKE_TOKEN).map_err(Error::System)?;
        Ok(Server {
            listener: Arc::new(listener),
            routes: RouteTable::new(),
            filter: Arc::new(()),
            server_limits: ServerLimits::default(),
            req_limits: ReqLimits::default(),
            poll,
            waker: Arc::new(waker),
        })
    }

    /// Overrides the default socket/loop tunables. Connections accepted
    /// after this call use the new `socket_buffer_size`; the listening
    /// socket itself keeps whatever it was bound with.
    pub fn server_limits(mut self, limits: ServerLimits) -> Self {
        self.server_limits = limits;
        self
    }

    /// Overrides the default request-parsing tunables.
    pub fn req_limits(mut self, limits: ReqLimits) -> Self {
        self.req_limits = limits;
        self
    }

    /// Installs a connection filter, consulted once per accepted TCP
    /// connection before any byte is read from it. Has no effect on UNIX
    /// sockets, which carry no peer address to filter on.
    pub fn filter(mut self, filter: impl ConnectionFilter) -> Self {
        self.filter = Arc::new(filter);
        self
    }

    /// Registers `handler` to serve `method` requests to `path`. Must be
    /// called before [`Server::serve`]; the route table is read-only once
    /// the loop starts.
    pub fn register(&mut self, path: impl Into<String>, method: Method, handler: impl Handler<S>) {
        self.routes.register(path, method, handler);
    }

    /// A cloneable, thread-safe handle that can request shutdown of a
    /// running [`Server::serve`] call from any thread.
    pub fn kill_switch(&self) -> KillSwitch {
        KillSwitch { listener: Arc::clone(&self.listener), waker: Arc::clone(&self.waker) }
    }

    /// Starts listening (backlog 128) and runs the event loop until
    /// [`KillSwitch::kill`] is called or a fatal condition occurs on the
    /// listening descriptor. Blocks the calling thread.
    pub fn serve(&mut self) -> Result<(), Error> {
        // A `KillSwitch` is usable the moment `Server` exists, so `kill()`
        // racing ahead of this call and closing the listener first is a
        // legitimate sequence, not a fatal one — treat it the same as a
        // kill observed after the loop started.
        if !self.listener.is_valid() {
            return Ok(());
        }
        // SAFETY: `listen` has no memory-safety preconditions; it only acts
        // on the already-bound descriptor this handle owns.
        let rc = unsafe { libc::listen(self.listener.raw(), self.server_limits.listen_backlog) };
        if rc != 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EBADF) && !self.listener.is_valid() {
                return Ok(());
            }
            return Err(Error::System(err));
        }
        event_loop::run(
            &mut self.poll,
            &self.listener,
            &self.routes,
            self.filter.as_ref(),
            &self.server_limits,
            &self.req_limits,
        )
    }
}

/// Requests graceful shutdown of a running [`Server::serve`] call.
///
/// Closing the listening descriptor alone would not reliably unblock a
/// thread already parked in the kernel's readiness wait, so this also
/// fires a dedicated `mio::Waker` registered in the same `Poll` — the next
/// loop iteration observes it and `serve` returns within that iteration.
/// Calling [`KillSwitch::kill`] more than once is equivalent to calling it
/// once (the descriptor close and the waker are both idempotent).
#[derive(Clone)]
pub struct KillSwitch {
    listener: Arc<DescriptorHandle>,
    waker: Arc<Waker>,
}

impl KillSwitch {
    pub fn kill(&self) -> io::Result<()> {
        self.listener.close()?;
        self.waker.wake()
    }
}
