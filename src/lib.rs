//! loop_web - embeddable, single-threaded, readiness-driven HTTP/1.1 server
//! core.
//!
//! Built around one idea: a single thread owns one `mio` readiness
//! notifier, a map of connection states, and a route table, and drives
//! every accepted connection through a three-stage cycle — read and parse
//! the request (`REQ`), run the matched handler (`FUNC`), serialize and
//! send the response (`RES`) — looping back to `REQ` on keep-alive. There
//! is no worker pool and no `tokio` runtime underneath: this crate *is*
//! the reactor.
//!
//! # Quick start
//!
//! ```no_run
//! use loop_web::{Server, Handler, Request, Response, Handled, Method, BodyReader};
//! use std::io;
//!
//! struct Ping;
//!
//! #[async_trait::async_trait]
//! impl Handler for Ping {
//!     async fn handle(
//!         &self,
//!         _data: &mut (),
//!         _req: &Request,
//!         resp: &mut Response,
//!         _body: &mut BodyReader,
//!     ) -> io::Result<Handled> {
//!         Ok(resp.body("pong"))
//!     }
//! }
//!
//! fn main() -> Result<(), loop_web::Error> {
//!     let mut server = Server::<()>::tcp("127.0.0.1", 8080)?;
//!     server.register("/ping", Method::Get, Ping);
//!     server.serve()
//! }
//! ```
//!
//! # Suspension
//!
//! A handler may `.await` only inside [`BodyReader::read`]. That is the
//! sole point where this crate's event loop can set the connection aside
//! and go serve someone else; everything else in a handler runs to
//! completion without yielding.
//!
//! # Per-connection state
//!
//! Implement [`ConnectionData`] to carry mutable state across keep-alive
//! requests on the same connection (a request counter, an authenticated
//! session token). `Server<S>` is generic over it; the unit type `()` is
//! used when a handler needs none.

mod body;
mod descriptor;
pub mod errors;
pub mod http;
pub mod limits;
mod net;
pub mod route;
mod server;
mod waker;

pub use crate::{
    body::BodyReader,
    errors::Error,
    http::{
        request::Request,
        response::{Handled, Response},
        types::{Method, StatusCode, Version},
    },
    route::{ConnectionData, ConnectionFilter, Handler},
    server::{KillSwitch, Server},
};

#[cfg(test)]
pub(crate) mod tools {
    //! Shared test helpers that don't warrant their own module.
    use std::future::Future;
    use std::task::{Context, Poll};

    /// Polls a future exactly once with a no-op waker, panicking if it
    /// doesn't resolve immediately. Used by tests that only exercise the
    /// synchronous paths of a handler or body reader.
    pub(crate) fn poll_once<F: Future>(fut: F) -> F::Output {
        use std::pin::pin;
        let waker = crate::waker::noop_waker();
        let mut cx = Context::from_waker(&waker);
        match pin!(fut).poll(&mut cx) {
            Poll::Ready(v) => v,
            Poll::Pending => panic!("expected immediate readiness"),
        }
    }
}
