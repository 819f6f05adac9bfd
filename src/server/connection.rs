//! Per-connection state machine: REQ (parse) → FUNC (handler) → RES
//! (serialize + send), looping back to REQ on keep-alive.
//!
//! Grounded on the teacher's `HttpConnection`, which bundled a descriptor,
//! parser, request and response together behind `reset_request_response`.
//! Driven here by readiness flags handed up from [`crate::server::event_loop`]
//! instead of `tokio`'s `AsyncRead`/`AsyncWrite`, since the reactor itself is
//! what this crate now provides rather than borrows.

use crate::{
    body::BodyReader,
    descriptor::DescriptorHandle,
    errors::ErrorKind,
    http::{
        request::{self, ParseOutcome, Request},
        response::Response,
    },
    limits::ReqLimits,
    net,
    parse_buffer::ParseBuffer,
    route::{ConnectionData, RouteLookup, RouteTable},
    waker,
};
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

/// What the event loop should do with a connection after driving it.
pub(crate) enum DriveOutcome {
    /// Keep the descriptor registered and wait for more readiness.
    Continue,
    /// The connection is finished; the loop should deregister and close it.
    Close,
}

type HandlerFuture<S> = Pin<Box<dyn Future<Output = io::Result<(S, Response)>> + Send>>;

/// Where a connection currently sits in the request/response cycle.
pub(crate) enum Stage<S: ConnectionData> {
    /// Accumulating and parsing the request line and headers.
    Req,
    /// A handler future is in flight (possibly suspended inside
    /// [`BodyReader::read`]).
    Func(HandlerFuture<S>),
    /// A response is fully built and being drained to the socket.
    Res,
}

/// One accepted connection's complete state. Reused across keep-alive
/// requests on the same socket; reconstructed only on a new `accept`.
pub(crate) struct ConnectionState<S: ConnectionData> {
    pub(crate) descriptor: DescriptorHandle,
    stage: Stage<S>,

    parse_buf: ParseBuffer,
    request: Request,
    response: Response,
    data: Option<S>,

    out_buf: Vec<u8>,
    out_cursor: usize,
    /// Set once a canned error response has been queued. The client's
    /// framing was never trusted enough to keep the connection open for
    /// another request afterwards, regardless of what it asked for.
    force_close: bool,

    max_header_size: usize,
    socket_buf_size: usize,
    recv_scratch: Vec<u8>,
}

impl<S: ConnectionData> ConnectionState<S> {
    pub(crate) fn new(descriptor: DescriptorHandle, req_limits: &ReqLimits, socket_buf_size: usize) -> Self {
        ConnectionState {
            descriptor,
            stage: Stage::Req,
            parse_buf: ParseBuffer::new(),
            request: Request::new(),
            response: Response::new(),
            data: None,
            out_buf: Vec::new(),
            out_cursor: 0,
            force_close: false,
            max_header_size: req_limits.max_header_size,
            socket_buf_size,
            recv_scratch: vec![0u8; socket_buf_size],
        }
    }

    /// Drive whatever readable readiness means for the current stage: REQ
    /// reads and parses; FUNC re-polls a suspended handler (the body
    /// reader's own `recv` happens inside that poll); RES ignores readable
    /// readiness entirely, since it only ever waits to write.
    pub(crate) fn drive_readable(&mut self, routes: &RouteTable<S>) -> DriveOutcome {
        loop {
            match &mut self.stage {
                Stage::Req => match self.drive_req(routes) {
                    Some(outcome) => return outcome,
                    None => continue,
                },
                Stage::Func(_) => return self.poll_func(),
                Stage::Res => return DriveOutcome::Continue,
            }
        }
    }

    /// Drive whatever writable readiness means for the current stage: RES
    /// drains the serialized response; REQ and FUNC ignore it.
    pub(crate) fn drive_writable(&mut self) -> DriveOutcome {
        match self.stage {
            Stage::Res => self.drive_res(),
            Stage::Req | Stage::Func(_) => DriveOutcome::Continue,
        }
    }

    /// One recv-and-parse step. Returns `Some(outcome)` when the loop
    /// should stop for this readiness event (blocked, closed, or the stage
    /// changed); `None` to keep draining the socket.
    fn drive_req(&mut self, routes: &RouteTable<S>) -> Option<DriveOutcome> {
        match net::recv_nonblocking(self.descriptor.raw(), &mut self.recv_scratch) {
            Ok(0) => Some(DriveOutcome::Close),
            Ok(n) => {
                self.parse_buf.append(&self.recv_scratch[..n]);
                match request::parse(&mut self.parse_buf, &mut self.request) {
                    ParseOutcome::NeedMore => {
                        // Total occupied length, not just the committed
                        // prefix — a single pathologically long token with
                        // no terminator yet would otherwise never trip this.
                        if self.parse_buf.len() > self.max_header_size {
                            return Some(self.fail(ErrorKind::HeaderTooLarge));
                        }
                        None
                    }
                    ParseOutcome::Complete => {
                        // A single `recv` can deliver the whole header block
                        // at once, skipping the `NeedMore` branch entirely —
                        // check the cap here too so an oversized block can't
                        // slip through just because it arrived in one shot.
                        let outcome = if self.parse_buf.size_before_cursor() > self.max_header_size {
                            self.fail(ErrorKind::HeaderTooLarge)
                        } else {
                            self.begin_func(routes)
                        };
                        Some(outcome)
                    }
                    ParseOutcome::Fatal(kind) => Some(self.fail(kind)),
                }
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => Some(DriveOutcome::Continue),
            Err(_) => Some(DriveOutcome::Close),
        }
    }

    /// The header block just completed: look the route up and either move
    /// straight to a canned failure response or construct the handler
    /// future and enter FUNC.
    fn begin_func(&mut self, routes: &RouteTable<S>) -> DriveOutcome {
        let method = self.request.method().expect("method set by a completed parse");
        match routes.lookup(self.request.path(), &method) {
            RouteLookup::NotFound => self.fail(ErrorKind::NotFound),
            RouteLookup::MethodNotAllowed => self.fail(ErrorKind::MethodNotAllowed),
            RouteLookup::Found(handler) => {
                let content_length = self.request.content_length();
                let available = self.parse_buf.bytes_after_cursor();
                let seed_len = available.len().min(content_length);
                let seed = available[..seed_len].to_vec();
                self.parse_buf.increment(seed_len);
                self.parse_buf.commit();
                self.parse_buf.compact();

                let body = BodyReader::new(self.descriptor.raw(), self.socket_buf_size, content_length, seed);
                let mut data = self.data.take().unwrap_or_else(S::new);
                data.reset();
                let request_snapshot = self.request.clone();
                let response = Response::new();

                // Every value the handler borrows is moved into the future
                // by value, so the future owns everything it points at —
                // no self-referential struct, no pinning trick needed.
                let fut: HandlerFuture<S> = Box::pin(async move {
                    let mut data = data;
                    let mut response = response;
                    let mut body = body;
                    let outcome = handler.handle(&mut data, &request_snapshot, &mut response, &mut body).await;
                    outcome.map(|_handled| (data, response))
                });
                self.stage = Stage::Func(fut);
                // A handler that never suspends should reach RES within the
                // same readiness event rather than waiting on a readiness
                // edge that may not come again soon.
                self.poll_func()
            }
        }
    }

    /// Poll the in-flight handler future exactly once.
    fn poll_func(&mut self) -> DriveOutcome {
        let Stage::Func(fut) = &mut self.stage else {
            return DriveOutcome::Continue;
        };
        let waker = waker::noop_waker();
        let mut cx = Context::from_waker(&waker);
        match fut.as_mut().poll(&mut cx) {
            Poll::Pending => DriveOutcome::Continue,
            Poll::Ready(Ok((data, response))) => {
                self.data = Some(data);
                self.enter_res(response)
            }
            // The handler terminated abnormally; per the transport-error
            // policy this closes the connection without sending any
            // response bytes at all.
            Poll::Ready(Err(_)) => DriveOutcome::Close,
        }
    }

    fn fail(&mut self, kind: ErrorKind) -> DriveOutcome {
        let version = self.request.version().unwrap_or_default();
        let response = kind.as_response(version, self.request.path());
        self.force_close = true;
        self.enter_res(response)
    }

    /// Serialize `response` and enter RES, then immediately attempt to send
    /// it rather than waiting for a later writable-readiness event. `mio`'s
    /// edge-triggered backends fire a socket's one-time writable edge as
    /// soon as it's registered — often well before the request that led
    /// here ever arrived as a separate readable-only event — so no future
    /// writable edge is guaranteed to come and re-arm `drive_writable`.
    fn enter_res(&mut self, mut response: Response) -> DriveOutcome {
        response.stamp_date();
        self.out_buf.clear();
        response.serialize(&mut self.out_buf);
        self.out_cursor = 0;
        self.response = response;
        self.stage = Stage::Res;
        self.drive_res()
    }

    fn drive_res(&mut self) -> DriveOutcome {
        while self.out_cursor < self.out_buf.len() {
            match net::send_nonblocking(self.descriptor.raw(), &self.out_buf[self.out_cursor..]) {
                Ok(0) => return DriveOutcome::Close,
                Ok(n) => self.out_cursor += n,
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => return DriveOutcome::Continue,
                Err(_) => return DriveOutcome::Close,
            }
        }
        if self.force_close || !self.request.keep_alive() {
            DriveOutcome::Close
        } else {
            self.reset_for_next_request();
            DriveOutcome::Continue
        }
    }

    fn reset_for_next_request(&mut self) {
        self.request.reset();
        self.response.reset();
        self.out_buf.clear();
        self.out_cursor = 0;
        self.force_close = false;
        self.stage = Stage::Req;
    }
}
