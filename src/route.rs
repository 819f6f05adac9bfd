//! Handler registration surface: the `Handler` trait, per-connection
//! payload traits, and the path → method → handler table.
//!
//! The route table itself has no counterpart in the teacher crate (it
//! lets one handler per connection inspect the URL itself); it is grounded
//! instead on the `Arc<dyn HttpRequestHandler>` / `#[async_trait]` pattern
//! used for exactly this kind of heterogeneous async dispatch table in
//! `dennisss/dacha`'s HTTP server, and is explicitly sanctioned by
//! spec.md's own design notes ("model them as a single trait/interface...
//! dynamic dispatch is acceptable — the table is consulted once per
//! request").

use crate::body::BodyReader;
use crate::http::request::Request;
use crate::http::response::{Handled, Response};
use crate::http::types::Method;
use async_trait::async_trait;
use std::collections::HashMap;
use std::io;
use std::sync::Arc;

/// Per-connection user state that persists across keep-alive requests on
/// the same connection and is reset (not reconstructed) between
/// connections. Supplemental feature, mirrored from the teacher crate.
pub trait ConnectionData: Send + Sync + 'static {
    fn new() -> Self;
    fn reset(&mut self);
}

impl ConnectionData for () {
    fn new() {}
    fn reset(&mut self) {}
}

/// Optional pre-parse accept/reject hook for a freshly accepted
/// connection, keyed only on the peer address. Supplemental feature.
pub trait ConnectionFilter: Send + Sync + 'static {
    fn accept(&self, peer: std::net::SocketAddr) -> bool;
}

impl ConnectionFilter for () {
    fn accept(&self, _peer: std::net::SocketAddr) -> bool {
        true
    }
}

/// A registered request handler. `Err` is treated as a per-connection
/// transport error: the connection is closed without sending any
/// response bytes, per spec.md §7's "handler-thrown errors" policy.
#[async_trait]
pub trait Handler<S = ()>: Send + Sync + 'static
where
    S: ConnectionData,
{
    async fn handle(
        &self,
        data: &mut S,
        request: &Request,
        response: &mut Response,
        body: &mut BodyReader,
    ) -> io::Result<Handled>;
}

pub(crate) enum RouteLookup<S: ConnectionData> {
    Found(Arc<dyn Handler<S>>),
    NotFound,
    MethodNotAllowed,
}

/// Populated before [`crate::server::Server::serve`] and never mutated by
/// the loop thereafter.
pub(crate) struct RouteTable<S: ConnectionData> {
    routes: HashMap<String, HashMap<Method, Arc<dyn Handler<S>>>>,
}

impl<S: ConnectionData> RouteTable<S> {
    pub(crate) fn new() -> Self {
        RouteTable { routes: HashMap::new() }
    }

    pub(crate) fn register(&mut self, path: impl Into<String>, method: Method, handler: impl Handler<S>) {
        self.routes.entry(path.into()).or_default().insert(method, Arc::new(handler));
    }

    pub(crate) fn lookup(&self, path: &str, method: &Method) -> RouteLookup<S> {
        match self.routes.get(path) {
            None => RouteLookup::NotFound,
            Some(methods) => match methods.get(method) {
                Some(handler) => RouteLookup::Found(Arc::clone(handler)),
                None => RouteLookup::MethodNotAllowed,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl Handler for Echo {
        async fn handle(
            &self,
            _data: &mut (),
            _request: &Request,
            response: &mut Response,
            _body: &mut BodyReader,
        ) -> io::Result<Handled> {
            Ok(response.body("ok"))
        }
    }

    #[test]
    fn missing_path_is_not_found() {
        let table: RouteTable<()> = RouteTable::new();
        assert!(matches!(table.lookup("/x", &Method::Get), RouteLookup::NotFound));
    }

    #[test]
    fn wrong_method_is_method_not_allowed() {
        let mut table: RouteTable<()> = RouteTable::new();
        table.register("/x", Method::Get, Echo);
        assert!(matches!(table.lookup("/x", &Method::Post), RouteLookup::MethodNotAllowed));
    }

    #[test]
    fn registered_route_is_found() {
        let mut table: RouteTable<()> = RouteTable::new();
        table.register("/x", Method::Get, Echo);
        assert!(matches!(table.lookup("/x", &Method::Get), RouteLookup::Found(_)));
    }

    #[test]
    fn extension_method_can_be_registered_and_found() {
        let mut table: RouteTable<()> = RouteTable::new();
        let trace = Method::Extension("TRACE".to_string());
        table.register("/x", trace.clone(), Echo);
        assert!(matches!(table.lookup("/x", &trace), RouteLookup::Found(_)));
    }
}
