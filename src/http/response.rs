//! The response a handler builds, and its one-shot serializer.
//!
//! Keeps the teacher's [`Handled`] marker idiom (an opaque value only this
//! crate can construct, returned by the methods that finalize a response,
//! so a handler cannot forget to produce one) but trades the teacher's
//! streaming reserved-digit-field builder for the plain struct spec's data
//! model describes — this core's responses are built once per request, not
//! streamed incrementally, so there is no reallocation to avoid.

use crate::http::types::{StatusCode, Version};
use std::time::SystemTime;

/// Proof that a handler finalized its response. Handlers must return this
/// value; the only way to obtain one is to call [`Response::body`] or
/// [`Response::finish`].
pub struct Handled(());

/// The response a handler populates. `Content-Length` is kept consistent
/// with `body` automatically — there is no way to set one without the
/// other.
#[derive(Debug, Clone)]
pub struct Response {
    version: Version,
    status: StatusCode,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Default for Response {
    fn default() -> Self {
        Response { version: Version::Http11, status: StatusCode::OK, headers: Vec::new(), body: Vec::new() }
    }
}

impl Response {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn reset(&mut self) {
        self.version = Version::Http11;
        self.status = StatusCode::OK;
        self.headers.clear();
        self.body.clear();
    }

    pub fn status(&mut self, status: StatusCode) -> &mut Self {
        self.status = status;
        self
    }

    pub fn set_version(&mut self, version: Version) -> &mut Self {
        self.version = version;
        self
    }

    /// Add a header. Repeated calls with the same name append another
    /// entry rather than replacing it — callers wanting replacement should
    /// use [`Response::set_header`].
    pub fn header(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Replace every existing value for `name` with a single new one.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let name = name.into();
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(&name));
        self.headers.push((name, value.into()));
        self
    }

    /// Set the body and finalize the response. `Content-Length` is
    /// recomputed to match.
    pub fn body(&mut self, data: impl Into<Vec<u8>>) -> Handled {
        self.body = data.into();
        self.sync_content_length();
        Handled(())
    }

    /// Finalize a response with no body (e.g. 204, or a HEAD reply).
    pub fn finish(&mut self) -> Handled {
        self.body.clear();
        self.sync_content_length();
        Handled(())
    }

    fn sync_content_length(&mut self) {
        self.set_header("content-length", self.body.len().to_string());
    }

    pub fn status_code(&self) -> StatusCode {
        self.status
    }

    pub fn body_bytes(&self) -> &[u8] {
        &self.body
    }

    /// Decode a previously-set `Date` header, if present and well-formed.
    pub fn date(&self) -> Option<SystemTime> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("date"))
            .and_then(|(_, v)| httpdate::parse_http_date(v).ok())
    }

    /// Stamp (or overwrite) the `Date` header with the current wall-clock
    /// time in IMF-fixdate. Called by the connection state machine on
    /// first entry to the response stage, never by handlers directly.
    pub(crate) fn stamp_date(&mut self) {
        self.set_header("date", httpdate::fmt_http_date(SystemTime::now()));
    }

    /// One-shot encode into `out`: status line, headers with a non-empty
    /// value, a blank line, then the body.
    pub(crate) fn serialize(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.version.as_bytes());
        out.push(b' ');
        out.extend_from_slice(self.status.code().to_string().as_bytes());
        out.push(b' ');
        out.extend_from_slice(self.status.reason().as_bytes());
        out.extend_from_slice(b"\r\n");
        for (name, value) in &self.headers {
            if value.is_empty() {
                continue;
            }
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(&self.body);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_keeps_content_length_in_sync() {
        let mut resp = Response::new();
        resp.body("hello");
        assert_eq!(resp.headers.iter().find(|(k, _)| k == "content-length").unwrap().1, "5");
        resp.body("hi");
        assert_eq!(resp.headers.iter().find(|(k, _)| k == "content-length").unwrap().1, "2");
    }

    #[test]
    fn serialize_matches_scenario_one() {
        let mut resp = Response::new();
        resp.status(StatusCode::OK);
        resp.stamp_date();
        resp.body("pong");
        let mut out = Vec::new();
        resp.serialize(&mut out);
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("content-length: 4\r\n"));
        assert!(text.contains("date: "));
        assert!(text.ends_with("\r\npong"));
    }

    #[test]
    fn empty_value_headers_are_skipped() {
        let mut resp = Response::new();
        resp.header("x-empty", "");
        resp.finish();
        let mut out = Vec::new();
        resp.serialize(&mut out);
        assert!(!String::from_utf8(out).unwrap().contains("x-empty"));
    }

    #[test]
    fn date_round_trips_through_stamp() {
        let mut resp = Response::new();
        resp.stamp_date();
        assert!(resp.date().is_some());
    }
}
