//! The parsed request and its incremental, resumable parser.
//!
//! Grounded on the teacher's `http::request` module for the overall shape
//! (method/path/version/headers sub-steps, `memchr`-driven scanning) but
//! reworked around [`ParseBuffer`]'s head/rollback cursors so a single
//! [`parse`] call can be re-entered after any number of [`ParseBuffer::append`]
//! calls, rather than assuming one fully-buffered read.

use crate::{
    errors::ErrorKind,
    http::types::{Method, Version},
    parse_buffer::ParseBuffer,
};

/// A request line/header block parsed so far. `method`/`version` are `None`
/// and `path` is empty until their sub-step completes — this is the typed
/// equivalent of spec's "empty string means not yet parsed" sentinel.
#[derive(Debug, Clone, Default)]
pub struct Request {
    method: Option<Method>,
    path: String,
    version: Option<Version>,
    headers: Vec<(String, String)>,
}

impl Request {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Restore to the pristine pre-parse state, for reuse across a
    /// keep-alive connection's next request.
    pub(crate) fn reset(&mut self) {
        self.method = None;
        self.path.clear();
        self.version = None;
        self.headers.clear();
    }

    pub fn method(&self) -> Option<Method> {
        self.method.clone()
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn version(&self) -> Option<Version> {
        self.version
    }

    /// First header value matching `name`, compared case-insensitively
    /// (the conventional HTTP comparison, even though the underlying map
    /// preserves whatever case the client sent).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn content_length(&self) -> usize {
        self.header("content-length")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0)
    }

    pub fn keep_alive(&self) -> bool {
        !self
            .header("connection")
            .is_some_and(|v| v.eq_ignore_ascii_case("close"))
    }
}

/// Result of one [`parse`] call.
pub(crate) enum ParseOutcome {
    /// The buffer was exhausted mid-token; call again once more bytes have
    /// been appended.
    NeedMore,
    /// The header block is fully parsed. Any bytes still after the cursor
    /// are the start of the body.
    Complete,
    Fatal(ErrorKind),
}

/// Advance `request` as far as `buf`'s currently available bytes allow.
/// Resumable: call again after [`ParseBuffer::append`] to continue where
/// the previous call left off.
pub(crate) fn parse(buf: &mut ParseBuffer, request: &mut Request) -> ParseOutcome {
    if request.method.is_none() {
        match parse_method(buf, request) {
            Step::Continue => {}
            Step::NeedMore => return ParseOutcome::NeedMore,
            Step::Fatal(e) => return ParseOutcome::Fatal(e),
        }
    }
    if request.path.is_empty() {
        match parse_path(buf, request) {
            Step::Continue => {}
            Step::NeedMore => return ParseOutcome::NeedMore,
            Step::Fatal(e) => return ParseOutcome::Fatal(e),
        }
    }
    if request.version.is_none() {
        match parse_version(buf, request) {
            Step::Continue => {}
            Step::NeedMore => return ParseOutcome::NeedMore,
            Step::Fatal(e) => return ParseOutcome::Fatal(e),
        }
    }
    parse_headers(buf, request)
}

enum Step {
    Continue,
    NeedMore,
    Fatal(ErrorKind),
}

fn parse_method(buf: &mut ParseBuffer, request: &mut Request) -> Step {
    let hay = buf.bytes_after_cursor();
    match memchr::memchr(b' ', hay) {
        Some(end) => {
            let Ok(token) = simdutf8::basic::from_utf8(&hay[..end]) else {
                buf.rollback();
                return Step::Fatal(ErrorKind::BadRequest {
                    position: buf.size_before_cursor(),
                    expectation: "a UTF-8 encoded method token",
                });
            };
            request.method = Some(Method::from_token(token));
            buf.increment(end + 1);
            buf.commit();
            Step::Continue
        }
        None => {
            buf.rollback();
            Step::NeedMore
        }
    }
}

fn parse_path(buf: &mut ParseBuffer, request: &mut Request) -> Step {
    let hay = buf.bytes_after_cursor();
    match memchr::memchr(b' ', hay) {
        Some(end) => {
            let Ok(path) = simdutf8::basic::from_utf8(&hay[..end]) else {
                buf.rollback();
                return Step::Fatal(ErrorKind::BadRequest {
                    position: buf.size_before_cursor(),
                    expectation: "a UTF-8 encoded request path",
                });
            };
            request.path = path.to_owned();
            buf.increment(end + 1);
            buf.commit();
            Step::Continue
        }
        None => {
            buf.rollback();
            Step::NeedMore
        }
    }
}

fn parse_version(buf: &mut ParseBuffer, request: &mut Request) -> Step {
    let hay = buf.bytes_after_cursor();
    match memchr::memchr(b'\n', hay) {
        Some(end) => {
            let raw = &hay[..end];
            let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
            match Version::from_bytes(raw) {
                Some(version) => {
                    request.version = Some(version);
                    buf.increment(end + 1);
                    buf.commit();
                    Step::Continue
                }
                None => {
                    buf.rollback();
                    Step::Fatal(ErrorKind::BadRequest {
                        position: buf.size_before_cursor(),
                        expectation: "HTTP/1.0 or HTTP/1.1",
                    })
                }
            }
        }
        None => {
            buf.rollback();
            Step::NeedMore
        }
    }
}

fn parse_headers(buf: &mut ParseBuffer, request: &mut Request) -> ParseOutcome {
    loop {
        let hay = buf.bytes_after_cursor();
        let Some(&first) = hay.first() else {
            buf.rollback();
            return ParseOutcome::NeedMore;
        };
        if first == b'\n' {
            buf.increment(1);
            buf.commit();
            return ParseOutcome::Complete;
        }
        if first == b'\r' {
            // A lone CR is swallowed wherever it appears between tokens;
            // only a following LF ends the header block.
            buf.increment(1);
            buf.commit();
            continue;
        }

        let Some(colon) = memchr::memchr(b':', hay) else {
            buf.rollback();
            return ParseOutcome::NeedMore;
        };
        if hay.get(colon + 1) != Some(&b' ') {
            buf.rollback();
            return ParseOutcome::Fatal(ErrorKind::BadRequest {
                position: buf.size_before_cursor() + colon + 1,
                expectation: "a single space after the header colon",
            });
        }
        let value_start = colon + 2;
        let Some(lf_rel) = memchr::memchr(b'\n', &hay[value_start..]) else {
            buf.rollback();
            return ParseOutcome::NeedMore;
        };
        let lf = value_start + lf_rel;

        let mut value = &hay[value_start..lf];
        value = value.strip_suffix(b"\r").unwrap_or(value);
        let (Ok(key), Ok(value)) = (simdutf8::basic::from_utf8(&hay[..colon]), simdutf8::basic::from_utf8(value))
        else {
            buf.rollback();
            return ParseOutcome::Fatal(ErrorKind::BadRequest {
                position: buf.size_before_cursor(),
                expectation: "a UTF-8 encoded header name and value",
            });
        };
        request.headers.push((key.to_owned(), value.to_owned()));

        buf.increment(lf + 1);
        buf.commit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drive(input: &[u8], chunk: usize) -> (ParseOutcome, Request) {
        let mut buf = ParseBuffer::new();
        let mut req = Request::new();
        let mut outcome = ParseOutcome::NeedMore;
        for piece in input.chunks(chunk.max(1)) {
            buf.append(piece);
            outcome = parse(&mut buf, &mut req);
            if matches!(outcome, ParseOutcome::Complete | ParseOutcome::Fatal(_)) {
                break;
            }
        }
        (outcome, req)
    }

    #[test]
    fn parses_request_line_and_headers_in_one_shot() {
        let (outcome, req) =
            drive(b"GET /ping HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n", usize::MAX);
        assert!(matches!(outcome, ParseOutcome::Complete));
        assert_eq!(req.method(), Some(Method::Get));
        assert_eq!(req.path(), "/ping");
        assert_eq!(req.version(), Some(Version::Http11));
        assert_eq!(req.header("host"), Some("x"));
        assert!(!req.keep_alive());
    }

    #[test]
    fn byte_at_a_time_matches_one_shot() {
        let input = b"POST /up HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello";
        let (one_shot, _) = drive(input, usize::MAX);
        let (piecewise, req) = drive(input, 1);
        assert!(matches!(one_shot, ParseOutcome::Complete));
        assert!(matches!(piecewise, ParseOutcome::Complete));
        assert_eq!(req.content_length(), 5);
    }

    #[test]
    fn missing_space_after_colon_is_fatal() {
        let (outcome, _) = drive(b"GET / HTTP/1.1\r\nBad:value\r\n\r\n", usize::MAX);
        assert!(matches!(outcome, ParseOutcome::Fatal(ErrorKind::BadRequest { .. })));
    }

    #[test]
    fn unterminated_header_needs_more() {
        let (outcome, _) = drive(b"GET / HTTP/1.1\r\nHost: x", usize::MAX);
        assert!(matches!(outcome, ParseOutcome::NeedMore));
    }

    #[test]
    fn non_utf8_path_is_fatal() {
        let mut buf = ParseBuffer::new();
        let mut req = Request::new();
        buf.append(b"GET /\xff HTTP/1.1\r\n\r\n");
        assert!(matches!(parse(&mut buf, &mut req), ParseOutcome::Fatal(ErrorKind::BadRequest { .. })));
    }

    #[test]
    fn non_utf8_header_value_is_fatal() {
        let mut buf = ParseBuffer::new();
        let mut req = Request::new();
        buf.append(b"GET / HTTP/1.1\r\nX-Bad: \xff\xfe\r\n\r\n");
        assert!(matches!(parse(&mut buf, &mut req), ParseOutcome::Fatal(ErrorKind::BadRequest { .. })));
    }

    #[test]
    fn unknown_method_parses_as_extension() {
        let (outcome, req) = drive(b"BOGUS / HTTP/1.1\r\n\r\n", usize::MAX);
        assert!(matches!(outcome, ParseOutcome::Complete));
        assert_eq!(req.method(), Some(Method::Extension("BOGUS".to_string())));
    }

    #[test]
    fn trace_method_parses_successfully() {
        let (outcome, req) = drive(b"TRACE / HTTP/1.1\r\n\r\n", usize::MAX);
        assert!(matches!(outcome, ParseOutcome::Complete));
        assert_eq!(req.method(), Some(Method::Extension("TRACE".to_string())));
    }

    #[test]
    fn partial_method_needs_more_not_fatal() {
        let mut buf = ParseBuffer::new();
        let mut req = Request::new();
        buf.append(b"GE");
        assert!(matches!(parse(&mut buf, &mut req), ParseOutcome::NeedMore));
    }

    #[test]
    fn body_bytes_remain_after_cursor_on_complete() {
        let mut buf = ParseBuffer::new();
        let mut req = Request::new();
        buf.append(b"POST /up HTTP/1.1\r\nContent-Length: 3\r\n\r\nabc");
        assert!(matches!(parse(&mut buf, &mut req), ParseOutcome::Complete));
        assert_eq!(buf.bytes_after_cursor(), b"abc");
    }
}
