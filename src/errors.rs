//! Error taxonomy.
//!
//! Two shapes, matching where a failure is allowed to surface:
//!
//! - [`Error`] — configuration and system failures. Returned from the
//!   server constructors and from [`crate::Server::serve`]. These are the
//!   only errors a caller of this crate ever observes directly.
//! - [`ErrorKind`] — everything that happens while parsing or dispatching
//!   a single connection's request. These never escape the loop: they are
//!   translated into a canned HTTP response and the connection either
//!   keeps going (on success) or is closed (after sending the response).

use crate::http::response::Response;
use crate::http::types::{StatusCode, Version};
use std::{error, fmt, io, path::PathBuf};

/// Failure surfaced from construction or from [`crate::Server::serve`].
#[derive(Debug)]
pub enum Error {
    /// A TCP address or port could not be parsed.
    InvalidAddress(String),
    /// A UNIX socket path's parent directory could not be created, or the
    /// stale socket at that path could not be removed.
    InvalidSocketPath(PathBuf, io::Error),
    /// `socket`, `bind`, `setsockopt`, `listen`, or readiness-notifier
    /// creation failed.
    System(io::Error),
    /// The readiness wait itself, or the listening descriptor, reported an
    /// error while `serve` was running.
    LoopFatal(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidAddress(addr) => write!(f, "invalid address: {addr}"),
            Error::InvalidSocketPath(path, err) => {
                write!(f, "invalid socket path {}: {err}", path.display())
            }
            Error::System(err) => write!(f, "system error: {err}"),
            Error::LoopFatal(err) => write!(f, "fatal event loop error: {err}"),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::InvalidSocketPath(_, err) | Error::System(err) | Error::LoopFatal(err) => {
                Some(err)
            }
            Error::InvalidAddress(_) => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::System(err)
    }
}

/// Local, per-connection condition. Never leaves the loop — always becomes
/// a canned response (closing the connection) or a silent close.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum ErrorKind {
    /// The request line or a header violated the grammar at `position`.
    BadRequest { position: usize, expectation: &'static str },
    /// The header block exceeded the configured maximum.
    HeaderTooLarge,
    /// No route registered for the request's path.
    NotFound,
    /// The path is registered but not for the request's method.
    MethodNotAllowed,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::BadRequest { position, expectation } => {
                write!(f, "bad request at byte {position}: expected {expectation}")
            }
            ErrorKind::HeaderTooLarge => write!(f, "header block too large"),
            ErrorKind::NotFound => write!(f, "no route for path"),
            ErrorKind::MethodNotAllowed => write!(f, "method not allowed for path"),
        }
    }
}

impl error::Error for ErrorKind {}

impl ErrorKind {
    /// Render this condition as the canned response it becomes — always
    /// `connection: close`, since the client's own framing was never
    /// trusted enough to keep the connection around for another request.
    pub(crate) fn as_response(&self, version: Version, path: &str) -> Response {
        let mut response = Response::new();
        response.set_version(version);
        response.set_header("connection", "close");
        match self {
            ErrorKind::BadRequest { position, expectation } => {
                response.status(StatusCode::BAD_REQUEST);
                response.body(format!("bad request at byte {position}: expected {expectation}"));
            }
            ErrorKind::HeaderTooLarge => {
                response.status(StatusCode::BAD_REQUEST);
                response.body("request header block exceeded the configured maximum");
            }
            ErrorKind::NotFound => {
                response.status(StatusCode::NOT_FOUND);
                response.body(format!("The requested resource {path} was not found"));
            }
            ErrorKind::MethodNotAllowed => {
                response.status(StatusCode::METHOD_NOT_ALLOWED);
                response.body("The requested method is not allowed for this resource");
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_includes_path() {
        let response = ErrorKind::NotFound.as_response(Version::Http11, "/nope");
        let mut out = Vec::new();
        response.serialize(&mut out);
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(text.contains("The requested resource /nope was not found"));
        assert!(text.contains("connection: close"));
    }

    #[test]
    fn bad_request_reports_position() {
        let err = ErrorKind::BadRequest { position: 12, expectation: "space after colon" };
        let response = err.as_response(Version::Http11, "/");
        let mut out = Vec::new();
        response.serialize(&mut out);
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(text.contains("byte 12"));
    }

    #[test]
    fn error_display_includes_source() {
        let io_err = io::Error::new(io::ErrorKind::AddrInUse, "in use");
        let err = Error::System(io_err);
        assert!(err.to_string().contains("system error"));
    }
}
