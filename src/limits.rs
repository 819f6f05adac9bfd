//! Server configuration limits.
//!
//! Trimmed from the teacher crate's multi-worker-oriented `ServerLimits`
//! (admission queues, wait strategies) down to the tunables spec.md §6
//! actually names, in the same doc-comment register: each field explains
//! the resource-exhaustion scenario its default guards against.

/// Socket-level tunables used at construction time.
#[derive(Debug, Clone, Copy)]
pub struct ServerLimits {
    /// `SO_RCVBUF`/`SO_SNDBUF` requested on the listening and accepted
    /// sockets. The kernel may round this up; treat it as a hint, not a
    /// hard cap on any single `recv`.
    pub socket_buffer_size: usize,
    /// Backlog passed to `listen(2)`. Connections beyond this are refused
    /// by the kernel before `accept` ever sees them.
    pub listen_backlog: i32,
    /// Maximum readiness events drained from one `poll` call. Bounds how
    /// long a single loop iteration can run before giving every other
    /// connection a turn.
    pub max_events_per_loop: usize,
}

impl Default for ServerLimits {
    fn default() -> Self {
        ServerLimits { socket_buffer_size: 8192, listen_backlog: 128, max_events_per_loop: 12 }
    }
}

/// Request-parsing tunables.
#[derive(Debug, Clone, Copy)]
pub struct ReqLimits {
    /// Upper bound on the request line + header block, in bytes. Guards
    /// against an unbounded `ParseBuffer` growth from a slow-loris-style
    /// client that never sends the terminating blank line.
    pub max_header_size: usize,
}

impl Default for ReqLimits {
    fn default() -> Self {
        ReqLimits { max_header_size: 8192 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_tunables() {
        let server = ServerLimits::default();
        assert_eq!(server.socket_buffer_size, 8192);
        assert_eq!(server.listen_backlog, 128);
        assert_eq!(server.max_events_per_loop, 12);
        assert_eq!(ReqLimits::default().max_header_size, 8192);
    }
}
