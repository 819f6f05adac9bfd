//! Resumable byte buffer with speculative-consume/rollback cursors.
//!
//! Grounded on the teacher's `http::request::Parser` (which wraps a fixed
//! buffer with a `position` cursor and `memchr`-based scanning) but
//! reworked to be genuinely re-entrant across many [`ParseBuffer::append`]
//! calls: the teacher's buffer assumed one whole request arrived in a
//! single `fill_buffer` call, while the request parser here must resume
//! cleanly no matter how the kernel chooses to segment the bytes.

/// Invariant maintained by every operation: `0 <= rollback <= head <= len`.
#[derive(Debug, Default)]
pub(crate) struct ParseBuffer {
    buf: Vec<u8>,
    head: usize,
    rollback: usize,
}

impl ParseBuffer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Reset to an empty buffer with both cursors at 0.
    pub(crate) fn assign(&mut self, bytes: &[u8]) {
        self.buf.clear();
        self.buf.extend_from_slice(bytes);
        self.head = 0;
        self.rollback = 0;
    }

    /// Append without disturbing either cursor.
    pub(crate) fn append(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub(crate) fn current(&self) -> Option<u8> {
        self.buf.get(self.head).copied()
    }

    /// Advance `head` by one and return the byte advanced over, or `None`
    /// if `head` is already at the end (leaving it unchanged).
    pub(crate) fn next(&mut self) -> Option<u8> {
        let byte = self.current()?;
        self.head += 1;
        Some(byte)
    }

    /// Discard speculative progress: `head := rollback`.
    pub(crate) fn rollback(&mut self) {
        self.head = self.rollback;
    }

    /// Commit speculative progress: `rollback := head`.
    pub(crate) fn commit(&mut self) {
        self.rollback = self.head;
    }

    /// Absolute-set `head`. Fails (returning `false`, leaving state
    /// unchanged) if `pos` would violate `head <= len`.
    #[allow(dead_code)]
    pub(crate) fn set(&mut self, pos: usize) -> bool {
        if pos <= self.buf.len() {
            self.head = pos;
            true
        } else {
            false
        }
    }

    /// Relative-advance `head` by `delta`. Fails the same way as [`set`](Self::set).
    pub(crate) fn increment(&mut self, delta: usize) -> bool {
        self.set(self.head + delta)
    }

    pub(crate) fn size_before_cursor(&self) -> usize {
        self.head
    }

    pub(crate) fn size_after_cursor(&self) -> usize {
        self.buf.len() - self.head
    }

    pub(crate) fn bytes_after_cursor(&self) -> &[u8] {
        &self.buf[self.head..]
    }

    /// Drop every byte before `rollback` and re-home both cursors to 0. The
    /// request parser calls this once a request line/header block has been
    /// fully committed, so the buffer doesn't grow without bound across a
    /// keep-alive connection's lifetime.
    pub(crate) fn compact(&mut self) {
        if self.rollback == 0 {
            return;
        }
        self.buf.drain(0..self.rollback);
        self.head -= self.rollback;
        self.rollback = 0;
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Total bytes currently held (committed and speculative together).
    pub(crate) fn len(&self) -> usize {
        self.buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_advances_only_in_range() {
        let mut pb = ParseBuffer::new();
        pb.assign(b"ab");
        assert_eq!(pb.next(), Some(b'a'));
        assert_eq!(pb.next(), Some(b'b'));
        assert_eq!(pb.next(), None);
        assert_eq!(pb.head, 2);
    }

    #[test]
    fn rollback_restores_last_commit() {
        let mut pb = ParseBuffer::new();
        pb.assign(b"abcd");
        pb.next();
        pb.next();
        pb.commit();
        pb.next();
        pb.rollback();
        assert_eq!(pb.size_before_cursor(), 2);
        assert_eq!(pb.bytes_after_cursor(), b"cd");
    }

    #[test]
    fn append_then_parse_matches_one_shot_parse() {
        // Feeding "ab" then "cd" and reading byte-by-byte must see the same
        // sequence as assigning "abcd" up front.
        let mut incremental = ParseBuffer::new();
        incremental.append(b"ab");
        incremental.append(b"cd");

        let mut one_shot = ParseBuffer::new();
        one_shot.assign(b"abcd");

        let mut seq_a = Vec::new();
        while let Some(b) = incremental.next() {
            seq_a.push(b);
        }
        let mut seq_b = Vec::new();
        while let Some(b) = one_shot.next() {
            seq_b.push(b);
        }
        assert_eq!(seq_a, seq_b);
    }

    #[test]
    fn invariant_holds_after_compact() {
        let mut pb = ParseBuffer::new();
        pb.assign(b"GET / HTTP/1.1\r\n\r\nrest");
        pb.increment(16);
        pb.commit();
        pb.compact();
        assert!(pb.rollback <= pb.head);
        assert!(pb.head <= pb.buf.len());
        assert_eq!(pb.bytes_after_cursor(), b"\r\nrest");
    }
}
