// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bounded circular byte buffer bridging the scan producer and the TCP drain.
//!
//! The ring is the single queue between two timing domains: the BLE scan
//! callback writes framed advertisement records, the drain tick reads them
//! back out toward the socket. Writes cap at the remaining free space rather
//! than wrapping over unread data; the producer is a time-sensitive callback
//! that must never block, so the newest fragment is sacrificed instead.
//!
//! # Invariants
//!
//! - `len() <= capacity()` for every sequence of writes and reads.
//! - `len()` equals bytes written minus bytes consumed, exactly.
//! - Wraparound copies split into at most two slices; cursors never cross.
//!
//! No interior locking: one producer path and one consumer path, serialized
//! by the surrounding run-to-completion scheduler. If this type is ever moved
//! to a preemptive threading model, wrap it in a single mutex together with
//! the link state.

/// Fixed-capacity circular byte FIFO.
#[derive(Debug)]
pub struct ByteRing {
    /// Backing storage, fixed at construction
    buf: Vec<u8>,

    /// Read cursor (index of the oldest unread byte)
    head: usize,

    /// Logical length (0..=capacity)
    len: usize,
}

impl ByteRing {
    /// Create an empty ring with a fixed capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity == 0`.
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "ByteRing capacity must be > 0");
        Self {
            buf: vec![0u8; capacity],
            head: 0,
            len: 0,
        }
    }

    /// Maximum number of bytes the ring can hold.
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Current logical length.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check whether the ring holds no data.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Remaining free space.
    pub fn free(&self) -> usize {
        self.buf.len() - self.len
    }

    /// Drop all buffered data and reset the cursors.
    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
    }

    /// Copy bytes in, capping at the remaining free space.
    ///
    /// Returns the number of bytes actually written so callers can detect
    /// truncation. Never overwrites unread data.
    pub fn write(&mut self, data: &[u8]) -> usize {
        let cap = self.buf.len();
        let n = data.len().min(self.free());
        if n == 0 {
            return 0;
        }

        let tail = (self.head + self.len) % cap;
        let first = (cap - tail).min(n);
        self.buf[tail..tail + first].copy_from_slice(&data[..first]);
        if n > first {
            self.buf[..n - first].copy_from_slice(&data[first..n]);
        }
        self.len += n;
        n
    }

    /// Copy bytes out without consuming them.
    ///
    /// Fills `dest` with up to `min(dest.len(), len())` bytes starting at the
    /// read cursor and returns the count. Used to stage a send whose success
    /// is not yet known; pair with [`discard`](Self::discard) on success.
    pub fn peek_into(&self, dest: &mut [u8]) -> usize {
        let cap = self.buf.len();
        let n = dest.len().min(self.len);
        if n == 0 {
            return 0;
        }

        let first = (cap - self.head).min(n);
        dest[..first].copy_from_slice(&self.buf[self.head..self.head + first]);
        if n > first {
            dest[first..n].copy_from_slice(&self.buf[..n - first]);
        }
        n
    }

    /// Copy bytes out and consume them.
    ///
    /// Returns the number of bytes transferred, never more than currently
    /// available.
    pub fn read_into(&mut self, dest: &mut [u8]) -> usize {
        let n = self.peek_into(dest);
        self.discard(n)
    }

    /// Consume up to `n` bytes without copying.
    ///
    /// Returns the number actually consumed.
    pub fn discard(&mut self, n: usize) -> usize {
        let n = n.min(self.len);
        self.head = (self.head + n) % self.buf.len();
        self.len -= n;
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_ring() {
        let ring = ByteRing::with_capacity(16);
        assert_eq!(ring.capacity(), 16);
        assert_eq!(ring.len(), 0);
        assert!(ring.is_empty());
        assert_eq!(ring.free(), 16);
    }

    #[test]
    #[should_panic(expected = "capacity must be > 0")]
    fn test_zero_capacity_panics() {
        let _ = ByteRing::with_capacity(0);
    }

    #[test]
    fn test_write_read_basic() {
        let mut ring = ByteRing::with_capacity(16);
        assert_eq!(ring.write(b"hello"), 5);
        assert_eq!(ring.len(), 5);

        let mut buf = [0u8; 16];
        let n = ring.read_into(&mut buf);
        assert_eq!(n, 5);
        assert_eq!(&buf[..n], b"hello");
        assert!(ring.is_empty());
    }

    #[test]
    fn test_write_caps_at_free_space() {
        let mut ring = ByteRing::with_capacity(8);
        assert_eq!(ring.write(b"abcde"), 5);
        // Only 3 bytes free; the tail of the write is dropped.
        assert_eq!(ring.write(b"fghij"), 3);
        assert_eq!(ring.len(), 8);
        assert_eq!(ring.free(), 0);

        // A full ring rejects everything.
        assert_eq!(ring.write(b"x"), 0);

        let mut buf = [0u8; 8];
        assert_eq!(ring.read_into(&mut buf), 8);
        assert_eq!(&buf, b"abcdefgh");
    }

    #[test]
    fn test_wraparound() {
        let mut ring = ByteRing::with_capacity(8);
        let mut buf = [0u8; 8];

        ring.write(b"abcdef");
        assert_eq!(ring.discard(4), 4);

        // Tail wraps past the end of the backing storage.
        assert_eq!(ring.write(b"ghijkl"), 6);
        assert_eq!(ring.len(), 8);

        assert_eq!(ring.read_into(&mut buf), 8);
        assert_eq!(&buf, b"efghijkl");
    }

    #[test]
    fn test_peek_does_not_consume() {
        let mut ring = ByteRing::with_capacity(16);
        ring.write(b"staged");

        let mut buf = [0u8; 4];
        assert_eq!(ring.peek_into(&mut buf), 4);
        assert_eq!(&buf, b"stag");
        assert_eq!(ring.len(), 6);

        // Peek again yields the same bytes.
        assert_eq!(ring.peek_into(&mut buf), 4);
        assert_eq!(&buf, b"stag");

        assert_eq!(ring.discard(4), 4);
        let mut rest = [0u8; 4];
        assert_eq!(ring.read_into(&mut rest), 2);
        assert_eq!(&rest[..2], b"ed");
    }

    #[test]
    fn test_discard_never_exceeds_available() {
        let mut ring = ByteRing::with_capacity(8);
        ring.write(b"abc");
        assert_eq!(ring.discard(100), 3);
        assert!(ring.is_empty());
        assert_eq!(ring.discard(1), 0);
    }

    #[test]
    fn test_clear() {
        let mut ring = ByteRing::with_capacity(8);
        ring.write(b"abcdef");
        ring.discard(2);
        ring.clear();
        assert!(ring.is_empty());
        assert_eq!(ring.free(), 8);

        // Ring is fully usable after a clear.
        assert_eq!(ring.write(b"12345678"), 8);
    }

    #[test]
    fn test_length_accounting_randomized() {
        let mut ring = ByteRing::with_capacity(64);
        let mut written = 0usize;
        let mut consumed = 0usize;
        let mut next = 0u8;
        let mut expect = 0u8;

        fastrand::seed(7);
        for _ in 0..10_000 {
            if fastrand::bool() {
                let chunk: Vec<u8> = (0..fastrand::usize(0..17))
                    .map(|_| {
                        let b = next;
                        next = next.wrapping_add(1);
                        b
                    })
                    .collect();
                let n = ring.write(&chunk);
                // Bytes past the cap were never queued; rewind the pattern.
                next = next.wrapping_sub((chunk.len() - n) as u8);
                written += n;
            } else {
                let mut buf = vec![0u8; fastrand::usize(0..17)];
                let n = ring.read_into(&mut buf);
                for &b in &buf[..n] {
                    assert_eq!(b, expect, "FIFO order violated");
                    expect = expect.wrapping_add(1);
                }
                consumed += n;
            }
            assert!(ring.len() <= ring.capacity());
            assert_eq!(ring.len(), written - consumed);
        }
    }
}
