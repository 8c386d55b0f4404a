// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Drain policy: when and how much to move from the ring to the transport.
//!
//! Two triggers request a drain attempt:
//! - **watermark**: the ring crossed the high watermark after a record
//!   write (data-availability-driven);
//! - **keepalive**: `drain_interval` elapsed since the last successful
//!   send (idle-flush, bounds the latency of small trickles).
//!
//! One attempt moves at most one send-unit. The transport accepts a single
//! in-flight send per handle; on failure the ring is left untouched and the
//! bytes retry naturally on the next trigger - no retry storm.

use std::time::{Duration, Instant};

use crate::link::Link;
use crate::ring::ByteRing;
use crate::transport::TransportSink;

/// Outcome of one drain attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Bytes were handed to the transport and consumed from the ring
    Sent(usize),

    /// Nothing queued; keepalive timer refreshed if it was due
    Idle,

    /// Not connected; attempt skipped entirely
    NotConnected,

    /// Transport refused the send; bytes remain queued
    Deferred,
}

/// Drain scheduling state and staging buffer.
#[derive(Debug)]
pub struct DrainPolicy {
    /// Largest chunk handed to the transport in one send
    send_unit: usize,

    /// Ring fill level that requests an eager drain
    watermark: usize,

    /// Idle-flush period
    interval: Duration,

    /// Last successful send (or policy start)
    last_send: Instant,

    /// Staging copy for the in-flight send
    staging: Vec<u8>,
}

impl DrainPolicy {
    pub fn new(send_unit: usize, watermark: usize, interval: Duration, now: Instant) -> Self {
        Self {
            send_unit,
            watermark,
            interval,
            last_send: now,
            staging: vec![0u8; send_unit],
        }
    }

    /// High-watermark threshold in bytes.
    pub fn watermark(&self) -> usize {
        self.watermark
    }

    /// Check whether a write moved the ring length across the watermark.
    ///
    /// Fires only on the crossing itself so one burst posts one request.
    pub fn watermark_crossed(&self, len_before: usize, len_after: usize) -> bool {
        len_before < self.watermark && len_after >= self.watermark
    }

    /// Check whether the idle-flush period has elapsed.
    pub fn keepalive_due(&self, now: Instant) -> bool {
        now.duration_since(self.last_send) >= self.interval
    }

    /// Instant of the last successful send.
    pub fn last_send(&self) -> Instant {
        self.last_send
    }

    /// Attempt to move one send-unit from the ring to the transport.
    ///
    /// On success the sent bytes are consumed from the ring and the
    /// keepalive timer restarts. On transport failure the ring is left
    /// untouched; the failure is logged and the next trigger retries.
    pub fn drain<S: TransportSink>(
        &mut self,
        ring: &mut ByteRing,
        link: &Link,
        sink: &mut S,
        now: Instant,
    ) -> DrainOutcome {
        let Some(handle) = link.active_handle() else {
            return DrainOutcome::NotConnected;
        };

        let n = ring.len().min(self.send_unit);
        if n == 0 {
            // Nothing queued; restart the idle timer so an empty link does
            // not report keepalive-due every tick.
            if self.keepalive_due(now) {
                self.last_send = now;
            }
            return DrainOutcome::Idle;
        }

        let staged = ring.peek_into(&mut self.staging[..n]);
        debug_assert_eq!(staged, n);

        match sink.send(handle, &self.staging[..n]) {
            Ok(()) => {
                ring.discard(n);
                self.last_send = now;
                DrainOutcome::Sent(n)
            }
            Err(e) => {
                log::warn!("send of {n} bytes on {handle} failed: {e}");
                DrainOutcome::Deferred
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{mock::MockSink, SocketHandle};

    fn connected_link() -> Link {
        let mut link = Link::new();
        link.on_connect(SocketHandle(1), Instant::now());
        link
    }

    fn policy(now: Instant) -> DrainPolicy {
        DrainPolicy::new(512, 512, Duration::from_millis(250), now)
    }

    #[test]
    fn test_drain_skipped_when_disconnected() {
        let now = Instant::now();
        let mut ring = ByteRing::with_capacity(2048);
        let mut sink = MockSink::new();
        let mut policy = policy(now);
        let link = Link::new();

        ring.write(&[0u8; 100]);
        let outcome = policy.drain(&mut ring, &link, &mut sink, now);

        assert_eq!(outcome, DrainOutcome::NotConnected);
        assert!(sink.sent_bytes().is_empty());
        assert_eq!(ring.len(), 100);
    }

    #[test]
    fn test_drain_idle_on_empty_ring() {
        let now = Instant::now();
        let mut ring = ByteRing::with_capacity(2048);
        let mut sink = MockSink::new();
        let mut policy = policy(now);
        let link = connected_link();

        let outcome = policy.drain(&mut ring, &link, &mut sink, now);
        assert_eq!(outcome, DrainOutcome::Idle);
        assert!(sink.sent_bytes().is_empty());

        // An overdue empty drain only refreshes the keepalive stamp.
        let later = now + Duration::from_millis(300);
        assert!(policy.keepalive_due(later));
        policy.drain(&mut ring, &link, &mut sink, later);
        assert!(!policy.keepalive_due(later));
        assert!(sink.sent_bytes().is_empty());
    }

    #[test]
    fn test_drain_caps_at_send_unit() {
        let now = Instant::now();
        let mut ring = ByteRing::with_capacity(2048);
        let mut sink = MockSink::new();
        let mut policy = policy(now);
        let link = connected_link();

        ring.write(&vec![7u8; 600]);
        let outcome = policy.drain(&mut ring, &link, &mut sink, now);

        assert_eq!(outcome, DrainOutcome::Sent(512));
        assert_eq!(sink.sent_bytes().len(), 512);
        assert_eq!(ring.len(), 88);

        // Remainder goes out on the next attempt.
        let outcome = policy.drain(&mut ring, &link, &mut sink, now);
        assert_eq!(outcome, DrainOutcome::Sent(88));
        assert!(ring.is_empty());
    }

    #[test]
    fn test_send_failure_leaves_ring_untouched() {
        let now = Instant::now();
        let mut ring = ByteRing::with_capacity(2048);
        let mut sink = MockSink::new();
        let mut policy = policy(now);
        let link = connected_link();

        ring.write(b"retained");
        sink.fail_next_sends(1);

        assert_eq!(
            policy.drain(&mut ring, &link, &mut sink, now),
            DrainOutcome::Deferred
        );
        assert_eq!(ring.len(), 8);
        assert_eq!(policy.last_send(), now);

        // Next tick retries the exact same bytes.
        assert_eq!(
            policy.drain(&mut ring, &link, &mut sink, now),
            DrainOutcome::Sent(8)
        );
        assert_eq!(sink.sent_bytes(), b"retained");
        assert!(ring.is_empty());
    }

    #[test]
    fn test_watermark_crossing_fires_once() {
        let policy = policy(Instant::now());

        assert!(!policy.watermark_crossed(0, 100));
        assert!(policy.watermark_crossed(500, 512));
        assert!(policy.watermark_crossed(0, 2048));
        // Already above: a further write must not re-trigger.
        assert!(!policy.watermark_crossed(512, 600));
        assert!(!policy.watermark_crossed(600, 700));
    }

    #[test]
    fn test_keepalive_restarts_after_send() {
        let now = Instant::now();
        let mut ring = ByteRing::with_capacity(2048);
        let mut sink = MockSink::new();
        let mut policy = policy(now);
        let link = connected_link();

        let later = now + Duration::from_millis(250);
        assert!(policy.keepalive_due(later));

        ring.write(b"trickle");
        policy.drain(&mut ring, &link, &mut sink, later);
        assert!(!policy.keepalive_due(later));
        assert!(policy.keepalive_due(later + Duration::from_millis(250)));
    }
}
