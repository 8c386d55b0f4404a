// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Transport sink abstraction over the TCP/IP stack.
//!
//! The bridge core never touches sockets directly; it talks to a
//! [`TransportSink`] that exposes the handful of primitives an embedded
//! network stack offers: create/listen, a non-blocking single-in-flight
//! send, a read-and-discard consume, close, keepalive control, and a
//! poll-on-tick notification query.
//!
//! Implementations:
//! - [`tcp::TcpSink`] - std non-blocking TCP listener + stream
//! - `mock::MockSink` - test double with write capture and error injection

pub mod tcp;

use std::fmt;

use crate::Result;

/// Opaque handle naming one socket inside a sink.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SocketHandle(pub u32);

impl fmt::Display for SocketHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sock#{}", self.0)
    }
}

/// How to tear a socket down.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseMode {
    /// Orderly shutdown, peer sees EOF
    Graceful,

    /// Immediate teardown
    Abort,
}

/// Asynchronous notification surfaced by [`TransportSink::poll`].
///
/// Mirrors the interrupt-status model of the underlying stack: per-socket
/// events carry the handle they concern, global events carry none.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    /// A peer completed the TCP handshake on our listener
    Connected(SocketHandle),

    /// The peer closed the connection
    Disconnected(SocketHandle),

    /// The connection timed out (keepalive or retransmit exhaustion)
    TimedOut(SocketHandle),

    /// Inbound data is waiting on the socket
    ReceiveReady(SocketHandle),

    /// Physical/link layer came up; address acquisition should rerun
    LinkUp,

    /// An IP destination was unreachable
    Unreachable,

    /// Another host claims our address
    AddressConflict,
}

/// Listener parameters handed to [`TransportSink::create_listener`].
#[derive(Clone, Debug)]
pub struct ListenConfig {
    /// Local TCP port to bind
    pub port: u16,

    /// Pending-connection queue size
    pub backlog: u32,
}

/// The TCP-like transport the bridge drains into.
///
/// All calls are non-blocking. `send` accepts at most one in-flight buffer
/// per handle; a busy socket reports [`BridgeError::SendBusy`] and the
/// caller retries on a later tick with the bytes still queued upstream.
///
/// [`BridgeError::SendBusy`]: crate::BridgeError::SendBusy
pub trait TransportSink {
    /// Create a listening socket. Does not start accepting yet.
    fn create_listener(&mut self, config: &ListenConfig) -> Result<SocketHandle>;

    /// Start accepting connections on a listener handle.
    fn listen(&mut self, handle: SocketHandle) -> Result<()>;

    /// Queue one buffer for transmission on a connected handle.
    fn send(&mut self, handle: SocketHandle, data: &[u8]) -> Result<()>;

    /// Read and discard up to `max` inbound bytes. Returns bytes consumed.
    fn consume(&mut self, handle: SocketHandle, max: usize) -> Result<usize>;

    /// Close a socket.
    fn close(&mut self, handle: SocketHandle, mode: CloseMode) -> Result<()>;

    /// Enable or disable keepalive probing on a connected handle.
    fn set_keepalive(&mut self, handle: SocketHandle, enabled: bool) -> Result<()>;

    /// Drain pending notifications. Called once per scheduler tick.
    fn poll(&mut self) -> Vec<TransportEvent>;

    /// Library version of the underlying stack, for the startup check.
    fn version(&self) -> u32;
}

// ============================================================================
// Test mock sink
// ============================================================================

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::VecDeque;

    /// Mock transport sink for testing.
    ///
    /// Captures sent bytes per handle, lets tests feed notification events
    /// and inject send failures, and counts close/listen/keepalive calls.
    #[derive(Debug, Default)]
    pub struct MockSink {
        /// Everything successfully sent, in order, across all handles
        sent: Vec<u8>,

        /// Individual send calls (for boundary assertions)
        send_calls: Vec<(SocketHandle, Vec<u8>)>,

        /// Events to hand out on the next polls
        events: VecDeque<TransportEvent>,

        /// Fail the next N send calls
        fail_sends: u32,

        /// Inbound bytes available for consume(), per call cap applies
        inbound: usize,

        /// Handles closed, with mode
        pub closed: Vec<(SocketHandle, CloseMode)>,

        /// Listeners created
        pub listeners: Vec<ListenConfig>,

        /// listen() calls
        pub listening: Vec<SocketHandle>,

        /// set_keepalive() calls
        pub keepalive_calls: Vec<(SocketHandle, bool)>,

        /// Version reported by the mock stack
        pub lib_version: u32,

        next_handle: u32,
    }

    impl MockSink {
        pub fn new() -> Self {
            Self {
                lib_version: crate::bridge::EXPECTED_TRANSPORT_VERSION,
                ..Self::default()
            }
        }

        /// Queue an event for the next poll.
        pub fn push_event(&mut self, ev: TransportEvent) {
            self.events.push_back(ev);
        }

        /// Make the next `n` send calls fail.
        pub fn fail_next_sends(&mut self, n: u32) {
            self.fail_sends = n;
        }

        /// Make `n` inbound bytes available to consume().
        pub fn feed_inbound(&mut self, n: usize) {
            self.inbound = n;
        }

        /// All bytes successfully sent so far.
        pub fn sent_bytes(&self) -> &[u8] {
            &self.sent
        }

        /// Individual successful send calls.
        pub fn send_calls(&self) -> &[(SocketHandle, Vec<u8>)] {
            &self.send_calls
        }
    }

    impl TransportSink for MockSink {
        fn create_listener(&mut self, config: &ListenConfig) -> Result<SocketHandle> {
            self.listeners.push(config.clone());
            let handle = SocketHandle(self.next_handle);
            self.next_handle += 1;
            Ok(handle)
        }

        fn listen(&mut self, handle: SocketHandle) -> Result<()> {
            self.listening.push(handle);
            Ok(())
        }

        fn send(&mut self, handle: SocketHandle, data: &[u8]) -> Result<()> {
            if self.fail_sends > 0 {
                self.fail_sends -= 1;
                return Err(crate::BridgeError::SendBusy);
            }
            self.sent.extend_from_slice(data);
            self.send_calls.push((handle, data.to_vec()));
            Ok(())
        }

        fn consume(&mut self, _handle: SocketHandle, max: usize) -> Result<usize> {
            let n = self.inbound.min(max);
            self.inbound -= n;
            Ok(n)
        }

        fn close(&mut self, handle: SocketHandle, mode: CloseMode) -> Result<()> {
            self.closed.push((handle, mode));
            Ok(())
        }

        fn set_keepalive(&mut self, handle: SocketHandle, enabled: bool) -> Result<()> {
            self.keepalive_calls.push((handle, enabled));
            Ok(())
        }

        fn poll(&mut self) -> Vec<TransportEvent> {
            self.events.drain(..).collect()
        }

        fn version(&self) -> u32 {
            self.lib_version
        }
    }
}
