// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Connection state machine for the single TCP peer.
//!
//! Exactly one data connection is active at a time (single-listener,
//! single-peer model). The machine is driven purely by transport
//! notifications; draining and record acceptance are only legal while
//! `Connected`.
//!
//! # State Machine
//!
//! ```text
//!      +--------------+
//!      | Disconnected |<---------------------+
//!      +------+-------+                      |
//!             | connect(handle)              | disconnect(handle)
//!             v                              | timeout(handle)
//!      +--------------+                      |
//!      |  Connected   |----------------------+
//!      |  (handle)    |--connect(other)--> Connected(other)  [replacement]
//!      +--------------+
//! ```
//!
//! Notifications carrying a handle other than the active one are ignored;
//! the transport layer can deliver stale or duplicate interrupts after a
//! peer churns.

use std::time::Instant;

use crate::transport::SocketHandle;

/// Connection state of the bridge's data socket.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LinkState {
    /// No peer attached; records are dropped and drains are no-ops
    #[default]
    Disconnected,

    /// A peer is attached on the given transport handle
    Connected(SocketHandle),
}

impl LinkState {
    /// Check whether draining and record acceptance are permitted.
    pub fn is_connected(&self) -> bool {
        matches!(self, LinkState::Connected(_))
    }
}

impl std::fmt::Display for LinkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkState::Disconnected => write!(f, "Disconnected"),
            LinkState::Connected(h) => write!(f, "Connected({h})"),
        }
    }
}

/// Outcome of feeding a transport notification into the machine.
///
/// The caller applies side effects (ring flush, keepalive enable) based on
/// the transition, keeping the machine itself free of I/O.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkTransition {
    /// Disconnected -> Connected
    Established,

    /// Connected(old) -> Connected(new); not expected in the single-peer
    /// model, surfaced so callers can log it
    Replaced { old: SocketHandle },

    /// Connected -> Disconnected
    Closed,

    /// Notification did not apply (stale handle or redundant event)
    Ignored,
}

/// Single active connection slot plus connect timestamp.
#[derive(Debug, Default)]
pub struct Link {
    state: LinkState,
    connected_at: Option<Instant>,
}

impl Link {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Check whether a peer is attached.
    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    /// Handle of the active connection, if any.
    pub fn active_handle(&self) -> Option<SocketHandle> {
        match self.state {
            LinkState::Connected(h) => Some(h),
            LinkState::Disconnected => None,
        }
    }

    /// Instant the current connection was established.
    pub fn connected_at(&self) -> Option<Instant> {
        self.connected_at
    }

    /// Apply a connect notification.
    pub fn on_connect(&mut self, handle: SocketHandle, now: Instant) -> LinkTransition {
        match self.state {
            LinkState::Disconnected => {
                self.state = LinkState::Connected(handle);
                self.connected_at = Some(now);
                LinkTransition::Established
            }
            LinkState::Connected(old) if old == handle => LinkTransition::Ignored,
            LinkState::Connected(old) => {
                log::error!("connect notification for {handle} while {old} active, replacing");
                self.state = LinkState::Connected(handle);
                self.connected_at = Some(now);
                LinkTransition::Replaced { old }
            }
        }
    }

    /// Apply a disconnect or timeout notification.
    pub fn on_disconnect(&mut self, handle: SocketHandle) -> LinkTransition {
        match self.state {
            LinkState::Connected(active) if active == handle => {
                self.state = LinkState::Disconnected;
                self.connected_at = None;
                LinkTransition::Closed
            }
            _ => LinkTransition::Ignored,
        }
    }
}
