// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # advbridge - BLE advertisement to TCP bridge
//!
//! Relays BLE advertisement reports to a single TCP peer as framed binary
//! records. An observer-role scanner feeds reports in, each is framed with a
//! fixed 10-byte header, buffered in a bounded byte ring, and drained to the
//! connected peer in batches.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use advbridge::{Bridge, BridgeConfig, Result, TcpSink};
//! use std::time::Instant;
//!
//! fn main() -> Result<()> {
//!     let cfg = BridgeConfig::default();
//!     let sink = TcpSink::new(cfg.keepalive.clone());
//!     let mut bridge = Bridge::new(cfg, sink)?;
//!     bridge.start()?;
//!
//!     loop {
//!         let busy = bridge.poll(Instant::now())?;
//!         if !busy {
//!             std::thread::sleep(std::time::Duration::from_millis(10));
//!         }
//!     }
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------+
//! |                        Scan Source                           |
//! |        AdvReport (legacy / extended / directed / ...)        |
//! +--------------------------------------------------------------+
//! |                        Bridge Core                           |
//! |   RecordCodec -> ByteRing -> DrainPolicy -> Link state       |
//! +--------------------------------------------------------------+
//! |                      Transport Layer                         |
//! |   TransportSink trait | TcpSink (listener + single peer)     |
//! +--------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Bridge`] | Ties scanner, buffer, drain policy and transport together |
//! | [`BridgeConfig`] | Buffer sizes, drain cadence, listener and scan tuning |
//! | [`ByteRing`] | Bounded circular byte buffer between scan and drain |
//! | [`RecordCodec`] | Frames an [`AdvReport`] into the wire record format |
//! | [`TransportSink`] | Seam between the bridge core and the TCP stack |
//!
//! ## Modules Overview
//!
//! - [`bridge`] - Event-driven core, start here
//! - [`ring`] - Bounded circular byte buffer
//! - [`scan`] - Advertisement report model and wire framing
//! - [`drain`] - Watermark and keepalive-interval drain policy
//! - [`transport`] - Transport sink trait and the TCP implementation
//! - [`addr`] - Address lease handling for the bootstrap phase
//! - [`sched`] - Cooperative run-to-completion event scheduler

use std::fmt;
use std::io;

pub mod addr;
pub mod bridge;
pub mod config;
pub mod drain;
pub mod link;
pub mod ring;
pub mod scan;
pub mod sched;
pub mod transport;

pub use addr::{AddrControl, AddrEvent, AddrLease};
pub use bridge::Bridge;
pub use config::{BridgeConfig, KeepaliveConfig, ScanParams};
pub use drain::{DrainOutcome, DrainPolicy};
pub use link::{Link, LinkState, LinkTransition};
pub use ring::ByteRing;
pub use scan::{AdvReport, RecordCodec, ScanControl, ScanEvent};
pub use transport::tcp::TcpSink;
pub use transport::{CloseMode, ListenConfig, SocketHandle, TransportEvent, TransportSink};

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Errors produced by the bridge and its transport layer.
#[derive(Debug)]
pub enum BridgeError {
    /// Transport socket I/O failed
    Io(io::Error),

    /// Listener socket creation or bind failed
    SocketCreate(io::Error),

    /// A send is already in flight on the transport
    SendBusy,

    /// Operation requires a connected peer
    NotConnected,

    /// Handle does not name a live socket
    UnknownHandle(SocketHandle),

    /// Report kind has no wire record representation
    UnsupportedReport(&'static str),

    /// Address lease blob shorter than the fixed layout
    LeaseBlobTruncated { len: usize },

    /// Configuration failed validation
    InvalidConfig(&'static str),
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "Socket I/O failed: {e}"),
            Self::SocketCreate(e) => write!(f, "Listener creation failed: {e}"),
            Self::SendBusy => write!(f, "Send already in flight"),
            Self::NotConnected => write!(f, "No connected peer"),
            Self::UnknownHandle(h) => write!(f, "Unknown socket handle {h}"),
            Self::UnsupportedReport(kind) => {
                write!(f, "Report kind has no wire representation: {kind}")
            }
            Self::LeaseBlobTruncated { len } => {
                write!(f, "Address lease blob truncated: {len} bytes")
            }
            Self::InvalidConfig(reason) => write!(f, "Invalid configuration: {reason}"),
        }
    }
}

impl std::error::Error for BridgeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) | Self::SocketCreate(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for BridgeError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}
