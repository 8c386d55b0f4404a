// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bridge configuration.
//!
//! One struct, grouped by concern, with defaults matching the reference
//! deployment: 4 KiB ring, 512-byte send unit, watermark at one send unit,
//! 250 ms idle flush, listener on port 1000.

use std::time::Duration;

use crate::{BridgeError, Result};

/// TCP keepalive probe parameters applied to the peer socket on connect.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeepaliveConfig {
    /// Enable keepalive probing
    pub enabled: bool,

    /// Idle time before the first probe
    pub idle: Duration,

    /// Interval between probes
    pub interval: Duration,

    /// Probes without an answer before the connection is declared dead
    pub retries: u32,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            idle: Duration::from_millis(20_000),
            interval: Duration::from_millis(15_000),
            retries: 9,
        }
    }
}

/// Discovery parameters handed to the scan collaborator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScanParams {
    /// Maximum scan responses per cycle (0 = unlimited)
    pub max_scan_results: u8,

    /// Scan duration in 625 us controller units
    pub duration_units: u16,

    /// Active scan (request scan responses) vs passive
    pub active: bool,

    /// Restrict discovery to the controller allow-list
    pub use_allow_list: bool,

    /// Let the controller filter duplicate reports
    pub filter_duplicates: bool,
}

impl Default for ScanParams {
    fn default() -> Self {
        Self {
            max_scan_results: 64,
            duration_units: 8000, // 5 s
            active: false,
            use_allow_list: false,
            filter_duplicates: false,
        }
    }
}

/// Top-level bridge configuration.
#[derive(Clone, Debug)]
pub struct BridgeConfig {
    // === Queue ===
    /// Ring capacity in bytes
    pub ring_capacity: usize,

    /// Largest chunk handed to the transport per send
    pub send_unit: usize,

    /// Ring fill level that triggers an eager drain
    /// (None = one send unit)
    pub watermark: Option<usize>,

    // === Drain ===
    /// Idle-flush period for the keepalive drain
    pub drain_interval: Duration,

    // === Listener ===
    /// Local TCP port the bridge listens on
    pub listen_port: u16,

    /// Pending-connection queue size
    pub listen_backlog: u32,

    // === Keep-alive ===
    pub keepalive: KeepaliveConfig,

    // === Scanning ===
    pub scan: ScanParams,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            ring_capacity: 4096,
            send_unit: 512,
            watermark: None,
            drain_interval: Duration::from_millis(250),
            listen_port: 1000,
            listen_backlog: 1,
            keepalive: KeepaliveConfig::default(),
            scan: ScanParams::default(),
        }
    }
}

impl BridgeConfig {
    /// Effective watermark in bytes.
    pub fn effective_watermark(&self) -> usize {
        self.watermark.unwrap_or(self.send_unit)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidConfig`] describing the first problem
    /// found.
    pub fn validate(&self) -> Result<()> {
        if self.ring_capacity == 0 {
            return Err(BridgeError::InvalidConfig("ring_capacity must be > 0"));
        }
        if self.send_unit == 0 {
            return Err(BridgeError::InvalidConfig("send_unit must be > 0"));
        }
        if self.send_unit > self.ring_capacity {
            return Err(BridgeError::InvalidConfig(
                "send_unit must not exceed ring_capacity",
            ));
        }
        if self.effective_watermark() > self.ring_capacity {
            return Err(BridgeError::InvalidConfig(
                "watermark must not exceed ring_capacity",
            ));
        }
        if self.drain_interval.is_zero() {
            return Err(BridgeError::InvalidConfig("drain_interval must be > 0"));
        }
        Ok(())
    }
}
