// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Advertisement report types and record framing.
//!
//! Each scan observation is packed into a fixed header plus a variable
//! payload before it enters the byte ring:
//!
//! ```text
//! +---------+-----------------------+---------------------------+------+--------+-----------+
//! | len (1) | event | addrtype << 4 | pri_phy | sec_phy << 4 (1) | rssi | addr 6 | payload.. |
//! +---------+-----------------------+---------------------------+------+--------+-----------+
//! ```
//!
//! - **len**: payload length only, header excluded (0..=255)
//! - **rssi**: signed dBm, two's complement
//! - **addr**: 6-byte device address as reported by the controller
//!
//! Legacy, scan-response and directed reports carry no PHY information from
//! the controller; their PHY byte is fixed to 1M on both halves. Directed
//! reports never carry a payload.

use std::fmt;

use crate::config::ScanParams;
use crate::{BridgeError, Result};

/// Record header size in bytes.
pub const RECORD_HEADER_SIZE: usize = 10;

/// Maximum payload carried by one record.
pub const MAX_RECORD_PAYLOAD: usize = 255;

/// 1M PHY bit, used when the controller reports no PHY.
pub const PHY_1M: u8 = 0x01;

/// 2M PHY bit.
pub const PHY_2M: u8 = 0x02;

/// Coded PHY bit.
pub const PHY_CODED: u8 = 0x04;

/// Device address length.
pub const ADDR_LEN: usize = 6;

/// One advertisement observation from the scan stack.
///
/// Variants map one-to-one to the controller report kinds. `Periodic`
/// reports exist on air but are not forwarded; encoding one is an error
/// rather than a silent drop so the caller sees the gap.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AdvReport {
    /// Legacy advertisement (connectable/scannable/non-connectable)
    Legacy {
        event_type: u8,
        addr_type: u8,
        rssi: i8,
        addr: [u8; ADDR_LEN],
        data: Vec<u8>,
    },

    /// Extended advertisement with explicit primary/secondary PHY
    Extended {
        event_type: u8,
        addr_type: u8,
        primary_phy: u8,
        secondary_phy: u8,
        rssi: i8,
        addr: [u8; ADDR_LEN],
        data: Vec<u8>,
    },

    /// Directed advertisement; header-only on the wire
    Directed {
        event_type: u8,
        addr_type: u8,
        rssi: i8,
        addr: [u8; ADDR_LEN],
    },

    /// Scan response payload for an active scan
    ScanResponse {
        addr_type: u8,
        rssi: i8,
        addr: [u8; ADDR_LEN],
        data: Vec<u8>,
    },

    /// Periodic advertising report, not forwarded
    Periodic,
}

impl AdvReport {
    /// Device address of the reporting peer, if the variant carries one.
    pub fn addr(&self) -> Option<&[u8; ADDR_LEN]> {
        match self {
            AdvReport::Legacy { addr, .. }
            | AdvReport::Extended { addr, .. }
            | AdvReport::Directed { addr, .. }
            | AdvReport::ScanResponse { addr, .. } => Some(addr),
            AdvReport::Periodic => None,
        }
    }

    /// Total framed size of this record (header + truncated payload).
    pub fn framed_len(&self) -> usize {
        let payload = match self {
            AdvReport::Legacy { data, .. }
            | AdvReport::Extended { data, .. }
            | AdvReport::ScanResponse { data, .. } => data.len().min(MAX_RECORD_PAYLOAD),
            AdvReport::Directed { .. } | AdvReport::Periodic => 0,
        };
        RECORD_HEADER_SIZE + payload
    }
}

/// Event delivered by the scan stack's single callback.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScanEvent {
    /// Controller finished initializing; discovery may start
    DeviceInitDone,

    /// One discovery cycle finished; restart to keep observing
    DiscoveryComplete,

    /// An advertisement record to forward
    Report(AdvReport),
}

/// Event-type opcode for scan responses (fixed by the controller).
const SCAN_RSP_EVENT_TYPE: u8 = 0x04;

/// Framing codec for advertisement records.
///
/// Stateless; framing happens in one shot since a record is always fully
/// available when the scan callback fires.
pub struct RecordCodec;

impl RecordCodec {
    /// Frame a report into a fresh buffer.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::UnsupportedReport`] for `Periodic` reports.
    pub fn encode(report: &AdvReport) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(report.framed_len());
        Self::encode_into(report, &mut buf)?;
        Ok(buf)
    }

    /// Frame a report, appending to an existing buffer.
    ///
    /// Payloads longer than [`MAX_RECORD_PAYLOAD`] are truncated; the header
    /// length byte always matches the bytes actually appended.
    pub fn encode_into(report: &AdvReport, buf: &mut Vec<u8>) -> Result<()> {
        let (event_type, addr_type, phy_byte, rssi, addr, data): (
            u8,
            u8,
            u8,
            i8,
            &[u8; ADDR_LEN],
            &[u8],
        ) = match report {
            AdvReport::Legacy {
                event_type,
                addr_type,
                rssi,
                addr,
                data,
            } => (
                *event_type,
                *addr_type,
                PHY_1M | (PHY_1M << 4),
                *rssi,
                addr,
                data,
            ),
            AdvReport::Extended {
                event_type,
                addr_type,
                primary_phy,
                secondary_phy,
                rssi,
                addr,
                data,
            } => (
                *event_type,
                *addr_type,
                primary_phy | (secondary_phy << 4),
                *rssi,
                addr,
                data,
            ),
            AdvReport::Directed {
                event_type,
                addr_type,
                rssi,
                addr,
            } => (
                *event_type,
                *addr_type,
                PHY_1M | (PHY_1M << 4),
                *rssi,
                addr,
                &[],
            ),
            AdvReport::ScanResponse {
                addr_type,
                rssi,
                addr,
                data,
            } => (
                SCAN_RSP_EVENT_TYPE,
                *addr_type,
                PHY_1M | (PHY_1M << 4),
                *rssi,
                addr,
                data,
            ),
            AdvReport::Periodic => return Err(BridgeError::UnsupportedReport("periodic")),
        };

        let payload = &data[..data.len().min(MAX_RECORD_PAYLOAD)];
        buf.push(payload.len() as u8);
        buf.push(event_type | (addr_type << 4));
        buf.push(phy_byte);
        buf.push(rssi as u8);
        buf.extend_from_slice(addr);
        buf.extend_from_slice(payload);
        Ok(())
    }
}

/// Collaborator interface into the scan stack.
///
/// The bridge drives discovery restarts through this trait; the BLE stack
/// itself lives outside the crate. The configured parameter block rides
/// along on every (re)start so the stack can apply max-results, duration
/// and filtering before the cycle begins.
pub trait ScanControl {
    /// Start (or restart) a discovery cycle with the given parameters.
    fn start_discovery(&mut self, params: &ScanParams) -> Result<()>;
}

/// Display adapter printing a device address most-significant-byte first.
///
/// Addresses arrive in on-air (little-endian) byte order; the conventional
/// human-readable form reverses them.
pub struct DisplayAddr<'a>(pub &'a [u8; ADDR_LEN]);

impl fmt::Display for DisplayAddr<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, b) in self.0.iter().rev().enumerate() {
            if i > 0 {
                write!(f, ":")?;
            }
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}
