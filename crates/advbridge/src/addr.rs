// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Address-acquisition callback types.
//!
//! The DHCP-like collaborator delivers a status plus, on success, a packed
//! byte blob holding the local address, gateway, subnet mask and two name
//! resolvers at fixed 4-byte offsets:
//!
//! ```text
//! offset:  0        4        8        12       16
//!          +--------+--------+--------+--------+--------+
//!          |   ip   |   gw   |  mask  |  dns1  |  dns2  |
//!          +--------+--------+--------+--------+--------+
//! ```
//!
//! The bridge only reacts when the delivered address differs from the one
//! currently held; the resolvers are logged and otherwise unused.

use std::fmt;

use crate::{BridgeError, Result};

/// Size of the packed lease blob.
pub const LEASE_BLOB_LEN: usize = 20;

/// IPv4 addressing obtained from the acquisition collaborator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AddrLease {
    pub ip: [u8; 4],
    pub gateway: [u8; 4],
    pub mask: [u8; 4],
    pub dns: [[u8; 4]; 2],
}

impl AddrLease {
    /// Parse a packed lease blob.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::LeaseBlobTruncated`] if the blob is shorter
    /// than [`LEASE_BLOB_LEN`].
    pub fn parse(blob: &[u8]) -> Result<Self> {
        if blob.len() < LEASE_BLOB_LEN {
            return Err(BridgeError::LeaseBlobTruncated { len: blob.len() });
        }

        let field = |off: usize| -> [u8; 4] {
            [blob[off], blob[off + 1], blob[off + 2], blob[off + 3]]
        };

        Ok(Self {
            ip: field(0),
            gateway: field(4),
            mask: field(8),
            dns: [field(12), field(16)],
        })
    }

    /// Check whether addressing changed relative to another lease.
    ///
    /// Resolver changes alone do not count; only address, gateway or mask
    /// force the listener to be rebuilt.
    pub fn addressing_differs(&self, other: &AddrLease) -> bool {
        self.ip != other.ip || self.gateway != other.gateway || self.mask != other.mask
    }
}

impl fmt::Display for AddrLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dotted = |o: &[u8; 4]| format!("{}.{}.{}.{}", o[0], o[1], o[2], o[3]);
        write!(
            f,
            "ip={} gw={} mask={}",
            dotted(&self.ip),
            dotted(&self.gateway),
            dotted(&self.mask)
        )
    }
}

/// One invocation of the acquisition callback.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AddrEvent {
    /// Acquisition succeeded with the given lease
    Acquired(AddrLease),

    /// Acquisition failed; status code from the collaborator
    Failed(u8),
}

/// Collaborator interface driving address acquisition.
///
/// The bridge asks for a (re)acquisition when the physical link comes up;
/// results arrive later via [`AddrEvent`].
pub trait AddrControl {
    /// Restart the acquisition cycle.
    fn restart_acquisition(&mut self) -> Result<()>;
}
