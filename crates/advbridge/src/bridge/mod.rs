// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Event-driven bridge core.
//!
//! [`Bridge`] owns the byte ring, link state, drain policy and scheduler,
//! and wires them to a [`TransportSink`] plus the optional scan and address
//! collaborators. Everything runs on one thread in run-to-completion style:
//! the embedder feeds scan and address events as they arrive and calls
//! [`Bridge::poll`] on a timer tick, which services transport notifications
//! and then dispatches the pending event set.
//!
//! ```text
//!   ScanEvent::Report ---> RecordCodec ---> ByteRing
//!                                              |
//!                              watermark crossed: post DataReady
//!                                              |
//!   poll(now) -- transport events --> Link  DrainPolicy --> sink.send
//!             \- keepalive due: post DataReady
//! ```
//!
//! Data only accumulates while a peer is connected; reports observed with
//! the link down are dropped at the gate, and whatever is left over from a
//! previous peer is flushed when a new one connects.

use std::time::Instant;

use crate::addr::{AddrControl, AddrEvent, AddrLease};
use crate::config::BridgeConfig;
use crate::drain::{DrainOutcome, DrainPolicy};
use crate::link::{Link, LinkTransition};
use crate::ring::ByteRing;
use crate::scan::{AdvReport, DisplayAddr, RecordCodec, ScanControl, ScanEvent};
use crate::sched::{Event, Scheduler, TaskId};
use crate::transport::{CloseMode, ListenConfig, SocketHandle, TransportEvent, TransportSink};
use crate::Result;


/// Transport interface version this bridge was written against.
///
/// A mismatch at startup is logged as an error but never fatal; minor
/// stack revisions keep the call surface compatible.
pub const EXPECTED_TRANSPORT_VERSION: u32 = 1;

/// Cap on inbound bytes discarded per tick.
const INBOUND_DISCARD_MAX: usize = 4096;

/// Bridge context tying scanner, buffer, drain policy and transport together.
pub struct Bridge<S: TransportSink> {
    cfg: BridgeConfig,
    ring: ByteRing,
    link: Link,
    drain: DrainPolicy,
    sched: Scheduler,
    task: TaskId,
    sink: S,

    /// Listener handle, live while an address is held (or from `start()`
    /// when no address collaborator is attached).
    listener: Option<SocketHandle>,

    /// Address lease currently adopted
    lease: Option<AddrLease>,

    scanner: Option<Box<dyn ScanControl>>,
    addr_ctl: Option<Box<dyn AddrControl>>,

    /// Encode scratch, reused across reports
    scratch: Vec<u8>,
}

impl<S: TransportSink> Bridge<S> {
    /// Create a bridge over `sink` with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns [`crate::BridgeError::InvalidConfig`] when the configuration
    /// fails validation.
    pub fn new(cfg: BridgeConfig, sink: S) -> Result<Self> {
        Self::new_at(cfg, sink, Instant::now())
    }

    /// Like [`Bridge::new`] with an explicit clock origin for the drain
    /// timers.
    pub fn new_at(cfg: BridgeConfig, sink: S, now: Instant) -> Result<Self> {
        cfg.validate()?;

        let version = sink.version();
        if version != EXPECTED_TRANSPORT_VERSION {
            log::error!(
                "transport version {version} differs from expected \
                 {EXPECTED_TRANSPORT_VERSION}, continuing anyway"
            );
        }

        let mut sched = Scheduler::new();
        let task = sched.register();
        let drain = DrainPolicy::new(
            cfg.send_unit,
            cfg.effective_watermark(),
            cfg.drain_interval,
            now,
        );

        Ok(Self {
            ring: ByteRing::with_capacity(cfg.ring_capacity),
            link: Link::new(),
            drain,
            sched,
            task,
            sink,
            listener: None,
            lease: None,
            scanner: None,
            addr_ctl: None,
            scratch: Vec::new(),
            cfg,
        })
    }

    /// Attach the scanner collaborator, kicked on init-done and at the end
    /// of every discovery cycle.
    pub fn set_scan_control(&mut self, ctl: Box<dyn ScanControl>) {
        self.scanner = Some(ctl);
    }

    /// Attach the address collaborator, asked to (re)acquire a lease at
    /// startup and whenever the physical link comes back up.
    pub fn set_addr_control(&mut self, ctl: Box<dyn AddrControl>) {
        self.addr_ctl = Some(ctl);
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.cfg
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Begin operation.
    ///
    /// Posts the startup event and either requests an address lease (when
    /// an address collaborator is attached) or opens the listener directly
    /// on the pre-addressed host path.
    pub fn start(&mut self) -> Result<()> {
        self.sched.post(self.task, Event::StartDevice);
        if let Some(ctl) = self.addr_ctl.as_mut() {
            ctl.restart_acquisition()
        } else {
            self.open_listener()
        }
    }

    // ========================================================================
    // Scan path
    // ========================================================================

    /// Feed a scanner notification.
    ///
    /// # Errors
    ///
    /// Returns [`crate::BridgeError::UnsupportedReport`] for report kinds
    /// with no wire representation.
    pub fn on_scan_event(&mut self, ev: ScanEvent) -> Result<()> {
        match ev {
            ScanEvent::DeviceInitDone => {
                log::info!("observer initialized");
                self.kick_discovery();
                Ok(())
            }
            ScanEvent::DiscoveryComplete => {
                log::debug!("discovery cycle complete, restarting");
                self.kick_discovery();
                Ok(())
            }
            ScanEvent::Report(report) => self.on_report(report),
        }
    }

    fn kick_discovery(&mut self) {
        if let Some(ctl) = self.scanner.as_mut() {
            if let Err(e) = ctl.start_discovery(&self.cfg.scan) {
                log::error!("discovery start failed: {e}");
            }
        }
    }

    fn on_report(&mut self, report: AdvReport) -> Result<()> {
        if let AdvReport::Directed { addr, .. } = &report {
            log::debug!("directed advertisement from {}", DisplayAddr(addr));
        }

        if !self.link.is_connected() {
            log::debug!("no peer connected, dropping report");
            return Ok(());
        }

        self.scratch.clear();
        RecordCodec::encode_into(&report, &mut self.scratch)?;

        // Whole records only; a partial write would desync the peer's
        // framing for the rest of the connection.
        if self.ring.free() < self.scratch.len() {
            log::warn!(
                "ring full ({} of {} bytes), dropping {}-byte record",
                self.ring.len(),
                self.ring.capacity(),
                self.scratch.len()
            );
            return Ok(());
        }

        let before = self.ring.len();
        self.ring.write(&self.scratch);
        if self.drain.watermark_crossed(before, self.ring.len()) {
            self.sched.post(self.task, Event::DataReady);
        }
        Ok(())
    }

    // ========================================================================
    // Address path
    // ========================================================================

    /// Feed an address-acquisition notification.
    pub fn on_address_event(&mut self, ev: AddrEvent) -> Result<()> {
        match ev {
            AddrEvent::Acquired(lease) => {
                if let Some(held) = &self.lease {
                    if !held.addressing_differs(&lease) {
                        log::debug!("address lease renewed unchanged ({lease})");
                        return Ok(());
                    }
                    log::info!("addressing changed ({held} -> {lease}), recreating listener");
                } else {
                    log::info!("address acquired: {lease}");
                }
                self.lease = Some(lease);
                self.open_listener()
            }
            AddrEvent::Failed(code) => {
                log::error!("address acquisition failed (code {code:#04x})");
                if self.lease.take().is_some() {
                    self.close_listener();
                }
                Ok(())
            }
        }
    }

    fn open_listener(&mut self) -> Result<()> {
        self.close_listener();
        let config = ListenConfig {
            port: self.cfg.listen_port,
            backlog: self.cfg.listen_backlog,
        };
        let handle = self.sink.create_listener(&config)?;
        self.sink.listen(handle)?;
        log::info!("listening on port {} as {handle}", config.port);
        self.listener = Some(handle);
        Ok(())
    }

    fn close_listener(&mut self) {
        if let Some(handle) = self.listener.take() {
            if let Err(e) = self.sink.close(handle, CloseMode::Graceful) {
                log::warn!("listener {handle} close failed: {e}");
            }
        }
    }

    // ========================================================================
    // Tick
    // ========================================================================

    /// Service transport notifications and dispatch pending events.
    ///
    /// Called on every tick of the embedder's loop with the current time.
    /// Returns whether work is still pending (a deferred send, an unhandled
    /// event class) so the embedder can re-tick promptly instead of
    /// sleeping the full interval.
    pub fn poll(&mut self, now: Instant) -> Result<bool> {
        for ev in self.sink.poll() {
            match ev {
                TransportEvent::Connected(handle) => self.handle_connect(handle, now),
                TransportEvent::Disconnected(handle) => {
                    if self.link.on_disconnect(handle) == LinkTransition::Closed {
                        log::info!("peer {handle} disconnected");
                    }
                }
                TransportEvent::TimedOut(handle) => {
                    if self.link.on_disconnect(handle) == LinkTransition::Closed {
                        log::warn!("peer {handle} timed out");
                    }
                }
                TransportEvent::ReceiveReady(_) => {
                    self.sched.post(self.task, Event::MessageReceived);
                }
                TransportEvent::LinkUp => {
                    log::info!("physical link up, requesting address");
                    if let Some(ctl) = self.addr_ctl.as_mut() {
                        if let Err(e) = ctl.restart_acquisition() {
                            log::error!("address re-acquisition failed: {e}");
                        }
                    }
                }
                TransportEvent::Unreachable => log::warn!("destination unreachable"),
                TransportEvent::AddressConflict => log::error!("address conflict on the network"),
            }
        }

        // Keepalive cadence: an idle connected link forces a drain attempt.
        if self.link.is_connected() && self.drain.keepalive_due(now) {
            self.sched.post(self.task, Event::DataReady);
        }

        self.dispatch(now);
        Ok(self.sched.has_pending())
    }

    fn handle_connect(&mut self, handle: SocketHandle, now: Instant) {
        match self.link.on_connect(handle, now) {
            LinkTransition::Established => {
                log::info!("peer {handle} connected");
                self.adopt_peer(handle);
            }
            LinkTransition::Replaced { old } => {
                if let Err(e) = self.sink.close(old, CloseMode::Abort) {
                    log::warn!("closing replaced peer {old} failed: {e}");
                }
                self.adopt_peer(handle);
            }
            _ => {}
        }
    }

    /// Fresh peer: stale backlog from the previous session is flushed and
    /// keepalive probing enabled before any record reaches the socket.
    fn adopt_peer(&mut self, handle: SocketHandle) {
        self.ring.clear();
        if self.cfg.keepalive.enabled {
            if let Err(e) = self.sink.set_keepalive(handle, true) {
                log::warn!("enabling keepalive on {handle} failed: {e}");
            }
        }
    }

    /// Drain one task's pending set to completion. Unhandled bits are
    /// requeued for the next tick.
    fn dispatch(&mut self, now: Instant) {
        let mut pending = self.sched.take(self.task);

        if pending.take(Event::StartDevice) {
            let scan = &self.cfg.scan;
            log::info!(
                "bridge started (scan: {} results max, {} units, active={})",
                scan.max_scan_results,
                scan.duration_units,
                scan.active
            );
        }

        if pending.take(Event::MessageReceived) {
            if let Some(handle) = self.link.active_handle() {
                match self.sink.consume(handle, INBOUND_DISCARD_MAX) {
                    Ok(n) if n > 0 => log::debug!("discarded {n} inbound bytes from {handle}"),
                    Ok(_) => {}
                    Err(e) => log::warn!("inbound consume on {handle} failed: {e}"),
                }
            }
        }

        if pending.take(Event::DataReady) {
            match self.drain.drain(&mut self.ring, &self.link, &mut self.sink, now) {
                DrainOutcome::Sent(_) => {
                    // More than one unit queued: keep going next tick.
                    if self.ring.len() >= self.drain.watermark() {
                        self.sched.post(self.task, Event::DataReady);
                    }
                }
                DrainOutcome::Deferred => {
                    // Transport busy or failing; data stays queued, retry.
                    self.sched.post(self.task, Event::DataReady);
                }
                DrainOutcome::Idle | DrainOutcome::NotConnected => {}
            }
        }

        if !pending.is_empty() {
            self.sched.requeue(self.task, pending);
        }
    }
}
