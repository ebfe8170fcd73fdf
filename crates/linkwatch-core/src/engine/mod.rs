//! Stability engine
//!
//! The StabilityEngine is responsible for:
//! - Requesting connectivity checks for the active uplink
//! - Maintaining the consecutive-failure counters in the LinkStore
//! - Classifying the uplink as bridged, routed or tunnelled
//! - Triggering recovery actions once thresholds are crossed
//!
//! ## Architecture
//!
//! ```text
//!                      ┌──────────────────┐
//!   LinkSelection ───▶ │ StabilityEngine  │ ───▶ StabilityEvent
//!                      └──────────────────┘
//!                               │
//!     ┌──────────────────┬──────┴───────────┬──────────────────┐
//!     ▼                  ▼                  ▼                  ▼
//! ┌───────────┐   ┌─────────────┐   ┌─────────────┐   ┌──────────────┐
//! │ LinkStore │   │ Connectivity│   │  Topology   │   │ DeviceTarget │
//! │ (counters)│   │   Probe     │   │ (mode)      │   │ (recovery)   │
//! └───────────┘   └─────────────┘   └─────────────┘   └──────────────┘
//! ```
//!
//! ## Tick Flow
//!
//! 1. Skip unless the device is an extender
//! 2. No active link: clear the liveness indicator and wait
//! 3. Read the stored record for the active interface
//! 4. Probe Link, Router, NTP (and Internet while not yet connected)
//! 5. Write back every counter, classify the link, apply recovery policy

mod classifier;

pub use classifier::{LinkMode, classify_link_mode};

use crate::config::StabilityConfig;
use crate::error::Result;
use crate::selection::LinkSelection;
use crate::traits::{
    Check, CheckMask, ConnectivityProbe, Counter, DeviceTarget, LinkRecord, LinkStore, Topology,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Events emitted by the StabilityEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StabilityEvent {
    /// No active link is selected
    WaitingForLink,

    /// A check failed and its counter advanced
    CheckFailed {
        if_name: String,
        check: Check,
        counter: u32,
    },

    /// The device switched between router (limp) and bridge operation
    ModeChanged { if_name: String, mode: LinkMode },

    /// Managers were restarted after repeated router failures
    RestartTriggered { if_name: String, router_counter: u32 },

    /// The WAN DHCP lease was refreshed after repeated Internet failures
    DhcpRefreshTriggered {
        if_name: String,
        wan_bridge: String,
        internet_counter: u32,
    },

    /// The probe could not run at all
    ProbeFailed { if_name: String, error: String },
}

/// What a single tick did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// The device is not an extender; nothing was evaluated
    NotExtender,
    /// No active link; the liveness indicator was cleared
    WaitingForLink,
    /// The active interface has no record in the store
    UnknownInterface,
    /// The store could not be read
    StoreUnavailable,
    /// The probe failed as a whole; no counters were touched
    ProbeFailed,
    /// The checks were evaluated
    Evaluated(TickSummary),
}

/// Counters and actions of an evaluated tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickSummary {
    /// Checks requested from the probe
    pub mask: CheckMask,
    /// New link counter, if the link check was reported
    pub link_counter: Option<u32>,
    /// New router counter, if the router check was reported
    pub router_counter: Option<u32>,
    /// New Internet counter, if the Internet check was reported
    pub internet_counter: Option<u32>,
    /// Link mode, if the router check ran
    pub mode: Option<LinkMode>,
    /// Whether managers were restarted
    pub restart_triggered: bool,
    /// Whether the WAN DHCP lease was refreshed
    pub dhcp_refreshed: bool,
}

impl TickSummary {
    fn new(mask: CheckMask) -> Self {
        Self {
            mask,
            link_counter: None,
            router_counter: None,
            internet_counter: None,
            mode: None,
            restart_triggered: false,
            dhcp_refreshed: false,
        }
    }
}

/// Counter update rule: 0 on success, stored + 1 on failure
pub fn next_counter(stored: u32, passed: bool) -> u32 {
    if passed { 0 } else { stored.saturating_add(1) }
}

/// Core stability engine
///
/// The engine evaluates one tick at a time against a [`LinkSelection`]
/// borrowed mutably from its owner. It keeps no state of its own between
/// ticks: counters live in the [`LinkStore`] and the limp flag lives in
/// the selection.
///
/// ## Threading
///
/// A tick runs to completion, including every external call, before the
/// next one starts. The owner (normally the [`Supervisor`](crate::Supervisor))
/// guarantees this by awaiting `evaluate_tick` on a single task.
pub struct StabilityEngine {
    /// Connectivity probe for the active uplink
    probe: Box<dyn ConnectivityProbe>,

    /// Per-interface counters
    store: Box<dyn LinkStore>,

    /// Port lookup for bridge detection
    topology: Box<dyn Topology>,

    /// Role and recovery actions
    target: Arc<dyn DeviceTarget>,

    /// Router failures tolerated before restarting managers
    router_threshold: u32,

    /// Internet failures between DHCP refreshes
    internet_threshold: u32,

    /// Port whose presence means "bridged"
    bridge_port_name: String,

    /// Interface whose DHCP lease is refreshed
    wan_bridge: String,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<StabilityEvent>,
}

impl StabilityEngine {
    /// Create a new stability engine
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields stability events
    pub fn new(
        probe: Box<dyn ConnectivityProbe>,
        store: Box<dyn LinkStore>,
        topology: Box<dyn Topology>,
        target: Arc<dyn DeviceTarget>,
        config: StabilityConfig,
    ) -> Result<(Self, mpsc::Receiver<StabilityEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.event_channel_capacity);

        let engine = Self {
            probe,
            store,
            topology,
            target,
            router_threshold: config.router_threshold,
            internet_threshold: config.internet_threshold,
            bridge_port_name: config.bridge_port_name,
            wan_bridge: config.wan_bridge,
            event_tx: tx,
        };

        Ok((engine, rx))
    }

    /// Evaluate one stability tick
    ///
    /// Failures of collaborators are logged and never abort the process;
    /// the next scheduled tick is the retry.
    pub async fn evaluate_tick(&self, selection: &mut LinkSelection) -> TickOutcome {
        if !self.target.is_extender() {
            return TickOutcome::NotExtender;
        }

        if !selection.is_used {
            info!("Waiting for new active link");
            self.target.clear_liveness_indicator().await;
            self.emit_event(StabilityEvent::WaitingForLink);
            return TickOutcome::WaitingForLink;
        }

        let Some(if_name) = selection.if_name.clone() else {
            warn!("Active link is marked used but has no interface name");
            return TickOutcome::UnknownInterface;
        };

        let record = match self.store.get_record(&if_name).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                warn!("{} interface does not exist", if_name);
                return TickOutcome::UnknownInterface;
            }
            Err(e) => {
                warn!("Failed to read link record for {}: {}", if_name, e);
                return TickOutcome::StoreUnavailable;
            }
        };

        let mask = CheckMask::for_tick(selection.is_connected);
        let report = match self.probe.check(&if_name, mask).await {
            Ok(report) => report,
            Err(e) => {
                warn!(
                    "Connectivity check failed for {}, skipping counter updates: {}",
                    if_name, e
                );
                self.emit_event(StabilityEvent::ProbeFailed {
                    if_name,
                    error: e.to_string(),
                });
                return TickOutcome::ProbeFailed;
            }
        };
        info!(
            "Connection status {:?}, main link: {} opts: = {:#x}",
            report,
            if_name,
            mask.bits()
        );

        let mut summary = TickSummary::new(mask);

        for check in mask.iter() {
            let Some(passed) = report.get(check) else {
                debug!("Probe did not report {} check for {}", check, if_name);
                continue;
            };

            match check {
                Check::Link => {
                    let counter = self.advance_counter(
                        &if_name,
                        check,
                        record.unreachable_link_counter,
                        passed,
                    );
                    self.persist_counter(&if_name, Counter::Link, counter).await;
                    summary.link_counter = Some(counter);
                }
                Check::Router => {
                    let counter = self.advance_counter(
                        &if_name,
                        check,
                        record.unreachable_router_counter,
                        passed,
                    );
                    self.persist_counter(&if_name, Counter::Router, counter).await;
                    summary.router_counter = Some(counter);

                    let mode = self.classify_link_mode(selection).await;
                    self.apply_link_mode(&if_name, selection, mode);
                    summary.mode = Some(mode);

                    summary.restart_triggered =
                        self.maybe_restart_managers(&if_name, selection, &record).await;
                }
                Check::Internet => {
                    let counter = self.advance_counter(
                        &if_name,
                        check,
                        record.unreachable_internet_counter,
                        passed,
                    );
                    if !passed {
                        summary.dhcp_refreshed = self.maybe_refresh_dhcp(&if_name, counter).await;
                    }
                    self.persist_counter(&if_name, Counter::Internet, counter).await;
                    summary.internet_counter = Some(counter);
                }
                Check::Ntp => {
                    if let Err(e) = self.store.update_ntp_state(&if_name, passed).await {
                        warn!("Failed to update ntp state for {}: {}", if_name, e);
                    }
                }
            }
        }

        if let Err(e) = self.store.flush().await {
            warn!("Failed to flush link store: {}", e);
        }

        TickOutcome::Evaluated(summary)
    }

    /// Classify the active link using the configured bridge port
    pub async fn classify_link_mode(&self, selection: &LinkSelection) -> LinkMode {
        classify_link_mode(selection, self.topology.as_ref(), &self.bridge_port_name).await
    }

    /// Persist any pending store changes
    pub async fn flush(&self) -> Result<()> {
        self.store.flush().await
    }

    /// Compute the new counter value for a reported check
    fn advance_counter(&self, if_name: &str, check: Check, stored: u32, passed: bool) -> u32 {
        let counter = next_counter(stored, passed);
        if !passed {
            warn!("Detected broken {} on {}. Counter = {}", check, if_name, counter);
            self.emit_event(StabilityEvent::CheckFailed {
                if_name: if_name.to_string(),
                check,
                counter,
            });
        }
        counter
    }

    /// Write a counter back; a failed write is logged and does not stop the tick
    async fn persist_counter(&self, if_name: &str, counter: Counter, value: u32) {
        if let Err(e) = self.store.update_counter(if_name, counter, value).await {
            warn!("Failed to update {} for {}: {}", counter, if_name, e);
        }
    }

    /// Track router/bridge transitions in the limp flag
    ///
    /// Tunnel and undefined modes leave the flag as it is.
    fn apply_link_mode(&self, if_name: &str, selection: &mut LinkSelection, mode: LinkMode) {
        match mode {
            LinkMode::EthernetRouter => {
                if !selection.is_limp_state {
                    info!("Device operates in Router mode");
                    self.emit_event(StabilityEvent::ModeChanged {
                        if_name: if_name.to_string(),
                        mode,
                    });
                }
                selection.is_limp_state = true;
            }
            LinkMode::EthernetBridge => {
                if selection.is_limp_state {
                    info!("Device operates in Bridge mode");
                    self.emit_event(StabilityEvent::ModeChanged {
                        if_name: if_name.to_string(),
                        mode,
                    });
                }
                selection.is_limp_state = false;
            }
            LinkMode::Tunnel | LinkMode::Undefined => {}
        }
    }

    /// Restart managers when not in limp state and the router counter
    /// stored before this tick, plus one, exceeds the threshold.
    ///
    /// This tick's router result is not part of the comparison.
    async fn maybe_restart_managers(
        &self,
        if_name: &str,
        selection: &LinkSelection,
        record: &LinkRecord,
    ) -> bool {
        let projected = record.unreachable_router_counter.saturating_add(1);
        if selection.is_limp_state || projected <= self.router_threshold {
            return false;
        }

        warn!("Restart managers due to exceeding the threshold router failures");
        self.emit_event(StabilityEvent::RestartTriggered {
            if_name: if_name.to_string(),
            router_counter: record.unreachable_router_counter,
        });
        self.target.restart_managers().await;
        true
    }

    /// Refresh the WAN lease on every positive multiple of the Internet threshold
    async fn maybe_refresh_dhcp(&self, if_name: &str, counter: u32) -> bool {
        if counter == 0 || counter % self.internet_threshold != 0 {
            return false;
        }

        info!(
            "Refresh {} interface due to Internet issue (counter = {})",
            self.wan_bridge, counter
        );
        self.emit_event(StabilityEvent::DhcpRefreshTriggered {
            if_name: if_name.to_string(),
            wan_bridge: self.wan_bridge.clone(),
            internet_counter: counter,
        });
        self.target.refresh_dhcp(&self.wan_bridge).await;
        true
    }

    /// Emit a stability event
    fn emit_event(&self, event: StabilityEvent) {
        // A slow consumer must never stall a tick; drop instead
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Stability event channel full, dropping event");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("No stability event listener, dropping event");
            }
        }
    }
}
