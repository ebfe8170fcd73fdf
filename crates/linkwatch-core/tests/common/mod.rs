//! Test doubles and common utilities for the stability contract tests
//!
//! Every double is cheap to clone and clones share their counters, so a
//! test can hand one clone to the engine and keep another for assertions.

#![allow(dead_code)]

use linkwatch_core::config::StabilityConfig;
use linkwatch_core::error::{Error, Result};
use linkwatch_core::state::MemoryLinkStore;
use linkwatch_core::traits::{
    CheckMask, ConnectivityProbe, Counter, DeviceTarget, LinkRecord, LinkStore, ProbeReport,
    Topology,
};
use linkwatch_core::{StabilityEngine, StabilityEvent};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Interface name used throughout the contract tests
pub const UPLINK: &str = "eth0";

/// A report where every check has the given result
pub fn report(link: bool, router: bool, internet: bool, ntp: bool) -> ProbeReport {
    ProbeReport {
        link: Some(link),
        router: Some(router),
        internet: Some(internet),
        ntp: Some(ntp),
    }
}

/// A report where every check passes
pub fn all_pass() -> ProbeReport {
    report(true, true, true, true)
}

/// A probe that replays queued reports, then repeats a default
#[derive(Clone)]
pub struct ScriptedProbe {
    queue: Arc<Mutex<VecDeque<Result<ProbeReport>>>>,
    default: Arc<Mutex<ProbeReport>>,
    masks: Arc<Mutex<Vec<CheckMask>>>,
}

impl ScriptedProbe {
    pub fn new(default: ProbeReport) -> Self {
        Self {
            queue: Arc::new(Mutex::new(VecDeque::new())),
            default: Arc::new(Mutex::new(default)),
            masks: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Queue a report for the next call
    pub fn push(&self, report: ProbeReport) {
        self.queue.lock().unwrap().push_back(Ok(report));
    }

    /// Queue a wholesale probe failure for the next call
    pub fn push_failure(&self) {
        self.queue
            .lock()
            .unwrap()
            .push_back(Err(Error::probe("interface vanished")));
    }

    /// Replace the report used once the queue is empty
    pub fn set_default(&self, report: ProbeReport) {
        *self.default.lock().unwrap() = report;
    }

    /// Masks requested so far, oldest first
    pub fn masks(&self) -> Vec<CheckMask> {
        self.masks.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.masks.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl ConnectivityProbe for ScriptedProbe {
    async fn check(&self, _if_name: &str, mask: CheckMask) -> Result<ProbeReport> {
        self.masks.lock().unwrap().push(mask);
        let next = self.queue.lock().unwrap().pop_front();
        match next {
            Some(result) => result,
            None => Ok(*self.default.lock().unwrap()),
        }
    }
}

/// A link store that counts calls and can fail selected updates
#[derive(Clone)]
pub struct TrackingStore {
    inner: MemoryLinkStore,
    get_calls: Arc<AtomicUsize>,
    update_calls: Arc<AtomicUsize>,
    ntp_calls: Arc<AtomicUsize>,
    flush_calls: Arc<AtomicUsize>,
    failing: Arc<Mutex<HashSet<Counter>>>,
    fail_ntp: Arc<AtomicBool>,
    fail_get: Arc<AtomicBool>,
    updates: Arc<Mutex<Vec<(Counter, u32)>>>,
}

impl TrackingStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryLinkStore::new(),
            get_calls: Arc::new(AtomicUsize::new(0)),
            update_calls: Arc::new(AtomicUsize::new(0)),
            ntp_calls: Arc::new(AtomicUsize::new(0)),
            flush_calls: Arc::new(AtomicUsize::new(0)),
            failing: Arc::new(Mutex::new(HashSet::new())),
            fail_ntp: Arc::new(AtomicBool::new(false)),
            fail_get: Arc::new(AtomicBool::new(false)),
            updates: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A store that already knows `if_name`
    pub async fn seeded(if_name: &str, record: LinkRecord) -> Self {
        let store = Self::new();
        store.inner.insert_record(if_name, &record).await.unwrap();
        store
    }

    /// Make every update of `counter` fail
    pub fn fail_counter(&self, counter: Counter) {
        self.failing.lock().unwrap().insert(counter);
    }

    pub fn fail_ntp_updates(&self) {
        self.fail_ntp.store(true, Ordering::SeqCst);
    }

    /// Make every record read fail
    pub fn fail_get(&self) {
        self.fail_get.store(true, Ordering::SeqCst);
    }

    /// Current stored record (bypasses call counting)
    pub async fn record(&self, if_name: &str) -> Option<LinkRecord> {
        self.inner.get_record(if_name).await.unwrap()
    }

    /// Directly overwrite a stored counter (bypasses call counting)
    pub async fn set(&self, if_name: &str, counter: Counter, value: u32) {
        self.inner.update_counter(if_name, counter, value).await.unwrap();
    }

    pub fn get_call_count(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn update_call_count(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    pub fn ntp_call_count(&self) -> usize {
        self.ntp_calls.load(Ordering::SeqCst)
    }

    pub fn flush_call_count(&self) -> usize {
        self.flush_calls.load(Ordering::SeqCst)
    }

    /// Counter writes attempted so far, oldest first
    pub fn updates(&self) -> Vec<(Counter, u32)> {
        self.updates.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl LinkStore for TrackingStore {
    async fn get_record(&self, if_name: &str) -> Result<Option<LinkRecord>> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_get.load(Ordering::SeqCst) {
            return Err(Error::link_store("read rejected"));
        }
        self.inner.get_record(if_name).await
    }

    async fn insert_record(&self, if_name: &str, record: &LinkRecord) -> Result<()> {
        self.inner.insert_record(if_name, record).await
    }

    async fn update_counter(&self, if_name: &str, counter: Counter, value: u32) -> Result<()> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        self.updates.lock().unwrap().push((counter, value));
        if self.failing.lock().unwrap().contains(&counter) {
            return Err(Error::link_store("write rejected"));
        }
        self.inner.update_counter(if_name, counter, value).await
    }

    async fn update_ntp_state(&self, if_name: &str, synced: bool) -> Result<()> {
        self.ntp_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_ntp.load(Ordering::SeqCst) {
            return Err(Error::link_store("write rejected"));
        }
        self.inner.update_ntp_state(if_name, synced).await
    }

    async fn remove_record(&self, if_name: &str) -> Result<()> {
        self.inner.remove_record(if_name).await
    }

    async fn list_interfaces(&self) -> Result<Vec<String>> {
        self.inner.list_interfaces().await
    }

    async fn flush(&self) -> Result<()> {
        self.flush_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Topology whose bridge port presence is set by the test
#[derive(Clone)]
pub struct SwitchableTopology {
    bridged: Arc<Mutex<Option<bool>>>,
    lookups: Arc<AtomicUsize>,
}

impl SwitchableTopology {
    /// `Some(true)`: port present, `Some(false)`: absent, `None`: lookup error
    pub fn new(bridged: Option<bool>) -> Self {
        Self {
            bridged: Arc::new(Mutex::new(bridged)),
            lookups: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn bridged() -> Self {
        Self::new(Some(true))
    }

    pub fn routed() -> Self {
        Self::new(Some(false))
    }

    pub fn set(&self, bridged: Option<bool>) {
        *self.bridged.lock().unwrap() = bridged;
    }

    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Topology for SwitchableTopology {
    async fn port_exists(&self, _port_name: &str) -> Result<bool> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.bridged
            .lock()
            .unwrap()
            .ok_or_else(|| Error::topology("ovsdb unavailable"))
    }
}

/// A device target that records every action
#[derive(Clone)]
pub struct RecordingTarget {
    extender: Arc<AtomicBool>,
    restarts: Arc<AtomicUsize>,
    dhcp_refreshes: Arc<Mutex<Vec<String>>>,
    watchdog_pings: Arc<AtomicUsize>,
    indicator_clears: Arc<AtomicUsize>,
}

impl RecordingTarget {
    pub fn extender() -> Self {
        Self {
            extender: Arc::new(AtomicBool::new(true)),
            restarts: Arc::new(AtomicUsize::new(0)),
            dhcp_refreshes: Arc::new(Mutex::new(Vec::new())),
            watchdog_pings: Arc::new(AtomicUsize::new(0)),
            indicator_clears: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn gateway() -> Self {
        let target = Self::extender();
        target.extender.store(false, Ordering::SeqCst);
        target
    }

    pub fn restart_count(&self) -> usize {
        self.restarts.load(Ordering::SeqCst)
    }

    pub fn dhcp_refreshes(&self) -> Vec<String> {
        self.dhcp_refreshes.lock().unwrap().clone()
    }

    pub fn watchdog_ping_count(&self) -> usize {
        self.watchdog_pings.load(Ordering::SeqCst)
    }

    pub fn indicator_clear_count(&self) -> usize {
        self.indicator_clears.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl DeviceTarget for RecordingTarget {
    fn is_extender(&self) -> bool {
        self.extender.load(Ordering::SeqCst)
    }

    async fn restart_managers(&self) {
        self.restarts.fetch_add(1, Ordering::SeqCst);
    }

    async fn refresh_dhcp(&self, if_name: &str) {
        self.dhcp_refreshes.lock().unwrap().push(if_name.to_string());
    }

    async fn ping_watchdog(&self) {
        self.watchdog_pings.fetch_add(1, Ordering::SeqCst);
    }

    async fn clear_liveness_indicator(&self) {
        self.indicator_clears.fetch_add(1, Ordering::SeqCst);
    }
}

/// Everything a contract test needs to drive and observe one engine
pub struct Harness {
    pub engine: StabilityEngine,
    pub events: mpsc::Receiver<StabilityEvent>,
    pub probe: ScriptedProbe,
    pub store: TrackingStore,
    pub topology: SwitchableTopology,
    pub target: RecordingTarget,
}

impl Harness {
    /// Engine over a store seeded with a zeroed record for [`UPLINK`]
    pub async fn new(topology: SwitchableTopology) -> Self {
        let store = TrackingStore::seeded(UPLINK, LinkRecord::new()).await;
        Self::with_parts(ScriptedProbe::new(all_pass()), store, topology, RecordingTarget::extender())
    }

    pub fn with_parts(
        probe: ScriptedProbe,
        store: TrackingStore,
        topology: SwitchableTopology,
        target: RecordingTarget,
    ) -> Self {
        let (engine, events) = StabilityEngine::new(
            Box::new(probe.clone()),
            Box::new(store.clone()),
            Box::new(topology.clone()),
            Arc::new(target.clone()),
            StabilityConfig::default(),
        )
        .expect("engine construction succeeds");

        Self {
            engine,
            events,
            probe,
            store,
            topology,
            target,
        }
    }

    /// Drain all events emitted so far
    pub fn drain_events(&mut self) -> Vec<StabilityEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}
