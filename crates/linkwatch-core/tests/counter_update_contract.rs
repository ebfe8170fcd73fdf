//! Contract Test: Consecutive-Failure Counters
//!
//! Constraints verified:
//! - A failing check stores exactly `stored + 1`
//! - A passing check stores exactly 0
//! - Every reported counter is written back, even when it is 0
//! - A failed write for one counter never blocks the others
//! - NTP state is stored but never drives a counter
//! - Checks the probe did not report are left alone

mod common;

use common::*;
use linkwatch_core::selection::{InterfaceType, LinkSelection};
use linkwatch_core::traits::{Counter, LinkRecord, ProbeReport};
use linkwatch_core::TickOutcome;

fn selection() -> LinkSelection {
    LinkSelection::with_link(UPLINK, InterfaceType::Ethernet)
}

#[tokio::test]
async fn failing_checks_increment_from_stored_value() {
    let mut record = LinkRecord::new();
    record.unreachable_link_counter = 2;
    record.unreachable_router_counter = 1;
    record.unreachable_internet_counter = 3;
    let store = TrackingStore::seeded(UPLINK, record).await;
    let probe = ScriptedProbe::new(report(false, false, false, true));
    let h = Harness::with_parts(probe, store, SwitchableTopology::routed(), RecordingTarget::extender());

    let mut sel = selection();
    let outcome = h.engine.evaluate_tick(&mut sel).await;

    let TickOutcome::Evaluated(summary) = outcome else {
        panic!("tick should be evaluated, got {:?}", outcome);
    };
    assert_eq!(summary.link_counter, Some(3));
    assert_eq!(summary.router_counter, Some(2));
    assert_eq!(summary.internet_counter, Some(4));

    let stored = h.store.record(UPLINK).await.unwrap();
    assert_eq!(stored.unreachable_link_counter, 3);
    assert_eq!(stored.unreachable_router_counter, 2);
    assert_eq!(stored.unreachable_internet_counter, 4);
}

#[tokio::test]
async fn passing_check_resets_counter_to_zero() {
    let mut record = LinkRecord::new();
    record.unreachable_link_counter = 17;
    record.unreachable_router_counter = 3;
    record.unreachable_internet_counter = 11;
    let store = TrackingStore::seeded(UPLINK, record).await;
    let h = Harness::with_parts(
        ScriptedProbe::new(all_pass()),
        store,
        SwitchableTopology::routed(),
        RecordingTarget::extender(),
    );

    let mut sel = selection();
    h.engine.evaluate_tick(&mut sel).await;

    let stored = h.store.record(UPLINK).await.unwrap();
    assert_eq!(stored.unreachable_link_counter, 0);
    assert_eq!(stored.unreachable_router_counter, 0);
    assert_eq!(stored.unreachable_internet_counter, 0);
}

#[tokio::test]
async fn run_of_failures_then_recovery() {
    let mut h = Harness::new(SwitchableTopology::routed()).await;
    let mut sel = selection();

    for _ in 0..3 {
        h.probe.push(report(false, true, true, true));
    }
    h.probe.push(all_pass());

    let mut seen = Vec::new();
    for _ in 0..4 {
        h.engine.evaluate_tick(&mut sel).await;
        seen.push(h.store.record(UPLINK).await.unwrap().unreachable_link_counter);
    }

    assert_eq!(seen, vec![1, 2, 3, 0]);

    let failures = h
        .drain_events()
        .into_iter()
        .filter(|event| matches!(event, linkwatch_core::StabilityEvent::CheckFailed { .. }))
        .count();
    assert_eq!(failures, 3);
}

#[tokio::test]
async fn zero_counters_are_still_written() {
    let h = Harness::new(SwitchableTopology::routed()).await;
    let mut sel = selection();

    h.engine.evaluate_tick(&mut sel).await;

    assert_eq!(
        h.store.updates(),
        vec![(Counter::Link, 0), (Counter::Router, 0), (Counter::Internet, 0)]
    );
    assert_eq!(h.store.ntp_call_count(), 1);
}

#[tokio::test]
async fn failed_write_does_not_block_other_checks() {
    let h = Harness::new(SwitchableTopology::routed()).await;
    h.store.fail_counter(Counter::Link);
    h.store.fail_ntp_updates();
    h.probe.set_default(report(false, false, false, true));

    let mut sel = selection();
    let outcome = h.engine.evaluate_tick(&mut sel).await;
    assert!(matches!(outcome, TickOutcome::Evaluated(_)));

    // Every write was attempted
    assert_eq!(h.store.update_call_count(), 3);
    assert_eq!(h.store.ntp_call_count(), 1);

    let stored = h.store.record(UPLINK).await.unwrap();
    assert_eq!(stored.unreachable_link_counter, 0, "rejected write leaves old value");
    assert_eq!(stored.unreachable_router_counter, 1);
    assert_eq!(stored.unreachable_internet_counter, 1);
}

#[tokio::test]
async fn ntp_state_is_stored_without_a_counter() {
    let h = Harness::new(SwitchableTopology::routed()).await;
    let mut sel = selection();

    h.probe.push(report(true, true, true, true));
    h.engine.evaluate_tick(&mut sel).await;
    assert!(h.store.record(UPLINK).await.unwrap().ntp_state);

    h.probe.push(report(true, true, true, false));
    h.engine.evaluate_tick(&mut sel).await;
    let stored = h.store.record(UPLINK).await.unwrap();
    assert!(!stored.ntp_state);
    assert_eq!(stored.unreachable_link_counter, 0);
    assert!(h.target.dhcp_refreshes().is_empty());
    assert_eq!(h.target.restart_count(), 0);
}

#[tokio::test]
async fn unreported_checks_are_left_alone() {
    let mut record = LinkRecord::new();
    record.unreachable_router_counter = 2;
    record.unreachable_internet_counter = 4;
    let store = TrackingStore::seeded(UPLINK, record).await;
    let h = Harness::with_parts(
        ScriptedProbe::new(ProbeReport {
            link: Some(false),
            ..ProbeReport::default()
        }),
        store,
        SwitchableTopology::routed(),
        RecordingTarget::extender(),
    );

    let mut sel = selection();
    let outcome = h.engine.evaluate_tick(&mut sel).await;

    let TickOutcome::Evaluated(summary) = outcome else {
        panic!("tick should be evaluated");
    };
    assert_eq!(summary.link_counter, Some(1));
    assert_eq!(summary.router_counter, None);
    assert_eq!(summary.mode, None);
    assert_eq!(h.store.updates(), vec![(Counter::Link, 1)]);
    assert_eq!(h.store.ntp_call_count(), 0);
    assert_eq!(h.topology.lookup_count(), 0);

    let stored = h.store.record(UPLINK).await.unwrap();
    assert_eq!(stored.unreachable_router_counter, 2);
    assert_eq!(stored.unreachable_internet_counter, 4);
}

#[tokio::test]
async fn evaluated_tick_flushes_store() {
    let h = Harness::new(SwitchableTopology::bridged()).await;
    let mut sel = selection();

    h.engine.evaluate_tick(&mut sel).await;
    h.engine.evaluate_tick(&mut sel).await;

    assert_eq!(h.store.flush_call_count(), 2);
}
