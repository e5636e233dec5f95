// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Packets injected into the reference topologies and dropped by the network layer

use nat::{NatError, StaticNat};
use natsim_sim::{LinkConfig, ScenarioConfig, SimConfig, SimError, Simulator};
use net::headers::Fragment;
use net::interface::InterfaceId;
use net::packet::DoneReason;
use net::packet::test_utils::{addr, build_test_udp_packet};
use net::time::SimTime;
use pipeline::stages::DEFAULT_FRAGMENT_TIMEOUT;
use pretty_assertions::assert_eq;
use stats::{DropRecorder, DropReporter};
use std::sync::Arc;

const INSIDE: InterfaceId = InterfaceId::new(1);
const OUTSIDE: InterfaceId = InterfaceId::new(2);

#[test]
fn unsolicited_inbound_is_dropped() {
    let recorder = Arc::new(DropRecorder::new());
    let mut scenario = ScenarioConfig::static_nat_tcp()
        .build(Some(recorder.clone()))
        .unwrap();
    let router = scenario.router.unwrap();

    // nothing is bound to the global endpoint yet
    let packet = build_test_udp_packet("203.82.48.2", "203.82.48.100", 9, 9999);
    scenario
        .sim
        .inject(router, OUTSIDE, packet, SimTime::from_millis(500))
        .unwrap();
    scenario.sim.run_until(SimTime::from_millis(900));

    let events = recorder.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].reason, DoneReason::NatNoMatch);
    assert_eq!(events[0].origin.as_deref(), Some("nat"));
    assert_eq!(events[0].dst_port, Some(9999));
    assert!(scenario.sim.nat(router).unwrap().bindings().is_empty());
}

#[test]
fn router_addresses_bypass_the_translator() {
    let recorder = Arc::new(DropRecorder::new());
    let mut scenario = ScenarioConfig::static_nat_udp()
        .build(Some(recorder.clone()))
        .unwrap();
    let router = scenario.router.unwrap();

    let to_inside_address = build_test_udp_packet("192.168.1.1", "192.168.1.2", 5555, 9);
    let to_outside_address = build_test_udp_packet("203.82.48.2", "203.82.48.1", 9, 5555);
    scenario
        .sim
        .inject(router, INSIDE, to_inside_address, SimTime::from_millis(500))
        .unwrap();
    scenario
        .sim
        .inject(router, OUTSIDE, to_outside_address, SimTime::from_millis(500))
        .unwrap();
    scenario.sim.run_until(SimTime::from_millis(900));

    assert_eq!(recorder.len(), 0);
    let nat = scenario.sim.nat(router).unwrap();
    assert!(nat.bindings().is_empty());
    assert_eq!(nat.stats().egress_translated, 0);
}

#[test]
fn expired_ttl_is_dropped_by_the_router() {
    let recorder = Arc::new(DropRecorder::new());
    let mut scenario = ScenarioConfig::static_nat_tcp()
        .build(Some(recorder.clone()))
        .unwrap();
    let router = scenario.router.unwrap();

    let mut packet = build_test_udp_packet("192.168.1.1", "203.82.48.2", 49153, 9);
    packet.headers_mut().set_ttl(1);
    scenario
        .sim
        .inject(router, INSIDE, packet, SimTime::from_millis(500))
        .unwrap();
    scenario.sim.run_until(SimTime::from_millis(900));

    assert_eq!(recorder.len(), 1);
    let event = &recorder.events()[0];
    assert_eq!(event.reason, DoneReason::HopLimitExceeded);
    assert_eq!(event.origin.as_deref(), Some("n1"));
    assert_eq!(scenario.sim.now(), SimTime::from_millis(900));
}

#[test]
fn corrupted_datagram_is_dropped() {
    let recorder = Arc::new(DropRecorder::new());
    let mut scenario = ScenarioConfig::static_nat_udp()
        .build(Some(recorder.clone()))
        .unwrap();
    let server = scenario.sim.node_by_name("n2").unwrap();

    let mut packet = build_test_udp_packet("203.82.48.1", "203.82.48.2", 5000, 9);
    let bad = packet.headers().checksum().wrapping_add(1);
    packet.headers_mut().set_checksum(bad);
    assert!(!packet.checksum_valid());
    scenario
        .sim
        .inject(server, InterfaceId::new(1), packet, SimTime::from_millis(500))
        .unwrap();
    scenario.sim.run_until(SimTime::from_millis(900));

    assert_eq!(recorder.count(DoneReason::BadChecksum), 1);
    assert_eq!(recorder.events()[0].origin.as_deref(), Some("n2"));
}

#[test]
fn outside_interface_down() {
    let mut scenario = ScenarioConfig::static_nat_tcp().build(None).unwrap();
    let router = scenario.router.unwrap();
    scenario.sim.set_interface_up(router, OUTSIDE, false).unwrap();
    assert!(
        scenario
            .sim
            .set_interface_up(router, InterfaceId::new(9), false)
            .is_err()
    );

    let report = scenario.run();
    let client = &report.clients[0];
    assert_eq!(client.bytes_sent, 0);
    assert_eq!(client.bytes_received_back, 0);
    assert!(report.drops.get_stat(DoneReason::InterfaceAdmDown).unwrap_or(0) >= 1);
    assert_eq!(report.server.unwrap().peers_accepted, 0);
}

#[test]
fn lone_fragment_times_out() {
    let recorder = Arc::new(DropRecorder::new());
    let mut scenario = ScenarioConfig::tcp_echo(false)
        .build(Some(recorder.clone()))
        .unwrap();
    let server = scenario.sim.node_by_name("n1").unwrap();

    let mut packet = build_test_udp_packet("10.1.1.1", "10.1.1.2", 49200, 7);
    packet.headers_mut().set_fragment(Some(Fragment {
        id: 42,
        offset: 0,
        more: true,
    }));
    let start = SimTime::from_secs(1);
    scenario
        .sim
        .inject(server, InterfaceId::new(1), packet, start)
        .unwrap();

    scenario.sim.run_until(SimTime::from_secs(2));
    assert_eq!(scenario.sim.node(server).unwrap().pending_fragments(), 1);

    let report = scenario.run();
    assert_eq!(recorder.count(DoneReason::FragmentTimeout), 1);
    let event = &recorder.events()[0];
    assert_eq!(event.src, addr("10.1.1.1"));
    assert_eq!(event.timestamp, start + DEFAULT_FRAGMENT_TIMEOUT);
    assert_eq!(scenario.sim.node(server).unwrap().pending_fragments(), 0);
    assert_eq!(report.finished_at, start + DEFAULT_FRAGMENT_TIMEOUT);
    // the echo traffic is unaffected
    assert_eq!(report.clients[0].bytes_received_back, 8 * 183);
}

#[test]
fn translator_needs_a_router_and_a_configuration() {
    let mut sim = Simulator::new(SimConfig::default(), DropReporter::discard());
    let host = sim.add_host("h").unwrap();
    let router = sim.add_router("r").unwrap();
    sim.connect(host, router, LinkConfig::default()).unwrap();

    let unconfigured = StaticNat::new("nat", DropReporter::discard());
    assert!(matches!(
        sim.install_nat(router, unconfigured),
        Err(SimError::Nat(NatError::NotConfigured { .. }))
    ));

    let mut nat = StaticNat::new("nat", DropReporter::discard());
    nat.set_inside(InterfaceId::new(1)).unwrap();
    nat.set_outside(InterfaceId::new(2)).unwrap();
    // the router has a single link
    assert!(matches!(
        sim.install_nat(router, nat),
        Err(SimError::UnknownInterface { .. })
    ));

    let mut nat = StaticNat::new("nat", DropReporter::discard());
    nat.set_inside(InterfaceId::new(1)).unwrap();
    nat.set_outside(InterfaceId::new(0)).unwrap();
    assert!(matches!(
        sim.install_nat(host, nat),
        Err(SimError::NotARouter(_))
    ));
    assert!(sim.nat(router).is_none());
}
