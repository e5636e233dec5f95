// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Simulated hosts and routers.
//!
//! Every node runs received packets through a [`DynPipeline`] made of the network-layer stages
//! below, in this order:
//!
//! | stage         | function                                           |
//! |---------------|----------------------------------------------------|
//! | `iface-in`    | [`InterfaceCheck`] on the ingress interface        |
//! | `checksum`    | [`ChecksumCheck`]                                  |
//! | `route`       | [`RouteLookup`]                                    |
//! | `nat`         | [`StaticNat`], on routers where it is installed    |
//! | `reroute`     | [`RouteLookup`] again, after address translation   |
//! | `reassembly`  | [`Reassembly`] of fragments for the node itself    |
//! | `ttl`         | [`DecrementTtl`] for forwarded packets             |
//! | `iface-out`   | [`InterfaceCheck`] on the egress interface         |
//!
//! Both route lookups read the [`Fib`] the node writes to.

use crate::config::SimConfig;
use crate::error::SimError;
use crate::link::{LinkEnd, Wire, wire_len};
use crate::simulator::{AppId, Event};
use crate::transport::TransportStack;
use echo::AppEvent;
use ipnet::{IpNet, Ipv4Net};
use nat::StaticNat;
use net::headers::{Fragment, Headers};
use net::interface::{AdminState, InterfaceId};
use net::packet::{DoneReason, Packet, PacketMeta};
use net::time::SimTime;
use pipeline::stages::{
    ChecksumCheck, DecrementTtl, Fib, FibReader, FibWriter, InterfaceCheck, NextHop, Reassembly,
    RouteLookup,
};
use pipeline::{DynPipeline, NetworkFunction};
use left_right::ReadGuard;
use stats::DropReporter;
use std::fmt::{Display, Formatter};
use std::net::{IpAddr, Ipv4Addr};
use tracing::{debug, trace};

const IFACE_IN: &str = "iface-in";
const CHECKSUM: &str = "checksum";
const NAT: &str = "nat";
const ROUTE: &str = "route";
const REROUTE: &str = "reroute";
const REASSEMBLY: &str = "reassembly";
const TTL: &str = "ttl";
const IFACE_OUT: &str = "iface-out";

/// Index of a node in the simulator
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Host,
    /// only routers may run a translator
    Router,
}

#[derive(Debug)]
struct Interface {
    /// None for the loopback
    link: Option<LinkEnd>,
    addrs: Vec<IpNet>,
    admin: AdminState,
}

fn index(ifindex: InterfaceId) -> usize {
    usize::try_from(ifindex.get_id()).unwrap_or(usize::MAX)
}

/// A host or router
pub struct Node {
    id: NodeId,
    name: String,
    kind: NodeKind,
    interfaces: Vec<Interface>,
    pipeline: DynPipeline,
    fib: FibWriter,
    pub(crate) transport: TransportStack,
    drops: DropReporter,
    checksum_enabled: bool,
    default_ttl: u8,
    next_frag_id: u16,
    /// time of the pending housekeeping event, if any
    housekeeping_at: Option<SimTime>,
}

fn build_pipeline(
    config: &SimConfig,
    fib: FibReader,
    drops: &DropReporter,
) -> Result<DynPipeline, SimError> {
    let mut pipeline = DynPipeline::new();
    pipeline
        .add_stage_with_name(IFACE_IN, InterfaceCheck::ingress(drops.clone()))?
        .add_stage_with_name(
            CHECKSUM,
            ChecksumCheck::new(config.checksum_enabled, drops.clone()),
        )?
        .add_stage_with_name(ROUTE, RouteLookup::new(ROUTE, fib, drops.clone()))?
        .add_stage_with_name(
            REASSEMBLY,
            Reassembly::new(config.fragment_timeout, drops.clone()),
        )?
        .add_stage_with_name(TTL, DecrementTtl::new(drops.clone()))?
        .add_stage_with_name(IFACE_OUT, InterfaceCheck::egress(drops.clone()))?;
    Ok(pipeline)
}

impl Node {
    pub(crate) fn new(
        id: NodeId,
        name: &str,
        kind: NodeKind,
        config: &SimConfig,
        drops: &DropReporter,
    ) -> Result<Self, SimError> {
        let drops = drops.with_origin(name);
        let (fib, reader) = FibWriter::new();
        let mut node = Self {
            id,
            name: name.to_owned(),
            kind,
            interfaces: Vec::new(),
            pipeline: build_pipeline(config, reader, &drops)?,
            fib,
            transport: TransportStack::new(config.max_connections),
            drops,
            checksum_enabled: config.checksum_enabled,
            default_ttl: config.default_ttl,
            next_frag_id: 0,
            housekeeping_at: None,
        };
        let lo = node.attach(None);
        node.add_address(lo, IpNet::V4(Ipv4Net::from(Ipv4Addr::LOCALHOST)))?;
        Ok(node)
    }

    #[must_use]
    pub fn id(&self) -> NodeId {
        self.id
    }
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
    #[must_use]
    pub fn kind(&self) -> NodeKind {
        self.kind
    }
    /// Number of interfaces, loopback included
    #[must_use]
    pub fn num_interfaces(&self) -> usize {
        self.interfaces.len()
    }
    /// Addresses of interface `ifindex`
    #[must_use]
    pub fn addresses(&self, ifindex: InterfaceId) -> &[IpNet] {
        self.interfaces
            .get(index(ifindex))
            .map_or(&[], |iface| iface.addrs.as_slice())
    }
    #[must_use]
    pub fn admin_state(&self, ifindex: InterfaceId) -> Option<AdminState> {
        self.interfaces.get(index(ifindex)).map(|iface| iface.admin)
    }
    /// The forwarding state: routes and local addresses
    #[must_use]
    pub fn fib(&self) -> Option<ReadGuard<'_, Fib>> {
        self.fib.enter()
    }
    /// Names of the stages packets go through, in order
    pub fn stage_names(&self) -> impl Iterator<Item = &str> {
        self.pipeline.stage_names()
    }
    /// Number of datagrams waiting for fragments
    #[must_use]
    pub fn pending_fragments(&self) -> usize {
        self.pipeline
            .get_stage::<Reassembly>(REASSEMBLY)
            .map_or(0, Reassembly::pending)
    }
    /// The translator of the node, if one is installed
    #[must_use]
    pub fn nat(&self) -> Option<&StaticNat> {
        self.pipeline.get_stage::<StaticNat>(NAT)
    }

    fn check_interface(&self, ifindex: InterfaceId) -> Result<usize, SimError> {
        let i = index(ifindex);
        if i < self.interfaces.len() {
            Ok(i)
        } else {
            Err(SimError::UnknownInterface {
                node: self.id,
                ifindex,
            })
        }
    }

    /// Add an interface. Interfaces are numbered in the order they are attached.
    fn attach(&mut self, link: Option<LinkEnd>) -> InterfaceId {
        let ifindex = InterfaceId::new(u32::try_from(self.interfaces.len()).unwrap_or(u32::MAX));
        self.interfaces.push(Interface {
            link,
            addrs: Vec::new(),
            admin: AdminState::Up,
        });
        self.fib.add_interface(ifindex);
        for stage in [IFACE_IN, IFACE_OUT] {
            if let Some(check) = self.pipeline.get_stage_mut::<InterfaceCheck>(stage) {
                check.set_admin_state(ifindex, AdminState::Up);
            }
        }
        ifindex
    }

    pub(crate) fn attach_link(&mut self, end: LinkEnd) -> InterfaceId {
        self.attach(Some(end))
    }

    pub(crate) fn add_address(
        &mut self,
        ifindex: InterfaceId,
        addr: IpNet,
    ) -> Result<(), SimError> {
        let i = self.check_interface(ifindex)?;
        self.interfaces[i].addrs.push(addr);
        self.fib.add_address(ifindex, addr);
        debug!("node {}: {addr} on interface {ifindex}", self.name);
        Ok(())
    }

    pub(crate) fn add_route(&mut self, prefix: IpNet, nhop: NextHop) -> Result<(), SimError> {
        self.check_interface(nhop.oif)?;
        self.fib.add_route(prefix, nhop);
        Ok(())
    }

    pub(crate) fn set_default_route(&mut self, nhop: NextHop) -> Result<(), SimError> {
        self.check_interface(nhop.oif)?;
        self.fib.set_default(nhop);
        Ok(())
    }

    pub(crate) fn set_admin_state(
        &mut self,
        ifindex: InterfaceId,
        state: AdminState,
    ) -> Result<(), SimError> {
        let i = self.check_interface(ifindex)?;
        self.interfaces[i].admin = state;
        for stage in [IFACE_IN, IFACE_OUT] {
            if let Some(check) = self.pipeline.get_stage_mut::<InterfaceCheck>(stage) {
                check.set_admin_state(ifindex, state);
            }
        }
        debug!("node {}: interface {ifindex} is {state:?}", self.name);
        Ok(())
    }

    /// Put a translator in the path of forwarded packets. Packets are routed again once
    /// translated, since their destination may have changed.
    pub(crate) fn install_nat(&mut self, nat: StaticNat) -> Result<(), SimError> {
        if self.kind != NodeKind::Router {
            return Err(SimError::NotARouter(self.id));
        }
        let (inside, outside) = nat.check_config()?;
        self.check_interface(inside)?;
        self.check_interface(outside)?;
        debug!(
            "node {}: installing nat {} (inside {inside}, outside {outside})",
            self.name,
            nat.name()
        );
        let reroute = RouteLookup::new(REROUTE, self.fib.as_fibreader(), self.drops.clone());
        self.pipeline
            .insert_stage_before(REASSEMBLY, NAT, nat)?
            .insert_stage_before(REASSEMBLY, REROUTE, reroute)?;
        Ok(())
    }

    /// The address to send from to reach `dst`: the first address of the family of `dst` on the
    /// interface the route to `dst` goes out of.
    pub(crate) fn source_address_for(&self, dst: IpAddr) -> Option<IpAddr> {
        let fib = self.fib.enter()?;
        if fib.is_local(dst) {
            return Some(dst);
        }
        let nhop = fib.lookup(dst)?;
        self.interfaces
            .get(index(nhop.oif))?
            .addrs
            .iter()
            .map(IpNet::addr)
            .find(|addr| addr.is_ipv4() == dst.is_ipv4())
    }

    fn drop_packet(&self, mut packet: Packet, reason: DoneReason) {
        debug!("node {}: dropping ({reason}) {packet}", self.name);
        packet.done(reason);
        self.drops.report(&packet, reason);
    }

    /// Send a packet the node originates
    pub(crate) fn output(&mut self, wire: &mut Wire<'_>, mut packet: Packet) {
        packet.meta = PacketMeta::new(InterfaceId::LOOPBACK, wire.now);
        packet.headers_mut().set_ttl(self.default_ttl);
        let dst = packet.headers().destination();
        let Some((local, nhop)) = self
            .fib
            .enter()
            .map(|fib| (fib.is_local(dst), fib.lookup(dst).copied()))
        else {
            self.drop_packet(packet, DoneReason::InternalFailure);
            return;
        };
        if local {
            if self.checksum_enabled {
                packet.update_checksum();
            }
            wire.sched.schedule_at(
                wire.now,
                Event::Deliver {
                    node: self.id,
                    iif: InterfaceId::LOOPBACK,
                    packet,
                },
            );
            return;
        }
        let Some(nhop) = nhop else {
            self.drop_packet(packet, DoneReason::RouteFailure);
            return;
        };
        packet.meta.oif = Some(nhop.oif);
        packet.meta.nh_addr = Some(nhop.gateway.unwrap_or(dst));
        self.transmit(wire, packet);
    }

    /// Put a routed packet on the link of its outgoing interface, fragmenting it if needed
    fn transmit(&mut self, wire: &mut Wire<'_>, mut packet: Packet) {
        let Some(oif) = packet.meta.oif else {
            self.drop_packet(packet, DoneReason::RouteFailure);
            return;
        };
        let Some(iface) = self.interfaces.get(index(oif)) else {
            self.drop_packet(packet, DoneReason::InterfaceUnknown);
            return;
        };
        if !iface.admin.is_up() {
            self.drop_packet(packet, DoneReason::InterfaceAdmDown);
            return;
        }
        let Some(end) = iface.link else {
            self.drop_packet(packet, DoneReason::RouteError);
            return;
        };
        if self.checksum_enabled && packet.meta.checksum_refresh() {
            packet.update_checksum();
        }
        let mtu = wire.mtu(end);
        if wire_len(&packet) <= mtu {
            wire.send(end, packet);
            return;
        }
        match self.fragment(&packet, mtu) {
            Some(fragments) => {
                trace!("node {}: {} fragments for {packet}", self.name, fragments.len());
                for fragment in fragments {
                    wire.send(end, fragment);
                }
            }
            None => self.drop_packet(packet, DoneReason::Malformed),
        }
    }

    /// Split `packet` in fragments of at most `mtu` bytes. Only the first fragment carries the
    /// transport header. Returns None if the MTU is too small to fragment at all.
    fn fragment(&mut self, packet: &Packet, mtu: usize) -> Option<Vec<Packet>> {
        let hdrs = packet.headers();
        let ip_header = wire_len(packet) - packet.ip_payload_len();
        let (id, base, more) = match hdrs.fragment() {
            Some(frag) => (frag.id, frag.offset, frag.more),
            None => {
                self.next_frag_id = self.next_frag_id.wrapping_add(1);
                (self.next_frag_id, 0, false)
            }
        };
        let payload = packet.payload();
        let mut fragments = Vec::new();
        let mut offset = 0;
        while offset < payload.len() {
            let transport = if offset == 0 {
                usize::from(hdrs.transport_len())
            } else {
                0
            };
            // fragment data comes in multiples of 8 bytes, except for the last one
            let room = mtu.checked_sub(ip_header + transport)? / 8 * 8;
            if room == 0 {
                return None;
            }
            let end = (offset + room).min(payload.len());
            let mut headers = if offset == 0 {
                hdrs.clone()
            } else {
                let mut raw =
                    Headers::new_raw(hdrs.source(), hdrs.destination(), hdrs.next_header());
                raw.set_ttl(hdrs.ttl());
                raw
            };
            headers.set_fragment(Some(Fragment {
                id,
                offset: base.checked_add(u16::try_from(offset).ok()?)?,
                more: end < payload.len() || more,
            }));
            let mut fragment = Packet::new(headers, payload.slice(offset..end));
            fragment.meta = packet.meta.clone();
            if self.checksum_enabled {
                fragment.update_checksum();
            }
            fragments.push(fragment);
            offset = end;
        }
        Some(fragments)
    }

    /// Process a packet received on `iif`. Packets for the node go to its transport layer, whose
    /// answers are sent right away. Returns the events for the applications of the node.
    pub(crate) fn receive(
        &mut self,
        wire: &mut Wire<'_>,
        iif: InterfaceId,
        mut packet: Packet,
    ) -> Vec<(AppId, AppEvent)> {
        packet.meta = PacketMeta::new(iif, wire.now);
        trace!("node {}: received on {iif}: {packet}", self.name);
        let survivors: Vec<Packet> = self
            .pipeline
            .process(std::iter::once(packet))
            .filter_map(Packet::enforce)
            .collect();

        let mut events = Vec::new();
        for packet in survivors {
            if packet.get_meta().is_local {
                let out = self.transport.receive(packet);
                for packet in out.packets {
                    self.output(wire, packet);
                }
                events.extend(out.events);
            } else {
                self.transmit(wire, packet);
            }
        }
        self.schedule_housekeeping(wire);
        events
    }

    /// Expire incomplete datagrams
    pub(crate) fn housekeeping(&mut self, wire: &mut Wire<'_>) {
        self.housekeeping_at = None;
        if let Some(reassembly) = self.pipeline.get_stage_mut::<Reassembly>(REASSEMBLY) {
            let expired = reassembly.expire(wire.now);
            if expired > 0 {
                debug!("node {}: {expired} datagrams timed out", self.name);
            }
        }
        self.schedule_housekeeping(wire);
    }

    fn schedule_housekeeping(&mut self, wire: &mut Wire<'_>) {
        let Some(deadline) = self
            .pipeline
            .get_stage::<Reassembly>(REASSEMBLY)
            .and_then(Reassembly::next_deadline)
        else {
            return;
        };
        if self.housekeeping_at.is_none_or(|at| deadline < at) {
            self.housekeeping_at = Some(deadline);
            wire.sched.schedule_at(deadline, Event::Housekeeping(self.id));
        }
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("interfaces", &self.interfaces)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod test {
    use super::{Node, NodeId, NodeKind};
    use crate::config::SimConfig;
    use crate::error::SimError;
    use crate::link::{Link, LinkConfig, LinkEnd, LinkId, Wire};
    use crate::scheduler::Scheduler;
    use crate::simulator::Event;
    use ipnet::IpNet;
    use nat::{StaticNat, StaticNatRule};
    use net::interface::{AdminState, InterfaceId};
    use net::packet::DoneReason;
    use net::packet::test_utils::{addr, addr_v4, build_test_udp_packet};
    use pipeline::stages::NextHop;
    use stats::{DropRecorder, DropReporter};
    use std::sync::Arc;
    use tracing_test::traced_test;

    fn net(s: &str) -> IpNet {
        s.parse().unwrap()
    }

    fn router(recorder: &Arc<DropRecorder>, config: &SimConfig) -> Node {
        let drops = DropReporter::new(recorder.clone());
        let mut node = Node::new(NodeId(1), "n1", NodeKind::Router, config, &drops).unwrap();
        let if1 = node.attach_link(LinkEnd {
            link: LinkId(0),
            side: 1,
        });
        let if2 = node.attach_link(LinkEnd {
            link: LinkId(1),
            side: 0,
        });
        node.add_address(if1, net("192.168.1.2/24")).unwrap();
        node.add_address(if2, net("203.82.48.1/24")).unwrap();
        node
    }

    fn links() -> Vec<Link> {
        vec![
            Link::new(
                LinkConfig::default(),
                (NodeId(0), InterfaceId::new(1)),
                (NodeId(1), InterfaceId::new(1)),
            ),
            Link::new(
                LinkConfig::default().with_mtu(576),
                (NodeId(1), InterfaceId::new(2)),
                (NodeId(2), InterfaceId::new(1)),
            ),
        ]
    }

    #[test]
    fn pipeline_layout_and_nat_install() {
        let recorder = Arc::new(DropRecorder::new());
        let mut node = router(&recorder, &SimConfig::default());
        let mut nat = StaticNat::new("nat", DropReporter::discard());
        nat.set_inside(InterfaceId::new(1)).unwrap();
        nat.set_outside(InterfaceId::new(2)).unwrap();
        nat.add_rule(StaticNatRule::new(
            addr_v4("192.168.1.1"),
            49153,
            addr_v4("203.82.48.100"),
            8080,
            0,
        ))
        .unwrap();
        node.install_nat(nat).unwrap();
        let stages: Vec<_> = node.stage_names().collect();
        assert_eq!(
            stages,
            [
                "iface-in",
                "checksum",
                "route",
                "nat",
                "reroute",
                "reassembly",
                "ttl",
                "iface-out"
            ]
        );
        assert_eq!(node.nat().map(|nat| nat.rules().len()), Some(1));

        let mut host = Node::new(
            NodeId(0),
            "n0",
            NodeKind::Host,
            &SimConfig::default(),
            &DropReporter::discard(),
        )
        .unwrap();
        let nat = StaticNat::new("nat", DropReporter::discard());
        assert!(matches!(host.install_nat(nat), Err(SimError::NotARouter(_))));
        assert_eq!(host.num_interfaces(), 1);
        assert!(host.set_admin_state(InterfaceId::new(3), AdminState::Down).is_err());
    }

    #[test]
    fn source_address_selection() {
        let recorder = Arc::new(DropRecorder::new());
        let mut node = router(&recorder, &SimConfig::default());
        node.set_default_route(NextHop::new(InterfaceId::new(2), Some(addr("203.82.48.2"))))
            .unwrap();
        assert_eq!(
            node.source_address_for(addr("192.168.1.1")),
            Some(addr("192.168.1.2"))
        );
        assert_eq!(
            node.source_address_for(addr("8.8.8.8")),
            Some(addr("203.82.48.1"))
        );
        // no IPv6 address on the way out
        assert_eq!(node.source_address_for(addr("2001:db8::1")), None);
    }

    #[test]
    #[traced_test]
    fn forwarding_fragments_and_drops() {
        let recorder = Arc::new(DropRecorder::new());
        let mut node = router(&recorder, &SimConfig::default().with_checksum(true));
        let mut links = links();
        let mut sched = Scheduler::new();
        let mut wire = Wire {
            now: sched.now(),
            links: &mut links,
            sched: &mut sched,
        };

        // 1000 bytes of payload through a 576 bytes MTU
        let mut packet = build_test_udp_packet("192.168.1.1", "203.82.48.2", 49153, 9);
        packet.set_payload(vec![7u8; 1000]);
        packet.update_checksum();
        let events = node.receive(&mut wire, InterfaceId::new(1), packet);
        assert!(events.is_empty());
        assert_eq!(sched.len(), 2);

        let mut wire = Wire {
            now: sched.now(),
            links: &mut links,
            sched: &mut sched,
        };
        let mut expired = build_test_udp_packet("192.168.1.1", "203.82.48.2", 49153, 9);
        expired.headers_mut().set_ttl(1);
        expired.update_checksum();
        node.receive(&mut wire, InterfaceId::new(1), expired);
        node.set_admin_state(InterfaceId::new(2), AdminState::Down)
            .unwrap();
        let mut down = build_test_udp_packet("192.168.1.1", "203.82.48.2", 49153, 9);
        down.update_checksum();
        node.receive(&mut wire, InterfaceId::new(1), down);
        assert_eq!(recorder.count(DoneReason::HopLimitExceeded), 1);
        assert_eq!(recorder.count(DoneReason::InterfaceAdmDown), 1);
        assert!(logs_contain("node n1: interface 2 is Down"));
        assert_eq!(
            recorder.events()[0].origin.as_deref(),
            Some("n1")
        );

        let mut fragments = Vec::new();
        while let Some((_, event)) = sched.pop() {
            if let Event::Deliver { packet, .. } = event {
                fragments.push(packet);
            }
        }
        assert_eq!(fragments.len(), 2);
        let first = fragments[0].headers().fragment().unwrap();
        let second = fragments[1].headers().fragment().unwrap();
        assert!(first.more && !second.more);
        assert_eq!(first.offset, 0);
        assert_eq!(usize::from(second.offset), fragments[0].payload_len());
        assert_eq!(fragments[0].payload_len() + fragments[1].payload_len(), 1000);
        assert!(fragments[1].headers().transport().is_none());
        assert!(fragments.iter().all(net::packet::Packet::checksum_valid));
    }
}
