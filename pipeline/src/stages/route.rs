// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use crate::NetworkFunction;
use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use left_right::{Absorb, ReadGuard, ReadHandle, WriteHandle};
use net::interface::InterfaceId;
use net::packet::{DoneReason, Packet};
use prefix_trie::PrefixMap;
use stats::DropReporter;
use std::collections::{HashMap, HashSet};
use std::fmt::{Display, Formatter};
use std::net::IpAddr;
use tracing::{debug, error, trace};

/// Where to send packets matching a route
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NextHop {
    pub oif: InterfaceId,
    /// gateway to send packets to. None means the destination is on-link.
    pub gateway: Option<IpAddr>,
}

impl NextHop {
    #[must_use]
    pub fn new(oif: InterfaceId, gateway: Option<IpAddr>) -> Self {
        Self { oif, gateway }
    }
}

impl Display for NextHop {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.gateway {
            Some(gw) => write!(f, "via {gw} dev {}", self.oif),
            None => write!(f, "dev {}", self.oif),
        }
    }
}

/// A static routing table with longest prefix match
#[derive(Default, Clone)]
pub struct StaticRoutes {
    v4: PrefixMap<Ipv4Net, NextHop>,
    v6: PrefixMap<Ipv6Net, NextHop>,
}

impl StaticRoutes {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a route, returning the next-hop it replaces, if any
    pub fn add(&mut self, prefix: IpNet, nhop: NextHop) -> Option<NextHop> {
        match prefix.trunc() {
            IpNet::V4(prefix) => self.v4.insert(prefix, nhop),
            IpNet::V6(prefix) => self.v6.insert(prefix, nhop),
        }
    }

    /// Add default routes (IPv4 and IPv6) towards `nhop`
    pub fn set_default(&mut self, nhop: NextHop) {
        self.v4.insert(Ipv4Net::default(), nhop);
        self.v6.insert(Ipv6Net::default(), nhop);
    }

    /// Longest prefix match for `addr`
    #[must_use]
    pub fn lookup(&self, addr: IpAddr) -> Option<&NextHop> {
        match addr {
            IpAddr::V4(a) => self.v4.get_lpm(&Ipv4Net::from(a)).map(|(_, nhop)| nhop),
            IpAddr::V6(a) => self.v6.get_lpm(&Ipv6Net::from(a)).map(|(_, nhop)| nhop),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.v4.len() + self.v6.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (IpNet, &NextHop)> {
        self.v4
            .iter()
            .map(|(p, nhop)| (IpNet::V4(*p), nhop))
            .chain(self.v6.iter().map(|(p, nhop)| (IpNet::V6(*p), nhop)))
    }
}

impl Display for StaticRoutes {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (prefix, nhop) in self.iter() {
            writeln!(f, "{prefix:<24} {nhop}")?;
        }
        Ok(())
    }
}

#[derive(Debug)]
pub enum FibChange {
    AddInterface(InterfaceId),
    AddAddress(InterfaceId, IpNet),
    AddRoute(IpNet, NextHop),
    SetDefault(NextHop),
}

/// The forwarding state of a node: its routes, its own addresses and the interfaces routes
/// may point to.
#[derive(Default, Clone)]
pub struct Fib {
    routes: StaticRoutes,
    local: HashMap<IpAddr, InterfaceId>,
    interfaces: HashSet<InterfaceId>,
}

impl Fib {
    #[must_use]
    pub fn routes(&self) -> &StaticRoutes {
        &self.routes
    }
    /// Tell if `addr` is an address of the node
    #[must_use]
    pub fn is_local(&self, addr: IpAddr) -> bool {
        self.local.contains_key(&addr)
    }
    #[must_use]
    pub fn has_interface(&self, ifindex: InterfaceId) -> bool {
        self.interfaces.contains(&ifindex)
    }
    /// Longest prefix match for `addr`
    #[must_use]
    pub fn lookup(&self, addr: IpAddr) -> Option<&NextHop> {
        self.routes.lookup(addr)
    }
}

impl Absorb<FibChange> for Fib {
    fn absorb_first(&mut self, change: &mut FibChange, _: &Self) {
        match change {
            FibChange::AddInterface(ifindex) => {
                self.interfaces.insert(*ifindex);
            }
            FibChange::AddAddress(ifindex, addr) => {
                // the connected prefix is routed out of the interface
                self.local.insert(addr.addr(), *ifindex);
                self.routes.add(*addr, NextHop::new(*ifindex, None));
            }
            FibChange::AddRoute(prefix, nhop) => {
                self.routes.add(*prefix, *nhop);
            }
            FibChange::SetDefault(nhop) => self.routes.set_default(*nhop),
        }
    }
    fn drop_first(self: Box<Self>) {}
    fn sync_with(&mut self, first: &Self) {
        *self = first.clone();
    }
}

/// The single writer of a [`Fib`]. Every change is published right away.
pub struct FibWriter(WriteHandle<Fib, FibChange>);

impl FibWriter {
    /// create a fib, providing a writer and a reader
    #[must_use]
    pub fn new() -> (FibWriter, FibReader) {
        let (w, r) = left_right::new_from_empty::<Fib, FibChange>(Fib::default());
        (FibWriter(w), FibReader(r))
    }
    #[must_use]
    pub fn enter(&self) -> Option<ReadGuard<'_, Fib>> {
        self.0.enter()
    }
    fn apply(&mut self, change: FibChange) {
        self.0.append(change);
        self.0.publish();
    }
    /// Register an interface routes may point to
    pub fn add_interface(&mut self, ifindex: InterfaceId) {
        self.apply(FibChange::AddInterface(ifindex));
    }
    /// Register a local address and its connected prefix
    pub fn add_address(&mut self, ifindex: InterfaceId, addr: IpNet) {
        self.apply(FibChange::AddAddress(ifindex, addr));
    }
    pub fn add_route(&mut self, prefix: IpNet, nhop: NextHop) {
        self.apply(FibChange::AddRoute(prefix, nhop));
    }
    /// Add default routes (IPv4 and IPv6) towards `nhop`
    pub fn set_default(&mut self, nhop: NextHop) {
        self.apply(FibChange::SetDefault(nhop));
    }
    #[must_use]
    pub fn as_fibreader(&self) -> FibReader {
        FibReader((*self.0).clone())
    }
}

#[derive(Clone, Debug)]
pub struct FibReader(ReadHandle<Fib>);

impl FibReader {
    #[must_use]
    pub fn enter(&self) -> Option<ReadGuard<'_, Fib>> {
        self.0.enter()
    }
}

/// Decides whether packets are for the node itself or which interface they go out of.
///
/// Local packets get `is_local` set. Forwarded packets get `oif` and `nh_addr` set. A prior
/// decision is discarded, so a second instance placed after a stage that rewrites destinations
/// routes packets again.
pub struct RouteLookup {
    name: String,
    fib: FibReader,
    drops: DropReporter,
}

impl RouteLookup {
    #[must_use]
    pub fn new(name: &str, fib: FibReader, drops: DropReporter) -> Self {
        Self {
            name: name.to_owned(),
            fib,
            drops,
        }
    }

    fn route(&self, packet: &mut Packet) -> Result<(), DoneReason> {
        let meta = packet.get_meta_mut();
        meta.is_local = false;
        meta.oif = None;
        meta.nh_addr = None;

        let Some(fib) = self.fib.enter() else {
            error!("{}: no fib to route with", self.name);
            return Err(DoneReason::InternalFailure);
        };
        let dst = packet.headers().destination();
        if fib.is_local(dst) {
            packet.get_meta_mut().is_local = true;
            return Ok(());
        }
        let Some(nhop) = fib.lookup(dst) else {
            return Err(DoneReason::RouteFailure);
        };
        if !fib.has_interface(nhop.oif) {
            return Err(DoneReason::RouteError);
        }
        trace!("{}: {dst} {nhop}", self.name);
        let meta = packet.get_meta_mut();
        meta.oif = Some(nhop.oif);
        meta.nh_addr = Some(nhop.gateway.unwrap_or(dst));
        Ok(())
    }
}

impl NetworkFunction for RouteLookup {
    fn process<'a, Input: Iterator<Item = Packet> + 'a>(
        &'a mut self,
        input: Input,
    ) -> impl Iterator<Item = Packet> + 'a {
        input.map(|mut packet| {
            if packet.is_done() {
                return packet;
            }
            if let Err(reason) = self.route(&mut packet) {
                debug!("{}: can't route packet ({reason}): {packet}", self.name);
                packet.done(reason);
                self.drops.report(&packet, reason);
            }
            packet
        })
    }
}

#[cfg(test)]
mod test {
    use super::{FibWriter, NextHop, RouteLookup, StaticRoutes};
    use crate::NetworkFunction;
    use ipnet::IpNet;
    use net::interface::InterfaceId;
    use net::packet::DoneReason;
    use net::packet::test_utils::{addr, build_test_udp_packet};
    use stats::{DropRecorder, DropReporter};
    use std::sync::Arc;

    fn net(s: &str) -> IpNet {
        s.parse().unwrap()
    }

    #[test]
    fn longest_prefix_wins() {
        let mut routes = StaticRoutes::new();
        let one = InterfaceId::new(1);
        let two = InterfaceId::new(2);
        routes.set_default(NextHop::new(one, Some(addr("10.0.0.1"))));
        routes.add(net("203.82.48.0/24"), NextHop::new(two, None));
        routes.add(net("203.82.48.77/24"), NextHop::new(two, None));

        assert_eq!(routes.lookup(addr("203.82.48.2")).map(|n| n.oif), Some(two));
        assert_eq!(routes.lookup(addr("8.8.8.8")).map(|n| n.oif), Some(one));
        assert_eq!(routes.lookup(addr("2001:1::1")).map(|n| n.oif), Some(one));
        // two defaults and one network prefix
        assert_eq!(routes.len(), 3);
    }

    #[test]
    fn local_forwarded_and_unroutable() {
        let recorder = Arc::new(DropRecorder::new());
        let (mut fib, reader) = FibWriter::new();
        fib.add_interface(InterfaceId::new(1));
        fib.add_interface(InterfaceId::new(2));
        fib.add_address(InterfaceId::new(1), net("192.168.1.2/24"));
        fib.add_address(InterfaceId::new(2), net("203.82.48.1/24"));
        fib.add_route(net("10.9.0.0/16"), NextHop::new(InterfaceId::new(7), None));
        let mut nf = RouteLookup::new("route", reader, DropReporter::new(recorder.clone()));

        let packets = ["192.168.1.2", "203.82.48.2", "172.16.0.1", "10.9.1.1"]
            .into_iter()
            .map(|dst| build_test_udp_packet("192.168.1.1", dst, 49153, 9));
        let out: Vec<_> = nf.process(packets).collect();

        assert!(out[0].get_meta().is_local);
        assert!(!out[0].is_done());
        assert_eq!(out[1].get_meta().oif, Some(InterfaceId::new(2)));
        assert_eq!(out[1].get_meta().nh_addr, Some(addr("203.82.48.2")));
        assert_eq!(out[2].get_done(), Some(DoneReason::RouteFailure));
        assert_eq!(out[3].get_done(), Some(DoneReason::RouteError));
        assert_eq!(recorder.len(), 2);
    }

    #[test]
    fn rewritten_destination_is_routed_again() {
        let (mut fib, reader) = FibWriter::new();
        fib.add_interface(InterfaceId::new(1));
        fib.add_interface(InterfaceId::new(2));
        fib.add_address(InterfaceId::new(1), net("192.168.1.2/24"));
        fib.add_address(InterfaceId::new(2), net("203.82.48.1/24"));
        let mut route = RouteLookup::new("route", reader.clone(), DropReporter::discard());
        let mut reroute = RouteLookup::new("reroute", fib.as_fibreader(), DropReporter::discard());

        let packet = build_test_udp_packet("203.82.48.2", "203.82.48.100", 9, 8080);
        let mut packet = route.process(std::iter::once(packet)).next().unwrap();
        assert_eq!(packet.get_meta().oif, Some(InterfaceId::new(2)));

        packet.headers_mut().set_destination(addr("192.168.1.1"));
        let packet = reroute.process(std::iter::once(packet)).next().unwrap();
        assert_eq!(packet.get_meta().oif, Some(InterfaceId::new(1)));
        assert_eq!(packet.get_meta().nh_addr, Some(addr("192.168.1.1")));

        // later changes are seen by every reader
        assert!(reader.enter().unwrap().lookup(addr("8.8.8.8")).is_none());
        fib.set_default(NextHop::new(InterfaceId::new(2), Some(addr("203.82.48.2"))));
        assert!(reader.enter().unwrap().lookup(addr("8.8.8.8")).is_some());
        assert!(fib.enter().unwrap().is_local(addr("203.82.48.1")));
    }
}
