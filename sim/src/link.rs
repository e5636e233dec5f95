// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Point-to-point links

use crate::node::NodeId;
use crate::scheduler::Scheduler;
use crate::simulator::Event;
use net::interface::InterfaceId;
use net::packet::Packet;
use net::time::SimTime;
use std::time::Duration;
use tracing::trace;

/// Characteristics of a point-to-point link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkConfig {
    /// propagation delay
    pub delay: Duration,
    /// bits per second
    pub data_rate: u64,
    /// largest IP packet, headers included
    pub mtu: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(2),
            data_rate: 5_000_000,
            mtu: Self::DEFAULT_MTU,
        }
    }
}

impl LinkConfig {
    pub const DEFAULT_MTU: usize = 1500;

    #[must_use]
    pub fn new(data_rate: u64, delay: Duration) -> Self {
        Self {
            delay,
            data_rate,
            mtu: Self::DEFAULT_MTU,
        }
    }
    #[must_use]
    pub fn with_mtu(mut self, mtu: usize) -> Self {
        self.mtu = mtu;
        self
    }

    /// Time to put `len` bytes on the wire
    #[must_use]
    pub fn serialization_time(&self, len: usize) -> Duration {
        if self.data_rate == 0 {
            return Duration::ZERO;
        }
        let nanos = (len as u128 * 8 * 1_000_000_000) / u128::from(self.data_rate);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }
}

/// Index of a link in the simulator
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct LinkId(pub(crate) usize);

/// One end of a link, as seen from the interface attached to it
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LinkEnd {
    pub link: LinkId,
    pub(crate) side: usize,
}

#[derive(Debug)]
pub(crate) struct Link {
    config: LinkConfig,
    ends: [(NodeId, InterfaceId); 2],
    /// per direction: when the transmitter is free again
    busy_until: [SimTime; 2],
}

impl Link {
    pub(crate) fn new(
        config: LinkConfig,
        a: (NodeId, InterfaceId),
        b: (NodeId, InterfaceId),
    ) -> Self {
        Self {
            config,
            ends: [a, b],
            busy_until: [SimTime::ZERO; 2],
        }
    }

    pub(crate) fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Queue `len` bytes from side `side` at `now`: returns when they reach the other side, and
    /// that side's node and interface. Transmissions in a direction are serialised in order.
    fn transmit(
        &mut self,
        side: usize,
        now: SimTime,
        len: usize,
    ) -> (SimTime, (NodeId, InterfaceId)) {
        let start = self.busy_until[side].max(now);
        let done = start + self.config.serialization_time(len);
        self.busy_until[side] = done;
        (done + self.config.delay, self.ends[1 - side])
    }
}

/// Size of a packet on the wire
pub(crate) fn wire_len(packet: &Packet) -> usize {
    let ip_header = if packet.headers().is_ipv4() { 20 } else { 40 };
    ip_header + packet.ip_payload_len()
}

/// What nodes need to put packets on links
pub(crate) struct Wire<'a> {
    pub(crate) now: SimTime,
    pub(crate) links: &'a mut [Link],
    pub(crate) sched: &'a mut Scheduler<Event>,
}

impl Wire<'_> {
    pub(crate) fn mtu(&self, end: LinkEnd) -> usize {
        self.links
            .get(end.link.0)
            .map_or(LinkConfig::DEFAULT_MTU, |link| link.config().mtu)
    }

    pub(crate) fn send(&mut self, end: LinkEnd, packet: Packet) {
        let Some(link) = self.links.get_mut(end.link.0) else {
            return;
        };
        let (arrival, (node, iif)) = link.transmit(end.side, self.now, wire_len(&packet));
        trace!("{packet} reaches node {node} on interface {iif} at {arrival}");
        self.sched.schedule_at(arrival, Event::Deliver { node, iif, packet });
    }
}
