// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use crate::NetworkFunction;
use bytes::{Bytes, BytesMut};
use net::headers::Fragment;
use net::ip::NextHeader;
use net::packet::{DoneReason, Packet};
use net::time::SimTime;
use stats::DropReporter;
use std::collections::{BTreeMap, HashMap};
use std::net::IpAddr;
use std::time::Duration;
use tracing::debug;

/// How long an incomplete datagram is kept before it is given up on
pub const DEFAULT_FRAGMENT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct FragmentKey {
    src: IpAddr,
    dst: IpAddr,
    proto: NextHeader,
    id: u16,
}

struct PendingDatagram {
    /// the fragment at offset 0, once received: it carries the transport header
    first: Option<Packet>,
    /// the first fragment received, whatever its offset. Used to report a timeout.
    witness: Packet,
    pieces: BTreeMap<u16, Bytes>,
    /// total payload length, known once the last fragment arrived
    total: Option<usize>,
    deadline: SimTime,
}

impl PendingDatagram {
    fn new(packet: &Packet, deadline: SimTime) -> Self {
        Self {
            first: None,
            witness: packet.clone(),
            pieces: BTreeMap::new(),
            total: None,
            deadline,
        }
    }

    fn absorb(&mut self, packet: Packet, frag: Fragment) {
        let end = usize::from(frag.offset) + packet.payload_len();
        if !frag.more {
            self.total = Some(end);
        }
        self.pieces.insert(frag.offset, packet.payload().clone());
        if frag.offset == 0 {
            self.first = Some(packet);
        }
    }

    /// Rebuild the datagram if all its bytes are there
    fn complete(&mut self) -> Option<Packet> {
        let total = self.total?;
        let mut next = 0usize;
        for (offset, data) in &self.pieces {
            if usize::from(*offset) > next {
                return None;
            }
            next = next.max(usize::from(*offset) + data.len());
        }
        if next < total {
            return None;
        }
        let mut payload = BytesMut::with_capacity(total);
        for (offset, data) in &self.pieces {
            let offset = usize::from(*offset);
            let end = offset + data.len();
            if end > payload.len() {
                payload.extend_from_slice(&data[payload.len() - offset..]);
            }
        }
        payload.truncate(total);
        let mut packet = self.first.take()?;
        packet.headers_mut().set_fragment(None);
        packet.set_payload(payload.freeze());
        Some(packet)
    }
}

/// Reassembles fragmented datagrams addressed to the node.
///
/// Fragments are absorbed until the datagram is complete, at which point the reassembled packet
/// continues down the pipeline in place of the last fragment. Datagrams that stay incomplete
/// are dropped by [`Reassembly::expire`] with [`DoneReason::FragmentTimeout`].
pub struct Reassembly {
    timeout: Duration,
    pending: HashMap<FragmentKey, PendingDatagram>,
    drops: DropReporter,
}

impl Reassembly {
    #[must_use]
    pub fn new(timeout: Duration, drops: DropReporter) -> Self {
        Self {
            timeout,
            pending: HashMap::new(),
            drops,
        }
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Number of datagrams waiting for fragments
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// The earliest time at which an incomplete datagram expires
    #[must_use]
    pub fn next_deadline(&self) -> Option<SimTime> {
        self.pending.values().map(|p| p.deadline).min()
    }

    /// Drop every incomplete datagram whose deadline is not after `now`.
    /// Returns the number of datagrams dropped.
    pub fn expire(&mut self, now: SimTime) -> usize {
        let expired: Vec<FragmentKey> = self
            .pending
            .iter()
            .filter(|(_, p)| p.deadline <= now)
            .map(|(key, _)| *key)
            .collect();
        for key in &expired {
            if let Some(mut pending) = self.pending.remove(key) {
                debug!("Reassembly of datagram {} from {} timed out", key.id, key.src);
                pending.witness.get_meta_mut().timestamp = now;
                pending.witness.done(DoneReason::FragmentTimeout);
                self.drops
                    .report(&pending.witness, DoneReason::FragmentTimeout);
            }
        }
        expired.len()
    }

    fn absorb(&mut self, packet: Packet, frag: Fragment) -> Option<Packet> {
        let hdrs = packet.headers();
        let key = FragmentKey {
            src: hdrs.source(),
            dst: hdrs.destination(),
            proto: hdrs.next_header(),
            id: frag.id,
        };
        let deadline = packet.get_meta().timestamp + self.timeout;
        let pending = self
            .pending
            .entry(key)
            .or_insert_with(|| PendingDatagram::new(&packet, deadline));
        pending.absorb(packet, frag);
        let done = pending.complete()?;
        self.pending.remove(&key);
        Some(done)
    }
}

impl NetworkFunction for Reassembly {
    fn process<'a, Input: Iterator<Item = Packet> + 'a>(
        &'a mut self,
        input: Input,
    ) -> impl Iterator<Item = Packet> + 'a {
        input.filter_map(|packet| {
            if packet.is_done() || !packet.get_meta().is_local {
                return Some(packet);
            }
            match packet.headers().fragment() {
                None => Some(packet),
                Some(frag) => self.absorb(packet, frag),
            }
        })
    }
}

#[cfg(test)]
mod test {
    use super::{DEFAULT_FRAGMENT_TIMEOUT, Reassembly};
    use crate::NetworkFunction;
    use net::headers::{Fragment, Headers};
    use net::ip::NextHeader;
    use net::packet::test_utils::{addr, build_test_udp_packet};
    use net::packet::{DoneReason, Packet};
    use net::time::SimTime;
    use stats::{DropRecorder, DropReporter};
    use std::sync::Arc;

    fn fragment(offset: u16, more: bool, data: &[u8]) -> Packet {
        let frag = Fragment { id: 7, offset, more };
        let mut packet = if offset == 0 {
            build_test_udp_packet("10.1.1.1", "10.1.1.2", 49153, 9)
        } else {
            Packet::new(
                Headers::new_raw(addr("10.1.1.1"), addr("10.1.1.2"), NextHeader::UDP),
                Vec::new(),
            )
        };
        packet.set_payload(data.to_vec());
        packet.headers_mut().set_fragment(Some(frag));
        packet.get_meta_mut().is_local = true;
        packet.get_meta_mut().timestamp = SimTime::from_secs(1);
        packet
    }

    #[test]
    fn out_of_order_fragments_are_reassembled() {
        let mut nf = Reassembly::new(DEFAULT_FRAGMENT_TIMEOUT, DropReporter::discard());
        let frags = vec![
            fragment(8, false, b"89"),
            fragment(0, true, b"0123"),
            fragment(4, true, b"4567"),
        ];
        let out: Vec<_> = nf.process(frags.into_iter()).collect();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].payload().as_ref(), b"0123456789");
        assert_eq!(out[0].headers().fragment(), None);
        assert_eq!(out[0].headers().src_port(), Some(49153));
        assert_eq!(nf.pending(), 0);
    }

    #[test]
    fn incomplete_datagram_times_out() {
        let recorder = Arc::new(DropRecorder::new());
        let mut nf = Reassembly::new(DEFAULT_FRAGMENT_TIMEOUT, DropReporter::new(recorder.clone()));
        let unfragmented = build_test_udp_packet("10.1.1.1", "10.1.1.2", 1, 2);
        let frags = vec![fragment(0, true, b"0123"), unfragmented];
        let out: Vec<_> = nf.process(frags.into_iter()).collect();
        assert_eq!(out.len(), 1);
        assert_eq!(nf.pending(), 1);
        assert_eq!(nf.next_deadline(), Some(SimTime::from_secs(31)));

        assert_eq!(nf.expire(SimTime::from_secs(30)), 0);
        assert_eq!(nf.expire(SimTime::from_secs(31)), 1);
        assert_eq!(nf.pending(), 0);
        assert_eq!(recorder.count(DoneReason::FragmentTimeout), 1);
        assert_eq!(recorder.events()[0].timestamp, SimTime::from_secs(31));
    }
}
