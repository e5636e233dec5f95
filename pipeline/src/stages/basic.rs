// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use crate::NetworkFunction;
use net::packet::{DoneReason, Packet};
use stats::DropReporter;
use tracing::{debug, trace};

/// Network function that uses [`debug!`] to print the packet headers.
pub struct InspectHeaders;

impl NetworkFunction for InspectHeaders {
    fn process<'a, Input: Iterator<Item = Packet> + 'a>(
        &'a mut self,
        input: Input,
    ) -> impl Iterator<Item = Packet> + 'a {
        input.inspect(|packet| {
            debug!("packet: {packet}");
        })
    }
}

/// Network function that passes the packet through unchanged.
pub struct Passthrough;

impl NetworkFunction for Passthrough {
    fn process<'a, Input: Iterator<Item = Packet> + 'a>(
        &'a mut self,
        input: Input,
    ) -> impl Iterator<Item = Packet> + 'a {
        input
    }
}

/// Network function that decrements the TTL (hop limit) of packets being forwarded.
///
/// Packets for local delivery are left untouched. A packet whose TTL would reach 0 is marked
/// with [`DoneReason::HopLimitExceeded`].
pub struct DecrementTtl {
    drops: DropReporter,
}

impl DecrementTtl {
    #[must_use]
    pub fn new(drops: DropReporter) -> Self {
        Self { drops }
    }
}

impl NetworkFunction for DecrementTtl {
    fn process<'a, Input: Iterator<Item = Packet> + 'a>(
        &'a mut self,
        input: Input,
    ) -> impl Iterator<Item = Packet> + 'a {
        input.map(|mut packet| {
            if packet.is_done() || packet.get_meta().is_local {
                return packet;
            }
            if let Err(e) = packet.headers_mut().decrement_ttl() {
                trace!("{e}: {packet}");
                packet.done(DoneReason::HopLimitExceeded);
                self.drops.report(&packet, DoneReason::HopLimitExceeded);
            }
            packet
        })
    }
}

#[cfg(test)]
mod test {
    use super::DecrementTtl;
    use crate::NetworkFunction;
    use net::packet::DoneReason;
    use net::packet::test_utils::build_test_udp_packet;
    use stats::{DropRecorder, DropReporter};
    use std::sync::Arc;

    #[test]
    fn ttl_expiry_is_reported() {
        let recorder = Arc::new(DropRecorder::new());
        let mut nf = DecrementTtl::new(DropReporter::new(recorder.clone()));

        let mut expiring = build_test_udp_packet("10.1.1.1", "10.1.1.2", 1, 2);
        expiring.headers_mut().set_ttl(1);
        let mut local = build_test_udp_packet("10.1.1.1", "10.1.1.2", 1, 2);
        local.headers_mut().set_ttl(1);
        local.get_meta_mut().is_local = true;
        let forwarded = build_test_udp_packet("10.1.1.1", "10.1.1.2", 1, 2);

        let out: Vec<_> = nf
            .process(vec![expiring, local, forwarded].into_iter())
            .collect();
        assert_eq!(out[0].get_done(), Some(DoneReason::HopLimitExceeded));
        assert_eq!(out[1].headers().ttl(), 1);
        assert!(!out[1].is_done());
        assert_eq!(out[2].headers().ttl(), 63);
        assert_eq!(recorder.count(DoneReason::HopLimitExceeded), 1);
        assert_eq!(recorder.len(), 1);
    }
}
