// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use crate::NetworkFunction;
use net::packet::{DoneReason, Packet};
use stats::DropReporter;
use tracing::debug;

/// Verifies the IPv4 header checksum of received packets, when checksums are enabled.
pub struct ChecksumCheck {
    enabled: bool,
    drops: DropReporter,
}

impl ChecksumCheck {
    #[must_use]
    pub fn new(enabled: bool, drops: DropReporter) -> Self {
        Self { enabled, drops }
    }
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.enabled
    }
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }
}

impl NetworkFunction for ChecksumCheck {
    fn process<'a, Input: Iterator<Item = Packet> + 'a>(
        &'a mut self,
        input: Input,
    ) -> impl Iterator<Item = Packet> + 'a {
        input.map(|mut packet| {
            if self.enabled && !packet.is_done() && !packet.checksum_valid() {
                debug!("Bad header checksum: {packet}");
                packet.done(DoneReason::BadChecksum);
                self.drops.report(&packet, DoneReason::BadChecksum);
            }
            packet
        })
    }
}
