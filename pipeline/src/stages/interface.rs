// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use crate::NetworkFunction;
use net::interface::{AdminState, InterfaceId};
use net::packet::{DoneReason, Packet};
use stats::DropReporter;
use std::collections::HashMap;
use tracing::debug;

/// Which interface of a packet an [`InterfaceCheck`] looks at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceCheckMode {
    /// the interface the packet was received on
    Ingress,
    /// the interface the packet is to be sent out of. Packets for local delivery are skipped.
    Egress,
}

/// Drops packets received on, or routed out of, an interface that is unknown or down.
pub struct InterfaceCheck {
    mode: InterfaceCheckMode,
    interfaces: HashMap<InterfaceId, AdminState>,
    drops: DropReporter,
}

impl InterfaceCheck {
    #[must_use]
    pub fn new(mode: InterfaceCheckMode, drops: DropReporter) -> Self {
        Self {
            mode,
            interfaces: HashMap::new(),
            drops,
        }
    }
    #[must_use]
    pub fn ingress(drops: DropReporter) -> Self {
        Self::new(InterfaceCheckMode::Ingress, drops)
    }
    #[must_use]
    pub fn egress(drops: DropReporter) -> Self {
        Self::new(InterfaceCheckMode::Egress, drops)
    }
    #[must_use]
    pub fn mode(&self) -> InterfaceCheckMode {
        self.mode
    }
    /// Register an interface or change its admin state
    pub fn set_admin_state(&mut self, ifindex: InterfaceId, state: AdminState) {
        self.interfaces.insert(ifindex, state);
    }
    #[must_use]
    pub fn admin_state(&self, ifindex: InterfaceId) -> Option<AdminState> {
        self.interfaces.get(&ifindex).copied()
    }

    fn check(&self, ifindex: InterfaceId) -> Result<(), DoneReason> {
        match self.interfaces.get(&ifindex) {
            None => Err(DoneReason::InterfaceUnknown),
            Some(state) if !state.is_up() => Err(DoneReason::InterfaceAdmDown),
            Some(_) => Ok(()),
        }
    }
}

impl NetworkFunction for InterfaceCheck {
    fn process<'a, Input: Iterator<Item = Packet> + 'a>(
        &'a mut self,
        input: Input,
    ) -> impl Iterator<Item = Packet> + 'a {
        input.map(|mut packet| {
            if packet.is_done() {
                return packet;
            }
            let ifindex = match self.mode {
                InterfaceCheckMode::Ingress => Some(packet.get_meta().iif),
                InterfaceCheckMode::Egress if packet.get_meta().is_local => None,
                InterfaceCheckMode::Egress => packet.get_meta().oif,
            };
            if let Some(ifindex) = ifindex
                && let Err(reason) = self.check(ifindex)
            {
                debug!("Interface {ifindex} refused packet ({reason}): {packet}");
                packet.done(reason);
                self.drops.report(&packet, reason);
            }
            packet
        })
    }
}
