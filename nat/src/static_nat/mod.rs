// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The static NAT translator

mod bindings;
mod display;
mod rules;


pub use bindings::{Binding, BindingConflict, BindingTable, NatEndpoint};
pub use rules::{ProtoMatch, RuleTable, StaticNatRule};

use crate::{NatError, NatSide};
use net::interface::InterfaceId;
use net::packet::{DoneReason, Packet};
use pipeline::NetworkFunction;
use stats::{DropReporter, PacketDropStats};
use std::io;
use std::net::{IpAddr, Ipv4Addr};
use tracing::{debug, error, info, warn};

/// Outcome of a translation attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NatVerdict {
    /// The packet was rewritten and may be forwarded. `new_binding` tells if this packet
    /// created the binding used.
    Translated { new_binding: bool },
    /// The packet was marked done with the given reason and reported
    Dropped(DoneReason),
}

/// Translation counters
#[derive(Debug, Clone)]
pub struct NatStats {
    pub egress_translated: u64,
    pub ingress_translated: u64,
    pub bindings_created: u64,
    pub drops: PacketDropStats,
}

impl NatStats {
    fn new(name: &str) -> Self {
        Self {
            egress_translated: 0,
            ingress_translated: 0,
            bindings_created: 0,
            drops: PacketDropStats::new(name),
        }
    }
}

/// A static NAT translator, sitting between one inside and one outside interface of a node.
///
/// The translator owns its [`RuleTable`] and its [`BindingTable`]. Dropped packets are marked
/// done and reported to the [`DropReporter`] given at construction.
///
/// As a pipeline stage, the translator expects packets that were routed already. Packets for the
/// node itself and packets from the inside that are not headed out of the outside interface go
/// through untouched.
pub struct StaticNat {
    name: String,
    inside: Option<InterfaceId>,
    outside: Option<InterfaceId>,
    rules: RuleTable,
    bindings: BindingTable,
    drops: DropReporter,
    stats: NatStats,
}

impl StaticNat {
    #[must_use]
    pub fn new(name: &str, drops: DropReporter) -> Self {
        Self {
            name: name.to_owned(),
            inside: None,
            outside: None,
            rules: RuleTable::new(),
            bindings: BindingTable::new(),
            drops,
            stats: NatStats::new(name),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Set the inside (private) interface.
    ///
    /// # Errors
    ///
    /// Fails if `ifindex` is already the outside interface.
    pub fn set_inside(&mut self, ifindex: InterfaceId) -> Result<(), NatError> {
        if self.outside == Some(ifindex) {
            return Err(NatError::SameInterface(ifindex));
        }
        debug!("{}: inside interface is {ifindex}", self.name);
        self.inside = Some(ifindex);
        Ok(())
    }

    /// Set the outside (public) interface.
    ///
    /// # Errors
    ///
    /// Fails if `ifindex` is already the inside interface.
    pub fn set_outside(&mut self, ifindex: InterfaceId) -> Result<(), NatError> {
        if self.inside == Some(ifindex) {
            return Err(NatError::SameInterface(ifindex));
        }
        debug!("{}: outside interface is {ifindex}", self.name);
        self.outside = Some(ifindex);
        Ok(())
    }

    #[must_use]
    pub fn inside(&self) -> Option<InterfaceId> {
        self.inside
    }

    #[must_use]
    pub fn outside(&self) -> Option<InterfaceId> {
        self.outside
    }

    /// Append a static rule.
    ///
    /// # Errors
    ///
    /// Returns [`NatError::InvalidRule`] if the rule can't match any packet.
    pub fn add_rule(&mut self, rule: StaticNatRule) -> Result<(), NatError> {
        rule.validate()?;
        info!("{}: added rule {rule}", self.name);
        self.rules.add_rule(rule);
        Ok(())
    }

    /// Tell if both sides of the translator are set.
    ///
    /// # Errors
    ///
    /// Returns [`NatError::NotConfigured`] naming the first missing side.
    pub fn check_config(&self) -> Result<(InterfaceId, InterfaceId), NatError> {
        let inside = self.inside.ok_or(NatError::NotConfigured {
            missing: NatSide::Inside,
        })?;
        let outside = self.outside.ok_or(NatError::NotConfigured {
            missing: NatSide::Outside,
        })?;
        Ok((inside, outside))
    }

    #[must_use]
    pub fn rules(&self) -> &RuleTable {
        &self.rules
    }

    #[must_use]
    pub fn bindings(&self) -> &BindingTable {
        &self.bindings
    }

    #[must_use]
    pub fn stats(&self) -> &NatStats {
        &self.stats
    }

    /// Write the rule table to `out`.
    ///
    /// # Errors
    ///
    /// Forwards the errors of `out`.
    pub fn print_table<W: io::Write>(&self, out: &mut W) -> io::Result<()> {
        write!(out, "{}", self.rules)
    }

    fn drop_packet(&mut self, packet: &mut Packet, reason: DoneReason) -> NatVerdict {
        debug!("{}: dropping packet ({reason}): {packet}", self.name);
        packet.done(reason);
        self.drops.report(packet, reason);
        self.stats.drops.incr(reason, 1);
        NatVerdict::Dropped(reason)
    }

    /// Translate a packet received on the inside interface, rewriting its source.
    ///
    /// Packets with no binding and no matching rule are marked done with
    /// [`DoneReason::NatNoMatch`]; they are never left untranslated.
    ///
    /// # Errors
    ///
    /// Fails, leaving the packet untouched, if the translator is not configured or if `iif` is
    /// not the inside interface.
    pub fn translate_egress(
        &mut self,
        packet: &mut Packet,
        iif: InterfaceId,
    ) -> Result<NatVerdict, NatError> {
        let (inside, _) = self.check_config()?;
        if iif != inside {
            return Err(NatError::WrongSide {
                iif,
                expected: NatSide::Inside,
            });
        }
        let IpAddr::V4(src) = packet.headers().source() else {
            return Ok(self.drop_packet(packet, DoneReason::Unhandled));
        };
        let original = NatEndpoint::new(
            src,
            packet.headers().src_port(),
            packet.headers().next_header(),
        );

        let (translated, new_binding) = match self.bindings.lookup_original(&original) {
            Some(binding) => (binding.translated, false),
            None => {
                let Some(rule) =
                    self.rules
                        .find_matching_rule(original.addr, original.port, original.proto)
                else {
                    return Ok(self.drop_packet(packet, DoneReason::NatNoMatch));
                };
                let (addr, port) = rule.translate(original.port);
                let binding = Binding {
                    original,
                    translated: NatEndpoint::new(addr, port, original.proto),
                };
                match self.bindings.insert(binding).copied() {
                    Ok(binding) => {
                        info!("{}: new binding {binding}", self.name);
                        self.stats.bindings_created += 1;
                        (binding.translated, true)
                    }
                    Err(conflict) => {
                        warn!("{}: {conflict}", self.name);
                        return Ok(self.drop_packet(packet, DoneReason::NatConflict));
                    }
                }
            }
        };

        rewrite_source(packet, translated.addr, translated.port);
        self.stats.egress_translated += 1;
        debug!("{}: egress translated: {packet}", self.name);
        Ok(NatVerdict::Translated { new_binding })
    }

    /// Translate a packet received on the outside interface, rewriting its destination back
    /// to the original endpoint of a binding.
    ///
    /// Packets addressed to an endpoint no binding translates to are marked done with
    /// [`DoneReason::NatNoMatch`].
    ///
    /// # Errors
    ///
    /// Fails, leaving the packet untouched, if the translator is not configured or if `iif` is
    /// not the outside interface.
    pub fn translate_ingress(
        &mut self,
        packet: &mut Packet,
        iif: InterfaceId,
    ) -> Result<NatVerdict, NatError> {
        let (_, outside) = self.check_config()?;
        if iif != outside {
            return Err(NatError::WrongSide {
                iif,
                expected: NatSide::Outside,
            });
        }
        let IpAddr::V4(dst) = packet.headers().destination() else {
            return Ok(self.drop_packet(packet, DoneReason::Unhandled));
        };
        let translated = NatEndpoint::new(
            dst,
            packet.headers().dst_port(),
            packet.headers().next_header(),
        );
        let Some(binding) = self.bindings.lookup_translated(&translated) else {
            return Ok(self.drop_packet(packet, DoneReason::NatNoMatch));
        };
        let original = binding.original;

        rewrite_destination(packet, original.addr, original.port);
        self.stats.ingress_translated += 1;
        debug!("{}: ingress translated: {packet}", self.name);
        Ok(NatVerdict::Translated { new_binding: false })
    }
}

fn rewrite_source(packet: &mut Packet, addr: Ipv4Addr, port: Option<u16>) {
    let headers = packet.headers_mut();
    headers.set_source(IpAddr::V4(addr));
    if let Some(port) = port {
        headers.set_src_port(port);
    }
}

fn rewrite_destination(packet: &mut Packet, addr: Ipv4Addr, port: Option<u16>) {
    let headers = packet.headers_mut();
    headers.set_destination(IpAddr::V4(addr));
    if let Some(port) = port {
        headers.set_dst_port(port);
    }
}

impl NetworkFunction for StaticNat {
    fn process<'a, Input: Iterator<Item = Packet> + 'a>(
        &'a mut self,
        input: Input,
    ) -> impl Iterator<Item = Packet> + 'a {
        input.map(|mut packet| {
            if packet.is_done() {
                return packet;
            }
            let (inside, outside) = match self.check_config() {
                Ok(sides) => sides,
                Err(e) => {
                    warn!("{}: {e}", self.name);
                    self.drop_packet(&mut packet, DoneReason::NatNotConfigured);
                    return packet;
                }
            };
            let meta = packet.get_meta();
            if meta.is_local {
                return packet;
            }
            // runs after routing: egress needs the outgoing interface
            let (iif, oif) = (meta.iif, meta.oif);
            let result = if iif == inside && oif == Some(outside) {
                self.translate_egress(&mut packet, iif)
            } else if iif == outside {
                self.translate_ingress(&mut packet, iif)
            } else {
                return packet;
            };
            if let Err(e) = result {
                error!("{}: {e}", self.name);
                self.drop_packet(&mut packet, DoneReason::InternalFailure);
            }
            packet
        })
    }
}
