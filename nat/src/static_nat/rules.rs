// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Static translation rules

use crate::NatError;
use net::ip::NextHeader;
use std::net::Ipv4Addr;

/// Which protocols a rule applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtoMatch {
    /// any protocol. Configured with protocol number 0.
    Any,
    /// a single protocol
    Exact(NextHeader),
}

impl ProtoMatch {
    /// Map a protocol number to a [`ProtoMatch`]: 0 means any protocol.
    #[must_use]
    pub fn from_number(proto: u8) -> Self {
        match proto {
            0 => ProtoMatch::Any,
            n => ProtoMatch::Exact(NextHeader::new(n)),
        }
    }
    #[must_use]
    pub fn matches(&self, proto: NextHeader) -> bool {
        match self {
            ProtoMatch::Any => true,
            ProtoMatch::Exact(p) => *p == proto,
        }
    }
}

/// A static translation rule: a local endpoint and the global endpoint it is presented as.
///
/// Rules without ports translate the address only and leave ports untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticNatRule {
    local: Ipv4Addr,
    local_port: Option<u16>,
    global: Ipv4Addr,
    global_port: Option<u16>,
    proto: ProtoMatch,
}

impl StaticNatRule {
    /// A port translation rule. `proto` is a protocol number, 0 meaning any.
    #[must_use]
    pub fn new(
        local: Ipv4Addr,
        local_port: u16,
        global: Ipv4Addr,
        global_port: u16,
        proto: u8,
    ) -> Self {
        Self {
            local,
            local_port: Some(local_port),
            global,
            global_port: Some(global_port),
            proto: ProtoMatch::from_number(proto),
        }
    }

    /// An address-only rule. `proto` is a protocol number, 0 meaning any.
    #[must_use]
    pub fn address_only(local: Ipv4Addr, global: Ipv4Addr, proto: u8) -> Self {
        Self {
            local,
            local_port: None,
            global,
            global_port: None,
            proto: ProtoMatch::from_number(proto),
        }
    }

    #[must_use]
    pub fn local(&self) -> Ipv4Addr {
        self.local
    }
    #[must_use]
    pub fn local_port(&self) -> Option<u16> {
        self.local_port
    }
    #[must_use]
    pub fn global(&self) -> Ipv4Addr {
        self.global
    }
    #[must_use]
    pub fn global_port(&self) -> Option<u16> {
        self.global_port
    }
    #[must_use]
    pub fn proto(&self) -> ProtoMatch {
        self.proto
    }
    #[must_use]
    pub fn is_address_only(&self) -> bool {
        self.local_port.is_none()
    }

    /// Check that the rule can ever match something.
    ///
    /// # Errors
    ///
    /// Returns [`NatError::InvalidRule`] for port 0, or for ports on a protocol that has none.
    pub fn validate(&self) -> Result<(), NatError> {
        if self.local_port == Some(0) || self.global_port == Some(0) {
            return Err(NatError::InvalidRule(format!("{self:?}: port 0")));
        }
        if let ProtoMatch::Exact(proto) = self.proto
            && !self.is_address_only()
            && proto != NextHeader::TCP
            && proto != NextHeader::UDP
        {
            return Err(NatError::InvalidRule(format!(
                "{self:?}: protocol {proto} has no ports"
            )));
        }
        Ok(())
    }

    /// Tell if a flow originating from `addr`:`port` with protocol `proto` matches
    #[must_use]
    pub fn matches(&self, addr: Ipv4Addr, port: Option<u16>, proto: NextHeader) -> bool {
        self.local == addr
            && self.proto.matches(proto)
            && (self.local_port.is_none() || self.local_port == port)
    }

    /// The global endpoint a flow from local port `port` is translated to
    #[must_use]
    pub fn translate(&self, port: Option<u16>) -> (Ipv4Addr, Option<u16>) {
        (self.global, self.global_port.or(port))
    }
}

/// The ordered set of static rules of a translator. The first matching rule wins.
#[derive(Debug, Clone, Default)]
pub struct RuleTable {
    rules: Vec<StaticNatRule>,
}

impl RuleTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
    /// Append a rule. Duplicates are accepted, but only the first of them can ever match.
    pub fn add_rule(&mut self, rule: StaticNatRule) {
        self.rules.push(rule);
    }
    /// Find the first rule matching a flow from `addr`:`port` with protocol `proto`
    #[must_use]
    pub fn find_matching_rule(
        &self,
        addr: Ipv4Addr,
        port: Option<u16>,
        proto: NextHeader,
    ) -> Option<&StaticNatRule> {
        self.rules.iter().find(|rule| rule.matches(addr, port, proto))
    }
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
    /// The rules, in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &StaticNatRule> {
        self.rules.iter()
    }
}

#[cfg(test)]
mod test {
    use super::{ProtoMatch, RuleTable, StaticNatRule};
    use crate::NatError;
    use net::ip::NextHeader;
    use net::packet::test_utils::addr_v4;

    #[test]
    fn first_match_wins() {
        let mut table = RuleTable::new();
        let first = StaticNatRule::new(
            addr_v4("192.168.1.1"),
            49153,
            addr_v4("203.82.48.100"),
            8080,
            0,
        );
        let shadowed = StaticNatRule::new(
            addr_v4("192.168.1.1"),
            49153,
            addr_v4("203.82.48.101"),
            9090,
            17,
        );
        table.add_rule(first.clone());
        table.add_rule(shadowed.clone());
        table.add_rule(shadowed);
        assert_eq!(table.len(), 3);

        let found = table.find_matching_rule(addr_v4("192.168.1.1"), Some(49153), NextHeader::UDP);
        assert_eq!(found, Some(&first));
        assert!(
            table
                .find_matching_rule(addr_v4("192.168.1.1"), Some(49154), NextHeader::UDP)
                .is_none()
        );
        assert!(
            table
                .find_matching_rule(addr_v4("192.168.1.2"), Some(49153), NextHeader::UDP)
                .is_none()
        );
    }

    #[test]
    fn exact_protocol() {
        let mut table = RuleTable::new();
        table.add_rule(StaticNatRule::new(
            addr_v4("10.0.0.1"),
            1000,
            addr_v4("1.1.1.1"),
            2000,
            6,
        ));
        assert_eq!(
            table.iter().next().map(StaticNatRule::proto),
            Some(ProtoMatch::Exact(NextHeader::TCP))
        );
        assert!(
            table
                .find_matching_rule(addr_v4("10.0.0.1"), Some(1000), NextHeader::TCP)
                .is_some()
        );
        assert!(
            table
                .find_matching_rule(addr_v4("10.0.0.1"), Some(1000), NextHeader::UDP)
                .is_none()
        );
    }

    #[test]
    fn address_only_keeps_ports() {
        let rule = StaticNatRule::address_only(addr_v4("10.0.0.1"), addr_v4("1.1.1.1"), 0);
        assert!(rule.matches(addr_v4("10.0.0.1"), Some(5555), NextHeader::UDP));
        assert!(rule.matches(addr_v4("10.0.0.1"), None, NextHeader::ICMP));
        assert_eq!(rule.translate(Some(5555)), (addr_v4("1.1.1.1"), Some(5555)));
    }

    #[test]
    fn validation() {
        let zero = StaticNatRule::new(addr_v4("10.0.0.1"), 0, addr_v4("1.1.1.1"), 2000, 0);
        assert!(matches!(zero.validate(), Err(NatError::InvalidRule(_))));
        let icmp = StaticNatRule::new(addr_v4("10.0.0.1"), 1, addr_v4("1.1.1.1"), 2, 1);
        assert!(matches!(icmp.validate(), Err(NatError::InvalidRule(_))));
        let icmp = StaticNatRule::address_only(addr_v4("10.0.0.1"), addr_v4("1.1.1.1"), 1);
        assert_eq!(icmp.validate(), Ok(()));
    }
}
