// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use super::NatStats;
use super::bindings::{Binding, BindingTable, NatEndpoint};
use super::rules::{ProtoMatch, RuleTable, StaticNatRule};
use std::fmt::{Display, Formatter};

struct OptPort(Option<u16>);

impl Display for OptPort {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            Some(port) => f.pad(&port.to_string()),
            None => f.pad("*"),
        }
    }
}

impl Display for ProtoMatch {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtoMatch::Any => f.pad("any"),
            ProtoMatch::Exact(proto) => f.pad(&proto.to_string()),
        }
    }
}

impl Display for StaticNatRule {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:<16}{:<16}{:<19}{}",
            self.local().to_string(),
            OptPort(self.local_port()),
            self.global().to_string(),
            OptPort(self.global_port()),
        )
    }
}

impl Display for RuleTable {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Static Nat Table is as follows")?;
        writeln!(
            f,
            "Local IP     Local Port     Global IP           Global Port"
        )?;
        for rule in self.iter() {
            writeln!(f, "{rule}")?;
        }
        Ok(())
    }
}

impl Display for NatEndpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.port {
            Some(port) => write!(f, "{}:{port}/{}", self.addr, self.proto),
            None => write!(f, "{}/{}", self.addr, self.proto),
        }
    }
}

impl Display for Binding {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} <-> {}", self.original, self.translated)
    }
}

impl Display for BindingTable {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Bindings ({}):", self.len())?;
        for binding in self.iter() {
            writeln!(f, "  {binding}")?;
        }
        Ok(())
    }
}

impl Display for NatStats {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "egress translated:  {}", self.egress_translated)?;
        writeln!(f, "ingress translated: {}", self.ingress_translated)?;
        writeln!(f, "bindings created:   {}", self.bindings_created)?;
        write!(f, "{}", self.drops)
    }
}
