// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

#![deny(clippy::all, clippy::pedantic)]
#![deny(rustdoc::all)]
#![allow(clippy::module_name_repetitions)]

//! Static Network Address (and Port) Translation
//!
//! This package implements [`StaticNat`], a translator driven by a table of statically
//! configured rules. Packets crossing from the inside interface to the outside interface get
//! their source rewritten according to the first matching rule, which creates a binding. Replies
//! crossing from outside to inside are rewritten back using that binding. Packets matching
//! neither are dropped with a classified reason, never forwarded untranslated.
//!
//! # Example
//!
//! ```
//! # use net::interface::InterfaceId;
//! # use net::packet::test_utils::{addr, addr_v4, build_test_udp_packet};
//! # use stats::DropReporter;
//! use natsim_nat::{NatVerdict, StaticNat, StaticNatRule};
//!
//! let mut nat = StaticNat::new("n1", DropReporter::discard());
//! nat.set_inside(InterfaceId::new(1)).unwrap();
//! nat.set_outside(InterfaceId::new(2)).unwrap();
//! nat.add_rule(StaticNatRule::new(
//!     addr_v4("192.168.1.1"),
//!     49153,
//!     addr_v4("203.82.48.100"),
//!     8080,
//!     0,
//! ))
//! .unwrap();
//!
//! let mut packet = build_test_udp_packet("192.168.1.1", "203.82.48.2", 49153, 9);
//! let verdict = nat.translate_egress(&mut packet, InterfaceId::new(1)).unwrap();
//! assert_eq!(verdict, NatVerdict::Translated { new_binding: true });
//! assert_eq!(packet.headers().source(), addr("203.82.48.100"));
//! assert_eq!(packet.headers().src_port(), Some(8080));
//! ```
//!
//! # Limitations
//!
//! - Only IPv4 is translated. IPv6 packets entering the translator from one of its sides are
//!   dropped as unhandled.
//! - Bindings live as long as the translator: there is no aging.

mod static_nat;

pub use static_nat::{
    Binding, BindingConflict, BindingTable, NatEndpoint, NatStats, NatVerdict, ProtoMatch,
    RuleTable, StaticNat, StaticNatRule,
};

use net::interface::InterfaceId;
use std::fmt::{Display, Formatter};

use tracectl::{LevelFilter, log_component};
log_component!("nat", LevelFilter::INFO, &["nat"]);

/// The two sides of a translator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NatSide {
    /// The private side, facing the hosts whose addresses are translated
    Inside,
    /// The public side
    Outside,
}

impl Display for NatSide {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            NatSide::Inside => write!(f, "inside"),
            NatSide::Outside => write!(f, "outside"),
        }
    }
}

/// Errors of the translator's configuration and direct API
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NatError {
    #[error("translator has no {missing} interface")]
    NotConfigured { missing: NatSide },
    #[error("interface {0} can't be both inside and outside")]
    SameInterface(InterfaceId),
    #[error("packet received on interface {iif} is not on the {expected} side")]
    WrongSide { iif: InterfaceId, expected: NatSide },
    #[error("invalid rule: {0}")]
    InvalidRule(String),
}
