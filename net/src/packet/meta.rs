// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use crate::interface::InterfaceId;
use crate::time::SimTime;
use std::fmt::{Display, Formatter};
use std::net::IpAddr;

#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub enum DoneReason {
    InternalFailure,  /* catch-all for internal issues */
    NatNoMatch,       /* no static rule nor binding for the packet */
    NatConflict,      /* the translated endpoint is already bound to another flow */
    NatNotConfigured, /* the translator lacks its inside or outside interface */
    HopLimitExceeded, /* TTL / Hop count was exceeded */
    RouteFailure,     /* missing routing information */
    RouteError,       /* route found but its output interface cannot be used */
    BadChecksum,      /* IPv4 header checksum does not match */
    InterfaceAdmDown, /* interface is admin down */
    InterfaceUnknown, /* the interface cannot be found */
    FragmentTimeout,  /* reassembly of a fragmented datagram did not complete in time */
    Unhandled,        /* there exists no support to handle this type of packet */
    Malformed,        /* the packet does not conform / is malformed */
    Delivered,        /* the packet was delivered locally */
}

/// Broad classes of [`DoneReason`], letting an observer tell translation misses from
/// network-layer drops.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum DropClass {
    Translation,
    NetworkLayer,
    Internal,
    Delivered,
}

impl DoneReason {
    /// All reasons, in declaration order
    pub const ALL: [DoneReason; 14] = [
        DoneReason::InternalFailure,
        DoneReason::NatNoMatch,
        DoneReason::NatConflict,
        DoneReason::NatNotConfigured,
        DoneReason::HopLimitExceeded,
        DoneReason::RouteFailure,
        DoneReason::RouteError,
        DoneReason::BadChecksum,
        DoneReason::InterfaceAdmDown,
        DoneReason::InterfaceUnknown,
        DoneReason::FragmentTimeout,
        DoneReason::Unhandled,
        DoneReason::Malformed,
        DoneReason::Delivered,
    ];

    #[must_use]
    pub fn class(&self) -> DropClass {
        match self {
            DoneReason::NatNoMatch | DoneReason::NatConflict | DoneReason::NatNotConfigured => {
                DropClass::Translation
            }
            DoneReason::HopLimitExceeded
            | DoneReason::RouteFailure
            | DoneReason::RouteError
            | DoneReason::BadChecksum
            | DoneReason::InterfaceAdmDown
            | DoneReason::InterfaceUnknown
            | DoneReason::FragmentTimeout => DropClass::NetworkLayer,
            DoneReason::InternalFailure | DoneReason::Unhandled | DoneReason::Malformed => {
                DropClass::Internal
            }
            DoneReason::Delivered => DropClass::Delivered,
        }
    }

    /// Tell if this reason means the packet is gone (anything but local delivery)
    #[must_use]
    pub fn is_drop(&self) -> bool {
        *self != DoneReason::Delivered
    }

    /// The name under which drops of this kind show up in traces
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            DoneReason::InternalFailure => "DROP_INTERNAL",
            DoneReason::NatNoMatch => "DROP_NF_DROP : No match in Static Rule Table",
            DoneReason::NatConflict => "DROP_NF_DROP : Translated endpoint already bound",
            DoneReason::NatNotConfigured => "DROP_NF_DROP : Translator not configured",
            DoneReason::HopLimitExceeded => "DROP_TTL_EXPIRED",
            DoneReason::RouteFailure => "DROP_NO_ROUTE",
            DoneReason::RouteError => "DROP_ROUTE_ERROR",
            DoneReason::BadChecksum => "DROP_BAD_CHECKSUM",
            DoneReason::InterfaceAdmDown => "DROP_INTERFACE_DOWN",
            DoneReason::InterfaceUnknown => "DROP_INTERFACE_UNKNOWN",
            DoneReason::FragmentTimeout => "DROP_FRAGMENT_TIMEOUT",
            DoneReason::Unhandled => "DROP_UNHANDLED",
            DoneReason::Malformed => "DROP_MALFORMED",
            DoneReason::Delivered => "DELIVERED",
        }
    }
}

impl Display for DoneReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Default, Clone)]
pub struct PacketMeta {
    pub iif: InterfaceId,         /* incoming interface - set early */
    pub oif: Option<InterfaceId>, /* outgoing interface - set late */
    pub nh_addr: Option<IpAddr>,  /* IP address of next-hop */
    pub timestamp: SimTime,       /* time the packet entered the node */
    pub is_local: bool,           /* packet is for local delivery */
    pub done: Option<DoneReason>, /* if Some, the reason why a packet was marked as done, including local delivery */
    checksum_refresh: bool,       /* headers were rewritten: checksum must be recomputed */
    keep: bool,                   /* keep the packet in spite of calling packet.enforce() */
}

impl PacketMeta {
    #[must_use]
    pub fn new(iif: InterfaceId, timestamp: SimTime) -> Self {
        Self {
            iif,
            timestamp,
            ..Default::default()
        }
    }
    #[must_use]
    pub fn checksum_refresh(&self) -> bool {
        self.checksum_refresh
    }
    pub fn set_checksum_refresh(&mut self, value: bool) {
        self.checksum_refresh = value;
    }
    #[must_use]
    pub fn keep(&self) -> bool {
        self.keep
    }
    /// Keep packets marked as done when enforcing. Used to observe dropped packets in tests.
    pub fn set_keep(&mut self, value: bool) {
        self.keep = value;
    }
}

#[cfg(test)]
mod test {
    use super::{DoneReason, DropClass};
    use std::collections::HashSet;

    #[test]
    fn reason_names() {
        assert_eq!(
            DoneReason::NatNoMatch.to_string(),
            "DROP_NF_DROP : No match in Static Rule Table"
        );
        assert_eq!(DoneReason::HopLimitExceeded.to_string(), "DROP_TTL_EXPIRED");
        assert_eq!(DoneReason::InterfaceAdmDown.to_string(), "DROP_INTERFACE_DOWN");

        let names: HashSet<&str> = DoneReason::ALL.iter().map(DoneReason::as_str).collect();
        assert_eq!(names.len(), DoneReason::ALL.len());
    }

    #[test]
    fn reason_classes() {
        assert_eq!(DoneReason::NatConflict.class(), DropClass::Translation);
        assert_eq!(DoneReason::FragmentTimeout.class(), DropClass::NetworkLayer);
        assert_eq!(DoneReason::Delivered.class(), DropClass::Delivered);
        assert!(!DoneReason::Delivered.is_drop());
        assert!(DoneReason::BadChecksum.is_drop());
    }
}
