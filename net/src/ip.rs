// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Helper types common to IPv4 and IPv6

use etherparse::IpNumber;
use std::fmt::{Debug, Display, Formatter};

/// Thin wrapper around [`IpNumber`], the protocol carried by an IP packet.
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NextHeader {
    inner: IpNumber,
}

impl NextHeader {
    pub const ICMP: NextHeader = NextHeader {
        inner: IpNumber::ICMP,
    };
    pub const TCP: NextHeader = NextHeader {
        inner: IpNumber::TCP,
    };
    pub const UDP: NextHeader = NextHeader {
        inner: IpNumber::UDP,
    };

    #[must_use]
    pub const fn new(inner: u8) -> Self {
        Self {
            inner: IpNumber(inner),
        }
    }

    #[must_use]
    pub const fn as_u8(&self) -> u8 {
        self.inner.0
    }
}

impl From<NextHeader> for IpNumber {
    fn from(value: NextHeader) -> Self {
        value.inner
    }
}

impl From<u8> for NextHeader {
    fn from(value: u8) -> Self {
        Self::new(value)
    }
}

impl Display for NextHeader {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if *self == NextHeader::TCP {
            write!(f, "TCP")
        } else if *self == NextHeader::UDP {
            write!(f, "UDP")
        } else if *self == NextHeader::ICMP {
            write!(f, "ICMP")
        } else {
            write!(f, "proto-{}", self.as_u8())
        }
    }
}

impl Debug for NextHeader {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}
