// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The header view of a packet: the fields the network layer and the translator look at.

use crate::ip::NextHeader;
use bitflags::bitflags;
use etherparse::Ipv4Header;
use std::net::IpAddr;

bitflags! {
    /// TCP control flags used by the stream transport
    #[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct TcpFlags: u8 {
        const FIN = 0x01;
        const SYN = 0x02;
        const RST = 0x04;
        const PSH = 0x08;
        const ACK = 0x10;
    }
}

/// A TCP header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tcp {
    source: u16,
    destination: u16,
    flags: TcpFlags,
    seq: u32,
}

impl Tcp {
    /// The length of a [`Tcp`] header, no options
    pub const LENGTH: u16 = 20;

    #[must_use]
    pub fn new(source: u16, destination: u16, flags: TcpFlags) -> Self {
        Self {
            source,
            destination,
            flags,
            seq: 0,
        }
    }
    #[must_use]
    pub fn source(&self) -> u16 {
        self.source
    }
    #[must_use]
    pub fn destination(&self) -> u16 {
        self.destination
    }
    #[must_use]
    pub fn flags(&self) -> TcpFlags {
        self.flags
    }
    /// Sequence number of the first payload byte in the stream
    #[must_use]
    pub fn seq(&self) -> u32 {
        self.seq
    }
    pub fn set_seq(&mut self, seq: u32) -> &mut Self {
        self.seq = seq;
        self
    }
}

/// A UDP header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Udp {
    source: u16,
    destination: u16,
}

impl Udp {
    /// The length of a [`Udp`] header
    pub const LENGTH: u16 = 8;

    #[must_use]
    pub fn new(source: u16, destination: u16) -> Self {
        Self {
            source,
            destination,
        }
    }
    #[must_use]
    pub fn source(&self) -> u16 {
        self.source
    }
    #[must_use]
    pub fn destination(&self) -> u16 {
        self.destination
    }
}

/// Transport header
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transport {
    Tcp(Tcp),
    Udp(Udp),
}

impl Transport {
    #[must_use]
    pub fn next_header(&self) -> NextHeader {
        match self {
            Transport::Tcp(_) => NextHeader::TCP,
            Transport::Udp(_) => NextHeader::UDP,
        }
    }
    #[must_use]
    pub fn len(&self) -> u16 {
        match self {
            Transport::Tcp(_) => Tcp::LENGTH,
            Transport::Udp(_) => Udp::LENGTH,
        }
    }
}

/// IPv4 fragmentation fields. A packet carries one only while it is a fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fragment {
    /// identification shared by all fragments of a datagram
    pub id: u16,
    /// byte offset of this fragment's data in the reassembled payload
    pub offset: u16,
    /// more fragments follow
    pub more: bool,
}

/// Error returned when a TTL reaches zero
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("hop limit exceeded")]
pub struct HopLimitExceeded;

/// The header view of a packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Headers {
    source: IpAddr,
    destination: IpAddr,
    next_header: NextHeader,
    ttl: u8,
    checksum: u16,
    fragment: Option<Fragment>,
    transport: Option<Transport>,
}

impl Headers {
    pub const DEFAULT_TTL: u8 = 64;

    /// Build headers for a packet with a transport header. The protocol is derived from it.
    #[must_use]
    pub fn new(source: IpAddr, destination: IpAddr, transport: Transport) -> Self {
        Self {
            source,
            destination,
            next_header: transport.next_header(),
            ttl: Self::DEFAULT_TTL,
            checksum: 0,
            fragment: None,
            transport: Some(transport),
        }
    }
    /// Build headers for a packet whose protocol has no transport header we understand.
    #[must_use]
    pub fn new_raw(source: IpAddr, destination: IpAddr, next_header: NextHeader) -> Self {
        Self {
            source,
            destination,
            next_header,
            ttl: Self::DEFAULT_TTL,
            checksum: 0,
            fragment: None,
            transport: None,
        }
    }

    #[must_use]
    pub fn source(&self) -> IpAddr {
        self.source
    }
    pub fn set_source(&mut self, addr: IpAddr) -> &mut Self {
        self.source = addr;
        self
    }
    #[must_use]
    pub fn destination(&self) -> IpAddr {
        self.destination
    }
    pub fn set_destination(&mut self, addr: IpAddr) -> &mut Self {
        self.destination = addr;
        self
    }
    #[must_use]
    pub fn is_ipv4(&self) -> bool {
        self.source.is_ipv4() && self.destination.is_ipv4()
    }
    #[must_use]
    pub fn next_header(&self) -> NextHeader {
        self.next_header
    }
    #[must_use]
    pub fn ttl(&self) -> u8 {
        self.ttl
    }
    pub fn set_ttl(&mut self, ttl: u8) -> &mut Self {
        self.ttl = ttl;
        self
    }
    /// Decrement the TTL (hop limit for IPv6).
    ///
    /// # Errors
    ///
    /// Returns [`HopLimitExceeded`] (and leaves the TTL untouched) if the TTL is already 0 or 1.
    pub fn decrement_ttl(&mut self) -> Result<(), HopLimitExceeded> {
        if self.ttl <= 1 {
            return Err(HopLimitExceeded);
        }
        self.ttl -= 1;
        Ok(())
    }
    #[must_use]
    pub fn checksum(&self) -> u16 {
        self.checksum
    }
    pub fn set_checksum(&mut self, checksum: u16) -> &mut Self {
        self.checksum = checksum;
        self
    }
    #[must_use]
    pub fn fragment(&self) -> Option<Fragment> {
        self.fragment
    }
    pub fn set_fragment(&mut self, fragment: Option<Fragment>) -> &mut Self {
        self.fragment = fragment;
        self
    }
    #[must_use]
    pub fn transport(&self) -> Option<&Transport> {
        self.transport.as_ref()
    }
    #[must_use]
    pub fn try_tcp(&self) -> Option<&Tcp> {
        match &self.transport {
            Some(Transport::Tcp(tcp)) => Some(tcp),
            _ => None,
        }
    }
    #[must_use]
    pub fn try_udp(&self) -> Option<&Udp> {
        match &self.transport {
            Some(Transport::Udp(udp)) => Some(udp),
            _ => None,
        }
    }
    #[must_use]
    pub fn src_port(&self) -> Option<u16> {
        match &self.transport {
            Some(Transport::Tcp(tcp)) => Some(tcp.source),
            Some(Transport::Udp(udp)) => Some(udp.source),
            None => None,
        }
    }
    #[must_use]
    pub fn dst_port(&self) -> Option<u16> {
        match &self.transport {
            Some(Transport::Tcp(tcp)) => Some(tcp.destination),
            Some(Transport::Udp(udp)) => Some(udp.destination),
            None => None,
        }
    }
    /// Set the transport source port. Returns `false` if there is no transport header.
    pub fn set_src_port(&mut self, port: u16) -> bool {
        match &mut self.transport {
            Some(Transport::Tcp(tcp)) => tcp.source = port,
            Some(Transport::Udp(udp)) => udp.source = port,
            None => return false,
        }
        true
    }
    /// Set the transport destination port. Returns `false` if there is no transport header.
    pub fn set_dst_port(&mut self, port: u16) -> bool {
        match &mut self.transport {
            Some(Transport::Tcp(tcp)) => tcp.destination = port,
            Some(Transport::Udp(udp)) => udp.destination = port,
            None => return false,
        }
        true
    }

    /// Length of the transport header, if any
    #[must_use]
    pub fn transport_len(&self) -> u16 {
        self.transport.as_ref().map_or(0, Transport::len)
    }

    /// Compute the IPv4 header checksum these headers would carry for a payload of `payload_len`
    /// bytes. IPv6 has no header checksum and yields 0.
    #[must_use]
    pub fn compute_checksum(&self, payload_len: usize) -> u16 {
        let (IpAddr::V4(src), IpAddr::V4(dst)) = (self.source, self.destination) else {
            return 0;
        };
        let Ok(len) = u16::try_from(payload_len + usize::from(self.transport_len())) else {
            return 0;
        };
        Ipv4Header::new(len, self.ttl, self.next_header.into(), src.octets(), dst.octets())
            .map_or(0, |mut hdr| {
                if let Some(frag) = self.fragment {
                    hdr.identification = frag.id;
                    hdr.more_fragments = frag.more;
                }
                hdr.calc_header_checksum()
            })
    }
}
