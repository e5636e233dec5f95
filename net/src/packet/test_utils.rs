// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc
)]

use crate::headers::{Headers, Tcp, TcpFlags, Transport, Udp};
use crate::packet::Packet;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

#[must_use]
/// Build an Ipv4 address from a &str
pub fn addr_v4(a: &str) -> Ipv4Addr {
    Ipv4Addr::from_str(a).expect("Bad IPv4 address")
}

#[must_use]
/// Build an IP address (either family) from a &str
pub fn addr(a: &str) -> IpAddr {
    IpAddr::from_str(a).expect("Bad IP address")
}

#[must_use]
/// Builds a UDP packet with a 64-byte payload and a valid checksum
pub fn build_test_udp_packet(src_ip: &str, dst_ip: &str, sport: u16, dport: u16) -> Packet {
    let headers = Headers::new(
        addr(src_ip),
        addr(dst_ip),
        Transport::Udp(Udp::new(sport, dport)),
    );
    let mut packet = Packet::new(headers, vec![0xa5u8; 64]);
    packet.update_checksum();
    packet
}

#[must_use]
/// Builds a TCP data segment with a 64-byte payload and a valid checksum
pub fn build_test_tcp_packet(src_ip: &str, dst_ip: &str, sport: u16, dport: u16) -> Packet {
    let headers = Headers::new(
        addr(src_ip),
        addr(dst_ip),
        Transport::Tcp(Tcp::new(sport, dport, TcpFlags::ACK | TcpFlags::PSH)),
    );
    let mut packet = Packet::new(headers, vec![0x5au8; 64]);
    packet.update_checksum();
    packet
}
