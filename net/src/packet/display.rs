// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Display of Packets

use crate::headers::{Headers, TcpFlags, Transport};
use crate::packet::{Packet, PacketMeta};
use std::fmt::{Display, Formatter};

impl Display for TcpFlags {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let names = [
            (TcpFlags::SYN, 'S'),
            (TcpFlags::ACK, 'A'),
            (TcpFlags::FIN, 'F'),
            (TcpFlags::RST, 'R'),
            (TcpFlags::PSH, 'P'),
        ];
        for (flag, c) in names {
            if self.contains(flag) {
                write!(f, "{c}")?;
            }
        }
        Ok(())
    }
}

impl Display for Transport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Transport::Tcp(tcp) => write!(
                f,
                "TCP {} -> {} [{}] seq: {}",
                tcp.source(),
                tcp.destination(),
                tcp.flags(),
                tcp.seq()
            ),
            Transport::Udp(udp) => write!(f, "UDP {} -> {}", udp.source(), udp.destination()),
        }
    }
}

impl Display for Headers {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} -> {} proto: {} ttl: {}",
            self.source(),
            self.destination(),
            self.next_header(),
            self.ttl()
        )?;
        if let Some(frag) = self.fragment() {
            write!(
                f,
                " frag: id {} off {}{}",
                frag.id,
                frag.offset,
                if frag.more { " MF" } else { "" }
            )?;
        }
        if let Some(transport) = self.transport() {
            write!(f, " | {transport}")?;
        }
        Ok(())
    }
}

impl Display for PacketMeta {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "iif: {}", self.iif)?;
        if let Some(oif) = self.oif {
            write!(f, " oif: {oif}")?;
        }
        if let Some(nh) = self.nh_addr {
            write!(f, " nh: {nh}")?;
        }
        if self.is_local {
            write!(f, " local")?;
        }
        match self.done {
            Some(reason) => write!(f, " done: {reason}"),
            None => Ok(()),
        }
    }
}

impl Display for Packet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} | {} bytes | {}",
            self.headers(),
            self.payload_len(),
            self.get_meta()
        )
    }
}
