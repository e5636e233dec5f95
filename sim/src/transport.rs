// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The transport layer of a node: stream connections and datagram sockets.
//!
//! Streams follow a minimal TCP: three-way handshake, in-order data segments of at most
//! [`MSS`] bytes acknowledged one by one, and FIN / RST teardown. There is no retransmission:
//! a segment lost on the path is lost for good.

use crate::simulator::AppId;
use bytes::Bytes;
use echo::{AppEvent, SocketError, SocketHandle};
use net::headers::{Headers, Tcp, TcpFlags, Transport, Udp};
use net::ip::NextHeader;
use net::packet::Packet;
use ordermap::OrderMap;
use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use tracing::{debug, trace};

use tracectl::{LevelFilter, log_component};
log_component!("transport", LevelFilter::INFO, &["sim", "transport"]);

/// Largest payload of a stream segment
pub const MSS: usize = 536;
/// First ephemeral port
pub const EPHEMERAL_FIRST: u16 = 49153;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum StreamState {
    SynSent,
    SynReceived,
    Established,
    /// we sent a FIN
    FinWait,
    /// the peer sent a FIN
    CloseWait,
    /// both sides sent a FIN, waiting for the last ACK
    LastAck,
}

#[derive(Debug)]
struct Stream {
    local: SocketAddr,
    remote: SocketAddr,
    state: StreamState,
    snd_nxt: u32,
    rcv_nxt: u32,
    /// listener that accepted this connection
    listener: Option<SocketHandle>,
}

#[derive(Debug)]
enum SocketKind {
    Listener { port: u16, accepted: usize },
    Stream(Stream),
    Datagram { port: u16 },
}

#[derive(Debug)]
struct Socket {
    /// application the socket belongs to. `None` once the application closed it.
    owner: Option<AppId>,
    kind: SocketKind,
}

/// Packets to send and application events produced by the transport layer
#[derive(Debug, Default)]
pub(crate) struct TransportOutput {
    pub(crate) packets: Vec<Packet>,
    pub(crate) events: Vec<(AppId, AppEvent)>,
}

impl TransportOutput {
    fn notify(&mut self, owner: Option<AppId>, event: AppEvent) {
        if let Some(app) = owner {
            self.events.push((app, event));
        }
    }
}

fn segment(
    local: SocketAddr,
    remote: SocketAddr,
    flags: TcpFlags,
    seq: u32,
    data: Bytes,
) -> Packet {
    let mut tcp = Tcp::new(local.port(), remote.port(), flags);
    tcp.set_seq(seq);
    Packet::new(
        Headers::new(local.ip(), remote.ip(), Transport::Tcp(tcp)),
        data,
    )
}

fn datagram(local: SocketAddr, remote: SocketAddr, data: Bytes) -> Packet {
    Packet::new(
        Headers::new(
            local.ip(),
            remote.ip(),
            Transport::Udp(Udp::new(local.port(), remote.port())),
        ),
        data,
    )
}

fn seq_len(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}

/// The sockets of a node
#[derive(Debug)]
pub(crate) struct TransportStack {
    sockets: OrderMap<SocketHandle, Socket>,
    next_handle: u32,
    next_ephemeral: u16,
    ports: HashSet<(NextHeader, u16)>,
    max_connections: usize,
}

impl TransportStack {
    pub(crate) fn new(max_connections: usize) -> Self {
        Self {
            sockets: OrderMap::new(),
            next_handle: 0,
            next_ephemeral: EPHEMERAL_FIRST,
            ports: HashSet::new(),
            max_connections,
        }
    }

    fn add_socket(&mut self, owner: Option<AppId>, kind: SocketKind) -> SocketHandle {
        self.next_handle += 1;
        let handle = SocketHandle::new(self.next_handle);
        self.sockets.insert(handle, Socket { owner, kind });
        handle
    }

    /// Allocate the next free ephemeral port. Ports are handed out in increasing order,
    /// wrapping around, so a port released is not reused right away.
    fn ephemeral_port(&mut self, proto: NextHeader) -> Result<u16, SocketError> {
        let range = u32::from(u16::MAX - EPHEMERAL_FIRST) + 1;
        for _ in 0..range {
            let port = self.next_ephemeral;
            self.next_ephemeral = if port == u16::MAX {
                EPHEMERAL_FIRST
            } else {
                port + 1
            };
            if self.ports.insert((proto, port)) {
                return Ok(port);
            }
        }
        Err(SocketError::PortsExhausted)
    }

    fn bind_port(&mut self, proto: NextHeader, port: u16) -> Result<u16, SocketError> {
        if self.ports.insert((proto, port)) {
            Ok(port)
        } else {
            Err(SocketError::AddressInUse(port))
        }
    }

    fn release(&mut self, handle: SocketHandle) {
        let Some(socket) = self.sockets.remove(&handle) else {
            return;
        };
        match socket.kind {
            SocketKind::Listener { port, .. } => {
                self.ports.remove(&(NextHeader::TCP, port));
            }
            SocketKind::Datagram { port } => {
                self.ports.remove(&(NextHeader::UDP, port));
            }
            SocketKind::Stream(stream) => {
                // accepted connections share the port of their listener
                if stream.listener.is_none() {
                    self.ports.remove(&(NextHeader::TCP, stream.local.port()));
                }
                if let Some(listener) = stream.listener
                    && let Some(Socket {
                        kind: SocketKind::Listener { accepted, .. },
                        ..
                    }) = self.sockets.get_mut(&listener)
                {
                    *accepted = accepted.saturating_sub(1);
                }
            }
        }
    }

    /// Open a connection from `local` (an address of the node) to `remote`. Returns the SYN.
    pub(crate) fn connect(
        &mut self,
        owner: AppId,
        local: IpAddr,
        remote: SocketAddr,
    ) -> Result<(SocketHandle, Packet), SocketError> {
        let port = self.ephemeral_port(NextHeader::TCP)?;
        let local = SocketAddr::new(local, port);
        let stream = Stream {
            local,
            remote,
            state: StreamState::SynSent,
            snd_nxt: 1,
            rcv_nxt: 0,
            listener: None,
        };
        let handle = self.add_socket(Some(owner), SocketKind::Stream(stream));
        debug!("{handle}: connecting {local} -> {remote}");
        Ok((handle, segment(local, remote, TcpFlags::SYN, 0, Bytes::new())))
    }

    pub(crate) fn listen(&mut self, owner: AppId, port: u16) -> Result<SocketHandle, SocketError> {
        self.bind_port(NextHeader::TCP, port)?;
        Ok(self.add_socket(Some(owner), SocketKind::Listener { port, accepted: 0 }))
    }

    pub(crate) fn bind_datagram(
        &mut self,
        owner: AppId,
        port: Option<u16>,
    ) -> Result<SocketHandle, SocketError> {
        let port = match port {
            Some(port) => self.bind_port(NextHeader::UDP, port)?,
            None => self.ephemeral_port(NextHeader::UDP)?,
        };
        Ok(self.add_socket(Some(owner), SocketKind::Datagram { port }))
    }

    /// Segment `data` on a connected stream
    pub(crate) fn send(
        &mut self,
        handle: SocketHandle,
        data: &Bytes,
    ) -> Result<Vec<Packet>, SocketError> {
        let socket = self
            .sockets
            .get_mut(&handle)
            .filter(|s| s.owner.is_some())
            .ok_or(SocketError::NoSuchSocket(handle))?;
        let SocketKind::Stream(stream) = &mut socket.kind else {
            return Err(SocketError::NotConnected);
        };
        if !matches!(
            stream.state,
            StreamState::Established | StreamState::CloseWait
        ) {
            return Err(SocketError::NotConnected);
        }
        let mut packets = Vec::new();
        let mut offset = 0;
        while offset < data.len() {
            let end = (offset + MSS).min(data.len());
            let chunk = data.slice(offset..end);
            let len = seq_len(chunk.len());
            packets.push(segment(
                stream.local,
                stream.remote,
                TcpFlags::ACK | TcpFlags::PSH,
                stream.snd_nxt,
                chunk,
            ));
            stream.snd_nxt = stream.snd_nxt.wrapping_add(len);
            offset = end;
        }
        Ok(packets)
    }

    /// Build a datagram from socket `handle`, sent from address `local`
    pub(crate) fn send_to(
        &mut self,
        handle: SocketHandle,
        local: IpAddr,
        data: Bytes,
        to: SocketAddr,
    ) -> Result<Packet, SocketError> {
        match self.sockets.get(&handle) {
            Some(Socket {
                owner: Some(_),
                kind: SocketKind::Datagram { port },
            }) => Ok(datagram(SocketAddr::new(local, *port), to, data)),
            Some(Socket { owner: Some(_), .. }) => Err(SocketError::NotConnected),
            _ => Err(SocketError::NoSuchSocket(handle)),
        }
    }

    /// Close a socket on behalf of its application. Returns the FIN to send, if any.
    pub(crate) fn close(&mut self, handle: SocketHandle) -> Option<Packet> {
        let socket = self.sockets.get_mut(&handle)?;
        socket.owner = None;
        let SocketKind::Stream(stream) = &mut socket.kind else {
            self.release(handle);
            return None;
        };
        let fin = segment(
            stream.local,
            stream.remote,
            TcpFlags::FIN | TcpFlags::ACK,
            stream.snd_nxt,
            Bytes::new(),
        );
        match stream.state {
            StreamState::Established | StreamState::SynReceived => {
                stream.state = StreamState::FinWait;
                stream.snd_nxt = stream.snd_nxt.wrapping_add(1);
                Some(fin)
            }
            StreamState::CloseWait => {
                stream.state = StreamState::LastAck;
                stream.snd_nxt = stream.snd_nxt.wrapping_add(1);
                Some(fin)
            }
            StreamState::SynSent => {
                let rst = segment(stream.local, stream.remote, TcpFlags::RST, 0, Bytes::new());
                self.release(handle);
                Some(rst)
            }
            StreamState::FinWait | StreamState::LastAck => None,
        }
    }

    fn find_stream(&self, local: SocketAddr, remote: SocketAddr) -> Option<SocketHandle> {
        self.sockets.iter().find_map(|(handle, socket)| match &socket.kind {
            SocketKind::Stream(s) if s.local == local && s.remote == remote => Some(*handle),
            _ => None,
        })
    }

    fn find_bound(&self, proto: NextHeader, port: u16) -> Option<SocketHandle> {
        self.sockets.iter().find_map(|(handle, socket)| match socket.kind {
            SocketKind::Listener { port: p, .. } if proto == NextHeader::TCP && p == port => {
                Some(*handle)
            }
            SocketKind::Datagram { port: p } if proto == NextHeader::UDP && p == port => {
                Some(*handle)
            }
            _ => None,
        })
    }

    /// Process a packet addressed to the node
    pub(crate) fn receive(&mut self, packet: Packet) -> TransportOutput {
        let mut out = TransportOutput::default();
        let hdrs = packet.headers();
        let (Some(sport), Some(dport)) = (hdrs.src_port(), hdrs.dst_port()) else {
            trace!("no transport header, ignoring {packet}");
            return out;
        };
        let remote = SocketAddr::new(hdrs.source(), sport);
        let local = SocketAddr::new(hdrs.destination(), dport);
        if let Some(tcp) = hdrs.try_tcp() {
            let (flags, seq) = (tcp.flags(), tcp.seq());
            self.receive_segment(local, remote, flags, seq, packet.payload().clone(), &mut out);
        } else if hdrs.try_udp().is_some() {
            match self.find_bound(NextHeader::UDP, dport) {
                Some(sock) => {
                    let owner = self.sockets.get(&sock).and_then(|s| s.owner);
                    out.notify(
                        owner,
                        AppEvent::Received {
                            sock,
                            data: packet.payload().clone(),
                            from: remote,
                        },
                    );
                }
                None => debug!("no socket on UDP port {dport}, ignoring {packet}"),
            }
        }
        out
    }

    fn receive_segment(
        &mut self,
        local: SocketAddr,
        remote: SocketAddr,
        flags: TcpFlags,
        seq: u32,
        data: Bytes,
        out: &mut TransportOutput,
    ) {
        let Some(handle) = self.find_stream(local, remote) else {
            self.receive_unknown(local, remote, flags, out);
            return;
        };
        let Some(socket) = self.sockets.get_mut(&handle) else {
            return;
        };
        let owner = socket.owner;
        let SocketKind::Stream(stream) = &mut socket.kind else {
            return;
        };

        if flags.contains(TcpFlags::RST) {
            let event = if stream.state == StreamState::SynSent {
                AppEvent::ConnectFailed(handle, SocketError::Refused)
            } else {
                AppEvent::Reset(handle)
            };
            debug!("{handle}: reset by {remote}");
            self.release(handle);
            out.notify(owner, event);
            return;
        }

        match stream.state {
            StreamState::SynSent => {
                if flags.contains(TcpFlags::SYN | TcpFlags::ACK) {
                    stream.state = StreamState::Established;
                    stream.rcv_nxt = seq.wrapping_add(1);
                    out.packets.push(segment(
                        local,
                        remote,
                        TcpFlags::ACK,
                        stream.snd_nxt,
                        Bytes::new(),
                    ));
                    debug!("{handle}: connected to {remote}");
                    out.notify(owner, AppEvent::Connected(handle));
                }
                return;
            }
            StreamState::SynReceived => {
                if !flags.contains(TcpFlags::ACK) {
                    return;
                }
                stream.state = StreamState::Established;
                let listener = stream.listener;
                debug!("{handle}: accepted connection from {remote}");
                if let Some(listener) = listener {
                    out.notify(
                        owner,
                        AppEvent::Accepted {
                            listener,
                            conn: handle,
                            peer: remote,
                        },
                    );
                }
            }
            _ => {}
        }

        if !data.is_empty() {
            if seq != stream.rcv_nxt {
                trace!(
                    "{handle}: out of order segment (seq {seq}, expected {}), discarded",
                    stream.rcv_nxt
                );
                return;
            }
            stream.rcv_nxt = stream.rcv_nxt.wrapping_add(seq_len(data.len()));
            out.packets.push(segment(
                local,
                remote,
                TcpFlags::ACK,
                stream.snd_nxt,
                Bytes::new(),
            ));
            out.notify(
                owner,
                AppEvent::Received {
                    sock: handle,
                    data,
                    from: remote,
                },
            );
        }

        if flags.contains(TcpFlags::FIN) {
            stream.rcv_nxt = stream.rcv_nxt.wrapping_add(1);
            out.packets.push(segment(
                local,
                remote,
                TcpFlags::ACK,
                stream.snd_nxt,
                Bytes::new(),
            ));
            match stream.state {
                StreamState::Established => {
                    stream.state = StreamState::CloseWait;
                    out.notify(owner, AppEvent::PeerClosed(handle));
                }
                StreamState::FinWait => self.release(handle),
                _ => {}
            }
        } else if stream.state == StreamState::LastAck && flags.contains(TcpFlags::ACK) {
            self.release(handle);
        }
    }

    /// A segment for no known connection: a SYN for a listener opens one, anything else is
    /// answered with a reset.
    fn receive_unknown(
        &mut self,
        local: SocketAddr,
        remote: SocketAddr,
        flags: TcpFlags,
        out: &mut TransportOutput,
    ) {
        if flags.contains(TcpFlags::RST) {
            return;
        }
        let listener = self.find_bound(NextHeader::TCP, local.port());
        if flags.contains(TcpFlags::SYN)
            && !flags.contains(TcpFlags::ACK)
            && let Some(listener) = listener
        {
            let max_connections = self.max_connections;
            let Some(Socket {
                owner,
                kind: SocketKind::Listener { port, accepted },
            }) = self.sockets.get_mut(&listener)
            else {
                return;
            };
            let owner = *owner;
            if *accepted >= max_connections {
                let port = *port;
                out.notify(
                    owner,
                    AppEvent::AcceptError {
                        listener,
                        error: SocketError::ListenLimit(port),
                    },
                );
            } else {
                *accepted += 1;
                let stream = Stream {
                    local,
                    remote,
                    state: StreamState::SynReceived,
                    snd_nxt: 1,
                    rcv_nxt: 1,
                    listener: Some(listener),
                };
                self.add_socket(owner, SocketKind::Stream(stream));
                out.packets.push(segment(
                    local,
                    remote,
                    TcpFlags::SYN | TcpFlags::ACK,
                    0,
                    Bytes::new(),
                ));
                return;
            }
        }
        trace!("no connection {local} <- {remote}, resetting");
        out.packets
            .push(segment(local, remote, TcpFlags::RST, 0, Bytes::new()));
    }
}

#[cfg(test)]
mod test {
    use super::{EPHEMERAL_FIRST, MSS, TransportOutput, TransportStack};
    use crate::simulator::AppId;
    use bytes::Bytes;
    use echo::{AppEvent, SocketError};
    use net::headers::TcpFlags;
    use net::packet::Packet;
    use net::packet::test_utils::addr;
    use std::net::SocketAddr;

    const CLIENT: AppId = AppId(0);
    const SERVER: AppId = AppId(1);

    fn flags(packet: &Packet) -> TcpFlags {
        packet.headers().try_tcp().unwrap().flags()
    }

    /// Deliver every packet of `out` to `stack`, returning what it answers
    fn exchange(stack: &mut TransportStack, out: TransportOutput) -> TransportOutput {
        let mut answer = TransportOutput::default();
        for packet in out.packets {
            let more = stack.receive(packet);
            answer.packets.extend(more.packets);
            answer.events.extend(more.events);
        }
        answer
    }

    #[test]
    fn ephemeral_ports_are_not_reused_at_once() {
        let mut stack = TransportStack::new(8);
        let first = stack.bind_datagram(CLIENT, None).unwrap();
        let second = stack.bind_datagram(CLIENT, None).unwrap();
        let to: SocketAddr = "10.1.1.2:9".parse().unwrap();
        let packet = stack
            .send_to(first, addr("10.1.1.1"), Bytes::from_static(b"x"), to)
            .unwrap();
        assert_eq!(packet.headers().src_port(), Some(EPHEMERAL_FIRST));
        stack.close(first);
        let packet = stack
            .send_to(second, addr("10.1.1.1"), Bytes::from_static(b"x"), to)
            .unwrap();
        assert_eq!(packet.headers().src_port(), Some(EPHEMERAL_FIRST + 1));
        let third = stack.bind_datagram(CLIENT, None).unwrap();
        let packet = stack
            .send_to(third, addr("10.1.1.1"), Bytes::from_static(b"x"), to)
            .unwrap();
        assert_eq!(packet.headers().src_port(), Some(EPHEMERAL_FIRST + 2));
        assert_eq!(
            stack.bind_datagram(SERVER, Some(EPHEMERAL_FIRST + 1)),
            Err(SocketError::AddressInUse(EPHEMERAL_FIRST + 1))
        );
    }

    #[test]
    fn stream_lifecycle() {
        let mut client = TransportStack::new(8);
        let mut server = TransportStack::new(8);
        let listener = server.listen(SERVER, 7).unwrap();

        let (sock, syn) = client
            .connect(CLIENT, addr("10.1.1.1"), "10.1.1.2:7".parse().unwrap())
            .unwrap();
        assert_eq!(flags(&syn), TcpFlags::SYN);
        let syn_ack = server.receive(syn);
        assert_eq!(flags(&syn_ack.packets[0]), TcpFlags::SYN | TcpFlags::ACK);
        assert!(syn_ack.events.is_empty());

        let ack = exchange(&mut client, syn_ack);
        assert_eq!(ack.events, vec![(CLIENT, AppEvent::Connected(sock))]);
        let accepted = exchange(&mut server, ack);
        let conn = match &accepted.events[..] {
            [(SERVER, AppEvent::Accepted { listener: l, conn, peer })] => {
                assert_eq!(*l, listener);
                assert_eq!(peer.port(), EPHEMERAL_FIRST);
                *conn
            }
            other => panic!("unexpected events {other:?}"),
        };

        // two segments for more than one MSS
        let data = Bytes::from(vec![1u8; MSS + 10]);
        let segments = client.send(sock, &data).unwrap();
        assert_eq!(segments.len(), 2);
        let received = exchange(
            &mut server,
            TransportOutput {
                packets: segments,
                events: vec![],
            },
        );
        let lens: Vec<_> = received
            .events
            .iter()
            .map(|(_, e)| match e {
                AppEvent::Received { sock, data, .. } => {
                    assert_eq!(*sock, conn);
                    data.len()
                }
                other => panic!("unexpected event {other:?}"),
            })
            .collect();
        assert_eq!(lens, vec![MSS, 10]);
        // acks do not wake the client up
        assert!(exchange(&mut client, received).events.is_empty());

        // client closes: the server sees the peer leave
        let fin = client.close(sock).unwrap();
        let closed = server.receive(fin);
        assert_eq!(closed.events, vec![(SERVER, AppEvent::PeerClosed(conn))]);
        assert!(exchange(&mut client, closed).events.is_empty());
        let last_fin = server.close(conn).unwrap();
        let last_ack = client.receive(last_fin);
        assert!(exchange(&mut server, last_ack).events.is_empty());
        assert!(matches!(
            server.send(conn, &data),
            Err(SocketError::NoSuchSocket(c)) if c == conn
        ));
    }

    #[test]
    fn refused_without_listener() {
        let mut client = TransportStack::new(8);
        let mut server = TransportStack::new(8);
        let (sock, syn) = client
            .connect(CLIENT, addr("10.1.1.1"), "10.1.1.2:7".parse().unwrap())
            .unwrap();
        let rst = server.receive(syn);
        assert_eq!(flags(&rst.packets[0]), TcpFlags::RST);
        let failed = exchange(&mut client, rst);
        assert_eq!(
            failed.events,
            vec![(CLIENT, AppEvent::ConnectFailed(sock, SocketError::Refused))]
        );
    }

    #[test]
    fn listen_limit() {
        let mut server = TransportStack::new(1);
        let listener = server.listen(SERVER, 7).unwrap();
        let mut clients = vec![TransportStack::new(8), TransportStack::new(8)];
        let mut outputs = Vec::new();
        for (i, client) in clients.iter_mut().enumerate() {
            let src = addr(&format!("10.1.1.{}", i + 10));
            let (_, syn) = client
                .connect(CLIENT, src, "10.1.1.2:7".parse().unwrap())
                .unwrap();
            outputs.push(server.receive(syn));
        }
        assert_eq!(flags(&outputs[0].packets[0]), TcpFlags::SYN | TcpFlags::ACK);
        assert_eq!(flags(&outputs[1].packets[0]), TcpFlags::RST);
        assert_eq!(
            outputs[1].events,
            vec![(
                SERVER,
                AppEvent::AcceptError {
                    listener,
                    error: SocketError::ListenLimit(7)
                }
            )]
        );
    }
}
