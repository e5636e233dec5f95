// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

#![cfg(test)]

use crate::{
    App, AppContext, AppEvent, Application, ClientState, EchoClient, EchoClientConfig, EchoServer,
    EchoServerConfig, Fill, ServerState, SocketError, SocketHandle, SocketKind, TimerId,
};
use bytes::Bytes;
use net::time::SimTime;
use pretty_assertions::assert_eq;
use std::net::SocketAddr;
use std::time::Duration;
use tracing_test::traced_test;

/// Records what applications ask for
#[derive(Default)]
struct MockCtx {
    next_sock: u32,
    next_timer: u64,
    connects: Vec<SocketAddr>,
    listens: Vec<u16>,
    binds: Vec<Option<u16>>,
    sent: Vec<(SocketHandle, Bytes, Option<SocketAddr>)>,
    closed: Vec<SocketHandle>,
    timers: Vec<(TimerId, Duration)>,
    cancelled: Vec<TimerId>,
    refuse_send: Option<SocketError>,
    refuse_bind: Option<SocketError>,
}

impl MockCtx {
    fn new_sock(&mut self) -> SocketHandle {
        self.next_sock += 1;
        SocketHandle::new(self.next_sock)
    }
    fn last_timer(&self) -> TimerId {
        self.timers.last().unwrap().0
    }
}

impl AppContext for MockCtx {
    fn now(&self) -> SimTime {
        SimTime::from_secs(2)
    }
    fn connect(&mut self, remote: SocketAddr) -> Result<SocketHandle, SocketError> {
        self.connects.push(remote);
        Ok(self.new_sock())
    }
    fn listen(&mut self, port: u16) -> Result<SocketHandle, SocketError> {
        if let Some(e) = self.refuse_bind.clone() {
            return Err(e);
        }
        self.listens.push(port);
        Ok(self.new_sock())
    }
    fn bind_datagram(&mut self, port: Option<u16>) -> Result<SocketHandle, SocketError> {
        if let Some(e) = self.refuse_bind.clone() {
            return Err(e);
        }
        self.binds.push(port);
        Ok(self.new_sock())
    }
    fn send(&mut self, sock: SocketHandle, data: Bytes) -> Result<(), SocketError> {
        if let Some(e) = self.refuse_send.clone() {
            return Err(e);
        }
        self.sent.push((sock, data, None));
        Ok(())
    }
    fn send_to(
        &mut self,
        sock: SocketHandle,
        data: Bytes,
        to: SocketAddr,
    ) -> Result<(), SocketError> {
        if let Some(e) = self.refuse_send.clone() {
            return Err(e);
        }
        self.sent.push((sock, data, Some(to)));
        Ok(())
    }
    fn close(&mut self, sock: SocketHandle) {
        self.closed.push(sock);
    }
    fn schedule(&mut self, delay: Duration) -> TimerId {
        self.next_timer += 1;
        let timer = TimerId::new(self.next_timer);
        self.timers.push((timer, delay));
        timer
    }
    fn cancel(&mut self, timer: TimerId) {
        self.cancelled.push(timer);
    }
}

fn server_addr() -> SocketAddr {
    "10.1.1.2:7".parse().unwrap()
}

fn client_config(kind: SocketKind) -> EchoClientConfig {
    EchoClientConfig::new(server_addr(), kind)
        .with_max_packets(2)
        .with_interval(Duration::from_secs(1))
        .with_packet_size(512)
        .with_fill(Fill::Pattern((0..=255).collect()))
}

#[test]
#[traced_test]
fn stream_client_session() {
    let mut ctx = MockCtx::default();
    let mut client = EchoClient::new(client_config(SocketKind::Stream));
    assert_eq!(client.state(), ClientState::Idle);

    client.start(&mut ctx);
    assert_eq!(client.state(), ClientState::Connecting);
    assert_eq!(ctx.connects, vec![server_addr()]);
    assert!(ctx.sent.is_empty());
    let sock = SocketHandle::new(1);

    client.handle_event(&mut ctx, AppEvent::Connected(sock));
    assert_eq!(client.state(), ClientState::WaitReplyOrNext);
    assert_eq!(ctx.sent.len(), 1);
    assert_eq!(ctx.timers, vec![(TimerId::new(1), Duration::from_secs(1))]);

    let timer = ctx.last_timer();
    client.handle_event(&mut ctx, AppEvent::Timer(timer));
    assert_eq!(ctx.sent.len(), 2);
    // no timer after the last packet
    assert_eq!(ctx.timers.len(), 1);
    assert_eq!(client.packets_sent(), 2);
    assert_eq!(client.bytes_sent(), 1024);
    assert_eq!(client.bytes_outstanding(), 1024);

    // echoed bytes come back coalesced and split differently
    let all: Vec<u8> = ctx.sent.iter().flat_map(|(_, data, _)| data.to_vec()).collect();
    for chunk in [&all[..100], &all[100..700], &all[700..]] {
        client.handle_event(
            &mut ctx,
            AppEvent::Received {
                sock,
                data: Bytes::copy_from_slice(chunk),
                from: server_addr(),
            },
        );
    }
    assert_eq!(client.bytes_received_back(), 1024);
    assert_eq!(client.mismatched_bytes(), 0);
    assert!(client.is_complete());
    assert!(logs_contain("client sent 512 bytes to 10.1.1.2:7"));

    client.stop(&mut ctx);
    assert_eq!(client.state(), ClientState::Stopped);
    assert_eq!(ctx.closed, vec![sock]);
    // counters survive
    assert_eq!(client.bytes_sent(), 1024);
}

#[test]
fn datagram_client_sends_at_start() {
    let mut ctx = MockCtx::default();
    let mut client = EchoClient::new(client_config(SocketKind::Datagram));
    client.start(&mut ctx);
    assert_eq!(ctx.binds, vec![None]);
    assert_eq!(ctx.sent.len(), 1);
    assert_eq!(ctx.sent[0].2, Some(server_addr()));
    assert_eq!(ctx.sent[0].1.len(), 512);
}

#[test]
fn altered_echo_is_detected() {
    let mut ctx = MockCtx::default();
    let mut client = EchoClient::new(client_config(SocketKind::Datagram).with_max_packets(1));
    client.start(&mut ctx);
    let mut data = ctx.sent[0].1.to_vec();
    data[10] ^= 0xff;
    data.push(0);
    client.handle_event(
        &mut ctx,
        AppEvent::Received {
            sock: SocketHandle::new(1),
            data: data.into(),
            from: server_addr(),
        },
    );
    assert_eq!(client.bytes_received_back(), 513);
    assert_eq!(client.mismatched_bytes(), 2);
    assert!(!client.is_complete());
}

#[test]
#[traced_test]
fn datagram_from_elsewhere_is_ignored() {
    let mut ctx = MockCtx::default();
    let mut client = EchoClient::new(client_config(SocketKind::Datagram).with_max_packets(1));
    client.start(&mut ctx);
    let echoed = ctx.sent[0].1.clone();
    let stranger: SocketAddr = "10.1.1.3:7".parse().unwrap();
    client.handle_event(
        &mut ctx,
        AppEvent::Received {
            sock: SocketHandle::new(1),
            data: echoed.clone(),
            from: stranger,
        },
    );
    assert_eq!(client.bytes_received_back(), 0);
    assert_eq!(client.bytes_outstanding(), 512);
    assert!(logs_contain("ignoring datagram from 10.1.1.3:7"));

    client.handle_event(
        &mut ctx,
        AppEvent::Received {
            sock: SocketHandle::new(1),
            data: echoed,
            from: server_addr(),
        },
    );
    assert_eq!(client.bytes_received_back(), 512);
    assert_eq!(client.mismatched_bytes(), 0);
    assert!(client.is_complete());
}

#[test]
fn reset_stops_sending_and_keeps_counters() {
    let mut ctx = MockCtx::default();
    let mut client = EchoClient::new(client_config(SocketKind::Stream).with_max_packets(5));
    client.start(&mut ctx);
    let sock = SocketHandle::new(1);
    client.handle_event(&mut ctx, AppEvent::Connected(sock));
    let timer = ctx.last_timer();

    client.handle_event(&mut ctx, AppEvent::Reset(sock));
    assert_eq!(client.state(), ClientState::Stopped);
    assert_eq!(client.error(), Some(&SocketError::Reset));
    assert_eq!(ctx.cancelled, vec![timer]);

    client.handle_event(&mut ctx, AppEvent::Timer(timer));
    assert_eq!(ctx.sent.len(), 1);
    assert_eq!(client.bytes_sent(), 512);
    assert_eq!(client.bytes_received_back(), 0);
}

#[test]
fn connection_refused() {
    let mut ctx = MockCtx::default();
    let mut client = EchoClient::new(client_config(SocketKind::Stream));
    client.start(&mut ctx);
    client.handle_event(
        &mut ctx,
        AppEvent::ConnectFailed(SocketHandle::new(1), SocketError::Refused),
    );
    assert_eq!(client.state(), ClientState::Stopped);
    assert_eq!(client.error(), Some(&SocketError::Refused));
    assert_eq!(client.bytes_sent(), 0);
}

#[test]
fn send_failure_stops_client() {
    let mut ctx = MockCtx {
        refuse_send: Some(SocketError::Unreachable(server_addr().ip())),
        ..Default::default()
    };
    let mut client = EchoClient::new(client_config(SocketKind::Datagram));
    client.start(&mut ctx);
    assert_eq!(client.state(), ClientState::Stopped);
    assert_eq!(client.packets_sent(), 0);
    assert_eq!(ctx.closed, vec![SocketHandle::new(1)]);
}

#[test]
fn stream_server_echoes_each_peer() {
    let mut ctx = MockCtx::default();
    let mut server = EchoServer::new(EchoServerConfig::new(7, SocketKind::Stream));
    server.start(&mut ctx);
    assert_eq!(server.state(), ServerState::Listening);
    assert_eq!(ctx.listens, vec![7]);
    let listener = SocketHandle::new(1);

    let peers: [SocketAddr; 2] = ["10.1.1.1:49153".parse().unwrap(), "10.1.1.3:49153".parse().unwrap()];
    for (i, peer) in peers.iter().enumerate() {
        server.handle_event(
            &mut ctx,
            AppEvent::Accepted {
                listener,
                conn: SocketHandle::new(10 + u32::try_from(i).unwrap()),
                peer: *peer,
            },
        );
    }
    server.handle_event(
        &mut ctx,
        AppEvent::AcceptError {
            listener,
            error: SocketError::ListenLimit(7),
        },
    );
    assert_eq!(server.state(), ServerState::Listening);
    assert_eq!(server.peers_accepted(), 2);

    for (conn, data) in [(10, "hello"), (11, "world"), (10, "again")] {
        server.handle_event(
            &mut ctx,
            AppEvent::Received {
                sock: SocketHandle::new(conn),
                data: Bytes::from_static(data.as_bytes()),
                from: peers[conn as usize - 10],
            },
        );
    }
    let echoed: Vec<_> = ctx
        .sent
        .iter()
        .map(|(sock, data, to)| (sock.get(), data.clone(), *to))
        .collect();
    assert_eq!(
        echoed,
        vec![
            (10, Bytes::from_static(b"hello"), None),
            (11, Bytes::from_static(b"world"), None),
            (10, Bytes::from_static(b"again"), None),
        ]
    );
    assert_eq!(server.bytes_received(), 15);
    assert_eq!(server.bytes_echoed(), 15);

    server.handle_event(&mut ctx, AppEvent::PeerClosed(SocketHandle::new(10)));
    assert_eq!(server.active_peers(), 1);
    assert_eq!(ctx.closed, vec![SocketHandle::new(10)]);

    server.stop(&mut ctx);
    assert_eq!(ctx.closed, vec![SocketHandle::new(10), SocketHandle::new(11), listener]);
    server.handle_event(
        &mut ctx,
        AppEvent::Received {
            sock: SocketHandle::new(11),
            data: Bytes::from_static(b"late"),
            from: peers[1],
        },
    );
    assert_eq!(server.bytes_received(), 15);
}

#[test]
fn datagram_server_replies_to_sender() {
    let mut ctx = MockCtx::default();
    let mut server = EchoServer::new(EchoServerConfig::new(9, SocketKind::Datagram));
    server.start(&mut ctx);
    assert_eq!(ctx.binds, vec![Some(9)]);
    let from: SocketAddr = "203.82.48.100:8080".parse().unwrap();
    server.handle_event(
        &mut ctx,
        AppEvent::Received {
            sock: SocketHandle::new(1),
            data: Bytes::from(vec![0u8; 512]),
            from,
        },
    );
    assert_eq!(ctx.sent.len(), 1);
    assert_eq!(ctx.sent[0].2, Some(from));
    assert_eq!(server.bytes_echoed(), 512);
}

#[test]
fn server_bind_failure() {
    let mut ctx = MockCtx {
        refuse_bind: Some(SocketError::AddressInUse(9)),
        ..Default::default()
    };
    let mut server = EchoServer::new(EchoServerConfig::new(9, SocketKind::Datagram));
    server.start(&mut ctx);
    assert_eq!(server.state(), ServerState::Stopped);
    assert_eq!(server.error(), Some(&SocketError::AddressInUse(9)));
}

#[test]
fn app_delegates() {
    let mut ctx = MockCtx::default();
    let mut app = App::from(EchoClient::new(client_config(SocketKind::Datagram)));
    app.start(&mut ctx);
    assert_eq!(app.as_client().map(EchoClient::bytes_sent), Some(512));
    assert!(app.as_server().is_none());
    app.stop(&mut ctx);
    assert_eq!(
        app.as_client().map(EchoClient::state),
        Some(ClientState::Stopped)
    );
}
