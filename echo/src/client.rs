// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Echo client

use crate::app::{AppContext, AppEvent, Application, SocketError, SocketHandle, SocketKind, TimerId};
use crate::fill::Fill;
use bytes::Bytes;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

use tracectl::{LevelFilter, log_component};
log_component!("echo-client", LevelFilter::INFO, &["echo", "echo-client"]);

/// Configuration of an [`EchoClient`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EchoClientConfig {
    pub remote: SocketAddr,
    pub kind: SocketKind,
    pub max_packets: u32,
    pub interval: Duration,
    pub packet_size: usize,
    pub fill: Fill,
}

impl EchoClientConfig {
    pub const DEFAULT_MAX_PACKETS: u32 = 100;
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);
    pub const DEFAULT_PACKET_SIZE: usize = 100;

    #[must_use]
    pub fn new(remote: SocketAddr, kind: SocketKind) -> Self {
        Self {
            remote,
            kind,
            max_packets: Self::DEFAULT_MAX_PACKETS,
            interval: Self::DEFAULT_INTERVAL,
            packet_size: Self::DEFAULT_PACKET_SIZE,
            fill: Fill::default(),
        }
    }
    #[must_use]
    pub fn with_max_packets(mut self, max_packets: u32) -> Self {
        self.max_packets = max_packets;
        self
    }
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
    #[must_use]
    pub fn with_packet_size(mut self, packet_size: usize) -> Self {
        self.packet_size = packet_size;
        self
    }
    #[must_use]
    pub fn with_fill(mut self, fill: Fill) -> Self {
        self.fill = fill;
        self
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ClientState {
    Idle,
    /// waiting for the connection to be established
    Connecting,
    Sending,
    /// a packet went out: waiting for echoed bytes or for the next send
    WaitReplyOrNext,
    Stopped,
}

/// Sends `max_packets` packets of `packet_size` bytes to an echo server, one every `interval`,
/// and accounts for the bytes echoed back.
///
/// Echoed bytes are compared, in order, to the bytes sent and not echoed yet. Counters stay
/// readable after the client stops.
#[derive(Debug)]
pub struct EchoClient {
    config: EchoClientConfig,
    state: ClientState,
    sock: Option<SocketHandle>,
    timer: Option<TimerId>,
    packets_sent: u32,
    bytes_sent: u64,
    bytes_received_back: u64,
    mismatched_bytes: u64,
    outstanding: VecDeque<u8>,
    error: Option<SocketError>,
}

impl EchoClient {
    #[must_use]
    pub fn new(config: EchoClientConfig) -> Self {
        Self {
            config,
            state: ClientState::Idle,
            sock: None,
            timer: None,
            packets_sent: 0,
            bytes_sent: 0,
            bytes_received_back: 0,
            mismatched_bytes: 0,
            outstanding: VecDeque::new(),
            error: None,
        }
    }

    #[must_use]
    pub fn config(&self) -> &EchoClientConfig {
        &self.config
    }
    #[must_use]
    pub fn state(&self) -> ClientState {
        self.state
    }
    #[must_use]
    pub fn packets_sent(&self) -> u32 {
        self.packets_sent
    }
    #[must_use]
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }
    #[must_use]
    pub fn bytes_received_back(&self) -> u64 {
        self.bytes_received_back
    }
    /// Echoed bytes that differ from what was sent at their position, or that exceed it
    #[must_use]
    pub fn mismatched_bytes(&self) -> u64 {
        self.mismatched_bytes
    }
    /// Bytes sent and not echoed back (yet)
    #[must_use]
    pub fn bytes_outstanding(&self) -> usize {
        self.outstanding.len()
    }
    /// The socket error that made the client stop, if any
    #[must_use]
    pub fn error(&self) -> Option<&SocketError> {
        self.error.as_ref()
    }
    /// Tell if every byte sent came back unaltered
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.bytes_sent == self.bytes_received_back
            && self.mismatched_bytes == 0
            && self.outstanding.is_empty()
    }

    fn fail(&mut self, ctx: &mut dyn AppContext, error: SocketError) {
        warn!(
            "echo client to {} failed after {} packets: {error}",
            self.config.remote, self.packets_sent
        );
        self.error = Some(error);
        self.shutdown(ctx);
    }

    fn shutdown(&mut self, ctx: &mut dyn AppContext) {
        if let Some(timer) = self.timer.take() {
            ctx.cancel(timer);
        }
        if let Some(sock) = self.sock.take() {
            ctx.close(sock);
        }
        self.state = ClientState::Stopped;
    }

    fn send_next(&mut self, ctx: &mut dyn AppContext) {
        let Some(sock) = self.sock else {
            return;
        };
        if self.packets_sent >= self.config.max_packets {
            self.state = ClientState::WaitReplyOrNext;
            return;
        }
        self.state = ClientState::Sending;
        let payload = self.config.fill.payload(self.config.packet_size);
        let sent = match self.config.kind {
            SocketKind::Stream => ctx.send(sock, payload.clone()),
            SocketKind::Datagram => ctx.send_to(sock, payload.clone(), self.config.remote),
        };
        if let Err(e) = sent {
            self.fail(ctx, e);
            return;
        }
        self.packets_sent += 1;
        self.bytes_sent += payload.len() as u64;
        self.outstanding.extend(payload.iter());
        info!(
            "At time {} client sent {} bytes to {}",
            ctx.now(),
            payload.len(),
            self.config.remote
        );
        self.state = ClientState::WaitReplyOrNext;
        if self.packets_sent < self.config.max_packets {
            self.timer = Some(ctx.schedule(self.config.interval));
        }
    }

    fn receive(&mut self, ctx: &mut dyn AppContext, data: &Bytes, from: SocketAddr) {
        info!(
            "At time {} client received {} bytes from {from}",
            ctx.now(),
            data.len()
        );
        self.bytes_received_back += data.len() as u64;
        for byte in data {
            match self.outstanding.pop_front() {
                Some(expected) if expected == *byte => {}
                _ => self.mismatched_bytes += 1,
            }
        }
        if self.mismatched_bytes > 0 {
            trace!("{} mismatched bytes so far", self.mismatched_bytes);
        }
    }
}

impl Application for EchoClient {
    fn start(&mut self, ctx: &mut dyn AppContext) {
        if self.state != ClientState::Idle {
            return;
        }
        debug!(
            "starting {} echo client to {}",
            self.config.kind, self.config.remote
        );
        match self.config.kind {
            SocketKind::Stream => match ctx.connect(self.config.remote) {
                Ok(sock) => {
                    self.sock = Some(sock);
                    self.state = ClientState::Connecting;
                }
                Err(e) => self.fail(ctx, e),
            },
            SocketKind::Datagram => match ctx.bind_datagram(None) {
                Ok(sock) => {
                    self.sock = Some(sock);
                    self.send_next(ctx);
                }
                Err(e) => self.fail(ctx, e),
            },
        }
    }

    fn stop(&mut self, ctx: &mut dyn AppContext) {
        if self.state == ClientState::Stopped {
            return;
        }
        debug!(
            "stopping echo client: sent {} bytes, received {} back",
            self.bytes_sent, self.bytes_received_back
        );
        self.shutdown(ctx);
    }

    fn handle_event(&mut self, ctx: &mut dyn AppContext, event: AppEvent) {
        if self.state == ClientState::Stopped {
            trace!("stopped client ignores {event:?}");
            return;
        }
        match event {
            AppEvent::Connected(sock) if Some(sock) == self.sock => {
                debug!("connected to {}", self.config.remote);
                self.send_next(ctx);
            }
            AppEvent::ConnectFailed(sock, error) if Some(sock) == self.sock => {
                self.fail(ctx, error);
            }
            AppEvent::Timer(timer) if Some(timer) == self.timer => {
                self.timer = None;
                self.send_next(ctx);
            }
            AppEvent::Received { from, .. }
                if self.config.kind == SocketKind::Datagram && from != self.config.remote =>
            {
                debug!("ignoring datagram from {from}, not from {}", self.config.remote);
            }
            AppEvent::Received { sock, data, from } if Some(sock) == self.sock => {
                self.receive(ctx, &data, from);
            }
            AppEvent::Reset(sock) if Some(sock) == self.sock => {
                self.fail(ctx, SocketError::Reset);
            }
            AppEvent::PeerClosed(sock) if Some(sock) == self.sock => {
                debug!("server closed the connection");
                self.shutdown(ctx);
            }
            event => trace!("client ignores {event:?}"),
        }
    }
}
