// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Echo server

use crate::app::{AppContext, AppEvent, Application, SocketError, SocketHandle, SocketKind};
use bytes::Bytes;
use ordermap::OrderMap;
use std::net::SocketAddr;
use tracing::{debug, error, info, trace, warn};

use tracectl::{LevelFilter, log_component};
log_component!("echo-server", LevelFilter::INFO, &["echo", "echo-server"]);

/// Configuration of an [`EchoServer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EchoServerConfig {
    pub port: u16,
    pub kind: SocketKind,
}

impl EchoServerConfig {
    #[must_use]
    pub fn new(port: u16, kind: SocketKind) -> Self {
        Self { port, kind }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ServerState {
    Idle,
    Listening,
    Stopped,
}

/// Echoes back whatever it receives, in order, to whoever sent it.
#[derive(Debug)]
pub struct EchoServer {
    config: EchoServerConfig,
    state: ServerState,
    listener: Option<SocketHandle>,
    peers: OrderMap<SocketHandle, SocketAddr>,
    bytes_received: u64,
    bytes_echoed: u64,
    peers_accepted: u64,
    error: Option<SocketError>,
}

impl EchoServer {
    #[must_use]
    pub fn new(config: EchoServerConfig) -> Self {
        Self {
            config,
            state: ServerState::Idle,
            listener: None,
            peers: OrderMap::new(),
            bytes_received: 0,
            bytes_echoed: 0,
            peers_accepted: 0,
            error: None,
        }
    }

    #[must_use]
    pub fn config(&self) -> &EchoServerConfig {
        &self.config
    }
    #[must_use]
    pub fn state(&self) -> ServerState {
        self.state
    }
    #[must_use]
    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }
    #[must_use]
    pub fn bytes_echoed(&self) -> u64 {
        self.bytes_echoed
    }
    #[must_use]
    pub fn peers_accepted(&self) -> u64 {
        self.peers_accepted
    }
    /// Connections currently open
    #[must_use]
    pub fn active_peers(&self) -> usize {
        self.peers.len()
    }
    /// The error that prevented the server from listening, if any
    #[must_use]
    pub fn error(&self) -> Option<&SocketError> {
        self.error.as_ref()
    }

    fn echo(
        &mut self,
        ctx: &mut dyn AppContext,
        sock: SocketHandle,
        data: Bytes,
        from: SocketAddr,
    ) {
        info!(
            "At time {} server received {} bytes from {from}",
            ctx.now(),
            data.len()
        );
        self.bytes_received += data.len() as u64;
        let len = data.len() as u64;
        let sent = match self.config.kind {
            SocketKind::Stream => ctx.send(sock, data),
            SocketKind::Datagram => ctx.send_to(sock, data, from),
        };
        match sent {
            Ok(()) => {
                self.bytes_echoed += len;
                info!("At time {} server sent {len} bytes to {from}", ctx.now());
            }
            Err(e) => {
                warn!("failed to echo to {from}: {e}");
                if self.peers.remove(&sock).is_some() {
                    ctx.close(sock);
                }
            }
        }
    }
}

impl Application for EchoServer {
    fn start(&mut self, ctx: &mut dyn AppContext) {
        if self.state != ServerState::Idle {
            return;
        }
        let bound = match self.config.kind {
            SocketKind::Stream => ctx.listen(self.config.port),
            SocketKind::Datagram => ctx.bind_datagram(Some(self.config.port)),
        };
        match bound {
            Ok(sock) => {
                debug!(
                    "{} echo server listening on port {}",
                    self.config.kind, self.config.port
                );
                self.listener = Some(sock);
                self.state = ServerState::Listening;
            }
            Err(e) => {
                error!("echo server can't bind port {}: {e}", self.config.port);
                self.error = Some(e);
                self.state = ServerState::Stopped;
            }
        }
    }

    fn stop(&mut self, ctx: &mut dyn AppContext) {
        if self.state == ServerState::Stopped {
            return;
        }
        debug!(
            "stopping echo server: received {} bytes, echoed {}",
            self.bytes_received, self.bytes_echoed
        );
        for (sock, _) in self.peers.drain(..) {
            ctx.close(sock);
        }
        if let Some(listener) = self.listener.take() {
            ctx.close(listener);
        }
        self.state = ServerState::Stopped;
    }

    fn handle_event(&mut self, ctx: &mut dyn AppContext, event: AppEvent) {
        if self.state != ServerState::Listening {
            trace!("server not listening, ignores {event:?}");
            return;
        }
        match event {
            AppEvent::Accepted {
                listener,
                conn,
                peer,
            } if Some(listener) == self.listener => {
                debug!("accepted connection from {peer}");
                self.peers.insert(conn, peer);
                self.peers_accepted += 1;
            }
            AppEvent::AcceptError { error, .. } => {
                warn!("accept failed: {error}");
            }
            AppEvent::Received { sock, data, from }
                if Some(sock) == self.listener || self.peers.contains_key(&sock) =>
            {
                self.echo(ctx, sock, data, from);
            }
            AppEvent::PeerClosed(sock) => {
                if let Some(peer) = self.peers.remove(&sock) {
                    debug!("{peer} closed the connection");
                    ctx.close(sock);
                }
            }
            AppEvent::Reset(sock) => {
                if let Some(peer) = self.peers.remove(&sock) {
                    debug!("connection with {peer} was reset");
                }
            }
            event => trace!("server ignores {event:?}"),
        }
    }
}
