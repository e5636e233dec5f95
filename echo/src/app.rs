// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The capabilities a simulated application is given, and the events it reacts to

use crate::client::EchoClient;
use crate::server::EchoServer;
use bytes::Bytes;
use net::time::SimTime;
use std::fmt::{Display, Formatter};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// Handle to a socket owned by the node an application runs on
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SocketHandle(u32);

impl SocketHandle {
    #[must_use]
    pub const fn new(val: u32) -> Self {
        Self(val)
    }
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

impl Display for SocketHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "sock-{}", self.0)
    }
}

/// Handle to a pending timer
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

impl TimerId {
    #[must_use]
    pub const fn new(val: u64) -> Self {
        Self(val)
    }
}

/// The kind of transport an echo application runs over
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum SocketKind {
    /// connection oriented, reliable, ordered byte stream
    #[default]
    Stream,
    /// connectionless datagrams
    Datagram,
}

impl Display for SocketKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SocketKind::Stream => write!(f, "stream"),
            SocketKind::Datagram => write!(f, "datagram"),
        }
    }
}

/// Errors of the socket API
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SocketError {
    #[error("connection refused")]
    Refused,
    #[error("connection reset")]
    Reset,
    #[error("port {0} is already in use")]
    AddressInUse(u16),
    #[error("{0} is unreachable")]
    Unreachable(IpAddr),
    #[error("no such socket: {0}")]
    NoSuchSocket(SocketHandle),
    #[error("socket is not connected")]
    NotConnected,
    #[error("no ephemeral port left")]
    PortsExhausted,
    #[error("too many connections on port {0}")]
    ListenLimit(u16),
}

/// Events delivered to an application
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    Timer(TimerId),
    /// a connection opened with [`AppContext::connect`] is established
    Connected(SocketHandle),
    ConnectFailed(SocketHandle, SocketError),
    /// a listener accepted connection `conn` from `peer`
    Accepted {
        listener: SocketHandle,
        conn: SocketHandle,
        peer: SocketAddr,
    },
    AcceptError {
        listener: SocketHandle,
        error: SocketError,
    },
    /// data arrived. For streams, `from` is the connected peer and chunks may be coalesced or
    /// split with respect to what the peer sent.
    Received {
        sock: SocketHandle,
        data: Bytes,
        from: SocketAddr,
    },
    /// the peer closed its side of the connection
    PeerClosed(SocketHandle),
    /// the connection was reset
    Reset(SocketHandle),
}

/// What a node offers to the applications it runs: sockets and timers.
///
/// Operations never block. Completion of asynchronous operations, like establishing a
/// connection, is signaled later with an [`AppEvent`].
pub trait AppContext {
    /// Current simulated time
    fn now(&self) -> SimTime;

    /// Open a stream connection to `remote` from an ephemeral port.
    ///
    /// # Errors
    ///
    /// Fails if no ephemeral port is left or if `remote` can't be routed to.
    fn connect(&mut self, remote: SocketAddr) -> Result<SocketHandle, SocketError>;

    /// Accept stream connections on `port`.
    ///
    /// # Errors
    ///
    /// Fails if the port is in use.
    fn listen(&mut self, port: u16) -> Result<SocketHandle, SocketError>;

    /// Open a datagram socket on `port`, or on an ephemeral port if `None`.
    ///
    /// # Errors
    ///
    /// Fails if the port is in use or no ephemeral port is left.
    fn bind_datagram(&mut self, port: Option<u16>) -> Result<SocketHandle, SocketError>;

    /// Send data on a connected stream socket.
    ///
    /// # Errors
    ///
    /// Fails if the socket does not exist or is not connected.
    fn send(&mut self, sock: SocketHandle, data: Bytes) -> Result<(), SocketError>;

    /// Send a datagram to `to`.
    ///
    /// # Errors
    ///
    /// Fails if the socket does not exist or if `to` can't be routed to.
    fn send_to(&mut self, sock: SocketHandle, data: Bytes, to: SocketAddr)
    -> Result<(), SocketError>;

    /// Close a socket. Data already handed to the transport is still delivered.
    fn close(&mut self, sock: SocketHandle);

    /// Get an [`AppEvent::Timer`] after `delay`
    fn schedule(&mut self, delay: Duration) -> TimerId;

    fn cancel(&mut self, timer: TimerId);
}

/// The capability set of a simulated application
pub trait Application {
    fn start(&mut self, ctx: &mut dyn AppContext);
    fn stop(&mut self, ctx: &mut dyn AppContext);
    fn handle_event(&mut self, ctx: &mut dyn AppContext, event: AppEvent);
}

/// The applications a node can run
#[derive(Debug)]
pub enum App {
    Client(EchoClient),
    Server(EchoServer),
}

impl App {
    #[must_use]
    pub fn as_client(&self) -> Option<&EchoClient> {
        match self {
            App::Client(client) => Some(client),
            App::Server(_) => None,
        }
    }
    #[must_use]
    pub fn as_server(&self) -> Option<&EchoServer> {
        match self {
            App::Server(server) => Some(server),
            App::Client(_) => None,
        }
    }
}

impl From<EchoClient> for App {
    fn from(client: EchoClient) -> Self {
        App::Client(client)
    }
}

impl From<EchoServer> for App {
    fn from(server: EchoServer) -> Self {
        App::Server(server)
    }
}

impl Application for App {
    fn start(&mut self, ctx: &mut dyn AppContext) {
        match self {
            App::Client(client) => client.start(ctx),
            App::Server(server) => server.start(ctx),
        }
    }
    fn stop(&mut self, ctx: &mut dyn AppContext) {
        match self {
            App::Client(client) => client.stop(ctx),
            App::Server(server) => server.stop(ctx),
        }
    }
    fn handle_event(&mut self, ctx: &mut dyn AppContext, event: AppEvent) {
        match self {
            App::Client(client) => client.handle_event(ctx, event),
            App::Server(server) => server.handle_event(ctx, event),
        }
    }
}
