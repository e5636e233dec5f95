// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

#![allow(clippy::missing_errors_doc)]

//! The simulator: nodes, links, applications and the event loop driving them.

use crate::config::SimConfig;
use crate::error::SimError;
use crate::link::{Link, LinkConfig, LinkEnd, LinkId, Wire};
use crate::node::{Node, NodeId, NodeKind};
use crate::scheduler::{EventId, Scheduler};
use bytes::Bytes;
use echo::{
    App, AppContext, AppEvent, Application, EchoClient, EchoServer, SocketError, SocketHandle,
    TimerId,
};
use ipnet::IpNet;
use nat::StaticNat;
use net::interface::{AdminState, InterfaceId};
use net::packet::Packet;
use net::time::SimTime;
use pipeline::stages::NextHop;
use stats::DropReporter;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tracing::{debug, info, trace};

/// Index of an application in the simulator
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct AppId(pub(crate) usize);

impl Display for AppId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "app-{}", self.0)
    }
}

#[derive(Debug)]
pub(crate) enum Event {
    AppStart(AppId),
    AppStop(AppId),
    AppTimer(AppId, TimerId),
    /// a packet reaches interface `iif` of `node`
    Deliver {
        node: NodeId,
        iif: InterfaceId,
        packet: Packet,
    },
    /// time to expire stale fragments on a node
    Housekeeping(NodeId),
}

#[derive(Debug)]
struct AppSlot {
    node: NodeId,
    app: App,
}

/// Timers handed out to applications
#[derive(Debug, Default)]
struct Timers {
    next: u64,
    pending: HashMap<TimerId, EventId>,
}

/// What an application sees of the node it runs on
struct SimCtx<'a> {
    app: AppId,
    node: &'a mut Node,
    wire: Wire<'a>,
    timers: &'a mut Timers,
}

impl AppContext for SimCtx<'_> {
    fn now(&self) -> SimTime {
        self.wire.now
    }

    fn connect(&mut self, remote: SocketAddr) -> Result<SocketHandle, SocketError> {
        let local = self
            .node
            .source_address_for(remote.ip())
            .ok_or(SocketError::Unreachable(remote.ip()))?;
        let (sock, syn) = self.node.transport.connect(self.app, local, remote)?;
        self.node.output(&mut self.wire, syn);
        Ok(sock)
    }

    fn listen(&mut self, port: u16) -> Result<SocketHandle, SocketError> {
        self.node.transport.listen(self.app, port)
    }

    fn bind_datagram(&mut self, port: Option<u16>) -> Result<SocketHandle, SocketError> {
        self.node.transport.bind_datagram(self.app, port)
    }

    fn send(&mut self, sock: SocketHandle, data: Bytes) -> Result<(), SocketError> {
        for segment in self.node.transport.send(sock, &data)? {
            self.node.output(&mut self.wire, segment);
        }
        Ok(())
    }

    fn send_to(
        &mut self,
        sock: SocketHandle,
        data: Bytes,
        to: SocketAddr,
    ) -> Result<(), SocketError> {
        let local = self
            .node
            .source_address_for(to.ip())
            .ok_or(SocketError::Unreachable(to.ip()))?;
        let packet = self.node.transport.send_to(sock, local, data, to)?;
        self.node.output(&mut self.wire, packet);
        Ok(())
    }

    fn close(&mut self, sock: SocketHandle) {
        if let Some(packet) = self.node.transport.close(sock) {
            self.node.output(&mut self.wire, packet);
        }
    }

    fn schedule(&mut self, delay: Duration) -> TimerId {
        self.timers.next += 1;
        let timer = TimerId::new(self.timers.next);
        let event = self
            .wire
            .sched
            .schedule_in(delay, Event::AppTimer(self.app, timer));
        self.timers.pending.insert(timer, event);
        timer
    }

    fn cancel(&mut self, timer: TimerId) {
        if let Some(event) = self.timers.pending.remove(&timer) {
            self.wire.sched.cancel(event);
        }
    }
}

/// A discrete-event network simulation.
///
/// Nodes are connected by point-to-point links and run applications. Nothing happens until
/// [`Simulator::run`] or [`Simulator::run_until`] is called: events then execute in time order,
/// and events scheduled for the same time execute in the order they were scheduled.
///
/// ```
/// use natsim_sim::{LinkConfig, SimConfig, Simulator};
/// use echo::{EchoClient, EchoClientConfig, EchoServer, EchoServerConfig, SocketKind};
/// use net::time::SimTime;
/// use stats::DropReporter;
///
/// # fn main() -> Result<(), natsim_sim::SimError> {
/// let mut sim = Simulator::new(SimConfig::default(), DropReporter::discard());
/// let a = sim.add_host("a")?;
/// let b = sim.add_host("b")?;
/// let (ia, ib) = sim.connect(a, b, LinkConfig::default())?;
/// sim.add_address(a, ia, "10.1.1.1/24".parse().unwrap())?;
/// sim.add_address(b, ib, "10.1.1.2/24".parse().unwrap())?;
///
/// let server = sim.install_app(b, EchoServer::new(EchoServerConfig::new(7, SocketKind::Stream)))?;
/// let config = EchoClientConfig::new("10.1.1.2:7".parse().unwrap(), SocketKind::Stream)
///     .with_max_packets(3);
/// let client = sim.install_app(a, EchoClient::new(config))?;
/// sim.start_app_at(server, SimTime::from_secs(1))?;
/// sim.start_app_at(client, SimTime::from_secs(2))?;
/// sim.stop_app_at(client, SimTime::from_secs(10))?;
/// sim.run();
///
/// let client = sim.client(client).unwrap();
/// assert_eq!(client.bytes_sent(), 300);
/// assert_eq!(client.bytes_received_back(), 300);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Simulator {
    config: SimConfig,
    sched: Scheduler<Event>,
    nodes: Vec<Node>,
    links: Vec<Link>,
    apps: Vec<AppSlot>,
    drops: DropReporter,
    timers: Timers,
}

impl Simulator {
    /// A simulator whose nodes report dropped packets to `drops`
    #[must_use]
    pub fn new(config: SimConfig, drops: DropReporter) -> Self {
        Self {
            config,
            sched: Scheduler::new(),
            nodes: Vec::new(),
            links: Vec::new(),
            apps: Vec::new(),
            drops,
            timers: Timers::default(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    #[must_use]
    pub fn now(&self) -> SimTime {
        self.sched.now()
    }

    fn add_node(&mut self, name: &str, kind: NodeKind) -> Result<NodeId, SimError> {
        let id = NodeId(self.nodes.len());
        let node = Node::new(id, name, kind, &self.config, &self.drops)?;
        self.nodes.push(node);
        Ok(id)
    }

    pub fn add_host(&mut self, name: &str) -> Result<NodeId, SimError> {
        self.add_node(name, NodeKind::Host)
    }

    /// Add a router. Unlike hosts, routers can run a translator.
    pub fn add_router(&mut self, name: &str) -> Result<NodeId, SimError> {
        self.add_node(name, NodeKind::Router)
    }

    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    #[must_use]
    pub fn node_by_name(&self, name: &str) -> Option<NodeId> {
        self.nodes.iter().find(|node| node.name() == name).map(Node::id)
    }

    /// All nodes, in the order they were added
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, SimError> {
        self.nodes.get_mut(id.0).ok_or(SimError::UnknownNode(id))
    }

    /// Link `a` and `b`. Returns the interfaces created on `a` and `b`.
    pub fn connect(
        &mut self,
        a: NodeId,
        b: NodeId,
        config: LinkConfig,
    ) -> Result<(InterfaceId, InterfaceId), SimError> {
        if self.node(a).is_none() {
            return Err(SimError::UnknownNode(a));
        }
        if self.node(b).is_none() {
            return Err(SimError::UnknownNode(b));
        }
        let link = LinkId(self.links.len());
        let if_a = self.node_mut(a)?.attach_link(LinkEnd { link, side: 0 });
        let if_b = self.node_mut(b)?.attach_link(LinkEnd { link, side: 1 });
        self.links.push(Link::new(config, (a, if_a), (b, if_b)));
        debug!("link {}: {a}/{if_a} <-> {b}/{if_b}", link.0);
        Ok((if_a, if_b))
    }

    pub fn add_address(
        &mut self,
        node: NodeId,
        ifindex: InterfaceId,
        addr: IpNet,
    ) -> Result<(), SimError> {
        self.node_mut(node)?.add_address(ifindex, addr)
    }

    pub fn add_route(
        &mut self,
        node: NodeId,
        prefix: IpNet,
        nhop: NextHop,
    ) -> Result<(), SimError> {
        self.node_mut(node)?.add_route(prefix, nhop)
    }

    /// Route everything without a more specific route out of `oif`, via `gateway`
    pub fn set_default_route(
        &mut self,
        node: NodeId,
        oif: InterfaceId,
        gateway: Option<IpAddr>,
    ) -> Result<(), SimError> {
        self.node_mut(node)?
            .set_default_route(NextHop::new(oif, gateway))
    }

    pub fn set_interface_up(
        &mut self,
        node: NodeId,
        ifindex: InterfaceId,
        up: bool,
    ) -> Result<(), SimError> {
        let state = if up { AdminState::Up } else { AdminState::Down };
        self.node_mut(node)?.set_admin_state(ifindex, state)
    }

    /// Install a configured translator on router `node`
    pub fn install_nat(&mut self, node: NodeId, nat: StaticNat) -> Result<(), SimError> {
        self.node_mut(node)?.install_nat(nat)
    }

    #[must_use]
    pub fn nat(&self, node: NodeId) -> Option<&StaticNat> {
        self.node(node)?.nat()
    }

    /// Install an application on `node`. It does nothing until started.
    pub fn install_app(&mut self, node: NodeId, app: impl Into<App>) -> Result<AppId, SimError> {
        if self.node(node).is_none() {
            return Err(SimError::UnknownNode(node));
        }
        let id = AppId(self.apps.len());
        self.apps.push(AppSlot {
            node,
            app: app.into(),
        });
        Ok(id)
    }

    pub fn start_app_at(&mut self, app: AppId, at: SimTime) -> Result<(), SimError> {
        self.app(app).ok_or(SimError::UnknownApp(app))?;
        self.sched.schedule_at(at, Event::AppStart(app));
        Ok(())
    }

    pub fn stop_app_at(&mut self, app: AppId, at: SimTime) -> Result<(), SimError> {
        self.app(app).ok_or(SimError::UnknownApp(app))?;
        self.sched.schedule_at(at, Event::AppStop(app));
        Ok(())
    }

    /// Make `packet` arrive on interface `iif` of `node` at `at`, as if it came from the link
    pub fn inject(
        &mut self,
        node: NodeId,
        iif: InterfaceId,
        packet: Packet,
        at: SimTime,
    ) -> Result<(), SimError> {
        let target = self.node(node).ok_or(SimError::UnknownNode(node))?;
        if target.admin_state(iif).is_none() {
            return Err(SimError::UnknownInterface { node, ifindex: iif });
        }
        self.sched
            .schedule_at(at, Event::Deliver { node, iif, packet });
        Ok(())
    }

    #[must_use]
    pub fn app(&self, app: AppId) -> Option<&App> {
        self.apps.get(app.0).map(|slot| &slot.app)
    }

    #[must_use]
    pub fn client(&self, app: AppId) -> Option<&EchoClient> {
        self.app(app)?.as_client()
    }

    #[must_use]
    pub fn server(&self, app: AppId) -> Option<&EchoServer> {
        self.app(app)?.as_server()
    }

    /// Run until no event is left
    pub fn run(&mut self) {
        while let Some((_, event)) = self.sched.pop() {
            self.handle(event);
        }
        info!("Simulation done at {}", self.now());
    }

    /// Run the events up to `until` included, then set the clock to `until`
    pub fn run_until(&mut self, until: SimTime) {
        while self.sched.peek_time().is_some_and(|at| at <= until) {
            if let Some((_, event)) = self.sched.pop() {
                self.handle(event);
            }
        }
        self.sched.advance_to(until);
    }

    fn handle(&mut self, event: Event) {
        trace!("{}: {event:?}", self.now());
        match event {
            Event::AppStart(app) => self.dispatch(app, |app, ctx| app.start(ctx)),
            Event::AppStop(app) => self.dispatch(app, |app, ctx| app.stop(ctx)),
            Event::AppTimer(app, timer) => {
                self.timers.pending.remove(&timer);
                self.dispatch(app, |app, ctx| app.handle_event(ctx, AppEvent::Timer(timer)));
            }
            Event::Deliver { node, iif, packet } => {
                let now = self.sched.now();
                let Some(target) = self.nodes.get_mut(node.0) else {
                    return;
                };
                let mut wire = Wire {
                    now,
                    links: &mut self.links,
                    sched: &mut self.sched,
                };
                let events = target.receive(&mut wire, iif, packet);
                for (app, event) in events {
                    self.dispatch(app, |app, ctx| app.handle_event(ctx, event));
                }
            }
            Event::Housekeeping(node) => {
                let now = self.sched.now();
                if let Some(target) = self.nodes.get_mut(node.0) {
                    let mut wire = Wire {
                        now,
                        links: &mut self.links,
                        sched: &mut self.sched,
                    };
                    target.housekeeping(&mut wire);
                }
            }
        }
    }

    /// Call `f` on application `id` with a context on the node it runs on
    fn dispatch(&mut self, id: AppId, f: impl FnOnce(&mut App, &mut dyn AppContext)) {
        let now = self.sched.now();
        let Some(slot) = self.apps.get_mut(id.0) else {
            debug!("no application {id}");
            return;
        };
        let Some(node) = self.nodes.get_mut(slot.node.0) else {
            return;
        };
        let mut ctx = SimCtx {
            app: id,
            node,
            wire: Wire {
                now,
                links: &mut self.links,
                sched: &mut self.sched,
            },
            timers: &mut self.timers,
        };
        f(&mut slot.app, &mut ctx);
    }
}
