// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

#![allow(clippy::missing_errors_doc)]

//! Ready-made topologies, described by a serializable [`ScenarioConfig`].
//!
//! Two topologies are available:
//!
//! - `static-nat`: a client host `n0` (192.168.1.1) behind router `n1`, which translates
//!   between its inside interface (192.168.1.2) and its outside interface (203.82.48.1), and a
//!   server host `n2` (203.82.48.2).
//! - `direct`: a client host `n0` (10.1.1.1 or 2001:db8::1) linked to a server host `n1`
//!   (10.1.1.2 or 2001:db8::2).

use crate::config::SimConfig;
use crate::error::SimError;
use crate::link::LinkConfig;
use crate::node::NodeId;
use crate::simulator::{AppId, Simulator};
use echo::{EchoClient, EchoClientConfig, EchoServer, EchoServerConfig, Fill, SocketKind};
use ipnet::IpNet;
use nat::{NatStats, StaticNat, StaticNatRule};
use net::interface::InterfaceId;
use net::time::SimTime;
use serde::{Deserialize, Serialize};
use stats::{DropCounters, DropReporter, DropSink, LogDrops, PacketDropStats, Tee};
use std::fmt::{Display, Formatter};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Topology {
    StaticNat,
    Direct,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Tcp,
    Udp,
}

impl From<TransportKind> for SocketKind {
    fn from(kind: TransportKind) -> Self {
        match kind {
            TransportKind::Tcp => SocketKind::Stream,
            TransportKind::Udp => SocketKind::Datagram,
        }
    }
}

fn default_mtu() -> usize {
    LinkConfig::DEFAULT_MTU
}

/// Characteristics shared by every link of the topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkSpec {
    pub data_rate_bps: u64,
    pub delay_us: u64,
    #[serde(default = "default_mtu")]
    pub mtu: usize,
}

impl From<LinkSpec> for LinkConfig {
    fn from(spec: LinkSpec) -> Self {
        LinkConfig::new(spec.data_rate_bps, Duration::from_micros(spec.delay_us)).with_mtu(spec.mtu)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ServerSpec {
    pub port: u16,
    pub start_s: f64,
    pub stop_s: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientSpec {
    pub max_packets: u32,
    pub interval_ms: u64,
    pub packet_size: usize,
    pub start_s: f64,
    pub stop_s: f64,
    /// text repeated over the payload. Zeros if absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill: Option<String>,
}

/// A static rule. Either both ports are given, or none for an address-only rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSpec {
    pub local: Ipv4Addr,
    #[serde(default)]
    pub local_port: Option<u16>,
    pub global: Ipv4Addr,
    #[serde(default)]
    pub global_port: Option<u16>,
    /// IP protocol number, 0 for any
    #[serde(default)]
    pub protocol: u8,
}

impl TryFrom<RuleSpec> for StaticNatRule {
    type Error = SimError;

    fn try_from(spec: RuleSpec) -> Result<Self, Self::Error> {
        match (spec.local_port, spec.global_port) {
            (Some(local_port), Some(global_port)) => Ok(StaticNatRule::new(
                spec.local,
                local_port,
                spec.global,
                global_port,
                spec.protocol,
            )),
            (None, None) => Ok(StaticNatRule::address_only(
                spec.local,
                spec.global,
                spec.protocol,
            )),
            _ => Err(SimError::Scenario(format!(
                "rule {} -> {} needs both ports or none",
                spec.local, spec.global
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NatSpec {
    /// index of the inside interface of the router
    pub inside: u32,
    /// index of the outside interface of the router
    pub outside: u32,
    pub rules: Vec<RuleSpec>,
}

/// A complete scenario: topology, applications and translator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub name: String,
    pub topology: Topology,
    pub transport: TransportKind,
    #[serde(default)]
    pub use_ipv6: bool,
    #[serde(default)]
    pub checksum_enabled: bool,
    pub link: LinkSpec,
    pub server: ServerSpec,
    pub clients: Vec<ClientSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nat: Option<NatSpec>,
}

const NAT_CLIENT: [u8; 4] = [192, 168, 1, 1];
const NAT_INSIDE: [u8; 4] = [192, 168, 1, 2];
const NAT_OUTSIDE: [u8; 4] = [203, 82, 48, 1];
const NAT_SERVER: [u8; 4] = [203, 82, 48, 2];

fn reference_rule() -> RuleSpec {
    RuleSpec {
        local: Ipv4Addr::from(NAT_CLIENT),
        local_port: Some(49153),
        global: Ipv4Addr::from([203, 82, 48, 100]),
        global_port: Some(8080),
        protocol: 0,
    }
}

fn net(addr: impl Into<IpAddr>, prefix_len: u8) -> Result<IpNet, SimError> {
    IpNet::new(addr.into(), prefix_len).map_err(|e| SimError::Scenario(e.to_string()))
}

impl ScenarioConfig {
    /// Two datagram echo clients behind the translator. The second one starts when the first
    /// stops, gets the next ephemeral port, and finds no rule for it.
    #[must_use]
    pub fn static_nat_udp() -> Self {
        let client = |start_s, stop_s| ClientSpec {
            max_packets: 2,
            interval_ms: 1000,
            packet_size: 512,
            start_s,
            stop_s,
            fill: None,
        };
        Self {
            name: "static-nat-udp".to_owned(),
            topology: Topology::StaticNat,
            transport: TransportKind::Udp,
            use_ipv6: false,
            checksum_enabled: true,
            link: LinkSpec {
                data_rate_bps: 5_000_000,
                delay_us: 2_000,
                mtu: LinkConfig::DEFAULT_MTU,
            },
            server: ServerSpec {
                port: 9,
                start_s: 1.0,
                stop_s: 10.0,
            },
            clients: vec![client(2.0, 5.0), client(5.0, 10.0)],
            nat: Some(NatSpec {
                inside: 1,
                outside: 2,
                rules: vec![reference_rule()],
            }),
        }
    }

    /// A stream echo client behind the translator
    #[must_use]
    pub fn static_nat_tcp() -> Self {
        Self {
            name: "static-nat-tcp".to_owned(),
            topology: Topology::StaticNat,
            transport: TransportKind::Tcp,
            use_ipv6: false,
            checksum_enabled: false,
            link: LinkSpec {
                data_rate_bps: 100_000_000,
                delay_us: 1_000,
                mtu: LinkConfig::DEFAULT_MTU,
            },
            server: ServerSpec {
                port: 7,
                start_s: 1.0,
                stop_s: 11.0,
            },
            clients: vec![ClientSpec {
                max_packets: 10,
                interval_ms: 1000,
                packet_size: 183,
                start_s: 2.0,
                stop_s: 10.0,
                fill: None,
            }],
            nat: Some(NatSpec {
                inside: 1,
                outside: 2,
                rules: vec![reference_rule()],
            }),
        }
    }

    /// A stream echo between two directly linked hosts
    #[must_use]
    pub fn tcp_echo(use_ipv6: bool) -> Self {
        Self {
            name: "tcp-echo".to_owned(),
            topology: Topology::Direct,
            transport: TransportKind::Tcp,
            use_ipv6,
            checksum_enabled: false,
            link: LinkSpec {
                data_rate_bps: 100_000_000,
                delay_us: 1_000,
                mtu: LinkConfig::DEFAULT_MTU,
            },
            server: ServerSpec {
                port: 7,
                start_s: 1.0,
                stop_s: 11.0,
            },
            clients: vec![ClientSpec {
                max_packets: 10,
                interval_ms: 1000,
                packet_size: 183,
                start_s: 2.0,
                stop_s: 10.0,
                fill: None,
            }],
            nat: None,
        }
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, SimError> {
        Ok(serde_yaml_ng::from_str(yaml)?)
    }

    pub fn to_yaml(&self) -> Result<String, SimError> {
        Ok(serde_yaml_ng::to_string(self)?)
    }

    /// Read a scenario from a YAML file
    pub fn load(path: &Path) -> Result<Self, SimError> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml(&yaml)
    }

    fn validate(&self) -> Result<(), SimError> {
        if self.clients.is_empty() {
            return Err(SimError::Scenario("no client".to_owned()));
        }
        match (self.topology, &self.nat) {
            (Topology::StaticNat, None) => Err(SimError::Scenario(
                "the static-nat topology needs a nat section".to_owned(),
            )),
            (Topology::StaticNat, Some(_)) if self.use_ipv6 => Err(SimError::Scenario(
                "translation is IPv4 only".to_owned(),
            )),
            (Topology::Direct, Some(_)) => Err(SimError::Scenario(
                "the direct topology has no router to translate on".to_owned(),
            )),
            _ => Ok(()),
        }
    }

    /// Build the scenario. Drops are counted, logged and handed to `observer`, if any.
    pub fn build(&self, observer: Option<Arc<dyn DropSink>>) -> Result<Scenario, SimError> {
        self.validate()?;
        let counters = Arc::new(DropCounters::new(&self.name));
        let mut tee = Tee::new()
            .with(counters.clone())
            .with(Arc::new(LogDrops));
        if let Some(observer) = observer {
            tee = tee.with(observer);
        }
        let drops = DropReporter::new(Arc::new(tee));
        let config = SimConfig::default().with_checksum(self.checksum_enabled);
        let mut sim = Simulator::new(config, drops.clone());
        let link = LinkConfig::from(self.link);

        let (client_node, server_node, server_addr, router) = match self.topology {
            Topology::StaticNat => {
                let n0 = sim.add_host("n0")?;
                let n1 = sim.add_router("n1")?;
                let n2 = sim.add_host("n2")?;
                let (if0, if1) = sim.connect(n0, n1, link)?;
                let (if2, if3) = sim.connect(n1, n2, link)?;
                sim.add_address(n0, if0, net(NAT_CLIENT, 24)?)?;
                sim.add_address(n1, if1, net(NAT_INSIDE, 24)?)?;
                sim.add_address(n1, if2, net(NAT_OUTSIDE, 24)?)?;
                sim.add_address(n2, if3, net(NAT_SERVER, 24)?)?;
                sim.set_default_route(n0, if0, Some(IpAddr::from(NAT_INSIDE)))?;
                sim.set_default_route(n2, if3, Some(IpAddr::from(NAT_OUTSIDE)))?;
                (n0, n2, IpAddr::from(NAT_SERVER), Some(n1))
            }
            Topology::Direct => {
                let n0 = sim.add_host("n0")?;
                let n1 = sim.add_host("n1")?;
                let (if0, if1) = sim.connect(n0, n1, link)?;
                let (client, server, prefix_len): (IpAddr, IpAddr, u8) = if self.use_ipv6 {
                    (
                        IpAddr::from([0x2001, 0xdb8, 0, 0, 0, 0, 0, 1]),
                        IpAddr::from([0x2001, 0xdb8, 0, 0, 0, 0, 0, 2]),
                        64,
                    )
                } else {
                    (
                        IpAddr::from([10, 1, 1, 1]),
                        IpAddr::from([10, 1, 1, 2]),
                        24,
                    )
                };
                sim.add_address(n0, if0, net(client, prefix_len)?)?;
                sim.add_address(n1, if1, net(server, prefix_len)?)?;
                (n0, n1, server, None)
            }
        };

        if let (Some(router), Some(spec)) = (router, &self.nat) {
            let mut nat = StaticNat::new("nat", drops.with_origin("nat"));
            nat.set_inside(InterfaceId::new(spec.inside))?;
            nat.set_outside(InterfaceId::new(spec.outside))?;
            for rule in &spec.rules {
                nat.add_rule(StaticNatRule::try_from(*rule)?)?;
            }
            sim.install_nat(router, nat)?;
        }

        let kind = SocketKind::from(self.transport);
        let server = sim.install_app(
            server_node,
            EchoServer::new(EchoServerConfig::new(self.server.port, kind)),
        )?;
        sim.start_app_at(server, SimTime::from_secs_f64(self.server.start_s))?;
        sim.stop_app_at(server, SimTime::from_secs_f64(self.server.stop_s))?;

        let remote = SocketAddr::new(server_addr, self.server.port);
        let mut clients = Vec::with_capacity(self.clients.len());
        for spec in &self.clients {
            let mut config = EchoClientConfig::new(remote, kind)
                .with_max_packets(spec.max_packets)
                .with_interval(Duration::from_millis(spec.interval_ms))
                .with_packet_size(spec.packet_size);
            if let Some(text) = &spec.fill {
                config = config.with_fill(Fill::Text(text.clone()));
            }
            let client = sim.install_app(client_node, EchoClient::new(config))?;
            sim.start_app_at(client, SimTime::from_secs_f64(spec.start_s))?;
            sim.stop_app_at(client, SimTime::from_secs_f64(spec.stop_s))?;
            clients.push(client);
        }

        Ok(Scenario {
            name: self.name.clone(),
            sim,
            server,
            clients,
            router,
            counters,
        })
    }

    /// Build and run the scenario to completion
    pub fn run(&self) -> Result<ScenarioReport, SimError> {
        let mut scenario = self.build(None)?;
        Ok(scenario.run())
    }
}

/// A built scenario, ready to run
#[derive(Debug)]
pub struct Scenario {
    name: String,
    pub sim: Simulator,
    pub server: AppId,
    pub clients: Vec<AppId>,
    /// the translating router, in the static-nat topology
    pub router: Option<NodeId>,
    counters: Arc<DropCounters>,
}

impl Scenario {
    /// Run to completion and collect the counters of the applications, the translator and the
    /// drops.
    pub fn run(&mut self) -> ScenarioReport {
        info!("Running scenario {}", self.name);
        self.sim.run();
        self.report()
    }

    #[must_use]
    pub fn report(&self) -> ScenarioReport {
        let clients = self
            .clients
            .iter()
            .filter_map(|id| self.sim.client(*id))
            .map(|client| ClientReport {
                packets_sent: client.packets_sent(),
                bytes_sent: client.bytes_sent(),
                bytes_received_back: client.bytes_received_back(),
                mismatched_bytes: client.mismatched_bytes(),
                error: client.error().map(ToString::to_string),
            })
            .collect();
        let server = self.sim.server(self.server).map(|server| ServerReport {
            bytes_received: server.bytes_received(),
            bytes_echoed: server.bytes_echoed(),
            peers_accepted: server.peers_accepted(),
        });
        let nat = self.router.and_then(|router| self.sim.nat(router));
        ScenarioReport {
            name: self.name.clone(),
            finished_at: self.sim.now(),
            clients,
            server,
            nat_stats: nat.map(|nat| nat.stats().clone()),
            nat_table: nat.map(|nat| nat.rules().to_string()),
            drops: self.counters.snapshot(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientReport {
    pub packets_sent: u32,
    pub bytes_sent: u64,
    pub bytes_received_back: u64,
    pub mismatched_bytes: u64,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerReport {
    pub bytes_received: u64,
    pub bytes_echoed: u64,
    pub peers_accepted: u64,
}

/// What happened during a scenario run
#[derive(Debug, Clone)]
pub struct ScenarioReport {
    pub name: String,
    pub finished_at: SimTime,
    pub clients: Vec<ClientReport>,
    pub server: Option<ServerReport>,
    pub nat_stats: Option<NatStats>,
    /// the rule table of the translator, printed
    pub nat_table: Option<String>,
    pub drops: PacketDropStats,
}

impl Display for ScenarioReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Scenario {} finished at {}", self.name, self.finished_at)?;
        if let Some(table) = &self.nat_table {
            write!(f, "{table}")?;
        }
        for (i, client) in self.clients.iter().enumerate() {
            write!(
                f,
                "client {i}: {} packets, {} bytes sent, {} bytes received back",
                client.packets_sent, client.bytes_sent, client.bytes_received_back
            )?;
            if client.mismatched_bytes > 0 {
                write!(f, ", {} mismatched", client.mismatched_bytes)?;
            }
            if let Some(error) = &client.error {
                write!(f, " ({error})")?;
            }
            writeln!(f)?;
        }
        if let Some(server) = &self.server {
            writeln!(
                f,
                "server: {} bytes received, {} bytes echoed, {} peers",
                server.bytes_received, server.bytes_echoed, server.peers_accepted
            )?;
        }
        if let Some(stats) = &self.nat_stats {
            write!(f, "{stats}")?;
        }
        write!(f, "{}", self.drops)
    }
}
