// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

#![deny(
    unsafe_code,
    clippy::all,
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]
#![allow(clippy::module_name_repetitions)]

//! Discrete-event simulation of hosts and routers exchanging echo traffic.
//!
//! A [`Simulator`] owns nodes connected by point-to-point links. Nodes process packets through
//! the network-layer stages of the `pipeline` crate, routers may run a static NAT translator,
//! and hosts run echo applications on top of a small stream and datagram transport.
//!
//! Everything runs on a single thread, driven by a [`Scheduler`] ordering events by simulated
//! time. Dropped packets are reported to the [`stats::DropReporter`] given to the simulator.
//!
//! [`ScenarioConfig`] describes the reference topologies and can be loaded from YAML.

mod config;
mod error;
mod link;
mod node;
mod scenario;
mod scheduler;
mod simulator;
mod transport;

pub use config::SimConfig;
pub use error::SimError;
pub use link::{LinkConfig, LinkEnd, LinkId};
pub use node::{Node, NodeId, NodeKind};
pub use scenario::{
    ClientReport, ClientSpec, LinkSpec, NatSpec, RuleSpec, Scenario, ScenarioConfig,
    ScenarioReport, ServerReport, ServerSpec, Topology, TransportKind,
};
pub use scheduler::{EventId, Scheduler};
pub use simulator::{AppId, Simulator};
pub use transport::{EPHEMERAL_FIRST, MSS};

use tracectl::{LevelFilter, log_component};
log_component!("sim", LevelFilter::INFO, &["sim"]);
