// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use crate::node::NodeId;
use crate::simulator::AppId;
use nat::NatError;
use net::interface::InterfaceId;
use pipeline::PipelineError;

/// Errors building or running a simulation
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error("No such node: {0}")]
    UnknownNode(NodeId),
    #[error("Node {node} has no interface {ifindex}")]
    UnknownInterface { node: NodeId, ifindex: InterfaceId },
    #[error("No such application: {0}")]
    UnknownApp(AppId),
    #[error("Node {0} is not a router")]
    NotARouter(NodeId),
    #[error("Nat configuration error: {0}")]
    Nat(#[from] NatError),
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
    #[error("Invalid scenario: {0}")]
    Scenario(String),
    #[error("Could not parse scenario: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
