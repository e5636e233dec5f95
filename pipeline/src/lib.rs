// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

#![allow(rustdoc::private_doc_tests)]
#![deny(
    unsafe_code,
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]

//! # Pipeline Building Blocks
//!
//! This crate provides the building blocks for the packet processing of a simulated node.
//! There are two main methods provided for linking network functions together in sequence:
//!
//! - `StaticChain`: A trait for statically chaining network functions together.
//! - `DynPipeline`: A pipeline that can be dynamically constructed at runtime, whose stages
//!   can be looked up by name.
//!
//! ## Network Functions
//!
//! A network function is anything that implements the [`NetworkFunction`] trait.
//! The [`stages`] module has the network-layer functions a node is built from.
//!
//! ## Static Chaining
//!
//! ```rust
//! use natsim_pipeline::{NetworkFunction, StaticChain};
//! use natsim_pipeline::stages::{DecrementTtl, InspectHeaders};
//! use net::packet::Packet;
//! use stats::DropReporter;
//!
//! let mut pipeline = InspectHeaders.chain(DecrementTtl::new(DropReporter::discard()));
//! let pkts: Vec<Packet> = vec![];
//! let _ = pipeline.process(pkts.into_iter()).count();
//! ```
//!
//! ## Dynamic Pipeline
//!
//! ```rust
//! use natsim_pipeline::DynPipeline;
//! use natsim_pipeline::stages::{DecrementTtl, InspectHeaders, Passthrough};
//! use stats::DropReporter;
//!
//! # fn main() -> Result<(), natsim_pipeline::PipelineError> {
//! let mut pipeline = DynPipeline::new().add_stage(InspectHeaders);
//! pipeline.add_stage_with_name("ttl", DecrementTtl::new(DropReporter::discard()))?;
//! pipeline = pipeline.add_stage(Passthrough);
//! assert!(pipeline.get_stage::<DecrementTtl>("ttl").is_some());
//! # Ok(())
//! # }
//! ```
//!
//! Static chaining and dynamic pipelines combine: a static chain is a [`NetworkFunction`] and
//! can be a stage of a [`DynPipeline`].

mod dyn_nf;
mod pipeline;
pub mod stages;
mod static_nf;

#[cfg(test)]
pub(crate) mod test_utils;

pub use dyn_nf::{DynNetworkFunction, nf_dyn};
pub use pipeline::{DynPipeline, PipelineError, StageName};
pub use static_nf::{NetworkFunction, StaticChain};

use tracectl::{LevelFilter, log_component};
log_component!("pipeline", LevelFilter::INFO, &["pipeline", "l3"]);
