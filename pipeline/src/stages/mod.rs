// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Network-layer stages.
//!
//! Stages never remove packets from the stream themselves: a stage that refuses a packet marks
//! it as done with a [`net::packet::DoneReason`] and reports it through its
//! [`stats::DropReporter`]. Later stages skip packets that are done, and the owner of the
//! pipeline discards them with [`net::packet::Packet::enforce`].

mod basic;
mod checksum;
mod interface;
mod reassembly;
mod route;

pub use basic::{DecrementTtl, InspectHeaders, Passthrough};
pub use checksum::ChecksumCheck;
pub use interface::{InterfaceCheck, InterfaceCheckMode};
pub use reassembly::{DEFAULT_FRAGMENT_TIMEOUT, Reassembly};
pub use route::{Fib, FibChange, FibReader, FibWriter, NextHop, RouteLookup, StaticRoutes};
