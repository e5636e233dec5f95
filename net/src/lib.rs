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

//! Packet model shared by the translator, the network layer and the transports of the simulator.
//!
//! A [`packet::Packet`] is a header view (addresses, ports, protocol, TTL, IPv4 checksum,
//! fragmentation) plus an opaque payload and the metadata stages use to drive each other,
//! including the [`packet::DoneReason`] that explains why a packet stopped being processed.

pub mod headers;
pub mod interface;
pub mod ip;
pub mod packet;
pub mod time;
