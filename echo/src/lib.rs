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

//! Echo applications.
//!
//! An [`EchoClient`] sends a bounded number of packets to an [`EchoServer`], which sends every
//! byte back. The client keeps count of the bytes sent and of the bytes echoed back, so a
//! complete session over a working path ends with both counters equal.
//!
//! Applications are driven by the node they run on through the [`Application`] trait, and use
//! the sockets and timers of that node through an [`AppContext`].

mod app;
mod client;
mod fill;
mod server;

#[cfg(test)]
mod test;

pub use app::{App, AppContext, AppEvent, Application, SocketError, SocketHandle, SocketKind, TimerId};
pub use client::{ClientState, EchoClient, EchoClientConfig};
pub use fill::Fill;
pub use server::{EchoServer, EchoServerConfig, ServerState};
