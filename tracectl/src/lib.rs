// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Per-component log level control.
//!
//! Every module of the simulator declares itself as a log component with [`log_component!`],
//! giving a display name, a default level and a set of tags. Components are collected at link
//! time, so [`LogControl`] knows all of them before the first log line is emitted, and levels
//! can then be changed per tag (`nat=debug,echo-client=trace`) at runtime.

pub mod components;
pub mod control;
mod display;

// re-exports
pub use control::{LogControl, TraceCtlError, get_log_ctl};
pub use tracing_subscriber::filter::LevelFilter;
