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

//! Drop diagnostics.
//!
//! Packets that the translator or the network layer refuse to forward are described by a
//! [`DropEvent`] and handed to a [`DropSink`]. Producers hold a [`DropReporter`], a cheap handle
//! to a shared sink, so several stages on several nodes can feed a single observer.

mod counters;
mod event;
mod sinks;

pub use counters::*;
pub use event::*;
pub use sinks::*;

use tracectl::{LevelFilter, log_component};
log_component!("drops", LevelFilter::WARN, &["drops"]);
