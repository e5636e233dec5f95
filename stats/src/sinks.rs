// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Stock [`DropSink`]s

use crate::{DropEvent, DropSink, PacketDropStats};
use crossbeam_channel::Sender;
use net::packet::DoneReason;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

/// Forgets every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl DropSink for NullSink {
    fn report(&self, _event: &DropEvent) {}
}

/// Logs every event, in the "Dropped packet!!" format
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDrops;

impl DropSink for LogDrops {
    fn report(&self, event: &DropEvent) {
        match &event.origin {
            Some(origin) => warn!("{} {origin}: {event}", event.timestamp),
            None => warn!("{} {event}", event.timestamp),
        }
    }
}

/// Keeps every event, in arrival order
#[derive(Debug, Default)]
pub struct DropRecorder {
    events: Mutex<Vec<DropEvent>>,
}

impl DropRecorder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
    fn lock(&self) -> MutexGuard<'_, Vec<DropEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
    /// A copy of the events recorded so far
    #[must_use]
    pub fn events(&self) -> Vec<DropEvent> {
        self.lock().clone()
    }
    /// Number of events recorded with `reason`
    #[must_use]
    pub fn count(&self, reason: DoneReason) -> usize {
        self.lock().iter().filter(|e| e.reason == reason).count()
    }
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
    pub fn clear(&self) {
        self.lock().clear();
    }
}

impl DropSink for DropRecorder {
    fn report(&self, event: &DropEvent) {
        self.lock().push(event.clone());
    }
}

/// Counts events per reason
#[derive(Debug, Default)]
pub struct DropCounters {
    stats: Mutex<PacketDropStats>,
}

impl DropCounters {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            stats: Mutex::new(PacketDropStats::new(name)),
        }
    }
    /// A copy of the counters
    #[must_use]
    pub fn snapshot(&self) -> PacketDropStats {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl DropSink for DropCounters {
    fn report(&self, event: &DropEvent) {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .incr(event.reason, 1);
    }
}

/// Forwards events to a channel. Events are lost once the receiver is gone.
impl DropSink for Sender<DropEvent> {
    fn report(&self, event: &DropEvent) {
        if self.send(event.clone()).is_err() {
            debug!("Drop event receiver is gone");
        }
    }
}

/// Hands every event to several sinks, in order
#[derive(Default, Clone)]
pub struct Tee {
    sinks: Vec<Arc<dyn DropSink>>,
}

impl Tee {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
    #[must_use]
    pub fn with(mut self, sink: Arc<dyn DropSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl DropSink for Tee {
    fn report(&self, event: &DropEvent) {
        for sink in &self.sinks {
            sink.report(event);
        }
    }
}
