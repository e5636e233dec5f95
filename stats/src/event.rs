// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use net::interface::InterfaceId;
use net::packet::{DoneReason, Packet};
use net::time::SimTime;
use std::fmt::{Display, Formatter};
use std::net::IpAddr;
use std::sync::Arc;

use crate::NullSink;

/// A snapshot of a packet that was not forwarded, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropEvent {
    pub src: IpAddr,
    pub dst: IpAddr,
    pub src_port: Option<u16>,
    pub dst_port: Option<u16>,
    pub reason: DoneReason,
    /// interface the packet was received on
    pub iif: InterfaceId,
    pub timestamp: SimTime,
    /// name of the node or stage that dropped the packet, if known
    pub origin: Option<Arc<str>>,
}

impl DropEvent {
    #[must_use]
    pub fn from_packet(packet: &Packet, reason: DoneReason) -> Self {
        let headers = packet.headers();
        Self {
            src: headers.source(),
            dst: headers.destination(),
            src_port: headers.src_port(),
            dst_port: headers.dst_port(),
            reason,
            iif: packet.get_meta().iif,
            timestamp: packet.get_meta().timestamp,
            origin: None,
        }
    }
}

impl Display for DropEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Dropped packet!! from {} to {}, Reason: {}",
            self.src, self.dst, self.reason
        )
    }
}

/// Consumer of [`DropEvent`]s. Events are handed over in the order the drops happen.
pub trait DropSink: Send + Sync {
    fn report(&self, event: &DropEvent);
}

/// Handle given to every component that may drop packets.
#[derive(Clone)]
pub struct DropReporter {
    sink: Arc<dyn DropSink>,
    origin: Option<Arc<str>>,
}

impl DropReporter {
    #[must_use]
    pub fn new(sink: Arc<dyn DropSink>) -> Self {
        Self { sink, origin: None }
    }

    /// A reporter that forgets every event
    #[must_use]
    pub fn discard() -> Self {
        Self::new(Arc::new(NullSink))
    }

    /// A reporter feeding the same sink that tags events with `origin`
    #[must_use]
    pub fn with_origin(&self, origin: &str) -> Self {
        Self {
            sink: self.sink.clone(),
            origin: Some(Arc::from(origin)),
        }
    }

    #[must_use]
    pub fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }

    /// Report the drop of `packet` for `reason`. Local deliveries are not drops and are ignored.
    pub fn report(&self, packet: &Packet, reason: DoneReason) {
        if !reason.is_drop() {
            return;
        }
        let mut event = DropEvent::from_packet(packet, reason);
        event.origin.clone_from(&self.origin);
        self.sink.report(&event);
    }

    /// Report an event built elsewhere
    pub fn report_event(&self, event: &DropEvent) {
        self.sink.report(event);
    }
}

impl std::fmt::Debug for DropReporter {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DropReporter")
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod test {
    use super::{DropEvent, DropReporter};
    use crate::DropRecorder;
    use net::packet::DoneReason;
    use net::packet::test_utils::{addr, build_test_udp_packet};
    use std::sync::Arc;

    #[test]
    fn reporter_snapshots_headers() {
        let recorder = Arc::new(DropRecorder::new());
        let reporter = DropReporter::new(recorder.clone()).with_origin("nat-router");

        let packet = build_test_udp_packet("192.168.1.1", "203.82.48.2", 49154, 9);
        reporter.report(&packet, DoneReason::NatNoMatch);
        reporter.report(&packet, DoneReason::Delivered);

        let events = recorder.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].src, addr("192.168.1.1"));
        assert_eq!(events[0].src_port, Some(49154));
        assert_eq!(events[0].origin.as_deref(), Some("nat-router"));
        assert_eq!(
            events[0].to_string(),
            "Dropped packet!! from 192.168.1.1 to 203.82.48.2, Reason: DROP_NF_DROP : No match in Static Rule Table"
        );
    }

    #[test]
    fn origin_does_not_leak_to_parent() {
        let recorder = Arc::new(DropRecorder::new());
        let parent = DropReporter::new(recorder.clone());
        let _child = parent.with_origin("child");
        assert_eq!(parent.origin(), None);

        let packet = build_test_udp_packet("10.0.0.1", "10.0.0.2", 1, 2);
        parent.report_event(&DropEvent::from_packet(&packet, DoneReason::RouteFailure));
        assert_eq!(recorder.count(DoneReason::RouteFailure), 1);
    }
}
