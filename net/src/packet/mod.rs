// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Packet struct and methods

mod display;
mod meta;

#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;

use crate::headers::Headers;
use bytes::Bytes;

#[allow(unused_imports)] // re-export
pub use meta::*;

/// A packet: its header view, an opaque payload and the metadata stages use to drive each other.
#[derive(Debug, Clone)]
pub struct Packet {
    headers: Headers,
    payload: Bytes,
    /// packet metadata added by stages to drive other stages down the pipeline
    pub meta: PacketMeta,
}

impl Packet {
    /// Build a [`Packet`] from its headers and payload. The metadata starts out empty.
    #[must_use]
    pub fn new(headers: Headers, payload: impl Into<Bytes>) -> Self {
        Self {
            headers,
            payload: payload.into(),
            meta: PacketMeta::default(),
        }
    }

    /// Get a reference to the payload of this packet
    #[must_use]
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Replace the payload of this packet
    pub fn set_payload(&mut self, payload: impl Into<Bytes>) {
        self.payload = payload.into();
    }

    /// Get the length of the packet's payload
    #[must_use]
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Get the length of the IP payload, transport header included
    #[must_use]
    pub fn ip_payload_len(&self) -> usize {
        self.payload.len() + usize::from(self.headers.transport_len())
    }

    /// Get a reference to the headers of this `Packet`
    #[must_use]
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Get a mutable reference to the headers of this `Packet`.
    ///
    /// # Note
    ///
    /// Modifying the headers flags the packet for a checksum refresh.
    pub fn headers_mut(&mut self) -> &mut Headers {
        self.meta.set_checksum_refresh(true);
        &mut self.headers
    }

    /// Update the IPv4 header checksum based on the current headers.
    pub fn update_checksum(&mut self) -> &mut Self {
        let checksum = self.headers.compute_checksum(self.payload.len());
        self.headers.set_checksum(checksum);
        self.meta.set_checksum_refresh(false);
        self
    }

    /// Tell if the header checksum carried by the packet is correct. Always true for IPv6.
    #[must_use]
    pub fn checksum_valid(&self) -> bool {
        !self.headers.is_ipv4()
            || self.headers.checksum() == self.headers.compute_checksum(self.payload.len())
    }

    /// Explicitly mark a packet as done, indicating the reason. Broadly, there are 2 types of reasons
    ///  - The packet is to be dropped due to the indicated reason.
    ///  - The packet has been processed and is marked as done to prevent later stages from processing it.
    pub fn done(&mut self, reason: DoneReason) {
        if self.meta.done.is_none() {
            self.meta.done = Some(reason);
        }
    }

    /// This behaves like the `done()` method but overwrites the reason or verdict. This is useful when a stage is
    /// allowed to override the decisions taken by prior stages.
    pub fn done_force(&mut self, reason: DoneReason) {
        self.meta.done = Some(reason);
    }

    /// Remove the done marking for a packet
    pub fn done_clear(&mut self) {
        self.meta.done.take();
    }

    /// Tell if a packet has been marked as done.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.meta.done.is_some()
    }

    /// Get the reason why a packet has been marked as done.
    #[must_use]
    pub fn get_done(&self) -> Option<DoneReason> {
        self.meta.done
    }

    /// Get an immutable reference to the metadata of this `Packet`
    #[must_use]
    pub fn get_meta(&self) -> &PacketMeta {
        &self.meta
    }

    /// Get a mutable reference to the metadata of this `Packet`
    pub fn get_meta_mut(&mut self) -> &mut PacketMeta {
        &mut self.meta
    }

    /// Wraps a packet in an `Option` depending on the metadata:
    /// If [`Packet`] is to be dropped, returns `None`. Else, `Some`.
    #[must_use]
    pub fn enforce(self) -> Option<Self> {
        if self.meta.keep() {
            // keep packets even if they should be dropped
            return Some(self);
        }
        match self.get_done() {
            Some(DoneReason::Delivered) | None => Some(self),
            Some(_) => None,
        }
    }
}
