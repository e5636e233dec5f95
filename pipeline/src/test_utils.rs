// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use crate::stages::{DecrementTtl, InspectHeaders, Passthrough};
use crate::{DynNetworkFunction, nf_dyn};
use stats::DropReporter;

/// Generates an infinite sequence of network functions.
///
/// The sequence is a repeating pattern of:
/// - [`InspectHeaders`]
/// - [`Passthrough`]
/// - [`InspectHeaders`]
/// - [`DecrementTtl`]
///
/// To avoid decrementing the TTL below 1, once there are 254 [`DecrementTtl`] stages, the last
/// stage of the pattern becomes a [`Passthrough`].
pub struct DynStageGenerator {
    i: usize,
}

impl DynStageGenerator {
    pub fn new() -> Self {
        Self { i: 0 }
    }

    pub fn num_ttl_decs(count: usize) -> usize {
        (count / 4).min(usize::from(u8::MAX - 1))
    }
}

impl Iterator for DynStageGenerator {
    type Item = Box<dyn DynNetworkFunction>;

    fn next(&mut self) -> Option<Self::Item> {
        let ret = match self.i % 4 {
            0 | 2 => Some(nf_dyn(InspectHeaders)),
            1 => Some(nf_dyn(Passthrough)),
            _ => {
                if Self::num_ttl_decs(self.i) == usize::from(u8::MAX - 1) {
                    Some(nf_dyn(Passthrough))
                } else {
                    Some(nf_dyn(DecrementTtl::new(DropReporter::discard())))
                }
            }
        };
        self.i += 1;
        ret
    }
}
