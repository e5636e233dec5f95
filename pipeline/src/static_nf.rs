// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use net::packet::Packet;

/// Trait for an object that processes a stream of packets.
pub trait NetworkFunction {
    /// The `process` method takes an iterator of [`Packet`] objects,
    /// applies the appropriate transformations (or drops) and returns an iterator of
    /// modified packets.
    ///
    /// Note that a concrete iterator type is required to call this function and
    /// a concrete iterator type must be returned from this function (i.e., `impl Iterator`).
    /// If you don't have a concrete iterator type, use the
    /// [`DynNetworkFunction`][crate::DynNetworkFunction] trait instead.
    fn process<'a, Input: Iterator<Item = Packet> + 'a>(
        &'a mut self,
        input: Input,
    ) -> impl Iterator<Item = Packet> + 'a;
}

struct StaticChainImpl<NF1: NetworkFunction, NF2: NetworkFunction> {
    nf1: NF1,
    nf2: NF2,
}

impl<NF1: NetworkFunction, NF2: NetworkFunction> NetworkFunction for StaticChainImpl<NF1, NF2> {
    fn process<'a, Input: Iterator<Item = Packet> + 'a>(
        &'a mut self,
        input: Input,
    ) -> impl Iterator<Item = Packet> + 'a {
        self.nf2.process(self.nf1.process(input))
    }
}

/// Statically chains two [`NetworkFunction`] objects together.
///
/// The `chain` method takes two [`NetworkFunction`] objects and returns a new [`NetworkFunction`]
/// that applies the first function, then the second.
///
/// This trait is automatically implemented for all objects that implement [`NetworkFunction`].
///
/// <div class="warning">
///
/// Keep static chains short: every link adds to the type the compiler has to monomorphize.
///
/// </div>
pub trait StaticChain: NetworkFunction {
    /// Chain `nf` after `self`
    fn chain<NF: NetworkFunction>(self, nf: NF) -> impl NetworkFunction;
}

impl<Nf: NetworkFunction> StaticChain for Nf {
    fn chain<NF: NetworkFunction>(self, nf: NF) -> impl NetworkFunction
    where
        Self: Sized,
    {
        StaticChainImpl { nf1: self, nf2: nf }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#[cfg(test)]
mod test {
    use crate::stages::{DecrementTtl, InspectHeaders, Passthrough};
    use crate::{NetworkFunction, StaticChain};
    use net::packet::test_utils::build_test_udp_packet;
    use stats::DropReporter;

    #[test]
    fn static_chain() {
        const NUM_TTL_DECS: u8 = 3;
        let mut chain = InspectHeaders
            .chain(Passthrough)
            .chain(InspectHeaders)
            .chain(DecrementTtl::new(DropReporter::discard()))
            .chain(DecrementTtl::new(DropReporter::discard()))
            .chain(DecrementTtl::new(DropReporter::discard()));

        let mut packet = build_test_udp_packet("10.0.0.1", "10.0.0.2", 1000, 2000);
        packet.headers_mut().set_ttl(u8::MAX);
        let packets_out: Vec<_> = chain.process(vec![packet].into_iter()).collect();

        assert_eq!(packets_out.len(), 1);
        assert_eq!(packets_out[0].headers().ttl(), u8::MAX - NUM_TTL_DECS);
    }
}
