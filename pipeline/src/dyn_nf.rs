// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use crate::NetworkFunction;
use dyn_iter::{DynIter, IntoDynIterator};
use net::packet::Packet;
use std::any::Any;

/// Trait for an object that processes a stream of packets.
///
/// Generally, you should not need to implement this trait directly. Instead, use the [`nf_dyn`]
/// function to create a boxed, dynamic network function.
///
/// # See Also
///
/// * [`nf_dyn`]
/// * [`crate::DynPipeline`]
pub trait DynNetworkFunction: Any {
    /// The `process_dyn` method takes an iterator of [`Packet`] objects,
    /// However, unlike [`NetworkFunction::process`], this method does not require concrete
    /// iterator types.
    ///
    /// To call this method, import the [`IntoDynIterator`] trait and use the
    /// `into_dyn_iter` method to get a [`DynIter`] to use with this method.
    fn process_dyn<'a>(&'a mut self, input: DynIter<'a, Packet>) -> DynIter<'a, Packet>;
}

pub(crate) struct DynNetworkFunctionImpl<NF: NetworkFunction + 'static> {
    nf: NF,
}

impl<NF: NetworkFunction> DynNetworkFunctionImpl<NF> {
    pub fn new(nf: NF) -> Self {
        Self { nf }
    }

    pub fn get_nf(&self) -> &NF {
        &self.nf
    }

    pub fn get_nf_mut(&mut self) -> &mut NF {
        &mut self.nf
    }
}

/// Creates a boxed, dynamic network function.
///
/// This function takes a [`NetworkFunction`] and returns a boxed, dynamic network function.
///
/// # See Also
///
/// * [`DynNetworkFunction`]
/// * [`crate::DynPipeline`]
pub fn nf_dyn<NF: NetworkFunction + 'static>(nf: NF) -> Box<dyn DynNetworkFunction> {
    Box::new(DynNetworkFunctionImpl::new(nf))
}

impl<NF: NetworkFunction> DynNetworkFunction for DynNetworkFunctionImpl<NF> {
    fn process_dyn<'a>(&'a mut self, input: DynIter<'a, Packet>) -> DynIter<'a, Packet> {
        self.nf.process(input).into_dyn_iter()
    }
}
