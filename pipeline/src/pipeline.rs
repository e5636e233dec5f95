// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

#![allow(clippy::missing_errors_doc)]

use crate::dyn_nf::DynNetworkFunctionImpl;
use crate::{DynNetworkFunction, NetworkFunction, nf_dyn};
use dyn_iter::{DynIter, IntoDynIterator};
use net::packet::Packet;
use ordermap::OrderMap;
use std::any::Any;

/// The name of a stage in a [`DynPipeline`]
pub type StageName = String;

/// A dynamic pipeline that can be updated at runtime.
///
/// Stages are kept in insertion order and can be looked up by name, so that the owner of the
/// pipeline can reconfigure a stage (e.g. flip an interface down) between two batches.
///
/// # See Also
///
/// [`DynNetworkFunction`]
#[derive(Default)]
pub struct DynPipeline {
    nfs: OrderMap<StageName, Box<dyn DynNetworkFunction>>,
}

/// Errors when building a [`DynPipeline`]
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PipelineError {
    /// A stage with that name is already in the pipeline
    #[error("Duplicate stage name: {0}")]
    DuplicateStage(String),
    /// No stage with that name in the pipeline
    #[error("No such stage: {0}")]
    NoSuchStage(String),
}

impl DynPipeline {
    /// Create a [`DynPipeline`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            nfs: OrderMap::new(),
        }
    }

    /// Number of stages in the pipeline
    #[must_use]
    pub fn len(&self) -> usize {
        self.nfs.len()
    }

    /// Tell if the pipeline has no stages
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nfs.is_empty()
    }

    /// Names of the stages, in processing order
    pub fn stage_names(&self) -> impl Iterator<Item = &str> {
        self.nfs.keys().map(String::as_str)
    }

    /// Add a static network function to the pipeline, under a generated name.
    #[must_use]
    pub fn add_stage<NF: NetworkFunction + 'static>(self, nf: NF) -> Self {
        self.add_stage_dyn(nf_dyn(nf))
    }

    /// Add a static network function to the pipeline using a specific stage name.
    pub fn add_stage_with_name<NF: NetworkFunction + 'static>(
        &mut self,
        name: &str,
        nf: NF,
    ) -> Result<&mut Self, PipelineError> {
        self.add_stage_dyn_with_name(name, nf_dyn(nf))
    }

    /// Add a dynamic network function to the pipeline, under a generated name.
    ///
    /// # See Also
    ///
    /// [`DynNetworkFunction`]
    /// [`nf_dyn`]
    #[must_use]
    pub fn add_stage_dyn(mut self, nf: Box<dyn DynNetworkFunction>) -> Self {
        let mut index = self.nfs.len();
        let mut name = format!("stage-{index}");
        while self.nfs.contains_key(&name) {
            index += 1;
            name = format!("stage-{index}");
        }
        self.nfs.insert(name, nf);
        self
    }

    /// Add a dynamic network function to the pipeline using a specific stage name.
    pub fn add_stage_dyn_with_name(
        &mut self,
        name: &str,
        nf: Box<dyn DynNetworkFunction>,
    ) -> Result<&mut Self, PipelineError> {
        if self.nfs.contains_key(name) {
            Err(PipelineError::DuplicateStage(name.to_owned()))
        } else {
            self.nfs.insert(name.to_owned(), nf);
            Ok(self)
        }
    }

    /// Insert a static network function, named `name`, right before stage `before`.
    pub fn insert_stage_before<NF: NetworkFunction + 'static>(
        &mut self,
        before: &str,
        name: &str,
        nf: NF,
    ) -> Result<&mut Self, PipelineError> {
        if self.nfs.contains_key(name) {
            return Err(PipelineError::DuplicateStage(name.to_owned()));
        }
        if !self.nfs.contains_key(before) {
            return Err(PipelineError::NoSuchStage(before.to_owned()));
        }
        let mut new = Some(nf_dyn(nf));
        for (stage_name, stage) in std::mem::take(&mut self.nfs) {
            if stage_name == before
                && let Some(new) = new.take()
            {
                self.nfs.insert(name.to_owned(), new);
            }
            self.nfs.insert(stage_name, stage);
        }
        Ok(self)
    }

    /// Get a static network function from the pipeline by stage name.
    #[must_use]
    pub fn get_stage<T: NetworkFunction + 'static>(&self, name: &str) -> Option<&T> {
        self.get_stage_dyn::<DynNetworkFunctionImpl<T>>(name)
            .map(DynNetworkFunctionImpl::get_nf)
    }

    /// Get a mutable reference to a static network function in the pipeline by stage name.
    pub fn get_stage_mut<T: NetworkFunction + 'static>(&mut self, name: &str) -> Option<&mut T> {
        self.nfs
            .get_mut(name)
            .and_then(|nf| (&mut **nf as &mut dyn Any).downcast_mut::<DynNetworkFunctionImpl<T>>())
            .map(DynNetworkFunctionImpl::get_nf_mut)
    }

    /// Get a dynamic network function from the pipeline by stage name.
    #[must_use]
    pub fn get_stage_dyn<T: DynNetworkFunction>(&self, name: &str) -> Option<&T> {
        self.nfs
            .get(name)
            .and_then(|nf| (&**nf as &dyn Any).downcast_ref::<T>())
    }
}

impl DynNetworkFunction for DynPipeline {
    fn process_dyn<'a>(&'a mut self, input: DynIter<'a, Packet>) -> DynIter<'a, Packet> {
        self.nfs
            .values_mut()
            .fold(input, move |input, nf| nf.process_dyn(input))
            .into_dyn_iter()
    }
}

impl NetworkFunction for DynPipeline {
    fn process<'a, Input: Iterator<Item = Packet> + 'a>(
        &'a mut self,
        input: Input,
    ) -> impl Iterator<Item = Packet> + 'a {
        self.process_dyn(input.into_dyn_iter())
    }
}
