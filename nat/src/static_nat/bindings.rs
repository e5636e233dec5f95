// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Bindings created by translated flows

use net::ip::NextHeader;
use ordermap::OrderMap;
use std::collections::HashMap;
use std::net::Ipv4Addr;

/// One side of a translated flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NatEndpoint {
    pub addr: Ipv4Addr,
    pub port: Option<u16>,
    pub proto: NextHeader,
}

impl NatEndpoint {
    #[must_use]
    pub fn new(addr: Ipv4Addr, port: Option<u16>, proto: NextHeader) -> Self {
        Self { addr, port, proto }
    }
}

/// The association of an original (local) endpoint with the endpoint it is translated to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    pub original: NatEndpoint,
    pub translated: NatEndpoint,
}

/// Error returned when a binding would make an endpoint ambiguous
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("binding {attempted:?} conflicts with {existing:?}")]
pub struct BindingConflict {
    pub attempted: Binding,
    pub existing: Binding,
}

/// Bindings of a translator, searchable from both sides.
///
/// No two bindings share an original endpoint, and no two bindings share a translated endpoint.
#[derive(Debug, Clone, Default)]
pub struct BindingTable {
    forward: OrderMap<NatEndpoint, Binding>,
    reverse: HashMap<NatEndpoint, NatEndpoint>,
}

impl BindingTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the binding of a flow from its original (local) endpoint
    #[must_use]
    pub fn lookup_original(&self, original: &NatEndpoint) -> Option<&Binding> {
        self.forward.get(original)
    }

    /// Look up the binding whose translated endpoint is `translated`
    #[must_use]
    pub fn lookup_translated(&self, translated: &NatEndpoint) -> Option<&Binding> {
        self.reverse
            .get(translated)
            .and_then(|original| self.forward.get(original))
    }

    /// Add a binding.
    ///
    /// # Errors
    ///
    /// Fails, without changing the table, if either endpoint of `binding` is already bound.
    pub fn insert(&mut self, binding: Binding) -> Result<&Binding, BindingConflict> {
        let existing = self
            .forward
            .get(&binding.original)
            .or_else(|| self.lookup_translated(&binding.translated));
        if let Some(existing) = existing {
            return Err(BindingConflict {
                attempted: binding,
                existing: *existing,
            });
        }
        self.reverse.insert(binding.translated, binding.original);
        Ok(self.forward.entry(binding.original).or_insert(binding))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.forward.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    /// The bindings, in creation order
    pub fn iter(&self) -> impl Iterator<Item = &Binding> {
        self.forward.values()
    }
}
