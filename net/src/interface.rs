// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Interfaces of a simulated node

use std::fmt::{Display, Formatter};

/// Index of an interface within its node.
///
/// Index 0 is the loopback of every node; attached point-to-point interfaces are numbered from 1
/// in the order they are attached.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InterfaceId(u32);

impl InterfaceId {
    pub const LOOPBACK: InterfaceId = InterfaceId(0);

    #[must_use]
    pub const fn new(val: u32) -> Self {
        Self(val)
    }
    #[must_use]
    pub const fn get_id(&self) -> u32 {
        self.0
    }
}

impl From<u32> for InterfaceId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl Display for InterfaceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Administrative state of an interface
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum AdminState {
    #[default]
    Up,
    Down,
}

impl AdminState {
    #[must_use]
    pub fn is_up(self) -> bool {
        self == AdminState::Up
    }
}
