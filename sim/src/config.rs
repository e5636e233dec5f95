// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Simulation-wide settings

use net::headers::Headers;
use pipeline::stages::DEFAULT_FRAGMENT_TIMEOUT;
use std::time::Duration;

/// Settings shared by every node of a [`crate::Simulator`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimConfig {
    /// compute IPv4 header checksums on transmit and verify them on receive
    pub checksum_enabled: bool,
    /// how long an incomplete datagram waits for its missing fragments
    pub fragment_timeout: Duration,
    /// TTL of the packets nodes originate
    pub default_ttl: u8,
    /// connections a listener keeps open at once
    pub max_connections: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            checksum_enabled: false,
            fragment_timeout: DEFAULT_FRAGMENT_TIMEOUT,
            default_ttl: Headers::DEFAULT_TTL,
            max_connections: 64,
        }
    }
}

impl SimConfig {
    #[must_use]
    pub fn with_checksum(mut self, enabled: bool) -> Self {
        self.checksum_enabled = enabled;
        self
    }
    #[must_use]
    pub fn with_fragment_timeout(mut self, timeout: Duration) -> Self {
        self.fragment_timeout = timeout;
        self
    }
    #[must_use]
    pub fn with_default_ttl(mut self, ttl: u8) -> Self {
        self.default_ttl = ttl;
        self
    }
    #[must_use]
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }
}
