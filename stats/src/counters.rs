// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use net::packet::DoneReason;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};

/// Per-reason packet drop counters
#[derive(Default, Debug, Clone)]
pub struct PacketDropStats {
    pub name: String,
    reasons: HashMap<DoneReason, u64>,
}

impl PacketDropStats {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            reasons: HashMap::default(),
        }
    }
    pub fn incr(&mut self, reason: DoneReason, value: u64) {
        self.reasons
            .entry(reason)
            .and_modify(|counter| *counter += value)
            .or_insert(value);
    }
    #[must_use]
    pub fn get_stat(&self, reason: DoneReason) -> Option<u64> {
        self.reasons.get(&reason).copied()
    }
    #[must_use]
    pub fn get_stats(&self) -> &HashMap<DoneReason, u64> {
        &self.reasons
    }
    /// Sum of all counters, deliveries excluded
    #[must_use]
    pub fn total_drops(&self) -> u64 {
        self.reasons
            .iter()
            .filter(|(reason, _)| reason.is_drop())
            .map(|(_, count)| count)
            .sum()
    }
}

impl Display for PacketDropStats {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}:", self.name)?;
        let mut reasons: Vec<_> = self.reasons.iter().collect();
        reasons.sort();
        for (reason, count) in reasons {
            writeln!(f, "  {reason:<48} {count:>10}")?;
        }
        Ok(())
    }
}
