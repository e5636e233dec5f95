// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Simulated time

use std::fmt::{Display, Formatter};
use std::ops::{Add, AddAssign};
use std::time::Duration;

/// A point in simulated time, measured from the start of the simulation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SimTime(Duration);

impl SimTime {
    /// The start of the simulation
    pub const ZERO: SimTime = SimTime(Duration::ZERO);

    #[must_use]
    pub const fn from_duration(d: Duration) -> Self {
        Self(d)
    }
    #[must_use]
    pub const fn from_secs(secs: u64) -> Self {
        Self(Duration::from_secs(secs))
    }
    #[must_use]
    pub const fn from_millis(ms: u64) -> Self {
        Self(Duration::from_millis(ms))
    }
    /// Builds a time from fractional seconds. Negative or non-finite values map to zero.
    #[must_use]
    pub fn from_secs_f64(secs: f64) -> Self {
        Duration::try_from_secs_f64(secs).map_or(Self::ZERO, Self)
    }
    #[must_use]
    pub const fn as_duration(&self) -> Duration {
        self.0
    }
    #[must_use]
    pub fn as_secs_f64(&self) -> f64 {
        self.0.as_secs_f64()
    }
    /// Time elapsed since `earlier`, or zero if `earlier` is in the future.
    #[must_use]
    pub fn saturating_since(&self, earlier: SimTime) -> Duration {
        self.0.saturating_sub(earlier.0)
    }
}

impl Add<Duration> for SimTime {
    type Output = SimTime;
    fn add(self, rhs: Duration) -> Self::Output {
        SimTime(self.0.saturating_add(rhs))
    }
}

impl AddAssign<Duration> for SimTime {
    fn add_assign(&mut self, rhs: Duration) {
        self.0 = self.0.saturating_add(rhs);
    }
}

impl Display for SimTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "+{:.6}s", self.0.as_secs_f64())
    }
}

#[cfg(test)]
mod test {
    use super::SimTime;
    use std::time::Duration;

    #[test]
    fn arithmetic_and_display() {
        let t = SimTime::from_secs(2) + Duration::from_millis(500);
        assert_eq!(t, SimTime::from_millis(2500));
        assert_eq!(t.to_string(), "+2.500000s");
        assert_eq!(t.saturating_since(SimTime::from_secs(3)), Duration::ZERO);
        assert_eq!(SimTime::from_secs_f64(-1.0), SimTime::ZERO);
        assert!(SimTime::from_secs(1) < SimTime::from_millis(1001));
    }
}
