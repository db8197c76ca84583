//! UTC timestamps with 100-nanosecond resolution.
//!
//! Validity windows are exchanged between parties and embedded in cookies,
//! so they are absolute instants rather than monotonic ones. A [`Timestamp`]
//! counts ticks (100 ns units) since the Unix epoch, which is also the
//! representation written into the cookie format.

use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};

/// UTC instant in 100-nanosecond ticks since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Ticks per second.
    pub const TICKS_PER_SECOND: i64 = 10_000_000;

    /// The Unix epoch.
    pub const UNIX_EPOCH: Self = Self(0);

    /// Largest representable instant.
    pub const MAX: Self = Self(i64::MAX);

    /// Create from raw ticks.
    pub const fn from_ticks(ticks: i64) -> Self {
        Self(ticks)
    }

    /// Create from whole seconds since the Unix epoch.
    pub const fn from_unix_secs(secs: i64) -> Self {
        Self(secs.saturating_mul(Self::TICKS_PER_SECOND))
    }

    /// Raw ticks.
    pub const fn ticks(self) -> i64 {
        self.0
    }

    /// Whole seconds since the Unix epoch (rounded toward negative infinity).
    pub const fn unix_secs(self) -> i64 {
        self.0.div_euclid(Self::TICKS_PER_SECOND)
    }

    /// Add a duration, saturating at [`Timestamp::MAX`].
    #[must_use]
    pub fn saturating_add(self, duration: Duration) -> Self {
        Self(self.0.saturating_add(duration_ticks(duration)))
    }

    /// Subtract a duration, saturating at the minimum representable instant.
    #[must_use]
    pub fn saturating_sub(self, duration: Duration) -> Self {
        Self(self.0.saturating_sub(duration_ticks(duration)))
    }

    /// Duration from `earlier` to `self`. Zero if `earlier` is later.
    pub fn duration_since(self, earlier: Self) -> Duration {
        let ticks = self.0.saturating_sub(earlier.0).max(0) as u64;
        Duration::from_nanos(ticks.saturating_mul(100))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.unix_secs();
        let sub_ticks = self.0.rem_euclid(Self::TICKS_PER_SECOND);
        write!(f, "{secs}.{sub_ticks:07}")
    }
}

fn duration_ticks(duration: Duration) -> i64 {
    i64::try_from(duration.as_nanos() / 100).unwrap_or(i64::MAX)
}
