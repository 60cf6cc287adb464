//! Fixed-point seconds with millisecond precision.
//!
//! Durations and frame timestamps are stored as whole thousandths of a
//! second so that `frame_number / rate` is reproducible to three decimals
//! across runs and storage backends.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Non-negative seconds stored as thousandths.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FixedSeconds(i64);

impl FixedSeconds {
    pub const ZERO: FixedSeconds = FixedSeconds(0);

    /// Build from raw thousandths of a second.
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Build from an `H:MM:SS.cc` clock reading (centiseconds).
    pub fn from_clock(hours: i64, minutes: i64, seconds: i64, centis: i64) -> Self {
        Self(((hours * 60 + minutes) * 60 + seconds) * 1000 + centis * 10)
    }

    /// Round a float number of seconds half-up to three decimals.
    ///
    /// Negative and non-finite inputs clamp to zero.
    pub fn from_secs_f64(secs: f64) -> Self {
        if !secs.is_finite() || secs <= 0.0 {
            return Self::ZERO;
        }
        Self((secs * 1000.0 + 0.5).floor() as i64)
    }

    /// Timestamp of the `index`-th sample at `rate` samples per second.
    pub fn from_frame(index: u64, rate: f64) -> Self {
        if rate <= 0.0 {
            return Self::ZERO;
        }
        Self::from_secs_f64(index as f64 / rate)
    }

    pub const fn as_millis(&self) -> i64 {
        self.0
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.0 as f64 / 1000.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Number of samples a fixed-rate sampler yields over this duration,
    /// `ceil(seconds * rate)`.
    pub fn expected_samples(&self, rate: f64) -> u64 {
        if self.0 <= 0 || rate <= 0.0 {
            return 0;
        }
        let exact = self.as_secs_f64() * rate;
        // Absorb float noise such as 10.0 * 0.3 = 3.0000000000000004.
        (exact - 1e-9).ceil().max(0.0) as u64
    }

    /// `HH_MM_SS` rendering used in generated frame file names.
    pub fn file_stamp(&self) -> String {
        let total = self.0 / 1000;
        format!(
            "{:02}_{:02}_{:02}",
            total / 3600,
            (total % 3600) / 60,
            total % 60
        )
    }
}

impl fmt::Display for FixedSeconds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:03}", self.0 / 1000, self.0 % 1000)
    }
}

impl Serialize for FixedSeconds {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_secs_f64())
    }
}

impl<'de> Deserialize<'de> for FixedSeconds {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Ok(Self::from_secs_f64(secs))
    }
}
