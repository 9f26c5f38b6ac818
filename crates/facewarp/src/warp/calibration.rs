//! Personal warp scales and their calibration.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Number of components in a [`Scale`].
pub const SCALE_LEN: usize = 6;

/// Smallest allowed scale component.
pub const SCALE_MIN: f64 = 0.8;
/// Largest allowed scale component.
pub const SCALE_MAX: f64 = 1.2;

/// Identifies one of the persisted personal scales.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleKey {
    Pretty,
    Handsome,
}

impl ScaleKey {
    pub const ALL: [Self; 2] = [Self::Pretty, Self::Handsome];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pretty => "pretty",
            Self::Handsome => "handsome",
        }
    }

    /// The scale used before the user has calibrated.
    pub fn default_scale(self) -> Scale {
        match self {
            Self::Pretty => Scale([1.05, 1.05, 0.93, 0.93, 1.05, 1.05]),
            Self::Handsome => Scale([1.03, 1.03, 0.96, 0.96, 1.03, 1.02]),
        }
    }
}

impl fmt::Display for ScaleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Multiplicative personalization passed to calibrated warp solvers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scale(pub [f64; SCALE_LEN]);

impl Scale {
    pub const ONE: Self = Self([1.0; SCALE_LEN]);

    /// Clamps every component into `[SCALE_MIN, SCALE_MAX]`.
    ///
    /// Non-finite components are replaced by 1.
    #[must_use]
    pub fn clamped(self) -> Self {
        Self(self.0.map(|v| {
            if v.is_finite() {
                v.clamp(SCALE_MIN, SCALE_MAX)
            } else {
                1.0
            }
        }))
    }

    pub fn is_clamped(&self) -> bool {
        self.0.iter().all(|v| (SCALE_MIN..=SCALE_MAX).contains(v))
    }
}

/// Running sum of scale observations.
#[derive(Debug, Clone, Default)]
pub struct Accumulator {
    sum: [f64; SCALE_LEN],
    count: usize,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn add(&mut self, observation: &Scale) {
        for (sum, v) in self.sum.iter_mut().zip(observation.0) {
            *sum += v;
        }
        self.count += 1;
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Returns the clamped mean of all observations, or `None` if there were none.
    pub fn mean(&self) -> Option<Scale> {
        if self.count == 0 {
            return None;
        }
        let n = self.count as f64;
        Some(Scale(self.sum.map(|sum| sum / n)).clamped())
    }

    /// Returns the clamped mean and resets the accumulator.
    pub fn take_mean(&mut self) -> Option<Scale> {
        let mean = self.mean();
        self.reset();
        mean
    }
}
