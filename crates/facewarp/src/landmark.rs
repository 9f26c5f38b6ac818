//! The 68-point facial landmark layout.

use std::ops::Range;

use serde::{Deserialize, Serialize};

/// Number of points in a [`LandmarkSet`].
pub const NUM_LANDMARKS: usize = 68;

/// Semantic regions of a [`LandmarkSet`], as index ranges.
pub mod region {
    use std::ops::Range;

    pub const JAW: Range<usize> = 0..17;
    pub const RIGHT_BROW: Range<usize> = 17..22;
    pub const LEFT_BROW: Range<usize> = 22..27;
    pub const NOSE: Range<usize> = 27..36;
    pub const RIGHT_EYE: Range<usize> = 36..42;
    pub const LEFT_EYE: Range<usize> = 42..48;
    pub const MOUTH: Range<usize> = 48..68;
    pub const OUTER_LIPS: Range<usize> = 48..60;
    pub const INNER_LIPS: Range<usize> = 60..68;

    /// Jaw and both brows, the outline of the face.
    pub const OUTLINE: Range<usize> = 0..27;
    /// Both eyes.
    pub const EYES: Range<usize> = 36..48;
}

/// 68 facial landmarks of one detected face, in pixel coordinates of the upright image.
///
/// Landmark sets are immutable once detected; warping produces a new set.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<[f32; 2]>", into = "Vec<[f32; 2]>")]
pub struct LandmarkSet {
    points: [[f32; 2]; NUM_LANDMARKS],
}

impl LandmarkSet {
    pub fn new(points: [[f32; 2]; NUM_LANDMARKS]) -> Self {
        Self { points }
    }

    /// Creates a landmark set from a slice of exactly [`NUM_LANDMARKS`] points.
    pub fn from_slice(points: &[[f32; 2]]) -> Option<Self> {
        let points: [[f32; 2]; NUM_LANDMARKS] = points.try_into().ok()?;
        Some(Self { points })
    }

    #[inline]
    pub fn points(&self) -> &[[f32; 2]; NUM_LANDMARKS] {
        &self.points
    }

    #[inline]
    pub fn get(&self, index: usize) -> [f32; 2] {
        self.points[index]
    }

    /// Returns the points of a semantic region (see [`region`]).
    pub fn region(&self, range: Range<usize>) -> &[[f32; 2]] {
        &self.points[range]
    }

    /// Sum of the Euclidean distances between corresponding points.
    pub fn distance(&self, other: &LandmarkSet) -> f32 {
        self.points
            .iter()
            .zip(&other.points)
            .map(|(a, b)| (a[0] - b[0]).hypot(a[1] - b[1]))
            .sum()
    }

    /// Moves every point by `offset`.
    pub fn translated(&self, offset: [f32; 2]) -> Self {
        Self {
            points: self.points.map(|[x, y]| [x + offset[0], y + offset[1]]),
        }
    }

    /// Average of all points.
    pub fn centroid(&self) -> [f32; 2] {
        let [sx, sy] = self
            .points
            .iter()
            .fold([0.0, 0.0], |[sx, sy], [x, y]| [sx + x, sy + y]);
        let n = NUM_LANDMARKS as f32;
        [sx / n, sy / n]
    }
}

impl std::fmt::Debug for LandmarkSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let [x, y] = self.centroid();
        write!(f, "LandmarkSet(centroid: ({x:.1}, {y:.1}))")
    }
}

#[derive(Debug, thiserror::Error)]
#[error("expected {NUM_LANDMARKS} landmarks, got {0}")]
pub struct WrongLength(pub usize);

impl TryFrom<Vec<[f32; 2]>> for LandmarkSet {
    type Error = WrongLength;

    fn try_from(points: Vec<[f32; 2]>) -> Result<Self, Self::Error> {
        Self::from_slice(&points).ok_or(WrongLength(points.len()))
    }
}

impl From<LandmarkSet> for Vec<[f32; 2]> {
    fn from(set: LandmarkSet) -> Self {
        set.points.to_vec()
    }
}

#[cfg(test)]
pub(crate) fn random_landmarks(center: [f32; 2], spread: f32) -> LandmarkSet {
    LandmarkSet::new(std::array::from_fn(|_| {
        [
            center[0] + (fastrand::f32() - 0.5) * spread,
            center[1] + (fastrand::f32() - 0.5) * spread,
        ]
    }))
}
