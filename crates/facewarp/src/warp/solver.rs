//! Interfaces of the per-style warp solvers.
//!
//! Solvers are numeric black boxes: they receive landmarks and the [`Continuity`] of the face
//! they belong to, and return moved landmarks along with a blend factor. Any smoothing or
//! optimizer state they need across frames lives in the continuity vector, which they may update
//! in place.

use crate::{landmark::LandmarkSet, tracker::Continuity};

use super::{calibration::Scale, Warped};

/// A solver warping a single face.
pub trait Solver: Send {
    fn warp(&self, landmarks: &LandmarkSet, continuity: &mut Continuity) -> Warped;
}

impl<F> Solver for F
where
    F: Fn(&LandmarkSet, &mut Continuity) -> Warped + Send,
{
    fn warp(&self, landmarks: &LandmarkSet, continuity: &mut Continuity) -> Warped {
        self(landmarks, continuity)
    }
}

/// A single-face solver that is personalized with a calibrated [`Scale`].
pub trait CalibratedSolver: Send {
    fn warp(&self, landmarks: &LandmarkSet, continuity: &mut Continuity, scale: &Scale) -> Warped;

    /// Estimates the personal scale from one observation of the user's face.
    fn estimate(&self, landmarks: &LandmarkSet, continuity: &mut Continuity) -> Scale;
}

/// Output of a [`PairSolver`].
#[derive(Debug, Clone, PartialEq)]
pub struct PairOutput {
    /// Warped landmarks of face A followed by those of face B.
    pub points: Vec<[f32; 2]>,
    pub factors: [f32; 2],
}

/// A solver that warps two faces together, for example by swapping them.
pub trait PairSolver: Send {
    fn warp_pair(
        &self,
        a: &LandmarkSet,
        b: &LandmarkSet,
        continuity_a: &mut Continuity,
        continuity_b: &mut Continuity,
    ) -> PairOutput;
}

/// Returns the landmarks unchanged with a factor of 0.
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl Solver for Passthrough {
    fn warp(&self, landmarks: &LandmarkSet, _: &mut Continuity) -> Warped {
        Warped::unchanged(landmarks)
    }
}

impl CalibratedSolver for Passthrough {
    fn warp(&self, landmarks: &LandmarkSet, _: &mut Continuity, _: &Scale) -> Warped {
        Warped::unchanged(landmarks)
    }

    fn estimate(&self, _: &LandmarkSet, _: &mut Continuity) -> Scale {
        Scale::ONE
    }
}

impl PairSolver for Passthrough {
    fn warp_pair(
        &self,
        a: &LandmarkSet,
        b: &LandmarkSet,
        _: &mut Continuity,
        _: &mut Continuity,
    ) -> PairOutput {
        PairOutput {
            points: a.points().iter().chain(b.points()).copied().collect(),
            factors: [0.0, 0.0],
        }
    }
}

/// Swaps two faces by exchanging their landmark sets outright.
///
/// This does not align the faces to each other at all and is only useful as a stand-in until a
/// real swap solver is registered.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConcatSwap;

impl PairSolver for ConcatSwap {
    fn warp_pair(
        &self,
        a: &LandmarkSet,
        b: &LandmarkSet,
        _: &mut Continuity,
        _: &mut Continuity,
    ) -> PairOutput {
        PairOutput {
            points: b.points().iter().chain(a.points()).copied().collect(),
            factors: [0.0, 0.0],
        }
    }
}
