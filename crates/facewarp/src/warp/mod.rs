//! Per-style warp dispatch, calibration and multi-face pairing.

pub mod calibration;
pub mod solver;
pub mod store;

use std::{collections::HashMap, fmt, str::FromStr};

use crate::{
    landmark::{LandmarkSet, NUM_LANDMARKS},
    tracker::{Continuity, FaceTracker, IdentityId},
};

use self::{
    calibration::{Accumulator, Scale, ScaleKey},
    solver::{CalibratedSolver, ConcatSwap, PairSolver, Passthrough, Solver},
    store::{ScaleStore, StoreError},
};

/// A selectable warp style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WarpStyle {
    /// No warp and no overlays.
    None,
    Pretty,
    Handsome,
    Tiny,
    Silly,
    Dynamic,
    BigLips,
    Nose,
    /// Swaps pairs of faces.
    Swap,
    /// Drives one face of a pair with the other.
    Puppet,
}

impl WarpStyle {
    pub const ALL: [Self; 10] = [
        Self::None,
        Self::Pretty,
        Self::Handsome,
        Self::Tiny,
        Self::Silly,
        Self::Dynamic,
        Self::BigLips,
        Self::Nose,
        Self::Swap,
        Self::Puppet,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Pretty => "pretty",
            Self::Handsome => "handsome",
            Self::Tiny => "tiny",
            Self::Silly => "silly",
            Self::Dynamic => "dynamic",
            Self::BigLips => "big_lips",
            Self::Nose => "nose",
            Self::Swap => "swap",
            Self::Puppet => "puppet",
        }
    }

    /// The persisted scale this style is personalized with, if any.
    ///
    /// `Tiny` shares the pretty scale.
    pub fn scale_key(self) -> Option<ScaleKey> {
        match self {
            Self::Pretty | Self::Tiny => Some(ScaleKey::Pretty),
            Self::Handsome => Some(ScaleKey::Handsome),
            _ => None,
        }
    }

    /// Whether this style warps faces in pairs.
    pub fn is_pairwise(self) -> bool {
        matches!(self, Self::Swap | Self::Puppet)
    }
}

impl fmt::Display for WarpStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown warp style '{0}'")]
pub struct UnknownStyle(String);

impl FromStr for WarpStyle {
    type Err = UnknownStyle;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|style| style.as_str() == s)
            .ok_or_else(|| UnknownStyle(s.to_string()))
    }
}

/// Warped landmarks of one face.
#[derive(Debug, Clone, PartialEq)]
pub struct Warped {
    pub landmarks: LandmarkSet,
    /// Strength of the warp in `[0, 1]`; drives the fade-in of the style's overlays.
    pub factor: f32,
}

impl Warped {
    pub fn unchanged(landmarks: &LandmarkSet) -> Self {
        Self {
            landmarks: landmarks.clone(),
            factor: 0.0,
        }
    }

    fn clamped(mut self) -> Self {
        self.factor = if self.factor.is_nan() {
            0.0
        } else {
            self.factor.clamp(0.0, 1.0)
        };
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WarpError {
    #[error("pair solver for '{style}' returned {got} points, expected {}", 2 * NUM_LANDMARKS)]
    WrongOutputLength { style: WarpStyle, got: usize },
    #[error("style '{0}' has no calibrated solver")]
    NotCalibrated(WarpStyle),
    #[error("no calibration in progress")]
    NoCalibration,
    #[error(transparent)]
    Store(#[from] StoreError),
}

enum Entry {
    Single(Box<dyn Solver>),
    Calibrated(Box<dyn CalibratedSolver>),
    Pair(Box<dyn PairSolver>),
}

struct Calibration {
    style: WarpStyle,
    key: ScaleKey,
    accumulator: Accumulator,
}

/// Dispatches landmarks to the solver of the active style.
///
/// The engine itself is stateless across frames apart from the personal scales: all per-face
/// state is the [`Continuity`] owned by the [`FaceTracker`].
pub struct WarpEngine {
    solvers: HashMap<WarpStyle, Entry>,
    scales: HashMap<ScaleKey, Scale>,
    store: Box<dyn ScaleStore>,
    calibration: Option<Calibration>,
}

impl WarpEngine {
    /// Creates an engine without solvers, loading the personal scales from `store`.
    ///
    /// Scales that are missing or cannot be read fall back to their defaults.
    pub fn new<S: ScaleStore + 'static>(store: S) -> Self {
        let scales = ScaleKey::ALL
            .into_iter()
            .map(|key| {
                let scale = match store.load(key) {
                    Ok(Some(scale)) => {
                        log::debug!("loaded {key} scale {:?}", scale.0);
                        scale.clamped()
                    }
                    Ok(None) => key.default_scale(),
                    Err(e) => {
                        log::warn!("failed to load {key} scale, using default: {e}");
                        key.default_scale()
                    }
                };
                (key, scale)
            })
            .collect();

        Self {
            solvers: HashMap::new(),
            scales,
            store: Box::new(store),
            calibration: None,
        }
    }

    pub fn register<S: Solver + 'static>(&mut self, style: WarpStyle, solver: S) {
        self.insert(style, Entry::Single(Box::new(solver)));
    }

    /// Registers a calibrated solver. Fails if `style` has no personal scale.
    pub fn register_calibrated<S: CalibratedSolver + 'static>(
        &mut self,
        style: WarpStyle,
        solver: S,
    ) -> Result<(), WarpError> {
        if style.scale_key().is_none() {
            return Err(WarpError::NotCalibrated(style));
        }
        self.insert(style, Entry::Calibrated(Box::new(solver)));
        Ok(())
    }

    pub fn register_pair<S: PairSolver + 'static>(&mut self, style: WarpStyle, solver: S) {
        self.insert(style, Entry::Pair(Box::new(solver)));
    }

    fn insert(&mut self, style: WarpStyle, entry: Entry) {
        if self.solvers.insert(style, entry).is_some() {
            log::debug!("replaced solver for '{style}'");
        }
    }

    pub fn has_solver(&self, style: WarpStyle) -> bool {
        self.solvers.contains_key(&style)
    }

    /// Returns the current personal scale.
    pub fn scale(&self, key: ScaleKey) -> Scale {
        self.scales
            .get(&key)
            .copied()
            .unwrap_or_else(|| key.default_scale())
    }

    /// Clamps and persists a personal scale.
    ///
    /// The in-memory scale is updated even if persisting fails.
    pub fn set_scale(&mut self, key: ScaleKey, scale: Scale) -> Result<Scale, StoreError> {
        let scale = scale.clamped();
        self.scales.insert(key, scale);
        self.store.save(key, scale)?;
        Ok(scale)
    }

    /// Warps a single face with the solver of `style`.
    ///
    /// Styles without a single-face solver (including [`WarpStyle::None`] and pairwise styles
    /// applied to a lone face) return the landmarks unchanged with a factor of 0.
    pub fn apply(
        &self,
        style: WarpStyle,
        landmarks: &LandmarkSet,
        continuity: &mut Continuity,
    ) -> Warped {
        let warped = match self.solvers.get(&style) {
            Some(Entry::Single(solver)) => solver.warp(landmarks, continuity),
            Some(Entry::Calibrated(solver)) => {
                let scale = style
                    .scale_key()
                    .map_or(Scale::ONE, |key| self.scale(key));
                solver.warp(landmarks, continuity, &scale)
            }
            Some(Entry::Pair(_)) | None => Warped::unchanged(landmarks),
        };
        warped.clamped()
    }

    /// Warps two faces together with the pair solver of `style`.
    ///
    /// Returns the landmarks unchanged if `style` has no pair solver.
    pub fn apply_pair(
        &self,
        style: WarpStyle,
        a: &LandmarkSet,
        b: &LandmarkSet,
        continuity_a: &mut Continuity,
        continuity_b: &mut Continuity,
    ) -> Result<[Warped; 2], WarpError> {
        let Some(Entry::Pair(solver)) = self.solvers.get(&style) else {
            return Ok([Warped::unchanged(a), Warped::unchanged(b)]);
        };

        let out = solver.warp_pair(a, b, continuity_a, continuity_b);
        if out.points.len() != 2 * NUM_LANDMARKS {
            return Err(WarpError::WrongOutputLength {
                style,
                got: out.points.len(),
            });
        }
        let (pa, pb) = out.points.split_at(NUM_LANDMARKS);
        let warped = |points: &[[f32; 2]], factor| {
            LandmarkSet::from_slice(points).map(|landmarks| Warped { landmarks, factor }.clamped())
        };
        match (warped(pa, out.factors[0]), warped(pb, out.factors[1])) {
            (Some(wa), Some(wb)) => Ok([wa, wb]),
            _ => Err(WarpError::WrongOutputLength {
                style,
                got: out.points.len(),
            }),
        }
    }

    /// Warps all faces of a frame.
    ///
    /// `ids` are the identities the [`FaceTracker`] assigned to `detections`. The continuity of
    /// each identity is updated in place; a detection whose identity is no longer tracked uses a
    /// throwaway default continuity.
    ///
    /// Pairwise styles pair detections `(0, 1), (2, 3), ...`. With an odd number of faces, the last
    /// one is paired with face 0. When a face is part of two pairs, the later pair's result wins.
    /// A pair whose sides are the same identity, including a lone face paired with itself, is left
    /// unchanged.
    ///
    /// Only as many faces as there are both ids and detections are warped.
    pub fn apply_frame(
        &self,
        style: WarpStyle,
        tracker: &mut FaceTracker,
        ids: &[IdentityId],
        detections: &[LandmarkSet],
    ) -> Vec<Warped> {
        if ids.len() != detections.len() {
            log::warn!("{} ids for {} detections", ids.len(), detections.len());
        }
        let faces: Vec<(IdentityId, &LandmarkSet)> =
            ids.iter().copied().zip(detections).collect();

        if !style.is_pairwise() {
            return faces
                .into_iter()
                .map(|(id, landmarks)| {
                    let mut scratch = Continuity::default();
                    let continuity = tracker.continuity_mut(id).unwrap_or(&mut scratch);
                    self.apply(style, landmarks, continuity)
                })
                .collect();
        }

        let n = faces.len();
        let mut out: Vec<Option<Warped>> = vec![None; n];
        for first in (0..n).step_by(2) {
            let second = if first + 1 < n { first + 1 } else { 0 };
            let ((id_a, a), (id_b, b)) = (faces[first], faces[second]);
            if id_a == id_b {
                out[first] = Some(Warped::unchanged(a));
                continue;
            }

            let result = match tracker.continuity_pair_mut(id_a, id_b) {
                Some((ca, cb)) => self.apply_pair(style, a, b, ca, cb),
                None => {
                    let continuity = |id| {
                        tracker
                            .get(id)
                            .map_or(Continuity::DEFAULT, |identity| *identity.continuity())
                    };
                    let (mut ca, mut cb) = (continuity(id_a), continuity(id_b));
                    let result = self.apply_pair(style, a, b, &mut ca, &mut cb);
                    if let Some(c) = tracker.continuity_mut(id_a) {
                        *c = ca;
                    }
                    if let Some(c) = tracker.continuity_mut(id_b) {
                        *c = cb;
                    }
                    result
                }
            };

            match result {
                Ok([wa, wb]) => {
                    out[first] = Some(wa);
                    out[second] = Some(wb);
                }
                Err(e) => {
                    log::warn!("leaving faces {first} and {second} unwarped: {e}");
                    out[first].get_or_insert_with(|| Warped::unchanged(a));
                    out[second].get_or_insert_with(|| Warped::unchanged(b));
                }
            }
        }

        out.into_iter()
            .zip(&faces)
            .map(|(warped, &(_, landmarks))| warped.unwrap_or_else(|| Warped::unchanged(landmarks)))
            .collect()
    }

    /// Starts collecting scale observations for `style`.
    ///
    /// Any calibration already in progress is discarded.
    pub fn begin_calibration(&mut self, style: WarpStyle) -> Result<(), WarpError> {
        let key = match (style.scale_key(), self.solvers.get(&style)) {
            (Some(key), Some(Entry::Calibrated(_))) => key,
            _ => return Err(WarpError::NotCalibrated(style)),
        };
        log::info!("calibrating {key} scale for '{style}'");
        self.calibration = Some(Calibration {
            style,
            key,
            accumulator: Accumulator::new(),
        });
        Ok(())
    }

    /// Discards all observations made so far, keeping the calibration running.
    pub fn restart_calibration(&mut self) {
        if let Some(calibration) = &mut self.calibration {
            calibration.accumulator.reset();
        }
    }

    pub fn is_calibrating(&self) -> bool {
        self.calibration.is_some()
    }

    /// Number of observations collected by the running calibration.
    pub fn observations(&self) -> usize {
        self.calibration
            .as_ref()
            .map_or(0, |calibration| calibration.accumulator.count())
    }

    /// Adds the scale estimated from one face to the running calibration.
    pub fn observe(
        &mut self,
        landmarks: &LandmarkSet,
        continuity: &mut Continuity,
    ) -> Result<(), WarpError> {
        let calibration = self.calibration.as_mut().ok_or(WarpError::NoCalibration)?;
        let Some(Entry::Calibrated(solver)) = self.solvers.get(&calibration.style) else {
            return Err(WarpError::NotCalibrated(calibration.style));
        };
        let estimate = solver.estimate(landmarks, continuity);
        calibration.accumulator.add(&estimate);
        Ok(())
    }

    /// Ends the running calibration, storing the mean of all observations as the new scale.
    ///
    /// Returns the new scale, or `None` if nothing was observed, in which case the scale is left
    /// unchanged.
    pub fn finalize_calibration(&mut self) -> Result<Option<Scale>, WarpError> {
        let mut calibration = self.calibration.take().ok_or(WarpError::NoCalibration)?;
        let count = calibration.accumulator.count();
        match calibration.accumulator.take_mean() {
            Some(mean) => {
                let scale = self.set_scale(calibration.key, mean)?;
                log::info!(
                    "calibrated {} scale from {count} observations: {:?}",
                    calibration.key,
                    scale.0
                );
                Ok(Some(scale))
            }
            None => {
                log::info!("calibration ended without observations");
                Ok(None)
            }
        }
    }

    /// Aborts the running calibration without changing any scale.
    pub fn cancel_calibration(&mut self) {
        if self.calibration.take().is_some() {
            log::info!("calibration cancelled");
        }
    }

    /// Registers stand-in solvers for every style that has none yet.
    ///
    /// Single-face styles get [`Passthrough`]; the pairwise styles get [`ConcatSwap`].
    pub fn register_builtin(&mut self) {
        for style in WarpStyle::ALL {
            if style == WarpStyle::None || self.has_solver(style) {
                continue;
            }
            if style.is_pairwise() {
                log::warn!("'{style}' uses the placeholder concatenation swap");
                self.register_pair(style, ConcatSwap);
            } else if style.scale_key().is_some() {
                self.insert(style, Entry::Calibrated(Box::new(Passthrough)));
            } else {
                self.register(style, Passthrough);
            }
        }
    }
}
