//! Face landmark detection interface.

use std::{fs, io, path::PathBuf};

use facewarp_gpu::PixelBuffer;

use crate::landmark::LandmarkSet;

/// Finds faces in a frame and locates their landmarks.
pub trait Detector: Send {
    /// Detects faces in `upright`.
    ///
    /// `small` is `upright` downsampled by `shrink`; detectors may search for faces in the small
    /// image and refine the landmarks in the full one. The returned landmarks are in pixel
    /// coordinates of `upright`.
    fn detect(&mut self, upright: &PixelBuffer, small: &PixelBuffer, shrink: u32)
        -> Vec<LandmarkSet>;
}

/// Never finds any faces.
#[derive(Debug, Default)]
pub struct NoFaces;

impl Detector for NoFaces {
    fn detect(&mut self, _: &PixelBuffer, _: &PixelBuffer, _: u32) -> Vec<LandmarkSet> {
        Vec::new()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("failed to read landmark track '{}': {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
    #[error("invalid landmark track: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("landmark track contains no frames")]
    Empty,
}

/// Plays back a prerecorded landmark track, one entry per detected frame, looping at the end.
///
/// The track is a JSON array with one element per frame. Each element is an array of faces, and
/// each face is an array of 68 `[x, y]` points:
///
/// ```json
/// [
///   [ [[10.0, 20.0], [11.0, 21.0], ...] ],
///   []
/// ]
/// ```
pub struct ReplayDetector {
    frames: Vec<Vec<LandmarkSet>>,
    next: usize,
}

impl ReplayDetector {
    pub fn new(frames: Vec<Vec<LandmarkSet>>) -> Result<Self, ReplayError> {
        if frames.is_empty() {
            return Err(ReplayError::Empty);
        }
        Ok(Self { frames, next: 0 })
    }

    pub fn from_json(json: &str) -> Result<Self, ReplayError> {
        Self::new(serde_json::from_str(json)?)
    }

    pub fn from_path<P: Into<PathBuf>>(path: P) -> Result<Self, ReplayError> {
        let path = path.into();
        let json = fs::read_to_string(&path).map_err(|source| ReplayError::Io {
            path: path.clone(),
            source,
        })?;
        let this = Self::from_json(&json)?;
        log::info!(
            "replaying {} frames of landmarks from '{}'",
            this.len(),
            path.display()
        );
        Ok(this)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl Detector for ReplayDetector {
    fn detect(&mut self, _: &PixelBuffer, _: &PixelBuffer, _: u32) -> Vec<LandmarkSet> {
        let faces = self.frames[self.next].clone();
        self.next = (self.next + 1) % self.frames.len();
        faces
    }
}

#[cfg(test)]
mod tests {
    use facewarp_gpu::Resolution;

    use super::*;
    use crate::landmark::random_landmarks;

    #[test]
    fn replays_and_loops() {
        let a = random_landmarks([0.0, 0.0], 10.0);
        let b = random_landmarks([100.0, 0.0], 10.0);
        let json = serde_json::to_string(&vec![vec![a.clone()], vec![], vec![a.clone(), b.clone()]])
            .unwrap();
        let mut detector = ReplayDetector::from_json(&json).unwrap();
        assert_eq!(detector.len(), 3);

        let img = PixelBuffer::filled(Resolution::new(4, 4), [0; 4]);
        let mut next = || detector.detect(&img, &img, 4);
        assert_eq!(next(), vec![a.clone()]);
        assert_eq!(next(), vec![]);
        assert_eq!(next(), vec![a.clone(), b]);
        assert_eq!(next(), vec![a]);
    }

    #[test]
    fn rejects_bad_tracks() {
        assert!(matches!(
            ReplayDetector::from_json("[]"),
            Err(ReplayError::Empty)
        ));
        assert!(matches!(
            ReplayDetector::from_json("[[[[1.0, 2.0]]]]"),
            Err(ReplayError::Parse(_))
        ));
    }
}
