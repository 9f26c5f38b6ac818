//! Oriented quad geometry.
//!
//! Cameras are mounted in arbitrary orientations relative to the device. Every frame is first
//! drawn into an upright target using a flip/rotate chosen from the active camera and the device
//! orientation, and the finished output is drawn to the display with a second flip/rotate and a
//! letterbox scale.

use std::fmt;

use crate::{Mesh, Resolution, Vertex};

/// Physical orientation of the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Orientation {
    Portrait,
    PortraitUpsideDown,
    LandscapeLeft,
    LandscapeRight,
    FaceUp,
    FaceDown,
    Unknown,
}

impl Orientation {
    /// Returns whether this orientation determines how the image should be rotated.
    ///
    /// Flat and unknown orientations carry no such information and are ignored by the pipeline.
    pub fn is_definite(self) -> bool {
        matches!(
            self,
            Self::Portrait | Self::PortraitUpsideDown | Self::LandscapeLeft | Self::LandscapeRight
        )
    }

    pub fn is_portrait(self) -> bool {
        self == Self::Portrait
    }
}

/// Index of the active camera.
///
/// `0` is the back camera and `1` the front camera of a phone. Any other index is treated as an
/// externally mounted camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CameraIndex(pub u32);

impl CameraIndex {
    pub const BACK: Self = Self(0);
    pub const FRONT: Self = Self(1);

    pub fn is_front(self) -> bool {
        self == Self::FRONT
    }
}

impl fmt::Display for CameraIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "camera #{}", self.0)
    }
}

/// Mirroring applied to texture coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flip {
    None,
    Horizontal,
    Vertical,
    Both,
}

/// Flip and optional 90° rotation (transposition) applied when sampling a source texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QuadTransform {
    pub flip: Flip,
    pub rotate90: bool,
}

impl QuadTransform {
    pub const IDENTITY: Self = Self::new(Flip::None, false);

    pub const fn new(flip: Flip, rotate90: bool) -> Self {
        Self { flip, rotate90 }
    }

    /// Maps the texture coordinate of an untransformed quad corner to the transformed one.
    pub fn apply(&self, [u, v]: [f32; 2]) -> [f32; 2] {
        let (u, v) = if self.rotate90 { (v, u) } else { (u, v) };
        match self.flip {
            Flip::None => [u, v],
            Flip::Horizontal => [1.0 - u, v],
            Flip::Vertical => [u, 1.0 - v],
            Flip::Both => [1.0 - u, 1.0 - v],
        }
    }
}

/// Quad corners in clip space and the matching untransformed texture coordinates.
const CORNERS: [([f32; 2], [f32; 2]); 4] = [
    ([-1.0, -1.0], [0.0, 1.0]),
    ([-1.0, 1.0], [0.0, 0.0]),
    ([1.0, 1.0], [1.0, 0.0]),
    ([1.0, -1.0], [1.0, 1.0]),
];
const QUAD_INDICES: [u16; 6] = [1, 2, 0, 0, 2, 3];

/// Builds a full-target quad that samples its source through `transform`, with its corners
/// scaled by `scale` around the center.
pub fn quad(transform: QuadTransform, scale: [f32; 2]) -> Mesh {
    let vertices = CORNERS
        .iter()
        .map(|&([x, y], uv)| Vertex {
            position: [x * scale[0], y * scale[1]],
            uv: transform.apply(uv),
            alpha: 1.0,
        })
        .collect();
    Mesh::new(vertices, QUAD_INDICES.to_vec())
}

/// Returns the preprocess and present transforms for a camera in a device orientation.
///
/// Non-definite orientations fall back to the portrait entry for phone cameras and to the identity
/// for external cameras.
pub fn transforms(camera: CameraIndex, orientation: Orientation) -> (QuadTransform, QuadTransform) {
    use Flip::*;
    use Orientation::*;

    let t = QuadTransform::new;
    match (camera, orientation) {
        (CameraIndex::FRONT, LandscapeLeft) => (t(Vertical, false), t(Both, true)),
        (CameraIndex::FRONT, LandscapeRight) => (t(Horizontal, false), t(None, true)),
        (CameraIndex::FRONT, PortraitUpsideDown) => (t(Both, true), t(Horizontal, false)),
        (CameraIndex::FRONT, _) => (t(None, true), t(Vertical, false)),

        (CameraIndex::BACK, LandscapeLeft) => (t(None, false), t(Both, true)),
        (CameraIndex::BACK, LandscapeRight) => (t(Both, false), t(None, true)),
        (CameraIndex::BACK, PortraitUpsideDown) => (t(Horizontal, true), t(Horizontal, false)),
        (CameraIndex::BACK, _) => (t(Vertical, true), t(Vertical, false)),

        (_, LandscapeLeft) => (t(Horizontal, false), t(Vertical, false)),
        (_, LandscapeRight) => (t(Vertical, false), t(Vertical, false)),
        (_, Portrait) => (t(Vertical, true), t(Both, false)),
        (_, PortraitUpsideDown) => (t(Both, true), t(Vertical, false)),
        (_, _) => (QuadTransform::IDENTITY, QuadTransform::IDENTITY),
    }
}

/// Computes the scale applied to a full-screen quad so that an image of resolution `image` is
/// shown completely and undistorted on a display of resolution `display`.
///
/// One component is always 1, the other one shrinks the quad to add letterboxing (top/bottom) or
/// pillarboxing (left/right).
pub fn letterbox(image: Resolution, display: Resolution) -> [f32; 2] {
    let (image, display) = match (image.aspect_ratio(), display.aspect_ratio()) {
        (Some(image), Some(display)) => (image.as_f32(), display.as_f32()),
        _ => return [1.0, 1.0],
    };

    if display > image {
        // Display is wider than the image: pillarbox.
        [image / display, 1.0]
    } else {
        [1.0, display / image]
    }
}

/// All orientation-dependent sizes and transforms of the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    pub camera: CameraIndex,
    pub orientation: Orientation,
    /// Resolution of the raw camera frames.
    pub video: Resolution,
    /// Resolution of the upright and output targets.
    pub upright: Resolution,
    /// Resolution of the downsampled and blur targets.
    pub small: Resolution,
    pub display: Resolution,
    pub preprocess: QuadTransform,
    pub present: QuadTransform,
    /// Scale of the presented quad.
    pub letterbox: [f32; 2],
    pub shrink: u32,
}

impl Geometry {
    pub fn compute(
        camera: CameraIndex,
        orientation: Orientation,
        video: Resolution,
        display: Resolution,
        shrink: u32,
    ) -> Self {
        let (preprocess, present) = transforms(camera, orientation);
        let upright = if preprocess.rotate90 {
            video.transposed()
        } else {
            video
        };
        let presented = if present.rotate90 {
            upright.transposed()
        } else {
            upright
        };

        Self {
            camera,
            orientation,
            video,
            upright,
            small: upright.shrink(shrink),
            display,
            preprocess,
            present,
            letterbox: letterbox(presented, display),
            shrink,
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    const DEFINITE: [Orientation; 4] = [
        Orientation::Portrait,
        Orientation::PortraitUpsideDown,
        Orientation::LandscapeLeft,
        Orientation::LandscapeRight,
    ];

    #[test]
    fn uv_transform() {
        let rot = QuadTransform::new(Flip::None, true);
        assert_eq!(rot.apply([0.25, 1.0]), [1.0, 0.25]);
        let both = QuadTransform::new(Flip::Both, false);
        assert_eq!(both.apply([0.25, 1.0]), [0.75, 0.0]);
        let h = QuadTransform::new(Flip::Horizontal, true);
        assert_eq!(h.apply([0.25, 1.0]), [0.0, 0.25]);
    }

    #[test]
    fn identity_quad_samples_whole_texture() {
        let mesh = quad(QuadTransform::IDENTITY, [1.0, 1.0]);
        assert_eq!(mesh.num_triangles(), 2);
        for v in mesh.vertices() {
            // Top of clip space is the first texture row.
            assert_eq!(v.uv[0], (v.position[0] + 1.0) / 2.0);
            assert_eq!(v.uv[1], (1.0 - v.position[1]) / 2.0);
        }
    }

    #[test]
    fn portrait_swaps_upright_dimensions() {
        let video = Resolution::new(1280, 720);
        let display = Resolution::new(720, 1280);
        for camera in [CameraIndex::BACK, CameraIndex::FRONT, CameraIndex(2)] {
            for orientation in DEFINITE {
                let geom = Geometry::compute(camera, orientation, video, display, 4);
                let portrait = matches!(
                    orientation,
                    Orientation::Portrait | Orientation::PortraitUpsideDown
                );
                let expected = if portrait { video.transposed() } else { video };
                assert_eq!(geom.upright, expected, "{camera} {orientation:?}");
                assert_eq!(geom.small, expected.shrink(4));
            }
        }
    }

    #[test]
    fn phone_cameras_ignore_flat_orientations() {
        for camera in [CameraIndex::BACK, CameraIndex::FRONT] {
            assert_eq!(
                transforms(camera, Orientation::FaceUp),
                transforms(camera, Orientation::Portrait)
            );
        }
        assert_eq!(
            transforms(CameraIndex(3), Orientation::Unknown),
            (QuadTransform::IDENTITY, QuadTransform::IDENTITY)
        );
    }

    #[test]
    fn letterbox_never_distorts() {
        let cases = [
            (Resolution::new(720, 1280), Resolution::new(1920, 1080)),
            (Resolution::new(1280, 720), Resolution::new(1080, 1920)),
            (Resolution::new(640, 480), Resolution::new(640, 480)),
            (Resolution::new(640, 480), Resolution::new(800, 480)),
        ];
        for (image, display) in cases {
            let [sx, sy] = letterbox(image, display);
            assert!(sx <= 1.0 && sy <= 1.0);
            assert!(sx == 1.0 || sy == 1.0);
            let shown_w = sx * display.width() as f32;
            let shown_h = sy * display.height() as f32;
            assert_relative_eq!(
                shown_w / shown_h,
                image.width() as f32 / image.height() as f32,
                max_relative = 1e-5
            );
        }
    }

    #[test]
    fn letterbox_degenerate_display() {
        assert_eq!(
            letterbox(Resolution::new(640, 480), Resolution::new(0, 480)),
            [1.0, 1.0]
        );
    }
}
