//! Face meshes and the per-style overlay draws.
//!
//! Every overlay is a triangulated part of the face, placed at the *warped* landmark positions and
//! textured from the *original* positions. Drawing the parts onto the output target is what moves
//! the pixels of the face.

use facewarp_gpu::{Blend, Mesh, Pass, Resolution, Shader, TargetName, Vertex};

use crate::{
    landmark::{region, LandmarkSet},
    warp::{WarpStyle, Warped},
};

/// Triangles covering the face outline, the nose, and the skin around eyes and mouth.
pub const SKIN: &[u8] = &[
    0, 36, 17, 36, 18, 17, 36, 37, 18, 37, 19, 18, 37, 38, 19, 38, 20, 19, 38, 39, 20, 39, 21, 20,
    39, 27, 21, 27, 22, 21, 27, 42, 22, 42, 23, 22, 42, 43, 23, 43, 24, 23, 43, 44, 24, 44, 25, 24,
    44, 45, 25, 45, 26, 25, 45, 16, 26, 39, 28, 27, 28, 42, 27, 32, 33, 30, 33, 34, 30, 31, 30, 32,
    31, 30, 29, 34, 35, 30, 35, 29, 30, 35, 28, 29, 31, 29, 28, 0, 1, 36, 39, 31, 28, 35, 42, 28,
    15, 16, 45, 40, 31, 39, 35, 47, 42, 1, 41, 36, 1, 40, 41, 15, 45, 46, 15, 46, 47, 35, 15, 47,
    1, 31, 40, 1, 2, 31, 35, 14, 15, 2, 48, 31, 3, 48, 2, 4, 48, 3, 54, 14, 35, 54, 13, 14, 12, 13,
    54, 4, 5, 48, 5, 59, 48, 11, 12, 54, 55, 11, 54, 10, 11, 55, 56, 10, 55, 9, 10, 56, 5, 6, 59, 6,
    58, 59, 6, 7, 58, 7, 57, 58, 7, 8, 57, 57, 9, 56, 8, 9, 57, 48, 49, 31, 53, 54, 35, 49, 50, 31,
    52, 53, 35, 50, 32, 31, 52, 35, 34, 50, 51, 32, 51, 52, 34, 51, 34, 33, 51, 33, 32,
];

pub const RIGHT_EYE: &[u8] = &[36, 41, 37, 41, 40, 37, 40, 38, 37, 40, 39, 38];

pub const LEFT_EYE: &[u8] = &[42, 47, 43, 47, 44, 43, 47, 46, 44, 46, 45, 44];

/// Lips and mouth opening.
pub const MOUTH: &[u8] = &[
    48, 60, 49, 59, 60, 48, 60, 67, 61, 64, 54, 53, 55, 54, 64, 65, 64, 63, 67, 62, 61, 65, 63, 62,
    67, 66, 62, 66, 65, 62, 51, 52, 63, 61, 62, 51, 60, 61, 49, 61, 50, 49, 63, 64, 53, 63, 53, 52,
    61, 51, 50, 51, 62, 63, 59, 67, 60, 59, 58, 67, 58, 57, 67, 57, 66, 67, 57, 65, 66, 57, 56, 65,
    65, 55, 56, 55, 64, 65,
];

/// Only the mouth opening, inside the inner lip contour.
pub const INNER_MOUTH: &[u8] = &[
    60, 67, 61, 65, 64, 63, 67, 62, 61, 65, 63, 62, 67, 66, 62, 66, 65, 62,
];

/// Per-region vertex alphas of a face mesh.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Alphas {
    /// Nose.
    pub inner: f32,
    /// Jaw and brows.
    pub outer: f32,
    pub eyes: f32,
    pub mouth: f32,
}

impl Alphas {
    pub const OPAQUE: Self = Self::uniform(1.0);

    pub const fn uniform(alpha: f32) -> Self {
        Self {
            inner: alpha,
            outer: alpha,
            eyes: alpha,
            mouth: alpha,
        }
    }

    fn for_point(&self, index: usize) -> f32 {
        if region::OUTLINE.contains(&index) {
            self.outer
        } else if region::NOSE.contains(&index) {
            self.inner
        } else if region::EYES.contains(&index) {
            self.eyes
        } else {
            self.mouth
        }
    }
}

/// Builds a mesh over `points` (a contiguous slice of landmarks starting at index `first`).
///
/// Vertices are placed at `xy` and sample the source at `uv`, both in pixel coordinates of an
/// image of size `image`.
fn mesh(
    xy: &[[f32; 2]],
    uv: &[[f32; 2]],
    first: usize,
    image: Resolution,
    alphas: &Alphas,
    triangles: &[u8],
) -> Mesh {
    let (w, h) = (image.width() as f32, image.height() as f32);
    let vertices = xy
        .iter()
        .zip(uv)
        .enumerate()
        .map(|(i, (&[x, y], &[u, v]))| Vertex {
            position: [2.0 * x / w - 1.0, 1.0 - 2.0 * y / h],
            uv: [u / w, v / h],
            alpha: alphas.for_point(first + i),
        })
        .collect();
    let indices = triangles
        .iter()
        .map(|&i| u16::from(i) - first as u16)
        .collect();
    Mesh::new(vertices, indices)
}

/// A face mesh over all 68 landmarks.
pub fn face_mesh(
    xy: &LandmarkSet,
    uv: &LandmarkSet,
    image: Resolution,
    alphas: &Alphas,
    triangles: &[u8],
) -> Mesh {
    mesh(xy.points(), uv.points(), 0, image, alphas, triangles)
}

/// A mesh over the 20 mouth landmarks only.
pub fn mouth_mesh(xy: &LandmarkSet, uv: &LandmarkSet, image: Resolution, alpha: f32) -> Mesh {
    mesh(
        xy.region(region::MOUTH),
        uv.region(region::MOUTH),
        region::MOUTH.start,
        image,
        &Alphas::uniform(alpha),
        MOUTH,
    )
}

/// The mouth opening of `xy`, textured from the same place.
///
/// Drawn over a swapped face, this keeps the face's own teeth and tongue visible.
pub fn inner_mouth_mesh(xy: &LandmarkSet, image: Resolution) -> Mesh {
    let mouth = xy.region(region::MOUTH);
    mesh(
        mouth,
        mouth,
        region::MOUTH.start,
        image,
        &Alphas::OPAQUE,
        INNER_MOUTH,
    )
}

fn fade(factor: f32, from: f32, width: f32) -> f32 {
    ((factor - from) / width).clamp(0.0, 1.0)
}

/// Strength of the blurred skin for a warp factor.
pub fn skin_blur(factor: f32) -> f32 {
    fade(factor, 0.65, 0.1)
}

/// Strength of the teeth brightening for a warp factor.
pub fn teeth_brightening(factor: f32) -> f32 {
    fade(factor, 0.6, 0.2)
}

/// Alphas of the undistorted face layer drawn by `style`.
pub fn clear_face_alphas(style: WarpStyle) -> Alphas {
    match style {
        WarpStyle::Pretty => Alphas {
            inner: 0.6,
            outer: 1.0,
            eyes: 0.9,
            mouth: 0.9,
        },
        WarpStyle::Handsome => Alphas {
            inner: 0.7,
            outer: 1.0,
            eyes: 0.9,
            mouth: 0.9,
        },
        WarpStyle::Swap | WarpStyle::Puppet => Alphas {
            inner: 1.0,
            outer: 0.0,
            eyes: 1.0,
            mouth: 1.0,
        },
        _ => Alphas::OPAQUE,
    }
}

/// Returns the passes that draw one warped face onto the output target.
///
/// `original` are the detected landmarks, `warped` the result of the style's solver, and `upright`
/// the size of the image both are expressed in.
pub fn face_passes(
    style: WarpStyle,
    original: &LandmarkSet,
    warped: &Warped,
    upright: Resolution,
) -> Vec<Pass> {
    if style == WarpStyle::None {
        return Vec::new();
    }

    // Puppets keep their own shape and take the texture from the driving face.
    let (xy, uv) = match style {
        WarpStyle::Puppet => (original, &warped.landmarks),
        _ => (&warped.landmarks, original),
    };
    let factor = warped.factor;

    let mut passes = Vec::with_capacity(6);
    if matches!(style, WarpStyle::Pretty | WarpStyle::Handsome) {
        passes.push(Pass::onto_output(
            "blur_face",
            TargetName::Blurred,
            face_mesh(xy, uv, upright, &Alphas::uniform(skin_blur(factor)), SKIN),
            Shader::Copy,
            Blend::Over,
        ));
    }
    passes.push(Pass::onto_output(
        "clear_face",
        TargetName::Upright,
        face_mesh(xy, uv, upright, &clear_face_alphas(style), SKIN),
        Shader::Copy,
        Blend::Over,
    ));
    for (label, triangles) in [
        ("right_eye", RIGHT_EYE),
        ("left_eye", LEFT_EYE),
        ("mouth", MOUTH),
    ] {
        passes.push(Pass::onto_output(
            label,
            TargetName::Upright,
            face_mesh(xy, uv, upright, &Alphas::OPAQUE, triangles),
            Shader::Copy,
            Blend::Replace,
        ));
    }
    if style == WarpStyle::Swap {
        passes.push(Pass::onto_output(
            "inner_mouth",
            TargetName::Upright,
            inner_mouth_mesh(xy, upright),
            Shader::Copy,
            Blend::Over,
        ));
    }
    if matches!(
        style,
        WarpStyle::Pretty | WarpStyle::Handsome | WarpStyle::Silly
    ) {
        passes.push(Pass::onto_output(
            "bright_mouth",
            TargetName::Upright,
            mouth_mesh(xy, uv, upright, teeth_brightening(factor)),
            Shader::Brighten,
            Blend::Replace,
        ));
    }
    passes
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use itertools::Itertools;

    use super::*;
    use crate::landmark::{random_landmarks, NUM_LANDMARKS};

    const RES: Resolution = Resolution::new(640, 480);

    fn labels(passes: &[Pass]) -> Vec<&'static str> {
        passes.iter().map(|pass| pass.label).collect()
    }

    #[test]
    fn triangulations_are_valid() {
        for tris in [SKIN, RIGHT_EYE, LEFT_EYE, MOUTH, INNER_MOUTH] {
            assert_eq!(tris.len() % 3, 0);
            assert!(tris.iter().all(|&i| usize::from(i) < NUM_LANDMARKS));
            for tri in tris.chunks(3) {
                assert!(tri.iter().all_unique(), "degenerate triangle {tri:?}");
            }
        }
        assert!(MOUTH.iter().all(|&i| region::MOUTH.contains(&usize::from(i))));
        assert!(INNER_MOUTH
            .iter()
            .all(|&i| region::INNER_LIPS.contains(&usize::from(i))));
        assert!(RIGHT_EYE
            .iter()
            .all(|&i| region::RIGHT_EYE.contains(&usize::from(i))));
        assert!(LEFT_EYE
            .iter()
            .all(|&i| region::LEFT_EYE.contains(&usize::from(i))));
    }

    #[test]
    fn vertices_map_pixels_to_clip_and_uv() {
        let mut points = [[0.0; 2]; NUM_LANDMARKS];
        points[0] = [0.0, 0.0];
        points[1] = [640.0, 480.0];
        points[2] = [320.0, 120.0];
        let lm = LandmarkSet::new(points);
        let mesh = face_mesh(&lm, &lm, RES, &Alphas::OPAQUE, &[0, 1, 2]);

        let v = mesh.vertices();
        assert_eq!(v[0].position, [-1.0, 1.0]);
        assert_eq!(v[0].uv, [0.0, 0.0]);
        assert_eq!(v[1].position, [1.0, -1.0]);
        assert_eq!(v[1].uv, [1.0, 1.0]);
        assert_relative_eq!(v[2].position[1], 0.5);
        assert_relative_eq!(v[2].uv[1], 0.25);
    }

    #[test]
    fn alpha_bands() {
        let alphas = Alphas {
            inner: 0.1,
            outer: 0.2,
            eyes: 0.3,
            mouth: 0.4,
        };
        let lm = random_landmarks([100.0, 100.0], 50.0);
        let mesh = face_mesh(&lm, &lm, RES, &alphas, SKIN);
        let alpha = |i: usize| mesh.vertices()[i].alpha;
        assert_eq!(alpha(0), 0.2);
        assert_eq!(alpha(26), 0.2);
        assert_eq!(alpha(27), 0.1);
        assert_eq!(alpha(36), 0.3);
        assert_eq!(alpha(47), 0.3);
        assert_eq!(alpha(48), 0.4);
        assert_eq!(alpha(67), 0.4);
    }

    #[test]
    fn mouth_mesh_is_rebased() {
        let lm = random_landmarks([100.0, 100.0], 50.0);
        let mesh = mouth_mesh(&lm, &lm, RES, 0.5);
        assert_eq!(mesh.vertices().len(), 20);
        assert_eq!(mesh.num_triangles(), MOUTH.len() / 3);
        assert_eq!(mesh.indices()[0], 0);
        assert_eq!(mesh.vertices()[0].alpha, 0.5);
    }

    #[test]
    fn inner_mouth_samples_its_own_position() {
        let lm = random_landmarks([100.0, 100.0], 50.0);
        let mesh = inner_mouth_mesh(&lm, RES);
        assert_eq!(mesh.num_triangles(), INNER_MOUTH.len() / 3);
        for v in mesh.vertices() {
            assert_relative_eq!(v.uv[0], (v.position[0] + 1.0) / 2.0, epsilon = 1e-6);
            assert_relative_eq!(v.uv[1], (1.0 - v.position[1]) / 2.0, epsilon = 1e-6);
        }
        let first = usize::from(mesh.indices()[0]) + region::MOUTH.start;
        assert!(region::INNER_LIPS.contains(&first));
    }

    #[test]
    fn fades() {
        assert_eq!(skin_blur(0.5), 0.0);
        assert_relative_eq!(skin_blur(0.7), 0.5, epsilon = 1e-6);
        assert_eq!(skin_blur(0.9), 1.0);
        assert_eq!(teeth_brightening(0.6), 0.0);
        assert_relative_eq!(teeth_brightening(0.7), 0.5, epsilon = 1e-6);
        assert_eq!(teeth_brightening(1.0), 1.0);
    }

    #[test]
    fn style_recipes() {
        let lm = random_landmarks([200.0, 200.0], 100.0);
        let warped = Warped {
            landmarks: lm.translated([5.0, 0.0]),
            factor: 1.0,
        };
        let passes = |style| face_passes(style, &lm, &warped, RES);

        assert!(passes(WarpStyle::None).is_empty());
        assert_eq!(
            labels(&passes(WarpStyle::Pretty)),
            [
                "blur_face",
                "clear_face",
                "right_eye",
                "left_eye",
                "mouth",
                "bright_mouth"
            ]
        );
        assert_eq!(
            labels(&passes(WarpStyle::Silly)),
            ["clear_face", "right_eye", "left_eye", "mouth", "bright_mouth"]
        );
        assert_eq!(
            labels(&passes(WarpStyle::Swap)),
            ["clear_face", "right_eye", "left_eye", "mouth", "inner_mouth"]
        );
        assert_eq!(
            labels(&passes(WarpStyle::Puppet)),
            ["clear_face", "right_eye", "left_eye", "mouth"]
        );
        assert_eq!(
            labels(&passes(WarpStyle::Nose)),
            ["clear_face", "right_eye", "left_eye", "mouth"]
        );

        let pretty = passes(WarpStyle::Pretty);
        assert_eq!(pretty[0].source, TargetName::Blurred);
        assert_eq!(pretty[5].shader, Shader::Brighten);
        assert!(pretty
            .iter()
            .all(|pass| pass.dest == facewarp_gpu::Dest::Target(TargetName::Output)));
    }

    #[test]
    fn puppet_exchanges_roles() {
        let lm = random_landmarks([200.0, 200.0], 100.0);
        let warped = Warped {
            landmarks: lm.translated([64.0, 0.0]),
            factor: 0.0,
        };
        let swap = face_passes(WarpStyle::Swap, &lm, &warped, RES);
        let puppet = face_passes(WarpStyle::Puppet, &lm, &warped, RES);

        // Swaps draw at the warped shape, puppets at the original one.
        let (s, p) = (&swap[0].mesh.vertices()[0], &puppet[0].mesh.vertices()[0]);
        assert_relative_eq!(p.position[0], 2.0 * s.uv[0] - 1.0, epsilon = 1e-5);
        assert_relative_eq!(s.position[0], 2.0 * p.uv[0] - 1.0, epsilon = 1e-5);
        assert_relative_eq!(s.position[0] - p.position[0], 0.2, epsilon = 1e-5);
    }
}
