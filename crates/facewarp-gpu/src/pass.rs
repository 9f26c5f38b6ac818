//! Pure descriptions of render passes.
//!
//! Building a [`Pass`] has no side effects. A [`Backend`](crate::Backend) turns it into GPU work,
//! which keeps the wiring of the pipeline testable without a GPU.

use crate::{
    geometry::{quad, Geometry, QuadTransform},
    Mesh, TargetName,
};

/// Fragment program used by a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shader {
    /// Samples the source and scales it by the vertex alpha.
    Copy,
    /// Narrow horizontal box filter, used while downsampling.
    AverageH,
    /// Narrow vertical box filter, used while downsampling.
    AverageV,
    /// Horizontal half of the separable gaussian blur.
    GaussianH,
    /// Vertical half of the separable gaussian blur.
    GaussianV,
    /// Lifts bright areas, weighted by the vertex alpha. Used on teeth.
    Brighten,
}

impl Shader {
    pub const ALL: [Self; 6] = [
        Self::Copy,
        Self::AverageH,
        Self::AverageV,
        Self::GaussianH,
        Self::GaussianV,
        Self::Brighten,
    ];

    /// Name of the fragment entry point in the pass shader module.
    pub fn entry_point(self) -> &'static str {
        match self {
            Self::Copy => "copy",
            Self::AverageH => "average_h",
            Self::AverageV => "average_v",
            Self::GaussianH => "gaussian_h",
            Self::GaussianV => "gaussian_v",
            Self::Brighten => "brighten",
        }
    }
}

/// How the fragment output is combined with the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Blend {
    /// Overwrite the destination.
    Replace,
    /// Premultiplied "over" on the color channels, destination alpha is kept.
    Over,
}

/// Whether the destination is cleared before drawing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Load {
    Clear,
    Keep,
}

/// Where a pass draws to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dest {
    Target(TargetName),
    /// The visible framebuffer.
    Screen,
}

/// A single draw: one source target, sampled through `mesh`, into one destination.
#[derive(Debug, Clone, PartialEq)]
pub struct Pass {
    pub label: &'static str,
    pub source: TargetName,
    pub dest: Dest,
    pub mesh: Mesh,
    pub shader: Shader,
    pub blend: Blend,
    pub load: Load,
}

impl Pass {
    /// A pass that replaces all of `dest` with `source` sampled through `transform`.
    pub fn full_quad(
        label: &'static str,
        source: TargetName,
        dest: TargetName,
        transform: QuadTransform,
        shader: Shader,
    ) -> Self {
        Self {
            label,
            source,
            dest: Dest::Target(dest),
            mesh: quad(transform, [1.0, 1.0]),
            shader,
            blend: Blend::Replace,
            load: Load::Keep,
        }
    }

    /// A pass drawing a mesh onto the output target, blending with what is already there.
    pub fn onto_output(
        label: &'static str,
        source: TargetName,
        mesh: Mesh,
        shader: Shader,
        blend: Blend,
    ) -> Self {
        Self {
            label,
            source,
            dest: Dest::Target(TargetName::Output),
            mesh,
            shader,
            blend,
            load: Load::Keep,
        }
    }
}

/// Rotates the raw frame upright and downsamples it with two narrow averaging passes.
pub fn preprocess(geometry: &Geometry) -> [Pass; 3] {
    [
        Pass::full_quad(
            "preprocess",
            TargetName::Video,
            TargetName::Upright,
            geometry.preprocess,
            Shader::Copy,
        ),
        Pass::full_quad(
            "downsample_h",
            TargetName::Upright,
            TargetName::BlurScratch,
            QuadTransform::IDENTITY,
            Shader::AverageH,
        ),
        Pass::full_quad(
            "downsample_v",
            TargetName::BlurScratch,
            TargetName::Small,
            QuadTransform::IDENTITY,
            Shader::AverageV,
        ),
    ]
}

/// Separable blur of the downsampled frame.
pub fn blur() -> [Pass; 2] {
    [
        Pass::full_quad(
            "blur_h",
            TargetName::Small,
            TargetName::BlurScratch,
            QuadTransform::IDENTITY,
            Shader::GaussianH,
        ),
        Pass::full_quad(
            "blur_v",
            TargetName::BlurScratch,
            TargetName::Blurred,
            QuadTransform::IDENTITY,
            Shader::GaussianV,
        ),
    ]
}

/// Copies the upright frame into the output target as the base for face draws.
pub fn composite_base() -> Pass {
    Pass::full_quad(
        "composite_base",
        TargetName::Upright,
        TargetName::Output,
        QuadTransform::IDENTITY,
        Shader::Copy,
    )
}

/// Fills the output with the blurred frame, shown while calibrating.
pub fn holding_image() -> Pass {
    Pass::full_quad(
        "holding_image",
        TargetName::Blurred,
        TargetName::Output,
        QuadTransform::IDENTITY,
        Shader::Copy,
    )
}

/// Draws the output onto the screen, letterboxed.
pub fn present(geometry: &Geometry) -> Pass {
    Pass {
        label: "present",
        source: TargetName::Output,
        dest: Dest::Screen,
        mesh: quad(geometry.present, geometry.letterbox),
        shader: Shader::Copy,
        blend: Blend::Replace,
        load: Load::Clear,
    }
}
