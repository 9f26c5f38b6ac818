//! Staged GPU texture pipeline for live camera frames.
//!
//! # Overview
//!
//! Every camera frame goes through the same stages: it is uploaded into the *video* target,
//! rotated and mirrored into the *upright* target, downsampled and blurred, and then composited
//! into the *output* target, which is finally presented letterboxed onto the screen.
//!
//! ## Geometry
//!
//! [`Geometry`] captures everything that depends on the camera, the device orientation and the
//! frame size: the quad transforms for the preprocess and present passes, the sizes of all
//! intermediate targets, and the letterbox scale. It only changes when one of its inputs changes,
//! and the [`TexturePipeline`] only reallocates targets when it does.
//!
//! ## Passes and Backends
//!
//! A [`Pass`] is a plain description of a single draw: a named source target, a destination, a
//! [`Mesh`], a [`Shader`] and a [`Blend`] mode. [`Backend`]s execute passes. [`WgpuBackend`]
//! renders them on the GPU, while [`RecordingBackend`] only logs them, which is what the tests and
//! any headless tooling use.

pub mod geometry;
pub mod pass;

mod backend;
mod buffer;
mod error;
mod gpu;
mod mesh;
mod pipeline;
mod recording;
mod resolution;
mod target;
mod wgpu_backend;

pub use backend::Backend;
pub use buffer::PixelBuffer;
pub use error::GpuError;
pub use geometry::{CameraIndex, Flip, Geometry, Orientation, QuadTransform};
pub use gpu::Gpu;
pub use mesh::{Mesh, Vertex};
pub use pass::{Blend, Dest, Load, Pass, Shader};
pub use pipeline::TexturePipeline;
pub use recording::{Draw, RecordedTarget, RecordingBackend};
pub use resolution::{AspectRatio, Resolution};
pub use target::{TargetName, TargetPool};
pub use wgpu_backend::{GpuTarget, WgpuBackend};

pub use wgpu;
