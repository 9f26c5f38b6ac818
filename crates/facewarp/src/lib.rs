//! Real-time face warping for live camera video.
//!
//! # Overview
//!
//! Camera frames enter through a [`source::FrameSource`] and are handed to the render thread,
//! which drives the [`orchestrator::Orchestrator`] once per frame. The orchestrator runs the GPU
//! [`TexturePipeline`](facewarp_gpu::TexturePipeline), asks a [`detector::Detector`] for facial
//! landmarks, matches them to persistent identities with the [`tracker::FaceTracker`], warps them
//! with the [`warp::WarpEngine`], draws the [`overlay`]s of the active style, and hands the result
//! to the photo capture and the [`recorder::Recorder`].
//!
//! User intent (style, capture, recording, calibration, device orientation) is collected in a
//! [`session::Session`] owned by the render loop.
//!
//! # Environment Variables
//!
//! * `FACEWARP_CONFIG`: path to a JSON [`config::Config`] file. Missing fields use their defaults.
//! * `RUST_LOG`: overrides the log filters set by [`init_logger!`].

use log::LevelFilter;

pub mod config;
pub mod detector;
pub mod landmark;
pub mod orchestrator;
pub mod overlay;
pub mod recorder;
pub mod session;
pub mod source;
pub mod stats;
pub mod tracker;
pub mod warp;
pub mod worker;

pub use facewarp_gpu as gpu;

/// macro-use only, not part of public API.
#[doc(hidden)]
pub fn init_logger(calling_crate: &'static str) {
    let log_level = if cfg!(debug_assertions) {
        LevelFilter::Trace
    } else {
        LevelFilter::Debug
    };
    env_logger::Builder::new()
        .filter(Some(calling_crate), log_level)
        .filter(Some(env!("CARGO_CRATE_NAME")), log_level)
        .filter(Some("facewarp_gpu"), log_level)
        .filter(Some("wgpu"), LevelFilter::Warn)
        .parse_default_env()
        .try_init()
        .ok();
}

/// Initializes logging to *stderr*.
///
/// If `cfg!(debug_assertions)` is enabled, the calling crate and facewarp will log at *trace*
/// level. Otherwise, they will log at *debug* level.
///
/// `wgpu` will always log at *warn* level.
///
/// If a global logger is already registered, this macro will do nothing.
#[macro_export]
macro_rules! init_logger {
    () => {
        $crate::init_logger(env!("CARGO_CRATE_NAME"))
    };
}
