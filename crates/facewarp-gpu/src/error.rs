use crate::{Resolution, TargetName};

/// Errors raised while building or running the render pipeline.
#[derive(Debug, thiserror::Error)]
pub enum GpuError {
    #[error("shader module failed validation: {0}")]
    Shader(String),
    #[error("failed to allocate render target '{label}' at {resolution}: {message}")]
    Allocation {
        label: &'static str,
        resolution: Resolution,
        message: String,
    },
    #[error("render target '{0}' has not been allocated")]
    MissingTarget(TargetName),
    #[error("pipeline geometry has not been configured")]
    Unconfigured,
    #[error("pixel buffer of {len} bytes does not match resolution {resolution}")]
    BufferSize { len: usize, resolution: Resolution },
    #[error("failed to read back render target: {0}")]
    Readback(String),
    #[error("failed to acquire surface texture: {0}")]
    Surface(#[from] wgpu::SurfaceError),
}
