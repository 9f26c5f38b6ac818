use crate::{GpuError, Pass, PixelBuffer, Resolution, TargetName};

/// Executes [`Pass`]es.
///
/// Implemented by [`WgpuBackend`](crate::WgpuBackend) for real rendering and by
/// [`RecordingBackend`](crate::RecordingBackend), which only logs what it is asked to do.
pub trait Backend {
    /// Handle to an allocated render target.
    type Target;

    /// Allocates a render target. Failing here is fatal for the pipeline.
    fn create_target(
        &mut self,
        name: TargetName,
        resolution: Resolution,
    ) -> Result<Self::Target, GpuError>;

    /// Replaces the contents of `target` with `pixels`, which must match its resolution.
    fn upload(&mut self, target: &Self::Target, pixels: &PixelBuffer) -> Result<(), GpuError>;

    /// Runs a pass. `dest` is `None` when the pass draws to the screen.
    fn draw(
        &mut self,
        pass: &Pass,
        source: &Self::Target,
        dest: Option<&Self::Target>,
    ) -> Result<(), GpuError>;

    /// Copies the contents of `target` back to CPU memory.
    fn read(&mut self, target: &Self::Target) -> Result<PixelBuffer, GpuError>;

    /// Current size of the screen that [`Dest::Screen`](crate::Dest::Screen) passes draw to.
    fn display_resolution(&self) -> Resolution;

    /// Adapts the screen to a new size.
    fn resize_display(&mut self, size: Resolution) -> Result<(), GpuError>;
}
