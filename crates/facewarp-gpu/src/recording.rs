//! A backend that records passes instead of rendering them.

use crate::{Backend, Dest, GpuError, Pass, PixelBuffer, Resolution, Shader, TargetName};

/// Handle to a target of the [`RecordingBackend`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedTarget {
    id: usize,
    resolution: Resolution,
}

impl RecordedTarget {
    /// Allocation counter value of this target, unique per backend.
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }
}

/// A draw that was submitted to the [`RecordingBackend`].
#[derive(Debug, Clone, PartialEq)]
pub struct Draw {
    pub label: &'static str,
    pub source: TargetName,
    pub dest: Dest,
    pub shader: Shader,
    pub triangles: usize,
}

/// Headless [`Backend`] that keeps a log of everything it is asked to do.
///
/// Reading a target back yields an opaque black image of the target's size.
pub struct RecordingBackend {
    display: Resolution,
    next_id: usize,
    draws: Vec<Draw>,
    uploads: usize,
    fail_allocations: bool,
}

impl RecordingBackend {
    pub fn new(display: Resolution) -> Self {
        Self {
            display,
            next_id: 0,
            draws: Vec::new(),
            uploads: 0,
            fail_allocations: false,
        }
    }

    /// Makes every subsequent target allocation fail.
    pub fn fail_allocations(&mut self, fail: bool) {
        self.fail_allocations = fail;
    }

    pub fn draws(&self) -> &[Draw] {
        &self.draws
    }

    /// Returns and forgets the draws recorded so far.
    pub fn take_draws(&mut self) -> Vec<Draw> {
        std::mem::take(&mut self.draws)
    }

    pub fn uploads(&self) -> usize {
        self.uploads
    }
}

impl Backend for RecordingBackend {
    type Target = RecordedTarget;

    fn create_target(
        &mut self,
        name: TargetName,
        resolution: Resolution,
    ) -> Result<RecordedTarget, GpuError> {
        if self.fail_allocations {
            return Err(GpuError::Allocation {
                label: name.as_str(),
                resolution,
                message: "allocation disabled".into(),
            });
        }
        self.next_id += 1;
        Ok(RecordedTarget {
            id: self.next_id,
            resolution,
        })
    }

    fn upload(&mut self, target: &RecordedTarget, pixels: &PixelBuffer) -> Result<(), GpuError> {
        if pixels.resolution() != target.resolution {
            return Err(GpuError::BufferSize {
                len: pixels.data().len(),
                resolution: target.resolution,
            });
        }
        self.uploads += 1;
        Ok(())
    }

    fn draw(
        &mut self,
        pass: &Pass,
        _source: &RecordedTarget,
        _dest: Option<&RecordedTarget>,
    ) -> Result<(), GpuError> {
        log::trace!("recorded pass '{}'", pass.label);
        self.draws.push(Draw {
            label: pass.label,
            source: pass.source,
            dest: pass.dest,
            shader: pass.shader,
            triangles: pass.mesh.num_triangles(),
        });
        Ok(())
    }

    fn read(&mut self, target: &RecordedTarget) -> Result<PixelBuffer, GpuError> {
        Ok(PixelBuffer::filled(target.resolution, [0, 0, 0, 255]))
    }

    fn display_resolution(&self) -> Resolution {
        self.display
    }

    fn resize_display(&mut self, size: Resolution) -> Result<(), GpuError> {
        self.display = size;
        Ok(())
    }
}
