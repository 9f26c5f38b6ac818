use crate::{
    pass, Backend, CameraIndex, Dest, Geometry, GpuError, Orientation, Pass, PixelBuffer,
    Resolution, TargetName, TargetPool,
};

/// The staged texture pipeline: oriented geometry, its render targets, and a pass runner.
pub struct TexturePipeline<B: Backend> {
    backend: B,
    pool: TargetPool<B::Target>,
    geometry: Option<Geometry>,
    shrink: u32,
    rebuilds: usize,
}

impl<B: Backend> TexturePipeline<B> {
    /// Creates a pipeline that downsamples frames by `shrink` before blurring them.
    pub fn new(backend: B, shrink: u32) -> Self {
        Self {
            backend,
            pool: TargetPool::new(),
            geometry: None,
            shrink: shrink.max(1),
            rebuilds: 0,
        }
    }

    /// Recomputes geometry for a camera, orientation and frame size, and (re)allocates every
    /// orientation-dependent render target.
    ///
    /// The display size is taken from the backend at the time of the call.
    pub fn rebuild(
        &mut self,
        camera: CameraIndex,
        orientation: Orientation,
        video: Resolution,
    ) -> Result<&Geometry, GpuError> {
        let display = self.backend.display_resolution();
        let geometry = Geometry::compute(camera, orientation, video, display, self.shrink);
        log::debug!(
            "rebuilding pipeline for {camera} in {orientation:?}: video {video}, upright {}, small {}, display {display}",
            geometry.upright,
            geometry.small,
        );

        for name in TargetName::ORIENTED {
            let res = match name {
                TargetName::Upright | TargetName::Output => geometry.upright,
                _ => geometry.small,
            };
            self.pool.ensure(&mut self.backend, name, res)?;
        }
        self.pool.ensure(&mut self.backend, TargetName::Video, video)?;
        let freed = self.pool.trim_spares();
        if freed > 0 {
            log::debug!("freed {freed} spare targets, keeping {}", self.pool.num_spare());
        }

        self.rebuilds += 1;
        Ok(self.geometry.insert(geometry))
    }

    pub fn geometry(&self) -> Option<&Geometry> {
        self.geometry.as_ref()
    }

    fn configured(&self) -> Result<&Geometry, GpuError> {
        self.geometry.as_ref().ok_or(GpuError::Unconfigured)
    }

    /// Number of times [`TexturePipeline::rebuild`] has run.
    pub fn rebuilds(&self) -> usize {
        self.rebuilds
    }

    pub fn pool(&self) -> &TargetPool<B::Target> {
        &self.pool
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Uploads a camera frame into the raw video target.
    ///
    /// The video target follows the frame size, so a camera switching resolutions does not need a
    /// geometry rebuild to keep uploading.
    pub fn upload(&mut self, frame: &PixelBuffer) -> Result<(), GpuError> {
        self.pool
            .ensure(&mut self.backend, TargetName::Video, frame.resolution())?;
        let target = self.pool.get(TargetName::Video)?;
        self.backend.upload(target, frame)
    }

    /// Resolves the targets of a pass and runs it.
    pub fn run(&mut self, pass: &Pass) -> Result<(), GpuError> {
        let source = self.pool.get(pass.source)?;
        let dest = match pass.dest {
            Dest::Target(name) => Some(self.pool.get(name)?),
            Dest::Screen => None,
        };
        self.backend.draw(pass, source, dest)
    }

    pub fn run_all<I: IntoIterator<Item = Pass>>(&mut self, passes: I) -> Result<(), GpuError> {
        for pass in passes {
            self.run(&pass)?;
        }
        Ok(())
    }

    /// Runs the preprocess, downsample and blur passes.
    pub fn preprocess(&mut self) -> Result<(), GpuError> {
        let passes = pass::preprocess(self.configured()?);
        self.run_all(passes)?;
        self.run_all(pass::blur())
    }

    pub fn composite_base(&mut self) -> Result<(), GpuError> {
        self.configured()?;
        self.run(&pass::composite_base())
    }

    pub fn holding_image(&mut self) -> Result<(), GpuError> {
        self.configured()?;
        self.run(&pass::holding_image())
    }

    pub fn present(&mut self) -> Result<(), GpuError> {
        let pass = pass::present(self.configured()?);
        self.run(&pass)
    }

    /// Reads a render target back to CPU memory.
    pub fn read(&mut self, name: TargetName) -> Result<PixelBuffer, GpuError> {
        let target = self.pool.get(name)?;
        self.backend.read(target)
    }
}
