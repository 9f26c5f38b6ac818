//! The per-frame driver of the pipeline.

use std::{
    path::PathBuf,
    sync::Arc,
    time::{Duration, Instant},
};

use facewarp_gpu::{
    Backend, CameraIndex, Geometry, GpuError, Orientation, PixelBuffer, Resolution, TargetName,
    TexturePipeline,
};

use crate::{
    config::{CalibrationConfig, Config},
    detector::Detector,
    landmark::LandmarkSet,
    overlay,
    recorder::{MediaLibrary, Recorder, RecorderError, RecorderState},
    session::Session,
    source::{AudioSamples, CameraFrame},
    stats::{FrameStats, Stage},
    tracker::FaceTracker,
    warp::{calibration::Scale, WarpEngine, WarpStyle},
    worker::PromiseHandle,
};

/// Progress of a running calibration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationPhase {
    /// Calibration was just requested; nothing has been checked yet.
    WaitingForOrientation,
    /// The device is held upright and faces are being observed.
    Sampling { since: Instant },
    /// The device left portrait orientation at `since`.
    PortraitViolationGrace { since: Instant },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Normal,
    Calibrating {
        style: WarpStyle,
        phase: CalibrationPhase,
    },
}

/// What the UI should show on top of the video.
#[derive(Debug, Clone, PartialEq)]
pub enum Status {
    Live,
    /// Calibration is sampling; it completes in about `seconds`.
    Countdown { seconds: u32 },
    /// Calibration is paused until the device is held in portrait orientation again.
    RotateToPortrait,
    /// Calibration finished this frame. `scale` is `None` if no face was observed.
    Calibrated { scale: Option<Scale> },
    /// Calibration was given up this frame because the device stayed rotated.
    CalibrationAborted,
}

/// Outcome of a single [`Orchestrator::tick`].
#[derive(Debug)]
pub struct TickReport {
    /// Whether the pipeline geometry was rebuilt for this frame.
    pub rebuilt: bool,
    /// Number of faces detected in this frame.
    pub faces: usize,
    pub status: Status,
    /// Where a photo requested for this frame was saved.
    pub photo: Option<PathBuf>,
    /// Outcome of a stopped recording that finished saving since the last frame.
    pub saved: Option<Result<PathBuf, RecorderError>>,
}

/// Inputs that the pipeline geometry depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CacheKey {
    camera: CameraIndex,
    orientation: Orientation,
    display: Resolution,
    video: Resolution,
}

/// Runs one frame at a time through detection, warping, drawing and capture.
///
/// All state lives on the render thread; the orchestrator is driven by calling
/// [`Orchestrator::tick`] once per camera frame.
pub struct Orchestrator<B: Backend> {
    pipeline: TexturePipeline<B>,
    tracker: FaceTracker,
    engine: WarpEngine,
    detector: Box<dyn Detector>,
    recorder: Recorder,
    library: Arc<dyn MediaLibrary>,
    album: String,
    calibration: CalibrationConfig,
    mode: Mode,
    cache: Option<CacheKey>,
    pending_save: Option<PromiseHandle<Result<PathBuf, RecorderError>>>,
    stats: FrameStats,
}

impl<B: Backend> Orchestrator<B> {
    pub fn new(
        pipeline: TexturePipeline<B>,
        engine: WarpEngine,
        detector: Box<dyn Detector>,
        recorder: Recorder,
        config: &Config,
    ) -> Self {
        Self {
            pipeline,
            tracker: FaceTracker::new(config.tracker.options()),
            engine,
            detector,
            library: recorder.library().clone(),
            recorder,
            album: config.recorder.album.clone(),
            calibration: config.calibration.clone(),
            mode: Mode::Normal,
            cache: None,
            pending_save: None,
            stats: FrameStats::new(),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn pipeline(&self) -> &TexturePipeline<B> {
        &self.pipeline
    }

    pub fn pipeline_mut(&mut self) -> &mut TexturePipeline<B> {
        &mut self.pipeline
    }

    pub fn tracker(&self) -> &FaceTracker {
        &self.tracker
    }

    pub fn engine(&self) -> &WarpEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut WarpEngine {
        &mut self.engine
    }

    pub fn recorder(&self) -> &Recorder {
        &self.recorder
    }

    /// Forwards camera audio to the recorder. Dropped unless a recording is in progress.
    pub fn on_audio(&mut self, audio: AudioSamples) {
        if self.recorder.state() == RecorderState::Recording {
            self.recorder.append_audio(audio);
        }
    }

    /// Processes one camera frame.
    ///
    /// GPU and readback failures are returned as errors; faces not being found is not an error.
    pub fn tick(
        &mut self,
        session: &mut Session,
        frame: &CameraFrame,
        now: Instant,
    ) -> anyhow::Result<TickReport> {
        let saved = self.poll_save();

        if let Some(size) = session.take_display_size() {
            log::debug!("display resized to {size}");
            self.pipeline.backend_mut().resize_display(size)?;
        }

        let key = CacheKey {
            camera: session.camera(),
            orientation: session.orientation(),
            display: self.pipeline.backend().display_resolution(),
            video: frame.pixels.resolution(),
        };
        let rebuilt = self.cache != Some(key);
        if rebuilt {
            self.pipeline
                .rebuild(key.camera, key.orientation, key.video)?;
            if self.cache.map_or(false, |old| old.camera != key.camera) {
                // Faces seen by the other camera are not the same faces.
                log::debug!(
                    "camera switched to {:?}, forgetting {} faces",
                    key.camera,
                    self.tracker.len()
                );
                self.tracker.clear();
            }
            self.cache = Some(key);
        }

        if let Some(style) = session.take_calibration_request() {
            self.start_calibration(style);
        }

        self.stats.measure(Stage::Upload, || -> Result<(), GpuError> {
            self.pipeline.upload(&frame.pixels)?;
            self.pipeline.preprocess()
        })?;

        let mut report = TickReport {
            rebuilt,
            faces: 0,
            status: Status::Live,
            photo: None,
            saved,
        };
        match self.mode {
            Mode::Normal => self.tick_normal(session, frame, now, &mut report)?,
            Mode::Calibrating { style, phase } => {
                self.stop_recording_if_released(session);
                let status = self.tick_calibration(session, style, phase, now, &mut report)?;
                report.status = status;
            }
        }

        if let Some(stats) = self.stats.end_frame(now) {
            log::debug!("{stats}");
        }
        Ok(report)
    }

    fn poll_save(&mut self) -> Option<Result<PathBuf, RecorderError>> {
        let handle = self.pending_save.take()?;
        match handle.block_timeout(Duration::ZERO) {
            Ok(Ok(result)) => Some(result),
            Ok(Err(_)) => Some(Err(RecorderError::QueueLost("finalize"))),
            Err(handle) => {
                self.pending_save = Some(handle);
                None
            }
        }
    }

    fn detect(&mut self) -> Result<Vec<LandmarkSet>, GpuError> {
        let start = Instant::now();
        let shrink = self.geometry()?.shrink;
        let upright = self.pipeline.read(TargetName::Upright)?;
        let small = self.pipeline.read(TargetName::Small)?;
        let faces = self.detector.detect(&upright, &small, shrink);
        self.stats.record(Stage::Detect, start.elapsed());
        Ok(faces)
    }

    fn geometry(&self) -> Result<&Geometry, GpuError> {
        self.pipeline.geometry().ok_or(GpuError::Unconfigured)
    }

    fn tick_normal(
        &mut self,
        session: &mut Session,
        frame: &CameraFrame,
        now: Instant,
        report: &mut TickReport,
    ) -> anyhow::Result<()> {
        self.pipeline.composite_base()?;

        let detections = self.detect()?;
        let ids = self.tracker.resolve(&detections, now);
        report.faces = detections.len();

        let style = session.style();
        let warped = self
            .engine
            .apply_frame(style, &mut self.tracker, &ids, &detections);

        let draw_start = Instant::now();
        let upright = self.geometry()?.upright;
        for (original, warped) in detections.iter().zip(&warped) {
            self.pipeline
                .run_all(overlay::face_passes(style, original, warped, upright))?;
        }
        self.pipeline.present()?;
        self.stats.record(Stage::Draw, draw_start.elapsed());

        let capture_start = Instant::now();
        if session.take_capture_photo() {
            report.photo = self.capture_photo(session.camera())?;
        }
        self.hand_off_recording(session, frame)?;
        self.stats.record(Stage::Capture, capture_start.elapsed());
        Ok(())
    }

    /// Saves the output target into the media library.
    ///
    /// Readback failures are errors. Library failures are only logged, since the frame loop can
    /// carry on without the photo.
    fn capture_photo(&mut self, camera: CameraIndex) -> Result<Option<PathBuf>, GpuError> {
        let mut photo = self.pipeline.read(TargetName::Output)?;
        photo.make_opaque();
        if camera.is_front() {
            photo.mirror_horizontally();
        }

        let res = self
            .library
            .ensure_collection(&self.album)
            .and_then(|_| self.library.save_photo(&self.album, &photo));
        match res {
            Ok(path) => Ok(Some(path)),
            Err(e) => {
                log::error!("failed to save photo: {e}");
                Ok(None)
            }
        }
    }

    fn hand_off_recording(
        &mut self,
        session: &mut Session,
        frame: &CameraFrame,
    ) -> Result<(), GpuError> {
        match (session.recording_requested(), self.recorder.state()) {
            (true, RecorderState::Idle | RecorderState::Error) => {
                let res = self.geometry()?.upright;
                if self.recorder.start(res.width(), res.height()).is_err() {
                    // Logged by the recorder. Don't retry every frame.
                    session.stop_recording();
                }
            }
            (true, RecorderState::Recording) => {
                let output: PixelBuffer = self.pipeline.read(TargetName::Output)?;
                self.recorder.append_video(output, frame.timestamp);
            }
            (false, RecorderState::Recording) => self.stop_recording_if_released(session),
            _ => {}
        }
        Ok(())
    }

    /// Stops a running recording once the session no longer asks for it.
    fn stop_recording_if_released(&mut self, session: &Session) {
        if session.recording_requested() || self.recorder.state() != RecorderState::Recording {
            return;
        }
        match self.recorder.stop() {
            Ok(handle) => self.pending_save = Some(handle),
            Err(e) => log::warn!("failed to stop recording: {e}"),
        }
    }

    fn start_calibration(&mut self, style: WarpStyle) {
        match self.engine.begin_calibration(style) {
            Ok(()) => {
                self.mode = Mode::Calibrating {
                    style,
                    phase: CalibrationPhase::WaitingForOrientation,
                };
            }
            Err(e) => log::warn!("cannot calibrate: {e}"),
        }
    }

    fn countdown(&self, elapsed: Duration) -> Status {
        let remaining = (self.calibration.countdown_to - elapsed.as_secs_f32()).ceil();
        Status::Countdown {
            seconds: remaining.max(0.0) as u32,
        }
    }

    fn tick_calibration(
        &mut self,
        session: &Session,
        style: WarpStyle,
        phase: CalibrationPhase,
        now: Instant,
        report: &mut TickReport,
    ) -> anyhow::Result<Status> {
        self.pipeline.holding_image()?;
        self.pipeline.present()?;

        let portrait = session.orientation().is_portrait();
        let sampling = |since| Mode::Calibrating {
            style,
            phase: CalibrationPhase::Sampling { since },
        };
        let grace = |since| Mode::Calibrating {
            style,
            phase: CalibrationPhase::PortraitViolationGrace { since },
        };

        let status = match (phase, portrait) {
            (
                CalibrationPhase::WaitingForOrientation
                | CalibrationPhase::PortraitViolationGrace { .. },
                true,
            ) => {
                log::debug!("portrait orientation, (re)starting calibration samples");
                self.engine.restart_calibration();
                self.mode = sampling(now);
                self.countdown(Duration::ZERO)
            }
            (
                CalibrationPhase::WaitingForOrientation | CalibrationPhase::Sampling { .. },
                false,
            ) => {
                log::debug!("device left portrait orientation during calibration");
                self.mode = grace(now);
                Status::RotateToPortrait
            }
            (CalibrationPhase::Sampling { since }, true) => {
                self.sample(style, now.saturating_duration_since(since), now, report)?
            }
            (CalibrationPhase::PortraitViolationGrace { since }, false) => {
                let elapsed = now.saturating_duration_since(since);
                if elapsed.as_secs_f32() > self.calibration.grace {
                    log::info!("calibration aborted, device stayed rotated for {elapsed:?}");
                    self.engine.cancel_calibration();
                    self.mode = Mode::Normal;
                    Status::CalibrationAborted
                } else {
                    Status::RotateToPortrait
                }
            }
        };
        Ok(status)
    }

    fn sample(
        &mut self,
        style: WarpStyle,
        elapsed: Duration,
        now: Instant,
        report: &mut TickReport,
    ) -> anyhow::Result<Status> {
        let secs = elapsed.as_secs_f32();
        if secs >= self.calibration.finish_after {
            self.mode = Mode::Normal;
            let scale = match self.engine.finalize_calibration() {
                Ok(scale) => scale,
                Err(e) => {
                    log::error!("failed to save calibration: {e}");
                    style.scale_key().map(|key| self.engine.scale(key))
                }
            };
            return Ok(Status::Calibrated { scale });
        }

        if secs >= self.calibration.sample_after {
            let detections = self.detect()?;
            report.faces = detections.len();
            let ids = self.tracker.resolve(&detections, now);
            if let (Some(landmarks), Some(&id)) = (detections.first(), ids.first()) {
                let mut scratch = Default::default();
                let continuity = self.tracker.continuity_mut(id).unwrap_or(&mut scratch);
                self.engine.observe(landmarks, continuity)?;
            }
        }
        Ok(self.countdown(elapsed))
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use facewarp_gpu::{Dest, RecordingBackend};

    use super::*;
    use crate::{
        detector::ReplayDetector,
        landmark::random_landmarks,
        recorder::{
            testing::{Shared, TestMuxer},
            DirectoryLibrary, RecorderOptions,
        },
        session::Command,
        tracker::Continuity,
        warp::{
            calibration::ScaleKey,
            solver::{CalibratedSolver, Passthrough},
            store::MemoryStore,
            Warped,
        },
    };

    const VIDEO: Resolution = Resolution::new(64, 48);

    /// Estimates the same scale for every face.
    struct FixedEstimate(f64);

    impl CalibratedSolver for FixedEstimate {
        fn warp(&self, lm: &LandmarkSet, _: &mut Continuity, scale: &Scale) -> Warped {
            Warped {
                landmarks: lm.clone(),
                factor: scale.0[0] as f32 - 0.2,
            }
        }

        fn estimate(&self, _: &LandmarkSet, _: &mut Continuity) -> Scale {
            Scale([self.0; 6])
        }
    }

    struct Harness {
        orchestrator: Orchestrator<RecordingBackend>,
        session: Session,
        recorded: Shared,
        dir: PathBuf,
        start: Instant,
    }

    impl Harness {
        fn new(name: &str) -> Self {
            let dir = std::env::temp_dir().join(format!(
                "facewarp-orchestrator-{name}-{}",
                fastrand::u64(..)
            ));
            let config = Config::default();

            let face = random_landmarks([30.0, 20.0], 8.0);
            let detector = ReplayDetector::new(vec![vec![face]]).unwrap();
            let mut engine = WarpEngine::new(MemoryStore::new());
            engine
                .register_calibrated(WarpStyle::Pretty, FixedEstimate(1.125))
                .unwrap();
            engine.register(WarpStyle::Silly, Passthrough);

            let library = Arc::new(DirectoryLibrary::new(dir.join("library")));
            let options = RecorderOptions::from_config(&config.recorder, dir.join("recording.mp4"))
                .queue_capacity(64);
            let recorded = Shared::default();
            let recorder =
                Recorder::new(Box::new(TestMuxer(recorded.clone())), library, options).unwrap();
            let pipeline = TexturePipeline::new(
                RecordingBackend::new(Resolution::new(480, 640)),
                config.pipeline.shrink,
            );

            Self {
                orchestrator: Orchestrator::new(
                    pipeline,
                    engine,
                    Box::new(detector),
                    recorder,
                    &config,
                ),
                session: Session::new(CameraIndex::FRONT, Orientation::Portrait),
                recorded,
                dir,
                start: Instant::now(),
            }
        }

        fn tick_at(&mut self, secs: f32) -> TickReport {
            let timestamp = Duration::from_secs_f32(secs);
            let frame = CameraFrame {
                pixels: PixelBuffer::filled(VIDEO, [10, 20, 30, 255]),
                timestamp,
            };
            self.orchestrator
                .tick(&mut self.session, &frame, self.start + timestamp)
                .unwrap()
        }

        fn labels(&mut self) -> Vec<&'static str> {
            self.orchestrator
                .pipeline_mut()
                .backend_mut()
                .take_draws()
                .into_iter()
                .map(|draw| draw.label)
                .collect()
        }
    }

    impl Drop for Harness {
        fn drop(&mut self) {
            fs::remove_dir_all(&self.dir).ok();
        }
    }

    #[test]
    fn rebuilds_only_when_inputs_change() {
        let mut h = Harness::new("rebuild");
        assert!(h.tick_at(0.0).rebuilt);
        assert!(!h.tick_at(0.1).rebuilt);

        h.session.apply(Command::Orientation(Orientation::FaceUp));
        assert!(!h.tick_at(0.2).rebuilt);

        h.session.apply(Command::Orientation(Orientation::LandscapeLeft));
        assert!(h.tick_at(0.3).rebuilt);

        h.session.apply(Command::Camera(CameraIndex::BACK));
        assert!(h.tick_at(0.4).rebuilt);

        h.session
            .apply(Command::Resize(Resolution::new(1280, 720)));
        assert!(h.tick_at(0.5).rebuilt);
        assert_eq!(
            h.orchestrator.pipeline().backend().display_resolution(),
            Resolution::new(1280, 720)
        );
        assert!(!h.tick_at(0.6).rebuilt);
        assert_eq!(h.orchestrator.pipeline().rebuilds(), 4);
    }

    #[test]
    fn normal_frame_draws_style_overlays() {
        let mut h = Harness::new("normal");
        let report = h.tick_at(0.0);
        assert_eq!(report.faces, 1);
        assert_eq!(report.status, Status::Live);
        assert_eq!(
            h.labels(),
            [
                "preprocess",
                "downsample_h",
                "downsample_v",
                "blur_h",
                "blur_v",
                "composite_base",
                "present"
            ]
        );

        h.session.set_style(WarpStyle::Pretty);
        h.tick_at(0.1);
        let labels = h.labels();
        assert_eq!(
            &labels[5..],
            [
                "composite_base",
                "blur_face",
                "clear_face",
                "right_eye",
                "left_eye",
                "mouth",
                "bright_mouth",
                "present"
            ]
        );
        assert_eq!(h.orchestrator.tracker().len(), 1);
    }

    #[test]
    fn photo_is_saved_once() {
        let mut h = Harness::new("photo");
        h.session.apply(Command::CapturePhoto);
        let report = h.tick_at(0.0);
        let path = report.photo.expect("photo was not saved");
        assert!(path.starts_with(h.dir.join("library").join("facewarp")));
        let decoded = image::open(&path).unwrap().to_rgba8();
        // Output follows the upright (portrait) geometry.
        assert_eq!(decoded.dimensions(), (48, 64));
        assert_eq!(decoded.get_pixel(0, 0).0[3], 255);

        assert!(h.tick_at(0.1).photo.is_none());
    }

    #[test]
    fn calibration_follows_the_clock() {
        let mut h = Harness::new("calibrate");
        h.tick_at(0.0);
        h.session.apply(Command::Calibrate(WarpStyle::Pretty));

        // The first calibrating frame starts sampling right away in portrait.
        let report = h.tick_at(10.0);
        assert_eq!(report.status, Status::Countdown { seconds: 5 });
        assert!(matches!(
            h.orchestrator.mode(),
            Mode::Calibrating {
                style: WarpStyle::Pretty,
                phase: CalibrationPhase::Sampling { .. }
            }
        ));
        let labels = h.labels();
        assert!(labels.contains(&"holding_image"));
        assert!(!labels.contains(&"composite_base"));

        assert_eq!(h.tick_at(11.0).status, Status::Countdown { seconds: 4 });
        assert_eq!(h.orchestrator.engine().observations(), 0);
        h.tick_at(12.0);
        h.tick_at(13.5);
        assert_eq!(h.orchestrator.engine().observations(), 2);
        assert_eq!(h.tick_at(15.2).status, Status::Countdown { seconds: 0 });

        let report = h.tick_at(15.5);
        assert_eq!(
            report.status,
            Status::Calibrated {
                scale: Some(Scale([1.125; 6]))
            }
        );
        assert_eq!(h.orchestrator.mode(), Mode::Normal);
        assert_eq!(h.orchestrator.engine().scale(ScaleKey::Pretty), Scale([1.125; 6]));
    }

    #[test]
    fn calibration_survives_short_rotation() {
        let mut h = Harness::new("grace");
        h.session.apply(Command::Calibrate(WarpStyle::Pretty));
        h.tick_at(0.0);
        h.tick_at(2.5);
        assert_eq!(h.orchestrator.engine().observations(), 1);

        h.session
            .apply(Command::Orientation(Orientation::LandscapeLeft));
        assert_eq!(h.tick_at(3.0).status, Status::RotateToPortrait);
        assert_eq!(h.tick_at(5.0).status, Status::RotateToPortrait);

        // Back to portrait within the grace period restarts sampling from scratch.
        h.session.apply(Command::Orientation(Orientation::Portrait));
        assert_eq!(h.tick_at(5.5).status, Status::Countdown { seconds: 5 });
        assert_eq!(h.orchestrator.engine().observations(), 0);
        h.tick_at(7.5);
        assert_eq!(h.orchestrator.engine().observations(), 1);
    }

    #[test]
    fn calibration_aborts_after_grace() {
        let mut h = Harness::new("abort");
        h.session
            .apply(Command::Orientation(Orientation::LandscapeRight));
        h.session.apply(Command::Calibrate(WarpStyle::Pretty));
        assert_eq!(h.tick_at(0.0).status, Status::RotateToPortrait);
        assert_eq!(h.tick_at(3.0).status, Status::RotateToPortrait);
        assert_eq!(h.tick_at(3.1).status, Status::CalibrationAborted);
        assert_eq!(h.orchestrator.mode(), Mode::Normal);
        assert!(!h.orchestrator.engine().is_calibrating());
        assert_eq!(
            h.orchestrator.engine().scale(ScaleKey::Pretty),
            ScaleKey::Pretty.default_scale()
        );
    }

    #[test]
    fn uncalibrated_style_is_rejected() {
        let mut h = Harness::new("reject");
        h.session.apply(Command::Calibrate(WarpStyle::Silly));
        assert_eq!(h.tick_at(0.0).status, Status::Live);
        assert_eq!(h.orchestrator.mode(), Mode::Normal);
    }

    #[test]
    fn recording_is_started_fed_and_stopped() {
        let mut h = Harness::new("record");
        h.session.apply(Command::StartRecording);
        h.tick_at(0.0);
        assert_eq!(h.orchestrator.recorder().state(), RecorderState::Recording);
        for i in 1..5 {
            h.tick_at(i as f32 / 30.0);
        }
        h.orchestrator.on_audio(AudioSamples {
            samples: vec![0.0; 441],
            sample_rate: 44_100,
            timestamp: Duration::from_millis(40),
        });

        h.session.apply(Command::StopRecording);
        h.tick_at(0.2);
        assert_ne!(h.orchestrator.recorder().state(), RecorderState::Recording);

        let saved = (0..200)
            .find_map(|i| {
                std::thread::sleep(Duration::from_millis(5));
                h.tick_at(0.25 + i as f32 / 30.0).saved
            })
            .expect("recording was not saved");
        let path = saved.unwrap();
        assert!(path.starts_with(h.dir.join("library").join("facewarp")));
        let frames = h.recorded.video.lock().unwrap().clone();
        assert_eq!(frames.len(), 4);
        assert_eq!(frames[0], Duration::ZERO);
        assert_eq!(h.recorded.audio.lock().unwrap().len(), 1);
        assert_eq!(h.orchestrator.recorder().state(), RecorderState::Idle);

        let screen_draws = h
            .orchestrator
            .pipeline()
            .backend()
            .draws()
            .iter()
            .filter(|draw| draw.dest == Dest::Screen)
            .count();
        assert!(screen_draws > 0);
    }

    #[test]
    fn recording_stops_during_calibration() {
        let mut h = Harness::new("record-calibrate");
        h.session.apply(Command::StartRecording);
        h.tick_at(0.0);
        h.tick_at(0.1);
        assert_eq!(h.orchestrator.recorder().state(), RecorderState::Recording);

        h.session.apply(Command::Calibrate(WarpStyle::Pretty));
        h.tick_at(0.2);
        assert!(matches!(h.orchestrator.mode(), Mode::Calibrating { .. }));
        h.session.apply(Command::StopRecording);
        h.tick_at(0.3);
        assert_ne!(h.orchestrator.recorder().state(), RecorderState::Recording);

        let saved = (0..200)
            .find_map(|i| {
                std::thread::sleep(Duration::from_millis(5));
                h.tick_at(0.4 + i as f32 / 30.0).saved
            })
            .expect("recording was not saved");
        assert!(saved.is_ok());
    }

    #[test]
    fn switching_camera_forgets_faces() {
        let mut h = Harness::new("camera");
        h.tick_at(0.0);
        h.tick_at(0.1);
        let first = h.orchestrator.tracker().iter().next().unwrap().id();
        // Same camera, same face.
        h.session
            .apply(Command::Orientation(Orientation::LandscapeLeft));
        h.tick_at(0.2);
        assert_eq!(h.orchestrator.tracker().iter().next().unwrap().id(), first);

        h.session.apply(Command::Camera(CameraIndex::BACK));
        h.tick_at(0.3);
        assert_eq!(h.orchestrator.tracker().len(), 1);
        assert_ne!(h.orchestrator.tracker().iter().next().unwrap().id(), first);
    }
}
