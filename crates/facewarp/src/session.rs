//! User intent shared between the UI and the render loop.

use facewarp_gpu::{CameraIndex, Orientation, Resolution};

use crate::warp::WarpStyle;

/// Everything the user asked for that the render loop acts on.
///
/// The session is owned by the run loop and passed to
/// [`Orchestrator::tick`](crate::orchestrator::Orchestrator::tick) every frame. UI events either
/// call the methods here directly or arrive as [`Command`]s.
#[derive(Debug, Clone)]
pub struct Session {
    style: WarpStyle,
    capture_photo: bool,
    recording: bool,
    calibration: Option<WarpStyle>,
    orientation: Orientation,
    camera: CameraIndex,
    display: Option<Resolution>,
}

impl Session {
    pub fn new(camera: CameraIndex, orientation: Orientation) -> Self {
        let orientation = if orientation.is_definite() {
            orientation
        } else {
            Orientation::Portrait
        };
        Self {
            style: WarpStyle::None,
            capture_photo: false,
            recording: false,
            calibration: None,
            orientation,
            camera,
            display: None,
        }
    }

    pub fn style(&self) -> WarpStyle {
        self.style
    }

    pub fn set_style(&mut self, style: WarpStyle) {
        if self.style != style {
            log::debug!("style: {} -> {style}", self.style);
            self.style = style;
        }
    }

    /// Requests a photo of the next composited frame.
    pub fn start_capture_photo(&mut self) {
        self.capture_photo = true;
    }

    /// Clears and returns the pending photo request.
    pub fn take_capture_photo(&mut self) -> bool {
        std::mem::take(&mut self.capture_photo)
    }

    pub fn start_recording(&mut self) {
        self.recording = true;
    }

    pub fn stop_recording(&mut self) {
        self.recording = false;
    }

    pub fn recording_requested(&self) -> bool {
        self.recording
    }

    /// Requests calibration of the personal scale used by `style`.
    pub fn start_calibration(&mut self, style: WarpStyle) {
        self.calibration = Some(style);
    }

    pub fn take_calibration_request(&mut self) -> Option<WarpStyle> {
        self.calibration.take()
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    /// Records a device orientation change.
    ///
    /// Orientations that don't tell how the screen is held (flat or unknown) are ignored, keeping
    /// the last definite one.
    pub fn on_orientation_changed(&mut self, orientation: Orientation) {
        if orientation.is_definite() {
            self.orientation = orientation;
        } else {
            log::trace!("ignoring orientation {orientation:?}");
        }
    }

    pub fn camera(&self) -> CameraIndex {
        self.camera
    }

    pub fn on_camera_changed(&mut self, camera: CameraIndex) {
        self.camera = camera;
    }

    /// Records a new display size, applied by the render loop on the next frame.
    pub fn on_display_resized(&mut self, size: Resolution) {
        self.display = Some(size);
    }

    pub fn take_display_size(&mut self) -> Option<Resolution> {
        self.display.take()
    }

    /// Applies a [`Command`].
    pub fn apply(&mut self, command: Command) {
        match command {
            Command::SetStyle(style) => self.set_style(style),
            Command::CapturePhoto => self.start_capture_photo(),
            Command::StartRecording => self.start_recording(),
            Command::StopRecording => self.stop_recording(),
            Command::ToggleRecording => self.recording = !self.recording,
            Command::Calibrate(style) => self.start_calibration(style),
            Command::Orientation(orientation) => self.on_orientation_changed(orientation),
            Command::Camera(camera) => self.on_camera_changed(camera),
            Command::Resize(size) => self.on_display_resized(size),
        }
    }
}

/// A session operation sent to the render loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    SetStyle(WarpStyle),
    CapturePhoto,
    StartRecording,
    StopRecording,
    ToggleRecording,
    Calibrate(WarpStyle),
    Orientation(Orientation),
    Camera(CameraIndex),
    Resize(Resolution),
}
