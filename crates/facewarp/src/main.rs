//! Live face warping demo.
//!
//! Replays an animated GIF or APNG as the camera, optionally with a prerecorded landmark track as
//! the face detector, and shows the warped result in a window.
//!
//! Keys:
//!
//! * `1`-`0`: select a warp style
//! * `Space`: take a photo
//! * `R`: start or stop recording
//! * `C`: calibrate the selected style
//! * arrow keys: simulate rotating the device
//! * `Tab`: switch between front and back camera
//! * `Escape`: quit

use std::{env, sync::Arc, thread, time::Instant};

use anyhow::Context;
use crossbeam::channel::{self, TrySendError};
use facewarp::{
    config::Config,
    detector::{Detector, NoFaces, ReplayDetector},
    gpu::{CameraIndex, Gpu, Orientation, Resolution, TexturePipeline, WgpuBackend},
    orchestrator::{Orchestrator, Status, TickReport},
    recorder::{DirectoryLibrary, Mp4Muxer, Recorder, RecorderOptions},
    session::{Command, Session},
    source::{AnimationSource, FrameSource, Sample},
    warp::{store::JsonFileStore, WarpEngine, WarpStyle},
};
use winit::{
    dpi::PhysicalSize,
    event::{ElementState, Event, KeyboardInput, VirtualKeyCode, WindowEvent},
    event_loop::{ControlFlow, EventLoopBuilder},
    window::WindowBuilder,
};

const USAGE: &str = "usage: facewarp <animation.gif|animation.png> [landmarks.json]";

/// Sent by the camera thread whenever a new sample is waiting.
struct Wake;

fn main() -> anyhow::Result<()> {
    facewarp::init_logger!();

    let mut args = env::args().skip(1);
    let animation = args.next().context(USAGE)?;
    let config = Config::from_env()?;

    let mut source = AnimationSource::from_path(&animation)?
        .realtime(true)
        .with_silent_audio(config.recorder.audio_sample_rate);
    let detector: Box<dyn Detector> = match args.next() {
        Some(track) => Box::new(ReplayDetector::from_path(track)?),
        None => {
            log::info!("no landmark track given, no faces will be found");
            Box::new(NoFaces)
        }
    };

    let event_loop = EventLoopBuilder::<Wake>::with_user_event().build();
    let window = WindowBuilder::new()
        .with_title("facewarp")
        .with_inner_size(PhysicalSize::new(720, 960))
        .build(&event_loop)?;
    let size = window.inner_size();

    let instance = Gpu::new_instance();
    // Safety: `window` is moved into the event loop closure below and outlives the surface.
    let surface = unsafe { instance.create_surface(&window)? };
    let gpu = pollster::block_on(Gpu::open(instance, Some(&surface)))?;
    let display = Resolution::new(size.width, size.height);
    let backend = WgpuBackend::with_surface(gpu, surface, display)?;

    let mut engine = WarpEngine::new(JsonFileStore::open(&config.paths.store)?);
    engine.register_builtin();
    let library = Arc::new(DirectoryLibrary::new(&config.paths.library));
    if !Mp4Muxer::is_supported() {
        log::warn!("gstreamer encoders are missing, recordings will fail to start");
    }
    let recorder = Recorder::new(
        Box::new(Mp4Muxer),
        library,
        RecorderOptions::from_config(&config.recorder, &config.paths.recording),
    )?;
    let mut orchestrator = Orchestrator::new(
        TexturePipeline::new(backend, config.pipeline.shrink),
        engine,
        detector,
        recorder,
        &config,
    );
    let mut session = Session::new(source.camera(), Orientation::Portrait);

    // Frames are handed over by value; when the render thread falls behind, new ones are dropped.
    // Audio is never dropped here.
    let (frame_sender, frames) = channel::bounded(2);
    let (audio_sender, audio) = channel::unbounded();
    let proxy = event_loop.create_proxy();
    thread::Builder::new()
        .name("camera".into())
        .spawn(move || {
            while let Some(sample) = source.next_sample() {
                let sent = match sample {
                    Sample::Video(frame) => match frame_sender.try_send(frame) {
                        Ok(()) => true,
                        Err(TrySendError::Full(frame)) => {
                            let at = frame.timestamp;
                            log::trace!("render thread busy, dropping frame at {at:?}");
                            true
                        }
                        Err(TrySendError::Disconnected(_)) => false,
                    },
                    Sample::Audio(chunk) => audio_sender.send(chunk).is_ok(),
                };
                if !sent || proxy.send_event(Wake).is_err() {
                    break;
                }
            }
            log::info!("camera source exhausted");
        })?;

    let mut title = String::new();
    event_loop.run(move |event, _, flow| {
        *flow = ControlFlow::Wait;
        match event {
            Event::UserEvent(Wake) => {
                for chunk in audio.try_iter() {
                    orchestrator.on_audio(chunk);
                }
                for frame in frames.try_iter() {
                    match orchestrator.tick(&mut session, &frame, Instant::now()) {
                        Ok(report) => {
                            let new_title = window_title(&session, &report);
                            if new_title != title {
                                window.set_title(&new_title);
                                title = new_title;
                            }
                        }
                        Err(e) => {
                            log::error!("frame failed: {e:#}");
                            *flow = ControlFlow::ExitWithCode(1);
                            return;
                        }
                    }
                }
            }
            Event::WindowEvent { event, .. } => match event {
                WindowEvent::CloseRequested => *flow = ControlFlow::Exit,
                WindowEvent::Resized(size) => {
                    session.apply(Command::Resize(Resolution::new(size.width, size.height)));
                }
                WindowEvent::KeyboardInput {
                    input:
                        KeyboardInput {
                            state: ElementState::Pressed,
                            virtual_keycode: Some(VirtualKeyCode::Escape),
                            ..
                        },
                    ..
                } => *flow = ControlFlow::Exit,
                WindowEvent::KeyboardInput {
                    input:
                        KeyboardInput {
                            state: ElementState::Pressed,
                            virtual_keycode: Some(key),
                            ..
                        },
                    ..
                } => {
                    if let Some(command) = key_command(key, &session) {
                        log::debug!("{key:?} -> {command:?}");
                        session.apply(command);
                    }
                }
                _ => {}
            },
            _ => {}
        }
    });
}

fn key_command(key: VirtualKeyCode, session: &Session) -> Option<Command> {
    use VirtualKeyCode::*;

    let style = |index: usize| Some(Command::SetStyle(WarpStyle::ALL[index]));
    match key {
        Key1 => style(0),
        Key2 => style(1),
        Key3 => style(2),
        Key4 => style(3),
        Key5 => style(4),
        Key6 => style(5),
        Key7 => style(6),
        Key8 => style(7),
        Key9 => style(8),
        Key0 => style(9),
        Space => Some(Command::CapturePhoto),
        R => Some(Command::ToggleRecording),
        C => Some(Command::Calibrate(session.style())),
        Up => Some(Command::Orientation(Orientation::Portrait)),
        Down => Some(Command::Orientation(Orientation::PortraitUpsideDown)),
        Left => Some(Command::Orientation(Orientation::LandscapeLeft)),
        Right => Some(Command::Orientation(Orientation::LandscapeRight)),
        Tab => Some(Command::Camera(if session.camera().is_front() {
            CameraIndex::BACK
        } else {
            CameraIndex::FRONT
        })),
        _ => None,
    }
}

fn window_title(session: &Session, report: &TickReport) -> String {
    let status = match &report.status {
        Status::Live if session.recording_requested() => "recording".to_string(),
        Status::Live => format!("{} face(s)", report.faces),
        Status::Countdown { seconds } => format!("hold still: {seconds}"),
        Status::RotateToPortrait => "rotate back to portrait".to_string(),
        Status::Calibrated { .. } => "calibrated".to_string(),
        Status::CalibrationAborted => "calibration aborted".to_string(),
    };
    format!("facewarp - {} - {status}", session.style())
}
