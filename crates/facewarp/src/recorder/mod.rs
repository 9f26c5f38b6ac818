//! Records the composited output and the camera audio into a container and files it into the
//! media library.
//!
//! Video and audio are appended on two independent queues, each running on its own thread, so
//! that a slow encoder never stalls the render thread: when a queue is full, the sample is
//! dropped. Stopping a recording hands both queues and the container to a third queue, which
//! enqueues a finish marker on each track, waits for both, finalizes the container and imports it.

pub mod container;
pub mod library;
#[cfg(test)]
pub(crate) mod testing;

use std::{
    io,
    panic::{catch_unwind, AssertUnwindSafe},
    path::{Path, PathBuf},
    sync::{Arc, Mutex, OnceLock},
    time::Duration,
};

use facewarp_gpu::PixelBuffer;

use crate::{
    config::RecorderConfig,
    source::AudioSamples,
    worker::{promise, Promise, PromiseHandle, Worker},
};

pub use container::{
    AudioParams, Container, ContainerError, Finalizer, Mp4Muxer, Muxer, TrackWriter, VideoParams,
};
pub use library::{DirectoryLibrary, LibraryError, MediaLibrary};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Idle,
    Preparing,
    Recording,
    Writing,
    /// The last recording could not be opened or finished. A new one can be started.
    Error,
}

#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    #[error("cannot start a recording while {0:?}")]
    Busy(RecorderState),
    #[error("no recording in progress")]
    NotRecording,
    #[error("failed to delete stale recording: {0}")]
    Stale(#[source] LibraryError),
    #[error("failed to open container: {0}")]
    Open(#[source] ContainerError),
    #[error("failed to finish {track} track: {source}")]
    Track {
        track: &'static str,
        source: ContainerError,
    },
    #[error("failed to finalize container: {0}")]
    Finalize(#[source] ContainerError),
    #[error(transparent)]
    Library(#[from] LibraryError),
    #[error("failed to spawn recorder thread: {0}")]
    Spawn(#[from] io::Error),
    #[error("{0} queue exited before finishing")]
    QueueLost(&'static str),
}

/// Where and how the [`Recorder`] writes.
#[derive(Debug, Clone)]
pub struct RecorderOptions {
    path: PathBuf,
    album: String,
    queue_capacity: usize,
    video_bitrate: u32,
    audio: AudioParams,
}

impl RecorderOptions {
    /// Creates options that write the container to `path` before importing it.
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self::from_config(&RecorderConfig::default(), path)
    }

    pub fn from_config<P: Into<PathBuf>>(config: &RecorderConfig, path: P) -> Self {
        Self {
            path: path.into(),
            album: config.album.clone(),
            queue_capacity: config.queue_capacity,
            video_bitrate: config.video_bitrate,
            audio: AudioParams {
                channels: 1,
                sample_rate: config.audio_sample_rate,
                bitrate: config.audio_bitrate,
            },
        }
    }

    /// Sets the media-library collection recordings are imported into.
    pub fn album<A: Into<String>>(self, album: A) -> Self {
        Self {
            album: album.into(),
            ..self
        }
    }

    /// Sets how many samples each append queue holds before new ones are dropped.
    pub fn queue_capacity(self, queue_capacity: usize) -> Self {
        Self {
            queue_capacity,
            ..self
        }
    }

    /// Sets the target video bitrate in bits per second.
    pub fn video_bitrate(self, video_bitrate: u32) -> Self {
        Self {
            video_bitrate,
            ..self
        }
    }

    pub fn audio(self, audio: AudioParams) -> Self {
        Self { audio, ..self }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

enum TrackMsg<S> {
    Sample(S, Duration),
    Finish(Promise<Result<(), ContainerError>>),
}

/// The queues of the recording in progress.
struct Active {
    video: Worker<TrackMsg<PixelBuffer>>,
    audio: Worker<TrackMsg<AudioSamples>>,
    finalizer: Box<dyn Finalizer>,
    /// Source timestamp of the first sample; presentation times are relative to it.
    start: Arc<OnceLock<Duration>>,
}

struct FinalizeJob {
    video: Worker<TrackMsg<PixelBuffer>>,
    audio: Worker<TrackMsg<AudioSamples>>,
    finalizer: Box<dyn Finalizer>,
    result: Promise<Result<PathBuf, RecorderError>>,
}

/// Writes recordings of the output video and the camera audio.
pub struct Recorder {
    muxer: Box<dyn Muxer>,
    library: Arc<dyn MediaLibrary>,
    options: RecorderOptions,
    state: Arc<Mutex<RecorderState>>,
    active: Option<Active>,
    finalize: Worker<FinalizeJob>,
}

impl Recorder {
    pub fn new(
        muxer: Box<dyn Muxer>,
        library: Arc<dyn MediaLibrary>,
        options: RecorderOptions,
    ) -> Result<Self, RecorderError> {
        let state = Arc::new(Mutex::new(RecorderState::Idle));
        let finalize = Worker::builder()
            .name("recorder finalize")
            .capacity(1)
            .spawn({
                let state = state.clone();
                let library = library.clone();
                let album = options.album.clone();
                move |job: FinalizeJob| {
                    let FinalizeJob {
                        video,
                        audio,
                        finalizer,
                        result,
                    } = job;

                    let res = finish(video, audio, finalizer)
                        .and_then(|path| {
                            library.ensure_collection(&album)?;
                            Ok(library.import(&album, &path)?)
                        });
                    *state.lock().unwrap() = match &res {
                        Ok(path) => {
                            log::info!("recording saved to '{}'", path.display());
                            RecorderState::Idle
                        }
                        Err(e) => {
                            log::error!("failed to save recording: {e}");
                            RecorderState::Error
                        }
                    };
                    result.fulfill(res);
                }
            })?;

        Ok(Self {
            muxer,
            library,
            options,
            state,
            active: None,
            finalize,
        })
    }

    pub fn state(&self) -> RecorderState {
        *self.state.lock().unwrap()
    }

    fn set_state(&self, state: RecorderState) {
        log::debug!("recorder: {state:?}");
        *self.state.lock().unwrap() = state;
    }

    pub fn library(&self) -> &Arc<dyn MediaLibrary> {
        &self.library
    }

    pub fn options(&self) -> &RecorderOptions {
        &self.options
    }

    /// Source timestamp that the current recording started at, once the first sample arrived.
    pub fn start_time(&self) -> Option<Duration> {
        self.active
            .as_ref()
            .and_then(|active| active.start.get().copied())
    }

    /// Starts a new recording of `width`×`height` video and mono audio.
    ///
    /// Only allowed while [`RecorderState::Idle`] or [`RecorderState::Error`]. A container that
    /// fails to open puts the recorder into [`RecorderState::Error`].
    pub fn start(&mut self, width: u32, height: u32) -> Result<(), RecorderError> {
        let state = self.state();
        if !matches!(state, RecorderState::Idle | RecorderState::Error) {
            return Err(RecorderError::Busy(state));
        }

        self.set_state(RecorderState::Preparing);
        let video = VideoParams {
            width,
            height,
            bitrate: self.options.video_bitrate,
        };
        match self.open(video) {
            Ok(active) => {
                self.active = Some(active);
                self.set_state(RecorderState::Recording);
                log::info!(
                    "recording {width}x{height} to '{}'",
                    self.options.path.display()
                );
                Ok(())
            }
            Err(e) => {
                log::error!("failed to start recording: {e}");
                self.set_state(RecorderState::Error);
                Err(e)
            }
        }
    }

    fn open(&mut self, video: VideoParams) -> Result<Active, RecorderError> {
        let path = &self.options.path;
        library::remove_any(path).map_err(RecorderError::Stale)?;
        let container = self
            .muxer
            .open(path, video, self.options.audio)
            .map_err(RecorderError::Open)?;

        let start = Arc::new(OnceLock::new());
        let capacity = self.options.queue_capacity;
        Ok(Active {
            video: spawn_track("video", capacity, container.video, start.clone())?,
            audio: spawn_track("audio", capacity, container.audio, start.clone())?,
            finalizer: container.finalizer,
            start,
        })
    }

    /// Queues a video frame. Returns whether the frame was accepted.
    ///
    /// Frames are only accepted while recording, and are dropped when the video queue is full.
    pub fn append_video(&mut self, frame: PixelBuffer, timestamp: Duration) -> bool {
        let Some(active) = &mut self.active else {
            return false;
        };
        active.start.get_or_init(|| timestamp);
        match active.video.try_send(TrackMsg::Sample(frame, timestamp)) {
            Ok(()) => true,
            Err(_) => {
                log::trace!("video queue full, dropping frame at {timestamp:?}");
                false
            }
        }
    }

    /// Queues a chunk of audio. Returns whether it was accepted.
    ///
    /// Audio is only accepted while recording, and is dropped when the audio queue is full.
    pub fn append_audio(&mut self, audio: AudioSamples) -> bool {
        let Some(active) = &mut self.active else {
            return false;
        };
        let timestamp = audio.timestamp;
        active.start.get_or_init(|| timestamp);
        match active.audio.try_send(TrackMsg::Sample(audio, timestamp)) {
            Ok(()) => true,
            Err(_) => {
                log::trace!("audio queue full, dropping samples at {timestamp:?}");
                false
            }
        }
    }

    /// Stops the recording in progress.
    ///
    /// Samples queued before this call are still written. The returned handle resolves to the
    /// location of the imported recording once it has been finalized.
    ///
    /// Never blocks: waiting for the track queues to drain happens on the finalize queue.
    pub fn stop(&mut self) -> Result<PromiseHandle<Result<PathBuf, RecorderError>>, RecorderError> {
        let Some(active) = self.active.take() else {
            return Err(RecorderError::NotRecording);
        };
        self.set_state(RecorderState::Writing);

        let Active {
            video,
            audio,
            finalizer,
            ..
        } = active;
        let (result, handle) = promise();
        let job = FinalizeJob {
            video,
            audio,
            finalizer,
            result,
        };
        // At most one recording is finalizing at a time, so the slot is free.
        if self.finalize.try_send(job).is_err() {
            log::error!("finalize queue is occupied, recording is lost");
            self.set_state(RecorderState::Error);
            return Err(RecorderError::QueueLost("finalize"));
        }
        Ok(handle)
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        if self.active.is_some() {
            log::warn!("recorder dropped while recording, finishing the recording");
            self.stop().ok();
        }
    }
}

fn spawn_track<S: Send + 'static>(
    name: &'static str,
    capacity: usize,
    mut writer: Box<dyn TrackWriter<S>>,
    start: Arc<OnceLock<Duration>>,
) -> io::Result<Worker<TrackMsg<S>>> {
    Worker::builder()
        .name(format!("recorder {name}"))
        .capacity(capacity)
        .spawn(move |msg| match msg {
            TrackMsg::Sample(sample, timestamp) => {
                if !writer.is_ready() {
                    log::trace!("{name} track not ready, dropping sample at {timestamp:?}");
                    return;
                }
                let start = start.get().copied().unwrap_or(timestamp);
                let Some(pts) = timestamp.checked_sub(start) else {
                    log::trace!("dropping {name} sample from before the recording started");
                    return;
                };
                if let Err(e) = writer.append(&sample, pts) {
                    log::warn!("failed to append {name} sample: {e}");
                }
            }
            TrackMsg::Finish(done) => done.fulfill(writer.finish()),
        })
}

fn finish(
    video: Worker<TrackMsg<PixelBuffer>>,
    audio: Worker<TrackMsg<AudioSamples>>,
    finalizer: Box<dyn Finalizer>,
) -> Result<PathBuf, RecorderError> {
    let video_done = finish_track("video", video)?;
    let audio_done = finish_track("audio", audio)?;

    video_done
        .block()
        .map_err(|_| RecorderError::QueueLost("video"))?
        .map_err(|source| RecorderError::Track {
            track: "video",
            source,
        })?;
    audio_done
        .block()
        .map_err(|_| RecorderError::QueueLost("audio"))?
        .map_err(|source| RecorderError::Track {
            track: "audio",
            source,
        })?;

    finalizer.finalize().map_err(RecorderError::Finalize)
}

/// Queues the finish marker behind every sample accepted before the stop, then joins the queue.
///
/// Fails if the track's thread panicked.
fn finish_track<S: Send + 'static>(
    name: &'static str,
    mut track: Worker<TrackMsg<S>>,
) -> Result<PromiseHandle<Result<(), ContainerError>>, RecorderError> {
    let (promise, done) = promise();
    catch_unwind(AssertUnwindSafe(move || {
        track.send(TrackMsg::Finish(promise));
        drop(track);
    }))
    .map_err(|_| RecorderError::QueueLost(name))?;
    Ok(done)
}

#[cfg(test)]
mod tests {
    use std::{fs, sync::atomic::Ordering};

    use facewarp_gpu::Resolution;

    use super::{
        testing::{Shared, TestMuxer},
        *,
    };

    fn recorder(name: &str) -> (Recorder, Shared, PathBuf) {
        recorder_with_capacity(name, 64)
    }

    fn recorder_with_capacity(name: &str, capacity: usize) -> (Recorder, Shared, PathBuf) {
        let dir = std::env::temp_dir()
            .join(format!("facewarp-recorder-{name}-{}", fastrand::u64(..)));
        let shared = Shared::default();
        let library = Arc::new(DirectoryLibrary::new(dir.join("library")));
        let options = RecorderOptions::new(dir.join("staging").join("movie.bin"))
            .album("tests")
            .queue_capacity(capacity);
        let muxer = Box::new(TestMuxer(shared.clone()));
        let recorder = Recorder::new(muxer, library, options).unwrap();
        (recorder, shared, dir)
    }

    fn frame() -> PixelBuffer {
        PixelBuffer::filled(Resolution::new(2, 2), [0; 4])
    }

    fn audio(ms: u64) -> AudioSamples {
        AudioSamples {
            samples: vec![0.0; 16],
            sample_rate: 44_100,
            timestamp: Duration::from_millis(ms),
        }
    }

    #[test]
    fn first_sample_latches_start_time() {
        let (mut recorder, shared, dir) = recorder("latch");
        assert!(!recorder.append_video(frame(), Duration::from_secs(1)));

        recorder.start(2, 2).unwrap();
        assert_eq!(recorder.state(), RecorderState::Recording);
        assert!(recorder.append_audio(audio(5000)));
        assert_eq!(recorder.start_time(), Some(Duration::from_secs(5)));
        // Earlier than the latch: accepted by the queue but never written.
        assert!(recorder.append_video(frame(), Duration::from_millis(4900)));
        assert!(recorder.append_video(frame(), Duration::from_millis(6000)));
        assert!(recorder.append_audio(audio(5500)));

        let path = recorder.stop().unwrap().block().unwrap().unwrap();
        assert_eq!(recorder.state(), RecorderState::Idle);
        assert!(path.starts_with(dir.join("library").join("tests")));
        assert!(path.is_file());
        assert_eq!(*shared.video.lock().unwrap(), [Duration::from_secs(1)]);
        assert_eq!(
            *shared.audio.lock().unwrap(),
            [Duration::ZERO, Duration::from_millis(500)]
        );
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn samples_are_dropped_while_track_is_not_ready() {
        let (mut recorder, shared, dir) = recorder("not-ready");
        shared.not_ready.store(true, Ordering::SeqCst);
        recorder.start(2, 2).unwrap();
        for i in 0..5 {
            recorder.append_video(frame(), Duration::from_millis(i * 33));
            recorder.append_audio(audio(i * 33));
        }
        recorder.stop().unwrap().block().unwrap().unwrap();
        assert!(shared.video.lock().unwrap().is_empty());
        assert!(shared.audio.lock().unwrap().is_empty());
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn failed_open_enters_error_state() {
        let (mut recorder, shared, dir) = recorder("open");
        shared.fail_open.store(true, Ordering::SeqCst);
        assert!(matches!(recorder.start(2, 2), Err(RecorderError::Open(_))));
        assert_eq!(recorder.state(), RecorderState::Error);
        assert!(!recorder.append_video(frame(), Duration::ZERO));
        assert!(matches!(recorder.stop(), Err(RecorderError::NotRecording)));

        shared.fail_open.store(false, Ordering::SeqCst);
        recorder.start(2, 2).unwrap();
        assert_eq!(recorder.state(), RecorderState::Recording);
        recorder.stop().unwrap().block().unwrap().unwrap();
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn cannot_start_while_writing() {
        let (mut recorder, shared, dir) = recorder("writing");
        let (gate, gate_handle) = promise();
        *shared.finalize_gate.lock().unwrap() = Some(gate_handle);

        recorder.start(2, 2).unwrap();
        assert!(matches!(
            recorder.start(2, 2),
            Err(RecorderError::Busy(RecorderState::Recording))
        ));
        let handle = recorder.stop().unwrap();
        assert_eq!(recorder.state(), RecorderState::Writing);
        assert!(matches!(
            recorder.start(2, 2),
            Err(RecorderError::Busy(RecorderState::Writing))
        ));

        gate.fulfill(());
        handle.block().unwrap().unwrap();
        assert_eq!(recorder.state(), RecorderState::Idle);
        recorder.start(2, 2).unwrap();
        drop(recorder);
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn stop_does_not_wait_for_a_busy_track() {
        let (mut recorder, shared, dir) = recorder_with_capacity("busy", 1);
        let (gate, gate_handle) = promise();
        *shared.append_gate.lock().unwrap() = Some(gate_handle);

        recorder.start(2, 2).unwrap();
        // The first frame stalls the video track; later ones fill its queue or are dropped.
        for i in 0..4 {
            recorder.append_video(frame(), Duration::from_millis(i * 33));
        }
        let handle = recorder.stop().unwrap();
        assert_eq!(recorder.state(), RecorderState::Writing);
        let Err(handle) = handle.block_timeout(Duration::from_millis(50)) else {
            panic!("recording finished while its video track was stalled");
        };

        gate.fulfill(());
        handle.block().unwrap().unwrap();
        assert_eq!(recorder.state(), RecorderState::Idle);
        assert!(!shared.video.lock().unwrap().is_empty());
        fs::remove_dir_all(&dir).ok();
    }
}
