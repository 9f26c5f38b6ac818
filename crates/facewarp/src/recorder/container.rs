//! Media containers the recorder writes into.

use std::{
    fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use facewarp_gpu::{PixelBuffer, Resolution};
use gstreamer as gst;
use gstreamer::prelude::{Cast, ElementExt, GstBinExt, ObjectExt};
use gstreamer_app as gst_app;

use crate::source::AudioSamples;

#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    #[error("I/O error on '{}': {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
    #[error("video frame is {got}, but the track was opened for {expected}")]
    FrameSize { expected: Resolution, got: Resolution },
    #[error("audio is sampled at {got} Hz, but the track was opened for {expected} Hz")]
    SampleRate { expected: u32, got: u32 },
    #[error("track was already finished")]
    Finished,
    #[error("gstreamer element '{0}' is not installed")]
    MissingElement(&'static str),
    #[error(transparent)]
    Glib(#[from] gst::glib::Error),
    #[error(transparent)]
    Flow(#[from] gst::FlowError),
    #[error(transparent)]
    StateChange(#[from] gst::StateChangeError),
    #[error("encoding pipeline failed: {0}")]
    Pipeline(String),
}

/// Parameters of the video stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoParams {
    pub width: u32,
    pub height: u32,
    /// Target bitrate in bits per second.
    pub bitrate: u32,
}

/// Parameters of the (mono) audio stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioParams {
    pub channels: u16,
    pub sample_rate: u32,
    /// Target bitrate in bits per second.
    pub bitrate: u32,
}

/// One stream of an open container.
pub trait TrackWriter<S: ?Sized>: Send {
    /// Whether the track can take another sample right now.
    ///
    /// Samples offered while a track is not ready are dropped by the caller.
    fn is_ready(&self) -> bool;

    /// Appends a sample at `pts`, relative to the start of the recording.
    fn append(&mut self, sample: &S, pts: Duration) -> Result<(), ContainerError>;

    /// Marks the track as complete. No samples may be appended afterwards.
    fn finish(&mut self) -> Result<(), ContainerError>;
}

/// Completes a container once all of its tracks are finished.
pub trait Finalizer: Send {
    /// Writes any trailing data and returns the path of the finished file.
    fn finalize(self: Box<Self>) -> Result<PathBuf, ContainerError>;
}

/// An open container with one video and one audio track.
pub struct Container {
    pub video: Box<dyn TrackWriter<PixelBuffer>>,
    pub audio: Box<dyn TrackWriter<AudioSamples>>,
    pub finalizer: Box<dyn Finalizer>,
}

/// Creates containers.
pub trait Muxer: Send {
    /// Opens a new container at `path`, which must not exist yet.
    fn open(
        &mut self,
        path: &Path,
        video: VideoParams,
        audio: AudioParams,
    ) -> Result<Container, ContainerError>;
}

/// AAC encoders in order of preference. All of them take their bitrate in bits per second.
const AAC_ENCODERS: &[&str] = &["avenc_aac", "voaacenc", "fdkaacenc"];

const REQUIRED: &[&str] = &[
    "appsrc",
    "videoconvert",
    "x264enc",
    "h264parse",
    "audioconvert",
    "audioresample",
    "aacparse",
    "mp4mux",
    "filesink",
];

/// How many frames the video track buffers before it reports not being ready.
const TRACK_DEPTH: u64 = 4;

/// How long finalizing waits for the muxer to write the trailer, in seconds.
const EOS_TIMEOUT_SECS: u64 = 10;

/// Writes MPEG-4 files with H.264 video and AAC audio through a GStreamer pipeline.
#[derive(Debug, Default)]
pub struct Mp4Muxer;

impl Mp4Muxer {
    /// Whether GStreamer and every element the pipeline needs are installed.
    pub fn is_supported() -> bool {
        if let Err(e) = gst::init() {
            log::debug!("gstreamer unavailable: {e}");
            return false;
        }
        let missing: Vec<_> = REQUIRED
            .iter()
            .filter(|name| gst::ElementFactory::find(name).is_none())
            .collect();
        if !missing.is_empty() {
            log::debug!("missing gstreamer elements: {missing:?}");
            return false;
        }
        aac_encoder().is_some()
    }
}

fn aac_encoder() -> Option<&'static str> {
    AAC_ENCODERS
        .iter()
        .copied()
        .find(|name| gst::ElementFactory::find(name).is_some())
}

fn app_src(pipeline: &gst::Pipeline, name: &str) -> Result<gst_app::AppSrc, ContainerError> {
    pipeline
        .by_name(name)
        .and_then(|element| element.downcast::<gst_app::AppSrc>().ok())
        .ok_or(ContainerError::MissingElement("appsrc"))
}

impl Muxer for Mp4Muxer {
    fn open(
        &mut self,
        path: &Path,
        video: VideoParams,
        audio: AudioParams,
    ) -> Result<Container, ContainerError> {
        gst::init()?;
        let aac = aac_encoder().ok_or(ContainerError::MissingElement("aac encoder"))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ContainerError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let launch = format!(
            "appsrc name=video format=time \
             caps=video/x-raw,format=RGBA,width={w},height={h},framerate=30/1 \
             ! queue ! videoconvert ! video/x-raw,format=I420 \
             ! x264enc bitrate={kbps} speed-preset=veryfast tune=zerolatency \
             ! h264parse ! queue ! mux. \
             appsrc name=audio format=time \
             caps=audio/x-raw,format=F32LE,layout=interleaved,rate={rate},channels={channels} \
             ! queue ! audioconvert ! audioresample ! {aac} bitrate={bps} \
             ! aacparse ! queue ! mux. \
             mp4mux name=mux ! filesink name=sink",
            w = video.width,
            h = video.height,
            kbps = (video.bitrate / 1000).max(1),
            rate = audio.sample_rate,
            channels = audio.channels,
            bps = audio.bitrate,
        );
        log::trace!("gstreamer pipeline: {launch}");
        let pipeline = gst::parse::launch(&launch)?
            .downcast::<gst::Pipeline>()
            .map_err(|_| ContainerError::Pipeline("launch line is not a pipeline".into()))?;

        let sink = pipeline
            .by_name("sink")
            .ok_or(ContainerError::MissingElement("filesink"))?;
        sink.set_property("location", path.to_string_lossy().into_owned());

        let video_src = app_src(&pipeline, "video")?;
        let frame_bytes = u64::from(video.width) * u64::from(video.height) * 4;
        video_src.set_max_bytes(frame_bytes * TRACK_DEPTH);
        let audio_src = app_src(&pipeline, "audio")?;
        // Half a second of audio.
        let second_bytes = u64::from(audio.sample_rate) * u64::from(audio.channels) * 4;
        audio_src.set_max_bytes((second_bytes / 2).max(4));

        pipeline.set_state(gst::State::Playing)?;
        log::debug!(
            "opened {}x{} mp4 container at '{}' ({aac})",
            video.width,
            video.height,
            path.display()
        );

        Ok(Container {
            video: Box::new(VideoTrack {
                src: video_src,
                expected: Resolution::new(video.width, video.height),
                pushed: false,
                finished: false,
            }),
            audio: Box::new(AudioTrack {
                src: audio_src,
                params: audio,
                pushed: false,
                finished: false,
            }),
            finalizer: Box::new(Mp4Finalizer {
                pipeline,
                path: path.to_path_buf(),
            }),
        })
    }
}

fn is_ready(src: &gst_app::AppSrc) -> bool {
    src.current_level_bytes() < src.max_bytes()
}

fn clock_time(pts: Duration) -> gst::ClockTime {
    gst::ClockTime::from_nseconds(pts.as_nanos() as u64)
}

struct VideoTrack {
    src: gst_app::AppSrc,
    expected: Resolution,
    pushed: bool,
    finished: bool,
}

impl VideoTrack {
    fn push(&mut self, data: Vec<u8>, pts: Duration) -> Result<(), ContainerError> {
        let mut buffer = gst::Buffer::from_mut_slice(data);
        if let Some(buffer) = buffer.get_mut() {
            buffer.set_pts(clock_time(pts));
        }
        self.src.push_buffer(buffer)?;
        self.pushed = true;
        Ok(())
    }
}

impl TrackWriter<PixelBuffer> for VideoTrack {
    fn is_ready(&self) -> bool {
        !self.finished && is_ready(&self.src)
    }

    fn append(&mut self, frame: &PixelBuffer, pts: Duration) -> Result<(), ContainerError> {
        if self.finished {
            return Err(ContainerError::Finished);
        }
        if frame.resolution() != self.expected {
            return Err(ContainerError::FrameSize {
                expected: self.expected,
                got: frame.resolution(),
            });
        }
        self.push(frame.data().to_vec(), pts)
    }

    fn finish(&mut self) -> Result<(), ContainerError> {
        if self.finished {
            return Err(ContainerError::Finished);
        }
        self.finished = true;
        if !self.pushed {
            // The muxer cannot write a track that never saw a sample.
            log::debug!("no video was recorded, writing a black frame");
            let black = PixelBuffer::filled(self.expected, [0, 0, 0, 255]);
            self.push(black.into_data(), Duration::ZERO)?;
        }
        self.src.end_of_stream()?;
        Ok(())
    }
}

struct AudioTrack {
    src: gst_app::AppSrc,
    params: AudioParams,
    pushed: bool,
    finished: bool,
}

impl AudioTrack {
    fn push(&mut self, samples: &[f32], pts: Duration) -> Result<(), ContainerError> {
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        let frames = samples.len() as u64 / u64::from(self.params.channels.max(1));
        let duration = Duration::from_secs_f64(frames as f64 / f64::from(self.params.sample_rate));

        let mut buffer = gst::Buffer::from_mut_slice(bytes);
        if let Some(buffer) = buffer.get_mut() {
            buffer.set_pts(clock_time(pts));
            buffer.set_duration(clock_time(duration));
        }
        self.src.push_buffer(buffer)?;
        self.pushed = true;
        Ok(())
    }
}

impl TrackWriter<AudioSamples> for AudioTrack {
    fn is_ready(&self) -> bool {
        !self.finished && is_ready(&self.src)
    }

    fn append(&mut self, audio: &AudioSamples, pts: Duration) -> Result<(), ContainerError> {
        if self.finished {
            return Err(ContainerError::Finished);
        }
        if audio.sample_rate != self.params.sample_rate {
            return Err(ContainerError::SampleRate {
                expected: self.params.sample_rate,
                got: audio.sample_rate,
            });
        }
        self.push(&audio.samples, pts)
    }

    fn finish(&mut self) -> Result<(), ContainerError> {
        if self.finished {
            return Err(ContainerError::Finished);
        }
        self.finished = true;
        if !self.pushed {
            log::debug!("no audio was recorded, writing silence");
            let silence = vec![0.0; (self.params.sample_rate / 100) as usize];
            self.push(&silence, Duration::ZERO)?;
        }
        self.src.end_of_stream()?;
        Ok(())
    }
}

struct Mp4Finalizer {
    pipeline: gst::Pipeline,
    path: PathBuf,
}

impl Finalizer for Mp4Finalizer {
    fn finalize(self: Box<Self>) -> Result<PathBuf, ContainerError> {
        let bus = self
            .pipeline
            .bus()
            .ok_or_else(|| ContainerError::Pipeline("pipeline has no bus".into()))?;
        let msg = bus.timed_pop_filtered(
            gst::ClockTime::from_seconds(EOS_TIMEOUT_SECS),
            &[gst::MessageType::Eos, gst::MessageType::Error],
        );
        let res = match msg.as_ref().map(|msg| msg.view()) {
            Some(gst::MessageView::Eos(..)) => Ok(()),
            Some(gst::MessageView::Error(err)) => Err(ContainerError::Pipeline(format!(
                "{} ({:?})",
                err.error(),
                err.debug()
            ))),
            _ => Err(ContainerError::Pipeline(format!(
                "muxer did not finish within {EOS_TIMEOUT_SECS} s"
            ))),
        };
        self.pipeline.set_state(gst::State::Null)?;
        res?;

        log::debug!("finalized '{}'", self.path.display());
        Ok(self.path.clone())
    }
}

impl Drop for Mp4Finalizer {
    fn drop(&mut self) {
        self.pipeline.set_state(gst::State::Null).ok();
    }
}
