//! Camera sample sources.

use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
    thread,
    time::{Duration, Instant},
};

use anyhow::bail;
use facewarp_gpu::{CameraIndex, PixelBuffer, Resolution};
use image::{
    codecs::{gif::GifDecoder, png::PngDecoder},
    AnimationDecoder,
};

/// A video frame delivered by a camera.
#[derive(Debug, Clone)]
pub struct CameraFrame {
    pub pixels: PixelBuffer,
    /// Presentation time, relative to an arbitrary but fixed origin of the source.
    pub timestamp: Duration,
}

/// A chunk of mono audio delivered alongside the video.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSamples {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    /// Presentation time of the first sample.
    pub timestamp: Duration,
}

impl AudioSamples {
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / f64::from(self.sample_rate))
    }
}

#[derive(Debug, Clone)]
pub enum Sample {
    Video(CameraFrame),
    Audio(AudioSamples),
}

/// Something that produces camera samples, such as a webcam or a video file.
pub trait FrameSource: Send {
    /// The camera that is producing the samples.
    fn camera(&self) -> CameraIndex;

    /// Blocks until the next sample is available.
    ///
    /// Returns `None` when the source is exhausted.
    fn next_sample(&mut self) -> Option<Sample>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum AnimationFormat {
    Gif,
    Apng,
}

/// Frames with a delay of 0 are shown for this long, like browsers do.
const ZERO_DELAY: Duration = Duration::from_millis(100);

/// Replays an animated image as if it were a camera.
///
/// Each frame is delivered at its own delay. Optionally, a silent audio chunk covering each
/// frame's display time is delivered after it, so that recordings get an audio track.
pub struct AnimationSource {
    frames: Vec<(PixelBuffer, Duration)>,
    camera: CameraIndex,
    looping: bool,
    realtime: bool,
    audio_rate: Option<u32>,
    next: usize,
    clock: Duration,
    pending_audio: Option<AudioSamples>,
    start: Option<Instant>,
}

impl AnimationSource {
    /// Loads an animation from the filesystem.
    ///
    /// The path must have a `gif`, `png` or `apng` extension.
    pub fn from_path<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        Self::from_path_impl(path.as_ref())
    }

    fn from_path_impl(path: &Path) -> anyhow::Result<Self> {
        let format = match path.extension() {
            Some(ext) if ext == "gif" => AnimationFormat::Gif,
            Some(ext) if ext == "apng" || ext == "png" => AnimationFormat::Apng,
            Some(ext) => bail!(
                "file extension `{}` is not supported for animations",
                ext.to_string_lossy()
            ),
            None => bail!("animation path must have a supported extension"),
        };

        let this = Self::from_reader(BufReader::new(File::open(path)?), format)?;
        log::info!(
            "loaded {} animation frames from '{}'",
            this.frames.len(),
            path.display()
        );
        Ok(this)
    }

    /// Decodes an animation from a [`BufRead`] implementor.
    pub fn from_reader<R: BufRead>(mut reader: R, format: AnimationFormat) -> anyhow::Result<Self> {
        Self::from_reader_impl(&mut reader, format)
    }

    fn from_reader_impl(reader: &mut dyn BufRead, format: AnimationFormat) -> anyhow::Result<Self> {
        let frames = match format {
            AnimationFormat::Gif => GifDecoder::new(reader)?.into_frames(),
            AnimationFormat::Apng => {
                let dec = PngDecoder::new(reader)?;
                if !dec.is_apng() {
                    bail!("attempted to load APNG animation from still image PNG");
                }
                dec.apng().into_frames()
            }
        };

        let frames = frames
            .map(|res| {
                let frame = res?;
                let delay = Duration::from(frame.delay());
                let buffer = frame.into_buffer();
                let res = Resolution::new(buffer.width(), buffer.height());
                Ok((PixelBuffer::new(res, buffer.into_raw())?, delay))
            })
            .collect::<anyhow::Result<_>>()?;

        Self::from_frames(frames)
    }

    /// Creates a source from decoded frames and their display durations.
    pub fn from_frames(frames: Vec<(PixelBuffer, Duration)>) -> anyhow::Result<Self> {
        if frames.is_empty() {
            bail!("animation has no frames");
        }
        let frames = frames
            .into_iter()
            .map(|(image, delay)| {
                let delay = if delay.is_zero() { ZERO_DELAY } else { delay };
                (image, delay)
            })
            .collect();

        Ok(Self {
            frames,
            camera: CameraIndex::FRONT,
            looping: true,
            realtime: false,
            audio_rate: None,
            next: 0,
            clock: Duration::ZERO,
            pending_audio: None,
            start: None,
        })
    }

    /// Sets the camera the frames pretend to come from. Defaults to [`CameraIndex::FRONT`].
    pub fn with_camera(self, camera: CameraIndex) -> Self {
        Self { camera, ..self }
    }

    /// Sets whether the animation restarts after its last frame. Defaults to `true`.
    pub fn looping(self, looping: bool) -> Self {
        Self { looping, ..self }
    }

    /// Sets whether [`FrameSource::next_sample`] sleeps until each sample is due.
    ///
    /// Defaults to `false`, delivering samples as fast as they are requested.
    pub fn realtime(self, realtime: bool) -> Self {
        Self { realtime, ..self }
    }

    /// Delivers silent audio at `sample_rate` alongside the frames.
    pub fn with_silent_audio(self, sample_rate: u32) -> Self {
        Self {
            audio_rate: Some(sample_rate).filter(|&rate| rate > 0),
            ..self
        }
    }

    pub fn num_frames(&self) -> usize {
        self.frames.len()
    }

    /// Total duration of one pass through the animation.
    pub fn duration(&self) -> Duration {
        self.frames.iter().map(|(_, delay)| *delay).sum()
    }

    fn wait_until(&mut self, timestamp: Duration) {
        if !self.realtime {
            return;
        }
        let start = *self.start.get_or_insert_with(Instant::now);
        let due = start + timestamp;
        let now = Instant::now();
        if due > now {
            thread::sleep(due - now);
        }
    }
}

impl FrameSource for AnimationSource {
    fn camera(&self) -> CameraIndex {
        self.camera
    }

    fn next_sample(&mut self) -> Option<Sample> {
        if let Some(audio) = self.pending_audio.take() {
            return Some(Sample::Audio(audio));
        }

        if self.next == self.frames.len() {
            if !self.looping {
                return None;
            }
            self.next = 0;
        }

        let timestamp = self.clock;
        self.wait_until(timestamp);

        let (pixels, delay) = &self.frames[self.next];
        let frame = CameraFrame {
            pixels: pixels.clone(),
            timestamp,
        };
        if let Some(rate) = self.audio_rate {
            let len = (delay.as_secs_f64() * f64::from(rate)).round() as usize;
            self.pending_audio = Some(AudioSamples {
                samples: vec![0.0; len],
                sample_rate: rate,
                timestamp,
            });
        }
        self.clock += *delay;
        self.next += 1;

        Some(Sample::Video(frame))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::{codecs::gif::GifEncoder, Delay, Frame, RgbaImage};

    use super::*;

    fn solid(value: u8) -> PixelBuffer {
        PixelBuffer::filled(Resolution::new(4, 2), [value, value, value, 255])
    }

    fn video(sample: Option<Sample>) -> CameraFrame {
        match sample {
            Some(Sample::Video(frame)) => frame,
            other => panic!("expected video, got {other:?}"),
        }
    }

    #[test]
    fn frames_follow_delays_and_loop() {
        let mut source = AnimationSource::from_frames(vec![
            (solid(1), Duration::from_millis(40)),
            (solid(2), Duration::ZERO),
        ])
        .unwrap();
        assert_eq!(source.duration(), Duration::from_millis(140));

        let a = video(source.next_sample());
        let b = video(source.next_sample());
        let c = video(source.next_sample());
        assert_eq!(a.timestamp, Duration::ZERO);
        assert_eq!(b.timestamp, Duration::from_millis(40));
        assert_eq!(c.timestamp, Duration::from_millis(140));
        assert_eq!(c.pixels, solid(1));
    }

    #[test]
    fn non_looping_source_ends() {
        let mut source = AnimationSource::from_frames(vec![(solid(0), Duration::from_millis(10))])
            .unwrap()
            .looping(false);
        assert!(source.next_sample().is_some());
        assert!(source.next_sample().is_none());
    }

    #[test]
    fn silent_audio_covers_frame() {
        let mut source = AnimationSource::from_frames(vec![(solid(0), Duration::from_millis(50))])
            .unwrap()
            .with_silent_audio(8000);
        let frame = video(source.next_sample());
        let Some(Sample::Audio(audio)) = source.next_sample() else {
            panic!("expected audio");
        };
        assert_eq!(audio.timestamp, frame.timestamp);
        assert_eq!(audio.samples.len(), 400);
        assert_eq!(audio.duration(), Duration::from_millis(50));
        assert!(matches!(source.next_sample(), Some(Sample::Video(_))));
    }

    #[test]
    fn decodes_gif() {
        let mut data = Vec::new();
        {
            let mut encoder = GifEncoder::new(&mut data);
            for value in [0, 255] {
                let image = RgbaImage::from_pixel(3, 2, image::Rgba([value, 0, 0, 255]));
                let delay = Delay::from_numer_denom_ms(30, 1);
                encoder
                    .encode_frame(Frame::from_parts(image, 0, 0, delay))
                    .unwrap();
            }
        }

        let mut source = AnimationSource::from_reader(Cursor::new(data), AnimationFormat::Gif)
            .unwrap()
            .with_camera(CameraIndex::BACK);
        assert_eq!(source.num_frames(), 2);
        assert_eq!(source.camera(), CameraIndex::BACK);
        let frame = video(source.next_sample());
        assert_eq!(frame.pixels.resolution(), Resolution::new(3, 2));
        // GIF palettes are quantized, so only check that the first frame is the dark one.
        assert!(frame.pixels.pixel(0, 0)[0] < 64);
    }

    #[test]
    fn rejects_unknown_extension() {
        assert!(AnimationSource::from_path("clip.mp4").is_err());
        assert!(AnimationSource::from_path("clip").is_err());
    }
}
