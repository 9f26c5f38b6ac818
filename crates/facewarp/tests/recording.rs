use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use facewarp::{
    gpu::{PixelBuffer, Resolution},
    recorder::{AudioParams, DirectoryLibrary, Mp4Muxer, Recorder, RecorderOptions, RecorderState},
    source::AudioSamples,
};

const RATE: u32 = 16_000;
const SIZE: Resolution = Resolution::new(16, 16);

fn scratch_dir() -> PathBuf {
    std::env::temp_dir().join(format!("facewarp-it-recording-{}", fastrand::u64(..)))
}

fn chunk(ms: u64) -> AudioSamples {
    AudioSamples {
        samples: vec![0.25; 160],
        sample_rate: RATE,
        timestamp: Duration::from_millis(ms),
    }
}

fn find(data: &[u8], tag: &[u8; 4]) -> Option<usize> {
    data.windows(4).position(|w| w == tag)
}

fn be32(data: &[u8], at: usize) -> u32 {
    u32::from_be_bytes(data[at..at + 4].try_into().unwrap())
}

/// Reads the movie duration from the `mvhd` box.
fn movie_duration(data: &[u8]) -> Duration {
    let at = find(data, b"mvhd").expect("no mvhd box") + 4;
    let (timescale, duration) = match data[at] {
        0 => (be32(data, at + 12), u64::from(be32(data, at + 16))),
        _ => {
            let hi = u64::from(be32(data, at + 24));
            let lo = u64::from(be32(data, at + 28));
            (be32(data, at + 20), hi << 32 | lo)
        }
    };
    Duration::from_secs_f64(duration as f64 / f64::from(timescale))
}

fn recorder(dir: &Path, capacity: usize) -> Recorder {
    let library = Arc::new(DirectoryLibrary::new(dir.join("library")));
    let options = RecorderOptions::new(dir.join("staging").join("recording.mp4"))
        .album("takes")
        .queue_capacity(capacity)
        .video_bitrate(500_000)
        .audio(AudioParams {
            channels: 1,
            sample_rate: RATE,
            bitrate: 32_000,
        });
    Recorder::new(Box::new(Mp4Muxer), library, options).unwrap()
}

#[test]
fn recording_lands_in_library_as_mp4() {
    facewarp::init_logger!();
    if !Mp4Muxer::is_supported() {
        eprintln!("skipping, gstreamer encoders are not installed");
        return;
    }

    let dir = scratch_dir();
    let mut recorder = recorder(&dir, 64);
    recorder.start(SIZE.width(), SIZE.height()).unwrap();
    assert_eq!(recorder.state(), RecorderState::Recording);

    // Audio arrives first and fixes the start of the recording.
    assert!(recorder.append_audio(chunk(100)));
    assert_eq!(recorder.start_time(), Some(Duration::from_millis(100)));
    // Older than the first sample, never written.
    assert!(recorder.append_video(
        PixelBuffer::filled(SIZE, [0, 0, 0, 255]),
        Duration::from_millis(90),
    ));

    for i in 0..30u64 {
        let ts = 100 + i * 10;
        let shade = (i * 8) as u8;
        recorder.append_video(
            PixelBuffer::filled(SIZE, [shade, 0, 0, 255]),
            Duration::from_millis(ts),
        );
        if i > 0 {
            recorder.append_audio(chunk(ts));
        }
    }

    let saved = recorder.stop().unwrap().block().unwrap().unwrap();
    assert_eq!(recorder.state(), RecorderState::Idle);
    assert!(saved.starts_with(dir.join("library").join("takes")));
    assert_eq!(saved.extension().unwrap(), "mp4");
    assert!(!dir.join("staging").join("recording.mp4").exists());

    let data = fs::read(&saved).unwrap();
    assert_eq!(&data[4..8], b"ftyp");
    let moov = &data[find(&data, b"moov").expect("no moov box")..];
    assert!(find(moov, b"avc1").is_some(), "no h264 track");
    assert!(find(moov, b"mp4a").is_some(), "no aac track");
    let duration = movie_duration(moov);
    assert!(
        duration > Duration::from_millis(200) && duration < Duration::from_secs(1),
        "{duration:?}"
    );

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn second_recording_gets_its_own_name() {
    if !Mp4Muxer::is_supported() {
        eprintln!("skipping, gstreamer encoders are not installed");
        return;
    }

    let dir = scratch_dir();
    let mut recorder = recorder(&dir, 4);

    let mut saved = Vec::new();
    for _ in 0..2 {
        recorder.start(SIZE.width(), SIZE.height()).unwrap();
        recorder.append_video(PixelBuffer::filled(SIZE, [9, 9, 9, 255]), Duration::ZERO);
        saved.push(recorder.stop().unwrap().block().unwrap().unwrap());
    }

    assert_ne!(saved[0], saved[1]);
    for path in &saved {
        let data = fs::read(path).unwrap();
        assert_eq!(&data[4..8], b"ftyp");
    }

    fs::remove_dir_all(&dir).ok();
}
