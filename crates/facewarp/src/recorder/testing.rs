//! An in-memory [`Muxer`] for tests.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use crate::worker::PromiseHandle;

use super::{AudioParams, Container, ContainerError, Finalizer, Muxer, TrackWriter, VideoParams};

/// What a [`TestMuxer`] was asked to do, and knobs to make it misbehave.
#[derive(Clone, Default)]
pub(crate) struct Shared {
    pub fail_open: Arc<AtomicBool>,
    pub not_ready: Arc<AtomicBool>,
    pub video: Arc<Mutex<Vec<Duration>>>,
    pub audio: Arc<Mutex<Vec<Duration>>>,
    /// Blocks the next append until fulfilled.
    pub append_gate: Arc<Mutex<Option<PromiseHandle<()>>>>,
    /// Blocks finalizing until fulfilled.
    pub finalize_gate: Arc<Mutex<Option<PromiseHandle<()>>>>,
}

fn wait(gate: &Mutex<Option<PromiseHandle<()>>>) {
    let gate = gate.lock().unwrap().take();
    if let Some(gate) = gate {
        gate.block().ok();
    }
}

/// Records presentation times and writes a small file on finalize.
pub(crate) struct TestMuxer(pub Shared);

struct TestTrack {
    shared: Shared,
    pts: Arc<Mutex<Vec<Duration>>>,
}

impl<S> TrackWriter<S> for TestTrack {
    fn is_ready(&self) -> bool {
        !self.shared.not_ready.load(Ordering::SeqCst)
    }

    fn append(&mut self, _: &S, pts: Duration) -> Result<(), ContainerError> {
        wait(&self.shared.append_gate);
        self.pts.lock().unwrap().push(pts);
        Ok(())
    }

    fn finish(&mut self) -> Result<(), ContainerError> {
        Ok(())
    }
}

struct TestFinalizer {
    path: PathBuf,
    shared: Shared,
}

impl Finalizer for TestFinalizer {
    fn finalize(self: Box<Self>) -> Result<PathBuf, ContainerError> {
        wait(&self.shared.finalize_gate);
        fs::write(&self.path, b"recording").map_err(|source| ContainerError::Io {
            path: self.path.clone(),
            source,
        })?;
        Ok(self.path)
    }
}

impl Muxer for TestMuxer {
    fn open(
        &mut self,
        path: &Path,
        _: VideoParams,
        _: AudioParams,
    ) -> Result<Container, ContainerError> {
        if self.0.fail_open.load(Ordering::SeqCst) {
            return Err(ContainerError::Finished);
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        Ok(Container {
            video: Box::new(TestTrack {
                shared: self.0.clone(),
                pts: self.0.video.clone(),
            }),
            audio: Box::new(TestTrack {
                shared: self.0.clone(),
                pts: self.0.audio.clone(),
            }),
            finalizer: Box::new(TestFinalizer {
                path: path.to_path_buf(),
                shared: self.0.clone(),
            }),
        })
    }
}
