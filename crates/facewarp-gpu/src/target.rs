//! Render-target pool and name registry.

use std::{collections::HashMap, fmt};

use crate::{Backend, GpuError, Resolution};

/// Logical name of a render target.
///
/// Passes refer to their inputs and outputs by name; the [`TargetPool`] maps the names to whatever
/// handle the [`Backend`] uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetName {
    /// The raw camera frame, in sensor orientation.
    Video,
    /// The camera frame rotated and mirrored to be upright.
    Upright,
    /// Downsampled copy of [`TargetName::Upright`] that is fed to the blur.
    Small,
    /// Intermediate target of the separable downsample and blur passes.
    BlurScratch,
    /// Blurred copy of [`TargetName::Small`].
    Blurred,
    /// Composited result that is presented, recorded and captured.
    Output,
}

impl TargetName {
    /// The targets whose size depends on camera and orientation.
    pub const ORIENTED: [Self; 5] = [
        Self::Upright,
        Self::Small,
        Self::BlurScratch,
        Self::Blurred,
        Self::Output,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Upright => "upright",
            Self::Small => "small",
            Self::BlurScratch => "blur_scratch",
            Self::Blurred => "blurred",
            Self::Output => "output",
        }
    }
}

impl fmt::Display for TargetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct Slot<T> {
    resolution: Resolution,
    handle: T,
}

/// Owns the render targets of a pipeline and hands out their backend handles by name.
///
/// Targets are only reallocated when the requested resolution of a name changes. A target that is
/// replaced is kept as a spare and reused when any name later asks for that resolution again, so
/// rotating the device back and forth does not allocate. [`TargetPool::trim_spares`] drops the
/// spares that rotating back would not need.
pub struct TargetPool<T> {
    live: HashMap<TargetName, Slot<T>>,
    spare: Vec<Slot<T>>,
    allocations: usize,
}

impl<T> TargetPool<T> {
    pub fn new() -> Self {
        Self {
            live: HashMap::new(),
            spare: Vec::new(),
            allocations: 0,
        }
    }

    /// Makes sure the target `name` exists at `resolution`.
    ///
    /// Returns `true` if the target behind `name` changed.
    pub fn ensure<B>(
        &mut self,
        backend: &mut B,
        name: TargetName,
        resolution: Resolution,
    ) -> Result<bool, GpuError>
    where
        B: Backend<Target = T>,
    {
        if let Some(slot) = self.live.get(&name) {
            if slot.resolution == resolution {
                return Ok(false);
            }
        }

        let slot = match self
            .spare
            .iter()
            .position(|slot| slot.resolution == resolution)
        {
            Some(i) => {
                log::trace!("recycling spare {resolution} target as '{name}'");
                self.spare.swap_remove(i)
            }
            None => {
                log::debug!("allocating render target '{name}' at {resolution}");
                let handle = backend.create_target(name, resolution)?;
                self.allocations += 1;
                Slot { resolution, handle }
            }
        };

        if let Some(old) = self.live.insert(name, slot) {
            self.spare.push(old);
        }
        Ok(true)
    }

    /// Looks up the backend handle of a target.
    pub fn get(&self, name: TargetName) -> Result<&T, GpuError> {
        self.live
            .get(&name)
            .map(|slot| &slot.handle)
            .ok_or(GpuError::MissingTarget(name))
    }

    pub fn resolution(&self, name: TargetName) -> Option<Resolution> {
        self.live.get(&name).map(|slot| slot.resolution)
    }

    /// Total number of targets created through the backend so far.
    pub fn allocations(&self) -> usize {
        self.allocations
    }

    pub fn num_spare(&self) -> usize {
        self.spare.len()
    }

    /// Frees every spare target except those a live target would need after a 90° rotation.
    ///
    /// Returns the number of targets freed.
    pub fn trim_spares(&mut self) -> usize {
        let before = self.spare.len();
        let live = &self.live;
        self.spare.retain(|spare| {
            live.values().any(|slot| slot.resolution.transposed() == spare.resolution)
        });
        before - self.spare.len()
    }
}

impl<T> Default for TargetPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RecordingBackend;

    #[test]
    fn unchanged_size_does_not_allocate() {
        let mut backend = RecordingBackend::new(Resolution::new(100, 100));
        let mut pool = TargetPool::new();
        let res = Resolution::new(64, 48);

        assert!(pool.ensure(&mut backend, TargetName::Upright, res).unwrap());
        for _ in 0..10 {
            assert!(!pool.ensure(&mut backend, TargetName::Upright, res).unwrap());
        }
        assert_eq!(pool.allocations(), 1);
        assert_eq!(pool.resolution(TargetName::Upright), Some(res));
    }

    #[test]
    fn rotating_back_reuses_spares() {
        let mut backend = RecordingBackend::new(Resolution::new(100, 100));
        let mut pool = TargetPool::new();
        let landscape = Resolution::new(64, 48);
        let portrait = landscape.transposed();

        pool.ensure(&mut backend, TargetName::Output, landscape).unwrap();
        pool.ensure(&mut backend, TargetName::Output, portrait).unwrap();
        assert_eq!(pool.num_spare(), 1);
        pool.ensure(&mut backend, TargetName::Output, landscape).unwrap();
        assert_eq!(pool.allocations(), 2);
        assert_eq!(pool.num_spare(), 1);

        assert_eq!(pool.trim_spares(), 0);
        assert_eq!(pool.num_spare(), 1);
    }

    #[test]
    fn spares_of_other_sizes_are_trimmed() {
        let mut backend = RecordingBackend::new(Resolution::new(100, 100));
        let mut pool = TargetPool::new();

        for width in [64, 80, 96, 112] {
            pool.ensure(&mut backend, TargetName::Video, Resolution::new(width, 48)).unwrap();
        }
        pool.ensure(&mut backend, TargetName::Output, Resolution::new(48, 112)).unwrap();
        assert_eq!(pool.num_spare(), 3);

        assert_eq!(pool.trim_spares(), 3);
        assert_eq!(pool.num_spare(), 0);

        pool.ensure(&mut backend, TargetName::Output, Resolution::new(112, 48)).unwrap();
        assert_eq!(pool.trim_spares(), 0);
        assert_eq!(pool.num_spare(), 1);
    }

    #[test]
    fn missing_target() {
        let pool = TargetPool::<()>::new();
        assert!(matches!(
            pool.get(TargetName::Blurred),
            Err(GpuError::MissingTarget(TargetName::Blurred))
        ));
    }
}
