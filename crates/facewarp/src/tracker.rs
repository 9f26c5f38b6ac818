//! Persistent face identities across frames.
//!
//! Warp solvers smooth their output over time, so they need to know which face in this frame is
//! the same person as a face in the last one. The [`FaceTracker`] answers that by matching every
//! detection against the last known landmarks of each identity.

use std::{
    fmt,
    time::{Duration, Instant},
};

use crate::landmark::LandmarkSet;

/// Per-identity state carried between frames for the warp solvers.
///
/// The core never interprets the values; solvers read and update them in place.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Continuity(pub [f64; 7]);

impl Continuity {
    pub const DEFAULT: Self = Self([0.0, 1.0, 0.0, 1.0, 0.0, 0.0, 1.0]);
}

impl Default for Continuity {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Stable handle of a tracked face.
///
/// IDs are never reused, so a handle to an evicted identity simply stops resolving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdentityId(u64);

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct Identity {
    id: IdentityId,
    landmarks: LandmarkSet,
    continuity: Continuity,
    last_seen: Instant,
}

impl Identity {
    pub fn id(&self) -> IdentityId {
        self.id
    }

    /// The landmarks this identity was last seen with.
    pub fn landmarks(&self) -> &LandmarkSet {
        &self.landmarks
    }

    pub fn continuity(&self) -> &Continuity {
        &self.continuity
    }

    pub fn last_seen(&self) -> Instant {
        self.last_seen
    }
}

/// Matching parameters of a [`FaceTracker`].
#[derive(Debug, Clone)]
pub struct TrackerOptions {
    threshold: f32,
    capacity: usize,
    staleness: Duration,
}

impl Default for TrackerOptions {
    fn default() -> Self {
        Self {
            threshold: 1000.0,
            capacity: 6,
            staleness: Duration::from_secs(10),
        }
    }
}

impl TrackerOptions {
    /// Sets the largest summed landmark distance that is still considered the same face.
    #[inline]
    pub fn threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    /// Sets the maximum number of identities. When a new face appears at capacity, the identity
    /// that was created first is evicted.
    ///
    /// A capacity of 0 is treated as 1.
    #[inline]
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Sets how long an identity is remembered after it was last seen.
    #[inline]
    pub fn staleness(mut self, staleness: Duration) -> Self {
        self.staleness = staleness;
        self
    }
}

/// Matches landmark detections to persistent identities.
///
/// Identities are kept in insertion order.
pub struct FaceTracker {
    options: TrackerOptions,
    identities: Vec<Identity>,
    next_id: u64,
}

impl FaceTracker {
    pub fn new(options: TrackerOptions) -> Self {
        Self {
            options,
            identities: Vec::new(),
            next_id: 0,
        }
    }

    pub fn options(&self) -> &TrackerOptions {
        &self.options
    }

    /// Assigns an identity to every detection of a frame.
    ///
    /// The returned IDs are in the same order as `detections`. Detections are matched one after
    /// the other, so a detection can match an identity created for an earlier detection of the
    /// same frame.
    ///
    /// Identities not seen for longer than the staleness period are forgotten first, even when
    /// `detections` is empty.
    pub fn resolve(&mut self, detections: &[LandmarkSet], now: Instant) -> Vec<IdentityId> {
        self.prune(now);

        detections
            .iter()
            .map(|landmarks| self.resolve_one(landmarks, now))
            .collect()
    }

    fn resolve_one(&mut self, landmarks: &LandmarkSet, now: Instant) -> IdentityId {
        let closest = self
            .identities
            .iter()
            .enumerate()
            .map(|(i, identity)| (i, identity.landmarks.distance(landmarks)))
            .min_by(|(_, a), (_, b)| a.total_cmp(b));

        match closest {
            Some((i, distance)) if distance <= self.options.threshold => {
                let identity = &mut self.identities[i];
                identity.landmarks = landmarks.clone();
                identity.last_seen = now;
                identity.id
            }
            _ => self.insert(landmarks.clone(), now),
        }
    }

    fn insert(&mut self, landmarks: LandmarkSet, now: Instant) -> IdentityId {
        if self.identities.len() >= self.options.capacity {
            let evicted = self.identities.remove(0);
            log::debug!("tracker at capacity, evicting identity {}", evicted.id);
        }

        let id = IdentityId(self.next_id);
        self.next_id += 1;
        log::trace!("new identity {id}");
        self.identities.push(Identity {
            id,
            landmarks,
            continuity: Continuity::default(),
            last_seen: now,
        });
        id
    }

    fn prune(&mut self, now: Instant) {
        let staleness = self.options.staleness;
        self.identities.retain(|identity| {
            let keep = now.saturating_duration_since(identity.last_seen) <= staleness;
            if !keep {
                log::trace!("forgetting stale identity {}", identity.id);
            }
            keep
        });
    }

    pub fn get(&self, id: IdentityId) -> Option<&Identity> {
        self.identities.iter().find(|identity| identity.id == id)
    }

    pub fn continuity_mut(&mut self, id: IdentityId) -> Option<&mut Continuity> {
        self.identities
            .iter_mut()
            .find(|identity| identity.id == id)
            .map(|identity| &mut identity.continuity)
    }

    /// Returns mutable references to the continuity of two distinct identities.
    ///
    /// Returns `None` if `a == b` or either identity is unknown.
    pub fn continuity_pair_mut(
        &mut self,
        a: IdentityId,
        b: IdentityId,
    ) -> Option<(&mut Continuity, &mut Continuity)> {
        if a == b {
            return None;
        }
        let ia = self.position(a)?;
        let ib = self.position(b)?;
        if ia < ib {
            let (left, right) = self.identities.split_at_mut(ib);
            Some((&mut left[ia].continuity, &mut right[0].continuity))
        } else {
            let (left, right) = self.identities.split_at_mut(ia);
            Some((&mut right[0].continuity, &mut left[ib].continuity))
        }
    }

    fn position(&self, id: IdentityId) -> Option<usize> {
        self.identities.iter().position(|identity| identity.id == id)
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    /// Iterates over all identities, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Identity> + '_ {
        self.identities.iter()
    }

    /// Forgets all identities.
    pub fn clear(&mut self) {
        self.identities.clear();
    }
}

impl Default for FaceTracker {
    fn default() -> Self {
        Self::new(TrackerOptions::default())
    }
}
