//! Per-identity track bookkeeping for one video.
//!
//! Track identities come from the external tracker and are never invented here.
//! A track's category is fixed at its first observation; later observations only
//! move `last_seen` forward.

use std::collections::HashMap;

use crate::category::{Category, ClassId};
use crate::error::RegistryError;

/// Identity assigned by the external tracker, stable across frames.
pub type TrackId = u64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Track {
    /// Category assigned at first observation. Never revised.
    pub category: Category,
    /// Raw label seen at first observation.
    pub class_id: ClassId,
    pub first_seen: u64,
    pub last_seen: u64,
}

impl Track {
    /// Frames between first and last observation. Zero for a single-frame track.
    pub fn duration(&self) -> u64 {
        self.last_seen - self.first_seen
    }
}

/// Registry of every track observed during one run.
#[derive(Debug, Default)]
pub struct TrackRegistry {
    tracks: HashMap<TrackId, Track>,
}

impl TrackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an observation and return the track's fixed category.
    ///
    /// Unseen identities are created with `first_seen = last_seen = frame_index`.
    /// Known identities keep their category and get `last_seen = max(last_seen, frame_index)`.
    pub fn observe(
        &mut self,
        track_id: TrackId,
        category: Category,
        class_id: ClassId,
        frame_index: u64,
    ) -> Category {
        let track = self.tracks.entry(track_id).or_insert_with(|| {
            log::debug!(
                "track {} registered as {} at frame {}",
                track_id,
                category,
                frame_index
            );
            Track {
                category,
                class_id,
                first_seen: frame_index,
                last_seen: frame_index,
            }
        });
        track.last_seen = track.last_seen.max(frame_index);
        track.category
    }

    pub fn duration(&self, track_id: TrackId) -> Result<u64, RegistryError> {
        self.tracks
            .get(&track_id)
            .map(Track::duration)
            .ok_or(RegistryError::NotFound(track_id))
    }

    pub fn get(&self, track_id: TrackId) -> Option<&Track> {
        self.tracks.get(&track_id)
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TrackId, &Track)> {
        self.tracks.iter().map(|(id, track)| (*id, track))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_observation_creates_zero_length_track() {
        let mut registry = TrackRegistry::new();
        assert_eq!(registry.observe(7, Category::Plastic, 39, 3), Category::Plastic);
        assert_eq!(registry.duration(7).unwrap(), 0);
        let track = registry.get(7).unwrap();
        assert_eq!(track.first_seen, 3);
        assert_eq!(track.last_seen, 3);
        assert_eq!(track.class_id, 39);
    }

    #[test]
    fn category_is_fixed_at_first_observation() {
        let mut registry = TrackRegistry::new();
        registry.observe(1, Category::Paper, 73, 1);
        let fixed = registry.observe(1, Category::Metal, 76, 2);
        assert_eq!(fixed, Category::Paper);
        assert_eq!(registry.get(1).unwrap().category, Category::Paper);
        assert_eq!(registry.get(1).unwrap().class_id, 73);
    }

    #[test]
    fn last_seen_never_moves_backwards() {
        let mut registry = TrackRegistry::new();
        registry.observe(2, Category::Other, 0, 10);
        registry.observe(2, Category::Other, 0, 15);
        registry.observe(2, Category::Other, 0, 12);
        let track = registry.get(2).unwrap();
        assert_eq!(track.last_seen, 15);
        assert_eq!(registry.duration(2).unwrap(), 5);
    }

    #[test]
    fn unknown_track_is_not_found() {
        let registry = TrackRegistry::new();
        assert_eq!(registry.duration(99), Err(RegistryError::NotFound(99)));
        assert!(registry.is_empty());
    }
}
