//! Aggregation engine: turns the per-frame detection stream into per-track
//! statistics.
//!
//! One engine serves exactly one video. It owns the track registry and the
//! category membership sets; both are dropped with the engine.
//!
//! States:
//! - `Accumulating`: `process_frame` accepted.
//! - `Finalized`: after `finalize()`. `process_frame` is rejected, `finalize()`
//!   can be called again and returns the same report.

use std::collections::{BTreeMap, HashSet};

use crate::category::{Category, CategoryTable};
use crate::detect::{Detection, TrackedDetection};
use crate::error::PipelineError;
use crate::report::{ObjectTimeline, Report};
use crate::track::{TrackId, TrackRegistry};

/// Detections at or below this confidence are dropped.
pub const CONFIDENCE_THRESHOLD: f32 = 0.30;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineState {
    Accumulating,
    Finalized,
}

/// Counters for logging. Not part of the report.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub frames: u64,
    pub accepted: u64,
    pub dropped_low_confidence: u64,
    pub dropped_untracked: u64,
}

/// Distinct track identities of one category, in first-observation order.
#[derive(Debug, Default)]
struct Membership {
    order: Vec<TrackId>,
    members: HashSet<TrackId>,
}

impl Membership {
    fn insert(&mut self, track_id: TrackId) {
        if self.members.insert(track_id) {
            self.order.push(track_id);
        }
    }
}

pub struct AggregationEngine {
    classifier: CategoryTable,
    registry: TrackRegistry,
    membership: BTreeMap<Category, Membership>,
    state: EngineState,
    stats: EngineStats,
}

impl AggregationEngine {
    pub fn new(classifier: CategoryTable) -> Self {
        Self {
            classifier,
            registry: TrackRegistry::new(),
            membership: BTreeMap::new(),
            state: EngineState::Accumulating,
            stats: EngineStats::default(),
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    pub fn registry(&self) -> &TrackRegistry {
        &self.registry
    }

    /// Filter one frame's detections and fold the accepted ones into the
    /// statistics.
    ///
    /// A detection is accepted iff `confidence > CONFIDENCE_THRESHOLD` and it carries
    /// a track identity. Everything else is dropped silently. The returned set is
    /// exactly what the annotator should draw for this frame.
    pub fn process_frame(
        &mut self,
        frame_index: u64,
        detections: &[Detection],
    ) -> Result<Vec<TrackedDetection>, PipelineError> {
        if self.state == EngineState::Finalized {
            return Err(PipelineError::EngineFinalized);
        }
        self.stats.frames += 1;

        let mut accepted = Vec::with_capacity(detections.len());
        for detection in detections {
            if detection.confidence.is_nan() || detection.confidence <= CONFIDENCE_THRESHOLD {
                self.stats.dropped_low_confidence += 1;
                continue;
            }
            let Some(track_id) = detection.track_id else {
                self.stats.dropped_untracked += 1;
                continue;
            };

            let resolved = self.classifier.classify(detection.class_id);
            let category =
                self.registry
                    .observe(track_id, resolved, detection.class_id, frame_index);
            self.membership.entry(category).or_default().insert(track_id);
            self.stats.accepted += 1;

            accepted.push(TrackedDetection {
                bbox: detection.bbox,
                class_id: detection.class_id,
                confidence: detection.confidence,
                track_id,
                category,
            });
        }
        Ok(accepted)
    }

    /// Close the engine and project the registry into a report.
    pub fn finalize(&mut self) -> Report {
        if self.state == EngineState::Accumulating {
            log::debug!(
                "engine finalized: {} frames, {} tracks, {} accepted detections",
                self.stats.frames,
                self.registry.len(),
                self.stats.accepted
            );
        }
        self.state = EngineState::Finalized;

        let mut report = Report::default();
        for (category, membership) in &self.membership {
            let objects = membership
                .order
                .iter()
                .filter_map(|&id| match self.registry.duration(id) {
                    Ok(duration) => Some(ObjectTimeline { id, duration }),
                    Err(e) => {
                        log::error!("membership references unregistered track: {}", e);
                        None
                    }
                })
                .collect();
            report.insert(*category, objects);
        }
        report
    }
}
