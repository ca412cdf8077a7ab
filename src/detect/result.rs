use serde::{Deserialize, Serialize};

use crate::category::{Category, ClassId};
use crate::track::TrackId;

/// Axis-aligned box in pixel coordinates (`x1 < x2`, `y1 < y2`).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    fn is_well_formed(&self) -> bool {
        [self.x1, self.y1, self.x2, self.y2]
            .iter()
            .all(|v| v.is_finite())
            && self.x1 < self.x2
            && self.y1 < self.y2
    }
}

impl From<[f32; 4]> for BoundingBox {
    fn from([x1, y1, x2, y2]: [f32; 4]) -> Self {
        Self { x1, y1, x2, y2 }
    }
}

impl From<BoundingBox> for [f32; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

/// One detection proposed by the detector/tracker for one frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub class_id: ClassId,
    pub confidence: f32,
    /// Present only when the tracker associated this box with a persistent identity.
    #[serde(default)]
    pub track_id: Option<TrackId>,
}

impl Detection {
    pub fn new(bbox: BoundingBox, class_id: ClassId, confidence: f32) -> Self {
        Self {
            bbox,
            class_id,
            confidence,
            track_id: None,
        }
    }

    pub fn with_track(mut self, track_id: TrackId) -> Self {
        self.track_id = Some(track_id);
        self
    }

    /// Check the collaborator's output contract for this detection.
    pub fn validate(&self) -> Result<(), InvalidDetection> {
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(InvalidDetection::Confidence(self.confidence));
        }
        if !self.bbox.is_well_formed() {
            return Err(InvalidDetection::BoundingBox(self.bbox));
        }
        Ok(())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum InvalidDetection {
    #[error("confidence {0} outside [0, 1]")]
    Confidence(f32),
    #[error("degenerate bounding box {0:?}")]
    BoundingBox(BoundingBox),
}

/// A detection that passed the engine filter, resolved to its track and the
/// track's fixed category. This is what the annotator draws.
#[derive(Clone, Debug, PartialEq)]
pub struct TrackedDetection {
    pub bbox: BoundingBox,
    pub class_id: ClassId,
    pub confidence: f32,
    pub track_id: TrackId,
    pub category: Category,
}

impl TrackedDetection {
    pub fn label(&self) -> String {
        format!(
            "{} #{}: {:.2}",
            self.category, self.track_id, self.confidence
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(confidence: f32, bbox: [f32; 4]) -> Detection {
        Detection::new(bbox.into(), 39, confidence)
    }

    #[test]
    fn valid_detection_passes() {
        assert!(det(0.5, [1.0, 2.0, 10.0, 20.0]).validate().is_ok());
        assert!(det(0.0, [0.0, 0.0, 1.0, 1.0]).validate().is_ok());
        assert!(det(1.0, [0.0, 0.0, 1.0, 1.0]).validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_confidence() {
        assert!(matches!(
            det(1.5, [0.0, 0.0, 1.0, 1.0]).validate(),
            Err(InvalidDetection::Confidence(_))
        ));
        assert!(det(f32::NAN, [0.0, 0.0, 1.0, 1.0]).validate().is_err());
    }

    #[test]
    fn rejects_degenerate_box() {
        assert!(matches!(
            det(0.9, [10.0, 0.0, 10.0, 5.0]).validate(),
            Err(InvalidDetection::BoundingBox(_))
        ));
        assert!(det(0.9, [0.0, 5.0, 4.0, 1.0]).validate().is_err());
    }

    #[test]
    fn deserializes_recorded_detection() {
        let json = r#"{"bbox": [1, 2, 30, 40], "class_id": 41, "confidence": 0.8, "track_id": 12}"#;
        let parsed: Detection = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.bbox, BoundingBox::new(1.0, 2.0, 30.0, 40.0));
        assert_eq!(parsed.track_id, Some(12));

        let untracked: Detection =
            serde_json::from_str(r#"{"bbox": [1, 2, 3, 4], "class_id": 0, "confidence": 0.4}"#)
                .unwrap();
        assert_eq!(untracked.track_id, None);
    }

    #[test]
    fn label_matches_overlay_format() {
        let tracked = TrackedDetection {
            bbox: BoundingBox::new(0.0, 0.0, 1.0, 1.0),
            class_id: 39,
            confidence: 0.876,
            track_id: 7,
            category: Category::Plastic,
        };
        assert_eq!(tracked.label(), "plastic #7: 0.88");
    }
}
