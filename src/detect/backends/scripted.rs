use std::collections::VecDeque;

use anyhow::{anyhow, Result};

use crate::detect::backend::{DetectionCapability, DetectorBackend};
use crate::detect::result::Detection;
use crate::frame::Frame;

/// Scripted outcome for one `detect_and_track` call.
#[derive(Clone, Debug)]
pub enum ScriptedFrame {
    Detections(Vec<Detection>),
    Failure(String),
}

/// Deterministic stand-in for a detector/tracker. Replays a fixed sequence of
/// outcomes, one per call, ignoring pixels. Once the script runs out every call
/// returns no detections.
pub struct ScriptedBackend {
    script: VecDeque<ScriptedFrame>,
    calls: u64,
}

impl ScriptedBackend {
    pub fn new(script: impl IntoIterator<Item = ScriptedFrame>) -> Self {
        Self {
            script: script.into_iter().collect(),
            calls: 0,
        }
    }

    /// Backend that never detects anything.
    pub fn empty() -> Self {
        Self::new([])
    }

    /// Convenience: one detection list per frame.
    pub fn from_frames(frames: impl IntoIterator<Item = Vec<Detection>>) -> Self {
        Self::new(frames.into_iter().map(ScriptedFrame::Detections))
    }

    /// Number of `detect_and_track` calls served so far.
    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self::empty()
    }
}

impl DetectorBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn supports(&self, capability: DetectionCapability) -> bool {
        matches!(
            capability,
            DetectionCapability::ObjectDetection | DetectionCapability::Tracking
        )
    }

    fn detect_and_track(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        self.calls += 1;
        match self.script.pop_front() {
            Some(ScriptedFrame::Detections(detections)) => Ok(detections),
            Some(ScriptedFrame::Failure(reason)) => {
                Err(anyhow!("scripted failure at frame {}: {}", frame.index(), reason))
            }
            None => Ok(vec![]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::result::BoundingBox;
    use image::RgbImage;

    fn frame(index: u64) -> Frame {
        Frame::new(index, RgbImage::new(4, 4))
    }

    #[test]
    fn replays_script_in_order_then_goes_quiet() {
        let det = Detection::new(BoundingBox::new(0.0, 0.0, 2.0, 2.0), 39, 0.9).with_track(1);
        let mut backend = ScriptedBackend::new([
            ScriptedFrame::Detections(vec![det.clone()]),
            ScriptedFrame::Failure("model timeout".into()),
        ]);

        assert_eq!(backend.detect_and_track(&frame(1)).unwrap(), vec![det]);
        let err = backend.detect_and_track(&frame(2)).unwrap_err();
        assert!(err.to_string().contains("frame 2"));
        assert!(backend.detect_and_track(&frame(3)).unwrap().is_empty());
        assert_eq!(backend.calls(), 3);
    }
}
