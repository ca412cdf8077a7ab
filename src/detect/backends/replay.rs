//! Replays detector/tracker output recorded ahead of time.
//!
//! The recording is JSON Lines, one object per frame:
//!
//! ```text
//! {"frame": 1, "detections": [{"bbox": [10, 20, 60, 90], "class_id": 39, "confidence": 0.91, "track_id": 7}]}
//! {"frame": 2, "detections": []}
//! {"frame": 3, "error": "inference timed out"}
//! ```
//!
//! Frames without a line yield no detections. An `error` line is replayed as a
//! failed call so the pipeline sees the same soft condition the live tracker hit.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

use crate::detect::backend::{DetectionCapability, DetectorBackend};
use crate::detect::result::Detection;
use crate::frame::Frame;

#[derive(Debug, Deserialize)]
struct RecordedFrame {
    frame: u64,
    #[serde(default)]
    detections: Vec<Detection>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug)]
enum Recorded {
    Detections(Vec<Detection>),
    Failure(String),
}

#[derive(Debug)]
pub struct ReplayBackend {
    frames: HashMap<u64, Recorded>,
}

impl ReplayBackend {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .with_context(|| format!("failed to open detection recording {}", path.display()))?;
        Self::from_reader(file)
            .with_context(|| format!("invalid detection recording {}", path.display()))
    }

    pub fn from_reader(reader: impl Read) -> Result<Self> {
        let mut frames = HashMap::new();
        for (line_no, line) in BufReader::new(reader).lines().enumerate() {
            let line = line.context("read detection recording")?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let record: RecordedFrame = serde_json::from_str(trimmed)
                .map_err(|e| anyhow!("line {}: {}", line_no + 1, e))?;
            let entry = match record.error {
                Some(reason) => Recorded::Failure(reason),
                None => Recorded::Detections(record.detections),
            };
            if frames.insert(record.frame, entry).is_some() {
                return Err(anyhow!(
                    "line {}: frame {} recorded twice",
                    line_no + 1,
                    record.frame
                ));
            }
        }
        log::info!("ReplayBackend: loaded {} recorded frames", frames.len());
        Ok(Self { frames })
    }

    pub fn recorded_frames(&self) -> usize {
        self.frames.len()
    }
}

impl DetectorBackend for ReplayBackend {
    fn name(&self) -> &'static str {
        "replay"
    }

    fn supports(&self, capability: DetectionCapability) -> bool {
        matches!(
            capability,
            DetectionCapability::ObjectDetection | DetectionCapability::Tracking
        )
    }

    fn detect_and_track(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        match self.frames.remove(&frame.index()) {
            Some(Recorded::Detections(detections)) => Ok(detections),
            Some(Recorded::Failure(reason)) => Err(anyhow!(
                "recorded tracker failure at frame {}: {}",
                frame.index(),
                reason
            )),
            None => Ok(vec![]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn frame(index: u64) -> Frame {
        Frame::new(index, RgbImage::new(2, 2))
    }

    const RECORDING: &str = r#"
# recorded with bytetrack
{"frame": 1, "detections": [{"bbox": [1, 1, 5, 5], "class_id": 39, "confidence": 0.9, "track_id": 7}]}
{"frame": 2, "detections": [{"bbox": [1, 1, 5, 5], "class_id": 39, "confidence": 0.2}]}
{"frame": 4, "error": "cuda out of memory"}
"#;

    #[test]
    fn replays_recorded_frames_by_index() {
        let mut backend = ReplayBackend::from_reader(RECORDING.as_bytes()).unwrap();
        assert_eq!(backend.recorded_frames(), 3);

        let first = backend.detect_and_track(&frame(1)).unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].track_id, Some(7));

        let second = backend.detect_and_track(&frame(2)).unwrap();
        assert_eq!(second[0].track_id, None);

        assert!(backend.detect_and_track(&frame(3)).unwrap().is_empty());

        let err = backend.detect_and_track(&frame(4)).unwrap_err();
        assert!(err.to_string().contains("cuda out of memory"));
    }

    #[test]
    fn rejects_malformed_line_with_line_number() {
        let err = ReplayBackend::from_reader("{\"frame\": 1}\nnot json\n".as_bytes()).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn rejects_duplicate_frames() {
        let recording = "{\"frame\": 1}\n{\"frame\": 1}\n";
        assert!(ReplayBackend::from_reader(recording.as_bytes()).is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(ReplayBackend::from_path("/nonexistent/detections.jsonl").is_err());
    }
}
