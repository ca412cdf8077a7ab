//! Failure taxonomy for one video run.
//!
//! Only fatal conditions are errors. A detector hiccup on a single frame is a
//! soft condition: it is logged and counted in `RunStats`, never raised here.
//! Low-confidence or untracked detections are a normal filtering outcome.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::track::TrackId;

/// Fatal pipeline failure. Any of these aborts the whole video.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    /// The source video cannot be opened or decoded.
    #[error("source unavailable: {path}: {reason}")]
    SourceUnavailable { path: PathBuf, reason: String },

    /// The annotated output cannot be created or written. Staged output is discarded.
    #[error("sink write failure: {path}: {reason}")]
    SinkWriteFailure { path: PathBuf, reason: String },

    /// `process_frame` was called on a finalized engine.
    #[error("aggregation engine already finalized")]
    EngineFinalized,

    #[error("processing cancelled after {frames} frames")]
    Cancelled { frames: u64 },

    #[error("frame {frame} exceeded the detection budget ({elapsed:?} > {budget:?})")]
    FrameBudgetExceeded {
        frame: u64,
        elapsed: Duration,
        budget: Duration,
    },
}

impl PipelineError {
    pub fn source_unavailable(path: impl AsRef<Path>, reason: impl ToString) -> Self {
        Self::SourceUnavailable {
            path: path.as_ref().to_path_buf(),
            reason: reason.to_string(),
        }
    }

    pub fn sink_write(path: impl AsRef<Path>, reason: impl ToString) -> Self {
        Self::SinkWriteFailure {
            path: path.as_ref().to_path_buf(),
            reason: reason.to_string(),
        }
    }
}

/// Track registry lookup failure.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    #[error("track {0} was never observed")]
    NotFound(TrackId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_unavailable_names_path_and_reason() {
        let err = PipelineError::source_unavailable("/tmp/missing.mp4", "no such file");
        let message = err.to_string();
        assert!(message.contains("/tmp/missing.mp4"));
        assert!(message.contains("no such file"));
    }

    #[test]
    fn registry_error_names_track() {
        assert_eq!(
            RegistryError::NotFound(42).to_string(),
            "track 42 was never observed"
        );
    }
}
