//! Single-pass processing of one video.
//!
//! Frames are pulled, detected/tracked, filtered, annotated and written strictly
//! one at a time in source order. The run ends in exactly one of two ways:
//! every frame processed and the report compiled, or a fatal `PipelineError`
//! with the staged output discarded.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::annotate::Annotator;
use crate::category::CategoryTable;
use crate::detect::{Detection, DetectorBackend};
use crate::engine::{AggregationEngine, EngineStats};
use crate::error::PipelineError;
use crate::frame::{Frame, VideoProperties};
use crate::report::Report;
use crate::video::{open_sink, open_source, FrameSink, FrameSource, VideoSettings};

/// Cooperative cancellation flag, checked between frames.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-run counters. Soft conditions end up here, never in the report.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub frames_read: u64,
    pub frames_written: u64,
    /// Frames whose detector call failed or returned an invalid result.
    pub detection_failures: u64,
    pub detections_accepted: u64,
    pub detections_dropped: u64,
    pub tracks: usize,
}

#[derive(Debug)]
pub struct RunOutcome {
    pub report: Report,
    pub stats: RunStats,
    pub properties: VideoProperties,
    /// Committed output location. `None` for `run_stream`, where the caller owns the sink.
    pub output: Option<PathBuf>,
}

/// Called after every written frame with the number of frames done so far.
pub type ProgressFn<'a> = Box<dyn FnMut(u64) + 'a>;

pub struct Pipeline<'a> {
    backend: &'a mut dyn DetectorBackend,
    annotator: &'a Annotator,
    categories: CategoryTable,
    cancel: CancelToken,
    frame_budget: Option<Duration>,
    progress: Option<ProgressFn<'a>>,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        backend: &'a mut dyn DetectorBackend,
        annotator: &'a Annotator,
        categories: CategoryTable,
    ) -> Self {
        Self {
            backend,
            annotator,
            categories,
            cancel: CancelToken::new(),
            frame_budget: None,
            progress: None,
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Abort the run when a single `detect_and_track` call takes longer than `budget`.
    pub fn with_frame_budget(mut self, budget: Option<Duration>) -> Self {
        self.frame_budget = budget;
        self
    }

    pub fn with_progress(mut self, progress: impl FnMut(u64) + 'a) -> Self {
        self.progress = Some(Box::new(progress));
        self
    }

    /// Open `input`, process every frame into `output`, and commit the output.
    ///
    /// The source is opened before anything is created at `output`, so an
    /// unavailable source leaves no output behind.
    pub fn process_video(
        &mut self,
        input: &str,
        output: &Path,
        settings: &VideoSettings,
    ) -> Result<RunOutcome, PipelineError> {
        let mut source = open_source(input, settings)?;
        let properties = source.properties();
        log::info!(
            "processing {} ({}x{} at {} fps) -> {}",
            input,
            properties.width,
            properties.height,
            properties.fps,
            output.display()
        );
        let mut sink = open_sink(output, properties)?;

        let mut outcome = self.run_stream(source.as_mut(), sink.as_mut())?;
        outcome.output = Some(sink.finish()?);
        Ok(outcome)
    }

    /// Drive one pass over `source` into `sink`. The sink is not committed.
    pub fn run_stream(
        &mut self,
        source: &mut dyn FrameSource,
        sink: &mut dyn FrameSink,
    ) -> Result<RunOutcome, PipelineError> {
        let properties = source.properties();
        let mut engine = AggregationEngine::new(self.categories.clone());
        let mut stats = RunStats::default();

        if let Err(e) = self.backend.warm_up() {
            log::warn!("backend {} warm-up failed: {:#}", self.backend.name(), e);
        }

        while let Some(mut frame) = source.next_frame()? {
            if self.cancel.is_cancelled() {
                log::warn!("cancelled before frame {}", frame.index());
                return Err(PipelineError::Cancelled {
                    frames: stats.frames_read,
                });
            }
            stats.frames_read += 1;

            let detections = match self.detect(&frame)? {
                Some(detections) => detections,
                None => {
                    stats.detection_failures += 1;
                    Vec::new()
                }
            };

            let tracked = engine.process_frame(frame.index(), &detections)?;
            log::debug!(
                "frame {}: {} detections, {} tracked",
                frame.index(),
                detections.len(),
                tracked.len()
            );
            self.annotator.annotate(&mut frame, &tracked);
            sink.write_frame(&frame)?;
            stats.frames_written += 1;

            if let Some(progress) = self.progress.as_mut() {
                progress(stats.frames_read);
            }
        }

        let report = engine.finalize();
        let EngineStats {
            accepted,
            dropped_low_confidence,
            dropped_untracked,
            ..
        } = engine.stats();
        stats.detections_accepted = accepted;
        stats.detections_dropped = dropped_low_confidence + dropped_untracked;
        stats.tracks = engine.registry().len();

        log::info!(
            "processed {} frames: {} tracks in {} categories, {} detection failures",
            stats.frames_read,
            stats.tracks,
            report.len(),
            stats.detection_failures
        );

        Ok(RunOutcome {
            report,
            stats,
            properties,
            output: None,
        })
    }

    /// Run the collaborator on one frame. `Ok(None)` is the soft DetectionFailure
    /// case; only an exceeded frame budget is fatal.
    fn detect(&mut self, frame: &Frame) -> Result<Option<Vec<Detection>>, PipelineError> {
        let started = Instant::now();
        let result = self.backend.detect_and_track(frame);
        let elapsed = started.elapsed();

        if let Some(budget) = self.frame_budget {
            if elapsed > budget {
                return Err(PipelineError::FrameBudgetExceeded {
                    frame: frame.index(),
                    elapsed,
                    budget,
                });
            }
        }

        let detections = match result {
            Ok(detections) => detections,
            Err(e) => {
                log::warn!(
                    "detection failed on frame {}, writing it unannotated: {:#}",
                    frame.index(),
                    e
                );
                return Ok(None);
            }
        };
        if let Some(invalid) = detections.iter().find_map(|d| d.validate().err()) {
            log::warn!(
                "backend {} returned an invalid result on frame {} ({}), ignoring its detections",
                self.backend.name(),
                frame.index(),
                invalid
            );
            return Ok(None);
        }
        Ok(Some(detections))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotate::AnnotatorConfig;
    use crate::category::Category;
    use crate::detect::{BoundingBox, ScriptedBackend, ScriptedFrame};
    use crate::report::ObjectTimeline;
    use crate::video::SyntheticSource;

    /// Sink that keeps frames in memory.
    #[derive(Default)]
    struct MemorySink {
        frames: Vec<Frame>,
    }

    impl FrameSink for MemorySink {
        fn write_frame(&mut self, frame: &Frame) -> Result<(), PipelineError> {
            self.frames.push(frame.clone());
            Ok(())
        }

        fn frames_written(&self) -> u64 {
            self.frames.len() as u64
        }

        fn finish(self: Box<Self>) -> Result<PathBuf, PipelineError> {
            Ok(PathBuf::from("memory"))
        }
    }

    fn det(class_id: u32, confidence: f32, track_id: Option<u64>) -> Detection {
        Detection {
            bbox: BoundingBox::new(4.0, 4.0, 20.0, 16.0),
            class_id,
            confidence,
            track_id,
        }
    }

    fn annotator() -> Annotator {
        Annotator::boxes_only(&AnnotatorConfig::default())
    }

    #[test]
    fn failed_frames_are_still_written() {
        let mut backend = ScriptedBackend::new([
            ScriptedFrame::Detections(vec![det(39, 0.9, Some(1))]),
            ScriptedFrame::Failure("timeout".into()),
            ScriptedFrame::Detections(vec![det(39, 0.9, Some(1))]),
        ]);
        let annotator = annotator();
        let mut source = SyntheticSource::new(3, 32, 24, 10);
        let mut sink = MemorySink::default();

        let outcome = Pipeline::new(&mut backend, &annotator, CategoryTable::default())
            .run_stream(&mut source, &mut sink)
            .unwrap();

        assert_eq!(sink.frames.len(), 3);
        assert_eq!(outcome.stats.detection_failures, 1);
        assert_eq!(outcome.stats.frames_written, 3);
        assert_eq!(
            outcome.report.get(Category::Plastic).unwrap().objects,
            vec![ObjectTimeline { id: 1, duration: 2 }]
        );
    }

    #[test]
    fn invalid_result_counts_as_failure_for_whole_frame() {
        let mut bad = det(39, 0.9, Some(2));
        bad.bbox = BoundingBox::new(10.0, 10.0, 5.0, 20.0);
        let mut backend =
            ScriptedBackend::from_frames([vec![det(73, 0.9, Some(1)), bad]]);
        let annotator = annotator();
        let mut source = SyntheticSource::new(1, 32, 24, 10);
        let mut sink = MemorySink::default();

        let outcome = Pipeline::new(&mut backend, &annotator, CategoryTable::default())
            .run_stream(&mut source, &mut sink)
            .unwrap();

        assert_eq!(outcome.stats.detection_failures, 1);
        assert!(outcome.report.is_empty());
        assert_eq!(sink.frames.len(), 1);
    }

    #[test]
    fn only_filtered_detections_are_drawn() {
        let mut backend = ScriptedBackend::from_frames([vec![
            det(39, 0.2, Some(1)),
            det(39, 0.9, None),
        ]]);
        let annotator = annotator();
        let mut source = SyntheticSource::new(1, 32, 24, 10);
        let reference = source.next_frame().unwrap().unwrap();
        let mut source = SyntheticSource::new(1, 32, 24, 10);
        let mut sink = MemorySink::default();

        let outcome = Pipeline::new(&mut backend, &annotator, CategoryTable::default())
            .run_stream(&mut source, &mut sink)
            .unwrap();

        assert_eq!(outcome.stats.detections_dropped, 2);
        assert_eq!(sink.frames[0].pixels(), reference.pixels());
    }

    #[test]
    fn cancellation_aborts_between_frames() {
        let mut backend = ScriptedBackend::empty();
        let annotator = annotator();
        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        let mut source = SyntheticSource::new(10, 8, 8, 10);
        let mut sink = MemorySink::default();

        let err = Pipeline::new(&mut backend, &annotator, CategoryTable::default())
            .with_cancel(cancel)
            .with_progress(move |done| {
                if done == 3 {
                    trigger.cancel();
                }
            })
            .run_stream(&mut source, &mut sink)
            .unwrap_err();

        assert!(matches!(err, PipelineError::Cancelled { frames: 3 }));
        assert_eq!(sink.frames.len(), 3);
    }

    struct SlowBackend;

    impl DetectorBackend for SlowBackend {
        fn name(&self) -> &'static str {
            "slow"
        }

        fn supports(&self, _capability: crate::detect::DetectionCapability) -> bool {
            true
        }

        fn detect_and_track(&mut self, _frame: &Frame) -> anyhow::Result<Vec<Detection>> {
            std::thread::sleep(Duration::from_millis(20));
            Ok(vec![])
        }
    }

    #[test]
    fn frame_budget_is_enforced() {
        let mut backend = SlowBackend;
        let annotator = annotator();
        let mut source = SyntheticSource::new(2, 8, 8, 10);
        let mut sink = MemorySink::default();

        let err = Pipeline::new(&mut backend, &annotator, CategoryTable::default())
            .with_frame_budget(Some(Duration::from_millis(1)))
            .run_stream(&mut source, &mut sink)
            .unwrap_err();

        assert!(matches!(err, PipelineError::FrameBudgetExceeded { frame: 1, .. }));
        assert!(sink.frames.is_empty());
    }

    #[test]
    fn progress_reports_every_frame() {
        let mut backend = ScriptedBackend::empty();
        let annotator = annotator();
        let mut seen = Vec::new();
        let mut source = SyntheticSource::new(4, 8, 8, 10);
        let mut sink = MemorySink::default();

        Pipeline::new(&mut backend, &annotator, CategoryTable::default())
            .with_progress(|done| seen.push(done))
            .run_stream(&mut source, &mut sink)
            .unwrap();

        assert_eq!(seen, vec![1, 2, 3, 4]);
    }
}
