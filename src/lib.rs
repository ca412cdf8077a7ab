//! Floating Waste Tracker
//!
//! Processes one recorded video of a waterway: every frame is run through an
//! external detector/tracker, confident tracked detections are grouped into
//! waste categories, the frame is annotated, and a per-category report of
//! distinct objects and how long each stayed in view is produced at the end.
//!
//! # Architecture
//!
//! The run is a single forward pass with these guarantees:
//!
//! 1. **Consistent identity**: a track keeps the category it was first seen with.
//! 2. **Consistent output**: exactly the detections that are counted are drawn.
//! 3. **Ordered output**: every source frame is written once, in capture order,
//!    including frames whose detection failed.
//! 4. **All or nothing**: a fatal error discards the staged output and yields
//!    no report.
//!
//! # Module Structure
//!
//! - `category`: raw label to waste category table
//! - `track`: per-run track registry (first/last seen frame)
//! - `engine`: confidence/identity filter and aggregation into a `Report`
//! - `annotate`: box and label drawing
//! - `detect`: detector/tracker backend trait, registry and backends
//! - `video`: frame sources and sinks
//! - `pipeline`: the per-video driver

pub mod annotate;
pub mod category;
pub mod config;
pub mod detect;
pub mod engine;
pub mod error;
pub mod frame;
pub mod pipeline;
pub mod report;
pub mod track;
pub mod video;

pub use annotate::{Annotator, AnnotatorConfig};
pub use category::{Category, CategoryTable, ClassId};
pub use config::TrackerConfig;
pub use detect::{
    BackendRegistry, BoundingBox, Detection, DetectionCapability, DetectorBackend,
    ReplayBackend, ScriptedBackend, ScriptedFrame, TrackedDetection,
};
pub use engine::{AggregationEngine, EngineState, CONFIDENCE_THRESHOLD};
pub use error::{PipelineError, RegistryError};
pub use frame::{Frame, VideoProperties};
pub use pipeline::{CancelToken, Pipeline, RunOutcome, RunStats};
pub use report::{CategoryStats, ObjectTimeline, Report};
pub use track::{Track, TrackId, TrackRegistry};
pub use video::{open_sink, open_source, FrameSink, FrameSource, VideoSettings};
