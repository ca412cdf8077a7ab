//! Video I/O adapter.
//!
//! Sources yield frames lazily, in capture order, with properties read once up
//! front:
//! - `stub://<frames>` synthetic source (testing, demos)
//! - a directory of still images, sorted by file name
//! - any other local file, decoded by FFmpeg (feature: video-ffmpeg)
//!
//! Sinks write frames in the order received to a staging location next to the
//! destination and only move it into place on `finish()`. A sink dropped before
//! `finish()` leaves nothing behind:
//! - container paths (`.mp4`, `.mkv`, `.avi`, `.mov`) are encoded by FFmpeg
//!   (feature: video-ffmpeg)
//! - any other path becomes a directory of `frame_NNNNNN.png` files

#[cfg(feature = "video-ffmpeg")]
mod ffmpeg;
mod image_seq;
mod synthetic;

use std::path::{Path, PathBuf};

use crate::error::PipelineError;
use crate::frame::{Frame, VideoProperties};

pub use image_seq::{ImageSequenceSink, ImageSequenceSource};
pub use synthetic::SyntheticSource;

/// Upstream upload ceiling. Larger inputs are treated as unavailable.
pub const DEFAULT_MAX_INPUT_BYTES: u64 = 32 * 1024 * 1024;
pub const DEFAULT_FALLBACK_FPS: u32 = 30;
pub const DEFAULT_SEQUENCE_FPS: u32 = 30;

/// Extensions written through the FFmpeg encoder.
pub const CONTAINER_EXTENSIONS: &[&str] = &["mp4", "mkv", "avi", "mov"];

#[derive(Clone, Debug)]
pub struct VideoSettings {
    /// Used when a container reports no usable frame rate.
    pub fallback_fps: u32,
    /// Frame rate assigned to image-sequence and synthetic sources.
    pub sequence_fps: u32,
    pub max_input_bytes: u64,
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            fallback_fps: DEFAULT_FALLBACK_FPS,
            sequence_fps: DEFAULT_SEQUENCE_FPS,
            max_input_bytes: DEFAULT_MAX_INPUT_BYTES,
        }
    }
}

/// Forward-only frame stream.
pub trait FrameSource {
    /// Dimensions and frame rate, fixed before the first frame is read.
    fn properties(&self) -> VideoProperties;

    /// Next frame in capture order, `None` at end of stream.
    fn next_frame(&mut self) -> Result<Option<Frame>, PipelineError>;

    fn frames_read(&self) -> u64;
}

/// Ordered frame writer.
pub trait FrameSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), PipelineError>;

    fn frames_written(&self) -> u64;

    /// Flush and move the staged output to its destination.
    fn finish(self: Box<Self>) -> Result<PathBuf, PipelineError>;
}

/// Open a frame source. Every failure is `SourceUnavailable`.
pub fn open_source(
    path: &str,
    settings: &VideoSettings,
) -> Result<Box<dyn FrameSource>, PipelineError> {
    if let Some(locator) = path.strip_prefix(synthetic::SCHEME) {
        return Ok(Box::new(SyntheticSource::parse(locator, settings.sequence_fps)?));
    }
    if !is_local_path(path) {
        return Err(PipelineError::source_unavailable(
            path,
            "only local paths are supported (no URL schemes)",
        ));
    }

    let metadata =
        std::fs::metadata(path).map_err(|e| PipelineError::source_unavailable(path, e))?;
    if metadata.is_dir() {
        return Ok(Box::new(ImageSequenceSource::open(
            Path::new(path),
            settings.sequence_fps,
        )?));
    }
    if metadata.len() > settings.max_input_bytes {
        return Err(PipelineError::source_unavailable(
            path,
            format!(
                "file is {} bytes, limit is {} bytes",
                metadata.len(),
                settings.max_input_bytes
            ),
        ));
    }
    open_container_source(path, settings)
}

#[cfg(feature = "video-ffmpeg")]
fn open_container_source(
    path: &str,
    settings: &VideoSettings,
) -> Result<Box<dyn FrameSource>, PipelineError> {
    Ok(Box::new(ffmpeg::FfmpegSource::open(
        path,
        settings.fallback_fps,
    )?))
}

#[cfg(not(feature = "video-ffmpeg"))]
fn open_container_source(
    path: &str,
    _settings: &VideoSettings,
) -> Result<Box<dyn FrameSource>, PipelineError> {
    Err(PipelineError::source_unavailable(
        path,
        "decoding video files requires the video-ffmpeg feature",
    ))
}

/// Open a sink mirroring `properties`.
pub fn open_sink(
    path: &Path,
    properties: VideoProperties,
) -> Result<Box<dyn FrameSink>, PipelineError> {
    if is_container_path(path) {
        open_container_sink(path, properties)
    } else {
        Ok(Box::new(ImageSequenceSink::create(path, properties)?))
    }
}

#[cfg(feature = "video-ffmpeg")]
fn open_container_sink(
    path: &Path,
    properties: VideoProperties,
) -> Result<Box<dyn FrameSink>, PipelineError> {
    Ok(Box::new(ffmpeg::FfmpegSink::create(path, properties)?))
}

#[cfg(not(feature = "video-ffmpeg"))]
fn open_container_sink(
    path: &Path,
    _properties: VideoProperties,
) -> Result<Box<dyn FrameSink>, PipelineError> {
    Err(PipelineError::sink_write(
        path,
        "encoding video files requires the video-ffmpeg feature",
    ))
}

pub fn is_container_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            CONTAINER_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
}

fn is_local_path(path: &str) -> bool {
    !path.trim().is_empty() && !path.contains("://")
}

/// Directory that holds staging output for `destination`.
fn staging_parent(destination: &Path) -> PathBuf {
    match destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Enforces the sink contract shared by every backend: fixed dimensions and
/// strictly increasing frame indices.
#[derive(Debug)]
struct FrameGate {
    properties: VideoProperties,
    last_index: Option<u64>,
    written: u64,
}

impl FrameGate {
    fn new(properties: VideoProperties) -> Self {
        Self {
            properties,
            last_index: None,
            written: 0,
        }
    }

    fn admit(&mut self, frame: &Frame, destination: &Path) -> Result<(), PipelineError> {
        if !self.properties.matches(frame) {
            return Err(PipelineError::sink_write(
                destination,
                format!(
                    "frame {} is {}x{}, sink expects {}x{}",
                    frame.index(),
                    frame.width(),
                    frame.height(),
                    self.properties.width,
                    self.properties.height
                ),
            ));
        }
        if let Some(last) = self.last_index {
            if frame.index() <= last {
                return Err(PipelineError::sink_write(
                    destination,
                    format!("frame {} written after frame {}", frame.index(), last),
                ));
            }
        }
        self.last_index = Some(frame.index());
        self.written += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    #[test]
    fn container_extensions_are_case_insensitive() {
        assert!(is_container_path(Path::new("out/processed_video.mp4")));
        assert!(is_container_path(Path::new("clip.MKV")));
        assert!(!is_container_path(Path::new("out/frames")));
        assert!(!is_container_path(Path::new("out/frame.png")));
    }

    #[test]
    fn missing_source_is_unavailable() {
        let err = open_source("/nonexistent/input_video.mp4", &VideoSettings::default())
            .err()
            .unwrap();
        assert!(matches!(err, PipelineError::SourceUnavailable { .. }));
    }

    #[test]
    fn url_sources_are_rejected() {
        let err = open_source("rtsp://camera/stream", &VideoSettings::default())
            .err()
            .unwrap();
        assert!(matches!(err, PipelineError::SourceUnavailable { .. }));
    }

    #[test]
    fn oversized_file_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.mp4");
        std::fs::write(&path, vec![0u8; 2048]).unwrap();
        let settings = VideoSettings {
            max_input_bytes: 1024,
            ..VideoSettings::default()
        };
        let err = open_source(path.to_str().unwrap(), &settings).err().unwrap();
        assert!(err.to_string().contains("limit is 1024 bytes"));
    }

    #[test]
    fn frame_gate_rejects_reordering_and_resizing() {
        let props = VideoProperties {
            width: 4,
            height: 4,
            fps: 10,
        };
        let mut gate = FrameGate::new(props);
        let dest = Path::new("out");
        gate.admit(&Frame::new(1, RgbImage::new(4, 4)), dest).unwrap();
        gate.admit(&Frame::new(2, RgbImage::new(4, 4)), dest).unwrap();
        assert!(gate.admit(&Frame::new(2, RgbImage::new(4, 4)), dest).is_err());
        assert!(gate.admit(&Frame::new(3, RgbImage::new(5, 4)), dest).is_err());
        assert_eq!(gate.written, 2);
    }

    #[test]
    fn staging_parent_defaults_to_current_dir() {
        assert_eq!(staging_parent(Path::new("frames")), PathBuf::from("."));
        assert_eq!(staging_parent(Path::new("out/frames")), PathBuf::from("out"));
    }
}
