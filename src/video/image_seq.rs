//! Still-image sequences as a video: a directory of frames in, a directory of
//! PNG frames out.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::error::PipelineError;
use crate::frame::{Frame, VideoProperties};

use super::{staging_parent, FrameGate, FrameSink, FrameSource};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp"];

pub struct ImageSequenceSource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    properties: VideoProperties,
    frame_count: u64,
}

impl ImageSequenceSource {
    pub fn open(dir: &Path, fps: u32) -> Result<Self, PipelineError> {
        let entries = fs::read_dir(dir).map_err(|e| PipelineError::source_unavailable(dir, e))?;
        let mut files = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|e| PipelineError::source_unavailable(dir, e))?
                .path();
            if path.is_file() && has_image_extension(&path) {
                files.push(path);
            }
        }
        files.sort();

        let (width, height) = match files.first() {
            Some(first) => image::image_dimensions(first)
                .map_err(|e| PipelineError::source_unavailable(first, e))?,
            None => (0, 0),
        };
        log::info!(
            "ImageSequenceSource: {} frames of {}x{} in {}",
            files.len(),
            width,
            height,
            dir.display()
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            files,
            properties: VideoProperties { width, height, fps },
            frame_count: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FrameSource for ImageSequenceSource {
    fn properties(&self) -> VideoProperties {
        self.properties
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, PipelineError> {
        let Some(path) = self.files.get(self.frame_count as usize) else {
            return Ok(None);
        };
        let image = image::open(path)
            .map_err(|e| PipelineError::source_unavailable(path, e))?
            .to_rgb8();
        self.frame_count += 1;
        let frame = Frame::new(self.frame_count, image);
        if !self.properties.matches(&frame) {
            return Err(PipelineError::source_unavailable(
                &self.dir,
                format!(
                    "{} is {}x{}, sequence is {}x{}",
                    path.display(),
                    frame.width(),
                    frame.height(),
                    self.properties.width,
                    self.properties.height
                ),
            ));
        }
        Ok(Some(frame))
    }

    fn frames_read(&self) -> u64 {
        self.frame_count
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.iter().any(|k| k.eq_ignore_ascii_case(ext)))
}

/// Writes `frame_NNNNNN.png` files into a staging directory beside the
/// destination. `finish()` replaces the destination directory with it.
pub struct ImageSequenceSink {
    destination: PathBuf,
    staging: TempDir,
    gate: FrameGate,
}

impl ImageSequenceSink {
    pub fn create(destination: &Path, properties: VideoProperties) -> Result<Self, PipelineError> {
        let parent = staging_parent(destination);
        fs::create_dir_all(&parent).map_err(|e| PipelineError::sink_write(destination, e))?;
        let staging = tempfile::Builder::new()
            .prefix(".frames-staging-")
            .tempdir_in(&parent)
            .map_err(|e| PipelineError::sink_write(destination, e))?;
        log::debug!(
            "ImageSequenceSink: staging {} for {}",
            staging.path().display(),
            destination.display()
        );
        Ok(Self {
            destination: destination.to_path_buf(),
            staging,
            gate: FrameGate::new(properties),
        })
    }
}

impl FrameSink for ImageSequenceSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), PipelineError> {
        self.gate.admit(frame, &self.destination)?;
        let path = self
            .staging
            .path()
            .join(format!("frame_{:06}.png", self.gate.written));
        frame
            .image()
            .save_with_format(&path, image::ImageFormat::Png)
            .map_err(|e| PipelineError::sink_write(&self.destination, e))
    }

    fn frames_written(&self) -> u64 {
        self.gate.written
    }

    fn finish(self: Box<Self>) -> Result<PathBuf, PipelineError> {
        let Self {
            destination,
            staging,
            gate,
        } = *self;
        let staged = staging.keep();
        let previous = if destination.is_dir() {
            let aside = staged.with_extension("previous");
            if let Err(e) = fs::rename(&destination, &aside) {
                let _ = fs::remove_dir_all(&staged);
                return Err(PipelineError::sink_write(&destination, e));
            }
            Some(aside)
        } else {
            None
        };
        if let Err(e) = fs::rename(&staged, &destination) {
            if let Some(aside) = &previous {
                let _ = fs::rename(aside, &destination);
            }
            let _ = fs::remove_dir_all(&staged);
            return Err(PipelineError::sink_write(&destination, e));
        }
        if let Some(aside) = previous {
            if let Err(e) = fs::remove_dir_all(&aside) {
                log::warn!(
                    "ImageSequenceSink: could not remove previous output {}: {}",
                    aside.display(),
                    e
                );
            }
        }
        log::info!(
            "ImageSequenceSink: wrote {} frames to {}",
            gate.written,
            destination.display()
        );
        Ok(destination)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn props(width: u32, height: u32) -> VideoProperties {
        VideoProperties {
            width,
            height,
            fps: 30,
        }
    }

    #[test]
    fn sink_commits_only_on_finish() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("processed");

        let mut sink = Box::new(ImageSequenceSink::create(&dest, props(4, 3)).unwrap());
        sink.write_frame(&Frame::new(1, RgbImage::new(4, 3))).unwrap();
        sink.write_frame(&Frame::new(2, RgbImage::new(4, 3))).unwrap();
        assert!(!dest.exists());

        let committed = sink.finish().unwrap();
        assert_eq!(committed, dest);
        assert!(dest.join("frame_000001.png").exists());
        assert!(dest.join("frame_000002.png").exists());
    }

    #[test]
    fn dropped_sink_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("processed");
        {
            let mut sink = ImageSequenceSink::create(&dest, props(2, 2)).unwrap();
            sink.write_frame(&Frame::new(1, RgbImage::new(2, 2))).unwrap();
        }
        assert!(!dest.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn commit_replaces_previous_output_without_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("processed");
        fs::create_dir(&dest).unwrap();
        fs::write(dest.join("stale.txt"), b"old run").unwrap();

        let mut sink = Box::new(ImageSequenceSink::create(&dest, props(2, 2)).unwrap());
        sink.write_frame(&Frame::new(1, RgbImage::new(2, 2))).unwrap();
        sink.finish().unwrap();

        assert!(!dest.join("stale.txt").exists());
        assert!(dest.join("frame_000001.png").exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn failed_commit_keeps_existing_destination() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("processed");
        fs::write(&dest, b"not a directory").unwrap();

        let mut sink = Box::new(ImageSequenceSink::create(&dest, props(2, 2)).unwrap());
        sink.write_frame(&Frame::new(1, RgbImage::new(2, 2))).unwrap();
        let err = sink.finish().unwrap_err();

        assert!(matches!(err, PipelineError::SinkWriteFailure { .. }));
        assert_eq!(fs::read(&dest).unwrap(), b"not a directory");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn round_trips_through_source() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("frames");
        let mut sink = Box::new(ImageSequenceSink::create(&dest, props(3, 2)).unwrap());
        for index in 1..=3u8 {
            let image = RgbImage::from_pixel(3, 2, Rgb([index, 0, 0]));
            sink.write_frame(&Frame::new(index as u64, image)).unwrap();
        }
        sink.finish().unwrap();

        let mut source = ImageSequenceSource::open(&dest, 15).unwrap();
        assert_eq!(source.len(), 3);
        assert_eq!(source.properties(), VideoProperties { fps: 15, ..props(3, 2) });
        let mut reds = Vec::new();
        while let Some(frame) = source.next_frame().unwrap() {
            reds.push(frame.image().get_pixel(0, 0)[0]);
        }
        assert_eq!(reds, vec![1, 2, 3]);
    }

    #[test]
    fn mismatched_frame_size_is_a_source_error() {
        let dir = tempfile::tempdir().unwrap();
        RgbImage::new(4, 4).save(dir.path().join("a.png")).unwrap();
        RgbImage::new(5, 4).save(dir.path().join("b.png")).unwrap();
        let mut source = ImageSequenceSource::open(dir.path(), 30).unwrap();
        assert!(source.next_frame().unwrap().is_some());
        assert!(matches!(
            source.next_frame(),
            Err(PipelineError::SourceUnavailable { .. })
        ));
    }

    #[test]
    fn empty_directory_is_an_empty_video() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = ImageSequenceSource::open(dir.path(), 30).unwrap();
        assert!(source.is_empty());
        assert!(source.next_frame().unwrap().is_none());
    }
}
