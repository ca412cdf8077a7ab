use crate::error::PipelineError;
use crate::frame::{Frame, VideoProperties};

use super::FrameSource;

pub(super) const SCHEME: &str = "stub://";

const DEFAULT_WIDTH: u32 = 64;
const DEFAULT_HEIGHT: u32 = 48;

/// Generated frames for tests and demos: `stub://<frames>` or
/// `stub://<frames>@<width>x<height>`.
pub struct SyntheticSource {
    properties: VideoProperties,
    total: u64,
    frame_count: u64,
}

impl SyntheticSource {
    pub fn new(total: u64, width: u32, height: u32, fps: u32) -> Self {
        Self {
            properties: VideoProperties { width, height, fps },
            total,
            frame_count: 0,
        }
    }

    pub(super) fn parse(locator: &str, fps: u32) -> Result<Self, PipelineError> {
        let invalid = |reason: &str| {
            PipelineError::source_unavailable(format!("{SCHEME}{locator}"), reason)
        };
        let (count, size) = match locator.split_once('@') {
            Some((count, size)) => (count, Some(size)),
            None => (locator, None),
        };
        let total: u64 = count
            .trim()
            .parse()
            .map_err(|_| invalid("frame count must be an integer"))?;
        let (width, height) = match size {
            Some(size) => {
                let (w, h) = size
                    .split_once('x')
                    .ok_or_else(|| invalid("size must be <width>x<height>"))?;
                let w: u32 = w.parse().map_err(|_| invalid("invalid width"))?;
                let h: u32 = h.parse().map_err(|_| invalid("invalid height"))?;
                if w == 0 || h == 0 {
                    return Err(invalid("dimensions must be non-zero"));
                }
                (w, h)
            }
            None => (DEFAULT_WIDTH, DEFAULT_HEIGHT),
        };
        log::info!(
            "SyntheticSource: {} frames of {}x{} at {} fps",
            total,
            width,
            height,
            fps
        );
        Ok(Self::new(total, width, height, fps))
    }

    fn generate_pixels(&self) -> Vec<u8> {
        let VideoProperties { width, height, .. } = self.properties;
        let mut pixels = vec![0u8; rgb_len(width, height)];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 + self.frame_count * 7) % 256) as u8;
        }
        pixels
    }
}

/// Packed RGB24 buffer length, computed in `usize`.
fn rgb_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * 3
}

impl FrameSource for SyntheticSource {
    fn properties(&self) -> VideoProperties {
        self.properties
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, PipelineError> {
        if self.frame_count >= self.total {
            return Ok(None);
        }
        self.frame_count += 1;
        let VideoProperties { width, height, .. } = self.properties;
        let frame = Frame::from_rgb(self.frame_count, width, height, self.generate_pixels())
            .ok_or_else(|| {
                PipelineError::source_unavailable(SCHEME, "synthetic buffer size mismatch")
            })?;
        Ok(Some(frame))
    }

    fn frames_read(&self) -> u64 {
        self.frame_count
    }
}
