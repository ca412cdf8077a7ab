//! Draws filtered detections onto frames.
//!
//! The annotator never filters: it draws every detection it is handed, so the
//! output video and the report always agree on what was counted.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use ab_glyph::{FontVec, PxScale};
use anyhow::{Context, Result};
use image::Rgb;
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;

use crate::detect::TrackedDetection;
use crate::frame::Frame;

pub const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const DEFAULT_THICKNESS: u32 = 2;
pub const DEFAULT_TEXT_SCALE: f32 = 16.0;
/// Label baseline offset above the box's top edge, in pixels.
const LABEL_OFFSET: i32 = 10;

/// Fonts tried when no font path is configured.
const SYSTEM_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

#[derive(Clone, Debug)]
pub struct AnnotatorConfig {
    pub font_path: Option<PathBuf>,
    pub thickness: u32,
    pub text_scale: f32,
}

impl Default for AnnotatorConfig {
    fn default() -> Self {
        Self {
            font_path: None,
            thickness: DEFAULT_THICKNESS,
            text_scale: DEFAULT_TEXT_SCALE,
        }
    }
}

pub struct Annotator {
    font: Option<FontVec>,
    color: Rgb<u8>,
    thickness: u32,
    scale: PxScale,
    warned_no_font: AtomicBool,
}

impl Annotator {
    /// Build an annotator. A configured font that cannot be loaded is an error;
    /// with no configured font the system locations are probed and labels are
    /// skipped if none loads.
    pub fn new(config: &AnnotatorConfig) -> Result<Self> {
        let font = match &config.font_path {
            Some(path) => Some(load_font(path)?),
            None => SYSTEM_FONTS
                .iter()
                .map(Path::new)
                .filter(|path| path.exists())
                .find_map(|path| load_font(path).ok()),
        };
        Ok(Self::with_font(font, config))
    }

    /// Annotator without a font: boxes only.
    pub fn boxes_only(config: &AnnotatorConfig) -> Self {
        Self::with_font(None, config)
    }

    fn with_font(font: Option<FontVec>, config: &AnnotatorConfig) -> Self {
        Self {
            font,
            color: BOX_COLOR,
            thickness: config.thickness.max(1),
            scale: PxScale::from(config.text_scale),
            warned_no_font: AtomicBool::new(false),
        }
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Draw a rectangle and a `"{category} #{id}: {conf}"` label for every detection.
    pub fn annotate(&self, frame: &mut Frame, detections: &[TrackedDetection]) {
        if detections.is_empty() {
            return;
        }
        if self.font.is_none() && !self.warned_no_font.swap(true, Ordering::Relaxed) {
            log::warn!("no font available, drawing boxes without labels");
        }

        let image = frame.image_mut();
        let (frame_width, frame_height) = image.dimensions();
        for detection in detections {
            let Some(span_x) = clip_span(detection.bbox.x1, detection.bbox.x2, frame_width) else {
                continue;
            };
            let Some(span_y) = clip_span(detection.bbox.y1, detection.bbox.y2, frame_height) else {
                continue;
            };
            let (x1, width) = span_x;
            let (y1, height) = span_y;

            for t in 0..self.thickness {
                let rect = Rect::at(x1.saturating_add(t as i32), y1.saturating_add(t as i32))
                    .of_size(
                        width.saturating_sub(2 * t).max(1),
                        height.saturating_sub(2 * t).max(1),
                    );
                draw_hollow_rect_mut(image, rect, self.color);
            }

            if let Some(font) = &self.font {
                let y = y1
                    .saturating_sub(LABEL_OFFSET)
                    .saturating_sub(self.scale.y.round() as i32 / 2);
                draw_text_mut(
                    image,
                    self.color,
                    x1,
                    y,
                    self.scale,
                    font,
                    &detection.label(),
                );
            }
        }
    }
}

/// Clip `[lo, hi)` to `[0, extent)`. Returns the first pixel and the length,
/// at least one pixel, or `None` when the span lies entirely off the frame.
fn clip_span(lo: f32, hi: f32, extent: u32) -> Option<(i32, u32)> {
    if extent == 0 {
        return None;
    }
    let last_pixel = i64::from(extent) - 1;
    let start = lo.round() as i64;
    let end = (hi.round() as i64).saturating_sub(1).max(start);
    if start > last_pixel || end < 0 {
        return None;
    }
    let start = start.clamp(0, last_pixel);
    let end = end.clamp(0, last_pixel);
    Some((start as i32, (end - start + 1) as u32))
}

fn load_font(path: &Path) -> Result<FontVec> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read font {}", path.display()))?;
    FontVec::try_from_vec(bytes).with_context(|| format!("invalid font {}", path.display()))
}
