//! Decoded video frame.
//!
//! - `Frame`: capture-order index plus an owned RGB8 buffer.
//! - `VideoProperties`: dimensions and frame rate, read once from a source before
//!   the first frame and handed to the sink unchanged.

use image::RgbImage;

/// One decoded frame. Indices are 1-based and follow capture order.
#[derive(Clone, Debug)]
pub struct Frame {
    index: u64,
    image: RgbImage,
}

impl Frame {
    pub fn new(index: u64, image: RgbImage) -> Self {
        Self { index, image }
    }

    /// Build a frame from packed RGB24 bytes. Returns `None` when the buffer length
    /// does not match the dimensions.
    pub fn from_rgb(index: u64, width: u32, height: u32, pixels: Vec<u8>) -> Option<Self> {
        RgbImage::from_raw(width, height, pixels).map(|image| Self { index, image })
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn image_mut(&mut self) -> &mut RgbImage {
        &mut self.image
    }

    /// Packed RGB24 pixel bytes, row-major.
    pub fn pixels(&self) -> &[u8] {
        self.image.as_raw()
    }
}

/// Stream properties shared by a source and the sink that mirrors it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VideoProperties {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl VideoProperties {
    pub fn matches(&self, frame: &Frame) -> bool {
        frame.width() == self.width && frame.height() == self.height
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_rgb_checks_buffer_length() {
        assert!(Frame::from_rgb(1, 4, 2, vec![0u8; 4 * 2 * 3]).is_some());
        assert!(Frame::from_rgb(1, 4, 2, vec![0u8; 5]).is_none());
    }

    #[test]
    fn properties_match_frame_dimensions() {
        let frame = Frame::new(3, RgbImage::new(8, 6));
        let props = VideoProperties {
            width: 8,
            height: 6,
            fps: 25,
        };
        assert!(props.matches(&frame));
        assert!(!VideoProperties { width: 6, ..props }.matches(&frame));
        assert_eq!(frame.index(), 3);
        assert_eq!(frame.pixels().len(), 8 * 6 * 3);
    }
}
