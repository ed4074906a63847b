use image::{ImageBuffer, Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A single decoded video frame
///
/// Thin wrapper around an RGB image buffer with the handful of pixel
/// helpers the detector and the overlay need.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    buffer: RgbImage,
}

impl Frame {
    pub fn new(buffer: RgbImage) -> Self {
        Self { buffer }
    }

    /// All-black frame
    pub fn new_black(width: u32, height: u32) -> Self {
        let buffer = ImageBuffer::new(width, height);
        Self { buffer }
    }

    /// Single-colour frame
    pub fn new_filled(width: u32, height: u32, color: [u8; 3]) -> Self {
        Self::new(ImageBuffer::from_pixel(width, height, Rgb(color)))
    }

    pub fn width(&self) -> u32 {
        self.buffer.width()
    }

    pub fn height(&self) -> u32 {
        self.buffer.height()
    }

    /// RGB value at (x, y); panics outside the frame
    pub fn get_pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let pixel = self.buffer.get_pixel(x, y);
        [pixel[0], pixel[1], pixel[2]]
    }

    /// Fill an axis-aligned rectangle, clipped to the frame
    pub fn fill_rect(&mut self, x: u32, y: u32, width: u32, height: u32, color: [u8; 3]) {
        let x_end = x.saturating_add(width).min(self.width());
        let y_end = y.saturating_add(height).min(self.height());
        for py in y..y_end {
            for px in x..x_end {
                self.buffer.put_pixel(px, py, Rgb(color));
            }
        }
    }

    pub fn as_image(&self) -> &RgbImage {
        &self.buffer
    }

    /// Packed RGB24 bytes, row-major
    pub fn as_rgb_bytes(&self) -> &[u8] {
        self.buffer.as_raw()
    }

    /// `None` unless `data` holds exactly one packed RGB24 frame
    pub fn from_rgb_bytes(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        ImageBuffer::from_raw(width, height, data)
            .map(|buffer| Self { buffer })
    }

    /// Size of one packed RGB24 frame in bytes
    pub fn byte_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * 3
    }
}

/// Immutable metadata of one source video, probed once and shared by every stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoDescriptor {
    pub path: PathBuf,

    /// Source frame rate
    pub fps: f64,

    /// Number of frames in the container
    pub total_frames: u64,

    pub width: u32,

    pub height: u32,
}

impl VideoDescriptor {
    pub fn new<P: Into<PathBuf>>(path: P, fps: f64, total_frames: u64, width: u32, height: u32) -> Self {
        Self {
            path: path.into(),
            fps,
            total_frames,
            width,
            height,
        }
    }

    /// Key used for this video in timestamp stores and selections
    pub fn key(&self) -> String {
        self.path.display().to_string()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Frame rate rounded the way persisted records store it
    pub fn rounded_fps(&self) -> u32 {
        self.fps.round().max(0.0) as u32
    }

    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_bytes_roundtrip() {
        let frame = Frame::new_filled(4, 3, [10, 20, 30]);
        assert_eq!(frame.as_rgb_bytes().len(), Frame::byte_len(4, 3));

        let copy = Frame::from_rgb_bytes(4, 3, frame.as_rgb_bytes().to_vec()).unwrap();
        assert_eq!(copy, frame);
        assert!(Frame::from_rgb_bytes(4, 3, vec![0; 5]).is_none());
    }

    #[test]
    fn test_fill_rect_is_clipped() {
        let mut frame = Frame::new_black(8, 8);
        frame.fill_rect(6, 6, 10, 10, [255, 0, 0]);
        assert_eq!(frame.get_pixel(7, 7), [255, 0, 0]);
        assert_eq!(frame.get_pixel(5, 5), [0, 0, 0]);
    }

    #[test]
    fn test_descriptor_key_and_fps() {
        let descriptor = VideoDescriptor::new("cam/17d/10h/a.mp4", 24.97, 100, 640, 480);
        assert_eq!(descriptor.key(), "cam/17d/10h/a.mp4");
        assert_eq!(descriptor.rounded_fps(), 25);
        assert_eq!(descriptor.resolution(), (640, 480));
    }
}
