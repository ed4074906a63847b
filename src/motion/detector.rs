use image::imageops::{self, FilterType};
use serde::{Deserialize, Serialize};

use crate::config::MotionConfig;
use crate::error::{ConfigError, MotionError, Result};
use crate::motion::background::BackgroundModel;
use crate::motion::morphology;
use crate::video::types::Frame;

/// Pixels trimmed from each edge of the frame before analysis, used to
/// leave out static structure such as walls or ceiling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionOfInterest {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

/// Absolute crop rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl RegionOfInterest {
    pub fn resolve(&self, width: u32, height: u32) -> Result<CropRect> {
        let horizontal = self.left.saturating_add(self.right);
        let vertical = self.top.saturating_add(self.bottom);
        if horizontal >= width || vertical >= height {
            return Err(ConfigError::EmptyRegion { width, height }.into());
        }

        Ok(CropRect {
            x: self.left,
            y: self.top,
            width: width - horizontal,
            height: height - vertical,
        })
    }
}

/// Binary motion classifier for the frames of one video.
///
/// Owns its background model; create one per scan.
pub struct MotionDetector {
    frame_size: (u32, u32),
    crop: CropRect,
    scaled: (u32, u32),
    morph_iterations: u32,
    threshold: u64,
    model: BackgroundModel,
}

impl MotionDetector {
    pub fn new(config: &MotionConfig, width: u32, height: u32) -> Result<Self> {
        let crop = config.region.resolve(width, height)?;
        let scale = config.downsample_scale.clamp(f32::MIN_POSITIVE, 1.0);
        let scaled = (
            ((crop.width as f32 * scale).round() as u32).max(1),
            ((crop.height as f32 * scale).round() as u32).max(1),
        );

        Ok(Self {
            frame_size: (width, height),
            crop,
            scaled,
            morph_iterations: config.morph_iterations,
            threshold: config.motion_threshold,
            model: BackgroundModel::new(scaled.0, scaled.1, config.history, config.var_threshold),
        })
    }

    pub fn crop(&self) -> CropRect {
        self.crop
    }

    /// Size of the mask the background model works on
    pub fn analysis_size(&self) -> (u32, u32) {
        self.scaled
    }

    /// Update the model with `frame` and return the cleaned mask sum
    pub fn score(&mut self, frame: &Frame) -> Result<u64> {
        let actual = (frame.width(), frame.height());
        if actual != self.frame_size {
            return Err(MotionError::FrameSizeMismatch {
                expected: self.frame_size,
                actual,
            }
            .into());
        }

        let region = imageops::crop_imm(
            frame.as_image(),
            self.crop.x,
            self.crop.y,
            self.crop.width,
            self.crop.height,
        )
        .to_image();

        let small = if (region.width(), region.height()) == self.scaled {
            region
        } else {
            imageops::resize(&region, self.scaled.0, self.scaled.1, FilterType::Triangle)
        };

        let mask = self.model.apply(&small)?;
        let cleaned = morphology::open(&mask, self.morph_iterations);
        Ok(morphology::mask_sum(&cleaned))
    }

    /// Whether `frame` shows motion: the mask sum strictly exceeds the threshold
    pub fn classify(&mut self, frame: &Frame) -> Result<bool> {
        Ok(self.score(frame)? > self.threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> MotionConfig {
        MotionConfig {
            downsample_scale: 0.5,
            ..MotionConfig::default()
        }
    }

    fn scene(block_at: Option<u32>) -> Frame {
        let mut frame = Frame::new_filled(64, 48, [90, 90, 90]);
        if let Some(x) = block_at {
            frame.fill_rect(x, 16, 16, 16, [250, 250, 250]);
        }
        frame
    }

    #[test]
    fn test_region_resolution() {
        let region = RegionOfInterest { left: 680, top: 230, right: 150, bottom: 100 };
        assert_eq!(
            region.resolve(1920, 1080).unwrap(),
            CropRect { x: 680, y: 230, width: 1090, height: 750 }
        );
        assert!(region.resolve(800, 600).is_err());
        assert_eq!(RegionOfInterest::default().resolve(4, 3).unwrap().width, 4);
    }

    #[test]
    fn test_analysis_size() {
        let detector = MotionDetector::new(&MotionConfig::default(), 1920, 1080).unwrap();
        assert_eq!(detector.analysis_size(), (768, 432));
    }

    #[test]
    fn test_detects_object_after_warm_up() {
        let mut detector = MotionDetector::new(&config(), 64, 48).unwrap();

        // Cold start: everything is foreground
        assert!(detector.classify(&scene(None)).unwrap());
        for _ in 0..10 {
            assert!(!detector.classify(&scene(None)).unwrap());
        }

        assert!(detector.classify(&scene(Some(8))).unwrap());
        assert!(detector.classify(&scene(Some(40))).unwrap());
        assert!(!detector.classify(&scene(None)).unwrap());
    }

    #[test]
    fn test_small_flicker_is_ignored() {
        let mut detector = MotionDetector::new(&config(), 64, 48).unwrap();
        for _ in 0..10 {
            detector.classify(&scene(None)).unwrap();
        }

        let mut speck = scene(None);
        speck.fill_rect(30, 30, 2, 2, [255, 0, 0]);
        assert_eq!(detector.score(&speck).unwrap(), 0);
    }

    #[test]
    fn test_region_limits_analysis() {
        let config = MotionConfig {
            region: RegionOfInterest { left: 32, top: 0, right: 0, bottom: 0 },
            ..config()
        };
        let mut detector = MotionDetector::new(&config, 64, 48).unwrap();
        for _ in 0..10 {
            detector.classify(&scene(None)).unwrap();
        }

        // Block entirely left of the region
        assert!(!detector.classify(&scene(Some(4))).unwrap());
        assert!(detector.classify(&scene(Some(40))).unwrap());
    }

    #[test]
    fn test_wrong_frame_size() {
        let mut detector = MotionDetector::new(&config(), 64, 48).unwrap();
        assert!(detector.classify(&Frame::new_black(32, 32)).is_err());
    }

    #[test]
    fn test_empty_region_is_config_error() {
        let config = MotionConfig {
            region: RegionOfInterest { left: 40, top: 0, right: 30, bottom: 0 },
            ..config()
        };
        assert!(matches!(
            MotionDetector::new(&config, 64, 48),
            Err(crate::error::LapseError::Config(ConfigError::EmptyRegion { .. }))
        ));
    }
}
