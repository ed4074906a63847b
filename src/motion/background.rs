//! Adaptive per-pixel Gaussian mixture background model.
//!
//! Each pixel keeps up to [`MAX_MODES`] colour modes with a weight, an
//! isotropic variance and a mean. Modes are kept sorted by weight; the
//! heaviest modes whose weights add up to [`BACKGROUND_RATIO`] describe the
//! background. A sample close enough to one of those is background,
//! anything else is foreground.

use image::{GrayImage, RgbImage};
use rayon::prelude::*;

use crate::error::{MotionError, Result};

pub const MAX_MODES: usize = 5;

/// Share of the total weight that counts as background
pub const BACKGROUND_RATIO: f32 = 0.9;

/// Squared distance (in variances) under which a sample updates an existing mode
const GENERATE_THRESHOLD: f32 = 9.0;

const VARIANCE_INIT: f32 = 15.0;
const VARIANCE_MIN: f32 = 4.0;
const VARIANCE_MAX: f32 = 5.0 * VARIANCE_INIT;

/// Complexity reduction prior, pushes unused modes towards zero weight
const COMPLEXITY_PRIOR: f32 = 0.05;

pub const FOREGROUND: u8 = 255;
pub const BACKGROUND: u8 = 0;

#[derive(Debug, Clone, Copy, Default)]
struct Mode {
    weight: f32,
    variance: f32,
    mean: [f32; 3],
}

#[derive(Debug, Clone, Copy, Default)]
struct PixelModel {
    count: usize,
    modes: [Mode; MAX_MODES],
}

impl PixelModel {
    /// Update with one sample; returns true when the sample is background
    fn update(&mut self, sample: [f32; 3], alpha: f32, var_threshold: f32) -> bool {
        let prune = -alpha * COMPLEXITY_PRIOR;
        let keep = 1.0 - alpha;

        let mut background = false;
        let mut matched = false;
        let mut total_weight = 0.0f32;

        let mut i = 0;
        while i < self.count {
            let mut weight = keep * self.modes[i].weight + prune;
            let mut slot = i;

            if !matched {
                let mode = &mut self.modes[i];
                let diff = [
                    mode.mean[0] - sample[0],
                    mode.mean[1] - sample[1],
                    mode.mean[2] - sample[2],
                ];
                let dist2 = diff[0] * diff[0] + diff[1] * diff[1] + diff[2] * diff[2];

                if total_weight < BACKGROUND_RATIO && dist2 < var_threshold * mode.variance {
                    background = true;
                }

                if dist2 < GENERATE_THRESHOLD * mode.variance {
                    matched = true;
                    weight += alpha;
                    let k = alpha / weight;
                    for c in 0..3 {
                        mode.mean[c] -= k * diff[c];
                    }
                    mode.variance = (mode.variance + k * (dist2 - mode.variance))
                        .clamp(VARIANCE_MIN, VARIANCE_MAX);

                    // Keep modes sorted by weight
                    while slot > 0 && weight >= self.modes[slot - 1].weight {
                        self.modes.swap(slot, slot - 1);
                        slot -= 1;
                    }
                }
            }

            if weight < -prune {
                weight = 0.0;
            }
            self.modes[slot].weight = weight;
            total_weight += weight;
            i += 1;
        }

        // Pruned modes sort to the end
        while self.count > 0 && self.modes[self.count - 1].weight <= 0.0 {
            self.count -= 1;
        }

        if total_weight > 0.0 {
            for mode in &mut self.modes[..self.count] {
                mode.weight /= total_weight;
            }
        }

        if !matched {
            let slot = if self.count == MAX_MODES {
                MAX_MODES - 1
            } else {
                self.count += 1;
                self.count - 1
            };

            if self.count == 1 {
                self.modes[slot].weight = 1.0;
            } else {
                for mode in &mut self.modes[..self.count - 1] {
                    mode.weight *= keep;
                }
                self.modes[slot].weight = alpha;
            }
            self.modes[slot].mean = sample;
            self.modes[slot].variance = VARIANCE_INIT;

            let mut slot = slot;
            while slot > 0 && alpha >= self.modes[slot - 1].weight {
                self.modes.swap(slot, slot - 1);
                slot -= 1;
            }
        }

        background
    }
}

/// Background model for frames of one fixed size
pub struct BackgroundModel {
    width: u32,
    height: u32,
    history: u32,
    var_threshold: f32,
    frames_seen: u64,
    pixels: Vec<PixelModel>,
}

impl BackgroundModel {
    pub fn new(width: u32, height: u32, history: u32, var_threshold: f32) -> Self {
        Self {
            width,
            height,
            history: history.max(1),
            var_threshold,
            frames_seen: 0,
            pixels: vec![PixelModel::default(); width as usize * height as usize],
        }
    }

    /// Learning rate used for the next sample
    fn learning_rate(&self) -> f32 {
        let n = self.frames_seen + 1;
        if n == 1 {
            1.0
        } else {
            1.0 / (2 * n).min(self.history as u64) as f32
        }
    }

    /// Feed one frame and get its foreground mask
    pub fn apply(&mut self, image: &RgbImage) -> Result<GrayImage> {
        if image.dimensions() != (self.width, self.height) {
            return Err(MotionError::FrameSizeMismatch {
                expected: (self.width, self.height),
                actual: image.dimensions(),
            }
            .into());
        }

        let alpha = self.learning_rate();
        let var_threshold = self.var_threshold;
        let mut mask = vec![BACKGROUND; self.pixels.len()];

        self.pixels
            .par_iter_mut()
            .zip(image.as_raw().par_chunks_exact(3))
            .zip(mask.par_iter_mut())
            .for_each(|((pixel, rgb), out)| {
                let sample = [rgb[0] as f32, rgb[1] as f32, rgb[2] as f32];
                if !pixel.update(sample, alpha, var_threshold) {
                    *out = FOREGROUND;
                }
            });

        self.frames_seen += 1;

        GrayImage::from_raw(self.width, self.height, mask).ok_or_else(|| {
            MotionError::FrameSizeMismatch {
                expected: (self.width, self.height),
                actual: image.dimensions(),
            }
            .into()
        })
    }
}
