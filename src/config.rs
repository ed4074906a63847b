use std::path::Path;
use serde::{Deserialize, Serialize};

use crate::{
    error::{ConfigError, Result},
    motion::RegionOfInterest,
    timeline::AccelerationSettings,
};

/// Main configuration for motionlapse
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Motion detection tunables
    pub motion: MotionConfig,

    /// Padding around motion events
    pub intervals: IntervalConfig,

    /// Playback speed settings
    pub acceleration: AccelerationConfig,

    /// Worker pool, queues and input discovery
    pub processing: ProcessingConfig,

    /// Encoder settings for rendered videos
    pub output: OutputConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound { path: path.display().to_string() })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::ParseFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::InvalidValue {
                key: "config".to_string(),
                value: e.to_string()
            })?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.motion.validate()?;
        self.intervals.validate()?;
        self.acceleration.validate()?;
        self.processing.validate()?;
        self.output.validate()?;
        Ok(())
    }
}

fn invalid<V: ToString>(key: &str, value: V) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

/// Background subtraction and motion classification settings.
///
/// The defaults are a reasonable starting point, not a calibration: the
/// region of interest, history length and threshold depend on where the
/// camera is mounted and should be tuned per scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    /// Linear scale applied to the cropped region (0.0-1.0]
    pub downsample_scale: f32,

    /// Number of samples the background model adapts over
    pub history: u32,

    /// Squared Mahalanobis distance above which a pixel is foreground
    pub var_threshold: f32,

    /// Erosion and dilation passes applied to the foreground mask
    pub morph_iterations: u32,

    /// Motion is present when the mask sum strictly exceeds this value
    pub motion_threshold: u64,

    /// Only every Nth frame is analysed
    pub frame_skip: u64,

    /// Pixels trimmed from each edge before analysis
    pub region: RegionOfInterest,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            downsample_scale: 0.4,
            history: 300,
            var_threshold: 16.0,
            morph_iterations: 2,
            motion_threshold: 4,
            frame_skip: 5,
            region: RegionOfInterest::default(),
        }
    }
}

impl MotionConfig {
    fn validate(&self) -> Result<()> {
        if !(self.downsample_scale > 0.0 && self.downsample_scale <= 1.0) {
            return Err(invalid("motion.downsample_scale", self.downsample_scale).into());
        }

        if self.history == 0 {
            return Err(invalid("motion.history", self.history).into());
        }

        if !(self.var_threshold > 0.0) {
            return Err(invalid("motion.var_threshold", self.var_threshold).into());
        }

        if self.frame_skip == 0 {
            return Err(invalid("motion.frame_skip", self.frame_skip).into());
        }

        Ok(())
    }
}

/// How far an active interval extends around each motion timestamp
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntervalConfig {
    /// Seconds of slow playback before a motion event
    pub before_seconds: f64,

    /// Seconds of slow playback after a motion event
    pub after_seconds: f64,
}

impl Default for IntervalConfig {
    fn default() -> Self {
        Self {
            before_seconds: 1.0,
            after_seconds: 1.0,
        }
    }
}

impl IntervalConfig {
    fn validate(&self) -> Result<()> {
        if !(self.before_seconds >= 0.0) {
            return Err(invalid("intervals.before_seconds", self.before_seconds).into());
        }

        if !(self.after_seconds >= 0.0) {
            return Err(invalid("intervals.after_seconds", self.after_seconds).into());
        }

        Ok(())
    }
}

/// Output speed settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccelerationConfig {
    /// Speed-up applied inside active intervals
    pub slow_factor: f64,

    /// Speed-up applied everywhere else
    pub fast_factor: f64,

    /// Frame rate of the rendered video
    pub output_fps: f64,

    /// When set, a second uniform-speed video is rendered with this factor
    pub timelapse_factor: Option<f64>,
}

impl Default for AccelerationConfig {
    fn default() -> Self {
        Self {
            slow_factor: 140.0,
            fast_factor: 4000.0,
            output_fps: 50.0,
            timelapse_factor: None,
        }
    }
}

impl AccelerationConfig {
    /// Settings for the main slow/fast render
    pub fn settings(&self) -> AccelerationSettings {
        AccelerationSettings {
            output_fps: self.output_fps,
            slow_factor: self.slow_factor,
            fast_factor: self.fast_factor,
        }
    }

    /// Settings for the optional timelapse render
    pub fn timelapse_settings(&self) -> Option<AccelerationSettings> {
        self.timelapse_factor.map(|factor| AccelerationSettings {
            output_fps: self.output_fps,
            slow_factor: factor,
            fast_factor: factor,
        })
    }

    fn validate(&self) -> Result<()> {
        if !(self.output_fps > 0.0) {
            return Err(invalid("acceleration.output_fps", self.output_fps).into());
        }

        if !(self.slow_factor > 0.0) {
            return Err(invalid("acceleration.slow_factor", self.slow_factor).into());
        }

        if !(self.fast_factor > 0.0) {
            return Err(invalid("acceleration.fast_factor", self.fast_factor).into());
        }

        if let Some(factor) = self.timelapse_factor {
            if !(factor > 0.0) {
                return Err(invalid("acceleration.timelapse_factor", factor).into());
            }
        }

        Ok(())
    }
}

/// Worker pool, buffering and input discovery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Motion scan workers; `None` uses all cores but one
    pub workers: Option<usize>,

    /// Videos scanned per checkpoint, as a multiple of the worker count
    pub checkpoint_batch_multiplier: usize,

    /// Decoded frames buffered ahead of the consumer
    pub queue_capacity: usize,

    /// Videos whose path contains any of these skip motion detection
    pub exclude_patterns: Vec<String>,

    /// Extension of the source videos, without the dot
    pub video_extension: String,

    /// ffmpeg executable used for decoding and encoding
    pub ffmpeg_binary: String,

    /// ffprobe executable used for metadata
    pub ffprobe_binary: String,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            workers: None,
            checkpoint_batch_multiplier: 3,
            queue_capacity: 100,
            exclude_patterns: Vec::new(),
            video_extension: "mp4".to_string(),
            ffmpeg_binary: "ffmpeg".to_string(),
            ffprobe_binary: "ffprobe".to_string(),
        }
    }
}

impl ProcessingConfig {
    /// Effective worker count
    pub fn worker_count(&self) -> usize {
        self.workers
            .unwrap_or_else(|| num_cpus::get().saturating_sub(1))
            .max(1)
    }

    fn validate(&self) -> Result<()> {
        if self.workers == Some(0) {
            return Err(invalid("processing.workers", 0).into());
        }

        if self.checkpoint_batch_multiplier == 0 {
            return Err(invalid("processing.checkpoint_batch_multiplier", 0).into());
        }

        if self.queue_capacity == 0 {
            return Err(invalid("processing.queue_capacity", 0).into());
        }

        Ok(())
    }
}

/// Encoder settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// ffmpeg video codec
    pub codec: String,

    /// Constant rate factor (0-51, lower is better)
    pub crf: u8,

    /// Output pixel format
    pub pixel_format: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            codec: "libx264".to_string(),
            crf: 23,
            pixel_format: "yuv420p".to_string(),
        }
    }
}

impl OutputConfig {
    fn validate(&self) -> Result<()> {
        if self.crf > 51 {
            return Err(invalid("output.crf", self.crf).into());
        }

        if self.codec.is_empty() {
            return Err(invalid("output.codec", "").into());
        }

        Ok(())
    }
}
