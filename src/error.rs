use thiserror::Error;

/// Main error type for the motionlapse library
#[derive(Error, Debug)]
pub enum LapseError {
    #[error("Video error: {0}")]
    Video(#[from] VideoError),

    #[error("Motion detection error: {0}")]
    Motion(#[from] MotionError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Generic error: {0}")]
    Generic(String),
}

/// Errors raised while probing, decoding or encoding video streams
#[derive(Error, Debug)]
pub enum VideoError {
    #[error("Failed to open video: {path} ({reason})")]
    OpenFailed { path: String, reason: String },

    #[error("Failed to probe video metadata: {path} ({reason})")]
    ProbeFailed { path: String, reason: String },

    #[error("Video decoding failed: {path} ({reason})")]
    DecodingFailed { path: String, reason: String },

    #[error("Could not read frame {index} from {path}: {reason}")]
    FrameReadFailed { path: String, index: u64, reason: String },

    #[error("Video encoding failed: {reason}")]
    EncodingFailed { reason: String },
}

/// Errors raised by the background model and motion classification
#[derive(Error, Debug)]
pub enum MotionError {
    #[error("Frame size {actual:?} does not match model size {expected:?}")]
    FrameSizeMismatch { expected: (u32, u32), actual: (u32, u32) },
}

/// Configuration errors. All of these abort the whole run.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration file: {path} ({reason})")]
    ParseFailed { path: String, reason: String },

    #[error("Invalid configuration value: {key} = {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("Cadence for factor {factor} at {fps} fps -> {output_fps} fps rounds to zero")]
    ZeroCadence { factor: f64, fps: f64, output_fps: f64 },

    #[error("No videos to process")]
    EmptyVideoSet,

    #[error("Malformed interval set for {video}: {details}")]
    MalformedInterval { video: String, details: String },

    #[error("Region of interest is empty for a {width}x{height} frame")]
    EmptyRegion { width: u32, height: u32 },
}

/// Errors reading or writing persisted intermediate state
#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("Failed to parse checkpoint file: {path} ({reason})")]
    ParseFailed { path: String, reason: String },

    #[error("Failed to write checkpoint file: {path} ({reason})")]
    WriteFailed { path: String, reason: String },
}

/// Convenience type alias for Results using LapseError
pub type Result<T> = std::result::Result<T, LapseError>;

impl LapseError {
    /// Create a generic error with a custom message
    pub fn generic<S: Into<String>>(message: S) -> Self {
        Self::Generic(message.into())
    }

    /// Whether the pipeline may skip the failing unit and carry on.
    ///
    /// Only single-frame read failures qualify; everything else is fatal
    /// for its video or for the run.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Video(VideoError::FrameReadFailed { .. }))
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::Video(VideoError::OpenFailed { path, .. }) => {
                format!("Could not open video '{}'. Please check the file exists and ffmpeg can decode it.", path)
            }
            Self::Config(ConfigError::FileNotFound { path }) => {
                format!("Configuration file '{}' not found.", path)
            }
            Self::Config(ConfigError::ZeroCadence { factor, .. }) => {
                format!("Acceleration factor {} is too small for the configured output frame rate.", factor)
            }
            Self::Config(ConfigError::EmptyVideoSet) => {
                "No videos were found to process.".to_string()
            }
            _ => self.to_string(),
        }
    }
}
