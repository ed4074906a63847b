//! # motionlapse
//!
//! Condense long security-camera recordings into one accelerated video that
//! slows down wherever something moves.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use motionlapse::{
//!     checkpoint::CheckpointFile,
//!     config::Config,
//!     pipeline::LapseEngine,
//!     video::FfmpegBackend,
//! };
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let config = Config::default();
//! let backend = Arc::new(FfmpegBackend::from_config(&config));
//!
//! let engine = LapseEngine::new(config, backend)
//!     .with_checkpoint(CheckpointFile::new("timestamps.json"));
//! engine.run("recordings/", "output/").await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! Data flows strictly forward through the modules:
//!
//! - [`video`] - buffered decoding ([`video::FrameSource`]), metadata and rendering
//! - [`motion`] - background subtraction and motion timestamp extraction
//! - [`timeline`] - interval merging and slow/fast frame selection
//! - [`checkpoint`] - persisted timestamp records
//! - [`pipeline`] - discovery and the end-to-end engine
//! - [`config`] - configuration management
//!
//! The stages can also be used on their own:
//!
//! ```rust
//! use motionlapse::timeline::{
//!     AccelerationSettings, FrameSelector, GlobalFrameCounter, SpeedMode, TimestampRecord,
//! };
//!
//! let mut record = TimestampRecord::new(vec![100, 105, 500], 50, 1_000);
//! record.merge(1.0, 1.0);
//!
//! let selector = FrameSelector::new(AccelerationSettings {
//!     output_fps: 50.0,
//!     slow_factor: 2.0,
//!     fast_factor: 20.0,
//! });
//! let mut counter = GlobalFrameCounter::default();
//! let selection = selector.select("cam.mp4", &record, &mut counter).unwrap();
//!
//! assert_eq!(counter.value(), 1_000);
//! assert!(selection.count(SpeedMode::Slow) > 0);
//! ```

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod motion;
pub mod pipeline;
pub mod timeline;
pub mod utils;
pub mod video;

// Re-export commonly used types for convenience
pub use crate::{
    config::Config,
    error::{LapseError, Result},
    pipeline::LapseEngine,
};
