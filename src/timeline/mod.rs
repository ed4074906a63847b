//! # Timeline Module
//!
//! Turns motion timestamps into active intervals and active intervals into
//! the tagged list of frames that make up the accelerated video.

pub mod interval;
pub mod record;
pub mod selector;

pub use interval::{coalesce, merge_intervals, validate_intervals, Interval};
pub use record::{TimestampRecord, TimestampStore};
pub use selector::{
    AccelerationSettings, BatchSelection, Cadence, FrameSelection, FrameSelector,
    GlobalFrameCounter, SelectedFrame, SpeedMode,
};
