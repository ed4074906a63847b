//! # Pipeline Module
//!
//! Wires the stages together for whole directories of recordings.

pub mod discover;
pub mod engine;

pub use discover::find_videos;
pub use engine::{LapseEngine, LapseSummary};
