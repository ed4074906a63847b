//! # Motion Module
//!
//! Background subtraction over a region of interest, and the extractor that
//! runs it across whole videos to collect motion timestamps.

pub mod background;
pub mod detector;
pub mod extractor;
pub mod morphology;

pub use background::BackgroundModel;
pub use detector::{CropRect, MotionDetector, RegionOfInterest};
pub use extractor::{
    BatchReport, ExclusionPolicy, NoExclusion, PathPatternExclusion, ScanRange, TimestampExtractor,
};
