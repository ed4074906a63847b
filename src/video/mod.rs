//! # Video Module
//!
//! Decoding, buffering, encoding and annotation of video frames.
//!
//! Pixels move through the pipeline as packed RGB24 streams behind the
//! [`VideoBackend`] trait: [`FfmpegBackend`] drives the ffmpeg executables,
//! [`MemoryBackend`] generates frames in-process.

pub mod backend;
pub mod memory;
pub mod overlay;
pub mod probe;
pub mod renderer;
pub mod sink;
pub mod source;
pub mod types;

pub use backend::{DecodeStream, EncodeStream, FfmpegBackend, VideoBackend};
pub use memory::MemoryBackend;
pub use overlay::SpeedOverlay;
pub use probe::VideoProbe;
pub use renderer::{AcceleratedRenderer, RenderReport};
pub use sink::FrameSink;
pub use source::FrameSource;
pub use types::{Frame, VideoDescriptor};
