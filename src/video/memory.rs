//! In-process video backend.
//!
//! Frames are generated on demand by a closure instead of being decoded, and
//! encoded output is kept in memory. Lets the whole pipeline run without the
//! ffmpeg executables.

use std::collections::{HashMap, HashSet};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{Result, VideoError};
use crate::video::backend::{DecodeStream, EncodeStream, VideoBackend};
use crate::video::types::{Frame, VideoDescriptor};

type FrameFn = Arc<dyn Fn(u64) -> Frame + Send + Sync>;

struct MemoryVideo {
    descriptor: VideoDescriptor,
    generator: FrameFn,
}

struct MemoryOutput {
    width: u32,
    height: u32,
    bytes: Arc<Mutex<Vec<u8>>>,
}

#[derive(Default)]
pub struct MemoryBackend {
    videos: HashMap<PathBuf, MemoryVideo>,
    broken: HashSet<PathBuf>,
    outputs: Mutex<HashMap<PathBuf, MemoryOutput>>,
    opens: Mutex<HashMap<PathBuf, usize>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a video whose frame `i` is `generator(i)`
    pub fn add_video<P, F>(&mut self, path: P, fps: f64, width: u32, height: u32, total_frames: u64, generator: F)
    where
        P: Into<PathBuf>,
        F: Fn(u64) -> Frame + Send + Sync + 'static,
    {
        let path = path.into();
        let descriptor = VideoDescriptor::new(path.clone(), fps, total_frames, width, height);
        self.videos.insert(path, MemoryVideo {
            descriptor,
            generator: Arc::new(generator),
        });
    }

    /// Register a video from a fixed list of frames
    pub fn add_frames<P: Into<PathBuf>>(&mut self, path: P, fps: f64, frames: Vec<Frame>) {
        let (width, height) = frames.first().map(|f| (f.width(), f.height())).unwrap_or((1, 1));
        let total = frames.len() as u64;
        let frames = Arc::new(frames);
        self.add_video(path, fps, width, height, total, move |i| frames[i as usize].clone());
    }

    /// Make `open_stream` fail for `path` while probing still succeeds
    pub fn break_video<P: Into<PathBuf>>(&mut self, path: P) {
        self.broken.insert(path.into());
    }

    /// How many times `path` was opened for decoding
    pub fn open_count<P: AsRef<Path>>(&self, path: P) -> usize {
        lock(&self.opens).get(path.as_ref()).copied().unwrap_or(0)
    }

    /// Frames encoded to `path` so far
    pub fn output_frames<P: AsRef<Path>>(&self, path: P) -> Option<Vec<Frame>> {
        let outputs = lock(&self.outputs);
        let output = outputs.get(path.as_ref())?;
        let bytes = lock(&output.bytes);
        let frame_len = Frame::byte_len(output.width, output.height);

        bytes
            .chunks_exact(frame_len)
            .map(|chunk| Frame::from_rgb_bytes(output.width, output.height, chunk.to_vec()))
            .collect()
    }
}

impl VideoBackend for MemoryBackend {
    fn probe(&self, path: &Path) -> Result<VideoDescriptor> {
        self.videos
            .get(path)
            .map(|video| video.descriptor.clone())
            .ok_or_else(|| {
                VideoError::ProbeFailed {
                    path: path.display().to_string(),
                    reason: "no such video".to_string(),
                }
                .into()
            })
    }

    fn open_stream(&self, descriptor: &VideoDescriptor) -> Result<DecodeStream> {
        *lock(&self.opens).entry(descriptor.path.clone()).or_insert(0) += 1;

        let video = self
            .videos
            .get(&descriptor.path)
            .filter(|_| !self.broken.contains(&descriptor.path))
            .ok_or_else(|| VideoError::OpenFailed {
                path: descriptor.key(),
                reason: "video cannot be decoded".to_string(),
            })?;

        Ok(DecodeStream::from_reader(GeneratedStream {
            generator: Arc::clone(&video.generator),
            next: 0,
            total: video.descriptor.total_frames,
            pending: Vec::new(),
            offset: 0,
        }))
    }

    fn open_encoder(&self, path: &Path, width: u32, height: u32, _fps: f64) -> Result<EncodeStream> {
        let bytes = Arc::new(Mutex::new(Vec::new()));
        lock(&self.outputs).insert(path.to_path_buf(), MemoryOutput {
            width,
            height,
            bytes: Arc::clone(&bytes),
        });
        Ok(EncodeStream::from_writer(SharedWriter(bytes)))
    }
}

/// Serves generated frames as a packed RGB24 byte stream
struct GeneratedStream {
    generator: FrameFn,
    next: u64,
    total: u64,
    pending: Vec<u8>,
    offset: usize,
}

impl Read for GeneratedStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.offset == self.pending.len() {
            if self.next == self.total {
                return Ok(0);
            }
            self.pending = (self.generator)(self.next).as_rgb_bytes().to_vec();
            self.offset = 0;
            self.next += 1;
        }

        let n = buf.len().min(self.pending.len() - self.offset);
        buf[..n].copy_from_slice(&self.pending[self.offset..self.offset + n]);
        self.offset += n;
        Ok(n)
    }
}

struct SharedWriter(Arc<Mutex<Vec<u8>>>);

impl Write for SharedWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        lock(&self.0).extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::sink::FrameSink;
    use crate::video::source::FrameSource;

    #[test]
    fn test_generated_frames_decode_in_order() {
        let mut backend = MemoryBackend::new();
        backend.add_video("a.mp4", 25.0, 3, 2, 4, |i| Frame::new_filled(3, 2, [i as u8 * 10; 3]));

        let descriptor = backend.probe(Path::new("a.mp4")).unwrap();
        let mut source = FrameSource::open(&backend, &descriptor, 2).unwrap();
        let mut values = Vec::new();
        while let Some(frame) = source.read().unwrap() {
            values.push(frame.get_pixel(2, 1)[0]);
        }
        assert_eq!(values, vec![0, 10, 20, 30]);
        assert_eq!(backend.open_count("a.mp4"), 1);
    }

    #[test]
    fn test_broken_video_probes_but_does_not_open() {
        let mut backend = MemoryBackend::new();
        backend.add_frames("b.mp4", 25.0, vec![Frame::new_black(2, 2)]);
        backend.break_video("b.mp4");

        let descriptor = backend.probe(Path::new("b.mp4")).unwrap();
        assert!(FrameSource::open(&backend, &descriptor, 2).is_err());
        assert!(backend.probe(Path::new("missing.mp4")).is_err());
    }

    #[test]
    fn test_encoded_frames_are_kept() {
        let backend = MemoryBackend::new();
        let mut sink = FrameSink::open(&backend, Path::new("out.mp4"), 2, 2, 25.0, 4).unwrap();
        sink.write(Frame::new_filled(2, 2, [1, 2, 3])).unwrap();
        sink.write(Frame::new_filled(2, 2, [4, 5, 6])).unwrap();
        sink.finish().unwrap();

        let frames = backend.output_frames("out.mp4").unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].get_pixel(0, 0), [4, 5, 6]);
        assert!(backend.output_frames("other.mp4").is_none());
    }
}
