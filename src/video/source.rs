//! Buffered sequential access to the decoded frames of one video.
//!
//! A producer thread reads packed RGB24 frames from the decoder into a
//! bounded queue while the caller drains it. The producer blocks when the
//! queue is full, so every frame reaches the consumer in order.

use std::io::{ErrorKind, Read};
use std::process::Child;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use crate::error::{Result, VideoError};
use crate::video::backend::{terminate, DecodeStream, VideoBackend};
use crate::video::types::{Frame, VideoDescriptor};

pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

type Decoded = std::result::Result<Frame, VideoError>;

pub struct FrameSource {
    label: String,
    width: u32,
    height: u32,
    receiver: Option<Receiver<Decoded>>,
    stop: Arc<AtomicBool>,
    producer: Option<JoinHandle<()>>,
    process: Option<Child>,
    position: u64,
}

impl FrameSource {
    /// Start decoding `descriptor` through `backend`
    pub fn open(backend: &dyn VideoBackend, descriptor: &VideoDescriptor, capacity: usize) -> Result<Self> {
        let stream = backend.open_stream(descriptor)?;
        Self::from_stream(stream, descriptor.key(), descriptor.width, descriptor.height, capacity)
    }

    /// Start a producer over an already opened RGB24 stream
    pub fn from_stream(
        stream: DecodeStream,
        label: String,
        width: u32,
        height: u32,
        capacity: usize,
    ) -> Result<Self> {
        let (reader, process) = stream.into_parts();
        let (sender, receiver) = sync_channel(capacity.max(1));
        let stop = Arc::new(AtomicBool::new(false));

        let producer = {
            let stop = Arc::clone(&stop);
            let thread_label = label.clone();
            thread::Builder::new()
                .name("frame-source".to_string())
                .spawn(move || produce(reader, sender, stop, thread_label, width, height))
                .map_err(|e| VideoError::OpenFailed {
                    path: label.clone(),
                    reason: format!("could not start decode thread: {}", e),
                })?
        };

        Ok(Self {
            label,
            width,
            height,
            receiver: Some(receiver),
            stop,
            producer: Some(producer),
            process,
            position: 0,
        })
    }

    /// Next frame, or `None` once the stream is exhausted
    pub fn read(&mut self) -> Result<Option<Frame>> {
        let Some(receiver) = self.receiver.as_ref() else {
            return Ok(None);
        };

        match receiver.recv() {
            Ok(Ok(frame)) => {
                self.position += 1;
                Ok(Some(frame))
            }
            Ok(Err(e)) => Err(e.into()),
            Err(_) => {
                self.receiver = None;
                self.check_exit()?;
                Ok(None)
            }
        }
    }

    /// Wait for a decoder process whose output has ended; a failed exit
    /// means the stream is incomplete.
    fn check_exit(&mut self) -> Result<()> {
        let Some(mut process) = self.process.take() else {
            return Ok(());
        };

        let status = process.wait().map_err(|e| VideoError::DecodingFailed {
            path: self.label.clone(),
            reason: format!("waiting for decoder failed: {}", e),
        })?;

        if !status.success() {
            return Err(VideoError::DecodingFailed {
                path: self.label.clone(),
                reason: format!("decoder exited with {} after {} frames", status, self.position),
            }
            .into());
        }
        Ok(())
    }

    /// Discard frames so that the next `read` returns frame `index`
    pub fn seek_to(&mut self, index: u64) -> Result<()> {
        if index < self.position {
            return Err(VideoError::FrameReadFailed {
                path: self.label.clone(),
                index,
                reason: format!("cannot seek backwards from frame {}", self.position),
            }.into());
        }

        while self.position < index {
            if self.read()?.is_none() {
                return Err(VideoError::FrameReadFailed {
                    path: self.label.clone(),
                    index,
                    reason: format!("stream ended after {} frames", self.position),
                }.into());
            }
        }

        Ok(())
    }

    /// Index of the frame the next `read` returns
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Stop the producer and release the decoder.
    ///
    /// Frames still queued are discarded. Safe to call repeatedly and after
    /// the stream has ended.
    pub fn release(&mut self) {
        self.stop.store(true, Ordering::Release);
        // Dropping the receiver wakes a producer blocked on a full queue.
        drop(self.receiver.take());

        // Killed before the join: a producer blocked in `read` only wakes
        // once the pipe closes.
        if let Some(process) = self.process.take() {
            terminate(process);
        }

        if let Some(producer) = self.producer.take() {
            if producer.join().is_err() {
                warn!("Decode thread for {} panicked", self.label);
            }
            debug!("Released frame source for {} at frame {}", self.label, self.position);
        }
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.release();
    }
}

fn produce(
    mut reader: Box<dyn Read + Send>,
    sender: SyncSender<Decoded>,
    stop: Arc<AtomicBool>,
    label: String,
    width: u32,
    height: u32,
) {
    let frame_len = Frame::byte_len(width, height);

    while !stop.load(Ordering::Acquire) {
        let mut buffer = vec![0u8; frame_len];
        let decoded = match read_frame(&mut reader, &mut buffer) {
            Ok(false) => return,
            Ok(true) => Frame::from_rgb_bytes(width, height, buffer).ok_or_else(|| {
                VideoError::DecodingFailed {
                    path: label.clone(),
                    reason: "frame buffer size mismatch".to_string(),
                }
            }),
            Err(e) => Err(VideoError::DecodingFailed {
                path: label.clone(),
                reason: e.to_string(),
            }),
        };

        let failed = decoded.is_err();
        if sender.send(decoded).is_err() || failed {
            return;
        }
    }
}

/// Fill `buffer` with one frame. `Ok(false)` means a clean end of stream.
fn read_frame(reader: &mut dyn Read, buffer: &mut [u8]) -> std::io::Result<bool> {
    let mut filled = 0;
    while filled < buffer.len() {
        match reader.read(&mut buffer[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => {
                return Err(std::io::Error::new(
                    ErrorKind::UnexpectedEof,
                    format!("truncated frame ({} of {} bytes)", filled, buffer.len()),
                ))
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// `count` 2x2 frames whose pixels all carry the frame number
    fn numbered_stream(count: u8) -> DecodeStream {
        let bytes: Vec<u8> = (0..count)
            .flat_map(|i| std::iter::repeat(i).take(Frame::byte_len(2, 2)))
            .collect();
        DecodeStream::from_reader(Cursor::new(bytes))
    }

    fn open(count: u8, capacity: usize) -> FrameSource {
        FrameSource::from_stream(numbered_stream(count), "test".to_string(), 2, 2, capacity).unwrap()
    }

    #[test]
    fn test_reads_every_frame_in_order() {
        let mut source = open(10, 3);
        for expected in 0..10u8 {
            let frame = source.read().unwrap().unwrap();
            assert_eq!(frame.get_pixel(0, 0), [expected; 3]);
        }
        assert!(source.read().unwrap().is_none());
        assert!(source.read().unwrap().is_none());
        assert_eq!(source.position(), 10);
    }

    #[test]
    fn test_seek_forward() {
        let mut source = open(10, 2);
        source.seek_to(4).unwrap();
        assert_eq!(source.read().unwrap().unwrap().get_pixel(1, 1), [4; 3]);
        source.seek_to(7).unwrap();
        assert_eq!(source.read().unwrap().unwrap().get_pixel(1, 1), [7; 3]);
    }

    #[test]
    fn test_seek_errors_are_frame_read_failures() {
        let mut source = open(5, 2);
        source.seek_to(3).unwrap();
        let backwards = source.seek_to(1).unwrap_err();
        assert!(backwards.is_recoverable());

        let past_end = source.seek_to(9).unwrap_err();
        assert!(past_end.is_recoverable());
    }

    #[test]
    fn test_truncated_stream_reports_decode_error() {
        let mut bytes = vec![1u8; Frame::byte_len(2, 2)];
        bytes.extend_from_slice(&[2, 2, 2]);
        let stream = DecodeStream::from_reader(Cursor::new(bytes));
        let mut source = FrameSource::from_stream(stream, "short".to_string(), 2, 2, 4).unwrap();

        assert!(source.read().unwrap().is_some());
        assert!(matches!(
            source.read(),
            Err(crate::error::LapseError::Video(VideoError::DecodingFailed { .. }))
        ));
    }

    #[test]
    fn test_release_with_full_queue_and_after_end() {
        // Producer is blocked on a full queue when released
        let mut source = open(50, 1);
        assert!(source.read().unwrap().is_some());
        source.release();
        assert!(source.read().unwrap().is_none());
        source.release();

        let mut drained = open(2, 8);
        while drained.read().unwrap().is_some() {}
        drained.release();
    }

    #[cfg(unix)]
    fn shell_decoder(script: &str) -> FrameSource {
        use std::process::{Command, Stdio};

        let child = Command::new("sh")
            .args(["-c", script])
            .stdout(Stdio::piped())
            .spawn()
            .unwrap();
        let stream = DecodeStream::from_child(child).unwrap();
        FrameSource::from_stream(stream, "decoder".to_string(), 2, 2, 4).unwrap()
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_decoder_exit_is_an_error() {
        let mut source = shell_decoder("exit 1");
        assert!(matches!(
            source.read(),
            Err(crate::error::LapseError::Video(VideoError::DecodingFailed { .. }))
        ));
        assert!(source.read().unwrap().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_decoder_dying_between_frames_is_an_error() {
        // One complete 2x2 frame, then a failure exit
        let mut source = shell_decoder("printf '%012d' 0; exit 3");
        assert_eq!(source.read().unwrap().unwrap().get_pixel(0, 0), [b'0'; 3]);
        assert!(source.read().is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_clean_decoder_exit_ends_stream() {
        let mut source = shell_decoder("printf '%012d' 0");
        assert!(source.read().unwrap().is_some());
        assert!(source.read().unwrap().is_none());
    }
}
