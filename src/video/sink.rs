use std::io::Write;
use std::path::Path;
use std::process::Child;
use std::sync::mpsc::{sync_channel, SyncSender};
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use crate::error::{Result, VideoError};
use crate::video::backend::{EncodeStream, VideoBackend};
use crate::video::types::Frame;

/// Output stream fed through a bounded queue and a writer thread,
/// so the caller never waits on the encoder unless the queue is full.
pub struct FrameSink {
    label: String,
    width: u32,
    height: u32,
    sender: Option<SyncSender<Frame>>,
    writer: Option<JoinHandle<std::io::Result<u64>>>,
    process: Option<Child>,
}

impl FrameSink {
    pub fn open(
        backend: &dyn VideoBackend,
        path: &Path,
        width: u32,
        height: u32,
        fps: f64,
        capacity: usize,
    ) -> Result<Self> {
        let stream = backend.open_encoder(path, width, height, fps)?;
        Self::from_stream(stream, path.display().to_string(), width, height, capacity)
    }

    pub fn from_stream(
        stream: EncodeStream,
        label: String,
        width: u32,
        height: u32,
        capacity: usize,
    ) -> Result<Self> {
        let (mut output, process) = stream.into_parts();
        let (sender, receiver) = sync_channel::<Frame>(capacity.max(1));

        let writer = thread::Builder::new()
            .name("frame-sink".to_string())
            .spawn(move || {
                let mut written = 0u64;
                for frame in receiver {
                    output.write_all(frame.as_rgb_bytes())?;
                    written += 1;
                }
                output.flush()?;
                Ok(written)
            })
            .map_err(|e| VideoError::EncodingFailed {
                reason: format!("could not start writer thread: {}", e),
            })?;

        Ok(Self {
            label,
            width,
            height,
            sender: Some(sender),
            writer: Some(writer),
            process,
        })
    }

    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Queue one frame; blocks only while the queue is full
    pub fn write(&mut self, frame: Frame) -> Result<()> {
        if (frame.width(), frame.height()) != (self.width, self.height) {
            return Err(VideoError::EncodingFailed {
                reason: format!(
                    "frame is {}x{} but {} expects {}x{}",
                    frame.width(), frame.height(), self.label, self.width, self.height
                ),
            }.into());
        }

        let sender = self.sender.as_ref().ok_or_else(|| VideoError::EncodingFailed {
            reason: format!("{} is already finished", self.label),
        })?;

        if sender.send(frame).is_err() {
            // The writer only hangs up after an I/O failure.
            let reason = match self.join_writer() {
                Err(e) => e.to_string(),
                Ok(_) => "writer stopped early".to_string(),
            };
            return Err(VideoError::EncodingFailed { reason }.into());
        }
        Ok(())
    }

    /// Flush queued frames, close the stream and wait for the encoder.
    /// Returns the number of frames written.
    pub fn finish(mut self) -> Result<u64> {
        let written = self.join_writer();
        let status = self.wait_process();
        let written = written?;
        status?;
        debug!("Finished {} with {} frames", self.label, written);
        Ok(written)
    }

    fn join_writer(&mut self) -> Result<u64> {
        drop(self.sender.take());
        let Some(writer) = self.writer.take() else {
            return Ok(0);
        };

        match writer.join() {
            Ok(Ok(written)) => Ok(written),
            Ok(Err(e)) => Err(VideoError::EncodingFailed {
                reason: format!("writing to {} failed: {}", self.label, e),
            }.into()),
            Err(_) => Err(VideoError::EncodingFailed {
                reason: format!("writer thread for {} panicked", self.label),
            }.into()),
        }
    }

    fn wait_process(&mut self) -> Result<()> {
        let Some(mut process) = self.process.take() else {
            return Ok(());
        };

        let status = process.wait().map_err(|e| VideoError::EncodingFailed {
            reason: format!("waiting for encoder failed: {}", e),
        })?;

        if !status.success() {
            return Err(VideoError::EncodingFailed {
                reason: format!("encoder for {} exited with {}", self.label, status),
            }.into());
        }
        Ok(())
    }
}

impl Drop for FrameSink {
    fn drop(&mut self) {
        if self.writer.is_some() || self.process.is_some() {
            if let Err(e) = self.join_writer().and_then(|_| self.wait_process()) {
                warn!("Output {} was not closed cleanly: {}", self.label, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "encoder gone"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_frames_are_written_in_order() {
        let buffer = SharedBuffer::default();
        let stream = EncodeStream::from_writer(buffer.clone());
        let mut sink = FrameSink::from_stream(stream, "memory".to_string(), 2, 1, 2).unwrap();

        for value in [3u8, 5, 7] {
            sink.write(Frame::new_filled(2, 1, [value; 3])).unwrap();
        }
        assert_eq!(sink.finish().unwrap(), 3);

        let bytes = buffer.0.lock().unwrap().clone();
        assert_eq!(bytes.len(), 3 * Frame::byte_len(2, 1));
        assert_eq!(bytes[0], 3);
        assert_eq!(bytes[6], 5);
        assert_eq!(bytes[12], 7);
    }

    #[test]
    fn test_wrong_frame_size_is_rejected() {
        let stream = EncodeStream::from_writer(std::io::sink());
        let mut sink = FrameSink::from_stream(stream, "memory".to_string(), 4, 4, 2).unwrap();
        assert!(sink.write(Frame::new_black(2, 2)).is_err());
    }

    #[test]
    fn test_writer_failure_surfaces() {
        let stream = EncodeStream::from_writer(BrokenPipe);
        let mut sink = FrameSink::from_stream(stream, "broken".to_string(), 1, 1, 1).unwrap();

        let mut failed = false;
        for _ in 0..8 {
            if sink.write(Frame::new_black(1, 1)).is_err() {
                failed = true;
                break;
            }
        }
        assert!(failed || sink.finish().is_err());
    }
}
