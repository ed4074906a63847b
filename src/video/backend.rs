use std::io::{ErrorKind, Read, Write};
use std::path::Path;
use std::process::{Child, Command, Stdio};

use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{Result, VideoError};
use crate::video::probe::parse_probe_output;
use crate::video::types::VideoDescriptor;

/// Decoder/encoder seam used by every stage that touches pixels.
///
/// Streams carry packed RGB24 frames back to back, so anything that can
/// produce or consume such bytes can stand in for ffmpeg.
pub trait VideoBackend: Send + Sync {
    /// Read container metadata for one file
    fn probe(&self, path: &Path) -> Result<VideoDescriptor>;

    /// Open a stream of every frame of the video, starting at frame 0
    fn open_stream(&self, descriptor: &VideoDescriptor) -> Result<DecodeStream>;

    /// Open an encoder that accepts RGB24 frames of the given size
    fn open_encoder(&self, path: &Path, width: u32, height: u32, fps: f64) -> Result<EncodeStream>;
}

/// A raw frame stream plus the process producing it, if any
pub struct DecodeStream {
    reader: Box<dyn Read + Send>,
    process: Option<Child>,
}

impl DecodeStream {
    pub fn from_reader<R: Read + Send + 'static>(reader: R) -> Self {
        Self {
            reader: Box::new(reader),
            process: None,
        }
    }

    /// Read the stdout of a spawned decoder. Its exit status is checked
    /// once the stream ends.
    pub fn from_child(mut child: Child) -> std::io::Result<Self> {
        let Some(stdout) = child.stdout.take() else {
            terminate(child);
            return Err(std::io::Error::new(ErrorKind::BrokenPipe, "decoder stdout is not piped"));
        };
        Ok(Self {
            reader: Box::new(stdout),
            process: Some(child),
        })
    }

    pub(crate) fn into_parts(self) -> (Box<dyn Read + Send>, Option<Child>) {
        (self.reader, self.process)
    }
}

/// A raw frame sink plus the process consuming it, if any
pub struct EncodeStream {
    writer: Box<dyn Write + Send>,
    process: Option<Child>,
}

impl EncodeStream {
    pub fn from_writer<W: Write + Send + 'static>(writer: W) -> Self {
        Self {
            writer: Box::new(writer),
            process: None,
        }
    }

    pub(crate) fn into_parts(self) -> (Box<dyn Write + Send>, Option<Child>) {
        (self.writer, self.process)
    }
}

/// Backend driving the `ffmpeg` and `ffprobe` executables
#[derive(Debug, Clone)]
pub struct FfmpegBackend {
    ffmpeg: String,
    ffprobe: String,
    codec: String,
    crf: u8,
    pixel_format: String,
}

impl FfmpegBackend {
    pub fn from_config(config: &Config) -> Self {
        Self {
            ffmpeg: config.processing.ffmpeg_binary.clone(),
            ffprobe: config.processing.ffprobe_binary.clone(),
            codec: config.output.codec.clone(),
            crf: config.output.crf,
            pixel_format: config.output.pixel_format.clone(),
        }
    }

    /// Whether the configured ffmpeg executable can be started
    pub fn check_available(&self) -> bool {
        Command::new(&self.ffmpeg)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }
}

impl VideoBackend for FfmpegBackend {
    fn probe(&self, path: &Path) -> Result<VideoDescriptor> {
        let output = Command::new(&self.ffprobe)
            .args([
                "-v", "quiet",
                "-print_format", "json",
                "-show_streams",
                "-select_streams", "v:0",
            ])
            .arg(path)
            .output()
            .map_err(|e| VideoError::ProbeFailed {
                path: path.display().to_string(),
                reason: format!("ffprobe failed to start: {}", e),
            })?;

        if !output.status.success() {
            return Err(VideoError::ProbeFailed {
                path: path.display().to_string(),
                reason: format!("ffprobe exited with {}", output.status),
            }.into());
        }

        let json = String::from_utf8_lossy(&output.stdout);
        parse_probe_output(path, &json)
    }

    fn open_stream(&self, descriptor: &VideoDescriptor) -> Result<DecodeStream> {
        let child = Command::new(&self.ffmpeg)
            .args(["-v", "error", "-nostdin", "-i"])
            .arg(descriptor.path())
            .args([
                "-map", "0:v:0",
                "-vsync", "0",
                "-f", "rawvideo",
                "-pix_fmt", "rgb24",
                "-",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| VideoError::OpenFailed {
                path: descriptor.key(),
                reason: format!("ffmpeg failed to start: {}", e),
            })?;

        let stream = DecodeStream::from_child(child).map_err(|e| VideoError::OpenFailed {
            path: descriptor.key(),
            reason: e.to_string(),
        })?;

        debug!("Spawned decoder for {}", descriptor.key());
        Ok(stream)
    }

    fn open_encoder(&self, path: &Path, width: u32, height: u32, fps: f64) -> Result<EncodeStream> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let size = format!("{}x{}", width, height);
        let rate = fps.to_string();
        let crf = self.crf.to_string();

        let mut child = Command::new(&self.ffmpeg)
            .args([
                "-v", "error",
                "-y",
                "-f", "rawvideo",
                "-pix_fmt", "rgb24",
                "-s", size.as_str(),
                "-r", rate.as_str(),
                "-i", "-",
                "-c:v", self.codec.as_str(),
                "-crf", crf.as_str(),
                "-pix_fmt", self.pixel_format.as_str(),
            ])
            .arg(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| VideoError::EncodingFailed {
                reason: format!("ffmpeg failed to start: {}", e),
            })?;

        let stdin = child.stdin.take().ok_or_else(|| VideoError::EncodingFailed {
            reason: "ffmpeg stdin unavailable".to_string(),
        })?;

        debug!("Spawned encoder for {:?} ({}x{} @ {} fps)", path, width, height, fps);
        Ok(EncodeStream {
            writer: Box::new(stdin),
            process: Some(child),
        })
    }
}

/// Stop a decoder process that may still be running
pub(crate) fn terminate(mut child: Child) {
    if let Ok(None) = child.try_wait() {
        if let Err(e) = child.kill() {
            warn!("Failed to stop decoder process: {}", e);
        }
    }
    match child.wait() {
        Ok(status) => debug!("Decoder process stopped with {}", status),
        Err(e) => warn!("Failed to reap decoder process: {}", e),
    }
}
