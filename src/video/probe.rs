use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::error::{Result, VideoError};
use crate::video::backend::VideoBackend;
use crate::video::types::VideoDescriptor;

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    nb_frames: Option<String>,
    duration: Option<String>,
}

/// Build a descriptor from `ffprobe -print_format json -show_streams` output
pub fn parse_probe_output(path: &Path, json: &str) -> Result<VideoDescriptor> {
    let failed = |reason: &str| VideoError::ProbeFailed {
        path: path.display().to_string(),
        reason: reason.to_string(),
    };

    let output: ProbeOutput = serde_json::from_str(json)
        .map_err(|e| failed(&format!("invalid ffprobe output: {}", e)))?;
    let stream = output.streams.into_iter().next()
        .ok_or_else(|| failed("no video stream"))?;

    let width = stream.width.filter(|w| *w > 0).ok_or_else(|| failed("missing width"))?;
    let height = stream.height.filter(|h| *h > 0).ok_or_else(|| failed("missing height"))?;

    let fps = stream.avg_frame_rate.as_deref()
        .and_then(parse_rate)
        .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_rate))
        .ok_or_else(|| failed("missing frame rate"))?;

    let total_frames = match stream.nb_frames.as_deref().and_then(|n| n.parse::<u64>().ok()) {
        Some(frames) => frames,
        None => {
            let duration: f64 = stream.duration.as_deref()
                .and_then(|d| d.parse().ok())
                .ok_or_else(|| failed("missing frame count and duration"))?;
            (duration * fps).round() as u64
        }
    };

    Ok(VideoDescriptor::new(path, fps, total_frames, width, height))
}

/// Parse an ffprobe rational such as `30000/1001`
fn parse_rate(rate: &str) -> Option<f64> {
    let (num, den) = match rate.split_once('/') {
        Some((num, den)) => (num.trim().parse::<f64>().ok()?, den.trim().parse::<f64>().ok()?),
        None => (rate.trim().parse::<f64>().ok()?, 1.0),
    };
    let fps = num / den;
    (fps.is_finite() && fps > 0.0).then_some(fps)
}

/// Probes each video once and hands out cached descriptors afterwards
pub struct VideoProbe<'a> {
    backend: &'a dyn VideoBackend,
    cache: HashMap<String, VideoDescriptor>,
}

impl<'a> VideoProbe<'a> {
    pub fn new(backend: &'a dyn VideoBackend) -> Self {
        Self {
            backend,
            cache: HashMap::new(),
        }
    }

    pub fn describe<P: AsRef<Path>>(&mut self, path: P) -> Result<VideoDescriptor> {
        let path = path.as_ref();
        let key = path.display().to_string();

        if let Some(descriptor) = self.cache.get(&key) {
            return Ok(descriptor.clone());
        }

        let descriptor = self.backend.probe(path)?;
        debug!("Probed {}: {}x{} @ {:.2} fps, {} frames",
               key, descriptor.width, descriptor.height, descriptor.fps, descriptor.total_frames);

        self.cache.insert(key, descriptor.clone());
        Ok(descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::video::backend::{DecodeStream, EncodeStream};

    const SAMPLE: &str = r#"{
        "streams": [{
            "index": 0,
            "codec_name": "h264",
            "width": 1920,
            "height": 1080,
            "r_frame_rate": "25/1",
            "avg_frame_rate": "25/1",
            "duration": "3600.000000",
            "nb_frames": "90000"
        }]
    }"#;

    #[test]
    fn test_parse_probe_output() {
        let descriptor = parse_probe_output(Path::new("a.mp4"), SAMPLE).unwrap();
        assert_eq!(descriptor.resolution(), (1920, 1080));
        assert_eq!(descriptor.fps, 25.0);
        assert_eq!(descriptor.total_frames, 90000);
    }

    #[test]
    fn test_frame_count_falls_back_to_duration() {
        let json = r#"{"streams":[{"width":640,"height":480,"avg_frame_rate":"30000/1001","duration":"10.01"}]}"#;
        let descriptor = parse_probe_output(Path::new("b.mkv"), json).unwrap();
        assert!((descriptor.fps - 29.97).abs() < 0.01);
        assert_eq!(descriptor.total_frames, 300);
    }

    #[test]
    fn test_zero_rate_uses_real_frame_rate() {
        let json = r#"{"streams":[{"width":640,"height":480,"avg_frame_rate":"0/0","r_frame_rate":"15/1","nb_frames":"45"}]}"#;
        let descriptor = parse_probe_output(Path::new("c.mp4"), json).unwrap();
        assert_eq!(descriptor.fps, 15.0);
    }

    #[test]
    fn test_no_video_stream() {
        let result = parse_probe_output(Path::new("d.mp4"), r#"{"streams":[]}"#);
        assert!(matches!(
            result,
            Err(crate::error::LapseError::Video(VideoError::ProbeFailed { .. }))
        ));
    }

    struct CountingBackend {
        probes: AtomicUsize,
    }

    impl VideoBackend for CountingBackend {
        fn probe(&self, path: &Path) -> Result<VideoDescriptor> {
            self.probes.fetch_add(1, Ordering::SeqCst);
            Ok(VideoDescriptor::new(path, 25.0, 10, 4, 4))
        }

        fn open_stream(&self, _: &VideoDescriptor) -> Result<DecodeStream> {
            Ok(DecodeStream::from_reader(std::io::empty()))
        }

        fn open_encoder(&self, _: &Path, _: u32, _: u32, _: f64) -> Result<EncodeStream> {
            Ok(EncodeStream::from_writer(std::io::sink()))
        }
    }

    #[test]
    fn test_probe_is_cached() {
        let backend = CountingBackend { probes: AtomicUsize::new(0) };
        let mut probe = VideoProbe::new(&backend);

        let path = PathBuf::from("cam/a.mp4");
        probe.describe(&path).unwrap();
        probe.describe(&path).unwrap();
        probe.describe("cam/b.mp4").unwrap();

        assert_eq!(backend.probes.load(Ordering::SeqCst), 2);
        assert_eq!(probe.cache.len(), 2);
    }
}
