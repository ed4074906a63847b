use std::collections::HashMap;
use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use tracing::{debug, info, warn};

use crate::error::{ConfigError, LapseError, Result, VideoError};
use crate::timeline::{BatchSelection, SpeedMode};
use crate::video::backend::VideoBackend;
use crate::video::overlay::SpeedOverlay;
use crate::video::sink::FrameSink;
use crate::video::source::{FrameSource, DEFAULT_QUEUE_CAPACITY};
use crate::video::types::{Frame, VideoDescriptor};

/// Outcome of one render
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderReport {
    pub output: PathBuf,
    pub frames_written: u64,
    pub frames_skipped: u64,
    pub videos_skipped: usize,
}

/// Re-reads the selected frames of every video, stamps the speed label
/// on them and appends them to a single output video.
pub struct AcceleratedRenderer<'a> {
    backend: &'a dyn VideoBackend,
    overlay: SpeedOverlay,
    queue_capacity: usize,
}

impl<'a> AcceleratedRenderer<'a> {
    pub fn new(backend: &'a dyn VideoBackend) -> Self {
        Self {
            backend,
            overlay: SpeedOverlay::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Render `selection` to `output`.
    ///
    /// The output runs at the selection's output frame rate and takes its
    /// frame size from the first video. Frames that cannot be read are
    /// skipped, as are videos that cannot be opened; encoder failures abort.
    pub fn render(
        &self,
        selection: &BatchSelection,
        descriptors: &HashMap<String, VideoDescriptor>,
        output: &Path,
    ) -> Result<RenderReport> {
        let first = selection
            .videos
            .iter()
            .find_map(|video| descriptors.get(&video.video))
            .ok_or(ConfigError::EmptyVideoSet)?;
        let size = first.resolution();
        let settings = selection.settings;

        info!(
            "Rendering {} frames from {} videos to {:?} ({}x{} @ {} fps)",
            selection.total_selected(),
            selection.videos.len(),
            output,
            size.0,
            size.1,
            settings.output_fps
        );

        let mut sink = FrameSink::open(self.backend, output, size.0, size.1, settings.output_fps, self.queue_capacity)?;
        let mut report = RenderReport {
            output: output.to_path_buf(),
            ..RenderReport::default()
        };

        for video in &selection.videos {
            let Some(descriptor) = descriptors.get(&video.video) else {
                warn!("No metadata for {}, skipping {} frames", video.video, video.len());
                report.videos_skipped += 1;
                report.frames_skipped += video.len() as u64;
                continue;
            };

            if video.is_empty() {
                continue;
            }

            let mut source = match FrameSource::open(self.backend, descriptor, self.queue_capacity) {
                Ok(source) => source,
                Err(e) => {
                    warn!("Skipping {}: {}", video.video, e);
                    report.videos_skipped += 1;
                    report.frames_skipped += video.len() as u64;
                    continue;
                }
            };

            let mut written = 0u64;
            for selected in &video.frames {
                let mut frame = match read_at(&mut source, &video.video, selected.index) {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!("{}", e);
                        report.frames_skipped += 1;
                        continue;
                    }
                };

                if frame.width() != size.0 || frame.height() != size.1 {
                    frame = fit(&frame, size);
                }
                self.overlay.draw(&mut frame, selected.mode, settings.factor(selected.mode));
                sink.write(frame)?;
                written += 1;
            }
            source.release();

            debug!(
                "{}: wrote {} frames ({} slow, {} fast)",
                video.video,
                written,
                video.count(SpeedMode::Slow),
                video.count(SpeedMode::Fast)
            );
            report.frames_written += written;
        }

        let encoded = sink.finish()?;
        debug!("Encoder accepted {} frames", encoded);

        info!(
            "Rendered {:?}: {} frames written, {} skipped, {} videos skipped",
            output, report.frames_written, report.frames_skipped, report.videos_skipped
        );
        Ok(report)
    }
}

/// Position `source` on `index` and read it. Every failure is reported as a
/// recoverable frame read error.
fn read_at(source: &mut FrameSource, video: &str, index: u64) -> Result<Frame> {
    let failed = |reason: String| VideoError::FrameReadFailed {
        path: video.to_string(),
        index,
        reason,
    };

    source.seek_to(index).map_err(|e| match e {
        LapseError::Video(err @ VideoError::FrameReadFailed { .. }) => err,
        other => failed(other.to_string()),
    })?;

    match source.read() {
        Ok(Some(frame)) => Ok(frame),
        Ok(None) => Err(failed("stream ended".to_string()).into()),
        Err(e) => Err(failed(e.to_string()).into()),
    }
}

fn fit(frame: &Frame, (width, height): (u32, u32)) -> Frame {
    Frame::new(image::imageops::resize(frame.as_image(), width, height, FilterType::Triangle))
}
