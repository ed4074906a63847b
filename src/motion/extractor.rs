use std::time::Instant;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::config::MotionConfig;
use crate::error::{LapseError, Result, VideoError};
use crate::motion::detector::MotionDetector;
use crate::timeline::{TimestampRecord, TimestampStore};
use crate::utils::format_elapsed;
use crate::video::backend::VideoBackend;
use crate::video::source::{FrameSource, DEFAULT_QUEUE_CAPACITY};
use crate::video::types::VideoDescriptor;

/// Decides which videos skip motion detection and play at full speed
pub trait ExclusionPolicy: Send + Sync {
    fn excludes(&self, video: &VideoDescriptor) -> bool;
}

/// Scan everything
pub struct NoExclusion;

impl ExclusionPolicy for NoExclusion {
    fn excludes(&self, _: &VideoDescriptor) -> bool {
        false
    }
}

/// Excludes videos whose path contains any of the patterns, e.g. `/23h/`
/// for recordings known to be inactive at night.
pub struct PathPatternExclusion {
    patterns: Vec<String>,
}

impl PathPatternExclusion {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            patterns: patterns.into_iter().map(Into::into).filter(|p: &String| !p.is_empty()).collect(),
        }
    }
}

impl ExclusionPolicy for PathPatternExclusion {
    fn excludes(&self, video: &VideoDescriptor) -> bool {
        let path = video.key();
        self.patterns.iter().any(|pattern| path.contains(pattern.as_str()))
    }
}

/// Inclusive range of frame indices to scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanRange {
    pub start: u64,
    pub end: u64,
}

impl ScanRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// Every frame of a video with `total_frames` frames
    pub fn full(total_frames: u64) -> Option<Self> {
        total_frames.checked_sub(1).map(|end| Self { start: 0, end })
    }

    fn clamp(self, total_frames: u64) -> Option<Self> {
        let last = total_frames.checked_sub(1)?;
        let end = self.end.min(last);
        (self.start <= end).then_some(Self { start: self.start, end })
    }
}

/// Summary of one [`TimestampExtractor::extract_batch`] call
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Videos scanned for motion
    pub scanned: usize,
    /// Videos given the full-speed record without scanning
    pub excluded: usize,
    /// Videos already present in the store
    pub cached: usize,
    /// Videos that could not be read, with the reason
    pub failed: Vec<(String, String)>,
}

/// Runs the motion detector over videos and collects motion timestamps
pub struct TimestampExtractor<'a> {
    backend: &'a dyn VideoBackend,
    config: MotionConfig,
    exclusion: Box<dyn ExclusionPolicy>,
    workers: usize,
    checkpoint_every: usize,
    queue_capacity: usize,
}

impl<'a> TimestampExtractor<'a> {
    pub fn new(backend: &'a dyn VideoBackend, config: MotionConfig) -> Self {
        Self {
            backend,
            config,
            exclusion: Box::new(NoExclusion),
            workers: 1,
            checkpoint_every: 3,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    pub fn with_exclusion<E: ExclusionPolicy + 'static>(mut self, exclusion: E) -> Self {
        self.exclusion = Box::new(exclusion);
        self
    }

    /// Scan `workers` videos at a time and flush after every
    /// `workers * batch_multiplier` videos
    pub fn with_workers(mut self, workers: usize, batch_multiplier: usize) -> Self {
        self.workers = workers.max(1);
        self.checkpoint_every = self.workers * batch_multiplier.max(1);
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    pub fn is_excluded(&self, video: &VideoDescriptor) -> bool {
        self.exclusion.excludes(video)
    }

    /// Motion timestamps for a whole video, or the full-speed record if excluded
    pub fn extract(&self, video: &VideoDescriptor) -> Result<TimestampRecord> {
        if self.is_excluded(video) {
            debug!("{} is excluded from motion detection", video.key());
            return Ok(TimestampRecord::inactive(video.rounded_fps(), video.total_frames));
        }

        match ScanRange::full(video.total_frames) {
            Some(range) => self.extract_range(video, range),
            None => Ok(TimestampRecord::inactive(video.rounded_fps(), 0)),
        }
    }

    /// Motion timestamps within `range`. The background model starts cold at
    /// `range.start`, so ranges of one video should not be stitched together.
    pub fn extract_range(&self, video: &VideoDescriptor, range: ScanRange) -> Result<TimestampRecord> {
        let started = Instant::now();
        let fps = video.rounded_fps();
        let Some(range) = range.clamp(video.total_frames) else {
            return Ok(TimestampRecord::inactive(fps, video.total_frames));
        };

        info!("- Processing {}: {} FPS, frames {}..={}", video.key(), fps, range.start, range.end);

        let mut detector = MotionDetector::new(&self.config, video.width, video.height)?;
        let mut source = FrameSource::open(self.backend, video, self.queue_capacity)?;
        source.seek_to(range.start)?;

        let frame_skip = self.config.frame_skip.max(1);
        let mut detections = Vec::new();

        for index in range.start..=range.end {
            let Some(frame) = source.read()? else {
                return Err(VideoError::DecodingFailed {
                    path: video.key(),
                    reason: format!("stream ended at frame {} of {}", index, video.total_frames),
                }
                .into());
            };

            if index % frame_skip == 0 && detector.classify(&frame)? {
                detections.push(index);
            }
        }
        source.release();

        info!(
            "  Finished timestamp extraction for {}: {} detections, took {} (h:mm:ss.mmm)",
            video.key(),
            detections.len(),
            format_elapsed(started.elapsed())
        );

        Ok(TimestampRecord::new(detections, fps, video.total_frames))
    }

    /// Extract every video not yet in `store`, in parallel.
    ///
    /// Results are added to `store` chunk by chunk and `on_flush` is called
    /// after each chunk so the caller can persist progress. Videos that
    /// cannot be read are logged and left out; configuration errors abort.
    pub fn extract_batch<F>(
        &self,
        videos: &[VideoDescriptor],
        store: &mut TimestampStore,
        mut on_flush: F,
    ) -> Result<BatchReport>
    where
        F: FnMut(&TimestampStore) -> Result<()>,
    {
        let mut report = BatchReport::default();
        let pending: Vec<&VideoDescriptor> = videos
            .iter()
            .filter(|video| !store.contains(&video.key()))
            .collect();
        report.cached = videos.len() - pending.len();

        info!("Timestamps from {} videos need update ({} cached)", pending.len(), report.cached);
        if pending.is_empty() {
            return Ok(report);
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|i| format!("motion-scan-{}", i))
            .build()
            .map_err(|e| LapseError::generic(format!("failed to start worker pool: {}", e)))?;

        let mut processed = 0;
        for chunk in pending.chunks(self.checkpoint_every) {
            let results: Vec<(String, bool, Result<TimestampRecord>)> = pool.install(|| {
                chunk
                    .par_iter()
                    .map(|video| (video.key(), self.is_excluded(video), self.extract(video)))
                    .collect()
            });

            for (key, excluded, result) in results {
                match result {
                    Ok(record) => {
                        if excluded {
                            report.excluded += 1;
                        } else {
                            report.scanned += 1;
                        }
                        store.insert(key, record);
                    }
                    Err(e @ LapseError::Config(_)) => return Err(e),
                    Err(e) => {
                        warn!("Skipping {}: {}", key, e);
                        report.failed.push((key, e.to_string()));
                    }
                }
            }

            processed += chunk.len();
            on_flush(store)?;
            info!("Partial save: processed {}/{} videos", processed, pending.len());
        }

        Ok(report)
    }
}
