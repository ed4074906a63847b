use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::{
    checkpoint::CheckpointFile,
    config::Config,
    error::{ConfigError, LapseError, Result},
    motion::{PathPatternExclusion, TimestampExtractor},
    pipeline::discover::find_videos,
    timeline::{
        AccelerationSettings, BatchSelection, FrameSelector, GlobalFrameCounter, TimestampRecord,
        TimestampStore,
    },
    utils::format_elapsed,
    video::{AcceleratedRenderer, RenderReport, VideoBackend, VideoDescriptor, VideoProbe},
};

/// What a full run produced
#[derive(Debug, Default)]
pub struct LapseSummary {
    pub videos_found: usize,
    /// Videos that made it through extraction, in processing order
    pub videos_processed: usize,
    /// Videos left out, with the reason
    pub failed: Vec<(String, String)>,
    pub renders: Vec<RenderReport>,
}

/// Runs the whole pipeline: discover, probe, extract, merge, select, render.
///
/// Blocking stages run on tokio's blocking pool so the engine can be driven
/// from async code.
pub struct LapseEngine {
    config: Config,
    backend: Arc<dyn VideoBackend>,
    checkpoint: Option<CheckpointFile>,
    scan_only: bool,
}

impl LapseEngine {
    pub fn new(config: Config, backend: Arc<dyn VideoBackend>) -> Self {
        Self {
            config,
            backend,
            checkpoint: None,
            scan_only: false,
        }
    }

    /// Persist timestamp records here and reuse them on the next run
    pub fn with_checkpoint(mut self, checkpoint: CheckpointFile) -> Self {
        self.checkpoint = Some(checkpoint);
        self
    }

    /// Stop after intervals are merged and saved
    pub fn with_scan_only(mut self, scan_only: bool) -> Self {
        self.scan_only = scan_only;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Process every video found under `input_dir`
    pub async fn run<P: AsRef<Path>>(&self, input_dir: P, output_dir: P) -> Result<LapseSummary> {
        let input_dir = input_dir.as_ref();

        info!("🔎 Step 1: Searching for video files...");
        let videos = find_videos(input_dir, &self.config.processing.video_extension)?;

        self.run_videos(&videos, output_dir.as_ref()).await
    }

    /// Process `videos` in the given order
    pub async fn run_videos(&self, videos: &[PathBuf], output_dir: &Path) -> Result<LapseSummary> {
        let started = Instant::now();
        self.config.validate()?;

        info!("🎬 Starting motionlapse");
        info!("   Videos: {}", videos.len());
        info!("   Output: {:?}", output_dir);
        info!(
            "   Speed: x{} with motion, x{} without, {} fps",
            self.config.acceleration.slow_factor,
            self.config.acceleration.fast_factor,
            self.config.acceleration.output_fps
        );

        let mut summary = LapseSummary {
            videos_found: videos.len(),
            ..LapseSummary::default()
        };

        let descriptors = self.probe_videos(videos, &mut summary).await?;
        let store = self.extract_timestamps(&descriptors, &mut summary).await?;

        let ordered: Vec<VideoDescriptor> = descriptors
            .into_iter()
            .filter(|d| store.contains(&d.key()))
            .collect();
        summary.videos_processed = ordered.len();

        if self.scan_only {
            info!("Scan finished, skipping render");
            return Ok(summary);
        }

        let main = self.config.acceleration.settings();
        let output = output_dir.join(format!(
            "slow_x{}_fast_x{}_complete_video.mp4",
            main.slow_factor, main.fast_factor
        ));
        summary.renders.push(self.render(&ordered, &store, main, output).await?);

        if let Some(timelapse) = self.config.acceleration.timelapse_settings() {
            let output = output_dir.join(format!("fast_x{}_timelapse.mp4", timelapse.fast_factor));
            summary.renders.push(self.render(&ordered, &store, timelapse, output).await?);
        }

        info!(
            "🎉 Done: {} of {} videos processed, took {} (h:mm:ss.mmm)",
            summary.videos_processed,
            summary.videos_found,
            format_elapsed(started.elapsed())
        );
        Ok(summary)
    }

    // ==========================================
    // STEP 2: METADATA
    // ==========================================

    async fn probe_videos(&self, videos: &[PathBuf], summary: &mut LapseSummary) -> Result<Vec<VideoDescriptor>> {
        info!("📹 Step 2: Reading video metadata...");

        let backend = Arc::clone(&self.backend);
        let paths = videos.to_vec();
        let results = blocking(move || {
            let mut probe = VideoProbe::new(backend.as_ref());
            Ok(paths
                .iter()
                .map(|path| (path.display().to_string(), probe.describe(path)))
                .collect::<Vec<_>>())
        })
        .await?;

        let mut descriptors = Vec::with_capacity(results.len());
        for (key, result) in results {
            match result {
                Ok(descriptor) => descriptors.push(descriptor),
                Err(e) => {
                    warn!("Skipping {}: {}", key, e);
                    summary.failed.push((key, e.to_string()));
                }
            }
        }

        if descriptors.is_empty() {
            return Err(ConfigError::EmptyVideoSet.into());
        }

        let total_frames: u64 = descriptors.iter().map(|d| d.total_frames).sum();
        info!("   ✅ {} videos, {} frames in total", descriptors.len(), total_frames);
        Ok(descriptors)
    }

    // ==========================================
    // STEP 3-4: TIMESTAMPS AND INTERVALS
    // ==========================================

    async fn extract_timestamps(
        &self,
        descriptors: &[VideoDescriptor],
        summary: &mut LapseSummary,
    ) -> Result<TimestampStore> {
        info!("⏱️  Step 3: Extracting motion timestamps...");

        let mut store = match &self.checkpoint {
            Some(checkpoint) => checkpoint.load()?,
            None => TimestampStore::new(),
        };

        let backend = Arc::clone(&self.backend);
        let config = self.config.clone();
        let checkpoint = self.checkpoint.clone();
        let videos = descriptors.to_vec();

        let (mut store, report) = blocking(move || {
            let extractor = TimestampExtractor::new(backend.as_ref(), config.motion.clone())
                .with_workers(
                    config.processing.worker_count(),
                    config.processing.checkpoint_batch_multiplier,
                )
                .with_queue_capacity(config.processing.queue_capacity)
                .with_exclusion(PathPatternExclusion::new(config.processing.exclude_patterns.iter().cloned()));

            let report = extractor.extract_batch(&videos, &mut store, |partial| match &checkpoint {
                Some(checkpoint) => checkpoint.save(partial),
                None => Ok(()),
            })?;
            Ok((store, report))
        })
        .await?;

        info!(
            "   ✅ Timestamps ready: {} scanned, {} excluded, {} from checkpoint, {} failed",
            report.scanned,
            report.excluded,
            report.cached,
            report.failed.len()
        );
        summary.failed.extend(report.failed);

        info!("📐 Step 4: Merging active intervals...");
        let changed = store.merge_all(
            self.config.intervals.before_seconds,
            self.config.intervals.after_seconds,
        );
        if let Some(checkpoint) = &self.checkpoint {
            checkpoint.save(&store)?;
        }

        let active: usize = descriptors
            .iter()
            .filter_map(|d| store.get(&d.key()))
            .filter_map(|record| record.intervals())
            .map(|intervals| intervals.iter().filter(|i| !i.is_never()).count())
            .sum();
        info!("   ✅ {} records merged ({} changed), {} active intervals", store.len(), changed, active);

        Ok(store)
    }

    // ==========================================
    // STEP 5-6: SELECTION AND RENDER
    // ==========================================

    async fn render(
        &self,
        videos: &[VideoDescriptor],
        store: &TimestampStore,
        settings: AccelerationSettings,
        output: PathBuf,
    ) -> Result<RenderReport> {
        info!(
            "🎞️  Step 5: Selecting frames (x{} slow, x{} fast)...",
            settings.slow_factor, settings.fast_factor
        );

        let records: Vec<(String, TimestampRecord)> = videos
            .iter()
            .filter_map(|d| store.get(&d.key()).map(|record| (d.key(), record.clone())))
            .collect();

        let selection: BatchSelection = blocking(move || {
            let refs: Vec<_> = records.iter().map(|(key, record)| (key.as_str(), record)).collect();
            FrameSelector::new(settings).select_batch_parallel(&refs, GlobalFrameCounter::default())
        })
        .await?;

        info!(
            "   ✅ {} frames selected from {} source frames",
            selection.total_selected(),
            selection.counter.value()
        );

        info!("🎬 Step 6: Rendering {:?}...", output);
        let backend = Arc::clone(&self.backend);
        let capacity = self.config.processing.queue_capacity;
        let descriptors: HashMap<String, VideoDescriptor> =
            videos.iter().map(|d| (d.key(), d.clone())).collect();

        let report = blocking(move || {
            AcceleratedRenderer::new(backend.as_ref())
                .with_queue_capacity(capacity)
                .render(&selection, &descriptors, &output)
        })
        .await?;

        debug!("Render report: {:?}", report);
        Ok(report)
    }
}

/// Run a blocking closure on tokio's blocking pool
async fn blocking<T, F>(task: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| LapseError::generic(format!("pipeline task failed: {}", e)))?
}
