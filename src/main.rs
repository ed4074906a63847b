use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use motionlapse::{
    checkpoint::CheckpointFile,
    config::Config,
    pipeline::LapseEngine,
    video::FfmpegBackend,
};

#[derive(Parser)]
#[command(
    name = "motionlapse",
    version,
    about = "Condense security-camera footage into a motion-aware accelerated video",
    long_about = "motionlapse scans recordings for motion, plays the active parts slowly and everything else fast, and renders the result as a single video."
)]
struct Cli {
    /// Directory searched recursively for recordings
    #[arg(short, long)]
    input: PathBuf,

    /// Directory for rendered videos
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Configuration file (optional)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Timestamp checkpoint, reused across runs
    #[arg(long, default_value = "timestamps.json")]
    checkpoint: PathBuf,

    /// Motion scan workers (defaults to all cores but one)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Speed-up inside active intervals
    #[arg(long)]
    slow_factor: Option<f64>,

    /// Speed-up outside active intervals
    #[arg(long)]
    fast_factor: Option<f64>,

    /// Output frame rate
    #[arg(long)]
    fps: Option<f64>,

    /// Also render a uniform timelapse with this factor
    #[arg(long)]
    timelapse: Option<f64>,

    /// Only extract timestamps and merge intervals
    #[arg(long)]
    scan_only: bool,

    /// Single worker, for following one scan in the logs
    #[arg(long)]
    debug: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn apply_overrides(&self, config: &mut Config) {
        if let Some(workers) = self.workers {
            config.processing.workers = Some(workers);
        }
        if self.debug {
            config.processing.workers = Some(1);
        }
        if let Some(factor) = self.slow_factor {
            config.acceleration.slow_factor = factor;
        }
        if let Some(factor) = self.fast_factor {
            config.acceleration.fast_factor = factor;
        }
        if let Some(fps) = self.fps {
            config.acceleration.output_fps = fps;
        }
        if let Some(factor) = self.timelapse {
            config.acceleration.timelapse_factor = Some(factor);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose
    let default_level = if cli.verbose || cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    info!("Starting motionlapse v{}", env!("CARGO_PKG_VERSION"));
    info!("Input: {:?}", cli.input);
    info!("Output: {:?}", cli.output);

    let mut config = match &cli.config {
        Some(config_path) => {
            info!("Loading configuration from {:?}", config_path);
            Config::from_file(config_path)?
        }
        None => {
            info!("Using default configuration");
            Config::default()
        }
    };
    cli.apply_overrides(&mut config);
    config.validate()?;

    let backend = FfmpegBackend::from_config(&config);
    if !backend.check_available() {
        anyhow::bail!(
            "'{}' could not be started; install ffmpeg or set processing.ffmpeg_binary",
            config.processing.ffmpeg_binary
        );
    }

    let engine = LapseEngine::new(config, Arc::new(backend))
        .with_checkpoint(CheckpointFile::new(&cli.checkpoint))
        .with_scan_only(cli.scan_only);

    let summary = match engine.run(&cli.input, &cli.output).await {
        Ok(summary) => summary,
        Err(e) => anyhow::bail!(e.user_message()),
    };

    for (video, reason) in &summary.failed {
        warn!("Not included: {} ({})", video, reason);
    }
    for render in &summary.renders {
        info!(
            "Output saved to {:?}: {} frames, {} skipped",
            render.output, render.frames_written, render.frames_skipped
        );
    }
    Ok(())
}
