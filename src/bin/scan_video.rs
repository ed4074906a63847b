// Diagnostic binary: run motion detection on a single recording

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use motionlapse::{
    config::Config,
    motion::{MotionDetector, TimestampExtractor},
    timeline::Interval,
    video::{FfmpegBackend, FrameSource, VideoBackend},
};

#[derive(Parser)]
#[command(name = "scan_video", about = "Print motion timestamps and active intervals of one video")]
struct Args {
    /// Video to scan
    video: PathBuf,

    /// Configuration file (optional)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the mask sum of every analysed frame instead of timestamps
    #[arg(long)]
    scores: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    config.validate()?;

    let backend = FfmpegBackend::from_config(&config);
    if !backend.check_available() {
        println!("⚠️  ffmpeg not found in PATH");
        println!("   Install FFmpeg: brew install ffmpeg (macOS) or sudo apt install ffmpeg (Ubuntu)");
        return Ok(());
    }

    let descriptor = backend.probe(&args.video)?;
    println!("🎬 {}", descriptor.key());
    println!("   Resolution: {}x{}", descriptor.width, descriptor.height);
    println!("   Frame rate: {:.2} fps", descriptor.fps);
    println!("   Frames: {}", descriptor.total_frames);

    if args.scores {
        let mut detector = MotionDetector::new(&config.motion, descriptor.width, descriptor.height)?;
        let crop = detector.crop();
        println!(
            "   Region: {}x{} at ({}, {}), analysed at {}x{}",
            crop.width,
            crop.height,
            crop.x,
            crop.y,
            detector.analysis_size().0,
            detector.analysis_size().1
        );

        let mut source = FrameSource::open(&backend, &descriptor, config.processing.queue_capacity)?;
        let mut index = 0u64;
        while let Some(frame) = source.read()? {
            if index % config.motion.frame_skip == 0 {
                let score = detector.score(&frame)?;
                let marker = if score > config.motion.motion_threshold { "🟢" } else { "  " };
                println!("{} {:>8} {:>10}", marker, index, score);
            }
            index += 1;
        }
        return Ok(());
    }

    let started = std::time::Instant::now();
    let extractor = TimestampExtractor::new(&backend, config.motion.clone())
        .with_queue_capacity(config.processing.queue_capacity);
    let mut record = extractor.extract(&descriptor)?;
    let intervals = record
        .merge(config.intervals.before_seconds, config.intervals.after_seconds)
        .to_vec();

    println!("\n📍 {} motion timestamps (scan took {:.1}s)", record.detections(), started.elapsed().as_secs_f64());
    println!("   {:?}", &record.timestamps[1..]);

    println!("\n📐 Active intervals:");
    if intervals == [Interval::NEVER] {
        println!("   none, the whole video plays fast");
    } else {
        for interval in &intervals {
            let seconds = |frame: i64| frame as f64 / descriptor.fps;
            println!(
                "   [{:>8}, {:>8}]  {:>8.1}s - {:>8.1}s",
                interval.start,
                interval.end,
                seconds(interval.start),
                seconds(interval.end)
            );
        }
    }

    Ok(())
}
