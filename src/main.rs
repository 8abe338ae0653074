use anyhow::{anyhow, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use movenet_pipeline::{
    fixtures::{Fixture, FixtureExecutor},
    Frame, PipelineConfig, PipelineMetrics, PixelFormat,
};
use std::{
    fs::File,
    io::{BufReader, ErrorKind, Read},
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};
use structopt::StructOpt;
use tracing::{info, trace};
use tracing_subscriber::layer::SubscriberExt;

#[derive(structopt::StructOpt)]
#[structopt(name = "pose-replay")]
struct Opt {
    /// Raw frames to replay, back to back. Mid-gray frames are generated
    /// when omitted.
    input: Option<PathBuf>,

    /// The width of each input frame.
    #[structopt(short, long, default_value = "480")]
    frame_width: u32,

    /// The height of each input frame.
    #[structopt(short = "-H", long, default_value = "640")]
    frame_height: u32,

    /// Layout of the input frames: yuv420 or rgb.
    #[structopt(short, long, default_value = "yuv420")]
    pixel_format: PixelFormat,

    /// Stop after this many frames.
    #[structopt(short = "-n", long)]
    frames: Option<usize>,

    /// Rate at which frames are delivered; 0 replays as fast as possible.
    #[structopt(short, long, default_value = "30")]
    capture_fps: f64,

    /// Canned model output returned for every frame: standing or low-confidence.
    #[structopt(long, default_value = "standing")]
    fixture: Fixture,

    #[structopt(short, long, default_value = "info", env = "RUST_LOG")]
    log_level: tracing_subscriber::filter::EnvFilter,

    #[structopt(short, long)]
    show_progress: bool,

    #[structopt(flatten)]
    pipeline: PipelineConfig,
}

fn metrics_text(metrics: &PipelineMetrics) -> String {
    format!(
        "FPS: {:.1}, avg: {:.2?}, processed: {}, skipped: {}, throttled: {}, failed: {}",
        metrics.fps,
        metrics.average_processing_time,
        metrics.frames_processed,
        metrics.frames_skipped,
        metrics.frames_throttled,
        metrics.frames_failed,
    )
}

fn main() -> Result<()> {
    let opt = Opt::from_args();

    tracing::subscriber::set_global_default(
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer())
            .with(opt.log_level),
    )?;

    let frame_len = opt
        .pixel_format
        .min_len(opt.frame_width as usize, opt.frame_height as usize)
        .ok_or_else(|| anyhow!("cannot replay {} frames", opt.pixel_format))?;

    let mut source: Box<dyn Read> = match &opt.input {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("failed opening {}", path.display()))?,
        )),
        // 128 everywhere is mid-gray in both YUV and RGB
        None => Box::new(std::io::repeat(128)),
    };

    let mut pipeline = movenet_pipeline::Pipeline::from_config(
        opt.pipeline,
        FixtureExecutor::from(opt.fixture),
    )
    .context("failed constructing pipeline")?;

    info!(
        message = "replaying frames",
        width = opt.frame_width,
        height = opt.frame_height,
        pixel_format = %opt.pixel_format,
        strategy = ?opt.pipeline.preprocessing.strategy
    );

    let running = Arc::new(AtomicBool::new(true));
    let running_ctrl_c = running.clone();

    ctrlc::set_handler(move || {
        running_ctrl_c.store(false, Ordering::SeqCst);
    })
    .context("failed setting Ctrl-C handler")?;

    let pb = if opt.show_progress {
        Some(
            ProgressBar::new_spinner().with_style(
                ProgressStyle::default_spinner()
                    .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
                    .template("{prefix:.bold.dim} {spinner} {wide_msg}"),
            ),
        )
    } else {
        None
    };

    let frame_interval = if opt.capture_fps > 0.0 {
        Some(
            Duration::try_from_secs_f64(1.0 / opt.capture_fps)
                .with_context(|| format!("invalid capture fps {}", opt.capture_fps))?,
        )
    } else {
        None
    };

    let mut bytes = vec![0_u8; frame_len];
    let mut nframes = 0;
    let start = Instant::now();
    let mut next_due = start;

    while running.load(Ordering::SeqCst) && opt.frames.map_or(true, |limit| nframes < limit) {
        match source.read_exact(&mut bytes) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e).context("failed reading frame"),
        }

        if let Some(interval) = frame_interval {
            if let Some(wait) = next_due.checked_duration_since(Instant::now()) {
                std::thread::sleep(wait);
            }
            next_due += interval;
        }

        let frame = Frame::new(
            opt.frame_width,
            opt.frame_height,
            opt.pixel_format.clone(),
            nframes as i64,
            &bytes,
        );
        let result = pipeline.process(&frame);
        trace!(
            frame = nframes,
            success = result.success,
            skipped = ?result.skipped,
            overall_confidence = result.pose_detection.overall_confidence,
            valid_keypoints = result.pose_detection.valid_keypoints
        );

        if let Some(pb) = pb.as_ref() {
            pb.set_message(metrics_text(&pipeline.metrics()));
            pb.inc(1);
        }
        nframes += 1;
    }

    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    let metrics = pipeline.metrics();
    info!(
        message = "replay finished",
        frames = nframes,
        elapsed = ?start.elapsed(),
        fps = metrics.fps,
        average_processing_time = ?metrics.average_processing_time,
        frames_processed = metrics.frames_processed,
        frames_skipped = metrics.frames_skipped,
        frames_throttled = metrics.frames_throttled,
        frames_failed = metrics.frames_failed,
        high_cpu_load = metrics.high_cpu_load,
        memory_pressure = metrics.memory_pressure,
        estimated_memory_mb = metrics.estimated_memory_mb
    );

    Ok(())
}
