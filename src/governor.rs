//! Admission control: frame-rate gating, memory pressure and CPU load shedding.

use crate::error::{ensure, Error};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::{
    collections::VecDeque,
    fmt,
    time::{Duration, Instant},
};
use tracing::{debug, info};

pub const DEFAULT_TARGET_FPS: f64 = 30.0;
pub const DEFAULT_MEMORY_THRESHOLD_MB: f64 = 50.0;

/// Number of recent latencies and processed-frame instants retained.
pub const SAMPLE_WINDOW: usize = 30;

mod constants {
    use std::time::Duration;

    /// Mean latency above which the CPU is considered saturated: one 60 Hz frame.
    pub(super) const CPU_LATENCY_BUDGET: Duration = Duration::from_nanos(1_000_000_000 / 60);
    pub(super) const CPU_SKIP_PROBABILITY: f64 = 0.3;
    /// Weight of the previous estimate in the memory moving average.
    pub(super) const MEMORY_DECAY: f64 = 0.9;
    pub(super) const BYTES_PER_PIXEL: f64 = 4.0;
    pub(super) const BYTES_PER_MB: f64 = 1024.0 * 1024.0;
}

use constants::*;

#[derive(Debug, Clone, Copy, PartialEq, structopt::StructOpt)]
pub struct ThroughputConfig {
    /// Upper bound on pipeline invocations per second.
    #[structopt(long, default_value = "30")]
    pub target_fps: f64,
    /// Estimated frame memory (MB) above which frames are dropped.
    #[structopt(long, default_value = "50")]
    pub memory_threshold_mb: f64,
    /// Drop frames under memory pressure or high CPU load.
    #[structopt(long, parse(try_from_str), default_value = "true")]
    pub enable_frame_skipping: bool,
}

impl Default for ThroughputConfig {
    fn default() -> Self {
        Self {
            target_fps: DEFAULT_TARGET_FPS,
            memory_threshold_mb: DEFAULT_MEMORY_THRESHOLD_MB,
            enable_frame_skipping: true,
        }
    }
}

impl ThroughputConfig {
    pub fn validate(&self) -> Result<(), Error> {
        ensure(self.target_fps.is_finite() && self.target_fps > 0.0, || {
            format!("target fps must be positive, got {}", self.target_fps)
        })?;
        self.min_interval()?;
        ensure(
            self.memory_threshold_mb.is_finite() && self.memory_threshold_mb > 0.0,
            || {
                format!(
                    "memory threshold must be positive, got {} MB",
                    self.memory_threshold_mb
                )
            },
        )
    }

    /// Shortest allowed gap between two processed frames.
    pub fn min_interval(&self) -> Result<Duration, Error> {
        Duration::try_from_secs_f64(1.0 / self.target_fps).map_err(|_| {
            Error::InvalidConfig(format!(
                "target fps {} gives an unrepresentable frame interval",
                self.target_fps
            ))
        })
    }
}

/// Why a frame was not processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Arrived sooner than the target frame rate allows.
    Throttled,
    MemoryPressure,
    CpuLoad,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Throttled => f.write_str("throttled"),
            Self::MemoryPressure => f.write_str("memory pressure"),
            Self::CpuLoad => f.write_str("cpu load"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Process,
    Skip(SkipReason),
}

/// Counters and rolling samples for one capture session.
#[derive(Debug, Clone, Default)]
pub struct ThroughputState {
    pub frames_processed: u64,
    pub frames_skipped: u64,
    pub frames_throttled: u64,
    pub frames_failed: u64,
    pub high_cpu_load: bool,
    pub memory_pressure: bool,
    latencies: VecDeque<Duration>,
    processed_at: VecDeque<Instant>,
    memory_estimate: Option<f64>,
    last_run: Option<Instant>,
}

impl ThroughputState {
    fn average_latency(&self) -> Duration {
        if self.latencies.is_empty() {
            return Duration::default();
        }
        let total: Duration = self.latencies.iter().sum();
        total / self.latencies.len() as u32
    }

    fn fps(&self) -> f64 {
        match (self.processed_at.front(), self.processed_at.back()) {
            (Some(&first), Some(&last)) if self.processed_at.len() > 1 => {
                let span = last.saturating_duration_since(first).as_secs_f64();
                if span > 0.0 {
                    (self.processed_at.len() - 1) as f64 / span
                } else {
                    0.0
                }
            }
            _ => 0.0,
        }
    }

    fn estimated_memory_mb(&self) -> f64 {
        self.memory_estimate.unwrap_or_default() / BYTES_PER_MB
    }
}

/// Point-in-time view of the governor for callers and UIs.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PipelineMetrics {
    pub fps: f64,
    pub average_processing_time: Duration,
    pub frames_processed: u64,
    pub frames_skipped: u64,
    pub frames_throttled: u64,
    pub frames_failed: u64,
    pub high_cpu_load: bool,
    pub memory_pressure: bool,
    pub estimated_memory_mb: f64,
}

fn push_bounded<T>(samples: &mut VecDeque<T>, value: T) {
    if samples.len() == SAMPLE_WINDOW {
        samples.pop_front();
    }
    samples.push_back(value);
}

/// Decides, once per frame, whether the frame gets the full pipeline.
#[derive(Debug)]
pub struct Governor {
    config: ThroughputConfig,
    min_interval: Duration,
    state: ThroughputState,
    rng: StdRng,
}

impl Governor {
    pub fn new(config: ThroughputConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Use `rng` for the CPU load skip draws.
    pub fn with_rng(config: ThroughputConfig, rng: StdRng) -> Self {
        Self {
            config,
            // an interval too long to represent never lets a second frame through
            min_interval: config.min_interval().unwrap_or(Duration::MAX),
            state: ThroughputState::default(),
            rng,
        }
    }

    pub fn config(&self) -> &ThroughputConfig {
        &self.config
    }

    pub fn state(&self) -> &ThroughputState {
        &self.state
    }

    /// Admit or reject a `width` x `height` frame arriving at `now`.
    ///
    /// Memory is sampled for every frame, including rejected ones. Memory
    /// pressure is checked first, then the frame-rate gate, then CPU load.
    pub fn admit(&mut self, width: u32, height: u32, now: Instant) -> Decision {
        self.sample_memory(width, height);
        let skipping = self.config.enable_frame_skipping;

        if skipping && self.state.memory_pressure {
            return self.skip(SkipReason::MemoryPressure);
        }

        if let Some(last_run) = self.state.last_run {
            if now.saturating_duration_since(last_run) < self.min_interval {
                self.state.frames_throttled += 1;
                debug!(message = "frame throttled", frames_throttled = self.state.frames_throttled);
                return Decision::Skip(SkipReason::Throttled);
            }
        }

        if skipping && self.state.high_cpu_load && self.rng.gen_bool(CPU_SKIP_PROBABILITY) {
            return self.skip(SkipReason::CpuLoad);
        }

        self.state.last_run = Some(now);
        Decision::Process
    }

    fn skip(&mut self, reason: SkipReason) -> Decision {
        self.state.frames_skipped += 1;
        debug!(
            message = "frame skipped",
            reason = %reason,
            frames_skipped = self.state.frames_skipped
        );
        Decision::Skip(reason)
    }

    /// Record a frame that went through the whole pipeline in `latency`.
    pub fn record_processed(&mut self, now: Instant, latency: Duration) {
        self.state.frames_processed += 1;
        push_bounded(&mut self.state.processed_at, now);
        self.record_latency(latency);
    }

    /// Record an admitted frame that failed after spending `latency`.
    pub fn record_failure(&mut self, latency: Duration) {
        self.state.frames_failed += 1;
        self.record_latency(latency);
    }

    fn record_latency(&mut self, latency: Duration) {
        push_bounded(&mut self.state.latencies, latency);
        let average = self.state.average_latency();
        let high = average > CPU_LATENCY_BUDGET;
        if high != self.state.high_cpu_load {
            let transition = if high {
                "high cpu load"
            } else {
                "cpu load recovered"
            };
            info!(
                message = transition,
                average_latency = ?average,
                budget = ?CPU_LATENCY_BUDGET
            );
            self.state.high_cpu_load = high;
        }
    }

    fn sample_memory(&mut self, width: u32, height: u32) {
        let bytes = f64::from(width) * f64::from(height) * BYTES_PER_PIXEL;
        let estimate = match self.state.memory_estimate {
            Some(previous) => MEMORY_DECAY * previous + (1.0 - MEMORY_DECAY) * bytes,
            None => bytes,
        };
        self.state.memory_estimate = Some(estimate);

        let pressure = estimate / BYTES_PER_MB > self.config.memory_threshold_mb;
        if pressure != self.state.memory_pressure {
            let transition = if pressure {
                "memory pressure"
            } else {
                "memory pressure relieved"
            };
            info!(
                message = transition,
                estimated_memory_mb = estimate / BYTES_PER_MB,
                threshold_mb = self.config.memory_threshold_mb
            );
            self.state.memory_pressure = pressure;
        }
    }

    pub fn metrics(&self) -> PipelineMetrics {
        let state = &self.state;
        PipelineMetrics {
            fps: state.fps(),
            average_processing_time: state.average_latency(),
            frames_processed: state.frames_processed,
            frames_skipped: state.frames_skipped,
            frames_throttled: state.frames_throttled,
            frames_failed: state.frames_failed,
            high_cpu_load: state.high_cpu_load,
            memory_pressure: state.memory_pressure,
            estimated_memory_mb: state.estimated_memory_mb(),
        }
    }

    /// Forget every counter and sample, as at the start of a new session.
    pub fn reset(&mut self) {
        self.state = ThroughputState::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    const SEED: u64 = 0x5eed;

    fn governor(config: ThroughputConfig) -> Governor {
        Governor::with_rng(config, StdRng::seed_from_u64(SEED))
    }

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    #[test]
    fn defaults_match_cli() {
        use structopt::StructOpt;
        assert_eq!(ThroughputConfig::from_iter(&["test"]), ThroughputConfig::default());
    }

    #[test]
    fn rejects_non_positive_config() {
        let config = ThroughputConfig {
            target_fps: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        let config = ThroughputConfig {
            memory_threshold_mb: -1.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_unrepresentable_frame_interval() {
        let config = ThroughputConfig {
            target_fps: 1e-310,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn tiny_target_fps_never_panics() {
        let mut governor = governor(ThroughputConfig {
            target_fps: 1e-310,
            ..Default::default()
        });
        let start = Instant::now();
        assert_eq!(governor.admit(480, 640, start), Decision::Process);
        assert_eq!(
            governor.admit(480, 640, start + Duration::from_secs(3600)),
            Decision::Skip(SkipReason::Throttled)
        );
    }

    #[test]
    fn first_frame_is_processed() {
        let mut governor = governor(ThroughputConfig::default());
        assert_eq!(governor.admit(480, 640, Instant::now()), Decision::Process);
    }

    mod throttle {
        use super::*;

        #[test]
        fn gates_on_target_frame_interval() {
            let mut governor = governor(ThroughputConfig::default());
            let start = Instant::now();
            assert_eq!(governor.admit(480, 640, start), Decision::Process);
            assert_eq!(
                governor.admit(480, 640, start + ms(10)),
                Decision::Skip(SkipReason::Throttled)
            );
            assert_eq!(governor.admit(480, 640, start + ms(34)), Decision::Process);

            let metrics = governor.metrics();
            assert_eq!(metrics.frames_throttled, 1);
            assert_eq!(metrics.frames_skipped, 0);
        }

        #[test]
        fn throttled_frames_do_not_move_the_gate() {
            let mut governor = governor(ThroughputConfig::default());
            let start = Instant::now();
            governor.admit(480, 640, start);
            for offset in &[10, 20, 30] {
                assert_eq!(
                    governor.admit(480, 640, start + ms(*offset)),
                    Decision::Skip(SkipReason::Throttled)
                );
            }
            assert_eq!(governor.admit(480, 640, start + ms(40)), Decision::Process);
        }
    }

    mod memory {
        use super::*;

        #[test]
        fn first_sample_seeds_the_average() {
            let mut governor = governor(ThroughputConfig::default());
            governor.admit(1024, 1024, Instant::now());
            assert_approx_eq!(governor.metrics().estimated_memory_mb, 4.0);
        }

        #[test]
        fn average_weights_history() {
            let mut governor = governor(ThroughputConfig::default());
            let start = Instant::now();
            governor.admit(1024, 1024, start);
            governor.admit(2048, 2048, start + ms(100));
            // 0.9 * 4 MB + 0.1 * 16 MB
            assert_approx_eq!(governor.metrics().estimated_memory_mb, 5.2);
        }

        #[test]
        fn large_frame_skips_the_tick() {
            let mut governor = governor(ThroughputConfig {
                memory_threshold_mb: 2.0,
                ..Default::default()
            });
            let start = Instant::now();
            assert_eq!(governor.admit(480, 640, start), Decision::Process);
            assert_eq!(
                governor.admit(4000, 4000, start + ms(100)),
                Decision::Skip(SkipReason::MemoryPressure)
            );

            let metrics = governor.metrics();
            assert!(metrics.memory_pressure);
            assert_eq!(metrics.frames_skipped, 1);
            assert_eq!(metrics.frames_throttled, 0);
        }

        #[test]
        fn pressure_wins_over_throttling() {
            let mut governor = governor(ThroughputConfig {
                memory_threshold_mb: 2.0,
                ..Default::default()
            });
            let start = Instant::now();
            assert_eq!(governor.admit(480, 640, start), Decision::Process);
            assert_eq!(
                governor.admit(4000, 4000, start + ms(10)),
                Decision::Skip(SkipReason::MemoryPressure)
            );

            let metrics = governor.metrics();
            assert_eq!(metrics.frames_skipped, 1);
            assert_eq!(metrics.frames_throttled, 0);
        }

        #[test]
        fn disabled_skipping_still_processes() {
            let mut governor = governor(ThroughputConfig {
                memory_threshold_mb: 1.0,
                enable_frame_skipping: false,
                ..Default::default()
            });
            assert_eq!(governor.admit(4000, 4000, Instant::now()), Decision::Process);
            assert!(governor.metrics().memory_pressure);
            assert_eq!(governor.metrics().frames_skipped, 0);
        }
    }

    mod cpu {
        use super::*;

        fn saturate(governor: &mut Governor) {
            let start = Instant::now();
            for i in 0..SAMPLE_WINDOW {
                governor.record_processed(start + ms(i as u64 * 40), ms(30));
            }
        }

        #[test]
        fn high_latency_flags_cpu_load() {
            let mut governor = governor(ThroughputConfig::default());
            saturate(&mut governor);
            assert!(governor.metrics().high_cpu_load);
            assert_eq!(governor.metrics().average_processing_time, ms(30));
        }

        #[test]
        fn load_recovers_once_latency_drops() {
            let mut governor = governor(ThroughputConfig::default());
            saturate(&mut governor);
            for _ in 0..SAMPLE_WINDOW {
                governor.record_processed(Instant::now(), ms(5));
            }
            assert!(!governor.metrics().high_cpu_load);
        }

        #[test]
        fn skips_about_thirty_percent() {
            let mut governor = governor(ThroughputConfig::default());
            saturate(&mut governor);

            let ticks = 10_000;
            let start = Instant::now();
            let skipped = (0..ticks)
                .filter(|&i| {
                    governor.admit(480, 640, start + Duration::from_secs(i))
                        == Decision::Skip(SkipReason::CpuLoad)
                })
                .count();
            let rate = skipped as f64 / ticks as f64;
            assert!((0.25..=0.35).contains(&rate), "skip rate {}", rate);
            assert_eq!(governor.metrics().frames_skipped, skipped as u64);
        }

        #[test]
        fn failures_feed_the_latency_window() {
            let mut governor = governor(ThroughputConfig::default());
            for _ in 0..SAMPLE_WINDOW {
                governor.record_failure(ms(30));
            }
            let metrics = governor.metrics();
            assert!(metrics.high_cpu_load);
            assert_eq!(metrics.frames_failed, SAMPLE_WINDOW as u64);
            assert_eq!(metrics.frames_processed, 0);
        }
    }

    #[test]
    fn fps_from_processed_instants() {
        let mut governor = governor(ThroughputConfig::default());
        let start = Instant::now();
        for i in 0..11 {
            governor.record_processed(start + ms(i * 100), ms(5));
        }
        let metrics = governor.metrics();
        assert_approx_eq!(metrics.fps, 10.0);
        assert_eq!(metrics.frames_processed, 11);
    }

    #[test]
    fn fps_is_zero_without_history() {
        let governor = governor(ThroughputConfig::default());
        assert_eq!(governor.metrics(), PipelineMetrics::default());
    }

    #[test]
    fn reset_clears_session_state() {
        let mut governor = governor(ThroughputConfig {
            memory_threshold_mb: 1.0,
            ..Default::default()
        });
        let start = Instant::now();
        governor.admit(4000, 4000, start);
        governor.record_failure(ms(3));
        governor.reset();
        assert_eq!(governor.metrics(), PipelineMetrics::default());
        assert_eq!(governor.admit(100, 100, start), Decision::Process);
    }
}
