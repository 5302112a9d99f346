//! Fixed-rate frame scheduler.

use std::time::{Duration, Instant};

use rand::Rng;
use tokio::time::{self, Instant as TokioInstant};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for a [`FrameScheduler`].
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Frames per second. Clamped to `1..=MAX_FRAME_RATE_HZ`.
    pub frame_rate_hz: u32,
    /// Fraction of the frame budget after which a warning is logged.
    pub budget_warn_threshold: f64,
    /// Random delay (0–max µs) added to the first frame so clients that
    /// start together do not all publish snapshots in the same instant.
    pub initial_jitter_us: u64,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            frame_rate_hz: 60,
            budget_warn_threshold: 0.80,
            initial_jitter_us: 2_000,
        }
    }
}

impl FrameConfig {
    /// Highest supported frame rate.
    pub const MAX_FRAME_RATE_HZ: u32 = 240;

    /// A config for `frame_rate_hz` with the remaining defaults.
    pub fn with_rate(frame_rate_hz: u32) -> Self {
        Self {
            frame_rate_hz,
            ..Default::default()
        }
    }

    /// Clamps out-of-range values. Called by [`FrameScheduler::new`].
    pub fn validated(mut self) -> Self {
        if self.frame_rate_hz == 0 || self.frame_rate_hz > Self::MAX_FRAME_RATE_HZ {
            let clamped = self.frame_rate_hz.clamp(1, Self::MAX_FRAME_RATE_HZ);
            warn!(
                rate = self.frame_rate_hz,
                clamped, "frame_rate_hz out of range: clamping"
            );
            self.frame_rate_hz = clamped;
        }
        self.budget_warn_threshold = self.budget_warn_threshold.clamp(0.0, 1.0);
        self
    }

    /// Duration of one frame.
    pub fn frame_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.frame_rate_hz.max(1)))
    }
}

// ---------------------------------------------------------------------------
// Frame info
// ---------------------------------------------------------------------------

/// What the loop needs to know about the frame that just fired.
#[derive(Debug, Clone, Copy)]
pub struct FrameInfo {
    /// Monotonic frame counter, starting at 1.
    pub frame: u64,
    /// Time since the previous frame. Equals the nominal frame duration
    /// unless the loop hitched.
    pub dt: Duration,
    /// Loop time: elapsed since the scheduler was created. Every timer and
    /// timestamp in the session layer is expressed on this clock.
    pub now: Duration,
    /// `true` if the frame fired noticeably late.
    pub overrun: bool,
}

/// Counters kept by the scheduler.
#[derive(Debug, Clone, Default)]
pub struct FrameMetrics {
    /// Frames fired.
    pub total_frames: u64,
    /// Frames that fired late.
    pub total_overruns: u64,
    /// Whole frames skipped to recover from overruns.
    pub total_skipped: u64,
    /// Longest observed frame body.
    pub max_frame_time: Duration,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Drives the update loop of one client at a fixed rate.
///
/// Late frames never trigger catch-up bursts: the next deadline is always
/// measured from the moment the late frame actually fired.
pub struct FrameScheduler {
    config: FrameConfig,
    frame_duration: Duration,
    origin: TokioInstant,
    next_frame: TokioInstant,
    last_frame: TokioInstant,
    frame: u64,
    frame_start: Option<Instant>,
    paused: bool,
    metrics: FrameMetrics,
}

impl FrameScheduler {
    /// Creates a scheduler. Loop time starts at zero now.
    pub fn new(config: FrameConfig) -> Self {
        let config = config.validated();
        let frame_duration = config.frame_duration();
        let origin = TokioInstant::now();
        let jitter = if config.initial_jitter_us > 0 {
            Duration::from_micros(
                rand::rng().random_range(0..config.initial_jitter_us),
            )
        } else {
            Duration::ZERO
        };

        debug!(
            rate_hz = config.frame_rate_hz,
            budget_ms = frame_duration.as_secs_f64() * 1000.0,
            "frame scheduler created"
        );

        Self {
            config,
            frame_duration,
            origin,
            next_frame: origin + frame_duration + jitter,
            last_frame: origin,
            frame: 0,
            frame_start: None,
            paused: false,
            metrics: FrameMetrics::default(),
        }
    }

    /// Shorthand for [`FrameScheduler::new`] with [`FrameConfig::with_rate`].
    pub fn with_rate(frame_rate_hz: u32) -> Self {
        Self::new(FrameConfig::with_rate(frame_rate_hz))
    }

    /// Waits for the next frame.
    ///
    /// While paused this future pends forever so `tokio::select!` keeps
    /// servicing its other branches.
    pub async fn wait_for_frame(&mut self) -> FrameInfo {
        if self.paused {
            std::future::pending::<()>().await;
        }

        let deadline = self.next_frame;
        time::sleep_until(deadline).await;

        let fired = TokioInstant::now();
        let late_by = fired.saturating_duration_since(deadline);
        let overrun = late_by > self.frame_duration / 10;
        if overrun {
            let skipped =
                (late_by.as_nanos() / self.frame_duration.as_nanos()) as u64;
            self.metrics.total_overruns += 1;
            self.metrics.total_skipped += skipped;
            if skipped > 0 {
                warn!(
                    frame = self.frame + 1,
                    skipped,
                    late_ms = late_by.as_secs_f64() * 1000.0,
                    "frame overrun: skipping ahead"
                );
            }
        }

        self.frame += 1;
        self.metrics.total_frames += 1;
        self.frame_start = Some(Instant::now());
        let dt = fired.saturating_duration_since(self.last_frame);
        self.last_frame = fired;
        self.next_frame = fired + self.frame_duration;

        trace!(frame = self.frame, overrun, "frame fired");

        FrameInfo {
            frame: self.frame,
            dt,
            now: fired.saturating_duration_since(self.origin),
            overrun,
        }
    }

    /// Marks the end of the current frame body for budget monitoring.
    pub fn record_frame_end(&mut self) {
        let Some(start) = self.frame_start.take() else {
            return;
        };
        let elapsed = start.elapsed();
        if elapsed > self.metrics.max_frame_time {
            self.metrics.max_frame_time = elapsed;
        }
        let utilization =
            elapsed.as_secs_f64() / self.frame_duration.as_secs_f64();
        if utilization >= self.config.budget_warn_threshold {
            warn!(
                frame = self.frame,
                elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                utilization_pct = format!("{:.1}", utilization * 100.0),
                "frame approaching budget limit"
            );
        }
    }

    /// Current loop time, readable between frames (e.g. while handling a
    /// network message).
    pub fn now(&self) -> Duration {
        TokioInstant::now().saturating_duration_since(self.origin)
    }

    /// Stops firing frames until [`resume`](Self::resume). Idempotent.
    pub fn pause(&mut self) {
        if !self.paused {
            self.paused = true;
            debug!(frame = self.frame, "frame scheduler paused");
        }
    }

    /// Resumes after a pause without a burst of frames for the paused time.
    pub fn resume(&mut self) {
        if self.paused {
            self.paused = false;
            let now = TokioInstant::now();
            self.last_frame = now;
            self.next_frame = now + self.frame_duration;
            debug!(frame = self.frame, "frame scheduler resumed");
        }
    }

    /// Whether the scheduler is paused.
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Frames fired so far.
    pub fn frame_count(&self) -> u64 {
        self.frame
    }

    /// Nominal frame duration.
    pub fn frame_duration(&self) -> Duration {
        self.frame_duration
    }

    /// Scheduler counters.
    pub fn metrics(&self) -> &FrameMetrics {
        &self.metrics
    }
}
