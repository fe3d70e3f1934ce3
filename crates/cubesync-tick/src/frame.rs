//! Fixed-rate frame pacing.

use std::time::{Duration, Instant};

use rand::Rng;
use tokio::time::{self, Instant as TokioInstant};
use tracing::{debug, trace, warn};

/// Frame loop settings.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Frames per second. Clamped to `1..=MAX_RATE_HZ`.
    pub rate_hz: u32,
    /// Upper bound of a random delay added before the first frame, so
    /// processes launched together don't wake in lockstep.
    pub start_jitter: Duration,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            rate_hz: 60,
            start_jitter: Duration::from_millis(2),
        }
    }
}

impl FrameConfig {
    pub const MAX_RATE_HZ: u32 = 240;

    pub fn with_rate(rate_hz: u32) -> Self {
        Self {
            rate_hz,
            ..Default::default()
        }
    }

    /// Clamps the rate into range. Called by [`FrameScheduler::new`].
    pub fn validated(mut self) -> Self {
        let clamped = self.rate_hz.clamp(1, Self::MAX_RATE_HZ);
        if clamped != self.rate_hz {
            warn!(rate = self.rate_hz, clamped, "frame rate out of range, clamping");
            self.rate_hz = clamped;
        }
        self
    }

    /// Length of one frame.
    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.rate_hz.max(1)))
    }
}

/// One frame, as handed out by [`FrameScheduler::wait_for_frame`].
#[derive(Debug, Clone)]
pub struct FrameInfo {
    /// Frame number, starting at 1.
    pub frame: u64,
    /// When the frame woke up. Pass this to `update(now)`.
    pub now: TokioInstant,
    /// How far past its deadline the frame woke.
    pub late_by: Duration,
}

/// Paces a frame loop at a fixed rate.
///
/// A frame that wakes late is not made up for: the next one is due a full
/// period after the late wake-up.
pub struct FrameScheduler {
    rate_hz: u32,
    period: Duration,
    frame_count: u64,
    next_frame: TokioInstant,
    work_started: Option<Instant>,
    slow_frames: u64,
}

impl FrameScheduler {
    pub fn new(config: FrameConfig) -> Self {
        let config = config.validated();
        let period = config.period();

        let max_jitter = config.start_jitter.as_micros() as u64;
        let jitter = if max_jitter > 0 {
            Duration::from_micros(rand::rng().random_range(0..max_jitter))
        } else {
            Duration::ZERO
        };

        debug!(rate_hz = config.rate_hz, "frame scheduler created");

        Self {
            rate_hz: config.rate_hz,
            period,
            frame_count: 0,
            next_frame: TokioInstant::now() + period + jitter,
            work_started: None,
            slow_frames: 0,
        }
    }

    pub fn with_rate(rate_hz: u32) -> Self {
        Self::new(FrameConfig::with_rate(rate_hz))
    }

    /// Sleeps until the next frame is due.
    pub async fn wait_for_frame(&mut self) -> FrameInfo {
        let deadline = self.next_frame;
        time::sleep_until(deadline).await;

        let now = TokioInstant::now();
        let late_by = now.saturating_duration_since(deadline);
        self.frame_count += 1;
        self.next_frame = now + self.period;
        self.work_started = Some(Instant::now());

        if late_by >= self.period {
            debug!(
                frame = self.frame_count,
                late_ms = late_by.as_millis() as u64,
                "frame loop fell behind"
            );
        }
        trace!(frame = self.frame_count, "frame");

        FrameInfo {
            frame: self.frame_count,
            now,
            late_by,
        }
    }

    /// Marks the end of the current frame's work. Work that overran the
    /// period is logged and counted. No-op without a preceding
    /// [`wait_for_frame`](Self::wait_for_frame).
    pub fn record_frame_end(&mut self) {
        let Some(started) = self.work_started.take() else {
            return;
        };
        let elapsed = started.elapsed();
        if elapsed > self.period {
            self.slow_frames += 1;
            warn!(
                frame = self.frame_count,
                elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                period_ms = self.period.as_secs_f64() * 1000.0,
                "frame work overran its period"
            );
        }
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Frames whose work took longer than one period.
    pub fn slow_frames(&self) -> u64 {
        self.slow_frames
    }

    /// The rate in Hz, after clamping.
    pub fn rate_hz(&self) -> u32 {
        self.rate_hz
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}
