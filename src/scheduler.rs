//! Fixed-rate tick scheduling.
//!
//! The scheduler paces the acquisition loop without owning the work done in a
//! tick. A tick looks like this:
//!
//! 1. [`SampleScheduler::start_tick`] records `loop_start`.
//! 2. The caller reads and persists a sample, calling
//!    [`SampleScheduler::record_sample`] once the sample is durable.
//! 3. The caller reports how long that took to [`SampleScheduler::complete_tick`],
//!    which sleeps for `max(0, interval - work)` and lets the loop continue, or
//!    reports [`TickOutcome::Cancelled`].
//!
//! Every tick is timed from its own `loop_start`. A slow tick is reported as
//! drift and then forgotten: the scheduler never shortens later ticks to catch
//! up, so overruns are absorbed instead of compounding.
//!
//! The scheduler has two states, `Running` and `Stopped`. The only transition is
//! Running → Stopped, taken when the cancellation flag is observed.

use crate::cancel::CancellationFlag;
use crate::error::{SensorError, SensorResult};
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

/// Default fraction of the interval a tick may overrun before it is reported.
pub const DEFAULT_DRIFT_THRESHOLD: f64 = 0.10;

/// Default number of samples between achieved-rate reports.
pub const DEFAULT_STATS_INTERVAL: u64 = 100;

/// Pacing parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerConfig {
    target_rate_hz: f64,
    interval: Duration,
    drift_threshold: f64,
    stats_interval: u64,
}

impl SchedulerConfig {
    /// Pace ticks at `target_rate_hz` with default drift and statistics settings.
    ///
    /// # Errors
    /// `SensorError::Config` unless the rate is finite and positive, and
    /// slow enough ticks still fit in a `Duration`.
    pub fn new(target_rate_hz: f64) -> SensorResult<Self> {
        if !target_rate_hz.is_finite() || target_rate_hz <= 0.0 {
            return Err(SensorError::Config(format!(
                "sample rate must be a positive number of Hz, got {target_rate_hz}"
            )));
        }
        let interval = Duration::try_from_secs_f64(1.0 / target_rate_hz).map_err(|e| {
            SensorError::Config(format!(
                "sample rate {target_rate_hz} Hz gives an unrepresentable interval: {e}"
            ))
        })?;
        Ok(Self {
            target_rate_hz,
            interval,
            drift_threshold: DEFAULT_DRIFT_THRESHOLD,
            stats_interval: DEFAULT_STATS_INTERVAL,
        })
    }

    /// Set the tolerated overrun as a fraction of the interval (0.1 = 10%).
    ///
    /// # Errors
    /// `SensorError::Config` for negative or non-finite values.
    pub fn with_drift_threshold(mut self, drift_threshold: f64) -> SensorResult<Self> {
        if !drift_threshold.is_finite() || drift_threshold < 0.0 {
            return Err(SensorError::Config(format!(
                "drift threshold must be a non-negative fraction, got {drift_threshold}"
            )));
        }
        self.drift_threshold = drift_threshold;
        Ok(self)
    }

    /// Set how many samples pass between rate reports.
    ///
    /// # Errors
    /// `SensorError::Config` if `stats_interval` is zero.
    pub fn with_stats_interval(mut self, stats_interval: u64) -> SensorResult<Self> {
        if stats_interval == 0 {
            return Err(SensorError::Config(
                "statistics interval must be at least one sample".into(),
            ));
        }
        self.stats_interval = stats_interval;
        Ok(self)
    }

    /// Target sampling rate in Hz.
    pub fn target_rate_hz(&self) -> f64 {
        self.target_rate_hz
    }

    /// Tolerated overrun fraction.
    pub fn drift_threshold(&self) -> f64 {
        self.drift_threshold
    }

    /// Samples between rate reports.
    pub fn stats_interval(&self) -> u64 {
        self.stats_interval
    }

    /// Nominal tick length, `1 / rate`.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    fn is_drift(&self, work: Duration) -> bool {
        work.as_secs_f64() > self.interval().as_secs_f64() * (1.0 + self.drift_threshold)
    }
}

/// Scheduler lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Ticks are being handed out.
    Running,
    /// Cancellation was observed; no further ticks.
    Stopped,
}

/// The session was cancelled; no tick was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("session cancelled")]
pub struct Cancelled;

/// A tick in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    /// Zero-based tick index within the session.
    pub index: u64,
    /// When the tick started (`loop_start`).
    pub started_at: Instant,
}

impl Tick {
    /// Time spent in this tick so far.
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// A tick that took noticeably longer than the interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DriftWarning {
    /// Index of the slow tick.
    pub tick: u64,
    /// Work time reported for the tick.
    pub work: Duration,
    /// Target interval.
    pub interval: Duration,
    /// How far `work` exceeded `interval`.
    pub overrun: Duration,
}

/// Periodic achieved-rate statistics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RateReport {
    /// Samples persisted so far.
    pub sample_count: u64,
    /// Samples persisted since the previous report.
    pub samples_since_last: u64,
    /// Time since session start.
    pub elapsed: Duration,
    /// `sample_count / elapsed`.
    pub achieved_rate_hz: f64,
    /// Configured rate.
    pub target_rate_hz: f64,
}

/// What happened at the end of a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    /// Index of the tick.
    pub tick: u64,
    /// Work time reported by the caller.
    pub work: Duration,
    /// Sleep computed for the tick, `max(0, interval - work)`.
    pub sleep: Duration,
    /// Set when the tick overran the drift threshold.
    pub drift: Option<DriftWarning>,
}

/// Result of [`SampleScheduler::complete_tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The inter-tick wait finished; start the next tick.
    Continue(TickReport),
    /// Cancellation was observed; the session is over.
    Cancelled(TickReport),
}

impl TickOutcome {
    /// The report for the completed tick.
    pub fn report(&self) -> &TickReport {
        match self {
            TickOutcome::Continue(report) | TickOutcome::Cancelled(report) => report,
        }
    }

    /// Whether the session should stop.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TickOutcome::Cancelled(_))
    }
}

/// Cumulative session counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
    /// Samples persisted.
    pub sample_count: u64,
    /// Ticks started.
    pub tick_count: u64,
    /// Ticks that overran the drift threshold.
    pub drift_warnings: u64,
    /// Monotonic session start.
    pub session_start: Instant,
    /// `sample_count` at the last rate report.
    pub last_sync_count: u64,
}

impl SessionStats {
    fn new(session_start: Instant) -> Self {
        Self {
            sample_count: 0,
            tick_count: 0,
            drift_warnings: 0,
            session_start,
            last_sync_count: 0,
        }
    }

    /// Time since session start.
    pub fn elapsed(&self) -> Duration {
        Instant::now().saturating_duration_since(self.session_start)
    }

    /// Samples per second over `elapsed`, zero for an empty interval.
    pub fn rate_over(&self, elapsed: Duration) -> f64 {
        let secs = elapsed.as_secs_f64();
        if secs > 0.0 {
            self.sample_count as f64 / secs
        } else {
            0.0
        }
    }
}

/// Paces the acquisition loop and keeps session statistics.
#[derive(Debug)]
pub struct SampleScheduler {
    config: SchedulerConfig,
    state: SchedulerState,
    stats: SessionStats,
    cancel: CancellationFlag,
    current: Option<Tick>,
}

impl SampleScheduler {
    /// Create a running scheduler for a session that started at `session_start`.
    pub fn new(config: SchedulerConfig, cancel: CancellationFlag, session_start: Instant) -> Self {
        Self {
            config,
            state: SchedulerState::Running,
            stats: SessionStats::new(session_start),
            cancel,
            current: None,
        }
    }

    /// Pacing parameters.
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Counters so far.
    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Begin a tick, recording `loop_start`.
    ///
    /// # Errors
    /// [`Cancelled`] once the scheduler is stopped or the flag is raised.
    pub fn start_tick(&mut self) -> Result<Tick, Cancelled> {
        if self.state == SchedulerState::Stopped || self.cancel.is_cancelled() {
            self.state = SchedulerState::Stopped;
            return Err(Cancelled);
        }

        let tick = Tick {
            index: self.stats.tick_count,
            started_at: Instant::now(),
        };
        self.stats.tick_count += 1;
        self.current = Some(tick);
        Ok(tick)
    }

    /// Count one persisted sample.
    ///
    /// Every `stats_interval` samples the achieved rate is returned. The report
    /// is informational and never changes the pacing.
    pub fn record_sample(&mut self) -> Option<RateReport> {
        self.stats.sample_count += 1;
        if self.stats.sample_count % self.config.stats_interval != 0 {
            return None;
        }

        let elapsed = self.stats.elapsed();
        let report = RateReport {
            sample_count: self.stats.sample_count,
            samples_since_last: self.stats.sample_count - self.stats.last_sync_count,
            elapsed,
            achieved_rate_hz: self.stats.rate_over(elapsed),
            target_rate_hz: self.config.target_rate_hz,
        };
        self.stats.last_sync_count = self.stats.sample_count;
        Some(report)
    }

    /// Finish the current tick and wait out the rest of its interval.
    ///
    /// `work` is how long the caller spent since `start_tick`. If the flag is
    /// already raised this returns `Cancelled` without sleeping; a cancellation
    /// arriving during the sleep cuts it short.
    pub async fn complete_tick(&mut self, work: Duration) -> TickOutcome {
        let interval = self.config.interval();
        let tick = self
            .current
            .take()
            .map_or(self.stats.tick_count.saturating_sub(1), |t| t.index);

        let drift = self.config.is_drift(work).then(|| DriftWarning {
            tick,
            work,
            interval,
            overrun: work.saturating_sub(interval),
        });
        if drift.is_some() {
            self.stats.drift_warnings += 1;
        }

        let report = TickReport {
            tick,
            work,
            sleep: interval.saturating_sub(work),
            drift,
        };

        if self.cancel.is_cancelled() {
            self.state = SchedulerState::Stopped;
            return TickOutcome::Cancelled(report);
        }
        if report.sleep.is_zero() {
            return TickOutcome::Continue(report);
        }

        tokio::select! {
            _ = tokio::time::sleep(report.sleep) => TickOutcome::Continue(report),
            _ = self.cancel.cancelled() => {
                self.state = SchedulerState::Stopped;
                TickOutcome::Cancelled(report)
            }
        }
    }

    /// Stop the scheduler and hand back the final counters.
    pub fn finish(&mut self) -> SessionStats {
        self.state = SchedulerState::Stopped;
        self.current = None;
        self.stats
    }
}
