//! Session control for the acquisition loop.
//!
//! A [`SessionController`] owns everything a session needs: the channel set, the
//! sample store, the scheduler settings, the error policy and the cancellation
//! flag. [`SessionController::run`] drives ticks until the flag is raised or a
//! fail-stop condition occurs, then syncs the log and returns a
//! [`SessionSummary`].
//!
//! ## Error Handling
//!
//! - **Read errors** drop the tick's sample; the loop carries on.
//! - **Storage errors** are logged and the loop carries on. From the
//!   [`STORAGE_ALERT_THRESHOLD`]th consecutive failure onwards they are logged at
//!   error level so an operator notices.
//! - Either kind ends the session once its `max_consecutive_*` limit in
//!   [`ErrorPolicy`] is reached.
//! - Anything not recoverable (a sample that does not fit the log) ends the
//!   session immediately. Records already written are left untouched.
//!
//! Cancellation is not an error: it ends the session through the same orderly
//! path and the summary reports `SessionEnd::Cancelled`.

use crate::cancel::CancellationFlag;
use crate::channel::{ChannelEntry, ChannelSet};
use crate::config::{AcquisitionConfig, ChannelDefinition};
use crate::data::{CsvLogStore, SampleStore};
use crate::error::{SensorError, SensorResult};
use crate::hardware::ChannelReader;
use crate::sample::{Sample, SampleReader};
use crate::scheduler::{SampleScheduler, SchedulerConfig, Tick};
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Consecutive storage failures after which each failure is logged as an error.
pub const STORAGE_ALERT_THRESHOLD: u32 = 3;

/// When repeated recoverable errors end a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ErrorPolicy {
    /// Consecutive read failures that end the session (`None` = never)
    pub max_consecutive_read_errors: Option<u32>,
    /// Consecutive storage failures that end the session (`None` = never)
    pub max_consecutive_storage_errors: Option<u32>,
}

impl ErrorPolicy {
    fn from_config(config: &AcquisitionConfig) -> Self {
        Self {
            max_consecutive_read_errors: config.max_consecutive_read_errors,
            max_consecutive_storage_errors: config.max_consecutive_storage_errors,
        }
    }
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SessionEnd {
    /// The cancellation flag was raised.
    Cancelled {
        /// Reason given when the flag was raised.
        reason: Option<String>,
    },
    /// A fail-stop condition ended the session.
    Failed {
        /// What went wrong.
        reason: String,
    },
}

/// Final report of a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    /// Wall-clock time the session started.
    pub started_at: DateTime<Utc>,
    /// Samples durably appended.
    pub total_samples: u64,
    /// Ticks started, including ones whose sample was dropped.
    pub total_ticks: u64,
    /// Session duration.
    #[serde(serialize_with = "serialize_secs")]
    pub total_time: Duration,
    /// `total_samples / total_time`.
    pub average_rate_hz: f64,
    /// Configured rate.
    pub target_rate_hz: f64,
    /// Ticks that overran the drift threshold.
    pub drift_warnings: u64,
    /// Failed sample reads.
    pub read_errors: u64,
    /// Failed appends.
    pub storage_errors: u64,
    /// Log file.
    pub log_path: PathBuf,
    /// Whether the final sync of the log succeeded.
    pub log_synced: bool,
    /// How the session ended.
    pub end: SessionEnd,
}

impl SessionSummary {
    /// Ended by cancellation and the log was synced.
    pub fn is_clean(&self) -> bool {
        matches!(self.end, SessionEnd::Cancelled { .. }) && self.log_synced
    }
}

fn serialize_secs<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(value.as_secs_f64())
}

#[derive(Debug, Default)]
struct ErrorCounters {
    read_errors: u64,
    storage_errors: u64,
    consecutive_read: u32,
    consecutive_storage: u32,
}

/// Runs one acquisition session.
pub struct SessionController<S> {
    channels: Arc<ChannelSet>,
    store: S,
    scheduler_config: SchedulerConfig,
    policy: ErrorPolicy,
    display_interval: u64,
    cancel: CancellationFlag,
}

impl SessionController<CsvLogStore> {
    /// Build a session from configuration.
    ///
    /// `reader_for` supplies the reader for each configured channel. The CSV
    /// log is opened (and created with a header if needed) here, so an
    /// unwritable path fails before any tick runs.
    ///
    /// # Errors
    /// `SensorError::Config` for invalid configuration, `SensorError::Storage`
    /// if the log cannot be opened.
    pub fn open<F>(config: &AcquisitionConfig, mut reader_for: F) -> SensorResult<Self>
    where
        F: FnMut(&ChannelDefinition) -> Arc<dyn ChannelReader>,
    {
        config.validate()?;

        let entries = config
            .channels
            .iter()
            .map(|def| ChannelEntry::new(def.into(), reader_for(def)))
            .collect();
        let channels = Arc::new(ChannelSet::new(entries)?);
        let store = CsvLogStore::open_or_create(&config.log_path, channels.ids())?;

        Ok(Self::new(channels, store, config.scheduler_config()?)?
            .with_error_policy(ErrorPolicy::from_config(config))
            .with_display_interval(config.display_interval))
    }
}

impl<S: SampleStore> SessionController<S> {
    /// Create a controller over an already opened store.
    ///
    /// # Errors
    /// `SensorError::Config` if the store's header does not have one column
    /// per channel after the timestamp.
    pub fn new(
        channels: Arc<ChannelSet>,
        store: S,
        scheduler_config: SchedulerConfig,
    ) -> SensorResult<Self> {
        let expected = channels.len() + 1;
        if store.header().len() != expected {
            return Err(SensorError::Config(format!(
                "log header has {} columns, channel set needs {}",
                store.header().len(),
                expected
            )));
        }

        Ok(Self {
            channels,
            store,
            scheduler_config,
            policy: ErrorPolicy::default(),
            display_interval: 10,
            cancel: CancellationFlag::new(),
        })
    }

    /// Set the escalation policy for repeated errors.
    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Dump readings at debug level every `interval` samples (minimum 1).
    pub fn with_display_interval(mut self, interval: u64) -> Self {
        self.display_interval = interval.max(1);
        self
    }

    /// Use an existing cancellation flag instead of the controller's own.
    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// A handle that ends the session when raised.
    pub fn cancellation_handle(&self) -> CancellationFlag {
        self.cancel.clone()
    }

    /// The channel set being sampled.
    pub fn channels(&self) -> &ChannelSet {
        &self.channels
    }

    /// Run ticks until cancellation or a fail-stop condition.
    pub async fn run(mut self) -> SessionSummary {
        let session_start = Instant::now();
        let started_at = Utc::now();
        let reader = SampleReader::new(session_start);
        let mut scheduler =
            SampleScheduler::new(self.scheduler_config, self.cancel.clone(), session_start);
        let mut counters = ErrorCounters::default();

        info!(
            rate_hz = self.scheduler_config.target_rate_hz(),
            interval_ms = self.scheduler_config.interval().as_secs_f64() * 1000.0,
            channels = self.channels.len(),
            log = %self.store.path().display(),
            "Starting acquisition"
        );

        let mut failure = None;
        while let Ok(tick) = scheduler.start_tick() {
            if let Err(reason) = self.run_tick(&tick, &reader, &mut scheduler, &mut counters) {
                failure = Some(reason);
                break;
            }

            let outcome = scheduler.complete_tick(tick.elapsed()).await;
            if let Some(drift) = outcome.report().drift {
                warn!(
                    tick = drift.tick,
                    work_ms = drift.work.as_secs_f64() * 1000.0,
                    interval_ms = drift.interval.as_secs_f64() * 1000.0,
                    overrun_ms = drift.overrun.as_secs_f64() * 1000.0,
                    "Sampling overrun: tick took {:.3}s > {:.3}s",
                    drift.work.as_secs_f64(),
                    drift.interval.as_secs_f64()
                );
            }
            if outcome.is_cancelled() {
                break;
            }
        }

        self.shutdown(scheduler, counters, started_at, failure)
    }

    /// Read and persist one sample. `Err` carries a fail-stop reason.
    fn run_tick(
        &mut self,
        tick: &Tick,
        reader: &SampleReader,
        scheduler: &mut SampleScheduler,
        counters: &mut ErrorCounters,
    ) -> Result<(), String> {
        let sample = match reader.read_all(&self.channels) {
            Ok(sample) => {
                counters.consecutive_read = 0;
                sample
            }
            Err(e) => {
                counters.read_errors += 1;
                counters.consecutive_read += 1;
                warn!(tick = tick.index, error = %e, "Dropping sample");
                return match self.policy.max_consecutive_read_errors {
                    Some(limit) if counters.consecutive_read >= limit => Err(format!(
                        "{} consecutive read failures, last: {e}",
                        counters.consecutive_read
                    )),
                    _ => Ok(()),
                };
            }
        };

        match self.store.append(&sample) {
            Ok(()) => {
                counters.consecutive_storage = 0;
                self.persisted(&sample, scheduler);
                Ok(())
            }
            Err(e) if e.is_recoverable() => {
                counters.storage_errors += 1;
                counters.consecutive_storage += 1;
                if counters.consecutive_storage >= STORAGE_ALERT_THRESHOLD {
                    error!(
                        tick = tick.index,
                        consecutive = counters.consecutive_storage,
                        error = %e,
                        "Sample log keeps failing; samples are being lost"
                    );
                } else {
                    warn!(tick = tick.index, error = %e, "Failed to append sample");
                }
                match self.policy.max_consecutive_storage_errors {
                    Some(limit) if counters.consecutive_storage >= limit => Err(format!(
                        "{} consecutive storage failures, last: {e}",
                        counters.consecutive_storage
                    )),
                    _ => Ok(()),
                }
            }
            Err(e) => {
                error!(tick = tick.index, error = %e, "Unrecoverable error, stopping session");
                Err(e.to_string())
            }
        }
    }

    fn persisted(&self, sample: &Sample, scheduler: &mut SampleScheduler) {
        if let Some(report) = scheduler.record_sample() {
            info!(
                samples = report.sample_count,
                elapsed_s = report.elapsed.as_secs_f64(),
                achieved_hz = report.achieved_rate_hz,
                target_hz = report.target_rate_hz,
                "Samples saved: {}, achieved rate {:.2} Hz",
                report.sample_count,
                report.achieved_rate_hz
            );
        }

        let count = scheduler.stats().sample_count;
        if (count - 1) % self.display_interval == 0 {
            debug!(
                timestamp_ms = sample.timestamp_ms,
                readings = ?sample.readings,
                "Sample {}",
                count
            );
        }
    }

    fn shutdown(
        mut self,
        mut scheduler: SampleScheduler,
        counters: ErrorCounters,
        started_at: DateTime<Utc>,
        failure: Option<String>,
    ) -> SessionSummary {
        let stats = scheduler.finish();
        let total_time = stats.elapsed();

        let log_synced = match self.store.finalize() {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "Could not confirm the sample log is durable");
                false
            }
        };

        let end = match failure {
            Some(reason) => SessionEnd::Failed { reason },
            None => SessionEnd::Cancelled {
                reason: self.cancel.reason(),
            },
        };

        let summary = SessionSummary {
            started_at,
            total_samples: stats.sample_count,
            total_ticks: stats.tick_count,
            total_time,
            average_rate_hz: stats.rate_over(total_time),
            target_rate_hz: self.scheduler_config.target_rate_hz(),
            drift_warnings: stats.drift_warnings,
            read_errors: counters.read_errors,
            storage_errors: counters.storage_errors,
            log_path: self.store.path().to_path_buf(),
            log_synced,
            end,
        };

        match &summary.end {
            SessionEnd::Cancelled { reason } => info!(
                samples = summary.total_samples,
                total_time_s = summary.total_time.as_secs_f64(),
                average_hz = summary.average_rate_hz,
                reason = reason.as_deref().unwrap_or("cancelled"),
                "Acquisition finished: {} samples in {:.1} s ({:.2} Hz), data in '{}'",
                summary.total_samples,
                summary.total_time.as_secs_f64(),
                summary.average_rate_hz,
                summary.log_path.display()
            ),
            SessionEnd::Failed { reason } => error!(
                samples = summary.total_samples,
                reason = %reason,
                "Acquisition stopped on error; partial data kept in '{}'",
                summary.log_path.display()
            ),
        }

        summary
    }
}
