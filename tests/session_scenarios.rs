//! End-to-end acquisition sessions against a real CSV log.
//!
//! These run on tokio's paused clock, so inter-tick sleeps complete instantly
//! and timestamps land exactly on the tick grid.

use sensor_daq::hardware::mock::MockChannelReader;
use sensor_daq::{
    CancellationFlag, Channel, ChannelEntry, ChannelReader, ChannelSet, CsvLogStore,
    SampleStore, SchedulerConfig, SensorError, SensorResult, SessionController, SessionEnd,
};
use sensor_daq::config::{AcquisitionConfig, ChannelDefinition};
use sensor_daq::sample::Sample;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tempfile::tempdir;

// =============================================================================
// Helpers
// =============================================================================

/// Wraps a reader and raises the cancellation flag on the given read.
struct CancelOnRead {
    inner: MockChannelReader,
    reads: AtomicU64,
    cancel_on: u64,
    cancel: CancellationFlag,
}

impl ChannelReader for CancelOnRead {
    fn read_raw(&self) -> anyhow::Result<u16> {
        let n = self.reads.fetch_add(1, Ordering::SeqCst) + 1;
        if n == self.cancel_on {
            self.cancel.cancel("operator interrupt");
        }
        self.inner.read_raw()
    }
}

/// CSV store that fails chosen appends with an I/O error.
struct FlakyStore {
    inner: CsvLogStore,
    attempts: u64,
    fail_on: Vec<u64>,
}

impl SampleStore for FlakyStore {
    fn header(&self) -> &[String] {
        self.inner.header()
    }

    fn append(&mut self, sample: &Sample) -> SensorResult<()> {
        self.attempts += 1;
        if self.fail_on.contains(&self.attempts) {
            return Err(SensorError::Storage {
                path: self.inner.path().to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "transient write failure"),
            });
        }
        self.inner.append(sample)
    }

    fn finalize(&mut self) -> SensorResult<()> {
        self.inner.finalize()
    }

    fn path(&self) -> &Path {
        self.inner.path()
    }

    fn records_written(&self) -> u64 {
        self.inner.records_written()
    }
}

fn two_channel_set(
    a: impl ChannelReader + 'static,
    b: impl ChannelReader + 'static,
) -> Arc<ChannelSet> {
    Arc::new(
        ChannelSet::new(vec![
            ChannelEntry::new(Channel::new("A", (0.0, 0.0)), Arc::new(a)),
            ChannelEntry::new(Channel::new("B", (1.0, 0.0)), Arc::new(b)),
        ])
        .unwrap(),
    )
}

fn data_records(path: &Path) -> Vec<Vec<u64>> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .skip(1)
        .map(|line| line.split(',').map(|f| f.parse().unwrap()).collect())
        .collect()
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test(start_paused = true)]
async fn three_ticks_into_new_log() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("sensor_data.csv");
    let cancel = CancellationFlag::new();

    let channels = two_channel_set(
        CancelOnRead {
            inner: MockChannelReader::with_sequence([100, 101, 99]),
            reads: AtomicU64::new(0),
            cancel_on: 3,
            cancel: cancel.clone(),
        },
        MockChannelReader::with_sequence([200, 198, 205]),
    );
    let store = CsvLogStore::open_or_create(&path, channels.ids()).unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "timestamp,A,B\n");

    let summary = SessionController::new(channels, store, SchedulerConfig::new(10.0).unwrap())
        .unwrap()
        .with_cancellation(cancel)
        .run()
        .await;

    assert_eq!(summary.total_samples, 3);
    assert!(summary.is_clean());

    let contents = std::fs::read_to_string(&path).unwrap();
    assert!(contents.starts_with("timestamp,A,B\n"));
    let records = data_records(&path);
    assert_eq!(records.len(), 3);
    assert_eq!(
        records.iter().map(|r| (r[1], r[2])).collect::<Vec<_>>(),
        vec![(100, 200), (101, 198), (99, 205)]
    );
    assert!(records.windows(2).all(|w| w[0][0] < w[1][0]));
    assert!(records.iter().all(|r| r.len() == 3));
}

#[tokio::test(start_paused = true)]
async fn cancellation_after_37_ticks() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cancel.csv");
    let cancel = CancellationFlag::new();

    let channels = two_channel_set(
        CancelOnRead {
            inner: MockChannelReader::new(512),
            reads: AtomicU64::new(0),
            cancel_on: 37,
            cancel: cancel.clone(),
        },
        MockChannelReader::new(1024),
    );
    let store = CsvLogStore::open_or_create(&path, channels.ids()).unwrap();

    let summary = SessionController::new(channels, store, SchedulerConfig::new(10.0).unwrap())
        .unwrap()
        .with_cancellation(cancel)
        .run()
        .await;

    assert_eq!(summary.total_samples, 37);
    assert_eq!(summary.total_ticks, 37);
    assert_eq!(
        summary.end,
        SessionEnd::Cancelled {
            reason: Some("operator interrupt".into())
        }
    );
    assert!(summary.log_synced);

    let lines = std::fs::read_to_string(&path).unwrap().lines().count();
    assert_eq!(lines, 38, "header plus 37 records");

    // 36 full intervals at 10 Hz.
    assert!(summary.total_time >= std::time::Duration::from_millis(3600));
    assert!((summary.average_rate_hz - 37.0 / 3.6).abs() < 0.5);
}

#[tokio::test(start_paused = true)]
async fn transient_storage_failure_is_survived() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("flaky.csv");
    let cancel = CancellationFlag::new();

    let channels = two_channel_set(
        CancelOnRead {
            inner: MockChannelReader::with_sequence([1, 2, 3, 4]),
            reads: AtomicU64::new(0),
            cancel_on: 4,
            cancel: cancel.clone(),
        },
        MockChannelReader::with_sequence([10, 20, 30, 40]),
    );
    let store = FlakyStore {
        inner: CsvLogStore::open_or_create(&path, channels.ids()).unwrap(),
        attempts: 0,
        fail_on: vec![2],
    };

    let summary = SessionController::new(channels, store, SchedulerConfig::new(10.0).unwrap())
        .unwrap()
        .with_cancellation(cancel)
        .run()
        .await;

    assert!(summary.is_clean());
    assert_eq!(summary.storage_errors, 1);
    assert_eq!(summary.total_ticks, 4);
    assert_eq!(summary.total_samples, 3);

    let records = data_records(&path);
    assert_eq!(
        records.iter().map(|r| (r[1], r[2])).collect::<Vec<_>>(),
        vec![(1, 10), (3, 30), (4, 40)]
    );
}

#[tokio::test(start_paused = true)]
async fn storage_error_limit_is_fail_stop() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("failing.csv");

    let channels = two_channel_set(MockChannelReader::new(1), MockChannelReader::new(2));
    let store = FlakyStore {
        inner: CsvLogStore::open_or_create(&path, channels.ids()).unwrap(),
        attempts: 0,
        fail_on: vec![3, 4, 5],
    };

    let summary = SessionController::new(channels, store, SchedulerConfig::new(10.0).unwrap())
        .unwrap()
        .with_error_policy(sensor_daq::ErrorPolicy {
            max_consecutive_read_errors: None,
            max_consecutive_storage_errors: Some(3),
        })
        .run()
        .await;

    assert!(matches!(summary.end, SessionEnd::Failed { .. }));
    assert_eq!(summary.total_samples, 2);
    assert_eq!(summary.storage_errors, 3);
    // Records written before the failures are kept.
    assert_eq!(data_records(&path).len(), 2);
}

#[tokio::test(start_paused = true)]
async fn read_errors_drop_samples_but_continue() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("reads.csv");
    let cancel = CancellationFlag::new();

    let flaky = Arc::new(MockChannelReader::with_sequence([7, 8, 9]));
    flaky.trigger_failure();
    let channels = Arc::new(
        ChannelSet::new(vec![
            ChannelEntry::new(Channel::new("A", (0.0, 0.0)), flaky.clone()),
            ChannelEntry::new(
                Channel::new("B", (1.0, 0.0)),
                Arc::new(CancelOnRead {
                    inner: MockChannelReader::new(50),
                    reads: AtomicU64::new(0),
                    cancel_on: 2,
                    cancel: cancel.clone(),
                }),
            ),
        ])
        .unwrap(),
    );
    let store = CsvLogStore::open_or_create(&path, channels.ids()).unwrap();

    let summary = SessionController::new(channels, store, SchedulerConfig::new(10.0).unwrap())
        .unwrap()
        .with_cancellation(cancel)
        .run()
        .await;

    // Tick 0 fails on channel A before B is read; ticks 1 and 2 succeed.
    assert_eq!(summary.read_errors, 1);
    assert_eq!(summary.total_ticks, 3);
    assert_eq!(summary.total_samples, 2);
    assert_eq!(
        data_records(&path)
            .iter()
            .map(|r| (r[1], r[2]))
            .collect::<Vec<_>>(),
        vec![(7, 50), (8, 50)]
    );
}

#[tokio::test(start_paused = true)]
async fn session_from_config_appends_to_existing_log() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("configured.csv");
    let config = AcquisitionConfig {
        sample_rate_hz: 50.0,
        log_path: path.clone(),
        channels: vec![
            ChannelDefinition {
                id: "verde".into(),
                coordinates: (0.0, 1.0),
            },
            ChannelDefinition {
                id: "rojo".into(),
                coordinates: (1.0, 1.0),
            },
        ],
        ..Default::default()
    };

    for run in 0..2u64 {
        let controller = SessionController::open(&config, |def| {
            let value = if def.id == "verde" { 300 } else { 400 };
            Arc::new(MockChannelReader::new(value)) as Arc<dyn ChannelReader>
        })
        .unwrap();
        let cancel = controller.cancellation_handle();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(90)).await;
            cancel.cancel("done");
        });

        let summary = controller.run().await;
        assert!(summary.is_clean(), "run {run} ended with {:?}", summary.end);
        assert_eq!(summary.total_samples, 5, "ticks at 0, 20, 40, 60, 80 ms");
    }

    let contents = std::fs::read_to_string(&path).unwrap();
    assert_eq!(contents.matches("timestamp").count(), 1);
    assert_eq!(contents.lines().next(), Some("timestamp,verde,rojo"));
    assert_eq!(data_records(&path).len(), 10);
}

#[test]
fn invalid_config_fails_before_session() {
    let dir = tempdir().unwrap();
    let config = AcquisitionConfig {
        sample_rate_hz: -1.0,
        log_path: dir.path().join("never.csv"),
        ..Default::default()
    };

    let result = SessionController::open(&config, |_| {
        Arc::new(MockChannelReader::new(0)) as Arc<dyn ChannelReader>
    });
    assert!(matches!(result, Err(SensorError::Config(_))));
    assert!(!dir.path().join("never.csv").exists());
}
