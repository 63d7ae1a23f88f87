//! Durable CSV sample log.
//!
//! Layout:
//!
//! ```text
//! timestamp,azul,verde,amarillo,naranja,rojo
//! 0,812,1044,977,630,1201
//! 100,815,1040,981,633,1198
//! ```
//!
//! The header is written once, when the file is created. Reopening an existing
//! log never touches or checks its header, so a different channel set pointed at
//! the same file produces misaligned columns.
//!
//! Each record is written by opening the file, appending, syncing and closing
//! it again. Nothing is held open between ticks, so a crash can at worst lose
//! the record being written, never corrupt an earlier one.

use crate::data::SampleStore;
use crate::error::{SensorError, SensorResult};
use crate::sample::Sample;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Name of the first column of every log.
pub const TIMESTAMP_COLUMN: &str = "timestamp";

/// Append-only CSV log with open-append-sync-close writes.
#[derive(Debug)]
pub struct CsvLogStore {
    path: PathBuf,
    header: Vec<String>,
    records_written: u64,
}

impl CsvLogStore {
    /// Open the log at `path`, creating it with a header if it does not exist.
    ///
    /// The header is `timestamp` followed by `header_fields`. An existing file
    /// is reused as-is after checking that it can be opened for appending.
    ///
    /// # Errors
    /// `SensorError::Storage` if the file cannot be created, written or opened
    /// for appending.
    pub fn open_or_create<I, S>(path: impl AsRef<Path>, header_fields: I) -> SensorResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let path = path.as_ref().to_path_buf();
        let header: Vec<String> = std::iter::once(TIMESTAMP_COLUMN.to_string())
            .chain(header_fields.into_iter().map(Into::into))
            .collect();

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                info!("Creating new sample log at '{}'", path.display());
                if let Err(e) = write_durably(&mut file, &encode_record(&path, &header)?) {
                    // Leave nothing behind so the next open recreates the header.
                    drop(file);
                    let _ = std::fs::remove_file(&path);
                    return Err(SensorError::storage(path, e));
                }
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                info!("Using existing sample log at '{}'", path.display());
                OpenOptions::new()
                    .append(true)
                    .open(&path)
                    .map_err(|e| SensorError::storage(&path, e))?;
            }
            Err(e) => return Err(SensorError::storage(path, e)),
        }

        Ok(Self {
            path,
            header,
            records_written: 0,
        })
    }

    fn encode_sample(&self, sample: &Sample) -> SensorResult<Vec<u8>> {
        let expected = self.header.len() - 1;
        if sample.readings.len() != expected {
            return Err(SensorError::ColumnMismatch {
                expected,
                actual: sample.readings.len(),
            });
        }

        let fields: Vec<String> = std::iter::once(sample.timestamp_ms.to_string())
            .chain(sample.values().map(|v| v.to_string()))
            .collect();
        encode_record(&self.path, &fields)
    }

    /// Append one encoded sample using `write`, rolling the file back to its
    /// previous length if `write` fails.
    fn append_with<W>(&mut self, sample: &Sample, write: W) -> SensorResult<()>
    where
        W: FnOnce(&mut File, &[u8]) -> io::Result<()>,
    {
        let record = self.encode_sample(sample)?;

        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|e| SensorError::storage(&self.path, e))?;
        let durable_len = file
            .metadata()
            .map_err(|e| SensorError::storage(&self.path, e))?
            .len();

        if let Err(e) = write(&mut file, &record) {
            // Cut off whatever part of the record made it to disk.
            if let Err(trunc) = file.set_len(durable_len).and_then(|_| file.sync_data()) {
                warn!(
                    "Could not truncate '{}' to {} bytes after failed append: {}",
                    self.path.display(),
                    durable_len,
                    trunc
                );
            }
            return Err(SensorError::storage(&self.path, e));
        }

        self.records_written += 1;
        debug!(
            timestamp_ms = sample.timestamp_ms,
            records = self.records_written,
            "Appended sample"
        );
        Ok(())
    }
}

impl SampleStore for CsvLogStore {
    fn header(&self) -> &[String] {
        &self.header
    }

    fn append(&mut self, sample: &Sample) -> SensorResult<()> {
        self.append_with(sample, write_durably)
    }

    fn finalize(&mut self) -> SensorResult<()> {
        let file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|e| SensorError::storage(&self.path, e))?;
        file.sync_all()
            .map_err(|e| SensorError::storage(&self.path, e))?;
        info!(
            "Sample log '{}' synced ({} records this session)",
            self.path.display(),
            self.records_written
        );
        Ok(())
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn records_written(&self) -> u64 {
        self.records_written
    }
}

fn encode_record<S: AsRef<[u8]>>(path: &Path, fields: &[S]) -> SensorResult<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::with_capacity(64));
    writer
        .write_record(fields)
        .map_err(|e| SensorError::storage(path, e.into()))?;
    writer
        .into_inner()
        .map_err(|e| SensorError::storage(path, e.into_error()))
}

fn write_durably(file: &mut File, bytes: &[u8]) -> io::Result<()> {
    file.write_all(bytes)?;
    file.sync_data()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::Reading;
    use tempfile::tempdir;

    fn sample(timestamp_ms: u64, values: &[u16]) -> Sample {
        Sample {
            timestamp_ms,
            readings: values
                .iter()
                .enumerate()
                .map(|(i, &raw)| Reading {
                    channel_id: format!("ch{i}"),
                    raw,
                })
                .collect(),
        }
    }

    #[test]
    fn creates_header_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.csv");

        CsvLogStore::open_or_create(&path, ["A", "B"]).unwrap();
        CsvLogStore::open_or_create(&path, ["A", "B"]).unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "timestamp,A,B\n");
    }

    #[test]
    fn appends_records_in_header_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.csv");

        let mut store = CsvLogStore::open_or_create(&path, ["A", "B"]).unwrap();
        store.append(&sample(0, &[100, 200])).unwrap();
        store.append(&sample(100, &[101, 198])).unwrap();
        store.finalize().unwrap();

        assert_eq!(store.records_written(), 2);
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "timestamp,A,B\n0,100,200\n100,101,198\n"
        );
    }

    #[test]
    fn existing_log_is_not_validated() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.csv");
        std::fs::write(&path, "timestamp,x\n5,1\n").unwrap();

        let mut store = CsvLogStore::open_or_create(&path, ["A", "B"]).unwrap();
        store.append(&sample(7, &[3, 4])).unwrap();

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "timestamp,x\n5,1\n7,3,4\n"
        );
    }

    #[test]
    fn rejects_misaligned_sample() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.csv");
        let mut store = CsvLogStore::open_or_create(&path, ["A", "B"]).unwrap();

        let err = store.append(&sample(0, &[1])).unwrap_err();
        assert!(matches!(
            err,
            SensorError::ColumnMismatch {
                expected: 2,
                actual: 1
            }
        ));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "timestamp,A,B\n");
    }

    #[test]
    fn missing_directory_is_storage_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("no/such/dir/log.csv");
        let err = CsvLogStore::open_or_create(&path, ["A"]).unwrap_err();
        assert!(matches!(err, SensorError::Storage { .. }));
    }

    #[test]
    fn failed_write_rolls_back_partial_record() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.csv");
        let mut store = CsvLogStore::open_or_create(&path, ["A", "B"]).unwrap();
        store.append(&sample(0, &[1, 2])).unwrap();

        let err = store
            .append_with(&sample(100, &[3, 4]), |file, bytes| {
                file.write_all(&bytes[..bytes.len() / 2])?;
                file.sync_data()?;
                Err(io::Error::new(io::ErrorKind::Other, "disk full"))
            })
            .unwrap_err();
        match &err {
            SensorError::Storage { path: p, .. } => assert_eq!(p, &path),
            other => panic!("expected storage error, got {other:?}"),
        }
        assert_eq!(store.records_written(), 1);
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "timestamp,A,B\n0,1,2\n"
        );

        store.append(&sample(200, &[5, 6])).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "timestamp,A,B\n0,1,2\n200,5,6\n"
        );
        assert_eq!(store.records_written(), 2);
    }

    #[test]
    fn encodes_quoted_fields_on_one_line() {
        let record = encode_record(Path::new("log.csv"), &["timestamp", "a,b"]).unwrap();
        assert_eq!(record, b"timestamp,\"a,b\"\n");
    }

    #[test]
    fn append_after_log_removed_fails_without_recreating() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.csv");
        let mut store = CsvLogStore::open_or_create(&path, ["A"]).unwrap();
        std::fs::remove_file(&path).unwrap();

        let err = store.append(&sample(0, &[1])).unwrap_err();
        assert!(err.is_recoverable());
        assert!(!path.exists());
        assert_eq!(store.records_written(), 0);
    }
}
