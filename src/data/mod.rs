//! Sample persistence.
//!
//! The session controller writes through the [`SampleStore`] trait; the CSV log in
//! [`storage`] is the production implementation.

pub mod storage;

use crate::error::SensorResult;
use crate::sample::Sample;
use std::path::Path;

pub use storage::CsvLogStore;

/// Append-only sink for samples.
///
/// Implementations must make every successful `append` durable before returning.
pub trait SampleStore {
    /// Column names in record order, starting with `timestamp`.
    fn header(&self) -> &[String];

    /// Durably append one sample.
    fn append(&mut self, sample: &Sample) -> SensorResult<()>;

    /// Confirm everything appended so far is on stable storage.
    fn finalize(&mut self) -> SensorResult<()>;

    /// Location of the log.
    fn path(&self) -> &Path;

    /// Records appended through this handle.
    fn records_written(&self) -> u64;
}

impl<S: SampleStore + ?Sized> SampleStore for Box<S> {
    fn header(&self) -> &[String] {
        (**self).header()
    }

    fn append(&mut self, sample: &Sample) -> SensorResult<()> {
        (**self).append(sample)
    }

    fn finalize(&mut self) -> SensorResult<()> {
        (**self).finalize()
    }

    fn path(&self) -> &Path {
        (**self).path()
    }

    fn records_written(&self) -> u64 {
        (**self).records_written()
    }
}
