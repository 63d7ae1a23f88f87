//! # Sensor DAQ Core Library
//!
//! Samples a fixed set of analog channels at a configured rate and appends each
//! sample durably to a CSV log, reporting timing drift and achieved rate along
//! the way. The library holds the acquisition core; `main.rs` wraps it in a CLI
//! that runs against simulated channels.
//!
//! ## Crate Structure
//!
//! - **`cancel`**: `CancellationFlag`, the cooperative stop signal checked between ticks.
//! - **`channel`**: `Channel` and the immutable `ChannelSet` that fixes column order.
//! - **`config`**: Figment-based loading and validation of `AcquisitionConfig`.
//! - **`data`**: The `SampleStore` seam and the durable `CsvLogStore`.
//! - **`error`**: The `SensorError` enum used across the crate.
//! - **`hardware`**: The `ChannelReader` capability and mock readers.
//! - **`logging`**: Tracing subscriber setup.
//! - **`sample`**: `Sample` and the single-pass `SampleReader`.
//! - **`scheduler`**: `SampleScheduler`, pacing ticks and reporting drift and rate.
//! - **`session`**: `SessionController`, which runs a session end to end.

pub mod cancel;
pub mod channel;
pub mod config;
pub mod data;
pub mod error;
pub mod hardware;
pub mod logging;
pub mod sample;
pub mod scheduler;
pub mod session;

pub use cancel::CancellationFlag;
pub use channel::{Channel, ChannelEntry, ChannelSet};
pub use config::AcquisitionConfig;
pub use data::{CsvLogStore, SampleStore};
pub use error::{SensorError, SensorResult};
pub use hardware::ChannelReader;
pub use sample::{Reading, Sample, SampleReader};
pub use scheduler::{SampleScheduler, SchedulerConfig, TickOutcome};
pub use session::{ErrorPolicy, SessionController, SessionEnd, SessionSummary};
