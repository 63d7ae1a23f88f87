//! Mock Hardware Implementations
//!
//! Provides channel readers for running sessions without an ADC attached.
//!
//! # Available Mocks
//!
//! - `MockChannelReader` - Scripted readings with controllable failure injection
//! - `SimulatedReader` - Noisy 12-bit readings around a baseline (used by the CLI)

use anyhow::{anyhow, Result};
use rand::Rng;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use crate::hardware::capabilities::ChannelReader;

/// Full-scale code of a 12-bit converter.
pub const ADC_MAX_12BIT: u16 = 4095;

// =============================================================================
// MockChannelReader - Scripted Readings
// =============================================================================

/// Mock channel reader for tests
///
/// Returns queued readings in order and then keeps repeating the last one.
/// A failure can be injected for the next read only.
///
/// # Example
///
/// ```
/// use sensor_daq::hardware::capabilities::ChannelReader;
/// use sensor_daq::hardware::mock::MockChannelReader;
///
/// let reader = MockChannelReader::with_sequence([100, 101]);
/// assert_eq!(reader.read_raw().unwrap(), 100);
/// reader.trigger_failure();
/// assert!(reader.read_raw().is_err());
/// assert_eq!(reader.read_raw().unwrap(), 101);
/// assert_eq!(reader.read_raw().unwrap(), 101);
/// ```
pub struct MockChannelReader {
    queued: Mutex<VecDeque<u16>>,
    last: Mutex<u16>,
    should_fail_next: AtomicBool,
    reads: AtomicU64,
}

impl MockChannelReader {
    /// Create a reader that always returns `value`
    pub fn new(value: u16) -> Self {
        Self::with_sequence([value])
    }

    /// Create a reader that returns `values` in order, then repeats the last one
    pub fn with_sequence(values: impl IntoIterator<Item = u16>) -> Self {
        let queued: VecDeque<u16> = values.into_iter().collect();
        let last = queued.front().copied().unwrap_or_default();
        Self {
            queued: Mutex::new(queued),
            last: Mutex::new(last),
            should_fail_next: AtomicBool::new(false),
            reads: AtomicU64::new(0),
        }
    }

    /// Fail the next read
    pub fn trigger_failure(&self) {
        self.should_fail_next.store(true, Ordering::SeqCst);
    }

    /// Number of read attempts, failed ones included
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }
}

impl Default for MockChannelReader {
    fn default() -> Self {
        Self::new(0)
    }
}

impl ChannelReader for MockChannelReader {
    fn read_raw(&self) -> Result<u16> {
        self.reads.fetch_add(1, Ordering::SeqCst);

        if self.should_fail_next.swap(false, Ordering::SeqCst) {
            return Err(anyhow!("MockChannelReader: simulated conversion failure"));
        }

        let mut last = self
            .last
            .lock()
            .map_err(|_| anyhow!("MockChannelReader: state poisoned"))?;
        let mut queued = self
            .queued
            .lock()
            .map_err(|_| anyhow!("MockChannelReader: state poisoned"))?;
        if let Some(next) = queued.pop_front() {
            *last = next;
        }
        Ok(*last)
    }
}

// =============================================================================
// SimulatedReader - Noisy ADC Channel
// =============================================================================

/// Simulated photodetector channel
///
/// Produces readings uniformly distributed within `baseline ± noise`, clamped
/// to the 12-bit range of the converter.
pub struct SimulatedReader {
    baseline: u16,
    noise: u16,
}

impl SimulatedReader {
    /// Create a simulated channel
    ///
    /// # Arguments
    /// * `baseline` - Centre of the reading distribution
    /// * `noise` - Maximum deviation from the baseline
    pub fn new(baseline: u16, noise: u16) -> Self {
        Self {
            baseline: baseline.min(ADC_MAX_12BIT),
            noise,
        }
    }
}

impl ChannelReader for SimulatedReader {
    fn read_raw(&self) -> Result<u16> {
        let low = i32::from(self.baseline) - i32::from(self.noise);
        let high = i32::from(self.baseline) + i32::from(self.noise);
        let value = rand::thread_rng()
            .gen_range(low..=high)
            .clamp(0, i32::from(ADC_MAX_12BIT));
        // Clamped into 0..=4095 above.
        Ok(value as u16)
    }
}
