//! Single-pass acquisition of all channels.

use crate::channel::ChannelSet;
use crate::error::{SensorError, SensorResult};
use serde::Serialize;
use tokio::time::Instant;

/// One channel's raw reading within a sample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reading {
    /// Id of the channel that produced the value.
    pub channel_id: String,
    /// Raw converter code.
    pub raw: u16,
}

/// One simultaneous capture of every channel.
///
/// Readings are in channel declaration order, one per channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Sample {
    /// Milliseconds since session start, from the monotonic clock.
    pub timestamp_ms: u64,
    /// Raw readings in channel declaration order.
    pub readings: Vec<Reading>,
}

impl Sample {
    /// Raw values in channel order.
    pub fn values(&self) -> impl Iterator<Item = u16> + '_ {
        self.readings.iter().map(|r| r.raw)
    }
}

/// Reads every channel of a [`ChannelSet`] back to back.
#[derive(Debug, Clone, Copy)]
pub struct SampleReader {
    session_start: Instant,
}

impl SampleReader {
    /// Create a reader stamping samples relative to `session_start`.
    pub fn new(session_start: Instant) -> Self {
        Self { session_start }
    }

    /// Session start this reader measures timestamps from.
    pub fn session_start(&self) -> Instant {
        self.session_start
    }

    /// Read all channels in declaration order.
    ///
    /// The timestamp is taken once, before the first channel is read. Nothing
    /// in here sleeps or yields, so the readings count as simultaneous.
    ///
    /// # Errors
    /// `SensorError::Read` naming the first channel that failed. No partial
    /// sample is returned.
    pub fn read_all(&self, channels: &ChannelSet) -> SensorResult<Sample> {
        let elapsed = Instant::now().saturating_duration_since(self.session_start);
        let timestamp_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);

        let readings = channels
            .entries()
            .iter()
            .map(|entry| {
                let channel_id = &entry.channel().id;
                entry
                    .reader()
                    .read_raw()
                    .map(|raw| Reading {
                        channel_id: channel_id.clone(),
                        raw,
                    })
                    .map_err(|source| SensorError::Read {
                        channel: channel_id.clone(),
                        source: source.into(),
                    })
            })
            .collect::<SensorResult<Vec<_>>>()?;

        Ok(Sample {
            timestamp_ms,
            readings,
        })
    }
}
