//! Channel catalog.
//!
//! A [`ChannelSet`] is built once from configuration and never changes for the
//! lifetime of a session. Its declaration order defines the column order of the
//! log header and of every record, so it is shared read-only (`Arc<ChannelSet>`)
//! by the sample reader and the store.

use crate::error::{SensorError, SensorResult};
use crate::hardware::ChannelReader;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// A logical sensor position.
///
/// Identifies where a sensor sits, not which pin it is wired to; pin mapping
/// belongs to the reader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    /// Unique channel name, used as the log column header.
    pub id: String,
    /// Spatial coordinates of the sensor in the array.
    pub coordinates: (f64, f64),
}

impl Channel {
    /// Create a channel description.
    pub fn new(id: impl Into<String>, coordinates: (f64, f64)) -> Self {
        Self {
            id: id.into(),
            coordinates,
        }
    }
}

/// A channel paired with the reader that samples it.
#[derive(Clone)]
pub struct ChannelEntry {
    channel: Channel,
    reader: Arc<dyn ChannelReader>,
}

impl ChannelEntry {
    /// Pair a channel with its reader.
    pub fn new(channel: Channel, reader: Arc<dyn ChannelReader>) -> Self {
        Self { channel, reader }
    }

    /// The channel description.
    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// The reader capability backing this channel.
    pub fn reader(&self) -> &dyn ChannelReader {
        self.reader.as_ref()
    }
}

impl fmt::Debug for ChannelEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelEntry")
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}

/// Ordered, immutable set of channels sampled together.
#[derive(Debug, Clone)]
pub struct ChannelSet {
    entries: Vec<ChannelEntry>,
}

impl ChannelSet {
    /// Build a channel set.
    ///
    /// # Errors
    /// `SensorError::Config` if `entries` is empty or two channels share an id.
    pub fn new(entries: Vec<ChannelEntry>) -> SensorResult<Self> {
        if entries.is_empty() {
            return Err(SensorError::Config(
                "channel set must contain at least one channel".into(),
            ));
        }

        let mut seen = HashSet::with_capacity(entries.len());
        for entry in &entries {
            if !seen.insert(entry.channel.id.as_str()) {
                return Err(SensorError::Config(format!(
                    "duplicate channel id '{}'",
                    entry.channel.id
                )));
            }
        }

        Ok(Self { entries })
    }

    /// Channels in declaration order.
    pub fn channels(&self) -> impl ExactSizeIterator<Item = &Channel> {
        self.entries.iter().map(ChannelEntry::channel)
    }

    /// Channel ids in declaration order.
    pub fn ids(&self) -> impl ExactSizeIterator<Item = &str> {
        self.entries.iter().map(|e| e.channel.id.as_str())
    }

    /// Channels paired with their readers, in declaration order.
    pub fn entries(&self) -> &[ChannelEntry] {
        &self.entries
    }

    /// Number of channels.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false for a constructed set; present for API completeness.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
