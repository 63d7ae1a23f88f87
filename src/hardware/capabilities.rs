//! Hardware Capabilities
//!
//! The acquisition core only needs one thing from a device: a raw reading for a
//! single analog channel. ADC setup (pin mapping, attenuation, resolution) stays
//! inside the driver that implements [`ChannelReader`].
//!
//! # Design Philosophy
//!
//! - Thread-safe (requires Send + Sync) so a channel set can be shared by `Arc`
//! - Uses anyhow::Result for errors; the sample reader attaches the channel id
//! - Synchronous: a sample's readings are treated as simultaneous, so reading a
//!   channel must never yield to the scheduler
//!
//! # Example
//!
//! ```rust,ignore
//! struct Esp32Adc {
//!     pin: u8,
//! }
//!
//! impl ChannelReader for Esp32Adc {
//!     fn read_raw(&self) -> Result<u16> {
//!         adc_driver::read(self.pin).map_err(|e| anyhow::anyhow!("pin {}: {e}", self.pin))
//!     }
//! }
//! ```

use anyhow::Result;

/// Capability: Raw Analog Read
///
/// Devices that produce one unsigned integer per conversion (ADC inputs,
/// photodiode front-ends, thermistor dividers).
///
/// # Contract
/// - Returns the raw converter code, no scaling or calibration
/// - Must not sleep; a hung reader stalls the whole acquisition loop
pub trait ChannelReader: Send + Sync {
    /// Read the current raw value.
    ///
    /// # Returns
    /// - Ok(value) on a successful conversion
    /// - Err on hardware error
    fn read_raw(&self) -> Result<u16>;
}
