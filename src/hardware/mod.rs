//! Hardware Abstractions
//!
//! The capability trait implemented by ADC drivers, plus mock readers for tests
//! and hardware-free runs.

pub mod capabilities;
pub mod mock;

pub use capabilities::ChannelReader;
