//! Device-manager and audio-endpoint access
//!
//! Platform-neutral traits live in [`gateway`], [`elevation`] and [`connection`];
//! the Windows implementations sit alongside them.

pub mod connection;
pub mod elevation;
pub mod gateway;

#[cfg(windows)]
pub mod bluetooth;
#[cfg(windows)]
pub mod setupapi;
#[cfg(windows)]
pub mod wasapi;

pub use connection::{already_connected, ConnectionChange, ConnectionWatcher, PairedDevice, PairedDeviceSource};
pub use elevation::ElevationProbe;
pub use gateway::{DeviceClass, DeviceGateway, DeviceNode, ToggleResult};
