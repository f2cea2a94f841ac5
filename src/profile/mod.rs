//! Headset profile model and state resolution

pub mod endpoint;
pub mod manager;
pub mod mode;

pub use endpoint::{AmbiguousEndpointPolicy, AudioEndpoint, EndpointEnumerator, EndpointProfile};
pub use manager::{ProfileManager, SwitchOutcome};
pub use mode::{AudioProfile, DeviceProfileState};
