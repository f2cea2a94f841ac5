//! Paired-device connection tracking
//!
//! A background thread polls the paired-device list and reports devices that
//! connected or disconnected since the previous poll.

use crate::error::{AppError, Result};
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// A paired Bluetooth device as reported by the radio
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairedDevice {
    pub name: String,
    pub connected: bool,
}

/// A device connecting or disconnecting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionChange {
    pub device_name: String,
    pub connected: bool,
}

/// Source of the paired-device list
pub trait PairedDeviceSource: Send + Sync {
    fn paired_devices(&self) -> Result<Vec<PairedDevice>>;
}

/// Match quality for device name matching
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchQuality {
    NoMatch = 0,
    Contains = 1,
    Exact = 2,
}

/// Normalize a device name for comparison
fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Compare a configured device name against a reported one
pub fn match_device_name(configured: &str, reported: &str) -> MatchQuality {
    let target = normalize_name(configured);
    let device = normalize_name(reported);

    if target.is_empty() || device.is_empty() {
        return MatchQuality::NoMatch;
    }

    if target == device {
        return MatchQuality::Exact;
    }

    // Contains match (either direction)
    if target.contains(&device) || device.contains(&target) {
        return MatchQuality::Contains;
    }

    MatchQuality::NoMatch
}

/// Best match for `configured` among `names`, preferring exact matches
pub fn best_match<'a>(configured: &str, names: impl IntoIterator<Item = &'a str>) -> Option<&'a str> {
    names
        .into_iter()
        .map(|name| (match_device_name(configured, name), name))
        .filter(|(quality, _)| *quality != MatchQuality::NoMatch)
        .max_by_key(|(quality, _)| *quality)
        .map(|(_, name)| name)
}

/// Connect event for a device that was already connected at startup.
///
/// Picks the best connected match for `configured`, or the first connected
/// device by name when nothing is configured.
pub fn already_connected(configured: &str, devices: &[PairedDevice]) -> Option<ConnectionChange> {
    let connected = devices.iter().filter(|d| d.connected).map(|d| d.name.as_str());
    let name = if configured.trim().is_empty() {
        connected.min()
    } else {
        best_match(configured, connected)
    }?;
    Some(ConnectionChange {
        device_name: name.to_string(),
        connected: true,
    })
}

/// Changes between two connection snapshots keyed by device name
pub fn diff_connections(
    previous: &BTreeMap<String, bool>,
    current: &BTreeMap<String, bool>,
) -> Vec<ConnectionChange> {
    let mut changes = Vec::new();

    for (name, &was_connected) in previous {
        let now_connected = current.get(name).copied().unwrap_or(false);
        if was_connected && !now_connected {
            changes.push(ConnectionChange {
                device_name: name.clone(),
                connected: false,
            });
        }
    }

    for (name, &now_connected) in current {
        let was_connected = previous.get(name).copied().unwrap_or(false);
        if now_connected && !was_connected {
            changes.push(ConnectionChange {
                device_name: name.clone(),
                connected: true,
            });
        }
    }

    changes
}

fn snapshot(devices: Vec<PairedDevice>) -> BTreeMap<String, bool> {
    devices.into_iter().map(|d| (d.name, d.connected)).collect()
}

/// Polls a [`PairedDeviceSource`] on a background thread
pub struct ConnectionWatcher {
    stop_tx: Option<Sender<()>>,
    thread_handle: Option<JoinHandle<()>>,
}

impl ConnectionWatcher {
    /// Take a baseline snapshot, then report changes through `on_change`
    pub fn start<F>(
        source: Arc<dyn PairedDeviceSource>,
        poll_interval: Duration,
        on_change: F,
    ) -> Result<Self>
    where
        F: Fn(ConnectionChange) + Send + 'static,
    {
        let baseline = match source.paired_devices() {
            Ok(devices) => snapshot(devices),
            Err(e) => {
                warn!("Initial paired-device query failed: {}", e);
                BTreeMap::new()
            }
        };
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let thread_handle = thread::Builder::new()
            .name("bt-connection-watcher".into())
            .spawn(move || {
                info!("Connection watcher thread started");
                let mut previous = baseline;
                loop {
                    match stop_rx.recv_timeout(poll_interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }

                    let current = match source.paired_devices() {
                        Ok(devices) => snapshot(devices),
                        Err(e) => {
                            debug!("Paired-device query failed: {}", e);
                            continue;
                        }
                    };

                    for change in diff_connections(&previous, &current) {
                        info!(
                            "Device {}: {}",
                            if change.connected { "connected" } else { "disconnected" },
                            change.device_name
                        );
                        on_change(change);
                    }
                    previous = current;
                }
                info!("Connection watcher thread stopped");
            })
            .map_err(|e| AppError::WatcherFailed(format!("Could not spawn connection watcher: {}", e)))?;

        Ok(Self {
            stop_tx: Some(stop_tx),
            thread_handle: Some(thread_handle),
        })
    }

    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ConnectionWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Mock implementations for testing
/// Available in tests and with the "test-mocks" feature
#[cfg(any(test, feature = "test-mocks"))]
pub mod mocks {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct MockPairedDevices {
        devices: Mutex<Vec<PairedDevice>>,
    }

    impl MockPairedDevices {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_connected(&self, name: &str, connected: bool) {
            let mut devices = self.devices.lock().unwrap();
            match devices.iter_mut().find(|d| d.name == name) {
                Some(device) => device.connected = connected,
                None => devices.push(PairedDevice {
                    name: name.to_string(),
                    connected,
                }),
            }
        }
    }

    impl PairedDeviceSource for MockPairedDevices {
        fn paired_devices(&self) -> Result<Vec<PairedDevice>> {
            Ok(self.devices.lock().unwrap().clone())
        }
    }
}
