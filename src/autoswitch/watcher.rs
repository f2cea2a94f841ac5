//! Process lifecycle notifications
//!
//! Starts and stops are derived by diffing successive process-list snapshots on a
//! background thread and fed to the [`AutoSwitchResolver`].

use crate::autoswitch::resolver::AutoSwitchResolver;
use crate::error::{AppError, Result};
use log::{debug, error, info, warn};
use std::collections::BTreeMap;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// A running process as seen in one snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
}

impl ProcessInfo {
    pub fn new(pid: u32, name: impl Into<String>) -> Self {
        Self {
            pid,
            name: name.into(),
        }
    }
}

/// Source of the current process list
pub trait ProcessSource: Send + Sync {
    fn snapshot(&self) -> Result<Vec<ProcessInfo>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    Started(ProcessInfo),
    Stopped(ProcessInfo),
}

/// Events turning `previous` into `current`; all stops come before any start.
///
/// A pid that reappears under a different name is reported as a stop and a start.
pub fn diff_snapshots(
    previous: &BTreeMap<u32, String>,
    current: &BTreeMap<u32, String>,
) -> Vec<ProcessEvent> {
    let mut stops = Vec::new();
    let mut starts = Vec::new();

    for (&pid, name) in previous {
        match current.get(&pid) {
            Some(now) if now == name => {}
            _ => stops.push(ProcessEvent::Stopped(ProcessInfo::new(pid, name.clone()))),
        }
    }
    for (&pid, name) in current {
        match previous.get(&pid) {
            Some(before) if before == name => {}
            _ => starts.push(ProcessEvent::Started(ProcessInfo::new(pid, name.clone()))),
        }
    }

    stops.extend(starts);
    stops
}

fn index(processes: &[ProcessInfo]) -> BTreeMap<u32, String> {
    processes.iter().map(|p| (p.pid, p.name.clone())).collect()
}

/// Background poller delivering process starts and stops to the resolver
pub struct ProcessWatcher {
    resolver: Arc<AutoSwitchResolver>,
    poll_interval: Duration,
    stop_tx: Option<Sender<()>>,
    thread_handle: Option<JoinHandle<()>>,
}

impl ProcessWatcher {
    pub fn new(resolver: Arc<AutoSwitchResolver>, poll_interval: Duration) -> Self {
        Self {
            resolver,
            poll_interval,
            stop_tx: None,
            thread_handle: None,
        }
    }

    pub fn is_watching(&self) -> bool {
        self.thread_handle.is_some()
    }

    /// Scan already-running processes, then follow starts and stops
    pub fn start_watching(&mut self) -> Result<()> {
        if self.is_watching() {
            return Ok(());
        }

        let source = self.resolver.process_source();
        let initial = source.snapshot().map_err(|e| {
            error!("Process watcher failed to start: {}", e);
            AppError::WatcherFailed(format!("Initial process scan failed: {}", e))
        })?;
        self.resolver.rescan_with(&initial);

        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let resolver = Arc::clone(&self.resolver);
        let poll_interval = self.poll_interval;
        let mut previous = index(&initial);

        let handle = thread::Builder::new()
            .name("process-watcher".into())
            .spawn(move || {
                info!("Process watcher started ({} processes)", previous.len());
                loop {
                    match stop_rx.recv_timeout(poll_interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }

                    let current = match source.snapshot() {
                        Ok(processes) => index(&processes),
                        Err(e) => {
                            warn!("Process snapshot failed: {}", e);
                            continue;
                        }
                    };

                    for event in diff_snapshots(&previous, &current) {
                        match event {
                            ProcessEvent::Started(p) => resolver.process_started(p.pid, &p.name),
                            ProcessEvent::Stopped(p) => resolver.process_stopped(p.pid, &p.name),
                        }
                    }
                    previous = current;
                }
                info!("Process watcher stopped");
            })
            .map_err(|e| AppError::WatcherFailed(format!("Could not spawn process watcher: {}", e)))?;

        self.stop_tx = Some(stop_tx);
        self.thread_handle = Some(handle);
        Ok(())
    }

    pub fn stop_watching(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                warn!("Process watcher thread panicked");
            }
            debug!("Process watcher joined");
            // Unwatched processes no longer assert a profile
            self.resolver.rescan_with(&[]);
        }
    }
}

impl Drop for ProcessWatcher {
    fn drop(&mut self) {
        self.stop_watching();
    }
}

/// Mock implementations for testing
/// Available in tests and with the "test-mocks" feature
#[cfg(any(test, feature = "test-mocks"))]
pub mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// Process table edited by the test
    #[derive(Default)]
    pub struct MockProcessSource {
        processes: Mutex<BTreeMap<u32, String>>,
        failing: AtomicBool,
    }

    impl MockProcessSource {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn spawn(&self, pid: u32, name: &str) {
            self.processes.lock().unwrap().insert(pid, name.to_string());
        }

        pub fn kill(&self, pid: u32) {
            self.processes.lock().unwrap().remove(&pid);
        }

        /// Make every snapshot fail
        pub fn fail(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }
    }

    impl ProcessSource for MockProcessSource {
        fn snapshot(&self) -> Result<Vec<ProcessInfo>> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(AppError::EnumerationFailed("mock snapshot failure".into()));
            }
            Ok(self
                .processes
                .lock()
                .unwrap()
                .iter()
                .map(|(&pid, name)| ProcessInfo::new(pid, name.clone()))
                .collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mocks::MockProcessSource;
    use super::*;
    use crate::autoswitch::rules::ProfileRule;
    use crate::profile::mode::AudioProfile;

    fn map(entries: &[(u32, &str)]) -> BTreeMap<u32, String> {
        entries.iter().map(|&(pid, name)| (pid, name.to_string())).collect()
    }

    #[test]
    fn test_diff_orders_stops_first() {
        let events = diff_snapshots(&map(&[(1, "a.exe")]), &map(&[(2, "b.exe")]));
        assert_eq!(
            events,
            vec![
                ProcessEvent::Stopped(ProcessInfo::new(1, "a.exe")),
                ProcessEvent::Started(ProcessInfo::new(2, "b.exe")),
            ]
        );
    }

    #[test]
    fn test_diff_pid_reuse() {
        let events = diff_snapshots(&map(&[(7, "old.exe")]), &map(&[(7, "new.exe")]));
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], ProcessEvent::Stopped(p) if p.name == "old.exe"));
        assert!(matches!(&events[1], ProcessEvent::Started(p) if p.name == "new.exe"));

        assert!(diff_snapshots(&map(&[(7, "x")]), &map(&[(7, "x")])).is_empty());
    }

    #[test]
    fn test_start_fails_when_snapshot_fails() {
        let source = Arc::new(MockProcessSource::new());
        source.fail(true);
        let resolver = Arc::new(AutoSwitchResolver::new(source));
        let mut watcher = ProcessWatcher::new(resolver, Duration::from_millis(10));

        assert!(matches!(watcher.start_watching(), Err(AppError::WatcherFailed(_))));
        assert!(!watcher.is_watching());
    }

    #[test]
    fn test_watcher_tracks_starts_and_stops() {
        let source = Arc::new(MockProcessSource::new());
        source.spawn(10, "Zoom.exe");
        let resolver = Arc::new(AutoSwitchResolver::with_rules(
            source.clone(),
            &[ProfileRule::new("zoom.exe", "Zoom", AudioProfile::Calls, 100)],
        ));
        let sub = resolver.subscribe();
        let mut watcher = ProcessWatcher::new(resolver.clone(), Duration::from_millis(10));

        watcher.start_watching().unwrap();
        // Initial scan picks up the already-running process
        assert_eq!(resolver.required_profile(), Some(AudioProfile::Calls));
        assert_eq!(sub.recv_timeout(Duration::from_secs(1)).unwrap().required, Some(AudioProfile::Calls));

        source.kill(10);
        let change = sub.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(change.required, None);
        assert_eq!(change.process_name.as_deref(), Some("Zoom.exe"));

        watcher.stop_watching();
        assert!(!watcher.is_watching());
    }
}
