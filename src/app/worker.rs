//! Background worker serializing everything that touches the headset
//!
//! Device enumeration and toggling block, so the tray thread only sends commands
//! here and polls for events.

use crate::app::orchestrator::{Notice, Orchestrator, OrchestratorSettings};
use crate::autoswitch::resolver::ProfileChangeRequired;
use crate::devices::connection::ConnectionChange;
use crate::error::{AppError, Result};
use crate::events::Subscription;
use crate::profile::mode::{AudioProfile, DeviceProfileState};
use log::{debug, error, info};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// How long the worker waits for a command before checking subscriptions
const IDLE_WAIT: Duration = Duration::from_millis(50);

/// Commands sent to the worker thread
#[derive(Debug, Clone)]
pub enum WorkerCommand {
    /// Manual switch from the tray
    SetMode(AudioProfile),
    Toggle,
    /// Re-read the device state
    Refresh,
    DeviceConnection(ConnectionChange),
    SettingsChanged(OrchestratorSettings),
    Shutdown,
}

/// Events sent from the worker thread
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    /// Device state after a command; `None` when not connected
    StateChanged(Option<DeviceProfileState>),
    Notice(Notice),
    /// The worker has exited
    Stopped,
}

pub struct ProfileWorker {
    command_tx: Sender<WorkerCommand>,
    event_rx: Receiver<WorkerEvent>,
    thread_handle: Option<JoinHandle<()>>,
}

impl ProfileWorker {
    /// Move `orchestrator` onto a new worker thread
    pub fn start(orchestrator: Orchestrator) -> Result<Self> {
        let (command_tx, command_rx) = mpsc::channel();
        let (event_tx, event_rx) = mpsc::channel();

        // Subscribe before spawning so nothing published in between is lost
        let required = orchestrator.resolver().subscribe();
        let notices = orchestrator.subscribe_notices();

        let thread_handle = thread::Builder::new()
            .name("profile-worker".into())
            .spawn(move || {
                worker_thread(orchestrator, command_rx, event_tx, required, notices);
            })
            .map_err(|e| AppError::WorkerError(format!("Could not spawn worker: {}", e)))?;

        Ok(Self {
            command_tx,
            event_rx,
            thread_handle: Some(thread_handle),
        })
    }

    /// Sender for other threads, e.g. the connection watcher callback
    pub fn sender(&self) -> Sender<WorkerCommand> {
        self.command_tx.clone()
    }

    pub fn send(&self, cmd: WorkerCommand) -> Result<()> {
        self.command_tx
            .send(cmd)
            .map_err(|e| AppError::WorkerError(e.to_string()))
    }

    /// Try to receive an event (non-blocking)
    pub fn try_recv_event(&self) -> Option<WorkerEvent> {
        self.event_rx.try_recv().ok()
    }

    /// Blocking receive with a timeout
    pub fn recv_event_timeout(&self, timeout: Duration) -> Option<WorkerEvent> {
        self.event_rx.recv_timeout(timeout).ok()
    }

    /// Shutdown the worker
    pub fn shutdown(&mut self) {
        let _ = self.send(WorkerCommand::Shutdown);
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                error!("Profile worker thread panicked");
            }
        }
    }
}

impl Drop for ProfileWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct WorkerLoop {
    orchestrator: Orchestrator,
    event_tx: Sender<WorkerEvent>,
    last_state: Option<Option<DeviceProfileState>>,
}

impl WorkerLoop {
    fn handle(&mut self, cmd: WorkerCommand) {
        debug!("Worker command: {:?}", cmd);
        match cmd {
            WorkerCommand::SetMode(profile) => {
                self.orchestrator.set_mode(profile);
            }
            WorkerCommand::Toggle => {
                self.orchestrator.toggle();
            }
            WorkerCommand::Refresh => {
                self.orchestrator.refresh();
            }
            WorkerCommand::DeviceConnection(change) => {
                self.orchestrator.handle_connection(&change);
            }
            WorkerCommand::SettingsChanged(settings) => {
                self.orchestrator.apply_settings(settings);
                self.orchestrator.refresh();
            }
            WorkerCommand::Shutdown => {}
        }
    }

    fn handle_required(&mut self, change: ProfileChangeRequired) {
        self.orchestrator.handle_required_change(&change);
    }

    fn forward_notices(&self, notices: &Subscription<Notice>) {
        for notice in notices.drain() {
            let _ = self.event_tx.send(WorkerEvent::Notice(notice));
        }
    }

    /// Emit the device state if it differs from what was last sent
    fn publish_state(&mut self) {
        let state = self.orchestrator.current_state().cloned();
        if self.last_state.as_ref() != Some(&state) {
            self.last_state = Some(state.clone());
            let _ = self.event_tx.send(WorkerEvent::StateChanged(state));
        }
    }
}

fn worker_thread(
    orchestrator: Orchestrator,
    command_rx: Receiver<WorkerCommand>,
    event_tx: Sender<WorkerEvent>,
    required: Subscription<ProfileChangeRequired>,
    notices: Subscription<Notice>,
) {
    info!("Profile worker thread started");

    #[cfg(windows)]
    unsafe {
        use windows::Win32::System::Com::{CoInitializeEx, COINIT_APARTMENTTHREADED};
        let hr = CoInitializeEx(None, COINIT_APARTMENTTHREADED);
        if hr.is_err() {
            error!("Failed to initialize COM in worker thread: {:?}", hr);
            let _ = event_tx.send(WorkerEvent::Stopped);
            return;
        }
    }

    let mut worker = WorkerLoop {
        orchestrator,
        event_tx,
        last_state: None,
    };

    loop {
        let command = command_rx.recv_timeout(IDLE_WAIT);

        // Changes published before a command was sent are applied first
        for change in required.drain() {
            worker.handle_required(change);
        }

        match command {
            Ok(WorkerCommand::Shutdown) => {
                info!("Worker received shutdown command");
                break;
            }
            Ok(cmd) => worker.handle(cmd),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                info!("Command channel disconnected, shutting down worker");
                break;
            }
        }
        worker.forward_notices(&notices);
        worker.publish_state();
    }

    worker.forward_notices(&notices);
    let _ = worker.event_tx.send(WorkerEvent::Stopped);

    #[cfg(windows)]
    unsafe {
        windows::Win32::System::Com::CoUninitialize();
    }

    info!("Profile worker thread stopped");
}
