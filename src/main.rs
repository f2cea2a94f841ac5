//! Bluetooth Profile Switcher - Main Entry Point
//!
//! A Windows system tray application that switches a Bluetooth headset between
//! its Music (A2DP) and Calls (HFP) profiles.

#![windows_subsystem = "windows"]

#[cfg(windows)]
mod desktop {
    use bt_profile_switcher::app::{Notice, Orchestrator, OrchestratorSettings, ProfileWorker, WorkerCommand, WorkerEvent};
    use bt_profile_switcher::autoswitch::toolhelp::ToolhelpProcessSource;
    use bt_profile_switcher::autoswitch::{reset_to_defaults, AutoSwitchResolver, ProcessWatcher};
    use bt_profile_switcher::devices::bluetooth::BluetoothRadioSource;
    use bt_profile_switcher::devices::elevation::TokenElevationProbe;
    use bt_profile_switcher::devices::setupapi::SetupApiGateway;
    use bt_profile_switcher::devices::wasapi::WasapiEndpoints;
    use bt_profile_switcher::devices::{already_connected, ConnectionWatcher, PairedDeviceSource};
    use bt_profile_switcher::error::{AppError, Result};
    use bt_profile_switcher::i18n::Locale;
    use bt_profile_switcher::logging::{self, LogTarget};
    use bt_profile_switcher::notifications::{register_aumid, NotificationManager};
    use bt_profile_switcher::profile::{DeviceProfileState, ProfileManager};
    use bt_profile_switcher::settings::{AppConfig, ConfigManager};
    use bt_profile_switcher::tray::{MenuBuilder, MenuEvent, MenuState, TrayIconManager};
    use log::{error, info, warn};
    use muda::MenuEvent as MudaMenuEvent;
    use std::ffi::OsStr;
    use std::os::windows::ffi::OsStrExt;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use windows::core::PCWSTR;
    use windows::Win32::Foundation::{CloseHandle, GetLastError, BOOL, ERROR_ALREADY_EXISTS, HANDLE, HWND};
    use windows::Win32::System::Com::{CoInitializeEx, CoUninitialize, COINIT_APARTMENTTHREADED};
    use windows::Win32::System::Console::{SetConsoleCtrlHandler, CTRL_BREAK_EVENT, CTRL_CLOSE_EVENT, CTRL_C_EVENT};
    use windows::Win32::System::Threading::{CreateMutexW, ReleaseMutex};
    use windows::Win32::UI::WindowsAndMessaging::{
        DispatchMessageW, MessageBoxW, PeekMessageW, TranslateMessage, MB_ICONINFORMATION, MB_OK, MSG, PM_REMOVE,
    };

    /// Named mutex for single-instance enforcement
    const SINGLE_INSTANCE_MUTEX: &str = "Global\\BtProfileSwitcher_SingleInstance";

    /// Paired-device polling interval
    const CONNECTION_POLL_INTERVAL: Duration = Duration::from_secs(2);

    /// Global shutdown flag for Ctrl+C handling
    static SHUTDOWN_FLAG: AtomicBool = AtomicBool::new(false);

    /// Console control handler for Ctrl+C, Ctrl+Break, and close events
    unsafe extern "system" fn console_ctrl_handler(ctrl_type: u32) -> BOOL {
        match ctrl_type {
            x if x == CTRL_C_EVENT || x == CTRL_BREAK_EVENT || x == CTRL_CLOSE_EVENT => {
                info!("Received shutdown signal (type: {})", ctrl_type);
                SHUTDOWN_FLAG.store(true, Ordering::SeqCst);
                BOOL::from(true)
            }
            _ => BOOL::from(false),
        }
    }

    fn wide(s: &str) -> Vec<u16> {
        OsStr::new(s).encode_wide().chain(std::iter::once(0)).collect()
    }

    /// Main application state
    struct App {
        config_manager: ConfigManager,
        config: AppConfig,
        locale: Locale,
        resolver: Arc<AutoSwitchResolver>,
        worker: ProfileWorker,
        process_watcher: ProcessWatcher,
        connection_watcher: Option<ConnectionWatcher>,
        tray_manager: Option<TrayIconManager>,
        menu_builder: MenuBuilder,
        notification_manager: NotificationManager,
        /// Last state reported by the worker
        state: Option<DeviceProfileState>,
        running: bool,
    }

    impl App {
        fn new(config_manager: ConfigManager, config: AppConfig, locale: Locale) -> Result<Self> {
            let profiles = Arc::new(ProfileManager::new(
                Arc::new(SetupApiGateway::new()),
                Arc::new(WasapiEndpoints::new()),
                Arc::new(TokenElevationProbe),
            ));
            let resolver = Arc::new(AutoSwitchResolver::with_rules(
                Arc::new(ToolhelpProcessSource::new()),
                &config.auto_switch.rules,
            ));

            let orchestrator = Orchestrator::new(
                profiles,
                Arc::clone(&resolver),
                OrchestratorSettings::from_config(&config),
            );
            let worker = ProfileWorker::start(orchestrator)?;
            let process_watcher = ProcessWatcher::new(Arc::clone(&resolver), config.auto_switch.poll_interval());

            let mut notification_manager = NotificationManager::new(locale.clone());
            notification_manager.set_enabled(config.notifications.enabled);

            Ok(Self {
                config_manager,
                config,
                menu_builder: MenuBuilder::new(locale.clone()),
                locale,
                resolver,
                worker,
                process_watcher,
                connection_watcher: None,
                tray_manager: None,
                notification_manager,
                state: None,
                running: true,
            })
        }

        /// Initialize the application
        fn init(&mut self) -> Result<()> {
            let menu = self.menu_builder.build(&self.menu_state())?;
            let tooltip = self.tooltip();
            self.tray_manager = Some(TrayIconManager::new(menu, &tooltip)?);

            if self.config.auto_switch.by_app {
                if let Err(e) = self.process_watcher.start_watching() {
                    warn!("Auto-switch by app unavailable: {}", e);
                }
            }

            self.start_connection_watcher()?;
            self.worker.send(WorkerCommand::Refresh)?;

            info!("Application initialized successfully");
            Ok(())
        }

        fn start_connection_watcher(&mut self) -> Result<()> {
            let source: Arc<dyn PairedDeviceSource> = Arc::new(BluetoothRadioSource::new());

            // The watcher only reports changes, so replay devices connected before startup
            match source.paired_devices() {
                Ok(devices) => {
                    if let Some(change) = already_connected(&self.config.device.default_device_name, &devices) {
                        info!("'{}' already connected", change.device_name);
                        self.worker.send(WorkerCommand::DeviceConnection(change))?;
                    }
                }
                Err(e) => warn!("Could not list paired devices: {}", e),
            }

            let sender = self.worker.sender();
            let watcher = ConnectionWatcher::start(source, CONNECTION_POLL_INTERVAL, move |change| {
                if sender.send(WorkerCommand::DeviceConnection(change)).is_err() {
                    warn!("Worker gone, dropping connection change");
                }
            })?;
            self.connection_watcher = Some(watcher);
            Ok(())
        }

        fn menu_state(&self) -> MenuState {
            let device_name = Some(self.config.device.default_device_name.trim())
                .filter(|name| !name.is_empty())
                .map(str::to_string);
            MenuState {
                device_name,
                profile: self.state.as_ref().map(|s| s.current_mode),
                auto_switch_by_app: self.config.auto_switch.by_app,
                auto_start: self.config.general.auto_start,
            }
        }

        fn tooltip(&self) -> String {
            let state = self.menu_state();
            format!(
                "{}\n{}",
                self.locale.text("app_name"),
                self.locale.status_line(state.device_name.as_deref(), state.profile)
            )
        }

        fn refresh_tray(&mut self) -> Result<()> {
            let menu = self.menu_builder.build(&self.menu_state())?;
            let tooltip = self.tooltip();
            let profile = self.state.as_ref().map(|s| s.current_mode);
            if let Some(ref mut tray) = self.tray_manager {
                tray.update(profile, &tooltip)?;
                tray.update_menu(menu);
            }
            Ok(())
        }

        /// Process events from the profile worker
        fn process_worker_events(&mut self) -> Result<()> {
            while let Some(event) = self.worker.try_recv_event() {
                match event {
                    WorkerEvent::StateChanged(state) => {
                        self.state = state;
                        self.refresh_tray()?;
                    }
                    WorkerEvent::Notice(notice) => {
                        if let Notice::DefaultDeviceSelected { device } = &notice {
                            self.config.device.default_device_name = device.clone();
                            self.config_manager.save(&self.config)?;
                            self.refresh_tray()?;
                        }
                        if let Err(e) = self.notification_manager.show(&notice) {
                            warn!("Failed to show notification: {}", e);
                        }
                    }
                    WorkerEvent::Stopped => {
                        error!("Profile worker stopped unexpectedly");
                        self.notification_manager
                            .show_error(&AppError::WorkerError("profile worker stopped".into()).to_string());
                        self.running = false;
                    }
                }
            }
            Ok(())
        }

        /// Handle menu events
        fn handle_menu_event(&mut self, event: &MudaMenuEvent) -> Result<()> {
            let Some(menu_event) = self.menu_builder.handle_event(event) else {
                return Ok(());
            };

            match menu_event {
                MenuEvent::SetProfile(profile) => {
                    info!("Switch to {} requested", profile);
                    self.worker.send(WorkerCommand::SetMode(profile))?;
                }
                MenuEvent::Toggle => {
                    info!("Toggle requested");
                    self.worker.send(WorkerCommand::Toggle)?;
                }
                MenuEvent::ToggleAutoSwitchByApp => {
                    self.config.auto_switch.by_app = !self.config.auto_switch.by_app;
                    info!("Auto-switch by app: {}", self.config.auto_switch.by_app);
                    self.apply_config()?;
                }
                MenuEvent::ToggleAutoStart => {
                    let enabled = !self.config.general.auto_start;
                    self.config_manager.set_auto_start(enabled)?;
                    self.config.general.auto_start = enabled;
                    self.config_manager.save(&self.config)?;
                    self.refresh_tray()?;
                }
                MenuEvent::ReloadSettings => {
                    let mut config = self.config_manager.load()?;
                    // The tray, not the file, owns the auto-start registry value
                    config.general.auto_start = self.config.general.auto_start;
                    info!("Settings reloaded: {} rules", config.auto_switch.rules.len());
                    self.notification_manager.set_enabled(config.notifications.enabled);
                    self.config = config;
                    self.apply_config()?;
                }
                MenuEvent::ResetRules => {
                    reset_to_defaults(&mut self.config.auto_switch.rules);
                    info!("Auto-switch rules reset to defaults");
                    self.apply_config()?;
                }
                MenuEvent::Exit => {
                    info!("Exit requested");
                    self.running = false;
                }
            }
            Ok(())
        }

        /// Push the in-memory config to the watcher, resolver and worker
        fn apply_config(&mut self) -> Result<()> {
            self.resolver.update_rules(&self.config.auto_switch.rules);

            if self.config.auto_switch.by_app {
                if !self.process_watcher.is_watching() {
                    if let Err(e) = self.process_watcher.start_watching() {
                        error!("Auto-switch by app disabled: {}", e);
                        self.config.auto_switch.by_app = false;
                        self.notification_manager.show_error(&e.to_string());
                    }
                }
            } else {
                self.process_watcher.stop_watching();
            }
            self.config_manager.save(&self.config)?;

            self.worker
                .send(WorkerCommand::SettingsChanged(OrchestratorSettings::from_config(&self.config)))?;
            self.refresh_tray()
        }

        /// Run the main event loop
        fn run(&mut self) -> Result<()> {
            info!("Starting main event loop");

            let menu_channel = MudaMenuEvent::receiver();
            let mut msg = MSG::default();

            while self.running && !SHUTDOWN_FLAG.load(Ordering::SeqCst) {
                unsafe {
                    while PeekMessageW(&mut msg, HWND::default(), 0, 0, PM_REMOVE).as_bool() {
                        let _ = TranslateMessage(&msg);
                        let _ = DispatchMessageW(&msg);
                    }
                }

                if let Ok(event) = menu_channel.try_recv() {
                    if let Err(e) = self.handle_menu_event(&event) {
                        error!("Menu event error: {}", e);
                        self.notification_manager.show_error(&e.to_string());
                    }
                }

                if let Err(e) = self.process_worker_events() {
                    error!("Worker event error: {}", e);
                }

                std::thread::sleep(Duration::from_millis(50));
            }

            Ok(())
        }

        /// Shutdown the application
        fn shutdown(&mut self) {
            info!("Shutting down application");

            if let Some(mut watcher) = self.connection_watcher.take() {
                watcher.stop();
            }
            self.process_watcher.stop_watching();
            self.worker.shutdown();

            if let Err(e) = self.config_manager.save(&self.config) {
                error!("Failed to save config on exit: {}", e);
            }
        }
    }

    /// Check for single instance using named mutex
    fn check_single_instance() -> Result<Option<HANDLE>> {
        let mutex_name = wide(SINGLE_INSTANCE_MUTEX);

        unsafe {
            let mutex = CreateMutexW(None, true, PCWSTR::from_raw(mutex_name.as_ptr()))?;
            if GetLastError() == ERROR_ALREADY_EXISTS {
                let _ = CloseHandle(mutex);
                return Ok(None);
            }
            Ok(Some(mutex))
        }
    }

    fn message_box(title: &str, message: &str) {
        let title_wide = wide(title);
        let message_wide = wide(message);
        unsafe {
            MessageBoxW(
                HWND::default(),
                PCWSTR::from_raw(message_wide.as_ptr()),
                PCWSTR::from_raw(title_wide.as_ptr()),
                MB_OK | MB_ICONINFORMATION,
            );
        }
    }

    pub fn run() {
        let config_manager = match ConfigManager::new() {
            Ok(cm) => cm,
            Err(e) => {
                eprintln!("Failed to initialize config manager: {}", e);
                return;
            }
        };
        let config = config_manager.load().unwrap_or_else(|e| {
            eprintln!("Failed to load config: {}, using defaults", e);
            AppConfig::default()
        });
        let locale = Locale::from_config(config.general.language.as_deref());

        let mutex = match check_single_instance() {
            Ok(Some(m)) => m,
            Ok(None) => {
                message_box(&locale.text("app_name"), &locale.text("already_running"));
                return;
            }
            Err(e) => {
                message_box(&locale.text("error_title"), &e.to_string());
                return;
            }
        };

        unsafe {
            let hr = CoInitializeEx(None, COINIT_APARTMENTTHREADED);
            if hr.is_err() {
                eprintln!("Failed to initialize COM: {:?}", hr);
                let _ = CloseHandle(mutex);
                return;
            }
        }

        let log_target = LogTarget::new(&config_manager.log_dir(), &config.logging);
        if let Err(e) = logging::init(&log_target) {
            eprintln!("Failed to initialize logging: {}", e);
        }

        unsafe {
            if let Err(e) = SetConsoleCtrlHandler(Some(console_ctrl_handler), true) {
                warn!("Failed to set console control handler: {:?}", e);
            }
        }

        info!("Bluetooth Profile Switcher starting...");
        info!("Version: {}", env!("CARGO_PKG_VERSION"));
        info!("Config: {}", config_manager.config_path().display());

        if let Err(e) = register_aumid() {
            warn!("Failed to register AUMID for notifications: {}", e);
        }

        let result = App::new(config_manager, config, locale.clone()).and_then(|mut app| {
            let outcome = app.init().and_then(|()| app.run());
            app.shutdown();
            outcome
        });

        if let Err(e) = result {
            error!("Application error: {}", e);
            message_box(&locale.text("error_title"), &e.to_string());
        }

        unsafe {
            CoUninitialize();
            let _ = ReleaseMutex(mutex);
            let _ = CloseHandle(mutex);
        }

        info!("Bluetooth Profile Switcher stopped");
    }
}

#[cfg(windows)]
fn main() {
    desktop::run();
}

#[cfg(not(windows))]
fn main() {
    eprintln!("Bluetooth Profile Switcher only runs on Windows");
    std::process::exit(1);
}
