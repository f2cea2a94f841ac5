use std::fmt;

#[derive(Debug)]
pub enum AppError {
    ComInitFailed(String),
    TrayIconFailed(String),
    ConfigError(String),
    IoError(std::io::Error),
    PermissionDenied(String),
    DeviceNotFound(String),
    EnumerationFailed(String),
    WatcherFailed(String),
    WorkerError(String),
    #[cfg(windows)]
    WindowsApiError(windows::core::Error),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::ComInitFailed(msg) => write!(f, "COM initialization failed: {}", msg),
            AppError::TrayIconFailed(msg) => write!(f, "Tray icon creation failed: {}", msg),
            AppError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            AppError::IoError(e) => write!(f, "IO error: {}", e),
            AppError::PermissionDenied(msg) => write!(f, "Permission denied: {}", msg),
            AppError::DeviceNotFound(msg) => write!(f, "Device not found: {}", msg),
            AppError::EnumerationFailed(msg) => write!(f, "Device enumeration failed: {}", msg),
            AppError::WatcherFailed(msg) => write!(f, "Process watcher failed: {}", msg),
            AppError::WorkerError(msg) => write!(f, "Worker error: {}", msg),
            #[cfg(windows)]
            AppError::WindowsApiError(e) => write!(f, "Windows API error: {}", e),
        }
    }
}

impl std::error::Error for AppError {}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::IoError(err)
    }
}

#[cfg(windows)]
impl From<windows::core::Error> for AppError {
    fn from(err: windows::core::Error) -> Self {
        AppError::WindowsApiError(err)
    }
}

#[cfg(windows)]
impl From<muda::Error> for AppError {
    fn from(err: muda::Error) -> Self {
        AppError::TrayIconFailed(err.to_string())
    }
}

#[cfg(windows)]
impl From<tray_icon::Error> for AppError {
    fn from(err: tray_icon::Error) -> Self {
        AppError::TrayIconFailed(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Fatal,
    Recoverable,
    Minor,
}

impl AppError {
    /// How the application should react to this error
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            AppError::ComInitFailed(_) | AppError::TrayIconFailed(_) => ErrorSeverity::Fatal,
            AppError::DeviceNotFound(_) => ErrorSeverity::Minor,
            AppError::PermissionDenied(_)
            | AppError::EnumerationFailed(_)
            | AppError::WatcherFailed(_)
            | AppError::WorkerError(_)
            | AppError::ConfigError(_)
            | AppError::IoError(_) => ErrorSeverity::Recoverable,
            #[cfg(windows)]
            AppError::WindowsApiError(_) => ErrorSeverity::Recoverable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_mapping() {
        assert_eq!(
            AppError::PermissionDenied("x".into()).severity(),
            ErrorSeverity::Recoverable
        );
        assert_eq!(AppError::DeviceNotFound("x".into()).severity(), ErrorSeverity::Minor);
        assert_eq!(
            AppError::EnumerationFailed("x".into()).severity(),
            ErrorSeverity::Recoverable
        );
        assert_eq!(AppError::WatcherFailed("x".into()).severity(), ErrorSeverity::Recoverable);
        assert_eq!(AppError::TrayIconFailed("x".into()).severity(), ErrorSeverity::Fatal);
    }

    #[test]
    fn test_display_includes_message() {
        let err = AppError::WatcherFailed("snapshot unavailable".into());
        assert_eq!(err.to_string(), "Process watcher failed: snapshot unavailable");
    }

    #[test]
    fn test_from_io_error() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: AppError = io.into();
        assert!(matches!(err, AppError::IoError(_)));
    }
}
