//! Administrative-rights probe
//!
//! Device-node enable/disable requests are rejected by the OS unless the process
//! token is elevated.

/// Reports whether this process runs with administrative rights
pub trait ElevationProbe: Send + Sync {
    fn is_elevated(&self) -> bool;
}

/// Reads `TokenElevation` from the current process token
#[cfg(windows)]
pub struct TokenElevationProbe;

#[cfg(windows)]
impl ElevationProbe for TokenElevationProbe {
    fn is_elevated(&self) -> bool {
        use windows::Win32::Foundation::{CloseHandle, HANDLE};
        use windows::Win32::Security::{
            GetTokenInformation, TokenElevation, TOKEN_ELEVATION, TOKEN_QUERY,
        };
        use windows::Win32::System::Threading::{GetCurrentProcess, OpenProcessToken};

        unsafe {
            let mut token = HANDLE::default();
            if OpenProcessToken(GetCurrentProcess(), TOKEN_QUERY, &mut token).is_err() {
                log::warn!("Could not open process token, assuming not elevated");
                return false;
            }

            let mut elevation = TOKEN_ELEVATION::default();
            let mut size = 0u32;
            let result = GetTokenInformation(
                token,
                TokenElevation,
                Some(&mut elevation as *mut _ as *mut _),
                std::mem::size_of::<TOKEN_ELEVATION>() as u32,
                &mut size,
            );

            let _ = CloseHandle(token);

            if result.is_err() {
                log::warn!("Could not query token elevation, assuming not elevated");
                return false;
            }

            elevation.TokenIsElevated != 0
        }
    }
}

/// Mock implementations for testing
/// Available in tests and with the "test-mocks" feature
#[cfg(any(test, feature = "test-mocks"))]
pub mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    pub struct MockElevation {
        elevated: AtomicBool,
    }

    impl MockElevation {
        pub fn new(elevated: bool) -> Self {
            Self {
                elevated: AtomicBool::new(elevated),
            }
        }

        pub fn set_elevated(&self, elevated: bool) {
            self.elevated.store(elevated, Ordering::SeqCst);
        }
    }

    impl ElevationProbe for MockElevation {
        fn is_elevated(&self) -> bool {
            self.elevated.load(Ordering::SeqCst)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mocks::MockElevation;
    use super::*;

    #[test]
    fn test_mock_elevation_toggles() {
        let probe = MockElevation::new(false);
        assert!(!probe.is_elevated());
        probe.set_elevated(true);
        assert!(probe.is_elevated());
    }

    #[cfg(windows)]
    #[test]
    fn test_token_probe_does_not_panic() {
        let _ = TokenElevationProbe.is_elevated();
    }
}
