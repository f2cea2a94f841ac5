//! Process list via ToolHelp snapshots

use crate::autoswitch::watcher::{ProcessInfo, ProcessSource};
use crate::error::{AppError, Result};
use windows::Win32::Foundation::CloseHandle;
use windows::Win32::System::Diagnostics::ToolHelp::{
    CreateToolhelp32Snapshot, Process32FirstW, Process32NextW, PROCESSENTRY32W, TH32CS_SNAPPROCESS,
};
use windows::Win32::System::Threading::GetCurrentProcessId;

/// All processes except this one
#[derive(Debug, Default, Clone, Copy)]
pub struct ToolhelpProcessSource;

impl ToolhelpProcessSource {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessSource for ToolhelpProcessSource {
    fn snapshot(&self) -> Result<Vec<ProcessInfo>> {
        let own_pid = unsafe { GetCurrentProcessId() };
        let mut processes = Vec::new();

        unsafe {
            let snapshot = CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0)
                .map_err(|e| AppError::EnumerationFailed(format!("Process snapshot failed: {}", e)))?;

            let mut entry = PROCESSENTRY32W {
                dwSize: std::mem::size_of::<PROCESSENTRY32W>() as u32,
                ..Default::default()
            };

            if Process32FirstW(snapshot, &mut entry).is_ok() {
                loop {
                    if entry.th32ProcessID != own_pid && entry.th32ProcessID != 0 {
                        processes.push(ProcessInfo::new(entry.th32ProcessID, exe_name(&entry)));
                    }
                    if Process32NextW(snapshot, &mut entry).is_err() {
                        break;
                    }
                }
            }

            let _ = CloseHandle(snapshot);
        }

        Ok(processes)
    }
}

fn exe_name(entry: &PROCESSENTRY32W) -> String {
    let len = entry
        .szExeFile
        .iter()
        .position(|&c| c == 0)
        .unwrap_or(entry.szExeFile.len());
    String::from_utf16_lossy(&entry.szExeFile[..len])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_excludes_self() {
        let own_pid = unsafe { GetCurrentProcessId() };
        let processes = ToolhelpProcessSource::new().snapshot().unwrap();
        assert!(!processes.is_empty());
        assert!(processes.iter().all(|p| p.pid != own_pid));
    }
}
