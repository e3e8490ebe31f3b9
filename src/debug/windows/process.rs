//! Process launch and module enumeration using Windows API.

use std::os::windows::io::AsRawHandle;
use std::path::Path;
use std::process::Command;

use super::super::types::ModuleInfo;
use crate::core::DebugError;

use windows::Win32::Foundation::{CloseHandle, HANDLE};
use windows::Win32::System::Diagnostics::ToolHelp::{
    CreateToolhelp32Snapshot, Module32FirstW, Module32NextW, MODULEENTRY32W, TH32CS_SNAPMODULE,
    TH32CS_SNAPMODULE32,
};
use windows::Win32::UI::WindowsAndMessaging::WaitForInputIdle;

/// Enumerate the modules loaded in a process
pub fn enumerate_modules(pid: u32) -> Result<Vec<ModuleInfo>, DebugError> {
    let mut modules = Vec::new();

    unsafe {
        let snapshot = CreateToolhelp32Snapshot(TH32CS_SNAPMODULE | TH32CS_SNAPMODULE32, pid)
            .map_err(|e| DebugError::EventError(format!("Module snapshot of {} failed: {}", pid, e)))?;

        let mut entry = MODULEENTRY32W {
            dwSize: std::mem::size_of::<MODULEENTRY32W>() as u32,
            ..Default::default()
        };

        if Module32FirstW(snapshot, &mut entry).is_ok() {
            loop {
                modules.push(ModuleInfo {
                    name: wide_to_string(&entry.szModule),
                    base_address: entry.modBaseAddr as u64,
                    size: entry.modBaseSize,
                });
                if Module32NextW(snapshot, &mut entry).is_err() {
                    break;
                }
            }
        }

        let _ = CloseHandle(snapshot);
    }

    Ok(modules)
}

/// NUL-terminated UTF-16 buffer to `String`
fn wide_to_string(buffer: &[u16]) -> String {
    let len = buffer.iter().position(|&c| c == 0).unwrap_or(buffer.len());
    String::from_utf16_lossy(&buffer[..len])
}

/// Start `path` and wait (up to `idle_timeout_ms`) until it is ready for input.
///
/// Returns the new process id. The child is not killed when the handle is dropped.
pub fn launch(path: &Path, idle_timeout_ms: u32) -> Result<u32, DebugError> {
    let child = Command::new(path).spawn().map_err(|e| DebugError::LaunchFailed {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    let pid = child.id();
    log::info!("Launched {} as process {}", path.display(), pid);

    let status = unsafe { WaitForInputIdle(HANDLE(child.as_raw_handle() as isize), idle_timeout_ms) };
    if status != 0 {
        log::warn!("Process {} not input-idle (status {:#x}), attaching anyway", pid, status);
    }

    Ok(pid)
}
