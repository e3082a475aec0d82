//! Emulator window enumeration.
//!
//! Lists visible top-level windows with their owning process name, then keeps
//! only those whose process maps to an emulator kind. Enumeration is only
//! implemented on Windows; elsewhere the desktop reports no windows.

use crate::config::WindowsConfig;
use crate::types::{
    EnumerationError, RawObservation, SourceId, SourceKind, SourceSample, WindowHandle,
};
use std::collections::HashMap;
use std::ffi::OsStr;
use sysinfo::{Pid, ProcessRefreshKind, RefreshKind, System};
use tracing::trace;

/// One visible top-level window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowSample {
    pub handle: WindowHandle,
    pub pid: u32,
    pub title: String,
}

/// Something that can list the visible windows for a cycle
pub trait WindowSource: Send {
    fn snapshot(&mut self) -> Result<Vec<WindowSample>, EnumerationError>;

    /// Executable name of the process owning a window
    fn process_name(&self, pid: u32) -> Option<String>;
}

#[cfg(windows)]
mod win32 {
    use super::*;
    use windows::Win32::Foundation::{BOOL, HWND, LPARAM, TRUE};
    use windows::Win32::UI::WindowsAndMessaging::{
        EnumWindows, GetWindowTextW, GetWindowThreadProcessId, IsWindowVisible,
    };

    unsafe extern "system" fn collect_handle(hwnd: HWND, lparam: LPARAM) -> BOOL {
        let handles = &mut *(lparam.0 as *mut Vec<HWND>);
        handles.push(hwnd);
        TRUE
    }

    pub fn get_windows() -> Result<Vec<WindowSample>, EnumerationError> {
        let mut handles: Vec<HWND> = Vec::new();
        unsafe {
            EnumWindows(
                Some(collect_handle),
                LPARAM(&mut handles as *mut Vec<HWND> as isize),
            )
            .map_err(|e| EnumerationError::Platform(e.to_string()))?;
        }

        let mut windows = Vec::new();
        for hwnd in handles {
            unsafe {
                if !IsWindowVisible(hwnd).as_bool() {
                    continue;
                }

                let mut buf = [0u16; 512];
                let len = GetWindowTextW(hwnd, &mut buf);
                if len <= 0 {
                    continue;
                }
                let title = String::from_utf16_lossy(&buf[..len as usize]);
                if title.trim().is_empty() {
                    continue;
                }

                let mut pid: u32 = 0;
                GetWindowThreadProcessId(hwnd, Some(&mut pid));

                windows.push(WindowSample {
                    handle: hwnd.0 as usize as WindowHandle,
                    pid,
                    title,
                });
            }
        }

        Ok(windows)
    }
}

#[cfg(not(windows))]
mod win32 {
    use super::*;

    pub fn get_windows() -> Result<Vec<WindowSample>, EnumerationError> {
        Ok(vec![])
    }
}

/// The real desktop: Win32 windows plus sysinfo process names
pub struct DesktopWindows {
    system: System,
}

impl DesktopWindows {
    pub fn new() -> Self {
        Self {
            system: System::new_with_specifics(process_refresh()),
        }
    }
}

impl Default for DesktopWindows {
    fn default() -> Self {
        Self::new()
    }
}

fn process_refresh() -> RefreshKind {
    RefreshKind::new().with_processes(ProcessRefreshKind::new())
}

impl WindowSource for DesktopWindows {
    fn snapshot(&mut self) -> Result<Vec<WindowSample>, EnumerationError> {
        let windows = win32::get_windows()?;
        if !windows.is_empty() {
            self.system.refresh_specifics(process_refresh());
        }
        Ok(windows)
    }

    fn process_name(&self, pid: u32) -> Option<String> {
        self.system
            .process(Pid::from_u32(pid))
            .map(|process| OsStr::new(process.name()).to_string_lossy().into_owned())
    }
}

/// Keep the windows owned by known emulator processes, as tracker samples
pub fn emulator_samples(
    windows: Vec<WindowSample>,
    source: &dyn WindowSource,
    config: &WindowsConfig,
) -> Vec<SourceSample> {
    let mut names: HashMap<u32, Option<String>> = HashMap::new();

    windows
        .into_iter()
        .filter_map(|window| {
            let name = names
                .entry(window.pid)
                .or_insert_with(|| source.process_name(window.pid))
                .clone()?;
            let kind = config.kind_for_process(&name)?;
            trace!("Emulator window {:#x} ({}): {}", window.handle, name, window.title);
            Some(SourceSample {
                id: SourceId::Window(window.handle),
                kind: SourceKind::Window(kind),
                raw: RawObservation::Title(window.title),
            })
        })
        .collect()
}
