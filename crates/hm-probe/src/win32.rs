//! Win32 implementation of the presence probe.
#![allow(unsafe_code)]

use std::ffi::c_void;
use std::time::Duration;

use hm_core::{PresenceProbe, WindowHandle};
use windows::Win32::Foundation::HWND;
use windows::Win32::System::SystemInformation::GetTickCount;
use windows::Win32::UI::Input::KeyboardAndMouse::{GetLastInputInfo, LASTINPUTINFO};
use windows::Win32::UI::WindowsAndMessaging::{
    GW_OWNER, GetForegroundWindow, GetWindow, GetWindowTextLengthW, GetWindowTextW,
};

/// Reads global input idle time and window titles through user32.
#[derive(Debug, Default, Clone, Copy)]
pub struct Win32Probe;

impl Win32Probe {
    fn hwnd(handle: WindowHandle) -> HWND {
        HWND(handle.raw() as *mut c_void)
    }

    /// The owning top-level window, or the window itself if it has no owner.
    fn owner_or_self(hwnd: HWND) -> HWND {
        // SAFETY: GetWindow only reads window manager state for the handle.
        match unsafe { GetWindow(hwnd, GW_OWNER) } {
            Ok(owner) if !owner.is_invalid() => owner,
            _ => hwnd,
        }
    }

    fn title_of(hwnd: HWND) -> Option<String> {
        if hwnd.is_invalid() {
            return None;
        }
        // SAFETY: only reads window manager state for the handle.
        let len = unsafe { GetWindowTextLengthW(hwnd) };
        let mut buffer = vec![0_u16; usize::try_from(len).ok()? + 1];
        // SAFETY: the buffer outlives the call and its length is passed along.
        let copied = unsafe { GetWindowTextW(hwnd, &mut buffer) };
        let copied = usize::try_from(copied).ok()?;
        if copied == 0 {
            tracing::trace!("window has no readable title");
            return None;
        }
        Some(String::from_utf16_lossy(&buffer[..copied]))
    }
}

impl PresenceProbe for Win32Probe {
    fn idle_input_duration(&self) -> Duration {
        let mut info = LASTINPUTINFO {
            cbSize: u32::try_from(std::mem::size_of::<LASTINPUTINFO>()).unwrap_or(8),
            dwTime: 0,
        };
        // SAFETY: `info` is a correctly sized LASTINPUTINFO owned by this frame.
        if !unsafe { GetLastInputInfo(&mut info) }.as_bool() {
            tracing::debug!("GetLastInputInfo failed");
            return Duration::ZERO;
        }
        // SAFETY: no preconditions.
        let now = unsafe { GetTickCount() };
        // Tick counts wrap after ~49.7 days.
        Duration::from_millis(u64::from(now.wrapping_sub(info.dwTime)))
    }

    fn foreground_window_title(&self) -> Option<String> {
        // SAFETY: no preconditions.
        let foreground = unsafe { GetForegroundWindow() };
        if foreground.is_invalid() {
            return None;
        }
        Self::title_of(Self::owner_or_self(foreground))
    }

    fn window_title(&self, handle: WindowHandle) -> Option<String> {
        Self::title_of(Self::hwnd(handle))
    }
}
