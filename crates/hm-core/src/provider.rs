//! Collaborator traits for OS and host state.
//!
//! These traits keep platform calls out of the presence logic so it can be
//! exercised with scripted implementations.

use std::time::Duration;

use crate::types::WindowHandle;

/// Read-only queries against operating system presence state.
///
/// Implementations never block and never fail: an unanswerable query yields
/// a zero duration or `None`.
pub trait PresenceProbe: Send + Sync {
    /// Time since the last global keyboard or mouse input.
    fn idle_input_duration(&self) -> Duration;

    /// Title of the foreground window, resolved to its owning top-level
    /// window when the foreground window is owned.
    fn foreground_window_title(&self) -> Option<String>;

    /// Title of an arbitrary window.
    fn window_title(&self, handle: WindowHandle) -> Option<String>;
}

/// What the presence tracker needs to know about the host application.
pub trait HostContext: Send + Sync {
    /// Identifier (path) of the document currently active in the host.
    fn active_document(&self) -> Option<String>;

    /// Handle of the host's main window, once the host has created it.
    fn main_window(&self) -> Option<WindowHandle>;
}

/// Probe for platforms without an implementation.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProbe;

impl PresenceProbe for NullProbe {
    fn idle_input_duration(&self) -> Duration {
        Duration::ZERO
    }

    fn foreground_window_title(&self) -> Option<String> {
        None
    }

    fn window_title(&self, _handle: WindowHandle) -> Option<String> {
        None
    }
}
