//! Operating system presence probes.
//!
//! [`PlatformProbe`] names the implementation for the current target. On
//! platforms without one it is [`hm_core::NullProbe`], which reports no idle
//! time and no window titles, so presence sessions only close on document
//! changes and shutdown.

#[cfg(windows)]
mod win32;

#[cfg(windows)]
pub use win32::Win32Probe;

#[cfg(windows)]
pub type PlatformProbe = Win32Probe;

#[cfg(not(windows))]
pub type PlatformProbe = hm_core::NullProbe;

/// Probe for the current platform.
pub fn platform_probe() -> PlatformProbe {
    tracing::debug!(platform = std::env::consts::OS, "creating presence probe");
    PlatformProbe::default()
}
