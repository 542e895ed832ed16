//! Probe command: samples idle time and the foreground window.

use std::io::Write;
use std::time::Duration;

use anyhow::Result;
use hm_core::PresenceProbe;

pub fn run<W: Write>(
    writer: &mut W,
    probe: &dyn PresenceProbe,
    count: u32,
    interval: Duration,
) -> Result<()> {
    for sample in 0..count {
        if sample > 0 {
            std::thread::sleep(interval);
        }
        let idle = probe.idle_input_duration();
        let foreground = probe.foreground_window_title();
        writeln!(
            writer,
            "idle={:.1}s foreground={}",
            idle.as_secs_f64(),
            foreground.as_deref().unwrap_or("<unreadable>")
        )?;
    }
    Ok(())
}
