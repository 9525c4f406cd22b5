//! Xvfb-backed virtual X display.
//!
//! Some anti-bot checks behave differently under `--headless`; running a
//! headful Chromium against an Xvfb server gets a real rendering pipeline
//! without needing a desktop.

use std::process::{Child, Command, Stdio};

use jobfill_core::error::AppError;

const SCREEN_GEOMETRY: &str = "1920x1080x24";

/// A running Xvfb server. Killed when dropped.
pub struct VirtualDisplay {
    child: Child,
    display: String,
}

impl VirtualDisplay {
    /// Start an Xvfb server on display `:{display_num}`. Requires the `Xvfb`
    /// binary on `$PATH`.
    pub fn start(display_num: u32) -> Result<Self, AppError> {
        let display = format!(":{display_num}");
        let child = Command::new("Xvfb")
            .arg(&display)
            .args(["-screen", "0", SCREEN_GEOMETRY])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| AppError::SessionError(format!("Failed to start Xvfb: {e}")))?;

        // `%display` trips a hygiene bug in the tracing macros when the value
        // expression is literally the identifier `display`; bind a differently
        // named local to work around it.
        let display_name = display.as_str();
        tracing::info!(display = %display_name, "Started virtual display");
        Ok(Self { child, display })
    }

    /// The display name to hand to the browser, e.g. `":99"`.
    pub fn name(&self) -> &str {
        &self.display
    }
}

impl Drop for VirtualDisplay {
    fn drop(&mut self) {
        if let Err(e) = self.child.kill() {
            tracing::debug!("Failed to kill Xvfb: {e}");
        }
        let _ = self.child.wait();
    }
}
