//! PulseAudio workaround for root runs.
//!
//! Testing websocket demos requires running as root on Linux, and under
//! root no session audio server exists; a daemon is started for the run
//! phases and killed during cleanup.

use std::process::{Command, Stdio};

use tracing::{debug, warn};

/// Whether the harness runs as the root account on Linux.
#[must_use]
pub fn is_linux_root() -> bool {
    #[cfg(target_os = "linux")]
    {
        // SAFETY: geteuid has no preconditions and cannot fail.
        unsafe { libc::geteuid() == 0 }
    }
    #[cfg(not(target_os = "linux"))]
    {
        false
    }
}

/// Start a PulseAudio daemon that won't exit while the run is in flight.
pub fn launch() {
    debug!("launching pulseaudio for root run");
    let result = Command::new("pulseaudio")
        .args(["-D", "--disallow-exit=1", "--exit-idle-time=-1"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn();
    if let Err(err) = result {
        warn!(error = %err, "couldn't launch pulseaudio; audio demos may fail");
    }
}

/// Ask the daemon to exit.
pub fn kill() {
    debug!("stopping pulseaudio");
    let result = Command::new("pulseaudio")
        .arg("-k")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    if let Err(err) = result {
        warn!(error = %err, "couldn't stop pulseaudio");
    }
}
