// Author: Dustin Pilgrim
// License: MIT

use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::daemon::UiHandle;

const POLL_EVERY: Duration = Duration::from_secs(2);
const FAILURES_BEFORE_EXIT: u32 = 3;

/// Resolve XDG_RUNTIME_DIR (required for Wayland sockets).
fn runtime_dir() -> Result<PathBuf, String> {
    std::env::var_os("XDG_RUNTIME_DIR")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .ok_or_else(|| "XDG_RUNTIME_DIR is not set".to_string())
}

/// Find a connectable Wayland socket.
///
/// Priority:
///  1) $WAYLAND_DISPLAY (absolute, or relative to $XDG_RUNTIME_DIR)
///  2) any connectable "wayland-*" in $XDG_RUNTIME_DIR
fn wayland_socket_path() -> Result<PathBuf, String> {
    if let Ok(display) = std::env::var("WAYLAND_DISPLAY") {
        if !display.is_empty() {
            let p = Path::new(&display);
            if p.is_absolute() {
                return Ok(p.to_path_buf());
            }
            return Ok(runtime_dir()?.join(p));
        }
    }

    let rt = runtime_dir()?;
    let entries =
        std::fs::read_dir(&rt).map_err(|e| format!("failed to read {}: {e}", rt.display()))?;

    entries
        .flatten()
        .filter(|entry| entry.file_name().to_string_lossy().starts_with("wayland-"))
        .map(|entry| entry.path())
        .find(|p| UnixStream::connect(p).is_ok())
        .ok_or_else(|| {
            "WAYLAND_DISPLAY is not set and no connectable wayland-* socket was found in XDG_RUNTIME_DIR"
                .to_string()
        })
}

/// Ensure a Wayland compositor is reachable *right now*.
///
/// Ground truth is a connectable socket; XDG_SESSION_TYPE only improves the message.
pub fn ensure_wayland_alive() -> Result<(), String> {
    let sock = wayland_socket_path().map_err(|probe_err| {
        match std::env::var("XDG_SESSION_TYPE") {
            Ok(t) if t != "wayland" => format!("not a wayland session: XDG_SESSION_TYPE={t}"),
            _ => probe_err,
        }
    })?;

    UnixStream::connect(&sock)
        .map(|_| ())
        .map_err(|e| format!("failed to connect to wayland socket {}: {e}", sock.display()))
}

/// Check logind session liveness using org.freedesktop.login1.Session.Active.
///
/// Blocking; needs logind on the system bus, not systemd as PID 1.
fn login1_session_active_blocking() -> Result<bool, String> {
    use zbus::blocking::{Connection, Proxy};
    use zbus::zvariant::OwnedObjectPath;

    let sys = Connection::system()
        .map_err(|e| format!("logind: could not connect to system bus: {e}"))?;

    let mgr = Proxy::new(
        &sys,
        "org.freedesktop.login1",
        "/org/freedesktop/login1",
        "org.freedesktop.login1.Manager",
    )
    .map_err(|e| format!("logind: failed to create Manager proxy: {e}"))?;

    let pid = std::process::id();
    let (session_path,): (OwnedObjectPath,) = mgr
        .call("GetSessionByPID", &(pid,))
        .map_err(|e| format!("logind: GetSessionByPID({pid}) failed: {e}"))?;

    let sess = Proxy::new(
        &sys,
        "org.freedesktop.login1",
        session_path.as_str(),
        "org.freedesktop.login1.Session",
    )
    .map_err(|e| format!("logind: failed to create Session proxy: {e}"))?;

    sess.get_property("Active")
        .map_err(|e| format!("logind: failed to read Session.Active: {e}"))
}

/// Counts consecutive failed probes; a success resets it.
#[derive(Debug, Default)]
struct Strikes(u32);

impl Strikes {
    /// Record one probe; true once the limit is reached.
    fn record(&mut self, ok: bool) -> bool {
        self.0 = if ok { 0 } else { self.0 + 1 };
        self.0 >= FAILURES_BEFORE_EXIT
    }
}

/// Spawn a background watcher that shuts the UI loop down when:
///  - the Wayland socket is not connectable for N consecutive polls, OR
///  - the logind session is inactive for N consecutive polls.
///
/// If logind itself is unreachable we warn and rely on the socket probe.
pub fn spawn_session_watcher(ui: UiHandle) {
    let sock = match wayland_socket_path() {
        Ok(p) => p,
        Err(e) => {
            eventline::warn!("session watcher disabled: {e}");
            return;
        }
    };

    std::thread::spawn(move || {
        let mut socket_strikes = Strikes::default();
        let mut inactive_strikes = Strikes::default();
        let mut logind_warned = false;

        loop {
            std::thread::sleep(POLL_EVERY);

            if ui.is_closed() {
                break;
            }

            if socket_strikes.record(UnixStream::connect(&sock).is_ok()) {
                eventline::info!(
                    "wayland socket not connectable ({}); shutting down",
                    sock.display()
                );
                ui.shutdown();
                break;
            }

            match login1_session_active_blocking() {
                Ok(active) => {
                    if inactive_strikes.record(active) {
                        eventline::info!("logind session inactive; shutting down");
                        ui.shutdown();
                        break;
                    }
                }
                Err(e) => {
                    if !logind_warned {
                        eventline::warn!("logind liveness probe failed: {e}");
                        logind_warned = true;
                    }
                    inactive_strikes.record(true);
                }
            }
        }
    });
}
