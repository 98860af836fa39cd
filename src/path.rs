// Author: Dustin Pilgrim
// License: MIT

use anyhow::{Context, Result};
use std::ffi::OsString;
use std::fs::DirBuilder;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};

pub const SOCKET_NAME: &str = "live.sock";

pub struct Paths {
    pub state_dir: PathBuf,
    pub runtime_dir: PathBuf,
    pub sock_path: PathBuf,
    pub log_path: PathBuf,
    pub current_path: PathBuf,
    pub lock_path: PathBuf,
}

/// Resolve every path the daemon and client agree on.
/// `sock_override` replaces the control socket (its parent becomes the runtime dir).
pub fn paths(sock_override: Option<&Path>) -> Result<Paths> {
    // Canonical state base (XDG-compliant, persistent)
    let state_base = dirs::state_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".local/state")))
        .context("Could not determine state directory")?;
    let state_dir = state_base.join("kereta");

    let (runtime_dir, sock_path) = match sock_override {
        Some(sock) => {
            let sock = expand_user_path(sock)?;
            let dir = sock
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."));
            (dir, sock)
        }
        None => {
            let dir = runtime_dir_from(std::env::var_os("XDG_RUNTIME_DIR"), current_uid());
            let sock = dir.join(SOCKET_NAME);
            (dir, sock)
        }
    };

    let log_path = state_dir.join("kereta.log");
    let current_path = state_dir.join("current.json");
    let lock_path = runtime_dir.join("kereta.lock");

    Ok(Paths {
        state_dir,
        runtime_dir,
        sock_path,
        log_path,
        current_path,
        lock_path,
    })
}

/// `$XDG_RUNTIME_DIR` when set, otherwise a per-user directory under /tmp.
pub fn runtime_dir_from(xdg_runtime_dir: Option<OsString>, uid: u32) -> PathBuf {
    match xdg_runtime_dir {
        Some(v) if !v.is_empty() => PathBuf::from(v),
        _ => PathBuf::from(format!("/tmp/live-{uid}")),
    }
}

pub fn current_uid() -> u32 {
    unsafe { libc::getuid() }
}

/// Create `dir` (and parents) with owner-only permissions on anything newly created.
/// An existing directory is left as is.
pub fn create_private_dir(dir: &Path) -> Result<()> {
    DirBuilder::new()
        .recursive(true)
        .mode(0o700)
        .create(dir)
        .with_context(|| format!("create dir: {}", dir.display()))
}

/// Expand "~" / "~/" and "$HOME" / "${HOME}" in paths.
/// Does not do full shell expansion, globs, or ~user.
pub fn expand_user_path<P: AsRef<Path>>(p: P) -> Result<PathBuf> {
    let s = p.as_ref().to_string_lossy();
    let s = s.trim();

    let rest = if s == "~" || s.starts_with("~/") {
        s.strip_prefix('~')
    } else if let Some(rest) = s.strip_prefix("${HOME}") {
        Some(rest)
    } else {
        s.strip_prefix("$HOME")
    };

    match rest {
        Some(rest) => {
            let home = std::env::var("HOME").context("HOME is not set (needed for home expansion)")?;
            Ok(PathBuf::from(home).join(rest.trim_start_matches('/')))
        }
        None => Ok(PathBuf::from(s)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_dir_prefers_xdg() {
        let dir = runtime_dir_from(Some(OsString::from("/run/user/1000")), 1000);
        assert_eq!(dir, PathBuf::from("/run/user/1000"));
        assert_eq!(dir.join(SOCKET_NAME), PathBuf::from("/run/user/1000/live.sock"));
    }

    #[test]
    fn runtime_dir_falls_back_to_tmp_per_uid() {
        assert_eq!(runtime_dir_from(None, 1234), PathBuf::from("/tmp/live-1234"));
        assert_eq!(
            runtime_dir_from(Some(OsString::new()), 7),
            PathBuf::from("/tmp/live-7")
        );
    }

    #[test]
    fn socket_override_sets_runtime_dir() {
        let p = paths(Some(Path::new("/tmp/kereta-test/ctl.sock"))).unwrap();
        assert_eq!(p.sock_path, PathBuf::from("/tmp/kereta-test/ctl.sock"));
        assert_eq!(p.runtime_dir, PathBuf::from("/tmp/kereta-test"));
        assert_eq!(p.lock_path, PathBuf::from("/tmp/kereta-test/kereta.lock"));
        assert!(p.current_path.ends_with("kereta/current.json"));
    }

    #[test]
    fn private_dir_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("a/b");
        create_private_dir(&dir).unwrap();

        let mode = std::fs::metadata(&dir).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode & 0o077, 0, "mode {mode:o}");
        // Idempotent.
        create_private_dir(&dir).unwrap();
    }

    #[test]
    fn plain_paths_are_untouched() {
        assert_eq!(expand_user_path("/etc/kereta").unwrap(), PathBuf::from("/etc/kereta"));
        assert_eq!(expand_user_path(" rel/x ").unwrap(), PathBuf::from("rel/x"));
    }
}
