// Author: Dustin Pilgrim
// License: MIT

use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::os::unix::io::AsRawFd;
use std::path::Path;

/// Try to take the non-blocking exclusive daemon lock.
/// Keep the returned File alive for the daemon lifetime.
/// If another keretad holds it -> Ok(None).
pub fn try_acquire_single_instance_lock(lock_path: &Path) -> Result<Option<File>> {
    let f = OpenOptions::new()
        .create(true)
        .truncate(false)
        .read(true)
        .write(true)
        .open(lock_path)
        .with_context(|| format!("open lock file: {}", lock_path.display()))?;

    let rc = unsafe { libc::flock(f.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if rc == 0 {
        return Ok(Some(f));
    }

    let e = std::io::Error::last_os_error();
    match e.raw_os_error() {
        Some(libc::EWOULDBLOCK) => Ok(None),
        _ => Err(e).with_context(|| format!("flock: {}", lock_path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_holder_is_refused_until_release() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("kereta.lock");

        let first = try_acquire_single_instance_lock(&path).unwrap();
        assert!(first.is_some());
        // flock is per open file description, so a second open conflicts.
        assert!(try_acquire_single_instance_lock(&path).unwrap().is_none());

        drop(first);
        assert!(try_acquire_single_instance_lock(&path).unwrap().is_some());
    }
}
