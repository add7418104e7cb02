//! Cross-process run lock (`{cache_dir}/pipeline.lock`).
//!
//! The file is created with `create_new` and holds the owner's PID, so a
//! second run fails fast instead of racing the first on the summary cache.
//! Dropping the guard removes it. A run killed before `Drop` leaves the file
//! behind; the next run sees that the PID is gone and takes the lock over.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// A lock file without a readable PID is treated as mid-write for this long.
const UNREADABLE_GRACE: Duration = Duration::from_secs(60);

#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    /// Take the lock. `Ok(None)` when a live run holds it.
    pub fn try_acquire(path: &Path) -> std::io::Result<Option<Self>> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        if let Some(lock) = Self::create(path)? {
            return Ok(Some(lock));
        }
        if Self::is_held(path) {
            return Ok(None);
        }

        tracing::warn!("taking over stale lock {}", path.display());
        match fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        Self::create(path)
    }

    fn create(path: &Path) -> std::io::Result<Option<Self>> {
        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(mut file) => {
                writeln!(file, "{}", std::process::id())?;
                file.sync_all()?;
                Ok(Some(Self {
                    path: path.to_path_buf(),
                }))
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// True when the lock file exists and its owner is still running.
    pub fn is_held(path: &Path) -> bool {
        let Ok(text) = fs::read_to_string(path) else {
            return false;
        };
        match text.trim().parse::<u32>() {
            Ok(pid) => process_alive(pid),
            Err(_) => fs::metadata(path)
                .and_then(|m| m.modified())
                .ok()
                .and_then(|at| SystemTime::now().duration_since(at).ok())
                .map_or(true, |age| age < UNREADABLE_GRACE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!("failed to remove lock {}: {e}", self.path.display());
        }
    }
}

#[cfg(target_os = "linux")]
fn process_alive(pid: u32) -> bool {
    Path::new("/proc").join(pid.to_string()).exists()
}

#[cfg(all(unix, not(target_os = "linux")))]
fn process_alive(pid: u32) -> bool {
    std::process::Command::new("kill")
        .args(["-0", &pid.to_string()])
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map_or(true, |s| s.success())
}

// No liveness check without extra dependencies; a stale lock has to be
// removed by hand here.
#[cfg(not(unix))]
fn process_alive(_pid: u32) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Above the Linux `pid_max` ceiling, so never a live process.
    const DEAD_PID: &str = "999999999\n";

    #[test]
    fn second_acquire_fails_until_released() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache").join("pipeline.lock");

        let first = RunLock::try_acquire(&path).unwrap().unwrap();
        assert!(path.exists());
        assert!(RunLock::is_held(&path));
        assert!(RunLock::try_acquire(&path).unwrap().is_none());

        drop(first);
        assert!(!path.exists());
        assert!(RunLock::try_acquire(&path).unwrap().is_some());
    }

    #[cfg(unix)]
    #[test]
    fn lock_of_dead_process_is_taken_over() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.lock");
        fs::write(&path, DEAD_PID).unwrap();
        assert!(!RunLock::is_held(&path));

        let lock = RunLock::try_acquire(&path).unwrap().unwrap();
        let owner = fs::read_to_string(lock.path()).unwrap();
        assert_eq!(owner.trim(), std::process::id().to_string());
    }

    #[test]
    fn fresh_unreadable_lock_counts_as_held() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.lock");
        fs::write(&path, "").unwrap();
        assert!(RunLock::is_held(&path));
        assert!(RunLock::try_acquire(&path).unwrap().is_none());
    }

    #[test]
    fn missing_lock_is_not_held() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!RunLock::is_held(&dir.path().join("pipeline.lock")));
    }
}
