//! Lock file management for single-instance enforcement.
//!
//! Only one meltr process may drive the relays at a time: device protocol
//! sessions are stateful and two schedulers would fight over them. The lock
//! file lives in the runtime directory and carries the owning PID so `meltr
//! stop` can signal the running instance.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::PathBuf;

/// Path of the lock file in the runtime directory.
pub fn lock_path() -> PathBuf {
    let runtime_dir = std::env::var("XDG_RUNTIME_DIR").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(runtime_dir).join(crate::common::constants::LOCK_FILE_NAME)
}

/// RAII guard for the instance lock; releases and removes the file on drop.
pub struct LockGuard {
    _file: File,
    path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Acquire the exclusive instance lock.
///
/// Returns `Ok(None)` when another live instance holds the lock; the caller
/// reports and exits. A stale lock (owner PID gone) is reclaimed.
pub fn acquire_lock() -> Result<Option<LockGuard>> {
    let path = lock_path();

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .read(true)
        .create(true)
        .truncate(false)
        .open(&path)
        .with_context(|| format!("Failed to open lock file {}", path.display()))?;

    if file.try_lock_exclusive().is_err() {
        // Lock held: a live instance owns it. fs2 locks die with their
        // process, so a held lock is never stale.
        let holder = read_lock_pid().map(|pid| pid.to_string());
        log_error!(
            "Another meltr instance is already running{}",
            holder.map(|pid| format!(" (pid {pid})")).unwrap_or_default()
        );
        return Ok(None);
    }

    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    writeln!(&file, "{}", std::process::id())?;
    file.flush()?;

    Ok(Some(LockGuard { _file: file, path }))
}

/// PID recorded in the lock file, if one exists and parses.
pub fn read_lock_pid() -> Option<u32> {
    let contents = std::fs::read_to_string(lock_path()).ok()?;
    contents.lines().next()?.trim().parse().ok()
}
