//! PID file for external supervision.
//!
//! The file is written once at startup and never removed by this process;
//! the supervisor owns its lifecycle.

use crate::error::{Result, StartupError};
use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use std::fs::{self, DirBuilder, OpenOptions};
use std::io::Write;
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};
use std::path::{Path, PathBuf};

/// A written PID file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PidFile {
    path: PathBuf,
    pid: u32,
}

impl PidFile {
    /// Write the current process id to `path`.
    pub fn write(path: &Path) -> Result<Self> {
        Self::write_pid(path, std::process::id())
    }

    /// Write `pid` to `path`, creating parent directories as needed. The file
    /// holds the decimal pid and nothing else.
    pub fn write_pid(path: &Path, pid: u32) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            DirBuilder::new()
                .recursive(true)
                .mode(0o700)
                .create(parent)
                .map_err(|e| StartupError::pid_file(path, e))?;
        }

        if let Some(previous) = Self::read(path) {
            if previous != pid && is_process_alive(previous) {
                tracing::warn!(
                    "PID file {} belongs to running process {previous}, overwriting",
                    path.display()
                );
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .mode(0o644)
            .open(path)
            .map_err(|e| StartupError::pid_file(path, e))?;
        file.write_all(pid.to_string().as_bytes())
            .map_err(|e| StartupError::pid_file(path, e))?;

        Ok(Self {
            path: path.to_path_buf(),
            pid,
        })
    }

    /// Read the pid stored at `path`, if the file exists and parses.
    pub fn read(path: &Path) -> Option<u32> {
        fs::read_to_string(path)
            .ok()
            .and_then(|s| s.trim().parse::<u32>().ok())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }
}

/// Whether `pid` names an existing process. A pid we may not signal still
/// counts as alive.
pub fn is_process_alive(pid: u32) -> bool {
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    if raw <= 0 {
        return false;
    }
    matches!(kill(Pid::from_raw(raw), None), Ok(()) | Err(Errno::EPERM))
}
