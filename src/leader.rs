// src/leader.rs
//! Single-scheduler guard.
//!
//! Only the process holding the PID file runs the tick loop; other instances
//! still serve the console. A PID file whose process is gone is treated as
//! stale and replaced.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

#[derive(Debug)]
pub struct LeaderLock {
    path: PathBuf,
}

impl LeaderLock {
    /// Take the lock, or fail if a live process already holds it.
    pub fn acquire(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating lock dir {}", parent.display()))?;
        }

        match create_pid_file(&path) {
            Ok(()) => return Ok(Self { path }),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
            Err(e) => {
                return Err(e).with_context(|| format!("creating lock file {}", path.display()))
            }
        }

        let mut contents = String::new();
        File::open(&path)
            .and_then(|mut f| f.read_to_string(&mut contents))
            .with_context(|| format!("reading lock file {}", path.display()))?;

        if let Ok(pid) = contents.trim().parse::<u32>() {
            if process_exists(pid) {
                anyhow::bail!(
                    "scheduler already running (pid {pid}); remove {} if that is wrong",
                    path.display()
                );
            }
        }

        tracing::warn!(target: "leader", path = %path.display(), "removing stale scheduler lock");
        std::fs::remove_file(&path)
            .with_context(|| format!("removing stale lock {}", path.display()))?;
        create_pid_file(&path)
            .with_context(|| format!("creating lock file {} after stale removal", path.display()))?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LeaderLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != ErrorKind::NotFound {
                tracing::warn!(target: "leader", error = %e, "releasing scheduler lock failed");
            }
        }
    }
}

fn create_pid_file(path: &Path) -> std::io::Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    writeln!(file, "{}", std::process::id())
}

fn process_exists(pid: u32) -> bool {
    #[cfg(unix)]
    {
        // Signal 0 only probes for existence.
        unsafe { libc::kill(pid as i32, 0) == 0 }
    }

    #[cfg(not(unix))]
    {
        let _ = pid;
        true
    }
}
