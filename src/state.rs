use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Read and deserialize a JSON file, returning `None` if it doesn't exist.
pub fn read_json_file<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read_to_string(path) {
        Ok(s) => {
            let val = serde_json::from_str(&s)
                .with_context(|| format!("parsing {}", path.display()))?;
            Ok(Some(val))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
    }
}

/// Stable key for a project directory: the first 12 hex digits of the
/// SHA-256 of the path string.
pub fn project_key(project_dir: &str) -> String {
    let digest = Sha256::digest(project_dir.as_bytes());
    let mut hex = format!("{digest:x}");
    hex.truncate(12);
    hex
}

/// One hook's state file for one project: `<root>/<hook_dir>/<key>.json`.
///
/// There is no locking. Concurrent invocations for the same project race
/// and the last writer wins.
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(root: &Path, hook_dir: &str, project_dir: &str) -> Self {
        Self {
            path: root
                .join(hook_dir)
                .join(format!("{}.json", project_key(project_dir))),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the record, falling back to the default when the file is
    /// missing, unreadable or corrupt.
    pub fn load<T: DeserializeOwned + Default>(&self) -> T {
        match read_json_file(&self.path) {
            Ok(Some(state)) => state,
            Ok(None) => T::default(),
            Err(err) => {
                tracing::debug!("resetting state: {err:#}");
                T::default()
            }
        }
    }

    pub fn save<T: Serialize>(&self, state: &T) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        }
        let json = serde_json::to_string(state).context("serializing hook state")?;
        fs::write(&self.path, json).with_context(|| format!("writing {}", self.path.display()))
    }
}

// ===================================================================
// Per-hook state records
// ===================================================================

/// Session log reminder state.
/// Stored as `claude-log-reminder/<key>.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogReminderState {
    /// Stop attempts since the latest log last changed.
    pub counter: u32,
    /// Modification time of the latest log, in nanoseconds since the epoch.
    /// Zero when no log has been seen.
    pub last_mtime: u64,
    pub reminded: bool,
    pub no_log_reminded: bool,
}

/// Review reminder state.
/// Stored as `claude-r-review-reminder/<key>.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewState {
    pub reminded: bool,
    /// The unreviewed set at the last reminder, sorted.
    pub unreviewed_files: Vec<String>,
}

/// Mass-production guard state.
/// Stored as `claude-r-mass-production-guard/<key>.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardState {
    /// Path of the last script written with no data read or run since.
    pub last_script_write: Option<String>,
    /// Unix time of that write, in seconds.
    pub last_write_time: f64,
    /// Pair key (`prev→cur`) of the most recent warning.
    pub warned_for: Option<String>,
}
