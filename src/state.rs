//! Persisted run state shared across runbar instances.
//!
//! Exactly one script run is authoritative at a time. Every instance reads
//! and writes the same JSON blob (run state record, output buffer chunks,
//! stop-signal timestamp) and reconciles by timestamp: the record with the
//! larger timestamp wins, and an older record is never allowed to overwrite
//! a newer one. There is no locking; the model is eventually consistent,
//! last-write-with-newest-timestamp-wins.

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::output::OutputChunk;

/// Which project and script a run belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptInfo {
    pub path: PathBuf,
    pub script: String,
}

/// The persisted record describing whether, where, and as what process a
/// script is currently executing.
///
/// Invariant: `is_running == false` implies `script_info` and `pid` are
/// absent. The constructors are the only way state flows should build one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunState {
    pub is_running: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_info: Option<ScriptInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    pub timestamp: u64,
}

impl RunState {
    pub fn idle(timestamp: u64) -> Self {
        Self {
            is_running: false,
            script_info: None,
            pid: None,
            timestamp,
        }
    }

    pub fn running(script_info: ScriptInfo, pid: u32, timestamp: u64) -> Self {
        Self {
            is_running: true,
            script_info: Some(script_info),
            pid: Some(pid),
            timestamp,
        }
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::idle(0)
    }
}

/// The single key-value blob persisted to disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreBlob {
    #[serde(default)]
    pub run_state: RunState,
    #[serde(default)]
    pub output_buffer: Vec<OutputChunk>,
    /// Timestamp of the most recent manual stop request, used to propagate
    /// stops to whichever instance owns the process.
    #[serde(default)]
    pub stop_signal: u64,
}

/// File-backed store for the shared blob.
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    last_timestamp: u64,
}

impl StateStore {
    pub fn at(path: PathBuf) -> Self {
        Self {
            path,
            last_timestamp: 0,
        }
    }

    /// Default location under the user data directory.
    pub fn open_default() -> Result<Self> {
        let dir = dirs::data_dir()
            .context("could not determine the user data directory")?
            .join("runbar");
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
        Ok(Self::at(dir.join("state.json")))
    }

    /// Next state timestamp: wall-clock millis, bumped to stay strictly
    /// increasing for this writer even across clock hiccups.
    pub fn next_timestamp(&mut self) -> u64 {
        let now = now_millis();
        self.last_timestamp = now.max(self.last_timestamp + 1);
        self.last_timestamp
    }

    /// Reads the blob; a missing or unreadable file is the empty blob.
    pub fn load(&self) -> StoreBlob {
        let Ok(raw) = std::fs::read_to_string(&self.path) else {
            return StoreBlob::default();
        };
        serde_json::from_str(&raw).unwrap_or_default()
    }

    /// Reconciling write.
    ///
    /// If the on-disk record carries a newer timestamp than ours, the disk
    /// wins: nothing is written and the caller gets the disk blob back to
    /// adopt. A newer on-disk stop signal is carried forward either way.
    pub fn commit(&mut self, mut blob: StoreBlob) -> Result<StoreBlob> {
        let current = self.load();
        if current.run_state.timestamp > blob.run_state.timestamp {
            self.last_timestamp = self.last_timestamp.max(current.run_state.timestamp);
            return Ok(current);
        }
        if current.stop_signal > blob.stop_signal {
            blob.stop_signal = current.stop_signal;
        }
        self.save(&blob)?;
        Ok(blob)
    }

    /// Records a manual stop request for other instances to pick up.
    pub fn signal_stop(&mut self) -> Result<u64> {
        let stamp = self.next_timestamp();
        let mut blob = self.load();
        blob.stop_signal = stamp;
        self.save(&blob)?;
        Ok(stamp)
    }

    fn save(&self, blob: &StoreBlob) -> Result<()> {
        let raw = serde_json::to_string(blob).context("failed to encode state")?;
        // Write-then-rename so a concurrent reader never sees a torn blob.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, raw)
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
