//! Caller-side record of provider identifiers
//!
//! Reconcilers never cache observed state beyond one Read. What survives
//! between runs is the identifier of each declared resource, kept in
//! `.skyflow/state.json` together with the last state observed for it.

use crate::error::{CloudError, Result};
use crate::lifecycle::{Identifier, ResourceKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;

const STATE_VERSION: u32 = 1;
const STATE_DIR: &str = ".skyflow";
const STATE_FILE: &str = "state.json";
const STATE_BACKUP: &str = "state.json.backup";
const LOCK_FILE: &str = "lock.json";

/// All tracked resources, keyed by address (`server.web`, `ip.front`, ...)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateFile {
    pub version: u32,
    pub updated_at: DateTime<Utc>,
    pub resources: BTreeMap<String, TrackedResource>,
}

impl Default for StateFile {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            updated_at: Utc::now(),
            resources: BTreeMap::new(),
        }
    }
}

impl StateFile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn identifier(&self, address: &str) -> Option<Identifier> {
        self.resources.get(address).map(|r| r.identifier.clone())
    }

    pub fn get(&self, address: &str) -> Option<&TrackedResource> {
        self.resources.get(address)
    }

    /// Record or refresh a resource
    pub fn track(&mut self, address: impl Into<String>, resource: TrackedResource) {
        self.resources.insert(address.into(), resource);
        self.updated_at = Utc::now();
    }

    /// Drop a resource that was deleted or vanished remotely
    pub fn forget(&mut self, address: &str) -> Option<TrackedResource> {
        let removed = self.resources.remove(address);
        if removed.is_some() {
            self.updated_at = Utc::now();
        }
        removed
    }

    /// Apply the outcome of a lifecycle verb: a set slot is tracked, an
    /// empty one forgotten.
    pub fn sync_slot(
        &mut self,
        address: &str,
        kind: ResourceKind,
        slot: &Option<Identifier>,
        observed: Option<serde_json::Value>,
    ) {
        match slot {
            Some(id) => {
                let observed = observed
                    .or_else(|| self.get(address).map(|r| r.observed.clone()))
                    .unwrap_or(serde_json::Value::Null);
                self.track(address, TrackedResource::new(kind, id.clone(), observed));
            }
            None => {
                self.forget(address);
            }
        }
    }

    pub fn by_kind(&self, kind: ResourceKind) -> impl Iterator<Item = (&String, &TrackedResource)> {
        self.resources.iter().filter(move |(_, r)| r.kind == kind)
    }
}

/// One tracked resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedResource {
    pub kind: ResourceKind,
    pub identifier: Identifier,

    /// Canonical state from the last successful Read
    #[serde(default)]
    pub observed: serde_json::Value,

    pub updated_at: DateTime<Utc>,
}

impl TrackedResource {
    pub fn new(kind: ResourceKind, identifier: Identifier, observed: serde_json::Value) -> Self {
        Self {
            kind,
            identifier,
            observed,
            updated_at: Utc::now(),
        }
    }
}

/// Reads and writes the state file under a project root
pub struct StateManager {
    project_root: PathBuf,
}

impl StateManager {
    pub fn new(project_root: impl AsRef<Path>) -> Self {
        Self {
            project_root: project_root.as_ref().to_path_buf(),
        }
    }

    fn state_dir(&self) -> PathBuf {
        self.project_root.join(STATE_DIR)
    }

    fn state_path(&self) -> PathBuf {
        self.state_dir().join(STATE_FILE)
    }

    fn backup_path(&self) -> PathBuf {
        self.state_dir().join(STATE_BACKUP)
    }

    fn lock_path(&self) -> PathBuf {
        self.state_dir().join(LOCK_FILE)
    }

    async fn ensure_state_dir(&self) -> Result<()> {
        let dir = self.state_dir();
        if !dir.exists() {
            fs::create_dir_all(&dir).await?;
            tracing::debug!("Created state directory: {}", dir.display());
        }
        Ok(())
    }

    /// Load the state, or an empty one when no file exists yet
    pub async fn load(&self) -> Result<StateFile> {
        let path = self.state_path();
        if !path.exists() {
            tracing::debug!("State file not found, starting empty");
            return Ok(StateFile::new());
        }

        let content = fs::read_to_string(&path).await?;
        let state: StateFile = serde_json::from_str(&content)?;

        if state.version > STATE_VERSION {
            return Err(CloudError::StateError(format!(
                "State file version {} is newer than supported version {}",
                state.version, STATE_VERSION
            )));
        }

        tracing::debug!("Loaded state with {} resources", state.resources.len());
        Ok(state)
    }

    /// Save the state, keeping the previous file as a backup
    pub async fn save(&self, state: &StateFile) -> Result<()> {
        self.ensure_state_dir().await?;

        let path = self.state_path();
        let backup = self.backup_path();

        if path.exists() {
            if backup.exists() {
                fs::remove_file(&backup).await?;
            }
            fs::rename(&path, &backup).await?;
        }

        let content = serde_json::to_string_pretty(state)?;
        fs::write(&path, content).await?;

        tracing::debug!("Saved state with {} resources", state.resources.len());
        Ok(())
    }

    /// Take the cross-process lock on the state directory.
    ///
    /// A lock older than one hour is considered stale and replaced.
    pub async fn acquire_lock(&self) -> Result<StateLock> {
        self.ensure_state_dir().await?;

        let lock_path = self.lock_path();

        if lock_path.exists() {
            let content = fs::read_to_string(&lock_path).await?;
            let holder: LockHolder = serde_json::from_str(&content)?;

            let age = Utc::now().signed_duration_since(holder.acquired_at);
            if age.num_hours() < 1 {
                return Err(CloudError::LockError(format!(
                    "State is locked by {} (pid {}) since {}",
                    holder.host, holder.pid, holder.acquired_at
                )));
            }

            tracing::warn!("Removing stale lock held by {}", holder.host);
        }

        let holder = LockHolder {
            host: std::env::var("HOSTNAME")
                .or_else(|_| std::env::var("HOST"))
                .unwrap_or_else(|_| "unknown".to_string()),
            pid: std::process::id(),
            acquired_at: Utc::now(),
        };

        fs::write(&lock_path, serde_json::to_string_pretty(&holder)?).await?;

        tracing::debug!("Acquired state lock");
        Ok(StateLock {
            lock_path,
            released: false,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LockHolder {
    host: String,
    pid: u32,
    acquired_at: DateTime<Utc>,
}

/// Guard for the state lock; removes the lock file when dropped
pub struct StateLock {
    lock_path: PathBuf,
    released: bool,
}

impl StateLock {
    pub async fn release(mut self) -> Result<()> {
        if !self.released {
            if self.lock_path.exists() {
                fs::remove_file(&self.lock_path).await?;
                tracing::debug!("Released state lock");
            }
            self.released = true;
        }
        Ok(())
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if !self.released && self.lock_path.exists() {
            let _ = std::fs::remove_file(&self.lock_path);
        }
    }
}
