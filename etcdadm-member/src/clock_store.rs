//! Clock & State Store (C1)
//!
//! A monotonic-enough time source (UNIX seconds is all the failure-window
//! arithmetic needs) plus typed accessors over the on-disk scratch files
//! spec.md §3 names. Each accessor owns exactly one file; nothing here
//! interprets the *meaning* of a timestamp being present — that's the
//! Observer's (C6) job.

use crate::error::AgentError;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::fs;

pub trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before UNIX epoch")
            .as_secs()
    }
}

/// Test clock that returns a fixed value until advanced.
pub struct FixedClock(std::sync::atomic::AtomicU64);

impl FixedClock {
    pub fn new(now: u64) -> Self {
        Self(std::sync::atomic::AtomicU64::new(now))
    }

    pub fn advance(&self, secs: u64) {
        self.0.fetch_add(secs, std::sync::atomic::Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> u64 {
        self.0.load(std::sync::atomic::Ordering::SeqCst)
    }
}

/// One of {absent, replaced, started} — spec.md §3. `Absent` is never
/// written to disk; it is the state of the `status` file not existing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberStatus {
    Absent,
    Replaced,
    Started,
}

impl MemberStatus {
    fn as_word(&self) -> &'static str {
        match self {
            MemberStatus::Absent => "absent",
            MemberStatus::Replaced => "replaced",
            MemberStatus::Started => "started",
        }
    }

    fn parse(word: &str) -> MemberStatus {
        match word.trim() {
            "replaced" => MemberStatus::Replaced,
            "started" => MemberStatus::Started,
            _ => MemberStatus::Absent,
        }
    }
}

pub struct StateStore {
    dir: PathBuf,
}

const MEMBER_FAILURE_FILE: &str = "member-failure-beginning-time";
const CLUSTER_FAILURE_FILE: &str = "cluster-failure-beginning-time";
const STATUS_FILE: &str = "status";

impl StateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn ensure_dirs(&self, snapshot_dir: &Path) -> Result<(), AgentError> {
        fs::create_dir_all(&self.dir).await.map_err(|e| {
            AgentError::Precondition(format!("cannot create state dir {:?}: {e}", self.dir))
        })?;
        fs::create_dir_all(snapshot_dir).await.map_err(|e| {
            AgentError::Precondition(format!("cannot create snapshot dir {:?}: {e}", snapshot_dir))
        })?;
        Ok(())
    }

    async fn read_timestamp(&self, file: &str) -> Option<u64> {
        let contents = fs::read_to_string(self.dir.join(file)).await.ok()?;
        contents.trim().parse().ok()
    }

    async fn write_timestamp(&self, file: &str, value: u64) -> Result<(), AgentError> {
        fs::write(self.dir.join(file), value.to_string())
            .await
            .map_err(|e| AgentError::external(format!("write {file}"), e.into()))
    }

    async fn clear(&self, file: &str) -> Result<(), AgentError> {
        match fs::remove_file(self.dir.join(file)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AgentError::external(format!("remove {file}"), e.into())),
        }
    }

    pub async fn member_failure_time(&self) -> Option<u64> {
        self.read_timestamp(MEMBER_FAILURE_FILE).await
    }

    pub async fn set_member_failure_time(&self, now: u64) -> Result<(), AgentError> {
        self.write_timestamp(MEMBER_FAILURE_FILE, now).await
    }

    pub async fn clear_member_failure_time(&self) -> Result<(), AgentError> {
        self.clear(MEMBER_FAILURE_FILE).await
    }

    pub async fn cluster_failure_time(&self) -> Option<u64> {
        self.read_timestamp(CLUSTER_FAILURE_FILE).await
    }

    pub async fn set_cluster_failure_time(&self, now: u64) -> Result<(), AgentError> {
        self.write_timestamp(CLUSTER_FAILURE_FILE, now).await
    }

    pub async fn clear_cluster_failure_time(&self) -> Result<(), AgentError> {
        self.clear(CLUSTER_FAILURE_FILE).await
    }

    pub async fn status(&self) -> MemberStatus {
        match fs::read_to_string(self.dir.join(STATUS_FILE)).await {
            Ok(contents) => MemberStatus::parse(&contents),
            Err(_) => MemberStatus::Absent,
        }
    }

    pub async fn set_status(&self, status: MemberStatus) -> Result<(), AgentError> {
        fs::write(self.dir.join(STATUS_FILE), status.as_word())
            .await
            .map_err(|e| AgentError::external("write status", e.into()))
    }
}

/// "Failure exceeded" = timestamp present and `now - timestamp > limit`.
pub fn failure_exceeded(timestamp: Option<u64>, now: u64, limit_secs: u64) -> bool {
    match timestamp {
        Some(t) => now.saturating_sub(t) > limit_secs,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn record_then_clear_yields_not_set() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());

        assert_eq!(store.member_failure_time().await, None);
        store.set_member_failure_time(100).await.unwrap();
        assert_eq!(store.member_failure_time().await, Some(100));
        store.clear_member_failure_time().await.unwrap();
        assert_eq!(store.member_failure_time().await, None);
    }

    #[tokio::test]
    async fn clear_on_not_set_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        store.clear_member_failure_time().await.unwrap();
        assert_eq!(store.member_failure_time().await, None);
    }

    #[tokio::test]
    async fn status_defaults_to_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        assert_eq!(store.status().await, MemberStatus::Absent);
        store.set_status(MemberStatus::Replaced).await.unwrap();
        assert_eq!(store.status().await, MemberStatus::Replaced);
    }

    #[test]
    fn failure_exceeded_requires_strict_excess() {
        assert!(!failure_exceeded(Some(100), 110, 10));
        assert!(failure_exceeded(Some(100), 111, 10));
        assert!(!failure_exceeded(None, 200, 10));
    }
}
