//! Service Controller (C5)
//!
//! Writes the member environment file and supervisor drop-in, then triggers
//! a supervisor reload. The supervisor itself is an external collaborator
//! (spec.md §4.6): its only contract is to respect the env file and the
//! drop-in, and to restart etcd after a reload.

use crate::error::AgentError;
use std::path::Path;
use tokio::fs;
use tokio::process::Command;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterState {
    New,
    Existing,
}

impl ClusterState {
    fn as_str(&self) -> &'static str {
        match self {
            ClusterState::New => "new",
            ClusterState::Existing => "existing",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitType {
    Simple,
    Notify,
}

impl UnitType {
    fn as_str(&self) -> &'static str {
        match self {
            UnitType::Simple => "simple",
            UnitType::Notify => "notify",
        }
    }

    /// spec.md §4.1: when more than one additional node is still needed to
    /// reach quorum, "simple" lets other nodes join without a dependency
    /// deadlock; otherwise "notify" waits for self-reported readiness.
    pub fn for_remaining(remaining: i64) -> Self {
        if remaining >= 2 {
            UnitType::Simple
        } else {
            UnitType::Notify
        }
    }
}

pub struct ServiceController {
    state_dir: String,
    unit_name: String,
}

impl ServiceController {
    pub fn new(state_dir: impl Into<String>, unit_name: impl Into<String>) -> Self {
        Self {
            state_dir: state_dir.into(),
            unit_name: unit_name.into(),
        }
    }

    /// `<state_dir>/<name>.env`, exactly one assignment
    /// (spec.md §3, §4.6, testable properties 3-4).
    pub async fn write_env_file(&self, name: &str, state: ClusterState) -> Result<(), AgentError> {
        let path = Path::new(&self.state_dir).join(format!("{name}.env"));
        let contents = format!("ETCD_INITIAL_CLUSTER_STATE={}\n", state.as_str());
        fs::write(&path, contents)
            .await
            .map_err(|e| AgentError::external("write env file", e.into()))?;
        info!(path = %path.display(), state = state.as_str(), "Wrote member env file");
        self.reload().await
    }

    /// `/etc/systemd/system/<unit>.service.d/<name>.conf` with a
    /// `[Service]\nType=simple|notify` stanza. Anchored to the absolute
    /// systemd unit-drop-in directory (not a cwd-relative path) and
    /// includes the `.service` suffix systemd requires to compose
    /// `<unit>.service.d` for a service unit.
    pub async fn write_drop_in(&self, name: &str, unit_type: UnitType) -> Result<(), AgentError> {
        let dir = Path::new("/etc/systemd/system").join(format!("{}.service.d", self.unit_name));
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| AgentError::external("create drop-in dir", e.into()))?;

        let path = dir.join(format!("{name}.conf"));
        let contents = format!("[Service]\nType={}\n", unit_type.as_str());
        fs::write(&path, contents)
            .await
            .map_err(|e| AgentError::external("write drop-in", e.into()))?;
        info!(path = %path.display(), unit_type = unit_type.as_str(), "Wrote supervisor drop-in");
        self.reload().await
    }

    /// Triggers a supervisor daemon-reload. Every env-file or drop-in write
    /// calls this (spec.md §4.6's stated contract) — see DESIGN.md for why
    /// this resolves the Design Notes §9 "is this a latent bug" question in
    /// favor of "reload on every write".
    pub async fn reload(&self) -> Result<(), AgentError> {
        let status = Command::new("systemctl")
            .arg("daemon-reload")
            .status()
            .await
            .map_err(|e| AgentError::external("daemon-reload", e.into()))?;

        if !status.success() {
            return Err(AgentError::external(
                "daemon-reload",
                anyhow::anyhow!("systemctl exited {:?}", status.code()),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_type_selection_boundary() {
        assert_eq!(UnitType::for_remaining(3), UnitType::Simple);
        assert_eq!(UnitType::for_remaining(2), UnitType::Simple);
        assert_eq!(UnitType::for_remaining(1), UnitType::Notify);
        assert_eq!(UnitType::for_remaining(0), UnitType::Notify);
        assert_eq!(UnitType::for_remaining(-1), UnitType::Notify);
    }
}
