//! Recovery Actions (C7)
//!
//! One function per spec.md §4.2 action. Each takes exactly the borrowed
//! collaborators it needs — no globals, no ambient endpoint state (Design
//! Notes §9).

use crate::clock_store::{MemberStatus, StateStore};
use crate::common_fs::{chown_to_etcd, clear_directory, move_dir_contents};
use crate::config::AgentConfig;
use crate::error::AgentError;
use crate::etcd_client::EtcdClient;
use crate::peers::PeerDirectory;
use crate::service_controller::{ClusterState, ServiceController};
use crate::snapshot_store::SnapshotStore;
use std::path::Path;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    Bootstrapped { from_snapshot: bool },
    Restored,
    Replaced,
    SnapshotSaved,
    SnapshotSkipped,
    Reloaded,
    Cleaned,
    NoOp,
}

pub struct Actions<'a> {
    pub config: &'a AgentConfig,
    pub client: &'a EtcdClient,
    pub peers: &'a PeerDirectory,
    pub state: &'a StateStore,
    pub snapshots: &'a SnapshotStore,
    pub service: &'a ServiceController,
}

impl<'a> Actions<'a> {
    fn i(&self) -> usize {
        self.config.member_index as usize
    }

    fn local_snapshot_path(&self) -> String {
        format!(
            "{}/{}.db",
            self.config.snapshot_dir(),
            self.peers.name(self.i())
        )
    }

    /// (a) download remote snapshot if present, (b) restore from it if now
    /// present locally, (c) write `STATE=new`, (d) reload. If no snapshot
    /// exists anywhere, (b) is skipped and etcd starts empty — valid for a
    /// first-ever bootstrap (spec.md §4.2).
    pub async fn bootstrap(&self) -> Result<ActionOutcome, AgentError> {
        let local_path = self.local_snapshot_path();
        let from_snapshot = if self.snapshots.exists().await? {
            info!("Remote snapshot exists, downloading before bootstrap");
            self.snapshots.download(&local_path).await?;
            true
        } else {
            false
        };

        if from_snapshot && Path::new(&local_path).exists() {
            self.restore_from_local_snapshot(&local_path).await?;
        }

        self.service
            .write_env_file(self.peers.name(self.i()), ClusterState::New)
            .await?;

        Ok(ActionOutcome::Bootstrapped { from_snapshot })
    }

    /// Empty the data directory; restore into a temporary
    /// `<data_dir>-restored` path; on success move its contents atomically
    /// into the real data directory; chown to the etcd principal; delete
    /// the local snapshot file (spec.md §4.2, §8 property 7).
    pub async fn restore_from_local_snapshot(
        &self,
        local_snapshot_path: &str,
    ) -> Result<ActionOutcome, AgentError> {
        let i = self.i();
        let data_dir = Path::new(&self.config.data_dir);
        let restored_dir = format!("{}-restored", self.config.data_dir);

        clear_directory(data_dir).await?;

        if Path::new(&restored_dir).exists() {
            tokio::fs::remove_dir_all(&restored_dir)
                .await
                .map_err(|e| AgentError::external("remove stale restore dir", e.into()))?;
        }

        self.client
            .snapshot_restore(
                local_snapshot_path,
                &restored_dir,
                self.peers.name(i),
                self.peers.peer_url(i),
                &self.config.initial_cluster,
            )
            .await?;

        move_dir_contents(Path::new(&restored_dir), data_dir).await?;
        tokio::fs::remove_dir_all(&restored_dir)
            .await
            .map_err(|e| AgentError::external("remove temp restore dir", e.into()))?;

        chown_to_etcd(data_dir).await?;

        tokio::fs::remove_file(local_snapshot_path)
            .await
            .map_err(|e| AgentError::external("remove local snapshot", e.into()))?;

        Ok(ActionOutcome::Restored)
    }

    /// Empty the data directory; find our member ID via the next peer;
    /// remove then re-add; mark `status=replaced`; write `STATE=existing`;
    /// reload. A ~1s pause between remove and add gives the cluster time
    /// to elect a new leader if the removed member was leading (spec.md
    /// §4.2, §8 property 4).
    pub async fn replace_failed(&self) -> Result<ActionOutcome, AgentError> {
        let i = self.i();
        let next = self.peers.next(i);
        let next_endpoint = self.peers.client_url(next);
        let my_peer_url = self.peers.peer_url(i).to_string();

        clear_directory(Path::new(&self.config.data_dir)).await?;

        let members = self.client.member_list(next_endpoint).await?;
        let stale_id = members
            .iter()
            .find(|m| m.peer_url == my_peer_url)
            .map(|m| m.id.clone())
            .ok_or_else(|| {
                AgentError::external(
                    "replace_failed",
                    anyhow::anyhow!(
                        "no member with peer url {my_peer_url} found via {next_endpoint}"
                    ),
                )
            })?;

        self.client.member_remove(next_endpoint, &stale_id).await?;
        sleep(Duration::from_secs(1)).await;
        self.client
            .member_add(next_endpoint, self.peers.name(i), &my_peer_url)
            .await?;

        self.state.set_status(MemberStatus::Replaced).await?;
        self.service
            .write_env_file(self.peers.name(i), ClusterState::Existing)
            .await?;

        Ok(ActionOutcome::Replaced)
    }

    /// Only the current leader takes snapshots, and only when the cluster
    /// is healthy — taking one from an unhealthy cluster could persist
    /// corrupt state (spec.md §4.2, §8 property 5).
    pub async fn save_snapshot(&self, cluster_is_healthy: bool) -> Result<ActionOutcome, AgentError> {
        let i = self.i();
        let endpoint = self.peers.client_url(i);

        let status = self.client.endpoint_status(endpoint).await?;
        if !status.is_leader() || !cluster_is_healthy {
            info!(
                is_leader = status.is_leader(),
                cluster_is_healthy, "Not leader or cluster unhealthy, skipping snapshot"
            );
            return Ok(ActionOutcome::SnapshotSkipped);
        }

        let local_path = self.local_snapshot_path();
        self.client.snapshot_save(endpoint, &local_path).await?;
        self.client.snapshot_status(&local_path).await?;
        self.snapshots.upload(&local_path).await?;

        if !self.snapshots.exists().await? {
            return Err(AgentError::external(
                "save_snapshot",
                anyhow::anyhow!("upload did not confirm after re-list"),
            ));
        }

        tokio::fs::remove_file(&local_path)
            .await
            .map_err(|e| AgentError::external("remove local snapshot", e.into()))?;

        Ok(ActionOutcome::SnapshotSaved)
    }

    /// Enumerate and delete the contents of the data directory; a missing
    /// directory is a no-op (spec.md §4.2, §8 property 6). Must succeed
    /// even when its contents were created by the etcd principal, hence
    /// the privileged removal path inside `clear_directory`.
    pub async fn clean_data_dir(&self) -> Result<ActionOutcome, AgentError> {
        clear_directory(Path::new(&self.config.data_dir)).await?;
        Ok(ActionOutcome::Cleaned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common_fs::clear_directory;

    #[tokio::test]
    async fn clean_data_dir_on_missing_directory_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");
        clear_directory(&missing).await.unwrap();
    }

    #[tokio::test]
    async fn clean_data_dir_empties_but_keeps_the_directory() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("a.txt"), b"x").await.unwrap();
        tokio::fs::create_dir(dir.path().join("sub")).await.unwrap();
        tokio::fs::write(dir.path().join("sub/b.txt"), b"y").await.unwrap();

        clear_directory(dir.path()).await.unwrap();

        let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
        assert!(dir.path().exists());
    }
}
