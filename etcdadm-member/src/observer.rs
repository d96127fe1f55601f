//! Observer (C6)
//!
//! Computes the four observable facts the Decider (C8) branches on, plus
//! the failure-timestamp bookkeeping `check` relies on. Everything here is
//! read-only except `record_check`, which is the only place the member- and
//! cluster-failure timestamp files are written.

use crate::clock_store::{failure_exceeded, Clock, StateStore};
use crate::etcd_client::EtcdClient;
use crate::node_probe::NodeProbe;
use crate::peers::PeerDirectory;

/// The four observable facts from spec.md §4.1, plus the raw healthy count
/// `H_cluster` is derived from (kept around for logging).
#[derive(Debug, Clone, Copy)]
pub struct Observation {
    pub h_local: bool,
    pub healthy_count: usize,
    pub h_cluster: bool,
    pub running_count: u32,
    /// `N`, the fixed member count. Carried on the observation (rather than
    /// threaded separately into the Decider) so `decide` stays a function
    /// of a single value plus `MemberStatus`.
    pub member_count: u32,
    pub u_local: bool,
    pub member_failure_exceeded: bool,
    pub cluster_failure_exceeded: bool,
}

pub struct Observer<'a> {
    pub client: &'a EtcdClient,
    pub peers: &'a PeerDirectory,
    pub state: &'a StateStore,
    pub clock: &'a dyn Clock,
    pub node_probe: &'a dyn NodeProbe,
    pub member_index: usize,
    pub member_failure_limit_secs: u64,
    pub cluster_failure_limit_secs: u64,
}

impl<'a> Observer<'a> {
    /// Gathers all observations in one pass, per spec.md §4.1's "first
    /// gathers four observations" framing. Does not mutate any state file —
    /// use `record_check` for that.
    pub async fn observe(&self) -> Result<Observation, crate::error::AgentError> {
        let i = self.member_index;

        let h_local = self.client.endpoint_health(self.peers.client_url(i)).await;

        let mut healthy_count = 0usize;
        for j in 0..self.peers.len() {
            if self.client.endpoint_health(self.peers.client_url(j)).await {
                healthy_count += 1;
            }
        }
        let h_cluster = healthy_count >= self.peers.quorum();

        let running_count = self.node_probe.running_count().await?;

        let u_local = self.is_unstarted().await;

        let now = self.clock.now();
        let member_failure_exceeded = failure_exceeded(
            self.state.member_failure_time().await,
            now,
            self.member_failure_limit_secs,
        );
        let cluster_failure_exceeded = failure_exceeded(
            self.state.cluster_failure_time().await,
            now,
            self.cluster_failure_limit_secs,
        );

        Ok(Observation {
            h_local,
            healthy_count,
            h_cluster,
            running_count,
            member_count: self.peers.len() as u32,
            u_local,
            member_failure_exceeded,
            cluster_failure_exceeded,
        })
    }

    /// Connects to `client_url((i+1) mod N)`, fetches `member list`, and
    /// returns true iff some entry is both unstarted and advertises our
    /// peer URL (spec.md §4.3).
    async fn is_unstarted(&self) -> bool {
        let i = self.member_index;
        let next = self.peers.next(i);
        let my_peer_url = self.peers.peer_url(i);

        let members = match self.client.member_list(self.peers.client_url(next)).await {
            Ok(members) => members,
            Err(_) => return false,
        };

        members
            .iter()
            .any(|m| !m.is_started && m.peer_url == my_peer_url)
    }

    /// Sets/clears the member- and cluster-failure timestamps based on the
    /// current health observation. spec.md §4.3: "if local member is
    /// healthy, delete the timestamp; else create it with the current time
    /// only if absent." Analogously for cluster health.
    pub async fn record_check(&self, obs: &Observation) -> Result<(), crate::error::AgentError> {
        let now = self.clock.now();

        if obs.h_local {
            self.state.clear_member_failure_time().await?;
        } else if self.state.member_failure_time().await.is_none() {
            self.state.set_member_failure_time(now).await?;
        }

        if obs.h_cluster {
            self.state.clear_cluster_failure_time().await?;
        } else if self.state.cluster_failure_time().await.is_none() {
            self.state.set_cluster_failure_time(now).await?;
        }

        Ok(())
    }
}

