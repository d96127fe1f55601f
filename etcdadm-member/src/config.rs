//! Agent configuration
//!
//! Everything the agent needs is read once, at startup, into an immutable
//! `AgentConfig` and threaded through the rest of the components by
//! reference. There is no ambient mutable config state after `from_env`
//! returns.

use crate::error::AgentError;
use common::ConfigExt;
use std::env;
use std::time::Duration;

/// TLS material for the etcd client. Either all three paths are present or
/// none are: spec §4.4/§6 requires all-or-none.
#[derive(Debug, Clone)]
pub struct EtcdTlsConfig {
    pub ca_cert: String,
    pub cert: String,
    pub key: String,
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub member_count: u32,
    pub member_index: u32,
    pub cluster_snapshots_uri: String,
    pub initial_cluster: String,
    pub endpoints: String,
    pub kubernetes_cluster: String,

    pub etcd_version: String,
    pub systemd_service_name: String,
    pub state_files_dir: String,
    pub data_dir: String,
    pub cluster_failure_period_limit: Duration,
    pub member_failure_period_limit: Duration,
    pub tls: Option<EtcdTlsConfig>,

    /// When set, the peer-node count comes from a sentinel file instead of
    /// querying the cloud provider. Used by tests and local dry runs.
    pub node_probe_sentinel_file: Option<String>,
}

impl AgentConfig {
    pub fn from_env() -> Result<Self, AgentError> {
        let member_index: u32 = env::var("ETCDADM_MEMBER_INDEX")
            .map_err(|_| AgentError::Configuration("ETCDADM_MEMBER_INDEX must be set".to_string()))?
            .parse()
            .map_err(|_| {
                AgentError::Configuration("ETCDADM_MEMBER_INDEX must be a number".to_string())
            })?;

        let member_count: u32 = env::var("ETCDADM_MEMBER_COUNT")
            .map_err(|_| AgentError::Configuration("ETCDADM_MEMBER_COUNT must be set".to_string()))?
            .parse()
            .map_err(|_| {
                AgentError::Configuration("ETCDADM_MEMBER_COUNT must be a number".to_string())
            })?;

        let cluster_snapshots_uri = env::var("ETCDADM_CLUSTER_SNAPSHOTS_S3_URI").map_err(|_| {
            AgentError::Configuration("ETCDADM_CLUSTER_SNAPSHOTS_S3_URI must be set".to_string())
        })?;

        let initial_cluster = env::var("ETCD_INITIAL_CLUSTER")
            .map_err(|_| AgentError::Configuration("ETCD_INITIAL_CLUSTER must be set".to_string()))?;

        let endpoints = env::var("ETCD_ENDPOINTS")
            .map_err(|_| AgentError::Configuration("ETCD_ENDPOINTS must be set".to_string()))?;

        let kubernetes_cluster = env::var("KUBERNETES_CLUSTER")
            .map_err(|_| AgentError::Configuration("KUBERNETES_CLUSTER must be set".to_string()))?;

        let default_service_name = format!("etcd-member-{}", member_index);
        let default_state_dir = format!("/var/run/etcdadm/etcd{}-state", member_index);

        let tls = Self::tls_from_env()?;

        Ok(Self {
            member_count,
            member_index,
            cluster_snapshots_uri,
            initial_cluster,
            endpoints,
            kubernetes_cluster,
            etcd_version: String::env_or("ETCD_VERSION", "3.2.10"),
            systemd_service_name: String::env_or(
                "ETCDADM_MEMBER_SYSTEMD_SERVICE_NAME",
                &default_service_name,
            ),
            state_files_dir: String::env_or("ETCDADM_STATE_FILES_DIR", &default_state_dir),
            data_dir: String::env_or("ETCD_DATA_DIR", "/var/lib/etcd"),
            cluster_failure_period_limit: Duration::from_secs(u64::env_parse(
                "ETCD_CLUSTER_FAILURE_PERIOD_LIMIT",
                10,
            )),
            member_failure_period_limit: Duration::from_secs(u64::env_parse(
                "ETCD_MEMBER_FAILURE_PERIOD_LIMIT",
                10,
            )),
            tls,
            node_probe_sentinel_file: env::var("ETCDADM_NODE_PROBE_SENTINEL_FILE").ok(),
        })
    }

    fn tls_from_env() -> Result<Option<EtcdTlsConfig>, AgentError> {
        let ca = env::var("ETCDCTL_CACERT").ok();
        let cert = env::var("ETCDCTL_CERT").ok();
        let key = env::var("ETCDCTL_KEY").ok();

        match (ca, cert, key) {
            (None, None, None) => Ok(None),
            (Some(ca_cert), Some(cert), Some(key)) => {
                Ok(Some(EtcdTlsConfig { ca_cert, cert, key }))
            }
            _ => Err(AgentError::Configuration(
                "ETCDCTL_CACERT, ETCDCTL_CERT and ETCDCTL_KEY must all be set, or none of them"
                    .to_string(),
            )),
        }
    }

    /// Path to the snapshot staging directory: `<state_dir>/snapshots`.
    pub fn snapshot_dir(&self) -> String {
        format!("{}/snapshots", self.state_files_dir)
    }
}
