//! Etcd Client Adapter (C3)
//!
//! Typed wrapper over the `etcdctl` binary. Every call takes the endpoint
//! explicitly — there is no ambient "current endpoint" the way a shell
//! script would rely on `ETCDCTL_ENDPOINT`. We go further and actively
//! unset that variable before spawning, so a leaked value from the parent
//! environment can never override an explicit `--endpoints` argument
//! (spec.md §6).

use crate::config::EtcdTlsConfig;
use crate::error::AgentError;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct MemberInfo {
    pub id: String,
    pub name: String,
    pub peer_url: String,
    pub is_started: bool,
}

pub struct EtcdClient {
    tls: Option<EtcdTlsConfig>,
    timeout: Duration,
}

impl EtcdClient {
    pub fn new(tls: Option<EtcdTlsConfig>) -> Self {
        Self {
            tls,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn tls_args(&self, args: &mut Vec<String>) {
        if let Some(tls) = &self.tls {
            args.push(format!("--cacert={}", tls.ca_cert));
            args.push(format!("--cert={}", tls.cert));
            args.push(format!("--key={}", tls.key));
        }
    }

    async fn run(&self, op: &str, mut args: Vec<String>) -> Result<String, AgentError> {
        self.tls_args(&mut args);
        debug!(op, ?args, "etcdctl");

        let fut = Command::new("etcdctl")
            .env_remove("ETCDCTL_ENDPOINT")
            .env("ETCDCTL_API", "3")
            .args(&args)
            .stdin(Stdio::null())
            .output();

        let output = tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| AgentError::external(op.to_string(), anyhow::anyhow!("timed out")))?
            .map_err(|e| AgentError::external(op.to_string(), e.into()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(AgentError::external(
                op.to_string(),
                anyhow::anyhow!("etcdctl exited {:?}: {stderr}", output.status.code()),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// `member list` against the given endpoint, parsed in the
    /// `-w simple` column format: `id, status, name, peerURLs, clientURLs,
    /// isLearner`. etcd 3.2 predates the learner column and the "unstarted"
    /// status; this adapter treats a blank `name` column as unstarted,
    /// which is how pre-3.4 etcd reports a member that has an entry but has
    /// never contacted the cluster.
    pub async fn member_list(&self, endpoint: &str) -> Result<Vec<MemberInfo>, AgentError> {
        let out = self
            .run(
                "member list",
                vec![
                    "member".into(),
                    "list".into(),
                    format!("--endpoints={endpoint}"),
                    "-w".into(),
                    "simple".into(),
                ],
            )
            .await?;

        Ok(out
            .lines()
            .filter_map(|line| {
                let parts: Vec<&str> = line.split(',').map(|s| s.trim()).collect();
                if parts.len() < 4 {
                    return None;
                }
                Some(MemberInfo {
                    id: parts[0].to_string(),
                    is_started: !parts[2].is_empty(),
                    name: parts[2].to_string(),
                    peer_url: parts[3].to_string(),
                })
            })
            .collect())
    }

    pub async fn member_add(
        &self,
        endpoint: &str,
        name: &str,
        peer_url: &str,
    ) -> Result<(), AgentError> {
        self.run(
            "member add",
            vec![
                "member".into(),
                "add".into(),
                name.into(),
                format!("--peer-urls={peer_url}"),
                format!("--endpoints={endpoint}"),
            ],
        )
        .await?;
        Ok(())
    }

    pub async fn member_remove(&self, endpoint: &str, id: &str) -> Result<(), AgentError> {
        self.run(
            "member remove",
            vec![
                "member".into(),
                "remove".into(),
                id.into(),
                format!("--endpoints={endpoint}"),
            ],
        )
        .await?;
        Ok(())
    }

    /// Success iff the response contains the literal marker etcd has used
    /// since 3.0: `"<endpoint> is healthy"`.
    pub async fn endpoint_health(&self, endpoint: &str) -> bool {
        self.run(
            "endpoint health",
            vec![
                "endpoint".into(),
                "health".into(),
                format!("--endpoints={endpoint}"),
            ],
        )
        .await
        .map(|out| out.contains("is healthy"))
        .unwrap_or(false)
    }

    /// `endpoint status -w json`, returning `(leader_id, member_id)` so the
    /// caller can decide leadership without re-parsing JSON itself.
    pub async fn endpoint_status(&self, endpoint: &str) -> Result<EndpointStatus, AgentError> {
        let out = self
            .run(
                "endpoint status",
                vec![
                    "endpoint".into(),
                    "status".into(),
                    format!("--endpoints={endpoint}"),
                    "-w".into(),
                    "json".into(),
                ],
            )
            .await?;

        let parsed: Vec<RawEndpointStatus> = serde_json::from_str(&out).map_err(|e| {
            AgentError::external("endpoint status", anyhow::anyhow!("bad json: {e}"))
        })?;
        let entry = parsed
            .into_iter()
            .next()
            .ok_or_else(|| AgentError::external("endpoint status", anyhow::anyhow!("empty response")))?;

        Ok(EndpointStatus {
            leader: entry.status.leader,
            member_id: entry.status.header.member_id,
        })
    }

    pub async fn snapshot_save(&self, endpoint: &str, path: &str) -> Result<(), AgentError> {
        self.run(
            "snapshot save",
            vec![
                "snapshot".into(),
                "save".into(),
                path.into(),
                format!("--endpoints={endpoint}"),
            ],
        )
        .await?;
        Ok(())
    }

    pub async fn snapshot_status(&self, path: &str) -> Result<(), AgentError> {
        self.run(
            "snapshot status",
            vec!["snapshot".into(), "status".into(), path.into()],
        )
        .await?;
        Ok(())
    }

    /// Restore writes to `out_dir` (the caller is responsible for it being
    /// a fresh `<data_dir>-restored` path, per spec.md §4.2) rather than
    /// the live data directory directly.
    pub async fn snapshot_restore(
        &self,
        path: &str,
        out_dir: &str,
        name: &str,
        peer_url: &str,
        initial_cluster: &str,
    ) -> Result<(), AgentError> {
        self.run(
            "snapshot restore",
            vec![
                "snapshot".into(),
                "restore".into(),
                path.into(),
                format!("--data-dir={out_dir}"),
                format!("--name={name}"),
                format!("--initial-advertise-peer-urls={peer_url}"),
                format!("--initial-cluster={initial_cluster}"),
            ],
        )
        .await?;
        Ok(())
    }
}

pub struct EndpointStatus {
    pub leader: u64,
    pub member_id: u64,
}

impl EndpointStatus {
    /// Compares `Status.leader` to `Status.header.member_id`, per spec.md
    /// §4.2's leadership check for `save_snapshot`.
    pub fn is_leader(&self) -> bool {
        self.leader != 0 && self.leader == self.member_id
    }
}

#[derive(serde::Deserialize)]
struct RawEndpointStatus {
    #[serde(rename = "Status")]
    status: RawStatus,
}

#[derive(serde::Deserialize)]
struct RawStatus {
    header: RawHeader,
    leader: u64,
}

#[derive(serde::Deserialize)]
struct RawHeader {
    member_id: u64,
}
