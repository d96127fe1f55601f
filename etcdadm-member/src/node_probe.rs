//! Peer-node probe
//!
//! spec.md §1 scopes the concrete AWS/cloud discovery mechanism out of the
//! core, specifying only the contract C8 consumes: `running_count ∈
//! [0,N]`. This module is the narrow seam that contract is implemented
//! behind — a `NodeProbe` trait with a production (EC2 tag) and a test
//! (sentinel file) implementation, exactly as spec.md §4.3 describes.

use crate::error::AgentError;
use async_trait::async_trait;
use tokio::fs;
use tracing::{error, warn};

#[async_trait]
pub trait NodeProbe: Send + Sync {
    async fn running_count(&self) -> Result<u32, AgentError>;
}

/// Test-mode probe: reads an integer from a sentinel file.
///
/// spec.md §9 Open Question: "treats a missing sentinel file in test mode
/// as value 0 after logging an error, allowing the Decider to proceed —
/// this may mask configuration errors." Carried forward unresolved, per
/// instructions not to guess at Open Questions.
pub struct SentinelFileProbe {
    path: String,
}

impl SentinelFileProbe {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl NodeProbe for SentinelFileProbe {
    async fn running_count(&self) -> Result<u32, AgentError> {
        match fs::read_to_string(&self.path).await {
            Ok(contents) => contents.trim().parse().map_err(|_| {
                AgentError::external(
                    "node probe",
                    anyhow::anyhow!("sentinel file {} does not contain an integer", self.path),
                )
            }),
            Err(e) => {
                error!(path = %self.path, error = %e, "Sentinel file missing, treating running_count as 0");
                Ok(0)
            }
        }
    }
}

/// Production probe: sums EC2 instances matching two independent tag
/// schemas against the `KUBERNETES_CLUSTER` cohort value.
///
/// spec.md §9 Open Question: "if an instance matches both schemas
/// simultaneously it is double-counted. Intended behavior is unclear." The
/// two counts are summed without deduplication, reproducing that behavior
/// rather than fixing it.
pub struct Ec2TagProbe {
    client: aws_sdk_ec2::Client,
    kubernetes_cluster: String,
}

impl Ec2TagProbe {
    pub async fn new(kubernetes_cluster: impl Into<String>) -> Self {
        let config = aws_config::load_from_env().await;
        Self {
            client: aws_sdk_ec2::Client::new(&config),
            kubernetes_cluster: kubernetes_cluster.into(),
        }
    }

    async fn count_running(&self, filters: Vec<aws_sdk_ec2::types::Filter>) -> Result<u32, AgentError> {
        let resp = self
            .client
            .describe_instances()
            .set_filters(Some(filters))
            .send()
            .await
            .map_err(|e| AgentError::external("ec2 describe-instances", e.into()))?;

        let count = resp
            .reservations()
            .iter()
            .flat_map(|r| r.instances())
            .filter(|i| {
                i.state()
                    .and_then(|s| s.name())
                    .map(|n| n.as_str() == "running")
                    .unwrap_or(false)
            })
            .count();

        Ok(count as u32)
    }

    fn legacy_tag_filters(&self) -> Vec<aws_sdk_ec2::types::Filter> {
        vec![
            aws_sdk_ec2::types::Filter::builder()
                .name("tag:KubernetesCluster")
                .values(&self.kubernetes_cluster)
                .build(),
            aws_sdk_ec2::types::Filter::builder()
                .name("instance-state-name")
                .values("running")
                .build(),
        ]
    }

    fn kube_tag_filters(&self) -> Vec<aws_sdk_ec2::types::Filter> {
        vec![
            aws_sdk_ec2::types::Filter::builder()
                .name(format!("tag:kubernetes.io/cluster/{}", self.kubernetes_cluster))
                .values("owned")
                .build(),
            aws_sdk_ec2::types::Filter::builder()
                .name("instance-state-name")
                .values("running")
                .build(),
        ]
    }
}

#[async_trait]
impl NodeProbe for Ec2TagProbe {
    async fn running_count(&self) -> Result<u32, AgentError> {
        let legacy = self.count_running(self.legacy_tag_filters()).await?;
        let kube = self.count_running(self.kube_tag_filters()).await?;

        if legacy > 0 && kube > 0 {
            warn!(
                legacy,
                kube, "Instances matched both tag schemas; counts are summed, not deduplicated"
            );
        }

        Ok(legacy + kube)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sentinel_file_reads_integer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("running_count");
        fs::write(&path, "3").await.unwrap();

        let probe = SentinelFileProbe::new(path.to_string_lossy().to_string());
        assert_eq!(probe.running_count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn missing_sentinel_file_defaults_to_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does-not-exist");

        let probe = SentinelFileProbe::new(path.to_string_lossy().to_string());
        assert_eq!(probe.running_count().await.unwrap(), 0);
    }
}
