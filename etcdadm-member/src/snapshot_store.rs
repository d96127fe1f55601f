//! Snapshot Store (C4)
//!
//! Upload/download/exists against a single named blob, `snapshot.db`, in an
//! object-store URI. Backed by the `object_store` crate against S3 (the
//! pack's own idiomatic choice for blob storage, see
//! `openobserve-openobserve/src/infra/src/storage/remote.rs`), so
//! `AWS_DEFAULT_REGION`/`AWS_ACCESS_KEY_ID`/`AWS_SECRET_ACCESS_KEY` are
//! picked up the way the builder natively reads them.

use crate::error::AgentError;
use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};
use std::path::Path;
use std::sync::Arc;
use tokio::fs;

const SNAPSHOT_OBJECT_NAME: &str = "snapshot.db";

pub struct SnapshotStore {
    store: Arc<dyn ObjectStore>,
    path: ObjectPath,
}

impl SnapshotStore {
    /// `uri` is an `s3://bucket/prefix` URI; the object always lives at
    /// `<prefix>/snapshot.db` (spec.md §3 invariant 5, §6).
    pub fn from_uri(uri: &str) -> Result<Self, AgentError> {
        let (bucket, prefix) = parse_s3_uri(uri)?;

        let mut builder = AmazonS3Builder::from_env().with_bucket_name(&bucket);
        if let Ok(region) = std::env::var("AWS_DEFAULT_REGION") {
            builder = builder.with_region(region);
        }
        let store = builder
            .build()
            .map_err(|e| AgentError::external("object store init", e.into()))?;

        let path = if prefix.is_empty() {
            ObjectPath::from(SNAPSHOT_OBJECT_NAME)
        } else {
            ObjectPath::from(format!("{prefix}/{SNAPSHOT_OBJECT_NAME}"))
        };

        Ok(Self {
            store: Arc::new(store),
            path,
        })
    }

    pub async fn exists(&self) -> Result<bool, AgentError> {
        match self.store.head(&self.path).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(AgentError::external("snapshot exists", e.into())),
        }
    }

    pub async fn upload(&self, local_path: &str) -> Result<(), AgentError> {
        let bytes = fs::read(local_path)
            .await
            .map_err(|e| AgentError::external("read local snapshot", e.into()))?;

        self.store
            .put(&self.path, PutPayload::from(Bytes::from(bytes)))
            .await
            .map_err(|e| AgentError::external("snapshot upload", e.into()))?;

        if !self.exists().await? {
            return Err(AgentError::external(
                "snapshot upload",
                anyhow::anyhow!("object missing immediately after upload"),
            ));
        }
        Ok(())
    }

    pub async fn download(&self, local_path: &str) -> Result<(), AgentError> {
        if let Some(parent) = Path::new(local_path).parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| AgentError::external("create snapshot dir", e.into()))?;
        }

        let result = self
            .store
            .get(&self.path)
            .await
            .map_err(|e| AgentError::external("snapshot download", e.into()))?;
        let bytes = result
            .bytes()
            .await
            .map_err(|e| AgentError::external("snapshot download", e.into()))?;

        fs::write(local_path, bytes)
            .await
            .map_err(|e| AgentError::external("write local snapshot", e.into()))?;
        Ok(())
    }
}

fn parse_s3_uri(uri: &str) -> Result<(String, String), AgentError> {
    let rest = uri.strip_prefix("s3://").ok_or_else(|| {
        AgentError::Configuration(format!(
            "ETCDADM_CLUSTER_SNAPSHOTS_S3_URI must start with s3://, got {uri}"
        ))
    })?;

    match rest.split_once('/') {
        Some((bucket, prefix)) => Ok((bucket.to_string(), prefix.trim_end_matches('/').to_string())),
        None => Ok((rest.to_string(), String::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bucket_and_prefix() {
        let (bucket, prefix) = parse_s3_uri("s3://my-bucket/clusters/prod").unwrap();
        assert_eq!(bucket, "my-bucket");
        assert_eq!(prefix, "clusters/prod");
    }

    #[test]
    fn parses_bucket_with_no_prefix() {
        let (bucket, prefix) = parse_s3_uri("s3://my-bucket").unwrap();
        assert_eq!(bucket, "my-bucket");
        assert_eq!(prefix, "");
    }

    #[test]
    fn rejects_non_s3_scheme() {
        assert!(parse_s3_uri("gs://my-bucket").is_err());
    }
}
