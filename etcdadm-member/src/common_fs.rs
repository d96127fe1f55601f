//! Filesystem helpers shared by the Recovery Actions
//!
//! `clear_directory` is the workspace's own idiom — see the teacher's
//! `etcd/src/cluster.rs::clear_directory` — generalized to also succeed
//! when contents were created by the etcd principal rather than the agent
//! (spec.md §4.2's `clean_data_dir` contract), by falling back to `sudo rm`.

use crate::error::AgentError;
use common::command::sudo;
use std::path::Path;
use tokio::fs;

/// Clear all contents of a directory without removing the directory
/// itself. A missing directory is a no-op.
pub async fn clear_directory(path: &Path) -> Result<(), AgentError> {
    if !path.exists() {
        return Ok(());
    }

    let mut entries = fs::read_dir(path)
        .await
        .map_err(|e| AgentError::external("read data dir", e.into()))?;

    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| AgentError::external("read data dir entry", e.into()))?
    {
        let entry_path = entry.path();
        let result = if entry_path.is_dir() {
            fs::remove_dir_all(&entry_path).await
        } else {
            fs::remove_file(&entry_path).await
        };

        if let Err(e) = result {
            if e.kind() == std::io::ErrorKind::PermissionDenied {
                sudo(&["rm", "-rf", &entry_path.to_string_lossy()])
                    .await
                    .map_err(|e| AgentError::external("sudo rm", e))?;
            } else {
                return Err(AgentError::external("remove data dir entry", e.into()));
            }
        }
    }

    Ok(())
}

/// Move the contents of `from` into `to`, both assumed to exist (`to` is
/// created by the caller beforehand). Used to make a restored snapshot
/// live by moving `<data_dir>-restored`'s contents into `<data_dir>`.
pub async fn move_dir_contents(from: &Path, to: &Path) -> Result<(), AgentError> {
    fs::create_dir_all(to)
        .await
        .map_err(|e| AgentError::external("create data dir", e.into()))?;

    let mut entries = fs::read_dir(from)
        .await
        .map_err(|e| AgentError::external("read restored dir", e.into()))?;

    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| AgentError::external("read restored dir entry", e.into()))?
    {
        let dest = to.join(entry.file_name());
        fs::rename(entry.path(), &dest)
            .await
            .map_err(|e| AgentError::external("move restored entry", e.into()))?;
    }

    Ok(())
}

/// Chown a directory (recursively) to the etcd principal. Shells out to
/// `sudo chown` the way the teacher's `postgres-patroni` crate does for
/// privileged filesystem operations it can't perform as itself.
pub async fn chown_to_etcd(dir: &Path) -> Result<(), AgentError> {
    sudo(&["chown", "-R", "etcd:etcd", &dir.to_string_lossy()])
        .await
        .map(|_| ())
        .map_err(|e| AgentError::external("chown data dir", e))
}
