//! etcd member lifecycle agent
//!
//! A single-shot, single-threaded process re-invoked periodically by an
//! external scheduler. One invocation executes exactly one verb
//! (`save|replace|reconfigure|check`) to completion and exits. All
//! cross-tick state lives on disk; there is no in-process event loop.

mod actions;
mod check;
mod clock_store;
mod common_fs;
mod config;
mod decider;
mod error;
mod etcd_client;
mod node_probe;
mod observer;
mod peers;
mod service_controller;
mod snapshot_store;

use actions::{ActionOutcome, Actions};
use check::run_check;
use clock_store::{MemberStatus, StateStore, SystemClock};
use common::init_logging;
use config::AgentConfig;
use decider::{decide, RecoveryAction};
use error::AgentError;
use etcd_client::EtcdClient;
use node_probe::{Ec2TagProbe, NodeProbe, SentinelFileProbe};
use observer::Observer;
use peers::PeerDirectory;
use service_controller::ServiceController;
use snapshot_store::SnapshotStore;
use std::path::Path;
use tracing::{error, info};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let _guard = init_logging("etcdadm-member");

    let verb = std::env::args().nth(1).unwrap_or_default();

    if let Err(e) = run(&verb).await {
        error!(verb = %verb, error = %e, "etcdadm-member failed");
        eprintln!("{e}");
        std::process::exit(1);
    }
}

async fn run(verb: &str) -> Result<(), AgentError> {
    let config = AgentConfig::from_env()?;
    let peers = PeerDirectory::new(&config)?;
    let state = StateStore::new(&config.state_files_dir);
    let clock = SystemClock;
    let client = EtcdClient::new(config.tls.clone());
    let snapshots = SnapshotStore::from_uri(&config.cluster_snapshots_uri)?;
    let service = ServiceController::new(&config.state_files_dir, &config.systemd_service_name);

    let node_probe: Box<dyn NodeProbe> = match &config.node_probe_sentinel_file {
        Some(path) => Box::new(SentinelFileProbe::new(path.clone())),
        None => Box::new(Ec2TagProbe::new(config.kubernetes_cluster.clone()).await),
    };

    let observer = Observer {
        client: &client,
        peers: &peers,
        state: &state,
        clock: &clock,
        node_probe: node_probe.as_ref(),
        member_index: config.member_index as usize,
        member_failure_limit_secs: config.member_failure_period_limit.as_secs(),
        cluster_failure_limit_secs: config.cluster_failure_period_limit.as_secs(),
    };

    let actions = Actions {
        config: &config,
        client: &client,
        peers: &peers,
        state: &state,
        snapshots: &snapshots,
        service: &service,
    };

    match verb {
        "save" => {
            let obs = observer.observe().await?;
            let outcome = actions.save_snapshot(obs.h_cluster).await?;
            log_outcome(outcome);
            Ok(())
        }
        "replace" => {
            let outcome = actions.replace_failed().await?;
            log_outcome(outcome);
            Ok(())
        }
        "reconfigure" => reconfigure(&config, &observer, &actions, &service, &state).await,
        "check" => run_check(&observer).await,
        "" => Err(AgentError::UnknownVerb("".to_string())),
        "bootstrap" => {
            log_outcome(actions.bootstrap().await?);
            Ok(())
        }
        "clean_data_dir" => {
            log_outcome(actions.clean_data_dir().await?);
            Ok(())
        }
        other => Err(AgentError::UnknownVerb(other.to_string())),
    }
}

/// Validates the three directories named in spec.md §4.1 exist and are
/// writable before the Decider runs; any failure is fatal.
async fn member_validate(config: &AgentConfig, state: &StateStore) -> Result<(), AgentError> {
    state.ensure_dirs(Path::new(&config.snapshot_dir())).await?;

    let data_dir = Path::new(&config.data_dir);
    tokio::fs::create_dir_all(data_dir)
        .await
        .map_err(|e| AgentError::Precondition(format!("cannot create data dir {data_dir:?}: {e}")))?;

    for dir in [state.dir(), Path::new(&config.snapshot_dir()), data_dir] {
        let metadata = tokio::fs::metadata(dir)
            .await
            .map_err(|e| AgentError::Precondition(format!("{dir:?} missing: {e}")))?;
        if metadata.permissions().readonly() {
            return Err(AgentError::Precondition(format!("{dir:?} is not writable")));
        }
    }

    Ok(())
}

async fn reconfigure(
    config: &AgentConfig,
    observer: &Observer<'_>,
    actions: &Actions<'_>,
    service: &ServiceController,
    state: &StateStore,
) -> Result<(), AgentError> {
    member_validate(config, state).await?;

    let obs = observer.observe().await?;
    let status = state.status().await;
    let decision = decide(&obs, status);

    info!(
        h_cluster = obs.h_cluster,
        h_local = obs.h_local,
        u_local = obs.u_local,
        running_count = obs.running_count,
        member_count = obs.member_count,
        status = ?status,
        action = ?decision.action,
        "Reconfiguration decision"
    );

    if let Some(unit_type) = decision.unit_type_write {
        service
            .write_drop_in(peers_name(config, observer), unit_type)
            .await?;
    }

    let outcome = match decision.action {
        RecoveryAction::Bootstrap => actions.bootstrap().await?,
        RecoveryAction::RestoreLocal => {
            let path = format!(
                "{}/{}.db",
                config.snapshot_dir(),
                peers_name(config, observer)
            );
            actions.restore_from_local_snapshot(&path).await?
        }
        RecoveryAction::ReplaceFailed => actions.replace_failed().await?,
        RecoveryAction::ReloadOnly => {
            service.reload().await?;
            ActionOutcome::Reloaded
        }
        RecoveryAction::NoOp(reason) => {
            info!(reason, "No action taken");
            ActionOutcome::NoOp
        }
    };

    log_outcome(outcome);

    if matches!(outcome, ActionOutcome::Bootstrapped { .. } | ActionOutcome::Restored) {
        state.set_status(MemberStatus::Started).await?;
    }

    Ok(())
}

fn peers_name<'a>(config: &AgentConfig, observer: &Observer<'a>) -> &'a str {
    observer.peers.name(config.member_index as usize)
}

fn log_outcome(outcome: ActionOutcome) {
    info!(outcome = ?outcome, "Action complete");
}
