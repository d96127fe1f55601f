//! Peer Directory (C2)
//!
//! Derives member name, peer URL, and client URL from the two configured
//! comma-separated strings. Index *i* is the position of the entry in the
//! list, not anything looked up by name — `ETCD_INITIAL_CLUSTER` and
//! `ETCD_ENDPOINTS` must be kept in the same order by whoever configures
//! the cluster.

use crate::config::AgentConfig;
use crate::error::AgentError;

/// Parse `name1=peer_url1,name2=peer_url2,...` preserving order.
pub fn parse_initial_cluster(initial_cluster: &str) -> Vec<(String, String)> {
    initial_cluster
        .split(',')
        .filter_map(|entry| {
            let mut parts = entry.splitn(2, '=');
            let name = parts.next()?.trim();
            let peer_url = parts.next()?.trim();
            if name.is_empty() || peer_url.is_empty() {
                None
            } else {
                Some((name.to_string(), peer_url.to_string()))
            }
        })
        .collect()
}

/// Parse `url1,url2,...` preserving order.
pub fn parse_endpoints(endpoints: &str) -> Vec<String> {
    endpoints
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

pub struct PeerDirectory {
    names: Vec<String>,
    peer_urls: Vec<String>,
    client_urls: Vec<String>,
}

impl PeerDirectory {
    pub fn new(config: &AgentConfig) -> Result<Self, AgentError> {
        let cluster = parse_initial_cluster(&config.initial_cluster);
        let names: Vec<String> = cluster.iter().map(|(n, _)| n.clone()).collect();
        let peer_urls: Vec<String> = cluster.into_iter().map(|(_, u)| u).collect();
        let client_urls = parse_endpoints(&config.endpoints);

        let n = config.member_count as usize;
        if names.len() != n || client_urls.len() != n {
            return Err(AgentError::Configuration(format!(
                "ETCD_INITIAL_CLUSTER has {} entries and ETCD_ENDPOINTS has {}, expected {} (ETCDADM_MEMBER_COUNT)",
                names.len(),
                client_urls.len(),
                n
            )));
        }
        if config.member_index as usize >= n {
            return Err(AgentError::Configuration(format!(
                "ETCDADM_MEMBER_INDEX={} is out of range for ETCDADM_MEMBER_COUNT={}",
                config.member_index, n
            )));
        }

        Ok(Self {
            names,
            peer_urls,
            client_urls,
        })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn name(&self, i: usize) -> &str {
        &self.names[i]
    }

    pub fn peer_url(&self, i: usize) -> &str {
        &self.peer_urls[i]
    }

    pub fn client_url(&self, i: usize) -> &str {
        &self.client_urls[i]
    }

    /// `(i+1) mod N` — the "next peer" spec §4.1/§4.3 queries for unstarted
    /// detection and for the replace-failed member lookup.
    pub fn next(&self, i: usize) -> usize {
        (i + 1) % self.len()
    }

    /// Quorum: `Q = floor(N/2) + 1`.
    pub fn quorum(&self) -> usize {
        quorum(self.len())
    }
}

pub fn quorum(n: usize) -> usize {
    n / 2 + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quorum_matches_formula_for_small_n() {
        assert_eq!(quorum(1), 1);
        assert_eq!(quorum(2), 2);
        assert_eq!(quorum(3), 2);
        assert_eq!(quorum(4), 3);
        assert_eq!(quorum(5), 3);
    }

    #[test]
    fn quorum_matches_formula_for_all_n_up_to_15() {
        for n in 1..=15usize {
            assert_eq!(quorum(n), n / 2 + 1, "mismatch at n={n}");
        }
    }

    #[test]
    fn parse_initial_cluster_preserves_order() {
        let parsed = parse_initial_cluster("etcd0=http://a:2380,etcd1=http://b:2380");
        assert_eq!(
            parsed,
            vec![
                ("etcd0".to_string(), "http://a:2380".to_string()),
                ("etcd1".to_string(), "http://b:2380".to_string()),
            ]
        );
    }

    #[test]
    fn next_wraps_around() {
        let config = test_config();
        let dir = PeerDirectory::new(&config).unwrap();
        assert_eq!(dir.next(0), 1);
        assert_eq!(dir.next(1), 2);
        assert_eq!(dir.next(2), 0);
    }

    fn test_config() -> AgentConfig {
        AgentConfig {
            member_count: 3,
            member_index: 0,
            cluster_snapshots_uri: "s3://bucket/prefix".to_string(),
            initial_cluster: "etcd0=http://a:2380,etcd1=http://b:2380,etcd2=http://c:2380"
                .to_string(),
            endpoints: "http://a:2379,http://b:2379,http://c:2379".to_string(),
            kubernetes_cluster: "test".to_string(),
            etcd_version: "3.2.10".to_string(),
            systemd_service_name: "etcd-member-0".to_string(),
            state_files_dir: "/tmp/etcd0-state".to_string(),
            data_dir: "/tmp/etcd0-data".to_string(),
            cluster_failure_period_limit: std::time::Duration::from_secs(10),
            member_failure_period_limit: std::time::Duration::from_secs(10),
            tls: None,
            node_probe_sentinel_file: None,
        }
    }
}
