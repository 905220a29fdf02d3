//! The set of servers a provisioning run converged on.
//!
//! Provisioning tasks run concurrently and each returns its own slice of
//! the cluster; results are gathered and merged into one [`ClusterTopology`]
//! after the fan-out completes, so no shared mutable state crosses tasks.

use clusterflow_cloud::Server;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    Master,
    Worker,
}

impl NodeRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeRole::Master => "master",
            NodeRole::Worker => "worker",
        }
    }
}

/// All servers of the cluster, masters ordered by index and workers
/// grouped by pool.
#[derive(Debug, Default)]
pub struct ClusterTopology {
    pub masters: Vec<Server>,
    pub workers: BTreeMap<String, Vec<Server>>,
}

impl ClusterTopology {
    /// First master, the bootstrap anchor of the control plane.
    pub fn first_master(&self) -> Option<&Server> {
        self.masters.first()
    }

    pub fn all_workers(&self) -> impl Iterator<Item = &Server> {
        self.workers.values().flatten()
    }

    pub fn node_count(&self) -> usize {
        self.masters.len() + self.workers.values().map(Vec::len).sum::<usize>()
    }

    /// Merge a concurrently produced slice into the topology. Masters are
    /// re-sorted by positional index afterwards so join order is
    /// deterministic.
    pub fn absorb_master(&mut self, server: Server) {
        self.masters.push(server);
        sort_by_index(&mut self.masters);
    }

    pub fn absorb_worker(&mut self, pool: &str, server: Server) {
        let servers = self.workers.entry(pool.to_string()).or_default();
        servers.push(server);
        sort_by_index(servers);
    }
}

/// Trailing number of a node name; `master10` must sort after `master2`,
/// which plain name order gets wrong.
fn trailing_index(name: &str) -> u32 {
    let stem = name.trim_end_matches(|c: char| c.is_ascii_digit());
    name[stem.len()..].parse().unwrap_or(0)
}

fn sort_by_index(servers: &mut [Server]) {
    servers.sort_by(|a, b| {
        trailing_index(&a.name)
            .cmp(&trailing_index(&b.name))
            .then_with(|| a.name.cmp(&b.name))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server(name: &str) -> Server {
        Server {
            id: 0,
            name: name.to_string(),
            public_ipv4: None,
            private_ip: None,
        }
    }

    #[test]
    fn masters_sorted_regardless_of_arrival() {
        let mut topology = ClusterTopology::default();
        topology.absorb_master(server("demo-cpx21-master2"));
        topology.absorb_master(server("demo-cpx21-master1"));
        topology.absorb_master(server("demo-cpx21-master3"));
        assert_eq!(
            topology.first_master().map(|s| s.name.as_str()),
            Some("demo-cpx21-master1")
        );
    }

    #[test]
    fn double_digit_masters_sort_by_index() {
        let mut topology = ClusterTopology::default();
        for i in [10, 2, 11, 1, 3] {
            topology.absorb_master(server(&format!("demo-cpx21-master{i}")));
        }
        let names: Vec<_> = topology.masters.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            [
                "demo-cpx21-master1",
                "demo-cpx21-master2",
                "demo-cpx21-master3",
                "demo-cpx21-master10",
                "demo-cpx21-master11",
            ]
        );
    }

    #[test]
    fn node_count_spans_pools() {
        let mut topology = ClusterTopology::default();
        topology.absorb_master(server("m1"));
        topology.absorb_worker("small", server("w1"));
        topology.absorb_worker("big", server("w2"));
        assert_eq!(topology.node_count(), 3);
        assert_eq!(topology.all_workers().count(), 2);
    }
}
