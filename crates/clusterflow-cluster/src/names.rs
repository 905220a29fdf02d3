//! Deterministic resource naming.
//!
//! Every cloud resource the orchestrator manages derives its name from
//! the cluster name alone, so re-runs find what earlier runs created.
//! Changing any formula here orphans resources of existing clusters.

/// Network, firewall and SSH key all share the cluster name.
pub fn cluster_resource(cluster: &str) -> String {
    cluster.to_string()
}

pub fn master(cluster: &str, instance_type: &str, index: u32) -> String {
    format!("{cluster}-{instance_type}-master{}", index + 1)
}

pub fn worker(cluster: &str, instance_type: &str, pool: &str, index: u32) -> String {
    format!("{cluster}-{instance_type}-pool-{pool}-worker{}", index + 1)
}

pub fn master_placement_group(cluster: &str) -> String {
    format!("{cluster}-masters")
}

/// Worker placement groups are numbered from 1 within each pool.
pub fn worker_placement_group(cluster: &str, pool: &str, group: u32) -> String {
    format!("{cluster}-{pool}-{}", group + 1)
}

pub fn load_balancer(cluster: &str) -> String {
    format!("{cluster}-api")
}

/// Selector the API load balancer uses to target master nodes.
pub fn master_label_selector(cluster: &str) -> String {
    format!("cluster={cluster},role=master")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_names_are_one_based() {
        assert_eq!(master("demo", "cpx21", 0), "demo-cpx21-master1");
        assert_eq!(master("demo", "cpx21", 2), "demo-cpx21-master3");
        assert_eq!(
            worker("demo", "cpx31", "small", 0),
            "demo-cpx31-pool-small-worker1"
        );
    }

    #[test]
    fn placement_group_names() {
        assert_eq!(master_placement_group("demo"), "demo-masters");
        assert_eq!(worker_placement_group("demo", "small", 0), "demo-small-1");
        assert_eq!(worker_placement_group("demo", "small", 2), "demo-small-3");
    }

    #[test]
    fn load_balancer_name() {
        assert_eq!(load_balancer("demo"), "demo-api");
    }
}
