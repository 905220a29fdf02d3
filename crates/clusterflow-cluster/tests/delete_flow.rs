mod common;

use clusterflow_cluster::{create_cluster, destroy};
use common::{harness, spec_yaml};

const PUBLIC_KEY: &str = "ssh-ed25519 AAAATESTKEY user@host";

fn kubeconfig_path(dir: &tempfile::TempDir) -> String {
    dir.path().join("kubeconfig").display().to_string()
}

#[tokio::test(start_paused = true)]
async fn teardown_reverses_creation_order_and_keeps_ssh_key() {
    let dir = tempfile::tempdir().unwrap();
    let spec = spec_yaml(
        &kubeconfig_path(&dir),
        3,
        r#"worker_node_pools:
  - name: small
    instance_type: cpx21
    instance_count: 2
    location: fsn1
"#,
    );
    let h = harness(&spec);
    create_cluster(&spec, &h.effects, PUBLIC_KEY).await.unwrap();

    destroy(&spec, h.cloud.as_ref()).await.unwrap();

    let state = h.cloud.state.lock().unwrap();
    let kinds: Vec<&str> = state
        .deleted
        .iter()
        .map(|entry| entry.split(':').next().unwrap())
        .collect();

    // Load balancer first, firewall last, after everything detached.
    assert_eq!(kinds.first(), Some(&"load_balancer"));
    assert_eq!(kinds.last(), Some(&"firewall"));
    let network_pos = kinds.iter().position(|k| *k == "network").unwrap();
    let last_server = kinds.iter().rposition(|k| *k == "server").unwrap();
    assert!(last_server < network_pos);

    assert_eq!(kinds.iter().filter(|k| **k == "server").count(), 5);
    assert!(state.servers.is_empty());
    assert!(state.load_balancers.is_empty());
    assert!(state.placement_groups.is_empty());

    // The SSH key may be shared with other clusters and is never deleted.
    assert_eq!(state.ssh_keys.len(), 1);
    assert!(!kinds.contains(&"ssh_key"));
}

#[tokio::test(start_paused = true)]
async fn single_master_teardown_never_looks_for_a_load_balancer() {
    let dir = tempfile::tempdir().unwrap();
    let spec = spec_yaml(&kubeconfig_path(&dir), 1, "");
    let h = harness(&spec);
    create_cluster(&spec, &h.effects, PUBLIC_KEY).await.unwrap();
    let calls_before = h.cloud.state.lock().unwrap().find_load_balancer_calls;

    destroy(&spec, h.cloud.as_ref()).await.unwrap();

    let state = h.cloud.state.lock().unwrap();
    assert_eq!(state.find_load_balancer_calls, calls_before);
    assert!(!state
        .deleted
        .iter()
        .any(|entry| entry.starts_with("load_balancer:")));
}

#[tokio::test(start_paused = true)]
async fn network_with_default_egress_route_is_left_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let spec = spec_yaml(&kubeconfig_path(&dir), 1, "");
    let h = harness(&spec);
    h.cloud.seed_network(
        "demo",
        vec![clusterflow_cloud::Route {
            destination: "0.0.0.0/0".to_string(),
            gateway: "10.0.0.3".to_string(),
        }],
    );
    create_cluster(&spec, &h.effects, PUBLIC_KEY).await.unwrap();

    destroy(&spec, h.cloud.as_ref()).await.unwrap();

    let state = h.cloud.state.lock().unwrap();
    assert_eq!(state.networks.len(), 1);
    assert!(!state
        .deleted
        .iter()
        .any(|entry| entry.starts_with("network:")));
    // Everything else still came down.
    assert!(state.servers.is_empty());
    assert!(state.firewalls.is_empty());
}

#[tokio::test(start_paused = true)]
async fn pre_existing_network_is_never_deleted() {
    let dir = tempfile::tempdir().unwrap();
    let spec = spec_yaml(
        &kubeconfig_path(&dir),
        1,
        "existing_network_name: shared-net\n",
    );
    let h = harness(&spec);
    h.cloud.seed_network("shared-net", Vec::new());
    create_cluster(&spec, &h.effects, PUBLIC_KEY).await.unwrap();

    destroy(&spec, h.cloud.as_ref()).await.unwrap();

    let state = h.cloud.state.lock().unwrap();
    assert_eq!(state.networks.len(), 1);
    assert_eq!(state.networks[0].name, "shared-net");
}

#[tokio::test(start_paused = true)]
async fn partial_cluster_tears_down_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let spec = spec_yaml(&kubeconfig_path(&dir), 3, "");
    let h = harness(&spec);
    // Nothing was ever created; destroy must still succeed.
    destroy(&spec, h.cloud.as_ref()).await.unwrap();
    assert!(h.cloud.state.lock().unwrap().deleted.is_empty());
}
