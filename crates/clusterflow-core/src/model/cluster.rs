//! Cluster-wide configuration

use super::pool::NodePoolSpec;
use serde::{Deserialize, Serialize};

/// The declarative specification of a whole cluster.
///
/// Deserialized from the user's YAML config. Field-level validation
/// (instance types, locations, CIDR well-formedness) happens in the
/// loader before any orchestration starts; the orchestrator treats
/// the spec as immutable input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterSpec {
    pub cluster_name: String,

    /// Hetzner Cloud API token. Usually injected via the CLI from the
    /// `HCLOUD_TOKEN` environment variable rather than written to disk.
    #[serde(default)]
    pub hcloud_token: String,

    pub kubeconfig_path: String,

    pub k3s_version: String,

    pub public_ssh_key_path: String,

    pub private_ssh_key_path: String,

    #[serde(default = "default_ssh_port")]
    pub ssh_port: u16,

    #[serde(default)]
    pub use_ssh_agent: bool,

    /// Reuse an existing private network instead of creating one.
    #[serde(default)]
    pub existing_network_name: Option<String>,

    #[serde(default = "default_open_networks")]
    pub ssh_allowed_networks: Vec<String>,

    #[serde(default = "default_open_networks")]
    pub api_allowed_networks: Vec<String>,

    #[serde(default = "default_image")]
    pub image: String,

    #[serde(default)]
    pub autoscaling_image: Option<String>,

    #[serde(default)]
    pub additional_packages: Vec<String>,

    #[serde(default)]
    pub post_create_commands: Vec<String>,

    #[serde(default = "default_snapshot_os")]
    pub snapshot_os: String,

    #[serde(default = "default_private_network_subnet")]
    pub private_network_subnet: String,

    /// When true the API load balancer gets no public interface.
    #[serde(default)]
    pub private_api_load_balancer: bool,

    #[serde(default = "default_cluster_cidr")]
    pub cluster_cidr: String,

    #[serde(default = "default_service_cidr")]
    pub service_cidr: String,

    #[serde(default = "default_cluster_dns")]
    pub cluster_dns: String,

    #[serde(default = "default_true")]
    pub enable_public_net_ipv4: bool,

    #[serde(default = "default_true")]
    pub enable_public_net_ipv6: bool,

    /// Encrypt node-to-node traffic (selects the wireguard flannel backend).
    #[serde(default)]
    pub enable_encryption: bool,

    #[serde(default)]
    pub schedule_workloads_on_masters: bool,

    #[serde(default)]
    pub api_server_hostname: Option<String>,

    #[serde(default)]
    pub kube_api_server_args: Vec<String>,

    #[serde(default)]
    pub kube_scheduler_args: Vec<String>,

    #[serde(default)]
    pub kube_controller_manager_args: Vec<String>,

    #[serde(default)]
    pub kubelet_args: Vec<String>,

    #[serde(default)]
    pub kube_proxy_args: Vec<String>,

    #[serde(default = "default_ccm_manifest_url")]
    pub cloud_controller_manager_manifest_url: String,

    #[serde(default = "default_csi_manifest_url")]
    pub csi_driver_manifest_url: String,

    #[serde(default = "default_suc_manifest_url")]
    pub system_upgrade_controller_manifest_url: String,

    #[serde(default)]
    pub debug: bool,

    pub masters_pool: NodePoolSpec,

    #[serde(default)]
    pub worker_node_pools: Vec<NodePoolSpec>,
}

fn default_ssh_port() -> u16 {
    22
}

fn default_open_networks() -> Vec<String> {
    vec!["0.0.0.0/0".to_string()]
}

fn default_image() -> String {
    "ubuntu-22.04".to_string()
}

fn default_snapshot_os() -> String {
    "default".to_string()
}

fn default_private_network_subnet() -> String {
    "10.0.0.0/16".to_string()
}

fn default_cluster_cidr() -> String {
    "10.244.0.0/16".to_string()
}

fn default_service_cidr() -> String {
    "10.43.0.0/16".to_string()
}

fn default_cluster_dns() -> String {
    "10.43.0.10".to_string()
}

fn default_true() -> bool {
    true
}

fn default_ccm_manifest_url() -> String {
    "https://github.com/hetznercloud/hcloud-cloud-controller-manager/releases/download/v1.19.0/ccm-networks.yaml".to_string()
}

fn default_csi_manifest_url() -> String {
    "https://raw.githubusercontent.com/hetznercloud/csi-driver/v2.6.0/deploy/kubernetes/hcloud-csi.yml".to_string()
}

fn default_suc_manifest_url() -> String {
    "https://raw.githubusercontent.com/rancher/system-upgrade-controller/master/manifests/system-upgrade-controller.yaml".to_string()
}

impl ClusterSpec {
    pub fn master_count(&self) -> u32 {
        self.masters_pool.instance_count
    }

    /// More than one master means the control plane is fronted by a
    /// load balancer and the API firewall rule is opened.
    pub fn is_ha(&self) -> bool {
        self.master_count() > 1
    }

    /// Worker pools provisioned up front (autoscaling pools are created
    /// reactively by the cluster autoscaler).
    pub fn static_worker_pools(&self) -> Vec<&NodePoolSpec> {
        self.worker_node_pools
            .iter()
            .filter(|p| !p.autoscaling_enabled())
            .collect()
    }

    pub fn autoscaling_worker_pools(&self) -> Vec<&NodePoolSpec> {
        self.worker_node_pools
            .iter()
            .filter(|p| p.autoscaling_enabled())
            .collect()
    }

    /// Pool image with fallback to the cluster-wide image.
    pub fn image_for(&self, pool: &NodePoolSpec) -> String {
        pool.image.clone().unwrap_or_else(|| self.image.clone())
    }

    /// Pool package list with fallback to the cluster-wide list.
    pub fn packages_for<'a>(&'a self, pool: &'a NodePoolSpec) -> &'a [String] {
        pool.additional_packages
            .as_deref()
            .unwrap_or(&self.additional_packages)
    }

    /// Pool post-create commands with fallback to the cluster-wide list.
    pub fn post_create_for<'a>(&'a self, pool: &'a NodePoolSpec) -> &'a [String] {
        pool.post_create_commands
            .as_deref()
            .unwrap_or(&self.post_create_commands)
    }
}
