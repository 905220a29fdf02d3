//! Find-or-create reconciliation of the base infrastructure.
//!
//! Network, firewall, SSH key and the API load balancer are all anchored
//! on deterministic names, so a second run converges on the resources
//! the first run created instead of duplicating them.

use crate::error::{ClusterError, Result};
use crate::names;
use clusterflow_cloud::{
    cluster_rules, CloudCompute, CloudError, CreateLoadBalancerRequest, Firewall, LoadBalancer,
    Network, SshKey,
};
use clusterflow_core::{poll_until, ClusterSpec, PollConfig};
use std::time::Duration;
use tracing::info;

const LOAD_BALANCER_IP_TIMEOUT: Duration = Duration::from_secs(120);
const LOAD_BALANCER_IP_INTERVAL: Duration = Duration::from_secs(5);

/// Shared resources every server attaches to.
#[derive(Debug, Clone)]
pub struct Infrastructure {
    pub network: Network,
    pub firewall: Firewall,
    pub ssh_key: SshKey,
}

pub async fn ensure_infrastructure(
    spec: &ClusterSpec,
    cloud: &dyn CloudCompute,
    public_key: &str,
) -> Result<Infrastructure> {
    let network = ensure_network(spec, cloud).await?;
    let firewall = ensure_firewall(spec, cloud).await?;
    let ssh_key = ensure_ssh_key(spec, cloud, public_key).await?;
    Ok(Infrastructure {
        network,
        firewall,
        ssh_key,
    })
}

async fn ensure_network(spec: &ClusterSpec, cloud: &dyn CloudCompute) -> Result<Network> {
    if let Some(existing) = &spec.existing_network_name {
        return match cloud.find_network(existing).await? {
            Some(network) => Ok(network),
            None => Err(ClusterError::Cloud(CloudError::ResourceNotFound(format!(
                "existing network {existing}"
            )))),
        };
    }

    let name = names::cluster_resource(&spec.cluster_name);
    if let Some(network) = cloud.find_network(&name).await? {
        info!(network = %name, "reusing private network");
        return Ok(network);
    }
    let zone = cloud.network_zone(&spec.masters_pool.location).await?;
    info!(network = %name, zone = %zone, "creating private network");
    Ok(cloud
        .create_network(&name, &spec.private_network_subnet, &zone)
        .await?)
}

/// The rule set is recomputed from the spec and written in full on every
/// run, so edits to allowed networks or the SSH port converge.
async fn ensure_firewall(spec: &ClusterSpec, cloud: &dyn CloudCompute) -> Result<Firewall> {
    let name = names::cluster_resource(&spec.cluster_name);
    let rules = cluster_rules(
        &spec.ssh_allowed_networks,
        &spec.api_allowed_networks,
        spec.is_ha(),
        spec.ssh_port,
        &spec.private_network_subnet,
    );
    match cloud.find_firewall(&name).await? {
        Some(firewall) => {
            info!(firewall = %name, "updating firewall rules");
            cloud.set_firewall_rules(firewall.id, &rules).await?;
            Ok(firewall)
        }
        None => {
            info!(firewall = %name, "creating firewall");
            Ok(cloud.create_firewall(&name, &rules).await?)
        }
    }
}

async fn ensure_ssh_key(
    spec: &ClusterSpec,
    cloud: &dyn CloudCompute,
    public_key: &str,
) -> Result<SshKey> {
    let name = names::cluster_resource(&spec.cluster_name);
    if let Some(key) = cloud.find_ssh_key(&name).await? {
        return Ok(key);
    }
    info!(ssh_key = %name, "uploading SSH key");
    Ok(cloud.create_ssh_key(&name, public_key).await?)
}

/// Create the API load balancer for HA clusters and wait until it is
/// addressable. Single-master clusters serve the API directly and get
/// no load balancer.
pub async fn ensure_load_balancer(
    spec: &ClusterSpec,
    cloud: &dyn CloudCompute,
    network: &Network,
) -> Result<Option<LoadBalancer>> {
    if !spec.is_ha() {
        return Ok(None);
    }

    let name = names::load_balancer(&spec.cluster_name);
    let balancer = match cloud.find_load_balancer(&name).await? {
        Some(balancer) => balancer,
        None => {
            info!(load_balancer = %name, "creating API load balancer");
            cloud
                .create_load_balancer(&CreateLoadBalancerRequest {
                    name: name.clone(),
                    network_id: network.id,
                    location: spec.masters_pool.location.clone(),
                    private_only: spec.private_api_load_balancer,
                    target_label_selector: names::master_label_selector(&spec.cluster_name),
                })
                .await?
        }
    };

    if spec.private_api_load_balancer || balancer.has_public_ip() {
        return Ok(Some(balancer));
    }

    let config = PollConfig::new(LOAD_BALANCER_IP_INTERVAL, LOAD_BALANCER_IP_TIMEOUT);
    let outcome = poll_until(
        config,
        "load balancer public IP",
        || cloud.find_load_balancer(&name),
        |found| found.as_ref().is_some_and(LoadBalancer::has_public_ip),
    )
    .await;
    match outcome.ready().flatten() {
        Some(balancer) => Ok(Some(balancer)),
        None => Err(ClusterError::LoadBalancerIpTimeout { name }),
    }
}
