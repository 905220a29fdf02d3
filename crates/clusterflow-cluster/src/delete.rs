//! Cluster teardown.
//!
//! Deletion walks the reverse of the creation order: load balancer,
//! servers, placement groups, network, then the firewall after a grace
//! period for detachment. The SSH key is left behind on purpose, other
//! clusters may share it. Missing resources are skipped silently so a
//! partially created cluster tears down cleanly.

use crate::error::Result;
use crate::names;
use crate::provision::placement_group_count;
use clusterflow_cloud::CloudCompute;
use clusterflow_core::ClusterSpec;
use std::time::Duration;
use tracing::{info, warn};

/// Servers detach from the firewall asynchronously after deletion.
const FIREWALL_DETACH_GRACE: Duration = Duration::from_secs(15);

pub async fn destroy(spec: &ClusterSpec, cloud: &dyn CloudCompute) -> Result<()> {
    delete_load_balancer(spec, cloud).await?;
    delete_servers(spec, cloud).await?;
    delete_placement_groups(spec, cloud).await?;
    delete_network(spec, cloud).await?;

    tokio::time::sleep(FIREWALL_DETACH_GRACE).await;
    delete_firewall(spec, cloud).await?;

    info!(cluster = %spec.cluster_name, "cluster deleted");
    Ok(())
}

async fn delete_load_balancer(spec: &ClusterSpec, cloud: &dyn CloudCompute) -> Result<()> {
    if !spec.is_ha() {
        return Ok(());
    }
    let name = names::load_balancer(&spec.cluster_name);
    if let Some(balancer) = cloud.find_load_balancer(&name).await? {
        info!(load_balancer = %name, "deleting load balancer");
        cloud.delete_load_balancer(balancer.id).await?;
    }
    Ok(())
}

async fn delete_servers(spec: &ClusterSpec, cloud: &dyn CloudCompute) -> Result<()> {
    let mut server_names = Vec::new();
    for i in 0..spec.master_count() {
        server_names.push(names::master(
            &spec.cluster_name,
            &spec.masters_pool.instance_type,
            i,
        ));
    }
    for pool in spec.static_worker_pools() {
        for i in 0..pool.instance_count {
            server_names.push(names::worker(
                &spec.cluster_name,
                &pool.instance_type,
                &pool.name,
                i,
            ));
        }
    }
    for name in server_names {
        if let Some(server) = cloud.find_server(&name).await? {
            info!(server = %name, "deleting server");
            cloud.delete_server(server.id).await?;
        }
    }
    Ok(())
}

async fn delete_placement_groups(spec: &ClusterSpec, cloud: &dyn CloudCompute) -> Result<()> {
    let mut group_names = vec![names::master_placement_group(&spec.cluster_name)];
    for pool in spec.static_worker_pools() {
        for g in 0..placement_group_count(pool.instance_count) {
            group_names.push(names::worker_placement_group(
                &spec.cluster_name,
                &pool.name,
                g,
            ));
        }
    }
    for name in group_names {
        if let Some(group) = cloud.find_placement_group(&name).await? {
            info!(placement_group = %name, "deleting placement group");
            cloud.delete_placement_group(group.id).await?;
        }
    }
    Ok(())
}

async fn delete_network(spec: &ClusterSpec, cloud: &dyn CloudCompute) -> Result<()> {
    // Pre-existing networks were never ours to delete.
    if spec.existing_network_name.is_some() {
        return Ok(());
    }
    let name = names::cluster_resource(&spec.cluster_name);
    let Some(network) = cloud.find_network(&name).await? else {
        return Ok(());
    };
    if let Some(route) = network.default_egress_route() {
        warn!(
            network = %name,
            gateway = %route.gateway,
            "network carries a default egress route, leaving it in place"
        );
        return Ok(());
    }
    info!(network = %name, "deleting network");
    cloud.delete_network(network.id).await?;
    Ok(())
}

async fn delete_firewall(spec: &ClusterSpec, cloud: &dyn CloudCompute) -> Result<()> {
    let name = names::cluster_resource(&spec.cluster_name);
    if let Some(firewall) = cloud.find_firewall(&name).await? {
        info!(firewall = %name, "deleting firewall");
        cloud.delete_firewall(firewall.id).await?;
    }
    Ok(())
}
