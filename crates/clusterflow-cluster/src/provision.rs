//! Concurrency-bounded server provisioning.
//!
//! The first master is created synchronously so a broken spec or token
//! fails fast; every other server is created through a bounded fan-out.
//! Each server is then polled until the provider attaches its private
//! IP. A missing private IP degrades with a warning rather than
//! aborting, since the node-side install script waits on the private
//! interface anyway.

use crate::error::{ClusterError, Result};
use crate::names;
use crate::topology::{ClusterTopology, NodeRole};
use clusterflow_cloud::{CloudCompute, CreateServerRequest, PlacementGroup, Server};
use clusterflow_core::template::CLOUD_INIT;
use clusterflow_core::{poll_until, ClusterSpec, Context, NodePoolSpec, PollConfig, TemplateProcessor};
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

/// Upper bound on in-flight server create calls.
const MAX_CONCURRENT_CREATES: usize = 5;

/// Spread placement groups hold at most this many servers.
pub const PLACEMENT_GROUP_CAPACITY: u32 = 10;

const PRIVATE_IP_TIMEOUT: Duration = Duration::from_secs(600);
const PRIVATE_IP_INTERVAL: Duration = Duration::from_secs(10);

/// Number of placement groups a pool of `instance_count` servers needs.
pub fn placement_group_count(instance_count: u32) -> u32 {
    instance_count.div_ceil(PLACEMENT_GROUP_CAPACITY).max(1)
}

/// Group a server index lands in; round-robin keeps groups balanced.
pub fn placement_group_index(server_index: u32, group_count: u32) -> u32 {
    server_index % group_count
}

/// First usable address of the private subnet; the install scripts ping
/// it to detect that the private interface is up.
pub fn private_gateway(subnet: &str) -> Result<String> {
    let addr = subnet.split('/').next().unwrap_or(subnet);
    let parsed: Ipv4Addr = addr.parse().map_err(|_| {
        ClusterError::Core(clusterflow_core::CoreError::InvalidConfig(format!(
            "invalid private network subnet: {subnet}"
        )))
    })?;
    let first = Ipv4Addr::from(u32::from(parsed) + 1);
    Ok(first.to_string())
}

/// Cloud-init payload for servers of one pool.
pub fn render_cloud_init(
    templates: &TemplateProcessor,
    spec: &ClusterSpec,
    pool: &NodePoolSpec,
) -> Result<String> {
    let mut ctx = Context::new();
    ctx.insert("ssh_port", &spec.ssh_port);
    // MicroOS snapshots keep / read-only; the writable partition is /var.
    let growpart = if spec.snapshot_os == "microos" {
        "growpart:\n  devices: [\"/var\"]"
    } else {
        "growpart:\n  devices: [\"/\"]"
    };
    ctx.insert("growpart", growpart);
    let eth1 = if spec.enable_public_net_ipv4 {
        String::new()
    } else {
        // Private-only servers need their default route pointed at the
        // network gateway before anything can reach the internet.
        format!(
            "bootcmd:\n- ip route replace default via {}\n",
            private_gateway(&spec.private_network_subnet)?
        )
    };
    ctx.insert("eth1", &eth1);
    ctx.insert("packages", &spec.packages_for(pool));
    ctx.insert("post_create_commands", &spec.post_create_for(pool));
    Ok(templates.render(CLOUD_INIT, &ctx)?)
}

struct ServerJob {
    role: NodeRole,
    pool_name: String,
    request: CreateServerRequest,
}

/// Converge all masters and static worker pools. Returns the merged
/// topology with every server's addresses as last observed.
pub async fn provision(
    spec: &ClusterSpec,
    cloud: Arc<dyn CloudCompute>,
    templates: &TemplateProcessor,
    network_id: u64,
    firewall_id: u64,
    ssh_key_id: u64,
) -> Result<ClusterTopology> {
    let master_group = ensure_master_placement_group(spec, cloud.as_ref()).await?;
    let worker_groups = ensure_worker_placement_groups(spec, cloud.as_ref()).await?;

    let mut jobs = Vec::new();
    let master_user_data = render_cloud_init(templates, spec, &spec.masters_pool)?;
    for i in 0..spec.master_count() {
        jobs.push(ServerJob {
            role: NodeRole::Master,
            pool_name: spec.masters_pool.name.clone(),
            request: CreateServerRequest {
                cluster_name: spec.cluster_name.clone(),
                name: names::master(&spec.cluster_name, &spec.masters_pool.instance_type, i),
                instance_type: spec.masters_pool.instance_type.clone(),
                image: spec.image_for(&spec.masters_pool),
                location: spec.masters_pool.location.clone(),
                role: NodeRole::Master.as_str().to_string(),
                user_data: master_user_data.clone(),
                firewall_id,
                network_id,
                ssh_key_id,
                placement_group_id: master_group.id,
                enable_public_ipv4: spec.enable_public_net_ipv4,
                enable_public_ipv6: spec.enable_public_net_ipv6,
            },
        });
    }
    for pool in spec.static_worker_pools() {
        let groups = &worker_groups[&pool.name];
        let user_data = render_cloud_init(templates, spec, pool)?;
        for i in 0..pool.instance_count {
            let group = placement_group_index(i, groups.len() as u32);
            jobs.push(ServerJob {
                role: NodeRole::Worker,
                pool_name: pool.name.clone(),
                request: CreateServerRequest {
                    cluster_name: spec.cluster_name.clone(),
                    name: names::worker(&spec.cluster_name, &pool.instance_type, &pool.name, i),
                    instance_type: pool.instance_type.clone(),
                    image: spec.image_for(pool),
                    location: pool.location.clone(),
                    role: NodeRole::Worker.as_str().to_string(),
                    user_data: user_data.clone(),
                    firewall_id,
                    network_id,
                    ssh_key_id,
                    placement_group_id: groups[group as usize].id,
                    enable_public_ipv4: spec.enable_public_net_ipv4,
                    enable_public_ipv6: spec.enable_public_net_ipv6,
                },
            });
        }
    }

    let mut topology = ClusterTopology::default();

    // First master synchronously: a failure here aborts before the
    // fan-out burns through API quota.
    let mut jobs = jobs.into_iter();
    if let Some(first) = jobs.next() {
        let server = converge_server(cloud.as_ref(), &first.request).await?;
        topology.absorb_master(server);
    }

    let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_CREATES));
    let mut tasks = JoinSet::new();
    for job in jobs {
        let cloud = cloud.clone();
        let semaphore = semaphore.clone();
        tasks.spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|e| ClusterError::TaskJoin(e.to_string()))?;
            let server = converge_server(cloud.as_ref(), &job.request).await?;
            Ok::<_, ClusterError>((job.role, job.pool_name, server))
        });
    }
    while let Some(joined) = tasks.join_next().await {
        let (role, pool_name, server) =
            joined.map_err(|e| ClusterError::TaskJoin(e.to_string()))??;
        match role {
            NodeRole::Master => topology.absorb_master(server),
            NodeRole::Worker => topology.absorb_worker(&pool_name, server),
        }
    }

    info!(nodes = topology.node_count(), "provisioning converged");
    Ok(topology)
}

/// Find-or-create one server, then wait for its private IP.
async fn converge_server(cloud: &dyn CloudCompute, request: &CreateServerRequest) -> Result<Server> {
    let existing = cloud.find_server(&request.name).await?;
    let server = match existing {
        Some(server) => {
            info!(server = %request.name, "server already exists");
            server
        }
        None => {
            info!(server = %request.name, "creating server");
            cloud.create_server(request).await?
        }
    };
    if server.has_private_ip() {
        return Ok(server);
    }

    let config = PollConfig::new(PRIVATE_IP_INTERVAL, PRIVATE_IP_TIMEOUT);
    let outcome = poll_until(
        config,
        "private IP assignment",
        || cloud.find_server(&request.name),
        |found| found.as_ref().is_some_and(Server::has_private_ip),
    )
    .await;
    match outcome.into_latest().flatten() {
        Some(server) => {
            if !server.has_private_ip() {
                warn!(server = %request.name, "no private IP yet, continuing anyway");
            }
            Ok(server)
        }
        None => Ok(server),
    }
}

async fn ensure_master_placement_group(
    spec: &ClusterSpec,
    cloud: &dyn CloudCompute,
) -> Result<PlacementGroup> {
    let name = names::master_placement_group(&spec.cluster_name);
    match cloud.find_placement_group(&name).await? {
        Some(group) => Ok(group),
        None => Ok(cloud.create_placement_group(&name).await?),
    }
}

async fn ensure_worker_placement_groups(
    spec: &ClusterSpec,
    cloud: &dyn CloudCompute,
) -> Result<BTreeMap<String, Vec<PlacementGroup>>> {
    let mut groups = BTreeMap::new();
    for pool in spec.static_worker_pools() {
        let count = placement_group_count(pool.instance_count);
        let mut pool_groups = Vec::with_capacity(count as usize);
        for g in 0..count {
            let name = names::worker_placement_group(&spec.cluster_name, &pool.name, g);
            let group = match cloud.find_placement_group(&name).await? {
                Some(group) => group,
                None => cloud.create_placement_group(&name).await?,
            };
            pool_groups.push(group);
        }
        groups.insert(pool.name.clone(), pool_groups);
    }
    Ok(groups)
}
