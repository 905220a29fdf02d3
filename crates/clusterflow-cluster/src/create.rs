//! End-to-end cluster creation.
//!
//! Phases run strictly in order; every phase is idempotent, so an
//! aborted run is resumed by running create again.

use crate::error::Result;
use crate::provision::private_gateway;
use crate::{addons, bootstrap, provision, reconcile};
use clusterflow_cloud::CloudCompute;
use clusterflow_core::{check_master_count, ClusterSpec, TemplateProcessor};
use clusterflow_exec::{LocalExec, RemoteExec};
use std::sync::Arc;
use tracing::info;

/// External effect handles, injected so tests can run the whole flow
/// against in-memory fakes.
pub struct Effects {
    pub cloud: Arc<dyn CloudCompute>,
    pub ssh: Arc<dyn RemoteExec>,
    pub local: Arc<dyn LocalExec>,
    pub manifests: Arc<dyn addons::ManifestSource>,
}

pub async fn create_cluster(spec: &ClusterSpec, effects: &Effects, public_key: &str) -> Result<()> {
    check_master_count(spec)?;
    let templates = TemplateProcessor::new()?;
    let gateway = private_gateway(&spec.private_network_subnet)?;

    info!(cluster = %spec.cluster_name, "reconciling infrastructure");
    let infra = reconcile::ensure_infrastructure(spec, effects.cloud.as_ref(), public_key).await?;

    info!(cluster = %spec.cluster_name, "provisioning servers");
    let topology = provision::provision(
        spec,
        effects.cloud.clone(),
        &templates,
        infra.network.id,
        infra.firewall.id,
        infra.ssh_key.id,
    )
    .await?;

    let load_balancer =
        reconcile::ensure_load_balancer(spec, effects.cloud.as_ref(), &infra.network).await?;

    info!(cluster = %spec.cluster_name, "bootstrapping k3s");
    bootstrap::bootstrap(
        spec,
        &templates,
        effects.ssh.as_ref(),
        effects.local.as_ref(),
        &topology,
        load_balancer.as_ref(),
        &gateway,
    )
    .await?;

    info!(cluster = %spec.cluster_name, "installing addons");
    addons::install_addons(
        spec,
        &templates,
        effects.ssh.as_ref(),
        effects.local.as_ref(),
        effects.manifests.as_ref(),
        &topology,
        &infra.network.name,
    )
    .await?;

    info!(cluster = %spec.cluster_name, nodes = topology.node_count(), "cluster ready");
    Ok(())
}
