//! Post-bootstrap cluster configuration: node labels and taints, the
//! cloud secret, in-cluster drivers and the cluster autoscaler.
//!
//! Everything here runs through kubectl against the saved kubeconfig,
//! so each step is retriable by simply re-running the create command.

use crate::bootstrap::kubeconfig_env;
use crate::error::{ClusterError, Result};
use crate::names;
use crate::provision::render_cloud_init;
use crate::topology::ClusterTopology;
use async_trait::async_trait;
use base64::Engine;
use clusterflow_cloud::Server;
use clusterflow_core::template::{CLUSTER_AUTOSCALER_MANIFEST, HCLOUD_SECRET_MANIFEST};
use clusterflow_core::{ClusterSpec, Context, KeyValuePair, TemplateProcessor};
use clusterflow_exec::{LocalExec, RemoteExec};
use regex::Regex;
use tracing::info;

async fn kubectl(local: &dyn LocalExec, spec: &ClusterSpec, args: &str) -> Result<String> {
    let result = local
        .run(&format!("kubectl {args}"), &kubeconfig_env(spec))
        .await?;
    if !result.success() {
        return Err(ClusterError::Kubectl {
            status: result.status,
            output: result.output,
        });
    }
    Ok(result.output)
}

async fn kubectl_apply_manifest(
    local: &dyn LocalExec,
    spec: &ClusterSpec,
    manifest: &str,
) -> Result<()> {
    let command = format!("kubectl apply -f - <<'CLUSTERFLOW_EOF'\n{manifest}\nCLUSTERFLOW_EOF");
    let result = local.run(&command, &kubeconfig_env(spec)).await?;
    if !result.success() {
        return Err(ClusterError::Kubectl {
            status: result.status,
            output: result.output,
        });
    }
    Ok(())
}

fn join_names(servers: &[&Server]) -> String {
    servers
        .iter()
        .map(|s| s.name.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// One batched kubectl call per pool and kind, `--overwrite` so re-runs
/// converge instead of failing on existing keys.
async fn apply_labels_and_taints(
    local: &dyn LocalExec,
    spec: &ClusterSpec,
    nodes: &[&Server],
    labels: &[KeyValuePair],
    taints: &[KeyValuePair],
) -> Result<()> {
    if nodes.is_empty() {
        return Ok(());
    }
    let names = join_names(nodes);
    if !labels.is_empty() {
        let pairs = labels
            .iter()
            .map(|l| format!("{}={}", l.key, l.value))
            .collect::<Vec<_>>()
            .join(" ");
        kubectl(
            local,
            spec,
            &format!("label --overwrite nodes {names} {pairs}"),
        )
        .await?;
    }
    if !taints.is_empty() {
        let pairs = taints
            .iter()
            .map(|t| format!("{}={}", t.key, t.value))
            .collect::<Vec<_>>()
            .join(" ");
        kubectl(
            local,
            spec,
            &format!("taint --overwrite nodes {names} {pairs}"),
        )
        .await?;
    }
    Ok(())
}

async fn configure_nodes(
    local: &dyn LocalExec,
    spec: &ClusterSpec,
    topology: &ClusterTopology,
) -> Result<()> {
    let masters: Vec<&Server> = topology.masters.iter().collect();
    apply_labels_and_taints(
        local,
        spec,
        &masters,
        &spec.masters_pool.labels,
        &spec.masters_pool.taints,
    )
    .await?;

    for pool in spec.static_worker_pools() {
        let nodes: Vec<&Server> = topology
            .workers
            .get(&pool.name)
            .map(|servers| servers.iter().collect())
            .unwrap_or_default();
        apply_labels_and_taints(local, spec, &nodes, &pool.labels, &pool.taints).await?;
    }
    Ok(())
}

async fn apply_cloud_secret(
    local: &dyn LocalExec,
    spec: &ClusterSpec,
    templates: &TemplateProcessor,
    network_name: &str,
) -> Result<()> {
    let mut ctx = Context::new();
    ctx.insert("network", network_name);
    ctx.insert("token", &spec.hcloud_token);
    let manifest = templates.render(HCLOUD_SECRET_MANIFEST, &ctx)?;
    kubectl_apply_manifest(local, spec, &manifest).await
}

/// Fetches manifest documents by URL; a seam so the orchestration flow
/// is testable without a network.
#[async_trait]
pub trait ManifestSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String>;
}

pub struct HttpManifestSource;

#[async_trait]
impl ManifestSource for HttpManifestSource {
    async fn fetch(&self, url: &str) -> Result<String> {
        let response = reqwest::get(url)
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| ClusterError::Download {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        response.text().await.map_err(|e| ClusterError::Download {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}

/// The upstream cloud controller manifest hardcodes a pod CIDR; patch
/// it to the cluster's before applying.
async fn install_cloud_controller(
    local: &dyn LocalExec,
    spec: &ClusterSpec,
    manifests: &dyn ManifestSource,
) -> Result<()> {
    info!(url = %spec.cloud_controller_manager_manifest_url, "installing cloud controller manager");
    let manifest = manifests
        .fetch(&spec.cloud_controller_manager_manifest_url)
        .await?;
    let re = Regex::new(r#"--cluster-cidr=[^"]+"#).map_err(|e| ClusterError::Download {
        url: spec.cloud_controller_manager_manifest_url.clone(),
        message: e.to_string(),
    })?;
    let replacement = format!("--cluster-cidr={}", spec.cluster_cidr);
    let patched = re.replace_all(&manifest, replacement.as_str());
    kubectl_apply_manifest(local, spec, &patched).await
}

async fn install_csi_driver(local: &dyn LocalExec, spec: &ClusterSpec) -> Result<()> {
    info!(url = %spec.csi_driver_manifest_url, "installing CSI driver");
    kubectl(
        local,
        spec,
        &format!("apply -f {}", spec.csi_driver_manifest_url),
    )
    .await?;
    Ok(())
}

async fn install_upgrade_controller(local: &dyn LocalExec, spec: &ClusterSpec) -> Result<()> {
    info!(url = %spec.system_upgrade_controller_manifest_url, "installing system upgrade controller");
    kubectl(
        local,
        spec,
        &format!("apply -f {}", spec.system_upgrade_controller_manifest_url),
    )
    .await?;
    Ok(())
}

/// `--nodes=min:max:TYPE:LOCATION:pool` lines for the autoscaler
/// deployment, one per autoscaling pool.
pub fn autoscaler_pool_args(spec: &ClusterSpec) -> String {
    spec.autoscaling_worker_pools()
        .iter()
        .filter_map(|pool| {
            pool.autoscaling.as_ref().map(|bounds| {
                format!(
                    "            - --nodes={}:{}:{}:{}:{}",
                    bounds.min_instances,
                    bounds.max_instances,
                    pool.instance_type.to_uppercase(),
                    pool.location.to_uppercase(),
                    pool.name
                )
            })
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Certificate bundle location differs per distribution; probe the
/// first master instead of guessing.
async fn certificate_path(
    ssh: &dyn RemoteExec,
    spec: &ClusterSpec,
    first_master: &Server,
) -> Result<&'static str> {
    let host = first_master
        .host_ip()
        .ok_or_else(|| ClusterError::MissingAddress {
            name: first_master.name.clone(),
        })?;
    let probe = "[ -f /etc/ssl/certs/ca-certificates.crt ] && echo 1 || echo 2";
    let answer = ssh.execute(host, spec.ssh_port, probe).await?;
    Ok(if answer.trim() == "1" {
        "/etc/ssl/certs/ca-certificates.crt"
    } else {
        "/etc/ssl/certs/ca-bundle.crt"
    })
}

async fn install_autoscaler(
    local: &dyn LocalExec,
    ssh: &dyn RemoteExec,
    spec: &ClusterSpec,
    templates: &TemplateProcessor,
    network_name: &str,
    first_master: &Server,
) -> Result<()> {
    let pools = spec.autoscaling_worker_pools();
    let Some(first_pool) = pools.first() else {
        return Ok(());
    };
    info!(pools = pools.len(), "installing cluster autoscaler");

    let cloud_init = render_cloud_init(templates, spec, first_pool)?;
    let encoded = base64::engine::general_purpose::STANDARD.encode(cloud_init);

    let mut ctx = Context::new();
    ctx.insert("node_pool_args", &autoscaler_pool_args(spec));
    ctx.insert("cloud_init", &encoded);
    ctx.insert(
        "image",
        &spec
            .autoscaling_image
            .clone()
            .unwrap_or_else(|| spec.image.clone()),
    );
    ctx.insert("firewall_name", &names::cluster_resource(&spec.cluster_name));
    ctx.insert("ssh_key_name", &names::cluster_resource(&spec.cluster_name));
    ctx.insert("network_name", network_name);
    ctx.insert("enable_public_net_ipv4", &spec.enable_public_net_ipv4);
    ctx.insert("enable_public_net_ipv6", &spec.enable_public_net_ipv6);
    ctx.insert(
        "certificate_path",
        certificate_path(ssh, spec, first_master).await?,
    );
    let manifest = templates.render(CLUSTER_AUTOSCALER_MANIFEST, &ctx)?;
    kubectl_apply_manifest(local, spec, &manifest).await
}

/// Install every addon in dependency order.
pub async fn install_addons(
    spec: &ClusterSpec,
    templates: &TemplateProcessor,
    ssh: &dyn RemoteExec,
    local: &dyn LocalExec,
    manifests: &dyn ManifestSource,
    topology: &ClusterTopology,
    network_name: &str,
) -> Result<()> {
    let first_master = topology
        .first_master()
        .ok_or_else(|| ClusterError::MissingAddress {
            name: "first master".to_string(),
        })?;

    configure_nodes(local, spec, topology).await?;
    apply_cloud_secret(local, spec, templates, network_name).await?;
    install_cloud_controller(local, spec, manifests).await?;
    install_csi_driver(local, spec).await?;
    install_upgrade_controller(local, spec).await?;
    install_autoscaler(local, ssh, spec, templates, network_name, first_master).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> ClusterSpec {
        serde_yaml::from_str(
            r#"
cluster_name: demo
kubeconfig_path: /tmp/kubeconfig
k3s_version: v1.29.0+k3s1
public_ssh_key_path: ~/.ssh/id_ed25519.pub
private_ssh_key_path: ~/.ssh/id_ed25519
masters_pool:
  name: masters
  instance_type: cpx21
  instance_count: 1
  location: fsn1
worker_node_pools:
  - name: burst
    instance_type: cpx31
    location: fsn1
    autoscaling:
      enabled: true
      min_instances: 1
      max_instances: 4
  - name: spike
    instance_type: cpx41
    location: nbg1
    autoscaling:
      enabled: true
      min_instances: 0
      max_instances: 2
"#,
        )
        .unwrap()
    }

    #[test]
    fn autoscaler_args_one_line_per_pool() {
        let args = autoscaler_pool_args(&spec());
        let lines: Vec<&str> = args.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].trim_start().starts_with("- --nodes=1:4:CPX31:FSN1:burst"));
        assert!(lines[1].trim_start().starts_with("- --nodes=0:2:CPX41:NBG1:spike"));
    }

    #[test]
    fn autoscaler_args_empty_without_autoscaling_pools() {
        let mut spec = spec();
        spec.worker_node_pools.clear();
        assert_eq!(autoscaler_pool_args(&spec), "");
    }
}
