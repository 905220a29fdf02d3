//! k3s bootstrap: token discovery, install fan-out, kubeconfig save and
//! control-plane convergence.
//!
//! Token handling is the subtle part. A fresh cluster gets a random
//! token and the first master initializes the datastore. On a re-run
//! against surviving masters the token is read back from any of them;
//! if the surviving master is not master 1, master 1 is being replaced
//! and must rejoin the survivor instead of initializing a new cluster.

use crate::error::{ClusterError, Result};
use crate::topology::ClusterTopology;
use clusterflow_cloud::{LoadBalancer, Server};
use clusterflow_core::template::{MASTER_INSTALL_SCRIPT, WORKER_INSTALL_SCRIPT};
use clusterflow_core::{poll_until, ClusterSpec, Context, PollConfig, TemplateProcessor};
use clusterflow_exec::{LocalExec, RemoteExec};
use futures::future::join_all;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{info, warn};

const NODE_TOKEN_FILE: &str = "/var/lib/rancher/k3s/server/node-token";

const SSH_WAIT_TIMEOUT: Duration = Duration::from_secs(240);
const SSH_WAIT_INTERVAL: Duration = Duration::from_secs(5);
const CONTROL_PLANE_TIMEOUT: Duration = Duration::from_secs(240);
const CONTROL_PLANE_INTERVAL: Duration = Duration::from_secs(10);

/// Where the cluster join token came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenSource {
    /// No master holds a token yet; a new one was generated.
    Fresh(String),
    /// Read back from the master at `index` in the ordered master list.
    FromMaster { token: String, index: usize },
}

impl TokenSource {
    pub fn token(&self) -> &str {
        match self {
            TokenSource::Fresh(token) => token,
            TokenSource::FromMaster { token, .. } => token,
        }
    }

    /// True when master 1 must join an existing datastore rather than
    /// initialize one.
    pub fn first_master_rejoins(&self) -> bool {
        matches!(self, TokenSource::FromMaster { index, .. } if *index != 0)
    }
}

pub fn generate_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

/// The node-token file stores `K10<hash>::server:<secret>`; only the
/// secret is reusable as K3S_TOKEN.
pub fn extract_token(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.rsplit(':').next().map(str::to_string)
}

/// Probe each master for an existing token; first hit wins. All probes
/// failing means a fresh cluster.
pub async fn discover_token(
    ssh: &dyn RemoteExec,
    ssh_port: u16,
    masters: &[Server],
) -> TokenSource {
    for (index, master) in masters.iter().enumerate() {
        let Some(host) = master.host_ip() else { continue };
        match ssh
            .execute(host, ssh_port, &format!("cat {NODE_TOKEN_FILE}"))
            .await
        {
            Ok(raw) => {
                if let Some(token) = extract_token(&raw) {
                    info!(master = %master.name, "found existing cluster token");
                    return TokenSource::FromMaster { token, index };
                }
            }
            Err(_) => continue,
        }
    }
    TokenSource::Fresh(generate_token())
}

/// Address clients use to reach the Kubernetes API.
pub fn api_address(
    spec: &ClusterSpec,
    load_balancer: Option<&LoadBalancer>,
    first_master: &Server,
) -> Result<String> {
    if let Some(hostname) = &spec.api_server_hostname {
        return Ok(hostname.clone());
    }
    api_ip_address(spec, load_balancer, first_master)
}

/// IP-based API endpoint, ignoring any configured hostname. Anchors the
/// SAN list so certificates stay valid for direct IP access.
pub fn api_ip_address(
    spec: &ClusterSpec,
    load_balancer: Option<&LoadBalancer>,
    first_master: &Server,
) -> Result<String> {
    if let Some(balancer) = load_balancer {
        let ip = if spec.private_api_load_balancer {
            balancer.private_ip.as_deref()
        } else {
            balancer.public_ipv4.as_deref()
        };
        if let Some(ip) = ip {
            return Ok(ip.to_string());
        }
    }
    first_master
        .host_ip()
        .map(str::to_string)
        .ok_or_else(|| ClusterError::MissingAddress {
            name: first_master.name.clone(),
        })
}

/// TLS SANs for the API server certificate, deduplicated with the
/// IP-based API endpoint first; a configured hostname follows the load
/// balancer address.
pub fn tls_sans(
    spec: &ClusterSpec,
    load_balancer: Option<&LoadBalancer>,
    masters: &[Server],
    api_ip: &str,
) -> Vec<String> {
    let mut sans: Vec<String> = Vec::new();
    let mut push = |candidate: Option<&str>, sans: &mut Vec<String>| {
        if let Some(c) = candidate {
            if !c.is_empty() && !sans.iter().any(|s| s == c) {
                sans.push(c.to_string());
            }
        }
    };
    push(Some(api_ip), &mut sans);
    if let Some(balancer) = load_balancer {
        push(balancer.public_ipv4.as_deref(), &mut sans);
    }
    push(spec.api_server_hostname.as_deref(), &mut sans);
    if spec.is_ha() {
        if let Some(balancer) = load_balancer {
            push(balancer.private_ip.as_deref(), &mut sans);
        }
    }
    for master in masters {
        push(master.private_ip.as_deref(), &mut sans);
    }
    sans
}

fn tls_san_flags(sans: &[String]) -> String {
    sans.iter()
        .map(|s| format!("--tls-san={s}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn extra_server_args(spec: &ClusterSpec) -> String {
    let mut flags = Vec::new();
    for (flag, values) in [
        ("--kube-apiserver-arg", &spec.kube_api_server_args),
        ("--kube-scheduler-arg", &spec.kube_scheduler_args),
        (
            "--kube-controller-manager-arg",
            &spec.kube_controller_manager_args,
        ),
        ("--kubelet-arg", &spec.kubelet_args),
        ("--kube-proxy-arg", &spec.kube_proxy_args),
    ] {
        for value in values {
            flags.push(format!("{flag}={value}"));
        }
    }
    flags.join(" ")
}

fn flannel_backend(spec: &ClusterSpec) -> &'static str {
    if spec.enable_encryption {
        "--flannel-backend=wireguard-native"
    } else {
        ""
    }
}

fn master_taint(spec: &ClusterSpec) -> &'static str {
    if !spec.schedule_workloads_on_masters && !spec.worker_node_pools.is_empty() {
        "--node-taint CriticalAddonsOnly=true:NoExecute"
    } else {
        ""
    }
}

fn private_ip_of(server: &Server) -> Result<&str> {
    server
        .private_ip
        .as_deref()
        .filter(|ip| !ip.is_empty())
        .ok_or_else(|| ClusterError::MissingAddress {
            name: server.name.clone(),
        })
}

fn host_ip_of(server: &Server) -> Result<&str> {
    server
        .host_ip()
        .ok_or_else(|| ClusterError::MissingAddress {
            name: server.name.clone(),
        })
}

fn render_master_script(
    templates: &TemplateProcessor,
    spec: &ClusterSpec,
    token: &str,
    server_flag: &str,
    sans: &[String],
    gateway: &str,
) -> Result<String> {
    let mut ctx = Context::new();
    ctx.insert("private_network_test_ip", gateway);
    ctx.insert("k3s_version", &spec.k3s_version);
    ctx.insert("k3s_token", token);
    ctx.insert("server", server_flag);
    ctx.insert("cluster_cidr", &spec.cluster_cidr);
    ctx.insert("service_cidr", &spec.service_cidr);
    ctx.insert("cluster_dns", &spec.cluster_dns);
    ctx.insert("flannel_backend", flannel_backend(spec));
    ctx.insert("taint", master_taint(spec));
    ctx.insert("extra_args", &extra_server_args(spec));
    ctx.insert("tls_sans", &tls_san_flags(sans));
    Ok(templates.render(MASTER_INSTALL_SCRIPT, &ctx)?)
}

fn render_worker_script(
    templates: &TemplateProcessor,
    spec: &ClusterSpec,
    token: &str,
    master_private_ip: &str,
    gateway: &str,
) -> Result<String> {
    let mut ctx = Context::new();
    ctx.insert("private_network_test_ip", gateway);
    ctx.insert("k3s_version", &spec.k3s_version);
    ctx.insert("k3s_token", token);
    ctx.insert("master_private_ip", master_private_ip);
    Ok(templates.render(WORKER_INSTALL_SCRIPT, &ctx)?)
}

/// Block until a node answers a trivial command over SSH. Unreachable
/// nodes are fatal; nothing downstream can proceed without them.
async fn wait_for_ssh(ssh: &dyn RemoteExec, ssh_port: u16, server: &Server) -> Result<()> {
    let host = host_ip_of(server)?;
    let config = PollConfig::new(SSH_WAIT_INTERVAL, SSH_WAIT_TIMEOUT);
    let outcome = poll_until(
        config,
        "SSH reachability",
        || ssh.execute(host, ssh_port, "echo ready"),
        |out| out == "ready",
    )
    .await;
    if outcome.timed_out() {
        return Err(ClusterError::SshTimeout {
            node: server.name.clone(),
            timeout_secs: SSH_WAIT_TIMEOUT.as_secs(),
        });
    }
    Ok(())
}

pub(crate) fn expand_home(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return format!("{home}/{rest}");
        }
    }
    path.to_string()
}

pub(crate) fn kubeconfig_env(spec: &ClusterSpec) -> BTreeMap<String, String> {
    BTreeMap::from([(
        "KUBECONFIG".to_string(),
        expand_home(&spec.kubeconfig_path),
    )])
}

/// Fetch the kubeconfig from the first master and rewrite it for
/// external use: API address instead of loopback, cluster name instead
/// of `default`, owner-only permissions.
pub async fn save_kubeconfig(
    ssh: &dyn RemoteExec,
    spec: &ClusterSpec,
    first_master: &Server,
    api_address: &str,
) -> Result<()> {
    let host = host_ip_of(first_master)?;
    let raw = ssh
        .execute(host, spec.ssh_port, "cat /etc/rancher/k3s/k3s.yaml")
        .await?;
    let rewritten = raw
        .replace("127.0.0.1", api_address)
        .replace("default", &spec.cluster_name);

    let path = expand_home(&spec.kubeconfig_path);
    std::fs::write(&path, rewritten).map_err(|e| ClusterError::Io {
        path: path.clone(),
        message: e.to_string(),
    })?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600)).map_err(|e| {
            ClusterError::Io {
                path: path.clone(),
                message: e.to_string(),
            }
        })?;
    }
    info!(path = %path, "kubeconfig saved");
    Ok(())
}

/// Wait until `kubectl get nodes` lists the first master.
async fn wait_for_control_plane(
    local: &dyn LocalExec,
    spec: &ClusterSpec,
    first_master: &Server,
) -> Result<()> {
    let env = kubeconfig_env(spec);
    let config = PollConfig::new(CONTROL_PLANE_INTERVAL, CONTROL_PLANE_TIMEOUT);
    let outcome = poll_until(
        config,
        "control plane readiness",
        || local.run("kubectl get nodes", &env),
        |result| result.success() && result.output.contains(&first_master.name),
    )
    .await;
    if outcome.timed_out() {
        return Err(ClusterError::ControlPlaneTimeout {
            node: first_master.name.clone(),
            timeout_secs: CONTROL_PLANE_TIMEOUT.as_secs(),
        });
    }
    Ok(())
}

/// Run the full bootstrap sequence against a provisioned topology.
pub async fn bootstrap(
    spec: &ClusterSpec,
    templates: &TemplateProcessor,
    ssh: &dyn RemoteExec,
    local: &dyn LocalExec,
    topology: &ClusterTopology,
    load_balancer: Option<&LoadBalancer>,
    gateway: &str,
) -> Result<()> {
    let first_master = topology
        .first_master()
        .ok_or_else(|| ClusterError::MissingAddress {
            name: "first master".to_string(),
        })?;

    // All nodes must answer over SSH before any install starts.
    let waits = topology
        .masters
        .iter()
        .chain(topology.all_workers())
        .map(|server| wait_for_ssh(ssh, spec.ssh_port, server));
    for result in join_all(waits).await {
        result?;
    }

    let token = discover_token(ssh, spec.ssh_port, &topology.masters).await;
    let address = api_address(spec, load_balancer, first_master)?;
    let api_ip = api_ip_address(spec, load_balancer, first_master)?;
    let sans = tls_sans(spec, load_balancer, &topology.masters, &api_ip);

    // Master 1 either initializes the datastore, runs standalone, or
    // rejoins a surviving master that still holds the token.
    let first_server_flag = match &token {
        TokenSource::FromMaster { index, .. } if *index != 0 => {
            let survivor = &topology.masters[*index];
            warn!(survivor = %survivor.name, "first master rejoins surviving master");
            format!("--server https://{}:6443", private_ip_of(survivor)?)
        }
        _ if spec.is_ha() => "--cluster-init".to_string(),
        _ => String::new(),
    };

    info!(master = %first_master.name, "installing k3s on first master");
    let script = render_master_script(
        templates,
        spec,
        token.token(),
        &first_server_flag,
        &sans,
        gateway,
    )?;
    ssh.execute(host_ip_of(first_master)?, spec.ssh_port, &script)
        .await?;

    save_kubeconfig(ssh, spec, first_master, &address).await?;
    wait_for_control_plane(local, spec, first_master).await?;

    // Remaining masters join master 1 concurrently.
    let join_target = format!("--server https://{}:6443", private_ip_of(first_master)?);
    let master_script =
        render_master_script(templates, spec, token.token(), &join_target, &sans, gateway)?;
    let joins = topology.masters.iter().skip(1).map(|master| {
        let script = master_script.clone();
        async move {
            info!(master = %master.name, "installing k3s");
            ssh.execute(host_ip_of(master)?, spec.ssh_port, &script)
                .await?;
            Ok::<_, ClusterError>(())
        }
    });
    for result in join_all(joins).await {
        result?;
    }

    // Workers all join through master 1's private address.
    let worker_script = render_worker_script(
        templates,
        spec,
        token.token(),
        private_ip_of(first_master)?,
        gateway,
    )?;
    let installs = topology.all_workers().map(|worker| {
        let script = worker_script.clone();
        async move {
            info!(worker = %worker.name, "installing k3s agent");
            ssh.execute(host_ip_of(worker)?, spec.ssh_port, &script)
                .await?;
            Ok::<_, ClusterError>(())
        }
    });
    for result in join_all(installs).await {
        result?;
    }

    Ok(())
}
