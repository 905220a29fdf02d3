use crate::utils;
use clusterflow_cloud_hetzner::HetznerCompute;
use clusterflow_cluster::{create_cluster, Effects, HttpManifestSource};
use clusterflow_exec::{ProcessRunner, SshClient};
use colored::Colorize;
use std::path::Path;
use std::sync::Arc;

pub async fn handle(config: &str, hcloud_token: String) -> anyhow::Result<()> {
    let mut spec = clusterflow_core::load_cluster_spec(Path::new(config))?;
    spec.hcloud_token = hcloud_token.clone();
    utils::init_logging(spec.debug);

    println!("{}", "Creating cluster...".blue().bold());
    println!("Cluster:  {}", spec.cluster_name.cyan());
    println!("Masters:  {}", spec.master_count());
    println!(
        "Workers:  {} static pool(s), {} autoscaling pool(s)",
        spec.static_worker_pools().len(),
        spec.autoscaling_worker_pools().len()
    );

    let public_key =
        HetznerCompute::read_public_key(&utils::expand_home(&spec.public_ssh_key_path))?;
    let effects = Effects {
        cloud: Arc::new(HetznerCompute::new(hcloud_token)),
        ssh: Arc::new(
            SshClient::new(utils::expand_home(&spec.private_ssh_key_path))
                .use_agent(spec.use_ssh_agent),
        ),
        local: Arc::new(ProcessRunner),
        manifests: Arc::new(HttpManifestSource),
    };

    create_cluster(&spec, &effects, &public_key).await?;

    println!();
    println!("{}", "✓ Cluster is ready!".green().bold());
    println!(
        "  export KUBECONFIG={}",
        spec.kubeconfig_path.as_str().cyan()
    );
    Ok(())
}
