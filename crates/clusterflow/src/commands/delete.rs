use clusterflow_cloud_hetzner::HetznerCompute;
use clusterflow_cluster::destroy;
use colored::Colorize;
use std::path::Path;

pub async fn handle(config: &str, hcloud_token: String, yes: bool) -> anyhow::Result<()> {
    let spec = clusterflow_core::load_cluster_spec(Path::new(config))?;
    crate::utils::init_logging(spec.debug);

    println!(
        "{}",
        format!("Deleting cluster '{}'...", spec.cluster_name)
            .yellow()
            .bold()
    );

    if !yes {
        println!();
        println!(
            "{}",
            "Warning: this deletes all servers, the load balancer, placement groups, the network and the firewall.".yellow()
        );
        println!("Run again with --yes to proceed.");
        return Ok(());
    }

    let cloud = HetznerCompute::new(hcloud_token);
    destroy(&spec, &cloud).await?;

    println!();
    println!("{}", "✓ Cluster deleted.".green().bold());
    println!("  The SSH key was kept; remove it manually if no longer needed.");
    Ok(())
}
