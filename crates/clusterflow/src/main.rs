mod commands;
mod utils;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "clusterflow")]
#[command(about = "Create and manage k3s clusters on Hetzner Cloud", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a cluster, or converge an existing one on its config
    Create {
        /// Path to the cluster configuration file
        #[arg(short, long)]
        config: String,
        /// Hetzner Cloud API token
        #[arg(long, env = "HCLOUD_TOKEN", hide_env_values = true)]
        hcloud_token: String,
    },
    /// Delete a cluster and the cloud resources it owns
    Delete {
        /// Path to the cluster configuration file
        #[arg(short, long)]
        config: String,
        /// Hetzner Cloud API token
        #[arg(long, env = "HCLOUD_TOKEN", hide_env_values = true)]
        hcloud_token: String,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Print version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Create {
            config,
            hcloud_token,
        } => {
            commands::create::handle(&config, hcloud_token).await?;
        }
        Commands::Delete {
            config,
            hcloud_token,
            yes,
        } => {
            commands::delete::handle(&config, hcloud_token, yes).await?;
        }
        Commands::Version => {
            println!("clusterflow {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
