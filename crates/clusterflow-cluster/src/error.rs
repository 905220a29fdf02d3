use clusterflow_cloud::CloudError;
use clusterflow_core::CoreError;
use clusterflow_exec::ExecError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClusterError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Cloud(#[from] CloudError),

    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error("node {node} did not become reachable over SSH within {timeout_secs}s")]
    SshTimeout { node: String, timeout_secs: u64 },

    #[error("control plane did not report node {node} within {timeout_secs}s")]
    ControlPlaneTimeout { node: String, timeout_secs: u64 },

    #[error("load balancer {name} never received a public IP")]
    LoadBalancerIpTimeout { name: String },

    #[error("server {name} has no reachable address")]
    MissingAddress { name: String },

    #[error("failed to download {url}: {message}")]
    Download { url: String, message: String },

    #[error("failed to write {path}: {message}")]
    Io { path: String, message: String },

    #[error("kubectl failed (status {status}): {output}")]
    Kubectl { status: i32, output: String },

    #[error("provisioning task panicked: {0}")]
    TaskJoin(String),
}

pub type Result<T> = std::result::Result<T, ClusterError>;
