//! Template rendering for cloud-init payloads, install scripts and
//! Kubernetes manifests.
//!
//! Template sources are embedded in the binary and registered by name;
//! the orchestrator only ever renders by name with a prepared context.

use crate::error::{CoreError, Result};
use tera::Tera;

pub use tera::Context;

/// Cloud-init user data passed to every server create call.
pub const CLOUD_INIT: &str = "cloud_init.yaml";
/// k3s install script for master nodes.
pub const MASTER_INSTALL_SCRIPT: &str = "master_install.sh";
/// k3s install script for worker nodes.
pub const WORKER_INSTALL_SCRIPT: &str = "worker_install.sh";
/// Secret holding the cloud token and network name for in-cluster drivers.
pub const HCLOUD_SECRET_MANIFEST: &str = "hcloud_secret.yaml";
/// Cluster autoscaler deployment with per-pool bounds.
pub const CLUSTER_AUTOSCALER_MANIFEST: &str = "cluster_autoscaler.yaml";

/// Renders the embedded template set.
pub struct TemplateProcessor {
    tera: Tera,
}

impl TemplateProcessor {
    pub fn new() -> Result<Self> {
        let mut tera = Tera::default();
        tera.add_raw_templates(vec![
            (CLOUD_INIT, include_str!("../templates/cloud_init.yaml")),
            (
                MASTER_INSTALL_SCRIPT,
                include_str!("../templates/master_install.sh"),
            ),
            (
                WORKER_INSTALL_SCRIPT,
                include_str!("../templates/worker_install.sh"),
            ),
            (
                HCLOUD_SECRET_MANIFEST,
                include_str!("../templates/hcloud_secret.yaml"),
            ),
            (
                CLUSTER_AUTOSCALER_MANIFEST,
                include_str!("../templates/cluster_autoscaler.yaml"),
            ),
        ])
        .map_err(|e| CoreError::TemplateRender(e.to_string()))?;
        Ok(Self { tera })
    }

    pub fn render(&self, name: &str, context: &Context) -> Result<String> {
        if !self.tera.get_template_names().any(|n| n == name) {
            return Err(CoreError::UnknownTemplate(name.to_string()));
        }
        self.tera
            .render(name, context)
            .map_err(|e| CoreError::TemplateRender(format!("{name}: {e}")))
    }
}
