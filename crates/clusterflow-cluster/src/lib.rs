//! Cluster lifecycle orchestration for clusterflow.
//!
//! Creation runs in phases: infrastructure reconciliation, bounded
//! server provisioning, k3s bootstrap, then addon installation. Every
//! phase anchors on deterministic resource names, so re-running create
//! converges on existing state instead of duplicating it. Deletion
//! walks the reverse order.

pub mod addons;
pub mod bootstrap;
pub mod create;
pub mod delete;
pub mod error;
pub mod names;
pub mod provision;
pub mod reconcile;
pub mod topology;

pub use addons::{HttpManifestSource, ManifestSource};
pub use create::{create_cluster, Effects};
pub use delete::destroy;
pub use error::{ClusterError, Result};
pub use topology::{ClusterTopology, NodeRole};
