//! Cluster spec loading and invariant checks.

use crate::error::{CoreError, Result};
use crate::model::ClusterSpec;
use std::path::Path;

/// Load a cluster spec from a YAML file.
///
/// Field validation beyond shape (instance-type existence, CIDR syntax,
/// name uniqueness) is the caller's concern; this only enforces the
/// invariants the orchestrator depends on.
pub fn load_cluster_spec(path: &Path) -> Result<ClusterSpec> {
    let content = std::fs::read_to_string(path).map_err(|e| CoreError::Io {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let spec: ClusterSpec = serde_yaml::from_str(&content)?;
    check_master_count(&spec)?;
    Ok(spec)
}

/// The master pool must hold a single node or an odd quorum-bearing count.
/// An even count > 1 cannot form an etcd quorum and is rejected up front.
pub fn check_master_count(spec: &ClusterSpec) -> Result<()> {
    let count = spec.master_count();
    if count == 0 {
        return Err(CoreError::InvalidConfig(
            "masters_pool.instance_count must be at least 1".to_string(),
        ));
    }
    if count > 1 && count % 2 == 0 {
        return Err(CoreError::InvalidConfig(format!(
            "masters_pool.instance_count must be 1 or an odd number >= 3, got {count}"
        )));
    }
    Ok(())
}
