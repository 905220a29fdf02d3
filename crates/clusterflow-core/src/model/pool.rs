//! Node pool configuration

use serde::{Deserialize, Serialize};

/// A single `key: value` entry used for node labels and taints.
///
/// Taint values may carry an effect suffix (`value:NoExecute`); the
/// orchestrator passes them through to kubectl untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValuePair {
    pub key: String,
    pub value: String,
}

/// Autoscaling bounds for a worker pool.
///
/// Pools with autoscaling enabled are not provisioned up front; the
/// cluster autoscaler creates their instances reactively.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoScaling {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub min_instances: u32,

    #[serde(default)]
    pub max_instances: u32,
}

/// Specification of one node pool (the masters pool or a worker pool).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodePoolSpec {
    pub name: String,

    pub instance_type: String,

    #[serde(default = "default_instance_count")]
    pub instance_count: u32,

    pub location: String,

    /// Per-pool image override; falls back to the cluster-wide image.
    #[serde(default)]
    pub image: Option<String>,

    #[serde(default)]
    pub labels: Vec<KeyValuePair>,

    #[serde(default)]
    pub taints: Vec<KeyValuePair>,

    /// Per-pool package override; falls back to the cluster-wide list.
    #[serde(default)]
    pub additional_packages: Option<Vec<String>>,

    /// Per-pool post-create command override; falls back to the
    /// cluster-wide list.
    #[serde(default)]
    pub post_create_commands: Option<Vec<String>>,

    #[serde(default)]
    pub autoscaling: Option<AutoScaling>,
}

fn default_instance_count() -> u32 {
    1
}

impl NodePoolSpec {
    pub fn autoscaling_enabled(&self) -> bool {
        self.autoscaling.as_ref().is_some_and(|a| a.enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn autoscaling_disabled_by_default() {
        let pool: NodePoolSpec = serde_yaml::from_str(
            r#"
name: small
instance_type: cpx21
location: fsn1
"#,
        )
        .unwrap();

        assert_eq!(pool.instance_count, 1);
        assert!(!pool.autoscaling_enabled());
    }

    #[test]
    fn autoscaling_bounds_parse() {
        let pool: NodePoolSpec = serde_yaml::from_str(
            r#"
name: burst
instance_type: cpx31
instance_count: 2
location: fsn1
autoscaling:
  enabled: true
  min_instances: 1
  max_instances: 6
"#,
        )
        .unwrap();

        assert!(pool.autoscaling_enabled());
        let bounds = pool.autoscaling.unwrap();
        assert_eq!((bounds.min_instances, bounds.max_instances), (1, 6));
    }
}
