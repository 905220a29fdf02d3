//! Cloud compute abstraction for clusterflow.
//!
//! Defines the provider-neutral [`CloudCompute`] trait plus the typed
//! resource handles and the convergent firewall rule computation. The
//! Hetzner implementation lives in `clusterflow-cloud-hetzner`; tests
//! substitute in-memory fakes.

pub mod error;
pub mod firewall;
pub mod provider;
pub mod resources;

pub use error::{CloudError, Result};
pub use firewall::{cluster_rules, Direction, FirewallRule, Protocol, KUBERNETES_API_PORT};
pub use provider::{CloudCompute, CreateLoadBalancerRequest, CreateServerRequest};
pub use resources::{Firewall, LoadBalancer, Network, PlacementGroup, Route, Server, SshKey};
