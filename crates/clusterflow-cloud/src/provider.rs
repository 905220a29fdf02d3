//! Cloud compute trait definition
//!
//! Name-keyed find/create/delete operations for every resource type the
//! orchestrator reconciles. Implementations are synchronous in the
//! provider sense: a create call returns once the provider has accepted
//! the resource and assigned an id.

use crate::error::Result;
use crate::firewall::FirewallRule;
use crate::resources::{Firewall, LoadBalancer, Network, PlacementGroup, Server, SshKey};
use async_trait::async_trait;

/// Everything a server create call needs, resolved ahead of time.
#[derive(Debug, Clone)]
pub struct CreateServerRequest {
    pub cluster_name: String,
    pub name: String,
    pub instance_type: String,
    pub image: String,
    pub location: String,
    /// `master` or `worker`; attached as a label so the load balancer can
    /// target masters by selector.
    pub role: String,
    /// Rendered cloud-init payload.
    pub user_data: String,
    pub firewall_id: u64,
    pub network_id: u64,
    pub ssh_key_id: u64,
    pub placement_group_id: u64,
    pub enable_public_ipv4: bool,
    pub enable_public_ipv6: bool,
}

#[derive(Debug, Clone)]
pub struct CreateLoadBalancerRequest {
    pub name: String,
    pub network_id: u64,
    pub location: String,
    /// No public interface when true.
    pub private_only: bool,
    /// Label selector for the backend targets, e.g. `cluster=x,role=master`.
    pub target_label_selector: String,
}

/// Cloud provider compute API.
///
/// All lookups are by unique name; "not found" is `Ok(None)`, never an
/// error, so find-or-create reconciliation reads naturally at call sites.
#[async_trait]
pub trait CloudCompute: Send + Sync {
    async fn find_network(&self, name: &str) -> Result<Option<Network>>;
    async fn create_network(&self, name: &str, ip_range: &str, network_zone: &str)
        -> Result<Network>;
    async fn delete_network(&self, id: u64) -> Result<()>;

    async fn find_firewall(&self, name: &str) -> Result<Option<Firewall>>;
    async fn create_firewall(&self, name: &str, rules: &[FirewallRule]) -> Result<Firewall>;
    /// Replace the complete rule set; never merges.
    async fn set_firewall_rules(&self, id: u64, rules: &[FirewallRule]) -> Result<()>;
    async fn delete_firewall(&self, id: u64) -> Result<()>;

    async fn find_ssh_key(&self, name: &str) -> Result<Option<SshKey>>;
    async fn create_ssh_key(&self, name: &str, public_key: &str) -> Result<SshKey>;

    async fn find_placement_group(&self, name: &str) -> Result<Option<PlacementGroup>>;
    async fn create_placement_group(&self, name: &str) -> Result<PlacementGroup>;
    async fn delete_placement_group(&self, id: u64) -> Result<()>;

    async fn find_server(&self, name: &str) -> Result<Option<Server>>;
    /// Returns once the provider accepted the create; the caller polls
    /// separately for private-IP assignment.
    async fn create_server(&self, request: &CreateServerRequest) -> Result<Server>;
    async fn delete_server(&self, id: u64) -> Result<()>;

    async fn find_load_balancer(&self, name: &str) -> Result<Option<LoadBalancer>>;
    async fn create_load_balancer(
        &self,
        request: &CreateLoadBalancerRequest,
    ) -> Result<LoadBalancer>;
    async fn delete_load_balancer(&self, id: u64) -> Result<()>;

    /// Network zone a location belongs to (needed for network create).
    async fn network_zone(&self, location: &str) -> Result<String>;
}
