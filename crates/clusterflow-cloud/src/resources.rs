//! Typed handles for the cloud resources the orchestrator manages.
//!
//! Every resource carries `{id, name}`; reconciliation always anchors on
//! the unique name, the id is only used for delete and cross-reference
//! calls.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Network {
    pub id: u64,
    pub name: String,
    pub ip_range: String,
    #[serde(default)]
    pub routes: Vec<Route>,
}

impl Network {
    /// A `0.0.0.0/0` route means an external gateway (NAT box) depends on
    /// this network; teardown must leave it alone.
    pub fn default_egress_route(&self) -> Option<&Route> {
        self.routes.iter().find(|r| r.destination == "0.0.0.0/0")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    pub destination: String,
    pub gateway: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Firewall {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshKey {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacementGroup {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub public_ipv4: Option<String>,
    #[serde(default)]
    pub private_ip: Option<String>,
}

impl Server {
    /// Address used to reach the server over SSH: public IP when the
    /// server has one, private IP otherwise.
    pub fn host_ip(&self) -> Option<&str> {
        self.public_ipv4
            .as_deref()
            .filter(|ip| !ip.is_empty())
            .or(self.private_ip.as_deref())
    }

    pub fn has_private_ip(&self) -> bool {
        self.private_ip.as_deref().is_some_and(|ip| !ip.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadBalancer {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub public_ipv4: Option<String>,
    #[serde(default)]
    pub private_ip: Option<String>,
}

impl LoadBalancer {
    pub fn has_public_ip(&self) -> bool {
        self.public_ipv4.as_deref().is_some_and(|ip| !ip.is_empty())
    }
}
