//! `CloudCompute` implementation backed by the Hetzner Cloud API.

use crate::api::{
    ApiLoadBalancer, ApiServer, CreateServerBody, FirewallRef, HetznerApi, PublicNetBody,
};
use crate::error::HetznerError;
use async_trait::async_trait;
use clusterflow_cloud::{
    CloudCompute, CreateLoadBalancerRequest, CreateServerRequest, Firewall, FirewallRule,
    LoadBalancer, Network, PlacementGroup, Result, Route, Server, SshKey,
};
use std::collections::BTreeMap;
use std::path::Path;

pub struct HetznerCompute {
    api: HetznerApi,
}

impl HetznerCompute {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            api: HetznerApi::new(token),
        }
    }

    pub fn with_endpoint(token: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            api: HetznerApi::with_endpoint(token, endpoint),
        }
    }

    /// Reads an OpenSSH public key from disk, for key uploads.
    pub fn read_public_key(path: &Path) -> std::result::Result<String, HetznerError> {
        let content = std::fs::read_to_string(path).map_err(|e| HetznerError::PublicKey {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Err(HetznerError::PublicKey {
                path: path.display().to_string(),
                message: "file is empty".into(),
            });
        }
        Ok(trimmed.to_string())
    }
}

fn into_server(s: ApiServer) -> Server {
    Server {
        id: s.id,
        name: s.name,
        public_ipv4: s.public_net.and_then(|n| n.ipv4).map(|ip| ip.ip),
        private_ip: s.private_net.into_iter().next().map(|n| n.ip),
    }
}

fn into_load_balancer(lb: ApiLoadBalancer) -> LoadBalancer {
    LoadBalancer {
        id: lb.id,
        name: lb.name,
        public_ipv4: lb
            .public_net
            .filter(|n| n.enabled)
            .and_then(|n| n.ipv4)
            .map(|ip| ip.ip),
        private_ip: lb.private_net.into_iter().next().map(|n| n.ip),
    }
}

// Name filters on the Hetzner API are substring-ish for some resources,
// so every lookup re-checks for an exact match.
fn exact<T>(items: Vec<T>, name: &str, item_name: impl Fn(&T) -> &str) -> Option<T> {
    items.into_iter().find(|item| item_name(item) == name)
}

#[async_trait]
impl CloudCompute for HetznerCompute {
    async fn find_network(&self, name: &str) -> Result<Option<Network>> {
        let networks = self.api.list_networks(name).await?;
        Ok(exact(networks, name, |n| &n.name).map(|n| Network {
            id: n.id,
            name: n.name,
            ip_range: n.ip_range,
            routes: n
                .routes
                .into_iter()
                .map(|r| Route {
                    destination: r.destination,
                    gateway: r.gateway,
                })
                .collect(),
        }))
    }

    async fn create_network(
        &self,
        name: &str,
        ip_range: &str,
        network_zone: &str,
    ) -> Result<Network> {
        let n = self
            .api
            .create_network(name, ip_range, network_zone)
            .await
            .map_err(clusterflow_cloud::CloudError::from)?;
        Ok(Network {
            id: n.id,
            name: n.name,
            ip_range: n.ip_range,
            routes: Vec::new(),
        })
    }

    async fn delete_network(&self, id: u64) -> Result<()> {
        self.api.delete_network(id).await.map_err(Into::into)
    }

    async fn find_firewall(&self, name: &str) -> Result<Option<Firewall>> {
        let firewalls = self.api.list_firewalls(name).await?;
        Ok(exact(firewalls, name, |f| &f.name).map(|f| Firewall {
            id: f.id,
            name: f.name,
        }))
    }

    async fn create_firewall(&self, name: &str, rules: &[FirewallRule]) -> Result<Firewall> {
        let f = self
            .api
            .create_firewall(name, rules)
            .await
            .map_err(clusterflow_cloud::CloudError::from)?;
        Ok(Firewall {
            id: f.id,
            name: f.name,
        })
    }

    async fn set_firewall_rules(&self, id: u64, rules: &[FirewallRule]) -> Result<()> {
        self.api
            .set_firewall_rules(id, rules)
            .await
            .map_err(Into::into)
    }

    async fn delete_firewall(&self, id: u64) -> Result<()> {
        self.api.delete_firewall(id).await.map_err(Into::into)
    }

    async fn find_ssh_key(&self, name: &str) -> Result<Option<SshKey>> {
        let keys = self.api.list_ssh_keys(name).await?;
        Ok(exact(keys, name, |k| &k.name).map(|k| SshKey {
            id: k.id,
            name: k.name,
        }))
    }

    async fn create_ssh_key(&self, name: &str, public_key: &str) -> Result<SshKey> {
        let k = self
            .api
            .create_ssh_key(name, public_key)
            .await
            .map_err(clusterflow_cloud::CloudError::from)?;
        Ok(SshKey {
            id: k.id,
            name: k.name,
        })
    }

    async fn find_placement_group(&self, name: &str) -> Result<Option<PlacementGroup>> {
        let groups = self
            .api
            .list_placement_groups(name)
            .await?;
        Ok(exact(groups, name, |g| &g.name).map(|g| PlacementGroup {
            id: g.id,
            name: g.name,
        }))
    }

    async fn create_placement_group(&self, name: &str) -> Result<PlacementGroup> {
        let g = self
            .api
            .create_placement_group(name)
            .await
            .map_err(clusterflow_cloud::CloudError::from)?;
        Ok(PlacementGroup {
            id: g.id,
            name: g.name,
        })
    }

    async fn delete_placement_group(&self, id: u64) -> Result<()> {
        self.api
            .delete_placement_group(id)
            .await
            .map_err(Into::into)
    }

    async fn find_server(&self, name: &str) -> Result<Option<Server>> {
        let servers = self.api.list_servers(name).await?;
        Ok(exact(servers, name, |s| &s.name).map(into_server))
    }

    async fn create_server(&self, request: &CreateServerRequest) -> Result<Server> {
        let mut labels = BTreeMap::new();
        labels.insert("cluster".to_string(), request.cluster_name.clone());
        labels.insert("role".to_string(), request.role.clone());
        let body = CreateServerBody {
            name: request.name.clone(),
            server_type: request.instance_type.clone(),
            image: request.image.clone(),
            location: request.location.clone(),
            start_after_create: true,
            user_data: request.user_data.clone(),
            networks: vec![request.network_id],
            firewalls: vec![FirewallRef {
                firewall: request.firewall_id,
            }],
            ssh_keys: vec![request.ssh_key_id],
            placement_group: request.placement_group_id,
            labels,
            public_net: PublicNetBody {
                enable_ipv4: request.enable_public_ipv4,
                enable_ipv6: request.enable_public_ipv6,
            },
        };
        let s = self
            .api
            .create_server(&body)
            .await
            .map_err(clusterflow_cloud::CloudError::from)?;
        Ok(into_server(s))
    }

    async fn delete_server(&self, id: u64) -> Result<()> {
        self.api.delete_server(id).await.map_err(Into::into)
    }

    async fn find_load_balancer(&self, name: &str) -> Result<Option<LoadBalancer>> {
        let lbs = self
            .api
            .list_load_balancers(name)
            .await?;
        Ok(exact(lbs, name, |lb| &lb.name).map(into_load_balancer))
    }

    async fn create_load_balancer(
        &self,
        request: &CreateLoadBalancerRequest,
    ) -> Result<LoadBalancer> {
        let lb = self
            .api
            .create_load_balancer(
                &request.name,
                request.network_id,
                &request.location,
                !request.private_only,
                &request.target_label_selector,
            )
            .await
            .map_err(clusterflow_cloud::CloudError::from)?;
        Ok(into_load_balancer(lb))
    }

    async fn delete_load_balancer(&self, id: u64) -> Result<()> {
        self.api.delete_load_balancer(id).await.map_err(Into::into)
    }

    async fn network_zone(&self, location: &str) -> Result<String> {
        let location = self
            .api
            .get_location(location)
            .await
            .map_err(clusterflow_cloud::CloudError::from)?;
        Ok(location.network_zone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiIp, ApiLbPublicNet, ApiPrivateNet, ApiPublicNet};

    #[test]
    fn server_mapping_picks_first_private_net() {
        let server = into_server(ApiServer {
            id: 7,
            name: "test-cx22-master1".into(),
            public_net: Some(ApiPublicNet {
                ipv4: Some(ApiIp { ip: "1.2.3.4".into() }),
            }),
            private_net: vec![
                ApiPrivateNet { ip: "10.0.0.2".into() },
                ApiPrivateNet { ip: "10.1.0.2".into() },
            ],
        });
        assert_eq!(server.public_ipv4.as_deref(), Some("1.2.3.4"));
        assert_eq!(server.private_ip.as_deref(), Some("10.0.0.2"));
    }

    #[test]
    fn load_balancer_mapping_drops_disabled_public_net() {
        let lb = into_load_balancer(ApiLoadBalancer {
            id: 9,
            name: "test-api".into(),
            public_net: Some(ApiLbPublicNet {
                enabled: false,
                ipv4: Some(ApiIp { ip: "5.6.7.8".into() }),
            }),
            private_net: vec![ApiPrivateNet { ip: "10.0.0.9".into() }],
        });
        assert!(lb.public_ipv4.is_none());
        assert_eq!(lb.private_ip.as_deref(), Some("10.0.0.9"));
    }

    #[test]
    fn exact_match_filters_prefixed_names() {
        let items = vec!["test-cluster-extra".to_string(), "test-cluster".to_string()];
        let found = exact(items, "test-cluster", |s| s.as_str());
        assert_eq!(found.as_deref(), Some("test-cluster"));
    }
}
