//! Thin typed wrapper over the Hetzner Cloud v1 REST API.
//!
//! Only the endpoints the orchestrator needs: name-filtered list, create
//! and delete per resource type, plus the firewall set-rules action.

use crate::error::{HetznerError, Result};
use clusterflow_cloud::firewall::FirewallRule;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

const DEFAULT_ENDPOINT: &str = "https://api.hetzner.cloud/v1";

pub struct HetznerApi {
    client: reqwest::Client,
    token: String,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiNetwork {
    pub id: u64,
    pub name: String,
    pub ip_range: String,
    #[serde(default)]
    pub routes: Vec<ApiRoute>,
}

#[derive(Debug, Deserialize)]
pub struct ApiRoute {
    pub destination: String,
    pub gateway: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiNamedResource {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiServer {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub public_net: Option<ApiPublicNet>,
    #[serde(default)]
    pub private_net: Vec<ApiPrivateNet>,
}

#[derive(Debug, Deserialize)]
pub struct ApiPublicNet {
    #[serde(default)]
    pub ipv4: Option<ApiIp>,
}

#[derive(Debug, Deserialize)]
pub struct ApiIp {
    pub ip: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiPrivateNet {
    pub ip: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiLoadBalancer {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub public_net: Option<ApiLbPublicNet>,
    #[serde(default)]
    pub private_net: Vec<ApiPrivateNet>,
}

#[derive(Debug, Deserialize)]
pub struct ApiLbPublicNet {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub ipv4: Option<ApiIp>,
}

#[derive(Debug, Deserialize)]
pub struct ApiLocation {
    pub name: String,
    pub network_zone: String,
}

#[derive(Debug, Serialize)]
pub struct CreateServerBody {
    pub name: String,
    pub server_type: String,
    pub image: String,
    pub location: String,
    pub start_after_create: bool,
    pub user_data: String,
    pub networks: Vec<u64>,
    pub firewalls: Vec<FirewallRef>,
    pub ssh_keys: Vec<u64>,
    pub placement_group: u64,
    pub labels: std::collections::BTreeMap<String, String>,
    pub public_net: PublicNetBody,
}

#[derive(Debug, Serialize)]
pub struct FirewallRef {
    pub firewall: u64,
}

#[derive(Debug, Serialize)]
pub struct PublicNetBody {
    pub enable_ipv4: bool,
    pub enable_ipv6: bool,
}

impl HetznerApi {
    pub fn new(token: impl Into<String>) -> Self {
        Self::with_endpoint(token, DEFAULT_ENDPOINT)
    }

    /// Point the client at a different API endpoint, e.g. a mock server.
    pub fn with_endpoint(token: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            token: token.into(),
            endpoint: endpoint.into(),
        }
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<T> {
        tracing::debug!(%method, path, "hetzner api call");
        let mut req = self
            .client
            .request(method, format!("{}{}", self.endpoint, path))
            .bearer_auth(&self.token);
        if let Some(body) = body {
            req = req.json(&body);
        }
        let response = req.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = match response.json::<ApiErrorBody>().await {
                Ok(body) => body.error.message,
                Err(_) => status.to_string(),
            };
            return Err(HetznerError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json::<T>().await?)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        tracing::debug!(path, "hetzner api delete");
        let response = self
            .client
            .delete(format!("{}{}", self.endpoint, path))
            .bearer_auth(&self.token)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let message = match response.json::<ApiErrorBody>().await {
                Ok(body) => body.error.message,
                Err(_) => status.to_string(),
            };
            return Err(HetznerError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }

    pub async fn list_networks(&self, name: &str) -> Result<Vec<ApiNetwork>> {
        #[derive(Deserialize)]
        struct Body {
            networks: Vec<ApiNetwork>,
        }
        let body: Body = self
            .request(Method::GET, &format!("/networks?name={name}"), None)
            .await?;
        Ok(body.networks)
    }

    pub async fn create_network(
        &self,
        name: &str,
        ip_range: &str,
        network_zone: &str,
    ) -> Result<ApiNetwork> {
        #[derive(Deserialize)]
        struct Body {
            network: ApiNetwork,
        }
        let body: Body = self
            .request(
                Method::POST,
                "/networks",
                Some(json!({
                    "name": name,
                    "ip_range": ip_range,
                    "subnets": [{
                        "type": "cloud",
                        "network_zone": network_zone,
                        "ip_range": ip_range,
                    }],
                })),
            )
            .await?;
        Ok(body.network)
    }

    pub async fn delete_network(&self, id: u64) -> Result<()> {
        self.delete(&format!("/networks/{id}")).await
    }

    pub async fn list_firewalls(&self, name: &str) -> Result<Vec<ApiNamedResource>> {
        #[derive(Deserialize)]
        struct Body {
            firewalls: Vec<ApiNamedResource>,
        }
        let body: Body = self
            .request(Method::GET, &format!("/firewalls?name={name}"), None)
            .await?;
        Ok(body.firewalls)
    }

    pub async fn create_firewall(
        &self,
        name: &str,
        rules: &[FirewallRule],
    ) -> Result<ApiNamedResource> {
        #[derive(Deserialize)]
        struct Body {
            firewall: ApiNamedResource,
        }
        let body: Body = self
            .request(
                Method::POST,
                "/firewalls",
                Some(json!({ "name": name, "rules": rules })),
            )
            .await?;
        Ok(body.firewall)
    }

    pub async fn set_firewall_rules(&self, id: u64, rules: &[FirewallRule]) -> Result<()> {
        let _: serde_json::Value = self
            .request(
                Method::POST,
                &format!("/firewalls/{id}/actions/set_rules"),
                Some(json!({ "rules": rules })),
            )
            .await?;
        Ok(())
    }

    pub async fn delete_firewall(&self, id: u64) -> Result<()> {
        self.delete(&format!("/firewalls/{id}")).await
    }

    pub async fn list_ssh_keys(&self, name: &str) -> Result<Vec<ApiNamedResource>> {
        #[derive(Deserialize)]
        struct Body {
            ssh_keys: Vec<ApiNamedResource>,
        }
        let body: Body = self
            .request(Method::GET, &format!("/ssh_keys?name={name}"), None)
            .await?;
        Ok(body.ssh_keys)
    }

    pub async fn create_ssh_key(&self, name: &str, public_key: &str) -> Result<ApiNamedResource> {
        #[derive(Deserialize)]
        struct Body {
            ssh_key: ApiNamedResource,
        }
        let body: Body = self
            .request(
                Method::POST,
                "/ssh_keys",
                Some(json!({ "name": name, "public_key": public_key })),
            )
            .await?;
        Ok(body.ssh_key)
    }

    pub async fn list_placement_groups(&self, name: &str) -> Result<Vec<ApiNamedResource>> {
        #[derive(Deserialize)]
        struct Body {
            placement_groups: Vec<ApiNamedResource>,
        }
        let body: Body = self
            .request(Method::GET, &format!("/placement_groups?name={name}"), None)
            .await?;
        Ok(body.placement_groups)
    }

    pub async fn create_placement_group(&self, name: &str) -> Result<ApiNamedResource> {
        #[derive(Deserialize)]
        struct Body {
            placement_group: ApiNamedResource,
        }
        let body: Body = self
            .request(
                Method::POST,
                "/placement_groups",
                Some(json!({ "name": name, "type": "spread" })),
            )
            .await?;
        Ok(body.placement_group)
    }

    pub async fn delete_placement_group(&self, id: u64) -> Result<()> {
        self.delete(&format!("/placement_groups/{id}")).await
    }

    pub async fn list_servers(&self, name: &str) -> Result<Vec<ApiServer>> {
        #[derive(Deserialize)]
        struct Body {
            servers: Vec<ApiServer>,
        }
        let body: Body = self
            .request(Method::GET, &format!("/servers?name={name}"), None)
            .await?;
        Ok(body.servers)
    }

    pub async fn create_server(&self, body: &CreateServerBody) -> Result<ApiServer> {
        #[derive(Deserialize)]
        struct Response {
            server: ApiServer,
        }
        let response: Response = self
            .request(
                Method::POST,
                "/servers",
                Some(serde_json::to_value(body).map_err(|e| HetznerError::Api {
                    status: 0,
                    message: e.to_string(),
                })?),
            )
            .await?;
        Ok(response.server)
    }

    pub async fn delete_server(&self, id: u64) -> Result<()> {
        self.delete(&format!("/servers/{id}")).await
    }

    pub async fn list_load_balancers(&self, name: &str) -> Result<Vec<ApiLoadBalancer>> {
        #[derive(Deserialize)]
        struct Body {
            load_balancers: Vec<ApiLoadBalancer>,
        }
        let body: Body = self
            .request(Method::GET, &format!("/load_balancers?name={name}"), None)
            .await?;
        Ok(body.load_balancers)
    }

    pub async fn create_load_balancer(
        &self,
        name: &str,
        network_id: u64,
        location: &str,
        public_interface: bool,
        target_label_selector: &str,
    ) -> Result<ApiLoadBalancer> {
        #[derive(Deserialize)]
        struct Body {
            load_balancer: ApiLoadBalancer,
        }
        let body: Body = self
            .request(
                Method::POST,
                "/load_balancers",
                Some(json!({
                    "name": name,
                    "load_balancer_type": "lb11",
                    "location": location,
                    "network": network_id,
                    "public_interface": public_interface,
                    "algorithm": { "type": "round_robin" },
                    "services": [{
                        "protocol": "tcp",
                        "listen_port": 6443,
                        "destination_port": 6443,
                        "proxyprotocol": false,
                    }],
                    "targets": [{
                        "type": "label_selector",
                        "label_selector": { "selector": target_label_selector },
                        "use_private_ip": true,
                    }],
                })),
            )
            .await?;
        Ok(body.load_balancer)
    }

    pub async fn delete_load_balancer(&self, id: u64) -> Result<()> {
        self.delete(&format!("/load_balancers/{id}")).await
    }

    pub async fn get_location(&self, name: &str) -> Result<ApiLocation> {
        #[derive(Deserialize)]
        struct Body {
            locations: Vec<ApiLocation>,
        }
        let body: Body = self
            .request(Method::GET, &format!("/locations?name={name}"), None)
            .await?;
        body.locations
            .into_iter()
            .find(|l| l.name == name)
            .ok_or_else(|| HetznerError::UnknownLocation(name.to_string()))
    }
}
