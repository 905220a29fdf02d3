//! Firewall rule computation.
//!
//! The rule set is always recomputed in full from the cluster spec and
//! written over whatever the firewall currently holds, so firewall state
//! converges instead of accumulating.

use serde::{Deserialize, Serialize};

pub const KUBERNETES_API_PORT: u16 = 6443;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    Out,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirewallRule {
    pub description: String,
    pub direction: Direction,
    pub protocol: Protocol,
    /// Port or port range; `None` for ICMP, `"any"` for all ports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    pub source_ips: Vec<String>,
}

/// The full desired rule set for a cluster firewall.
///
/// The Kubernetes API rule is only present in HA mode: a single master
/// serves the API on its own address and the port stays closed.
pub fn cluster_rules(
    ssh_allowed_networks: &[String],
    api_allowed_networks: &[String],
    high_availability: bool,
    ssh_port: u16,
    private_network_subnet: &str,
) -> Vec<FirewallRule> {
    let mut rules = vec![
        allow_ssh(ssh_allowed_networks, ssh_port),
        allow_icmp(),
        allow_tcp_between_nodes(private_network_subnet),
        allow_udp_between_nodes(private_network_subnet),
    ];
    if high_availability {
        rules.push(allow_kubernetes_api(api_allowed_networks));
    }
    rules
}

fn allow_ssh(ssh_allowed_networks: &[String], ssh_port: u16) -> FirewallRule {
    FirewallRule {
        description: "Allow SSH port".to_string(),
        direction: Direction::In,
        protocol: Protocol::Tcp,
        port: Some(ssh_port.to_string()),
        source_ips: ssh_allowed_networks.to_vec(),
    }
}

fn allow_icmp() -> FirewallRule {
    FirewallRule {
        description: "Allow ICMP (ping)".to_string(),
        direction: Direction::In,
        protocol: Protocol::Icmp,
        port: None,
        source_ips: vec!["0.0.0.0/0".to_string(), "::/0".to_string()],
    }
}

fn allow_tcp_between_nodes(private_network_subnet: &str) -> FirewallRule {
    FirewallRule {
        description: "Allow all TCP traffic between nodes on the private network".to_string(),
        direction: Direction::In,
        protocol: Protocol::Tcp,
        port: Some("any".to_string()),
        source_ips: vec![private_network_subnet.to_string()],
    }
}

fn allow_udp_between_nodes(private_network_subnet: &str) -> FirewallRule {
    FirewallRule {
        description: "Allow all UDP traffic between nodes on the private network".to_string(),
        direction: Direction::In,
        protocol: Protocol::Udp,
        port: Some("any".to_string()),
        source_ips: vec![private_network_subnet.to_string()],
    }
}

fn allow_kubernetes_api(api_allowed_networks: &[String]) -> FirewallRule {
    FirewallRule {
        description: format!("Allow port {KUBERNETES_API_PORT} (Kubernetes API server)"),
        direction: Direction::In,
        protocol: Protocol::Tcp,
        port: Some(KUBERNETES_API_PORT.to_string()),
        source_ips: api_allowed_networks.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn networks(cidrs: &[&str]) -> Vec<String> {
        cidrs.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn ha_opens_the_api_port() {
        let rules = cluster_rules(
            &networks(&["0.0.0.0/0"]),
            &networks(&["203.0.113.0/24"]),
            true,
            22,
            "10.0.0.0/16",
        );
        assert_eq!(rules.len(), 5);
        let api = rules.last().unwrap();
        assert_eq!(api.port.as_deref(), Some("6443"));
        assert_eq!(api.source_ips, networks(&["203.0.113.0/24"]));
    }

    #[test]
    fn single_master_keeps_api_port_closed() {
        let rules = cluster_rules(
            &networks(&["0.0.0.0/0"]),
            &networks(&["0.0.0.0/0"]),
            false,
            22,
            "10.0.0.0/16",
        );
        assert_eq!(rules.len(), 4);
        assert!(rules.iter().all(|r| r.port.as_deref() != Some("6443")));
    }

    #[test]
    fn custom_ssh_port_is_used() {
        let rules = cluster_rules(
            &networks(&["198.51.100.0/24"]),
            &[],
            false,
            2222,
            "10.0.0.0/16",
        );
        assert_eq!(rules[0].port.as_deref(), Some("2222"));
        assert_eq!(rules[0].source_ips, networks(&["198.51.100.0/24"]));
    }

    #[test]
    fn node_to_node_rules_cover_tcp_and_udp() {
        let rules = cluster_rules(&[], &[], false, 22, "10.0.0.0/16");
        let any_port: Vec<_> = rules
            .iter()
            .filter(|r| r.port.as_deref() == Some("any"))
            .collect();
        assert_eq!(any_port.len(), 2);
        assert!(any_port
            .iter()
            .all(|r| r.source_ips == networks(&["10.0.0.0/16"])));
    }
}
