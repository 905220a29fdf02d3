//! In-memory fakes for the whole effect surface of the orchestrator.

use async_trait::async_trait;
use clusterflow_cloud::{
    CloudCompute, CloudError, CreateLoadBalancerRequest, CreateServerRequest, Firewall,
    FirewallRule, LoadBalancer, Network, PlacementGroup, Server, SshKey,
};
use clusterflow_cluster::addons::ManifestSource;
use clusterflow_cluster::{ClusterError, Effects};
use clusterflow_core::ClusterSpec;
use clusterflow_exec::{ExecError, LocalExec, RemoteExec, ShellResult};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

pub const SAMPLE_KUBECONFIG: &str = "apiVersion: v1
clusters:
- cluster:
    server: https://127.0.0.1:6443
  name: default
contexts:
- context:
    cluster: default
    user: default
  name: default
current-context: default
kind: Config
users:
- name: default
";

#[derive(Default)]
pub struct CloudState {
    next_id: u64,
    pub networks: Vec<Network>,
    pub firewalls: Vec<Firewall>,
    pub ssh_keys: Vec<SshKey>,
    pub placement_groups: Vec<PlacementGroup>,
    pub servers: Vec<Server>,
    pub load_balancers: Vec<LoadBalancer>,
    /// Every create call, as `kind:name`, in order.
    pub created: Vec<String>,
    /// Every delete call, as `kind:name`, in order.
    pub deleted: Vec<String>,
    /// Most recent full rule set written to any firewall.
    pub firewall_rules: Vec<FirewallRule>,
    pub find_load_balancer_calls: usize,
}

impl CloudState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Default)]
pub struct FakeCloud {
    pub state: Mutex<CloudState>,
}

impl FakeCloud {
    pub fn created_count(&self, kind: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .created
            .iter()
            .filter(|entry| entry.starts_with(&format!("{kind}:")))
            .count()
    }

    pub fn seed_server(&self, name: &str, public: Option<&str>, private: Option<&str>) {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id();
        state.servers.push(Server {
            id,
            name: name.to_string(),
            public_ipv4: public.map(str::to_string),
            private_ip: private.map(str::to_string),
        });
    }

    pub fn seed_network(&self, name: &str, routes: Vec<clusterflow_cloud::Route>) {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id();
        state.networks.push(Network {
            id,
            name: name.to_string(),
            ip_range: "10.0.0.0/16".to_string(),
            routes,
        });
    }
}

#[async_trait]
impl CloudCompute for FakeCloud {
    async fn find_network(&self, name: &str) -> clusterflow_cloud::Result<Option<Network>> {
        let state = self.state.lock().unwrap();
        Ok(state.networks.iter().find(|n| n.name == name).cloned())
    }

    async fn create_network(
        &self,
        name: &str,
        ip_range: &str,
        _network_zone: &str,
    ) -> clusterflow_cloud::Result<Network> {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id();
        let network = Network {
            id,
            name: name.to_string(),
            ip_range: ip_range.to_string(),
            routes: Vec::new(),
        };
        state.networks.push(network.clone());
        state.created.push(format!("network:{name}"));
        Ok(network)
    }

    async fn delete_network(&self, id: u64) -> clusterflow_cloud::Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(pos) = state.networks.iter().position(|n| n.id == id) {
            let name = state.networks.remove(pos).name;
            state.deleted.push(format!("network:{name}"));
        }
        Ok(())
    }

    async fn find_firewall(&self, name: &str) -> clusterflow_cloud::Result<Option<Firewall>> {
        let state = self.state.lock().unwrap();
        Ok(state.firewalls.iter().find(|f| f.name == name).cloned())
    }

    async fn create_firewall(
        &self,
        name: &str,
        rules: &[FirewallRule],
    ) -> clusterflow_cloud::Result<Firewall> {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id();
        let firewall = Firewall {
            id,
            name: name.to_string(),
        };
        state.firewalls.push(firewall.clone());
        state.created.push(format!("firewall:{name}"));
        state.firewall_rules = rules.to_vec();
        Ok(firewall)
    }

    async fn set_firewall_rules(
        &self,
        _id: u64,
        rules: &[FirewallRule],
    ) -> clusterflow_cloud::Result<()> {
        self.state.lock().unwrap().firewall_rules = rules.to_vec();
        Ok(())
    }

    async fn delete_firewall(&self, id: u64) -> clusterflow_cloud::Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(pos) = state.firewalls.iter().position(|f| f.id == id) {
            let name = state.firewalls.remove(pos).name;
            state.deleted.push(format!("firewall:{name}"));
        }
        Ok(())
    }

    async fn find_ssh_key(&self, name: &str) -> clusterflow_cloud::Result<Option<SshKey>> {
        let state = self.state.lock().unwrap();
        Ok(state.ssh_keys.iter().find(|k| k.name == name).cloned())
    }

    async fn create_ssh_key(
        &self,
        name: &str,
        _public_key: &str,
    ) -> clusterflow_cloud::Result<SshKey> {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id();
        let key = SshKey {
            id,
            name: name.to_string(),
        };
        state.ssh_keys.push(key.clone());
        state.created.push(format!("ssh_key:{name}"));
        Ok(key)
    }

    async fn find_placement_group(
        &self,
        name: &str,
    ) -> clusterflow_cloud::Result<Option<PlacementGroup>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .placement_groups
            .iter()
            .find(|g| g.name == name)
            .cloned())
    }

    async fn create_placement_group(
        &self,
        name: &str,
    ) -> clusterflow_cloud::Result<PlacementGroup> {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id();
        let group = PlacementGroup {
            id,
            name: name.to_string(),
        };
        state.placement_groups.push(group.clone());
        state.created.push(format!("placement_group:{name}"));
        Ok(group)
    }

    async fn delete_placement_group(&self, id: u64) -> clusterflow_cloud::Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(pos) = state.placement_groups.iter().position(|g| g.id == id) {
            let name = state.placement_groups.remove(pos).name;
            state.deleted.push(format!("placement_group:{name}"));
        }
        Ok(())
    }

    async fn find_server(&self, name: &str) -> clusterflow_cloud::Result<Option<Server>> {
        let state = self.state.lock().unwrap();
        Ok(state.servers.iter().find(|s| s.name == name).cloned())
    }

    async fn create_server(
        &self,
        request: &CreateServerRequest,
    ) -> clusterflow_cloud::Result<Server> {
        let mut state = self.state.lock().unwrap();
        if state.servers.iter().any(|s| s.name == request.name) {
            return Err(CloudError::InvalidRequest(format!(
                "server {} already exists",
                request.name
            )));
        }
        let id = state.next_id();
        let server = Server {
            id,
            name: request.name.clone(),
            public_ipv4: request
                .enable_public_ipv4
                .then(|| format!("192.0.2.{id}")),
            private_ip: Some(format!("10.0.0.{id}")),
        };
        state.servers.push(server.clone());
        state.created.push(format!("server:{}", request.name));
        Ok(server)
    }

    async fn delete_server(&self, id: u64) -> clusterflow_cloud::Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(pos) = state.servers.iter().position(|s| s.id == id) {
            let name = state.servers.remove(pos).name;
            state.deleted.push(format!("server:{name}"));
        }
        Ok(())
    }

    async fn find_load_balancer(
        &self,
        name: &str,
    ) -> clusterflow_cloud::Result<Option<LoadBalancer>> {
        let mut state = self.state.lock().unwrap();
        state.find_load_balancer_calls += 1;
        Ok(state
            .load_balancers
            .iter()
            .find(|lb| lb.name == name)
            .cloned())
    }

    async fn create_load_balancer(
        &self,
        request: &CreateLoadBalancerRequest,
    ) -> clusterflow_cloud::Result<LoadBalancer> {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id();
        let balancer = LoadBalancer {
            id,
            name: request.name.clone(),
            public_ipv4: (!request.private_only).then(|| "203.0.113.10".to_string()),
            private_ip: Some("10.0.0.254".to_string()),
        };
        state.load_balancers.push(balancer.clone());
        state.created.push(format!("load_balancer:{}", request.name));
        Ok(balancer)
    }

    async fn delete_load_balancer(&self, id: u64) -> clusterflow_cloud::Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(pos) = state.load_balancers.iter().position(|lb| lb.id == id) {
            let name = state.load_balancers.remove(pos).name;
            state.deleted.push(format!("load_balancer:{name}"));
        }
        Ok(())
    }

    async fn network_zone(&self, _location: &str) -> clusterflow_cloud::Result<String> {
        Ok("eu-central".to_string())
    }
}

/// Scripted SSH endpoint: answers readiness probes, token reads and
/// kubeconfig fetches; records everything else as an executed command.
#[derive(Default)]
pub struct FakeSsh {
    /// `(host, command)` log of every call.
    pub commands: Mutex<Vec<(String, String)>>,
    /// Hosts that hold a node-token file, keyed by host address.
    pub tokens: HashMap<String, String>,
    /// When set, no host ever answers the readiness probe.
    pub unresponsive: bool,
}

#[async_trait]
impl RemoteExec for FakeSsh {
    async fn execute(
        &self,
        host: &str,
        _port: u16,
        command: &str,
    ) -> clusterflow_exec::Result<String> {
        self.commands
            .lock()
            .unwrap()
            .push((host.to_string(), command.to_string()));
        if command == "echo ready" {
            if self.unresponsive {
                return Err(ExecError::RemoteFailed {
                    host: host.to_string(),
                    status: 255,
                    stderr: "Connection timed out".to_string(),
                });
            }
            return Ok("ready".to_string());
        }
        if command.contains("node-token") {
            return match self.tokens.get(host) {
                Some(token) => Ok(token.clone()),
                None => Err(ExecError::RemoteFailed {
                    host: host.to_string(),
                    status: 1,
                    stderr: "No such file or directory".to_string(),
                }),
            };
        }
        if command.contains("/etc/rancher/k3s/k3s.yaml") {
            return Ok(SAMPLE_KUBECONFIG.to_string());
        }
        if command.contains("/etc/ssl/certs/ca-certificates.crt") {
            return Ok("1".to_string());
        }
        Ok(String::new())
    }
}

/// Records kubectl invocations and reports the given node names.
pub struct FakeLocal {
    pub commands: Mutex<Vec<String>>,
    pub nodes: Vec<String>,
}

impl FakeLocal {
    pub fn new(nodes: Vec<String>) -> Self {
        Self {
            commands: Mutex::new(Vec::new()),
            nodes,
        }
    }
}

#[async_trait]
impl LocalExec for FakeLocal {
    async fn run(
        &self,
        command: &str,
        _env: &BTreeMap<String, String>,
    ) -> clusterflow_exec::Result<ShellResult> {
        self.commands.lock().unwrap().push(command.to_string());
        let output = if command.starts_with("kubectl get nodes") {
            self.nodes.join("\n")
        } else {
            String::new()
        };
        Ok(ShellResult { status: 0, output })
    }
}

pub struct FakeManifests {
    pub body: String,
}

#[async_trait]
impl ManifestSource for FakeManifests {
    async fn fetch(&self, _url: &str) -> clusterflow_cluster::Result<String> {
        if self.body.is_empty() {
            return Err(ClusterError::Download {
                url: _url.to_string(),
                message: "not found".to_string(),
            });
        }
        Ok(self.body.clone())
    }
}

pub struct Harness {
    pub cloud: Arc<FakeCloud>,
    pub ssh: Arc<FakeSsh>,
    pub local: Arc<FakeLocal>,
    pub effects: Effects,
}

/// Node names a fully converged cluster would report.
pub fn expected_nodes(spec: &ClusterSpec) -> Vec<String> {
    let mut nodes = Vec::new();
    for i in 0..spec.master_count() {
        nodes.push(clusterflow_cluster::names::master(
            &spec.cluster_name,
            &spec.masters_pool.instance_type,
            i,
        ));
    }
    for pool in spec.static_worker_pools() {
        for i in 0..pool.instance_count {
            nodes.push(clusterflow_cluster::names::worker(
                &spec.cluster_name,
                &pool.instance_type,
                &pool.name,
                i,
            ));
        }
    }
    nodes
}

pub fn harness_full(ssh: FakeSsh, local: FakeLocal) -> Harness {
    let cloud = Arc::new(FakeCloud::default());
    let ssh = Arc::new(ssh);
    let local = Arc::new(local);
    let manifests = Arc::new(FakeManifests {
        body: "image: ccm\nargs:\n- \"--cluster-cidr=172.16.0.0/16\"\n".to_string(),
    });
    let effects = Effects {
        cloud: cloud.clone(),
        ssh: ssh.clone(),
        local: local.clone(),
        manifests,
    };
    Harness {
        cloud,
        ssh,
        local,
        effects,
    }
}

pub fn harness_with(spec: &ClusterSpec, ssh: FakeSsh) -> Harness {
    harness_full(ssh, FakeLocal::new(expected_nodes(spec)))
}

pub fn harness(spec: &ClusterSpec) -> Harness {
    harness_with(spec, FakeSsh::default())
}

pub fn spec_yaml(kubeconfig_path: &str, masters: u32, extra: &str) -> ClusterSpec {
    let yaml = format!(
        r#"
cluster_name: demo
hcloud_token: test-token
kubeconfig_path: {kubeconfig_path}
k3s_version: v1.29.0+k3s1
public_ssh_key_path: ~/.ssh/id_ed25519.pub
private_ssh_key_path: ~/.ssh/id_ed25519
masters_pool:
  name: masters
  instance_type: cpx21
  instance_count: {masters}
  location: fsn1
{extra}"#
    );
    serde_yaml::from_str(&yaml).unwrap()
}
