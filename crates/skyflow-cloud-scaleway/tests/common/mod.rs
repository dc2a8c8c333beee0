use async_trait::async_trait;
use skyflow_cloud::RetryConfig;
use skyflow_cloud_scaleway::api::{
    Ip, PublicIp, RuleDefinition, SecurityGroupRef, SecurityGroupRule, Server, ServerAction,
    ServerDefinition, ServerPatch, ServerRef, Volume, VolumeDefinition,
};
use skyflow_cloud_scaleway::{Result, ScalewayApi, ScalewayError, ScalewayProvider};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const MUTATIONS: &[&str] = &[
    "create_server",
    "patch_server",
    "delete_server",
    "server_action",
    "create_volume",
    "delete_volume",
    "create_ip",
    "attach_ip",
    "detach_ip",
    "delete_ip",
    "patch_user_data",
    "delete_user_data",
    "create_security_group_rule",
    "delete_security_group_rule",
];

#[derive(Default)]
struct Inner {
    servers: BTreeMap<String, Server>,
    volumes: BTreeMap<String, Volume>,
    ips: BTreeMap<String, Ip>,
    user_data: BTreeMap<String, BTreeMap<String, String>>,
    rules: BTreeMap<String, BTreeMap<String, SecurityGroupRule>>,
    calls: Vec<&'static str>,
    failures: BTreeMap<&'static str, VecDeque<u16>>,
    next_id: u32,
    terminate_leaves_stopped: bool,
}

impl Inner {
    fn id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }

    fn server_mut(&mut self, id: &str) -> Result<&mut Server> {
        self.servers
            .get_mut(id)
            .ok_or_else(|| ScalewayError::api(404, format!("server {} not found", id)))
    }
}

/// In-memory Scaleway with call recording and failure injection
#[derive(Default)]
pub struct FakeScaleway {
    inner: Mutex<Inner>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

#[allow(dead_code)]
impl FakeScaleway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Provider over this fake with short delays
    pub fn provider(self: &Arc<Self>) -> ScalewayProvider {
        let fast = RetryConfig::new(3)
            .with_initial_delay(Duration::from_millis(1))
            .with_max_delay(Duration::from_millis(5));
        let wait = RetryConfig::new(10)
            .with_initial_delay(Duration::from_millis(1))
            .with_max_delay(Duration::from_millis(5));
        ScalewayProvider::new(self.clone())
            .with_retry(fast)
            .with_wait(wait)
    }

    /// Queue a failure with `status` for the next call of `op`
    pub fn fail(&self, op: &'static str, status: u16) {
        let mut inner = self.inner.lock().unwrap();
        inner.failures.entry(op).or_default().push_back(status);
    }

    pub fn terminate_leaves_stopped(&self) {
        self.inner.lock().unwrap().terminate_leaves_stopped = true;
    }

    pub fn seed_ip(&self, address: &str) -> String {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.id("ip");
        inner.ips.insert(
            id.clone(),
            Ip {
                id: id.clone(),
                address: address.to_string(),
                server: None,
            },
        );
        id
    }

    pub fn seed_user_data(&self, server_id: &str, key: &str, value: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .user_data
            .entry(server_id.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
    }

    pub fn set_state(&self, server_id: &str, state: &str) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(server) = inner.servers.get_mut(server_id) {
            server.state = state.to_string();
        }
    }

    /// Remove a server behind the reconciler's back
    pub fn vanish_server(&self, server_id: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.servers.remove(server_id);
        inner.user_data.remove(server_id);
    }

    pub fn server(&self, id: &str) -> Option<Server> {
        self.inner.lock().unwrap().servers.get(id).cloned()
    }

    pub fn server_count(&self) -> usize {
        self.inner.lock().unwrap().servers.len()
    }

    pub fn volume_count(&self) -> usize {
        self.inner.lock().unwrap().volumes.len()
    }

    pub fn ip(&self, id: &str) -> Option<Ip> {
        self.inner.lock().unwrap().ips.get(id).cloned()
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn count(&self, op: &str) -> usize {
        self.calls().iter().filter(|c| **c == op).count()
    }

    pub fn mutation_count(&self) -> usize {
        self.calls().iter().filter(|c| MUTATIONS.contains(c)).count()
    }

    pub fn clear_calls(&self) {
        self.inner.lock().unwrap().calls.clear();
    }

    /// Highest number of mutating calls observed in flight at once
    pub fn peak_mutations(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn begin(&self, op: &'static str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(op);
        match inner.failures.get_mut(op).and_then(|q| q.pop_front()) {
            Some(status) => Err(ScalewayError::api(status, format!("injected {} failure", op))),
            None => Ok(()),
        }
    }

    fn query<T>(&self, op: &'static str, f: impl FnOnce(&mut Inner) -> Result<T>) -> Result<T> {
        self.begin(op)?;
        f(&mut self.inner.lock().unwrap())
    }

    async fn mutate<T, F>(&self, op: &'static str, f: F) -> Result<T>
    where
        T: Send,
        F: FnOnce(&mut Inner) -> Result<T> + Send,
    {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::task::yield_now().await;

        let result = match self.begin(op) {
            Ok(()) => f(&mut self.inner.lock().unwrap()),
            Err(e) => Err(e),
        };

        tokio::task::yield_now().await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

fn not_found(what: &str, id: &str) -> ScalewayError {
    ScalewayError::api(404, format!("{} {} not found", what, id))
}

#[async_trait]
impl ScalewayApi for FakeScaleway {
    async fn get_server(&self, id: &str) -> Result<Server> {
        self.query("get_server", |inner| {
            let server = inner.server_mut(id)?;
            let seen = server.clone();
            match seen.state.as_str() {
                "starting" => server.state = "running".to_string(),
                "stopping" => {
                    let volumes: Vec<String> =
                        server.volumes.values().map(|v| v.id.clone()).collect();
                    inner.servers.remove(id);
                    inner.user_data.remove(id);
                    for volume in volumes {
                        inner.volumes.remove(&volume);
                    }
                }
                _ => {}
            }
            Ok(seen)
        })
    }

    async fn create_server(&self, definition: &ServerDefinition) -> Result<Server> {
        self.mutate("create_server", |inner| {
            let id = inner.id("srv");
            let root_id = inner.id("vol");
            let root = Volume {
                id: root_id.clone(),
                name: format!("{}-root", definition.name),
                size: 50_000_000_000,
                volume_type: "l_ssd".to_string(),
            };
            inner.volumes.insert(root_id, root.clone());

            let mut volumes = BTreeMap::from([("0".to_string(), root)]);
            for (slot, volume_id) in &definition.volumes {
                let volume = inner
                    .volumes
                    .get(volume_id)
                    .cloned()
                    .ok_or_else(|| ScalewayError::api(400, "unknown volume"))?;
                volumes.insert(slot.clone(), volume);
            }

            let server = Server {
                id: id.clone(),
                name: definition.name.clone(),
                image: Some(skyflow_cloud_scaleway::api::ImageRef {
                    id: definition.image.clone(),
                    name: String::new(),
                }),
                commercial_type: definition.commercial_type.clone(),
                enable_ipv6: definition.enable_ipv6,
                dynamic_ip_required: definition.dynamic_ip_required,
                private_ip: Some("10.1.0.4".to_string()),
                public_ip: None,
                ipv6: Some(skyflow_cloud_scaleway::api::Ipv6 {
                    address: "2001:bc8::4".to_string(),
                }),
                state: "stopped".to_string(),
                state_detail: String::new(),
                tags: definition.tags.clone(),
                security_group: definition.security_group.as_ref().map(|id| SecurityGroupRef {
                    id: id.clone(),
                    name: String::new(),
                }),
                bootscript: None,
                volumes,
            };
            inner.servers.insert(id, server.clone());
            Ok(server)
        })
        .await
    }

    async fn patch_server(&self, id: &str, patch: &ServerPatch) -> Result<()> {
        self.mutate("patch_server", |inner| {
            let server = inner.server_mut(id)?;
            if let Some(name) = &patch.name {
                server.name = name.clone();
            }
            if let Some(tags) = &patch.tags {
                server.tags = tags.clone();
            }
            if let Some(enable_ipv6) = patch.enable_ipv6 {
                server.enable_ipv6 = enable_ipv6;
            }
            if let Some(dynamic) = patch.dynamic_ip_required {
                server.dynamic_ip_required = dynamic;
            }
            if let Some(group) = &patch.security_group {
                server.security_group = Some(SecurityGroupRef {
                    id: group.id.clone(),
                    name: String::new(),
                });
            }
            Ok(())
        })
        .await
    }

    async fn delete_server(&self, id: &str) -> Result<()> {
        self.mutate("delete_server", |inner| {
            let server = inner.server_mut(id)?;
            if server.state != "stopped" {
                return Err(ScalewayError::api(400, "server should be stopped"));
            }
            inner.servers.remove(id);
            inner.user_data.remove(id);
            Ok(())
        })
        .await
    }

    async fn server_action(&self, id: &str, action: ServerAction) -> Result<()> {
        self.mutate("server_action", |inner| {
            let leaves_stopped = inner.terminate_leaves_stopped;
            let server = inner.server_mut(id)?;
            server.state = match action {
                ServerAction::PowerOn => "starting",
                ServerAction::Terminate if leaves_stopped => "stopped",
                ServerAction::Terminate => "stopping",
            }
            .to_string();
            Ok(())
        })
        .await
    }

    async fn create_volume(&self, definition: &VolumeDefinition) -> Result<Volume> {
        self.mutate("create_volume", |inner| {
            let id = inner.id("vol");
            let volume = Volume {
                id: id.clone(),
                name: definition.name.clone(),
                size: definition.size,
                volume_type: definition.volume_type.clone(),
            };
            inner.volumes.insert(id, volume.clone());
            Ok(volume)
        })
        .await
    }

    async fn delete_volume(&self, id: &str) -> Result<()> {
        self.mutate("delete_volume", |inner| {
            inner
                .volumes
                .remove(id)
                .map(|_| ())
                .ok_or_else(|| not_found("volume", id))
        })
        .await
    }

    async fn list_ips(&self) -> Result<Vec<Ip>> {
        self.query("list_ips", |inner| Ok(inner.ips.values().cloned().collect()))
    }

    async fn get_ip(&self, id: &str) -> Result<Ip> {
        self.query("get_ip", |inner| {
            inner.ips.get(id).cloned().ok_or_else(|| not_found("ip", id))
        })
    }

    async fn create_ip(&self) -> Result<Ip> {
        self.mutate("create_ip", |inner| {
            let id = inner.id("ip");
            let ip = Ip {
                id: id.clone(),
                address: format!("51.15.0.{}", inner.next_id),
                server: None,
            };
            inner.ips.insert(id, ip.clone());
            Ok(ip)
        })
        .await
    }

    async fn attach_ip(&self, ip_id: &str, server_id: &str) -> Result<()> {
        self.mutate("attach_ip", |inner| {
            let ip = inner.ips.get(ip_id).cloned().ok_or_else(|| not_found("ip", ip_id))?;
            if let Some(previous) = &ip.server {
                if let Some(server) = inner.servers.get_mut(&previous.id) {
                    server.public_ip = None;
                }
            }
            let server = inner.server_mut(server_id)?;
            server.public_ip = Some(PublicIp {
                id: ip.id.clone(),
                address: ip.address.clone(),
                dynamic: false,
            });
            let name = server.name.clone();
            for other in inner.ips.values_mut() {
                if other.server.as_ref().is_some_and(|s| s.id == server_id) {
                    other.server = None;
                }
            }
            if let Some(ip) = inner.ips.get_mut(ip_id) {
                ip.server = Some(ServerRef {
                    id: server_id.to_string(),
                    name,
                });
            }
            Ok(())
        })
        .await
    }

    async fn detach_ip(&self, ip_id: &str) -> Result<()> {
        self.mutate("detach_ip", |inner| {
            let ip = inner.ips.get_mut(ip_id).ok_or_else(|| not_found("ip", ip_id))?;
            if let Some(previous) = ip.server.take() {
                if let Some(server) = inner.servers.get_mut(&previous.id) {
                    server.public_ip = None;
                }
            }
            Ok(())
        })
        .await
    }

    async fn delete_ip(&self, id: &str) -> Result<()> {
        self.mutate("delete_ip", |inner| {
            let ip = inner.ips.remove(id).ok_or_else(|| not_found("ip", id))?;
            if let Some(previous) = ip.server {
                if let Some(server) = inner.servers.get_mut(&previous.id) {
                    server.public_ip = None;
                }
            }
            Ok(())
        })
        .await
    }

    async fn list_user_data(&self, server_id: &str) -> Result<Vec<String>> {
        self.query("list_user_data", |inner| {
            inner.server_mut(server_id)?;
            Ok(inner
                .user_data
                .get(server_id)
                .map(|values| values.keys().cloned().collect())
                .unwrap_or_default())
        })
    }

    async fn get_user_data(&self, server_id: &str, key: &str) -> Result<String> {
        self.query("get_user_data", |inner| {
            inner
                .user_data
                .get(server_id)
                .and_then(|values| values.get(key))
                .cloned()
                .ok_or_else(|| not_found("user data", key))
        })
    }

    async fn patch_user_data(&self, server_id: &str, key: &str, value: &str) -> Result<()> {
        self.mutate("patch_user_data", |inner| {
            inner.server_mut(server_id)?;
            inner
                .user_data
                .entry(server_id.to_string())
                .or_default()
                .insert(key.to_string(), value.to_string());
            Ok(())
        })
        .await
    }

    async fn delete_user_data(&self, server_id: &str, key: &str) -> Result<()> {
        self.mutate("delete_user_data", |inner| {
            inner
                .user_data
                .get_mut(server_id)
                .and_then(|values| values.remove(key))
                .map(|_| ())
                .ok_or_else(|| not_found("user data", key))
        })
        .await
    }

    async fn create_security_group_rule(
        &self,
        group_id: &str,
        definition: &RuleDefinition,
    ) -> Result<SecurityGroupRule> {
        self.mutate("create_security_group_rule", |inner| {
            let id = inner.id("rule");
            let rule = SecurityGroupRule {
                id: id.clone(),
                action: definition.action.clone(),
                direction: definition.direction.clone(),
                ip_range: definition.ip_range.clone(),
                protocol: definition.protocol.clone(),
                dest_port_from: definition.dest_port_from,
            };
            inner
                .rules
                .entry(group_id.to_string())
                .or_default()
                .insert(id, rule.clone());
            Ok(rule)
        })
        .await
    }

    async fn get_security_group_rule(
        &self,
        group_id: &str,
        rule_id: &str,
    ) -> Result<SecurityGroupRule> {
        self.query("get_security_group_rule", |inner| {
            inner
                .rules
                .get(group_id)
                .and_then(|rules| rules.get(rule_id))
                .cloned()
                .ok_or_else(|| not_found("rule", rule_id))
        })
    }

    async fn delete_security_group_rule(&self, group_id: &str, rule_id: &str) -> Result<()> {
        self.mutate("delete_security_group_rule", |inner| {
            inner
                .rules
                .get_mut(group_id)
                .and_then(|rules| rules.remove(rule_id))
                .map(|_| ())
                .ok_or_else(|| not_found("rule", rule_id))
        })
        .await
    }
}
