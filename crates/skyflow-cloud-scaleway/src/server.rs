//! Server reconciler
//!
//! Create runs strictly in order: volumes, server, user data, power-on,
//! public IP attach. Each remote call goes through the retry policy; calls
//! that mutate shared provider state also hold the mutation serializer, for
//! one call at a time rather than the whole Create.

use crate::api::{SecurityGroupPatch, Server, ServerAction, ServerDefinition, ServerPatch};
use crate::error::{Result, ResultExt, ScalewayError};
use crate::model::{DesiredServer, ObservedServer, PowerState};
use crate::provider::ScalewayProvider;
use crate::userdata::{converge_user_data, read_user_data, write_user_data};
use crate::volume::{observed_volumes, plan_volumes};
use async_trait::async_trait;
use skyflow_cloud::{
    Classify, Identifier, IpAction, IpRecord, MutationToken, Reconciler, ResourceKind,
    Updatable, diff_server_ip, with_retry,
};
use std::collections::BTreeMap;

const KIND: ResourceKind = ResourceKind::Server;

/// How a server is removed, chosen once per Delete from its observed state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionStrategy {
    Stopped,
    Running,
}

/// One step of a deletion sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionStep {
    /// Detach every pool IP attached to the server
    ReleaseIps,
    /// Ask the provider to power off and destroy the server with its volumes
    Terminate,
    /// Wait until the server is gone or stopped
    AwaitShutdown,
    DeleteServer,
    DeleteVolumes,
}

impl DeletionStrategy {
    pub fn for_state(state: &str) -> Self {
        if state == "stopped" {
            DeletionStrategy::Stopped
        } else {
            DeletionStrategy::Running
        }
    }

    pub fn steps(self) -> &'static [DeletionStep] {
        match self {
            DeletionStrategy::Stopped => &[DeletionStep::DeleteServer, DeletionStep::DeleteVolumes],
            DeletionStrategy::Running => &[
                DeletionStep::ReleaseIps,
                DeletionStep::Terminate,
                DeletionStep::AwaitShutdown,
            ],
        }
    }
}

/// Where a server stands once a wait finishes
enum Settled {
    Gone,
    Present(Box<Server>),
}

/// Reconciles [`DesiredServer`] records
pub struct ServerReconciler {
    provider: ScalewayProvider,
}

impl ServerReconciler {
    pub fn new(provider: ScalewayProvider) -> Self {
        Self { provider }
    }

    async fn fetch(&self, id: &str) -> Result<Server> {
        let api = self.provider.api();
        self.provider
            .call("get server", || api.get_server(id))
            .await
    }

    /// Fetch a server, mapping "not found" to `None`
    async fn fetch_existing(&self, id: &str) -> Result<Option<Server>> {
        match self.fetch(id).await {
            Ok(server) => Ok(Some(server)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn observe(&self, server: Server) -> Result<ObservedServer> {
        let user_data = read_user_data(&self.provider, &server.id).await?;
        Ok(mirror(server, user_data))
    }

    async fn create_volumes(&self, desired: &DesiredServer) -> Result<BTreeMap<String, String>> {
        let api = self.provider.api();
        let mut slots = BTreeMap::new();

        for planned in plan_volumes(&desired.name, &desired.volumes) {
            let volume = self
                .provider
                .mutate("create volume", || api.create_volume(&planned.definition))
                .await
                .map_err(|e| {
                    if !slots.is_empty() {
                        tracing::warn!(
                            "Volumes {:?} were created for server {} before the failure",
                            slots.values().collect::<Vec<_>>(),
                            desired.name
                        );
                    }
                    e.context(ResourceKind::Volume, planned.definition.name.clone(), "create")
                })?;

            tracing::info!(
                "Created volume {} ({}) for server {}",
                volume.id,
                planned.definition.name,
                desired.name
            );
            slots.insert(planned.slot, volume.id);
        }

        Ok(slots)
    }

    async fn power_on(&self, id: &str) -> Result<()> {
        let api = self.provider.api();
        self.provider
            .mutate("power on server", || {
                api.server_action(id, ServerAction::PowerOn)
            })
            .await?;

        with_retry(self.provider.wait_config(), "wait for server boot", || async move {
            let server = api.get_server(id).await?;
            if server.state == "running" {
                Ok(())
            } else {
                Err(ScalewayError::Pending {
                    kind: KIND,
                    id: id.to_string(),
                    state: server.state,
                })
            }
        })
        .await
    }

    /// Scan the pool and apply at most one attach/detach for this server.
    ///
    /// With `require_in_pool` a desired address missing from the pool is an
    /// error; otherwise there is nothing to attach and the call is a no-op.
    async fn converge_public_ip(
        &self,
        id: &str,
        desired: Option<&str>,
        require_in_pool: bool,
    ) -> Result<()> {
        let api = self.provider.api();
        let token = self.provider.lock().await;

        let pool: Vec<IpRecord> = self
            .provider
            .call("list ips", || api.list_ips())
            .await?
            .iter()
            .map(IpRecord::from)
            .collect();

        if let Some(address) = desired {
            if !pool.iter().any(|ip| ip.address == address) {
                if require_in_pool {
                    return Err(ScalewayError::IpNotFound(address.to_string()));
                }
                tracing::debug!("Address {} for server {} is not in the pool", address, id);
            }
        }

        match diff_server_ip(id, desired, &pool) {
            Some(action) => apply_ip_action(&self.provider, &token, &action).await,
            None => {
                tracing::debug!("Public IP of server {} already converged", id);
                Ok(())
            }
        }
    }

    async fn patch(&self, id: &str, patch: &ServerPatch) -> Result<()> {
        let api = self.provider.api();
        self.provider
            .mutate("patch server", || api.patch_server(id, patch))
            .await
    }

    async fn execute(&self, strategy: DeletionStrategy, server: &Server) -> Result<Settled> {
        let api = self.provider.api();
        let id = server.id.as_str();

        for step in strategy.steps() {
            tracing::debug!("Deleting server {}: {:?}", id, step);
            match step {
                DeletionStep::ReleaseIps => {
                    let token = self.provider.lock().await;
                    let attached: Vec<IpRecord> = self
                        .provider
                        .call("list ips", || api.list_ips())
                        .await?
                        .iter()
                        .map(IpRecord::from)
                        .filter(|ip| ip.is_attached_to(id))
                        .collect();
                    for ip in attached {
                        let action = IpAction::Detach { ip_id: ip.id };
                        match apply_ip_action(&self.provider, &token, &action).await {
                            Err(e) if !e.is_not_found() => return Err(e),
                            _ => {}
                        }
                    }
                }
                DeletionStep::Terminate => {
                    self.provider
                        .mutate("terminate server", || {
                            api.server_action(id, ServerAction::Terminate)
                        })
                        .await?;
                }
                DeletionStep::AwaitShutdown => {
                    let settled = self.await_shutdown(id).await?;
                    if let Settled::Present(_) = settled {
                        return Ok(settled);
                    }
                }
                DeletionStep::DeleteServer => {
                    self.provider
                        .mutate("delete server", || api.delete_server(id))
                        .await?;
                }
                DeletionStep::DeleteVolumes => {
                    for volume in server.volumes.values() {
                        let deleted = self
                            .provider
                            .mutate("delete volume", || api.delete_volume(&volume.id))
                            .await;
                        match deleted {
                            Err(e) if !e.is_not_found() => {
                                return Err(e.context(ResourceKind::Volume, &volume.id, "delete"));
                            }
                            _ => {}
                        }
                    }
                }
            }
        }

        Ok(Settled::Gone)
    }

    /// Poll until the server disappears or reaches `stopped`
    async fn await_shutdown(&self, id: &str) -> Result<Settled> {
        let api = self.provider.api();
        with_retry(self.provider.wait_config(), "wait for server shutdown", || async move {
            match api.get_server(id).await {
                Ok(server) if server.state == "stopped" => Ok(Settled::Present(Box::new(server))),
                Ok(server) => Err(ScalewayError::Pending {
                    kind: KIND,
                    id: id.to_string(),
                    state: server.state,
                }),
                Err(e) if e.is_not_found() => Ok(Settled::Gone),
                Err(e) => Err(e),
            }
        })
        .await
    }
}

async fn apply_ip_action(
    provider: &ScalewayProvider,
    token: &MutationToken,
    action: &IpAction,
) -> Result<()> {
    let api = provider.api();
    match action {
        IpAction::Attach { ip_id, server_id } => {
            tracing::debug!("Attaching IP {} to server {}", ip_id, server_id);
            provider
                .mutate_with(token, "attach ip", || api.attach_ip(ip_id, server_id))
                .await
                .context(ResourceKind::Ip, ip_id, "attach")
        }
        IpAction::Detach { ip_id } => {
            tracing::debug!("Detaching IP {}", ip_id);
            provider
                .mutate_with(token, "detach ip", || api.detach_ip(ip_id))
                .await
                .context(ResourceKind::Ip, ip_id, "detach")
        }
    }
}

/// Provider payload for a new server
fn definition(desired: &DesiredServer, volumes: BTreeMap<String, String>) -> ServerDefinition {
    ServerDefinition {
        name: desired.name.clone(),
        image: desired.image.clone(),
        commercial_type: desired.server_type.clone(),
        enable_ipv6: desired.enable_ipv6,
        dynamic_ip_required: desired.dynamic_ip_required,
        security_group: desired.security_group.clone(),
        bootscript: desired.bootscript.clone(),
        tags: desired.tags.clone(),
        volumes,
    }
}

/// One patch carrying every attribute that differs from what is observed
fn build_patch(desired: &DesiredServer, observed: &Server) -> ServerPatch {
    let mut patch = ServerPatch::default();

    if desired.name != observed.name {
        patch.name = Some(desired.name.clone());
    }
    if desired.tags != observed.tags {
        patch.tags = Some(desired.tags.clone());
    }
    if desired.enable_ipv6 != observed.enable_ipv6 {
        patch.enable_ipv6 = Some(desired.enable_ipv6);
    }
    if desired.dynamic_ip_required != observed.dynamic_ip_required {
        patch.dynamic_ip_required = Some(desired.dynamic_ip_required);
    }
    if let Some(group) = &desired.security_group {
        let current = observed.security_group.as_ref().map(|g| g.id.as_str());
        if current != Some(group.as_str()) {
            patch.security_group = Some(SecurityGroupPatch { id: group.clone() });
        }
    }

    patch
}

/// Whether the server's pool address differs from the desired one
fn public_ip_changed(desired: Option<&str>, observed: &Server) -> bool {
    match desired {
        Some(address) => observed.public_address() != Some(address),
        None => observed.flexible_address().is_some(),
    }
}

fn mirror(server: Server, user_data: BTreeMap<String, String>) -> ObservedServer {
    let volumes = observed_volumes(&server);
    let public_ipv6 = if server.enable_ipv6 {
        server.ipv6_address().map(str::to_string)
    } else {
        None
    };
    let public_ip = server.public_address().map(str::to_string);

    ObservedServer {
        id: server.id,
        name: server.name,
        image: server.image.map(|i| i.id).unwrap_or_default(),
        server_type: server.commercial_type,
        bootscript: server.bootscript.map(|b| b.id),
        tags: server.tags,
        security_group: server.security_group.map(|g| g.id),
        volumes,
        enable_ipv6: server.enable_ipv6,
        dynamic_ip_required: server.dynamic_ip_required,
        private_ip: server.private_ip,
        public_ip,
        public_ipv6,
        state: server.state,
        state_detail: server.state_detail,
        user_data,
    }
}

#[async_trait]
impl Reconciler for ServerReconciler {
    type Desired = DesiredServer;
    type Observed = ObservedServer;
    type Error = ScalewayError;

    fn kind(&self) -> ResourceKind {
        KIND
    }

    async fn create(
        &self,
        desired: &DesiredServer,
        id: &mut Option<Identifier>,
    ) -> Result<ObservedServer> {
        desired.validate().context(KIND, &desired.name, "validate")?;

        let volumes = self.create_volumes(desired).await?;

        let api = self.provider.api();
        let definition = definition(desired, volumes);
        let server = self
            .provider
            .mutate("create server", || api.create_server(&definition))
            .await
            .context(KIND, &desired.name, "create")?;

        tracing::info!("Created server {} ({})", desired.name, server.id);
        *id = Some(Identifier::new(server.id.clone()));
        let server_id = server.id.as_str();

        write_user_data(&self.provider, server_id, &desired.user_data)
            .await
            .context(KIND, server_id, "write user data")?;

        if desired.state != PowerState::Stopped {
            let mut failures = Vec::new();

            if let Err(e) = self.power_on(server_id).await {
                tracing::warn!("Server {} created but failed to power on: {}", server_id, e);
                failures.push(e.context(KIND, server_id, "power on"));
            }
            if let Some(address) = desired.public_ip.as_deref() {
                if let Err(e) = self.converge_public_ip(server_id, Some(address), true).await {
                    failures.push(e.context(KIND, server_id, "attach public ip"));
                }
            }

            if let Some(e) = ScalewayError::from_all(failures) {
                return Err(e);
            }
        }

        let current = self.fetch(server_id).await.context(KIND, server_id, "read")?;
        self.observe(current).await.context(KIND, server_id, "read")
    }

    async fn read(&self, id: &mut Option<Identifier>) -> Result<Option<ObservedServer>> {
        let Some(current) = id.clone() else {
            return Ok(None);
        };

        let server = match self.fetch_existing(current.as_str()).await {
            Ok(Some(server)) => server,
            Ok(None) => {
                tracing::info!("Server {} no longer exists", current);
                *id = None;
                return Ok(None);
            }
            Err(e) => return Err(e.context(KIND, current.as_str(), "read")),
        };

        match self.observe(server).await {
            Ok(observed) => Ok(Some(observed)),
            Err(e) if e.is_not_found() => {
                tracing::info!("Server {} disappeared while reading user data", current);
                *id = None;
                Ok(None)
            }
            Err(e) => Err(e.context(KIND, current.as_str(), "read")),
        }
    }

    async fn delete(&self, id: &mut Option<Identifier>) -> Result<()> {
        let Some(current) = id.clone() else {
            return Ok(());
        };
        let server_id = current.as_str();

        let Some(server) = self
            .fetch_existing(server_id)
            .await
            .context(KIND, server_id, "delete")?
        else {
            *id = None;
            return Ok(());
        };

        let mut strategy = DeletionStrategy::for_state(&server.state);
        let mut server = server;
        tracing::info!("Deleting server {} ({:?})", server_id, strategy);

        loop {
            match self.execute(strategy, &server).await {
                Ok(Settled::Gone) => break,
                Ok(Settled::Present(stopped)) => {
                    strategy = DeletionStrategy::Stopped;
                    server = *stopped;
                }
                Err(e) if e.is_not_found() => break,
                Err(e) => return Err(e.context(KIND, server_id, "delete")),
            }
        }

        *id = None;
        Ok(())
    }

    /// Volumes keep their declared positions up to the last non-empty one;
    /// trailing zero-size entries are not recoverable from the server.
    fn desired_from(observed: &ObservedServer) -> DesiredServer {
        DesiredServer {
            name: observed.name.clone(),
            image: observed.image.clone(),
            server_type: observed.server_type.clone(),
            bootscript: observed.bootscript.clone(),
            tags: observed.tags.clone(),
            security_group: observed.security_group.clone(),
            volumes: observed.volumes.clone(),
            enable_ipv6: observed.enable_ipv6,
            dynamic_ip_required: observed.dynamic_ip_required,
            public_ip: observed.public_ip.clone(),
            state: PowerState::from_observed(&observed.state),
            user_data: observed.user_data.clone(),
        }
    }
}

#[async_trait]
impl Updatable for ServerReconciler {
    async fn update(
        &self,
        id: &mut Option<Identifier>,
        desired: &DesiredServer,
    ) -> Result<Option<ObservedServer>> {
        let Some(current) = id.clone() else {
            return Ok(None);
        };
        let server_id = current.as_str();

        desired.validate().context(KIND, server_id, "validate")?;

        let Some(server) = self
            .fetch_existing(server_id)
            .await
            .context(KIND, server_id, "update")?
        else {
            tracing::info!("Server {} no longer exists", server_id);
            *id = None;
            return Ok(None);
        };

        let patch = build_patch(desired, &server);
        if !patch.is_empty() {
            tracing::info!("Patching server {}", server_id);
            self.patch(server_id, &patch)
                .await
                .context(KIND, server_id, "patch")?;
        }

        if public_ip_changed(desired.public_ip.as_deref(), &server) {
            self.converge_public_ip(server_id, desired.public_ip.as_deref(), false)
                .await
                .context(KIND, server_id, "update public ip")?;
        }

        converge_user_data(&self.provider, server_id, &desired.user_data)
            .await
            .context(KIND, server_id, "update user data")?;

        self.read(id).await
    }
}
