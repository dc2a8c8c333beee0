//! Flexible IP reconciler

use crate::api::Ip;
use crate::error::{Result, ResultExt, ScalewayError};
use crate::model::{DesiredIp, ObservedIp};
use crate::provider::ScalewayProvider;
use async_trait::async_trait;
use skyflow_cloud::{
    Classify, Identifier, IpAction, IpRecord, MutationToken, Reconciler, ResourceKind, Updatable,
    diff_ip_binding,
};

const KIND: ResourceKind = ResourceKind::Ip;

pub struct IpReconciler {
    provider: ScalewayProvider,
}

impl IpReconciler {
    pub fn new(provider: ScalewayProvider) -> Self {
        Self { provider }
    }

    async fn fetch_existing(&self, id: &str) -> Result<Option<Ip>> {
        let api = self.provider.api();
        match self.provider.call("get ip", || api.get_ip(id)).await {
            Ok(ip) => Ok(Some(ip)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn apply(&self, token: &MutationToken, action: &IpAction) -> Result<()> {
        let api = self.provider.api();
        match action {
            IpAction::Attach { ip_id, server_id } => {
                tracing::info!("Attaching IP {} to server {}", ip_id, server_id);
                self.provider
                    .mutate_with(token, "attach ip", || api.attach_ip(ip_id, server_id))
                    .await
            }
            IpAction::Detach { ip_id } => {
                tracing::info!("Detaching IP {}", ip_id);
                self.provider
                    .mutate_with(token, "detach ip", || api.detach_ip(ip_id))
                    .await
            }
        }
    }

    /// Re-read the address and attach or detach it to match `server`.
    ///
    /// Returns `false` when the address no longer exists.
    async fn bind(&self, id: &str, server: Option<&str>) -> Result<bool> {
        let token = self.provider.lock().await;
        let Some(current) = self.fetch_existing(id).await? else {
            return Ok(false);
        };

        if let Some(action) = diff_ip_binding(&IpRecord::from(&current), server) {
            self.apply(&token, &action).await?;
        }
        Ok(true)
    }
}

fn mirror(ip: Ip) -> ObservedIp {
    ObservedIp {
        id: ip.id,
        address: ip.address,
        server: ip.server.map(|s| s.id),
    }
}

#[async_trait]
impl Reconciler for IpReconciler {
    type Desired = DesiredIp;
    type Observed = ObservedIp;
    type Error = ScalewayError;

    fn kind(&self) -> ResourceKind {
        KIND
    }

    async fn create(&self, desired: &DesiredIp, id: &mut Option<Identifier>) -> Result<ObservedIp> {
        let api = self.provider.api();
        let ip = self
            .provider
            .mutate("create ip", || api.create_ip())
            .await
            .context(KIND, "new", "create")?;

        tracing::info!("Reserved IP {} ({})", ip.address, ip.id);
        *id = Some(Identifier::new(ip.id.clone()));

        if let Some(server) = desired.server.as_deref() {
            let token = self.provider.lock().await;
            let action = IpAction::Attach {
                ip_id: ip.id.clone(),
                server_id: server.to_string(),
            };
            self.apply(&token, &action)
                .await
                .context(KIND, &ip.id, "attach")?;
        }

        match self.read(id).await? {
            Some(observed) => Ok(observed),
            None => Err(ScalewayError::api(404, format!("ip {} vanished after create", ip.id))
                .context(KIND, &ip.id, "read")),
        }
    }

    async fn read(&self, id: &mut Option<Identifier>) -> Result<Option<ObservedIp>> {
        let Some(current) = id.clone() else {
            return Ok(None);
        };

        match self
            .fetch_existing(current.as_str())
            .await
            .context(KIND, current.as_str(), "read")?
        {
            Some(ip) => Ok(Some(mirror(ip))),
            None => {
                tracing::info!("IP {} no longer exists", current);
                *id = None;
                Ok(None)
            }
        }
    }

    async fn delete(&self, id: &mut Option<Identifier>) -> Result<()> {
        let Some(current) = id.clone() else {
            return Ok(());
        };

        let api = self.provider.api();
        match self
            .provider
            .mutate("delete ip", || api.delete_ip(current.as_str()))
            .await
        {
            Ok(()) => tracing::info!("Released IP {}", current),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.context(KIND, current.as_str(), "delete")),
        }

        *id = None;
        Ok(())
    }

    fn desired_from(observed: &ObservedIp) -> DesiredIp {
        DesiredIp {
            server: observed.server.clone(),
        }
    }
}

#[async_trait]
impl Updatable for IpReconciler {
    async fn update(
        &self,
        id: &mut Option<Identifier>,
        desired: &DesiredIp,
    ) -> Result<Option<ObservedIp>> {
        let Some(current) = id.clone() else {
            return Ok(None);
        };

        let exists = self
            .bind(current.as_str(), desired.server.as_deref())
            .await
            .context(KIND, current.as_str(), "update")?;
        if !exists {
            tracing::info!("IP {} no longer exists", current);
            *id = None;
            return Ok(None);
        }

        self.read(id).await
    }
}
