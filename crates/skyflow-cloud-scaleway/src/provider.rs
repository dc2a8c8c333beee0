//! Scaleway provider
//!
//! Bundles the API gateway with the retry policy and the mutation
//! serializer shared by every reconciler built from it.

use crate::error::Result;
use crate::gateway::ScalewayApi;
use crate::ip::IpReconciler;
use crate::security_group_rule::SecurityGroupRuleReconciler;
use crate::server::ServerReconciler;
use skyflow_cloud::{MutationSerializer, MutationToken, RetryConfig, with_retry};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Shared context for Scaleway reconcilers.
///
/// Cloning shares the gateway and the serializer.
#[derive(Clone)]
pub struct ScalewayProvider {
    api: Arc<dyn ScalewayApi>,
    retry: RetryConfig,
    wait: RetryConfig,
    serializer: MutationSerializer,
}

impl ScalewayProvider {
    pub fn new(api: Arc<dyn ScalewayApi>) -> Self {
        Self {
            api,
            retry: RetryConfig::default(),
            wait: Self::default_wait(),
            serializer: MutationSerializer::new(),
        }
    }

    /// Polling budget used while waiting for a server to change state
    pub fn default_wait() -> RetryConfig {
        RetryConfig::new(60)
            .with_initial_delay(Duration::from_secs(2))
            .with_max_delay(Duration::from_secs(10))
            .with_backoff_multiplier(1.5)
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_wait(mut self, wait: RetryConfig) -> Self {
        self.wait = wait;
        self
    }

    pub fn servers(&self) -> ServerReconciler {
        ServerReconciler::new(self.clone())
    }

    pub fn ips(&self) -> IpReconciler {
        IpReconciler::new(self.clone())
    }

    pub fn security_group_rules(&self) -> SecurityGroupRuleReconciler {
        SecurityGroupRuleReconciler::new(self.clone())
    }

    pub(crate) fn api(&self) -> &dyn ScalewayApi {
        self.api.as_ref()
    }

    pub(crate) fn wait_config(&self) -> &RetryConfig {
        &self.wait
    }

    pub(crate) async fn lock(&self) -> MutationToken {
        self.serializer.acquire().await
    }

    /// Retried call that does not touch shared state
    pub(crate) async fn call<T, F, Fut>(&self, what: &str, operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        with_retry(&self.retry, what, operation).await
    }

    /// Retried mutation under a token the caller already holds
    pub(crate) async fn mutate_with<T, F, Fut>(
        &self,
        _token: &MutationToken,
        what: &str,
        operation: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        with_retry(&self.retry, what, operation).await
    }

    /// Retried mutation holding the serializer for its duration
    pub(crate) async fn mutate<T, F, Fut>(&self, what: &str, operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.serializer
            .with_exclusive_access(|token| async move {
                self.mutate_with(&token, what, operation).await
            })
            .await
    }
}
