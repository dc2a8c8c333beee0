use anyhow::Context;
use skyflow_cloud_scaleway::{ScalewayClient, ScalewayProvider};
use skyflow_config::ProviderSettings;
use std::sync::Arc;

/// Provider built from `~/.config/skyflow/config.yaml` and `SCW_*` variables
pub fn provider() -> anyhow::Result<ScalewayProvider> {
    let settings = ProviderSettings::load().context("Failed to load provider settings")?;
    tracing::debug!(
        "Using Scaleway region {} for organization {}",
        settings.region,
        settings.organization
    );

    let client = ScalewayClient::new(&settings.token, &settings.organization, &settings.region);
    Ok(ScalewayProvider::new(Arc::new(client)).with_retry(settings.retry_config()))
}
