//! Per-key server user data

use crate::error::Result;
use crate::provider::ScalewayProvider;
use skyflow_cloud::{PlanSummary, UserDataChange, diff_user_data};
use std::collections::BTreeMap;

/// Load every key and value stored for a server.
///
/// One call for the key list, then one per key.
pub async fn read_user_data(
    provider: &ScalewayProvider,
    server_id: &str,
) -> Result<BTreeMap<String, String>> {
    let api = provider.api();
    let keys = provider
        .call("list user data", || api.list_user_data(server_id))
        .await?;

    let mut values = BTreeMap::new();
    for key in keys {
        let value = provider
            .call("get user data", || api.get_user_data(server_id, &key))
            .await?;
        values.insert(key, value);
    }
    Ok(values)
}

/// Write each entry individually.
pub async fn write_user_data(
    provider: &ScalewayProvider,
    server_id: &str,
    values: &BTreeMap<String, String>,
) -> Result<()> {
    let api = provider.api();
    for (key, value) in values {
        provider
            .mutate("patch user data", || {
                api.patch_user_data(server_id, key, value)
            })
            .await?;
    }
    Ok(())
}

/// Bring a server's user data to `desired`, touching only keys that differ.
///
/// Stops at the first failing change; the diff is recomputed from the
/// provider on the next run, so nothing applied is lost or repeated.
pub async fn converge_user_data(
    provider: &ScalewayProvider,
    server_id: &str,
    desired: &BTreeMap<String, String>,
) -> Result<PlanSummary> {
    let observed = read_user_data(provider, server_id).await?;
    let plan = diff_user_data(desired, &observed);
    let summary = plan.summary();

    if !plan.has_changes() {
        tracing::debug!("User data of server {} already converged", server_id);
        return Ok(summary);
    }

    tracing::info!("User data of server {}: {}", server_id, summary);

    let api = provider.api();
    for change in plan {
        match &change {
            UserDataChange::Delete { key } => {
                provider
                    .mutate("delete user data", || api.delete_user_data(server_id, key))
                    .await?;
            }
            UserDataChange::Put { key, value, .. } => {
                provider
                    .mutate("patch user data", || {
                        api.patch_user_data(server_id, key, value)
                    })
                    .await?;
            }
        }
    }

    Ok(summary)
}
