use crate::manifest;
use crate::session;
use colored::Colorize;
use serde::Serialize;
use skyflow_cloud::{Identifier, Reconciler, ResourceKind, StateManager, TrackedResource};
use std::path::Path;

pub async fn handle(
    project_root: &Path,
    kind: ResourceKind,
    name: &str,
    id: String,
) -> anyhow::Result<()> {
    let address = manifest::address(kind, name);
    let states = StateManager::new(project_root);
    let lock = states.acquire_lock().await?;
    let mut state = states.load().await?;

    if let Some(existing) = state.get(&address) {
        anyhow::bail!(
            "{} is already tracked as {}",
            address,
            existing.identifier
        );
    }

    let provider = session::provider()?;
    let id = Identifier::new(id);
    let imported = match kind {
        ResourceKind::Server => import_as_yaml(&provider.servers(), id.clone()).await?,
        ResourceKind::Ip => import_as_yaml(&provider.ips(), id.clone()).await?,
        ResourceKind::SecurityGroupRule => {
            import_as_yaml(&provider.security_group_rules(), id.clone()).await?
        }
        ResourceKind::Volume | ResourceKind::UserData => {
            anyhow::bail!("{} cannot be imported on its own; import its server instead", kind)
        }
    };

    let Some(yaml) = imported else {
        anyhow::bail!("{} {} does not exist", kind, id);
    };

    state.track(
        address.clone(),
        TrackedResource::new(kind, id, serde_json::Value::Null),
    );
    states.save(&state).await?;
    lock.release().await?;

    println!("{} {}", "✓ Imported".green(), address.cyan());
    println!();
    println!("{}", "Add this to your desired-state file:".bold());
    println!("{}", yaml);
    Ok(())
}

async fn import_as_yaml<R>(reconciler: &R, id: Identifier) -> anyhow::Result<Option<String>>
where
    R: Reconciler,
    R::Desired: Serialize,
{
    match reconciler.import(id).await? {
        Some(desired) => Ok(Some(serde_yaml::to_string(&desired)?)),
        None => Ok(None),
    }
}
