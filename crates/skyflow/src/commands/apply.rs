use super::print_report;
use crate::manifest::{self, Manifest};
use crate::reconcile::{self, record_all};
use crate::session;
use colored::Colorize;
use futures_util::future::join_all;
use skyflow_cloud::{ApplyResult, ResourceKind, StateFile, StateManager};
use std::path::{Path, PathBuf};
use std::time::Instant;

pub async fn handle(project_root: &Path, file: Option<PathBuf>) -> anyhow::Result<()> {
    let path = match file {
        Some(path) => path,
        None => skyflow_config::find_desired_file()?,
    };
    println!("📄 {}", path.display().to_string().cyan());

    let manifest = Manifest::load(&path)?;
    if manifest.is_empty() {
        println!("{}", "Nothing declared.".yellow());
        return Ok(());
    }

    let provider = session::provider()?;
    let states = StateManager::new(project_root);
    let lock = states.acquire_lock().await?;
    let mut state = states.load().await?;

    let started = Instant::now();
    let mut report = ApplyResult::new();

    println!();
    println!(
        "{}",
        format!("Reconciling {} resource(s)...", manifest.len()).blue().bold()
    );

    // Servers first: IPs may reference them by address
    let servers = provider.servers();
    let outcomes = join_all(manifest.servers.iter().map(|(name, desired)| {
        let address = manifest::address(ResourceKind::Server, name);
        let slot = state.identifier(&address);
        reconcile::converge(&servers, address, desired, slot)
    }))
    .await;
    record_all(outcomes, &mut state, &mut report);
    states.save(&state).await?;

    let ips = provider.ips();
    let mut resolved = Vec::new();
    for (name, desired) in &manifest.ips {
        let address = manifest::address(ResourceKind::Ip, name);
        match manifest::resolve_ip(desired, &state) {
            Ok(desired) => resolved.push((address, desired)),
            Err(e) => report.add_failure(address, e.to_string()),
        }
    }
    let outcomes = join_all(resolved.iter().map(|(address, desired)| {
        let slot = state.identifier(address);
        reconcile::converge(&ips, address.clone(), desired, slot)
    }))
    .await;
    record_all(outcomes, &mut state, &mut report);
    states.save(&state).await?;

    let rules = provider.security_group_rules();
    let outcomes = join_all(manifest.security_group_rules.iter().map(|(name, desired)| {
        let address = manifest::address(ResourceKind::SecurityGroupRule, name);
        let slot = state.identifier(&address);
        reconcile::replace(&rules, address, desired, slot)
    }))
    .await;
    record_all(outcomes, &mut state, &mut report);
    states.save(&state).await?;

    warn_untracked(&manifest, &state);

    report.duration_ms = started.elapsed().as_millis() as u64;
    lock.release().await?;

    println!();
    print_report(&report);

    if !report.is_success() {
        anyhow::bail!("{} resource(s) failed to reconcile", report.failed.len());
    }
    Ok(())
}

/// Tracked resources that are no longer declared are left alone
fn warn_untracked(manifest: &Manifest, state: &StateFile) {
    let declared: Vec<String> = manifest
        .servers
        .keys()
        .map(|name| manifest::address(ResourceKind::Server, name))
        .chain(
            manifest
                .ips
                .keys()
                .map(|name| manifest::address(ResourceKind::Ip, name)),
        )
        .chain(
            manifest
                .security_group_rules
                .keys()
                .map(|name| manifest::address(ResourceKind::SecurityGroupRule, name)),
        )
        .collect();

    for address in state.resources.keys() {
        if !declared.contains(address) {
            println!(
                "  {} {} is tracked but no longer declared",
                "⚠".yellow(),
                address.cyan()
            );
        }
    }
}
