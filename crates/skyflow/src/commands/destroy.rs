use super::print_report;
use crate::reconcile::{self, record_all, tracked};
use crate::session;
use colored::Colorize;
use futures_util::future::join_all;
use skyflow_cloud::{ApplyResult, ResourceKind, StateManager};
use std::io::Write;
use std::path::Path;
use std::time::Instant;

pub async fn handle(project_root: &Path, yes: bool) -> anyhow::Result<()> {
    let states = StateManager::new(project_root);
    let lock = states.acquire_lock().await?;
    let mut state = states.load().await?;

    if state.resources.is_empty() {
        println!("{}", "No resources tracked.".yellow());
        lock.release().await?;
        return Ok(());
    }

    println!("{}", "The following resources will be deleted:".red().bold());
    for (address, resource) in &state.resources {
        println!("  • {} ({})", address.cyan(), resource.identifier);
    }

    if !yes && !confirm()? {
        println!("{}", "Cancelled.".yellow());
        lock.release().await?;
        return Ok(());
    }

    let provider = session::provider()?;
    let started = Instant::now();
    let mut report = ApplyResult::new();

    // Rules and IPs go before the servers they point at
    let rules = provider.security_group_rules();
    let outcomes = join_all(
        tracked(&state, ResourceKind::SecurityGroupRule)
            .map(|(address, slot)| reconcile::remove(&rules, address, slot)),
    )
    .await;
    record_all(outcomes, &mut state, &mut report);

    let ips = provider.ips();
    let outcomes = join_all(
        tracked(&state, ResourceKind::Ip)
            .map(|(address, slot)| reconcile::remove(&ips, address, slot)),
    )
    .await;
    record_all(outcomes, &mut state, &mut report);

    let servers = provider.servers();
    let outcomes = join_all(
        tracked(&state, ResourceKind::Server)
            .map(|(address, slot)| reconcile::remove(&servers, address, slot)),
    )
    .await;
    record_all(outcomes, &mut state, &mut report);

    states.save(&state).await?;
    report.duration_ms = started.elapsed().as_millis() as u64;
    lock.release().await?;

    println!();
    print_report(&report);

    if !report.is_success() {
        anyhow::bail!("{} resource(s) could not be deleted", report.failed.len());
    }
    Ok(())
}

fn confirm() -> anyhow::Result<bool> {
    print!("Type 'yes' to continue: ");
    std::io::stdout().flush()?;

    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(answer.trim() == "yes")
}
