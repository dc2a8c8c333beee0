use crate::reconcile::{self, Outcome, tracked};
use crate::session;
use colored::Colorize;
use futures_util::future::join_all;
use skyflow_cloud::{ActionType, ResourceKind, StateManager};
use std::path::Path;

pub async fn handle(project_root: &Path) -> anyhow::Result<()> {
    let states = StateManager::new(project_root);
    let lock = states.acquire_lock().await?;
    let mut state = states.load().await?;

    if state.resources.is_empty() {
        println!("{}", "No resources tracked.".yellow());
        lock.release().await?;
        return Ok(());
    }

    let provider = session::provider()?;
    let servers = provider.servers();
    let ips = provider.ips();
    let rules = provider.security_group_rules();

    let mut outcomes = Vec::new();
    outcomes.extend(
        join_all(
            tracked(&state, ResourceKind::Server)
                .map(|(address, slot)| reconcile::refresh(&servers, address, slot)),
        )
        .await,
    );
    outcomes.extend(
        join_all(
            tracked(&state, ResourceKind::Ip)
                .map(|(address, slot)| reconcile::refresh(&ips, address, slot)),
        )
        .await,
    );
    outcomes.extend(
        join_all(
            tracked(&state, ResourceKind::SecurityGroupRule)
                .map(|(address, slot)| reconcile::refresh(&rules, address, slot)),
        )
        .await,
    );

    let mut failures = 0;
    for outcome in outcomes {
        print_outcome(&outcome);
        if outcome.result.is_err() {
            failures += 1;
            continue;
        }
        state.sync_slot(&outcome.address, outcome.kind, &outcome.slot, outcome.observed);
    }

    states.save(&state).await?;
    lock.release().await?;

    if failures > 0 {
        anyhow::bail!("{} resource(s) could not be read", failures);
    }
    Ok(())
}

fn print_outcome(outcome: &Outcome) {
    match &outcome.result {
        Ok(ActionType::Delete) => println!(
            "  {} {} no longer exists, dropped from state",
            "⚠".yellow(),
            outcome.address.cyan()
        ),
        Ok(_) => {
            let id = outcome
                .slot
                .as_ref()
                .map(|id| id.to_string())
                .unwrap_or_default();
            println!(
                "  {} {} {} {}",
                "✓".green(),
                outcome.address.cyan(),
                id.dimmed(),
                summary(outcome.observed.as_ref())
            );
        }
        Err(e) => println!("  {} {}: {}", "✗".red(), outcome.address.cyan(), e),
    }
}

/// Short description of observed state: lifecycle and addresses when present
fn summary(observed: Option<&serde_json::Value>) -> String {
    let Some(observed) = observed else {
        return String::new();
    };
    ["state", "public_ip", "address", "server", "ip_range"]
        .iter()
        .filter_map(|field| observed.get(field).and_then(|v| v.as_str()))
        .collect::<Vec<_>>()
        .join(" ")
}
