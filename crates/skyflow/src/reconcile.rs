//! Lifecycle dispatch for one resource address
//!
//! Decides which verb to run from the tracked identifier and turns the
//! result into a state update plus a line in the apply report.

use serde::Serialize;
use skyflow_cloud::{
    ActionType, ApplyResult, Identifier, Reconciler, ResourceKind, StateFile, Updatable,
};

/// Result of running one verb against one address
pub struct Outcome {
    pub address: String,
    pub kind: ResourceKind,
    pub slot: Option<Identifier>,
    pub observed: Option<serde_json::Value>,
    pub result: Result<ActionType, String>,
}

impl Outcome {
    /// Persist the identifier slot and report success or failure
    pub fn record(self, state: &mut StateFile, report: &mut ApplyResult) {
        state.sync_slot(&self.address, self.kind, &self.slot, self.observed);
        match self.result {
            Ok(action) => report.add_success(self.address, action.to_string()),
            Err(error) => report.add_failure(self.address, error),
        }
    }
}

/// Persist a batch of outcomes in order
pub fn record_all(outcomes: Vec<Outcome>, state: &mut StateFile, report: &mut ApplyResult) {
    for outcome in outcomes {
        outcome.record(state, report);
    }
}

/// Addresses and identifiers of one kind, cloned out of the state
pub fn tracked(
    state: &StateFile,
    kind: ResourceKind,
) -> impl Iterator<Item = (String, Option<Identifier>)> + '_ {
    state
        .by_kind(kind)
        .map(|(address, resource)| (address.clone(), Some(resource.identifier.clone())))
}

fn snapshot<T: Serialize>(observed: &T) -> Option<serde_json::Value> {
    serde_json::to_value(observed).ok()
}

/// Create when nothing is tracked, Update otherwise; recreate on drift
pub async fn converge<R>(
    reconciler: &R,
    address: String,
    desired: &R::Desired,
    mut slot: Option<Identifier>,
) -> Outcome
where
    R: Updatable,
    R::Observed: Serialize,
{
    let result: Result<(ActionType, R::Observed), R::Error> = async {
        if slot.is_some() {
            if let Some(observed) = reconciler.update(&mut slot, desired).await? {
                return Ok((ActionType::Update, observed));
            }
            tracing::warn!("{} vanished remotely, recreating", address);
        }
        let observed = reconciler.create(desired, &mut slot).await?;
        Ok((ActionType::Create, observed))
    }
    .await;

    finish(reconciler.kind(), address, slot, result)
}

/// Rules cannot change in place: matching ones are kept, differing ones
/// are deleted and recreated.
pub async fn replace<R>(
    reconciler: &R,
    address: String,
    desired: &R::Desired,
    mut slot: Option<Identifier>,
) -> Outcome
where
    R: Reconciler,
    R::Desired: PartialEq,
    R::Observed: Serialize,
{
    let result: Result<(ActionType, R::Observed), R::Error> = async {
        if let Some(observed) = reconciler.read(&mut slot).await? {
            if R::desired_from(&observed) == *desired {
                return Ok((ActionType::NoOp, observed));
            }
            tracing::info!("{} changed, replacing", address);
            reconciler.delete(&mut slot).await?;
        }
        let observed = reconciler.create(desired, &mut slot).await?;
        Ok((ActionType::Create, observed))
    }
    .await;

    finish(reconciler.kind(), address, slot, result)
}

/// Read back a tracked resource; a vanished one is reported as deleted
pub async fn refresh<R>(reconciler: &R, address: String, mut slot: Option<Identifier>) -> Outcome
where
    R: Reconciler,
    R::Observed: Serialize,
{
    let (observed, result) = match reconciler.read(&mut slot).await {
        Ok(Some(observed)) => (snapshot(&observed), Ok(ActionType::NoOp)),
        Ok(None) => (None, Ok(ActionType::Delete)),
        Err(e) => (None, Err(e.to_string())),
    };

    Outcome {
        address,
        kind: reconciler.kind(),
        slot,
        observed,
        result,
    }
}

pub async fn remove<R: Reconciler>(
    reconciler: &R,
    address: String,
    mut slot: Option<Identifier>,
) -> Outcome {
    let result = reconciler
        .delete(&mut slot)
        .await
        .map(|()| ActionType::Delete)
        .map_err(|e| e.to_string());

    Outcome {
        address,
        kind: reconciler.kind(),
        slot,
        observed: None,
        result,
    }
}

fn finish<O: Serialize, E: std::fmt::Display>(
    kind: ResourceKind,
    address: String,
    slot: Option<Identifier>,
    result: Result<(ActionType, O), E>,
) -> Outcome {
    let (observed, result) = match result {
        Ok((action, observed)) => (snapshot(&observed), Ok(action)),
        Err(e) => (None, Err(e.to_string())),
    };

    Outcome {
        address,
        kind,
        slot,
        observed,
        result,
    }
}
