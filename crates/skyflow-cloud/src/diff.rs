//! Diff engines for sub-resource collections
//!
//! Pure functions: given desired and observed collections they compute the
//! minimal set of actions. Callers always recompute from freshly observed
//! state, so a partially applied plan is never replayed twice.

use crate::action::{ActionType, Plan, Planned};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One entry of the provider's IP pool.
///
/// An IP is either unattached or attached to exactly one server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpRecord {
    pub id: String,
    pub address: String,
    pub server: Option<String>,
}

impl IpRecord {
    pub fn is_attached_to(&self, server_id: &str) -> bool {
        self.server.as_deref() == Some(server_id)
    }
}

/// A single IP attachment change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IpAction {
    Attach { ip_id: String, server_id: String },
    Detach { ip_id: String },
}

impl IpAction {
    pub fn ip_id(&self) -> &str {
        match self {
            IpAction::Attach { ip_id, .. } | IpAction::Detach { ip_id } => ip_id,
        }
    }
}

impl Planned for IpAction {
    fn action_type(&self) -> ActionType {
        match self {
            IpAction::Attach { .. } => ActionType::Update,
            IpAction::Detach { .. } => ActionType::Delete,
        }
    }
}

/// Decide how `server_id`'s public address converges on `desired_address`.
///
/// Emits at most one action. Addresses are unique within the pool, so the
/// scan stops at the first match.
pub fn diff_server_ip(
    server_id: &str,
    desired_address: Option<&str>,
    pool: &[IpRecord],
) -> Option<IpAction> {
    match desired_address {
        Some(address) => pool
            .iter()
            .find(|ip| ip.address == address)
            .filter(|ip| !ip.is_attached_to(server_id))
            .map(|ip| IpAction::Attach {
                ip_id: ip.id.clone(),
                server_id: server_id.to_string(),
            }),
        None => pool
            .iter()
            .find(|ip| ip.is_attached_to(server_id))
            .map(|ip| IpAction::Detach {
                ip_id: ip.id.clone(),
            }),
    }
}

/// Decide how a single IP converges on `desired_server`.
pub fn diff_ip_binding(current: &IpRecord, desired_server: Option<&str>) -> Option<IpAction> {
    match (current.server.as_deref(), desired_server) {
        (Some(attached), Some(wanted)) if attached == wanted => None,
        (_, Some(wanted)) => Some(IpAction::Attach {
            ip_id: current.id.clone(),
            server_id: wanted.to_string(),
        }),
        (Some(_), None) => Some(IpAction::Detach {
            ip_id: current.id.clone(),
        }),
        (None, None) => None,
    }
}

/// A single user-data key change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserDataChange {
    /// Write `value` under `key`; `created` is true when the key is new
    Put {
        key: String,
        value: String,
        created: bool,
    },
    Delete {
        key: String,
    },
}

impl UserDataChange {
    pub fn key(&self) -> &str {
        match self {
            UserDataChange::Put { key, .. } | UserDataChange::Delete { key } => key,
        }
    }
}

impl Planned for UserDataChange {
    fn action_type(&self) -> ActionType {
        match self {
            UserDataChange::Put { created: true, .. } => ActionType::Create,
            UserDataChange::Put { created: false, .. } => ActionType::Update,
            UserDataChange::Delete { .. } => ActionType::Delete,
        }
    }
}

/// Compute the changes turning `observed` into `desired`.
///
/// Deletions come first, then writes, each in key order. Keys whose values
/// already match produce nothing, so an unchanged map yields an empty plan.
pub fn diff_user_data(
    desired: &BTreeMap<String, String>,
    observed: &BTreeMap<String, String>,
) -> Plan<UserDataChange> {
    let deletes = observed
        .keys()
        .filter(|key| !desired.contains_key(*key))
        .map(|key| UserDataChange::Delete { key: key.clone() });

    let puts = desired.iter().filter_map(|(key, value)| match observed.get(key) {
        Some(current) if current == value => None,
        current => Some(UserDataChange::Put {
            key: key.clone(),
            value: value.clone(),
            created: current.is_none(),
        }),
    });

    Plan::new(deletes.chain(puts).collect())
}
