//! Four-verb lifecycle contract shared by every resource reconciler

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier assigned by the provider at creation.
///
/// The sole correlation key between a desired record and what the provider
/// reports. Never reused once the resource is deleted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identifier(String);

impl Identifier {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identifier {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for Identifier {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Kind of managed resource, used in error context and state keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Server,
    Ip,
    SecurityGroupRule,
    Volume,
    UserData,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Server => write!(f, "server"),
            ResourceKind::Ip => write!(f, "ip"),
            ResourceKind::SecurityGroupRule => write!(f, "security_group_rule"),
            ResourceKind::Volume => write!(f, "volume"),
            ResourceKind::UserData => write!(f, "user_data"),
        }
    }
}

impl std::str::FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "server" => Ok(ResourceKind::Server),
            "ip" => Ok(ResourceKind::Ip),
            "security_group_rule" | "security-group-rule" | "rule" => {
                Ok(ResourceKind::SecurityGroupRule)
            }
            "volume" => Ok(ResourceKind::Volume),
            "user_data" | "user-data" => Ok(ResourceKind::UserData),
            other => Err(format!("unknown resource kind: {}", other)),
        }
    }
}

/// Create / Read / Delete / import for one resource kind.
///
/// The identifier lives in a caller-owned slot. Verbs set it when the provider
/// assigns one and clear it when the provider reports the resource gone, so
/// drift is visible to the caller without an error.
#[async_trait]
pub trait Reconciler: Send + Sync {
    /// Caller-supplied attributes
    type Desired: Send + Sync;

    /// Canonical state mirrored back from the provider
    type Observed: Send + Sync;

    type Error: std::error::Error + Send + Sync + 'static;

    fn kind(&self) -> ResourceKind;

    /// Create the resource and return its canonical state.
    ///
    /// `id` is set as soon as the provider assigns an identifier. A failure
    /// after that point returns an error with `id` still set, so the caller
    /// can converge the partially created resource later. A failure before it
    /// leaves `id` empty: the resource never existed.
    async fn create(
        &self,
        desired: &Self::Desired,
        id: &mut Option<Identifier>,
    ) -> Result<Self::Observed, Self::Error>;

    /// Reload canonical state.
    ///
    /// Returns `Ok(None)` and clears `id` when the provider reports the
    /// resource as absent.
    async fn read(
        &self,
        id: &mut Option<Identifier>,
    ) -> Result<Option<Self::Observed>, Self::Error>;

    /// Remove the resource, clearing `id` on success.
    ///
    /// On failure `id` is left untouched so a later run can retry against
    /// the same remote resource.
    async fn delete(&self, id: &mut Option<Identifier>) -> Result<(), Self::Error>;

    /// Project observed state onto the shape of a desired record.
    fn desired_from(observed: &Self::Observed) -> Self::Desired;

    /// Import an existing resource from a bare identifier.
    async fn import(&self, id: Identifier) -> Result<Option<Self::Desired>, Self::Error> {
        let mut slot = Some(id);
        let observed = self.read(&mut slot).await?;
        Ok(observed.as_ref().map(Self::desired_from))
    }
}

/// Resources that support post-create mutation.
#[async_trait]
pub trait Updatable: Reconciler {
    /// Converge the existing resource toward `desired` and return its
    /// canonical state. `Ok(None)` means the resource disappeared remotely.
    async fn update(
        &self,
        id: &mut Option<Identifier>,
        desired: &Self::Desired,
    ) -> Result<Option<Self::Observed>, Self::Error>;
}
