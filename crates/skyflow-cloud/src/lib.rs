//! Skyflow cloud reconciliation core
//!
//! Provider-neutral building blocks for converging declared infrastructure
//! onto a remote cloud API. Provider crates (such as `skyflow-cloud-scaleway`)
//! compose them into per-resource reconcilers.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                 sky CLI (caller)                 │
//! │        apply / show / import / destroy           │
//! └─────────────────┬───────────────────────────────┘
//!                   │ Reconciler / Updatable
//! ┌─────────────────▼───────────────────────────────┐
//! │                 skyflow-cloud                    │
//! │  ┌──────────────┐  ┌────────────────────────┐   │
//! │  │ Retry Policy │  │  Mutation Serializer   │   │
//! │  └──────────────┘  └────────────────────────┘   │
//! │  ┌──────────────┐  ┌────────────────────────┐   │
//! │  │ Diff Engines │  │   State (identifiers)  │   │
//! │  └──────────────┘  └────────────────────────┘   │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │     skyflow-cloud-scaleway (gateway + reconcilers)│
//! └─────────────────────────────────────────────────┘
//! ```

pub mod action;
pub mod diff;
pub mod error;
pub mod lifecycle;
pub mod retry;
pub mod serializer;
pub mod state;

// Re-exports
pub use action::{ActionResult, ActionType, ApplyResult, Plan, PlanSummary, Planned};
pub use diff::{
    IpAction, IpRecord, UserDataChange, diff_ip_binding, diff_server_ip, diff_user_data,
};
pub use error::{Classify, CloudError, ErrorClass, Result};
pub use lifecycle::{Identifier, Reconciler, ResourceKind, Updatable};
pub use retry::{RetryConfig, with_retry};
pub use serializer::{MutationSerializer, MutationToken};
pub use state::{StateFile, StateLock, StateManager, TrackedResource};
