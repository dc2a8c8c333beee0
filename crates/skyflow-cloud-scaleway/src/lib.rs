//! Scaleway provider for Skyflow
//!
//! Reconcilers for Scaleway compute resources, built on the retry policy,
//! mutation serializer and diff engines of `skyflow-cloud`.
//!
//! # Features
//!
//! - Servers with additional volumes, per-key user data and a flexible public IP
//! - Flexible IPs, attached and detached independently of servers
//! - Security group rules (immutable; replaced on change)
//!
//! # Example
//!
//! ```ignore
//! use skyflow_cloud::Reconciler;
//! use skyflow_cloud_scaleway::{DesiredServer, ScalewayClient, ScalewayProvider};
//! use std::sync::Arc;
//!
//! let client = ScalewayClient::new(token, organization, "par1");
//! let provider = ScalewayProvider::new(Arc::new(client));
//!
//! let mut id = None;
//! let desired = DesiredServer::new("web", image_id, "START1-S");
//! let observed = provider.servers().create(&desired, &mut id).await?;
//! ```

pub mod api;
pub mod client;
pub mod error;
pub mod gateway;
pub mod ip;
pub mod model;
pub mod provider;
pub mod security_group_rule;
pub mod server;
pub mod userdata;
pub mod volume;

pub use client::ScalewayClient;
pub use error::{Result, ScalewayError};
pub use gateway::ScalewayApi;
pub use ip::IpReconciler;
pub use model::{
    DesiredIp, DesiredRule, DesiredServer, ObservedIp, ObservedRule, ObservedServer, PowerState,
    RuleAction, RuleDirection, RuleProtocol, VolumeSpec,
};
pub use provider::ScalewayProvider;
pub use security_group_rule::{SecurityGroupRuleReconciler, rule_identifier};
pub use server::{DeletionStep, DeletionStrategy, ServerReconciler};
