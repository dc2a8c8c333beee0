//! Remote API gateway
//!
//! Typed operations per resource kind. Every failure carries enough to be
//! classified; a 404 status means the resource is absent.

use crate::api::{
    Ip, RuleDefinition, SecurityGroupRule, Server, ServerAction, ServerDefinition, ServerPatch,
    Volume, VolumeDefinition,
};
use crate::error::Result;
use async_trait::async_trait;

#[async_trait]
pub trait ScalewayApi: Send + Sync {
    // Servers
    async fn get_server(&self, id: &str) -> Result<Server>;
    async fn create_server(&self, definition: &ServerDefinition) -> Result<Server>;
    async fn patch_server(&self, id: &str, patch: &ServerPatch) -> Result<()>;
    async fn delete_server(&self, id: &str) -> Result<()>;
    async fn server_action(&self, id: &str, action: ServerAction) -> Result<()>;

    // Volumes
    async fn create_volume(&self, definition: &VolumeDefinition) -> Result<Volume>;
    async fn delete_volume(&self, id: &str) -> Result<()>;

    // Flexible IPs
    async fn list_ips(&self) -> Result<Vec<Ip>>;
    async fn get_ip(&self, id: &str) -> Result<Ip>;
    async fn create_ip(&self) -> Result<Ip>;
    async fn attach_ip(&self, ip_id: &str, server_id: &str) -> Result<()>;
    async fn detach_ip(&self, ip_id: &str) -> Result<()>;
    async fn delete_ip(&self, id: &str) -> Result<()>;

    // Per-key user data
    async fn list_user_data(&self, server_id: &str) -> Result<Vec<String>>;
    async fn get_user_data(&self, server_id: &str, key: &str) -> Result<String>;
    async fn patch_user_data(&self, server_id: &str, key: &str, value: &str) -> Result<()>;
    async fn delete_user_data(&self, server_id: &str, key: &str) -> Result<()>;

    // Security group rules
    async fn create_security_group_rule(
        &self,
        group_id: &str,
        definition: &RuleDefinition,
    ) -> Result<SecurityGroupRule>;
    async fn get_security_group_rule(
        &self,
        group_id: &str,
        rule_id: &str,
    ) -> Result<SecurityGroupRule>;
    async fn delete_security_group_rule(&self, group_id: &str, rule_id: &str) -> Result<()>;
}
