//! Security group rule reconciler
//!
//! Rules are immutable: a changed rule is replaced, never patched. The
//! identifier is `{group_id}/{rule_id}` so a rule can be read back from the
//! identifier alone.

use crate::api::{RuleDefinition, SecurityGroupRule};
use crate::error::{Result, ResultExt, ScalewayError};
use crate::model::{DesiredRule, ObservedRule, RuleAction, RuleDirection, RuleProtocol};
use crate::provider::ScalewayProvider;
use async_trait::async_trait;
use skyflow_cloud::{Classify, Identifier, Reconciler, ResourceKind};

const KIND: ResourceKind = ResourceKind::SecurityGroupRule;

pub struct SecurityGroupRuleReconciler {
    provider: ScalewayProvider,
}

impl SecurityGroupRuleReconciler {
    pub fn new(provider: ScalewayProvider) -> Self {
        Self { provider }
    }
}

/// Compose the identifier of a rule inside a group
pub fn rule_identifier(group_id: &str, rule_id: &str) -> Identifier {
    Identifier::new(format!("{}/{}", group_id, rule_id))
}

/// Split a rule identifier into group and rule ids
pub fn split_identifier(id: &Identifier) -> Result<(&str, &str)> {
    id.as_str()
        .split_once('/')
        .filter(|(group, rule)| !group.is_empty() && !rule.is_empty())
        .ok_or_else(|| {
            ScalewayError::InvalidConfig(format!(
                "security group rule identifier must be <group>/<rule>, got {:?}",
                id.as_str()
            ))
        })
}

fn definition(desired: &DesiredRule) -> RuleDefinition {
    RuleDefinition {
        action: desired.action.as_str().to_string(),
        direction: desired.direction.as_str().to_string(),
        ip_range: desired.ip_range.clone(),
        protocol: desired.protocol.as_str().to_string(),
        dest_port_from: desired.port,
    }
}

fn mirror(group_id: &str, rule: SecurityGroupRule) -> Result<ObservedRule> {
    Ok(ObservedRule {
        action: RuleAction::parse(&rule.action)?,
        direction: RuleDirection::parse(&rule.direction)?,
        protocol: RuleProtocol::parse(&rule.protocol)?,
        id: rule.id,
        security_group: group_id.to_string(),
        ip_range: rule.ip_range,
        port: rule.dest_port_from,
    })
}

#[async_trait]
impl Reconciler for SecurityGroupRuleReconciler {
    type Desired = DesiredRule;
    type Observed = ObservedRule;
    type Error = ScalewayError;

    fn kind(&self) -> ResourceKind {
        KIND
    }

    async fn create(
        &self,
        desired: &DesiredRule,
        id: &mut Option<Identifier>,
    ) -> Result<ObservedRule> {
        desired
            .validate()
            .context(KIND, &desired.security_group, "validate")?;

        let api = self.provider.api();
        let group_id = desired.security_group.as_str();
        let definition = definition(desired);
        let rule = self
            .provider
            .mutate("create security group rule", || {
                api.create_security_group_rule(group_id, &definition)
            })
            .await
            .context(KIND, group_id, "create")?;

        tracing::info!(
            "Created {} {} rule {} in security group {}",
            definition.direction,
            definition.protocol,
            rule.id,
            group_id
        );
        *id = Some(rule_identifier(group_id, &rule.id));

        let rule_id = rule.id.clone();
        mirror(group_id, rule).context(KIND, &rule_id, "read")
    }

    async fn read(&self, id: &mut Option<Identifier>) -> Result<Option<ObservedRule>> {
        let Some(current) = id.clone() else {
            return Ok(None);
        };
        let (group_id, rule_id) = split_identifier(&current)?;

        let api = self.provider.api();
        let fetched = self
            .provider
            .call("get security group rule", || {
                api.get_security_group_rule(group_id, rule_id)
            })
            .await;

        match fetched {
            Ok(rule) => mirror(group_id, rule)
                .map(Some)
                .context(KIND, current.as_str(), "read"),
            Err(e) if e.is_not_found() => {
                tracing::info!("Security group rule {} no longer exists", current);
                *id = None;
                Ok(None)
            }
            Err(e) => Err(e.context(KIND, current.as_str(), "read")),
        }
    }

    async fn delete(&self, id: &mut Option<Identifier>) -> Result<()> {
        let Some(current) = id.clone() else {
            return Ok(());
        };
        let (group_id, rule_id) = split_identifier(&current)?;

        let api = self.provider.api();
        match self
            .provider
            .mutate("delete security group rule", || {
                api.delete_security_group_rule(group_id, rule_id)
            })
            .await
        {
            Ok(()) => tracing::info!("Deleted security group rule {}", current),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.context(KIND, current.as_str(), "delete")),
        }

        *id = None;
        Ok(())
    }

    fn desired_from(observed: &ObservedRule) -> DesiredRule {
        DesiredRule {
            security_group: observed.security_group.clone(),
            action: observed.action,
            direction: observed.direction,
            ip_range: observed.ip_range.clone(),
            protocol: observed.protocol,
            port: observed.port,
        }
    }
}
