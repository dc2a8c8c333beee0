//! Desired-state file
//!
//! ```yaml
//! servers:
//!   web:
//!     name: web
//!     image: 4a0a2a4e-...
//!     type: START1-S
//!     public_ip: 51.15.10.1
//! ips:
//!   front:
//!     server: server.web
//! security_group_rules:
//!   http:
//!     security_group: 7e1c...
//!     action: accept
//!     direction: inbound
//!     ip_range: 0.0.0.0/0
//!     protocol: TCP
//!     port: 80
//! ```

use anyhow::Context;
use serde::Deserialize;
use skyflow_cloud::{ResourceKind, StateFile};
use skyflow_cloud_scaleway::{DesiredIp, DesiredRule, DesiredServer};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Manifest {
    pub servers: BTreeMap<String, DesiredServer>,
    pub ips: BTreeMap<String, DesiredIp>,
    pub security_group_rules: BTreeMap<String, DesiredRule>,
}

impl Manifest {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let manifest: Option<Manifest> = serde_yaml::from_str(content)?;
        Ok(manifest.unwrap_or_default())
    }

    pub fn len(&self) -> usize {
        self.servers.len() + self.ips.len() + self.security_group_rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// State address of a named resource, e.g. `server.web`
pub fn address(kind: ResourceKind, name: &str) -> String {
    format!("{}.{}", kind, name)
}

/// Replace a `server.<name>` reference with the identifier tracked for it
pub fn resolve_ip(desired: &DesiredIp, state: &StateFile) -> anyhow::Result<DesiredIp> {
    let server = match desired.server.as_deref() {
        Some(reference) if reference.starts_with("server.") => {
            let id = state.identifier(reference).with_context(|| {
                format!("{} is referenced but has not been created", reference)
            })?;
            Some(id.to_string())
        }
        other => other.map(str::to_string),
    };
    Ok(DesiredIp { server })
}

#[cfg(test)]
mod tests {
    use super::*;
    use skyflow_cloud::{Identifier, TrackedResource};
    use skyflow_cloud_scaleway::{PowerState, RuleProtocol};

    const EXAMPLE: &str = r#"
servers:
  web:
    name: web
    image: img-ubuntu
    type: START1-S
    tags: [web]
    volumes:
      - size_in_gb: 20
        type: l_ssd
    state: stopped
    user_data:
      role: frontend
ips:
  front:
    server: server.web
  spare: {}
security_group_rules:
  http:
    security_group: sg-1
    action: accept
    direction: inbound
    ip_range: 0.0.0.0/0
    protocol: TCP
    port: 80
"#;

    #[test]
    fn test_parse_example() {
        let manifest = Manifest::parse(EXAMPLE).unwrap();

        assert_eq!(manifest.len(), 4);
        let web = &manifest.servers["web"];
        assert_eq!(web.server_type, "START1-S");
        assert_eq!(web.state, PowerState::Stopped);
        assert_eq!(web.volumes[0].size_in_gb, 20);
        assert_eq!(web.user_data["role"], "frontend");
        assert_eq!(manifest.ips["spare"].server, None);
        assert_eq!(manifest.security_group_rules["http"].protocol, RuleProtocol::Tcp);
    }

    #[test]
    fn test_empty_file_is_empty_manifest() {
        assert!(Manifest::parse("").unwrap().is_empty());
    }

    #[test]
    fn test_unknown_section_is_rejected() {
        assert!(Manifest::parse("buckets: {}").is_err());
    }

    #[test]
    fn test_address() {
        assert_eq!(address(ResourceKind::Server, "web"), "server.web");
        assert_eq!(
            address(ResourceKind::SecurityGroupRule, "http"),
            "security_group_rule.http"
        );
    }

    #[test]
    fn test_resolve_ip_reference() {
        let mut state = StateFile::new();
        state.track(
            "server.web",
            TrackedResource::new(
                ResourceKind::Server,
                Identifier::new("srv-1"),
                serde_json::Value::Null,
            ),
        );

        let by_reference = DesiredIp {
            server: Some("server.web".to_string()),
        };
        assert_eq!(
            resolve_ip(&by_reference, &state).unwrap().server.as_deref(),
            Some("srv-1")
        );

        let by_id = DesiredIp {
            server: Some("srv-9".to_string()),
        };
        assert_eq!(resolve_ip(&by_id, &state).unwrap(), by_id);

        let dangling = DesiredIp {
            server: Some("server.db".to_string()),
        };
        assert!(resolve_ip(&dangling, &state).is_err());
    }
}
