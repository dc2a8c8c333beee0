//! Wire types of the Scaleway compute API

use serde::{Deserialize, Serialize};
use skyflow_cloud::IpRecord;
use std::collections::BTreeMap;

/// Server as reported by the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Server {
    pub id: String,
    pub name: String,
    pub image: Option<ImageRef>,
    pub commercial_type: String,
    #[serde(default)]
    pub enable_ipv6: bool,
    #[serde(default)]
    pub dynamic_ip_required: bool,
    pub private_ip: Option<String>,
    pub public_ip: Option<PublicIp>,
    pub ipv6: Option<Ipv6>,
    pub state: String,
    #[serde(default)]
    pub state_detail: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub security_group: Option<SecurityGroupRef>,
    pub bootscript: Option<BootscriptRef>,
    /// Attached volumes keyed by slot; slot "0" is the image's root volume
    #[serde(default)]
    pub volumes: BTreeMap<String, Volume>,
}

impl Server {
    pub fn public_address(&self) -> Option<&str> {
        self.public_ip.as_ref().map(|ip| ip.address.as_str())
    }

    pub fn ipv6_address(&self) -> Option<&str> {
        self.ipv6.as_ref().map(|ip| ip.address.as_str())
    }

    /// Public address held from the flexible IP pool (not a dynamic one)
    pub fn flexible_address(&self) -> Option<&str> {
        self.public_ip
            .as_ref()
            .filter(|ip| !ip.dynamic)
            .map(|ip| ip.address.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRef {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicIp {
    pub id: String,
    pub address: String,
    #[serde(default)]
    pub dynamic: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ipv6 {
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityGroupRef {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BootscriptRef {
    pub id: String,
}

/// Body of `POST /servers`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ServerDefinition {
    pub name: String,
    pub image: String,
    pub commercial_type: String,
    pub enable_ipv6: bool,
    pub dynamic_ip_required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security_group: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bootscript: Option<String>,
    pub tags: Vec<String>,
    /// Slot → volume id of the volumes created beforehand
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub volumes: BTreeMap<String, String>,
}

/// Body of `PATCH /servers/{id}`; only set fields are sent
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ServerPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_ipv6: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dynamic_ip_required: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security_group: Option<SecurityGroupPatch>,
}

impl ServerPatch {
    pub fn is_empty(&self) -> bool {
        self == &ServerPatch::default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SecurityGroupPatch {
    pub id: String,
}

/// `POST /servers/{id}/action`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerAction {
    PowerOn,
    Terminate,
}

impl ServerAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ServerAction::PowerOn => "poweron",
            ServerAction::Terminate => "terminate",
        }
    }
}

impl std::fmt::Display for ServerAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Volume {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Size in bytes
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub volume_type: String,
}

/// Body of `POST /volumes`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VolumeDefinition {
    pub name: String,
    /// Size in bytes
    pub size: u64,
    pub volume_type: String,
}

/// Entry of the flexible IP pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ip {
    pub id: String,
    pub address: String,
    pub server: Option<ServerRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerRef {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

impl From<&Ip> for IpRecord {
    fn from(ip: &Ip) -> Self {
        IpRecord {
            id: ip.id.clone(),
            address: ip.address.clone(),
            server: ip.server.as_ref().map(|s| s.id.clone()),
        }
    }
}

/// Security group rule as reported by the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityGroupRule {
    pub id: String,
    pub action: String,
    pub direction: String,
    pub ip_range: String,
    pub protocol: String,
    pub dest_port_from: Option<u16>,
}

/// Body of `POST /security_groups/{id}/rules`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleDefinition {
    pub action: String,
    pub direction: String,
    pub ip_range: String,
    pub protocol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dest_port_from: Option<u16>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_deserialize() {
        let server: Server = serde_json::from_value(serde_json::json!({
            "id": "srv-1",
            "name": "web",
            "image": {"id": "img-1", "name": "ubuntu"},
            "commercial_type": "START1-S",
            "enable_ipv6": true,
            "private_ip": "10.1.0.4",
            "public_ip": {"id": "ip-1", "address": "51.15.0.1", "dynamic": false},
            "ipv6": {"address": "2001:bc8::1"},
            "state": "running",
            "state_detail": "booted",
            "tags": ["web"],
            "security_group": {"id": "sg-1", "name": "default"},
            "bootscript": null,
            "volumes": {"0": {"id": "vol-0", "name": "root", "size": 50000000000u64, "volume_type": "l_ssd"}}
        }))
        .unwrap();

        assert_eq!(server.public_address(), Some("51.15.0.1"));
        assert_eq!(server.flexible_address(), Some("51.15.0.1"));
        assert_eq!(server.ipv6_address(), Some("2001:bc8::1"));
        assert_eq!(server.volumes["0"].size, 50_000_000_000);
        assert!(!server.dynamic_ip_required);
    }

    #[test]
    fn test_dynamic_address_is_not_flexible() {
        let server = Server {
            id: "srv-1".into(),
            name: "web".into(),
            image: None,
            commercial_type: "START1-S".into(),
            enable_ipv6: false,
            dynamic_ip_required: true,
            private_ip: None,
            public_ip: Some(PublicIp {
                id: "dyn".into(),
                address: "163.172.0.9".into(),
                dynamic: true,
            }),
            ipv6: None,
            state: "running".into(),
            state_detail: String::new(),
            tags: Vec::new(),
            security_group: None,
            bootscript: None,
            volumes: BTreeMap::new(),
        };

        assert_eq!(server.public_address(), Some("163.172.0.9"));
        assert_eq!(server.flexible_address(), None);
    }

    #[test]
    fn test_patch_only_sends_set_fields() {
        let patch = ServerPatch {
            name: Some("web-2".into()),
            ..Default::default()
        };
        assert!(!patch.is_empty());
        assert_eq!(
            serde_json::to_value(&patch).unwrap(),
            serde_json::json!({"name": "web-2"})
        );
        assert!(ServerPatch::default().is_empty());
    }

    #[test]
    fn test_ip_into_record() {
        let ip = Ip {
            id: "ip-1".into(),
            address: "51.15.0.1".into(),
            server: Some(ServerRef {
                id: "srv-1".into(),
                name: "web".into(),
            }),
        };
        let record = IpRecord::from(&ip);
        assert!(record.is_attached_to("srv-1"));
    }
}
