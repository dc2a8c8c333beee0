//! Desired and observed records for Scaleway resources
//!
//! Desired records are strongly typed at the configuration boundary and
//! validated there with `validate()`, before any remote call is issued.

use crate::error::{Result, ScalewayError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;

/// Bytes per gigabyte as the provider counts them
pub const GB: u64 = 1_000_000_000;

/// Largest additional volume this provider class accepts, in GB
pub const MAX_VOLUME_SIZE_GB: u64 = 150;

/// Commercial server types accepted by the provider
pub const SERVER_TYPES: &[&str] = &[
    "START1-XS",
    "START1-S",
    "START1-M",
    "START1-L",
    "VC1S",
    "VC1M",
    "VC1L",
    "X64-15GB",
    "X64-30GB",
    "X64-60GB",
    "X64-120GB",
    "C1",
    "C2S",
    "C2M",
    "C2L",
    "ARM64-2GB",
    "ARM64-4GB",
    "ARM64-8GB",
];

/// Volume types accepted by the provider
pub const VOLUME_TYPES: &[&str] = &["l_ssd"];

/// Power state the caller wants the server in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerState {
    #[default]
    Running,
    Stopped,
}

impl PowerState {
    /// Map a provider lifecycle string; anything but `stopped` counts as running
    pub fn from_observed(state: &str) -> Self {
        if state == "stopped" {
            PowerState::Stopped
        } else {
            PowerState::Running
        }
    }
}

/// Additional volume created together with the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeSpec {
    pub size_in_gb: u64,

    #[serde(rename = "type")]
    pub volume_type: String,

    /// Assigned by the provider at creation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_id: Option<String>,
}

impl VolumeSpec {
    pub fn new(size_in_gb: u64, volume_type: impl Into<String>) -> Self {
        Self {
            size_in_gb,
            volume_type: volume_type.into(),
            volume_id: None,
        }
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_in_gb * GB
    }

    pub fn validate(&self) -> Result<()> {
        if self.size_in_gb == 0 || self.size_in_gb > MAX_VOLUME_SIZE_GB {
            return Err(ScalewayError::InvalidConfig(format!(
                "volume size_in_gb must be between 1 and {}, got {}",
                MAX_VOLUME_SIZE_GB, self.size_in_gb
            )));
        }
        if !VOLUME_TYPES.contains(&self.volume_type.as_str()) {
            return Err(ScalewayError::InvalidConfig(format!(
                "unknown volume type {:?}, expected one of {:?}",
                self.volume_type, VOLUME_TYPES
            )));
        }
        Ok(())
    }
}

/// Caller-supplied attributes for one server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesiredServer {
    pub name: String,
    pub image: String,

    #[serde(rename = "type")]
    pub server_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bootscript: Option<String>,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_group: Option<String>,

    /// Created once together with the server, never updated afterwards
    #[serde(default)]
    pub volumes: Vec<VolumeSpec>,

    #[serde(default)]
    pub enable_ipv6: bool,

    #[serde(default)]
    pub dynamic_ip_required: bool,

    /// Address from the flexible IP pool to attach
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_ip: Option<String>,

    #[serde(default)]
    pub state: PowerState,

    #[serde(default)]
    pub user_data: BTreeMap<String, String>,
}

impl DesiredServer {
    pub fn new(
        name: impl Into<String>,
        image: impl Into<String>,
        server_type: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            server_type: server_type.into(),
            bootscript: None,
            tags: Vec::new(),
            security_group: None,
            volumes: Vec::new(),
            enable_ipv6: false,
            dynamic_ip_required: false,
            public_ip: None,
            state: PowerState::Running,
            user_data: BTreeMap::new(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ScalewayError::InvalidConfig(
                "server name must not be empty".to_string(),
            ));
        }
        if self.image.trim().is_empty() {
            return Err(ScalewayError::InvalidConfig(format!(
                "server {} requires an image",
                self.name
            )));
        }
        if !SERVER_TYPES.contains(&self.server_type.as_str()) {
            return Err(ScalewayError::InvalidConfig(format!(
                "unknown server type {:?} for server {}",
                self.server_type, self.name
            )));
        }
        // zero-size entries only reserve their slot
        for volume in self.volumes.iter().filter(|v| v.size_in_gb > 0) {
            volume.validate()?;
        }
        if let Some(key) = self.user_data.keys().find(|key| !is_valid_user_data_key(key)) {
            return Err(ScalewayError::InvalidConfig(format!(
                "invalid user_data key {:?} for server {}: use letters, digits, '-', '_' or '.'",
                key, self.name
            )));
        }
        if let Some(address) = &self.public_ip {
            address.parse::<IpAddr>().map_err(|_| {
                ScalewayError::InvalidConfig(format!("invalid public_ip {:?}", address))
            })?;
        }
        Ok(())
    }
}

/// User-data keys travel as a URL path segment
fn is_valid_user_data_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && key != "."
        && key != ".."
}

/// Canonical server state mirrored from the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedServer {
    pub id: String,
    pub name: String,
    pub image: String,
    pub server_type: String,
    pub bootscript: Option<String>,
    pub tags: Vec<String>,
    pub security_group: Option<String>,
    pub volumes: Vec<VolumeSpec>,
    pub enable_ipv6: bool,
    pub dynamic_ip_required: bool,
    pub private_ip: Option<String>,
    pub public_ip: Option<String>,
    /// Only mirrored while IPv6 is enabled
    pub public_ipv6: Option<String>,
    pub state: String,
    pub state_detail: String,
    pub user_data: BTreeMap<String, String>,
}

impl ObservedServer {
    pub fn is_stopped(&self) -> bool {
        self.state == "stopped"
    }
}

/// Desired flexible IP
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredIp {
    /// Server the address should be attached to, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
}

/// Canonical IP state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedIp {
    pub id: String,
    pub address: String,
    pub server: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Accept,
    Drop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleDirection {
    Inbound,
    Outbound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RuleProtocol {
    Tcp,
    Udp,
    Icmp,
}

macro_rules! wire_names {
    ($ty:ty { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $name),+
                }
            }

            pub fn parse(value: &str) -> Result<Self> {
                match value {
                    $($name => Ok(Self::$variant),)+
                    other => Err(ScalewayError::InvalidConfig(format!(
                        "unexpected {} {:?}",
                        stringify!($ty),
                        other
                    ))),
                }
            }
        }
    };
}

wire_names!(RuleAction { Accept => "accept", Drop => "drop" });
wire_names!(RuleDirection { Inbound => "inbound", Outbound => "outbound" });
wire_names!(RuleProtocol { Tcp => "TCP", Udp => "UDP", Icmp => "ICMP" });

/// Desired security group rule; immutable once created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredRule {
    pub security_group: String,
    pub action: RuleAction,
    pub direction: RuleDirection,
    pub ip_range: String,
    pub protocol: RuleProtocol,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

impl DesiredRule {
    pub fn validate(&self) -> Result<()> {
        if self.security_group.trim().is_empty() {
            return Err(ScalewayError::InvalidConfig(
                "security_group must not be empty".to_string(),
            ));
        }
        validate_cidr(&self.ip_range)?;
        if self.protocol != RuleProtocol::Icmp && self.port.is_none() {
            return Err(ScalewayError::InvalidConfig(format!(
                "{} rule requires a port",
                self.protocol.as_str()
            )));
        }
        Ok(())
    }
}

/// Canonical rule state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedRule {
    pub id: String,
    pub security_group: String,
    pub action: RuleAction,
    pub direction: RuleDirection,
    pub ip_range: String,
    pub protocol: RuleProtocol,
    pub port: Option<u16>,
}

fn validate_cidr(range: &str) -> Result<()> {
    let invalid = || ScalewayError::InvalidConfig(format!("invalid ip_range {:?}", range));

    let (address, prefix) = range.split_once('/').ok_or_else(invalid)?;
    let address: IpAddr = address.parse().map_err(|_| invalid())?;
    let prefix: u8 = prefix.parse().map_err(|_| invalid())?;
    let width = if address.is_ipv4() { 32 } else { 128 };
    if prefix > width {
        return Err(invalid());
    }
    Ok(())
}
