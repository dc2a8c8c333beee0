//! Additional server volumes
//!
//! Volumes are created before the server and handed to it by slot; they
//! cannot be attached afterwards.

use crate::api::{Server, VolumeDefinition};
use crate::model::{GB, VOLUME_TYPES, VolumeSpec};

/// A volume to create before the server
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedVolume {
    /// Position in the declared list
    pub index: usize,
    /// Slot key on the server; slot "0" belongs to the image's root volume
    pub slot: String,
    pub definition: VolumeDefinition,
}

/// Volumes to create for a new server, skipping zero-sized entries.
///
/// Slots follow declaration order (`"1"` for the first entry) whether or not
/// earlier entries were skipped.
pub fn plan_volumes(server_name: &str, volumes: &[VolumeSpec]) -> Vec<PlannedVolume> {
    volumes
        .iter()
        .enumerate()
        .filter(|(_, volume)| volume.size_in_gb > 0)
        .map(|(index, volume)| PlannedVolume {
            index,
            slot: (index + 1).to_string(),
            definition: VolumeDefinition {
                name: format!("{}-{}", server_name, volume.size_in_gb),
                size: volume.size_bytes(),
                volume_type: volume.volume_type.clone(),
            },
        })
        .collect()
}

/// Additional volumes attached to a server, in slot order.
///
/// Slot `n` maps back to declared position `n - 1`; an empty slot between
/// two volumes comes back as a zero-size entry so later positions line up
/// with the declaration. Zero-size entries after the last volume leave no
/// trace on the server and are not reported.
pub fn observed_volumes(server: &Server) -> Vec<VolumeSpec> {
    let mut attached: Vec<(usize, VolumeSpec)> = server
        .volumes
        .iter()
        .filter_map(|(slot, volume)| {
            let slot: usize = slot.parse().ok()?;
            (slot > 0).then(|| {
                (
                    slot,
                    VolumeSpec {
                        size_in_gb: volume.size / GB,
                        volume_type: volume.volume_type.clone(),
                        volume_id: Some(volume.id.clone()),
                    },
                )
            })
        })
        .collect();
    attached.sort_by_key(|(slot, _)| *slot);

    let mut volumes = Vec::with_capacity(attached.len());
    for (slot, volume) in attached {
        while volumes.len() + 1 < slot {
            volumes.push(VolumeSpec::new(0, VOLUME_TYPES[0]));
        }
        volumes.push(volume);
    }
    volumes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Volume;
    use std::collections::BTreeMap;

    #[test]
    fn test_plan_volumes_slots_and_names() {
        let volumes = vec![
            VolumeSpec::new(20, "l_ssd"),
            VolumeSpec::new(0, "l_ssd"),
            VolumeSpec::new(50, "l_ssd"),
        ];

        let planned = plan_volumes("web", &volumes);

        assert_eq!(planned.len(), 2);
        assert_eq!(planned[0].slot, "1");
        assert_eq!(planned[0].definition.name, "web-20");
        assert_eq!(planned[0].definition.size, 20 * GB);
        assert_eq!(planned[1].slot, "3");
        assert_eq!(planned[1].index, 2);
    }

    #[test]
    fn test_observed_volumes_keep_declared_positions() {
        let volume = |id: &str, gb: u64| Volume {
            id: id.to_string(),
            name: String::new(),
            size: gb * GB,
            volume_type: "l_ssd".to_string(),
        };
        let mut volumes = BTreeMap::new();
        volumes.insert("0".to_string(), volume("root", 50));
        volumes.insert("3".to_string(), volume("vol-b", 100));
        volumes.insert("1".to_string(), volume("vol-a", 20));

        let server = Server {
            id: "srv-1".into(),
            name: "web".into(),
            image: None,
            commercial_type: "START1-S".into(),
            enable_ipv6: false,
            dynamic_ip_required: false,
            private_ip: None,
            public_ip: None,
            ipv6: None,
            state: "stopped".into(),
            state_detail: String::new(),
            tags: Vec::new(),
            security_group: None,
            bootscript: None,
            volumes,
        };

        let observed = observed_volumes(&server);
        let ids: Vec<_> = observed.iter().map(|v| v.volume_id.as_deref()).collect();
        assert_eq!(ids, vec![Some("vol-a"), None, Some("vol-b")]);
        assert_eq!(observed[0].size_in_gb, 20);
        assert_eq!(observed[1], VolumeSpec::new(0, "l_ssd"));
        assert_eq!(observed[2].size_in_gb, 100);
    }
}
