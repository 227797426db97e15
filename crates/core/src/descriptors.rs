//! Resource descriptors returned by the CLI's `list --json` commands
//!
//! Only the fields the resolver reads are modelled; everything else in the
//! CLI output is ignored.

use serde::{Deserialize, Serialize};

/// VM image entry from `vm image list --json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageDescriptor {
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operating_system_type: Option<String>,
    #[serde(
        default,
        rename = "oSDiskConfiguration",
        skip_serializing_if = "Option::is_none"
    )]
    pub os_disk_configuration: Option<OsDiskConfiguration>,
}

/// Disk configuration block of VM images
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OsDiskConfiguration {
    #[serde(default)]
    pub operating_system: Option<String>,
}

impl ImageDescriptor {
    /// Operating system of the image, from the top-level field or the disk configuration
    pub fn operating_system(&self) -> Option<&str> {
        self.operating_system_type.as_deref().or_else(|| {
            self.os_disk_configuration
                .as_ref()
                .and_then(|disk| disk.operating_system.as_deref())
        })
    }

    /// True for public images of the given operating system category
    pub fn is_public_of_category(&self, category: &str) -> bool {
        self.operating_system()
            .is_some_and(|os| os.eq_ignore_ascii_case(category))
            && self.category.eq_ignore_ascii_case("public")
    }
}

/// Virtual network entry from `network vnet list --json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualNetworkDescriptor {
    pub name: String,
    #[serde(default)]
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affinity_group: Option<String>,
}

impl VirtualNetworkDescriptor {
    /// Affinity group the network belongs to, ignoring empty values
    pub fn affinity_group(&self) -> Option<&str> {
        self.affinity_group.as_deref().filter(|ag| !ag.is_empty())
    }

    /// True when the network is in `status` and bound to an affinity group
    pub fn is_reusable(&self, status: &str) -> bool {
        self.state.eq_ignore_ascii_case(status) && self.affinity_group().is_some()
    }
}

/// Affinity group entry from `account affinity-group list --json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AffinityGroupDescriptor {
    pub name: String,
    #[serde(default)]
    pub location: String,
}

impl AffinityGroupDescriptor {
    /// True when the group lives in `location`
    pub fn is_in(&self, location: &str) -> bool {
        self.location.eq_ignore_ascii_case(location)
    }
}
