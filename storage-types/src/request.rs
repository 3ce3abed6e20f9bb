// SPDX-License-Identifier: GPL-3.0-only

//! Caller intents, before validation
//!
//! A [`CandidateOperation`] is built once by the caller and never mutated.
//! It is either rejected or turned into a pending action.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::device::{DeviceId, DiskLabelType, PartitionType};
use crate::free_space::FreeSpaceTarget;
use crate::size::Size;

/// Device types the planner can create
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NewDeviceType {
    Partition,
    /// PV + VG created in one go on free disk space
    Lvm,
    LvmPv,
    LvmVg,
    LvmLv,
    LvmThinPool,
    LvmThinLv,
    LvmSnapshot,
    /// LV with an attached cache on fast PVs
    LvmCache,
    BtrfsVolume,
    BtrfsSubvolume,
    MdRaid,
}

impl NewDeviceType {
    pub const ALL: [NewDeviceType; 12] = [
        Self::Partition,
        Self::Lvm,
        Self::LvmPv,
        Self::LvmVg,
        Self::LvmLv,
        Self::LvmThinPool,
        Self::LvmThinLv,
        Self::LvmSnapshot,
        Self::LvmCache,
        Self::BtrfsVolume,
        Self::BtrfsSubvolume,
        Self::MdRaid,
    ];

    /// Name used in action descriptions and backend payloads
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Partition => "partition",
            Self::Lvm => "lvm",
            Self::LvmPv => "lvmpv",
            Self::LvmVg => "lvmvg",
            Self::LvmLv => "lvmlv",
            Self::LvmThinPool => "lvmthinpool",
            Self::LvmThinLv => "lvmthinlv",
            Self::LvmSnapshot => "lvm snapshot",
            Self::LvmCache => "lvmcache",
            Self::BtrfsVolume => "btrfs volume",
            Self::BtrfsSubvolume => "btrfs subvolume",
            Self::MdRaid => "mdraid",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }
}

impl fmt::Display for NewDeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One selected parent target and the size requested on it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberSize {
    pub target: FreeSpaceTarget,
    pub size: Size,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionRequest {
    pub passphrase: String,
    /// Repeated entry, must equal `passphrase`
    #[serde(skip_serializing, default)]
    pub confirmation: String,
}

/// Device-type specific advanced options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum AdvancedOptions {
    Partition { partition_type: PartitionType },
    Lvm { pe_size: Size },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheMode {
    #[default]
    Writethrough,
    Writeback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheRequest {
    pub fast_pvs: Vec<DeviceId>,
    pub cache_size: Size,
    #[serde(default)]
    pub mode: CacheMode,
}

/// New device request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddDeviceRequest {
    pub device_type: NewDeviceType,
    /// Anchor parent the request was opened on
    pub parent: DeviceId,
    /// Free space the caller selected when opening the request
    pub free: FreeSpaceTarget,
    /// Selected targets, one size per member
    pub members: Vec<MemberSize>,
    #[serde(default)]
    pub filesystem: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub mountpoint: Option<String>,
    #[serde(default)]
    pub encryption: Option<EncryptionRequest>,
    #[serde(default)]
    pub raid_level: Option<String>,
    #[serde(default)]
    pub advanced: Option<AdvancedOptions>,
    #[serde(default)]
    pub cache: Option<CacheRequest>,
}

impl AddDeviceRequest {
    /// Request with no optional content, to be filled field by field
    pub fn new(
        device_type: NewDeviceType,
        parent: DeviceId,
        free: FreeSpaceTarget,
        members: Vec<MemberSize>,
    ) -> Self {
        Self {
            device_type,
            parent,
            free,
            members,
            filesystem: None,
            name: None,
            label: None,
            mountpoint: None,
            encryption: None,
            raid_level: None,
            advanced: None,
            cache: None,
        }
    }

    /// Sum of all member sizes
    pub fn total_size(&self) -> Size {
        self.members.iter().map(|m| m.size).sum()
    }

    pub fn partition_type(&self) -> Option<PartitionType> {
        match self.advanced {
            Some(AdvancedOptions::Partition { partition_type }) => Some(partition_type),
            _ => None,
        }
    }

    pub fn pe_size(&self) -> Option<Size> {
        match self.advanced {
            Some(AdvancedOptions::Lvm { pe_size }) => Some(pe_size),
            _ => None,
        }
    }

    pub fn is_encrypted(&self) -> bool {
        self.encryption.is_some()
    }
}

/// New format for an existing device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reformat {
    pub filesystem: String,
    #[serde(default)]
    pub label: Option<String>,
}

/// Changes to a partition, LV or LUKS device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditPartitionRequest {
    pub device: DeviceId,
    #[serde(default)]
    pub resize: Option<Size>,
    #[serde(default)]
    pub reformat: Option<Reformat>,
    #[serde(default)]
    pub mountpoint: Option<String>,
}

/// PV membership changes of a volume group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditVolumeGroupRequest {
    pub vg: DeviceId,
    #[serde(default)]
    pub add_pvs: Vec<DeviceId>,
    #[serde(default)]
    pub remove_pvs: Vec<DeviceId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "target")]
pub enum EditDeviceRequest {
    Partition(EditPartitionRequest),
    VolumeGroup(EditVolumeGroupRequest),
}

impl EditDeviceRequest {
    pub fn device(&self) -> &DeviceId {
        match self {
            Self::Partition(req) => &req.device,
            Self::VolumeGroup(req) => &req.vg,
        }
    }
}

/// Caller intent before validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "operation")]
pub enum CandidateOperation {
    AddDevice(AddDeviceRequest),
    EditDevice(EditDeviceRequest),
    DeleteDevice { device: DeviceId },
    CreateDiskLabel { disk: DeviceId, label: DiskLabelType },
}

/// What the caller had selected when opening a new-device request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "selected")]
pub enum Selection {
    Device { device: DeviceId },
    FreeSpace { target: FreeSpaceTarget },
}
