// SPDX-License-Identifier: GPL-3.0-only

//! Storage graph nodes
//!
//! A [`Device`] is one node of the storage graph as reported by the backend:
//! disks, partitions, LVM objects, Btrfs volumes, MD arrays and LUKS
//! mappings. Parent edges point towards the disks.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::region::ByteRange;
use crate::size::Size;

/// Stable identifier of a device within one snapshot
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Partition table flavour
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiskLabelType {
    Msdos,
    Gpt,
    Other(String),
}

impl DiskLabelType {
    pub fn parse(s: &str) -> Self {
        match s {
            "msdos" | "dos" | "mbr" => Self::Msdos,
            "gpt" => Self::Gpt,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Msdos => "msdos",
            Self::Gpt => "gpt",
            Self::Other(name) => name,
        }
    }
}

impl fmt::Display for DiskLabelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// MBR-style partition role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionType {
    Primary,
    Extended,
    Logical,
}

impl PartitionType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Extended => "extended",
            Self::Logical => "logical",
        }
    }
}

/// Device kind with kind-specific metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum DeviceKind {
    Disk {
        removable: bool,
    },
    Partition {
        partition_type: PartitionType,
        /// Offset of the first byte on the parent disk
        start: u64,
    },
    LvmPv,
    LvmVg {
        pe_size: Size,
        free: Size,
        /// False when member PVs are missing
        complete: bool,
    },
    LvmLv,
    LvmThinPool {
        free: Size,
    },
    LvmThinLv,
    BtrfsVolume,
    BtrfsSubvolume,
    MdArray {
        level: String,
    },
    LuksDevice,
}

impl DeviceKind {
    /// Short type name as shown next to devices ("partition", "lvmvg", ...)
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Disk { .. } => "disk",
            Self::Partition { .. } => "partition",
            Self::LvmPv => "lvmpv",
            Self::LvmVg { .. } => "lvmvg",
            Self::LvmLv => "lvmlv",
            Self::LvmThinPool { .. } => "lvmthinpool",
            Self::LvmThinLv => "lvmthinlv",
            Self::BtrfsVolume => "btrfs volume",
            Self::BtrfsSubvolume => "btrfs subvolume",
            Self::MdArray { .. } => "mdarray",
            Self::LuksDevice => "luks/dm-crypt",
        }
    }
}

/// On-device format
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum Format {
    DiskLabel {
        label_type: DiskLabelType,
        /// Byte range partitions may occupy
        usable: ByteRange,
        /// Maximum number of primary partitions the label allows
        max_primary: u32,
    },
    Filesystem {
        fs_type: String,
        label: Option<String>,
        mountpoint: Option<String>,
    },
    LvmPv {
        /// Space on the PV not allocated to any LV
        pv_free: Size,
        /// Volume group this PV belongs to
        vg: Option<DeviceId>,
    },
    Luks,
    MdMember,
    BtrfsMember,
    Swap,
}

impl Format {
    pub fn type_name(&self) -> &str {
        match self {
            Self::DiskLabel { .. } => "disklabel",
            Self::Filesystem { fs_type, .. } => fs_type,
            Self::LvmPv { .. } => "lvmpv",
            Self::Luks => "luks",
            Self::MdMember => "mdmember",
            Self::BtrfsMember => "btrfs",
            Self::Swap => "swap",
        }
    }

    pub fn mountpoint(&self) -> Option<&str> {
        match self {
            Self::Filesystem { mountpoint, .. } => mountpoint.as_deref(),
            _ => None,
        }
    }
}

/// A node in the storage graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    pub name: String,
    pub kind: DeviceKind,
    pub size: Size,
    pub format: Option<Format>,
    /// Ordered parent references, empty only for disks
    #[serde(default)]
    pub parents: Vec<DeviceId>,
}

impl Device {
    pub fn is_disk(&self) -> bool {
        matches!(self.kind, DeviceKind::Disk { .. })
    }

    pub fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }

    /// Disklabel details when the device carries a partition table
    pub fn disk_label(&self) -> Option<(&DiskLabelType, ByteRange, u32)> {
        match &self.format {
            Some(Format::DiskLabel {
                label_type,
                usable,
                max_primary,
            }) => Some((label_type, *usable, *max_primary)),
            _ => None,
        }
    }

    /// Whether the device is (or is formatted as) an LVM physical volume
    pub fn is_pv(&self) -> bool {
        matches!(self.kind, DeviceKind::LvmPv) || matches!(self.format, Some(Format::LvmPv { .. }))
    }

    /// Unallocated PV space; zero for anything that is not a PV
    pub fn pv_free(&self) -> Size {
        match &self.format {
            Some(Format::LvmPv { pv_free, .. }) => *pv_free,
            _ if matches!(self.kind, DeviceKind::LvmPv) => self.size,
            _ => Size::ZERO,
        }
    }

    pub fn pv_vg(&self) -> Option<&DeviceId> {
        match &self.format {
            Some(Format::LvmPv { vg, .. }) => vg.as_ref(),
            _ => None,
        }
    }

    pub fn partition_type(&self) -> Option<PartitionType> {
        match self.kind {
            DeviceKind::Partition { partition_type, .. } => Some(partition_type),
            _ => None,
        }
    }

    pub fn mountpoint(&self) -> Option<&str> {
        self.format.as_ref().and_then(Format::mountpoint)
    }
}

/// Resize capability of an existing device, as reported by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResizeInfo {
    pub resizable: bool,
    #[serde(default)]
    pub min_size: Size,
    #[serde(default)]
    pub max_size: Size,
}

impl ResizeInfo {
    pub const FIXED: ResizeInfo = ResizeInfo {
        resizable: false,
        min_size: Size::ZERO,
        max_size: Size::ZERO,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disk_label_type_parses_aliases() {
        assert_eq!(DiskLabelType::parse("dos"), DiskLabelType::Msdos);
        assert_eq!(DiskLabelType::parse("gpt"), DiskLabelType::Gpt);
        assert_eq!(
            DiskLabelType::parse("sun"),
            DiskLabelType::Other("sun".to_string())
        );
    }

    #[test]
    fn device_kind_serializes_with_tag() {
        let kind = DeviceKind::LvmVg {
            pe_size: Size::from_mib(4),
            free: Size::from_gib(1),
            complete: true,
        };
        let json = serde_json::to_value(&kind).expect("serialize kind");
        assert_eq!(json["type"], "lvm_vg");
        assert_eq!(json["pe_size"], 4 * 1024 * 1024);
    }

    #[test]
    fn pv_free_reads_format_metadata() {
        let pv = Device {
            id: DeviceId::new("sda1"),
            name: "sda1".to_string(),
            kind: DeviceKind::Partition {
                partition_type: PartitionType::Primary,
                start: 1024 * 1024,
            },
            size: Size::from_gib(1),
            format: Some(Format::LvmPv {
                pv_free: Size::from_mib(100),
                vg: None,
            }),
            parents: vec![DeviceId::new("sda")],
        };

        assert!(pv.is_pv());
        assert_eq!(pv.pv_free(), Size::from_mib(100));
        assert_eq!(pv.pv_vg(), None);
    }
}
