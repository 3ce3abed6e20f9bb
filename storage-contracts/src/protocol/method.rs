// SPDX-License-Identifier: GPL-3.0-only

//! Request/response methods of the privileged backend
//!
//! Every method travels as a kebab-case name plus one JSON argument value.
//! The long-running apply is not a [`RemoteMethod`]; it has its own entry
//! point on the transport.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use storage_types::{
    ActionId, AddDeviceRequest, DeviceId, DiskLabelType, EditPartitionRequest,
    EditVolumeGroupRequest, NewDeviceType,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "method", content = "args")]
pub enum RemoteMethod {
    Init,
    GetAvailableFilesystems,
    GetAvailableDisklabels,
    GetAvailableRaidLevels { device_type: NewDeviceType },
    GetDisks,
    GetDeviceTree,
    GetMountpoints,
    GetFreePvs,
    GetFreeDiskRegions,
    GetVgFree { vg: DeviceId },
    GetRemovablePvs { vg: DeviceId },
    AddDevice(AddDeviceRequest),
    EditPartitionDevice(EditPartitionRequest),
    EditLvmvgDevice(EditVolumeGroupRequest),
    DeleteDevice { device: DeviceId },
    CreateDiskLabel { disk: DeviceId, label: DiskLabelType },
    CancelActions { ids: Vec<ActionId> },
    ResetAll,
    IsDeviceResizable { device: DeviceId },
}

/// Wire name of the long-running apply call
pub const APPLY_ALL: &str = "apply-all";

impl RemoteMethod {
    /// Wire name of the method
    pub fn name(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::GetAvailableFilesystems => "get-available-filesystems",
            Self::GetAvailableDisklabels => "get-available-disklabels",
            Self::GetAvailableRaidLevels { .. } => "get-available-raid-levels",
            Self::GetDisks => "get-disks",
            Self::GetDeviceTree => "get-device-tree",
            Self::GetMountpoints => "get-mountpoints",
            Self::GetFreePvs => "get-free-pvs",
            Self::GetFreeDiskRegions => "get-free-disk-regions",
            Self::GetVgFree { .. } => "get-vg-free",
            Self::GetRemovablePvs { .. } => "get-removable-pvs",
            Self::AddDevice(_) => "add-device",
            Self::EditPartitionDevice(_) => "edit-partition-device",
            Self::EditLvmvgDevice(_) => "edit-lvmvg-device",
            Self::DeleteDevice { .. } => "delete-device",
            Self::CreateDiskLabel { .. } => "create-disk-label",
            Self::CancelActions { .. } => "cancel-actions",
            Self::ResetAll => "reset-all",
            Self::IsDeviceResizable { .. } => "is-device-resizable",
        }
    }

    /// Argument payload; `Null` for methods without arguments
    pub fn arguments(&self) -> Result<Value, serde_json::Error> {
        let mut encoded = serde_json::to_value(self)?;
        Ok(encoded
            .get_mut("args")
            .map(Value::take)
            .unwrap_or(Value::Null))
    }

    /// Rebuild a method from its wire name and argument payload
    pub fn decode(name: &str, args: Value) -> Result<Self, serde_json::Error> {
        let mut envelope = serde_json::Map::new();
        envelope.insert("method".to_string(), Value::String(name.to_string()));
        if !args.is_null() {
            envelope.insert("args".to_string(), args);
        }
        serde_json::from_value(Value::Object(envelope))
    }

    /// Whether the backend records actions for this call
    pub fn is_scheduling(&self) -> bool {
        matches!(
            self,
            Self::AddDevice(_)
                | Self::EditPartitionDevice(_)
                | Self::EditLvmvgDevice(_)
                | Self::DeleteDevice { .. }
                | Self::CreateDiskLabel { .. }
        )
    }
}
