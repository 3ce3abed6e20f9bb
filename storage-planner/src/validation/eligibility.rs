// SPDX-License-Identifier: GPL-3.0-only

use storage_types::{DeviceKind, Size};

use super::Rejection;
use crate::catalog::{AddAnchor, ParentRole};
use crate::model::DeviceGraph;

/// Two extents of the smallest supported size
const MIN_PV_FOR_VG: Size = Size::from_mib(4);

/// Structural checks on the parent a new device would be created under
pub fn check_anchor(graph: &DeviceGraph, anchor: &AddAnchor) -> Result<(), Rejection> {
    let parent = graph
        .get(&anchor.parent)
        .ok_or_else(|| Rejection::UnknownDevice(anchor.parent.clone()))?;

    if anchor.role == ParentRole::LvmVg
        && let DeviceKind::LvmVg { complete: false, .. } = parent.kind
    {
        return Err(Rejection::VgIncomplete {
            name: parent.name.clone(),
        });
    }

    if anchor.role == ParentRole::LvmPv && parent.size < MIN_PV_FOR_VG {
        return Err(Rejection::PvTooSmall);
    }

    if parent.is_disk()
        && let Some((label_type, _, max_primary)) = parent.disk_label()
        && !anchor.free.is_logical
        && graph.primary_partition_count(&parent.id) >= max_primary
    {
        return Err(Rejection::PrimaryLimitReached {
            name: parent.name.clone(),
            label: label_type.to_string(),
        });
    }

    Ok(())
}
