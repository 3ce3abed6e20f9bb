// SPDX-License-Identifier: GPL-3.0-only

use storage_types::{
    DeviceId, DeviceKind, DiskLabelType, EditDeviceRequest, EditPartitionRequest,
    EditVolumeGroupRequest,
};

use super::names;
use super::{Rejection, ValidationContext};

/// Whether the device goes through the partition edit path
pub fn uses_partition_edit(kind: &DeviceKind) -> bool {
    matches!(
        kind,
        DeviceKind::Partition { .. } | DeviceKind::LvmLv | DeviceKind::LuksDevice
    )
}

pub fn validate_edit(ctx: &ValidationContext<'_>, request: &EditDeviceRequest) -> Result<(), Rejection> {
    match request {
        EditDeviceRequest::Partition(request) => validate_partition_edit(ctx, request),
        EditDeviceRequest::VolumeGroup(request) => validate_vg_edit(ctx, request),
    }
}

fn validate_partition_edit(
    ctx: &ValidationContext<'_>,
    request: &EditPartitionRequest,
) -> Result<(), Rejection> {
    let device = ctx
        .graph
        .get(&request.device)
        .ok_or_else(|| Rejection::UnknownDevice(request.device.clone()))?;

    if !uses_partition_edit(&device.kind) {
        return Err(Rejection::NotEditable {
            name: device.name.clone(),
            device_type: device.type_name().to_string(),
        });
    }

    if request.resize.is_none() && request.reformat.is_none() && request.mountpoint.is_none() {
        return Err(Rejection::NothingToChange {
            name: device.name.clone(),
        });
    }

    if let Some(size) = request.resize {
        let info = ctx.resize.filter(|info| info.resizable).ok_or_else(|| {
            Rejection::NotResizable {
                name: device.name.clone(),
            }
        })?;

        if size < info.min_size {
            return Err(Rejection::SizeTooSmall {
                name: device.name.clone(),
                size,
                min: info.min_size,
            });
        }
        if size > info.max_size {
            return Err(Rejection::SizeTooLarge {
                name: device.name.clone(),
                size,
                max: info.max_size,
            });
        }
    }

    if let Some(reformat) = &request.reformat {
        if !ctx.supported.supports_filesystem(&reformat.filesystem) {
            return Err(Rejection::UnsupportedFilesystem(reformat.filesystem.clone()));
        }
        if let Some(label) = reformat.label.as_deref().filter(|l| !l.is_empty())
            && !names::is_valid_label(&reformat.filesystem, label)
        {
            return Err(Rejection::InvalidLabel(label.to_string()));
        }
    }

    if let Some(mountpoint) = request.mountpoint.as_deref().filter(|m| !m.is_empty()) {
        if !names::is_absolute_mountpoint(mountpoint) {
            return Err(Rejection::InvalidMountpoint(mountpoint.to_string()));
        }
        if device.mountpoint() != Some(mountpoint) && ctx.mountpoint_taken(mountpoint) {
            return Err(Rejection::DuplicateMountpoint(mountpoint.to_string()));
        }
    }

    Ok(())
}

fn validate_vg_edit(
    ctx: &ValidationContext<'_>,
    request: &EditVolumeGroupRequest,
) -> Result<(), Rejection> {
    let vg = ctx
        .graph
        .get(&request.vg)
        .ok_or_else(|| Rejection::UnknownDevice(request.vg.clone()))?;

    if !matches!(vg.kind, DeviceKind::LvmVg { .. }) {
        return Err(Rejection::NotEditable {
            name: vg.name.clone(),
            device_type: vg.type_name().to_string(),
        });
    }

    if request.add_pvs.is_empty() && request.remove_pvs.is_empty() {
        return Err(Rejection::NothingToChange {
            name: vg.name.clone(),
        });
    }

    if let Some(pv) = request
        .remove_pvs
        .iter()
        .find(|pv| !ctx.removable_pvs.contains(pv))
    {
        return Err(Rejection::PvNotRemovable {
            name: ctx.device_name(pv),
        });
    }

    if let Some(pv) = request
        .add_pvs
        .iter()
        .find(|pv| !ctx.free_pvs.contains(pv))
    {
        return Err(Rejection::PvNotFree {
            name: ctx.device_name(pv),
        });
    }

    let remaining = ctx
        .graph
        .vg_pvs(&vg.id)
        .iter()
        .filter(|pv| !request.remove_pvs.contains(&pv.id))
        .count()
        + request.add_pvs.len();
    if remaining == 0 {
        return Err(Rejection::VgWouldBeEmpty {
            name: vg.name.clone(),
        });
    }

    Ok(())
}

pub fn validate_delete(ctx: &ValidationContext<'_>, device: &DeviceId) -> Result<(), Rejection> {
    let device = ctx
        .graph
        .get(device)
        .ok_or_else(|| Rejection::UnknownDevice(device.clone()))?;

    if device.is_disk() {
        return Err(Rejection::CannotDeleteDisk {
            name: device.name.clone(),
        });
    }

    Ok(())
}

pub fn validate_create_disk_label(
    ctx: &ValidationContext<'_>,
    disk: &DeviceId,
    label: &DiskLabelType,
) -> Result<(), Rejection> {
    let device = ctx
        .graph
        .get(disk)
        .ok_or_else(|| Rejection::UnknownDevice(disk.clone()))?;

    if !device.is_disk() {
        return Err(Rejection::NotADisk {
            name: device.name.clone(),
        });
    }

    if !ctx.supported.supports_disklabel(label) {
        return Err(Rejection::UnsupportedDiskLabel(label.to_string()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use storage_testing::fixtures::{self, DiskBuilder};
    use storage_types::{Reformat, ResizeInfo, Size};

    use super::*;
    use crate::model::DeviceGraph;
    use crate::offer::SupportedTypes;

    fn supported() -> SupportedTypes {
        SupportedTypes {
            filesystems: vec!["ext4".into(), "xfs".into()],
            disklabels: vec![DiskLabelType::Gpt],
            ..SupportedTypes::default()
        }
    }

    fn graph() -> DeviceGraph {
        let mut devices = DiskBuilder::msdos("sda", Size::from_gib(10))
            .primary("sda1", Size::from_gib(1))
            .format_last(fixtures::filesystem("ext4", Some("/boot")))
            .primary("sda2", Size::from_gib(4))
            .format_last(fixtures::pv_format(Size::ZERO, Some("vg")))
            .primary("sda3", Size::from_gib(4))
            .format_last(fixtures::pv_format(Size::from_gib(4), None))
            .build();
        devices.push(fixtures::volume_group("vg", &["sda2"], Size::from_gib(4), Size::ZERO));
        DeviceGraph::new(devices).expect("graph")
    }

    fn partition_edit(device: &str) -> EditPartitionRequest {
        EditPartitionRequest {
            device: DeviceId::new(device),
            resize: None,
            reformat: None,
            mountpoint: None,
        }
    }

    #[test]
    fn resize_needs_resizable_device_within_bounds() {
        let graph = graph();
        let supported = supported();
        let mut ctx = ValidationContext::new(&graph, &supported, &[]);

        let mut request = partition_edit("sda1");
        request.resize = Some(Size::from_gib(2));
        let edit = EditDeviceRequest::Partition(request);

        ctx.resize = Some(ResizeInfo::FIXED);
        assert_eq!(
            validate_edit(&ctx, &edit),
            Err(Rejection::NotResizable {
                name: "sda1".to_string()
            })
        );

        ctx.resize = Some(ResizeInfo {
            resizable: true,
            min_size: Size::from_mib(100),
            max_size: Size::from_gib(1),
        });
        assert!(matches!(
            validate_edit(&ctx, &edit),
            Err(Rejection::SizeTooLarge { .. })
        ));

        ctx.resize = Some(ResizeInfo {
            resizable: true,
            min_size: Size::from_mib(100),
            max_size: Size::from_gib(3),
        });
        assert_eq!(validate_edit(&ctx, &edit), Ok(()));
    }

    #[test]
    fn keeping_own_mountpoint_is_allowed() {
        let graph = graph();
        let supported = supported();
        let taken = graph.mountpoints();
        let ctx = ValidationContext::new(&graph, &supported, &taken);

        let mut request = partition_edit("sda1");
        request.mountpoint = Some("/boot".to_string());
        assert_eq!(validate_edit(&ctx, &EditDeviceRequest::Partition(request)), Ok(()));

        let mut request = partition_edit("sda3");
        request.reformat = Some(Reformat {
            filesystem: "xfs".to_string(),
            label: None,
        });
        request.mountpoint = Some("/boot".to_string());
        assert_eq!(
            validate_edit(&ctx, &EditDeviceRequest::Partition(request)),
            Err(Rejection::DuplicateMountpoint("/boot".to_string()))
        );
    }

    #[test]
    fn vg_edits_check_pv_sets() {
        let graph = graph();
        let supported = supported();
        let removable = vec![DeviceId::new("sda2")];
        let free: Vec<DeviceId> = graph.free_pvs().iter().map(|pv| pv.id.clone()).collect();
        let mut ctx = ValidationContext::new(&graph, &supported, &[]);
        ctx.free_pvs = &free;

        let mut request = EditVolumeGroupRequest {
            vg: DeviceId::new("vg"),
            add_pvs: vec![],
            remove_pvs: vec![DeviceId::new("sda2")],
        };
        assert_eq!(
            validate_edit(&ctx, &EditDeviceRequest::VolumeGroup(request.clone())),
            Err(Rejection::PvNotRemovable {
                name: "sda2".to_string()
            })
        );

        ctx.removable_pvs = &removable;
        assert_eq!(
            validate_edit(&ctx, &EditDeviceRequest::VolumeGroup(request.clone())),
            Err(Rejection::VgWouldBeEmpty {
                name: "vg".to_string()
            })
        );

        request.add_pvs = vec![DeviceId::new("sda1")];
        assert_eq!(
            validate_edit(&ctx, &EditDeviceRequest::VolumeGroup(request.clone())),
            Err(Rejection::PvNotFree {
                name: "sda1".to_string()
            })
        );

        request.add_pvs = vec![DeviceId::new("sda3")];
        assert_eq!(validate_edit(&ctx, &EditDeviceRequest::VolumeGroup(request)), Ok(()));
    }

    #[test]
    fn delete_and_disklabel_rules() {
        let graph = graph();
        let supported = supported();
        let ctx = ValidationContext::new(&graph, &supported, &[]);

        assert_eq!(
            validate_delete(&ctx, &DeviceId::new("sda")),
            Err(Rejection::CannotDeleteDisk {
                name: "sda".to_string()
            })
        );
        assert_eq!(validate_delete(&ctx, &DeviceId::new("sda1")), Ok(()));
        assert_eq!(
            validate_delete(&ctx, &DeviceId::new("sdz")),
            Err(Rejection::UnknownDevice(DeviceId::new("sdz")))
        );

        assert_eq!(
            validate_create_disk_label(&ctx, &DeviceId::new("sda1"), &DiskLabelType::Gpt),
            Err(Rejection::NotADisk {
                name: "sda1".to_string()
            })
        );
        assert_eq!(
            validate_create_disk_label(&ctx, &DeviceId::new("sda"), &DiskLabelType::Msdos),
            Err(Rejection::UnsupportedDiskLabel("msdos".to_string()))
        );
        assert_eq!(
            validate_create_disk_label(&ctx, &DeviceId::new("sda"), &DiskLabelType::Gpt),
            Ok(())
        );
    }
}
