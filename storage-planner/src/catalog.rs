// SPDX-License-Identifier: GPL-3.0-only

//! Free-space catalog
//!
//! Turns a caller selection into an anchor (parent device, its role and the
//! selected free space) and lists the free-space targets a new device of a
//! given type may be built on.

use storage_types::{
    Device, DeviceId, DeviceKind, FreeSpaceKind, FreeSpaceTarget, NewDeviceType, Selection, Size,
};

use crate::model::DeviceGraph;
use crate::validation::Rejection;

/// Smallest free space a new Btrfs volume is offered on
pub const BTRFS_MIN_FREE: Size = Size::from_mib(256);

/// Role of the device new devices are created under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParentRole {
    Disk,
    LvmPv,
    LvmVg,
    Luks,
    MdArray,
    BtrfsVolume,
    LvmLv,
    LvmThinPool,
}

impl ParentRole {
    /// Role a device plays as a parent, `None` if it cannot hold new devices
    pub fn of(device: &Device) -> Option<Self> {
        if device.is_pv() {
            return Some(Self::LvmPv);
        }
        if device.is_disk() {
            return Some(Self::Disk);
        }

        match device.kind {
            DeviceKind::LvmVg { .. } => Some(Self::LvmVg),
            DeviceKind::LuksDevice => Some(Self::Luks),
            DeviceKind::MdArray { .. } => Some(Self::MdArray),
            DeviceKind::BtrfsVolume => Some(Self::BtrfsVolume),
            DeviceKind::LvmLv => Some(Self::LvmLv),
            DeviceKind::LvmThinPool { .. } => Some(Self::LvmThinPool),
            _ => None,
        }
    }
}

/// Resolved starting point of a new-device request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddAnchor {
    pub parent: DeviceId,
    pub role: ParentRole,
    pub free: FreeSpaceTarget,
}

/// Result of resolving a selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnchorLookup {
    Ready(AddAnchor),
    /// Snapshot of `lv`; the free space of `vg` has to be fetched first
    NeedsVgFree { lv: DeviceId, vg: DeviceId },
}

/// Resolve what the caller selected into an anchor
pub fn anchor_for(graph: &DeviceGraph, selection: &Selection) -> Result<AnchorLookup, Rejection> {
    match selection {
        Selection::FreeSpace { target } => {
            let parent_id = target.primary_parent().ok_or(Rejection::NoParentSelected)?;
            let parent = graph
                .get(parent_id)
                .ok_or_else(|| Rejection::UnknownDevice(parent_id.clone()))?;
            let role = ParentRole::of(parent).ok_or_else(|| not_an_anchor(parent))?;

            Ok(AnchorLookup::Ready(AddAnchor {
                parent: parent.id.clone(),
                role,
                free: target.clone(),
            }))
        }
        Selection::Device { device } => {
            let device = graph
                .get(device)
                .ok_or_else(|| Rejection::UnknownDevice(device.clone()))?;
            device_anchor(graph, device)
        }
    }
}

fn device_anchor(graph: &DeviceGraph, device: &Device) -> Result<AnchorLookup, Rejection> {
    let role = ParentRole::of(device).ok_or_else(|| not_an_anchor(device))?;

    let free = match role {
        ParentRole::LvmLv => {
            let vg = device
                .parents
                .first()
                .cloned()
                .ok_or_else(|| not_an_anchor(device))?;
            return Ok(AnchorLookup::NeedsVgFree {
                lv: device.id.clone(),
                vg,
            });
        }
        ParentRole::Disk => disk_free_space(graph, device)?,
        ParentRole::LvmPv => FreeSpaceTarget::new(FreeSpaceKind::FreePv, device.id.clone(), device.size),
        ParentRole::LvmVg => match device.kind {
            DeviceKind::LvmVg { free, .. } => {
                FreeSpaceTarget::new(FreeSpaceKind::FreeRegion, device.id.clone(), free)
            }
            _ => return Err(not_an_anchor(device)),
        },
        ParentRole::LvmThinPool => match device.kind {
            DeviceKind::LvmThinPool { free } => {
                FreeSpaceTarget::new(FreeSpaceKind::FreeRegion, device.id.clone(), free)
            }
            _ => return Err(not_an_anchor(device)),
        },
        ParentRole::BtrfsVolume | ParentRole::Luks | ParentRole::MdArray => {
            FreeSpaceTarget::new(FreeSpaceKind::FreeRegion, device.id.clone(), device.size)
        }
    };

    Ok(AnchorLookup::Ready(AddAnchor {
        parent: device.id.clone(),
        role,
        free,
    }))
}

/// Whole-disk target, or the first free region of a labeled disk
fn disk_free_space(graph: &DeviceGraph, disk: &Device) -> Result<FreeSpaceTarget, Rejection> {
    graph
        .free_disk_regions()
        .into_iter()
        .find(|target| target.primary_parent() == Some(&disk.id))
        .ok_or_else(|| Rejection::NoFreeSpace {
            name: disk.name.clone(),
        })
}

fn not_an_anchor(device: &Device) -> Rejection {
    Rejection::NotAnAnchor {
        name: device.name.clone(),
        device_type: device.type_name().to_string(),
    }
}

/// Snapshot anchor once the VG free space is known
pub fn snapshot_anchor(lv: DeviceId, vg_free: FreeSpaceTarget) -> AddAnchor {
    AddAnchor {
        parent: lv,
        role: ParentRole::LvmLv,
        free: vg_free,
    }
}

/// Candidate targets for one device type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSet {
    pub candidates: Vec<FreeSpaceTarget>,
    /// Index of the pre-selected candidate
    pub selected: Option<usize>,
    /// The pre-selection cannot be removed
    pub locked: bool,
}

impl TargetSet {
    pub fn contains(&self, target: &FreeSpaceTarget) -> bool {
        self.candidates.contains(target)
    }
}

/// Ordered targets a new `device_type` may use, with the pre-selection
///
/// `partition_based` lists free regions on labeled disks for Btrfs volumes;
/// otherwise Btrfs volumes only use whole disks.
pub fn targets_for(
    graph: &DeviceGraph,
    anchor: &AddAnchor,
    device_type: NewDeviceType,
    partition_based: bool,
) -> TargetSet {
    let candidates = match device_type {
        NewDeviceType::LvmVg => graph
            .free_pvs()
            .into_iter()
            .filter(|pv| !pv.pv_free().is_zero())
            .map(|pv| FreeSpaceTarget::new(FreeSpaceKind::FreePv, pv.id.clone(), pv.pv_free()))
            .collect(),
        NewDeviceType::BtrfsVolume | NewDeviceType::Lvm | NewDeviceType::MdRaid => graph
            .free_disk_regions()
            .into_iter()
            .filter(|target| {
                target.kind != FreeSpaceKind::FreeRegion
                    || device_type != NewDeviceType::BtrfsVolume
                    || partition_based
            })
            .filter(|target| {
                device_type != NewDeviceType::BtrfsVolume || target.size >= BTRFS_MIN_FREE
            })
            .collect(),
        _ => vec![anchor.free.clone()],
    };

    let (selected, locked) = preselect(&candidates, anchor);

    TargetSet {
        candidates,
        selected,
        locked,
    }
}

fn preselect(candidates: &[FreeSpaceTarget], anchor: &AddAnchor) -> (Option<usize>, bool) {
    if candidates.len() == 1 {
        return (Some(0), true);
    }

    let selected = candidates.iter().position(|target| {
        target.primary_parent() == anchor.free.primary_parent()
            && (anchor.free.start.is_none() || anchor.free.start == target.start)
    });

    (selected, false)
}

#[cfg(test)]
mod tests {
    use storage_types::{ByteRange, DiskLabelType, Format, PartitionType};

    use super::*;

    const MIB: u64 = 1024 * 1024;

    fn disk(id: &str, size: Size, labeled: bool) -> Device {
        Device {
            id: DeviceId::new(id),
            name: id.to_string(),
            kind: DeviceKind::Disk { removable: false },
            size,
            format: labeled.then(|| Format::DiskLabel {
                label_type: DiskLabelType::Msdos,
                usable: ByteRange::new(MIB, size.bytes()),
                max_primary: 4,
            }),
            parents: vec![],
        }
    }

    fn partition(id: &str, disk: &str, start_mib: u64, size_mib: u64) -> Device {
        Device {
            id: DeviceId::new(id),
            name: id.to_string(),
            kind: DeviceKind::Partition {
                partition_type: PartitionType::Primary,
                start: start_mib * MIB,
            },
            size: Size::from_mib(size_mib),
            format: None,
            parents: vec![DeviceId::new(disk)],
        }
    }

    fn two_region_graph() -> DeviceGraph {
        DeviceGraph::new(vec![
            disk("sda", Size::from_gib(2), true),
            partition("sda1", "sda", 100, 100),
            disk("sdb", Size::from_mib(200), false),
        ])
        .expect("graph")
    }

    #[test]
    fn preselects_region_by_start_offset() {
        let graph = two_region_graph();
        let regions = graph.free_disk_regions();
        let second = regions[1].clone();
        assert_eq!(second.start, Some(200 * MIB));

        let anchor = AddAnchor {
            parent: DeviceId::new("sda"),
            role: ParentRole::Disk,
            free: second.clone(),
        };
        let set = targets_for(&graph, &anchor, NewDeviceType::Lvm, false);

        assert_eq!(set.candidates.len(), 3);
        assert_eq!(set.selected.map(|i| &set.candidates[i]), Some(&second));
        assert!(!set.locked);
    }

    #[test]
    fn btrfs_whole_disk_mode_skips_regions_and_small_disks() {
        let graph = two_region_graph();
        let anchor = AddAnchor {
            parent: DeviceId::new("sdb"),
            role: ParentRole::Disk,
            free: FreeSpaceTarget::new(
                FreeSpaceKind::EmptyDisk,
                DeviceId::new("sdb"),
                Size::from_mib(200),
            ),
        };

        let set = targets_for(&graph, &anchor, NewDeviceType::BtrfsVolume, false);
        assert!(set.candidates.is_empty());
        assert_eq!(set.selected, None);

        let set = targets_for(&graph, &anchor, NewDeviceType::BtrfsVolume, true);
        assert!(
            set.candidates
                .iter()
                .all(|t| t.kind == FreeSpaceKind::FreeRegion && t.size >= BTRFS_MIN_FREE)
        );
    }

    #[test]
    fn single_candidate_is_selected_and_locked() {
        let graph = two_region_graph();
        let free = graph.free_disk_regions()[0].clone();
        let anchor = AddAnchor {
            parent: DeviceId::new("sda"),
            role: ParentRole::Disk,
            free: free.clone(),
        };

        let set = targets_for(&graph, &anchor, NewDeviceType::Partition, false);
        assert_eq!(set.candidates, vec![free]);
        assert_eq!(set.selected, Some(0));
        assert!(set.locked);
    }

    #[test]
    fn lv_selection_needs_vg_free() {
        let graph = DeviceGraph::new(vec![
            disk("sda", Size::from_gib(1), false),
            Device {
                id: DeviceId::new("vg"),
                name: "vg".to_string(),
                kind: DeviceKind::LvmVg {
                    pe_size: Size::from_mib(4),
                    free: Size::from_mib(500),
                    complete: true,
                },
                size: Size::from_gib(1),
                format: None,
                parents: vec![DeviceId::new("sda")],
            },
            Device {
                id: DeviceId::new("lv"),
                name: "lv".to_string(),
                kind: DeviceKind::LvmLv,
                size: Size::from_mib(500),
                format: None,
                parents: vec![DeviceId::new("vg")],
            },
        ])
        .expect("graph");

        let lookup = anchor_for(
            &graph,
            &Selection::Device {
                device: DeviceId::new("lv"),
            },
        )
        .expect("anchor");
        assert_eq!(
            lookup,
            AnchorLookup::NeedsVgFree {
                lv: DeviceId::new("lv"),
                vg: DeviceId::new("vg"),
            }
        );

        let lookup = anchor_for(
            &graph,
            &Selection::Device {
                device: DeviceId::new("vg"),
            },
        )
        .expect("anchor");
        match lookup {
            AnchorLookup::Ready(anchor) => {
                assert_eq!(anchor.role, ParentRole::LvmVg);
                assert_eq!(anchor.free.size, Size::from_mib(500));
            }
            other => panic!("unexpected lookup: {other:?}"),
        }
    }
}
