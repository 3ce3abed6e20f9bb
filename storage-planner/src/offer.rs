// SPDX-License-Identifier: GPL-3.0-only

//! What a caller may choose when adding a device
//!
//! Every function here is pure over a graph snapshot, so the same rules drive
//! both the choices offered to a caller and the validation of what comes back.

use std::collections::HashMap;

use storage_types::{
    Device, DeviceId, DeviceKind, DiskLabelType, FreeSpaceKind, FreeSpaceTarget, MemberSize,
    NewDeviceType, PartitionType, RaidLevel, Ratio, Size, is_linear_level,
};

use crate::catalog::{AddAnchor, BTRFS_MIN_FREE, ParentRole};
use crate::model::DeviceGraph;

pub const MIN_SIZE_DEFAULT: Size = Size::from_mib(1);
pub const MIN_SIZE_LVM: Size = Size::from_mib(8);
pub const MIN_SIZE_BTRFS: Size = BTRFS_MIN_FREE;

/// Space the LUKS header takes from an encrypted device
pub const ENCRYPTION_OVERHEAD: Size = Size::from_mib(2);

/// Thin pools may use at most 80% of the free space
pub const THIN_POOL_CAP: Ratio = Ratio::new(4, 5);

pub const DEFAULT_PE_SIZE: Size = Size::from_mib(4);
pub const SUPPORTED_PE_SIZES: [Size; 6] = [
    Size::from_mib(2),
    Size::from_mib(4),
    Size::from_mib(8),
    Size::from_mib(16),
    Size::from_mib(32),
    Size::from_mib(64),
];

pub const MIN_CACHE_SIZE: Size = Size::from_mib(1);

/// Type catalogs fetched from the backend once per session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SupportedTypes {
    pub filesystems: Vec<String>,
    pub disklabels: Vec<DiskLabelType>,
    /// Only device types that can span several members have an entry
    pub raid_levels: HashMap<NewDeviceType, Vec<RaidLevel>>,
}

impl SupportedTypes {
    pub fn supports_filesystem(&self, fs: &str) -> bool {
        self.filesystems.iter().any(|f| f == fs)
    }

    pub fn supports_disklabel(&self, label: &DiskLabelType) -> bool {
        self.disklabels.contains(label)
    }

    pub fn raid_levels_for(&self, device_type: NewDeviceType) -> Option<&[RaidLevel]> {
        self.raid_levels.get(&device_type).map(Vec::as_slice)
    }
}

/// Everything needed to build a new-device request on one anchor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddContext {
    pub anchor: AddAnchor,
    /// The anchor is a disk without a partition table
    pub needs_disklabel: bool,
    pub device_types: Vec<NewDeviceType>,
    pub partition_types: Vec<PartitionType>,
}

pub fn add_context(graph: &DeviceGraph, anchor: AddAnchor) -> AddContext {
    let needs_disklabel = anchor.role == ParentRole::Disk
        && graph
            .get(&anchor.parent)
            .is_some_and(|disk| disk.disk_label().is_none());

    AddContext {
        device_types: allowed_device_types(graph, &anchor),
        partition_types: partition_types(graph, &anchor),
        needs_disklabel,
        anchor,
    }
}

/// Device types creatable on `anchor`, in display order
pub fn allowed_device_types(graph: &DeviceGraph, anchor: &AddAnchor) -> Vec<NewDeviceType> {
    use NewDeviceType::*;

    let parent = graph.get(&anchor.parent);

    if anchor.role == ParentRole::Disk {
        if anchor.free.is_logical {
            return vec![Partition, Lvm, LvmPv];
        }

        let unformatted = parent.is_some_and(|disk| disk.format.is_none());
        if unformatted && anchor.free.size > BTRFS_MIN_FREE {
            return vec![BtrfsVolume];
        }
    }

    let mut types = match anchor.role {
        ParentRole::Disk => vec![Partition, Lvm, LvmPv],
        ParentRole::LvmPv | ParentRole::Luks | ParentRole::MdArray => vec![LvmVg],
        ParentRole::LvmVg => vec![LvmLv, LvmThinPool],
        ParentRole::BtrfsVolume => vec![BtrfsSubvolume],
        ParentRole::LvmLv => vec![LvmSnapshot],
        ParentRole::LvmThinPool => vec![LvmThinLv],
    };

    if anchor.role == ParentRole::Disk {
        if graph.free_disk_regions().len() > 1 {
            types.push(MdRaid);
        }
        if anchor.free.size > BTRFS_MIN_FREE {
            types.push(BtrfsVolume);
        }
    }

    if anchor.role == ParentRole::LvmVg
        && parent.is_some_and(|vg| cache_offered(graph, vg))
    {
        types.push(LvmCache);
    }

    types
}

/// Partition types allowed in the anchor's free space
pub fn partition_types(graph: &DeviceGraph, anchor: &AddAnchor) -> Vec<PartitionType> {
    if anchor.role != ParentRole::Disk {
        return Vec::new();
    }

    if anchor.free.is_logical {
        return vec![PartitionType::Logical];
    }

    if graph.extended_partition(&anchor.parent).is_some() {
        return vec![PartitionType::Primary];
    }

    match graph.get(&anchor.parent).and_then(Device::disk_label) {
        Some((DiskLabelType::Msdos, _, _)) => vec![PartitionType::Primary, PartitionType::Extended],
        _ => vec![PartitionType::Primary],
    }
}

/// Whether a RAID level applies to this many selected members
pub fn raid_applies(supported: &SupportedTypes, device_type: NewDeviceType, members: usize) -> bool {
    supported.raid_levels_for(device_type).is_some() && members > 1
}

/// RAID levels offered for `members` selected parents
pub fn offered_raid_levels(levels: &[RaidLevel], members: usize) -> Vec<&RaidLevel> {
    levels
        .iter()
        .filter(|level| !level.is_container())
        .filter(|level| level.min_members as usize <= members)
        .collect()
}

/// Level to keep selected after the offered list changed
pub fn reselect_raid_level(
    device_type: NewDeviceType,
    offered: &[&RaidLevel],
    previous: Option<&str>,
) -> Option<String> {
    let is_offered = |name: &str| offered.iter().any(|level| level.name == name);

    if let Some(previous) = previous
        && is_offered(previous)
    {
        return Some(previous.to_string());
    }

    let default = if device_type == NewDeviceType::BtrfsVolume {
        "single"
    } else {
        "linear"
    };

    if is_offered(default) {
        return Some(default.to_string());
    }

    offered.first().map(|level| level.name.clone())
}

/// Extent sizes that leave room for at least two extents
pub fn offered_pe_sizes(free: Size) -> Vec<Size> {
    SUPPORTED_PE_SIZES
        .into_iter()
        .filter(|pe| *pe * 2 <= free)
        .collect()
}

pub fn min_size(device_type: NewDeviceType) -> Size {
    match device_type {
        NewDeviceType::LvmPv | NewDeviceType::Lvm | NewDeviceType::LvmSnapshot => MIN_SIZE_LVM,
        NewDeviceType::BtrfsVolume => MIN_SIZE_BTRFS,
        _ => MIN_SIZE_DEFAULT,
    }
}

/// Size bounds of one member
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeLimits {
    pub min: Size,
    pub max: Size,
    /// Size always equals `max`
    pub fixed: bool,
}

impl SizeLimits {
    pub fn clamp(&self, size: Size) -> Size {
        if self.fixed {
            return self.max;
        }
        size.min(self.max).max(self.min)
    }
}

/// Inputs that shape member size limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeInputs<'a> {
    pub device_type: NewDeviceType,
    /// Selected RAID level, only when a level applies
    pub raid_level: Option<&'a str>,
    pub encrypted: bool,
    pub pe_size: Option<Size>,
    /// Btrfs volume spanning whole disks
    pub whole_disks: bool,
}

impl SizeInputs<'_> {
    pub fn plain(device_type: NewDeviceType) -> Self {
        Self {
            device_type,
            raid_level: None,
            encrypted: false,
            pe_size: None,
            whole_disks: false,
        }
    }

    /// Members of striped or mirrored devices share one size
    pub fn uniform(&self) -> bool {
        self.raid_level.is_some_and(|level| !is_linear_level(level))
    }
}

/// Per-member bounds for the selected targets, in selection order
pub fn member_limits(targets: &[FreeSpaceTarget], inputs: &SizeInputs<'_>) -> Vec<SizeLimits> {
    let base = inputs
        .pe_size
        .map(|pe| pe * 2)
        .unwrap_or_else(|| min_size(inputs.device_type));
    let min = if inputs.encrypted {
        base + ENCRYPTION_OVERHEAD
    } else {
        base
    };

    let smallest = targets.iter().map(|t| t.size).min().unwrap_or(Size::ZERO);
    let fixed = inputs.whole_disks
        || matches!(
            inputs.device_type,
            NewDeviceType::LvmVg | NewDeviceType::BtrfsSubvolume
        );

    targets
        .iter()
        .map(|target| {
            let mut max = if inputs.uniform() { smallest } else { target.size };
            if inputs.device_type == NewDeviceType::LvmThinPool {
                max = max.scale(THIN_POOL_CAP);
            }
            SizeLimits { min, max, fixed }
        })
        .collect()
}

/// Sizes chosen for each member, kept inside their limits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizePlan {
    targets: Vec<FreeSpaceTarget>,
    limits: Vec<SizeLimits>,
    sizes: Vec<Size>,
    uniform: bool,
}

impl SizePlan {
    /// Start with every member at its maximum
    pub fn new(targets: Vec<FreeSpaceTarget>, inputs: &SizeInputs<'_>) -> Self {
        let limits = member_limits(&targets, inputs);
        let sizes = limits.iter().map(|l| l.max).collect();
        Self {
            targets,
            limits,
            sizes,
            uniform: inputs.uniform(),
        }
    }

    /// Recompute limits, keeping chosen sizes where they still fit
    pub fn update(&mut self, inputs: &SizeInputs<'_>) {
        self.limits = member_limits(&self.targets, inputs);
        self.uniform = inputs.uniform();
        for (size, limits) in self.sizes.iter_mut().zip(&self.limits) {
            *size = limits.clamp(*size);
        }
        if self.uniform
            && let Some(first) = self.sizes.first().copied()
        {
            self.apply_uniform(first);
        }
    }

    /// Choose a size for one member; uniform plans move every member
    pub fn select(&mut self, member: usize, size: Size) -> Option<Size> {
        let limits = self.limits.get(member)?;
        let size = limits.clamp(size);

        if self.uniform {
            self.apply_uniform(size);
        } else {
            self.sizes[member] = size;
        }

        Some(size)
    }

    fn apply_uniform(&mut self, size: Size) {
        for (slot, limits) in self.sizes.iter_mut().zip(&self.limits) {
            *slot = limits.clamp(size);
        }
    }

    pub fn limits(&self) -> &[SizeLimits] {
        &self.limits
    }

    pub fn sizes(&self) -> &[Size] {
        &self.sizes
    }

    pub fn into_members(self) -> Vec<MemberSize> {
        self.targets
            .into_iter()
            .zip(self.sizes)
            .map(|(target, size)| MemberSize { target, size })
            .collect()
    }
}

fn vg_extents(vg: &Device) -> Option<(Size, Size)> {
    match vg.kind {
        DeviceKind::LvmVg { pe_size, free, .. } => Some((pe_size, free)),
        _ => None,
    }
}

/// A cached LV is offered when some PV of the VG has unallocated space
pub fn cache_offered(graph: &DeviceGraph, vg: &Device) -> bool {
    graph
        .vg_pvs(&vg.id)
        .into_iter()
        .any(|pv| !pv.pv_free().is_zero())
}

/// PVs of `vg` with room for more than one extent of cache
pub fn fast_pv_candidates<'a>(graph: &'a DeviceGraph, vg: &Device) -> Vec<&'a Device> {
    let Some((pe_size, _)) = vg_extents(vg) else {
        return Vec::new();
    };

    graph
        .vg_pvs(&vg.id)
        .into_iter()
        .filter(|pv| pv.pv_free() > pe_size)
        .collect()
}

/// Largest cache the selected fast PVs can hold, two extents left over
pub fn max_cache_size(graph: &DeviceGraph, vg: &Device, fast_pvs: &[DeviceId]) -> Size {
    let Some((pe_size, _)) = vg_extents(vg) else {
        return Size::ZERO;
    };

    let free: Size = fast_pvs
        .iter()
        .filter_map(|id| graph.get(id))
        .map(Device::pv_free)
        .sum();

    free.saturating_sub(pe_size * 2)
}

/// Largest cached LV that still fits next to a cache of `cache_size`
pub fn cached_lv_max(vg: &Device, cache_size: Size) -> Size {
    match vg_extents(vg) {
        Some((pe_size, free)) => free.saturating_sub(cache_size).saturating_sub(pe_size),
        None => Size::ZERO,
    }
}

/// Target covering a whole disk rather than a region of it
pub fn is_whole_disk_target(target: &FreeSpaceTarget) -> bool {
    target.start.is_none()
        && matches!(
            target.kind,
            FreeSpaceKind::EmptyDisk | FreeSpaceKind::UninitializedDisk
        )
}
