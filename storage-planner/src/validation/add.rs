// SPDX-License-Identifier: GPL-3.0-only

use storage_types::{
    AddDeviceRequest, AdvancedOptions, FreeSpaceKind, FreeSpaceTarget, NewDeviceType,
    PartitionType,
};

use super::names;
use super::{FilesystemTarget, Rejection, ValidationContext, check_anchor};
use crate::catalog::{AddAnchor, ParentRole, targets_for};
use crate::offer::{self, MIN_CACHE_SIZE, SizeInputs};

/// Types that may span several selected targets
fn spans_members(device_type: NewDeviceType) -> bool {
    matches!(
        device_type,
        NewDeviceType::Lvm | NewDeviceType::LvmVg | NewDeviceType::BtrfsVolume | NewDeviceType::MdRaid
    )
}

/// Validate a new-device request
pub fn validate_add(ctx: &ValidationContext<'_>, request: &AddDeviceRequest) -> Result<(), Rejection> {
    let anchor = request_anchor(ctx, request)?;

    check_anchor(ctx.graph, &anchor)?;
    check_device_type(ctx, &anchor, request)?;
    let partition_type = check_partition_type(ctx, &anchor, request)?;
    let raid_level = check_members(ctx, &anchor, request)?;
    check_pe_size(request)?;
    check_sizes(ctx, request, raid_level.as_deref(), partition_type)?;
    check_cache(ctx, &anchor, request)?;
    check_content(ctx, request, partition_type)
}

fn request_anchor(
    ctx: &ValidationContext<'_>,
    request: &AddDeviceRequest,
) -> Result<AddAnchor, Rejection> {
    let parent = ctx
        .graph
        .get(&request.parent)
        .ok_or_else(|| Rejection::UnknownDevice(request.parent.clone()))?;
    let role = ParentRole::of(parent).ok_or_else(|| Rejection::NotAnAnchor {
        name: parent.name.clone(),
        device_type: parent.type_name().to_string(),
    })?;

    Ok(AddAnchor {
        parent: parent.id.clone(),
        role,
        free: request.free.clone(),
    })
}

fn check_device_type(
    ctx: &ValidationContext<'_>,
    anchor: &AddAnchor,
    request: &AddDeviceRequest,
) -> Result<(), Rejection> {
    if offer::allowed_device_types(ctx.graph, anchor).contains(&request.device_type) {
        return Ok(());
    }

    Err(Rejection::DeviceTypeNotAllowed {
        device_type: request.device_type.to_string(),
        parent: ctx.device_name(&anchor.parent),
    })
}

/// Effective partition type of a new partition
fn check_partition_type(
    ctx: &ValidationContext<'_>,
    anchor: &AddAnchor,
    request: &AddDeviceRequest,
) -> Result<Option<PartitionType>, Rejection> {
    match (&request.advanced, request.device_type) {
        (Some(AdvancedOptions::Partition { partition_type }), NewDeviceType::Partition) => {
            if offer::partition_types(ctx.graph, anchor).contains(partition_type) {
                Ok(Some(*partition_type))
            } else {
                Err(Rejection::PartitionTypeNotAllowed {
                    partition_type: partition_type.as_str().to_string(),
                })
            }
        }
        (None, NewDeviceType::Partition) => {
            Ok(offer::partition_types(ctx.graph, anchor).first().copied())
        }
        (Some(AdvancedOptions::Lvm { .. }), NewDeviceType::Lvm | NewDeviceType::LvmVg) => Ok(None),
        (Some(_), device_type) => Err(Rejection::AdvancedNotApplicable {
            device_type: device_type.to_string(),
        }),
        (None, _) => Ok(None),
    }
}

fn target_name(ctx: &ValidationContext<'_>, target: &FreeSpaceTarget) -> String {
    target
        .primary_parent()
        .map(|id| ctx.device_name(id))
        .unwrap_or_default()
}

/// Member selection checks; returns the RAID level in effect, if any
fn check_members(
    ctx: &ValidationContext<'_>,
    anchor: &AddAnchor,
    request: &AddDeviceRequest,
) -> Result<Option<String>, Rejection> {
    let device_type = request.device_type;
    let members = &request.members;

    if members.is_empty() {
        return Err(Rejection::NoParentSelected);
    }
    if members.len() > 1 && !spans_members(device_type) {
        return Err(Rejection::TooManyParents {
            device_type: device_type.to_string(),
        });
    }

    let partition_based = members
        .iter()
        .any(|m| m.target.kind == FreeSpaceKind::FreeRegion);
    let available = targets_for(ctx.graph, anchor, device_type, partition_based);

    let mut seen: Vec<&FreeSpaceTarget> = Vec::with_capacity(members.len());
    for member in members {
        if !available.contains(&member.target) {
            return Err(Rejection::TargetNotAvailable {
                name: target_name(ctx, &member.target),
            });
        }
        if seen.contains(&&member.target) {
            return Err(Rejection::DuplicateTarget {
                name: target_name(ctx, &member.target),
            });
        }
        seen.push(&member.target);
    }

    if !offer::raid_applies(ctx.supported, device_type, members.len()) {
        return Ok(None);
    }

    let levels = ctx.supported.raid_levels_for(device_type).unwrap_or(&[]);
    let offered = offer::offered_raid_levels(levels, members.len());

    let level = match request.raid_level.as_deref() {
        Some(level) if offered.iter().any(|l| l.name == level) => Some(level.to_string()),
        Some(level) => {
            return Err(Rejection::RaidLevelNotAvailable {
                level: level.to_string(),
                members: members.len(),
            });
        }
        None => offer::reselect_raid_level(device_type, &offered, None),
    };

    level.map(Some).ok_or(Rejection::RaidLevelNotAvailable {
        level: String::new(),
        members: members.len(),
    })
}

fn check_sizes(
    ctx: &ValidationContext<'_>,
    request: &AddDeviceRequest,
    raid_level: Option<&str>,
    partition_type: Option<PartitionType>,
) -> Result<(), Rejection> {
    let targets: Vec<FreeSpaceTarget> = request.members.iter().map(|m| m.target.clone()).collect();
    let inputs = SizeInputs {
        device_type: request.device_type,
        raid_level,
        encrypted: request.is_encrypted() && partition_type != Some(PartitionType::Extended),
        pe_size: request.pe_size(),
        whole_disks: request.device_type == NewDeviceType::BtrfsVolume
            && targets.iter().all(offer::is_whole_disk_target),
    };

    let limits = offer::member_limits(&targets, &inputs);
    for (member, limits) in request.members.iter().zip(&limits) {
        let name = target_name(ctx, &member.target);

        if limits.fixed && member.size != limits.max {
            return Err(Rejection::SizeFixed {
                name,
                size: limits.max,
            });
        }
        if member.size < limits.min {
            return Err(Rejection::SizeTooSmall {
                name,
                size: member.size,
                min: limits.min,
            });
        }
        if member.size > limits.max {
            return Err(Rejection::SizeTooLarge {
                name,
                size: member.size,
                max: limits.max,
            });
        }
    }

    if inputs.uniform()
        && request
            .members
            .windows(2)
            .any(|pair| pair[0].size != pair[1].size)
    {
        return Err(Rejection::UnequalRaidMembers);
    }

    Ok(())
}

fn check_pe_size(request: &AddDeviceRequest) -> Result<(), Rejection> {
    match request.pe_size() {
        Some(pe_size) if !offer::offered_pe_sizes(request.free.size).contains(&pe_size) => {
            Err(Rejection::PeSizeNotAllowed(pe_size))
        }
        _ => Ok(()),
    }
}

fn check_cache(
    ctx: &ValidationContext<'_>,
    anchor: &AddAnchor,
    request: &AddDeviceRequest,
) -> Result<(), Rejection> {
    let Some(cache) = &request.cache else {
        return Ok(());
    };

    if request.device_type != NewDeviceType::LvmCache {
        return Err(Rejection::CacheNotApplicable);
    }
    // an empty selection is reported with the content rules
    if cache.fast_pvs.is_empty() {
        return Ok(());
    }

    let vg = ctx
        .graph
        .get(&anchor.parent)
        .ok_or_else(|| Rejection::UnknownDevice(anchor.parent.clone()))?;
    let candidates = offer::fast_pv_candidates(ctx.graph, vg);

    for (position, pv) in cache.fast_pvs.iter().enumerate() {
        if !candidates.iter().any(|candidate| &candidate.id == pv) {
            return Err(Rejection::InvalidFastPv {
                name: ctx.device_name(pv),
            });
        }
        if cache.fast_pvs[..position].contains(pv) {
            return Err(Rejection::DuplicateTarget {
                name: ctx.device_name(pv),
            });
        }
    }

    if cache.cache_size < MIN_CACHE_SIZE {
        return Err(Rejection::CacheTooSmall {
            size: cache.cache_size,
            min: MIN_CACHE_SIZE,
        });
    }

    let max = offer::max_cache_size(ctx.graph, vg, &cache.fast_pvs);
    if cache.cache_size > max {
        return Err(Rejection::CacheTooLarge {
            size: cache.cache_size,
            max,
        });
    }

    let lv_max = offer::cached_lv_max(vg, cache.cache_size);
    let size = request.total_size();
    if size > lv_max {
        return Err(Rejection::SizeTooLarge {
            name: vg.name.clone(),
            size,
            max: lv_max,
        });
    }

    Ok(())
}

fn name_is_valid(device_type: NewDeviceType, name: &str) -> bool {
    match device_type {
        NewDeviceType::Lvm | NewDeviceType::LvmVg => names::is_valid_vg_name(name),
        NewDeviceType::LvmLv
        | NewDeviceType::LvmThinPool
        | NewDeviceType::LvmThinLv
        | NewDeviceType::LvmSnapshot
        | NewDeviceType::LvmCache => names::is_valid_lv_name(name),
        NewDeviceType::MdRaid | NewDeviceType::BtrfsVolume | NewDeviceType::BtrfsSubvolume => {
            names::is_valid_generic_name(name)
        }
        NewDeviceType::Partition | NewDeviceType::LvmPv => true,
    }
}

fn check_content(
    ctx: &ValidationContext<'_>,
    request: &AddDeviceRequest,
    partition_type: Option<PartitionType>,
) -> Result<(), Rejection> {
    let device_type = request.device_type;
    let extended = partition_type == Some(PartitionType::Extended);
    let filesystem = request.filesystem.as_deref().filter(|fs| !fs.is_empty());

    match device_type {
        NewDeviceType::Partition if !extended && filesystem.is_none() => {
            return Err(Rejection::FilesystemRequired(FilesystemTarget::Partition));
        }
        NewDeviceType::LvmLv | NewDeviceType::LvmCache if filesystem.is_none() => {
            return Err(Rejection::FilesystemRequired(FilesystemTarget::LogicalVolume));
        }
        _ => {}
    }

    if !extended
        && let Some(fs) = filesystem
        && !ctx.supported.supports_filesystem(fs)
    {
        return Err(Rejection::UnsupportedFilesystem(fs.to_string()));
    }

    let encryption = request.encryption.as_ref().filter(|_| !extended);
    if encryption.is_some_and(|e| e.passphrase.is_empty()) {
        return Err(Rejection::PassphraseMissing);
    }

    let mountpoint = request.mountpoint.as_deref().filter(|m| !m.is_empty());
    if let Some(mountpoint) = mountpoint
        && !names::is_absolute_mountpoint(mountpoint)
    {
        return Err(Rejection::InvalidMountpoint(mountpoint.to_string()));
    }

    if device_type == NewDeviceType::MdRaid && request.members.len() < 2 {
        return Err(Rejection::NotEnoughParents);
    }

    if let Some(mountpoint) = mountpoint
        && ctx.mountpoint_taken(mountpoint)
    {
        return Err(Rejection::DuplicateMountpoint(mountpoint.to_string()));
    }

    if let Some(name) = request.name.as_deref().filter(|n| !n.is_empty())
        && !name_is_valid(device_type, name)
    {
        return Err(Rejection::InvalidName(name.to_string()));
    }

    if let Some(label) = request.label.as_deref().filter(|l| !l.is_empty()) {
        let fs = match device_type {
            NewDeviceType::BtrfsVolume => Some("btrfs"),
            _ => filesystem,
        };
        if !fs.is_some_and(|fs| names::is_valid_label(fs, label)) {
            return Err(Rejection::InvalidLabel(label.to_string()));
        }
    }

    if encryption.is_some_and(|e| e.passphrase != e.confirmation) {
        return Err(Rejection::PassphraseMismatch);
    }

    if device_type == NewDeviceType::LvmCache
        && request.cache.as_ref().is_none_or(|c| c.fast_pvs.is_empty())
    {
        return Err(Rejection::NoFastPv);
    }

    Ok(())
}
