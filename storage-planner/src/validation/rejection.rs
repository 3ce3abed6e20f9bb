// SPDX-License-Identifier: GPL-3.0-only

use thiserror::Error;

use storage_types::{DeviceId, Size};

/// Which kind of new device is missing a filesystem
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilesystemTarget {
    Partition,
    LogicalVolume,
}

impl FilesystemTarget {
    fn noun(self) -> &'static str {
        match self {
            Self::Partition => "partition",
            Self::LogicalVolume => "logical volume",
        }
    }
}

/// Why a candidate operation was not scheduled
///
/// The `Display` text is the message shown to the user.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("{name} is not complete. It is not possible to add new LVs to VG with missing PVs.")]
    VgIncomplete { name: String },

    #[error("Not enough free space for a new LVM Volume Group.")]
    PvTooSmall,

    #[error(
        "Disk {name} already reached maximum allowed number of primary partitions for {label} disklabel."
    )]
    PrimaryLimitReached { name: String, label: String },

    #[error("It is not possible to create new devices on {name} ({device_type}).")]
    NotAnAnchor { name: String, device_type: String },

    #[error("There is no free space on {name}.")]
    NoFreeSpace { name: String },

    #[error("Device {0} does not exist.")]
    UnknownDevice(DeviceId),

    #[error("{device_type} cannot be created on {parent}.")]
    DeviceTypeNotAllowed { device_type: String, parent: String },

    #[error("{partition_type} partition is not allowed here.")]
    PartitionTypeNotAllowed { partition_type: String },

    #[error("Advanced options do not apply to {device_type}.")]
    AdvancedNotApplicable { device_type: String },

    #[error("Please select at least one parent device.")]
    NoParentSelected,

    #[error("{device_type} can only be created on one device.")]
    TooManyParents { device_type: String },

    #[error("{name} is not available for this device.")]
    TargetNotAvailable { name: String },

    #[error("{name} is selected more than once.")]
    DuplicateTarget { name: String },

    #[error("RAID level {level} is not available with {members} selected devices.")]
    RaidLevelNotAvailable { level: String, members: usize },

    #[error("Size {size} on {name} is below the minimum of {}.", .min.to_pretty_with_bytes())]
    SizeTooSmall { name: String, size: Size, min: Size },

    #[error("Size {size} on {name} exceeds the maximum of {}.", .max.to_pretty_with_bytes())]
    SizeTooLarge { name: String, size: Size, max: Size },

    #[error("Size on {name} cannot be changed from {size}.")]
    SizeFixed { name: String, size: Size },

    #[error("All RAID members must have the same size.")]
    UnequalRaidMembers,

    #[error("Physical extent size {0} is not available for the selected free space.")]
    PeSizeNotAllowed(Size),

    #[error("Cache options only apply to cached logical volumes.")]
    CacheNotApplicable,

    #[error("{name} cannot be used as a cache Physical Volume.")]
    InvalidFastPv { name: String },

    #[error("Cache size {size} is below the minimum of {min}.")]
    CacheTooSmall { size: Size, min: Size },

    #[error("Cache size {size} exceeds the maximum of {max}.")]
    CacheTooLarge { size: Size, max: Size },

    #[error("Filesystem type must be specified when creating new {}.", .0.noun())]
    FilesystemRequired(FilesystemTarget),

    #[error("Filesystem {0} is not supported.")]
    UnsupportedFilesystem(String),

    #[error("Passphrase not specified.")]
    PassphraseMissing,

    #[error("\"{0}\" is not a valid mountpoint.")]
    InvalidMountpoint(String),

    #[error("Please select at least two parent devices.")]
    NotEnoughParents,

    #[error("Selected mountpoint \"{0}\" is already set for another device.")]
    DuplicateMountpoint(String),

    #[error("\"{0}\" is not a valid name.")]
    InvalidName(String),

    #[error("\"{0}\" is not a valid label.")]
    InvalidLabel(String),

    #[error("Provided passphrases do not match.")]
    PassphraseMismatch,

    #[error("Please select at least one Physical Volume (PV) for cache Logical Volume (LV).")]
    NoFastPv,

    #[error("{name} ({device_type}) cannot be edited.")]
    NotEditable { name: String, device_type: String },

    #[error("No changes requested for {name}.")]
    NothingToChange { name: String },

    #[error("{name} cannot be resized.")]
    NotResizable { name: String },

    #[error("{name} cannot be removed from the volume group.")]
    PvNotRemovable { name: String },

    #[error("{name} is not a free Physical Volume.")]
    PvNotFree { name: String },

    #[error("{name} must keep at least one Physical Volume.")]
    VgWouldBeEmpty { name: String },

    #[error("Disk {name} cannot be deleted.")]
    CannotDeleteDisk { name: String },

    #[error("{name} is not a disk.")]
    NotADisk { name: String },

    #[error("Disklabel {0} is not supported.")]
    UnsupportedDiskLabel(String),
}
