// SPDX-License-Identifier: GPL-3.0-only

//! Domain models for storage action planning
//!
//! Pure data shared by the planner, the backend contract and test fixtures:
//!
//! - **device**: nodes of the storage graph (`Device`, `DeviceKind`, `Format`)
//! - **free_space**: planning placeholders for unallocated space
//! - **request**: caller intents (`CandidateOperation` and its payloads)
//! - **action**: accepted, queued work (`PendingAction`, `ActionId`)
//!
//! Sizes are exact byte counts, see [`Size`].

pub mod action;
pub mod device;
pub mod free_space;
pub mod raid;
pub mod region;
pub mod request;
pub mod size;

pub use action::{ActionId, ActionKind, PendingAction};
pub use device::{
    Device, DeviceId, DeviceKind, DiskLabelType, Format, PartitionType, ResizeInfo,
};
pub use free_space::{FreeSpaceKind, FreeSpaceTarget};
pub use raid::{RaidLevel, is_linear_level};
pub use region::{
    ALIGNMENT_BYTES, ByteRange, FreeRegion, MIN_REGION_BYTES, PartitionExtent,
    compute_free_regions,
};
pub use request::{
    AddDeviceRequest, AdvancedOptions, CacheMode, CacheRequest, CandidateOperation,
    EditDeviceRequest, EditPartitionRequest, EditVolumeGroupRequest, EncryptionRequest,
    MemberSize, NewDeviceType, Reformat, Selection,
};
pub use size::{Ratio, Size};
