// SPDX-License-Identifier: GPL-3.0-only

//! Planning placeholders for unallocated space
//!
//! A [`FreeSpaceTarget`] is never a real device. It names the real device(s)
//! bordering some usable space and is recomputed on every model refresh.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::device::DeviceId;
use crate::size::Size;

/// What kind of unallocated space a target describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FreeSpaceKind {
    /// Unused region on a labeled disk
    FreeRegion,
    /// Disk with no format at all
    EmptyDisk,
    /// Disk carrying something other than a disklabel
    UninitializedDisk,
    /// PV not assigned to any volume group
    FreePv,
}

impl FreeSpaceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FreeRegion => "free space",
            Self::EmptyDisk => "empty disk",
            Self::UninitializedDisk => "uninitialized disk",
            Self::FreePv => "free physical volume",
        }
    }
}

impl fmt::Display for FreeSpaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Candidate anchor for a new device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreeSpaceTarget {
    pub kind: FreeSpaceKind,
    /// Real devices the space belongs to (disk, extended partition, PV, VG)
    pub parents: Vec<DeviceId>,
    pub size: Size,
    /// Region lies inside an extended partition
    #[serde(default)]
    pub is_logical: bool,
    /// Byte offset on the disk, set for free regions
    #[serde(default)]
    pub start: Option<u64>,
}

impl FreeSpaceTarget {
    pub fn new(kind: FreeSpaceKind, parent: DeviceId, size: Size) -> Self {
        Self {
            kind,
            parents: vec![parent],
            size,
            is_logical: false,
            start: None,
        }
    }

    pub fn region(parent: DeviceId, start: u64, size: Size, is_logical: bool) -> Self {
        Self {
            kind: FreeSpaceKind::FreeRegion,
            parents: vec![parent],
            size,
            is_logical,
            start: Some(start),
        }
    }

    /// First bordering device, the one the target is listed under
    pub fn primary_parent(&self) -> Option<&DeviceId> {
        self.parents.first()
    }
}
