// SPDX-License-Identifier: GPL-3.0-only

//! Candidate operation checks
//!
//! [`validate`] runs fail-fast predicates over a graph snapshot and the
//! session's type catalogs. The first failing predicate decides the
//! [`Rejection`].

mod add;
mod edit;
mod eligibility;
pub mod names;
mod rejection;

pub use add::validate_add;
pub use edit::{validate_create_disk_label, validate_delete, validate_edit};
pub use eligibility::check_anchor;
pub use rejection::{FilesystemTarget, Rejection};

use storage_types::{CandidateOperation, DeviceId, ResizeInfo};

use crate::model::DeviceGraph;
use crate::offer::SupportedTypes;

/// Snapshot of everything a validation may look at
#[derive(Debug, Clone, Copy)]
pub struct ValidationContext<'a> {
    pub graph: &'a DeviceGraph,
    pub supported: &'a SupportedTypes,
    /// Mountpoints already in use, including planned ones
    pub mountpoints: &'a [String],
    /// Resize capability of the device being edited
    pub resize: Option<ResizeInfo>,
    /// PVs the edited volume group can give up
    pub removable_pvs: &'a [DeviceId],
    /// PVs not assigned to any volume group
    pub free_pvs: &'a [DeviceId],
}

impl<'a> ValidationContext<'a> {
    pub fn new(
        graph: &'a DeviceGraph,
        supported: &'a SupportedTypes,
        mountpoints: &'a [String],
    ) -> Self {
        Self {
            graph,
            supported,
            mountpoints,
            resize: None,
            removable_pvs: &[],
            free_pvs: &[],
        }
    }

    fn mountpoint_taken(&self, mountpoint: &str) -> bool {
        self.mountpoints.iter().any(|m| m == mountpoint)
    }

    fn device_name(&self, id: &DeviceId) -> String {
        self.graph
            .get(id)
            .map(|device| device.name.clone())
            .unwrap_or_else(|| id.to_string())
    }
}

/// Check a candidate operation against the current snapshot
pub fn validate(ctx: &ValidationContext<'_>, op: &CandidateOperation) -> Result<(), Rejection> {
    match op {
        CandidateOperation::AddDevice(request) => validate_add(ctx, request),
        CandidateOperation::EditDevice(request) => validate_edit(ctx, request),
        CandidateOperation::DeleteDevice { device } => validate_delete(ctx, device),
        CandidateOperation::CreateDiskLabel { disk, label } => {
            validate_create_disk_label(ctx, disk, label)
        }
    }
}
