// SPDX-License-Identifier: GPL-3.0-only

//! Device model
//!
//! [`DeviceGraph`] is one immutable snapshot of the storage graph. The
//! [`DeviceModel`] swaps whole snapshots on refresh, so a reader holding an
//! `Arc<DeviceGraph>` never sees a half-updated graph.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, info};

use storage_contracts::{BackendClient, RemoteMethod};
use storage_types::{
    Device, DeviceId, DeviceKind, Format, FreeSpaceKind, FreeSpaceTarget, PartitionExtent,
    PartitionType, Size, compute_free_regions,
};

use crate::error::{ModelError, Result};
use crate::remote::query;

/// Immutable snapshot of the storage graph
#[derive(Debug, Clone, Default)]
pub struct DeviceGraph {
    devices: Vec<Device>,
    index: HashMap<DeviceId, usize>,
    children: HashMap<DeviceId, Vec<DeviceId>>,
}

impl DeviceGraph {
    /// Build a snapshot, checking parent references and acyclicity
    pub fn new(devices: Vec<Device>) -> Result<Self, ModelError> {
        let mut index = HashMap::with_capacity(devices.len());
        for (position, device) in devices.iter().enumerate() {
            if index.insert(device.id.clone(), position).is_some() {
                return Err(ModelError::DuplicateDevice(device.id.clone()));
            }
        }

        let mut children: HashMap<DeviceId, Vec<DeviceId>> = HashMap::new();
        for device in &devices {
            if device.is_disk() && !device.parents.is_empty() {
                return Err(ModelError::DiskWithParents(device.id.clone()));
            }
            if !device.is_disk() && device.parents.is_empty() {
                return Err(ModelError::MissingParents(device.id.clone()));
            }
            for parent in &device.parents {
                if !index.contains_key(parent) {
                    return Err(ModelError::DanglingParent {
                        device: device.id.clone(),
                        parent: parent.clone(),
                    });
                }
                children
                    .entry(parent.clone())
                    .or_default()
                    .push(device.id.clone());
            }
        }

        let graph = Self {
            devices,
            index,
            children,
        };
        graph.check_acyclic()?;

        Ok(graph)
    }

    fn check_acyclic(&self) -> Result<(), ModelError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            InProgress,
            Done,
        }

        let mut marks = vec![Mark::Unvisited; self.devices.len()];

        for start in 0..self.devices.len() {
            if marks[start] != Mark::Unvisited {
                continue;
            }

            // Iterative DFS over parent edges: (device, next parent to visit)
            let mut stack = vec![(start, 0usize)];
            marks[start] = Mark::InProgress;

            while let Some((current, next)) = stack.pop() {
                let parents = &self.devices[current].parents;
                if next == parents.len() {
                    marks[current] = Mark::Done;
                    continue;
                }
                stack.push((current, next + 1));

                let parent = self.index[&parents[next]];
                match marks[parent] {
                    Mark::InProgress => {
                        return Err(ModelError::Cycle(self.devices[parent].id.clone()));
                    }
                    Mark::Unvisited => {
                        marks[parent] = Mark::InProgress;
                        stack.push((parent, 0));
                    }
                    Mark::Done => {}
                }
            }
        }

        Ok(())
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn get(&self, id: &DeviceId) -> Option<&Device> {
        self.index.get(id).map(|&position| &self.devices[position])
    }

    pub fn resolve(&self, id: &DeviceId) -> Result<&Device, ModelError> {
        self.get(id).ok_or_else(|| ModelError::NotFound(id.clone()))
    }

    /// All devices in backend order
    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.devices.iter()
    }

    pub fn disks(&self) -> impl Iterator<Item = &Device> {
        self.devices.iter().filter(|d| d.is_disk())
    }

    pub fn children(&self, id: &DeviceId) -> Vec<&Device> {
        self.children
            .get(id)
            .map(|ids| ids.iter().filter_map(|child| self.get(child)).collect())
            .unwrap_or_default()
    }

    pub fn parents(&self, id: &DeviceId) -> Vec<&Device> {
        self.get(id)
            .map(|device| {
                device
                    .parents
                    .iter()
                    .filter_map(|parent| self.get(parent))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Mountpoints currently set anywhere in the graph
    pub fn mountpoints(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.devices
            .iter()
            .filter_map(Device::mountpoint)
            .filter(|mountpoint| seen.insert(*mountpoint))
            .map(str::to_string)
            .collect()
    }

    /// Partitions whose first parent is `disk`, in offset order
    pub fn partitions_of(&self, disk: &DeviceId) -> Vec<&Device> {
        let mut partitions: Vec<&Device> = self
            .children(disk)
            .into_iter()
            .filter(|child| matches!(child.kind, DeviceKind::Partition { .. }))
            .collect();
        partitions.sort_by_key(|p| match p.kind {
            DeviceKind::Partition { start, .. } => start,
            _ => 0,
        });
        partitions
    }

    pub fn extended_partition(&self, disk: &DeviceId) -> Option<&Device> {
        self.partitions_of(disk)
            .into_iter()
            .find(|p| p.partition_type() == Some(PartitionType::Extended))
    }

    /// Primary and extended partitions, both count against the label limit
    pub fn primary_partition_count(&self, disk: &DeviceId) -> u32 {
        self.partitions_of(disk)
            .into_iter()
            .filter(|p| p.partition_type() != Some(PartitionType::Logical))
            .count() as u32
    }

    /// PVs that belong to no volume group
    pub fn free_pvs(&self) -> Vec<&Device> {
        self.devices
            .iter()
            .filter(|d| d.is_pv() && d.pv_vg().is_none())
            .filter(|d| {
                !self
                    .children(&d.id)
                    .iter()
                    .any(|child| matches!(child.kind, DeviceKind::LvmVg { .. }))
            })
            .collect()
    }

    /// PV parents of a volume group
    pub fn vg_pvs(&self, vg: &DeviceId) -> Vec<&Device> {
        self.parents(vg).into_iter().filter(|p| p.is_pv()).collect()
    }

    /// Unallocated space on every disk, disks in backend order
    pub fn free_disk_regions(&self) -> Vec<FreeSpaceTarget> {
        let mut targets = Vec::new();

        for disk in self.disks() {
            match &disk.format {
                Some(Format::DiskLabel { usable, .. }) => {
                    let extents: Vec<PartitionExtent> = self
                        .partitions_of(&disk.id)
                        .into_iter()
                        .filter_map(|p| match p.kind {
                            DeviceKind::Partition {
                                partition_type,
                                start,
                            } => Some(PartitionExtent {
                                start,
                                size: p.size.bytes(),
                                partition_type,
                            }),
                            _ => None,
                        })
                        .collect();

                    targets.extend(
                        compute_free_regions(disk.size.bytes(), *usable, &extents)
                            .into_iter()
                            .map(|region| {
                                FreeSpaceTarget::region(
                                    disk.id.clone(),
                                    region.start,
                                    Size::from_bytes(region.size),
                                    region.logical,
                                )
                            }),
                    );
                }
                None if self.children(&disk.id).is_empty() => {
                    targets.push(FreeSpaceTarget::new(
                        FreeSpaceKind::EmptyDisk,
                        disk.id.clone(),
                        disk.size,
                    ));
                }
                Some(_) if self.children(&disk.id).is_empty() && !disk_format_in_use(disk) => {
                    targets.push(FreeSpaceTarget::new(
                        FreeSpaceKind::UninitializedDisk,
                        disk.id.clone(),
                        disk.size,
                    ));
                }
                _ => {}
            }
        }

        targets
    }
}

/// Whole-disk formats that make the disk a member of something else
fn disk_format_in_use(disk: &Device) -> bool {
    match &disk.format {
        Some(Format::LvmPv { vg, .. }) => vg.is_some(),
        Some(Format::MdMember | Format::BtrfsMember | Format::Luks) => true,
        _ => false,
    }
}

/// Owner of the current snapshot
#[derive(Debug, Default)]
pub struct DeviceModel {
    graph: Arc<DeviceGraph>,
    refreshes: u64,
}

impl DeviceModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_graph(graph: DeviceGraph) -> Self {
        Self {
            graph: Arc::new(graph),
            refreshes: 0,
        }
    }

    /// Fetch a full snapshot and swap it in
    ///
    /// On any error the previous snapshot stays in place.
    pub async fn refresh(&mut self, client: &BackendClient) -> Result<()> {
        let devices: Vec<Device> = query(client, RemoteMethod::GetDeviceTree).await?;
        let graph = DeviceGraph::new(devices)?;

        debug!(devices = graph.len(), "device graph refreshed");
        self.graph = Arc::new(graph);
        self.refreshes += 1;
        info!(refresh = self.refreshes, "device model updated");

        Ok(())
    }

    /// Current snapshot, stays valid across later refreshes
    pub fn snapshot(&self) -> Arc<DeviceGraph> {
        Arc::clone(&self.graph)
    }

    pub fn graph(&self) -> &DeviceGraph {
        &self.graph
    }

    pub fn resolve(&self, id: &DeviceId) -> Result<&Device, ModelError> {
        self.graph.resolve(id)
    }

    /// Number of successful refreshes so far
    pub fn refresh_count(&self) -> u64 {
        self.refreshes
    }
}
