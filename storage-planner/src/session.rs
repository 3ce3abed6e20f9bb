// SPDX-License-Identifier: GPL-3.0-only

//! Caller-facing planning session
//!
//! A session owns the device model, the action queue and the apply
//! coordinator, and is the only writer of all three. After a connectivity
//! loss or a divergence from the backend every call fails with
//! [`EngineError::Terminated`].

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{error, info, warn};

use storage_contracts::{
    BackendClient, BackendTransport, RemoteFailure, RemoteMethod, RemoteResult, SessionSecret,
};
use storage_types::{
    ActionKind, AddDeviceRequest, DeviceId, DiskLabelType, EditDeviceRequest, FreeSpaceTarget,
    NewDeviceType, PendingAction, RaidLevel, ResizeInfo, Selection,
};

use crate::catalog::{self, AddAnchor, AnchorLookup, TargetSet};
use crate::config::PlannerConfig;
use crate::error::{EngineError, Result};
use crate::executor::{ApplyOutcome, Executor, ExecutorState};
use crate::model::{DeviceGraph, DeviceModel};
use crate::offer::{self, AddContext, SupportedTypes};
use crate::queue::ActionQueue;
use crate::remote::query;
use crate::validation::{self, Rejection, ValidationContext};

/// Device types the backend reports RAID levels for
const RAID_DEVICE_TYPES: [NewDeviceType; 2] = [NewDeviceType::BtrfsVolume, NewDeviceType::MdRaid];

/// Result of a scheduling operation that reached a decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationOutcome {
    Scheduled(PendingAction),
    /// Accepted by the backend without scheduling anything
    Unchanged,
    Rejected(Rejection),
    Refused { message: String },
}

impl OperationOutcome {
    pub fn is_scheduled(&self) -> bool {
        matches!(self, Self::Scheduled(_))
    }
}

pub struct PlanningSession {
    client: BackendClient,
    model: DeviceModel,
    queue: ActionQueue,
    executor: Executor,
    supported: SupportedTypes,
    terminated: bool,
}

impl std::fmt::Debug for PlanningSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanningSession")
            .field("devices", &self.model.graph().len())
            .field("pending", &self.queue.len())
            .field("executor", &self.executor.state())
            .field("terminated", &self.terminated)
            .finish()
    }
}

impl PlanningSession {
    /// Authenticate over `transport` with the configured secret and start
    pub async fn connect(
        transport: Arc<dyn BackendTransport>,
        config: &PlannerConfig,
    ) -> Result<Self> {
        let secret = SessionSecret::from_env(&config.secret_env);
        let client = BackendClient::connect(transport, secret).await?;
        Self::start(client, config).await
    }

    /// Initialise the backend, load the type catalogs and the device tree
    pub async fn start(client: BackendClient, config: &PlannerConfig) -> Result<Self> {
        init_backend(&client).await?;

        let mut session = Self {
            client,
            model: DeviceModel::new(),
            queue: ActionQueue::new(),
            executor: Executor::new(config.progress_channel_capacity),
            supported: SupportedTypes::default(),
            terminated: false,
        };

        session.supported = load_supported_types(&session.client).await?;
        session.model.refresh(&session.client).await?;

        info!(
            devices = session.model.graph().len(),
            filesystems = session.supported.filesystems.len(),
            "planning session started"
        );

        Ok(session)
    }

    fn ensure_live(&self) -> Result<()> {
        if self.terminated {
            return Err(EngineError::Terminated);
        }
        Ok(())
    }

    fn track<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result
            && err.is_fatal()
        {
            error!(%err, "terminating planning session");
            self.terminated = true;
        }
        result
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Current snapshot of the device graph
    pub fn graph(&self) -> Arc<DeviceGraph> {
        self.model.snapshot()
    }

    pub fn supported_types(&self) -> &SupportedTypes {
        &self.supported
    }

    pub fn executor_state(&self) -> ExecutorState {
        self.executor.state()
    }

    /// Resolve what the caller selected and list what can be created there
    pub async fn prepare_add(
        &mut self,
        selection: &Selection,
    ) -> Result<std::result::Result<AddContext, Rejection>> {
        self.ensure_live()?;
        let result = self.prepare_add_inner(selection).await;
        self.track(result)
    }

    async fn prepare_add_inner(
        &self,
        selection: &Selection,
    ) -> Result<std::result::Result<AddContext, Rejection>> {
        let graph = self.model.snapshot();

        let anchor = match catalog::anchor_for(&graph, selection) {
            Ok(AnchorLookup::Ready(anchor)) => anchor,
            Ok(AnchorLookup::NeedsVgFree { lv, vg }) => {
                let free: FreeSpaceTarget =
                    query(&self.client, RemoteMethod::GetVgFree { vg }).await?;
                catalog::snapshot_anchor(lv, free)
            }
            Err(rejection) => return Ok(Err(rejection)),
        };

        if let Err(rejection) = validation::check_anchor(&graph, &anchor) {
            warn!(%rejection, "cannot add a device here");
            return Ok(Err(rejection));
        }

        Ok(Ok(offer::add_context(&graph, anchor)))
    }

    /// Targets a new device of `device_type` may use
    pub fn free_space_targets(
        &self,
        anchor: &AddAnchor,
        device_type: NewDeviceType,
        partition_based: bool,
    ) -> TargetSet {
        catalog::targets_for(self.model.graph(), anchor, device_type, partition_based)
    }

    /// RAID levels offered for `members` selected targets
    pub fn raid_levels(&self, device_type: NewDeviceType, members: usize) -> Vec<RaidLevel> {
        if !offer::raid_applies(&self.supported, device_type, members) {
            return Vec::new();
        }
        let levels = self.supported.raid_levels_for(device_type).unwrap_or(&[]);
        offer::offered_raid_levels(levels, members)
            .into_iter()
            .cloned()
            .collect()
    }

    pub async fn add_device(&mut self, request: AddDeviceRequest) -> Result<OperationOutcome> {
        self.ensure_live()?;
        let result = self.add_device_inner(request).await;
        self.track(result)
    }

    async fn add_device_inner(&mut self, request: AddDeviceRequest) -> Result<OperationOutcome> {
        let graph = self.model.snapshot();
        let mountpoints = self.mountpoints_in_use(&graph).await?;
        let ctx = ValidationContext::new(&graph, &self.supported, &mountpoints);

        if let Err(rejection) = validation::validate_add(&ctx, &request) {
            warn!(device_type = %request.device_type, %rejection, "add rejected");
            return Ok(OperationOutcome::Rejected(rejection));
        }

        let size = request.total_size();
        let description = match request.filesystem.as_deref().filter(|fs| !fs.is_empty()) {
            Some(fs) => format!("add {size} {fs} partition"),
            None => format!("add {size} {} device", request.device_type),
        };

        self.schedule(RemoteMethod::AddDevice(request), ActionKind::Add, description, Vec::new())
            .await
    }

    pub async fn edit_device(&mut self, request: EditDeviceRequest) -> Result<OperationOutcome> {
        self.ensure_live()?;
        let result = self.edit_device_inner(request).await;
        self.track(result)
    }

    async fn edit_device_inner(&mut self, request: EditDeviceRequest) -> Result<OperationOutcome> {
        let graph = self.model.snapshot();
        let Some(device) = graph.get(request.device()) else {
            return Ok(OperationOutcome::Rejected(Rejection::UnknownDevice(
                request.device().clone(),
            )));
        };
        let description = format!("edit {} {}", device.name, device.type_name());
        let target = device.id.clone();

        let removable_pvs: Vec<DeviceId>;
        let free_pvs: Vec<DeviceId>;
        let mountpoints = self.mountpoints_in_use(&graph).await?;
        let mut ctx = ValidationContext::new(&graph, &self.supported, &mountpoints);

        let method = match &request {
            EditDeviceRequest::Partition(edit) => {
                if edit.resize.is_some() {
                    let info: ResizeInfo = query(
                        &self.client,
                        RemoteMethod::IsDeviceResizable {
                            device: edit.device.clone(),
                        },
                    )
                    .await?;
                    ctx.resize = Some(info);
                }
                RemoteMethod::EditPartitionDevice(edit.clone())
            }
            EditDeviceRequest::VolumeGroup(edit) => {
                removable_pvs = query(
                    &self.client,
                    RemoteMethod::GetRemovablePvs { vg: edit.vg.clone() },
                )
                .await?;
                free_pvs = query(&self.client, RemoteMethod::GetFreePvs).await?;
                ctx.removable_pvs = &removable_pvs;
                ctx.free_pvs = &free_pvs;
                RemoteMethod::EditLvmvgDevice(edit.clone())
            }
        };

        if let Err(rejection) = validation::validate_edit(&ctx, &request) {
            warn!(device = %target, %rejection, "edit rejected");
            return Ok(OperationOutcome::Rejected(rejection));
        }

        self.schedule(method, ActionKind::Edit, description, vec![target])
            .await
    }

    pub async fn delete_device(&mut self, device: &DeviceId) -> Result<OperationOutcome> {
        self.ensure_live()?;
        let result = self.delete_device_inner(device).await;
        self.track(result)
    }

    async fn delete_device_inner(&mut self, device: &DeviceId) -> Result<OperationOutcome> {
        let graph = self.model.snapshot();
        let ctx = ValidationContext::new(&graph, &self.supported, &[]);

        if let Err(rejection) = validation::validate_delete(&ctx, device) {
            warn!(%device, %rejection, "delete rejected");
            return Ok(OperationOutcome::Rejected(rejection));
        }

        let name = graph
            .get(device)
            .map(|d| d.name.clone())
            .unwrap_or_else(|| device.to_string());

        self.schedule(
            RemoteMethod::DeleteDevice {
                device: device.clone(),
            },
            ActionKind::Delete,
            format!("delete partition {name}"),
            vec![device.clone()],
        )
        .await
    }

    pub async fn create_disk_label(
        &mut self,
        disk: &DeviceId,
        label: DiskLabelType,
    ) -> Result<OperationOutcome> {
        self.ensure_live()?;
        let result = self.create_disk_label_inner(disk, label).await;
        self.track(result)
    }

    async fn create_disk_label_inner(
        &mut self,
        disk: &DeviceId,
        label: DiskLabelType,
    ) -> Result<OperationOutcome> {
        let graph = self.model.snapshot();
        let ctx = ValidationContext::new(&graph, &self.supported, &[]);

        if let Err(rejection) = validation::validate_create_disk_label(&ctx, disk, &label) {
            warn!(%disk, %rejection, "disklabel rejected");
            return Ok(OperationOutcome::Rejected(rejection));
        }

        let name = graph
            .get(disk)
            .map(|d| d.name.clone())
            .unwrap_or_else(|| disk.to_string());

        self.schedule(
            RemoteMethod::CreateDiskLabel {
                disk: disk.clone(),
                label,
            },
            ActionKind::Add,
            format!("create new disklabel on {name}"),
            vec![disk.clone()],
        )
        .await
    }

    /// Send a validated operation and queue what the backend scheduled
    async fn schedule(
        &mut self,
        method: RemoteMethod,
        kind: ActionKind,
        description: String,
        touched: Vec<DeviceId>,
    ) -> Result<OperationOutcome> {
        let name = method.name();
        let result = self.client.call(&method).await?;

        let result = match result.into_outcome() {
            Ok(result) => result,
            Err(RemoteFailure::Refused(message)) => {
                warn!(method = name, %message, "backend refused operation");
                return Ok(OperationOutcome::Refused { message });
            }
            Err(RemoteFailure::Fault(fault)) => {
                error!(method = name, exception = %fault.exception, "backend fault");
                return Err(EngineError::RemoteFault(fault));
            }
        };

        if result.actions.is_empty() {
            info!(method = name, "backend scheduled no actions");
            return Ok(OperationOutcome::Unchanged);
        }

        let result_devices = created_devices(&result).unwrap_or(touched);
        let action = self
            .queue
            .append(kind, description, result.actions, result_devices)?
            .clone();

        self.model.refresh(&self.client).await?;

        Ok(OperationOutcome::Scheduled(action))
    }

    /// Mountpoints known to the backend plus those in the current snapshot
    async fn mountpoints_in_use(&self, graph: &DeviceGraph) -> Result<Vec<String>> {
        let mut mountpoints: Vec<String> = query(&self.client, RemoteMethod::GetMountpoints).await?;
        for mountpoint in graph.mountpoints() {
            if !mountpoints.contains(&mountpoint) {
                mountpoints.push(mountpoint);
            }
        }
        Ok(mountpoints)
    }

    /// Drop the most recent action
    pub async fn undo(&mut self) -> Result<PendingAction> {
        self.ensure_live()?;
        let result = match self.queue.undo(&self.client).await {
            Ok(action) => self.model.refresh(&self.client).await.map(|()| action),
            Err(err) => Err(err),
        };
        self.track(result)
    }

    /// Drop every queued action
    pub async fn clear(&mut self) -> Result<()> {
        self.ensure_live()?;
        let result = match self.queue.clear(&self.client).await {
            Ok(()) => self.model.refresh(&self.client).await,
            Err(err) => Err(err),
        };
        self.track(result)
    }

    /// Drop every queued action and rescan types and devices
    pub async fn reload(&mut self) -> Result<()> {
        self.ensure_live()?;
        let result = self.reload_inner().await;
        self.track(result)
    }

    async fn reload_inner(&mut self) -> Result<()> {
        self.queue.clear(&self.client).await?;
        self.supported = load_supported_types(&self.client).await?;
        self.model.refresh(&self.client).await?;
        info!(devices = self.model.graph().len(), "planning session reloaded");
        Ok(())
    }

    /// Apply the queue; `progress` sees each status line as it arrives
    pub async fn apply<F>(&mut self, progress: F) -> Result<ApplyOutcome>
    where
        F: FnMut(&str),
    {
        self.ensure_live()?;
        let result = self
            .executor
            .apply(&self.client, &mut self.queue, &mut self.model, progress)
            .await;
        self.track(result)
    }

    pub fn pending_actions(&self) -> &[PendingAction] {
        self.queue.list()
    }

    /// Callers confirm quit and reload when this is true
    pub fn has_pending_actions(&self) -> bool {
        !self.queue.is_empty()
    }
}

async fn init_backend(client: &BackendClient) -> Result<()> {
    let result = client.call(&RemoteMethod::Init).await?;

    match result.into_outcome() {
        Ok(_) => Ok(()),
        Err(RemoteFailure::Refused(message)) if message.contains("running") => {
            error!(%message, "backend already serves another planner");
            Err(EngineError::AlreadyRunning)
        }
        Err(RemoteFailure::Refused(message)) => Err(EngineError::QueryRefused {
            method: "init",
            message,
        }),
        Err(RemoteFailure::Fault(fault)) => {
            error!(exception = %fault.exception, "backend failed to initialise");
            Err(EngineError::RemoteFault(fault))
        }
    }
}

async fn load_supported_types(client: &BackendClient) -> Result<SupportedTypes> {
    let filesystems = query(client, RemoteMethod::GetAvailableFilesystems).await?;
    let disklabels = query(client, RemoteMethod::GetAvailableDisklabels).await?;

    let mut raid_levels = HashMap::new();
    for device_type in RAID_DEVICE_TYPES {
        let levels: Vec<RaidLevel> =
            query(client, RemoteMethod::GetAvailableRaidLevels { device_type }).await?;
        raid_levels.insert(device_type, levels);
    }

    Ok(SupportedTypes {
        filesystems,
        disklabels,
        raid_levels,
    })
}

/// Devices the backend reports as created, when it reports any
fn created_devices(result: &RemoteResult) -> Option<Vec<DeviceId>> {
    result
        .value
        .as_ref()
        .and_then(|_| result.decode_value::<Vec<DeviceId>>().ok())
        .filter(|devices| !devices.is_empty())
}
