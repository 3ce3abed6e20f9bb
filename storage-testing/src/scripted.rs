// SPDX-License-Identifier: GPL-3.0-only

//! In-process backend double
//!
//! [`ScriptedBackend`] answers every backend method from a small in-memory
//! state. Tests seed that state, queue explicit replies or failures per
//! method, and inspect the calls the planner made afterwards.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

use storage_contracts::{
    APPLY_ALL, BackendClient, BackendTransport, ClientError, RemoteMethod, RemoteResult,
    SessionSecret,
};
use storage_types::{
    ActionId, Device, DeviceId, DeviceKind, DiskLabelType, Format, FreeSpaceKind,
    FreeSpaceTarget, NewDeviceType, PartitionExtent, RaidLevel, ResizeInfo, Size,
    compute_free_regions,
};

const SECRET: &str = "scripted-session-secret";

#[derive(Debug)]
struct State {
    devices: Vec<Device>,
    /// Tree reported after the next successful scheduling call or apply
    staged_devices: Option<Vec<Device>>,
    filesystems: Vec<String>,
    disklabels: Vec<DiskLabelType>,
    raid_levels: HashMap<NewDeviceType, Vec<RaidLevel>>,
    mountpoints: Vec<String>,
    vg_free: HashMap<DeviceId, FreeSpaceTarget>,
    removable_pvs: HashMap<DeviceId, Vec<DeviceId>>,
    free_pvs: Option<Vec<DeviceId>>,
    resize: HashMap<DeviceId, ResizeInfo>,
    created: Vec<DeviceId>,
    replies: HashMap<String, VecDeque<RemoteResult>>,
    failures: HashMap<String, VecDeque<ClientError>>,
    calls: Vec<(String, Value)>,
    apply_progress: Vec<String>,
    apply_results: VecDeque<RemoteResult>,
    apply_count: usize,
    accept_secret: bool,
    disconnected: bool,
    next_action: u64,
}

impl Default for State {
    fn default() -> Self {
        let raid_levels = [
            (
                NewDeviceType::MdRaid,
                vec![
                    RaidLevel::new("linear", 1),
                    RaidLevel::new("raid0", 2),
                    RaidLevel::new("raid1", 2),
                    RaidLevel::new("raid5", 3),
                ],
            ),
            (
                NewDeviceType::BtrfsVolume,
                vec![
                    RaidLevel::new("single", 1),
                    RaidLevel::new("raid0", 2),
                    RaidLevel::new("raid1", 2),
                ],
            ),
        ]
        .into_iter()
        .collect();

        Self {
            devices: Vec::new(),
            staged_devices: None,
            filesystems: ["ext4", "xfs", "btrfs", "swap"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            disklabels: vec![DiskLabelType::Msdos, DiskLabelType::Gpt],
            raid_levels,
            mountpoints: Vec::new(),
            vg_free: HashMap::new(),
            removable_pvs: HashMap::new(),
            free_pvs: None,
            resize: HashMap::new(),
            created: Vec::new(),
            replies: HashMap::new(),
            failures: HashMap::new(),
            calls: Vec::new(),
            apply_progress: Vec::new(),
            apply_results: VecDeque::new(),
            apply_count: 0,
            accept_secret: true,
            disconnected: false,
            next_action: 1,
        }
    }
}

/// Scripted stand-in for the privileged backend
///
/// Clones share state, so a test keeps one handle while the client owns
/// another.
#[derive(Debug, Clone, Default)]
pub struct ScriptedBackend {
    state: Arc<Mutex<State>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// This backend as a transport for [`BackendClient::connect`]
    pub fn transport(&self) -> Arc<dyn BackendTransport> {
        Arc::new(self.clone())
    }

    /// Authenticated client talking to this backend
    pub async fn connect(&self) -> Result<BackendClient, ClientError> {
        BackendClient::connect(self.transport(), SessionSecret::new(SECRET)).await
    }

    pub fn set_devices(&self, devices: Vec<Device>) {
        self.state().devices = devices;
    }

    /// Device tree to report once the next action is scheduled or applied
    pub fn stage_devices(&self, devices: Vec<Device>) {
        self.state().staged_devices = Some(devices);
    }

    pub fn set_filesystems<I, S>(&self, filesystems: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state().filesystems = filesystems.into_iter().map(Into::into).collect();
    }

    pub fn set_disklabels(&self, disklabels: Vec<DiskLabelType>) {
        self.state().disklabels = disklabels;
    }

    pub fn set_raid_levels(&self, device_type: NewDeviceType, levels: Vec<RaidLevel>) {
        self.state().raid_levels.insert(device_type, levels);
    }

    /// Mountpoints the backend reports besides those in the device tree
    pub fn set_mountpoints<I, S>(&self, mountpoints: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state().mountpoints = mountpoints.into_iter().map(Into::into).collect();
    }

    pub fn set_vg_free(&self, vg: &str, free: FreeSpaceTarget) {
        self.state().vg_free.insert(DeviceId::new(vg), free);
    }

    pub fn set_removable_pvs(&self, vg: &str, pvs: &[&str]) {
        self.state()
            .removable_pvs
            .insert(DeviceId::new(vg), pvs.iter().map(|pv| DeviceId::new(*pv)).collect());
    }

    /// Override the free PV list otherwise derived from the device tree
    pub fn set_free_pvs(&self, pvs: &[&str]) {
        self.state().free_pvs = Some(pvs.iter().map(|pv| DeviceId::new(*pv)).collect());
    }

    pub fn set_resize(&self, device: &str, info: ResizeInfo) {
        self.state().resize.insert(DeviceId::new(device), info);
    }

    /// Devices reported as created by the next scheduling calls
    pub fn set_created(&self, devices: &[&str]) {
        self.state().created = devices.iter().map(|d| DeviceId::new(*d)).collect();
    }

    /// Queue a reply for the next call of `method`
    pub fn reply(&self, method: &str, result: RemoteResult) {
        self.state()
            .replies
            .entry(method.to_string())
            .or_default()
            .push_back(result);
    }

    /// Fail the next call of `method` before it reaches the backend
    pub fn fail_next(&self, method: &str, error: ClientError) {
        self.state()
            .failures
            .entry(method.to_string())
            .or_default()
            .push_back(error);
    }

    /// Drop the connection; every later call fails
    pub fn disconnect(&self) {
        self.state().disconnected = true;
    }

    pub fn reject_secret(&self) {
        self.state().accept_secret = false;
    }

    /// Status lines sent during every apply
    pub fn apply_progress<I, S>(&self, messages: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state().apply_progress = messages.into_iter().map(Into::into).collect();
    }

    /// Result of the next apply; applies succeed otherwise
    pub fn apply_result(&self, result: RemoteResult) {
        self.state().apply_results.push_back(result);
    }

    pub fn apply_count(&self) -> usize {
        self.state().apply_count
    }

    /// Every call made so far as (method, arguments)
    pub fn calls(&self) -> Vec<(String, Value)> {
        self.state().calls.clone()
    }

    /// Arguments of every call to `method`, oldest first
    pub fn calls_to(&self, method: &str) -> Vec<Value> {
        self.state()
            .calls
            .iter()
            .filter(|(name, _)| name == method)
            .map(|(_, args)| args.clone())
            .collect()
    }

    /// Method names in call order
    pub fn call_names(&self) -> Vec<String> {
        self.state()
            .calls
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }
}

#[async_trait]
impl BackendTransport for ScriptedBackend {
    async fn authenticate(&self, secret: &SessionSecret) -> Result<bool, ClientError> {
        let state = self.state();
        if state.disconnected {
            return Err(ClientError::ServiceNotAvailable);
        }
        Ok(state.accept_secret && secret.expose() == SECRET)
    }

    async fn call(&self, method: &str, args: Value) -> Result<RemoteResult, ClientError> {
        let mut state = self.state();
        state.calls.push((method.to_string(), args.clone()));

        if state.disconnected {
            return Err(ClientError::Connection("backend connection closed".to_string()));
        }
        if let Some(error) = state.failures.get_mut(method).and_then(VecDeque::pop_front) {
            return Err(error);
        }

        let decoded = RemoteMethod::decode(method, args)?;
        let scripted = state.replies.get_mut(method).and_then(VecDeque::pop_front);

        let result = match scripted {
            Some(result) => result,
            None => state.answer(&decoded)?,
        };

        if decoded.is_scheduling() && result.success && !result.actions.is_empty() {
            state.promote_staged();
        }

        Ok(result)
    }

    async fn apply_all(
        &self,
        progress: mpsc::Sender<String>,
    ) -> Result<RemoteResult, ClientError> {
        let messages = {
            let mut state = self.state();
            state.calls.push((APPLY_ALL.to_string(), Value::Null));
            if state.disconnected {
                return Err(ClientError::Connection("backend connection closed".to_string()));
            }
            state.apply_count += 1;
            state.apply_progress.clone()
        };

        for message in messages {
            if progress.send(message).await.is_err() {
                break;
            }
        }

        let mut state = self.state();
        let result = state.apply_results.pop_front().unwrap_or_else(RemoteResult::ok);
        if result.success {
            state.promote_staged();
        }
        Ok(result)
    }
}

impl State {
    fn promote_staged(&mut self) {
        if let Some(devices) = self.staged_devices.take() {
            self.devices = devices;
        }
    }

    /// Default reply derived from the seeded state
    fn answer(&mut self, method: &RemoteMethod) -> Result<RemoteResult, ClientError> {
        let result = match method {
            RemoteMethod::Init | RemoteMethod::CancelActions { .. } | RemoteMethod::ResetAll => {
                RemoteResult::ok()
            }
            RemoteMethod::GetAvailableFilesystems => value(&self.filesystems)?,
            RemoteMethod::GetAvailableDisklabels => value(&self.disklabels)?,
            RemoteMethod::GetAvailableRaidLevels { device_type } => {
                value(self.raid_levels.get(device_type).map(Vec::as_slice).unwrap_or(&[]))?
            }
            RemoteMethod::GetDisks => {
                let disks: Vec<&Device> = self.devices.iter().filter(|d| d.is_disk()).collect();
                value(&disks)?
            }
            RemoteMethod::GetDeviceTree => value(&self.devices)?,
            RemoteMethod::GetMountpoints => value(&self.mountpoints)?,
            RemoteMethod::GetFreePvs => {
                let free = self.free_pvs.clone().unwrap_or_else(|| {
                    self.devices
                        .iter()
                        .filter(|d| d.is_pv() && d.pv_vg().is_none())
                        .map(|d| d.id.clone())
                        .collect()
                });
                value(&free)?
            }
            RemoteMethod::GetFreeDiskRegions => value(&self.free_disk_regions())?,
            RemoteMethod::GetVgFree { vg } => {
                let free = match self.vg_free.get(vg) {
                    Some(free) => free.clone(),
                    None => {
                        let size = self
                            .devices
                            .iter()
                            .find(|d| &d.id == vg)
                            .and_then(|d| match d.kind {
                                DeviceKind::LvmVg { free, .. } => Some(free),
                                _ => None,
                            })
                            .unwrap_or(Size::ZERO);
                        FreeSpaceTarget::new(FreeSpaceKind::FreeRegion, vg.clone(), size)
                    }
                };
                value(&free)?
            }
            RemoteMethod::GetRemovablePvs { vg } => {
                value(self.removable_pvs.get(vg).map(Vec::as_slice).unwrap_or(&[]))?
            }
            RemoteMethod::IsDeviceResizable { device } => {
                value(self.resize.get(device).unwrap_or(&ResizeInfo::FIXED))?
            }
            RemoteMethod::AddDevice(_)
            | RemoteMethod::EditPartitionDevice(_)
            | RemoteMethod::EditLvmvgDevice(_)
            | RemoteMethod::DeleteDevice { .. }
            | RemoteMethod::CreateDiskLabel { .. } => {
                let id = ActionId::new(format!("action-{}", self.next_action));
                self.next_action += 1;
                let mut result = RemoteResult::scheduled(vec![id]);
                if !self.created.is_empty() {
                    result.value = Some(serde_json::to_value(&self.created)?);
                }
                result
            }
        };

        Ok(result)
    }

    fn free_disk_regions(&self) -> Vec<FreeSpaceTarget> {
        let mut targets = Vec::new();

        for disk in self.devices.iter().filter(|d| d.is_disk()) {
            let Some(Format::DiskLabel { usable, .. }) = &disk.format else {
                let unused = !self.devices.iter().any(|d| d.parents.contains(&disk.id));
                if disk.format.is_none() && unused {
                    targets.push(FreeSpaceTarget::new(
                        FreeSpaceKind::EmptyDisk,
                        disk.id.clone(),
                        disk.size,
                    ));
                }
                continue;
            };

            let extents: Vec<PartitionExtent> = self
                .devices
                .iter()
                .filter(|d| d.parents.first() == Some(&disk.id))
                .filter_map(|d| match d.kind {
                    DeviceKind::Partition {
                        partition_type,
                        start,
                    } => Some(PartitionExtent {
                        start,
                        size: d.size.bytes(),
                        partition_type,
                    }),
                    _ => None,
                })
                .collect();

            targets.extend(
                compute_free_regions(disk.size.bytes(), *usable, &extents)
                    .into_iter()
                    .map(|r| {
                        FreeSpaceTarget::region(
                            disk.id.clone(),
                            r.start,
                            Size::from_bytes(r.size),
                            r.logical,
                        )
                    }),
            );
        }

        targets
    }
}

fn value<T: Serialize + ?Sized>(payload: &T) -> Result<RemoteResult, ClientError> {
    Ok(RemoteResult::with_value(serde_json::to_value(payload)?))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::fixtures::DiskBuilder;

    #[tokio::test]
    async fn scheduling_calls_get_fresh_action_ids() {
        let backend = ScriptedBackend::new();
        let client = backend.connect().await.expect("connect");

        let first = client
            .call(&RemoteMethod::DeleteDevice {
                device: DeviceId::new("sda1"),
            })
            .await
            .expect("call");
        let second = client
            .call(&RemoteMethod::DeleteDevice {
                device: DeviceId::new("sda2"),
            })
            .await
            .expect("call");

        assert_eq!(first.actions, vec![ActionId::new("action-1")]);
        assert_eq!(second.actions, vec![ActionId::new("action-2")]);
        assert_eq!(
            backend.calls_to("delete-device"),
            vec![json!({ "device": "sda1" }), json!({ "device": "sda2" })]
        );
    }

    #[tokio::test]
    async fn queued_reply_wins_over_default() {
        let backend = ScriptedBackend::new();
        backend.reply("init", RemoteResult::refused("the planner backend is already running"));
        let client = backend.connect().await.expect("connect");

        let refused = client.call(&RemoteMethod::Init).await.expect("call");
        let accepted = client.call(&RemoteMethod::Init).await.expect("call");

        assert!(!refused.success);
        assert!(accepted.success);
    }

    #[tokio::test]
    async fn disconnect_fails_every_later_call() {
        let backend = ScriptedBackend::new();
        let client = backend.connect().await.expect("connect");
        backend.disconnect();

        let err = client.call(&RemoteMethod::GetDeviceTree).await.expect_err("closed");
        assert!(err.is_connectivity_loss());
    }

    #[tokio::test]
    async fn rejected_secret_fails_connect() {
        let backend = ScriptedBackend::new();
        backend.reject_secret();
        assert_eq!(
            backend.connect().await.expect_err("rejected"),
            ClientError::AuthenticationRejected
        );
    }

    #[tokio::test]
    async fn free_regions_follow_partitions() {
        let backend = ScriptedBackend::new();
        backend.set_devices(
            DiskBuilder::msdos("sda", Size::from_mib(100))
                .primary("sda1", Size::from_mib(49))
                .build(),
        );
        let client = backend.connect().await.expect("connect");

        let result = client
            .call(&RemoteMethod::GetFreeDiskRegions)
            .await
            .expect("call");
        let regions: Vec<FreeSpaceTarget> = result.decode_value().expect("decode");

        assert_eq!(
            regions,
            vec![FreeSpaceTarget::region(
                DeviceId::new("sda"),
                50 * Size::MIB,
                Size::from_mib(50),
                false
            )]
        );
    }

    #[tokio::test]
    async fn staged_tree_replaces_devices_after_apply() {
        let backend = ScriptedBackend::new();
        backend.stage_devices(DiskBuilder::gpt("sdb", Size::from_gib(1)).build());
        let client = backend.connect().await.expect("connect");
        let (tx, _rx) = mpsc::channel(1);

        client.apply_all(tx).await.expect("apply");
        let result = client.call(&RemoteMethod::GetDeviceTree).await.expect("call");
        let devices: Vec<Device> = result.decode_value().expect("decode");

        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].name, "sdb");
        assert_eq!(backend.apply_count(), 1);
    }
}
