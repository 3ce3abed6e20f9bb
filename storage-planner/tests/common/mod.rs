// SPDX-License-Identifier: GPL-3.0-only

#![allow(dead_code)]

use storage_planner::{AddContext, OperationOutcome, PlannerConfig, PlanningSession};
use storage_testing::ScriptedBackend;
use storage_types::{
    AddDeviceRequest, DeviceId, MemberSize, NewDeviceType, PendingAction, Selection, Size,
};

/// Session started against `backend` with default config
pub async fn start(backend: &ScriptedBackend) -> PlanningSession {
    let client = backend.connect().await.expect("connect");
    PlanningSession::start(client, &PlannerConfig::default())
        .await
        .expect("start session")
}

/// Add context for a device the caller selected
pub async fn context_on(session: &mut PlanningSession, device: &str) -> AddContext {
    session
        .prepare_add(&Selection::Device {
            device: DeviceId::new(device),
        })
        .await
        .expect("prepare add")
        .expect("device accepts new children")
}

/// Single-member request using the anchor's own free space
pub fn request_on(context: &AddContext, device_type: NewDeviceType, size: Size) -> AddDeviceRequest {
    let free = context.anchor.free.clone();
    AddDeviceRequest::new(
        device_type,
        context.anchor.parent.clone(),
        free.clone(),
        vec![MemberSize { target: free, size }],
    )
}

pub fn ext4_partition(context: &AddContext, size: Size) -> AddDeviceRequest {
    let mut request = request_on(context, NewDeviceType::Partition, size);
    request.filesystem = Some("ext4".to_string());
    request
}

pub fn scheduled(outcome: OperationOutcome) -> PendingAction {
    match outcome {
        OperationOutcome::Scheduled(action) => action,
        other => panic!("expected a scheduled action, got {other:?}"),
    }
}
