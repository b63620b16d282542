//! Typed messages exchanged between host, workers, and sessions.
//!
//! `S2C` flows host → worker, `C2S` flows worker → host: a bidirectional port pair
//! per worker.

use crate::model::{ActionId, DeviceId, GatewayValue, Variable};

/// Host → worker: invoke a write-only action on one of the worker's devices.
#[derive(Debug, Clone)]
pub struct DeviceActionInvokeEvent {
    pub device_id: DeviceId,
    pub action_id: ActionId,
    pub value: GatewayValue,
}

/// Host → worker message envelope.
#[derive(Debug, Clone)]
pub enum S2C {
    ActionInvoke(DeviceActionInvokeEvent),
    Shutdown,
}

/// One-shot, sent first by a worker to announce its inbound channel is ready.
#[derive(Debug, Clone)]
pub struct ChannelReadyEvent {
    pub worker_name: String,
}

/// Online/offline transition (or initial registration, `online = false`).
#[derive(Debug, Clone)]
pub struct ChannelDeviceStatusEvent {
    pub device_id: DeviceId,
    pub online: bool,
}

/// One poll cycle's results, emitted even on failure (all-`null` values).
#[derive(Debug, Clone)]
pub struct ChannelUpdateEvent {
    pub device_id: DeviceId,
    pub updates: Vec<Variable>,
}

/// Result of one write/action-invoke attempt.
#[derive(Debug, Clone)]
pub struct ChannelWritedEvent {
    pub device_id: DeviceId,
    pub action_id: ActionId,
    pub success: bool,
    pub message: Option<String>,
}

/// A named duration sample (e.g. `poll.<name>`, `write.push.<action_id>`, `reconnect`).
#[derive(Debug, Clone)]
pub struct ChannelPerformanceTimeEvent {
    pub device_id: DeviceId,
    pub name: String,
    pub duration_ms: f64,
}

/// A named counter increment (e.g. `reconnect.attempt`, `reconnect.fail`).
#[derive(Debug, Clone)]
pub struct ChannelPerformanceCountEvent {
    pub device_id: DeviceId,
    pub name: String,
    pub delta: u64,
}

/// Worker → host message envelope.
#[derive(Debug, Clone)]
pub enum C2S {
    Ready(ChannelReadyEvent),
    DeviceStatus(ChannelDeviceStatusEvent),
    Update(ChannelUpdateEvent),
    Writed(ChannelWritedEvent),
    PerfTime(ChannelPerformanceTimeEvent),
    PerfCount(ChannelPerformanceCountEvent),
}
