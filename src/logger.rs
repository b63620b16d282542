//! Per-device logging wrapper: cheap, `Clone`, structured `tracing` calls rather
//! than ad-hoc `println!`/`format!` scattered through sessions.

use crate::model::DeviceId;
use crate::transport::reconnect::ConnectionState;

/// Lightweight logger bound to one device, so every line it emits carries the
/// device id as a structured field without the caller repeating it.
#[derive(Debug, Clone)]
pub struct ChannelLogger {
    pub device_id: DeviceId,
}

impl ChannelLogger {
    pub fn new(device_id: DeviceId) -> Self {
        Self { device_id }
    }

    pub fn log_connect(&self, target: &str) {
        tracing::info!(device_id = %self.device_id, target, "[CONNECT]");
    }

    pub fn log_status(&self, old_state: ConnectionState, new_state: ConnectionState, reason: &str) {
        tracing::info!(device_id = %self.device_id, ?old_state, ?new_state, "[STATUS] {}", reason);
    }

    pub fn log_retry(&self, attempt: u32, delay_ms: u64, reason: &str) {
        tracing::warn!(device_id = %self.device_id, attempt, delay_ms, "[RETRY] {}", reason);
    }

    pub fn log_poll_failure(&self, poll_name: &str, reason: &str) {
        tracing::warn!(device_id = %self.device_id, poll = poll_name, "[POLL] {}", reason);
    }

    pub fn log_write(&self, action_id: &str, success: bool, message: &str) {
        if success {
            tracing::info!(device_id = %self.device_id, action_id, "[WRITE] ok: {}", message);
        } else {
            tracing::warn!(device_id = %self.device_id, action_id, "[WRITE] failed: {}", message);
        }
    }
}
