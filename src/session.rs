//! Channel Session: one per device. Owns a `Client` bound to a
//! shared pooled transport, runs every poll group on its own timer, decodes reads
//! into typed `Variable` updates, and dispatches action-invoke writes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;

use crate::client::Client;
use crate::codec::byte_order::ByteOrder;
use crate::codec::values;
use crate::error::GatewayError;
use crate::events::{C2S, ChannelPerformanceTimeEvent, ChannelUpdateEvent, ChannelWritedEvent, DeviceActionInvokeEvent};
use crate::logger::ChannelLogger;
use crate::model::{ActionId, ActionInfo, DataType, DeviceId, GatewayValue, Poll, TagId, Variable};
use crate::perf::{PerfMonitor, Timer};

/// Session lifecycle: `Degraded` suppresses poll effects but keeps
/// timers alive so the session resumes on its own once the transport recovers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
    Degraded,
    Stopped,
}

struct SharedState {
    state: RwLock<SessionState>,
}

/// Per-device polling loop and write dispatcher.
pub struct Session {
    device_id: DeviceId,
    unit_id: u8,
    client: Arc<Client>,
    polls: Arc<Vec<Poll>>,
    actions: Arc<HashMap<ActionId, ActionInfo>>,
    out_tx: mpsc::Sender<C2S>,
    logger: ChannelLogger,
    perf: PerfMonitor,
    shared: Arc<SharedState>,
    poll_handles: Vec<JoinHandle<()>>,
}

impl Session {
    pub fn new(
        device_id: DeviceId,
        unit_id: u8,
        client: Arc<Client>,
        polls: Vec<Poll>,
        actions: HashMap<ActionId, ActionInfo>,
        out_tx: mpsc::Sender<C2S>,
        perf: PerfMonitor,
    ) -> Self {
        Self {
            logger: ChannelLogger::new(device_id.clone()),
            device_id,
            unit_id,
            client,
            polls: Arc::new(polls),
            actions: Arc::new(actions),
            out_tx,
            perf,
            shared: Arc::new(SharedState { state: RwLock::new(SessionState::Idle) }),
            poll_handles: Vec::new(),
        }
    }

    pub async fn state(&self) -> SessionState {
        *self.shared.state.read().await
    }

    /// Spawn one task per poll group; each runs its own `interval_ms` timer and
    /// drops a tick if the previous cycle is still in flight, via a per-group
    /// `AtomicBool` busy guard.
    pub async fn start(&mut self) {
        *self.shared.state.write().await = SessionState::Running;
        for poll in self.polls.iter().cloned() {
            let client = self.client.clone();
            let device_id = self.device_id.clone();
            let unit_id = self.unit_id;
            let out_tx = self.out_tx.clone();
            let logger = self.logger.clone();
            let perf = self.perf.clone();
            let shared = self.shared.clone();
            let busy = Arc::new(AtomicBool::new(false));

            let handle = tokio::spawn(async move {
                let mut ticker = tokio::time::interval(std::time::Duration::from_millis(poll.interval_ms));
                loop {
                    ticker.tick().await;
                    if *shared.state.read().await == SessionState::Stopped {
                        break;
                    }
                    if busy.swap(true, Ordering::AcqRel) {
                        continue;
                    }
                    run_poll_cycle(&poll, &client, unit_id, &device_id, &out_tx, &logger, &perf, &shared).await;
                    busy.store(false, Ordering::Release);
                }
            });
            self.poll_handles.push(handle);
        }
    }

    pub async fn stop(&mut self) {
        *self.shared.state.write().await = SessionState::Stopped;
        for handle in self.poll_handles.drain(..) {
            handle.abort();
        }
    }

    /// Dispatch one `DeviceActionInvokeEvent` to its `Push` target.
    pub async fn handle_action_invoke(&self, event: DeviceActionInvokeEvent) {
        let timer = Timer::start();
        let (success, message) = match self.actions.get(&event.action_id) {
            None => (false, Some(format!("unknown action {}", event.action_id))),
            Some(action) => dispatch_write(&self.client, self.unit_id, &action.push.clone().into(), &event.value).await,
        };
        self.logger.log_write(event.action_id.as_str(), success, message.as_deref().unwrap_or(""));
        self.perf.record_duration(&format!("write.push.{}", event.action_id), timer.elapsed_ms());
        let _ = self
            .out_tx
            .send(C2S::Writed(ChannelWritedEvent {
                device_id: self.device_id.clone(),
                action_id: event.action_id,
                success,
                message,
            }))
            .await;
    }
}

/// Local mirror of `model::Push` so write dispatch doesn't need a `model` import
/// cycle; constructed via `From<Push>` right where it's used.
struct PushTarget {
    function_code: u8,
    address: u16,
    length: u8,
    endian: ByteOrder,
    data_type: DataType,
}

impl From<crate::model::Push> for PushTarget {
    fn from(p: crate::model::Push) -> Self {
        Self { function_code: p.function_code, address: p.begin_address + p.offset, length: p.length, endian: p.endian, data_type: p.data_type }
    }
}

async fn dispatch_write(client: &Client, unit_id: u8, target: &PushTarget, value: &GatewayValue) -> (bool, Option<String>) {
    match target.function_code {
        1 => {
            let bit = match values::encode(value, DataType::Bool, 1, target.endian) {
                Ok(regs) => regs[0] != 0,
                Err(e) => return (false, Some(e.to_string())),
            };
            match client.write_single_coil(unit_id, target.address, bit).await {
                Ok(ok) => (ok, if ok { None } else { Some("echoed value mismatch".into()) }),
                Err(e) => (false, Some(e.to_string())),
            }
        },
        3 => {
            let registers = match values::encode(value, target.data_type, target.length, target.endian) {
                Ok(r) => r,
                Err(e) => return (false, Some(e.to_string())),
            };
            let result = if registers.len() == 1 {
                client.write_single_register(unit_id, target.address, registers[0]).await
            } else {
                client.write_multiple_registers(unit_id, target.address, registers).await
            };
            match result {
                Ok(ok) => (ok, if ok { None } else { Some("echoed value mismatch".into()) }),
                Err(e) => (false, Some(e.to_string())),
            }
        },
        2 | 4 => (false, Some("read-only".into())),
        fc => (false, Some(format!("unsupported write function code {fc:#04x}"))),
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_poll_cycle(
    poll: &Poll,
    client: &Client,
    unit_id: u8,
    device_id: &DeviceId,
    out_tx: &mpsc::Sender<C2S>,
    logger: &ChannelLogger,
    perf: &PerfMonitor,
    shared: &SharedState,
) {
    let timer = Timer::start();
    let updates: Vec<Variable> = match poll.function_code {
        1 | 2 => {
            let bits_result = if poll.function_code == 1 {
                client.read_coils(unit_id, poll.begin_address, poll.length_in_registers).await
            } else {
                client.read_discrete_inputs(unit_id, poll.begin_address, poll.length_in_registers).await
            };
            match bits_result {
                Ok(bits) => {
                    *shared.state.write().await = SessionState::Running;
                    poll.mapping
                        .iter()
                        .map(|m| {
                            let value = bits
                                .get(m.offset as usize)
                                .map(|b| GatewayValue::Bool(*b))
                                .unwrap_or(GatewayValue::Null);
                            Variable { device_id: device_id.clone(), tag_id: m.to.clone(), value }
                        })
                        .collect()
                },
                Err(e) => {
                    on_poll_failure(&e, shared, logger, poll).await;
                    all_null(poll, device_id)
                },
            }
        },
        3 | 4 => {
            let regs_result = if poll.function_code == 3 {
                client.read_holding_registers(unit_id, poll.begin_address, poll.length_in_registers).await
            } else {
                client.read_input_registers(unit_id, poll.begin_address, poll.length_in_registers).await
            };
            match regs_result {
                Ok(registers) => {
                    *shared.state.write().await = SessionState::Running;
                    let mut bytes = Vec::with_capacity(registers.len() * 2);
                    for r in &registers {
                        bytes.extend_from_slice(&r.to_be_bytes());
                    }
                    poll.mapping
                        .iter()
                        .map(|m| {
                            let value = values::decode(&bytes, m.offset as usize, m.data_type, m.length, m.endian)
                                .unwrap_or(GatewayValue::Null);
                            Variable { device_id: device_id.clone(), tag_id: m.to.clone(), value }
                        })
                        .collect()
                },
                Err(e) => {
                    on_poll_failure(&e, shared, logger, poll).await;
                    all_null(poll, device_id)
                },
            }
        },
        fc => {
            logger.log_poll_failure(&poll.name, &format!("unsupported poll function code {fc:#04x}"));
            all_null(poll, device_id)
        },
    };

    let _ = out_tx.send(C2S::Update(ChannelUpdateEvent { device_id: device_id.clone(), updates })).await;
    let _ = out_tx
        .send(C2S::PerfTime(ChannelPerformanceTimeEvent {
            device_id: device_id.clone(),
            name: format!("poll.{}", poll.name),
            duration_ms: timer.elapsed_ms(),
        }))
        .await;
}

async fn on_poll_failure(e: &GatewayError, shared: &SharedState, logger: &ChannelLogger, poll: &Poll) {
    logger.log_poll_failure(&poll.name, &e.to_string());
    if matches!(e, GatewayError::Connection(_) | GatewayError::NotConnected | GatewayError::Timeout) {
        *shared.state.write().await = SessionState::Degraded;
    }
}

fn all_null(poll: &Poll, device_id: &DeviceId) -> Vec<Variable> {
    poll.mapping
        .iter()
        .map(|m| Variable { device_id: device_id.clone(), tag_id: m.to.clone(), value: GatewayValue::Null })
        .collect()
}
