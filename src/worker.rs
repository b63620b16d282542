//! Factory Worker: one isolated `tokio::task` per protocol family, owning that
//! family's transport pool and every device session.
//!
//! Realized via `tokio::task::JoinHandle` rather than OS-process isolation: a panic
//! inside the spawned task does not unwind the host task, and `JoinHandle::await`
//! surfaces it as `Err(JoinError)`, so a panic in a worker cannot corrupt the host's
//! value map or other workers, without process-per-worker overhead.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{error, info};

use crate::client::{Client, Framing};
use crate::config::{ChannelConfig, TemplateConfig};
use crate::events::{ChannelDeviceStatusEvent, ChannelReadyEvent, C2S, S2C};
use crate::model::{ActionId, ActionInfo, DeviceId};
use crate::perf::PerfMonitor;
use crate::session::Session;
use crate::transport::pool::TransportPool;
use crate::transport::reconnect::{ConnectionState, ReconnectPolicy};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(100);

/// One device's static configuration, resolved from its `DeviceConfig` + `TemplateConfig`.
pub struct DeviceSpec {
    pub device_id: DeviceId,
    pub channel: ChannelConfig,
    pub template: TemplateConfig,
}

/// Everything a worker needs at spawn time: its device list and the channel
/// endpoints it communicates with the host over.
pub struct WorkerHandle {
    pub name: String,
    pub s2c_tx: mpsc::Sender<S2C>,
    pub c2s_rx: mpsc::Receiver<C2S>,
    pub join: tokio::task::JoinHandle<()>,
}

/// Spawn a worker task owning `devices`. Returns immediately with the handle the
/// host uses to talk to it; the worker's first outbound message is always
/// `C2S::Ready`.
pub fn spawn_worker(name: String, devices: Vec<DeviceSpec>, perf: PerfMonitor) -> WorkerHandle {
    let (s2c_tx, s2c_rx) = mpsc::channel(256);
    let (c2s_tx, c2s_rx) = mpsc::channel(1024);

    let worker_name = name.clone();
    let join = tokio::spawn(async move {
        if let Err(e) = run_worker(worker_name.clone(), devices, s2c_rx, c2s_tx, perf).await {
            error!(worker = worker_name, error = %e, "worker terminated with error");
        }
    });

    WorkerHandle { name, s2c_tx, c2s_rx, join }
}

async fn run_worker(
    name: String,
    devices: Vec<DeviceSpec>,
    mut s2c_rx: mpsc::Receiver<S2C>,
    c2s_tx: mpsc::Sender<C2S>,
    perf: PerfMonitor,
) -> Result<(), crate::error::GatewayError> {
    c2s_tx
        .send(C2S::Ready(ChannelReadyEvent { worker_name: name.clone() }))
        .await
        .map_err(|_| crate::error::GatewayError::Internal("host channel closed before ready".into()))?;

    let pool = Arc::new(TransportPool::new(ReconnectPolicy::unlimited(), c2s_tx.clone()));
    let mut sessions: HashMap<DeviceId, Session> = HashMap::new();

    for spec in &devices {
        let key = spec.channel.transport.pool_key();
        pool.register(&key, spec.channel.transport.clone(), spec.device_id.clone());
        let _ = c2s_tx
            .send(C2S::DeviceStatus(ChannelDeviceStatusEvent { device_id: spec.device_id.clone(), online: false }))
            .await;
    }

    // Drive the reconnect scheduler for every key this worker owns.
    let scheduler_pool = pool.clone();
    let scheduler_tx = c2s_tx.clone();
    let keys: Vec<String> = devices.iter().map(|d| d.channel.transport.pool_key()).collect();
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(1));
        loop {
            tick.tick().await;
            let before: HashMap<String, ConnectionState> =
                keys.iter().filter_map(|k| scheduler_pool.state(k).map(|s| (k.clone(), s))).collect();
            scheduler_pool.tick().await;
            for key in &keys {
                let after = scheduler_pool.state(key);
                if before.get(key) != after.as_ref() && after == Some(ConnectionState::Connected) {
                    for device_id in scheduler_pool.device_ids(key) {
                        let _ = scheduler_tx
                            .send(C2S::DeviceStatus(ChannelDeviceStatusEvent { device_id, online: true }))
                            .await;
                    }
                }
            }
        }
    });

    // One client per pool key, shared by every device session bound to it — a
    // second `pool.take` on an already-taken key would block forever.
    let mut clients: HashMap<String, Arc<Client>> = HashMap::new();
    for spec in &devices {
        let key = spec.channel.transport.pool_key();
        if clients.contains_key(&key) {
            continue;
        }
        let framing = if spec.channel.is_rtu { Framing::Rtu } else { Framing::Tcp };

        // Wait for the transport to come up before building a client; a real
        // deployment would retry this per poll cycle instead of blocking here.
        let handle = loop {
            match pool.take(&key).await {
                Ok(h) => break h,
                Err(_) => {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    continue;
                },
            }
        };
        let client = Arc::new(Client::new(handle, framing, DEFAULT_REQUEST_TIMEOUT, pool.clone(), key.clone()));
        clients.insert(key, client);
    }

    for spec in devices {
        let key = spec.channel.transport.pool_key();
        let client = clients.get(&key).expect("client built for every registered key").clone();
        let actions: HashMap<ActionId, ActionInfo> = spec
            .template
            .points
            .iter()
            .filter_map(|(tag, point)| match point {
                crate::config::PointDef::Action(a) => Some((ActionId::from(tag.as_str()), a.clone())),
                crate::config::PointDef::Variable(_) => None,
            })
            .collect();

        let mut session =
            Session::new(spec.device_id.clone(), spec.channel.unit_id, client, spec.template.template.polls.clone(), actions, c2s_tx.clone(), perf.clone());
        session.start().await;
        sessions.insert(spec.device_id.clone(), session);
    }

    info!(worker = name, devices = sessions.len(), "worker ready");

    while let Some(msg) = s2c_rx.recv().await {
        match msg {
            S2C::Shutdown => break,
            S2C::ActionInvoke(event) => {
                if let Some(session) = sessions.get(&event.device_id) {
                    session.handle_action_invoke(event).await;
                }
            },
        }
    }

    for (_, mut session) in sessions {
        session.stop().await;
    }
    Ok(())
}
