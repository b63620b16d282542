//! Gateway Core: the host-side manager. Spawns one worker per
//! protocol family, routes device events, owns the last-known-value map, and
//! serves the façade API the outer HTTP/SSE layer (out of scope here) plugs into.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{broadcast, oneshot, Mutex};
use tracing::{error, info, warn};

use crate::config::{PointDef, ServiceConfig, TemplateConfig};
use crate::events::{C2S, S2C};
use crate::model::{ActionId, ActionInfo, DeviceId, GatewayValue, TagId, VariableInfo};
use crate::perf::PerfMonitor;
use crate::worker::{spawn_worker, DeviceSpec, WorkerHandle};

const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_MAX_RESTART_ATTEMPTS: u32 = 3;
const DEFAULT_RESTART_DELAY: Duration = Duration::from_secs(5);

type ValueKey = (DeviceId, TagId);
type WriteKey = (DeviceId, ActionId);

struct GatewayInner {
    values: DashMap<ValueKey, GatewayValue>,
    online: DashMap<DeviceId, bool>,
    variable_defs: DashMap<DeviceId, HashMap<TagId, VariableInfo>>,
    action_defs: DashMap<DeviceId, HashMap<ActionId, ActionInfo>>,
    listeners: DashMap<ValueKey, broadcast::Sender<Option<GatewayValue>>>,
    pending_writes: DashMap<WriteKey, Mutex<VecDeque<oneshot::Sender<bool>>>>,
    device_owner: DashMap<DeviceId, String>,
    workers: Mutex<HashMap<String, WorkerHandle>>,
    perf: PerfMonitor,
}

/// Host-side manager. Cheap to clone (all state is behind one `Arc`).
#[derive(Clone)]
pub struct Gateway {
    inner: Arc<GatewayInner>,
}

impl Gateway {
    /// Groups `service.devices` by their channel adapter,
    /// spawns one worker per group, and starts the host event loop that consumes
    /// every worker's `C2S` stream.
    pub async fn start(service: ServiceConfig, templates: HashMap<String, TemplateConfig>) -> Self {
        let inner = Arc::new(GatewayInner {
            values: DashMap::new(),
            online: DashMap::new(),
            variable_defs: DashMap::new(),
            action_defs: DashMap::new(),
            listeners: DashMap::new(),
            pending_writes: DashMap::new(),
            device_owner: DashMap::new(),
            workers: Mutex::new(HashMap::new()),
            perf: PerfMonitor::new(),
        });

        let mut groups: HashMap<String, Vec<DeviceSpec>> = HashMap::new();
        for device in service.devices {
            let Some(template) = templates.get(&device.template).cloned() else {
                warn!(device = device.name, template = device.template, "unknown template, skipping device");
                continue;
            };
            let device_id = DeviceId::from(device.name.as_str());
            inner.variable_defs.insert(
                device_id.clone(),
                template
                    .points
                    .iter()
                    .filter_map(|(tag, p)| match p {
                        PointDef::Variable(v) => Some((tag.clone(), v.clone())),
                        PointDef::Action(_) => None,
                    })
                    .collect(),
            );
            inner.action_defs.insert(
                device_id.clone(),
                template
                    .points
                    .iter()
                    .filter_map(|(tag, p)| match p {
                        PointDef::Action(a) => Some((ActionId::from(tag.as_str()), a.clone())),
                        PointDef::Variable(_) => None,
                    })
                    .collect(),
            );
            inner.online.insert(device_id.clone(), false);

            let adapter = device.channel.adapter.clone();
            groups.entry(adapter).or_default().push(DeviceSpec { device_id, channel: device.channel, template });
        }

        for (adapter, specs) in groups {
            Self::spawn_group(&inner, adapter, specs).await;
        }

        Gateway { inner }
    }

    async fn spawn_group(inner: &Arc<GatewayInner>, name: String, specs: Vec<DeviceSpec>) {
        for spec in &specs {
            inner.device_owner.insert(spec.device_id.clone(), name.clone());
        }
        let handle = spawn_worker(name.clone(), specs_clone_for_restart(&specs), inner.perf.clone());
        inner.workers.lock().await.insert(name.clone(), handle);

        let inner = inner.clone();
        tokio::spawn(async move {
            Self::supervise(inner, name, specs, 0).await;
        });
    }

    /// Pumps one worker's `C2S` stream into host state; on worker exit (crash or
    /// otherwise) marks its devices offline and respawns it up to a bounded number
    /// of attempts, with a fixed delay between each.
    fn supervise(
        inner: Arc<GatewayInner>,
        name: String,
        specs: Vec<DeviceSpec>,
        attempt: u32,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> {
        Box::pin(async move {
            let mut c2s_rx = {
                let mut workers = inner.workers.lock().await;
                match workers.get_mut(&name) {
                    Some(h) => std::mem::replace(&mut h.c2s_rx, tokio::sync::mpsc::channel(1).1),
                    None => return,
                }
            };

            while let Some(msg) = c2s_rx.recv().await {
                Self::handle_c2s(&inner, msg).await;
            }

            let join_failed = {
                let mut workers = inner.workers.lock().await;
                match workers.remove(&name) {
                    Some(h) => h.join.await.is_err(),
                    None => false,
                }
            };

            for spec in &specs {
                inner.online.insert(spec.device_id.clone(), false);
                let _ = Self::publish_status(&inner, spec.device_id.clone(), false);
            }

            if attempt + 1 >= DEFAULT_MAX_RESTART_ATTEMPTS {
                error!(worker = name, join_failed, "worker exhausted restart attempts, giving up");
                return;
            }

            warn!(worker = name, attempt, "worker exited, restarting after delay");
            tokio::time::sleep(DEFAULT_RESTART_DELAY).await;

            let new_handle = spawn_worker(name.clone(), specs_clone_for_restart(&specs), inner.perf.clone());
            inner.workers.lock().await.insert(name.clone(), new_handle);
            Self::supervise(inner, name, specs, attempt + 1).await;
        })
    }

    async fn handle_c2s(inner: &Arc<GatewayInner>, msg: C2S) {
        match msg {
            C2S::Ready(ev) => info!(worker = ev.worker_name, "worker ready"),
            C2S::DeviceStatus(ev) => {
                inner.online.insert(ev.device_id.clone(), ev.online);
                let _ = Self::publish_status(inner, ev.device_id, ev.online);
            },
            C2S::Update(ev) => {
                for var in ev.updates {
                    let key = (var.device_id.clone(), var.tag_id.clone());
                    inner.values.insert(key.clone(), var.value);
                    if let Some(tx) = inner.listeners.get(&key) {
                        let _ = tx.send(if var.value.is_null() { None } else { Some(var.value) });
                    }
                }
            },
            C2S::Writed(ev) => {
                let key = (ev.device_id.clone(), ev.action_id.clone());
                if let Some(queue) = inner.pending_writes.get(&key) {
                    let mut queue = queue.lock().await;
                    if let Some(completer) = queue.pop_front() {
                        let _ = completer.send(ev.success);
                    }
                }
            },
            C2S::PerfTime(ev) => inner.perf.record_duration(&ev.name, ev.duration_ms),
            C2S::PerfCount(ev) => inner.perf.increment(&ev.name, ev.delta),
        }
    }

    fn publish_status(inner: &Arc<GatewayInner>, _device_id: DeviceId, _online: bool) -> Option<()> {
        // Online/offline is a status stream, not a per-tag value stream; left as a
        // hook for a `listen_event::<ChannelDeviceStatusEvent>()` implementation.
        let _ = inner;
        None
    }

    // ---- façade ----

    pub fn list_device_ids(&self) -> Vec<DeviceId> {
        self.inner.online.iter().map(|e| e.key().clone()).collect()
    }

    pub fn get_device_online(&self, device_id: &DeviceId) -> bool {
        self.inner.online.get(device_id).map(|v| *v).unwrap_or(false)
    }

    pub fn read_value(&self, device_id: &DeviceId, tag_id: &TagId) -> Option<GatewayValue> {
        self.inner.values.get(&(device_id.clone(), tag_id.clone())).map(|v| *v)
    }

    pub fn read_all_values(&self, device_id: &DeviceId) -> HashMap<TagId, GatewayValue> {
        self.inner
            .values
            .iter()
            .filter(|e| &e.key().0 == device_id)
            .map(|e| (e.key().1.clone(), *e.value()))
            .collect()
    }

    /// Broadcast receiver that emits on every change to `(device_id, tag_id)`.
    pub fn listen_value(&self, device_id: &DeviceId, tag_id: &TagId) -> broadcast::Receiver<Option<GatewayValue>> {
        let key = (device_id.clone(), tag_id.clone());
        self.inner.listeners.entry(key).or_insert_with(|| broadcast::channel(64).0).subscribe()
    }

    pub fn get_variable_definitions(&self, device_id: &DeviceId) -> HashMap<TagId, VariableInfo> {
        self.inner.variable_defs.get(device_id).map(|m| m.clone()).unwrap_or_default()
    }

    pub fn get_action_definitions(&self, device_id: &DeviceId) -> HashMap<ActionId, ActionInfo> {
        self.inner.action_defs.get(device_id).map(|m| m.clone()).unwrap_or_default()
    }

    /// Submits a write, waits up to 10 s for the matching `ChannelWritedEvent`
    ///. Returns `false` on timeout, routing failure, or an
    /// explicit write failure.
    pub async fn invoke_action(&self, device_id: DeviceId, action_id: ActionId, value: GatewayValue) -> bool {
        let key = (device_id.clone(), action_id.clone());
        let (tx, rx) = oneshot::channel();
        {
            let queue = self.inner.pending_writes.entry(key.clone()).or_insert_with(|| Mutex::new(VecDeque::new()));
            queue.lock().await.push_back(tx);
        }

        let sent = match self.inner.device_owner.get(&device_id) {
            Some(worker_name) => {
                let workers = self.inner.workers.lock().await;
                match workers.get(worker_name.as_str()) {
                    Some(handle) => handle
                        .s2c_tx
                        .send(S2C::ActionInvoke(crate::events::DeviceActionInvokeEvent {
                            device_id: device_id.clone(),
                            action_id: action_id.clone(),
                            value,
                        }))
                        .await
                        .is_ok(),
                    None => false,
                }
            },
            None => false,
        };

        if !sent {
            if let Some(queue) = self.inner.pending_writes.get(&key) {
                queue.lock().await.pop_back();
            }
            return false;
        }

        match tokio::time::timeout(DEFAULT_WRITE_TIMEOUT, rx).await {
            Ok(Ok(success)) => success,
            _ => {
                if let Some(queue) = self.inner.pending_writes.get(&key) {
                    queue.lock().await.pop_front();
                }
                false
            },
        }
    }
}

fn specs_clone_for_restart(specs: &[DeviceSpec]) -> Vec<DeviceSpec> {
    specs
        .iter()
        .map(|s| DeviceSpec { device_id: s.device_id.clone(), channel: s.channel.clone(), template: s.template.clone() })
        .collect()
}
