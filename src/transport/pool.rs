//! Keyed connection registry with bounded-backoff reconnection.
//!
//! Exactly one live socket per key, shared by every device session bound to it —
//! not an LRU pool of many connections per key.

use std::collections::HashSet;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use dashmap::DashMap;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf, ReadHalf, WriteHalf};
use tokio::net::{TcpStream, UnixStream};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::config::TransportConfig;
use crate::error::{GatewayError, Result};
use crate::events::{ChannelDeviceStatusEvent, ChannelPerformanceCountEvent, ChannelPerformanceTimeEvent, C2S};
use crate::logger::ChannelLogger;
use crate::model::DeviceId;
use crate::perf::Timer;
use crate::transport::reconnect::{backoff_for_attempt, ConnectionState, ReconnectHelper, ReconnectPolicy};

/// Either side of a pooled socket. One enum rather than two trait-object halves so
/// TCP and Unix sockets share a single `ConnectionEntry` field.
pub enum Socket {
    Tcp(TcpStream),
    Unix(UnixStream),
}

impl AsyncRead for Socket {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Socket::Tcp(s) => Pin::new(s).poll_read(cx, buf),
            Socket::Unix(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Socket {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            Socket::Tcp(s) => Pin::new(s).poll_write(cx, buf),
            Socket::Unix(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Socket::Tcp(s) => Pin::new(s).poll_flush(cx),
            Socket::Unix(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Socket::Tcp(s) => Pin::new(s).poll_shutdown(cx),
            Socket::Unix(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}

async fn connect(cfg: &TransportConfig) -> Result<Socket> {
    match cfg {
        TransportConfig::Tcp { host, port } => {
            let stream = TcpStream::connect((host.as_str(), *port))
                .await
                .map_err(|e| GatewayError::Connection(format!("tcp {host}:{port}: {e}")))?;
            stream.set_nodelay(true).map_err(|e| GatewayError::Connection(format!("set_nodelay: {e}")))?;
            Ok(Socket::Tcp(stream))
        },
        TransportConfig::UnixSocket { path } => {
            let stream = UnixStream::connect(path)
                .await
                .map_err(|e| GatewayError::Connection(format!("unix {path}: {e}")))?;
            Ok(Socket::Unix(stream))
        },
    }
}

/// Split stream handed to a `Client`; the pool keeps no reference into either half
/// once this is issued.
pub struct TransportHandle {
    pub reader: ReadHalf<Socket>,
    pub writer: WriteHalf<Socket>,
}

/// One entry per pool key. `state` plus `reconnect` form the state machine;
/// `device_ids` is every device session sharing this key.
pub struct ConnectionEntry {
    pub key: String,
    pub config: TransportConfig,
    pub reconnect: ReconnectHelper,
    pub next_attempt_at: Instant,
    pub device_ids: HashSet<DeviceId>,
    exhausted: bool,
    live: Option<Arc<Mutex<Option<Socket>>>>,
}

impl ConnectionEntry {
    fn new(key: String, config: TransportConfig, policy: ReconnectPolicy) -> Self {
        Self {
            key,
            config,
            reconnect: ReconnectHelper::new(policy),
            next_attempt_at: Instant::now(),
            device_ids: HashSet::new(),
            exhausted: false,
            live: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.reconnect.connection_state()
    }
}

/// Keyed transport registry with a 1 s tick-driven reconnect scheduler.
pub struct TransportPool {
    entries: DashMap<String, ConnectionEntry>,
    policy: ReconnectPolicy,
    c2s_tx: mpsc::Sender<C2S>,
}

impl TransportPool {
    pub fn new(policy: ReconnectPolicy, c2s_tx: mpsc::Sender<C2S>) -> Self {
        Self { entries: DashMap::new(), policy, c2s_tx }
    }

    /// Register a key (idempotent); associates `device_id` with it.
    pub fn register(&self, key: &str, config: TransportConfig, device_id: DeviceId) {
        let mut entry =
            self.entries.entry(key.to_string()).or_insert_with(|| ConnectionEntry::new(key.to_string(), config, self.policy));
        entry.device_ids.insert(device_id);
    }

    pub fn state(&self, key: &str) -> Option<ConnectionState> {
        self.entries.get(key).map(|e| e.state())
    }

    pub fn device_ids(&self, key: &str) -> Vec<DeviceId> {
        self.entries.get(key).map(|e| e.device_ids.iter().cloned().collect()).unwrap_or_default()
    }

    /// Take the live socket, split into owned halves, for a key that is `Connected`.
    /// Returns `NotConnected` otherwise; the caller (a `Client`) must call
    /// [`TransportPool::mark_broken`] once it observes EOF/IO error on either half.
    pub async fn take(&self, key: &str) -> Result<TransportHandle> {
        let live = {
            let entry = self.entries.get(key).ok_or_else(|| GatewayError::Connection(format!("unknown key {key}")))?;
            if entry.state() != ConnectionState::Connected {
                return Err(GatewayError::NotConnected);
            }
            entry.live.clone().ok_or(GatewayError::NotConnected)?
        };
        let socket = live.lock().await.take().ok_or(GatewayError::NotConnected)?;
        let (reader, writer) = tokio::io::split(socket);
        Ok(TransportHandle { reader, writer })
    }

    /// Caller reports the socket died (EOF/IO error); schedules reconnection and
    /// tells the host every device on this key just went offline.
    pub async fn mark_broken(&self, key: &str) {
        let device_ids: Vec<DeviceId> = {
            let Some(mut entry) = self.entries.get_mut(key) else {
                return;
            };
            entry.reconnect.mark_disconnected();
            entry.live = None;
            entry.next_attempt_at = Instant::now();
            warn!(key, "connection marked broken, scheduling reconnect");
            entry.device_ids.iter().cloned().collect()
        };
        for device_id in device_ids {
            let _ = self
                .c2s_tx
                .send(C2S::DeviceStatus(ChannelDeviceStatusEvent { device_id, online: false }))
                .await;
        }
    }

    /// One tick of the scheduler, meant to be driven on a 1s period. Scans pending
    /// keys and initiates connections whose `next_attempt_at` has
    /// passed, whose state is not already `Reconnecting`, and whose retry budget
    /// (if bounded) isn't exhausted.
    pub async fn tick(&self) {
        let due: Vec<String> = self
            .entries
            .iter()
            .filter(|e| {
                let state = e.state();
                !e.exhausted && (state == ConnectionState::Disconnected) && Instant::now() >= e.next_attempt_at
            })
            .map(|e| e.key.clone())
            .collect();

        for key in due {
            self.connect_one(&key).await;
        }
    }

    async fn connect_one(&self, key: &str) {
        let config = match self.entries.get(key) {
            Some(e) => e.config.clone(),
            None => return,
        };
        let device_ids = self.device_ids(key);

        {
            let mut entry = self.entries.get_mut(key).unwrap();
            entry.reconnect.mark_connecting();
            if entry.reconnect.begin_attempt().is_err() {
                entry.exhausted = true;
                for device_id in &device_ids {
                    ChannelLogger::new(device_id.clone()).log_status(
                        ConnectionState::Reconnecting,
                        ConnectionState::Disconnected,
                        "reconnect attempts exhausted, giving up",
                    );
                }
                return;
            }
        }
        for device_id in &device_ids {
            ChannelLogger::new(device_id.clone()).log_connect(key);
            self.report_count(device_id, "reconnect.attempt").await;
        }

        let timer = Timer::start();
        match connect(&config).await {
            Ok(socket) => {
                let mut entry = self.entries.get_mut(key).unwrap();
                entry.live = Some(Arc::new(Mutex::new(Some(socket))));
                entry.reconnect.record_success();
                info!(key, "connected");
                for device_id in &device_ids {
                    ChannelLogger::new(device_id.clone()).log_status(
                        ConnectionState::Reconnecting,
                        ConnectionState::Connected,
                        "reconnect succeeded",
                    );
                    self.report_count(device_id, "reconnect.success").await;
                    self.report_duration(device_id, "reconnect", timer.elapsed_ms()).await;
                }
            },
            Err(e) => {
                let mut entry = self.entries.get_mut(key).unwrap();
                entry.reconnect.record_failure();
                let attempt = entry.reconnect.attempt_count();
                let delay = backoff_for_attempt(attempt);
                entry.next_attempt_at = Instant::now() + delay;
                debug!(key, attempt, error = %e, "reconnect failed");
                for device_id in &device_ids {
                    ChannelLogger::new(device_id.clone()).log_retry(attempt, delay.as_millis() as u64, &e.to_string());
                    self.report_count(device_id, "reconnect.fail").await;
                }
            },
        }
    }

    async fn report_count(&self, device_id: &DeviceId, name: &str) {
        let _ = self
            .c2s_tx
            .send(C2S::PerfCount(ChannelPerformanceCountEvent { device_id: device_id.clone(), name: name.to_string(), delta: 1 }))
            .await;
    }

    async fn report_duration(&self, device_id: &DeviceId, name: &str, duration_ms: f64) {
        let _ = self
            .c2s_tx
            .send(C2S::PerfTime(ChannelPerformanceTimeEvent { device_id: device_id.clone(), name: name.to_string(), duration_ms }))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_is_idempotent_per_key() {
        let (c2s_tx, _c2s_rx) = mpsc::channel(16);
        let pool = TransportPool::new(ReconnectPolicy::unlimited(), c2s_tx);
        let cfg = TransportConfig::Tcp { host: "127.0.0.1".into(), port: 502 };
        pool.register("tcp:127.0.0.1:502", cfg.clone(), DeviceId::from("d1"));
        pool.register("tcp:127.0.0.1:502", cfg, DeviceId::from("d2"));
        let mut ids = pool.device_ids("tcp:127.0.0.1:502");
        ids.sort();
        assert_eq!(ids, vec![DeviceId::from("d1"), DeviceId::from("d2")]);
    }

    #[test]
    fn unknown_key_has_no_state() {
        let (c2s_tx, _c2s_rx) = mpsc::channel(16);
        let pool = TransportPool::new(ReconnectPolicy::unlimited(), c2s_tx);
        assert!(pool.state("nope").is_none());
    }

    #[tokio::test]
    async fn take_before_connect_is_not_connected() {
        let (c2s_tx, _c2s_rx) = mpsc::channel(16);
        let pool = TransportPool::new(ReconnectPolicy::unlimited(), c2s_tx);
        let cfg = TransportConfig::Tcp { host: "127.0.0.1".into(), port: 1 };
        pool.register("tcp:127.0.0.1:1", cfg, DeviceId::from("d1"));
        let err = pool.take("tcp:127.0.0.1:1").await.unwrap_err();
        assert!(matches!(err, GatewayError::NotConnected));
    }

    #[tokio::test]
    async fn tick_against_unreachable_port_reschedules_with_backoff() {
        let (c2s_tx, _c2s_rx) = mpsc::channel(16);
        let pool = TransportPool::new(ReconnectPolicy::unlimited(), c2s_tx);
        let cfg = TransportConfig::Tcp { host: "127.0.0.1".into(), port: 1 };
        pool.register("tcp:127.0.0.1:1", cfg, DeviceId::from("d1"));
        pool.tick().await;
        assert_eq!(pool.state("tcp:127.0.0.1:1"), Some(ConnectionState::Disconnected));
        let entry = pool.entries.get("tcp:127.0.0.1:1").unwrap();
        assert!(entry.next_attempt_at > Instant::now() - std::time::Duration::from_millis(50));
    }

    #[tokio::test]
    async fn bounded_policy_stops_retrying_after_exhaustion() {
        let (c2s_tx, _c2s_rx) = mpsc::channel(16);
        let pool = TransportPool::new(ReconnectPolicy::bounded(2), c2s_tx);
        let cfg = TransportConfig::Tcp { host: "127.0.0.1".into(), port: 1 };
        pool.register("tcp:127.0.0.1:1", cfg, DeviceId::from("d1"));

        for _ in 0..2 {
            {
                let mut entry = pool.entries.get_mut("tcp:127.0.0.1:1").unwrap();
                entry.next_attempt_at = Instant::now();
            }
            pool.tick().await;
        }
        {
            let mut entry = pool.entries.get_mut("tcp:127.0.0.1:1").unwrap();
            entry.next_attempt_at = Instant::now();
        }
        let attempts_before = pool.entries.get("tcp:127.0.0.1:1").unwrap().reconnect.attempt_count();
        pool.tick().await;
        let attempts_after = pool.entries.get("tcp:127.0.0.1:1").unwrap().reconnect.attempt_count();
        assert_eq!(attempts_before, attempts_after, "exhausted key must not be retried again");
    }
}
