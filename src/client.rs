//! Modbus client: request/response correlator over a pooled byte transport.
//!
//! One background task owns the socket halves and the inflight table; callers
//! submit over an `mpsc` channel and await a `oneshot` for their specific response,
//! so `Client` itself is `Clone`-free but cheaply shareable via its command sender.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::codec::message::Pdu;
use crate::codec::pdu::ModbusPdu;
use crate::codec::{rtu, tcp};
use crate::codec::constants::MODBUS_RESPONSE_BUFFER_SIZE;
use crate::error::{GatewayError, Result};
use crate::transport::pool::{TransportHandle, TransportPool};

/// Wire framing a client instance speaks. RTU forces `in_flight_limit = 1`
/// (sequential, slot key `0`); TCP keys inflight slots by transaction id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    Tcp,
    Rtu,
}

enum FramerState {
    Tcp(tcp::TcpFramer),
    Rtu(rtu::RtuFramer),
}

impl FramerState {
    fn new(framing: Framing) -> Self {
        match framing {
            Framing::Tcp => FramerState::Tcp(tcp::TcpFramer::new()),
            Framing::Rtu => FramerState::Rtu(rtu::RtuFramer::new()),
        }
    }

    fn feed(&mut self, data: &[u8]) {
        match self {
            FramerState::Tcp(f) => f.feed(data),
            FramerState::Rtu(f) => f.feed(data),
        }
    }

    /// Next frame, normalized to `(slot_key, pdu)`: TCP keys by transaction id,
    /// RTU always keys `0` (single in-flight slot, no transaction id on the wire).
    fn next_raw(&mut self) -> Result<Option<(u16, ModbusPdu)>> {
        match self {
            FramerState::Tcp(f) => Ok(f.next_frame()?.map(|frame| (frame.transaction_id, frame.pdu))),
            FramerState::Rtu(f) => Ok(f.next_frame(rtu::Direction::Response)?.map(|frame| (0u16, frame.pdu))),
        }
    }
}

enum Command {
    Submit { key: u16, unit_id: u8, fc: u8, raw: ModbusPdu, reply: oneshot::Sender<Result<Pdu>> },
    Cancel(u16),
}

/// Modbus client bound to one transport handle. Owns no socket state directly;
/// everything lives in the background task spawned by [`Client::new`].
pub struct Client {
    cmd_tx: mpsc::Sender<Command>,
    request_timeout: Duration,
    framing: Framing,
    next_tid: std::sync::atomic::AtomicU16,
}

impl Client {
    /// `pool`/`key` identify the transport this client's socket came from, so its
    /// background task can report the socket dead on EOF/IO error.
    pub fn new(handle: TransportHandle, framing: Framing, request_timeout: Duration, pool: Arc<TransportPool>, key: String) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        tokio::spawn(run(handle, framing, cmd_rx, pool, key));
        Self { cmd_tx, request_timeout, framing, next_tid: std::sync::atomic::AtomicU16::new(0) }
    }

    fn next_key(&self) -> u16 {
        match self.framing {
            Framing::Tcp => self.next_tid.fetch_add(1, std::sync::atomic::Ordering::Relaxed),
            Framing::Rtu => 0,
        }
    }

    /// Submit one request, wait up to `request_timeout` for the matching response.
    pub async fn request(&self, unit_id: u8, pdu: Pdu) -> Result<Pdu> {
        let fc = pdu.function_code();
        let raw = pdu.encode()?;
        let key = self.next_key();
        let (reply_tx, reply_rx) = oneshot::channel();

        self.cmd_tx
            .send(Command::Submit { key, unit_id, fc, raw, reply: reply_tx })
            .await
            .map_err(|_| GatewayError::NotConnected)?;

        match tokio::time::timeout(self.request_timeout, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(GatewayError::Connection("client task stopped".into())),
            Err(_elapsed) => {
                let _ = self.cmd_tx.send(Command::Cancel(key)).await;
                Err(GatewayError::Timeout)
            },
        }
    }

    pub async fn read_coils(&self, unit_id: u8, address: u16, count: u16) -> Result<Vec<bool>> {
        match self.request(unit_id, Pdu::ReadCoilsReq { address, count }).await? {
            Pdu::ReadCoilsResp { values } => Ok(values),
            Pdu::Error { exception_code, .. } => Err(GatewayError::DeviceException(exception_code)),
            other => Err(GatewayError::Protocol(format!("unexpected response {other:?}"))),
        }
    }

    pub async fn read_discrete_inputs(&self, unit_id: u8, address: u16, count: u16) -> Result<Vec<bool>> {
        match self.request(unit_id, Pdu::ReadDiscreteInputsReq { address, count }).await? {
            Pdu::ReadDiscreteInputsResp { values } => Ok(values),
            Pdu::Error { exception_code, .. } => Err(GatewayError::DeviceException(exception_code)),
            other => Err(GatewayError::Protocol(format!("unexpected response {other:?}"))),
        }
    }

    pub async fn read_holding_registers(&self, unit_id: u8, address: u16, count: u16) -> Result<Vec<u16>> {
        match self.request(unit_id, Pdu::ReadHoldingRegistersReq { address, count }).await? {
            Pdu::ReadHoldingRegistersResp { registers } => Ok(registers),
            Pdu::Error { exception_code, .. } => Err(GatewayError::DeviceException(exception_code)),
            other => Err(GatewayError::Protocol(format!("unexpected response {other:?}"))),
        }
    }

    pub async fn read_input_registers(&self, unit_id: u8, address: u16, count: u16) -> Result<Vec<u16>> {
        match self.request(unit_id, Pdu::ReadInputRegistersReq { address, count }).await? {
            Pdu::ReadInputRegistersResp { registers } => Ok(registers),
            Pdu::Error { exception_code, .. } => Err(GatewayError::DeviceException(exception_code)),
            other => Err(GatewayError::Protocol(format!("unexpected response {other:?}"))),
        }
    }

    /// `true` iff the echoed value matches the requested one.
    pub async fn write_single_coil(&self, unit_id: u8, address: u16, value: bool) -> Result<bool> {
        match self.request(unit_id, Pdu::WriteSingleCoilReq { address, value }).await? {
            Pdu::WriteSingleCoilResp { value: echoed, .. } => Ok(echoed == value),
            Pdu::Error { exception_code, .. } => Err(GatewayError::DeviceException(exception_code)),
            other => Err(GatewayError::Protocol(format!("unexpected response {other:?}"))),
        }
    }

    pub async fn write_single_register(&self, unit_id: u8, address: u16, value: u16) -> Result<bool> {
        match self.request(unit_id, Pdu::WriteSingleRegisterReq { address, value }).await? {
            Pdu::WriteSingleRegisterResp { value: echoed, .. } => Ok(echoed == value),
            Pdu::Error { exception_code, .. } => Err(GatewayError::DeviceException(exception_code)),
            other => Err(GatewayError::Protocol(format!("unexpected response {other:?}"))),
        }
    }

    pub async fn write_multiple_registers(&self, unit_id: u8, address: u16, values: Vec<u16>) -> Result<bool> {
        let count = values.len() as u16;
        match self.request(unit_id, Pdu::WriteMultipleRegistersReq { address, values }).await? {
            Pdu::WriteMultipleRegistersResp { count: echoed, .. } => Ok(echoed == count),
            Pdu::Error { exception_code, .. } => Err(GatewayError::DeviceException(exception_code)),
            other => Err(GatewayError::Protocol(format!("unexpected response {other:?}"))),
        }
    }

    pub async fn write_multiple_coils(&self, unit_id: u8, address: u16, values: Vec<bool>) -> Result<bool> {
        let count = values.len() as u16;
        match self.request(unit_id, Pdu::WriteMultipleCoilsReq { address, values }).await? {
            Pdu::WriteMultipleCoilsResp { count: echoed, .. } => Ok(echoed == count),
            Pdu::Error { exception_code, .. } => Err(GatewayError::DeviceException(exception_code)),
            other => Err(GatewayError::Protocol(format!("unexpected response {other:?}"))),
        }
    }
}

async fn run(handle: TransportHandle, framing: Framing, mut cmd_rx: mpsc::Receiver<Command>, pool: Arc<TransportPool>, key: String) {
    let TransportHandle { mut reader, mut writer } = handle;
    let mut framer = FramerState::new(framing);
    let mut inflight: HashMap<u16, (u8, oneshot::Sender<Result<Pdu>>)> = HashMap::new();
    let mut read_buf = vec![0u8; MODBUS_RESPONSE_BUFFER_SIZE];
    let mut broken = false;

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    None => break,
                    Some(Command::Cancel(key)) => {
                        inflight.remove(&key);
                    },
                    Some(Command::Submit { key, unit_id, fc, raw, reply }) => {
                        let bytes = match framing {
                            Framing::Tcp => tcp::serialize(key, unit_id, &raw),
                            Framing::Rtu => rtu::serialize(unit_id, &raw),
                        };
                        inflight.insert(key, (fc, reply));
                        if let Err(e) = writer.write_all(&bytes).await {
                            if let Some((_, reply)) = inflight.remove(&key) {
                                let _ = reply.send(Err(GatewayError::Connection(e.to_string())));
                            }
                            broken = true;
                            break;
                        }
                    },
                }
            },
            n = reader.read(&mut read_buf) => {
                match n {
                    Ok(0) => {
                        debug!("transport EOF, client task stopping");
                        broken = true;
                        break;
                    },
                    Ok(n) => {
                        framer.feed(&read_buf[..n]);
                        loop {
                            match framer.next_raw() {
                                Ok(Some((key, raw_pdu))) => {
                                    if let Some((fc, reply)) = inflight.remove(&key) {
                                        let _ = reply.send(Pdu::decode_response(&raw_pdu, fc));
                                    }
                                },
                                Ok(None) => break,
                                Err(GatewayError::CrcMismatch) => {
                                    warn!("RTU CRC mismatch, resyncing");
                                    continue;
                                },
                                Err(e) => {
                                    warn!(error = %e, "frame parse error, waiting for more data");
                                    break;
                                },
                            }
                        }
                    },
                    Err(e) => {
                        warn!(error = %e, "transport read error, client task stopping");
                        broken = true;
                        break;
                    },
                }
            },
        }
    }

    for (_, (_, reply)) in inflight.drain() {
        let _ = reply.send(Err(GatewayError::Connection("transport closed".into())));
    }

    if broken {
        pool.mark_broken(&key).await;
    }
}
