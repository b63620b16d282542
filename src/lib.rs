//! Industrial Modbus TCP/RTU polling gateway core.
//!
//! Layering, bottom to top:
//! - [`codec`]: wire-level PDU encode/decode, TCP/RTU framing, value coercion.
//! - [`transport`]: keyed socket pool with a fixed-schedule reconnect scheduler.
//! - [`client`]: request/response correlation over one pooled transport.
//! - [`session`]: per-device poll scheduling and write dispatch.
//! - [`worker`]: per-protocol-family task owning a transport pool and its sessions.
//! - [`gateway`]: host-side façade — value map, write-ack queue, worker supervision.

pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod events;
pub mod gateway;
pub mod logger;
pub mod model;
pub mod perf;
pub mod session;
pub mod transport;
pub mod worker;

pub use error::{GatewayError, Result};
pub use gateway::Gateway;
pub use model::{ActionId, DeviceId, GatewayValue, TagId};
