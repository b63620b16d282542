//! Pooled, reconnecting transport layer plus the exact-schedule
//! backoff helper it drives.

pub mod pool;
pub mod reconnect;

pub use pool::{ConnectionEntry, TransportHandle, TransportPool};
pub use reconnect::{ConnectionState, ReconnectHelper, ReconnectPolicy};
