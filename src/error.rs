//! Error types for the gateway core.
//!
//! One `thiserror`-derived enum, kept `Clone` so a failed decode/request can be
//! folded into a per-tag `Variable` without consuming the original error (a session
//! emits the same failure as both a log line and a null-valued update).

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Error taxonomy for the gateway core.
#[derive(Error, Debug, Clone)]
pub enum GatewayError {
    /// Malformed PDU, wrong function code, or any other codec-local defect.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// CRC-16 mismatch while parsing an RTU frame.
    #[error("CRC mismatch")]
    CrcMismatch,

    /// Frame is shorter than its declared/implied length.
    #[error("short frame: {0}")]
    ShortFrame(String),

    /// Function code outside {1,2,3,4,5,6,15,16}.
    #[error("unsupported function code: {0:#04x}")]
    UnsupportedFunctionCode(u8),

    /// Transport connect/read/write/EOF failure. Always non-fatal to a session.
    #[error("connection error: {0}")]
    Connection(String),

    /// Not connected to a transport yet.
    #[error("not connected")]
    NotConnected,

    /// A request exceeded `request_timeout` waiting for a response.
    #[error("request timed out")]
    Timeout,

    /// Value could not be coerced into the target Modbus wire type.
    #[error("unsupported value: {0}")]
    UnsupportedValue(String),

    /// YAML/struct configuration is invalid for the offending device only.
    #[error("configuration error: {0}")]
    Config(String),

    /// Exception response received from the device (Modbus exception code).
    #[error("device exception: code {0:#04x}")]
    DeviceException(u8),

    /// Anything else that doesn't fit a more specific variant.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// True for errors that degrade a single tag to `null` / a write to
    /// `success=false`, rather than tearing down the session.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, GatewayError::Internal(_))
    }
}
