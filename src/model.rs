//! Core data model: devices, tags, actions, and the values/points that flow between
//! them. Every façade signature is `(device_id, tag_id)`-shaped; identifiers are
//! newtype-wrapped `String`s rather than raw strings or numeric ids.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::codec::byte_order::ByteOrder;

macro_rules! string_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id!(DeviceId);
string_id!(TagId);
string_id!(ActionId);

/// A value read from or written to a device. `Null` means "read attempted but
/// decode/transport failed".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayValue {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Null,
}

impl GatewayValue {
    pub fn is_null(&self) -> bool {
        matches!(self, GatewayValue::Null)
    }
}

/// Declared scalar type of a `VariableInfo`/`Push`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Bool,
    Int,
    Uint,
    Float,
}

/// Access mode for a declared point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessMode {
    R,
    Rw,
    W,
}

/// `(device_id, tag_id, value)` triple read from or written to a device.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub device_id: DeviceId,
    pub tag_id: TagId,
    pub value: GatewayValue,
}

/// Declared shape of a readable/writable point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableInfo {
    pub data_type: DataType,
    /// Register length in 16-bit words: 1, 2, or 4.
    pub length: u8,
    pub endian: ByteOrder,
    #[serde(default = "default_scale")]
    pub scale: f64,
    pub access: AccessMode,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
}

fn default_scale() -> f64 {
    1.0
}

impl VariableInfo {
    /// True iff `(data_type, length)` is one of the combinations decode/encode supports.
    pub fn is_supported_combination(&self) -> bool {
        matches!(
            (self.data_type, self.length),
            (DataType::Bool, _) | (DataType::Int, 1 | 2 | 4) | (DataType::Uint, 1 | 2 | 4) | (DataType::Float, 2 | 4)
        )
    }
}

/// Write-only action descriptor: maps an action id to a `Push` target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionInfo {
    pub push: Push,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// A single point inside a poll group's address range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointMapping {
    pub to: TagId,
    pub offset: u16,
    pub length: u8,
    pub endian: ByteOrder,
    pub data_type: DataType,
    pub access: AccessMode,
}

/// Periodic read of a contiguous address range, decoded into one or more tags.
/// Invariant: every mapping's `offset + length <= length_in_registers`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Poll {
    pub name: String,
    pub interval_ms: u64,
    pub function_code: u8,
    pub begin_address: u16,
    pub length_in_registers: u16,
    pub mapping: Vec<PointMapping>,
}

impl Poll {
    pub fn validate(&self) -> Result<(), String> {
        if !matches!(self.function_code, 1 | 2 | 3 | 4) {
            return Err(format!("poll group {} has unsupported function code {}", self.name, self.function_code));
        }
        for m in &self.mapping {
            if m.offset as u32 + m.length as u32 > self.length_in_registers as u32 {
                return Err(format!(
                    "poll group {} mapping to {} exceeds group length ({} + {} > {})",
                    self.name, m.to, m.offset, m.length, self.length_in_registers
                ));
            }
        }
        Ok(())
    }
}

/// A named write target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Push {
    pub function_code: u8,
    pub begin_address: u16,
    pub offset: u16,
    pub length: u8,
    pub endian: ByteOrder,
    pub data_type: DataType,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_validate_rejects_overflowing_mapping() {
        let poll = Poll {
            name: "p1".into(),
            interval_ms: 1000,
            function_code: 3,
            begin_address: 0,
            length_in_registers: 2,
            mapping: vec![PointMapping {
                to: "t1".into(),
                offset: 1,
                length: 2,
                endian: ByteOrder::BigEndian,
                data_type: DataType::Uint,
                access: AccessMode::R,
            }],
        };
        assert!(poll.validate().is_err());
    }

    #[test]
    fn poll_validate_accepts_exact_fit() {
        let poll = Poll {
            name: "p1".into(),
            interval_ms: 1000,
            function_code: 3,
            begin_address: 0,
            length_in_registers: 3,
            mapping: vec![PointMapping {
                to: "t1".into(),
                offset: 0,
                length: 2,
                endian: ByteOrder::BigEndian,
                data_type: DataType::Uint,
                access: AccessMode::R,
            }],
        };
        assert!(poll.validate().is_ok());
    }

    #[test]
    fn variable_info_supported_combinations() {
        let v = VariableInfo {
            data_type: DataType::Float,
            length: 2,
            endian: ByteOrder::BigEndian,
            scale: 1.0,
            access: AccessMode::R,
            display_name: None,
            unit: None,
        };
        assert!(v.is_supported_combination());

        let bad = VariableInfo { length: 3, ..v };
        assert!(!bad.is_supported_combination());
    }
}
