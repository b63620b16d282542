//! YAML-deserializable configuration structs. No hot reload, no layered env
//! overrides — a single YAML document is loaded once at startup via
//! [`ServiceConfig::from_yaml_str`] / [`ServiceConfig::from_yaml_file`].

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, Result};
use crate::model::{ActionInfo, Poll, Push, TagId, VariableInfo};

/// Transport endpoint a device's channel connects over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportConfig {
    Tcp { host: String, port: u16 },
    #[serde(rename = "unixsocket")]
    UnixSocket { path: String },
}

impl TransportConfig {
    /// Registry key for the transport pool: `tcp:host:port` / `unix:path`.
    pub fn pool_key(&self) -> String {
        match self {
            TransportConfig::Tcp { host, port } => format!("tcp:{host}:{port}"),
            TransportConfig::UnixSocket { path } => format!("unix:{path}"),
        }
    }
}

/// Per-device channel configuration: adapter discriminator, framing mode, unit id,
/// and the transport it rides on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub adapter: String,
    #[serde(default)]
    pub is_rtu: bool,
    pub unit_id: u8,
    pub transport: TransportConfig,
}

/// One entry in the service device list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub name: String,
    pub template: String,
    pub channel: ChannelConfig,
}

/// Top-level service configuration: the device list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ServiceConfig {
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

/// Template metadata block (`template.info`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateInfo {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// A declared point: either a readable/writable variable or a write-only action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PointDef {
    Variable(VariableInfo),
    Action(ActionInfo),
}

/// The `template.template` block: adapter discriminator plus poll/push lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterTemplate {
    pub adapter: String,
    #[serde(default)]
    pub polls: Vec<Poll>,
    #[serde(default)]
    pub pushes: Vec<Push>,
}

/// A device template: point declarations plus the poll/push schedule that realizes
/// them over the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateConfig {
    pub info: TemplateInfo,
    #[serde(default)]
    pub meta: HashMap<String, String>,
    pub points: HashMap<TagId, PointDef>,
    pub template: AdapterTemplate,
}

impl TemplateConfig {
    /// Every poll group's mappings must fit inside its own address range.
    pub fn validate(&self) -> Result<()> {
        for poll in &self.template.polls {
            poll.validate().map_err(GatewayError::Config)?;
        }
        Ok(())
    }
}

impl ServiceConfig {
    pub fn from_yaml_str(s: &str) -> Result<Self> {
        serde_yaml::from_str(s).map_err(|e| GatewayError::Config(format!("service config: {e}")))
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|e| GatewayError::Config(format!("reading {}: {e}", path.as_ref().display())))?;
        Self::from_yaml_str(&text)
    }
}

impl TemplateConfig {
    pub fn from_yaml_str(s: &str) -> Result<Self> {
        let cfg: Self = serde_yaml::from_str(s).map_err(|e| GatewayError::Config(format!("template config: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|e| GatewayError::Config(format!("reading {}: {e}", path.as_ref().display())))?;
        Self::from_yaml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tcp_device_config() {
        let yaml = r#"
devices:
  - name: plc-1
    template: plc-basic
    channel:
      adapter: modbus
      is_rtu: false
      unit_id: 1
      transport:
        type: tcp
        host: 10.0.0.5
        port: 502
"#;
        let cfg = ServiceConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(cfg.devices.len(), 1);
        assert_eq!(cfg.devices[0].channel.transport.pool_key(), "tcp:10.0.0.5:502");
    }

    #[test]
    fn parses_unixsocket_device_config() {
        let yaml = r#"
devices:
  - name: plc-2
    template: plc-basic
    channel:
      adapter: modbus
      is_rtu: true
      unit_id: 3
      transport:
        type: unixsocket
        path: /tmp/modbus.sock
"#;
        let cfg = ServiceConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(cfg.devices[0].channel.transport.pool_key(), "unix:/tmp/modbus.sock");
    }

    #[test]
    fn template_with_overflowing_poll_is_rejected() {
        let yaml = r#"
info:
  name: plc-basic
  version: "1.0"
points: {}
template:
  adapter: modbus
  polls:
    - name: main
      interval_ms: 1000
      function_code: 3
      begin_address: 0
      length_in_registers: 1
      mapping:
        - to: temp
          offset: 0
          length: 2
          endian: ABCD
          data_type: float
          access: r
  pushes: []
"#;
        assert!(TemplateConfig::from_yaml_str(yaml).is_err());
    }
}
