//! Configuration loader (C10).
//!
//! Deserializes `config.json` into the structures the grammar compiler (C4),
//! pump session (C7), and gateway (C8) consume, and validates structural
//! invariants eagerly — a command template referencing an undeclared
//! placeholder is a load-time `ConfigError`, not a first-use surprise, since
//! the grammar is compiled once per session (`SPEC_FULL.md` §4.4, §4.10).

use crate::crc::CrcConfig;
use crate::error::GatewayError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// One argument's accepted `values`, either a spec string or a literal list.
///
/// `serde(untagged)` lets `config.json` write either `"values": "int(2)"` or
/// `"values": ["ml", "ml/h"]` without a discriminant field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgumentValues {
    Spec(String),
    Literals(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgumentDescriptor {
    pub values: ArgumentValues,
}

/// A configured command's response template.
///
/// When `response` equals the command's own template string, the loopback
/// treats it as an echo (§4.6) rather than instantiating placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub response: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialPortConfig {
    pub baud_rate: u32,
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    #[serde(default = "default_parity")]
    pub parity: String,
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

fn default_data_bits() -> u8 {
    8
}

fn default_parity() -> String {
    "none".to_string()
}

fn default_stop_bits() -> u8 {
    1
}

fn default_read_timeout_ms() -> u64 {
    3000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PumpConfig {
    pub serial_port_config: SerialPortConfig,
    pub crc_config: Option<CrcConfig>,
    pub command_set: HashMap<String, CommandSpec>,
    pub arguments: HashMap<String, ArgumentDescriptor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    #[serde(default = "default_ip")]
    pub ip: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_max_pumps")]
    pub max_pumps: usize,
    #[serde(default)]
    pub loopback: bool,
}

fn default_delimiter() -> char {
    '!'
}

fn default_ip() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    9000
}

fn default_max_pumps() -> usize {
    16
}

/// The fully-validated top-level configuration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub server_config: ServerConfig,
    pub pump_config: PumpConfig,
}

impl GatewayConfig {
    /// Parse and structurally validate a configuration document.
    ///
    /// Every `<PLACEHOLDER>` referenced by a command template must have a
    /// matching entry in `arguments`; this mirrors the check the grammar
    /// compiler performs per template, run here once over the whole set so
    /// a bad config fails at load time rather than on the first `pump`.
    pub fn parse(raw: &str) -> Result<Self, GatewayError> {
        let config: GatewayConfig =
            serde_json::from_str(raw).map_err(|e| GatewayError::Config(format!("Invalid config.json: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate configuration from a file path.
    pub fn load(path: &Path) -> Result<Self, GatewayError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| GatewayError::Config(format!("Cannot read config file {}: {e}", path.display())))?;
        Self::parse(&raw)
    }

    fn validate(&self) -> Result<(), GatewayError> {
        for template in self.pump_config.command_set.keys() {
            for placeholder in template.split('^').skip(1) {
                if !self.pump_config.arguments.contains_key(placeholder) {
                    return Err(GatewayError::Config(format!(
                        "Provided argument from command is not described in arguments part in config.json. Command: {template}"
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_json() -> &'static str {
        r#"{
            "server_config": {"delimiter": "!", "ip": "127.0.0.1", "port": 9001, "max_pumps": 4, "loopback": true},
            "pump_config": {
                "serial_port_config": {"baud_rate": 9600},
                "crc_config": {"width": 16, "polynomial": 4129, "init_value": 65535, "final_xor_value": 0, "reverse_input": false, "reverse_output": false},
                "command_set": {
                    "ALARM": {"response": "ALARM"},
                    "DRUG_LIB^<QUANTITY>": {"response": "DRUG_LIB^<QUANTITY>"}
                },
                "arguments": {
                    "<QUANTITY>": {"values": "int(2)"}
                }
            }
        }"#
    }

    #[test]
    fn round_trips_command_set_and_arguments() {
        let config = GatewayConfig::parse(sample_json()).unwrap();
        assert_eq!(config.server_config.port, 9001);
        assert!(config.server_config.loopback);
        assert_eq!(config.pump_config.command_set.len(), 2);
        assert!(config.pump_config.arguments.contains_key("<QUANTITY>"));
    }

    #[test]
    fn accepts_literal_list_values() {
        let json = r#"{
            "server_config": {},
            "pump_config": {
                "serial_port_config": {"baud_rate": 9600},
                "crc_config": null,
                "command_set": {"UNIT^<UNIT>": {"response": "UNIT^<UNIT>"}},
                "arguments": {"<UNIT>": {"values": ["ml", "ml/h"]}}
            }
        }"#;
        let config = GatewayConfig::parse(json).unwrap();
        match &config.pump_config.arguments["<UNIT>"].values {
            ArgumentValues::Literals(list) => assert_eq!(list, &vec!["ml".to_string(), "ml/h".to_string()]),
            ArgumentValues::Spec(_) => panic!("expected literal list"),
        }
    }

    #[test]
    fn rejects_undeclared_placeholder_at_load_time() {
        let json = r#"{
            "server_config": {},
            "pump_config": {
                "serial_port_config": {"baud_rate": 9600},
                "crc_config": null,
                "command_set": {"X^<MISSING>": {"response": "X^<MISSING>"}},
                "arguments": {}
            }
        }"#;
        let err = GatewayConfig::parse(json).unwrap_err();
        assert!(matches!(err, GatewayError::Config(_)));
    }

    #[test]
    fn rejects_malformed_json() {
        let err = GatewayConfig::parse("not json").unwrap_err();
        assert!(matches!(err, GatewayError::Config(_)));
    }
}
