//! Property 7: a well-formed config round-trips through the loader, and a
//! config referencing an undeclared placeholder is rejected at load time.

use pump_gateway::{GatewayConfig, GatewayError};
use std::io::Write;

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn well_formed_config_round_trips() {
    let file = write_config(
        r#"{
            "server_config": {"delimiter": "!", "ip": "127.0.0.1", "port": 9100, "max_pumps": 2, "loopback": true},
            "pump_config": {
                "serial_port_config": {"baud_rate": 19200},
                "crc_config": null,
                "command_set": {"ALARM": {"response": "ALARM"}},
                "arguments": {}
            }
        }"#,
    );

    let config = GatewayConfig::load(file.path()).unwrap();
    assert_eq!(config.server_config.port, 9100);
    assert_eq!(config.pump_config.command_set.len(), 1);
    assert!(config.pump_config.command_set.contains_key("ALARM"));
}

#[test]
fn undeclared_placeholder_is_rejected_at_load_time() {
    let file = write_config(
        r#"{
            "server_config": {},
            "pump_config": {
                "serial_port_config": {"baud_rate": 9600},
                "crc_config": null,
                "command_set": {"X^<MISSING>": {"response": "X^<MISSING>"}},
                "arguments": {}
            }
        }"#,
    );

    let err = GatewayConfig::load(file.path()).unwrap_err();
    assert!(matches!(err, GatewayError::Config(_)));
}

#[test]
fn missing_file_is_a_config_error() {
    let err = GatewayConfig::load(std::path::Path::new("/nonexistent/config.json")).unwrap_err();
    assert!(matches!(err, GatewayError::Config(_)));
}
