//! End-to-end scenarios against the loopback transport, through the gateway.

use pump_gateway::config::{ArgumentDescriptor, ArgumentValues, CommandSpec, GatewayConfig, PumpConfig, SerialPortConfig, ServerConfig};
use pump_gateway::crc::CrcConfig;
use pump_gateway::gateway::Gateway;
use pump_gateway::random::test_support::ScriptedRandom;
use std::collections::HashMap;
use std::sync::Arc;

fn crc16_ccitt_false() -> CrcConfig {
    CrcConfig { width: 16, polynomial: 0x1021, init_value: 0xFFFF, final_xor_value: 0x0000, reverse_input: false, reverse_output: false }
}

fn config(crc: Option<CrcConfig>) -> GatewayConfig {
    let mut command_set = HashMap::new();
    command_set.insert("ALARM".to_string(), CommandSpec { response: "ALARM".to_string() });
    command_set.insert("DRUG_LIB^<QUANTITY>".to_string(), CommandSpec { response: "DRUG_LIB^<QUANTITY>".to_string() });

    let mut arguments = HashMap::new();
    arguments.insert("<QUANTITY>".to_string(), ArgumentDescriptor { values: ArgumentValues::Spec("int(2)".to_string()) });

    GatewayConfig {
        server_config: ServerConfig { delimiter: '!', ip: "127.0.0.1".to_string(), port: 0, max_pumps: 4, loopback: true },
        pump_config: PumpConfig {
            serial_port_config: SerialPortConfig { baud_rate: 9600, data_bits: 8, parity: "none".to_string(), stop_bits: 1, read_timeout_ms: 3000 },
            crc_config: crc,
            command_set,
            arguments,
        },
    }
}

#[tokio::test]
async fn s1_echo() {
    let gateway = Gateway::with_random(&config(Some(crc16_ccitt_false())), Arc::new(ScriptedRandom::new(vec![40])));
    gateway.start("COM1").await;
    let response = gateway.pump("COM1", "ALARM", 1).await;
    assert_eq!(response, "ACK: ALARM");
}

#[tokio::test]
async fn s2_grammar_rejection() {
    let gateway = Gateway::with_random(&config(None), Arc::new(ScriptedRandom::new(vec![40])));
    gateway.start("COM1").await;
    let response = gateway.pump("COM1", "DRUG_LIB^100", 1).await;
    assert!(response.starts_with("ERROR:"));
    assert!(response.contains("does not exist"));
}

#[tokio::test]
async fn s3_unknown_command() {
    let gateway = Gateway::with_random(&config(None), Arc::new(ScriptedRandom::new(vec![40])));
    gateway.start("COM1").await;
    let response = gateway.pump("COM1", "NON_EXISTENT", 1).await;
    assert_eq!(response, "ERROR: Provided command pattern does not exist in config.json. Command: NON_EXISTENT");
}

#[tokio::test(start_paused = true)]
async fn s4_timeout_then_recovery() {
    // First read_until draw (3) forces the 3.1s-then-empty timeout branch;
    // the retry's draw (40) lands in the default branch and returns the
    // stored echo response.
    let gateway = Gateway::with_random(&config(None), Arc::new(ScriptedRandom::new(vec![3, 40])));
    gateway.start("COM1").await;
    let response = gateway.pump("COM1", "ALARM", 1).await;
    assert_eq!(response, "ACK: ALARM");
}

#[tokio::test(start_paused = true)]
async fn s5_disconnection() {
    // Two consecutive outcome-3 draws: both reads time out at >= 3s.
    let gateway = Gateway::with_random(&config(None), Arc::new(ScriptedRandom::new(vec![3, 3])));
    gateway.start("COM1").await;
    let response = gateway.pump("COM1", "ALARM", 1).await;
    assert!(response.contains("Device disconnected"));
    // The session is removed from the registry once killed.
    let second = gateway.pump("COM1", "ALARM", 2).await;
    assert_eq!(second, "No pump initialized at port COM1");
}

#[tokio::test]
async fn s6_escape_bypasses_grammar() {
    let gateway = Gateway::with_random(&config(None), Arc::new(ScriptedRandom::new(vec![40])));
    gateway.start("COM1").await;
    let response = gateway.pump("COM1", "\u{1B}", 1).await;
    assert_eq!(response, "Escape character sent. Aborting all current actions.");
}
