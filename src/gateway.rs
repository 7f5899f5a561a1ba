//! Gateway (C8): registry of `port_id -> session`, routing `start`/`pump`/`close`.

use crate::config::{GatewayConfig, PumpConfig};
use crate::crc::CrcEngine;
use crate::error::GatewayError;
use crate::grammar::Grammar;
use crate::loopback::LoopbackTransport;
use crate::random::{RandomSource, ThreadRandom};
use crate::session::PumpSession;
use crate::transport::Transport;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

#[cfg(feature = "serial")]
use crate::serial::SerialTransport;

/// Owns every live pump session, keyed by port identifier (e.g. `COM3`).
pub struct Gateway {
    pump_config: PumpConfig,
    loopback: bool,
    max_pumps: usize,
    random: Arc<dyn RandomSource>,
    sessions: Mutex<HashMap<String, Arc<PumpSession>>>,
}

impl Gateway {
    pub fn new(config: &GatewayConfig) -> Self {
        Self {
            pump_config: config.pump_config.clone(),
            loopback: config.server_config.loopback,
            max_pumps: config.server_config.max_pumps,
            random: Arc::new(ThreadRandom),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// As [`Gateway::new`], but with an injectable [`RandomSource`] for
    /// deterministic loopback behavior in tests.
    pub fn with_random(config: &GatewayConfig, random: Arc<dyn RandomSource>) -> Self {
        Self {
            pump_config: config.pump_config.clone(),
            loopback: config.server_config.loopback,
            max_pumps: config.server_config.max_pumps,
            random,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// `start PORT`: create a session for `port` if capacity allows.
    pub async fn start(&self, port: &str) -> String {
        let mut sessions = self.sessions.lock().await;
        if sessions.contains_key(port) {
            return format!("Pump handler started for port {port}");
        }
        if sessions.len() >= self.max_pumps {
            return GatewayError::Config(format!("Maximum number of pumps ({}) already started", self.max_pumps))
                .as_response();
        }

        let crc = self.pump_config.crc_config.map(CrcEngine::new);
        let grammar = match Grammar::compile(&self.pump_config.command_set, &self.pump_config.arguments) {
            Ok(grammar) => grammar,
            Err(e) => return e.as_response(),
        };
        let transport = match self.build_transport(port) {
            Ok(transport) => transport,
            Err(e) => return e.as_response(),
        };

        let session = Arc::new(PumpSession::new(transport, crc, grammar));
        sessions.insert(port.to_string(), session);
        info!("pump started on port {port}");
        format!("Pump handler started for port {port}")
    }

    fn build_transport(&self, port: &str) -> Result<Arc<dyn Transport>, GatewayError> {
        if self.loopback {
            return Ok(Arc::new(LoopbackTransport::new(
                self.pump_config.command_set.clone(),
                self.pump_config.arguments.clone(),
                self.pump_config.crc_config.map(CrcEngine::new),
                Arc::clone(&self.random),
            )));
        }

        #[cfg(feature = "serial")]
        {
            return SerialTransport::open(port, &self.pump_config.serial_port_config)
                .map(|t| Arc::new(t) as Arc<dyn Transport>);
        }

        #[cfg(not(feature = "serial"))]
        {
            Err(GatewayError::Transport(format!("Serial support not built for port {port}")))
        }
    }

    /// `pump PORT COMMAND`: forward one command, return exactly one response.
    pub async fn pump(&self, port: &str, command_text: &str, submission_time: i128) -> String {
        let session = {
            let sessions = self.sessions.lock().await;
            sessions.get(port).cloned()
        };
        let Some(session) = session else {
            return format!("No pump initialized at port {port}");
        };

        if let Err(e) = session.push(command_text.to_string(), submission_time).await {
            return e.as_response();
        }
        let response = match session.get_response().await {
            Ok(response) => response,
            Err(e) => e.as_response(),
        };

        if session.is_killed() {
            self.sessions.lock().await.remove(port);
            return format!("{response} (pump at port {port} disconnected and was removed)");
        }
        response
    }

    /// `close PORT`: close and remove the session for `port`.
    pub async fn close(&self, port: &str) -> String {
        let session = self.sessions.lock().await.remove(port);
        match session {
            Some(session) => {
                let _ = session.close().await;
                format!("Pump at port {port} is closed")
            }
            None => format!("No pump initialized at port {port}"),
        }
    }
}
