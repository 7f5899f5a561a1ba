//! TCP front end (C11): line-delimited client protocol.
//!
//! One task per accepted connection, mirroring the teacher's multi-client
//! TCP handling. Each connection is read incrementally until the configured
//! delimiter appears; the resulting command is parsed and dispatched to the
//! gateway (C8), and exactly one reply is written back per command.

use crate::gateway::Gateway;
use regex::Regex;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

/// Serves the gateway's `start`/`pump`/`close` protocol over TCP.
pub struct TcpFrontEnd {
    gateway: Arc<Gateway>,
    delimiter: u8,
    port_pattern: Regex,
}

fn submission_time_now() -> i128 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_nanos() as i128).unwrap_or(0)
}

impl TcpFrontEnd {
    pub fn new(gateway: Arc<Gateway>, delimiter: char) -> Self {
        Self {
            gateway,
            delimiter: delimiter as u8,
            port_pattern: Regex::new(r"^(/[a-z]+/[A-Za-z0-9]+|COM\d+)$").unwrap(),
        }
    }

    /// Bind `addr` and accept connections until the process is interrupted.
    pub async fn run(self: Arc<Self>, addr: &str) -> std::io::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        info!("listening on {addr}");

        loop {
            let (stream, peer) = listener.accept().await?;
            debug!("accepted connection from {peer}");
            let front_end = Arc::clone(&self);
            tokio::spawn(async move {
                front_end.handle_connection(stream).await;
            });
        }
    }

    async fn handle_connection(&self, mut stream: TcpStream) {
        let mut buffer = Vec::new();
        let mut chunk = [0u8; 4096];

        loop {
            let n = match stream.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    warn!("connection read failed: {e}");
                    break;
                }
            };
            buffer.extend_from_slice(&chunk[..n]);

            while let Some(pos) = buffer.iter().position(|&b| b == self.delimiter) {
                let line: Vec<u8> = buffer.drain(..=pos).collect();
                let command_text = String::from_utf8_lossy(&line[..line.len() - 1]).trim().to_string();
                if command_text.is_empty() {
                    continue;
                }
                let reply = self.dispatch(&command_text).await;
                if let Err(e) = stream.write_all(format!("{reply}\n").as_bytes()).await {
                    error!("failed to write reply: {e}");
                    return;
                }
            }
        }
    }

    async fn dispatch(&self, command_text: &str) -> String {
        let mut tokens = command_text.splitn(3, ' ');
        match (tokens.next(), tokens.next(), tokens.next()) {
            (Some("start"), Some(port), None) if self.port_pattern.is_match(port) => self.gateway.start(port).await,
            (Some("pump"), Some(port), Some(command)) if self.port_pattern.is_match(port) => {
                self.gateway.pump(port, command, submission_time_now()).await
            }
            (Some("close"), Some(port), None) if self.port_pattern.is_match(port) => self.gateway.close(port).await,
            _ => "Invalid message".to_string(),
        }
    }
}
