//! Real serial transport (C9), behind the `serial` feature.
//!
//! A `Transport` over an actual serial device using `tokio-serial`. It knows
//! nothing about grammar or framing — it is a byte pipe with a
//! terminator-aware read loop and a configured timeout, so `read_until`
//! yields an empty buffer on timeout exactly like the loopback (C6), and the
//! pump session's retry/disconnect logic applies uniformly to both.

use crate::config::SerialPortConfig;
use crate::error::GatewayError;
use crate::transport::Transport;
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{Mutex, Notify};
use tokio_serial::{DataBits, Parity, SerialPortBuilderExt, SerialStream, StopBits};

pub struct SerialTransport {
    port: Mutex<SerialStream>,
    timeout: Duration,
    cancel: Notify,
}

impl SerialTransport {
    pub fn open(path: &str, config: &SerialPortConfig) -> Result<Self, GatewayError> {
        let data_bits = match config.data_bits {
            5 => DataBits::Five,
            6 => DataBits::Six,
            7 => DataBits::Seven,
            _ => DataBits::Eight,
        };
        let stop_bits = match config.stop_bits {
            2 => StopBits::Two,
            _ => StopBits::One,
        };
        let parity = match config.parity.to_lowercase().as_str() {
            "odd" => Parity::Odd,
            "even" => Parity::Even,
            _ => Parity::None,
        };

        let port = tokio_serial::new(path, config.baud_rate)
            .data_bits(data_bits)
            .stop_bits(stop_bits)
            .parity(parity)
            .open_native_async()
            .map_err(|e| GatewayError::Transport(format!("Failed to open serial port {path}: {e}")))?;

        Ok(Self {
            port: Mutex::new(port),
            timeout: Duration::from_millis(config.read_timeout_ms),
            cancel: Notify::new(),
        })
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn write(&self, bytes: &[u8]) -> Result<(), GatewayError> {
        self.port
            .lock()
            .await
            .write_all(bytes)
            .await
            .map_err(|e| GatewayError::Transport(format!("serial write failed: {e}")))
    }

    async fn read_until(&self, terminator: u8) -> Result<Vec<u8>, GatewayError> {
        let mut buffer = Vec::new();
        let mut byte = [0u8; 1];
        let mut port = self.port.lock().await;

        loop {
            let read = tokio::select! {
                result = tokio::time::timeout(self.timeout, port.read_exact(&mut byte)) => result,
                _ = self.cancel.notified() => return Ok(Vec::new()),
            };
            match read {
                Ok(Ok(_)) => {
                    buffer.push(byte[0]);
                    if byte[0] == terminator {
                        return Ok(buffer);
                    }
                }
                Ok(Err(e)) => return Err(GatewayError::Transport(format!("serial read failed: {e}"))),
                Err(_elapsed) => return Ok(Vec::new()),
            }
        }
    }

    async fn close(&self) -> Result<(), GatewayError> {
        self.cancel.notify_waiters();
        Ok(())
    }

    fn cancel_read(&self) {
        self.cancel.notify_waiters();
    }
}
