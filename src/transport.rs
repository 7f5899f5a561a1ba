//! Transport abstraction (C5).
//!
//! A minimal byte pipe that both the real serial port (C9) and the loopback
//! simulator (C6) implement, so the pump session (C7) never knows which one
//! it is talking to.

use crate::error::GatewayError;
use async_trait::async_trait;

/// Byte-level transport to a pump device, real or simulated.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Submit bytes to the device.
    async fn write(&self, bytes: &[u8]) -> Result<(), GatewayError>;

    /// Read until `terminator` is observed, or the transport's own timeout
    /// elapses, in which case an empty buffer is returned rather than an
    /// error — callers (C7) treat an empty read as a timeout uniformly.
    async fn read_until(&self, terminator: u8) -> Result<Vec<u8>, GatewayError>;

    /// Release the underlying device handle.
    async fn close(&self) -> Result<(), GatewayError>;

    /// Best-effort wake of a pending `read_until`.
    fn cancel_read(&self);
}
