//! Pump gateway.
//!
//! A multiplexing bridge between TCP clients and serially-attached infusion
//! pumps: validates outgoing commands against a configured grammar, frames
//! them with a hex/CRC envelope, transmits them over a byte transport (real
//! serial or a loopback simulator), and returns one textual reply per
//! command to the originating client.

pub mod cli;
pub mod config;
pub mod crc;
pub mod error;
pub mod frame;
pub mod gateway;
pub mod grammar;
pub mod hex;
pub mod loopback;
pub mod random;
#[cfg(feature = "serial")]
pub mod serial;
pub mod server;
pub mod session;
pub mod transport;

pub use config::GatewayConfig;
pub use error::GatewayError;
pub use gateway::Gateway;
pub use server::TcpFrontEnd;

/// The current version of the gateway.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
