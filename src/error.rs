//! Error taxonomy for the protocol engine.
//!
//! Every fallible operation in the core (grammar compilation, framing, CRC
//! verification, transport I/O, session bookkeeping) funnels into
//! [`GatewayError`] so call sites can match on structure instead of parsing
//! strings. The per-session worker is the single place that turns a
//! `GatewayError` into the `"ERROR: ..."` text handed back to a client.

use thiserror::Error;

/// The full error taxonomy produced by the protocol engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// A command template or argument wiring is missing or malformed in configuration.
    #[error("{0}")]
    Config(String),

    /// An argument's `values` spec is not one of the recognized syntaxes.
    #[error("{0}")]
    Argument(String),

    /// An inbound command does not match any compiled template.
    #[error("{0}")]
    Command(String),

    /// A response's frame check sequence did not match the computed CRC.
    #[error("{0}")]
    Checksum(String),

    /// The transport returned an empty read before the silence threshold elapsed.
    #[error("No response from pump")]
    NoResponse,

    /// Two consecutive reads were silent for at least the silence threshold.
    #[error("Device disconnected")]
    ConnectionLost,

    /// The underlying transport failed in a way that is not a protocol timeout.
    #[error("{0}")]
    Transport(String),

    /// Any other failure; always treated as unrecoverable.
    #[error("{0}")]
    Unexpected(String),
}

impl GatewayError {
    /// Whether this error should cause the owning session to self-retire.
    ///
    /// Mirrors the recoverable/unrecoverable split in the error handling design:
    /// validation, checksum, and absent-response errors are survivable; a lost
    /// connection, a transport I/O failure, or an unexpected failure is not.
    /// The session worker consults this on every error path instead of each
    /// call site deciding independently.
    pub fn is_fatal(&self) -> bool {
        matches!(self, GatewayError::ConnectionLost | GatewayError::Transport(_) | GatewayError::Unexpected(_))
    }

    /// Render as the `"ERROR: ..."` text surfaced to the client.
    pub fn as_response(&self) -> String {
        format!("ERROR: {self}")
    }
}
