//! Frame builder/parser (C3): the `!PAYLOAD|FCS<TERM>` envelope.
//!
//! Building runs `!PAYLOAD|FCS` through the hex codec (C1) and appends
//! `TERM_HEX` — the terminator byte rendered as exactly two uppercase hex
//! digits — outside of that pass. Parsing is the inverse. See
//! `SPEC_FULL.md` §4.3 and §9 for why `TERM_HEX` must not be folded into
//! the general hex codec's 1-or-2-digit rule.

use crate::crc::CrcEngine;
use crate::error::GatewayError;
use crate::hex;

/// Default frame terminator byte, `\r` (`0x0D`).
pub const DEFAULT_TERMINATOR: u8 = 0x0D;

/// Render `terminator` as the fixed, always-2-digit wire marker.
pub fn term_hex(terminator: u8) -> String {
    format!("{:02X}", terminator)
}

/// A parsed frame: the payload (without the leading `!`) and its FCS text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFrame {
    pub payload: String,
    pub fcs: String,
}

/// Build the wire bytes for `payload`, computing `FCS` from `crc` when present.
pub fn build(payload: &str, crc: Option<&CrcEngine>, terminator: u8) -> Vec<u8> {
    let fcs = match crc {
        Some(engine) => CrcEngine::format_fcs(engine.checksum(payload.as_bytes())),
        None => String::new(),
    };
    let plain = format!("!{payload}|{fcs}");
    let mut wire = hex::encode(&plain);
    wire.push_str(&term_hex(terminator));
    wire.into_bytes()
}

/// Parse wire bytes into a [`ParsedFrame`], verifying the CRC when `crc` is present.
pub fn parse(raw: &[u8], crc: Option<&CrcEngine>, terminator: u8) -> Result<ParsedFrame, GatewayError> {
    let text = std::str::from_utf8(raw)
        .map_err(|_| GatewayError::Checksum("Frame is not valid ASCII".to_string()))?;

    let marker = term_hex(terminator);
    let hex_body = text.strip_suffix(&marker).unwrap_or(text);

    let decoded = hex::decode(hex_body);
    let without_bang = decoded.strip_prefix('!').unwrap_or(&decoded);
    let (payload, fcs) = match without_bang.split_once('|') {
        Some((p, f)) => (p.to_string(), f.to_string()),
        None => (without_bang.to_string(), String::new()),
    };

    if let Some(engine) = crc {
        let expected = CrcEngine::format_fcs(engine.checksum(payload.as_bytes()));
        if expected != fcs {
            return Err(GatewayError::Checksum(format!(
                "Checksum does not match expectation.\nResponse: {decoded}\nExpected: {expected}\nReceived: {fcs}"
            )));
        }
    }

    Ok(ParsedFrame { payload, fcs })
}
