//! Parameterized CRC engine (C2).
//!
//! Supports the usual CRC parameter set — width, polynomial, initial value,
//! final XOR, and independent input/output reflection — generic over widths
//! up to 32 bits via a table-driven implementation. This is hand-rolled
//! rather than pulled from a crate because it is core protocol logic named
//! directly by the specification, not an ambient concern.

use serde::{Deserialize, Serialize};

/// CRC parameters, as they appear in `pump_config.crc_config`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrcConfig {
    pub width: u8,
    pub polynomial: u32,
    pub init_value: u32,
    pub final_xor_value: u32,
    pub reverse_input: bool,
    pub reverse_output: bool,
}

/// A compiled CRC table for one [`CrcConfig`].
#[derive(Debug, Clone)]
pub struct CrcEngine {
    config: CrcConfig,
    table: [u32; 256],
    mask: u32,
}

fn reflect(mut value: u32, bits: u32) -> u32 {
    let mut result = 0u32;
    for _ in 0..bits {
        result = (result << 1) | (value & 1);
        value >>= 1;
    }
    result
}

impl CrcEngine {
    /// Build the lookup table for `config`.
    pub fn new(config: CrcConfig) -> Self {
        let width = config.width as u32;
        let mask = if width >= 32 { u32::MAX } else { (1u32 << width) - 1 };
        let top_bit = 1u32 << (width - 1);
        let poly = config.polynomial & mask;

        let mut table = [0u32; 256];
        for (i, slot) in table.iter_mut().enumerate() {
            let mut value = (i as u32) << (width.saturating_sub(8));
            if width < 8 {
                value = (i as u32) & mask;
            }
            for _ in 0..8 {
                if value & top_bit != 0 {
                    value = ((value << 1) ^ poly) & mask;
                } else {
                    value = (value << 1) & mask;
                }
            }
            *slot = value & mask;
        }

        Self { config, table, mask }
    }

    /// Compute the CRC of `data` under this engine's configuration.
    pub fn checksum(&self, data: &[u8]) -> u32 {
        let width = self.config.width as u32;
        let mut crc = self.config.init_value & self.mask;

        for &byte in data {
            let byte = if self.config.reverse_input { reflect(byte as u32, 8) as u8 } else { byte };
            let pos = if width >= 8 {
                (((crc >> (width - 8)) as u8) ^ byte) as usize
            } else {
                (((crc << (8 - width)) as u8) ^ byte) as usize
            };
            crc = ((crc << 8) ^ self.table[pos & 0xFF]) & self.mask;
        }

        if self.config.reverse_output {
            crc = reflect(crc, width);
        }

        (crc ^ self.config.final_xor_value) & self.mask
    }

    /// Format a checksum as 4 lowercase hex digits, zero-padded.
    ///
    /// This is a dedicated formatter distinct from the general hex codec
    /// (C1) and from `TERM_HEX` (§9 of `SPEC_FULL.md`) — they must not be
    /// conflated.
    pub fn format_fcs(value: u32) -> String {
        format!("{:04x}", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // CRC-16/CCITT-FALSE: poly 0x1021, init 0xFFFF, no reflection, no final xor.
    // These are the parameters used throughout the gateway's end-to-end scenarios.
    fn crc16_ccitt_false() -> CrcEngine {
        CrcEngine::new(CrcConfig {
            width: 16,
            polynomial: 0x1021,
            init_value: 0xFFFF,
            final_xor_value: 0x0000,
            reverse_input: false,
            reverse_output: false,
        })
    }

    #[test]
    fn matches_known_crc16_ccitt_false_vector() {
        let engine = crc16_ccitt_false();
        // Well-known CRC-16/CCITT-FALSE("123456789") = 0x29B1
        assert_eq!(engine.checksum(b"123456789"), 0x29B1);
    }

    #[test]
    fn format_fcs_is_four_lowercase_digits() {
        assert_eq!(CrcEngine::format_fcs(0x29B1), "29b1");
        assert_eq!(CrcEngine::format_fcs(0x0A), "000a");
    }

    #[test]
    fn different_payloads_usually_differ() {
        let engine = crc16_ccitt_false();
        assert_ne!(engine.checksum(b"ALARM"), engine.checksum(b"ALARN"));
    }
}
