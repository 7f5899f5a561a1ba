//! Loopback transport (C6).
//!
//! Simulates a pump without hardware: decodes an incoming framed command,
//! matches it against the configured command table, and synthesizes a
//! framed response, optionally filling placeholders with random values.
//! The read-outcome lottery (`SPEC_FULL.md` §4.6) deliberately injects
//! empty reads and a bare ESC byte so the session state machine's retry and
//! disconnect paths are exercised without a second process or real device.

use crate::config::{ArgumentDescriptor, ArgumentValues, CommandSpec};
use crate::crc::CrcEngine;
use crate::error::GatewayError;
use crate::frame::{self, DEFAULT_TERMINATOR};
use crate::random::RandomSource;
use crate::transport::Transport;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};

struct LoopbackState {
    stored_response: Vec<u8>,
    bindings: HashMap<String, String>,
}

/// A `Transport` that pretends to be a pump by pattern-matching against the
/// configured command/argument tables.
pub struct LoopbackTransport {
    command_set: HashMap<String, CommandSpec>,
    arguments: HashMap<String, ArgumentDescriptor>,
    crc: Option<CrcEngine>,
    terminator: u8,
    random: Arc<dyn RandomSource>,
    state: Mutex<LoopbackState>,
    cancel: Notify,
}

impl LoopbackTransport {
    pub fn new(
        command_set: HashMap<String, CommandSpec>,
        arguments: HashMap<String, ArgumentDescriptor>,
        crc: Option<CrcEngine>,
        random: Arc<dyn RandomSource>,
    ) -> Self {
        let bare_marker = frame::term_hex(DEFAULT_TERMINATOR).into_bytes();
        Self {
            command_set,
            arguments,
            crc,
            terminator: DEFAULT_TERMINATOR,
            random,
            state: Mutex::new(LoopbackState { stored_response: bare_marker, bindings: HashMap::new() }),
            cancel: Notify::new(),
        }
    }

    fn find_template(&self, head: &str, arity: usize) -> Option<(&str, &CommandSpec)> {
        self.command_set.iter().find_map(|(template, spec)| {
            let mut parts = template.split('^');
            let template_head = parts.next().unwrap_or_default();
            if template_head == head && parts.count() == arity {
                Some((template.as_str(), spec))
            } else {
                None
            }
        })
    }

    fn synthesize(&self, descriptor: &ArgumentDescriptor) -> String {
        match &descriptor.values {
            ArgumentValues::Literals(list) if !list.is_empty() => list[self.random.index(list.len())].clone(),
            ArgumentValues::Literals(_) => String::new(),
            ArgumentValues::Spec(spec) => self.synthesize_spec(spec),
        }
    }

    fn synthesize_spec(&self, spec: &str) -> String {
        if let Some(n) = spec.strip_prefix("int(").and_then(|s| s.split(')').next()).and_then(|s| s.parse::<u32>().ok())
        {
            let max = 10u64.saturating_pow(n);
            return self.random.range_u32(1, max.min(u32::MAX as u64) as u32).to_string();
        }
        if spec.starts_with("float(") {
            let value = self.random.range_f64(1.0, 10.0);
            return format!("{value:.4}");
        }
        if let Some(n) = spec.strip_prefix("str(").and_then(|s| s.split(')').next()).and_then(|s| s.parse::<u32>().ok())
        {
            let len = self.random.range_u32(1, n.max(1)) as usize;
            return self.random.alphanumeric(len);
        }
        if spec.starts_with("DateAndTimeStamp") {
            return self.random_date_time(2024).format("%Y-%m-%dT%H:%M:%S").to_string();
        }
        if spec.starts_with("DateStamp") {
            return self.random_date_time(2024).format("%Y-%m-%d").to_string();
        }
        if spec.starts_with("DurationStamp") {
            return self.random_date_time(2024).format("%H:%M:%S").to_string();
        }
        // `re(...)` (a free-form user regex) has no general inverse; there is
        // nothing principled to synthesize, so fall back to a fixed marker.
        "MATCH".to_string()
    }

    /// A random date/time within `year`, per the fixed-year synthesis rule (§4.6).
    fn random_date_time(&self, year: i32) -> chrono::NaiveDateTime {
        let month = self.random.range_u32(1, 12);
        let day = self.random.range_u32(1, 28);
        let hour = self.random.range_u32(0, 23);
        let minute = self.random.range_u32(0, 59);
        let second = self.random.range_u32(0, 59);
        NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|d| d.and_hms_opt(hour, minute, second))
            .unwrap_or_else(|| NaiveDate::from_ymd_opt(year, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap())
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn write(&self, bytes: &[u8]) -> Result<(), GatewayError> {
        if bytes == [0x1B] {
            // The escape command bypasses framing entirely (§4.7); nothing to
            // decode or match against the command table.
            return Ok(());
        }

        let parsed = frame::parse(bytes, self.crc.as_ref(), self.terminator)?;
        let mut request_parts = parsed.payload.split('^');
        let head = request_parts.next().unwrap_or_default();
        let values: Vec<&str> = request_parts.collect();

        let mut state = self.state.lock().await;

        let Some((template, spec)) = self.find_template(head, values.len()) else {
            return Ok(());
        };
        let placeholder_names: Vec<&str> = template.split('^').skip(1).collect();
        for (name, value) in placeholder_names.iter().zip(values.iter()) {
            state.bindings.insert((*name).to_string(), (*value).to_string());
        }

        let response_payload = if spec.response == template {
            parsed.payload.clone()
        } else {
            let mut out = Vec::new();
            for token in spec.response.split('^') {
                if token.starts_with('<') && token.ends_with('>') {
                    let value = if let Some(bound) = state.bindings.get(token) {
                        bound.clone()
                    } else {
                        let descriptor = self
                            .arguments
                            .get(token)
                            .ok_or_else(|| GatewayError::Config(format!("Unknown placeholder in response: {token}")))?;
                        let generated = self.synthesize(descriptor);
                        state.bindings.insert(token.to_string(), generated.clone());
                        generated
                    };
                    out.push(value);
                } else {
                    out.push(token.to_string());
                }
            }
            out.join("^")
        };

        state.stored_response = frame::build(&response_payload, self.crc.as_ref(), self.terminator);
        Ok(())
    }

    async fn read_until(&self, _terminator: u8) -> Result<Vec<u8>, GatewayError> {
        let outcome = self.random.range_u32(1, 50);

        let result = match outcome {
            1 => Vec::new(),
            2 => vec![0x1B],
            3 => {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(3100)) => Vec::new(),
                    _ = self.cancel.notified() => Vec::new(),
                }
            }
            _ => {
                let delay_ms = self.random.range_u32(200, 500);
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(delay_ms as u64)) => {}
                    _ = self.cancel.notified() => return Ok(Vec::new()),
                }
                self.state.lock().await.stored_response.clone()
            }
        };

        let mut state = self.state.lock().await;
        state.stored_response = frame::term_hex(self.terminator).into_bytes();
        Ok(result)
    }

    async fn close(&self) -> Result<(), GatewayError> {
        self.cancel.notify_waiters();
        Ok(())
    }

    fn cancel_read(&self) {
        self.cancel.notify_waiters();
    }
}
