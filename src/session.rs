//! Pump session (C7): one dedicated worker per pump, serializing requests.
//!
//! The worker is the only task that ever touches the transport, so at most
//! one request is ever in flight on a given pump. Queue wait is a
//! `tokio::sync::Notify`, never a busy loop; the response path is an
//! unbounded `mpsc` channel so `push` never blocks on a slow consumer.

use crate::crc::CrcEngine;
use crate::error::GatewayError;
use crate::frame::{self, DEFAULT_TERMINATOR};
use crate::grammar::Grammar;
use crate::transport::Transport;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::time::{Duration, Instant};
use tracing::{debug, warn};

/// How long a read may stay empty before it counts as "silent" (§4.7).
const SILENCE_THRESHOLD: Duration = Duration::from_secs(3);

const ESCAPE_BYTE: u8 = 0x1B;

struct QueuedCommand {
    text: String,
    submission_time: i128,
}

/// A per-pump session: send queue, worker, response queue, kill flag.
pub struct PumpSession {
    queue: Arc<Mutex<VecDeque<QueuedCommand>>>,
    notify: Arc<Notify>,
    kill: Arc<AtomicBool>,
    responses: Mutex<mpsc::UnboundedReceiver<String>>,
    worker: tokio::task::JoinHandle<()>,
    transport: Arc<dyn Transport>,
}

impl PumpSession {
    pub fn new(transport: Arc<dyn Transport>, crc: Option<CrcEngine>, grammar: Grammar) -> Self {
        let queue = Arc::new(Mutex::new(VecDeque::new()));
        let notify = Arc::new(Notify::new());
        let kill = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::unbounded_channel();

        let worker = tokio::spawn(worker_loop(
            Arc::clone(&transport),
            crc,
            grammar,
            Arc::clone(&queue),
            Arc::clone(&notify),
            Arc::clone(&kill),
            tx,
        ));

        Self { queue, notify, kill, responses: Mutex::new(rx), worker, transport }
    }

    /// Enqueue `command_text`, ordered by `submission_time` (I5). Rejected
    /// once the session has been killed (I4).
    pub async fn push(&self, command_text: String, submission_time: i128) -> Result<(), GatewayError> {
        if self.is_killed() {
            return Err(GatewayError::ConnectionLost);
        }
        let mut queue = self.queue.lock().await;
        let position = queue.partition_point(|q| q.submission_time <= submission_time);
        queue.insert(position, QueuedCommand { text: command_text, submission_time });
        drop(queue);
        self.notify.notify_one();
        Ok(())
    }

    /// Block until the next response is available.
    pub async fn get_response(&self) -> Result<String, GatewayError> {
        self.responses
            .lock()
            .await
            .recv()
            .await
            .ok_or_else(|| GatewayError::Unexpected("response channel closed".to_string()))
    }

    pub fn is_killed(&self) -> bool {
        self.kill.load(Ordering::SeqCst)
    }

    /// Close the underlying transport and stop accepting work.
    pub async fn close(&self) -> Result<(), GatewayError> {
        self.kill.store(true, Ordering::SeqCst);
        self.transport.cancel_read();
        self.notify.notify_one();
        self.transport.close().await
    }
}

impl Drop for PumpSession {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

async fn worker_loop(
    transport: Arc<dyn Transport>,
    crc: Option<CrcEngine>,
    grammar: Grammar,
    queue: Arc<Mutex<VecDeque<QueuedCommand>>>,
    notify: Arc<Notify>,
    kill: Arc<AtomicBool>,
    responses: mpsc::UnboundedSender<String>,
) {
    loop {
        if kill.load(Ordering::SeqCst) {
            break;
        }

        let next = queue.lock().await.pop_front();
        let command = match next {
            Some(command) => command,
            None => {
                notify.notified().await;
                continue;
            }
        };

        if kill.load(Ordering::SeqCst) {
            break;
        }

        let response = process_one(&transport, crc.as_ref(), &grammar, &command.text, &kill).await;
        if responses.send(response).is_err() {
            // No one is listening for responses anymore; nothing left to do.
            break;
        }
    }
}

async fn process_one(
    transport: &Arc<dyn Transport>,
    crc: Option<&CrcEngine>,
    grammar: &Grammar,
    command_text: &str,
    kill: &AtomicBool,
) -> String {
    if command_text.as_bytes() == [ESCAPE_BYTE] {
        if let Err(e) = transport.write(&[ESCAPE_BYTE]).await {
            warn!("escape write failed: {e}");
            if e.is_fatal() {
                kill.store(true, Ordering::SeqCst);
            }
            return e.as_response();
        }
        return "Escape character sent. Aborting all current actions.".to_string();
    }

    if let Err(e) = grammar.validate(command_text) {
        return e.as_response();
    }

    let wire = frame::build(command_text, crc, DEFAULT_TERMINATOR);
    if let Err(e) = transport.write(&wire).await {
        if e.is_fatal() {
            kill.store(true, Ordering::SeqCst);
        }
        return e.as_response();
    }

    match read_with_retry(transport, &wire).await {
        ReadOutcome::Response(bytes) => interpret_response(crc, &bytes),
        ReadOutcome::NoResponse => GatewayError::NoResponse.as_response(),
        ReadOutcome::Disconnected => {
            let err = GatewayError::ConnectionLost;
            if err.is_fatal() {
                kill.store(true, Ordering::SeqCst);
            }
            err.as_response()
        }
    }
}

enum ReadOutcome {
    Response(Vec<u8>),
    NoResponse,
    Disconnected,
}

async fn read_with_retry(transport: &Arc<dyn Transport>, wire: &[u8]) -> ReadOutcome {
    let started = Instant::now();
    let first = transport.read_until(DEFAULT_TERMINATOR).await.unwrap_or_default();
    if !first.is_empty() {
        return ReadOutcome::Response(first);
    }
    if started.elapsed() < SILENCE_THRESHOLD {
        return ReadOutcome::NoResponse;
    }

    debug!("first read silent for {:?}, retrying", started.elapsed());
    if transport.write(wire).await.is_err() {
        return ReadOutcome::Disconnected;
    }
    let retry_started = Instant::now();
    let second = transport.read_until(DEFAULT_TERMINATOR).await.unwrap_or_default();
    if !second.is_empty() {
        return ReadOutcome::Response(second);
    }
    if retry_started.elapsed() >= SILENCE_THRESHOLD {
        ReadOutcome::Disconnected
    } else {
        ReadOutcome::NoResponse
    }
}

fn interpret_response(crc: Option<&CrcEngine>, bytes: &[u8]) -> String {
    if bytes == [ESCAPE_BYTE] {
        return "ACK: ESCAPE COMMAND RECEIVED".to_string();
    }
    match frame::parse(bytes, crc, DEFAULT_TERMINATOR) {
        Ok(parsed) => format!("ACK: {}", parsed.payload),
        Err(e) => e.as_response(),
    }
}
