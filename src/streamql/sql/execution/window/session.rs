//! Session window: gap-delimited slots.
//!
//! A session stays open while consecutive rows arrive within `timeout` of
//! the previous row's timestamp. A larger gap closes the session with slot
//! `[first.timestamp, previous.timestamp + timeout)`, and the gapping row
//! opens the next session. A wall-clock idle timer closes the final session
//! of a quiet stream the same way.

use super::{until, Batch, ShutdownHandle, OUTPUT_QUEUE_DEPTH, TRIGGER_QUEUE_DEPTH};
use crate::streamql::sql::error::{SqlError, SqlResult};
use crate::streamql::sql::execution::config::{WindowConfig, WindowSpec};
use crate::streamql::sql::execution::types::{Row, TimeSlot};
use chrono::{DateTime, Utc};
use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

/// Sleep used when the idle branch is disabled; never observed because the
/// branch only arms with a live deadline.
const IDLE_POLL: Duration = Duration::from_secs(3600);

struct SessionState {
    /// Timestamp of the first row of the open session.
    start: Option<DateTime<Utc>>,
    /// Timestamp of the most recent row.
    last_ts: Option<DateTime<Utc>>,
    /// Wall-clock instant after which the open session is considered idle.
    idle_deadline: Option<DateTime<Utc>>,
    buffer: Vec<Row>,
}

pub struct SessionWindow {
    config: WindowConfig,
    timeout: Duration,
    state: Arc<Mutex<SessionState>>,
    trigger_tx: mpsc::Sender<Row>,
    trigger_rx: Option<mpsc::Receiver<Row>>,
    output_tx: Option<mpsc::Sender<Batch>>,
    output_rx: Option<mpsc::Receiver<Batch>>,
    shutdown: ShutdownHandle,
    shutdown_rx: Option<mpsc::Receiver<()>>,
}

impl SessionWindow {
    pub fn new(config: WindowConfig) -> SqlResult<SessionWindow> {
        let timeout = match config.spec {
            WindowSpec::Session { timeout } => timeout,
            ref other => {
                return Err(SqlError::window_error(
                    format!("expected session spec, got {}", other.type_name()),
                    Some("session".to_string()),
                ));
            }
        };
        if timeout.is_zero() || chrono::Duration::from_std(timeout).is_err() {
            return Err(SqlError::window_error(
                "timeout must be a positive duration",
                Some("session".to_string()),
            ));
        }

        let (trigger_tx, trigger_rx) = mpsc::channel(TRIGGER_QUEUE_DEPTH);
        let (output_tx, output_rx) = mpsc::channel(OUTPUT_QUEUE_DEPTH);
        let (shutdown, shutdown_rx) = ShutdownHandle::new();

        Ok(SessionWindow {
            config,
            timeout,
            state: Arc::new(Mutex::new(SessionState {
                start: None,
                last_ts: None,
                idle_deadline: None,
                buffer: Vec::new(),
            })),
            trigger_tx,
            trigger_rx: Some(trigger_rx),
            output_tx: Some(output_tx),
            output_rx: Some(output_rx),
            shutdown,
            shutdown_rx: Some(shutdown_rx),
        })
    }

    pub fn config(&self) -> &WindowConfig {
        &self.config
    }

    pub fn sender(&self) -> &mpsc::Sender<Row> {
        &self.trigger_tx
    }

    pub fn output_channel(&mut self) -> Option<mpsc::Receiver<Batch>> {
        self.output_rx.take()
    }

    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        state.start = None;
        state.last_ts = None;
        state.idle_deadline = None;
        state.buffer.clear();
    }

    pub fn stop(&self) {
        self.shutdown.signal();
    }

    pub fn start(&mut self) {
        let mut trigger_rx = match self.trigger_rx.take() {
            Some(rx) => rx,
            None => return, // already started
        };
        let mut shutdown_rx = self.shutdown_rx.take().expect("taken with trigger_rx");
        let state = Arc::clone(&self.state);
        let output_tx = match self.output_tx.take() {
            Some(tx) => tx,
            None => return,
        };
        let gap = chrono::Duration::from_std(self.timeout).expect("validated at construction");

        tokio::spawn(async move {
            loop {
                let deadline = { state.lock().await.idle_deadline };

                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => {
                        debug!("session window dispatch loop cancelled");
                        return;
                    }
                    received = trigger_rx.recv() => {
                        let row = match received {
                            Some(row) => row,
                            None => {
                                debug!("session window trigger channel closed");
                                return;
                            }
                        };
                        if let Some(batch) = on_row(&state, row, gap).await {
                            if output_tx.send(batch).await.is_err() {
                                warn!("session window output channel closed, stopping");
                                return;
                            }
                        }
                    }
                    _ = tokio::time::sleep(deadline.map(until).unwrap_or(IDLE_POLL)),
                            if deadline.is_some() => {
                        if let Some(batch) = close_idle(&state, gap).await {
                            if output_tx.send(batch).await.is_err() {
                                warn!("session window output channel closed, stopping");
                                return;
                            }
                        }
                    }
                }
            }
        });
    }
}

/// Append `row` to the open session, first closing it when the gap since
/// the previous row exceeds the session timeout.
async fn on_row(state: &Mutex<SessionState>, row: Row, gap: chrono::Duration) -> Option<Batch> {
    let mut guard = state.lock().await;

    let emitted = match (guard.start, guard.last_ts) {
        (Some(start), Some(prev)) if row.timestamp - prev > gap => {
            let slot = TimeSlot::new(start, prev + gap);
            let batch = tag(std::mem::take(&mut guard.buffer), slot);
            guard.start = Some(row.timestamp);
            Some(batch)
        }
        (None, _) => {
            guard.start = Some(row.timestamp);
            None
        }
        _ => None,
    };

    guard.last_ts = Some(row.timestamp);
    guard.idle_deadline = Some(Utc::now() + gap);
    guard.buffer.push(row);
    emitted
}

/// Close the open session once no row has arrived for the timeout.
async fn close_idle(state: &Mutex<SessionState>, gap: chrono::Duration) -> Option<Batch> {
    let mut guard = state.lock().await;
    let deadline = guard.idle_deadline?;
    if Utc::now() < deadline {
        return None;
    }

    guard.idle_deadline = None;
    let (start, last) = match (guard.start.take(), guard.last_ts.take()) {
        (Some(start), Some(last)) => (start, last),
        _ => return None,
    };
    let batch = std::mem::take(&mut guard.buffer);
    if batch.is_empty() {
        return None;
    }
    Some(tag(batch, TimeSlot::new(start, last + gap)))
}

fn tag(mut batch: Batch, slot: TimeSlot) -> Batch {
    for row in batch.iter_mut() {
        row.slot = Some(slot);
    }
    batch
}
