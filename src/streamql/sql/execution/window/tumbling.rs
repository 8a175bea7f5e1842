//! Tumbling window: fixed non-overlapping slots of `size`.
//!
//! Slot boundaries are aligned to `size` multiples of the epoch (shifted by
//! the optional alignment offset): a row with timestamp `t` belongs to
//! `[floor(t/size)*size, start + size)`. A slot closes either when a row
//! crosses its end boundary or when wall clock passes it, whichever fires
//! first; each open slot is emitted at most once.

use super::{until, Batch, ShutdownHandle, OUTPUT_QUEUE_DEPTH, TRIGGER_QUEUE_DEPTH};
use crate::streamql::sql::error::{SqlError, SqlResult};
use crate::streamql::sql::execution::config::{WindowConfig, WindowSpec};
use crate::streamql::sql::execution::types::{Row, TimeSlot};
use crate::streamql::utils::time::align_floor_offset;
use chrono::Utc;
use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

/// Sleep used when the flush branch is disabled; never observed because the
/// branch only arms with a live deadline.
const IDLE_POLL: Duration = Duration::from_secs(3600);

struct TumblingState {
    slot: Option<TimeSlot>,
    buffer: Vec<Row>,
}

pub struct TumblingWindow {
    config: WindowConfig,
    size: Duration,
    offset: Duration,
    state: Arc<Mutex<TumblingState>>,
    trigger_tx: mpsc::Sender<Row>,
    trigger_rx: Option<mpsc::Receiver<Row>>,
    output_tx: Option<mpsc::Sender<Batch>>,
    output_rx: Option<mpsc::Receiver<Batch>>,
    shutdown: ShutdownHandle,
    shutdown_rx: Option<mpsc::Receiver<()>>,
}

impl TumblingWindow {
    pub fn new(config: WindowConfig) -> SqlResult<TumblingWindow> {
        let (size, offset) = match config.spec {
            WindowSpec::Tumbling { size, offset } => (size, offset),
            ref other => {
                return Err(SqlError::window_error(
                    format!("expected tumbling spec, got {}", other.type_name()),
                    Some("tumbling".to_string()),
                ));
            }
        };
        if size.is_zero() || chrono::Duration::from_std(size).is_err() {
            return Err(SqlError::window_error(
                "size must be a positive duration",
                Some("tumbling".to_string()),
            ));
        }

        let (trigger_tx, trigger_rx) = mpsc::channel(TRIGGER_QUEUE_DEPTH);
        let (output_tx, output_rx) = mpsc::channel(OUTPUT_QUEUE_DEPTH);
        let (shutdown, shutdown_rx) = ShutdownHandle::new();

        Ok(TumblingWindow {
            config,
            size,
            offset,
            state: Arc::new(Mutex::new(TumblingState {
                slot: None,
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
        state.slot = None;
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
        let size = self.size;
        let offset = self.offset;

        tokio::spawn(async move {
            loop {
                let deadline = { state.lock().await.slot.map(|slot| slot.end) };

                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => {
                        debug!("tumbling window dispatch loop cancelled");
                        return;
                    }
                    received = trigger_rx.recv() => {
                        let row = match received {
                            Some(row) => row,
                            None => {
                                debug!("tumbling window trigger channel closed");
                                return;
                            }
                        };
                        if let Some((slot, batch)) = on_row(&state, row, size, offset).await {
                            if output_tx.send(tag(batch, slot)).await.is_err() {
                                warn!("tumbling window output channel closed, stopping");
                                return;
                            }
                        }
                    }
                    _ = tokio::time::sleep(deadline.map(until).unwrap_or(IDLE_POLL)),
                            if deadline.is_some() => {
                        if let Some((slot, batch)) = flush(&state).await {
                            if output_tx.send(tag(batch, slot)).await.is_err() {
                                warn!("tumbling window output channel closed, stopping");
                                return;
                            }
                        }
                    }
                }
            }
        });
    }
}

/// Assign `row` to its aligned slot, emitting the previous slot's buffer
/// when the row crosses the current boundary.
async fn on_row(
    state: &Mutex<TumblingState>,
    mut row: Row,
    size: Duration,
    offset: Duration,
) -> Option<(TimeSlot, Batch)> {
    let span = chrono::Duration::from_std(size).expect("validated at construction");
    let start = align_floor_offset(row.timestamp, size, offset);
    let slot = TimeSlot::new(start, start + span);

    let mut guard = state.lock().await;
    let emitted = match guard.slot {
        None => {
            guard.slot = Some(slot);
            None
        }
        Some(current) if row.timestamp >= current.end => {
            let batch = std::mem::take(&mut guard.buffer);
            guard.slot = Some(slot);
            if batch.is_empty() {
                None
            } else {
                Some((current, batch))
            }
        }
        Some(_) => None,
    };

    row.slot = guard.slot;
    guard.buffer.push(row);
    emitted
}

/// Close the current slot if wall clock has passed its end.
async fn flush(state: &Mutex<TumblingState>) -> Option<(TimeSlot, Batch)> {
    let mut guard = state.lock().await;
    let current = guard.slot?;
    if Utc::now() < current.end {
        return None;
    }
    guard.slot = None;
    let batch = std::mem::take(&mut guard.buffer);
    if batch.is_empty() {
        None
    } else {
        Some((current, batch))
    }
}

fn tag(mut batch: Batch, slot: TimeSlot) -> Batch {
    for row in batch.iter_mut() {
        row.slot = Some(slot);
    }
    batch
}
