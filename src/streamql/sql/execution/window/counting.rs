//! Counting window: batches of exactly `count` rows.
//!
//! Rows accumulate on the trigger queue; the moment the buffer reaches the
//! threshold, the first `count` rows are sliced off, stamped with a
//! synthetic time slot spanning the aligned timestamps of the slice's first
//! and last rows, and emitted. Surplus rows stay buffered for the next
//! emission.

use super::{Batch, ShutdownHandle, OUTPUT_QUEUE_DEPTH, TRIGGER_QUEUE_DEPTH};
use crate::streamql::sql::error::{SqlError, SqlResult};
use crate::streamql::sql::execution::config::{WindowConfig, WindowSpec};
use crate::streamql::sql::execution::types::{Row, TimeSlot};
use crate::streamql::utils::time::{align_ceil, align_floor};
use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

struct CountingState {
    count: usize,
    buffer: Vec<Row>,
}

pub struct CountingWindow {
    config: WindowConfig,
    threshold: usize,
    state: Arc<Mutex<CountingState>>,
    trigger_tx: mpsc::Sender<Row>,
    trigger_rx: Option<mpsc::Receiver<Row>>,
    output_tx: Option<mpsc::Sender<Batch>>,
    output_rx: Option<mpsc::Receiver<Batch>>,
    shutdown: ShutdownHandle,
    shutdown_rx: Option<mpsc::Receiver<()>>,
}

impl CountingWindow {
    pub fn new(config: WindowConfig) -> SqlResult<CountingWindow> {
        let threshold = match config.spec {
            WindowSpec::Counting { count } => count,
            ref other => {
                return Err(SqlError::window_error(
                    format!("expected counting spec, got {}", other.type_name()),
                    Some("counting".to_string()),
                ));
            }
        };
        if threshold == 0 {
            return Err(SqlError::window_error(
                "threshold must be a positive integer",
                Some("counting".to_string()),
            ));
        }

        let (trigger_tx, trigger_rx) = mpsc::channel(TRIGGER_QUEUE_DEPTH);
        let (output_tx, output_rx) = mpsc::channel(OUTPUT_QUEUE_DEPTH);
        let (shutdown, shutdown_rx) = ShutdownHandle::new();

        Ok(CountingWindow {
            config,
            threshold,
            state: Arc::new(Mutex::new(CountingState {
                count: 0,
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
        state.count = 0;
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
        let threshold = self.threshold;
        let time_unit = self.config.time_unit;

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => {
                        debug!("counting window dispatch loop cancelled");
                        return;
                    }
                    received = trigger_rx.recv() => {
                        let row = match received {
                            Some(row) => row,
                            None => {
                                debug!("counting window trigger channel closed");
                                return;
                            }
                        };
                        if let Some(batch) = on_row(&state, row, threshold, time_unit).await {
                            if output_tx.send(batch).await.is_err() {
                                warn!("counting window output channel closed, stopping");
                                return;
                            }
                        }
                    }
                }
            }
        });
    }
}

/// Buffer `row`; when the threshold is reached, slice off exactly
/// `threshold` rows as a batch and keep the surplus.
async fn on_row(
    state: &Mutex<CountingState>,
    row: Row,
    threshold: usize,
    time_unit: Duration,
) -> Option<Batch> {
    let mut guard = state.lock().await;
    guard.buffer.push(row);
    guard.count += 1;
    if guard.count < threshold {
        return None;
    }

    let mut batch: Batch = guard.buffer.drain(..threshold).collect();
    guard.count = guard.buffer.len();
    drop(guard);

    let slot = create_slot(&batch, time_unit);
    for row in batch.iter_mut() {
        row.slot = Some(slot);
    }
    Some(batch)
}

/// Synthetic slot spanning the aligned timestamps of the batch's first and
/// last rows.
fn create_slot(batch: &[Row], time_unit: Duration) -> TimeSlot {
    let first = batch.first().expect("batch holds exactly threshold rows");
    let last = batch.last().expect("batch holds exactly threshold rows");
    let start = align_floor(first.timestamp, time_unit);
    let mut end = align_ceil(last.timestamp, time_unit);
    if end <= start {
        end = start + chrono::Duration::from_std(time_unit).unwrap_or(chrono::Duration::minutes(1));
    }
    TimeSlot::new(start, end)
}
