//! Sliding window: overlapping slots of `size` opening every `slide`.
//!
//! The slot sequence is anchored at the first row's slide-aligned timestamp
//! and extends lazily: a row materializes every sequence slot whose interval
//! contains its timestamp and joins each of them. Slots close when wall
//! clock passes their end, checked on a `slide`-period tick, and closed
//! slots emit in slot-end order.

use super::{Batch, ShutdownHandle, OUTPUT_QUEUE_DEPTH, TRIGGER_QUEUE_DEPTH};
use crate::streamql::sql::error::{SqlError, SqlResult};
use crate::streamql::sql::execution::config::{WindowConfig, WindowSpec};
use crate::streamql::sql::execution::types::{Row, TimeSlot};
use crate::streamql::utils::time::{from_nanos, to_nanos};
use chrono::Utc;
use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

struct SlotBuffer {
    slot: TimeSlot,
    rows: Vec<Row>,
}

struct SlidingState {
    /// Start of the first slot, nanoseconds. Set by the first row.
    anchor: Option<i64>,
    /// Slot starts below this are closed and may not reopen.
    min_open: i64,
    /// Open slots, ordered by start.
    slots: Vec<SlotBuffer>,
}

pub struct SlidingWindow {
    config: WindowConfig,
    size: Duration,
    slide: Duration,
    offset: Duration,
    state: Arc<Mutex<SlidingState>>,
    trigger_tx: mpsc::Sender<Row>,
    trigger_rx: Option<mpsc::Receiver<Row>>,
    output_tx: Option<mpsc::Sender<Batch>>,
    output_rx: Option<mpsc::Receiver<Batch>>,
    shutdown: ShutdownHandle,
    shutdown_rx: Option<mpsc::Receiver<()>>,
}

impl SlidingWindow {
    pub fn new(config: WindowConfig) -> SqlResult<SlidingWindow> {
        let (size, slide, offset) = match config.spec {
            WindowSpec::Sliding {
                size,
                slide,
                offset,
            } => (size, slide, offset),
            ref other => {
                return Err(SqlError::window_error(
                    format!("expected sliding spec, got {}", other.type_name()),
                    Some("sliding".to_string()),
                ));
            }
        };
        if size.is_zero() || slide.is_zero() {
            return Err(SqlError::window_error(
                "size and slide must be positive durations",
                Some("sliding".to_string()),
            ));
        }
        if slide > size {
            return Err(SqlError::window_error(
                "slide must not exceed size",
                Some("sliding".to_string()),
            ));
        }

        let (trigger_tx, trigger_rx) = mpsc::channel(TRIGGER_QUEUE_DEPTH);
        let (output_tx, output_rx) = mpsc::channel(OUTPUT_QUEUE_DEPTH);
        let (shutdown, shutdown_rx) = ShutdownHandle::new();

        Ok(SlidingWindow {
            config,
            size,
            slide,
            offset,
            state: Arc::new(Mutex::new(SlidingState {
                anchor: None,
                min_open: i64::MIN,
                slots: Vec::new(),
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
        state.anchor = None;
        state.min_open = i64::MIN;
        state.slots.clear();
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
        let size_n = self.size.as_nanos() as i64;
        let slide_n = self.slide.as_nanos() as i64;
        let offset = self.offset;
        let slide = self.slide;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(slide);
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => {
                        debug!("sliding window dispatch loop cancelled");
                        return;
                    }
                    received = trigger_rx.recv() => {
                        let row = match received {
                            Some(row) => row,
                            None => {
                                debug!("sliding window trigger channel closed");
                                return;
                            }
                        };
                        on_row(&state, row, size_n, slide_n, offset).await;
                    }
                    _ = ticker.tick() => {
                        for batch in close_elapsed(&state, slide_n).await {
                            if output_tx.send(batch).await.is_err() {
                                warn!("sliding window output channel closed, stopping");
                                return;
                            }
                        }
                    }
                }
            }
        });
    }
}

/// Materialize every sequence slot containing `row` and add the row to each.
async fn on_row(state: &Mutex<SlidingState>, row: Row, size_n: i64, slide_n: i64, offset: Duration) {
    let ts = to_nanos(row.timestamp);
    let mut guard = state.lock().await;

    let anchor = *guard.anchor.get_or_insert_with(|| {
        to_nanos(crate::streamql::utils::time::align_floor_offset(
            row.timestamp,
            Duration::from_nanos(slide_n as u64),
            offset,
        ))
    });

    // sequence slots with start <= ts < start + size
    let k_max = (ts - anchor).div_euclid(slide_n);
    let k_min = ((ts - size_n - anchor).div_euclid(slide_n) + 1).max(0);
    if k_max < k_min {
        debug!("row predates the first sliding slot, dropped");
        return;
    }

    for k in k_min..=k_max {
        let start = anchor + k * slide_n;
        if start < guard.min_open {
            continue;
        }
        let slot = TimeSlot::new(from_nanos(start), from_nanos(start + size_n));
        let idx = match guard
            .slots
            .iter()
            .position(|open| open.slot.start >= slot.start)
        {
            Some(i) if guard.slots[i].slot == slot => i,
            Some(i) => {
                guard.slots.insert(
                    i,
                    SlotBuffer {
                        slot,
                        rows: Vec::new(),
                    },
                );
                i
            }
            None => {
                guard.slots.push(SlotBuffer {
                    slot,
                    rows: Vec::new(),
                });
                guard.slots.len() - 1
            }
        };
        let mut tagged = row.clone();
        tagged.slot = Some(slot);
        guard.slots[idx].rows.push(tagged);
    }
}

/// Close every open slot whose end has passed, in slot-end order. Empty
/// slots close silently.
async fn close_elapsed(state: &Mutex<SlidingState>, slide_n: i64) -> Vec<Batch> {
    let now = Utc::now();
    let mut guard = state.lock().await;
    let mut batches = Vec::new();

    while let Some(front) = guard.slots.first() {
        if front.slot.end > now {
            break;
        }
        let closed = guard.slots.remove(0);
        guard.min_open = guard.min_open.max(to_nanos(closed.slot.start) + slide_n);
        if !closed.rows.is_empty() {
            batches.push(closed.rows);
        }
    }
    batches
}
