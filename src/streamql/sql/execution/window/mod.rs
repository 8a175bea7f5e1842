//! Window variants and their shared contract.
//!
//! Every variant buffers rows, groups them into slot-delimited batches, and
//! pushes each closed batch to its output channel from a dispatch loop
//! started by [`Window::start`]. Producers only ever touch the trigger
//! queue; the buffer itself is owned by the dispatch loop behind a mutex so
//! `reset` can discard state concurrently.

pub mod counting;
pub mod session;
pub mod sliding;
pub mod tumbling;

use crate::streamql::sql::error::{SqlError, SqlResult};
use crate::streamql::sql::execution::config::{WindowConfig, WindowSpec};
use crate::streamql::sql::execution::types::{Record, Row};
use crate::streamql::utils::time::from_nanos;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

pub use counting::CountingWindow;
pub use session::SessionWindow;
pub use sliding::SlidingWindow;
pub use tumbling::TumblingWindow;

/// One closed batch: the rows of a single slot, tagged with that slot.
pub type Batch = Vec<Row>;

/// Depth of the per-window trigger queue. Producers block past this.
pub(crate) const TRIGGER_QUEUE_DEPTH: usize = 1024;

/// Depth of the batch output queue feeding the aggregator stage.
pub(crate) const OUTPUT_QUEUE_DEPTH: usize = 64;

/// The four window variants behind one dispatch surface.
pub enum Window {
    Tumbling(TumblingWindow),
    Sliding(SlidingWindow),
    Counting(CountingWindow),
    Session(SessionWindow),
}

impl Window {
    /// Build the window named by `config`. Invalid parameters fail here,
    /// synchronously.
    pub fn new(config: WindowConfig) -> SqlResult<Window> {
        match config.spec {
            WindowSpec::Tumbling { .. } => Ok(Window::Tumbling(TumblingWindow::new(config)?)),
            WindowSpec::Sliding { .. } => Ok(Window::Sliding(SlidingWindow::new(config)?)),
            WindowSpec::Counting { .. } => Ok(Window::Counting(CountingWindow::new(config)?)),
            WindowSpec::Session { .. } => Ok(Window::Session(SessionWindow::new(config)?)),
        }
    }

    /// Stamp `record` with its stream timestamp and hand it to the dispatch
    /// loop. Blocks once the trigger queue is full.
    pub async fn add(&self, record: Record) -> SqlResult<()> {
        let timestamp = extract_timestamp(&record, self.config().ts_prop.as_deref());
        let row = Row::new(record, timestamp);
        self.sender()
            .send(row)
            .await
            .map_err(|_| SqlError::pipeline_error("window", "trigger channel closed"))
    }

    /// Start the background dispatch loop.
    pub fn start(&mut self) {
        match self {
            Window::Tumbling(w) => w.start(),
            Window::Sliding(w) => w.start(),
            Window::Counting(w) => w.start(),
            Window::Session(w) => w.start(),
        }
    }

    /// Take the batch output channel. Yields each closed batch once.
    pub fn output_channel(&mut self) -> Option<mpsc::Receiver<Batch>> {
        match self {
            Window::Tumbling(w) => w.output_channel(),
            Window::Sliding(w) => w.output_channel(),
            Window::Counting(w) => w.output_channel(),
            Window::Session(w) => w.output_channel(),
        }
    }

    /// Discard all buffered rows and slot state.
    pub async fn reset(&self) {
        match self {
            Window::Tumbling(w) => w.reset().await,
            Window::Sliding(w) => w.reset().await,
            Window::Counting(w) => w.reset().await,
            Window::Session(w) => w.reset().await,
        }
    }

    /// Signal the dispatch loop to exit. Idempotent.
    pub fn stop(&self) {
        match self {
            Window::Tumbling(w) => w.stop(),
            Window::Sliding(w) => w.stop(),
            Window::Counting(w) => w.stop(),
            Window::Session(w) => w.stop(),
        }
    }

    fn config(&self) -> &WindowConfig {
        match self {
            Window::Tumbling(w) => w.config(),
            Window::Sliding(w) => w.config(),
            Window::Counting(w) => w.config(),
            Window::Session(w) => w.config(),
        }
    }

    fn sender(&self) -> &mpsc::Sender<Row> {
        match self {
            Window::Tumbling(w) => w.sender(),
            Window::Sliding(w) => w.sender(),
            Window::Counting(w) => w.sender(),
            Window::Session(w) => w.sender(),
        }
    }
}

/// Stream timestamp for `record`: the configured timestamp field when
/// present (instants directly, integers as nanoseconds since the epoch),
/// otherwise the arrival instant.
pub(crate) fn extract_timestamp(record: &Record, ts_prop: Option<&str>) -> DateTime<Utc> {
    use crate::streamql::sql::execution::types::FieldValue;

    if let Some(prop) = ts_prop {
        match record.get(prop) {
            Some(FieldValue::Timestamp(t)) => return *t,
            Some(FieldValue::Integer(n)) => return from_nanos(*n),
            _ => {}
        }
    }
    Utc::now()
}

/// Shutdown handle shared by every dispatch loop.
#[derive(Clone)]
pub(crate) struct ShutdownHandle {
    tx: mpsc::Sender<()>,
}

impl ShutdownHandle {
    pub(crate) fn new() -> (ShutdownHandle, mpsc::Receiver<()>) {
        let (tx, rx) = mpsc::channel(1);
        (ShutdownHandle { tx }, rx)
    }

    /// Request loop exit; a missing receiver means the loop already ended.
    pub(crate) fn signal(&self) {
        let _ = self.tx.try_send(());
    }
}

/// Sleep duration until `deadline`, zero if it already passed.
pub(crate) fn until(deadline: DateTime<Utc>) -> std::time::Duration {
    (deadline - Utc::now())
        .to_std()
        .unwrap_or(std::time::Duration::ZERO)
}
