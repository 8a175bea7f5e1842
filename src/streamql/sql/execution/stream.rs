//! Stream orchestrator.
//!
//! Wires `filter → window → aggregator → sinks` from a runtime
//! configuration. Records enter through a bounded ingestion queue, the
//! window dispatch loop batches them, and an emission loop aggregates each
//! closed batch and fans the result rows out to every registered sink plus
//! the results channel.

use crate::streamql::sql::ast::SelectStatement;
use crate::streamql::sql::error::{SqlError, SqlResult};
use crate::streamql::sql::execution::aggregation::GroupAggregator;
use crate::streamql::sql::execution::config::StreamConfig;
use crate::streamql::sql::execution::expression::{DefaultExpressionEngine, ExpressionEngine};
use crate::streamql::sql::execution::filter::Filter;
use crate::streamql::sql::execution::types::Record;
use crate::streamql::sql::execution::window::Window;
use crate::streamql::sql::parser::Parser;
use log::{debug, info, warn};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::mpsc;

/// Depth of the ingestion queue; `add_data` blocks past this.
const INGEST_QUEUE_DEPTH: usize = 1024;

/// Depth of the results channel. Overflow drops batches rather than stall
/// a pipeline nobody is reading results from.
const RESULTS_QUEUE_DEPTH: usize = 64;

/// A sink callback, invoked with each emitted result batch.
pub type Sink = Arc<dyn Fn(&[Record]) + Send + Sync>;

enum WindowState {
    /// Built but not yet started.
    Pending(Box<Window>),
    /// Dispatch loop running.
    Running(Arc<Window>),
    /// Stopped or failed to start.
    Finished,
}

pub struct Stream {
    config: Arc<StreamConfig>,
    engine: Box<dyn ExpressionEngine>,
    filter: Arc<StdMutex<Filter>>,
    window: WindowState,
    sinks: Arc<StdMutex<Vec<Sink>>>,
    data_tx: mpsc::Sender<Record>,
    data_rx: Option<mpsc::Receiver<Record>>,
    results_tx: mpsc::Sender<Vec<Record>>,
    results_rx: Option<mpsc::Receiver<Vec<Record>>>,
    shutdown_tx: Vec<mpsc::Sender<()>>,
    shutdown_rx: Vec<mpsc::Receiver<()>>,
}

impl Stream {
    /// Build the pipeline for `config` with the default expression engine.
    /// Window construction errors surface here.
    pub fn new(config: StreamConfig) -> SqlResult<Stream> {
        Stream::with_engine(config, Box::new(DefaultExpressionEngine::new()))
    }

    /// Build the pipeline with a caller-provided expression engine.
    pub fn with_engine(
        config: StreamConfig,
        engine: Box<dyn ExpressionEngine>,
    ) -> SqlResult<Stream> {
        let window = Window::new(config.window.clone())?;
        let (data_tx, data_rx) = mpsc::channel(INGEST_QUEUE_DEPTH);
        let (results_tx, results_rx) = mpsc::channel(RESULTS_QUEUE_DEPTH);

        let mut shutdown_tx = Vec::new();
        let mut shutdown_rx = Vec::new();
        for _ in 0..2 {
            let (tx, rx) = mpsc::channel(1);
            shutdown_tx.push(tx);
            shutdown_rx.push(rx);
        }

        Ok(Stream {
            config: Arc::new(config),
            engine,
            filter: Arc::new(StdMutex::new(Filter::pass_through())),
            window: WindowState::Pending(Box::new(window)),
            sinks: Arc::new(StdMutex::new(Vec::new())),
            data_tx,
            data_rx: Some(data_rx),
            results_tx,
            results_rx: Some(results_rx),
            shutdown_tx,
            shutdown_rx,
        })
    }

    /// Compile `query` and build its pipeline in one step. Returns the
    /// stream with the WHERE predicate already registered.
    pub fn from_query(query: &str) -> SqlResult<Stream> {
        let statement: SelectStatement = Parser::new(query).parse()?;
        let (config, condition) = statement.to_stream_config()?;
        let mut stream = Stream::new(config)?;
        stream.register_filter(&condition)?;
        Ok(stream)
    }

    /// Runtime configuration this stream was built from.
    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Compile `condition` and install it as the filter predicate. An empty
    /// condition clears the filter.
    pub fn register_filter(&mut self, condition: &str) -> SqlResult<()> {
        let filter = Filter::compile(self.engine.as_ref(), condition)?;
        *self.filter.lock().expect("filter lock poisoned") = filter;
        Ok(())
    }

    /// Register a sink invoked with every emitted result batch.
    pub fn add_sink<F>(&self, sink: F)
    where
        F: Fn(&[Record]) + Send + Sync + 'static,
    {
        self.sinks
            .lock()
            .expect("sink lock poisoned")
            .push(Arc::new(sink));
    }

    /// Take the results channel. Result batches are also delivered here,
    /// best-effort once the channel fills up.
    pub fn get_results_channel(&mut self) -> Option<mpsc::Receiver<Vec<Record>>> {
        self.results_rx.take()
    }

    /// Feed one record into the pipeline. Blocks on ingestion-queue
    /// backpressure; fails once the stream is stopped.
    pub async fn add_data(&self, record: Record) -> SqlResult<()> {
        self.data_tx
            .send(record)
            .await
            .map_err(|_| SqlError::pipeline_error("ingest", "stream is stopped"))
    }

    /// Launch the window dispatch, ingestion, and emission loops.
    pub fn start(&mut self) {
        let mut window = match std::mem::replace(&mut self.window, WindowState::Finished) {
            WindowState::Pending(window) => *window,
            other => {
                self.window = other;
                return;
            }
        };

        window.start();
        let output_rx = match window.output_channel() {
            Some(rx) => rx,
            None => {
                warn!("window output channel already taken, stream not started");
                return;
            }
        };
        let window = Arc::new(window);
        self.window = WindowState::Running(Arc::clone(&window));

        info!(
            "starting {} window stream, group fields {:?}",
            self.config.window.spec.type_name(),
            self.config.group_fields
        );

        self.spawn_ingest_loop(window);
        self.spawn_emit_loop(output_rx);
    }

    /// Cancel every stage. Queued rows drain without further emissions.
    pub fn stop(&mut self) {
        for tx in &self.shutdown_tx {
            let _ = tx.try_send(());
        }
        if let WindowState::Running(window) = &self.window {
            window.stop();
        }
        self.window = WindowState::Finished;
        info!("stream stopped");
    }

    fn spawn_ingest_loop(&mut self, window: Arc<Window>) {
        let mut data_rx = match self.data_rx.take() {
            Some(rx) => rx,
            None => return,
        };
        let mut shutdown_rx = self.shutdown_rx.remove(0);
        let filter = Arc::clone(&self.filter);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => {
                        debug!("ingest loop cancelled");
                        return;
                    }
                    received = data_rx.recv() => {
                        let record = match received {
                            Some(record) => record,
                            None => {
                                debug!("ingestion channel closed");
                                return;
                            }
                        };
                        let passed = filter
                            .lock()
                            .expect("filter lock poisoned")
                            .matches(&record);
                        if !passed {
                            continue;
                        }
                        if window.add(record).await.is_err() {
                            debug!("window trigger channel closed, ingest loop exiting");
                            return;
                        }
                    }
                }
            }
        });
    }

    fn spawn_emit_loop(
        &mut self,
        mut output_rx: mpsc::Receiver<crate::streamql::sql::execution::window::Batch>,
    ) {
        let mut shutdown_rx = self.shutdown_rx.remove(0);
        let aggregator = GroupAggregator::new(Arc::clone(&self.config));
        let sinks = Arc::clone(&self.sinks);
        let results_tx = self.results_tx.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => {
                        debug!("emit loop cancelled");
                        return;
                    }
                    received = output_rx.recv() => {
                        let batch = match received {
                            Some(batch) => batch,
                            None => {
                                debug!("window output channel closed, emit loop exiting");
                                return;
                            }
                        };
                        let results = aggregator.aggregate(&batch);
                        if results.is_empty() {
                            continue;
                        }
                        debug!("emitting {} result rows", results.len());

                        // snapshot so slow sinks are invoked without the lock
                        let subscribers: Vec<Sink> = sinks
                            .lock()
                            .expect("sink lock poisoned")
                            .clone();
                        for sink in subscribers {
                            sink(&results);
                        }

                        if let Err(mpsc::error::TrySendError::Full(_)) =
                            results_tx.try_send(results)
                        {
                            debug!("results channel full, dropping batch");
                        }
                    }
                }
            }
        });
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        for tx in &self.shutdown_tx {
            let _ = tx.try_send(());
        }
        if let WindowState::Running(window) = &self.window {
            window.stop();
        }
    }
}
