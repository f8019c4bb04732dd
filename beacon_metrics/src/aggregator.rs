//! Buffered metrics pipeline.
//!
//! Producers hand [`MetricEvent`]s to [`MetricsAggregator::record`], which
//! pushes into a bounded channel without waiting. A single flush worker owns
//! the receiving end and the sink; it emits a batch when `max_batch_size`
//! events have accumulated or when `flush_interval` has passed since the last
//! flush. [`MetricsAggregator::stop`] drains what is left, bounded by a
//! deadline.

use crate::http::{http_request_events, InFlightTracker};
use crate::sampler::{self, SystemSampler};
use crate::stats::{PipelineStats, StatsSnapshot};
use beacon_config::MetricsConfig;
use beacon_core::{AggregatorState, DynSink, MetricEvent, PipelineError, Result, StateCell};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub const DEFAULT_CAPACITY: usize = 1000;
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_BATCH_SIZE: usize = 500;
pub const DEFAULT_SAMPLING_INTERVAL: Duration = Duration::from_secs(30);

/// At most one "buffer full" warning per window.
const DROP_WARNING_WINDOW: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregatorConfig {
    pub capacity: usize,
    pub flush_interval: Duration,
    pub max_batch_size: usize,
    pub sampling_interval: Duration,
}

impl AggregatorConfig {
    pub fn new(capacity: usize, flush_interval: Duration, max_batch_size: usize) -> Self {
        Self {
            capacity,
            flush_interval,
            max_batch_size,
            sampling_interval: DEFAULT_SAMPLING_INTERVAL,
        }
    }

    pub fn with_sampling_interval(mut self, interval: Duration) -> Self {
        self.sampling_interval = interval;
        self
    }

    /// Replaces zero sizes and intervals with the defaults.
    pub fn normalized(self) -> Self {
        Self {
            capacity: non_zero(self.capacity, DEFAULT_CAPACITY),
            flush_interval: non_zero_duration(self.flush_interval, DEFAULT_FLUSH_INTERVAL),
            max_batch_size: non_zero(self.max_batch_size, DEFAULT_MAX_BATCH_SIZE),
            sampling_interval: non_zero_duration(self.sampling_interval, DEFAULT_SAMPLING_INTERVAL),
        }
    }
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_FLUSH_INTERVAL, DEFAULT_MAX_BATCH_SIZE)
    }
}

impl From<&MetricsConfig> for AggregatorConfig {
    fn from(config: &MetricsConfig) -> Self {
        Self::new(
            config.buffer_capacity,
            config.flush_interval,
            config.max_batch_size,
        )
        .with_sampling_interval(config.sampling_interval)
    }
}

fn non_zero(value: usize, default: usize) -> usize {
    if value == 0 {
        default
    } else {
        value
    }
}

fn non_zero_duration(value: Duration, default: Duration) -> Duration {
    if value.is_zero() {
        default
    } else {
        value
    }
}

/// How a call to [`MetricsAggregator::stop`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Every buffered event was handed to the sink and the sink was closed.
    Drained,
    /// The deadline passed first; whatever was still buffered is discarded.
    TimedOut,
    /// The flush worker died before it could finish draining.
    WorkerFailed,
    /// Another call already stopped, or is stopping, the pipeline.
    AlreadyStopped,
}

/// Sending half of the pipeline, shared with the system sampler.
#[derive(Debug)]
pub(crate) struct Producer {
    tx: mpsc::Sender<MetricEvent>,
    state: Arc<StateCell>,
    stats: Arc<PipelineStats>,
    epoch: Instant,
    // millis since `epoch` of the last full-buffer warning, offset by one so
    // that zero means "never warned"
    last_drop_warning: AtomicU64,
}

impl Producer {
    pub(crate) fn record(&self, event: MetricEvent) {
        if !self.state.is(AggregatorState::Running) {
            self.stats.record_dropped();
            debug!(name = event.name(), "metrics pipeline not running, dropping metric");
            return;
        }

        match self.tx.try_send(event) {
            Ok(()) => self.stats.record_accepted(),
            Err(TrySendError::Full(event)) => {
                let dropped = self.stats.record_dropped();
                self.warn_buffer_full(&event, dropped);
            }
            Err(TrySendError::Closed(event)) => {
                self.stats.record_dropped();
                debug!(name = event.name(), "metrics buffer closed, dropping metric");
            }
        }
    }

    /// Events sitting in the channel, not yet picked up by the worker.
    pub(crate) fn queued(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    fn warn_buffer_full(&self, event: &MetricEvent, dropped: u64) {
        let now = self.epoch.elapsed().as_millis() as u64 + 1;
        let last = self.last_drop_warning.load(Ordering::Relaxed);

        if last != 0 && now.saturating_sub(last) < DROP_WARNING_WINDOW.as_millis() as u64 {
            return;
        }

        if self
            .last_drop_warning
            .compare_exchange(last, now, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
        {
            warn!(
                kind = %event.kind(),
                name = event.name(),
                dropped_total = dropped,
                "Metrics buffer is full, dropping metric"
            );
        }
    }
}

pub struct MetricsAggregator {
    producer: Arc<Producer>,
    state: Arc<StateCell>,
    stats: Arc<PipelineStats>,
    config: AggregatorConfig,
    sink_name: String,
    in_flight: InFlightTracker,
    shutdown: CancellationToken,
    abandon: CancellationToken,
    // events the worker holds in its batch that no sink call has seen yet
    pending: Arc<AtomicUsize>,
    sampler_started: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl MetricsAggregator {
    /// Connects the sink and starts the flush worker.
    ///
    /// If the sink cannot be reached the error is returned and nothing is
    /// spawned.
    pub async fn start(mut sink: DynSink, config: AggregatorConfig) -> Result<Self> {
        let config = config.normalized();
        let sink_name = sink.name().to_string();

        sink.connect().await.map_err(|e| match e {
            PipelineError::SinkUnavailable(_) => e,
            other => PipelineError::SinkUnavailable(format!("{}: {}", sink_name, other)),
        })?;

        let (tx, rx) = mpsc::channel(config.capacity);
        let state = Arc::new(StateCell::new());
        let stats = Arc::new(PipelineStats::new());
        let shutdown = CancellationToken::new();
        let abandon = CancellationToken::new();
        let pending = Arc::new(AtomicUsize::new(0));

        let worker = FlushWorker {
            rx,
            sink,
            batch: Vec::with_capacity(config.max_batch_size),
            max_batch_size: config.max_batch_size,
            flush_interval: config.flush_interval,
            stats: Arc::clone(&stats),
            shutdown: shutdown.clone(),
            abandon: abandon.clone(),
            pending: Arc::clone(&pending),
        };
        let handle = tokio::spawn(worker.run());

        state.advance(AggregatorState::Created);

        info!(
            sink = %sink_name,
            capacity = config.capacity,
            flush_interval = ?config.flush_interval,
            max_batch_size = config.max_batch_size,
            "Metrics aggregator started"
        );

        let producer = Arc::new(Producer {
            tx,
            state: Arc::clone(&state),
            stats: Arc::clone(&stats),
            epoch: Instant::now(),
            last_drop_warning: AtomicU64::new(0),
        });

        Ok(Self {
            producer,
            state,
            stats,
            config,
            sink_name,
            in_flight: InFlightTracker::new(),
            shutdown,
            abandon,
            pending,
            sampler_started: AtomicBool::new(false),
            worker: Mutex::new(Some(handle)),
        })
    }

    /// Queues one event. Never blocks and never fails; when the buffer is
    /// full the event is dropped and counted.
    pub fn record(&self, event: MetricEvent) {
        self.producer.record(event);
    }

    pub fn record_http(
        &self,
        method: &str,
        path: &str,
        status: u16,
        duration: Duration,
        response_size: u64,
    ) {
        for event in http_request_events(method, path, status, duration, response_size) {
            self.producer.record(event);
        }
    }

    pub fn in_flight(&self) -> &InFlightTracker {
        &self.in_flight
    }

    /// Starts the periodic process sampler. Returns `false` if it is already
    /// running or the pipeline is not.
    pub fn start_system_sampling(&self) -> bool {
        if !self.state.is(AggregatorState::Running) {
            return false;
        }

        if self
            .sampler_started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("system sampling already started");
            return false;
        }

        let sampler = SystemSampler::new(self.in_flight.clone());
        tokio::spawn(sampler::run(
            sampler,
            Arc::clone(&self.producer),
            self.config.sampling_interval,
            self.shutdown.clone(),
        ));

        info!(interval = ?self.config.sampling_interval, "System metrics sampling started");
        true
    }

    /// Drains the buffer into the sink and shuts the pipeline down.
    ///
    /// Waits at most `timeout` for the final flush. A sink call still in
    /// progress at the deadline is left to finish on its own, but nothing
    /// after it is emitted; the events behind it are counted as discarded
    /// before this returns. Safe to call repeatedly.
    pub async fn stop(&self, timeout: Duration) -> ShutdownOutcome {
        if !self.state.advance(AggregatorState::Running) {
            debug!(state = %self.state.get(), "metrics aggregator already stopped");
            return ShutdownOutcome::AlreadyStopped;
        }

        info!(sink = %self.sink_name, "Stopping metrics aggregator");
        self.shutdown.cancel();

        let worker = self.worker.lock().ok().and_then(|mut guard| guard.take());

        let outcome = match worker {
            Some(handle) => match tokio::time::timeout(timeout, handle).await {
                Ok(Ok(())) => {
                    info!("Metrics aggregator shutdown completed");
                    ShutdownOutcome::Drained
                }
                Ok(Err(e)) => {
                    error!(error = %e, "Flush worker terminated abnormally");
                    ShutdownOutcome::WorkerFailed
                }
                Err(_) => {
                    self.abandon.cancel();
                    let discarded =
                        self.producer.queued() + self.pending.swap(0, Ordering::AcqRel);
                    self.stats.record_discarded(discarded);
                    self.stats.record_shutdown_timeout();
                    warn!(
                        timeout = ?timeout,
                        discarded,
                        "Metrics aggregator shutdown timed out, discarding buffered metrics"
                    );
                    ShutdownOutcome::TimedOut
                }
            },
            None => ShutdownOutcome::WorkerFailed,
        };

        self.state.advance(AggregatorState::Draining);
        outcome
    }

    pub fn state(&self) -> AggregatorState {
        self.state.get()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    pub fn sink_name(&self) -> &str {
        &self.sink_name
    }
}

impl Drop for MetricsAggregator {
    fn drop(&mut self) {
        // lets the worker drain in the background if stop() was never called
        self.shutdown.cancel();
    }
}

/// The single consumer of the event buffer.
struct FlushWorker {
    rx: mpsc::Receiver<MetricEvent>,
    sink: DynSink,
    batch: Vec<MetricEvent>,
    max_batch_size: usize,
    flush_interval: Duration,
    stats: Arc<PipelineStats>,
    shutdown: CancellationToken,
    abandon: CancellationToken,
    pending: Arc<AtomicUsize>,
}

impl FlushWorker {
    async fn run(mut self) {
        let first_tick = tokio::time::Instant::now() + self.flush_interval;
        let mut ticker = tokio::time::interval_at(first_tick, self.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => break,

                _ = ticker.tick() => {
                    if !self.batch.is_empty() {
                        self.flush().await;
                    }
                }

                received = self.rx.recv() => match received {
                    Some(event) => {
                        self.push(event);
                        if self.batch.len() >= self.max_batch_size {
                            self.flush().await;
                            ticker.reset();
                        }
                    }
                    None => break,
                },
            }
        }

        self.drain().await;
    }

    fn push(&mut self, event: MetricEvent) {
        self.batch.push(event);
        self.pending.store(self.batch.len(), Ordering::Release);
    }

    async fn flush(&mut self) {
        let size = self.batch.len();
        // once handed to the sink these events are its to emit or fail
        self.pending.store(0, Ordering::Release);

        match self.sink.emit_batch(&self.batch).await {
            Ok(()) => {
                self.stats.record_flush(size);
                debug!(sink = self.sink.name(), size, "Flushed metrics batch");
            }
            Err(e) => {
                self.stats.record_emit_failure(size);
                error!(
                    sink = self.sink.name(),
                    batch_size = size,
                    error = %e,
                    "Failed to emit metrics batch"
                );
            }
        }

        self.batch.clear();
    }

    async fn drain(mut self) {
        info!("Processing final metrics before shutdown");
        self.rx.close();

        while !self.abandon.is_cancelled() {
            match self.rx.recv().await {
                Some(event) => {
                    self.push(event);
                    if self.batch.len() >= self.max_batch_size {
                        self.flush().await;
                    }
                }
                None => break,
            }
        }

        if !self.batch.is_empty() && !self.abandon.is_cancelled() {
            self.flush().await;
        }

        if self.abandon.is_cancelled() {
            // already counted by stop() when the deadline passed
            self.batch.clear();
            while self.rx.try_recv().is_ok() {}
            debug!("Dropped buffered metrics left after shutdown deadline");
        }

        match self.sink.close().await {
            Ok(()) => debug!(sink = self.sink.name(), "Metrics sink closed"),
            Err(e) => error!(sink = self.sink.name(), error = %e, "Error closing metrics sink"),
        }
    }
}
