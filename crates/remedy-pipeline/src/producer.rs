//! Background stream producer
//!
//! Emits generated log records into an [`IngestionSink`] at a fixed rate
//! on its own thread. `stop` wakes the loop through a channel and waits a
//! bounded time for it to exit.

use crate::error::Result;
use crate::failure::{FailureInjection, FailureSnapshot};
use crate::ingest::IngestionSink;
use crate::record::LogRecordGenerator;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Default emission rate
pub const DEFAULT_EVENTS_PER_SECOND: f64 = 2.0;

/// Upper bound on how long `stop` waits for the worker
pub const STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// Observable producer state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProducerStatus {
    pub running: bool,
    pub total_events: u64,
    pub events_per_second: f64,
    pub failure_modes: FailureSnapshot,
}

struct Worker {
    handle: JoinHandle<()>,
    stop_tx: Sender<()>,
    done_rx: Receiver<()>,
}

/// Fixed-rate record producer
pub struct StreamProducer {
    sink: Arc<dyn IngestionSink>,
    failures: Arc<FailureInjection>,
    generator: Arc<Mutex<LogRecordGenerator>>,
    rate_bits: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
    total: Arc<AtomicU64>,
    worker: Mutex<Option<Worker>>,
}

impl StreamProducer {
    /// Producer writing to `sink`, not yet started
    #[must_use]
    pub fn new(sink: Arc<dyn IngestionSink>, failures: Arc<FailureInjection>) -> Self {
        Self {
            sink,
            failures,
            generator: Arc::new(Mutex::new(LogRecordGenerator::default())),
            rate_bits: Arc::new(AtomicU64::new(DEFAULT_EVENTS_PER_SECOND.to_bits())),
            running: Arc::new(AtomicBool::new(false)),
            total: Arc::new(AtomicU64::new(0)),
            worker: Mutex::new(None),
        }
    }

    /// Replace the record generator
    #[must_use]
    pub fn with_generator(self, generator: LogRecordGenerator) -> Self {
        *self.generator.lock() = generator;
        self
    }

    /// Set the emission rate; non-positive or non-finite values are ignored
    pub fn set_rate(&self, events_per_second: f64) {
        if events_per_second.is_finite() && events_per_second > 0.0 {
            self.rate_bits
                .store(events_per_second.to_bits(), Ordering::SeqCst);
        } else {
            tracing::warn!(events_per_second, "ignoring invalid producer rate");
        }
    }

    /// Start the worker thread; no-op if already running
    ///
    /// # Errors
    /// `Spawn` if the OS refuses a new thread.
    pub fn start(&self) -> Result<()> {
        let mut worker = self.worker.lock();
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        // a worker left over from a timed-out stop has already been told to exit
        worker.take();

        let (stop_tx, stop_rx) = channel::bounded::<()>(1);
        let (done_tx, done_rx) = channel::bounded::<()>(1);
        let sink = Arc::clone(&self.sink);
        let failures = Arc::clone(&self.failures);
        let generator = Arc::clone(&self.generator);
        let rate_bits = Arc::clone(&self.rate_bits);
        let running = Arc::clone(&self.running);
        let total = Arc::clone(&self.total);

        let spawned = thread::Builder::new()
            .name("remedy-producer".into())
            .spawn(move || {
                while running.load(Ordering::SeqCst) {
                    let record = generator.lock().generate(&failures.snapshot());
                    if let Err(e) = sink.insert(record) {
                        tracing::debug!(error = %e, "ingestion sink rejected record");
                    }
                    total.fetch_add(1, Ordering::SeqCst);

                    let rate = f64::from_bits(rate_bits.load(Ordering::SeqCst));
                    let interval = Duration::from_secs_f64((1.0 / rate).clamp(0.000_1, 3600.0));
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                let _ = done_tx.send(());
            });

        match spawned {
            Ok(handle) => {
                *worker = Some(Worker {
                    handle,
                    stop_tx,
                    done_rx,
                });
                tracing::info!(rate = self.rate(), "stream producer started");
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                Err(e.into())
            }
        }
    }

    /// Signal the worker to exit and join it within [`STOP_TIMEOUT`]
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        let Some(worker) = self.worker.lock().take() else {
            return;
        };
        let _ = worker.stop_tx.try_send(());

        match worker.done_rx.recv_timeout(STOP_TIMEOUT) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if worker.handle.join().is_err() {
                    tracing::error!("stream producer worker panicked");
                }
                tracing::info!(total = self.total_events(), "stream producer stopped");
            }
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!("stream producer did not stop in time; detaching");
            }
        }
    }

    #[inline]
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    #[inline]
    #[must_use]
    pub fn total_events(&self) -> u64 {
        self.total.load(Ordering::SeqCst)
    }

    #[inline]
    #[must_use]
    pub fn rate(&self) -> f64 {
        f64::from_bits(self.rate_bits.load(Ordering::SeqCst))
    }

    #[must_use]
    pub fn status(&self) -> ProducerStatus {
        ProducerStatus {
            running: self.is_running(),
            total_events: self.total_events(),
            events_per_second: self.rate(),
            failure_modes: self.failures.snapshot(),
        }
    }
}

impl Drop for StreamProducer {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for StreamProducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamProducer")
            .field("running", &self.is_running())
            .field("total_events", &self.total_events())
            .field("events_per_second", &self.rate())
            .finish_non_exhaustive()
    }
}
