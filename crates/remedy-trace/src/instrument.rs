//! Step and tool instrumentation
//!
//! A pipeline stage implements [`Stage`]; wrapping it in [`Instrumented`] at
//! composition time gives it timing and a `step` trace event. Tool calls
//! inside a stage go through [`Tracer::tool`], failures through
//! [`Tracer::error`].

use crate::error::{Result, TraceError};
use crate::store::TraceStore;
use crate::types::{EventKind, RunId};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

/// Handle that appends events for one run
#[derive(Debug, Clone)]
pub struct Tracer {
    store: Arc<TraceStore>,
    run_id: RunId,
}

impl Tracer {
    /// Create a tracer bound to `run_id`
    #[inline]
    #[must_use]
    pub fn new(store: Arc<TraceStore>, run_id: RunId) -> Self {
        Self { store, run_id }
    }

    /// Run being traced
    #[inline]
    #[must_use]
    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// Underlying store
    #[inline]
    #[must_use]
    pub fn store(&self) -> &Arc<TraceStore> {
        &self.store
    }

    /// Time `f` and record it as a `tool` event
    ///
    /// # Errors
    /// Storage errors from the append, or a serialization error on the output.
    pub fn tool<T, F>(&self, tool: &str, args: Value, f: F) -> Result<T>
    where
        T: Serialize,
        F: FnOnce() -> T,
    {
        let started = Instant::now();
        let output = f();
        let latency_ms = elapsed_ms(started);
        self.record_tool(tool, args, serde_json::to_value(&output)?, latency_ms)?;
        Ok(output)
    }

    /// Append a `tool` event for an invocation timed by the caller
    ///
    /// # Errors
    /// Storage errors from the append.
    pub fn record_tool(&self, tool: &str, args: Value, output: Value, latency_ms: u64) -> Result<u64> {
        self.store.append_event(
            &self.run_id,
            EventKind::Tool {
                tool: tool.to_string(),
                args,
                output,
                latency_ms,
            },
        )
    }

    /// Append an `error` event
    ///
    /// # Errors
    /// Storage errors from the append.
    pub fn error(&self, message: impl Into<String>, context: Value) -> Result<u64> {
        self.store.append_event(
            &self.run_id,
            EventKind::Error {
                message: message.into(),
                context,
            },
        )
    }

    /// Append a `step` event
    ///
    /// # Errors
    /// Storage errors from the append.
    pub fn record_step(&self, agent: &str, input: Value, output: Value, latency_ms: u64) -> Result<u64> {
        self.store.append_event(
            &self.run_id,
            EventKind::Step {
                agent: agent.to_string(),
                step_id: uuid::Uuid::new_v4().to_string(),
                input,
                output,
                latency_ms,
            },
        )
    }
}

/// A unit of pipeline work that can be instrumented
pub trait Stage {
    /// Stage input, recorded on the step event
    type Input: Serialize;
    /// Stage output, recorded on the step event
    type Output: Serialize;
    /// Stage error; must absorb trace failures
    type Error: From<TraceError>;

    /// Agent name recorded on the step event
    fn agent(&self) -> &'static str;

    /// Execute the stage
    ///
    /// # Errors
    /// Stage-specific failures.
    fn run(&self, tracer: &Tracer, input: Self::Input) -> std::result::Result<Self::Output, Self::Error>;
}

/// Timing/trace adapter around a [`Stage`]
#[derive(Debug, Clone)]
pub struct Instrumented<S> {
    inner: S,
}

impl<S: Stage> Instrumented<S> {
    /// Wrap a stage
    #[inline]
    #[must_use]
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    /// Wrapped stage
    #[inline]
    #[must_use]
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Run the stage and append a `step` event once it returns
    ///
    /// A stage that fails records no step event.
    ///
    /// # Errors
    /// The stage's own error, or a trace error converted into it.
    pub fn run(&self, tracer: &Tracer, input: S::Input) -> std::result::Result<S::Output, S::Error> {
        let input_value = serde_json::to_value(&input).map_err(TraceError::from)?;
        let started = Instant::now();
        let output = self.inner.run(tracer, input)?;
        let latency_ms = elapsed_ms(started);
        let output_value = serde_json::to_value(&output).map_err(TraceError::from)?;
        tracer.record_step(self.inner.agent(), input_value, output_value, latency_ms)?;
        tracing::debug!(
            run_id = %tracer.run_id(),
            agent = self.inner.agent(),
            latency_ms,
            "stage finished"
        );
        Ok(output)
    }
}

/// Whole milliseconds since `started`, saturating
#[must_use]
pub fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
