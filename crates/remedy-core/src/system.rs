//! Wiring of stores, pipeline, producer and orchestrator from a config

use crate::config::RemedyConfig;
use crate::error::Result;
use crate::orchestrator::Orchestrator;
use crate::remediation::signature::SignatureCache;
use remedy_adapter::AdapterRegistry;
use remedy_pipeline::{
    FailureInjection, IngestionBuffer, LogRecordGenerator, NoopSink, PipelineExecutor,
    StreamProducer, SyntheticSource, TelemetrySink,
};
use remedy_trace::TraceStore;
use std::sync::Arc;

/// A fully wired remediation system
///
/// Pipeline runs draw fresh batches from a [`SyntheticSource`] driven by
/// `failures`, and every retrieved record is mirrored into `ingestion`,
/// which the canary reads from. The `producer` feeds the same buffer.
#[derive(Debug)]
pub struct RemedySystem {
    pub orchestrator: Orchestrator,
    pub ingestion: Arc<IngestionBuffer>,
    pub failures: Arc<FailureInjection>,
    pub producer: StreamProducer,
}

impl RemedySystem {
    /// Open file-backed stores under `config.data_dir`
    ///
    /// # Errors
    /// Invalid configuration or unreadable persisted state.
    pub fn open(config: RemedyConfig) -> Result<Self> {
        config.validate()?;
        let store = TraceStore::open(config.runs_dir())?;
        let registry = AdapterRegistry::open(config.adapter_path())?;
        let signatures = SignatureCache::open(config.signatures_path())?;
        tracing::info!(data_dir = %config.data_dir.display(), "remediation system opened");
        Ok(Self::assemble(config, store, registry, signatures, Arc::new(NoopSink)))
    }

    /// Purely in-memory system
    ///
    /// # Errors
    /// Invalid configuration.
    pub fn in_memory(config: RemedyConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::assemble(
            config,
            TraceStore::in_memory(),
            AdapterRegistry::in_memory(),
            SignatureCache::in_memory(),
            Arc::new(NoopSink),
        ))
    }

    /// Wire a system around explicit stores and a telemetry sink
    #[must_use]
    pub fn assemble(
        config: RemedyConfig,
        store: TraceStore,
        registry: AdapterRegistry,
        signatures: SignatureCache,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        let ingestion = Arc::new(IngestionBuffer::with_capacity(config.ingestion_capacity));
        let failures = Arc::new(FailureInjection::new());
        let source = SyntheticSource::new(LogRecordGenerator::default(), Arc::clone(&failures));

        let executor = PipelineExecutor::new(Arc::new(store), Arc::new(registry), Arc::new(source))
            .with_recorder(ingestion.clone())
            .with_telemetry(telemetry);
        let orchestrator = Orchestrator::new(config, Arc::new(executor), ingestion.clone(), signatures);
        let producer = StreamProducer::new(ingestion.clone(), Arc::clone(&failures));

        Self {
            orchestrator,
            ingestion,
            failures,
            producer,
        }
    }
}
