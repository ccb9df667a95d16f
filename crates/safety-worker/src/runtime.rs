//! Wires the store, classifier, and orchestrator together for the CLI.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use safety_core::{
    load_conditions_file, ChatCompletionsClassifier, DocumentStore, EngineConfig,
    EscalationOrchestrator, EscalationQueue, EventBus, IncidentRecorder,
    SharedDocumentStore, SharedEscalationOrchestrator, SharedEventBus,
};

pub struct WorkerRuntime {
    config: EngineConfig,
    store: SharedDocumentStore,
    events: SharedEventBus,
    orchestrator: SharedEscalationOrchestrator,
    store_path: Option<PathBuf>,
}

impl WorkerRuntime {
    pub async fn build(
        config_path: Option<&Path>,
        store_path: Option<&Path>,
        conditions_path: Option<&Path>,
    ) -> Result<Self> {
        let config = match config_path {
            Some(path) => EngineConfig::load(path)
                .with_context(|| format!("loading config from {}", path.display()))?,
            None => EngineConfig::default(),
        };
        config.validate().context("invalid engine config")?;

        let store = open_store(store_path).await?;
        if let Some(path) = conditions_path {
            let conditions = load_conditions_file(path)
                .with_context(|| format!("reading conditions from {}", path.display()))?;
            store
                .seed_conditions(&conditions)
                .await
                .context("seeding escalation conditions")?;
            info!(count = conditions.len(), "Escalation conditions seeded");
        }

        let classifier = ChatCompletionsClassifier::new(config.classifier.clone())
            .context("building classifier client")?;
        let events = EventBus::new().shared();
        let orchestrator = EscalationOrchestrator::new(
            store.clone(),
            store.clone(),
            Arc::new(classifier),
            IncidentRecorder::new(store.clone()),
            events.clone(),
            config.clone(),
        )
        .shared();

        Ok(Self {
            config,
            store,
            events,
            orchestrator,
            store_path: store_path.map(Path::to_path_buf),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &SharedDocumentStore {
        &self.store
    }

    pub fn events(&self) -> &SharedEventBus {
        &self.events
    }

    pub fn orchestrator(&self) -> &SharedEscalationOrchestrator {
        &self.orchestrator
    }

    pub fn start_queue(&self) -> EscalationQueue {
        EscalationQueue::start(self.orchestrator.clone(), self.config.queue_capacity)
    }

    /// Save the store snapshot, if one was requested.
    pub async fn persist(&self) -> Result<()> {
        if let Some(path) = &self.store_path {
            self.store
                .save_snapshot(path)
                .await
                .with_context(|| format!("saving store snapshot to {}", path.display()))?;
        }
        Ok(())
    }
}

async fn open_store(path: Option<&Path>) -> Result<SharedDocumentStore> {
    let Some(path) = path else {
        return Ok(DocumentStore::new().shared());
    };
    match DocumentStore::load_snapshot(path)
        .await
        .with_context(|| format!("loading store snapshot from {}", path.display()))?
    {
        Some(store) => {
            info!(path = %path.display(), "Store snapshot loaded");
            Ok(store.shared())
        }
        None => {
            warn!(path = %path.display(), "No store snapshot found; starting empty");
            Ok(DocumentStore::new().shared())
        }
    }
}
