//! Pipeline orchestrator
//!
//! Owns the broker topology, the worker pool and the run registry. A chain
//! is started by publishing its first stage message; each consumed message
//! advances the run's state and feeds the next lane until the combine stage
//! completes the run. The orchestrator never retries a failed stage - the
//! caller observes the chain through a bounded wait and owns re-submission.
//! Persistence is dispatched separately, after the chain resolves.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info};

use crate::catalog::api::CatalogApi;
use crate::domain::{PipelineRequest, Product, RequestId, RunState};
use crate::importer;
use crate::infrastructure::config::PipelineConfig;
use crate::pipeline::broker::{BrokerError, MessageBroker, MessageQueue, StageQueues};
use crate::pipeline::messages::{SaveMessage, Stage, StageMessage};
use crate::pipeline::state::RunRegistry;
use crate::pipeline::workers::{
    CombineWorker, PriceFetchWorker, ProcessedMessages, ProductFetchWorker, StageOutcome,
    StageWorker,
};

/// Orchestration errors - the only failures visible to the top-level caller.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("pipeline chain timed out after {timeout_secs}s")]
    ChainTimeout { timeout_secs: u64 },

    #[error("pipeline chain failed before completion")]
    ChainFailed,

    #[error("persistence timed out after {timeout_secs}s")]
    SaveTimeout { timeout_secs: u64 },

    #[error("persistence failed: {0}")]
    SaveFailed(String),

    #[error(transparent)]
    Broker(#[from] BrokerError),
}

/// Chains the fetch, price and combine stages through the message broker.
pub struct PipelineOrchestrator {
    broker: Arc<MessageBroker>,
    registry: Arc<RunRegistry>,
    config: PipelineConfig,
    consumer_handles: Vec<JoinHandle<()>>,
}

impl PipelineOrchestrator {
    /// Builds the broker topology and starts the worker pool.
    pub async fn new(api: Arc<dyn CatalogApi>, config: PipelineConfig) -> Self {
        let broker = Arc::new(MessageBroker::new(config.queue_capacity));
        let registry = Arc::new(RunRegistry::new());
        let processed = Arc::new(ProcessedMessages::new());

        let StageQueues {
            fetch,
            prices,
            combine,
            save,
        } = broker.bind_stage_queues().await;

        let mut consumer_handles = Vec::new();
        let workers = config.workers_per_stage.max(1);

        let fetch_worker: Arc<dyn StageWorker> = Arc::new(ProductFetchWorker::new(Arc::clone(&api)));
        let price_worker: Arc<dyn StageWorker> =
            Arc::new(PriceFetchWorker::new(Arc::clone(&api), &config));
        let combine_worker: Arc<dyn StageWorker> = Arc::new(CombineWorker);

        for (queue, worker) in [
            (fetch, fetch_worker),
            (prices, price_worker),
            (combine, combine_worker),
        ] {
            for _ in 0..workers {
                consumer_handles.push(tokio::spawn(consume_stage(
                    queue.clone(),
                    Arc::clone(&worker),
                    Arc::clone(&broker),
                    Arc::clone(&registry),
                    Arc::clone(&processed),
                )));
            }
        }

        // Persistence shares no routing-key isolation: one lane, one worker.
        consumer_handles.push(tokio::spawn(consume_save(
            save,
            Arc::clone(&registry),
            Arc::clone(&processed),
        )));

        Self {
            broker,
            registry,
            config,
            consumer_handles,
        }
    }

    /// Starts a chain and returns once its first message is queued.
    async fn submit(
        &self,
        request: &PipelineRequest,
    ) -> Result<tokio::sync::oneshot::Receiver<Vec<Product>>, PipelineError> {
        let receiver = self.registry.register_chain(request.request_id).await;

        info!(
            "Submitting pipeline run {} (category {}, city {})",
            request.request_id, request.category_id, request.city_id
        );
        self.broker
            .publish(StageMessage::FetchProducts {
                request_id: request.request_id,
                category_id: request.category_id.clone(),
                city_id: request.city_id.clone(),
                min_goods: request.min_goods,
            })
            .await?;

        Ok(receiver)
    }

    /// Runs the whole chain, waiting up to the configured chain timeout.
    ///
    /// On timeout the run is marked failed but in-flight stage work is not
    /// aborted; a late completion is discarded.
    pub async fn run(&self, request: &PipelineRequest) -> Result<Vec<Product>, PipelineError> {
        let receiver = self.submit(request).await?;
        let timeout_secs = self.config.chain_timeout_secs;

        match timeout(Duration::from_secs(timeout_secs), receiver).await {
            Ok(Ok(products)) => Ok(products),
            Ok(Err(_)) => Err(PipelineError::ChainFailed),
            Err(_) => {
                self.registry.fail(request.request_id).await;
                Err(PipelineError::ChainTimeout { timeout_secs })
            }
        }
    }

    /// Dispatches persistence for a resolved chain and waits for it.
    pub async fn save(
        &self,
        request_id: RequestId,
        products: Vec<Product>,
        path: impl Into<PathBuf>,
    ) -> Result<(), PipelineError> {
        let receiver = self.registry.register_save(request_id).await;
        self.broker
            .publish_save(SaveMessage {
                request_id,
                products,
                path: path.into(),
            })
            .await?;

        let timeout_secs = self.config.chain_timeout_secs;
        match timeout(Duration::from_secs(timeout_secs), receiver).await {
            Ok(Ok(Ok(()))) => {
                self.registry.remove(request_id).await;
                Ok(())
            }
            Ok(Ok(Err(message))) => Err(PipelineError::SaveFailed(message)),
            Ok(Err(_)) => Err(PipelineError::SaveFailed(
                "persistence worker went away".to_string(),
            )),
            Err(_) => Err(PipelineError::SaveTimeout { timeout_secs }),
        }
    }

    /// Current state of a run, if it is known to the registry.
    pub async fn run_state(&self, request_id: RequestId) -> Option<RunState> {
        self.registry.state(request_id).await
    }
}

impl Drop for PipelineOrchestrator {
    fn drop(&mut self) {
        for handle in &self.consumer_handles {
            handle.abort();
        }
    }
}

/// Consumer loop for one chain stage queue.
async fn consume_stage(
    queue: MessageQueue<StageMessage>,
    worker: Arc<dyn StageWorker>,
    broker: Arc<MessageBroker>,
    registry: Arc<RunRegistry>,
    processed: Arc<ProcessedMessages>,
) {
    while let Some(message) = queue.recv().await {
        let request_id = message.request_id();
        let stage = message.stage();

        if !processed.first_delivery(request_id, stage).await {
            debug!("Duplicate delivery of {} for run {request_id}, ignoring", stage.name());
            continue;
        }

        match worker.handle(message).await {
            Ok(StageOutcome::Forward(next)) => {
                let next_state = match next.stage() {
                    Stage::FetchPrices => RunState::PricePending,
                    Stage::CombineProducts => RunState::CombinePending,
                    Stage::FetchProducts | Stage::SaveProducts => RunState::FetchPending,
                };
                registry.advance(request_id, next_state).await;
                if let Err(e) = broker.publish(next).await {
                    error!("Failed to forward run {request_id} to the next stage: {e}");
                    registry.fail(request_id).await;
                }
            }
            Ok(StageOutcome::Completed(products)) => {
                registry.complete_chain(request_id, products).await;
            }
            Err(e) => {
                error!("Stage {} failed for run {request_id}: {e}", stage.name());
                registry.fail(request_id).await;
            }
        }
    }
}

/// Consumer loop for the persistence lane.
async fn consume_save(
    queue: MessageQueue<SaveMessage>,
    registry: Arc<RunRegistry>,
    processed: Arc<ProcessedMessages>,
) {
    while let Some(message) = queue.recv().await {
        let SaveMessage {
            request_id,
            products,
            path,
        } = message;

        if !processed.first_delivery(request_id, Stage::SaveProducts).await {
            debug!("Duplicate delivery of save for run {request_id}, ignoring");
            continue;
        }

        let result = importer::save(&products, &path)
            .await
            .map_err(|e| e.to_string());
        if let Err(e) = &result {
            error!("Failed to save products for run {request_id}: {e}");
        }
        registry.complete_save(request_id, result).await;
    }
}
