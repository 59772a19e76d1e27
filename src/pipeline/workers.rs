//! Stage workers
//!
//! One thin handler per chain stage, each wrapping its catalog algorithm.
//! A handler blocks its worker for the duration of the stage's internal
//! fan-out; parallelism across runs comes from several workers consuming
//! the same queue. The queue layer delivers at-least-once, so handlers are
//! made idempotent by marking `(request_id, stage)` before doing any work.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::catalog::api::CatalogApi;
use crate::catalog::{combine, prices, products};
use crate::domain::{Product, RequestId};
use crate::infrastructure::config::PipelineConfig;
use crate::pipeline::messages::{Stage, StageMessage};

/// Worker processing errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum WorkerError {
    #[error("stage mismatch: {0}")]
    StageMismatch(&'static str),
}

/// What a stage handler produced: the next hop's message, or the final
/// product list when the chain is done.
#[derive(Debug)]
pub enum StageOutcome {
    Forward(StageMessage),
    Completed(Vec<Product>),
}

/// A chain stage handler.
#[async_trait]
pub trait StageWorker: Send + Sync {
    fn stage(&self) -> Stage;

    async fn handle(&self, message: StageMessage) -> Result<StageOutcome, WorkerError>;
}

/// Catalog fetch stage: enumerate in-stock products for the request.
pub struct ProductFetchWorker {
    api: Arc<dyn CatalogApi>,
}

impl ProductFetchWorker {
    #[must_use]
    pub fn new(api: Arc<dyn CatalogApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl StageWorker for ProductFetchWorker {
    fn stage(&self) -> Stage {
        Stage::FetchProducts
    }

    async fn handle(&self, message: StageMessage) -> Result<StageOutcome, WorkerError> {
        let StageMessage::FetchProducts {
            request_id,
            category_id,
            city_id,
            min_goods,
        } = message
        else {
            return Err(WorkerError::StageMismatch(
                "ProductFetchWorker only processes FetchProducts messages",
            ));
        };

        let fetched =
            products::fetch_products(self.api.as_ref(), &category_id, &city_id, min_goods).await;

        Ok(StageOutcome::Forward(StageMessage::FetchPrices {
            request_id,
            category_id,
            city_id,
            products: fetched,
        }))
    }
}

/// Price fetch stage: price the discovered products in bounded batches.
pub struct PriceFetchWorker {
    api: Arc<dyn CatalogApi>,
    batch_size: usize,
    max_concurrent_requests: usize,
}

impl PriceFetchWorker {
    #[must_use]
    pub fn new(api: Arc<dyn CatalogApi>, config: &PipelineConfig) -> Self {
        Self {
            api,
            batch_size: config.batch_size,
            max_concurrent_requests: config.max_concurrent_requests,
        }
    }
}

#[async_trait]
impl StageWorker for PriceFetchWorker {
    fn stage(&self) -> Stage {
        Stage::FetchPrices
    }

    async fn handle(&self, message: StageMessage) -> Result<StageOutcome, WorkerError> {
        let StageMessage::FetchPrices {
            request_id,
            category_id,
            city_id,
            products,
        } = message
        else {
            return Err(WorkerError::StageMismatch(
                "PriceFetchWorker only processes FetchPrices messages",
            ));
        };

        let product_ids: Vec<i64> = products.iter().map(|p| p.id).collect();
        let fetched = prices::fetch_prices(
            self.api.as_ref(),
            &product_ids,
            self.batch_size,
            self.max_concurrent_requests,
        )
        .await;

        Ok(StageOutcome::Forward(StageMessage::CombineProducts {
            request_id,
            category_id,
            city_id,
            products,
            prices: fetched,
        }))
    }
}

/// Combine stage: merge prices into products and finish the chain.
pub struct CombineWorker;

#[async_trait]
impl StageWorker for CombineWorker {
    fn stage(&self) -> Stage {
        Stage::CombineProducts
    }

    async fn handle(&self, message: StageMessage) -> Result<StageOutcome, WorkerError> {
        let StageMessage::CombineProducts {
            products, prices, ..
        } = message
        else {
            return Err(WorkerError::StageMismatch(
                "CombineWorker only processes CombineProducts messages",
            ));
        };

        let combined = combine::combine_product_and_prices(products, &prices);
        Ok(StageOutcome::Completed(combined))
    }
}

/// Duplicate-delivery guard shared by all workers of a pipeline.
#[derive(Default)]
pub struct ProcessedMessages {
    seen: Mutex<HashSet<(RequestId, Stage)>>,
}

impl ProcessedMessages {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` exactly once per `(request, stage)` pair; redelivered
    /// messages come back `false` and must be dropped by the consumer.
    pub async fn first_delivery(&self, request_id: RequestId, stage: Stage) -> bool {
        self.seen.lock().await.insert((request_id, stage))
    }
}
