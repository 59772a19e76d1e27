//! Shared run state
//!
//! Tracks every pipeline run's position in the
//! `FetchPending -> PricePending -> CombinePending -> Done` machine
//! (`Failed` is reachable from any state) and holds the completion channels
//! the orchestrator waits on. Workers advance state as messages move
//! between lanes; nothing else is shared across stage boundaries.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, info, warn};

use crate::domain::{Product, RequestId, RunState};

#[derive(Default)]
struct RunEntry {
    state: Option<RunState>,
    started_at: Option<DateTime<Utc>>,
    chain_tx: Option<oneshot::Sender<Vec<Product>>>,
    save_tx: Option<oneshot::Sender<Result<(), String>>>,
}

/// Registry of in-flight pipeline runs.
#[derive(Default)]
pub struct RunRegistry {
    runs: Mutex<HashMap<RequestId, RunEntry>>,
}

impl RunRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new chain run and returns its completion channel.
    pub async fn register_chain(&self, request_id: RequestId) -> oneshot::Receiver<Vec<Product>> {
        let (tx, rx) = oneshot::channel();
        let mut runs = self.runs.lock().await;
        let entry = runs.entry(request_id).or_default();
        entry.state = Some(RunState::FetchPending);
        entry.started_at = Some(Utc::now());
        entry.chain_tx = Some(tx);
        rx
    }

    /// Registers a persistence wait for an already-known run.
    pub async fn register_save(
        &self,
        request_id: RequestId,
    ) -> oneshot::Receiver<Result<(), String>> {
        let (tx, rx) = oneshot::channel();
        let mut runs = self.runs.lock().await;
        let entry = runs.entry(request_id).or_default();
        entry.save_tx = Some(tx);
        rx
    }

    /// Moves a run to the given state.
    pub async fn advance(&self, request_id: RequestId, state: RunState) {
        let mut runs = self.runs.lock().await;
        if let Some(entry) = runs.get_mut(&request_id) {
            debug!("Run {request_id} -> {state}");
            entry.state = Some(state);
        }
    }

    pub async fn state(&self, request_id: RequestId) -> Option<RunState> {
        self.runs.lock().await.get(&request_id).and_then(|e| e.state)
    }

    /// Completes the chain, delivering the final product list to the
    /// waiting caller. Duplicate completion is a no-op.
    pub async fn complete_chain(&self, request_id: RequestId, products: Vec<Product>) {
        let mut runs = self.runs.lock().await;
        let Some(entry) = runs.get_mut(&request_id) else {
            warn!("Completion for unknown run {request_id}");
            return;
        };
        // A run the caller already gave up on stays failed.
        if entry.state != Some(RunState::Failed) {
            entry.state = Some(RunState::Done);
        }
        if let Some(started_at) = entry.started_at {
            let elapsed_ms = (Utc::now() - started_at).num_milliseconds();
            info!(
                "Run {request_id} resolved with {} products in {elapsed_ms}ms",
                products.len()
            );
        }
        if let Some(tx) = entry.chain_tx.take() {
            // The caller may have timed out and dropped the receiver.
            let _ = tx.send(products);
        }
    }

    /// Completes the persistence wait for a run.
    pub async fn complete_save(&self, request_id: RequestId, result: Result<(), String>) {
        let mut runs = self.runs.lock().await;
        let Some(entry) = runs.get_mut(&request_id) else {
            warn!("Save completion for unknown run {request_id}");
            return;
        };
        if let Some(tx) = entry.save_tx.take() {
            let _ = tx.send(result);
        }
    }

    /// Marks a run failed. In-flight stage work is not aborted; a late
    /// completion for a failed run is ignored by the (dropped) receiver.
    pub async fn fail(&self, request_id: RequestId) {
        let mut runs = self.runs.lock().await;
        if let Some(entry) = runs.get_mut(&request_id) {
            entry.state = Some(RunState::Failed);
            entry.chain_tx = None;
        }
    }

    /// Drops a finished run's bookkeeping.
    pub async fn remove(&self, request_id: RequestId) {
        self.runs.lock().await.remove(&request_id);
    }
}
