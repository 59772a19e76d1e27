//! fourpaws-harvester - Distributed product catalog harvester
//!
//! Harvests a retailer's product catalog for a given category and city:
//! resolves identifiers, paginates the remote catalog API, fetches pricing
//! in bounded-concurrency batches, combines the results and hands them to
//! a persistence step. The fetch -> price -> combine chain runs as typed
//! messages over routed in-process queues consumed by a worker pool.

// Module declarations
pub mod catalog;
pub mod domain;
pub mod importer;
pub mod infrastructure;
pub mod pipeline;

pub use domain::{PipelineRequest, PriceRecord, Product, RequestId};
pub use pipeline::orchestrator::PipelineOrchestrator;
