//! Domain module - Core business entities
//!
//! Contains the entities that travel through the harvest pipeline and the
//! identifiers used to correlate one pipeline run across stages.

pub mod product;

pub use product::{PipelineRequest, PriceRecord, Product, RequestId, RunState};
