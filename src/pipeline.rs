//! Pipeline module - routed message queues, workers and orchestration
//!
//! The fetch -> price -> combine chain runs as typed messages over
//! topic-routed in-process queues consumed by a worker pool. Routing keys
//! are derived from the request's city and category so concurrent runs for
//! distinct pairs occupy distinct logical lanes. Delivery is at-least-once;
//! every handler dedupes on the request id before doing any work.
//! Persistence rides a separate direct-routed lane dispatched by the caller
//! only after the chain resolves.

pub mod broker;
pub mod messages;
pub mod orchestrator;
pub mod state;
pub mod workers;

pub use messages::{SaveMessage, Stage, StageMessage};
pub use orchestrator::{PipelineError, PipelineOrchestrator};
