//! The Pitchside resolution-and-quality engine.
//!
//! Wires the ingestion components together over any [`IngestStore`]:
//! the rule & schema registry (read-through cache), the quality gate,
//! the identity resolver, the merge engine, and the match fact updater.
//! [`pipeline::IngestPipeline`] runs a batch of records through them in
//! order and audits every decision.
//!
//! [`IngestStore`]: pitchside_core::store::IngestStore

pub mod error;
pub mod facts;
pub mod gate;
pub mod merge;
pub mod pipeline;
pub mod registry;
pub mod resolve;

pub use error::{EngineError, Result};
pub use gate::{GateAggregates, GateContext};
pub use pipeline::{IngestPipeline, RecordOutcome, RunSummary};
pub use registry::Registry;
pub use resolve::{Resolution, Resolved, Resolver, ResolverConfig};
