//! Product-level aggregation
//!
//! `consensus` fuses per-image records into an [`AggregationResult`];
//! `confidence` collapses that result into one overall score with notes.
//!
//! [`AggregationResult`]: crate::types::AggregationResult

pub mod confidence;
pub mod consensus;

pub use confidence::{synthesize, synthesize_legacy, synthesize_value, ConfidenceReport, LegacyAggregate};
pub use consensus::{aggregate, majority_vote, ConsensusAggregator};
