//! pvac-ai library interface
//!
//! Visual attribute analysis of product images: per-image vision analysis,
//! normalization and validation, and product-level consensus with explicit
//! uncertainty and disagreement signaling.

pub mod aggregation;
pub mod cache;
pub mod config;
pub mod error;
pub mod export;
pub mod input;
pub mod normalize;
pub mod pipeline;
pub mod prompts;
pub mod schema;
pub mod types;
pub mod vision;

pub use crate::aggregation::{aggregate, synthesize, ConfidenceReport};
pub use crate::error::{AnalysisError, AnalysisResult};
pub use crate::types::{AggregationResult, ImageRef, PerImageRecord};
