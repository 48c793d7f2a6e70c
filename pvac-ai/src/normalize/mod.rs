// Normalization Layer - Per-Image Model Output Cleanup
//
// Attributes are mapped to closed vocabularies; measurements are coerced
// and clamped. Both degrade to "uncertain"/null rather than failing.

pub mod attributes;
pub mod measurements;

pub use attributes::{normalize_attribute, parse_attributes};
pub use measurements::{normalize_score_item, parse_measurements, NormalizedScore};
