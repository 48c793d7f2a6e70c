//! # PVAC Common Library
//!
//! Shared code for the PVAC (Product Visual Attribute Consensus) crates:
//! - Error type shared by library and binaries
//! - TOML bootstrap configuration and its resolution
//! - Logging initialization
//! - Deterministic id helpers

pub mod config;
pub mod error;
pub mod logging;
pub mod uuid_utils;

pub use error::{Error, Result};
