//! Configuration resolution for pvac-ai
//!
//! Vision API keys resolve with ENV → TOML priority. Both a plain and a
//! `PVAC_`-prefixed environment variable are accepted per provider.

use pvac_common::config::{ProviderConfig, TomlConfig};
use pvac_common::{Error, Result};
use tracing::{info, warn};

/// Environment variables checked for the OpenAI key, in priority order
pub const OPENAI_KEY_VARS: [&str; 2] = ["PVAC_OPENAI_API_KEY", "OPENAI_API_KEY"];

/// Environment variables checked for the Gemini key, in priority order
pub const GEMINI_KEY_VARS: [&str; 2] = ["PVAC_GEMINI_API_KEY", "GEMINI_API_KEY"];

/// Resolve the OpenAI API key
pub fn resolve_openai_api_key(toml_config: &TomlConfig) -> Result<String> {
    resolve_api_key("OpenAI", &OPENAI_KEY_VARS, &toml_config.openai, "openai")
}

/// Resolve the Gemini API key
pub fn resolve_gemini_api_key(toml_config: &TomlConfig) -> Result<String> {
    resolve_api_key("Gemini", &GEMINI_KEY_VARS, &toml_config.gemini, "gemini")
}

/// Resolve an API key from environment variables, then TOML
fn resolve_api_key(
    provider: &str,
    env_vars: &[&str],
    toml_section: &ProviderConfig,
    toml_table: &str,
) -> Result<String> {
    let mut sources = Vec::new();

    // Tier 1: Environment (first valid variable wins)
    let env_key = env_vars.iter().find_map(|var| {
        std::env::var(var)
            .ok()
            .filter(|k| is_valid_key(k))
            .map(|k| (*var, k))
    });
    if let Some((var, _)) = &env_key {
        sources.push(format!("environment ({})", var));
    }

    // Tier 2: TOML config
    let toml_key = toml_section.api_key.as_deref().filter(|k| is_valid_key(k));
    if toml_key.is_some() {
        sources.push("TOML".to_string());
    }

    if sources.len() > 1 {
        warn!(
            "{} API key found in multiple sources: {}. Using {} (highest priority).",
            provider,
            sources.join(", "),
            sources[0]
        );
    }

    if let Some((var, key)) = env_key {
        info!("{} API key loaded from environment variable {}", provider, var);
        return Ok(key.trim().to_string());
    }

    if let Some(key) = toml_key {
        info!("{} API key loaded from TOML config", provider);
        return Ok(key.trim().to_string());
    }

    Err(Error::Config(format!(
        "{} API key not configured. Set one of:\n\
         1. Environment: {}=your-key\n\
         2. TOML config: [{}] api_key = \"your-key\"",
        provider,
        env_vars.join(" or "),
        toml_table
    )))
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}
