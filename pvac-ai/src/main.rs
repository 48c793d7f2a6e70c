//! pvac-ai - Product visual attribute analysis CLI
//!
//! Subcommands:
//! - `analyze`: analyze explicit image sources (URLs or files) for one product
//! - `folder`: analyze every image in a directory
//! - `aggregate`: aggregate a JSON file of per-image records offline

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use pvac_ai::aggregation::consensus::aggregate;
use pvac_ai::cache::ResultCache;
use pvac_ai::export::{export_product_result, export_product_value, ExportOptions, ExportPaths};
use pvac_ai::input::{list_images_in_folder, load_images};
use pvac_ai::pipeline::analyze_product;
use pvac_ai::prompts::PromptSet;
use pvac_ai::vision::{build_client, Provider};
use pvac_common::config::{load_config, TomlConfig};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Command-line arguments for pvac-ai
#[derive(Parser, Debug)]
#[command(name = "pvac-ai")]
#[command(about = "Visual attribute consensus for product images")]
#[command(version)]
struct Cli {
    /// TOML config file (overrides PVAC_CONFIG and the platform default)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze explicit image sources for one product
    Analyze {
        /// Image URLs or local file paths
        #[arg(required = true)]
        sources: Vec<String>,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Analyze every image in a directory
    Folder {
        /// Directory containing product images
        dir: PathBuf,

        /// Include subdirectories
        #[arg(long)]
        recursive: bool,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Aggregate a JSON array of per-image records and export the result
    Aggregate {
        /// JSON file with per-image records
        input: PathBuf,

        #[command(flatten)]
        output: OutputArgs,
    },
}

/// Options for live analysis runs
#[derive(Args, Debug)]
struct RunArgs {
    /// Vision provider: mock, openai or gemini
    #[arg(long, env = "PVAC_PROVIDER")]
    provider: Option<Provider>,

    /// Model name (provider default when omitted)
    #[arg(long)]
    model: Option<String>,

    /// Images analyzed concurrently
    #[arg(long)]
    concurrency: Option<usize>,

    /// Disable the per-image result cache
    #[arg(long)]
    no_cache: bool,

    /// Also write the per-image records to <product_id>.images.json
    #[arg(long)]
    save_records: bool,

    #[command(flatten)]
    output: OutputArgs,
}

/// Options controlling exported files
#[derive(Args, Debug)]
struct OutputArgs {
    /// Product id (random UUID when omitted)
    #[arg(long)]
    product_id: Option<String>,

    /// Output directory (TOML output_dir when omitted)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Also write a one-row CSV summary
    #[arg(long)]
    csv: bool,

    /// Metadata entries stored with the result
    #[arg(long = "meta", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    metadata: Vec<(String, String)>,
}

impl OutputArgs {
    fn export_options(&self, config: &TomlConfig) -> ExportOptions {
        let metadata: Map<String, Value> = self
            .metadata
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();

        ExportOptions {
            product_id: self.product_id.clone(),
            metadata,
            output_dir: self
                .output_dir
                .clone()
                .unwrap_or_else(|| config.output_dir.clone()),
            as_csv: self.csv,
        }
    }
}

fn parse_key_value(s: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", s))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{}'", s));
    }
    Ok((key.to_string(), value.trim().to_string()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref()).context("Failed to load configuration")?;
    pvac_common::logging::init_logging("pvac_ai", &config.logging)
        .context("Failed to initialize logging")?;

    info!("Starting pvac-ai v{}", env!("CARGO_PKG_VERSION"));

    let paths = match cli.command {
        Command::Analyze { sources, run } => {
            let images = load_images(&sources)?;
            run_analysis(images, &run, &config).await?
        }
        Command::Folder { dir, recursive, run } => {
            let files = list_images_in_folder(&dir, recursive)?;
            if files.is_empty() {
                bail!("No images found in {}", dir.display());
            }
            let sources: Vec<String> = files
                .iter()
                .map(|p| p.to_string_lossy().into_owned())
                .collect();
            let images = load_images(&sources)?;
            run_analysis(images, &run, &config).await?
        }
        Command::Aggregate { input, output } => aggregate_file(&input, &output, &config)?,
    };

    println!("{}", paths.json.display());
    if let Some(csv) = &paths.csv {
        println!("{}", csv.display());
    }

    Ok(())
}

/// Analyze images, aggregate and export
async fn run_analysis(
    images: Vec<pvac_ai::ImageRef>,
    run: &RunArgs,
    config: &TomlConfig,
) -> Result<ExportPaths> {
    let provider = match run.provider {
        Some(provider) => provider,
        None => config.provider.parse::<Provider>()?,
    };
    let client = build_client(provider, run.model.clone(), config)?;

    let cache = (config.cache_enabled && !run.no_cache).then(|| Arc::new(ResultCache::new(false)));
    let concurrency = run.concurrency.unwrap_or_else(|| config.effective_concurrency());

    let cancel = CancellationToken::new();
    let ctrl_c_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Received Ctrl+C, cancelling images not yet started");
            ctrl_c_token.cancel();
        }
    });

    let analysis = analyze_product(
        &images,
        &PromptSet::standard(),
        client,
        cache,
        concurrency,
        Some(cancel),
    )
    .await;

    let options = run.output.export_options(config);
    let paths = export_product_result(&analysis.aggregation, &options)?;

    if run.save_records {
        let records_path = options
            .output_dir
            .join(format!("{}.images.json", paths.product_id));
        let content = serde_json::to_string_pretty(&analysis.records)?;
        std::fs::write(&records_path, content)
            .with_context(|| format!("Failed to write {}", records_path.display()))?;
        info!("Per-image records written to {}", records_path.display());
    }

    Ok(paths)
}

/// Aggregate per-image records from a JSON file and export
///
/// Accepts a bare array of records or an object with a `records` array.
fn aggregate_file(input: &Path, output: &OutputArgs, config: &TomlConfig) -> Result<ExportPaths> {
    let content = std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let value: Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", input.display()))?;

    let records = match value {
        Value::Array(records) => records,
        Value::Object(mut map) => match map.remove("records") {
            Some(Value::Array(records)) => records,
            _ => {
                // An already aggregated result (e.g. a historical export)
                info!("Input is not a record list; exporting it as an aggregate");
                let aggregated = map.remove("result").unwrap_or(Value::Object(map));
                return Ok(export_product_value(&aggregated, &output.export_options(config))?);
            }
        },
        _ => bail!("{} must contain a JSON array of per-image records", input.display()),
    };

    info!("Aggregating {} records from {}", records.len(), input.display());
    let aggregation = aggregate(&records);
    Ok(export_product_result(&aggregation, &output.export_options(config))?)
}
