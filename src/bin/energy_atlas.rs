//! Energy Atlas operator tool
//!
//! Inspects a data root and prints JSON reports to stdout.
//!
//! ## Configuration
//!
//! Environment variables:
//! - `ATLAS_DATA_ROOT`: data root (default: ./data)
//! - `NEO4J_URI` and friends: metadata graph, see `energy_atlas::config`
//! - `RUST_LOG`: Log level filter (default: info)
//! - `LOG_FORMAT`: "json" for structured logs, "pretty" for development (default: json)
//!
//! ## Usage
//!
//! ```bash
//! energy_atlas domains
//! energy_atlas stats solar
//! energy_atlas pyramid solar --id solar_20240101_000000_000000 --scales 64,128,256
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use energy_atlas::loader::sink_from_env;
use energy_atlas::{AtlasConfig, AtlasLoader, METADATA_SCHEMA_VERSION};

/// Inspect an energy atlas data root
#[derive(Parser)]
#[command(name = "energy_atlas")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Data root containing `energy_maps/`
    #[arg(long, global = true, env = "ATLAS_DATA_ROOT")]
    data_root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List domains
    Domains,
    /// List map ids of a domain
    Maps {
        /// Domain name
        domain: String,
    },
    /// Aggregate energy and entropy statistics of a domain
    Stats {
        /// Domain name
        domain: String,
    },
    /// Compute a pyramid for one map and report each level
    Pyramid {
        /// Domain name
        domain: String,
        /// Map id (default: latest)
        #[arg(long)]
        id: Option<String>,
        /// Target scales
        #[arg(long, value_delimiter = ',', default_values_t = [64u32, 128, 256])]
        scales: Vec<u32>,
    },
}

/// Initialize the tracing subscriber with JSON or pretty format
fn init_tracing() {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "json".to_string());

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "energy_atlas=info,neo4rs=warn".into());

    // Logs go to stderr so stdout stays valid JSON.
    if log_format == "pretty" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .flatten_event(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let mut config = AtlasConfig::from_env();
    if let Some(root) = cli.data_root {
        config.data_root = root;
    }

    let loader = AtlasLoader::new(config.clone(), sink_from_env())?;

    let report = match cli.command {
        Commands::Domains => json!({ "domains": loader.list_domains()? }),
        Commands::Maps { domain } => json!({
            "domain": domain,
            "maps": loader.list_maps(&domain)?,
        }),
        Commands::Stats { domain } => json!({
            "domain": domain,
            "stats": loader.get_domain_stats(&domain)?,
        }),
        Commands::Pyramid { domain, id, scales } => {
            let (map, metadata) = loader
                .load_map(&domain, id.as_deref(), config.default_scale)
                .with_context(|| format!("loading map from domain '{domain}'"))?;
            let pyramid = loader.precompute_pyramids(&map, &scales)?;
            let source_total = map.total();
            let levels: Vec<_> = pyramid
                .iter()
                .map(|(scale, layer)| {
                    json!({
                        "scale": scale,
                        "shape": layer.energy.shape(),
                        "total": layer.energy.total(),
                        "grad_magnitude_max": layer
                            .grad_magnitude
                            .array()
                            .fold(0.0_f64, |acc, v| acc.max(*v)),
                    })
                })
                .collect();
            json!({
                "schema_version": METADATA_SCHEMA_VERSION,
                "metadata": metadata,
                "source_total": source_total,
                "fingerprint": pyramid.fingerprint(),
                "levels": levels,
            })
        }
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
