// Copyright (c) 2025 - Cowboy AI, Inc.
//! Topology Store Initializer
//!
//! Self-checks the entity graph, creates (or opens) the topology database and
//! logs a per-type row summary.
//!
//! Run with: cargo run --bin topology-init
//!
//! Environment:
//! - `TOPOLOGY_DATABASE` - SQLite file (in-memory when unset)
//! - `TOPOLOGY_BUSY_TIMEOUT_MS`, `TOPOLOGY_MAX_CASCADE_ROWS`,
//!   `TOPOLOGY_CONFLICT_RETRIES`, `TOPOLOGY_EVENT_CAPACITY`
//! - `RUST_LOG` - log filter

use anyhow::{Context, Result};
use cim_topology::{EntityGraph, RegistryConfig, TopologyRegistry};
use tracing::{info, warn};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let config = RegistryConfig::from_env().context("invalid topology configuration")?;

    let graph = EntityGraph::standard().context("entity graph self-check failed")?;
    info!(types = graph.schemas().count(), "Entity graph validated");

    match &config.database_path {
        Some(path) => info!("Topology database: {}", path.display()),
        None => warn!("TOPOLOGY_DATABASE not set, using an in-memory store"),
    }

    let registry = TopologyRegistry::with_graph(config, graph)
        .context("failed to open topology store")?;

    let mut total = 0;
    for (entity_type, count) in registry.counts().context("failed to count rows")? {
        info!("  {:<24} {:>8}", entity_type.as_str(), count);
        total += count;
    }
    info!(total, "Topology store ready");

    Ok(())
}
