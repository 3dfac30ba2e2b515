// Copyright (c) 2025 - Cowboy AI, Inc.
//! Registry configuration
//!
//! Loaded from environment variables by the `topology-init` binary, built in
//! code everywhere else.
//!
//! | Variable                     | Default     |
//! |------------------------------|-------------|
//! | `TOPOLOGY_DATABASE`          | in-memory   |
//! | `TOPOLOGY_BUSY_TIMEOUT_MS`   | 5000        |
//! | `TOPOLOGY_MAX_CASCADE_ROWS`  | 10000       |
//! | `TOPOLOGY_CONFLICT_RETRIES`  | 3           |
//! | `TOPOLOGY_EVENT_CAPACITY`    | 1024        |

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::errors::{TopologyError, TopologyResult};

pub const ENV_DATABASE: &str = "TOPOLOGY_DATABASE";
pub const ENV_BUSY_TIMEOUT_MS: &str = "TOPOLOGY_BUSY_TIMEOUT_MS";
pub const ENV_MAX_CASCADE_ROWS: &str = "TOPOLOGY_MAX_CASCADE_ROWS";
pub const ENV_CONFLICT_RETRIES: &str = "TOPOLOGY_CONFLICT_RETRIES";
pub const ENV_EVENT_CAPACITY: &str = "TOPOLOGY_EVENT_CAPACITY";

/// Configuration for the topology registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// SQLite database file (in-memory when `None`)
    pub database_path: Option<PathBuf>,

    /// How long a writer waits for the store lock before reporting a conflict
    pub busy_timeout_ms: u64,

    /// Upper bound on rows a single rename may recompute
    pub max_cascade_rows: usize,

    /// Automatic retries of conflicting writes in the async service
    pub conflict_retries: u32,

    /// Buffered events per subscriber
    pub event_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            busy_timeout_ms: 5_000,
            max_cascade_rows: 10_000,
            conflict_retries: 3,
            event_capacity: 1024,
        }
    }
}

impl RegistryConfig {
    /// In-memory configuration with defaults
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Use a database file
    pub fn with_database(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = Some(path.into());
        self
    }

    /// Set the store lock timeout
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the cascade row bound
    pub fn with_max_cascade_rows(mut self, rows: usize) -> Self {
        self.max_cascade_rows = rows;
        self
    }

    /// Set the conflict retry count
    pub fn with_conflict_retries(mut self, retries: u32) -> Self {
        self.conflict_retries = retries;
        self
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> TopologyResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> TopologyResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        Ok(Self {
            database_path: lookup(ENV_DATABASE)
                .filter(|path| !path.is_empty())
                .map(PathBuf::from),
            busy_timeout_ms: parse_var(&lookup, ENV_BUSY_TIMEOUT_MS, defaults.busy_timeout_ms)?,
            max_cascade_rows: parse_var(&lookup, ENV_MAX_CASCADE_ROWS, defaults.max_cascade_rows)?,
            conflict_retries: parse_var(&lookup, ENV_CONFLICT_RETRIES, defaults.conflict_retries)?,
            event_capacity: parse_var(&lookup, ENV_EVENT_CAPACITY, defaults.event_capacity)?,
        })
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> TopologyResult<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| TopologyError::Configuration(format!("{}={:?}: {}", key, raw, e))),
        None => Ok(default),
    }
}
