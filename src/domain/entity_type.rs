// Copyright (c) 2025 - Cowboy AI, Inc.
//! Topology Entity Type Taxonomy
//!
//! Closed set of entity types the registry knows about. The structural
//! relationships between them live in [`crate::schema::EntityGraph`]; this
//! module only names them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Topology entity type
///
/// Each variant maps to one relational table whose name is [`EntityType::as_str`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    // Roots
    Environment,
    Application,
    ProviderType,
    AllocationType,
    RepoType,
    Language,
    DeploymentTargetType,

    // Infrastructure hierarchy
    Provider,
    Region,
    Zone,
    Partition,
    Network,
    Subnet,
    DeploymentTarget,
    Fleet,

    // Application hierarchy
    Stack,
    Service,
    Proc,
    Repo,
    Deployment,
    Release,
    Config,
    DeploymentProc,
    Allocation,
}

impl EntityType {
    /// Every entity type, roots first
    pub const ALL: [EntityType; 24] = [
        Self::Environment,
        Self::Application,
        Self::ProviderType,
        Self::AllocationType,
        Self::RepoType,
        Self::Language,
        Self::DeploymentTargetType,
        Self::Provider,
        Self::Region,
        Self::Zone,
        Self::Partition,
        Self::Network,
        Self::Subnet,
        Self::DeploymentTarget,
        Self::Fleet,
        Self::Stack,
        Self::Service,
        Self::Proc,
        Self::Repo,
        Self::Deployment,
        Self::Release,
        Self::Config,
        Self::DeploymentProc,
        Self::Allocation,
    ];

    /// Get the canonical string representation (also the table name)
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Environment => "environment",
            Self::Application => "application",
            Self::ProviderType => "provider_type",
            Self::AllocationType => "allocation_type",
            Self::RepoType => "repo_type",
            Self::Language => "language",
            Self::DeploymentTargetType => "deployment_target_type",
            Self::Provider => "provider",
            Self::Region => "region",
            Self::Zone => "zone",
            Self::Partition => "partition",
            Self::Network => "network",
            Self::Subnet => "subnet",
            Self::DeploymentTarget => "deployment_target",
            Self::Fleet => "fleet",
            Self::Stack => "stack",
            Self::Service => "service",
            Self::Proc => "proc",
            Self::Repo => "repo",
            Self::Deployment => "deployment",
            Self::Release => "release",
            Self::Config => "config",
            Self::DeploymentProc => "deployment_proc",
            Self::Allocation => "allocation",
        }
    }

    /// Get a human-readable display name
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Environment => "Environment",
            Self::Application => "Application",
            Self::ProviderType => "Provider Type",
            Self::AllocationType => "Allocation Type",
            Self::RepoType => "Repository Type",
            Self::Language => "Language",
            Self::DeploymentTargetType => "Deployment Target Type",
            Self::Provider => "Provider",
            Self::Region => "Region",
            Self::Zone => "Zone",
            Self::Partition => "Partition",
            Self::Network => "Network",
            Self::Subnet => "Subnet",
            Self::DeploymentTarget => "Deployment Target",
            Self::Fleet => "Fleet",
            Self::Stack => "Stack",
            Self::Service => "Service",
            Self::Proc => "Process",
            Self::Repo => "Repository",
            Self::Deployment => "Deployment",
            Self::Release => "Release",
            Self::Config => "Config",
            Self::DeploymentProc => "Deployment Process",
            Self::Allocation => "Allocation",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown entity type: {}", s))
    }
}
