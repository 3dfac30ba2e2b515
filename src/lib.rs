// Copyright (c) 2025 - Cowboy AI, Inc.
//! Infrastructure topology registry for the Composable Information Machine
//!
//! Providers, regions, zones, networks, applications, services, deployments
//! and their relatives form a strict ownership hierarchy. Every entity is
//! keyed by a human-readable composite id derived from its place in that
//! hierarchy (`app1:web:api`), and this crate keeps that id space correct
//! under mutation:
//!
//! - [`domain`] - identifier codec, CIDR blocks, entity records, invariants
//! - [`schema`] - the entity graph: parents, discriminants, edges
//! - [`allocator`] - deterministic CIDR bin packing
//! - [`cascade`] - id changes propagated through descendants and pointers
//! - [`store`] - SQLite tables derived from the entity graph
//! - [`registry`] - one transaction per create/rename/update/delete/allocate
//! - [`service`] - async facade with conflict retry and change events

pub mod allocator;
pub mod cascade;
pub mod config;
pub mod domain;
pub mod errors;
pub mod events;
pub mod registry;
pub mod schema;
pub mod service;
pub mod store;

// Re-export commonly used types
pub use cascade::{IdRemap, PointerRewrite, RenameOutcome};
pub use config::RegistryConfig;
pub use domain::{Cidr, Entity, EntityId, EntityPatch, EntityRef, EntityType, NewEntity, RenameTarget};
pub use errors::{TopologyError, TopologyResult};
pub use events::TopologyEvent;
pub use registry::TopologyRegistry;
pub use schema::EntityGraph;
pub use service::{RegistryService, ServiceError, TopologyService};
