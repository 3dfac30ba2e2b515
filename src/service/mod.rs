// Copyright (c) 2025 - Cowboy AI, Inc.
//! Service Layer for Topology Management
//!
//! Async application services that sit between collaborators (REST layer,
//! CLI, migration tooling) and the synchronous registry core.
//!
//! # Service Pattern
//!
//! Services coordinate between:
//! - **Registry**: validation, id computation and storage in one transaction
//! - **Blocking pool**: SQLite calls never run on async worker threads
//! - **Event channel**: committed changes fan out to in-process subscribers
//!
//! # Example
//!
//! ```rust
//! use cim_topology::domain::{EntityType, NewEntity};
//! use cim_topology::registry::TopologyRegistry;
//! use cim_topology::service::{RegistryService, TopologyService};
//! use uuid::Uuid;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let service = RegistryService::new(TopologyRegistry::in_memory()?);
//!     let mut events = service.subscribe();
//!
//!     let app = service
//!         .create_entity(NewEntity::root(EntityType::Application, "app1"), Uuid::now_v7())
//!         .await?;
//!
//!     let event = events.recv().await?;
//!     assert_eq!(event.subject_id(), &app.id);
//!     Ok(())
//! }
//! ```

pub mod topology;

pub use topology::{RegistryService, ServiceError, ServiceResult, TopologyService};
