// Copyright (c) 2025 - Cowboy AI, Inc.
//! Topology Domain Models
//!
//! Value objects and records shared by every layer of the registry.
//!
//! # Value Objects with Invariants
//!
//! - [`EntityId`] - Composite `:`-joined identifier with validated segments
//! - [`IdShape`] - Per-type identifier shape (inherited + own segments)
//! - [`Cidr`] - IPv4/IPv6 network block in canonical form
//! - [`EntityType`] - Topology entity taxonomy
//!
//! # Records
//!
//! - [`Entity`] - Stored topology node
//! - [`NewEntity`], [`RenameTarget`], [`EntityPatch`] - Mutation requests

pub mod cidr;
pub mod entity;
pub mod entity_type;
pub mod identifier;
pub mod invariants;

pub use cidr::{AddressFamily, Cidr, CidrError};
pub use entity::{Entity, EntityPatch, EntityRef, NewEntity, RenameTarget};
pub use entity_type::EntityType;
pub use identifier::{compose, decompose, validate_segment, EntityId, IdShape, IdentifierError, DELIMITER};
pub use invariants::ValidationResult;
