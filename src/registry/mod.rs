// Copyright (c) 2025 - Cowboy AI, Inc.
//! Topology Registry
//!
//! Synchronous core of the system. Every public mutation:
//!
//! 1. opens one `BEGIN IMMEDIATE` transaction
//! 2. computes ids through the entity graph
//! 3. validates every row it writes
//! 4. commits, or rolls back completely on the first error
//!
//! # Example
//!
//! ```rust
//! use cim_topology::domain::{EntityId, EntityType, NewEntity, RenameTarget};
//! use cim_topology::registry::TopologyRegistry;
//!
//! let registry = TopologyRegistry::in_memory().unwrap();
//! let app = registry
//!     .create_entity(NewEntity::root(EntityType::Application, "app1"))
//!     .unwrap();
//! let stack = registry
//!     .create_entity(NewEntity::child(EntityType::Stack, app.id.clone(), ["web"]))
//!     .unwrap();
//!
//! let outcome = registry
//!     .rename_entity(&stack.id, RenameTarget::name("webapp"))
//!     .unwrap();
//! assert_eq!(outcome.new_id.as_str(), "app1:webapp");
//! ```

mod validate;

use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::allocator;
use crate::cascade::{CascadeRenamer, RenameOutcome};
use crate::config::RegistryConfig;
use crate::domain::{Entity, EntityId, EntityPatch, EntityType, NewEntity, RenameTarget};
use crate::errors::{TopologyError, TopologyResult};
use crate::schema::EntityGraph;
use crate::store::{SqliteStore, StoreTx};

use validate::{validate_entity, validate_identity};

/// Topology registry over a SQLite store
pub struct TopologyRegistry {
    store: SqliteStore,
    config: RegistryConfig,
}

impl TopologyRegistry {
    /// Open a registry over the standard entity catalogue
    pub fn open(config: RegistryConfig) -> TopologyResult<Self> {
        Self::with_graph(config, EntityGraph::standard()?)
    }

    /// Open a registry over a custom entity graph
    pub fn with_graph(config: RegistryConfig, graph: EntityGraph) -> TopologyResult<Self> {
        let store = SqliteStore::open(&config, Arc::new(graph))?;
        Ok(Self { store, config })
    }

    /// In-memory registry over the standard catalogue
    pub fn in_memory() -> TopologyResult<Self> {
        Self::open(RegistryConfig::in_memory())
    }

    pub fn graph(&self) -> &EntityGraph {
        self.store.graph()
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Create an entity, computing its id from parent and discriminants
    ///
    /// # Errors
    /// - `InvalidSegment`/`MalformedId` for bad discriminants
    /// - `DuplicateIdentifier` if the computed id exists
    /// - `ParentNotFound`, `ReferenceNotFound`, `TypeMismatch` for bad references
    /// - `InvalidCidr`, `CidrOutsideParent`, `CidrOverlap` for bad address blocks
    pub fn create_entity(&self, request: NewEntity) -> TopologyResult<Entity> {
        let entity = self.store.write(|tx| self.insert_new(tx, request))?;

        info!(
            entity_type = %entity.entity_type,
            id = %entity.id,
            "Entity created"
        );
        Ok(entity)
    }

    /// Change an entity's discriminants and/or parent, cascading the new id
    pub fn rename_entity(&self, id: &EntityId, target: RenameTarget) -> TopologyResult<RenameOutcome> {
        let outcome = self.store.write(|tx| {
            let entity = tx.require(id)?;
            let schema = tx.graph().schema(entity.entity_type)?;
            let (parent_id, discriminants) = target.resolve(&entity);
            validate_identity(schema, parent_id.as_ref(), &discriminants)?;

            let renamer = CascadeRenamer::new(tx.graph(), self.config.max_cascade_rows);
            let outcome = renamer.rename(tx, &entity, parent_id, discriminants, Utc::now())?;
            if outcome.is_noop() {
                return Ok(outcome);
            }

            // every row whose id or pointers changed must still satisfy every rule
            let mut touched: Vec<&EntityId> = outcome.remapped.iter().map(|r| &r.new_id).collect();
            touched.extend(outcome.pointer_updates.iter().map(|p| &p.id));
            touched.sort();
            touched.dedup();

            for id in touched {
                validate_entity(tx, &tx.require(id)?)?;
            }
            Ok(outcome)
        })?;

        if outcome.is_noop() {
            debug!(id = %outcome.old_id, "Rename is a no-op");
        } else {
            info!(
                old_id = %outcome.old_id,
                new_id = %outcome.new_id,
                remapped = outcome.remapped.len(),
                pointers = outcome.pointer_updates.len(),
                "Entity renamed"
            );
        }
        Ok(outcome)
    }

    /// Set or clear pointer fields and replace the defaults blob
    pub fn update_entity(&self, id: &EntityId, patch: EntityPatch) -> TopologyResult<Entity> {
        let entity = self.store.write(|tx| {
            let mut entity = tx.require(id)?;
            let schema = tx.graph().schema(entity.entity_type)?;

            for (field, value) in patch.pointers {
                if schema.pointer_field(&field).is_none() {
                    return Err(TopologyError::UnknownField {
                        entity_type: entity.entity_type,
                        field,
                    });
                }
                entity.pointers.insert(field, value);
            }
            if let Some(defaults) = patch.defaults {
                entity.defaults = defaults;
            }
            entity.updated_at = Utc::now();

            validate_entity(tx, &entity)?;
            tx.update_attributes(&entity)?;
            Ok(entity)
        })?;

        info!(entity_type = %entity.entity_type, id = %entity.id, "Entity updated");
        Ok(entity)
    }

    /// Delete an entity that nothing references
    ///
    /// # Errors
    /// - `NotFound` if the id is unknown
    /// - `HasDependents` if any child, key or pointer edge references it
    pub fn delete_entity(&self, id: &EntityId) -> TopologyResult<Entity> {
        let entity = self.store.write(|tx| {
            let entity = tx.require(id)?;
            let graph = tx.graph();

            let mut dependents = Vec::new();
            let edges = graph
                .child_edges(entity.entity_type)
                .iter()
                .chain(graph.key_edges(entity.entity_type))
                .chain(graph.pointer_edges(entity.entity_type));
            for edge in edges {
                if tx.count_where(*edge, id)? > 0 {
                    dependents.push(format!("{}.{}", edge.entity_type, edge.field));
                }
            }

            if !dependents.is_empty() {
                return Err(TopologyError::HasDependents {
                    id: id.clone(),
                    dependents,
                });
            }

            tx.delete(entity.entity_type, id)?;
            Ok(entity)
        })?;

        info!(entity_type = %entity.entity_type, id = %entity.id, "Entity deleted");
        Ok(entity)
    }

    /// Carve the lowest free block out of a network and record it as a subnet
    ///
    /// Allocation and insert share one transaction, so concurrent allocators
    /// on the same network never receive the same block.
    pub fn allocate_subnet(
        &self,
        network_id: &EntityId,
        additional_mask_bits: u8,
        name: &str,
    ) -> TopologyResult<Entity> {
        let subnet = self.store.write(|tx| {
            let network = tx.require(network_id)?;
            let graph = tx.graph();

            let edge = graph
                .child_edges(network.entity_type)
                .iter()
                .copied()
                .find(|edge| {
                    graph
                        .schema(edge.entity_type)
                        .map(|schema| schema.has_cidr)
                        .unwrap_or(false)
                })
                .ok_or_else(|| {
                    TopologyError::TypeMismatch(format!(
                        "{} is a {}, which has no address-block children",
                        network.id, network.entity_type
                    ))
                })?;
            let parent_cidr = network.cidr.ok_or_else(|| {
                TopologyError::InvalidCidr(format!("{} has no CIDR block", network.id))
            })?;

            let siblings = tx.select_where(edge, network_id)?;
            let block = allocator::allocate(
                &parent_cidr,
                siblings.iter().filter_map(|s| s.cidr.as_ref()),
                additional_mask_bits,
            )?;
            debug!(network = %network_id, cidr = %block, "Allocated address block");

            self.insert_new(
                tx,
                NewEntity::child(edge.entity_type, network_id.clone(), [name]).cidr(block),
            )
        })?;

        info!(
            network = %network_id,
            id = %subnet.id,
            cidr = ?subnet.cidr.map(|c| c.to_string()),
            "Subnet allocated"
        );
        Ok(subnet)
    }

    /// Look up any entity by id
    pub fn get_entity(&self, id: &EntityId) -> TopologyResult<Option<Entity>> {
        self.store.read(|tx| tx.get(id))
    }

    /// Direct children of an entity across all child edges, ordered by id
    pub fn children(&self, id: &EntityId) -> TopologyResult<Vec<Entity>> {
        self.store.read(|tx| {
            let entity = tx.require(id)?;
            let mut children = Vec::new();
            for edge in tx.graph().child_edges(entity.entity_type) {
                children.extend(tx.select_where(*edge, id)?);
            }
            children.sort_by(|a, b| a.id.cmp(&b.id));
            Ok(children)
        })
    }

    /// All entities of a type, ordered by id
    pub fn list_entities(&self, entity_type: EntityType) -> TopologyResult<Vec<Entity>> {
        self.store.read(|tx| tx.list(entity_type))
    }

    /// Row count of every registered type
    pub fn counts(&self) -> TopologyResult<Vec<(EntityType, usize)>> {
        self.store.read(|tx| {
            let mut counts = Vec::new();
            for schema in tx.graph().schemas() {
                counts.push((schema.entity_type, tx.count(schema.entity_type)?));
            }
            Ok(counts)
        })
    }

    fn insert_new(&self, tx: &StoreTx<'_>, request: NewEntity) -> TopologyResult<Entity> {
        let graph = tx.graph();
        let schema = graph.schema(request.entity_type)?;
        validate_identity(schema, request.parent_id.as_ref(), &request.discriminants)?;

        let id = graph.compose_id(
            request.entity_type,
            request.parent_id.as_ref(),
            &request.discriminants,
        )?;
        if tx.exists(&id)? {
            return Err(TopologyError::DuplicateIdentifier(id));
        }

        let mut pointers: BTreeMap<String, Option<EntityId>> = schema
            .pointers
            .iter()
            .map(|p| (p.field.to_string(), None))
            .collect();
        for (field, target) in request.pointers {
            if schema.pointer_field(&field).is_none() {
                return Err(TopologyError::UnknownField {
                    entity_type: request.entity_type,
                    field,
                });
            }
            pointers.insert(field, Some(target));
        }

        let now = Utc::now();
        let entity = Entity {
            entity_type: request.entity_type,
            id,
            parent_id: request.parent_id,
            discriminants: request.discriminants,
            pointers,
            cidr: request.cidr,
            defaults: request.defaults,
            created_at: now,
            updated_at: now,
        };

        validate_entity(tx, &entity)?;
        tx.insert(&entity)?;
        Ok(entity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Cidr;

    fn id(s: &str) -> EntityId {
        EntityId::parse(s).unwrap()
    }

    #[test]
    fn test_create_root_and_child() {
        let registry = TopologyRegistry::in_memory().unwrap();
        let app = registry
            .create_entity(NewEntity::root(EntityType::Application, "app1"))
            .unwrap();
        assert_eq!(app.id, id("app1"));

        let stack = registry
            .create_entity(NewEntity::child(EntityType::Stack, app.id.clone(), ["web"]))
            .unwrap();
        assert_eq!(stack.id, id("app1:web"));
        assert_eq!(registry.get_entity(&stack.id).unwrap(), Some(stack));
    }

    #[test]
    fn test_duplicate_create_rejected() {
        let registry = TopologyRegistry::in_memory().unwrap();
        registry
            .create_entity(NewEntity::root(EntityType::Application, "app1"))
            .unwrap();
        let err = registry
            .create_entity(NewEntity::root(EntityType::Application, "app1"))
            .unwrap_err();
        assert_eq!(err, TopologyError::DuplicateIdentifier(id("app1")));

        // ids are unique across types
        let err = registry
            .create_entity(NewEntity::root(EntityType::Environment, "app1"))
            .unwrap_err();
        assert_eq!(err, TopologyError::DuplicateIdentifier(id("app1")));
    }

    #[test]
    fn test_missing_parent() {
        let registry = TopologyRegistry::in_memory().unwrap();
        let err = registry
            .create_entity(NewEntity::child(EntityType::Stack, id("ghost"), ["web"]))
            .unwrap_err();
        assert_eq!(
            err,
            TopologyError::ParentNotFound {
                entity_type: EntityType::Stack,
                parent_id: id("ghost"),
            }
        );
        assert!(registry.list_entities(EntityType::Stack).unwrap().is_empty());
    }

    #[test]
    fn test_rename_same_name_is_noop() {
        let registry = TopologyRegistry::in_memory().unwrap();
        registry
            .create_entity(NewEntity::root(EntityType::Application, "app1"))
            .unwrap();
        let outcome = registry
            .rename_entity(&id("app1"), RenameTarget::name("app1"))
            .unwrap();
        assert!(outcome.is_noop());
        assert!(outcome.remapped.is_empty());
    }

    #[test]
    fn test_network_requires_cidr() {
        let registry = TopologyRegistry::in_memory().unwrap();
        registry
            .create_entity(NewEntity::root(EntityType::Environment, "prod"))
            .unwrap();
        registry
            .create_entity(NewEntity::root(EntityType::ProviderType, "aws"))
            .unwrap();
        registry
            .create_entity(NewEntity::child(EntityType::Provider, id("prod"), ["aws", "1"]))
            .unwrap();
        registry
            .create_entity(NewEntity::child(EntityType::Region, id("prod:aws:1"), ["eu-1"]))
            .unwrap();

        let err = registry
            .create_entity(NewEntity::child(EntityType::Network, id("prod:aws:1:eu-1"), ["vpc"]))
            .unwrap_err();
        assert!(matches!(err, TopologyError::InvalidCidr(_)));

        let network = registry
            .create_entity(
                NewEntity::child(EntityType::Network, id("prod:aws:1:eu-1"), ["vpc"])
                    .cidr(Cidr::new("10.0.0.0/16").unwrap()),
            )
            .unwrap();
        let subnet = registry.allocate_subnet(&network.id, 8, "a").unwrap();
        assert_eq!(subnet.cidr, Some(Cidr::new("10.0.0.0/24").unwrap()));
    }

    #[test]
    fn test_counts_cover_every_type() {
        let registry = TopologyRegistry::in_memory().unwrap();
        let counts = registry.counts().unwrap();
        assert_eq!(counts.len(), EntityType::ALL.len());
        assert!(counts.iter().all(|(_, n)| *n == 0));
    }
}
