// Copyright (c) 2025 - Cowboy AI, Inc.
//! Topology Service Layer
//!
//! Async facade over the synchronous [`TopologyRegistry`].
//!
//! ```text
//! Request → Service → spawn_blocking → Registry (one transaction)
//!                                          ↓
//!                                       commit
//!                                          ↓
//!                              broadcast TopologyEvent
//! ```
//!
//! # Transaction Semantics
//!
//! Each service method is exactly one registry transaction. A `Conflict`
//! (another writer holds the store) is retried with a short linear backoff;
//! every other failure is returned as is. Events are only published after
//! the transaction committed.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::cascade::RenameOutcome;
use crate::domain::{Cidr, Entity, EntityId, EntityPatch, NewEntity, RenameTarget};
use crate::errors::{TopologyError, TopologyResult};
use crate::events::TopologyEvent;
use crate::registry::TopologyRegistry;

/// Base delay between conflict retries
const RETRY_BACKOFF: Duration = Duration::from_millis(25);

/// Service layer result type
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Service layer errors
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Registry rejected the operation
    #[error("Registry error: {0}")]
    Registry(#[from] TopologyError),

    /// Blocking task panicked or was cancelled
    #[error("Task join error: {0}")]
    TaskJoin(String),
}

impl ServiceError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ServiceError::Registry(err) if err.is_retryable())
    }

    /// Underlying registry error, if any
    pub fn registry_error(&self) -> Option<&TopologyError> {
        match self {
            ServiceError::Registry(err) => Some(err),
            ServiceError::TaskJoin(_) => None,
        }
    }
}

/// Topology service trait
///
/// Defines the application service interface exposed to REST/CLI
/// collaborators. `correlation_id` is copied into the emitted event.
#[async_trait]
pub trait TopologyService: Send + Sync {
    /// Create an entity; its id is computed from parent and discriminants
    async fn create_entity(&self, request: NewEntity, correlation_id: Uuid) -> ServiceResult<Entity>;

    /// Rename or re-parent an entity, returning its new id
    async fn rename_entity(
        &self,
        id: EntityId,
        target: RenameTarget,
        correlation_id: Uuid,
    ) -> ServiceResult<EntityId>;

    /// Set pointer fields or replace defaults
    async fn update_entity(
        &self,
        id: EntityId,
        patch: EntityPatch,
        correlation_id: Uuid,
    ) -> ServiceResult<Entity>;

    /// Delete an entity without dependents
    async fn delete_entity(&self, id: EntityId, correlation_id: Uuid) -> ServiceResult<Entity>;

    /// Allocate the next free block of a network as a named subnet
    async fn allocate_subnet(
        &self,
        network_id: EntityId,
        additional_mask_bits: u8,
        name: String,
        correlation_id: Uuid,
    ) -> ServiceResult<Cidr>;

    /// Look up an entity by id
    async fn get_entity(&self, id: EntityId) -> ServiceResult<Option<Entity>>;

    /// Direct children of an entity, ordered by id
    async fn children(&self, id: EntityId) -> ServiceResult<Vec<Entity>>;
}

/// Registry-backed topology service
#[derive(Clone)]
pub struct RegistryService {
    registry: Arc<TopologyRegistry>,
    events: broadcast::Sender<TopologyEvent>,
    conflict_retries: u32,
}

impl RegistryService {
    pub fn new(registry: TopologyRegistry) -> Self {
        let capacity = registry.config().event_capacity.max(1);
        let conflict_retries = registry.config().conflict_retries;
        let (events, _) = broadcast::channel(capacity);

        Self {
            registry: Arc::new(registry),
            events,
            conflict_retries,
        }
    }

    /// Receive every event published after this call
    pub fn subscribe(&self) -> broadcast::Receiver<TopologyEvent> {
        self.events.subscribe()
    }

    pub fn registry(&self) -> &TopologyRegistry {
        &self.registry
    }

    /// Run a registry call on the blocking pool, retrying conflicts
    async fn run<T, F>(&self, operation: &'static str, call: F) -> ServiceResult<T>
    where
        F: Fn(&TopologyRegistry) -> TopologyResult<T> + Clone + Send + 'static,
        T: Send + 'static,
    {
        let mut attempt: u32 = 0;
        loop {
            let registry = Arc::clone(&self.registry);
            let attempt_call = call.clone();
            let result = tokio::task::spawn_blocking(move || attempt_call(&registry))
                .await
                .map_err(|e| ServiceError::TaskJoin(e.to_string()))?;

            match result {
                Err(err) if err.is_retryable() && attempt < self.conflict_retries => {
                    attempt += 1;
                    warn!(operation, attempt, error = %err, "Retrying conflicting write");
                    tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                }
                result => return Ok(result?),
            }
        }
    }

    fn publish(&self, event: TopologyEvent) {
        let name = event.event_type_name().to_string();
        if self.events.send(event).is_err() {
            debug!(event = %name, "No event subscribers");
        }
    }
}

#[async_trait]
impl TopologyService for RegistryService {
    async fn create_entity(&self, request: NewEntity, correlation_id: Uuid) -> ServiceResult<Entity> {
        let entity = self
            .run("create_entity", move |registry| {
                registry.create_entity(request.clone())
            })
            .await?;

        self.publish(TopologyEvent::created(entity.clone(), correlation_id));
        Ok(entity)
    }

    async fn rename_entity(
        &self,
        id: EntityId,
        target: RenameTarget,
        correlation_id: Uuid,
    ) -> ServiceResult<EntityId> {
        let outcome: RenameOutcome = self
            .run("rename_entity", move |registry| {
                registry.rename_entity(&id, target.clone())
            })
            .await?;

        let new_id = outcome.new_id.clone();
        if !outcome.is_noop() {
            self.publish(TopologyEvent::renamed(outcome, correlation_id));
        }
        Ok(new_id)
    }

    async fn update_entity(
        &self,
        id: EntityId,
        patch: EntityPatch,
        correlation_id: Uuid,
    ) -> ServiceResult<Entity> {
        let entity = self
            .run("update_entity", move |registry| {
                registry.update_entity(&id, patch.clone())
            })
            .await?;

        self.publish(TopologyEvent::updated(entity.clone(), correlation_id));
        Ok(entity)
    }

    async fn delete_entity(&self, id: EntityId, correlation_id: Uuid) -> ServiceResult<Entity> {
        let entity = self
            .run("delete_entity", move |registry| registry.delete_entity(&id))
            .await?;

        self.publish(TopologyEvent::deleted(entity.entity_ref(), correlation_id));
        Ok(entity)
    }

    async fn allocate_subnet(
        &self,
        network_id: EntityId,
        additional_mask_bits: u8,
        name: String,
        correlation_id: Uuid,
    ) -> ServiceResult<Cidr> {
        let network = network_id.clone();
        let subnet = self
            .run("allocate_subnet", move |registry| {
                registry.allocate_subnet(&network, additional_mask_bits, &name)
            })
            .await?;

        let cidr = subnet.cidr.ok_or_else(|| {
            TopologyError::IntegrityViolation(format!("allocated subnet {} has no CIDR", subnet.id))
        })?;
        self.publish(TopologyEvent::subnet_allocated(network_id, cidr, subnet, correlation_id));
        Ok(cidr)
    }

    async fn get_entity(&self, id: EntityId) -> ServiceResult<Option<Entity>> {
        self.run("get_entity", move |registry| registry.get_entity(&id))
            .await
    }

    async fn children(&self, id: EntityId) -> ServiceResult<Vec<Entity>> {
        self.run("children", move |registry| registry.children(&id))
            .await
    }
}
