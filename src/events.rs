// Copyright (c) 2025 - Cowboy AI, Inc.
//! Topology Change Events
//!
//! One event per committed mutation, published after commit by the service
//! layer. Events are facts: they are only built from values the registry
//! returned, never from the request.
//!
//! ```json
//! {
//!   "event_type": "entity_renamed",
//!   "event_id": "0192...",
//!   "timestamp": "2025-01-01T00:00:00Z",
//!   "correlation_id": "0192...",
//!   "outcome": { "old_id": "app1:web", "new_id": "app1:webapp", ... }
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cascade::RenameOutcome;
use crate::domain::{Cidr, Entity, EntityId, EntityRef};

/// Topology change event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum TopologyEvent {
    EntityCreated {
        event_id: Uuid,
        timestamp: DateTime<Utc>,
        correlation_id: Uuid,
        entity: Entity,
    },
    EntityRenamed {
        event_id: Uuid,
        timestamp: DateTime<Utc>,
        correlation_id: Uuid,
        outcome: RenameOutcome,
    },
    EntityUpdated {
        event_id: Uuid,
        timestamp: DateTime<Utc>,
        correlation_id: Uuid,
        entity: Entity,
    },
    EntityDeleted {
        event_id: Uuid,
        timestamp: DateTime<Utc>,
        correlation_id: Uuid,
        entity: EntityRef,
    },
    SubnetAllocated {
        event_id: Uuid,
        timestamp: DateTime<Utc>,
        correlation_id: Uuid,
        network_id: EntityId,
        cidr: Cidr,
        subnet: Entity,
    },
}

impl TopologyEvent {
    pub fn created(entity: Entity, correlation_id: Uuid) -> Self {
        Self::EntityCreated {
            event_id: Uuid::now_v7(),
            timestamp: Utc::now(),
            correlation_id,
            entity,
        }
    }

    pub fn renamed(outcome: RenameOutcome, correlation_id: Uuid) -> Self {
        Self::EntityRenamed {
            event_id: Uuid::now_v7(),
            timestamp: Utc::now(),
            correlation_id,
            outcome,
        }
    }

    pub fn updated(entity: Entity, correlation_id: Uuid) -> Self {
        Self::EntityUpdated {
            event_id: Uuid::now_v7(),
            timestamp: Utc::now(),
            correlation_id,
            entity,
        }
    }

    pub fn deleted(entity: EntityRef, correlation_id: Uuid) -> Self {
        Self::EntityDeleted {
            event_id: Uuid::now_v7(),
            timestamp: Utc::now(),
            correlation_id,
            entity,
        }
    }

    pub fn subnet_allocated(
        network_id: EntityId,
        cidr: Cidr,
        subnet: Entity,
        correlation_id: Uuid,
    ) -> Self {
        Self::SubnetAllocated {
            event_id: Uuid::now_v7(),
            timestamp: Utc::now(),
            correlation_id,
            network_id,
            cidr,
            subnet,
        }
    }

    /// Extract event ID from any event type
    pub fn event_id(&self) -> Uuid {
        match self {
            Self::EntityCreated { event_id, .. }
            | Self::EntityRenamed { event_id, .. }
            | Self::EntityUpdated { event_id, .. }
            | Self::EntityDeleted { event_id, .. }
            | Self::SubnetAllocated { event_id, .. } => *event_id,
        }
    }

    /// Extract event timestamp from any event type
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::EntityCreated { timestamp, .. }
            | Self::EntityRenamed { timestamp, .. }
            | Self::EntityUpdated { timestamp, .. }
            | Self::EntityDeleted { timestamp, .. }
            | Self::SubnetAllocated { timestamp, .. } => *timestamp,
        }
    }

    /// Extract correlation ID from any event type
    pub fn correlation_id(&self) -> Uuid {
        match self {
            Self::EntityCreated { correlation_id, .. }
            | Self::EntityRenamed { correlation_id, .. }
            | Self::EntityUpdated { correlation_id, .. }
            | Self::EntityDeleted { correlation_id, .. }
            | Self::SubnetAllocated { correlation_id, .. } => *correlation_id,
        }
    }

    /// Id of the entity the event is about (the new id for renames)
    pub fn subject_id(&self) -> &EntityId {
        match self {
            Self::EntityCreated { entity, .. } | Self::EntityUpdated { entity, .. } => &entity.id,
            Self::EntityRenamed { outcome, .. } => &outcome.new_id,
            Self::EntityDeleted { entity, .. } => &entity.id,
            Self::SubnetAllocated { subnet, .. } => &subnet.id,
        }
    }

    /// Get human-readable event type name
    pub fn event_type_name(&self) -> &str {
        match self {
            Self::EntityCreated { .. } => "EntityCreated",
            Self::EntityRenamed { .. } => "EntityRenamed",
            Self::EntityUpdated { .. } => "EntityUpdated",
            Self::EntityDeleted { .. } => "EntityDeleted",
            Self::SubnetAllocated { .. } => "SubnetAllocated",
        }
    }
}
