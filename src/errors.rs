// Copyright (c) 2025 - Cowboy AI, Inc.
//! Error types for topology registry operations

use thiserror::Error;

use crate::allocator::AllocationError;
use crate::domain::{Cidr, CidrError, EntityId, EntityType, IdentifierError};

/// Errors that can occur in topology registry operations
///
/// Every mutating operation either commits completely or fails with one of
/// these and leaves storage untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopologyError {
    /// An id segment is empty or contains the delimiter
    #[error("Invalid identifier segment {segment:?}: {reason}")]
    InvalidSegment { segment: String, reason: String },

    /// An id does not have the segment count its type requires
    #[error("Malformed identifier {id:?}: expected {expected} segments, found {actual}")]
    MalformedId {
        id: String,
        expected: usize,
        actual: usize,
    },

    /// The computed id is already taken
    #[error("Duplicate identifier: {0}")]
    DuplicateIdentifier(EntityId),

    /// A pointer still holds a pre-rename id that nothing maps to
    #[error("Orphaned pointer {entity_type}.{field} = {value}")]
    OrphanedPointer {
        entity_type: EntityType,
        field: String,
        value: String,
    },

    /// The entity graph has a structural cycle
    #[error("Cycle detected in entity graph: {0}")]
    CycleDetected(String),

    /// Requested subnet prefix exceeds the address family maximum
    #[error("Invalid prefix length /{requested} (maximum /{max})")]
    InvalidPrefix { requested: u16, max: u8 },

    /// No free block of the requested size remains
    #[error("Subnets exhausted: no free /{prefix_length} left in {parent}")]
    SubnetsExhausted { parent: Cidr, prefix_length: u8 },

    /// A concurrent writer holds the store; safe to retry
    #[error("Conflicting concurrent write: {0}")]
    Conflict(String),

    /// Parent id does not resolve to an entity
    #[error("Parent {parent_id} of {entity_type} not found")]
    ParentNotFound {
        entity_type: EntityType,
        parent_id: EntityId,
    },

    /// An entity of the wrong type or wrong lineage was referenced
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    /// A key discriminant or pointer does not resolve
    #[error("Reference {field} = {id} not found")]
    ReferenceNotFound { field: String, id: EntityId },

    /// No entity has this id
    #[error("Entity not found: {0}")]
    NotFound(EntityId),

    /// Delete refused because other rows still reference the entity
    #[error("Entity {id} has dependents: {}", .dependents.join(", "))]
    HasDependents { id: EntityId, dependents: Vec<String> },

    /// CIDR failed to parse or is missing where required
    #[error("Invalid CIDR: {0}")]
    InvalidCidr(String),

    /// Subnet block lies outside its network
    #[error("CIDR {cidr} is outside parent network {parent}")]
    CidrOutsideParent { cidr: Cidr, parent: Cidr },

    /// Subnet block overlaps a sibling
    #[error("CIDR {cidr} overlaps existing sibling {existing}")]
    CidrOverlap { cidr: Cidr, existing: Cidr },

    /// Rename would touch more rows than the configured bound
    #[error("Cascade from {root} exceeds limit of {limit} rows")]
    CascadeLimitExceeded { root: EntityId, limit: usize },

    /// Entity type missing from the registry
    #[error("Unknown entity type: {0}")]
    UnknownType(String),

    /// Field not declared by the entity type's schema
    #[error("Unknown field {field} for {entity_type}")]
    UnknownField {
        entity_type: EntityType,
        field: String,
    },

    /// Storage rejected the commit (e.g. foreign key check)
    #[error("Integrity violation: {0}")]
    IntegrityViolation(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Result type for topology registry operations
pub type TopologyResult<T> = Result<T, TopologyError>;

impl TopologyError {
    /// True for failures a caller may retry unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(self, TopologyError::Conflict(_))
    }
}

impl From<IdentifierError> for TopologyError {
    fn from(err: IdentifierError) -> Self {
        match err {
            IdentifierError::InvalidSegment { segment, reason } => {
                TopologyError::InvalidSegment { segment, reason }
            }
            IdentifierError::MalformedId {
                id,
                expected,
                actual,
            } => TopologyError::MalformedId {
                id,
                expected,
                actual,
            },
        }
    }
}

impl From<CidrError> for TopologyError {
    fn from(err: CidrError) -> Self {
        TopologyError::InvalidCidr(err.to_string())
    }
}

impl From<AllocationError> for TopologyError {
    fn from(err: AllocationError) -> Self {
        match err {
            AllocationError::InvalidPrefix { requested, max } => {
                TopologyError::InvalidPrefix { requested, max }
            }
            AllocationError::SubnetsExhausted {
                parent,
                prefix_length,
            } => TopologyError::SubnetsExhausted {
                parent,
                prefix_length,
            },
        }
    }
}

impl From<rusqlite::Error> for TopologyError {
    fn from(err: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;

        match &err {
            rusqlite::Error::SqliteFailure(failure, _) => match failure.code {
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => {
                    TopologyError::Conflict(err.to_string())
                }
                ErrorCode::ConstraintViolation => {
                    TopologyError::IntegrityViolation(err.to_string())
                }
                _ => TopologyError::Storage(err.to_string()),
            },
            _ => TopologyError::Storage(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for TopologyError {
    fn from(err: serde_json::Error) -> Self {
        TopologyError::Serialization(err.to_string())
    }
}
