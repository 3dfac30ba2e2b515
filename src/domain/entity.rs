// Copyright (c) 2025 - Cowboy AI, Inc.
//! Topology Entity Records and Mutation Requests
//!
//! [`Entity`] is the stored form of any node in the topology. The set of
//! discriminant and pointer fields an entity carries is dictated by its
//! type's [`crate::schema::TypeSchema`]; the record itself is generic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{Cidr, EntityId, EntityType};

/// Tagged generic reference to any entity
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub entity_type: EntityType,
    pub id: EntityId,
}

impl EntityRef {
    pub fn new(entity_type: EntityType, id: EntityId) -> Self {
        Self { entity_type, id }
    }
}

/// Stored topology entity
///
/// # Invariants
/// - `id == compose(parent_id, discriminants)` for the entity's type shape
/// - `discriminants` are ordered as the schema declares them
/// - `pointers` holds every pointer field the schema declares (possibly `None`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub entity_type: EntityType,
    pub id: EntityId,
    pub parent_id: Option<EntityId>,
    pub discriminants: Vec<String>,
    pub pointers: BTreeMap<String, Option<EntityId>>,
    pub cidr: Option<Cidr>,
    /// Opaque attribute blob, never interpreted by the registry
    pub defaults: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity {
    /// Generic reference to this entity
    pub fn entity_ref(&self) -> EntityRef {
        EntityRef::new(self.entity_type, self.id.clone())
    }

    /// Current value of a pointer field
    pub fn pointer(&self, field: &str) -> Option<&EntityId> {
        self.pointers.get(field).and_then(Option::as_ref)
    }

    /// Local name: the last discriminant segment
    pub fn name(&self) -> &str {
        self.discriminants.last().map(String::as_str).unwrap_or_default()
    }
}

/// Request to create a new entity
///
/// # Examples
///
/// ```rust
/// use cim_topology::domain::{EntityId, EntityType, NewEntity};
///
/// let stack = NewEntity::child(
///     EntityType::Stack,
///     EntityId::parse("app1").unwrap(),
///     ["web"],
/// );
/// assert_eq!(stack.discriminants, vec!["web"]);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEntity {
    pub entity_type: EntityType,
    pub parent_id: Option<EntityId>,
    pub discriminants: Vec<String>,
    pub pointers: BTreeMap<String, EntityId>,
    pub cidr: Option<Cidr>,
    pub defaults: serde_json::Value,
}

impl NewEntity {
    /// Root entity whose id is its name
    pub fn root(entity_type: EntityType, name: impl Into<String>) -> Self {
        Self {
            entity_type,
            parent_id: None,
            discriminants: vec![name.into()],
            pointers: BTreeMap::new(),
            cidr: None,
            defaults: serde_json::Value::Object(Default::default()),
        }
    }

    /// Child entity under `parent_id` with the given discriminant values
    pub fn child<I, S>(entity_type: EntityType, parent_id: EntityId, discriminants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entity_type,
            parent_id: Some(parent_id),
            discriminants: discriminants.into_iter().map(Into::into).collect(),
            pointers: BTreeMap::new(),
            cidr: None,
            defaults: serde_json::Value::Object(Default::default()),
        }
    }

    /// Set a pointer field
    pub fn pointer(mut self, field: impl Into<String>, target: EntityId) -> Self {
        self.pointers.insert(field.into(), target);
        self
    }

    /// Set the address block (network and subnet only)
    pub fn cidr(mut self, cidr: Cidr) -> Self {
        self.cidr = Some(cidr);
        self
    }

    /// Replace the opaque defaults blob
    pub fn defaults(mut self, defaults: serde_json::Value) -> Self {
        self.defaults = defaults;
        self
    }
}

/// Identity change requested by a rename
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RenameTarget {
    /// Keep the parent, replace the own discriminant values
    Discriminants { discriminants: Vec<String> },
    /// Move under another parent of the same type, keep discriminants
    Parent { parent_id: EntityId },
    /// Move and rename at once
    ParentAndDiscriminants {
        parent_id: EntityId,
        discriminants: Vec<String>,
    },
}

impl RenameTarget {
    /// Rename a single-discriminant entity
    pub fn name(name: impl Into<String>) -> Self {
        Self::Discriminants {
            discriminants: vec![name.into()],
        }
    }

    /// Resolve the target against the entity's current parent and discriminants
    pub fn resolve(&self, entity: &Entity) -> (Option<EntityId>, Vec<String>) {
        match self {
            Self::Discriminants { discriminants } => {
                (entity.parent_id.clone(), discriminants.clone())
            }
            Self::Parent { parent_id } => {
                (Some(parent_id.clone()), entity.discriminants.clone())
            }
            Self::ParentAndDiscriminants {
                parent_id,
                discriminants,
            } => (Some(parent_id.clone()), discriminants.clone()),
        }
    }
}

/// Attribute update that never changes identity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityPatch {
    /// Pointer fields to set (`Some`) or clear (`None`)
    pub pointers: BTreeMap<String, Option<EntityId>>,
    /// Replacement defaults blob
    pub defaults: Option<serde_json::Value>,
}

impl EntityPatch {
    pub fn set_pointer(mut self, field: impl Into<String>, target: EntityId) -> Self {
        self.pointers.insert(field.into(), Some(target));
        self
    }

    pub fn clear_pointer(mut self, field: impl Into<String>) -> Self {
        self.pointers.insert(field.into(), None);
        self
    }

    pub fn defaults(mut self, defaults: serde_json::Value) -> Self {
        self.defaults = Some(defaults);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.pointers.is_empty() && self.defaults.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> EntityId {
        EntityId::parse(s).unwrap()
    }

    #[test]
    fn test_new_entity_builder() {
        let subnet = NewEntity::child(EntityType::Subnet, id("prod:aws:1:eu-1:vpc"), ["a"])
            .cidr(Cidr::new("10.0.0.0/24").unwrap())
            .pointer("zone_id", id("prod:aws:1:eu-1:eu-1a"))
            .defaults(serde_json::json!({"public": true}));

        assert_eq!(subnet.parent_id, Some(id("prod:aws:1:eu-1:vpc")));
        assert_eq!(subnet.pointers.len(), 1);
        assert_eq!(subnet.defaults["public"], true);
    }

    #[test]
    fn test_rename_target_resolution() {
        let now = Utc::now();
        let entity = Entity {
            entity_type: EntityType::Stack,
            id: id("app1:web"),
            parent_id: Some(id("app1")),
            discriminants: vec!["web".to_string()],
            pointers: BTreeMap::new(),
            cidr: None,
            defaults: serde_json::Value::Null,
            created_at: now,
            updated_at: now,
        };

        assert_eq!(
            RenameTarget::name("webapp").resolve(&entity),
            (Some(id("app1")), vec!["webapp".to_string()])
        );
        assert_eq!(
            RenameTarget::Parent { parent_id: id("app2") }.resolve(&entity),
            (Some(id("app2")), vec!["web".to_string()])
        );
        assert_eq!(entity.name(), "web");
    }

    #[test]
    fn test_patch_builder() {
        let patch = EntityPatch::default()
            .set_pointer("current_release_id", id("app1:web:api:prod:v1"))
            .clear_pointer("fleet_id");
        assert!(!patch.is_empty());
        assert_eq!(patch.pointers["fleet_id"], None);
        assert!(EntityPatch::default().is_empty());
    }
}
