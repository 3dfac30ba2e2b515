// Copyright (c) 2025 - Cowboy AI, Inc.
//! Pure Validation Functions - Topology Invariants
//!
//! Rules that relate an entity to the records it references. All functions
//! are pure: the caller loads the referenced records, these functions only
//! decide whether the combination is legal.
//!
//! # Invariant Categories
//!
//! 1. **Structural**: parent and reference targets exist and have the right type
//! 2. **Lineage**: references that must stay inside one subtree
//! 3. **Addressing**: CIDR presence, containment and sibling overlap

use crate::domain::{Cidr, Entity, EntityId, EntityType};
use crate::errors::{TopologyError, TopologyResult};

/// Validation result for topology invariants
pub type ValidationResult = TopologyResult<()>;

/// Validate that a resolved parent exists and has the declared parent type
pub fn validate_parent(
    entity_type: EntityType,
    expected: EntityType,
    parent_id: &EntityId,
    parent: Option<&Entity>,
) -> ValidationResult {
    let parent = parent.ok_or_else(|| TopologyError::ParentNotFound {
        entity_type,
        parent_id: parent_id.clone(),
    })?;

    if parent.entity_type != expected {
        return Err(TopologyError::TypeMismatch(format!(
            "parent of {} must be a {}, {} is a {}",
            entity_type, expected, parent_id, parent.entity_type
        )));
    }
    Ok(())
}

/// Validate that a key discriminant or pointer resolves to the right type
pub fn validate_reference(
    field: &str,
    expected: EntityType,
    target_id: &EntityId,
    target: Option<EntityType>,
) -> ValidationResult {
    match target {
        None => Err(TopologyError::ReferenceNotFound {
            field: field.to_string(),
            id: target_id.clone(),
        }),
        Some(actual) if actual != expected => Err(TopologyError::TypeMismatch(format!(
            "{} must reference a {}, {} is a {}",
            field, expected, target_id, actual
        ))),
        Some(_) => Ok(()),
    }
}

/// Validate that two entities hang off the same parent
///
/// Used for references that must not leave a subtree, e.g. a deployment
/// process must run a process of the deployment's own service.
pub fn validate_same_lineage(
    field: &str,
    expected_parent: Option<&EntityId>,
    target: &Entity,
) -> ValidationResult {
    if target.parent_id.as_ref() != expected_parent {
        return Err(TopologyError::TypeMismatch(format!(
            "{} = {} lies outside {}",
            field,
            target.id,
            expected_parent.map(EntityId::as_str).unwrap_or("<root>")
        )));
    }
    Ok(())
}

/// Validate CIDR presence against whether the type carries one
pub fn validate_cidr_presence(
    entity_type: EntityType,
    has_cidr: bool,
    cidr: Option<&Cidr>,
) -> ValidationResult {
    match (has_cidr, cidr) {
        (true, None) => Err(TopologyError::InvalidCidr(format!(
            "{} requires a CIDR block",
            entity_type
        ))),
        (false, Some(cidr)) => Err(TopologyError::InvalidCidr(format!(
            "{} does not carry a CIDR block, got {}",
            entity_type, cidr
        ))),
        _ => Ok(()),
    }
}

/// Validate that a block lies inside its parent network
pub fn validate_within(cidr: &Cidr, parent: &Cidr) -> ValidationResult {
    if !parent.contains(cidr) {
        return Err(TopologyError::CidrOutsideParent {
            cidr: *cidr,
            parent: *parent,
        });
    }
    Ok(())
}

/// Validate that a block does not overlap any sibling block
///
/// `self_id` is skipped so a stored entity can be revalidated in place.
pub fn validate_no_overlap<'a, I>(cidr: &Cidr, self_id: &EntityId, siblings: I) -> ValidationResult
where
    I: IntoIterator<Item = (&'a EntityId, &'a Cidr)>,
{
    for (id, existing) in siblings {
        if id != self_id && existing.overlaps(cidr) {
            return Err(TopologyError::CidrOverlap {
                cidr: *cidr,
                existing: *existing,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn id(s: &str) -> EntityId {
        EntityId::parse(s).unwrap()
    }

    fn cidr(s: &str) -> Cidr {
        Cidr::new(s).unwrap()
    }

    fn entity(entity_type: EntityType, id_str: &str, parent: Option<&str>) -> Entity {
        let now = Utc::now();
        Entity {
            entity_type,
            id: id(id_str),
            parent_id: parent.map(id),
            discriminants: vec![id_str.rsplit(':').next().unwrap().to_string()],
            pointers: BTreeMap::new(),
            cidr: None,
            defaults: serde_json::json!({}),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_parent_missing() {
        let err = validate_parent(EntityType::Stack, EntityType::Application, &id("app1"), None)
            .unwrap_err();
        assert_eq!(
            err,
            TopologyError::ParentNotFound {
                entity_type: EntityType::Stack,
                parent_id: id("app1"),
            }
        );
    }

    #[test]
    fn test_parent_wrong_type() {
        let env = entity(EntityType::Environment, "app1", None);
        let err = validate_parent(EntityType::Stack, EntityType::Application, &id("app1"), Some(&env))
            .unwrap_err();
        assert!(matches!(err, TopologyError::TypeMismatch(_)));
    }

    #[test]
    fn test_reference_rules() {
        let target = id("rust");
        assert!(validate_reference("language_id", EntityType::Language, &target, Some(EntityType::Language)).is_ok());
        assert!(matches!(
            validate_reference("language_id", EntityType::Language, &target, None),
            Err(TopologyError::ReferenceNotFound { .. })
        ));
        assert!(matches!(
            validate_reference("language_id", EntityType::Language, &target, Some(EntityType::RepoType)),
            Err(TopologyError::TypeMismatch(_))
        ));
    }

    #[test]
    fn test_same_lineage() {
        let proc = entity(EntityType::Proc, "app1:web:api:worker", Some("app1:web:api"));
        assert!(validate_same_lineage("proc_id", Some(&id("app1:web:api")), &proc).is_ok());
        assert!(validate_same_lineage("proc_id", Some(&id("app1:web:admin")), &proc).is_err());
    }

    #[test]
    fn test_cidr_presence() {
        assert!(validate_cidr_presence(EntityType::Network, true, None).is_err());
        assert!(validate_cidr_presence(EntityType::Stack, false, Some(&cidr("10.0.0.0/8"))).is_err());
        assert!(validate_cidr_presence(EntityType::Subnet, true, Some(&cidr("10.0.0.0/24"))).is_ok());
    }

    #[test]
    fn test_containment_and_overlap() {
        let network = cidr("10.0.0.0/16");
        assert!(validate_within(&cidr("10.0.4.0/24"), &network).is_ok());
        assert!(matches!(
            validate_within(&cidr("10.1.0.0/24"), &network),
            Err(TopologyError::CidrOutsideParent { .. })
        ));

        let a = id("net:a");
        let b = id("net:b");
        let a_block = cidr("10.0.0.0/24");
        let siblings = vec![(&a, &a_block)];

        assert!(validate_no_overlap(&cidr("10.0.1.0/24"), &b, siblings.clone()).is_ok());
        assert!(validate_no_overlap(&cidr("10.0.0.0/25"), &a, siblings.clone()).is_ok());
        assert_eq!(
            validate_no_overlap(&cidr("10.0.0.128/25"), &b, siblings).unwrap_err(),
            TopologyError::CidrOverlap {
                cidr: cidr("10.0.0.128/25"),
                existing: a_block,
            }
        );
    }
}
