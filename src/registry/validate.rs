// Copyright (c) 2025 - Cowboy AI, Inc.
//! Write-time validation of a complete entity record
//!
//! Loads whatever the record references from the open transaction and feeds
//! it to the pure rules in [`crate::domain::invariants`].

use crate::domain::invariants::{
    validate_cidr_presence, validate_no_overlap, validate_parent, validate_reference,
    validate_same_lineage, validate_within,
};
use crate::domain::{validate_segment, Entity, EntityId, EntityType};
use crate::errors::{TopologyError, TopologyResult};
use crate::schema::{Edge, TypeSchema};
use crate::store::StoreTx;

/// Where a lineage-constrained reference must point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Anchor {
    /// Target's parent is the entity itself
    Entity,
    /// Target's parent is the entity's grandparent
    Grandparent,
}

/// Pointer that must stay inside the referencing entity's subtree
struct LineageRule {
    entity_type: EntityType,
    field: &'static str,
    anchor: Anchor,
}

const LINEAGE_RULES: &[LineageRule] = &[
    // a deployment's current release is one of its own releases
    LineageRule {
        entity_type: EntityType::Deployment,
        field: "current_release_id",
        anchor: Anchor::Entity,
    },
    // a deployment proc runs a proc of the deployment's service
    LineageRule {
        entity_type: EntityType::DeploymentProc,
        field: "proc_id",
        anchor: Anchor::Grandparent,
    },
    // a subnet's zone is in the network's region
    LineageRule {
        entity_type: EntityType::Subnet,
        field: "zone_id",
        anchor: Anchor::Grandparent,
    },
];

/// Validate the shape of a requested identity before any storage access
pub(crate) fn validate_identity(
    schema: &TypeSchema,
    parent_id: Option<&EntityId>,
    discriminants: &[String],
) -> TopologyResult<()> {
    match (schema.parent, parent_id) {
        (None, Some(parent_id)) => {
            return Err(TopologyError::TypeMismatch(format!(
                "{} is a root type and cannot have parent {}",
                schema.entity_type, parent_id
            )))
        }
        (Some(parent), None) => {
            return Err(TopologyError::TypeMismatch(format!(
                "{} requires a parent {} ({})",
                schema.entity_type, parent.entity_type, parent.field
            )))
        }
        _ => {}
    }

    if discriminants.len() != schema.discriminants.len() {
        return Err(TopologyError::MalformedId {
            id: discriminants.join(":"),
            expected: schema.discriminants.len(),
            actual: discriminants.len(),
        });
    }

    for segment in discriminants {
        validate_segment(segment)?;
    }
    Ok(())
}

/// Validate every cross-entity rule for a record about to be written
pub(crate) fn validate_entity(tx: &StoreTx<'_>, entity: &Entity) -> TopologyResult<()> {
    let schema = tx.graph().schema(entity.entity_type)?;
    validate_identity(schema, entity.parent_id.as_ref(), &entity.discriminants)?;

    let parent = match (schema.parent, &entity.parent_id) {
        (Some(edge), Some(parent_id)) => {
            let parent = tx.get(parent_id)?;
            validate_parent(entity.entity_type, edge.entity_type, parent_id, parent.as_ref())?;
            parent
        }
        _ => None,
    };

    for (discriminant, value) in schema.discriminants.iter().zip(&entity.discriminants) {
        if let Some(root) = discriminant.references {
            let target_id = EntityId::parse(value.as_str())?;
            validate_reference(discriminant.field, root, &target_id, tx.entity_type_of(&target_id)?)?;
        }
    }

    for field in entity.pointers.keys() {
        if schema.pointer_field(field).is_none() {
            return Err(TopologyError::UnknownField {
                entity_type: entity.entity_type,
                field: field.clone(),
            });
        }
    }
    for pointer in &schema.pointers {
        if let Some(target_id) = entity.pointer(pointer.field) {
            validate_reference(pointer.field, pointer.target, target_id, tx.entity_type_of(target_id)?)?;
        }
    }

    validate_cidr_presence(entity.entity_type, schema.has_cidr, entity.cidr.as_ref())?;
    if let (Some(cidr), Some(parent), Some(edge)) = (&entity.cidr, &parent, schema.parent) {
        // blocks nest inside the parent's block and are disjoint from siblings
        if let Some(parent_cidr) = &parent.cidr {
            validate_within(cidr, parent_cidr)?;

            let siblings = tx.select_where(
                Edge {
                    entity_type: entity.entity_type,
                    field: edge.field,
                },
                &parent.id,
            )?;
            validate_no_overlap(
                cidr,
                &entity.id,
                siblings
                    .iter()
                    .filter_map(|s| s.cidr.as_ref().map(|c| (&s.id, c))),
            )?;
        }
    }

    validate_lineage(tx, entity)
}

fn validate_lineage(tx: &StoreTx<'_>, entity: &Entity) -> TopologyResult<()> {
    for rule in LINEAGE_RULES
        .iter()
        .filter(|r| r.entity_type == entity.entity_type)
    {
        let Some(target_id) = entity.pointer(rule.field) else {
            continue;
        };
        let Some(target) = tx.get(target_id)? else {
            return Err(TopologyError::ReferenceNotFound {
                field: rule.field.to_string(),
                id: target_id.clone(),
            });
        };

        let expected = match rule.anchor {
            Anchor::Entity => Some(entity.id.clone()),
            Anchor::Grandparent => match (&entity.parent_id, tx.graph().schema(entity.entity_type)?.parent) {
                (Some(parent_id), Some(edge)) => tx.graph().parent_id_of(edge.entity_type, parent_id)?,
                _ => None,
            },
        };

        validate_same_lineage(rule.field, expected.as_ref(), &target)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::EntityGraph;

    #[test]
    fn test_identity_rules() {
        let graph = EntityGraph::standard().unwrap();
        let stack = graph.schema(EntityType::Stack).unwrap();
        let app = EntityId::parse("app1").unwrap();

        assert!(validate_identity(stack, Some(&app), &["web".to_string()]).is_ok());
        assert!(matches!(
            validate_identity(stack, None, &["web".to_string()]),
            Err(TopologyError::TypeMismatch(_))
        ));
        assert!(matches!(
            validate_identity(stack, Some(&app), &["web".to_string(), "x".to_string()]),
            Err(TopologyError::MalformedId { expected: 1, actual: 2, .. })
        ));
        assert!(matches!(
            validate_identity(stack, Some(&app), &["we:b".to_string()]),
            Err(TopologyError::InvalidSegment { .. })
        ));

        let env = graph.schema(EntityType::Environment).unwrap();
        assert!(validate_identity(env, Some(&app), &["prod".to_string()]).is_err());
    }

    #[test]
    fn test_lineage_rules_reference_declared_pointers() {
        let graph = EntityGraph::standard().unwrap();
        for rule in LINEAGE_RULES {
            let schema = graph.schema(rule.entity_type).unwrap();
            assert!(schema.pointer_field(rule.field).is_some(), "{}.{}", rule.entity_type, rule.field);
        }
    }
}
