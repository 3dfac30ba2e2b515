// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests for Cascading Renames
//!
//! Random application trees are renamed at a random stack; afterwards no
//! stored id, parent or pointer may still carry the old prefix and no row
//! may be lost.

use cim_topology::domain::{EntityPatch, EntityType, NewEntity, RenameTarget};
use cim_topology::TopologyRegistry;
use proptest::prelude::*;

use crate::fixtures::{id, registry};

/// services per stack, each with (deployments, releases per deployment)
type TreeShape = Vec<Vec<(usize, usize)>>;

fn tree_shape() -> impl Strategy<Value = TreeShape> {
    prop::collection::vec(
        prop::collection::vec((0usize..3, 0usize..3), 0..3),
        1..4,
    )
}

fn build(shape: &TreeShape) -> TopologyRegistry {
    let registry = registry();
    let app = registry
        .create_entity(NewEntity::root(EntityType::Application, "app1"))
        .unwrap()
        .id;

    for (s, services) in shape.iter().enumerate() {
        let stack = registry
            .create_entity(NewEntity::child(EntityType::Stack, app.clone(), [format!("st{}", s)]))
            .unwrap()
            .id;
        for (v, (deployments, releases)) in services.iter().enumerate() {
            let service = registry
                .create_entity(NewEntity::child(EntityType::Service, stack.clone(), [format!("sv{}", v)]))
                .unwrap()
                .id;
            for d in 0..*deployments {
                let deployment = registry
                    .create_entity(NewEntity::child(
                        EntityType::Deployment,
                        service.clone(),
                        [format!("d{}", d)],
                    ))
                    .unwrap()
                    .id;
                for r in 0..*releases {
                    let release = registry
                        .create_entity(NewEntity::child(
                            EntityType::Release,
                            deployment.clone(),
                            [format!("r{}", r)],
                        ))
                        .unwrap()
                        .id;
                    registry
                        .update_entity(
                            &deployment,
                            EntityPatch::default().set_pointer("current_release_id", release),
                        )
                        .unwrap();
                }
            }
        }
    }
    registry
}

/// Every stored id, parent id and pointer value
fn references(registry: &TopologyRegistry) -> Vec<String> {
    let mut values = Vec::new();
    for entity_type in EntityType::ALL {
        for entity in registry.list_entities(entity_type).unwrap() {
            values.push(entity.id.to_string());
            values.extend(entity.parent_id.iter().map(|p| p.to_string()));
            values.extend(entity.pointers.values().flatten().map(|p| p.to_string()));
        }
    }
    values
}

fn total(registry: &TopologyRegistry) -> usize {
    registry.counts().unwrap().iter().map(|(_, n)| n).sum()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_rename_leaves_no_stale_reference(shape in tree_shape(), pick in any::<prop::sample::Index>()) {
        let registry = build(&shape);
        let stack = id(&format!("app1:st{}", pick.index(shape.len())));
        let rows_before = total(&registry);

        let outcome = registry
            .rename_entity(&stack, RenameTarget::name("renamed"))
            .unwrap();

        let old_prefix = format!("{}:", stack);
        let stale: Vec<String> = references(&registry)
            .into_iter()
            .filter(|v| *v == stack.as_str() || v.starts_with(&old_prefix))
            .collect();
        prop_assert!(stale.is_empty(), "stale references: {:?}", stale);

        prop_assert_eq!(total(&registry), rows_before);
        for remap in &outcome.remapped {
            prop_assert!(registry.get_entity(&remap.new_id).unwrap().is_some());
            prop_assert!(registry.get_entity(&remap.old_id).unwrap().is_none());
        }
    }
}
