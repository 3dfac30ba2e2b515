// Copyright (c) 2025 - Cowboy AI, Inc.
//! Entity Graph - Schema Registry
//!
//! Static description of every entity type: its parent, its own
//! discriminant fields, and the edges other types hold into it.
//!
//! # Edge kinds
//!
//! ```text
//! child edge    region.provider_id  -> provider   (child id = provider.id + ":" + name)
//! key edge      provider.provider_type_id -> provider_type  (id embeds the root id)
//! pointer edge  deployment.current_release_id -> release    (weak, id not embedded)
//! ```
//!
//! Child and key edges embed the referenced id in the referencing row's own
//! id, so a rename must recompute those rows. Pointer edges only need their
//! stored value rewritten.
//!
//! # Invariants (checked once by [`EntityGraph::new`])
//!
//! - Each type is registered once, and every parent/reference target is registered
//! - The parent graph is acyclic
//! - Key discriminants reference root types with single-segment ids
//! - Field names are unique within a type

use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

use crate::domain::{EntityId, EntityType, IdShape};
use crate::errors::{TopologyError, TopologyResult};

/// Name of the default single discriminant field
pub const NAME_FIELD: &str = "name";

/// Structural parent declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ParentEdge {
    pub entity_type: EntityType,
    pub field: &'static str,
}

/// Own discriminant field
///
/// `references` is set for key discriminants that hold a root entity's id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Discriminant {
    pub field: &'static str,
    pub references: Option<EntityType>,
}

/// Weak reference field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PointerField {
    pub field: &'static str,
    pub target: EntityType,
}

/// Edge from a referencing type's field into some target type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Edge {
    pub entity_type: EntityType,
    pub field: &'static str,
}

/// Schema of one entity type
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeSchema {
    pub entity_type: EntityType,
    pub parent: Option<ParentEdge>,
    pub discriminants: Vec<Discriminant>,
    pub pointers: Vec<PointerField>,
    pub has_cidr: bool,
}

impl TypeSchema {
    /// Root type identified by its name alone
    pub fn root(entity_type: EntityType) -> Self {
        Self {
            entity_type,
            parent: None,
            discriminants: vec![Discriminant {
                field: NAME_FIELD,
                references: None,
            }],
            pointers: Vec::new(),
            has_cidr: false,
        }
    }

    /// Named child of `parent`, linked through `field`
    pub fn child(entity_type: EntityType, parent: EntityType, field: &'static str) -> Self {
        Self {
            entity_type,
            parent: Some(ParentEdge {
                entity_type: parent,
                field,
            }),
            discriminants: vec![Discriminant {
                field: NAME_FIELD,
                references: None,
            }],
            pointers: Vec::new(),
            has_cidr: false,
        }
    }

    /// Prepend a key discriminant referencing a root type
    pub fn keyed_by(mut self, field: &'static str, root: EntityType) -> Self {
        self.discriminants.insert(
            0,
            Discriminant {
                field,
                references: Some(root),
            },
        );
        self
    }

    /// Replace the trailing `name` discriminant with another field name
    pub fn discriminated_by(mut self, field: &'static str) -> Self {
        if let Some(last) = self.discriminants.last_mut() {
            last.field = field;
        }
        self
    }

    /// Add a weak pointer field
    pub fn pointer(mut self, field: &'static str, target: EntityType) -> Self {
        self.pointers.push(PointerField { field, target });
        self
    }

    /// Mark the type as carrying a CIDR block
    pub fn with_cidr(mut self) -> Self {
        self.has_cidr = true;
        self
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Ordered discriminant field names
    pub fn discriminant_fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.discriminants.iter().map(|d| d.field)
    }

    /// Look up a pointer field declaration
    pub fn pointer_field(&self, field: &str) -> Option<&PointerField> {
        self.pointers.iter().find(|p| p.field == field)
    }

    fn field_names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.parent.iter().map(|p| p.field).collect();
        names.extend(self.discriminant_fields());
        names.extend(self.pointers.iter().map(|p| p.field));
        names
    }
}

/// The standard topology catalogue
pub fn standard_schemas() -> Vec<TypeSchema> {
    use EntityType::*;

    vec![
        TypeSchema::root(Environment),
        TypeSchema::root(Application),
        TypeSchema::root(ProviderType),
        TypeSchema::root(AllocationType),
        TypeSchema::root(RepoType),
        TypeSchema::root(Language),
        TypeSchema::root(DeploymentTargetType),
        // infrastructure
        TypeSchema::child(Provider, Environment, "environment_id")
            .keyed_by("provider_type_id", ProviderType),
        TypeSchema::child(Region, Provider, "provider_id"),
        TypeSchema::child(Zone, Region, "region_id"),
        TypeSchema::child(Partition, Zone, "zone_id"),
        TypeSchema::child(Network, Region, "region_id").with_cidr(),
        TypeSchema::child(Subnet, Network, "network_id")
            .pointer("zone_id", Zone)
            .with_cidr(),
        TypeSchema::child(DeploymentTarget, Partition, "partition_id")
            .pointer("deployment_target_type_id", DeploymentTargetType),
        TypeSchema::child(Fleet, DeploymentTarget, "deployment_target_id"),
        // applications
        TypeSchema::child(Stack, Application, "application_id"),
        TypeSchema::child(Service, Stack, "stack_id").pointer("language_id", Language),
        TypeSchema::child(Proc, Service, "service_id"),
        TypeSchema::child(Repo, Application, "application_id")
            .pointer("repo_type_id", RepoType)
            .pointer("language_id", Language),
        TypeSchema::child(Deployment, Service, "service_id")
            .pointer("fleet_id", Fleet)
            .pointer("current_release_id", Release),
        TypeSchema::child(Release, Deployment, "deployment_id"),
        TypeSchema::child(Config, Release, "release_id"),
        TypeSchema::child(DeploymentProc, Deployment, "deployment_id").pointer("proc_id", Proc),
        TypeSchema::child(Allocation, Deployment, "deployment_id")
            .keyed_by("allocation_type_id", AllocationType)
            .discriminated_by("watermark"),
    ]
}

/// Validated schema registry with precomputed edge indexes
#[derive(Debug, Clone)]
pub struct EntityGraph {
    schemas: BTreeMap<EntityType, TypeSchema>,
    shapes: HashMap<EntityType, IdShape>,
    child_edges: HashMap<EntityType, Vec<Edge>>,
    key_edges: HashMap<EntityType, Vec<Edge>>,
    pointer_edges: HashMap<EntityType, Vec<Edge>>,
}

impl EntityGraph {
    /// Registry over the standard catalogue
    pub fn standard() -> TopologyResult<Self> {
        Self::new(standard_schemas())
    }

    /// Build and self-check a registry
    ///
    /// # Errors
    /// - `CycleDetected` if the parent graph has a cycle
    /// - `UnknownType` if a parent or reference target is not registered
    /// - `TypeMismatch` for malformed declarations (duplicate types or
    ///   fields, key discriminants into non-root types)
    pub fn new(schemas: Vec<TypeSchema>) -> TopologyResult<Self> {
        let mut by_type = BTreeMap::new();
        for schema in schemas {
            let entity_type = schema.entity_type;
            if by_type.insert(entity_type, schema).is_some() {
                return Err(TopologyError::TypeMismatch(format!(
                    "{} registered twice",
                    entity_type
                )));
            }
        }

        check_declarations(&by_type)?;
        if let Some(cycle) = find_cycle(&by_type) {
            return Err(TopologyError::CycleDetected(cycle));
        }

        let mut shapes = HashMap::new();
        for entity_type in by_type.keys() {
            shape_of(*entity_type, &by_type, &mut shapes);
        }

        let mut child_edges: HashMap<EntityType, Vec<Edge>> = HashMap::new();
        let mut key_edges: HashMap<EntityType, Vec<Edge>> = HashMap::new();
        let mut pointer_edges: HashMap<EntityType, Vec<Edge>> = HashMap::new();

        for schema in by_type.values() {
            let source = schema.entity_type;
            if let Some(parent) = schema.parent {
                child_edges.entry(parent.entity_type).or_default().push(Edge {
                    entity_type: source,
                    field: parent.field,
                });
            }
            for discriminant in &schema.discriminants {
                if let Some(root) = discriminant.references {
                    key_edges.entry(root).or_default().push(Edge {
                        entity_type: source,
                        field: discriminant.field,
                    });
                }
            }
            for pointer in &schema.pointers {
                pointer_edges.entry(pointer.target).or_default().push(Edge {
                    entity_type: source,
                    field: pointer.field,
                });
            }
        }

        debug!(types = by_type.len(), "Entity graph validated");

        Ok(Self {
            schemas: by_type,
            shapes,
            child_edges,
            key_edges,
            pointer_edges,
        })
    }

    /// Schema of a registered type
    pub fn schema(&self, entity_type: EntityType) -> TopologyResult<&TypeSchema> {
        self.schemas
            .get(&entity_type)
            .ok_or_else(|| TopologyError::UnknownType(entity_type.to_string()))
    }

    /// All registered schemas, ordered by type
    pub fn schemas(&self) -> impl Iterator<Item = &TypeSchema> {
        self.schemas.values()
    }

    /// Identifier shape of a registered type
    pub fn shape(&self, entity_type: EntityType) -> TopologyResult<IdShape> {
        self.shapes
            .get(&entity_type)
            .copied()
            .ok_or_else(|| TopologyError::UnknownType(entity_type.to_string()))
    }

    /// Types whose id has `entity_type`'s id as a prefix, with the parent field
    pub fn child_edges(&self, entity_type: EntityType) -> &[Edge] {
        self.child_edges
            .get(&entity_type)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Types whose id embeds `entity_type`'s id as a key segment
    pub fn key_edges(&self, entity_type: EntityType) -> &[Edge] {
        self.key_edges
            .get(&entity_type)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Weak reference fields that may hold an id of `entity_type`
    pub fn pointer_edges(&self, entity_type: EntityType) -> &[Edge] {
        self.pointer_edges
            .get(&entity_type)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Compose the id of an entity from its parent id and own discriminants
    pub fn compose_id<S: AsRef<str>>(
        &self,
        entity_type: EntityType,
        parent_id: Option<&EntityId>,
        discriminants: &[S],
    ) -> TopologyResult<EntityId> {
        Ok(self.shape(entity_type)?.compose(parent_id, discriminants)?)
    }

    /// Derive the parent id of an entity from its id alone
    pub fn parent_id_of(
        &self,
        entity_type: EntityType,
        id: &EntityId,
    ) -> TopologyResult<Option<EntityId>> {
        let (parent, _) = self.shape(entity_type)?.split(id)?;
        Ok(parent)
    }
}

fn check_declarations(schemas: &BTreeMap<EntityType, TypeSchema>) -> TopologyResult<()> {
    for schema in schemas.values() {
        if schema.discriminants.is_empty() {
            return Err(TopologyError::TypeMismatch(format!(
                "{} declares no discriminant fields",
                schema.entity_type
            )));
        }

        let mut seen = HashSet::new();
        for field in schema.field_names() {
            if !seen.insert(field) {
                return Err(TopologyError::TypeMismatch(format!(
                    "{} declares field {} twice",
                    schema.entity_type, field
                )));
            }
        }

        let targets = schema
            .parent
            .iter()
            .map(|p| p.entity_type)
            .chain(schema.discriminants.iter().filter_map(|d| d.references))
            .chain(schema.pointers.iter().map(|p| p.target));
        for target in targets {
            if !schemas.contains_key(&target) {
                return Err(TopologyError::UnknownType(target.to_string()));
            }
        }

        for discriminant in &schema.discriminants {
            let Some(root) = discriminant.references else {
                continue;
            };
            let root_schema = &schemas[&root];
            if !root_schema.is_root() || root_schema.discriminants.len() != 1 {
                return Err(TopologyError::TypeMismatch(format!(
                    "{}.{} must reference a single-segment root type, {} is not",
                    schema.entity_type, discriminant.field, root
                )));
            }
        }
    }
    Ok(())
}

/// Depth-first search over parent links; returns the offending path
fn find_cycle(schemas: &BTreeMap<EntityType, TypeSchema>) -> Option<String> {
    let mut visited = HashSet::new();

    for start in schemas.keys() {
        let mut path = Vec::new();
        let mut current = Some(*start);

        while let Some(entity_type) = current {
            if visited.contains(&entity_type) {
                break;
            }
            if path.contains(&entity_type) {
                path.push(entity_type);
                let names: Vec<&str> = path.iter().map(EntityType::as_str).collect();
                return Some(names.join(" -> "));
            }
            path.push(entity_type);
            current = schemas
                .get(&entity_type)
                .and_then(|s| s.parent)
                .map(|p| p.entity_type);
        }

        visited.extend(path);
    }
    None
}

fn shape_of(
    entity_type: EntityType,
    schemas: &BTreeMap<EntityType, TypeSchema>,
    shapes: &mut HashMap<EntityType, IdShape>,
) -> IdShape {
    if let Some(shape) = shapes.get(&entity_type) {
        return *shape;
    }

    let schema = &schemas[&entity_type];
    let own = schema.discriminants.len();
    let shape = match schema.parent {
        None => IdShape::root(own),
        Some(parent) => IdShape::child_of(shape_of(parent.entity_type, schemas, shapes), own),
    };

    shapes.insert(entity_type, shape);
    shape
}
