// Copyright (c) 2025 - Cowboy AI, Inc.
//! Cascading Rename
//!
//! Changing an entity's parent or discriminants changes its id, and with it
//! the id of every row whose id embeds the old one.
//!
//! # Algorithm
//!
//! ```text
//! 1. compute new id of the root; no-op if unchanged, duplicate if taken
//! 2. breadth-first over child edges (and key edges) from the root, then
//!    recompute each reached row's id once its parent and keys are remapped
//! 3. reject on duplicate target ids, or when remapped rows plus pointer
//!    rows exceed the limit
//! 4. rewrite identity columns top-down
//! 5. rewrite every pointer column holding a remapped id
//! 6. fail with OrphanedPointer if any pointer still holds a pre-rename id
//! ```
//!
//! Everything runs inside the caller's write transaction; any error rolls
//! the whole cascade back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::debug;

use crate::domain::{Entity, EntityId, EntityType};
use crate::errors::{TopologyError, TopologyResult};
use crate::schema::EntityGraph;
use crate::store::StoreTx;

/// One recomputed row id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdRemap {
    pub entity_type: EntityType,
    pub old_id: EntityId,
    pub new_id: EntityId,
}

/// One rewritten pointer value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointerRewrite {
    /// Type of the row holding the pointer
    pub entity_type: EntityType,
    /// Current id of the row holding the pointer
    pub id: EntityId,
    pub field: String,
    pub old_value: EntityId,
    pub new_value: EntityId,
}

/// Result of a rename
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameOutcome {
    pub entity_type: EntityType,
    pub old_id: EntityId,
    pub new_id: EntityId,
    /// Every recomputed id, root first, parents before children
    pub remapped: Vec<IdRemap>,
    pub pointer_updates: Vec<PointerRewrite>,
}

impl RenameOutcome {
    fn unchanged(entity: &Entity) -> Self {
        Self {
            entity_type: entity.entity_type,
            old_id: entity.id.clone(),
            new_id: entity.id.clone(),
            remapped: Vec::new(),
            pointer_updates: Vec::new(),
        }
    }

    /// True when the requested identity equals the current one
    pub fn is_noop(&self) -> bool {
        self.old_id == self.new_id
    }

    /// New id of a row touched by the cascade
    pub fn remapped_id(&self, old_id: &EntityId) -> Option<&EntityId> {
        self.remapped
            .iter()
            .find(|r| &r.old_id == old_id)
            .map(|r| &r.new_id)
    }
}

/// Row scheduled for an identity rewrite
struct Planned {
    entity: Entity,
    parent_id: Option<EntityId>,
    discriminants: Vec<String>,
    new_id: EntityId,
}

/// Executes renames against an open write transaction
pub struct CascadeRenamer<'g> {
    graph: &'g EntityGraph,
    max_rows: usize,
}

impl<'g> CascadeRenamer<'g> {
    pub fn new(graph: &'g EntityGraph, max_rows: usize) -> Self {
        Self { graph, max_rows }
    }

    /// Rename `entity` to the identity given by `parent_id` and `discriminants`
    ///
    /// # Errors
    /// - `InvalidSegment`/`MalformedId` for a bad target identity
    /// - `DuplicateIdentifier` if any recomputed id is already taken
    /// - `CascadeLimitExceeded` if more than `max_rows` rows would change
    /// - `OrphanedPointer` if a pointer still holds a pre-rename id
    pub fn rename(
        &self,
        tx: &StoreTx<'_>,
        entity: &Entity,
        parent_id: Option<EntityId>,
        discriminants: Vec<String>,
        now: DateTime<Utc>,
    ) -> TopologyResult<RenameOutcome> {
        let new_id = self
            .graph
            .compose_id(entity.entity_type, parent_id.as_ref(), &discriminants)?;

        if new_id == entity.id {
            return Ok(RenameOutcome::unchanged(entity));
        }
        if tx.exists(&new_id)? {
            return Err(TopologyError::DuplicateIdentifier(new_id));
        }

        let plan = self.plan(
            tx,
            Planned {
                entity: entity.clone(),
                parent_id,
                discriminants,
                new_id: new_id.clone(),
            },
        )?;

        for planned in &plan {
            if tx.exists(&planned.new_id)? {
                return Err(TopologyError::DuplicateIdentifier(planned.new_id.clone()));
            }
        }

        // pointer rows are touched too and count against the same bound
        let mut touched = plan.len();
        for planned in &plan {
            for edge in self.graph.pointer_edges(planned.entity.entity_type) {
                touched += tx.count_where(*edge, &planned.entity.id)?;
            }
        }
        if touched > self.max_rows {
            return Err(TopologyError::CascadeLimitExceeded {
                root: entity.id.clone(),
                limit: self.max_rows,
            });
        }

        let mut remapped = Vec::with_capacity(plan.len());
        for planned in plan {
            let old_id = planned.entity.id.clone();
            let updated = Entity {
                id: planned.new_id.clone(),
                parent_id: planned.parent_id,
                discriminants: planned.discriminants,
                updated_at: now,
                ..planned.entity
            };
            tx.update_identity(&old_id, &updated)?;

            remapped.push(IdRemap {
                entity_type: updated.entity_type,
                old_id,
                new_id: updated.id,
            });
        }

        let pointer_updates = self.rewrite_pointers(tx, &remapped, &now)?;
        self.check_orphans(tx, &remapped)?;

        debug!(
            old_id = %entity.id,
            new_id = %new_id,
            rows = remapped.len(),
            pointers = pointer_updates.len(),
            "Cascade applied"
        );

        Ok(RenameOutcome {
            entity_type: entity.entity_type,
            old_id: entity.id.clone(),
            new_id,
            remapped,
            pointer_updates,
        })
    }

    /// Rows whose id embeds the root's id, each with its new identity
    ///
    /// The closure is collected first; ids are recomputed afterwards, a row
    /// only once every closure row its parent or keys point at is resolved.
    fn plan(&self, tx: &StoreTx<'_>, root: Planned) -> TopologyResult<Vec<Planned>> {
        let root_id = root.entity.id.clone();
        let rows = self.closure(tx, &root.entity)?;

        let in_closure: HashSet<EntityId> = rows.iter().map(|row| row.id.clone()).collect();
        let mut new_ids: HashMap<EntityId, EntityId> = HashMap::new();
        new_ids.insert(root_id.clone(), root.new_id.clone());

        let mut plan = Vec::with_capacity(rows.len() + 1);
        plan.push(root);

        let mut pending: VecDeque<Entity> = rows.into();
        let mut stalled = 0;
        while let Some(row) = pending.pop_front() {
            let waiting = self
                .embedded_ids(&row)?
                .iter()
                .any(|id| in_closure.contains(id) && !new_ids.contains_key(id));

            if waiting {
                pending.push_back(row);
                stalled += 1;
                if stalled > pending.len() {
                    return Err(TopologyError::CycleDetected(format!(
                        "ids under {} depend on each other",
                        root_id
                    )));
                }
                continue;
            }

            stalled = 0;
            let planned = self.recompute(row, &new_ids)?;
            new_ids.insert(planned.entity.id.clone(), planned.new_id.clone());
            plan.push(planned);
        }

        Ok(plan)
    }

    /// Breadth-first walk over child and key edges, root excluded
    fn closure(&self, tx: &StoreTx<'_>, root: &Entity) -> TopologyResult<Vec<Entity>> {
        let mut visited: HashSet<EntityId> = HashSet::new();
        let mut queue = VecDeque::new();
        let mut rows: Vec<Entity> = Vec::new();

        visited.insert(root.id.clone());
        queue.push_back((root.entity_type, root.id.clone()));

        while let Some((entity_type, old_id)) = queue.pop_front() {
            let mut reached = Vec::new();
            for edge in self.graph.child_edges(entity_type) {
                reached.extend(tx.select_where(*edge, &old_id)?);
            }
            for edge in self.graph.key_edges(entity_type) {
                reached.extend(tx.select_where(*edge, &old_id)?);
            }

            for row in reached {
                if !visited.insert(row.id.clone()) {
                    continue;
                }
                if rows.len() + 1 >= self.max_rows {
                    return Err(TopologyError::CascadeLimitExceeded {
                        root: root.id.clone(),
                        limit: self.max_rows,
                    });
                }

                queue.push_back((row.entity_type, row.id.clone()));
                rows.push(row);
            }
        }

        Ok(rows)
    }

    /// Ids embedded in a row's own id: its parent and its key discriminants
    fn embedded_ids(&self, row: &Entity) -> TopologyResult<Vec<EntityId>> {
        let schema = self.graph.schema(row.entity_type)?;
        let mut ids: Vec<EntityId> = row.parent_id.iter().cloned().collect();
        for (discriminant, value) in schema.discriminants.iter().zip(&row.discriminants) {
            if discriminant.references.is_some() {
                if let Ok(id) = EntityId::parse(value.as_str()) {
                    ids.push(id);
                }
            }
        }
        Ok(ids)
    }

    /// New identity of a row given the ids remapped so far
    fn recompute(&self, row: Entity, new_ids: &HashMap<EntityId, EntityId>) -> TopologyResult<Planned> {
        let schema = self.graph.schema(row.entity_type)?;

        let parent_id = row
            .parent_id
            .as_ref()
            .map(|parent| new_ids.get(parent).unwrap_or(parent).clone());

        let discriminants: Vec<String> = schema
            .discriminants
            .iter()
            .zip(&row.discriminants)
            .map(|(discriminant, value)| match discriminant.references {
                Some(_) => EntityId::parse(value.as_str())
                    .ok()
                    .and_then(|old| new_ids.get(&old))
                    .map(EntityId::to_string)
                    .unwrap_or_else(|| value.clone()),
                None => value.clone(),
            })
            .collect();

        let new_id = self
            .graph
            .compose_id(row.entity_type, parent_id.as_ref(), &discriminants)?;

        Ok(Planned {
            entity: row,
            parent_id,
            discriminants,
            new_id,
        })
    }

    fn rewrite_pointers(
        &self,
        tx: &StoreTx<'_>,
        remapped: &[IdRemap],
        now: &DateTime<Utc>,
    ) -> TopologyResult<Vec<PointerRewrite>> {
        let mut rewrites = Vec::new();

        for remap in remapped {
            for edge in self.graph.pointer_edges(remap.entity_type) {
                let rows = tx.rewrite_pointer(*edge, &remap.old_id, &remap.new_id, now)?;
                rewrites.extend(rows.into_iter().map(|id| PointerRewrite {
                    entity_type: edge.entity_type,
                    id,
                    field: edge.field.to_string(),
                    old_value: remap.old_id.clone(),
                    new_value: remap.new_id.clone(),
                }));
            }
        }

        Ok(rewrites)
    }

    fn check_orphans(&self, tx: &StoreTx<'_>, remapped: &[IdRemap]) -> TopologyResult<()> {
        for remap in remapped {
            for edge in self.graph.pointer_edges(remap.entity_type) {
                if let Some((_, value)) = tx.values_under(*edge, &remap.old_id)?.into_iter().next() {
                    return Err(TopologyError::OrphanedPointer {
                        entity_type: edge.entity_type,
                        field: edge.field.to_string(),
                        value,
                    });
                }
            }
        }
        Ok(())
    }
}
