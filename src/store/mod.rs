// Copyright (c) 2025 - Cowboy AI, Inc.
//! Relational Topology Store
//!
//! SQLite-backed storage for the entity graph. The store knows how to map
//! [`Entity`] records onto per-type tables; it knows nothing about id rules,
//! cascades or validation. Those live in [`crate::registry`].
//!
//! # Transactions
//!
//! ```text
//! write(|tx| ...)   BEGIN IMMEDIATE  -> closure -> COMMIT   (ROLLBACK on Err)
//! read(|tx| ...)    BEGIN DEFERRED   -> closure -> COMMIT
//! ```
//!
//! `BEGIN IMMEDIATE` takes the write lock up front, so two writers racing for
//! the same rows cannot both run their read-compute-write sequence; the loser
//! sees `SQLITE_BUSY`, surfaced as the retryable [`TopologyError::Conflict`].

pub mod layout;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Transaction, TransactionBehavior};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::RegistryConfig;
use crate::domain::{Cidr, Entity, EntityId, EntityType};
use crate::errors::{TopologyError, TopologyResult};
use crate::schema::{Edge, EntityGraph, TypeSchema};

use layout::quote;

/// SQLite topology store
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    graph: Arc<EntityGraph>,
}

impl SqliteStore {
    /// Opens (or creates) the store described by `config`
    pub fn open(config: &RegistryConfig, graph: Arc<EntityGraph>) -> TopologyResult<Self> {
        let conn = match &config.database_path {
            Some(path) => {
                info!("Opening topology store at {}", path.display());
                Connection::open(path)
            }
            None => Connection::open_in_memory(),
        }
        .map_err(|e| TopologyError::Storage(format!("failed to open topology store: {e}")))?;

        Self::from_connection(conn, graph, config.busy_timeout())
    }

    /// Opens an in-memory store (for testing)
    pub fn open_in_memory(graph: Arc<EntityGraph>) -> TopologyResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            TopologyError::Storage(format!("failed to open in-memory topology store: {e}"))
        })?;
        Self::from_connection(conn, graph, Duration::ZERO)
    }

    fn from_connection(
        conn: Connection,
        graph: Arc<EntityGraph>,
        busy_timeout: Duration,
    ) -> TopologyResult<Self> {
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            graph,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> TopologyResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(&layout::schema_script(&self.graph))
            .map_err(|e| TopologyError::Storage(format!("failed to init topology schema: {e}")))?;
        debug!("Topology schema initialized");
        Ok(())
    }

    fn lock(&self) -> TopologyResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| TopologyError::Storage("topology store connection poisoned".to_string()))
    }

    /// Entity graph this store was laid out from
    pub fn graph(&self) -> &EntityGraph {
        &self.graph
    }

    /// Shared handle to the entity graph
    pub fn graph_handle(&self) -> Arc<EntityGraph> {
        Arc::clone(&self.graph)
    }

    /// Run `f` inside a write transaction; commit on `Ok`, roll back on `Err`
    pub fn write<T, F>(&self, f: F) -> TopologyResult<T>
    where
        F: FnOnce(&StoreTx<'_>) -> TopologyResult<T>,
    {
        self.run(TransactionBehavior::Immediate, f)
    }

    /// Run `f` inside a read transaction for a consistent snapshot
    pub fn read<T, F>(&self, f: F) -> TopologyResult<T>
    where
        F: FnOnce(&StoreTx<'_>) -> TopologyResult<T>,
    {
        self.run(TransactionBehavior::Deferred, f)
    }

    fn run<T, F>(&self, behavior: TransactionBehavior, f: F) -> TopologyResult<T>
    where
        F: FnOnce(&StoreTx<'_>) -> TopologyResult<T>,
    {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(behavior)?;
        let store_tx = StoreTx {
            tx,
            graph: &self.graph,
        };

        // dropping `store_tx` on the error path rolls the transaction back
        let value = f(&store_tx)?;
        store_tx.tx.commit()?;
        Ok(value)
    }
}

/// Open transaction over the topology tables
pub struct StoreTx<'c> {
    tx: Transaction<'c>,
    graph: &'c EntityGraph,
}

impl<'c> StoreTx<'c> {
    /// Entity graph the tables were laid out from
    pub fn graph(&self) -> &EntityGraph {
        self.graph
    }

    /// Type of the entity with this id, from the global index
    pub fn entity_type_of(&self, id: &EntityId) -> TopologyResult<Option<EntityType>> {
        let sql = format!(
            "SELECT \"entity_type\" FROM {} WHERE {} = ?1",
            quote(layout::INDEX_TABLE),
            quote(layout::ID)
        );
        let found: Option<String> = self
            .tx
            .query_row(&sql, params![id.as_str()], |row| row.get(0))
            .optional()?;

        found
            .map(|name| name.parse::<EntityType>().map_err(TopologyError::Storage))
            .transpose()
    }

    /// True when any entity of any type has this id
    pub fn exists(&self, id: &EntityId) -> TopologyResult<bool> {
        Ok(self.entity_type_of(id)?.is_some())
    }

    /// Load an entity by id, whatever its type
    pub fn get(&self, id: &EntityId) -> TopologyResult<Option<Entity>> {
        match self.entity_type_of(id)? {
            Some(entity_type) => self.get_typed(entity_type, id),
            None => Ok(None),
        }
    }

    /// Load an entity by id, failing with `NotFound`
    pub fn require(&self, id: &EntityId) -> TopologyResult<Entity> {
        self.get(id)?
            .ok_or_else(|| TopologyError::NotFound(id.clone()))
    }

    /// Load an entity of a known type
    pub fn get_typed(&self, entity_type: EntityType, id: &EntityId) -> TopologyResult<Option<Entity>> {
        let schema = self.graph.schema(entity_type)?;
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = ?1",
            layout::select_list(schema),
            quote(entity_type.as_str()),
            quote(layout::ID)
        );
        Ok(self.query_entities(schema, &sql, params![id.as_str()])?.pop())
    }

    /// All entities of a type, ordered by id
    pub fn list(&self, entity_type: EntityType) -> TopologyResult<Vec<Entity>> {
        let schema = self.graph.schema(entity_type)?;
        let sql = format!(
            "SELECT {} FROM {} ORDER BY {}",
            layout::select_list(schema),
            quote(entity_type.as_str()),
            quote(layout::ID)
        );
        self.query_entities(schema, &sql, [])
    }

    /// Number of stored entities of a type
    pub fn count(&self, entity_type: EntityType) -> TopologyResult<usize> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote(entity_type.as_str()));
        let count: i64 = self.tx.query_row(&sql, [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Entities of a type whose `field` equals `value`, ordered by id
    pub fn select_where(&self, edge: Edge, value: &EntityId) -> TopologyResult<Vec<Entity>> {
        let schema = self.reference_schema(edge)?;
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = ?1 ORDER BY {}",
            layout::select_list(schema),
            quote(edge.entity_type.as_str()),
            quote(edge.field),
            quote(layout::ID)
        );
        self.query_entities(schema, &sql, params![value.as_str()])
    }

    /// Number of rows of `edge.entity_type` whose `edge.field` equals `value`
    pub fn count_where(&self, edge: Edge, value: &EntityId) -> TopologyResult<usize> {
        self.reference_schema(edge)?;
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE {} = ?1",
            quote(edge.entity_type.as_str()),
            quote(edge.field)
        );
        let count: i64 = self
            .tx
            .query_row(&sql, params![value.as_str()], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Rows whose `edge.field` is `id` or one of its descendants' ids
    ///
    /// Returns `(row id, stored value)` pairs.
    pub fn values_under(&self, edge: Edge, id: &EntityId) -> TopologyResult<Vec<(String, String)>> {
        self.reference_schema(edge)?;
        let sql = format!(
            "SELECT {id}, {f} FROM {t} WHERE {f} = ?1 OR substr({f}, 1, length(?2)) = ?2 ORDER BY {id}",
            id = quote(layout::ID),
            f = quote(edge.field),
            t = quote(edge.entity_type.as_str()),
        );
        let prefix = format!("{}{}", id, crate::domain::DELIMITER);

        let mut stmt = self.tx.prepare(&sql)?;
        let rows = stmt.query_map(params![id.as_str(), prefix], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Insert a new entity and register its id in the global index
    pub fn insert(&self, entity: &Entity) -> TopologyResult<()> {
        let schema = self.graph.schema(entity.entity_type)?;
        let columns = layout::columns(schema);
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();

        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote(entity.entity_type.as_str()),
            layout::select_list(schema),
            placeholders.join(", ")
        );
        self.tx
            .execute(&sql, params_from_iter(encode(schema, entity)?.iter()))?;

        let index_sql = format!(
            "INSERT INTO {} ({}, \"entity_type\") VALUES (?1, ?2)",
            quote(layout::INDEX_TABLE),
            quote(layout::ID)
        );
        self.tx
            .execute(&index_sql, params![entity.id.as_str(), entity.entity_type.as_str()])?;

        Ok(())
    }

    /// Rewrite an entity's identity columns (id, parent, discriminants)
    pub fn update_identity(&self, old_id: &EntityId, entity: &Entity) -> TopologyResult<()> {
        let schema = self.graph.schema(entity.entity_type)?;

        let mut assignments = vec![quote(layout::ID)];
        let mut values: Vec<Option<String>> = vec![Some(entity.id.to_string())];
        if let Some(parent) = schema.parent {
            assignments.push(quote(parent.field));
            values.push(entity.parent_id.as_ref().map(EntityId::to_string));
        }
        for (field, value) in schema.discriminant_fields().zip(&entity.discriminants) {
            assignments.push(quote(field));
            values.push(Some(value.clone()));
        }
        assignments.push(quote(layout::UPDATED_AT));
        values.push(Some(format_timestamp(&entity.updated_at)));
        values.push(Some(old_id.to_string()));

        let set: Vec<String> = assignments
            .iter()
            .enumerate()
            .map(|(i, column)| format!("{} = ?{}", column, i + 1))
            .collect();
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ?{}",
            quote(entity.entity_type.as_str()),
            set.join(", "),
            quote(layout::ID),
            values.len()
        );
        let changed = self.tx.execute(&sql, params_from_iter(values.iter()))?;
        if changed == 0 {
            return Err(TopologyError::NotFound(old_id.clone()));
        }

        let index_sql = format!(
            "UPDATE {} SET {id} = ?1 WHERE {id} = ?2",
            quote(layout::INDEX_TABLE),
            id = quote(layout::ID)
        );
        self.tx
            .execute(&index_sql, params![entity.id.as_str(), old_id.as_str()])?;
        Ok(())
    }

    /// Rewrite an entity's pointer columns and defaults blob
    pub fn update_attributes(&self, entity: &Entity) -> TopologyResult<()> {
        let schema = self.graph.schema(entity.entity_type)?;

        let mut assignments = Vec::new();
        let mut values: Vec<Option<String>> = Vec::new();
        for pointer in &schema.pointers {
            assignments.push(quote(pointer.field));
            values.push(entity.pointer(pointer.field).map(EntityId::to_string));
        }
        assignments.push(quote(layout::DEFAULTS));
        values.push(Some(serde_json::to_string(&entity.defaults)?));
        assignments.push(quote(layout::UPDATED_AT));
        values.push(Some(format_timestamp(&entity.updated_at)));
        values.push(Some(entity.id.to_string()));

        let set: Vec<String> = assignments
            .iter()
            .enumerate()
            .map(|(i, column)| format!("{} = ?{}", column, i + 1))
            .collect();
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ?{}",
            quote(entity.entity_type.as_str()),
            set.join(", "),
            quote(layout::ID),
            values.len()
        );
        let changed = self.tx.execute(&sql, params_from_iter(values.iter()))?;
        if changed == 0 {
            return Err(TopologyError::NotFound(entity.id.clone()));
        }
        Ok(())
    }

    /// Replace every `old` value of a pointer column with `new`
    ///
    /// Returns the ids of the rows that were rewritten.
    pub fn rewrite_pointer(
        &self,
        edge: Edge,
        old: &EntityId,
        new: &EntityId,
        now: &DateTime<Utc>,
    ) -> TopologyResult<Vec<EntityId>> {
        self.reference_schema(edge)?;
        let table = quote(edge.entity_type.as_str());
        let field = quote(edge.field);

        let select = format!(
            "SELECT {id} FROM {table} WHERE {field} = ?1 ORDER BY {id}",
            id = quote(layout::ID)
        );
        let mut stmt = self.tx.prepare(&select)?;
        let ids = stmt
            .query_map(params![old.as_str()], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let update = format!(
            "UPDATE {table} SET {field} = ?1, {updated} = ?2 WHERE {field} = ?3",
            updated = quote(layout::UPDATED_AT)
        );
        self.tx.execute(
            &update,
            params![new.as_str(), format_timestamp(now), old.as_str()],
        )?;

        ids.into_iter()
            .map(|id| EntityId::parse(id).map_err(TopologyError::from))
            .collect()
    }

    /// Remove an entity row and its index entry
    pub fn delete(&self, entity_type: EntityType, id: &EntityId) -> TopologyResult<()> {
        let sql = format!(
            "DELETE FROM {} WHERE {} = ?1",
            quote(entity_type.as_str()),
            quote(layout::ID)
        );
        let changed = self.tx.execute(&sql, params![id.as_str()])?;
        if changed == 0 {
            return Err(TopologyError::NotFound(id.clone()));
        }

        let index_sql = format!(
            "DELETE FROM {} WHERE {} = ?1",
            quote(layout::INDEX_TABLE),
            quote(layout::ID)
        );
        self.tx.execute(&index_sql, params![id.as_str()])?;
        Ok(())
    }

    fn reference_schema(&self, edge: Edge) -> TopologyResult<&TypeSchema> {
        let schema = self.graph.schema(edge.entity_type)?;
        if !layout::is_reference_column(schema, edge.field) {
            return Err(TopologyError::UnknownField {
                entity_type: edge.entity_type,
                field: edge.field.to_string(),
            });
        }
        Ok(schema)
    }

    fn query_entities<P: rusqlite::Params>(
        &self,
        schema: &TypeSchema,
        sql: &str,
        params: P,
    ) -> TopologyResult<Vec<Entity>> {
        let width = layout::columns(schema).len();
        let mut stmt = self.tx.prepare(sql)?;
        let rows = stmt.query_map(params, |row| {
            (0..width)
                .map(|i| row.get::<_, Option<String>>(i))
                .collect::<rusqlite::Result<Vec<_>>>()
        })?;

        let mut entities = Vec::new();
        for row in rows {
            entities.push(decode(schema, row?)?);
        }
        Ok(entities)
    }
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(value: &str) -> TopologyResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| TopologyError::Storage(format!("invalid timestamp {value:?}: {e}")))
}

fn encode(schema: &TypeSchema, entity: &Entity) -> TopologyResult<Vec<Option<String>>> {
    let mut values = vec![Some(entity.id.to_string())];
    if schema.parent.is_some() {
        values.push(entity.parent_id.as_ref().map(EntityId::to_string));
    }
    values.extend(entity.discriminants.iter().cloned().map(Some));
    for pointer in &schema.pointers {
        values.push(entity.pointer(pointer.field).map(EntityId::to_string));
    }
    if schema.has_cidr {
        values.push(entity.cidr.map(|c| c.as_cidr()));
    }
    values.push(Some(serde_json::to_string(&entity.defaults)?));
    values.push(Some(format_timestamp(&entity.created_at)));
    values.push(Some(format_timestamp(&entity.updated_at)));
    Ok(values)
}

/// Positional reader over one decoded row
struct RowReader<'s> {
    schema: &'s TypeSchema,
    values: std::vec::IntoIter<Option<String>>,
}

impl RowReader<'_> {
    fn optional(&mut self) -> Option<String> {
        self.values.next().flatten()
    }

    fn required(&mut self, column: &str) -> TopologyResult<String> {
        self.optional().ok_or_else(|| {
            TopologyError::Storage(format!(
                "{}.{} is unexpectedly NULL",
                self.schema.entity_type, column
            ))
        })
    }
}

fn decode(schema: &TypeSchema, row: Vec<Option<String>>) -> TopologyResult<Entity> {
    let mut row = RowReader {
        schema,
        values: row.into_iter(),
    };

    let id = EntityId::parse(row.required(layout::ID)?)?;
    let parent_id = match schema.parent {
        Some(parent) => Some(EntityId::parse(row.required(parent.field)?)?),
        None => None,
    };

    let mut discriminants = Vec::with_capacity(schema.discriminants.len());
    for field in schema.discriminant_fields() {
        discriminants.push(row.required(field)?);
    }

    let mut pointers = BTreeMap::new();
    for pointer in &schema.pointers {
        let value = row.optional().map(EntityId::parse).transpose()?;
        pointers.insert(pointer.field.to_string(), value);
    }

    let cidr = if schema.has_cidr {
        Some(Cidr::new(&row.required(layout::CIDR)?)?)
    } else {
        None
    };

    let defaults = serde_json::from_str(&row.required(layout::DEFAULTS)?)?;
    let created_at = parse_timestamp(&row.required(layout::CREATED_AT)?)?;
    let updated_at = parse_timestamp(&row.required(layout::UPDATED_AT)?)?;

    Ok(Entity {
        entity_type: schema.entity_type,
        id,
        parent_id,
        discriminants,
        pointers,
        cidr,
        defaults,
        created_at,
        updated_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn id(s: &str) -> EntityId {
        EntityId::parse(s).unwrap()
    }

    fn store() -> SqliteStore {
        SqliteStore::open_in_memory(Arc::new(EntityGraph::standard().unwrap())).unwrap()
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
            defaults: serde_json::json!({"owner": "platform"}),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_insert_and_load_roundtrip() {
        let store = store();
        let app = entity(EntityType::Application, "app1", None);
        let stack = entity(EntityType::Stack, "app1:web", Some("app1"));

        store
            .write(|tx| {
                tx.insert(&app)?;
                tx.insert(&stack)
            })
            .unwrap();

        let loaded = store.read(|tx| tx.get(&stack.id)).unwrap();
        assert_eq!(loaded, Some(stack.clone()));
        assert_eq!(
            store.read(|tx| tx.entity_type_of(&app.id)).unwrap(),
            Some(EntityType::Application)
        );
        assert_eq!(store.read(|tx| tx.count(EntityType::Stack)).unwrap(), 1);
    }

    #[test]
    fn test_failed_write_rolls_back() {
        let store = store();
        let app = entity(EntityType::Application, "app1", None);

        let result: TopologyResult<()> = store.write(|tx| {
            tx.insert(&app)?;
            Err(TopologyError::Conflict("forced".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(store.read(|tx| tx.get(&app.id)).unwrap(), None);
    }

    #[test]
    fn test_dangling_parent_fails_at_commit() {
        let store = store();
        let stack = entity(EntityType::Stack, "app1:web", Some("app1"));

        let err = store.write(|tx| tx.insert(&stack)).unwrap_err();
        assert!(matches!(err, TopologyError::IntegrityViolation(_)));
        assert_eq!(store.read(|tx| tx.count(EntityType::Stack)).unwrap(), 0);
    }

    #[test]
    fn test_unknown_reference_column() {
        let store = store();
        let edge = Edge {
            entity_type: EntityType::Stack,
            field: "language_id",
        };
        let err = store.read(|tx| tx.count_where(edge, &id("rust"))).unwrap_err();
        assert!(matches!(err, TopologyError::UnknownField { .. }));
    }

    #[test]
    fn test_values_under_matches_descendants_only() {
        let store = store();
        let rows = [
            entity(EntityType::Language, "rust", None),
            entity(EntityType::Application, "app1", None),
            entity(EntityType::Stack, "app1:web", Some("app1")),
            entity(EntityType::Stack, "app1:webx", Some("app1")),
        ];
        let mut api = entity(EntityType::Service, "app1:web:api", Some("app1:web"));
        api.pointers.insert("language_id".to_string(), Some(id("rust")));
        let mut admin = entity(EntityType::Service, "app1:webx:admin", Some("app1:webx"));
        admin.pointers.insert("language_id".to_string(), None);

        store
            .write(|tx| {
                for row in &rows {
                    tx.insert(row)?;
                }
                tx.insert(&api)?;
                tx.insert(&admin)
            })
            .unwrap();

        let edge = Edge {
            entity_type: EntityType::Service,
            field: "stack_id",
        };
        let under = store.read(|tx| tx.values_under(edge, &id("app1:web"))).unwrap();
        assert_eq!(under, vec![("app1:web:api".to_string(), "app1:web".to_string())]);

        let loaded = store.read(|tx| tx.require(&admin.id)).unwrap();
        assert_eq!(loaded.pointers.get("language_id"), Some(&None));
    }
}
