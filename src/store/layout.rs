// Copyright (c) 2025 - Cowboy AI, Inc.
//! Relational layout derived from the entity graph
//!
//! One table per entity type. Column order is fixed:
//!
//! ```text
//! id | parent field | discriminant fields.. | pointer fields.. | cidr | defaults | created_at | updated_at
//! ```
//!
//! Parent, key and pointer columns are deferred foreign keys so a cascade can
//! rewrite ids top-down inside one transaction and still be checked at commit.

use crate::schema::{EntityGraph, TypeSchema};

/// Global id index table, enforces id uniqueness across all types
pub const INDEX_TABLE: &str = "entity_index";

pub const ID: &str = "id";
pub const CIDR: &str = "cidr";
pub const DEFAULTS: &str = "defaults";
pub const CREATED_AT: &str = "created_at";
pub const UPDATED_AT: &str = "updated_at";

/// Quote an identifier (several table names are SQL keywords)
pub fn quote(name: &str) -> String {
    format!("\"{}\"", name)
}

/// Ordered column list of a type's table
pub fn columns(schema: &TypeSchema) -> Vec<&'static str> {
    let mut columns = vec![ID];
    columns.extend(schema.parent.iter().map(|p| p.field));
    columns.extend(schema.discriminant_fields());
    columns.extend(schema.pointers.iter().map(|p| p.field));
    if schema.has_cidr {
        columns.push(CIDR);
    }
    columns.extend([DEFAULTS, CREATED_AT, UPDATED_AT]);
    columns
}

/// `SELECT` list for a type's table
pub fn select_list(schema: &TypeSchema) -> String {
    columns(schema)
        .into_iter()
        .map(quote)
        .collect::<Vec<_>>()
        .join(", ")
}

/// True when `field` is a parent, discriminant or pointer column of the type
pub fn is_reference_column(schema: &TypeSchema, field: &str) -> bool {
    schema.parent.iter().any(|p| p.field == field)
        || schema.discriminant_fields().any(|d| d == field)
        || schema.pointers.iter().any(|p| p.field == field)
}

fn foreign_key(target: &str) -> String {
    format!(
        "REFERENCES {}({}) DEFERRABLE INITIALLY DEFERRED",
        quote(target),
        quote(ID)
    )
}

/// `CREATE TABLE` statement for one type
pub fn create_table(schema: &TypeSchema) -> String {
    let mut defs = vec![format!("{} TEXT PRIMARY KEY NOT NULL", quote(ID))];

    if let Some(parent) = schema.parent {
        defs.push(format!(
            "{} TEXT NOT NULL {}",
            quote(parent.field),
            foreign_key(parent.entity_type.as_str())
        ));
    }

    for discriminant in &schema.discriminants {
        match discriminant.references {
            Some(root) => defs.push(format!(
                "{} TEXT NOT NULL {}",
                quote(discriminant.field),
                foreign_key(root.as_str())
            )),
            None => defs.push(format!("{} TEXT NOT NULL", quote(discriminant.field))),
        }
    }

    for pointer in &schema.pointers {
        defs.push(format!(
            "{} TEXT {}",
            quote(pointer.field),
            foreign_key(pointer.target.as_str())
        ));
    }

    if schema.has_cidr {
        defs.push(format!("{} TEXT NOT NULL", quote(CIDR)));
    }

    defs.push(format!("{} TEXT NOT NULL DEFAULT '{{}}'", quote(DEFAULTS)));
    defs.push(format!("{} TEXT NOT NULL", quote(CREATED_AT)));
    defs.push(format!("{} TEXT NOT NULL", quote(UPDATED_AT)));

    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    {}\n);",
        quote(schema.entity_type.as_str()),
        defs.join(",\n    ")
    )
}

/// Index statements for every reference column of one type
pub fn create_indexes(schema: &TypeSchema) -> Vec<String> {
    let table = schema.entity_type.as_str();
    let fields = schema
        .parent
        .iter()
        .map(|p| p.field)
        .chain(
            schema
                .discriminants
                .iter()
                .filter(|d| d.references.is_some())
                .map(|d| d.field),
        )
        .chain(schema.pointers.iter().map(|p| p.field));

    fields
        .map(|field| {
            format!(
                "CREATE INDEX IF NOT EXISTS {} ON {}({});",
                quote(&format!("{}_{}_idx", table, field)),
                quote(table),
                quote(field)
            )
        })
        .collect()
}

/// Complete DDL script for a graph
pub fn schema_script(graph: &EntityGraph) -> String {
    let mut script = format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    {} TEXT PRIMARY KEY NOT NULL,\n    \"entity_type\" TEXT NOT NULL\n);\n",
        quote(INDEX_TABLE),
        quote(ID)
    );

    for schema in graph.schemas() {
        script.push_str(&create_table(schema));
        script.push('\n');
        for index in create_indexes(schema) {
            script.push_str(&index);
            script.push('\n');
        }
    }

    script
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EntityType;

    #[test]
    fn test_column_order() {
        let graph = EntityGraph::standard().unwrap();
        let deployment = graph.schema(EntityType::Deployment).unwrap();
        assert_eq!(
            columns(deployment),
            vec![
                "id",
                "service_id",
                "name",
                "fleet_id",
                "current_release_id",
                "defaults",
                "created_at",
                "updated_at"
            ]
        );

        let allocation = graph.schema(EntityType::Allocation).unwrap();
        assert_eq!(
            &columns(allocation)[..4],
            &["id", "deployment_id", "allocation_type_id", "watermark"]
        );
    }

    #[test]
    fn test_create_table_quotes_keywords() {
        let graph = EntityGraph::standard().unwrap();
        let ddl = create_table(graph.schema(EntityType::Release).unwrap());
        assert!(ddl.starts_with("CREATE TABLE IF NOT EXISTS \"release\""));
        assert!(ddl.contains(
            "\"deployment_id\" TEXT NOT NULL REFERENCES \"deployment\"(\"id\") DEFERRABLE INITIALLY DEFERRED"
        ));
    }

    #[test]
    fn test_indexes_cover_pointer_and_key_columns() {
        let graph = EntityGraph::standard().unwrap();
        let indexes = create_indexes(graph.schema(EntityType::Provider).unwrap());
        assert_eq!(indexes.len(), 2);
        assert!(indexes.iter().any(|s| s.contains("\"provider_provider_type_id_idx\"")));

        let indexes = create_indexes(graph.schema(EntityType::Deployment).unwrap());
        assert_eq!(indexes.len(), 3);
    }

    #[test]
    fn test_subnet_cidr_is_required() {
        let graph = EntityGraph::standard().unwrap();
        let ddl = create_table(graph.schema(EntityType::Subnet).unwrap());
        assert!(ddl.contains("\"cidr\" TEXT NOT NULL"));
    }
}
