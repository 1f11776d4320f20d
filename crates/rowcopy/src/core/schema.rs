//! Schema graph types: tables, columns and the foreign-key relationships between them.
//!
//! A [`SchemaGraph`] is built once per connection and never mutated afterwards.
//! All names used as keys are lowercase.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::identifier::normalize_table_name;
use super::value::SqlType;

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    /// Lowercased column name.
    pub name: String,

    /// Driver-reported type, used for decoding and NULL binding.
    pub sql_type: SqlType,

    /// Whether the column accepts NULL.
    #[serde(default = "default_nullable")]
    pub nullable: bool,
}

fn default_nullable() -> bool {
    true
}

impl Column {
    pub fn new(name: impl AsRef<str>, sql_type: SqlType, nullable: bool) -> Self {
        Self {
            name: name.as_ref().to_lowercase(),
            sql_type,
            nullable,
        }
    }
}

/// One foreign key.
///
/// `source_table` is the referenced (parent) table and `target_table` the
/// referencing (child) table. `column_map` pairs parent columns with child
/// columns in key order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    pub source_table: String,
    pub target_table: String,
    pub column_map: Vec<(String, String)>,
}

impl Relationship {
    pub fn new(
        source_table: impl AsRef<str>,
        target_table: impl AsRef<str>,
        column_map: Vec<(String, String)>,
    ) -> Self {
        Self {
            source_table: source_table.as_ref().to_lowercase(),
            target_table: target_table.as_ref().to_lowercase(),
            column_map: column_map
                .into_iter()
                .map(|(s, t)| (s.to_lowercase(), t.to_lowercase()))
                .collect(),
        }
    }

    /// True when parent and child are the same table.
    pub fn is_self_reference(&self) -> bool {
        self.source_table == self.target_table
    }
}

/// Table metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    /// Lowercased table name.
    pub name: String,

    /// Column definitions in catalog order.
    pub columns: Vec<Column>,

    /// Relationships where this table is the child.
    #[serde(default)]
    pub inbound: BTreeSet<Relationship>,

    /// Relationships where this table is the parent.
    #[serde(default)]
    pub outbound: BTreeSet<Relationship>,

    /// Primary key (or best row identifier) column names. Empty when the table has neither.
    #[serde(default)]
    pub primary_key: BTreeSet<String>,
}

impl Table {
    pub fn new(name: impl AsRef<str>, columns: Vec<Column>) -> Self {
        Self {
            name: name.as_ref().to_lowercase(),
            columns,
            inbound: BTreeSet::new(),
            outbound: BTreeSet::new(),
            primary_key: BTreeSet::new(),
        }
    }

    pub fn with_primary_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.primary_key = columns
            .into_iter()
            .map(|c| c.as_ref().to_lowercase())
            .collect();
        self
    }

    /// Find a column by (case-insensitive) name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        let name = name.to_lowercase();
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_primary_key(&self) -> bool {
        !self.primary_key.is_empty()
    }

    /// Whether `column` participates in row identification.
    ///
    /// Without a primary key every column does.
    pub fn is_key_column(&self, column: &str) -> bool {
        self.primary_key.is_empty() || self.primary_key.contains(column)
    }
}

/// One row of exported/imported key metadata as reported by a catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyColumn {
    /// Constraint name; empty when the driver does not report one.
    pub key_name: String,
    pub pk_table: String,
    pub pk_column: String,
    pub fk_table: String,
    pub fk_column: String,
}

/// Group catalog key rows into relationships.
///
/// Catalog cursors return key columns grouped per constraint, so contiguous rows
/// with the same parent, child and key name form one relationship whose column
/// pairs keep their reported order.
pub fn group_key_columns(rows: &[KeyColumn]) -> Vec<Relationship> {
    let mut relationships = Vec::new();
    let mut current: Option<(&KeyColumn, Vec<(String, String)>)> = None;

    for row in rows {
        let continues = matches!(&current, Some((head, _))
            if head.key_name == row.key_name
                && head.pk_table.eq_ignore_ascii_case(&row.pk_table)
                && head.fk_table.eq_ignore_ascii_case(&row.fk_table));

        if !continues {
            if let Some((head, pairs)) = current.take() {
                relationships.push(Relationship::new(&head.pk_table, &head.fk_table, pairs));
            }
            current = Some((row, Vec::new()));
        }
        if let Some((_, pairs)) = current.as_mut() {
            pairs.push((row.pk_column.clone(), row.fk_column.clone()));
        }
    }

    if let Some((head, pairs)) = current {
        relationships.push(Relationship::new(&head.pk_table, &head.fk_table, pairs));
    }
    relationships
}

/// Add every outbound relationship to its child's inbound set when the driver failed to report it.
///
/// Outbound sets are trusted as reported. Takes ownership of the map and returns
/// the repaired map; nothing else observes the intermediate state.
pub fn repair_relationships(mut tables: BTreeMap<String, Table>) -> BTreeMap<String, Table> {
    let missing: Vec<Relationship> = tables
        .values()
        .flat_map(|table| table.outbound.iter())
        .filter(|rel| match tables.get(&rel.target_table) {
            Some(child) => !child.inbound.contains(*rel),
            None => {
                debug!(
                    "Relationship {} -> {} points outside the scanned schema",
                    rel.source_table, rel.target_table
                );
                false
            }
        })
        .cloned()
        .collect();

    for rel in missing {
        debug!(
            "Restoring inbound relationship {} -> {}",
            rel.source_table, rel.target_table
        );
        if let Some(child) = tables.get_mut(&rel.target_table) {
            child.inbound.insert(rel);
        }
    }
    tables
}

/// Immutable snapshot of a database's tables and relationships.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaGraph {
    pub tables: BTreeMap<String, Arc<Table>>,
}

impl SchemaGraph {
    /// Build a graph from already-complete tables (no repair pass).
    pub fn from_tables<I>(tables: I) -> Self
    where
        I: IntoIterator<Item = Table>,
    {
        Self {
            tables: tables
                .into_iter()
                .map(|t| (t.name.clone(), Arc::new(t)))
                .collect(),
        }
    }

    /// Build a graph from raw catalog tables, repairing missing inbound relationships.
    pub fn from_catalog(tables: BTreeMap<String, Table>) -> Self {
        Self::from_tables(repair_relationships(tables).into_values())
    }

    /// Case-insensitive lookup. Schema qualifiers and identifier quotes are ignored.
    pub fn table(&self, name: &str) -> Option<&Arc<Table>> {
        self.tables.get(&normalize_table_name(name))
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
