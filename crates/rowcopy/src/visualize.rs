//! Copy tree preview.
//!
//! Walks the schema graph with the same rules as the data walker but without
//! touching any data, to show which tables a seed query would reach.

use std::collections::HashSet;

use crate::core::{Relationship, SchemaGraph};
use crate::error::{CopyError, Result};
use crate::retrieve::{TableFilter, WalkDirection};

const INDENT: &str = "  ";

/// A table in the copy tree with the parents and children it reaches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeTable {
    pub name: String,
    pub skipped: bool,
    pub before: Vec<TreeTable>,
    pub after: Vec<TreeTable>,
}

impl TreeTable {
    fn leaf(name: &str, skipped: bool) -> Self {
        Self {
            name: name.to_string(),
            skipped,
            before: Vec::new(),
            after: Vec::new(),
        }
    }

    /// Indented rendering: parents one level deeper above the table, children below.
    pub fn render(&self) -> String {
        let mut lines = Vec::new();
        self.render_into(0, &mut lines);
        lines.join("\n")
    }

    fn render_into(&self, depth: usize, lines: &mut Vec<String>) {
        for parent in &self.before {
            parent.render_into(depth + 1, lines);
        }
        let marker = if self.skipped { " (skipped)" } else { "" };
        lines.push(format!("{}{}{}", INDENT.repeat(depth), self.name, marker));
        for child in &self.after {
            child.render_into(depth + 1, lines);
        }
    }
}

/// Builds [`TreeTable`]s from a schema graph.
pub struct CopyVisualizer<'a> {
    graph: &'a SchemaGraph,
    filter: TableFilter,
}

impl<'a> CopyVisualizer<'a> {
    pub fn new(graph: &'a SchemaGraph, filter: TableFilter) -> Self {
        Self { graph, filter }
    }

    /// Tree of tables reachable from `table`.
    pub fn tree(&self, table: &str) -> Result<TreeTable> {
        let start = self.graph.table(table).ok_or_else(|| {
            CopyError::Schema(format!(
                "Table '{}' does not exist in the source database",
                table
            ))
        })?;
        let mut processed = HashSet::new();
        Ok(self.walk(&start.name, WalkDirection::Both, &mut processed))
    }

    fn walk(
        &self,
        name: &str,
        direction: WalkDirection,
        processed: &mut HashSet<Relationship>,
    ) -> TreeTable {
        let mut node = TreeTable::leaf(name, false);
        let Some(table) = self.graph.table(name) else {
            return node;
        };

        if direction.includes_parents() {
            for rel in &table.inbound {
                if processed.insert(rel.clone()) {
                    node.before
                        .push(self.visit(&rel.source_table, WalkDirection::Parents, processed));
                }
            }
        }
        if direction.includes_children() {
            for rel in &table.outbound {
                if processed.insert(rel.clone()) {
                    node.after
                        .push(self.visit(&rel.target_table, direction, processed));
                }
            }
        }
        node
    }

    fn visit(
        &self,
        name: &str,
        direction: WalkDirection,
        processed: &mut HashSet<Relationship>,
    ) -> TreeTable {
        if self.filter.is_skipped(name) {
            TreeTable::leaf(name, true)
        } else {
            self.walk(name, direction, processed)
        }
    }
}
