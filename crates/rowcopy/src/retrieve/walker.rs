//! Relationship walker.
//!
//! Starting from the seed rows, the walker follows foreign keys in both
//! directions and returns the rows it found as a [`DataNode`] tree. Parents
//! land in `before`, children in `after`.
//!
//! Each relationship is followed at most once per seed query, which is what
//! makes the walk terminate on cyclic and self-referencing schemas. Parents are
//! walked towards their own parents only; children keep the direction they
//! were reached with and may still pull in parents of their own.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use tracing::{debug, error, info, trace, warn};

use super::filter::TableFilter;
use super::select::SelectQuery;
use crate::core::{DataNode, DataRow, Database, Relationship, SchemaGraph, Table};
use crate::error::{CopyError, Result};
use crate::query::Query;

/// Default rows per relationship statement.
pub const DEFAULT_CHUNK_SIZE: usize = 500;

/// Which relationships a visited table may follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WalkDirection {
    #[default]
    Both,
    Parents,
    Children,
}

impl WalkDirection {
    pub fn includes_parents(self) -> bool {
        matches!(self, WalkDirection::Both | WalkDirection::Parents)
    }

    pub fn includes_children(self) -> bool {
        matches!(self, WalkDirection::Both | WalkDirection::Children)
    }
}

/// Per seed query walk state.
#[derive(Default)]
struct Walk {
    processed: HashSet<Relationship>,
}

/// Collects the rows reachable from a seed query.
pub struct DataRetriever<'a> {
    db: &'a dyn Database,
    graph: &'a SchemaGraph,
    chunk_size: usize,
    filter: TableFilter,
}

impl<'a> DataRetriever<'a> {
    pub fn new(db: &'a dyn Database, graph: &'a SchemaGraph) -> Self {
        Self {
            db,
            graph,
            chunk_size: DEFAULT_CHUNK_SIZE,
            filter: TableFilter::default(),
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_table_filter(mut self, filter: TableFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Walk the graph from `query` and return the rows to copy.
    ///
    /// A row reached along several paths is kept only at its first position in
    /// write order.
    pub async fn collect(&self, query: &Query) -> Result<DataNode> {
        let table = self.graph.table(&query.table).cloned().ok_or_else(|| {
            CopyError::Schema(format!(
                "Table '{}' does not exist in the source database",
                query.table
            ))
        })?;

        info!("Starting data retrieval from {}", table.name);
        let mut walk = Walk::default();
        let mut node = self
            .walk(&mut walk, table, SelectQuery::seed(query), WalkDirection::Both)
            .await?;

        let removed = remove_duplicate_rows(&mut node);
        debug!(
            "Retrieved {} rows over {} relationships ({} duplicates dropped)",
            node.size(),
            walk.processed.len(),
            removed
        );
        Ok(node)
    }

    fn walk<'s>(
        &'s self,
        state: &'s mut Walk,
        table: Arc<Table>,
        select: SelectQuery,
        direction: WalkDirection,
    ) -> BoxFuture<'s, Result<DataNode>> {
        async move {
            info!("Reading table {}", table.name);
            let rows = self.retrieve_rows(&table, &select).await?;
            debug!("Retrieved {} rows from {}", rows.len(), table.name);

            if rows.is_empty() {
                return Ok(DataNode::leaf(table.name.clone(), rows));
            }

            let mut before = Vec::new();
            let mut after = Vec::new();

            if direction.includes_parents() {
                for rel in &table.inbound {
                    let Some(parent) = self.claim(state, rel, &rel.source_table) else {
                        continue;
                    };
                    debug!("Processing relationship {} -> {}", parent.name, table.name);
                    let select =
                        SelectQuery::parents_of(self.db.dialect(), rel, &rows, self.chunk_size);
                    before.push(
                        self.walk(state, parent, select, WalkDirection::Parents)
                            .await?,
                    );
                }
            }

            if direction.includes_children() {
                for rel in &table.outbound {
                    let Some(child) = self.claim(state, rel, &rel.target_table) else {
                        continue;
                    };
                    debug!("Processing relationship {} -> {}", table.name, child.name);
                    let select =
                        SelectQuery::children_of(self.db.dialect(), rel, &rows, self.chunk_size);
                    after.push(self.walk(state, child, select, direction).await?);
                }
            }

            Ok(DataNode::new(table.name.clone(), rows, before, after))
        }
        .boxed()
    }

    /// Mark `rel` as processed and return the table on its far side, unless
    /// the relationship was already followed or the table is skipped.
    fn claim(&self, state: &mut Walk, rel: &Relationship, other: &str) -> Option<Arc<Table>> {
        if !state.processed.insert(rel.clone()) {
            return None;
        }
        if self.filter.is_skipped(other) {
            info!("Skipping table {}", other);
            return None;
        }
        let table = self.graph.table(other).cloned();
        if table.is_none() {
            warn!(
                "Relationship {} -> {} leads outside the schema, not following",
                rel.source_table, rel.target_table
            );
        }
        table
    }

    async fn retrieve_rows(&self, table: &Arc<Table>, select: &SelectQuery) -> Result<Vec<DataRow>> {
        trace!("Executing query:\n{}", select.select);

        let mut seen = HashSet::new();
        let mut rows = Vec::new();
        for (sql, params) in select.statements() {
            trace!("{}", sql);
            let fetched = match self.db.fetch_rows(&sql, &params, table).await {
                Ok(fetched) => fetched,
                Err(e) => {
                    error!("Query failed: {}\n---\n{}\n---", e, sql);
                    return Err(e);
                }
            };
            for row in fetched {
                if !row.is_empty() && seen.insert(row.clone()) {
                    rows.push(row);
                }
            }
        }
        Ok(rows)
    }
}

/// Drop every row already present earlier in write order. Returns the number dropped.
pub fn remove_duplicate_rows(node: &mut DataNode) -> usize {
    fn visit(node: &mut DataNode, seen: &mut HashSet<DataRow>) -> usize {
        let mut removed = 0;
        for parent in &mut node.before {
            removed += visit(parent, seen);
        }
        let before = node.rows.len();
        node.rows.retain(|row| seen.insert(row.clone()));
        removed += before - node.rows.len();
        for child in &mut node.after {
            removed += visit(child, seen);
        }
        removed
    }

    visit(node, &mut HashSet::new())
}
