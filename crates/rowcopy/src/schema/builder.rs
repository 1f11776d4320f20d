//! Concurrent catalog scan producing a [`SchemaGraph`].

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info};

use crate::config::SystemResources;
use crate::core::{Database, SchemaGraph, Table};
use crate::error::{CopyError, Result};

/// Builds a [`SchemaGraph`] from a live database.
///
/// Every table is loaded by its own task. At most `max_concurrency` tasks run
/// at once; the reverse-repair pass runs after all of them have finished.
#[derive(Debug, Clone)]
pub struct SchemaBuilder {
    max_concurrency: usize,
}

impl SchemaBuilder {
    /// Builder sized to the host CPU count.
    pub fn new() -> Self {
        Self::with_concurrency(SystemResources::detect().cpu_cores)
    }

    pub fn with_concurrency(max_concurrency: usize) -> Self {
        Self {
            max_concurrency: max_concurrency.max(1),
        }
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Scan every table of `db` and assemble the graph.
    pub async fn build(&self, db: Arc<dyn Database>) -> Result<SchemaGraph> {
        let names = db.list_tables().await?;
        info!(
            "Reading metadata for {} tables from {} ({} concurrent tasks)",
            names.len(),
            db.db_type(),
            self.max_concurrency
        );

        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let collected: Arc<Mutex<HashMap<String, Table>>> = Arc::new(Mutex::new(HashMap::new()));
        let mut handles = Vec::with_capacity(names.len());

        for name in names {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| CopyError::Schema(format!("metadata scan aborted: {}", e)))?;
            let db = Arc::clone(&db);
            let collected = Arc::clone(&collected);

            let handle = tokio::spawn(async move {
                let _permit = permit;
                debug!("Loading metadata for {}", name);
                let table = db.load_table(&name).await?;
                collected
                    .lock()
                    .await
                    .entry(table.name.clone())
                    .or_insert(table);
                Ok::<_, CopyError>(())
            });
            handles.push(handle);
        }

        for handle in handles {
            handle
                .await
                .map_err(|e| CopyError::Schema(format!("metadata task panicked: {}", e)))??;
        }

        let tables: BTreeMap<String, Table> = std::mem::take(&mut *collected.lock().await)
            .into_iter()
            .collect();
        let graph = SchemaGraph::from_catalog(tables);
        info!("Schema graph ready: {} tables", graph.len());
        Ok(graph)
    }
}

impl Default for SchemaBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Relationship;
    use crate::test_support::source_database;

    fn pairs(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(s, t)| (s.to_string(), t.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_build_reads_every_table() {
        let db = source_database().await;
        let graph = SchemaBuilder::with_concurrency(3).build(db).await.unwrap();

        assert_eq!(graph.len(), 9);
        let main = graph.table("MAIN").unwrap();
        assert_eq!(main.columns.len(), 2);
        assert!(main.primary_key.contains("id"));
        assert!(main.inbound.is_empty());
        assert_eq!(main.outbound.len(), 2);
    }

    #[tokio::test]
    async fn test_multi_column_keys_keep_order() {
        let db = source_database().await;
        let graph = SchemaBuilder::with_concurrency(1).build(db).await.unwrap();

        let expected = Relationship::new(
            "child",
            "intermediate_to_child",
            pairs(&[("first", "child_first"), ("second", "child_second")]),
        );
        let child = graph.table("child").unwrap();
        assert!(child.outbound.contains(&expected));
        assert_eq!(
            child.primary_key.iter().map(String::as_str).collect::<Vec<_>>(),
            vec!["first", "second"]
        );

        let link = graph.table("intermediate_to_child").unwrap();
        assert!(link.inbound.contains(&expected));
        assert_eq!(link.inbound.len(), 2);
    }

    #[tokio::test]
    async fn test_every_outbound_relationship_is_inbound_on_its_child() {
        let db = source_database().await;
        let graph = SchemaBuilder::with_concurrency(8).build(db).await.unwrap();

        for table in graph.tables.values() {
            for rel in &table.outbound {
                let child = graph.table(&rel.target_table).unwrap();
                assert!(
                    child.inbound.contains(rel),
                    "{} -> {} missing from child",
                    rel.source_table,
                    rel.target_table
                );
            }
        }

        let employee = graph.table("employee").unwrap();
        let self_ref = employee.inbound.iter().next().unwrap();
        assert!(self_ref.is_self_reference());
        assert!(employee.outbound.contains(self_ref));
    }

    #[test]
    fn test_concurrency_is_at_least_one() {
        assert_eq!(SchemaBuilder::with_concurrency(0).max_concurrency(), 1);
        assert!(SchemaBuilder::new().max_concurrency() >= 1);
    }
}
