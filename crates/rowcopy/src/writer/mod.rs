//! Writers for retrieved data.
//!
//! - [`Inserter`]: batched inserts into the target database
//! - [`Updater`]: update rows that exist on the target, insert the rest
//! - [`SqlScriptWriter`]: render insert statements to a file or stdout
//!
//! Every writer emits rows in write order (parents before the rows that
//! reference them) and remembers what it has written, so a row reached by
//! several seed queries is written once. Database writers run each
//! [`DataWriter::write`] call in one transaction.

mod insert;
mod script;
mod update;

use std::collections::HashSet;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

pub use insert::Inserter;
pub use script::{insert_statement, ScriptOutput, SqlScriptWriter};
pub use update::Updater;

use crate::core::{DataNode, DataRow, Session};
use crate::error::Result;

/// Persists a data tree.
#[async_trait]
pub trait DataWriter: Send {
    /// Write every row of `node` not written before.
    async fn write(&mut self, node: &DataNode) -> Result<WriteSummary>;
}

/// Outcome of one [`DataWriter::write`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WriteSummary {
    /// Rows written (or, in a dry run, rows that would have been written).
    pub rows_written: usize,
    /// Rows skipped because an earlier write already covered them.
    pub duplicates_skipped: usize,
    /// Statements prepared against the target.
    pub statements_prepared: usize,
}

/// Rows of `node` in write order that are not in `written`, each once.
pub(crate) fn pending_rows<'n>(
    node: &'n DataNode,
    written: &HashSet<DataRow>,
    summary: &mut WriteSummary,
) -> Vec<&'n DataRow> {
    let mut seen: HashSet<&DataRow> = HashSet::new();
    let mut pending = Vec::new();
    for row in node.flatten() {
        if written.contains(row) || !seen.insert(row) {
            summary.duplicates_skipped += 1;
        } else {
            pending.push(row);
        }
    }
    pending
}

/// Commit on success, roll back on failure and return the original error.
pub(crate) async fn finish_transaction<T>(
    session: Box<dyn Session>,
    outcome: Result<T>,
) -> Result<T> {
    match outcome {
        Ok(value) => {
            session.commit().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback) = session.rollback().await {
                warn!("Rollback failed: {}", rollback);
            } else {
                info!("Transaction rolled back");
            }
            Err(e)
        }
    }
}

/// Logs completion in 10% steps.
pub(crate) struct Progress {
    verb: &'static str,
    total: usize,
    reported: usize,
}

impl Progress {
    pub(crate) fn new(verb: &'static str, total: usize) -> Self {
        Self {
            verb,
            total,
            reported: 0,
        }
    }

    pub(crate) fn update(&mut self, done: usize) {
        if self.total == 0 {
            return;
        }
        let pct = done * 100 / self.total;
        if pct >= self.reported + 10 && pct < 100 {
            info!("{} {}%", self.verb, pct);
            self.reported = pct;
        }
    }

    pub(crate) fn finish(&self) {
        info!("{} 100%", self.verb);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::core::{Column, ColumnData, SqlType, Table};

    #[test]
    fn test_pending_rows_skip_written_and_repeated() {
        let table = Arc::new(Table::new("t", vec![Column::new("id", SqlType::I64, false)]));
        let row = |id: i64| DataRow::new(Arc::clone(&table), vec![ColumnData::value("id", id)]);

        let node = DataNode::new(
            "t",
            vec![row(2), row(3)],
            vec![DataNode::leaf("t", vec![row(1), row(2)])],
            vec![],
        );
        let written: HashSet<DataRow> = [row(3)].into_iter().collect();
        let mut summary = WriteSummary::default();

        let pending = pending_rows(&node, &written, &mut summary);
        let ids: Vec<String> = pending.iter().map(|r| r.columns[0].to_sql_literal()).collect();
        assert_eq!(ids, vec!["1", "2"]);
        assert_eq!(summary.duplicates_skipped, 2);
    }

    #[test]
    fn test_progress_steps() {
        let mut progress = Progress::new("Inserted", 50);
        progress.update(4);
        assert_eq!(progress.reported, 0);
        progress.update(5);
        assert_eq!(progress.reported, 10);
        progress.update(6);
        assert_eq!(progress.reported, 10);
        progress.update(50);
        assert_eq!(progress.reported, 10);
        progress.finish();
    }
}
