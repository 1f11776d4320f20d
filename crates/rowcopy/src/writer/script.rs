//! SQL script export.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{debug, info};

use super::{pending_rows, DataWriter, WriteSummary};
use crate::core::{DataNode, DataRow};
use crate::error::{CopyError, Result};

/// Where a script goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptOutput {
    Stdout,
    File(PathBuf),
}

impl ScriptOutput {
    /// Parse a `file:<path>` target. `file:--` and `file:stdout` mean stdout.
    pub fn from_target(target: &str) -> Result<Self> {
        let path = target
            .strip_prefix("file:")
            .ok_or_else(|| CopyError::Config(format!("'{}' is not a file target", target)))?;
        match path {
            "" => Err(CopyError::Config(
                "file target needs a path, 'file:--' or 'file:stdout'".into(),
            )),
            "--" | "stdout" => Ok(ScriptOutput::Stdout),
            path => Ok(ScriptOutput::File(PathBuf::from(path))),
        }
    }
}

/// Writes one literal `INSERT` statement per row.
///
/// The first write of a run truncates the output file, later writes append.
pub struct SqlScriptWriter {
    output: ScriptOutput,
    started: bool,
    written: HashSet<DataRow>,
}

impl SqlScriptWriter {
    pub fn new(output: ScriptOutput) -> Self {
        Self {
            output,
            started: false,
            written: HashSet::new(),
        }
    }

    fn open(&self) -> Result<Box<dyn Write + Send>> {
        match &self.output {
            ScriptOutput::Stdout => Ok(Box::new(io::stdout())),
            ScriptOutput::File(path) => {
                let file: File = OpenOptions::new()
                    .create(true)
                    .write(true)
                    .append(self.started)
                    .truncate(!self.started)
                    .open(path)?;
                Ok(Box::new(BufWriter::new(file)))
            }
        }
    }
}

/// Render `INSERT INTO t(c1, c2)\nVALUES(v1, v2);` with literal values.
pub fn insert_statement(row: &DataRow) -> String {
    let names: Vec<&str> = row.column_names();
    let values: Vec<String> = row.columns.iter().map(|c| c.to_sql_literal()).collect();
    format!(
        "INSERT INTO {}({})\nVALUES({});",
        row.table_name(),
        names.join(", "),
        values.join(", ")
    )
}

#[async_trait]
impl DataWriter for SqlScriptWriter {
    async fn write(&mut self, node: &DataNode) -> Result<WriteSummary> {
        let mut summary = WriteSummary::default();
        let rows = pending_rows(node, &self.written, &mut summary);

        if let ScriptOutput::File(path) = &self.output {
            info!("Writing SQL statements into {}", path.display());
        }
        let mut out = self.open()?;
        for row in &rows {
            debug!("Rendering row of {}", row.table_name());
            writeln!(out, "{}", insert_statement(row))?;
            summary.statements_prepared += 1;
        }
        out.flush()?;

        summary.rows_written = rows.len();
        self.started = true;
        self.written.extend(rows.into_iter().cloned());
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::NaiveDate;

    use super::*;
    use crate::core::{Column, ColumnData, SqlType, Table};

    fn row(id: i64, text: Option<&str>) -> DataRow {
        let table = Arc::new(Table::new(
            "main",
            vec![
                Column::new("id", SqlType::I64, false),
                Column::new("text", SqlType::Text, true),
            ],
        ));
        let text = match text {
            Some(t) => ColumnData::value("text", t),
            None => ColumnData::null("text", SqlType::Text),
        };
        DataRow::new(table, vec![ColumnData::value("id", id), text])
    }

    #[test]
    fn test_output_targets() {
        assert_eq!(ScriptOutput::from_target("file:--").unwrap(), ScriptOutput::Stdout);
        assert_eq!(ScriptOutput::from_target("file:stdout").unwrap(), ScriptOutput::Stdout);
        assert_eq!(
            ScriptOutput::from_target("file:out/copy.sql").unwrap(),
            ScriptOutput::File(PathBuf::from("out/copy.sql"))
        );
        assert!(ScriptOutput::from_target("file:").is_err());
        assert!(ScriptOutput::from_target("sqlite::memory:").is_err());
    }

    #[test]
    fn test_insert_statement_literals() {
        assert_eq!(
            insert_statement(&row(1, Some("it's"))),
            "INSERT INTO main(id, text)\nVALUES(1, 'it''s');"
        );
        assert_eq!(
            insert_statement(&row(2, None)),
            "INSERT INTO main(id, text)\nVALUES(2, NULL);"
        );

        let table = Arc::new(Table::new("events", vec![Column::new("day", SqlType::Date, true)]));
        let day = NaiveDate::from_ymd_opt(2021, 3, 4).unwrap();
        let event = DataRow::new(table, vec![ColumnData::value("day", day)]);
        assert_eq!(
            insert_statement(&event),
            "INSERT INTO events(day)\nVALUES('2021-03-04');"
        );
    }

    #[tokio::test]
    async fn test_script_accumulates_across_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("copy.sql");
        std::fs::write(&path, "stale\n").unwrap();

        let mut writer = SqlScriptWriter::new(ScriptOutput::File(path.clone()));
        let first = writer
            .write(&DataNode::leaf("main", vec![row(1, Some("a")), row(1, Some("a"))]))
            .await
            .unwrap();
        let second = writer
            .write(&DataNode::leaf("main", vec![row(1, Some("a")), row(2, None)]))
            .await
            .unwrap();

        assert_eq!(first.rows_written, 1);
        assert_eq!(first.duplicates_skipped, 1);
        assert_eq!(second.rows_written, 1);

        let script = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            script,
            "INSERT INTO main(id, text)\nVALUES(1, 'a');\nINSERT INTO main(id, text)\nVALUES(2, NULL);\n"
        );
    }
}
