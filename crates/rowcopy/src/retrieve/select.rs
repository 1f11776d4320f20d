//! Select statements issued by the walker.
//!
//! Relationship traversal turns a set of already retrieved rows into a join
//! against the other side of the relationship, filtered by the rows' keys. The
//! filter is split into chunks so no single statement binds more than
//! [`MAX_PARAMS_PER_STATEMENT`] parameters.

use crate::core::{ColumnData, DataRow, Dialect, Relationship};
use crate::query::Query;

/// Upper bound on bound parameters per generated statement.
///
/// Keeps every statement below the ~1000 parameter limit some drivers have.
pub const MAX_PARAMS_PER_STATEMENT: usize = 900;

const PARENT_ALIAS: &str = "parent";
const CHILD_ALIAS: &str = "child";

/// One logical select, possibly split into several filtered statements.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectQuery {
    /// Statement text up to (not including) the WHERE clause.
    pub select: String,
    /// WHERE clauses, one per statement. Empty means a single unfiltered statement.
    pub filters: Vec<String>,
    /// Parameters per filter. Empty when the filters are literal SQL.
    pub params: Vec<Vec<ColumnData>>,
}

impl SelectQuery {
    /// The seed select. The table reference and filter are user SQL and are
    /// passed through as written.
    pub fn seed(query: &Query) -> Self {
        let distinct = if query.distinct { "DISTINCT " } else { "" };
        let alias = query
            .alias
            .as_deref()
            .map(|a| format!(" {}", a))
            .unwrap_or_default();
        let filters = if query.has_filter() {
            vec![format!("\nWHERE\n{}", query.filter)]
        } else {
            Vec::new()
        };
        Self {
            select: format!("SELECT {}* FROM {}{}", distinct, query.table_ref, alias),
            filters,
            params: Vec::new(),
        }
    }

    /// Rows of `rel`'s parent table referenced by `children`.
    pub fn parents_of(
        dialect: &dyn Dialect,
        rel: &Relationship,
        children: &[DataRow],
        chunk_size: usize,
    ) -> Self {
        let select = format!(
            "SELECT {p}.* FROM {source} {p} JOIN {target} {c} ON\n{on}",
            p = dialect.quote_ident(PARENT_ALIAS),
            c = dialect.quote_ident(CHILD_ALIAS),
            source = dialect.quote_table(&rel.source_table),
            target = dialect.quote_table(&rel.target_table),
            on = join_condition(dialect, rel),
        );
        Self::filtered(dialect, select, children, CHILD_ALIAS, chunk_size)
    }

    /// Rows of `rel`'s child table referencing `parents`.
    pub fn children_of(
        dialect: &dyn Dialect,
        rel: &Relationship,
        parents: &[DataRow],
        chunk_size: usize,
    ) -> Self {
        let select = format!(
            "SELECT {c}.* FROM {target} {c} JOIN {source} {p} ON\n{on}",
            p = dialect.quote_ident(PARENT_ALIAS),
            c = dialect.quote_ident(CHILD_ALIAS),
            source = dialect.quote_table(&rel.source_table),
            target = dialect.quote_table(&rel.target_table),
            on = join_condition(dialect, rel),
        );
        Self::filtered(dialect, select, parents, PARENT_ALIAS, chunk_size)
    }

    fn filtered(
        dialect: &dyn Dialect,
        select: String,
        rows: &[DataRow],
        alias: &str,
        chunk_size: usize,
    ) -> Self {
        let chunk = chunk_size_for(rows, chunk_size);
        let mut filters = Vec::new();
        let mut params = Vec::new();

        for rows in rows.chunks(chunk) {
            // placeholders are numbered per statement
            let mut next_param = 1;
            let conditions: Vec<String> = rows
                .iter()
                .map(|row| row.as_parametrized_filter(alias, dialect, &mut next_param))
                .collect();
            filters.push(format!("\nWHERE\n{}", conditions.join("\n OR ")));
            params.push(rows.iter().flat_map(DataRow::params_for_select).collect());
        }

        Self {
            select,
            filters,
            params,
        }
    }

    /// Executable statements with their parameters.
    pub fn statements(&self) -> Vec<(String, Vec<ColumnData>)> {
        if self.filters.is_empty() {
            return vec![(self.select.clone(), Vec::new())];
        }
        if self.params.is_empty() {
            return self
                .filters
                .iter()
                .map(|f| (format!("{} {}", self.select, f), Vec::new()))
                .collect();
        }
        self.filters
            .iter()
            .zip(&self.params)
            .map(|(f, p)| (format!("{} {}", self.select, f), p.clone()))
            .collect()
    }
}

fn join_condition(dialect: &dyn Dialect, rel: &Relationship) -> String {
    let p = dialect.quote_ident(PARENT_ALIAS);
    let c = dialect.quote_ident(CHILD_ALIAS);
    let pairs: Vec<String> = rel
        .column_map
        .iter()
        .map(|(source, target)| {
            format!(
                "{}.{} = {}.{}",
                p,
                dialect.quote_ident(source),
                c,
                dialect.quote_ident(target)
            )
        })
        .collect();
    format!("({})", pairs.join(" AND "))
}

/// Rows per statement for filtering by `rows`.
///
/// At most `chunk_size`, and small enough that the widest row filter times the
/// row count stays within [`MAX_PARAMS_PER_STATEMENT`]. Never zero.
pub fn chunk_size_for(rows: &[DataRow], chunk_size: usize) -> usize {
    let per_row = rows
        .iter()
        .map(DataRow::filter_param_count)
        .max()
        .unwrap_or(0)
        .max(1);
    chunk_size.min(MAX_PARAMS_PER_STATEMENT / per_row).max(1)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::core::{Column, SqlType, Table};
    use crate::drivers::DialectImpl;
    use crate::query::parse_query;

    fn link_rows(n: usize) -> Vec<DataRow> {
        let table = Arc::new(
            Table::new(
                "intermediate_to_child",
                vec![
                    Column::new("intermediate_id", SqlType::I64, false),
                    Column::new("child_first", SqlType::Text, false),
                    Column::new("child_second", SqlType::Text, false),
                ],
            )
            .with_primary_key(["intermediate_id", "child_first", "child_second"]),
        );
        (0..n)
            .map(|i| {
                DataRow::new(
                    Arc::clone(&table),
                    vec![
                        ColumnData::value("intermediate_id", i as i64),
                        ColumnData::value("child_first", format!("first {}", i)),
                        ColumnData::value("child_second", format!("second {}", i)),
                    ],
                )
            })
            .collect()
    }

    fn child_rel() -> Relationship {
        Relationship::new(
            "child",
            "intermediate_to_child",
            vec![
                ("first".into(), "child_first".into()),
                ("second".into(), "child_second".into()),
            ],
        )
    }

    #[test]
    fn test_seed_select_passes_filter_through() {
        let query = parse_query("SELECT DISTINCT * FROM main m WHERE m.id = 1").unwrap();
        let select = SelectQuery::seed(&query);
        assert_eq!(
            select.statements(),
            vec![(
                "SELECT DISTINCT * FROM main m \nWHERE\nm.id = 1".to_string(),
                vec![]
            )]
        );

        let all = SelectQuery::seed(&Query::new("main", ""));
        assert_eq!(all.statements(), vec![("SELECT * FROM main".to_string(), vec![])]);

        let quoted = parse_query("SELECT * FROM \"order lines\" WHERE id = 1").unwrap();
        assert_eq!(
            SelectQuery::seed(&quoted).select,
            "SELECT * FROM \"order lines\""
        );
    }

    #[test]
    fn test_parent_query_joins_on_column_map() {
        let dialect = DialectImpl::sqlite();
        let rows = link_rows(2);
        let select = SelectQuery::parents_of(&dialect, &child_rel(), &rows, 500);

        assert_eq!(
            select.select,
            "SELECT \"parent\".* FROM \"child\" \"parent\" JOIN \"intermediate_to_child\" \"child\" ON\n\
             (\"parent\".\"first\" = \"child\".\"child_first\" AND \"parent\".\"second\" = \"child\".\"child_second\")"
        );
        let statements = select.statements();
        assert_eq!(statements.len(), 1);
        assert!(statements[0].0.contains("\n OR "));
        assert_eq!(statements[0].1.len(), 6);
    }

    #[test]
    fn test_child_query_filters_on_parent_alias() {
        let dialect = DialectImpl::mysql();
        let rows = link_rows(1);
        let rel = Relationship::new(
            "intermediate_to_child",
            "audit",
            vec![("intermediate_id".into(), "link_id".into())],
        );
        let select = SelectQuery::children_of(&dialect, &rel, &rows, 10);

        assert!(select
            .select
            .starts_with("SELECT `child`.* FROM `audit` `child` JOIN `intermediate_to_child` `parent` ON\n"));
        assert!(select.filters[0].contains("`parent`.`intermediate_id` = ?"));
    }

    #[test]
    fn test_chunks_respect_parameter_ceiling() {
        let rows = link_rows(1000);
        assert_eq!(chunk_size_for(&rows, 500), 300);
        assert_eq!(chunk_size_for(&rows, 7), 7);
        assert_eq!(chunk_size_for(&[], 500), 500);
        assert_eq!(chunk_size_for(&rows, 0), 1);

        let dialect = DialectImpl::sqlite();
        let select = SelectQuery::parents_of(&dialect, &child_rel(), &rows, 500);
        assert_eq!(select.filters.len(), 4);
        for (sql, params) in select.statements() {
            assert!(params.len() <= MAX_PARAMS_PER_STATEMENT);
            assert_eq!(sql.matches('?').count(), params.len());
        }
        let total: usize = select.params.iter().map(Vec::len).sum();
        assert_eq!(total, 3000);
    }

    #[test]
    fn test_postgres_placeholders_restart_per_statement() {
        let dialect = DialectImpl::postgres();
        let rows = link_rows(3);
        let select = SelectQuery::parents_of(&dialect, &child_rel(), &rows, 2);

        assert_eq!(select.filters.len(), 2);
        assert!(select.filters[0].contains("$6::text"));
        assert!(!select.filters[0].contains("$7"));
        assert!(select.filters[1].contains("\"child\".\"intermediate_id\" = $1::bigint"));
    }
}
