//! Retrieved row data and the tree the walker builds from it.
//!
//! [`ColumnData`] is a single value together with its column name and type. It
//! knows how to render itself as a filter condition, as a SQL literal, and it is
//! what drivers bind as a statement parameter. [`DataRow`] groups the values of
//! one row with the table they came from; [`DataNode`] arranges rows into the
//! dependency tree consumed by writers.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use super::schema::Table;
use super::traits::Dialect;
use super::value::{SqlType, SqlValue};

/// One column value of a row.
///
/// `value == None` is SQL NULL: it renders as `IS NULL` in filters and is bound
/// as a typed NULL, never as an equality parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnData {
    pub column_name: String,
    pub sql_type: SqlType,
    pub value: Option<SqlValue>,
}

impl ColumnData {
    pub fn new(column_name: impl Into<String>, sql_type: SqlType, value: Option<SqlValue>) -> Self {
        Self {
            column_name: column_name.into(),
            sql_type,
            value,
        }
    }

    /// A non-NULL value whose type is taken from the value itself.
    pub fn value(column_name: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        let value = value.into();
        Self::new(column_name, value.sql_type(), Some(value))
    }

    /// A typed NULL.
    pub fn null(column_name: impl Into<String>, sql_type: SqlType) -> Self {
        Self::new(column_name, sql_type, None)
    }

    pub fn is_null(&self) -> bool {
        self.value.is_none()
    }

    /// Render `alias.col = <placeholder>` or `alias.col IS NULL`.
    ///
    /// `next_param` is the 1-based index of the next placeholder and only
    /// advances when a placeholder is emitted.
    pub fn parametrized_condition(
        &self,
        alias: &str,
        dialect: &dyn Dialect,
        next_param: &mut usize,
    ) -> String {
        let column = format!(
            "{}.{}",
            dialect.quote_ident(alias),
            dialect.quote_ident(&self.column_name)
        );
        if self.is_null() {
            format!("{} IS NULL", column)
        } else {
            let placeholder = dialect.param_placeholder(*next_param, &self.sql_type);
            *next_param += 1;
            format!("{} = {}", column, placeholder)
        }
    }

    /// Render the value as literal SQL text (`NULL` when absent).
    pub fn to_sql_literal(&self) -> String {
        match &self.value {
            Some(v) => v.to_sql_literal(),
            None => "NULL".to_string(),
        }
    }
}

/// One retrieved row.
///
/// Two rows are equal when they belong to the same table and hold the same
/// values, which is what lets writers skip a row reached along several paths.
#[derive(Debug, Clone)]
pub struct DataRow {
    pub table: Arc<Table>,
    pub columns: Vec<ColumnData>,
}

impl DataRow {
    pub fn new(table: Arc<Table>, columns: Vec<ColumnData>) -> Self {
        Self { table, columns }
    }

    pub fn table_name(&self) -> &str {
        &self.table.name
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Find a column value by name.
    pub fn column(&self, name: &str) -> Option<&ColumnData> {
        self.columns.iter().find(|c| c.column_name == name)
    }

    /// Columns that identify the row: the primary key, or every column when the
    /// table has none.
    pub fn key_columns(&self) -> impl Iterator<Item = &ColumnData> {
        self.columns
            .iter()
            .filter(|c| self.table.is_key_column(&c.column_name))
    }

    /// Identifying columns that carry a value. These are the filter parameters.
    pub fn primary_key(&self) -> Vec<ColumnData> {
        self.key_columns().filter(|c| !c.is_null()).cloned().collect()
    }

    /// Columns outside the primary key. Without a primary key this is every column.
    pub fn non_key_columns(&self) -> Vec<&ColumnData> {
        self.columns
            .iter()
            .filter(|c| !self.table.primary_key.contains(&c.column_name))
            .collect()
    }

    /// Render `(alias.k1 = ? AND alias.k2 IS NULL ...)` over the identifying columns.
    pub fn as_parametrized_filter(
        &self,
        alias: &str,
        dialect: &dyn Dialect,
        next_param: &mut usize,
    ) -> String {
        let conditions: Vec<String> = self
            .key_columns()
            .map(|c| c.parametrized_condition(alias, dialect, next_param))
            .collect();
        format!("({})", conditions.join(" AND "))
    }

    /// Number of parameters [`as_parametrized_filter`](Self::as_parametrized_filter) binds.
    pub fn filter_param_count(&self) -> usize {
        self.key_columns().filter(|c| !c.is_null()).count()
    }

    /// Parameters for a filter built with [`as_parametrized_filter`](Self::as_parametrized_filter).
    pub fn params_for_select(&self) -> Vec<ColumnData> {
        self.primary_key()
    }

    /// Parameters for `UPDATE t SET <non-key> = ? ... WHERE <filter>`.
    pub fn params_for_update(&self) -> Vec<ColumnData> {
        let mut params: Vec<ColumnData> = self.non_key_columns().into_iter().cloned().collect();
        params.extend(self.primary_key());
        params
    }

    /// Parameters for `INSERT INTO t(<columns>) VALUES(...)`, in column order.
    pub fn params_for_insert(&self) -> Vec<ColumnData> {
        self.columns.clone()
    }

    /// Values only, in column order.
    pub fn data_only(&self) -> Vec<Option<SqlValue>> {
        self.columns.iter().map(|c| c.value.clone()).collect()
    }

    /// Column names in order; rows sharing this signature share a statement.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.column_name.as_str()).collect()
    }
}

impl PartialEq for DataRow {
    fn eq(&self, other: &Self) -> bool {
        self.table.name == other.table.name && self.columns == other.columns
    }
}

impl Eq for DataRow {}

impl Hash for DataRow {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.table.name.hash(state);
        self.columns.hash(state);
    }
}

/// A table's rows plus the subtrees that must be written before and after them.
///
/// `before` holds referenced parents, `after` holds referencing children.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataNode {
    pub table_name: String,
    pub rows: Vec<DataRow>,
    pub before: Vec<DataNode>,
    pub after: Vec<DataNode>,
}

impl DataNode {
    pub fn new(
        table_name: impl Into<String>,
        rows: Vec<DataRow>,
        before: Vec<DataNode>,
        after: Vec<DataNode>,
    ) -> Self {
        Self {
            table_name: table_name.into(),
            rows,
            before,
            after,
        }
    }

    /// A node with rows and no subtrees.
    pub fn leaf(table_name: impl Into<String>, rows: Vec<DataRow>) -> Self {
        Self::new(table_name, rows, Vec::new(), Vec::new())
    }

    /// Rows in this node and all subtrees.
    pub fn size(&self) -> usize {
        self.rows.len()
            + self.before.iter().map(DataNode::size).sum::<usize>()
            + self.after.iter().map(DataNode::size).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Nodes in write order: every `before` subtree, then this node, then every `after` subtree.
    pub fn write_order(&self) -> Vec<&DataNode> {
        let mut nodes = Vec::new();
        self.collect_write_order(&mut nodes);
        nodes
    }

    fn collect_write_order<'a>(&'a self, out: &mut Vec<&'a DataNode>) {
        for node in &self.before {
            node.collect_write_order(out);
        }
        out.push(self);
        for node in &self.after {
            node.collect_write_order(out);
        }
    }

    /// All rows in write order.
    pub fn flatten(&self) -> Vec<&DataRow> {
        self.write_order()
            .into_iter()
            .flat_map(|node| node.rows.iter())
            .collect()
    }
}
