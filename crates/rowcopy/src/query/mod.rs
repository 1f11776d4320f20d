//! Seed query language.
//!
//! A seed query names one table and an optional raw filter:
//! `SELECT [DISTINCT] * FROM <table> [[AS] <alias>] [WHERE <expression>]`.
//! Several queries may be separated by `;`; each one is copied independently.

mod lexer;
mod parser;

use serde::Serialize;

pub use parser::{parse_queries, parse_query};

/// One parsed seed query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Query {
    /// Statement text as written.
    pub text: String,
    /// Table name with quotes removed, possibly schema-qualified.
    pub table: String,
    /// Table reference exactly as written, quotes included.
    pub table_ref: String,
    pub alias: Option<String>,
    /// Raw WHERE expression, empty when there is none.
    pub filter: String,
    pub distinct: bool,
}

impl Query {
    /// Build a query directly, without parsing.
    pub fn new(table: impl Into<String>, filter: impl Into<String>) -> Self {
        let table = table.into();
        let filter = filter.into();
        let text = if filter.is_empty() {
            format!("SELECT * FROM {}", table)
        } else {
            format!("SELECT * FROM {} WHERE {}", table, filter)
        };
        Self {
            text,
            table_ref: table.clone(),
            table,
            alias: None,
            filter,
            distinct: false,
        }
    }

    pub fn has_filter(&self) -> bool {
        !self.filter.is_empty()
    }
}
