use std::collections::BTreeSet;

use crate::core::identifier::normalize_table_name;

/// Tables excluded from traversal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableFilter {
    skipped: BTreeSet<String>,
}

impl TableFilter {
    pub fn new<I, S>(tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            skipped: tables
                .into_iter()
                .map(|t| normalize_table_name(t.as_ref().trim()))
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }

    pub fn is_skipped(&self, table: &str) -> bool {
        self.skipped.contains(&normalize_table_name(table))
    }

    pub fn is_empty(&self) -> bool {
        self.skipped.is_empty()
    }
}
