//! Identifier validation and quoting.
//!
//! Table and column names reach generated SQL from catalog metadata and from the
//! seed query. Names are validated when they enter the schema graph and quoted
//! by the dialect whenever they are spliced into statement text.

use crate::error::{CopyError, Result};

/// Longest identifier accepted by any supported database.
const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Validate that an identifier can be quoted safely.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(CopyError::Config("Identifier cannot be empty".to_string()));
    }

    if name.contains('\0') {
        return Err(CopyError::Config(format!(
            "Identifier contains null byte: {:?}",
            name
        )));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(CopyError::Config(format!(
            "Identifier exceeds maximum length of {} bytes (got {} bytes): {:?}",
            MAX_IDENTIFIER_LENGTH,
            name.len(),
            name
        )));
    }

    Ok(())
}

/// Quote with ANSI double quotes (PostgreSQL, SQLite).
pub fn quote_ansi(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote with MySQL backticks.
pub fn quote_mysql(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Unqualified, lowercased name used as a schema graph key.
pub fn normalize_table_name(name: &str) -> String {
    name.rsplit('.')
        .next()
        .unwrap_or(name)
        .trim_matches(|c| c == '"' || c == '`')
        .to_lowercase()
}
