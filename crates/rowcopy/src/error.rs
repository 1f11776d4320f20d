//! Error types for the copy library.

use thiserror::Error;

/// Main error type for copy operations.
#[derive(Error, Debug)]
pub enum CopyError {
    /// Configuration error (missing connection strings, bad scheme, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Seed query could not be parsed
    #[error("Query parse error: {0}")]
    QueryParse(String),

    /// Source database connection or query error
    #[error("Source database error: {message}\n  Context: {context}")]
    Source { message: String, context: String },

    /// Target database connection or statement error
    #[error("Target database error: {message}\n  Context: {context}")]
    Target { message: String, context: String },

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// Schema metadata could not be read or is inconsistent
    #[error("Schema error: {0}")]
    Schema(String),

    /// A generated statement failed to execute
    #[error("Query failed: {message}\n  SQL: {sql}")]
    Query { sql: String, message: String },

    /// Source rows do not fit the target schema
    #[error("Validation failed for table '{table}':\n  {}", issues.join("\n  "))]
    Validation { table: String, issues: Vec<String> },

    /// Writing rows to the target failed; the transaction was rolled back
    #[error("Write failed for table {table}: {message}")]
    Write { table: String, message: String },

    /// Schema cache could not be read or written
    #[error("Schema cache error: {0}")]
    Cache(String),

    /// A column value could not be decoded from a result set
    #[error("Cannot decode column '{column}' of table '{table}': {message}")]
    Decode {
        table: String,
        column: String,
        message: String,
    },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CopyError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl ToString, context: impl Into<String>) -> Self {
        CopyError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a Source error with context
    pub fn source(message: impl ToString, context: impl Into<String>) -> Self {
        CopyError::Source {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a Target error with context
    pub fn target(message: impl ToString, context: impl Into<String>) -> Self {
        CopyError::Target {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a Query error carrying the failing SQL text
    pub fn query(sql: impl Into<String>, message: impl ToString) -> Self {
        CopyError::Query {
            sql: sql.into(),
            message: message.to_string(),
        }
    }

    /// Create a Write error
    pub fn write(table: impl Into<String>, message: impl ToString) -> Self {
        CopyError::Write {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Errors caused by user input rather than by a fault in the program or the network.
    ///
    /// The CLI prints these as a single line.
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            CopyError::Config(_)
                | CopyError::QueryParse(_)
                | CopyError::Validation { .. }
                | CopyError::Query { .. }
                | CopyError::Schema(_)
        )
    }

    /// Process exit code: 2 for bad arguments or query text, 1 otherwise.
    pub fn exit_code(&self) -> u8 {
        match self {
            CopyError::Config(_) | CopyError::QueryParse(_) => 2,
            _ => 1,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for copy operations.
pub type Result<T> = std::result::Result<T, CopyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message_lists_every_issue() {
        let err = CopyError::Validation {
            table: "main".into(),
            issues: vec!["first".into(), "second".into()],
        };
        let text = err.to_string();
        assert!(text.contains("'main'"));
        assert!(text.contains("first"));
        assert!(text.contains("second"));
        assert!(err.is_expected());
    }

    #[test]
    fn test_format_detailed_includes_source_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = CopyError::from(io);
        let detailed = err.format_detailed();
        assert!(detailed.starts_with("Error: IO error: gone"));
        assert!(!err.is_expected());
        assert_eq!(err.exit_code(), 1);
        assert_eq!(CopyError::Config("missing".into()).exit_code(), 2);
    }
}
