//! Options validation.

use super::{CopyOptions, SchemaCacheMode};
use crate::drivers::DatabaseKind;
use crate::error::{CopyError, Result};

/// Validate the options, failing with every problem joined into one message.
pub fn validate(options: &CopyOptions) -> Result<()> {
    let problems = problems(options);
    if problems.is_empty() {
        Ok(())
    } else {
        Err(CopyError::Config(problems.join("\n")))
    }
}

/// Collect every problem with the options.
pub fn problems(options: &CopyOptions) -> Vec<String> {
    let mut problems = Vec::new();
    let clearing = options.schema_cache == SchemaCacheMode::Clear;

    match non_blank(&options.source_connection) {
        None => problems.push("--source-connection parameter is required".to_string()),
        Some(url) => {
            if url.starts_with("file:") {
                problems.push("a file: connection can only be used as a target".to_string());
            } else if let Err(e) = DatabaseKind::from_url(url) {
                problems.push(e.to_string());
            }
        }
    }

    match non_blank(&options.target_connection) {
        None if options.show_copy_tree || clearing => {}
        None => problems.push("--target-connection parameter is required".to_string()),
        Some(url) if url.starts_with("file:") => {
            if url.len() == "file:".len() {
                problems.push("file: target needs a path, or -- for stdout".to_string());
            }
        }
        Some(url) => {
            if let Err(e) = DatabaseKind::from_url(url) {
                problems.push(e.to_string());
            }
        }
    }

    if options.query.trim().is_empty() && !clearing {
        problems.push("seed query is required".to_string());
    }

    if options.chunk_size == 0 {
        problems.push("--chunk-size must be at least 1".to_string());
    }

    if options.verbosity > 3 {
        problems.push(format!(
            "--verbose must be between 0 and 3, got {}",
            options.verbosity
        ));
    }

    problems
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_options() -> CopyOptions {
        CopyOptions {
            source_connection: Some("sqlite://source.db".into()),
            target_connection: Some("postgres://localhost/target".into()),
            query: "SELECT * FROM main WHERE id = 1".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_options() {
        assert!(validate(&valid_options()).is_ok());
    }

    #[test]
    fn test_collects_every_problem() {
        let options = CopyOptions {
            chunk_size: 0,
            ..Default::default()
        };
        let problems = problems(&options);
        assert_eq!(problems.len(), 4);
        assert!(problems[0].contains("--source-connection"));
        assert!(problems[1].contains("--target-connection"));
        assert!(problems[2].contains("seed query"));
        assert!(problems[3].contains("--chunk-size"));

        let err = validate(&options).unwrap_err();
        assert!(err.to_string().contains("seed query is required"));
    }

    #[test]
    fn test_copy_tree_needs_no_target() {
        let mut options = valid_options();
        options.target_connection = None;
        options.show_copy_tree = true;
        assert!(validate(&options).is_ok());
    }

    #[test]
    fn test_cache_clear_needs_no_query() {
        let mut options = valid_options();
        options.query = "  ".into();
        options.schema_cache = SchemaCacheMode::Clear;
        assert!(validate(&options).is_ok());
    }

    #[test]
    fn test_rejects_unsupported_scheme() {
        let mut options = valid_options();
        options.source_connection = Some("jdbc:h2:mem:source".into());
        let problems = problems(&options);
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("'h2' is not supported"));
    }

    #[test]
    fn test_file_targets() {
        let mut options = valid_options();
        options.target_connection = Some("file:--".into());
        assert!(validate(&options).is_ok());

        options.target_connection = Some("file:".into());
        assert!(validate(&options).is_err());

        options.source_connection = Some("file:dump.sql".into());
        options.target_connection = Some("file:out.sql".into());
        assert!(problems(&options)[0].contains("only be used as a target"));
    }
}
