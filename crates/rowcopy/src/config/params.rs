//! Parameter files.
//!
//! Lines up to the first blank line are command-line tokens, one per line. The
//! remaining lines are the seed query. Lines starting with `#` are ignored.
//!
//! ```text
//! --source-connection
//! postgres://localhost/prod
//! --chunk-size
//! 100
//!
//! SELECT * FROM orders
//! WHERE id = 42
//! ```

use std::path::Path;

use crate::error::{CopyError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamFile {
    /// Tokens to parse before the real command line.
    pub args: Vec<String>,
    /// Query lines, in file order.
    pub query: Vec<String>,
}

impl ParamFile {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            CopyError::Config(format!(
                "Cannot read parameter file {}: {}",
                path.display(),
                e
            ))
        })?;
        Ok(Self::parse(&content))
    }

    pub fn parse(content: &str) -> Self {
        let mut file = ParamFile::default();
        let mut in_query = false;
        for line in content.lines() {
            if line.trim_start().starts_with('#') {
                continue;
            }
            if in_query {
                file.query.push(line.to_string());
            } else if line.trim().is_empty() {
                in_query = true;
            } else {
                file.args.push(line.trim().to_string());
            }
        }
        file
    }

    /// The query lines joined with spaces, or `None` when the file has no query.
    pub fn query_text(&self) -> Option<String> {
        let text = self.query.join(" ").trim().to_string();
        (!text.is_empty()).then_some(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const PARAMETERS: &str = "\
# connection settings
--source-connection
jdbc:sqlite:source.db
--source-user
src
--chunk-size
100
--dry-run

SELECT * FROM Table WHERE it > that
# not part of the query
AND that LIKE 'Stuff%'
";

    #[test]
    fn test_parse_splits_args_and_query() {
        let file = ParamFile::parse(PARAMETERS);
        assert_eq!(
            file.args,
            vec![
                "--source-connection",
                "jdbc:sqlite:source.db",
                "--source-user",
                "src",
                "--chunk-size",
                "100",
                "--dry-run",
            ]
        );
        assert_eq!(
            file.query,
            vec!["SELECT * FROM Table WHERE it > that", "AND that LIKE 'Stuff%'"]
        );
        assert_eq!(
            file.query_text().as_deref(),
            Some("SELECT * FROM Table WHERE it > that AND that LIKE 'Stuff%'")
        );
    }

    #[test]
    fn test_file_without_query() {
        let file = ParamFile::parse("--dry-run\n");
        assert_eq!(file.args, vec!["--dry-run"]);
        assert_eq!(file.query_text(), None);
    }

    #[test]
    fn test_load_from_disk() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(PARAMETERS.as_bytes()).unwrap();
        let file = ParamFile::load(tmp.path()).unwrap();
        assert_eq!(file.args.len(), 7);

        assert!(ParamFile::load("/nonexistent/params.txt").is_err());
    }
}
