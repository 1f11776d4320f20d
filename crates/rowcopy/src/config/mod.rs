//! Configuration: copy options, validation and parameter files.

mod params;
mod types;
mod validation;

pub use params::ParamFile;
pub use types::*;

use crate::error::Result;

/// Mask shown instead of passwords when options are printed.
pub const PASSWORD_MASK: &str = "***";

impl CopyOptions {
    /// Validate the options, reporting every problem at once.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// Every problem found by [`CopyOptions::validate`].
    pub fn problems(&self) -> Vec<String> {
        validation::problems(self)
    }

    /// A copy safe to print, with passwords replaced by [`PASSWORD_MASK`].
    pub fn masked(&self) -> Self {
        let mask = |p: &Option<String>| p.as_ref().map(|_| PASSWORD_MASK.to_string());
        Self {
            source_password: mask(&self.source_password),
            target_password: mask(&self.target_password),
            ..self.clone()
        }
    }

    /// Render the effective options as YAML with passwords masked.
    pub fn to_masked_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(&self.masked())?)
    }

    /// Whether the target is a SQL script rather than a database.
    pub fn targets_script(&self) -> bool {
        self.target_connection
            .as_deref()
            .is_some_and(|t| t.starts_with("file:"))
    }

    /// Skipped tables, lowercased.
    pub fn skipped_tables(&self) -> Vec<String> {
        self.skip_tables
            .iter()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masked_yaml_hides_passwords() {
        let options = CopyOptions {
            source_connection: Some("postgres://db/app".into()),
            source_password: Some("hunter2".into()),
            target_connection: Some("file:--".into()),
            query: "SELECT * FROM main".into(),
            ..Default::default()
        };

        let yaml = options.to_masked_yaml().unwrap();
        assert!(yaml.contains("source_password: '***'") || yaml.contains("source_password: \"***\""));
        assert!(yaml.contains("target_password: null"));
        assert!(!yaml.contains("hunter2"));
        assert!(yaml.contains("chunk_size: 500"));
        assert!(yaml.contains("schema_cache: none"));
    }

    #[test]
    fn test_debug_redacts_passwords() {
        let options = CopyOptions {
            target_password: Some("super_secret_password_456".into()),
            ..Default::default()
        };
        let debug_output = format!("{:?}", options);
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_secret_password_456"));
    }

    #[test]
    fn test_targets_script() {
        let mut options = CopyOptions::default();
        assert!(!options.targets_script());
        options.target_connection = Some("file:out.sql".into());
        assert!(options.targets_script());
        options.target_connection = Some("sqlite://target.db".into());
        assert!(!options.targets_script());
    }

    #[test]
    fn test_skipped_tables_are_normalized() {
        let options = CopyOptions {
            skip_tables: vec![" Audit ".into(), "".into(), "LOG".into()],
            ..Default::default()
        };
        assert_eq!(options.skipped_tables(), vec!["audit", "log"]);
    }
}
