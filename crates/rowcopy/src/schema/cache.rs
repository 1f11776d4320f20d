//! On-disk schema graph cache, one JSON file per connection URL.

use std::future::Future;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::core::SchemaGraph;
use crate::error::{CopyError, Result};

/// Directory name under the user cache directory.
const CACHE_DIR_NAME: &str = "rowcopy";

/// Fallback directory under the home directory.
const HOME_DIR_NAME: &str = ".rowcopy";

/// Cached schema graphs keyed by connection URL.
///
/// Entries are never refreshed; a stale entry has to be cleared explicitly.
#[derive(Debug, Clone)]
pub struct SchemaCache {
    dir: PathBuf,
}

impl SchemaCache {
    /// Cache in the user's cache directory (`~/.rowcopy` when there is none).
    pub fn new() -> Result<Self> {
        let dir = dirs::cache_dir()
            .map(|d| d.join(CACHE_DIR_NAME))
            .or_else(|| dirs::home_dir().map(|d| d.join(HOME_DIR_NAME)))
            .ok_or_else(|| CopyError::Cache("cannot determine a cache directory".into()))?;
        Ok(Self::in_dir(dir))
    }

    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Cache file for a connection URL.
    pub fn path_for(&self, url: &str) -> PathBuf {
        let name: String = url::form_urlencoded::byte_serialize(url.as_bytes()).collect();
        self.dir.join(name)
    }

    /// Cached graph for `url`, if present.
    pub fn load(&self, url: &str) -> Result<Option<SchemaGraph>> {
        let path = self.path_for(url);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)?;
        let graph = serde_json::from_str(&content).map_err(|e| {
            CopyError::Cache(format!(
                "cannot read cached schema {}: {}",
                path.display(),
                e
            ))
        })?;
        debug!("Loaded cached schema from {}", path.display());
        Ok(Some(graph))
    }

    pub fn store(&self, url: &str, graph: &SchemaGraph) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(url);
        std::fs::write(&path, serde_json::to_string(graph)?)?;
        debug!("Stored schema cache at {}", path.display());
        Ok(())
    }

    /// Return the cached graph, or run `build` and cache its result.
    pub async fn use_cache<F, Fut>(&self, url: &str, build: F) -> Result<SchemaGraph>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<SchemaGraph>>,
    {
        if let Some(graph) = self.load(url)? {
            info!("Using cached schema for {} ({} tables)", url, graph.len());
            return Ok(graph);
        }
        let graph = build().await?;
        self.store(url, &graph)?;
        Ok(graph)
    }

    /// Delete the cache file for `url`. Returns whether one existed.
    pub fn clear(&self, url: &str) -> Result<bool> {
        let path = self.path_for(url);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                info!("Cleared schema cache {}", path.display());
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Column, Relationship, SqlType, Table};

    fn sample_graph() -> SchemaGraph {
        let rel = Relationship::new("main", "intermediate", vec![("id".into(), "main_id".into())]);
        let mut main = Table::new("main", vec![Column::new("id", SqlType::I64, false)])
            .with_primary_key(["id"]);
        main.outbound.insert(rel.clone());
        let mut intermediate = Table::new(
            "intermediate",
            vec![
                Column::new("id", SqlType::I64, false),
                Column::new("main_id", SqlType::I64, false),
            ],
        )
        .with_primary_key(["id"]);
        intermediate.inbound.insert(rel);
        SchemaGraph::from_tables([main, intermediate])
    }

    #[test]
    fn test_file_name_is_url_encoded() {
        let cache = SchemaCache::in_dir("/tmp/cache");
        let path = cache.path_for("postgres://u@host:5432/app?sslmode=require");
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(!name.contains('/'));
        assert!(name.starts_with("postgres%3A%2F%2F"));
    }

    #[tokio::test]
    async fn test_use_cache_builds_once() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SchemaCache::in_dir(dir.path().join("nested"));
        let url = "sqlite://source.db";

        let built = cache
            .use_cache(url, || async { Ok(sample_graph()) })
            .await
            .unwrap();
        assert!(cache.path_for(url).exists());

        let cached = cache
            .use_cache(url, || async {
                Err(CopyError::Schema("should not rebuild".into()))
            })
            .await
            .unwrap();
        assert_eq!(cached, built);
        assert!(cached.table("intermediate").unwrap().inbound.len() == 1);
    }

    #[test]
    fn test_clear_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SchemaCache::in_dir(dir.path());
        cache.store("sqlite::memory:", &sample_graph()).unwrap();

        assert!(cache.clear("sqlite::memory:").unwrap());
        assert!(!cache.clear("sqlite::memory:").unwrap());
        assert!(cache.load("sqlite::memory:").unwrap().is_none());
    }

    #[test]
    fn test_corrupt_entry_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SchemaCache::in_dir(dir.path());
        std::fs::write(cache.path_for("x:y"), "not json").unwrap();

        let err = cache.load("x:y").unwrap_err();
        assert!(matches!(err, CopyError::Cache(_)));
    }
}
