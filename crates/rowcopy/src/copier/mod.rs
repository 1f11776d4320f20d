//! Copy orchestration.
//!
//! [`Copier`] ties the pieces together: parse the seed queries, load the
//! source schema, walk the graph for each query, map the rows onto the
//! target and write them.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::{CopyOptions, SchemaCacheMode};
use crate::core::{Database, SchemaGraph};
use crate::drivers;
use crate::error::{CopyError, Result};
use crate::mapper::{DataMapper, IdentityMapper, RowMapper};
use crate::query::{parse_queries, Query};
use crate::retrieve::{DataRetriever, TableFilter};
use crate::schema::{SchemaBuilder, SchemaCache};
use crate::visualize::CopyVisualizer;
use crate::writer::{DataWriter, Inserter, ScriptOutput, SqlScriptWriter, Updater};

/// Outcome of one seed query.
#[derive(Debug, Clone, Serialize)]
pub struct QueryReport {
    pub query: String,
    pub rows_retrieved: usize,
    pub rows_written: usize,
    pub duplicates_skipped: usize,
}

/// Outcome of a copy run.
#[derive(Debug, Clone, Serialize)]
pub struct CopyReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_seconds: f64,
    pub dry_run: bool,
    pub queries: Vec<QueryReport>,
    pub rows_retrieved: usize,
    pub rows_written: usize,
    pub duplicates_skipped: usize,
    /// Rendered copy trees, one per seed query, when only the tree was requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub copy_tree: Option<String>,
    /// Connection URLs whose schema cache was removed.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cleared_caches: Vec<String>,
}

impl CopyReport {
    fn new(run_id: String, started_at: DateTime<Utc>, dry_run: bool) -> Self {
        Self {
            run_id,
            started_at,
            completed_at: started_at,
            duration_seconds: 0.0,
            dry_run,
            queries: Vec::new(),
            rows_retrieved: 0,
            rows_written: 0,
            duplicates_skipped: 0,
            copy_tree: None,
            cleared_caches: Vec::new(),
        }
    }

    fn record(&mut self, query: QueryReport) {
        self.rows_retrieved += query.rows_retrieved;
        self.rows_written += query.rows_written;
        self.duplicates_skipped += query.duplicates_skipped;
        self.queries.push(query);
    }

    fn finish(mut self, started: Instant) -> Self {
        self.completed_at = Utc::now();
        self.duration_seconds = started.elapsed().as_secs_f64();
        self
    }

    /// Convert to pretty JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// The resolved target side of a run.
struct TargetSide {
    db: Option<Arc<dyn Database>>,
    mapper: Box<dyn RowMapper>,
    writer: Box<dyn DataWriter>,
}

/// Runs a copy described by [`CopyOptions`].
pub struct Copier {
    options: CopyOptions,
    builder: SchemaBuilder,
    cache: Option<SchemaCache>,
}

impl Copier {
    pub fn new(options: CopyOptions) -> Self {
        Self {
            options,
            builder: SchemaBuilder::new(),
            cache: None,
        }
    }

    /// Keep schema cache files in `cache` instead of the user cache directory.
    pub fn with_cache(mut self, cache: SchemaCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn options(&self) -> &CopyOptions {
        &self.options
    }

    fn cache(&self) -> Result<SchemaCache> {
        match &self.cache {
            Some(cache) => Ok(cache.clone()),
            None => SchemaCache::new(),
        }
    }

    fn source_url(&self) -> Result<&str> {
        self.options
            .source_connection
            .as_deref()
            .ok_or_else(|| CopyError::Config("--source-connection parameter is required".into()))
    }

    fn table_filter(&self) -> TableFilter {
        TableFilter::new(self.options.skipped_tables())
    }

    /// Run the copy.
    pub async fn run(&self) -> Result<CopyReport> {
        self.options.validate()?;

        let started = Instant::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        let mut report = CopyReport::new(run_id, Utc::now(), self.options.dry_run);
        info!("Starting copy run {}", report.run_id);

        if self.options.schema_cache == SchemaCacheMode::Clear {
            report.cleared_caches = self.clear_caches()?;
            return Ok(report.finish(started));
        }

        info!("Phase 1: Parsing seed queries");
        let queries = parse_queries(&self.options.query)?;
        info!("Parsed {} seed queries", queries.len());

        info!("Phase 2: Loading source schema");
        let source = drivers::connect(
            self.source_url()?,
            self.options.source_user.as_deref(),
            self.options.source_password.as_deref(),
        )
        .await?;
        let outcome = self.copy(&source, &queries, &mut report).await;
        source.close().await;
        outcome?;

        let report = report.finish(started);
        info!(
            "Copy finished: {} rows written, {} duplicates skipped in {:.2}s",
            report.rows_written, report.duplicates_skipped, report.duration_seconds
        );
        Ok(report)
    }

    async fn copy(
        &self,
        source: &Arc<dyn Database>,
        queries: &[Query],
        report: &mut CopyReport,
    ) -> Result<()> {
        let source_graph = self.load_graph(self.source_url()?, source).await?;
        info!("Source schema has {} tables", source_graph.len());

        if self.options.show_copy_tree {
            info!("Phase 3: Rendering copy tree");
            let visualizer = CopyVisualizer::new(&source_graph, self.table_filter());
            let trees = queries
                .iter()
                .map(|q| visualizer.tree(&q.table).map(|t| t.render()))
                .collect::<Result<Vec<_>>>()?;
            report.copy_tree = Some(trees.join("\n\n"));
            return Ok(());
        }

        info!("Phase 4: Resolving target");
        let mut target = self.resolve_target().await?;
        let outcome = self
            .copy_queries(source, &source_graph, queries, &mut target, report)
            .await;
        if let Some(db) = &target.db {
            db.close().await;
        }
        outcome
    }

    async fn copy_queries(
        &self,
        source: &Arc<dyn Database>,
        graph: &SchemaGraph,
        queries: &[Query],
        target: &mut TargetSide,
        report: &mut CopyReport,
    ) -> Result<()> {
        info!("Phase 5: Copying {} queries", queries.len());
        let retriever = DataRetriever::new(source.as_ref(), graph)
            .with_chunk_size(self.options.chunk_size)
            .with_table_filter(self.table_filter());

        for query in queries {
            info!("Copying rows for: {}", query.text);
            let data = retriever.collect(query).await?;
            let mapped = target.mapper.map_node(&data)?;
            let summary = target.writer.write(&mapped).await?;
            report.record(QueryReport {
                query: query.text.clone(),
                rows_retrieved: data.size(),
                rows_written: summary.rows_written,
                duplicates_skipped: summary.duplicates_skipped,
            });
        }
        Ok(())
    }

    async fn resolve_target(&self) -> Result<TargetSide> {
        let url = self
            .options
            .target_connection
            .as_deref()
            .ok_or_else(|| CopyError::Config("--target-connection parameter is required".into()))?;

        if self.options.targets_script() {
            if self.options.dry_run {
                warn!("Dry run has no effect on a script target");
            }
            return Ok(TargetSide {
                db: None,
                mapper: Box::new(IdentityMapper),
                writer: Box::new(SqlScriptWriter::new(ScriptOutput::from_target(url)?)),
            });
        }

        let db = drivers::connect(
            url,
            self.options.target_user.as_deref(),
            self.options.target_password.as_deref(),
        )
        .await?;
        let graph = match self.load_graph(url, &db).await {
            Ok(graph) => graph,
            Err(e) => {
                db.close().await;
                return Err(e);
            }
        };
        info!("Target schema has {} tables", graph.len());

        let writer: Box<dyn DataWriter> = if self.options.allow_update {
            Box::new(Updater::new(Arc::clone(&db)).dry_run(self.options.dry_run))
        } else {
            Box::new(
                Inserter::new(Arc::clone(&db), self.options.chunk_size)
                    .ignore_existing(self.options.ignore_existing)
                    .dry_run(self.options.dry_run),
            )
        };
        Ok(TargetSide {
            db: Some(db),
            mapper: Box::new(DataMapper::new(
                Arc::new(graph),
                self.options.skip_missing_columns,
            )),
            writer,
        })
    }

    async fn load_graph(&self, url: &str, db: &Arc<dyn Database>) -> Result<SchemaGraph> {
        let build = || self.builder.build(Arc::clone(db));
        match self.options.schema_cache {
            SchemaCacheMode::Use => self.cache()?.use_cache(url, build).await,
            _ => build().await,
        }
    }

    fn clear_caches(&self) -> Result<Vec<String>> {
        let cache = self.cache()?;
        let mut cleared = Vec::new();
        let urls = [
            self.options.source_connection.as_deref(),
            self.options.target_connection.as_deref(),
        ];
        for url in urls.into_iter().flatten() {
            if url.starts_with("file:") {
                continue;
            }
            if cache.clear(url)? {
                cleared.push(url.to_string());
            } else {
                info!("No schema cache for {}", url);
            }
        }
        Ok(cleared)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{count_rows, file_database};

    fn options(source: &str, target: Option<&str>, query: &str) -> CopyOptions {
        CopyOptions {
            source_connection: Some(source.to_string()),
            target_connection: target.map(str::to_string),
            query: query.to_string(),
            ..Default::default()
        }
    }

    async fn open(url: &str) -> Arc<dyn Database> {
        drivers::connect(url, None, None).await.unwrap()
    }

    #[tokio::test]
    async fn test_copy_into_database() {
        let dir = tempfile::tempdir().unwrap();
        let source = file_database(dir.path(), "source.db", true).await;
        let target = file_database(dir.path(), "target.db", false).await;

        let report = Copier::new(options(&source, Some(&target), "SELECT * FROM main WHERE id = 1"))
            .run()
            .await
            .unwrap();

        assert_eq!(report.queries.len(), 1);
        assert_eq!(report.rows_written, report.rows_retrieved);
        assert_eq!(report.duplicates_skipped, 0);

        let db = open(&target).await;
        assert_eq!(count_rows(&db, "main").await, 1);
        assert_eq!(count_rows(&db, "sub_main").await, 1);
        assert_eq!(count_rows(&db, "sub_main_rel").await, 1);
        assert_eq!(count_rows(&db, "intermediate").await, 2);
        assert_eq!(count_rows(&db, "child").await, 2);
        db.close().await;
    }

    #[tokio::test]
    async fn test_overlapping_queries_write_rows_once() {
        let dir = tempfile::tempdir().unwrap();
        let source = file_database(dir.path(), "source.db", true).await;
        let target = file_database(dir.path(), "target.db", false).await;

        let report = Copier::new(options(
            &source,
            Some(&target),
            "SELECT * FROM main WHERE id = 1; SELECT * FROM intermediate WHERE id = 2",
        ))
        .run()
        .await
        .unwrap();

        assert_eq!(report.queries.len(), 2);
        assert!(report.queries[1].duplicates_skipped > 0);
        assert_eq!(report.queries[1].rows_written, 0);

        let db = open(&target).await;
        assert_eq!(count_rows(&db, "intermediate").await, 2);
        db.close().await;
    }

    #[tokio::test]
    async fn test_dry_run_leaves_target_empty() {
        let dir = tempfile::tempdir().unwrap();
        let source = file_database(dir.path(), "source.db", true).await;
        let target = file_database(dir.path(), "target.db", false).await;

        let mut opts = options(&source, Some(&target), "SELECT * FROM main WHERE id = 2");
        opts.dry_run = true;
        let report = Copier::new(opts).run().await.unwrap();

        assert!(report.dry_run);
        assert!(report.rows_written > 0);
        let db = open(&target).await;
        assert_eq!(count_rows(&db, "main").await, 0);
        db.close().await;
    }

    #[tokio::test]
    async fn test_copy_into_script() {
        let dir = tempfile::tempdir().unwrap();
        let source = file_database(dir.path(), "source.db", true).await;
        let script = dir.path().join("copy.sql");
        let target = format!("file:{}", script.display());

        let report = Copier::new(options(&source, Some(&target), "SELECT * FROM main WHERE id = 3"))
            .run()
            .await
            .unwrap();

        let text = std::fs::read_to_string(&script).unwrap();
        assert!(text.starts_with("INSERT INTO main(id, text)\nVALUES(3, 'text 3');"));
        assert_eq!(text.matches("INSERT INTO").count(), report.rows_written);
        assert!(text.contains("INSERT INTO intermediate"));
    }

    #[tokio::test]
    async fn test_missing_target_table_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let source = file_database(dir.path(), "source.db", true).await;
        let target = format!("sqlite://{}?mode=rwc", dir.path().join("bare.db").display());
        let db = open(&target).await;
        let mut session = db.begin().await.unwrap();
        session
            .execute("CREATE TABLE main (id INTEGER PRIMARY KEY, text VARCHAR(100))", &[])
            .await
            .unwrap();
        session.commit().await.unwrap();
        db.close().await;

        let err = Copier::new(options(&source, Some(&target), "SELECT * FROM main WHERE id = 1"))
            .run()
            .await
            .unwrap_err();
        match err {
            CopyError::Validation { issues, .. } => {
                assert!(issues[0].contains("does not exist in the target database"))
            }
            other => panic!("unexpected error: {other}"),
        }

        let db = open(&target).await;
        assert_eq!(count_rows(&db, "main").await, 0);
        db.close().await;
    }

    #[tokio::test]
    async fn test_show_copy_tree_needs_no_target() {
        let dir = tempfile::tempdir().unwrap();
        let source = file_database(dir.path(), "source.db", true).await;

        let mut opts = options(&source, None, "SELECT * FROM sub_main");
        opts.show_copy_tree = true;
        opts.skip_tables = vec!["Main".into()];
        let report = Copier::new(opts).run().await.unwrap();

        assert_eq!(
            report.copy_tree.as_deref(),
            Some("  main (skipped)\n  sub_main_rel\nsub_main")
        );
        assert!(report.queries.is_empty());
    }

    #[tokio::test]
    async fn test_schema_cache_is_written_and_cleared() {
        let dir = tempfile::tempdir().unwrap();
        let source = file_database(dir.path(), "source.db", true).await;
        let target = file_database(dir.path(), "target.db", false).await;
        let cache = SchemaCache::in_dir(dir.path().join("cache"));

        let mut opts = options(&source, Some(&target), "SELECT * FROM main WHERE id = 1");
        opts.schema_cache = SchemaCacheMode::Use;
        Copier::new(opts.clone())
            .with_cache(cache.clone())
            .run()
            .await
            .unwrap();
        assert!(cache.path_for(&source).exists());
        assert!(cache.path_for(&target).exists());

        opts.schema_cache = SchemaCacheMode::Clear;
        let report = Copier::new(opts).with_cache(cache.clone()).run().await.unwrap();
        assert_eq!(report.cleared_caches, vec![source.clone(), target.clone()]);
        assert!(!cache.path_for(&source).exists());
    }

    #[tokio::test]
    async fn test_invalid_options_fail_before_connecting() {
        let err = Copier::new(CopyOptions::default()).run().await.unwrap_err();
        assert!(matches!(err, CopyError::Config(_)));
        assert!(err.to_string().contains("--source-connection"));
    }

    #[test]
    fn test_report_json() {
        let mut report = CopyReport::new("run".into(), Utc::now(), false);
        report.record(QueryReport {
            query: "SELECT * FROM main".into(),
            rows_retrieved: 3,
            rows_written: 2,
            duplicates_skipped: 1,
        });
        assert_eq!(report.rows_written, 2);

        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["queries"][0]["rows_retrieved"], 3);
        assert!(json.get("copy_tree").is_none());
    }
}
