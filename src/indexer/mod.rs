// Indexing orchestration: scan, extract, store

pub mod parser;
pub mod scanner;

use r2d2_sqlite::SqliteConnectionManager;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{validate_namespace, Config};
use crate::error::Result;
use crate::index::db::{self, meta, IndexDatabase, IndexState};
use crate::index::schema::SCHEMA_VERSION;
use crate::index::SourceExtractor;
use scanner::SourceFile;

/// Result of a completed indexing run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexSummary {
    pub namespace: String,
    pub type_count: usize,
    pub member_count: usize,
    pub files_indexed: usize,
    pub files_skipped: usize,
    pub digest: String,
    pub indexed_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexOutcome {
    Indexed(IndexSummary),
    /// No matching source files under the namespace root; the store was left alone
    NothingToIndex,
    /// Store is ready and the source tree has not changed since it was built
    Unchanged(IndexSummary),
}

/// The main indexer that coordinates scanning, extraction and storage
pub struct Indexer {
    config: Config,
    extractor: Box<dyn SourceExtractor + Send + Sync>,
}

impl Indexer {
    pub fn new(config: Config) -> Self {
        Self::with_extractor(config, Box::new(parser::JavaExtractor::new()))
    }

    pub fn with_extractor(config: Config, extractor: Box<dyn SourceExtractor + Send + Sync>) -> Self {
        Self { config, extractor }
    }

    fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.config.query.busy_timeout_ms)
    }

    /// Files under the namespace root that the extractor accepts
    pub fn source_files(&self, namespace: &str) -> Result<Vec<SourceFile>> {
        validate_namespace(namespace)?;
        let root = self.config.source_dir(namespace);
        Ok(scanner::scan(&root, &self.config)
            .into_iter()
            .filter(|f| self.extractor.can_parse(&f.relative_path))
            .collect())
    }

    pub fn index_namespace(&self, namespace: &str, force: bool) -> Result<IndexOutcome> {
        self.index_namespace_with_progress(namespace, force, |_, _| {})
    }

    /// Rebuild one namespace. `on_progress(done, total)` is called after every file.
    pub fn index_namespace_with_progress(
        &self,
        namespace: &str,
        force: bool,
        mut on_progress: impl FnMut(usize, usize),
    ) -> Result<IndexOutcome> {
        let files = self.source_files(namespace)?;
        if files.is_empty() {
            info!(
                "Nothing to index for namespace '{}' under {}",
                namespace,
                self.config.source_dir(namespace).display()
            );
            return Ok(IndexOutcome::NothingToIndex);
        }

        let digest = scanner::tree_digest(&files);
        let db_path = self.config.db_path(namespace);

        if !force {
            if let Some(summary) = self.unchanged_summary(namespace, &digest) {
                info!("Namespace '{}' is up to date, skipping", namespace);
                return Ok(IndexOutcome::Unchanged(summary));
            }
        }

        info!("Indexing {} files for namespace '{}'", files.len(), namespace);
        on_progress(0, files.len());

        let database = IndexDatabase::create(&db_path, self.busy_timeout())?;
        debug!("Writing index to {}", database.path().display());
        let mut conn = database.get_conn()?;
        db::set_state(&conn, IndexState::Populating)?;
        db::clear_namespace(&conn)?;

        let (files_indexed, files_skipped) = match self.populate(&mut conn, &files, &mut on_progress) {
            Ok(counts) => counts,
            Err(e) => {
                warn!("Indexing namespace '{}' failed: {}", namespace, e);
                if let Err(cleanup) =
                    db::clear_namespace(&conn).and_then(|_| db::set_state(&conn, IndexState::NotIndexed))
                {
                    warn!("Could not reset namespace '{}' after failure: {}", namespace, cleanup);
                }
                return Err(e);
            }
        };

        let indexed_at = chrono::Utc::now().to_rfc3339();
        {
            let tx = conn.transaction()?;
            db::set_meta(&tx, meta::INDEXED_AT, &indexed_at)?;
            db::set_meta(&tx, meta::FILES_INDEXED, &files_indexed.to_string())?;
            db::set_meta(&tx, meta::SOURCE_DIGEST, &digest)?;
            db::set_state(&tx, IndexState::Ready)?;
            tx.commit()?;
        }

        let stats = db::stats(&conn)?;
        info!(
            "Indexed namespace '{}': {} types, {} members from {} files ({} skipped)",
            namespace, stats.type_count, stats.member_count, files_indexed, files_skipped
        );

        Ok(IndexOutcome::Indexed(IndexSummary {
            namespace: namespace.to_string(),
            type_count: stats.type_count,
            member_count: stats.member_count,
            files_indexed,
            files_skipped,
            digest,
            indexed_at,
        }))
    }

    /// One transaction per `batch_size` files. Unreadable files are skipped and counted.
    fn populate(
        &self,
        conn: &mut r2d2::PooledConnection<SqliteConnectionManager>,
        files: &[SourceFile],
        on_progress: &mut impl FnMut(usize, usize),
    ) -> Result<(usize, usize)> {
        let batch_size = self.config.indexing.batch_size.max(1);
        let mut done = 0;
        let mut indexed = 0;
        let mut skipped = 0;

        for chunk in files.chunks(batch_size) {
            let tx = conn.transaction()?;
            for file in chunk {
                match file.read() {
                    Ok(content) => {
                        let records = self.extractor.extract(&content, &file.relative_path);
                        for record in &records {
                            let members = db::store_type(&tx, record)?;
                            debug!("{}: {} ({} members)", file.relative_path, record.qualified_name(), members);
                        }
                        indexed += 1;
                    }
                    Err(e) => {
                        warn!("Skipping {}: {}", file.relative_path, e);
                        skipped += 1;
                    }
                }
                done += 1;
                on_progress(done, files.len());
            }
            tx.commit()?;
            debug!("Committed batch ({}/{} files)", done, files.len());
        }

        Ok((indexed, skipped))
    }

    /// Summary of the existing store when it is ready, on the current schema and
    /// built from the same tree
    fn unchanged_summary(&self, namespace: &str, digest: &str) -> Option<IndexSummary> {
        let database =
            IndexDatabase::open_existing(self.config.db_path(namespace), namespace, self.busy_timeout()).ok()?;
        if database.state().ok()? != IndexState::Ready {
            return None;
        }
        let schema_version = database.meta(meta::SCHEMA_VERSION).ok()?;
        if schema_version.as_deref() != Some(SCHEMA_VERSION.to_string().as_str()) {
            debug!("Namespace '{}' store has schema {:?}, rebuilding", namespace, schema_version);
            return None;
        }
        if database.meta(meta::SOURCE_DIGEST).ok()?.as_deref() != Some(digest) {
            return None;
        }

        let stats = database.stats().ok()?;
        Some(IndexSummary {
            namespace: namespace.to_string(),
            type_count: stats.type_count,
            member_count: stats.member_count,
            files_indexed: database
                .meta(meta::FILES_INDEXED)
                .ok()
                .flatten()
                .and_then(|v| v.parse().ok())
                .unwrap_or_default(),
            files_skipped: 0,
            digest: digest.to_string(),
            indexed_at: database.meta(meta::INDEXED_AT).ok().flatten().unwrap_or_default(),
        })
    }

    /// Delete a namespace's store. Returns false when there was nothing to delete.
    pub fn remove_namespace(&self, namespace: &str) -> Result<bool> {
        validate_namespace(namespace)?;
        let db_path = self.config.db_path(namespace);
        if !db_path.exists() {
            return Ok(false);
        }

        std::fs::remove_file(&db_path)?;
        for suffix in ["-journal", "-wal", "-shm"] {
            let sidecar = db_path.with_file_name(format!(
                "{}{}",
                db_path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default(),
                suffix
            ));
            if sidecar.exists() {
                std::fs::remove_file(sidecar)?;
            }
        }

        info!("Removed index for namespace '{}'", namespace);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::TypeRecord;
    use crate::query::{GetTypeRequest, QueryEngine};
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::tempdir;

    /// Java extractor that, on reaching `fail_on`, installs a trigger making
    /// every later member insert fail
    struct FailingExtractor {
        inner: parser::JavaExtractor,
        db_path: PathBuf,
        fail_on: &'static str,
    }

    impl SourceExtractor for FailingExtractor {
        fn can_parse(&self, relative_path: &str) -> bool {
            self.inner.can_parse(relative_path)
        }

        fn extract(&self, content: &str, relative_path: &str) -> Vec<TypeRecord> {
            if relative_path == self.fail_on {
                let conn = rusqlite::Connection::open(&self.db_path).unwrap();
                conn.execute_batch(
                    "CREATE TRIGGER reject_members BEFORE INSERT ON members
                     BEGIN SELECT RAISE(ABORT, 'disk quota exceeded'); END;",
                )
                .unwrap();
            }
            self.inner.extract(content, relative_path)
        }
    }

    fn config_for(root: &Path) -> Config {
        let mut config = Config::default();
        config.project.root = root.to_string_lossy().to_string();
        config.indexing.batch_size = 2;
        config
    }

    fn write_source(config: &Config, namespace: &str, rel: &str, content: &str) {
        let path = config.source_dir(namespace).join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn seed(config: &Config) {
        write_source(
            config,
            "release",
            "com/app/World.java",
            "package com.app;\npublic class World extends Base {\n  public void tick() {}\n  public static World get() { return null; }\n}\n",
        );
        write_source(
            config,
            "release",
            "com/app/Base.java",
            "package com.app;\npublic abstract class Base {\n  public int id() { return 0; }\n}\n",
        );
        write_source(
            config,
            "release",
            "com/app/util/Pair.java",
            "package com.app.util;\npublic record Pair(int a, int b) {\n  public int sum() { return a + b; }\n}\n",
        );
    }

    fn indexed(outcome: IndexOutcome) -> IndexSummary {
        match outcome {
            IndexOutcome::Indexed(summary) => summary,
            other => panic!("expected a fresh index, got {:?}", other),
        }
    }

    #[test]
    fn test_index_counts() {
        let dir = tempdir().unwrap();
        let config = config_for(dir.path());
        seed(&config);

        let summary = indexed(Indexer::new(config.clone()).index_namespace("release", false).unwrap());
        assert_eq!(summary.type_count, 3);
        assert_eq!(summary.member_count, 4);
        assert_eq!(summary.files_indexed, 3);
        assert_eq!(summary.files_skipped, 0);

        let db = IndexDatabase::open_existing(config.db_path("release"), "release", Duration::from_secs(1)).unwrap();
        assert_eq!(db.state().unwrap(), IndexState::Ready);
        assert!(db.meta(meta::INDEXED_AT).unwrap().is_some());
    }

    #[test]
    fn test_reindex_is_idempotent() {
        let dir = tempdir().unwrap();
        let config = config_for(dir.path());
        seed(&config);
        let indexer = Indexer::new(config.clone());

        let first = indexed(indexer.index_namespace("release", false).unwrap());
        let second = indexed(indexer.index_namespace("release", true).unwrap());
        assert_eq!(
            (first.type_count, first.member_count),
            (second.type_count, second.member_count)
        );

        let db = IndexDatabase::open_existing(config.db_path("release"), "release", Duration::from_secs(1)).unwrap();
        let types = db.list_types("com.app", true, 100, 0).unwrap();
        let names: Vec<_> = types.iter().map(|t| t.type_name.as_str()).collect();
        assert_eq!(names, vec!["Base", "World", "Pair"]);
    }

    #[test]
    fn test_unchanged_tree_is_skipped() {
        let dir = tempdir().unwrap();
        let config = config_for(dir.path());
        seed(&config);
        let indexer = Indexer::new(config);

        let first = indexed(indexer.index_namespace("release", false).unwrap());
        match indexer.index_namespace("release", false).unwrap() {
            IndexOutcome::Unchanged(summary) => {
                assert_eq!(summary.type_count, first.type_count);
                assert_eq!(summary.files_indexed, 3);
            }
            other => panic!("expected unchanged, got {:?}", other),
        }
    }

    #[test]
    fn test_store_from_older_schema_is_rebuilt() {
        let dir = tempdir().unwrap();
        let config = config_for(dir.path());
        seed(&config);
        let indexer = Indexer::new(config.clone());
        indexed(indexer.index_namespace("release", false).unwrap());

        let conn = rusqlite::Connection::open(config.db_path("release")).unwrap();
        conn.execute("UPDATE index_meta SET value = '1' WHERE key = ?1", [meta::SCHEMA_VERSION])
            .unwrap();
        drop(conn);

        let summary = indexed(indexer.index_namespace("release", false).unwrap());
        assert_eq!(summary.type_count, 3);

        let db = IndexDatabase::open_existing(config.db_path("release"), "release", Duration::from_secs(1)).unwrap();
        assert_eq!(db.meta(meta::SCHEMA_VERSION).unwrap(), Some(SCHEMA_VERSION.to_string()));
    }

    #[test]
    fn test_store_failure_resets_namespace() {
        let dir = tempdir().unwrap();
        let config = config_for(dir.path());
        seed(&config);

        // Sorted order puts util/Pair.java alone in the second batch of two
        let indexer = Indexer::with_extractor(
            config.clone(),
            Box::new(FailingExtractor {
                inner: parser::JavaExtractor::new(),
                db_path: config.db_path("release"),
                fail_on: "com/app/util/Pair.java",
            }),
        );
        let err = indexer.index_namespace("release", false).unwrap_err();
        assert_eq!(err.kind(), "store_error");

        let db = IndexDatabase::open_existing(config.db_path("release"), "release", Duration::from_secs(1)).unwrap();
        assert_eq!(db.state().unwrap(), IndexState::NotIndexed);
        let stats = db.stats().unwrap();
        assert_eq!((stats.type_count, stats.member_count), (0, 0));

        let engine = QueryEngine::new(config.clone());
        let err = engine
            .get_type(&GetTypeRequest {
                fqcn: Some("com.app.World".to_string()),
                ..Default::default()
            })
            .unwrap_err();
        assert_eq!(err.kind(), "no_index");

        // A retry starts from a fresh schema
        let summary = indexed(Indexer::new(config).index_namespace("release", false).unwrap());
        assert_eq!(summary.type_count, 3);
        assert_eq!(summary.member_count, 4);
    }

    #[test]
    fn test_reindex_replaces_removed_types() {
        let dir = tempdir().unwrap();
        let config = config_for(dir.path());
        seed(&config);
        let indexer = Indexer::new(config.clone());
        indexed(indexer.index_namespace("release", false).unwrap());

        fs::remove_file(config.source_dir("release").join("com/app/World.java")).unwrap();
        let summary = indexed(indexer.index_namespace("release", true).unwrap());
        assert_eq!(summary.type_count, 2);
        assert_eq!(summary.member_count, 2);

        let db = IndexDatabase::open_existing(config.db_path("release"), "release", Duration::from_secs(1)).unwrap();
        assert!(db.get_type_and_members("com.app", "World").unwrap().is_none());
        let hits = db
            .search(&db::SearchQuery {
                term: "tick",
                limit: 10,
                package_prefix: None,
                kind: None,
                dedupe_by_type: false,
                overfetch: 20,
            })
            .unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_nothing_to_index() {
        let dir = tempdir().unwrap();
        let config = config_for(dir.path());
        let indexer = Indexer::new(config.clone());

        assert_eq!(indexer.index_namespace("release", false).unwrap(), IndexOutcome::NothingToIndex);
        assert!(!config.db_path("release").exists());
    }

    #[test]
    fn test_files_without_package_count_as_indexed() {
        let dir = tempdir().unwrap();
        let config = config_for(dir.path());
        write_source(&config, "release", "Loose.java", "public class Loose { public void x() {} }");

        let summary = indexed(Indexer::new(config).index_namespace("release", false).unwrap());
        assert_eq!(summary.files_indexed, 1);
        assert_eq!(summary.type_count, 0);
    }

    #[test]
    fn test_namespaces_are_isolated() {
        let dir = tempdir().unwrap();
        let config = config_for(dir.path());
        seed(&config);
        write_source(
            &config,
            "prerelease",
            "org/x/Only.java",
            "package org.x;\npublic class Only {\n  public void one() {}\n}\n",
        );
        let indexer = Indexer::new(config);

        let release = indexed(indexer.index_namespace("release", false).unwrap());
        let prerelease = indexed(indexer.index_namespace("prerelease", false).unwrap());
        assert_eq!(release.type_count, 3);
        assert_eq!(prerelease.type_count, 1);
    }

    #[test]
    fn test_remove_namespace() {
        let dir = tempdir().unwrap();
        let config = config_for(dir.path());
        seed(&config);
        let indexer = Indexer::new(config.clone());

        assert!(!indexer.remove_namespace("release").unwrap());
        indexed(indexer.index_namespace("release", false).unwrap());
        assert!(indexer.remove_namespace("release").unwrap());
        assert!(!config.db_path("release").exists());
    }

    #[test]
    fn test_invalid_namespace_rejected() {
        let dir = tempdir().unwrap();
        let indexer = Indexer::new(config_for(dir.path()));
        let err = indexer.index_namespace("../escape", false).unwrap_err();
        assert_eq!(err.kind(), "invalid_request");
    }
}
