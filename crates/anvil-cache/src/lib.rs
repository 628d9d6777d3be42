// Copyright 2026 The Anvil Authors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Persists task keys to a JSON file between process runs, so a second invocation with
//! nothing changed can skip every task.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anvil_engine::{BuildError, Engine, Target};

/// A `{ "target string": key }` file on disk, loaded before a build and rewritten after.
pub struct CacheFile {
    path: PathBuf,
}

#[derive(Debug, Default, Eq, PartialEq)]
pub struct LoadStats {
    pub total: usize,
    pub hits: usize,
    pub removed: usize,
}

impl CacheFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Clears every task's in-memory key, then reapplies whatever the file on disk holds.
    ///
    /// A missing file is the normal first-run state and is not logged as a problem. A
    /// present-but-unparseable file is logged and otherwise treated as empty: a corrupt
    /// cache costs a full rebuild, not a crash.
    pub async fn load_into(&self, engine: &Engine) -> LoadStats {
        engine.clear_all_cached_keys();

        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("no cache file at {}, starting clean", self.path.display());
                return LoadStats::default();
            }
            Err(e) => {
                log::warn!("could not read cache file {}: {e}", self.path.display());
                return LoadStats::default();
            }
        };

        let entries: std::collections::HashMap<String, serde_json::Value> =
            match serde_json::from_str(&contents) {
                Ok(e) => e,
                Err(e) => {
                    log::warn!("cache file {} is corrupt, ignoring: {e}", self.path.display());
                    return LoadStats::default();
                }
            };

        let mut stats = LoadStats { total: entries.len(), ..LoadStats::default() };
        for (target_str, key) in entries {
            let target = Target::parse(&target_str);
            if engine.set_cached_key(&target, key) {
                stats.hits += 1;
            } else {
                stats.removed += 1;
            }
        }
        log::info!(
            "cache: {} entries loaded, {} applied, {} stale (target no longer produced)",
            stats.total,
            stats.hits,
            stats.removed
        );
        stats
    }

    /// Serializes every task's current key back to disk. A write failure here is not a
    /// build failure (no task caused it) and is not swallowed either: it is surfaced by
    /// panicking, since a half-written or missing cache silently corrupts the *next* run.
    pub async fn save_from(&self, engine: &Engine) {
        let entries = engine.cached_entries();
        log::info!("cache: saving {} entries to {}", entries.len(), self.path.display());
        let json = serde_json::to_string_pretty(&entries)
            .expect("task keys are always representable as JSON");
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .unwrap_or_else(|e| {
                        panic!("failed to create cache directory {}: {e}", parent.display())
                    });
            }
        }
        tokio::fs::write(&self.path, json).await.unwrap_or_else(|e| {
            panic!("failed to write cache file {}: {e}", self.path.display())
        });
    }
}

/// The full driver: load the cache, bring `targets` up to date, save the cache, and only
/// then report whether the build itself failed. Cache state from whatever succeeded is
/// preserved even when some targets fail.
pub async fn update(
    engine: &Arc<Engine>,
    cache: &CacheFile,
    targets: &[Target],
) -> Result<(), BuildError> {
    cache.load_into(engine).await;
    let result = engine.update(targets, "user").await;
    cache.save_from(engine).await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use anvil_engine::EngineBuilder;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn a_missing_cache_file_loads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mut builder = EngineBuilder::new(dir.path());
        builder.add_task(
            "noop",
            vec![Target::abstract_("noop")],
            Arc::new(|_ctx| Box::pin(async { Ok(()) })),
            None,
        );
        let engine = builder.build();
        let cache = CacheFile::new(dir.path().join("does-not-exist.json"));
        let stats = cache.load_into(&engine).await;
        assert_eq!(stats, LoadStats::default());
    }

    #[tokio::test]
    async fn a_corrupt_cache_file_is_treated_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        tokio::fs::write(&path, b"not json").await.unwrap();
        let builder = EngineBuilder::new(dir.path());
        let engine = builder.build();
        let cache = CacheFile::new(path);
        let stats = cache.load_into(&engine).await;
        assert_eq!(stats.total, 0);
    }

    #[tokio::test]
    async fn save_then_load_round_trips_a_key() {
        let dir = tempfile::tempdir().unwrap();
        let mut builder = EngineBuilder::new(dir.path());
        builder.add_task(
            "build :thing",
            vec![Target::abstract_("thing")],
            Arc::new(|_ctx| Box::pin(async { Ok(()) })),
            Some(Arc::new(|_ctx| Box::pin(async { Ok(serde_json::json!(["v1"])) }))),
        );
        let engine = builder.build();
        engine
            .update(&[Target::abstract_("thing")], "test")
            .await
            .unwrap();

        let cache_path = dir.path().join("cache.json");
        let cache = CacheFile::new(&cache_path);
        cache.save_from(&engine).await;
        assert!(cache_path.exists());

        let mut builder2 = EngineBuilder::new(dir.path());
        let runs = Arc::new(AtomicUsize::new(0));
        let runs2 = runs.clone();
        builder2.add_task(
            "build :thing",
            vec![Target::abstract_("thing")],
            Arc::new(move |_ctx| {
                let runs = runs2.clone();
                Box::pin(async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            }),
            Some(Arc::new(|_ctx| Box::pin(async { Ok(serde_json::json!(["v1"])) }))),
        );
        let engine2 = builder2.build();
        let stats = cache.load_into(&engine2).await;
        assert_eq!(stats.hits, 1);

        engine2
            .update(&[Target::abstract_("thing")], "test")
            .await
            .unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 0, "matching cached key must skip the run");
    }

    #[tokio::test]
    async fn an_entry_for_a_removed_target_is_dropped_not_applied() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        tokio::fs::write(&path, r#"{":gone": ["x"]}"#).await.unwrap();
        let builder = EngineBuilder::new(dir.path());
        let engine = builder.build();
        let cache = CacheFile::new(path);
        let stats = cache.load_into(&engine).await;
        assert_eq!(stats.removed, 1);
        assert_eq!(stats.hits, 0);
    }
}
