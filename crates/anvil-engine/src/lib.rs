// Copyright 2026 The Anvil Authors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The task graph: targets, the registry of tasks that produce them, and the scheduler
//! that walks requested targets to a settled (or failed) state.

mod engine;
mod target;
mod task;

pub use anvil_process::BuildError;
pub use engine::{Ctx, Engine, EngineBuilder};
pub use target::Target;
pub use task::{BoxFuture, Key, KeyFn, RunFn, TaskDecl};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn ok_run(count: Arc<AtomicUsize>) -> RunFn {
        Arc::new(move |_ctx| {
            let count = count.clone();
            Box::pin(async move {
                count.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        })
    }

    fn failing_run(message: &'static str) -> RunFn {
        Arc::new(move |_ctx| Box::pin(async move { Err(BuildError::new(message)) }))
    }

    fn constant_key(key: serde_json::Value) -> KeyFn {
        Arc::new(move |_ctx| {
            let key = key.clone();
            Box::pin(async move { Ok(key) })
        })
    }

    #[tokio::test]
    async fn a_task_with_no_owner_for_an_existing_file_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let existing = dir.path().join("already-there.txt");
        std::fs::write(&existing, b"hi").unwrap();

        let engine = EngineBuilder::new(dir.path()).build();
        let target = Target::file(existing.to_str().unwrap());
        engine.update(&[target], "test").await.unwrap();
    }

    #[tokio::test]
    async fn a_missing_file_with_no_producing_task_fails() {
        let dir = tempfile::tempdir().unwrap();
        let engine = EngineBuilder::new(dir.path()).build();
        let missing = dir.path().join("nope.txt");
        let target = Target::file(missing.to_str().unwrap());
        let err = engine.update(&[target], "test").await.unwrap_err();
        assert!(err.0.contains("does not exist"));
    }

    #[tokio::test]
    async fn an_undeclared_abstract_target_fails() {
        let dir = tempfile::tempdir().unwrap();
        let engine = EngineBuilder::new(dir.path()).build();
        let err = engine
            .update(&[Target::abstract_("dist")], "test")
            .await
            .unwrap_err();
        assert!(err.0.contains("names no task"));
    }

    #[tokio::test]
    async fn a_task_runs_exactly_once_across_concurrent_requesters() {
        let dir = tempfile::tempdir().unwrap();
        let mut builder = EngineBuilder::new(dir.path());
        let runs = Arc::new(AtomicUsize::new(0));
        builder.add_task(
            "build :thing",
            vec![Target::abstract_("thing")],
            ok_run(runs.clone()),
            None,
        );
        let engine = builder.build();

        let a = engine.clone();
        let b = engine.clone();
        let (r1, r2) = tokio::join!(
            a.update(&[Target::abstract_("thing")], "a"),
            b.update(&[Target::abstract_("thing")], "b"),
        );
        r1.unwrap();
        r2.unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn a_failed_task_surfaces_for_lack_of_to_its_requester() {
        let dir = tempfile::tempdir().unwrap();
        let mut builder = EngineBuilder::new(dir.path());
        builder.add_task(
            "build :broken",
            vec![Target::abstract_("broken")],
            failing_run("boom"),
            None,
        );
        let engine = builder.build();
        let err = engine
            .update(&[Target::abstract_("broken")], "test")
            .await
            .unwrap_err();
        assert!(err.0.contains("for lack of build :broken"));
    }

    #[tokio::test]
    async fn a_matching_remembered_key_skips_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let mut builder = EngineBuilder::new(dir.path());
        let runs = Arc::new(AtomicUsize::new(0));
        builder.add_task(
            "build :cached",
            vec![Target::abstract_("cached")],
            ok_run(runs.clone()),
            Some(constant_key(serde_json::json!(["same"]))),
        );
        let engine = builder.build();
        engine.set_cached_key(&Target::abstract_("cached"), serde_json::json!(["same"]));

        engine
            .update(&[Target::abstract_("cached")], "test")
            .await
            .unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn a_changed_key_forces_a_rerun() {
        let dir = tempfile::tempdir().unwrap();
        let mut builder = EngineBuilder::new(dir.path());
        let runs = Arc::new(AtomicUsize::new(0));
        builder.add_task(
            "build :stale",
            vec![Target::abstract_("stale")],
            ok_run(runs.clone()),
            Some(constant_key(serde_json::json!(["new"]))),
        );
        let engine = builder.build();
        engine.set_cached_key(&Target::abstract_("stale"), serde_json::json!(["old"]));

        engine
            .update(&[Target::abstract_("stale")], "test")
            .await
            .unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    #[should_panic(expected = "claimed by both")]
    fn two_tasks_cannot_claim_the_same_target() {
        let mut builder = EngineBuilder::new(".");
        builder.add_task(
            "first",
            vec![Target::abstract_("dup")],
            Arc::new(|_ctx| Box::pin(async { Ok(()) })),
            None,
        );
        builder.add_task(
            "second",
            vec![Target::abstract_("dup")],
            Arc::new(|_ctx| Box::pin(async { Ok(()) })),
            None,
        );
    }
}
