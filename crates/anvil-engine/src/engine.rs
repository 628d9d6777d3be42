use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use console::style;

use anvil_digest::DigestCache;
use anvil_jobpool::JobPool;
use anvil_process::BuildError;

use crate::target::Target;
use crate::task::{Key, KeyFn, RunFn, TaskDecl, TaskEntry, TaskState};

/// Everything a running task needs to reach back into the engine: to recurse into its own
/// prerequisites, to hash files, and to bound how many external processes run at once.
#[derive(Clone)]
pub struct Ctx {
    engine: Arc<Engine>,
    src: Arc<str>,
}

impl Ctx {
    pub fn root(&self) -> &Path {
        &self.engine.root
    }

    pub fn digest(&self) -> &DigestCache {
        &self.engine.digest
    }

    pub fn job_pool(&self) -> &JobPool {
        &self.engine.job_pool
    }

    /// Recursively brings `targets` up to date on behalf of the currently-running task.
    pub async fn update(&self, targets: &[Target]) -> Result<(), BuildError> {
        self.engine.update(targets, &self.src).await
    }

    /// Digests every file target in `targets`, skipping abstract targets entirely.
    pub async fn hash_file_targets(&self, targets: &[Target]) -> Vec<String> {
        let mut out = Vec::with_capacity(targets.len());
        for t in targets {
            if let Some(path) = t.as_file_path() {
                out.push(self.engine.digest.hash(path).await);
            }
        }
        out
    }

    /// Drops a memoized digest, to be called immediately before a task overwrites `path`.
    pub fn invalidate_digest(&self, path: &str) {
        self.engine.digest.invalidate(path);
    }

    /// Whether `target` is owned by some task in the live registry.
    pub fn is_known(&self, target: &Target) -> bool {
        self.engine.is_known(target)
    }
}

/// Registers tasks against the targets they produce before the graph starts executing.
/// Target ownership is fixed once [`EngineBuilder::build`] runs: every target maps to at
/// most one task for the engine's entire lifetime.
pub struct EngineBuilder {
    root: PathBuf,
    tasks: Vec<TaskEntry>,
    by_target: HashMap<Target, usize>,
}

impl EngineBuilder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            tasks: Vec::new(),
            by_target: HashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Registers one task producing `targets`, built from `run` (and, for tasks that can
    /// skip re-running, `key`).
    ///
    /// Panics if any target in `targets` is already owned by an earlier task — two rules
    /// claiming the same output is a configuration bug, not a runtime build failure.
    pub fn add_task(
        &mut self,
        label: impl Into<String>,
        targets: Vec<Target>,
        run: RunFn,
        key: Option<KeyFn>,
    ) {
        let label = label.into();
        let idx = self.tasks.len();
        for t in &targets {
            if let Some(&prev) = self.by_target.get(t) {
                panic!(
                    "target {t} claimed by both task \"{}\" and task \"{label}\"",
                    self.tasks[prev].decl.label
                );
            }
        }
        for t in &targets {
            self.by_target.insert(t.clone(), idx);
        }
        self.tasks.push(TaskEntry {
            decl: TaskDecl { label, targets, run, key },
            state: TaskState::default(),
        });
    }

    pub fn build(self) -> Arc<Engine> {
        Arc::new(Engine {
            root: self.root,
            tasks: self.tasks.into_iter().map(Arc::new).collect(),
            by_target: self.by_target,
            digest: DigestCache::new(),
            job_pool: JobPool::for_host(),
        })
    }
}

/// The task registry plus scheduler: owns every declared task and drives them to
/// completion on demand, memoizing concurrent requests for the same task.
pub struct Engine {
    root: PathBuf,
    tasks: Vec<Arc<TaskEntry>>,
    by_target: HashMap<Target, usize>,
    digest: DigestCache,
    job_pool: JobPool,
}

impl Engine {
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn job_pool(&self) -> &JobPool {
        &self.job_pool
    }

    pub fn digest(&self) -> &DigestCache {
        &self.digest
    }

    pub fn is_known(&self, target: &Target) -> bool {
        self.by_target.contains_key(target)
    }

    /// Clears every task's remembered key, as if this were a fresh process with no
    /// persisted cache.
    pub fn clear_all_cached_keys(&self) {
        for t in &self.tasks {
            *t.state.cached_key.lock() = None;
        }
    }

    /// Seeds a task's remembered key (e.g. loaded from a persistent cache file). Returns
    /// `false` if `target` names no known task, so the caller can treat the entry as stale.
    pub fn set_cached_key(&self, target: &Target, key: Key) -> bool {
        match self.by_target.get(target) {
            Some(&idx) => {
                *self.tasks[idx].state.cached_key.lock() = Some(key);
                true
            }
            None => false,
        }
    }

    /// Every target currently owned by a task holding a remembered key, suitable for
    /// serializing back out to a persistent cache file.
    pub fn cached_entries(&self) -> HashMap<String, Key> {
        let mut out = HashMap::new();
        for t in &self.tasks {
            if let Some(key) = t.state.cached_key.lock().clone() {
                for target in &t.decl.targets {
                    out.insert(target.to_string(), key.clone());
                }
            }
        }
        out
    }

    /// Brings every target in `targets` up to date, recursing into whatever tasks produce
    /// them. `src` names the requester, used only for diagnostics on failure.
    ///
    /// Targets with no owning task are resolved directly: an abstract target with no task
    /// is a configuration error surfaced as a [`BuildError`]; a file target with no task is
    /// assumed to already exist on disk and is probed for read access.
    pub async fn update(self: &Arc<Self>, targets: &[Target], src: &str) -> Result<(), BuildError> {
        let mut pending_indices = Vec::new();
        let mut futures = Vec::new();

        for t in targets {
            match self.by_target.get(t) {
                Some(&idx) => {
                    pending_indices.push(idx);
                    let engine = self.clone();
                    let src = src.to_string();
                    futures.push(async move { engine.start_or_await(idx, &src).await });
                }
                None => match t {
                    Target::Abstract(_) => {
                        return Err(BuildError::new(format!(
                            "{} requested by {src} names no task",
                            t
                        )));
                    }
                    Target::File(path) => {
                        if tokio::fs::File::open(path).await.is_err() {
                            return Err(BuildError::new(format!(
                                "{} requested by {src} does not exist and no task produces it",
                                t
                            )));
                        }
                    }
                },
            }
        }

        futures::future::join_all(futures).await;

        for idx in pending_indices {
            if self.tasks[idx].state.outcome.get().copied() == Some(true) {
                return Err(BuildError::new(format!(
                    "for lack of {}",
                    self.tasks[idx].decl.label
                )));
            }
        }
        Ok(())
    }

    async fn start_or_await(self: &Arc<Self>, idx: usize, src: &str) -> bool {
        let entry = self.tasks[idx].clone();
        let engine = self.clone();
        let src = src.to_string();
        *entry
            .state
            .outcome
            .get_or_init(|| {
                let entry = entry.clone();
                async move {
                    *entry.state.src.lock() = Some(src);
                    engine.run_task(&entry).await
                }
            })
            .await
    }

    /// Runs one task to completion, returning whether it failed. Checks the remembered key
    /// first: if it is set and still matches after updating prerequisites, the task's
    /// effect is assumed to already hold and `run` is skipped entirely.
    async fn run_task(self: &Arc<Self>, entry: &Arc<TaskEntry>) -> bool {
        let ctx = Ctx {
            engine: self.clone(),
            src: entry.decl.label.as_str().into(),
        };

        let remembered = entry.state.cached_key.lock().clone();
        if let (Some(remembered), Some(key_fn)) = (remembered, &entry.decl.key) {
            match key_fn(ctx.clone()).await {
                Ok(current) if current == remembered => {
                    log::debug!("{}: up to date, skipping", entry.decl.label);
                    return false;
                }
                Ok(_) => {}
                Err(e) => return self.fail(entry, &e),
            }
        }

        *entry.state.cached_key.lock() = None;
        if let Err(e) = (entry.decl.run)(ctx.clone()).await {
            return self.fail(entry, &e);
        }

        if let Some(key_fn) = &entry.decl.key {
            match key_fn(ctx).await {
                Ok(new_key) => *entry.state.cached_key.lock() = Some(new_key),
                Err(e) => return self.fail(entry, &e),
            }
        }
        false
    }

    fn fail(&self, entry: &Arc<TaskEntry>, err: &BuildError) -> bool {
        eprintln!("{}", style(format!("!!! FAILED [{}] {err}", entry.decl.label)).red());
        log::error!("task \"{}\" failed: {err}", entry.decl.label);
        true
    }
}
