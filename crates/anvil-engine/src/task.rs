use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::OnceCell;

use anvil_process::BuildError;

use crate::target::Target;

/// A task's content key: an arbitrary JSON value (typically an array of digest strings and
/// nested sub-keys) compared for equality to decide whether a cached run can be skipped.
pub type Key = serde_json::Value;

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Executes a task's side effect (e.g. spawning a compiler). Must update its own
/// prerequisites before doing any work that depends on them.
pub type RunFn = Arc<dyn Fn(crate::Ctx) -> BoxFuture<Result<(), BuildError>> + Send + Sync>;

/// Computes a task's current key, recursing into prerequisite updates first. Absent for
/// tasks that should always re-run (no meaningful notion of "unchanged").
pub type KeyFn = Arc<dyn Fn(crate::Ctx) -> BoxFuture<Result<Key, BuildError>> + Send + Sync>;

/// The declaration half of a task: everything fixed at configuration time.
pub struct TaskDecl {
    pub label: String,
    pub targets: Vec<Target>,
    pub run: RunFn,
    pub key: Option<KeyFn>,
}

/// The run-state half of a task: everything that changes while the engine executes.
///
/// `outcome` realizes the Idle/Running/Done/Failed state a task passes through: before
/// first use the `OnceCell` is empty (Idle); `get_or_init` driving the stored future is
/// Running; once it resolves every concurrent and future awaiter observes the same
/// Done(false)/Failed(true) value without re-running anything.
#[derive(Default)]
pub struct TaskState {
    pub cached_key: Mutex<Option<Key>>,
    pub outcome: OnceCell<bool>,
    pub src: Mutex<Option<String>>,
}

pub struct TaskEntry {
    pub decl: TaskDecl,
    pub state: TaskState,
}
