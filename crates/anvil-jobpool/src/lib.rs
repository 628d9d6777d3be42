// Copyright 2026 The Anvil Authors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Bounded concurrency gate for external command executions.
//!
//! This is deliberately not modeled as a hand-rolled future + waiter queue: a
//! [`tokio::sync::Semaphore`] already gives FIFO-fair waiters and a bounded number of
//! concurrently-held permits, and `tokio::spawn` already guarantees a submitted job never
//! starts executing on the caller's stack.

use std::future::Future;

use tokio::sync::Semaphore;
use tokio::task::JoinError;

/// Bounds the number of concurrently-running jobs submitted through [`JobPool::submit`].
#[derive(Clone)]
pub struct JobPool {
    permits: std::sync::Arc<Semaphore>,
    capacity: usize,
}

impl JobPool {
    /// Creates a pool that allows at most `n` jobs to run at once. `n` must be nonzero.
    pub fn new(n: usize) -> Self {
        assert!(n > 0, "a job pool must allow at least one concurrent job");
        Self {
            permits: std::sync::Arc::new(Semaphore::new(n)),
            capacity: n,
        }
    }

    /// Sizes the pool at `host_cpu_count + 1`, leaving one slot for I/O-bound waiting.
    pub fn for_host() -> Self {
        Self::new(num_cpus::get() + 1)
    }

    /// The configured concurrency bound.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Runs `f` under the pool. The returned future resolves once a permit is free *and*
    /// `f` has run to completion; `f` itself is never polled on the calling task before the
    /// next scheduler turn, because it is driven inside a freshly spawned task.
    ///
    /// A panic inside `f` is reported as a [`JoinError`], not silently dropped, and does not
    /// poison the pool: the permit is still returned on drop regardless of how the spawned
    /// task ends.
    pub async fn submit<F, T>(&self, f: F) -> Result<T, JoinError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let permits = self.permits.clone();
        tokio::spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .expect("job pool semaphore is never closed");
            f.await
        })
        .await
    }
}
