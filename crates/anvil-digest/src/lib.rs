// Copyright 2026 The Anvil Authors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! In-process memoized content digests of files on disk.
//!
//! A digest is not a cryptographic commitment: it only needs to change whenever the bytes
//! of a file change, so a task that depends on that file is forced to re-key. MD5 is used
//! because it is fast and because the cache file this produces is meant to be compared for
//! equality, never trusted across an adversarial boundary.

use std::collections::HashMap;
use std::path::Path;

use base64::Engine as _;
use parking_lot::Mutex;

/// Placeholder digest returned for a path that cannot be read (e.g. not yet produced).
pub const UNREADABLE: &str = "path:x";

fn encode(bytes: &[u8]) -> String {
    let digest = md5::compute(bytes);
    format!("path:{}", base64::engine::general_purpose::STANDARD.encode(digest.0))
}

/// Digests the full content of one file. Never fails: an unreadable path yields
/// [`UNREADABLE`], matching the source behavior of treating "doesn't exist yet" as a
/// distinct-but-stable signature rather than an error.
pub async fn digest_file(path: &Path) -> String {
    match tokio::fs::read(path).await {
        Ok(bytes) => encode(&bytes),
        Err(_) => UNREADABLE.to_string(),
    }
}

/// Memoizes [`digest_file`] results by path for the lifetime of one process.
///
/// Entries are invalidated explicitly by a task immediately before it overwrites the
/// corresponding file; there is no TTL and no automatic staleness detection.
#[derive(Default)]
pub struct DigestCache {
    memo: Mutex<HashMap<String, String>>,
}

impl DigestCache {
    pub fn new() -> Self {
        Self {
            memo: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the memoized digest for `path`, computing and storing it if absent.
    ///
    /// Two concurrent first-requests for the same path may each perform the read; this is
    /// a deliberate simplification (the computation is idempotent and cheap relative to the
    /// process-spawns it gates) rather than a per-path `OnceCell` table.
    pub async fn hash(&self, path: &str) -> String {
        if let Some(hit) = self.memo.lock().get(path).cloned() {
            return hit;
        }
        let digest = digest_file(Path::new(path)).await;
        self.memo.lock().insert(path.to_string(), digest.clone());
        digest
    }

    /// Drops any memoized digest for `path`. Call this immediately before a task writes to
    /// `path`, so that the next read observes fresh content rather than a stale digest.
    pub fn invalidate(&self, path: &str) {
        self.memo.lock().remove(path);
    }
}
