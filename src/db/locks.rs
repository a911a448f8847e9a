//! Per-pull-request write serialization.
//!
//! A reassignment reads the pull request, picks a replacement and then writes
//! the whole reviewer list back. Two of those running against the same pull
//! request could both pick the same replacement or overwrite each other's
//! change, so callers hold the pull request's lock for the whole
//! read-modify-write.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;

/// Keyed async locks, one per pull request id.
#[derive(Clone, Default)]
pub struct PullRequestLocks {
    inner: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl PullRequestLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `pr_id`. Access ends when the guard drops.
    pub async fn lock(&self, pr_id: &str) -> OwnedMutexGuard<()> {
        let entry = {
            let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            // Drop entries nobody holds or waits on so the map tracks only live ids.
            map.retain(|_, lock| Arc::strong_count(lock) > 1);
            map.entry(pr_id.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        entry.lock_owned().await
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
