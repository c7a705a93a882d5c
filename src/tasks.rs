//! Caller-side asynchrony for the blocking [`crate::store::TagStore`] API.
//!
//! `rebuild` and large `match_pattern` calls can block for seconds. Front-ends
//! run them as a [`BackgroundTask`] on tokio's blocking pool and observe the
//! outcome; cancelling the task's token kills the child process.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::session::SessionRegistry;

/// How a background task ended.
#[derive(Debug)]
pub enum TaskOutcome<T> {
    Completed(T),
    Cancelled,
    Failed(String),
}

/// A blocking operation running on tokio's blocking pool.
pub struct BackgroundTask<T> {
    label: String,
    token: CancellationToken,
    handle: JoinHandle<Result<T>>,
}

impl<T: Send + 'static> BackgroundTask<T> {
    /// Spawn `f`, handing it the task's cancellation token.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<F>(label: impl Into<String>, f: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Result<T> + Send + 'static,
    {
        let label = label.into();
        let token = CancellationToken::new();
        let child = token.clone();
        tracing::debug!("Starting background task: {}", label);
        let handle = tokio::task::spawn_blocking(move || f(child));

        Self {
            label,
            token,
            handle,
        }
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn cancel(&self) {
        tracing::debug!("Cancelling background task: {}", self.label);
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the task. A cancelled token wins over whatever `f` returned.
    pub async fn wait(self) -> TaskOutcome<T> {
        let joined = self.handle.await;
        if self.token.is_cancelled() {
            return TaskOutcome::Cancelled;
        }

        match joined {
            Ok(Ok(value)) => TaskOutcome::Completed(value),
            Ok(Err(e)) => TaskOutcome::Failed(e.to_string()),
            Err(e) => TaskOutcome::Failed(format!("{} panicked: {}", self.label, e)),
        }
    }
}

/// Per-root write serialization for `rebuild` / `update_file`.
///
/// The indexer does not guarantee safe concurrent writers, so front-ends take
/// the root's lock before either operation.
#[derive(Debug, Clone, Default)]
pub struct RootLocks {
    locks: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl RootLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn for_root(&self, root: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        locks
            .entry(SessionRegistry::key(root))
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    pub async fn lock(&self, root: &str) -> OwnedMutexGuard<()> {
        self.for_root(root).lock_owned().await
    }

    pub fn try_lock(&self, root: &str) -> Option<OwnedMutexGuard<()>> {
        self.for_root(root).try_lock_owned().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GtagsError;
    use std::time::Duration;

    #[tokio::test]
    async fn test_completed_task() {
        let task = BackgroundTask::spawn("add", |_| Ok(2 + 2));
        match task.wait().await {
            TaskOutcome::Completed(v) => assert_eq!(v, 4),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failed_task() {
        let task: BackgroundTask<()> =
            BackgroundTask::spawn("fail", |_| Err(GtagsError::Parse("boom".into())));
        match task.wait().await {
            TaskOutcome::Failed(message) => assert!(message.contains("boom")),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cancelled_task() {
        let task = BackgroundTask::spawn("spin", |token: CancellationToken| {
            while !token.is_cancelled() {
                std::thread::sleep(Duration::from_millis(5));
            }
            Ok(())
        });
        assert!(!task.is_finished());
        task.cancel();
        assert!(matches!(task.wait().await, TaskOutcome::Cancelled));
    }

    #[tokio::test]
    async fn test_root_locks_serialize_same_root() {
        let locks = RootLocks::new();
        let guard = locks.lock("/proj").await;
        assert!(locks.try_lock("/proj/.").is_none());
        assert!(locks.try_lock("/other").is_some());
        drop(guard);
        assert!(locks.try_lock("/proj").is_some());
    }
}
