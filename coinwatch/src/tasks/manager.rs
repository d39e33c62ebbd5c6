//! TaskManager implementation.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use coinwatch_core::QueryKey;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info_span, warn};

#[cfg(feature = "metrics")]
use crate::metrics::{BACKGROUND_TASKS_DEDUPLICATED, BACKGROUND_TASKS_SPAWNED, BACKGROUND_TASKS_TIMEOUT};

use super::policy::{TaskConfig, TimeoutPolicy};

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug)]
struct TaskManagerInner {
    config: TaskConfig,
    tasks: DashMap<QueryKey, JoinHandle<()>>,
}

/// Spawns and tracks background tasks.
#[derive(Debug, Clone)]
pub struct TaskManager {
    inner: Arc<TaskManagerInner>,
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new(TaskConfig::default())
    }
}

impl TaskManager {
    pub fn new(config: TaskConfig) -> Self {
        TaskManager {
            inner: Arc::new(TaskManagerInner {
                config,
                tasks: DashMap::new(),
            }),
        }
    }

    /// Spawns `task` under `key`.
    ///
    /// Returns `false` without spawning when deduplication is on and a task
    /// for the same key is still running.
    pub fn spawn_with_key<F>(&self, key: QueryKey, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let dedup = self.inner.config.deduplicate;

        match self.inner.tasks.entry(key.clone()) {
            Entry::Occupied(mut entry) => {
                if dedup && !entry.get().is_finished() {
                    debug!(%key, "task already running");
                    #[cfg(feature = "metrics")]
                    metrics::counter!(*BACKGROUND_TASKS_DEDUPLICATED, "kind" => key.kind().as_str())
                        .increment(1);
                    return false;
                }
                entry.insert(self.spawn_inner(key, task));
            }
            Entry::Vacant(entry) => {
                entry.insert(self.spawn_inner(key, task));
            }
        }
        true
    }

    pub fn is_running(&self, key: &QueryKey) -> bool {
        self.inner
            .tasks
            .get(key)
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn active_task_count(&self) -> usize {
        self.inner
            .tasks
            .iter()
            .filter(|entry| !entry.is_finished())
            .count()
    }

    /// Aborts the task under `key`. Returns `false` if there was none.
    pub fn cancel(&self, key: &QueryKey) -> bool {
        match self.inner.tasks.remove(key) {
            Some((_, handle)) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) {
        self.inner.tasks.retain(|_, handle| {
            handle.abort();
            false
        });
    }

    /// Waits until every tracked task has finished.
    pub async fn wait_all(&self) {
        loop {
            self.inner.tasks.retain(|_, handle| !handle.is_finished());
            if self.inner.tasks.is_empty() {
                break;
            }
            tokio::time::sleep(WAIT_POLL_INTERVAL).await;
        }
    }

    /// [`wait_all`](Self::wait_all) bounded by `timeout`. Returns `false` on
    /// timeout.
    pub async fn wait_all_timeout(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.wait_all()).await.is_ok()
    }

    fn spawn_inner<F>(&self, key: QueryKey, task: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let inner = self.inner.clone();
        let timeout_policy = self.inner.config.timeout_policy;
        let span = info_span!("background_task", kind = key.kind().as_str(), %key);

        #[cfg(feature = "metrics")]
        metrics::counter!(*BACKGROUND_TASKS_SPAWNED, "kind" => key.kind().as_str()).increment(1);

        tokio::spawn(
            async move {
                let start = Instant::now();
                match timeout_policy {
                    TimeoutPolicy::None => task.await,
                    TimeoutPolicy::Cancel(limit) => {
                        if tokio::time::timeout(limit, task).await.is_err() {
                            warn!(%key, "background task cancelled after timeout");
                            #[cfg(feature = "metrics")]
                            metrics::counter!(*BACKGROUND_TASKS_TIMEOUT, "kind" => key.kind().as_str())
                                .increment(1);
                        }
                    }
                    TimeoutPolicy::Warn(limit) => {
                        task.await;
                        let elapsed = start.elapsed();
                        if elapsed > limit {
                            warn!(
                                %key,
                                elapsed_ms = elapsed.as_millis(),
                                threshold_ms = limit.as_millis(),
                                "background task exceeded its time limit"
                            );
                        }
                    }
                }
                debug!(elapsed_ms = start.elapsed().as_millis(), "background task finished");
                inner.tasks.remove(&key);
            }
            .instrument(span),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn query_tasks_are_deduplicated() {
        let tasks = TaskManager::default();
        let key = QueryKey::list(2);
        let (release, wait) = tokio::sync::oneshot::channel::<()>();

        assert!(tasks.spawn_with_key(key.clone(), async move {
            let _ = wait.await;
        }));
        assert!(!tasks.spawn_with_key(key.clone(), async {}));
        assert!(tasks.is_running(&key));

        release.send(()).unwrap();
        tasks.wait_all().await;
        assert_eq!(tasks.active_task_count(), 0);
        assert!(tasks.spawn_with_key(key, async {}));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_policy_aborts_slow_tasks() {
        let tasks = TaskManager::new(TaskConfig::default().timeout(Duration::from_secs(1)));
        let finished = Arc::new(AtomicUsize::new(0));
        let flag = finished.clone();
        tasks.spawn_with_key(QueryKey::detail("btc"), async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            flag.fetch_add(1, Ordering::SeqCst);
        });

        assert!(tasks.wait_all_timeout(Duration::from_secs(2)).await);
        assert_eq!(finished.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancel_removes_task() {
        let tasks = TaskManager::default();
        let key = QueryKey::search("eth");
        assert!(tasks.spawn_with_key(key.clone(), std::future::pending::<()>()));
        assert!(tasks.cancel(&key));
        assert!(!tasks.cancel(&key));
        tasks.cancel_all();
        assert_eq!(tasks.active_task_count(), 0);
    }
}
