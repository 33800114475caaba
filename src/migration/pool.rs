// SPDX-License-Identifier: Apache-2.0

//! Per-migration worker pool.
//!
//! A fixed number of permits bounds how many tasks run at once. The pool is
//! created for one migration and shut down with it; shutting down cancels
//! every task still running.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::{Id, JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

pub struct TaskPool<T> {
    /// `None` outputs belong to tasks cancelled before they finished.
    tasks: JoinSet<Option<T>>,
    names: HashMap<Id, &'static str>,
    permits: Arc<Semaphore>,
    cancel: CancellationToken,
}

impl<T: Send + 'static> TaskPool<T> {
    pub fn new(size: usize) -> Self {
        Self {
            tasks: JoinSet::new(),
            names: HashMap::new(),
            permits: Arc::new(Semaphore::new(size.max(1))),
            cancel: CancellationToken::new(),
        }
    }

    pub fn spawn<F>(&mut self, name: &'static str, task: F)
    where
        F: Future<Output = T> + Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        let cancel = self.cancel.clone();
        let handle = self.tasks.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return None;
            };
            tokio::select! {
                _ = cancel.cancelled() => None,
                output = task => Some(output),
            }
        });
        self.names.insert(handle.id(), name);
    }

    /// Next finished task with its name, or `None` once every task has been
    /// joined.
    pub async fn join_next(&mut self) -> Option<(&'static str, Result<Option<T>, JoinError>)> {
        let (id, joined) = match self.tasks.join_next_with_id().await? {
            Ok((id, output)) => (id, Ok(output)),
            Err(err) => (err.id(), Err(err)),
        };
        let name = self.names.remove(&id).unwrap_or("unnamed");
        Some((name, joined))
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Cancels outstanding tasks and waits for them to stop.
    pub async fn shutdown(&mut self) {
        self.cancel.cancel();
        self.permits.close();
        self.tasks.shutdown().await;
        self.names.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_runs_tasks_in_parallel() {
        let mut pool = TaskPool::new(2);
        let (tx, rx) = tokio::sync::oneshot::channel::<u32>();
        pool.spawn("receiver", async move { rx.await.unwrap_or(0) });
        pool.spawn("sender", async move {
            let _ = tx.send(7);
            1
        });

        let mut outputs = Vec::new();
        while let Some((name, joined)) = pool.join_next().await {
            outputs.push((name, joined.unwrap()));
        }
        outputs.sort();
        assert_eq!(outputs, vec![("receiver", Some(7)), ("sender", Some(1))]);
    }

    #[tokio::test]
    async fn test_panics_keep_the_task_name() {
        let mut pool: TaskPool<u32> = TaskPool::new(1);
        pool.spawn("doomed", async { Option::<u32>::None.expect("boom") });
        let (name, joined) = pool.join_next().await.unwrap();
        assert_eq!(name, "doomed");
        assert!(joined.unwrap_err().is_panic());
    }

    #[tokio::test]
    async fn test_shutdown_cancels_pending_tasks() {
        let mut pool: TaskPool<()> = TaskPool::new(2);
        pool.spawn("sleeper", async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });
        assert_eq!(pool.len(), 1);
        pool.shutdown().await;
        assert!(pool.is_empty());
    }
}
