//! Bounded worker pool.
//!
//! At most `concurrency` tasks run at once. A task is only started after a
//! permit is acquired and the cancel token is re-checked, so nothing new
//! starts once the token is raised.
use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use folio_core::CancelToken;

pub struct WorkerPool<T> {
    permits: Arc<Semaphore>,
    cancel: CancelToken,
    running: JoinSet<T>,
    started: usize,
}

impl<T: Send + 'static> WorkerPool<T> {
    pub fn new(concurrency: usize, cancel: CancelToken) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
            cancel,
            running: JoinSet::new(),
            started: 0,
        }
    }

    /// Wait for a free worker and start `task` on it.
    ///
    /// Returns `false` without starting anything when the run is cancelled
    /// before a worker frees up.
    pub async fn submit<F>(&mut self, task: F) -> bool
    where
        F: Future<Output = T> + Send + 'static,
    {
        let permit = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return false,
            permit = Arc::clone(&self.permits).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return false,
            },
        };
        if self.cancel.is_cancelled() {
            return false;
        }
        self.started += 1;
        self.running.spawn(async move {
            let _permit = permit;
            task.await
        });
        true
    }

    /// Tasks started so far.
    pub fn started(&self) -> usize {
        self.started
    }

    /// Wait for every started task. A panicking task brings the caller down.
    pub async fn join(mut self) -> Vec<T> {
        let mut out = Vec::with_capacity(self.running.len());
        while let Some(joined) = self.running.join_next().await {
            match joined {
                Ok(value) => out.push(value),
                Err(e) => resume(e),
            }
        }
        out
    }
}

fn resume<T>(err: tokio::task::JoinError) -> T {
    match err.try_into_panic() {
        Ok(payload) => std::panic::resume_unwind(payload),
        Err(e) => panic!("worker task aborted: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn cancelled_pool_refuses_work() {
        let cancel = CancelToken::new();
        let mut pool = WorkerPool::new(2, cancel.clone());
        assert!(pool.submit(async { 1 }).await);
        cancel.cancel();
        assert!(!pool.submit(async { 2 }).await);
        assert_eq!(pool.started(), 1);
        assert_eq!(pool.join().await, vec![1]);
    }

    #[tokio::test]
    async fn submit_waits_for_a_free_worker() {
        let cancel = CancelToken::new();
        let mut pool = WorkerPool::new(1, cancel.clone());
        let done = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let done = done.clone();
            pool.submit(async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                done.fetch_add(1, Ordering::SeqCst);
            })
            .await;
        }
        // The third submit only returned once the first two had finished.
        assert!(done.load(Ordering::SeqCst) >= 2);
        pool.join().await;
        assert_eq!(done.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    #[should_panic(expected = "boom")]
    async fn task_panics_propagate() {
        let mut pool = WorkerPool::<()>::new(1, CancelToken::new());
        pool.submit(async { panic!("boom") }).await;
        pool.join().await;
    }
}
