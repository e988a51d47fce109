//! Work serializer: runs store operations on runtime worker tasks instead of the caller's.

use std::future::Future;
use std::panic::{self, AssertUnwindSafe};

use tokio::runtime::Handle;

use crate::error::{Result, StorageError};

/// Submits operations to a tokio runtime.
///
/// Tasks may run in parallel on a multi-thread runtime; ordering between writes
/// to the same message is provided by [`crate::KeyedLocks`], not by this type.
#[derive(Clone, Debug)]
pub struct WorkSerializer {
    handle: Handle,
}

impl WorkSerializer {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Uses the runtime of the calling context. Panics outside a tokio runtime,
    /// like [`Handle::current`].
    pub fn current() -> Self {
        Self::new(Handle::current())
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Runs `task` on a worker and waits for its result. A panic inside the task
    /// is reported as [`StorageError::Worker`].
    pub async fn submit<F, T>(&self, task: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        self.handle
            .spawn(task)
            .await
            .map_err(|e| StorageError::Worker(e.to_string()))?
    }

    /// Runs `task` on a worker and blocks the calling thread until it finishes.
    ///
    /// For plain threads and runtime blocking threads (`spawn_blocking`). A thread
    /// that is driving async tasks gets [`StorageError::Worker`] instead.
    pub fn block_on<F, T>(&self, task: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let submitted = self.submit(task);
        if Handle::try_current().is_err() {
            return self.handle.block_on(submitted);
        }
        // Handle::block_on panics before polling when the thread is inside async
        // execution, so nothing has been spawned when this is caught.
        panic::catch_unwind(AssertUnwindSafe(|| self.handle.block_on(submitted))).unwrap_or_else(
            |_| {
                Err(StorageError::Worker(
                    "blocking store call made from inside an async runtime".to_string(),
                ))
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_submit_returns_task_result() {
        let serializer = WorkSerializer::current();
        let value = serializer.submit(async { Ok(21 * 2) }).await.unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_submit_reports_panics_as_worker_error() {
        let serializer = WorkSerializer::current();
        let result: Result<()> = serializer
            .submit(async {
                if true {
                    panic!("boom");
                }
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(StorageError::Worker(_))));
    }

    #[tokio::test]
    async fn test_block_on_inside_runtime_is_rejected() {
        let serializer = WorkSerializer::current();
        let result = serializer.block_on(async { Ok(1) });
        assert!(matches!(result, Err(StorageError::Worker(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_block_on_from_spawn_blocking_thread() {
        let serializer = WorkSerializer::current();
        let value = tokio::task::spawn_blocking(move || serializer.block_on(async { Ok(7) }))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn test_block_on_from_plain_thread() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let serializer = WorkSerializer::new(runtime.handle().clone());
        let value = serializer
            .block_on(async { Ok(std::thread::current().name().map(str::to_string)) })
            .unwrap();
        // ran on a runtime worker, not the test thread
        assert_ne!(value.as_deref(), std::thread::current().name());
    }
}
