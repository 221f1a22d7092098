//! Runtime abstraction layer for async operations
//!
//! Background work (layer-name validation, thumbnail kick-off from styling)
//! is launched through [`spawn`] so callers never hold a tokio handle
//! themselves.

use crate::prelude::{Duration, Future, Pin};

/// A trait for spawning async tasks (object-safe version)
pub trait AsyncSpawner: Send + Sync + 'static {
    /// Spawn a future and return a handle to it
    fn spawn_boxed(
        &self,
        future: Pin<Box<dyn Future<Output = ()> + Send + 'static>>,
    ) -> Box<dyn AsyncHandle>;
}

/// Handle to a spawned async task
pub trait AsyncHandle: Send + Sync {
    /// Check if the task is finished
    fn is_finished(&self) -> bool;

    /// Cancel the task
    fn cancel(&self);
}

/// Convenience function for spawning with type safety
pub fn spawn<F>(future: F) -> Box<dyn AsyncHandle>
where
    F: Future<Output = ()> + Send + 'static,
{
    runtime().spawn_boxed(Box::pin(future))
}

/// Default spawner implementations
pub mod spawners {
    use super::*;
    use ::tokio::task::JoinHandle;

    /// Tokio-based async spawner
    pub struct TokioSpawner;

    impl AsyncSpawner for TokioSpawner {
        fn spawn_boxed(
            &self,
            future: Pin<Box<dyn Future<Output = ()> + Send + 'static>>,
        ) -> Box<dyn AsyncHandle> {
            match ::tokio::runtime::Handle::try_current() {
                Ok(handle) => Box::new(TokioHandle(handle.spawn(future))),
                Err(_) => {
                    log::warn!("spawn called outside a tokio runtime; task dropped");
                    Box::new(DetachedHandle)
                }
            }
        }
    }

    struct TokioHandle(JoinHandle<()>);

    impl AsyncHandle for TokioHandle {
        fn is_finished(&self) -> bool {
            self.0.is_finished()
        }

        fn cancel(&self) {
            self.0.abort();
        }
    }

    /// Stand-in for a task that never ran.
    struct DetachedHandle;

    impl AsyncHandle for DetachedHandle {
        fn is_finished(&self) -> bool {
            true
        }

        fn cancel(&self) {}
    }
}

/// Unified async utilities
pub mod async_utils {
    use super::*;

    /// Async delay on the tokio timer
    pub async fn async_delay(duration: Duration) {
        ::tokio::time::sleep(duration).await;
    }

    /// Runs `future` under a deadline. The future is dropped when the deadline
    /// elapses, which cancels any transfer it owns.
    pub async fn with_deadline<F, T>(deadline: Duration, future: F) -> crate::Result<T>
    where
        F: Future<Output = crate::Result<T>>,
    {
        match ::tokio::time::timeout(deadline, future).await {
            Ok(result) => result,
            Err(_) => Err(crate::Error::Timeout(deadline)),
        }
    }
}

/// Global runtime instance
static RUNTIME: std::sync::OnceLock<Box<dyn AsyncSpawner>> = std::sync::OnceLock::new();

/// Initialize the runtime with a specific spawner
pub fn init_runtime(spawner: Box<dyn AsyncSpawner>) {
    let _ = RUNTIME.set(spawner);
}

/// Get the global runtime spawner
pub fn runtime() -> &'static dyn AsyncSpawner {
    RUNTIME
        .get_or_init(|| Box::new(spawners::TokioSpawner))
        .as_ref()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[::tokio::test(start_paused = true)]
    async fn test_tokio_spawner() {
        let handle = spawn(async {
            ::tokio::time::sleep(Duration::from_millis(10)).await;
        });

        assert!(!handle.is_finished());

        ::tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(handle.is_finished());
    }

    #[::tokio::test(start_paused = true)]
    async fn test_deadline_elapses() {
        let result = async_utils::with_deadline(Duration::from_secs(5), async {
            ::tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(1)
        })
        .await;
        assert!(matches!(result, Err(crate::Error::Timeout(d)) if d == Duration::from_secs(5)));
    }

    #[test]
    fn test_spawn_outside_runtime_is_detached() {
        let handle = spawn(async {});
        assert!(handle.is_finished());
    }
}
