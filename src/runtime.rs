//! Runtime abstraction layer for tile decoding
//!
//! Decodes run on whatever executor the embedder provides through
//! [`AsyncSpawner`]. The render thread never awaits them; it only asks the
//! returned [`AsyncHandle`] whether the task finished.

use crate::prelude::{Arc, Future, Mutex, Pin};
use futures::task::{noop_waker_ref, Context, Poll};
use std::sync::atomic::{AtomicBool, Ordering};

/// A boxed, sendable unit of background work
pub type BoxedTask = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// A trait for spawning async tasks (object-safe version)
pub trait AsyncSpawner: Send + Sync + 'static {
    /// Spawn a future and return a handle to it
    fn spawn_boxed(&self, future: BoxedTask) -> Box<dyn AsyncHandle>;
}

/// Handle to a spawned async task
pub trait AsyncHandle: Send + Sync {
    /// Check if the task is finished
    fn is_finished(&self) -> bool;

    /// Cancel the task
    fn cancel(&self);
}

/// Spawns on the global runtime
pub fn spawn<F>(future: F) -> Box<dyn AsyncHandle>
where
    F: Future<Output = ()> + Send + 'static,
{
    log::trace!("runtime::spawn");
    runtime().spawn_boxed(Box::pin(future))
}

/// Default spawner implementations
pub mod spawners {
    use super::*;

    #[cfg(feature = "tokio-runtime")]
    pub mod tokio_impl {
        use super::*;
        use ::tokio::runtime::{Builder, Handle, Runtime};
        use ::tokio::task::JoinHandle;
        use once_cell::sync::OnceCell;

        /// Worker pool used when the caller is not inside a tokio runtime
        static FALLBACK: OnceCell<Runtime> = OnceCell::new();

        fn fallback_handle() -> Option<Handle> {
            FALLBACK
                .get_or_try_init(|| {
                    Builder::new_multi_thread()
                        .thread_name("quadtile-decode")
                        .enable_all()
                        .build()
                })
                .map(|rt| rt.handle().clone())
                .map_err(|e| log::error!("failed to start decode runtime: {}", e))
                .ok()
        }

        /// Tokio-based async spawner
        #[derive(Debug, Clone, Default)]
        pub struct TokioSpawner {
            handle: Option<Handle>,
        }

        impl TokioSpawner {
            /// Spawns onto a specific runtime instead of the ambient one
            pub fn with_handle(handle: Handle) -> Self {
                Self {
                    handle: Some(handle),
                }
            }

            fn resolve_handle(&self) -> Option<Handle> {
                self.handle
                    .clone()
                    .or_else(|| Handle::try_current().ok())
                    .or_else(fallback_handle)
            }
        }

        impl AsyncSpawner for TokioSpawner {
            fn spawn_boxed(&self, future: BoxedTask) -> Box<dyn AsyncHandle> {
                match self.resolve_handle() {
                    Some(handle) => Box::new(TokioHandle(handle.spawn(future))),
                    None => {
                        // Without any runtime the task is dropped; the load
                        // surfaces as unresolved once its slot is polled.
                        Box::new(FinishedHandle)
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

        struct FinishedHandle;

        impl AsyncHandle for FinishedHandle {
            fn is_finished(&self) -> bool {
                true
            }

            fn cancel(&self) {}
        }
    }

    struct ManualTask {
        future: BoxedTask,
        state: Arc<TaskState>,
    }

    #[derive(Default)]
    struct TaskState {
        finished: AtomicBool,
        canceled: AtomicBool,
    }

    /// A spawner that only makes progress when [`ManualSpawner::run_until_stalled`]
    /// is called. Useful for embedders that own their own frame loop and for
    /// deterministic tests.
    #[derive(Clone, Default)]
    pub struct ManualSpawner {
        queue: Arc<Mutex<Vec<ManualTask>>>,
    }

    impl ManualSpawner {
        pub fn new() -> Self {
            Self::default()
        }

        /// Number of tasks that have not finished yet
        pub fn pending(&self) -> usize {
            self.queue.lock().map(|q| q.len()).unwrap_or(0)
        }

        /// Polls every queued task once with a no-op waker, repeating while
        /// any task completes. Returns the number of tasks that finished.
        pub fn run_until_stalled(&self) -> usize {
            let mut completed = 0;
            loop {
                // Tasks are taken out of the queue while polling so a task
                // may spawn more work without deadlocking.
                let mut tasks = match self.queue.lock() {
                    Ok(mut q) => std::mem::take(&mut *q),
                    Err(_) => return completed,
                };
                if tasks.is_empty() {
                    return completed;
                }

                let mut cx = Context::from_waker(noop_waker_ref());
                let before = completed;
                tasks.retain_mut(|task| {
                    if task.state.canceled.load(Ordering::Acquire) {
                        task.state.finished.store(true, Ordering::Release);
                        return false;
                    }
                    match task.future.as_mut().poll(&mut cx) {
                        Poll::Ready(()) => {
                            task.state.finished.store(true, Ordering::Release);
                            completed += 1;
                            false
                        }
                        Poll::Pending => true,
                    }
                });

                if let Ok(mut q) = self.queue.lock() {
                    tasks.append(&mut q);
                    *q = tasks;
                }
                if completed == before {
                    return completed;
                }
            }
        }
    }

    impl AsyncSpawner for ManualSpawner {
        fn spawn_boxed(&self, future: BoxedTask) -> Box<dyn AsyncHandle> {
            let state = Arc::new(TaskState::default());
            if let Ok(mut q) = self.queue.lock() {
                q.push(ManualTask {
                    future,
                    state: state.clone(),
                });
            }
            Box::new(ManualHandle(state))
        }
    }

    struct ManualHandle(Arc<TaskState>);

    impl AsyncHandle for ManualHandle {
        fn is_finished(&self) -> bool {
            self.0.finished.load(Ordering::Acquire)
        }

        fn cancel(&self) {
            self.0.canceled.store(true, Ordering::Release);
        }
    }
}

/// Global runtime instance
static RUNTIME: std::sync::OnceLock<Arc<dyn AsyncSpawner>> = std::sync::OnceLock::new();

/// Initialize the runtime with a specific spawner. Has no effect once the
/// global runtime was already used.
pub fn init_runtime(spawner: Arc<dyn AsyncSpawner>) {
    if RUNTIME.set(spawner).is_err() {
        log::warn!("init_runtime called after the global runtime was initialised");
    }
}

/// Get the global runtime spawner
pub fn runtime() -> Arc<dyn AsyncSpawner> {
    RUNTIME
        .get_or_init(|| {
            #[cfg(feature = "tokio-runtime")]
            {
                Arc::new(spawners::tokio_impl::TokioSpawner::default())
            }

            #[cfg(not(feature = "tokio-runtime"))]
            {
                log::warn!(
                    "no async runtime feature enabled; tile loads progress only when the \
                     global ManualSpawner is driven"
                );
                Arc::new(spawners::ManualSpawner::new())
            }
        })
        .clone()
}

#[cfg(test)]
mod tests {
    use super::spawners::ManualSpawner;
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_manual_spawner_runs_on_demand() {
        let spawner = ManualSpawner::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let handle = spawner.spawn_boxed(Box::pin(async move {
            h.fetch_add(1, Ordering::SeqCst);
        }));

        assert!(!handle.is_finished());
        assert_eq!(spawner.pending(), 1);
        assert_eq!(spawner.run_until_stalled(), 1);
        assert!(handle.is_finished());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(spawner.pending(), 0);
    }

    #[test]
    fn test_manual_spawner_cancel() {
        let spawner = ManualSpawner::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let handle = spawner.spawn_boxed(Box::pin(async move {
            h.fetch_add(1, Ordering::SeqCst);
        }));
        handle.cancel();
        assert_eq!(spawner.run_until_stalled(), 0);
        assert!(handle.is_finished());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_manual_spawner_keeps_pending_tasks() {
        let spawner = ManualSpawner::new();
        let handle = spawner.spawn_boxed(Box::pin(futures::future::pending::<()>()));
        assert_eq!(spawner.run_until_stalled(), 0);
        assert!(!handle.is_finished());
        assert_eq!(spawner.pending(), 1);
    }

    #[cfg(feature = "tokio-runtime")]
    #[::tokio::test]
    async fn test_tokio_spawner() {
        let spawner = spawners::tokio_impl::TokioSpawner::default();
        let handle = spawner.spawn_boxed(Box::pin(async {
            ::tokio::time::sleep(::tokio::time::Duration::from_millis(10)).await;
        }));

        assert!(!handle.is_finished());

        ::tokio::time::sleep(::tokio::time::Duration::from_millis(50)).await;
        assert!(handle.is_finished());
    }
}
