//! Named FIFO mutual exclusion for async tasks.
//!
//! `RequestSerializer` is a registry of named locks. Tasks acquired under the
//! same name run one at a time, in the order `acquire` was *called*; tasks
//! under different names are independent.
//!
//! Each lock name owns a queue of waiter tokens. A caller appends its token
//! synchronously inside `acquire`, then (unless it is first in line) awaits
//! the completion signal of its predecessor. The token is removed by a drop
//! guard, so the next waiter is signalled whether the task completes, returns
//! an error, panics or is dropped mid-flight.
//!
//! There is no timeout and no cancellation of a running task: a task that
//! never completes blocks every later task on its lock name.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::oneshot;

/// One queued caller.
#[derive(Debug)]
struct Waiter {
    token: u64,
    /// Fires when this waiter reaches the head of the queue.
    wake: Option<oneshot::Sender<()>>,
}

/// Per-name queue of waiters; the head holds the lock.
#[derive(Debug, Default)]
struct LockEntry {
    queue: VecDeque<Waiter>,
}

#[derive(Debug, Default)]
struct Registry {
    next_token: u64,
    locks: HashMap<String, LockEntry>,
}

/// Registry of named FIFO locks.
///
/// Cloning is cheap and yields a handle to the same registry.
///
/// # Example
///
/// ```rust,ignore
/// let serializer = RequestSerializer::new();
/// let first = serializer.acquire("execution", async { 1 });
/// let second = serializer.acquire("execution", async { 2 });
/// // `second` cannot start before `first` has finished.
/// assert_eq!(futures::join!(second, first), (2, 1));
/// ```
#[derive(Debug, Clone, Default)]
pub struct RequestSerializer {
    registry: Arc<Mutex<Registry>>,
}

impl RequestSerializer {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `task` under `lock_name` and returns a future yielding its output.
    ///
    /// The place in line is taken when this method is called, not when the
    /// returned future is first polled.
    pub fn acquire<F, T>(&self, lock_name: &str, task: F) -> impl Future<Output = T> + Send + 'static
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (guard, turn) = self.enqueue(lock_name);

        async move {
            let _guard = guard;
            if let Some(turn) = turn {
                // A dropped sender means the predecessor's guard already ran.
                let _ = turn.await;
            }
            task.await
        }
    }

    /// Number of lock names with at least one queued or running task.
    #[must_use]
    pub fn active_locks(&self) -> usize {
        lock_registry(&self.registry).locks.len()
    }

    /// Number of tasks queued or running under `lock_name`.
    #[must_use]
    pub fn queue_len(&self, lock_name: &str) -> usize {
        lock_registry(&self.registry)
            .locks
            .get(lock_name)
            .map_or(0, |entry| entry.queue.len())
    }

    fn enqueue(&self, lock_name: &str) -> (QueueGuard, Option<oneshot::Receiver<()>>) {
        let mut registry = lock_registry(&self.registry);
        let token = registry.next_token;
        registry.next_token += 1;

        let entry = registry.locks.entry(lock_name.to_string()).or_default();
        let turn = if entry.queue.is_empty() {
            entry.queue.push_back(Waiter { token, wake: None });
            None
        } else {
            let (wake, turn) = oneshot::channel();
            entry.queue.push_back(Waiter {
                token,
                wake: Some(wake),
            });
            Some(turn)
        };

        tracing::trace!(lock = lock_name, token, queued = entry.queue.len(), "lock requested");

        let guard = QueueGuard {
            registry: Arc::clone(&self.registry),
            lock_name: lock_name.to_string(),
            token,
        };
        (guard, turn)
    }
}

/// Removes its token on drop and hands the lock to the next waiter.
#[derive(Debug)]
struct QueueGuard {
    registry: Arc<Mutex<Registry>>,
    lock_name: String,
    token: u64,
}

impl Drop for QueueGuard {
    fn drop(&mut self) {
        let mut registry = lock_registry(&self.registry);
        let Some(entry) = registry.locks.get_mut(&self.lock_name) else {
            return;
        };

        let Some(position) = entry.queue.iter().position(|w| w.token == self.token) else {
            return;
        };
        entry.queue.remove(position);

        if position == 0 {
            if let Some(next) = entry.queue.front_mut() {
                if let Some(wake) = next.wake.take() {
                    let _ = wake.send(());
                }
            }
        }

        if entry.queue.is_empty() {
            registry.locks.remove(&self.lock_name);
        }

        tracing::trace!(lock = %self.lock_name, token = self.token, "lock released");
    }
}

/// Locks the registry, recovering from poisoning.
///
/// The registry is only mutated in short non-panicking sections, so a
/// poisoned guard still holds consistent data.
fn lock_registry(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    registry
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}
