/// Fan-out/fan-in barrier that collects one keyed result per registered task
///
/// Every orchestrator registers a completion with [`FanIn::add`] before it
/// spawns a task, and each task reports exactly once with [`FanIn::done`].
/// [`FanIn::wait`] resolves when the two counts meet. The barrier has no
/// timeout of its own: a task that never reports blocks `wait` forever, so
/// every task must bound its own work.
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;

/// Cloneable handle to a shared barrier
pub struct FanIn<V> {
    inner: Arc<Inner<V>>,
}

struct Inner<V> {
    state: Mutex<State<V>>,
    complete: Notify,
}

struct State<V> {
    pending: usize,
    results: HashMap<String, V>,
}

impl<V> Clone for FanIn<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> Default for FanIn<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> FanIn<V> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    pending: 0,
                    results: HashMap::new(),
                }),
                complete: Notify::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<V>> {
        // A panic while holding this lock leaves the counters intact.
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register one expected completion. Call before spawning the task.
    pub fn add(&self) {
        self.lock().pending += 1;
    }

    /// Record one result and one completion
    pub fn done(&self, key: impl Into<String>, value: V) {
        let key = key.into();
        let mut state = self.lock();
        if state.pending == 0 {
            tracing::warn!(key = %key, "fan-in completion without matching add, ignored");
            return;
        }
        state.results.insert(key, value);
        state.pending -= 1;
        if state.pending == 0 {
            drop(state);
            self.inner.complete.notify_waiters();
        }
    }

    /// Number of registered tasks that have not reported yet
    pub fn pending(&self) -> usize {
        self.lock().pending
    }
}

impl<V: Clone> FanIn<V> {
    /// Wait until every registered task has reported and return all results
    pub async fn wait(&self) -> HashMap<String, V> {
        loop {
            // Created before the check so a notify in between is not missed.
            let notified = self.inner.complete.notified();
            {
                let state = self.lock();
                if state.pending == 0 {
                    return state.results.clone();
                }
            }
            notified.await;
        }
    }
}
