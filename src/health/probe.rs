/// Deadline-bounded probes
///
/// A probe runs its remote call on a detached task and races it against a
/// timer. When the timer wins the probe reports [`ProbeResult::Timeout`]
/// and walks away; the call keeps running until it ends on its own and its
/// output is dropped with the task's join handle. Only the probe that
/// started a call ever sees that call's output.
use super::ProbeResult;
use crate::error::RemoteError;
use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{Mutex as SlotLock, OwnedMutexGuard};

type Slot = Arc<SlotLock<()>>;
type Registry = Mutex<HashMap<String, Slot>>;

/// Registry of per-target call slots, at most one running call per key.
///
/// A probe for a target whose previous call was abandoned but has not
/// finished waits, within its own deadline, for that call to end and then
/// starts a fresh one. A hung endpoint therefore holds a single background
/// call no matter how many cycles time out against it, and a late answer
/// is never reported as a later probe's result.
pub struct Inflight<T> {
    slots: Arc<Registry>,
    _result: PhantomData<fn() -> T>,
}

impl<T> Clone for Inflight<T> {
    fn clone(&self) -> Self {
        Self {
            slots: Arc::clone(&self.slots),
            _result: PhantomData,
        }
    }
}

impl<T: Send + 'static> Default for Inflight<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn lock(slots: &Registry) -> MutexGuard<'_, HashMap<String, Slot>> {
    slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Drop `key`'s slot once nothing but the registry refers to it
fn release(slots: &Registry, key: &str) {
    let mut slots = lock(slots);
    if slots.get(key).is_some_and(|slot| Arc::strong_count(slot) == 1) {
        slots.remove(key);
    }
}

/// Holds a key's slot while its call runs, including when the call panics
struct Running {
    guard: Option<OwnedMutexGuard<()>>,
    slots: Arc<Registry>,
    key: String,
}

impl Drop for Running {
    fn drop(&mut self) {
        self.guard.take();
        release(&self.slots, &self.key);
    }
}

impl<T: Send + 'static> Inflight<T> {
    pub fn new() -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
            _result: PhantomData,
        }
    }

    /// Number of calls currently running in the background
    pub fn len(&self) -> usize {
        lock(&self.slots)
            .values()
            .filter(|slot| slot.try_lock().is_err())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Probe `key`, starting the call with `start` once no earlier call
    /// for the same key is running. Waiting for the slot counts against
    /// `deadline`; if the deadline fires first no call is started.
    pub async fn probe<F, Fut>(&self, key: &str, deadline: Duration, start: F) -> ProbeResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>> + Send + 'static,
    {
        let slot = {
            let mut slots = lock(&self.slots);
            Arc::clone(slots.entry(key.to_string()).or_default())
        };

        let attempt = async {
            let guard = Arc::clone(&slot).lock_owned().await;
            let running = Running {
                guard: Some(guard),
                slots: Arc::clone(&self.slots),
                key: key.to_string(),
            };
            let call = start();
            tokio::spawn(async move {
                let _running = running;
                call.await
            })
            .await
        };

        let outcome = tokio::time::timeout(deadline, attempt).await;
        drop(slot);
        release(&self.slots, key);

        match outcome {
            Ok(Ok(result)) => result.into(),
            Ok(Err(join_err)) => {
                tracing::warn!(target_key = %key, error = %join_err, "probe call failed");
                ProbeResult::Error(RemoteError::new(format!("probe call failed: {}", join_err)))
            }
            Err(_) => {
                tracing::debug!(target_key = %key, ?deadline, "probe deadline exceeded, call abandoned");
                ProbeResult::Timeout
            }
        }
    }
}

/// Run `call` on a detached task and wait for it at most `deadline`.
///
/// Used for one-off calls that need no per-target slot.
pub async fn probe_with_deadline<T, Fut>(deadline: Duration, call: Fut) -> ProbeResult<T>
where
    T: Send + 'static,
    Fut: Future<Output = Result<T, RemoteError>> + Send + 'static,
{
    let handle = tokio::spawn(call);
    match tokio::time::timeout(deadline, handle).await {
        Ok(Ok(result)) => result.into(),
        Ok(Err(join_err)) => ProbeResult::Error(RemoteError::new(format!(
            "probe task failed: {}",
            join_err
        ))),
        Err(_) => ProbeResult::Timeout,
    }
}
