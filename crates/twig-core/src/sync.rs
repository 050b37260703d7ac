//! Named locks and the bounded batch runner.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, ThreadId};

use dashmap::DashMap;

use crate::error::Result;

fn lock_state<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Reentrant mutual exclusion: the owning thread may re-acquire (a prompt
/// issued while resolving a token must not deadlock on itself).
#[derive(Default)]
pub struct NamedLock {
    state: Mutex<Option<(ThreadId, usize)>>,
    condvar: Condvar,
}

impl NamedLock {
    fn acquire(self: &Arc<Self>) -> NamedLockGuard {
        let me = thread::current().id();
        let mut state = lock_state(&self.state);
        loop {
            match state.as_mut() {
                None => {
                    *state = Some((me, 1));
                    break;
                }
                Some((owner, depth)) if *owner == me => {
                    *depth += 1;
                    break;
                }
                Some(_) => {
                    state = self.condvar.wait(state).unwrap_or_else(|p| p.into_inner());
                }
            }
        }
        NamedLockGuard(Arc::clone(self))
    }
}

pub struct NamedLockGuard(Arc<NamedLock>);

impl Drop for NamedLockGuard {
    fn drop(&mut self) {
        let mut state = lock_state(&self.0.state);
        if let Some((_, depth)) = state.as_mut() {
            *depth -= 1;
            if *depth == 0 {
                *state = None;
                self.0.condvar.notify_one();
            }
        }
    }
}

/// Map from lock name to lock. Same name serializes, different names don't.
#[derive(Default)]
pub struct LockManager {
    locks: DashMap<String, Arc<NamedLock>>,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&self, name: &str) -> NamedLockGuard {
        // Clone out of the map before blocking so the shard is not held.
        let lock = self
            .locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(NamedLock::default()))
            .clone();
        lock.acquire()
    }

    pub fn with_lock<R>(&self, name: &str, f: impl FnOnce() -> R) -> R {
        let _guard = self.lock(name);
        f()
    }
}

/// Run `f` over `items` in sequential batches of `batch_size`; members of a
/// batch run concurrently. Results keep input order. If any member of a batch
/// fails, its siblings still finish but no later batch starts.
pub fn run_in_batches<T, R, F>(items: &[T], batch_size: usize, f: F) -> Result<Vec<R>>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> Result<R> + Sync,
{
    let mut results = Vec::with_capacity(items.len());
    for chunk in items.chunks(batch_size.max(1)) {
        let outcomes: Vec<Result<R>> = thread::scope(|scope| {
            let handles: Vec<_> = chunk.iter().map(|item| scope.spawn(|| f(item))).collect();
            handles
                .into_iter()
                .map(|h| match h.join() {
                    Ok(r) => r,
                    Err(panic) => std::panic::resume_unwind(panic),
                })
                .collect()
        });
        let mut first_err = None;
        for outcome in outcomes {
            match outcome {
                Ok(r) => results.push(r),
                Err(e) => {
                    if first_err.is_none() {
                        first_err = Some(e);
                    }
                }
            }
        }
        if let Some(e) = first_err {
            return Err(e);
        }
    }
    Ok(results)
}

/// CPU-derived parallelism factor.
pub fn parallelism() -> usize {
    num_cpus::get().max(1)
}
