//! Cancellable delayed callbacks.
//!
//! Each armed alarm is a spawned tokio task that sleeps and then runs its
//! future. Disarming aborts the task. Callbacks that mutate shared state must
//! take the owning lock themselves; disarming under that same lock guarantees
//! a disarmed callback never observes the state change that disarmed it.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::time::Duration;
use tokio::task::AbortHandle;

/// A set of keyed alarms. At most one alarm per key; re-arming replaces.
pub struct Alarms<K> {
    armed: HashMap<K, (u64, AbortHandle)>,
    generation: u64,
}

impl<K: Eq + Hash> Alarms<K> {
    pub fn new() -> Self {
        Self {
            armed: HashMap::new(),
            generation: 0,
        }
    }

    /// Run the future built by `callback` after `delay`, replacing any alarm
    /// under `key`.
    ///
    /// `callback` receives the alarm's generation, to be handed back to
    /// [`Alarms::fired`]. Must be called from within a tokio runtime.
    pub fn arm<C, F>(&mut self, key: K, delay: Duration, callback: C) -> u64
    where
        C: FnOnce(u64) -> F,
        F: Future<Output = ()> + Send + 'static,
    {
        self.generation += 1;
        let callback = callback(self.generation);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            callback.await;
        });
        if let Some((_, previous)) = self.armed.insert(key, (self.generation, handle.abort_handle())) {
            previous.abort();
        }
        self.generation
    }

    /// Cancel the alarm under `key`. Returns whether one was armed.
    pub fn disarm(&mut self, key: &K) -> bool {
        match self.armed.remove(key) {
            Some((_, handle)) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Forget an alarm whose callback is running. A newer alarm under the
    /// same key is left alone.
    pub fn fired(&mut self, key: &K, generation: u64) {
        if self.armed.get(key).is_some_and(|(g, _)| *g == generation) {
            self.armed.remove(key);
        }
    }

    pub fn is_armed(&self, key: &K) -> bool {
        self.armed.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.armed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.armed.is_empty()
    }

    /// Cancel every alarm.
    pub fn clear(&mut self) {
        for (_, (_, handle)) in self.armed.drain() {
            handle.abort();
        }
    }
}

impl<K: Eq + Hash> Default for Alarms<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> Drop for Alarms<K> {
    fn drop(&mut self) {
        for (_, handle) in self.armed.values() {
            handle.abort();
        }
    }
}
