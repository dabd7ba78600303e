//! The de-duplicating, rate-limited work queue described in spec.md §9
//! Design Notes: "a mutex-guarded hash set of dirty keys paired with a FIFO
//! of ready keys and a per-key processing flag; workers move keys between
//! sets atomically."

use std::collections::{HashSet, VecDeque};
use std::hash::Hash;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::Notify;

struct Inner<K> {
    /// Keys waiting to be picked up by a worker, in FIFO order.
    ready: VecDeque<K>,
    /// Keys currently present in `ready` (O(1) membership check to avoid
    /// double-queueing the same key).
    queued: HashSet<K>,
    /// Keys a worker currently holds (between `get` and `done`).
    processing: HashSet<K>,
    /// Keys that were `add`-ed while already `processing`; re-queued as soon
    /// as the in-flight run completes instead of being dropped.
    dirty: HashSet<K>,
    shutting_down: bool,
}

/// A bounded-duplication, per-key-serialising work queue. Holds at most one
/// entry per key in the ready FIFO and guarantees at most one concurrent
/// worker per key.
pub struct WorkQueue<K> {
    inner: Mutex<Inner<K>>,
    notify: Notify,
}

impl<K: Eq + Hash + Clone + Send + 'static> WorkQueue<K> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                ready: VecDeque::new(),
                queued: HashSet::new(),
                processing: HashSet::new(),
                dirty: HashSet::new(),
                shutting_down: false,
            }),
            notify: Notify::new(),
        }
    }

    /// Enqueue `key`. If it is already in flight, mark it dirty so it is
    /// re-run once the current execution finishes rather than being queued
    /// a second time; if it is already waiting in the FIFO, this is a no-op.
    pub fn add(&self, key: K) {
        let mut inner = self.inner.lock().unwrap();
        if inner.processing.contains(&key) {
            inner.dirty.insert(key);
            return;
        }
        if inner.queued.insert(key.clone()) {
            inner.ready.push_back(key);
        }
        drop(inner);
        self.notify.notify_one();
    }

    /// Enqueue `key` after `delay` — used for exponential backoff on
    /// handler error. Spawns a timer task; does not block the caller.
    pub fn add_after(self: &std::sync::Arc<Self>, key: K, delay: Duration)
    where
        K: 'static,
    {
        let queue = std::sync::Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(key);
        });
    }

    /// Block until a key is ready, or return `None` once shut down with an
    /// empty queue. Marks the returned key as `processing`.
    pub async fn get(&self) -> Option<K> {
        loop {
            {
                let mut inner = self.inner.lock().unwrap();
                if let Some(key) = inner.ready.pop_front() {
                    inner.queued.remove(&key);
                    inner.processing.insert(key.clone());
                    return Some(key);
                }
                if inner.shutting_down {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }

    /// Mark `key`'s current run complete. If it was marked dirty while
    /// processing, re-queues it immediately.
    pub fn done(&self, key: &K) {
        let mut inner = self.inner.lock().unwrap();
        inner.processing.remove(key);
        let redo = inner.dirty.remove(key);
        drop(inner);
        if redo {
            self.add(key.clone());
        }
    }

    pub fn shutdown(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.shutting_down = true;
        drop(inner);
        self.notify.notify_waiters();
    }
}

impl<K: Eq + Hash + Clone + Send + 'static> Default for WorkQueue<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// `min(1s * 2^n, 5min)` backoff, per spec.md §4.1.
pub fn backoff_for_attempt(attempt: u32) -> Duration {
    let capped_attempt = attempt.min(16); // 2^16s already far past the 5min cap
    let secs = 1u64.saturating_mul(1u64 << capped_attempt);
    Duration::from_secs(secs.min(300))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn backoff_caps_at_five_minutes() {
        assert_eq!(backoff_for_attempt(0), Duration::from_secs(1));
        assert_eq!(backoff_for_attempt(1), Duration::from_secs(2));
        assert_eq!(backoff_for_attempt(8), Duration::from_secs(256));
        assert_eq!(backoff_for_attempt(9), Duration::from_secs(300));
        assert_eq!(backoff_for_attempt(30), Duration::from_secs(300));
    }

    #[tokio::test]
    async fn same_key_is_not_queued_twice() {
        let queue: Arc<WorkQueue<&'static str>> = Arc::new(WorkQueue::new());
        queue.add("a");
        queue.add("a");
        let first = queue.get().await.unwrap();
        assert_eq!(first, "a");
        queue.done(&first);

        // only one "a" was ever queued; queue should now be empty until
        // something re-adds it.
        let queue2 = Arc::clone(&queue);
        queue2.shutdown();
        assert!(queue.get().await.is_none());
    }

    #[tokio::test]
    async fn re_add_while_processing_reruns_after_done() {
        let queue: Arc<WorkQueue<&'static str>> = Arc::new(WorkQueue::new());
        queue.add("a");
        let key = queue.get().await.unwrap();
        // re-added while in flight: must not run concurrently, must re-run after done()
        queue.add("a");
        queue.done(&key);

        let rerun = queue.get().await.unwrap();
        assert_eq!(rerun, "a");
    }
}
