//! DispatchEvent and the sharded bounded queues that carry it from the
//! decoder to the dispatch worker pool.

use std::collections::VecDeque;
use std::hash::{Hash, Hasher};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use crate::{ParamType, PatientId};

pub const DEFAULT_SHARD_COUNT: usize = 5;
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

/// A pointer into the Sample Cache, not a copy of the payload. Enqueued
/// only if at least one session was subscribed to (patient_id, param_type)
/// at enqueue time — an optimisation, not a correctness boundary, since the
/// subscriber set may still be empty by the time a worker delivers it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DispatchEvent {
    pub patient_id: PatientId,
    pub param_type: ParamType,
    pub collection_ts: f64,
}

/// Picks the worker shard for (patient, param) by hashing the key, so every
/// event for a given key lands on the same worker and per-key FIFO order is
/// preserved without a lock shared across workers.
pub fn shard_for(patient: PatientId, param: ParamType, shard_count: usize) -> usize {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    patient.hash(&mut hasher);
    param.hash(&mut hasher);
    (hasher.finish() as usize) % shard_count
}

struct ShardState {
    queue: VecDeque<DispatchEvent>,
    closed: bool,
}

/// Bounded FIFO of events for one dispatch-worker shard. On overflow, the
/// oldest queued event sharing the incoming event's (patient, param) is
/// dropped to make room; if none shares that key, the globally oldest event
/// is dropped instead. The queue never blocks a push — only the decoder's
/// own pace limits throughput.
pub struct ShardQueue {
    state: Mutex<ShardState>,
    not_empty: Condvar,
    capacity: usize,
}

impl ShardQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(ShardState { queue: VecDeque::new(), closed: false }),
            not_empty: Condvar::new(),
            capacity,
        }
    }

    pub fn push(&self, event: DispatchEvent) {
        let mut state = self.state.lock().unwrap();
        if state.queue.len() >= self.capacity {
            let same_key = state
                .queue
                .iter()
                .position(|e| e.patient_id == event.patient_id && e.param_type == event.param_type);
            match same_key {
                Some(idx) => {
                    state.queue.remove(idx);
                }
                None => {
                    state.queue.pop_front();
                }
            }
        }
        state.queue.push_back(event);
        self.not_empty.notify_one();
    }

    /// Blocks the calling (blocking) thread until an event is available or
    /// `timeout` elapses. Returns `None` on timeout, or once the queue has
    /// been closed and drained — the short timeout is what lets a dispatch
    /// worker notice shutdown within one poll.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<DispatchEvent> {
        let mut state = self.state.lock().unwrap();
        loop {
            if let Some(event) = state.queue.pop_front() {
                return Some(event);
            }
            if state.closed {
                return None;
            }
            let (guard, result) = self.not_empty.wait_timeout(state, timeout).unwrap();
            state = guard;
            if result.timed_out() && state.queue.is_empty() {
                return None;
            }
        }
    }

    pub fn close(&self) {
        let mut state = self.state.lock().unwrap();
        state.closed = true;
        self.not_empty.notify_all();
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True once [`ShardQueue::close`] has been called and the queue has
    /// been fully drained — the signal a dispatch worker uses to stop
    /// polling instead of treating every timeout as a shutdown.
    pub fn is_closed(&self) -> bool {
        let state = self.state.lock().unwrap();
        state.closed && state.queue.is_empty()
    }
}

/// One [`ShardQueue`] per dispatch worker.
pub struct DispatchQueues {
    shards: Vec<ShardQueue>,
}

impl DispatchQueues {
    pub fn new(shard_count: usize, capacity: usize) -> Self {
        Self { shards: (0..shard_count).map(|_| ShardQueue::new(capacity)).collect() }
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Routes `event` to its shard by hashing (patient_id, param_type).
    pub fn push(&self, event: DispatchEvent) {
        let idx = shard_for(event.patient_id, event.param_type, self.shards.len());
        self.shards[idx].push(event);
    }

    pub fn shard(&self, idx: usize) -> &ShardQueue {
        &self.shards[idx]
    }

    pub fn close_all(&self) {
        for shard in &self.shards {
            shard.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(patient: PatientId, ts: f64) -> DispatchEvent {
        DispatchEvent { patient_id: patient, param_type: ParamType::Ecg, collection_ts: ts }
    }

    #[test]
    fn same_key_always_routes_to_the_same_shard() {
        for _ in 0..50 {
            assert_eq!(
                shard_for(5, ParamType::Ecg, 5),
                shard_for(5, ParamType::Ecg, 5)
            );
        }
    }

    #[test]
    fn fifo_order_preserved_within_a_shard() {
        let queue = ShardQueue::new(10);
        for i in 0..5 {
            queue.push(event(1, i as f64));
        }
        for i in 0..5 {
            assert_eq!(queue.pop_timeout(Duration::from_millis(10)).unwrap().collection_ts, i as f64);
        }
    }

    #[test]
    fn overflow_drops_oldest_same_key_event_not_the_new_one() {
        let queue = ShardQueue::new(2);
        queue.push(event(1, 1.0));
        queue.push(event(1, 2.0));
        // queue full; pushing a third same-key event should evict ts=1.0
        queue.push(event(1, 3.0));
        assert_eq!(queue.len(), 2);
        let first = queue.pop_timeout(Duration::from_millis(10)).unwrap();
        let second = queue.pop_timeout(Duration::from_millis(10)).unwrap();
        assert_eq!(first.collection_ts, 2.0);
        assert_eq!(second.collection_ts, 3.0);
    }

    #[test]
    fn pop_timeout_returns_none_when_empty() {
        let queue = ShardQueue::new(4);
        assert!(queue.pop_timeout(Duration::from_millis(5)).is_none());
    }

    #[test]
    fn close_unblocks_a_waiting_pop() {
        let queue = std::sync::Arc::new(ShardQueue::new(4));
        let q2 = queue.clone();
        let handle = std::thread::spawn(move || q2.pop_timeout(Duration::from_secs(5)));
        std::thread::sleep(Duration::from_millis(20));
        queue.close();
        assert!(handle.join().unwrap().is_none());
    }
}
