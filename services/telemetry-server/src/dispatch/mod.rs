//! Dispatch Pool (spec.md §4.5): drains the sharded event queues and pushes
//! one `get_parameters` frame per DispatchEvent to every currently
//! subscribed session. Grounded on `SendDataManager.worker` in
//! `original_source/backend/app/core/send_data.py` — a fixed-size worker
//! pool, each pulling from a timeout-bounded queue, looking the sample up
//! in the cache by its event timestamp, and fanning out to subscribers.
//!
//! Workers are dedicated OS threads, not tokio tasks: [`ShardQueue::
//! pop_timeout`] is a genuine blocking wait (a condvar, not an async
//! channel), matching the same "blocking work gets its own thread" rule
//! the CDC decoder follows. Delivery into a session's outbox is a
//! non-blocking `try_send`, so no tokio runtime handle is needed here.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use axum::extract::ws::Message;
use tracing::warn;

use telemetry_core::cache::SampleCache;
use telemetry_core::event::DispatchQueues;
use telemetry_core::registry::SubscriptionRegistry;
use telemetry_protocol::{FrameTimestamp, FrameType, OutboundFrame};

use crate::session::registry::SessionTable;

/// How long a worker blocks on its shard queue before checking for
/// shutdown — spec.md §4.5/§5's "short poll timeout" for shutdown
/// responsiveness.
const POLL_TIMEOUT: Duration = Duration::from_millis(250);

/// Transport-safe JSON for a cached sample. The decoder already collapsed
/// bytes-or-text into valid UTF-8/JSON (`cdc::normalize::coerce_json`), so
/// this is a straight `serde_json::to_value` rather than a byte-walking
/// pass — spec.md §4.5 point 3's sanitisation has already happened by the
/// time a [`telemetry_core::cache::Sample`] exists.
fn sanitize_payload(sample: &telemetry_core::cache::Sample) -> serde_json::Value {
    serde_json::to_value(&sample.payload).unwrap_or(serde_json::Value::Null)
}

fn build_frame(param_type: telemetry_protocol::ParamType, sample: &telemetry_core::cache::Sample) -> OutboundFrame {
    let mut frame = OutboundFrame::success(
        FrameType::GetParameters,
        "Data fetched successfully",
        sanitize_payload(sample),
        FrameTimestamp::Seconds(sample.collection_ts),
    );
    frame.param_type = Some(vec![param_type]);
    frame
}

fn run_worker(
    shard_idx: usize,
    queues: Arc<DispatchQueues>,
    cache: Arc<SampleCache>,
    registry: Arc<SubscriptionRegistry>,
    sessions: Arc<SessionTable>,
) {
    let shard = queues.shard(shard_idx);
    loop {
        let Some(event) = shard.pop_timeout(POLL_TIMEOUT) else {
            if shard.is_closed() {
                return;
            }
            continue;
        };

        let Some(sample) = cache.get(event.patient_id, event.param_type, Some(event.collection_ts)) else {
            // a later event will cover the loss — spec.md §4.5 point 2.
            continue;
        };

        // De-duplication gate is an optimisation, not a correctness
        // boundary (spec.md §4.5): re-check subscribers at delivery time.
        let subscribers = registry.subscribers(event.patient_id, event.param_type);
        if subscribers.is_empty() {
            continue;
        }

        let frame = build_frame(event.param_type, &sample);
        let text = match serde_json::to_string(&frame) {
            Ok(t) => t,
            Err(e) => {
                warn!(error = %e, "failed to encode dispatch frame");
                continue;
            }
        };

        for session_id in subscribers {
            sessions.try_deliver(session_id, Message::Text(text.clone().into()));
        }
    }
}

pub struct DispatchPool {
    handles: Vec<JoinHandle<()>>,
    queues: Arc<DispatchQueues>,
}

impl DispatchPool {
    pub fn spawn(
        queues: Arc<DispatchQueues>,
        cache: Arc<SampleCache>,
        registry: Arc<SubscriptionRegistry>,
        sessions: Arc<SessionTable>,
    ) -> Self {
        let handles = (0..queues.shard_count())
            .map(|idx| {
                let queues = queues.clone();
                let cache = cache.clone();
                let registry = registry.clone();
                let sessions = sessions.clone();
                thread::Builder::new()
                    .name(format!("dispatch-worker-{idx}"))
                    .spawn(move || run_worker(idx, queues, cache, registry, sessions))
                    .expect("failed to spawn dispatch worker thread")
            })
            .collect();
        Self { handles, queues }
    }

    /// Closes every shard queue and joins the worker threads. Call during
    /// graceful shutdown; a worker notices a closed, drained queue within
    /// one [`POLL_TIMEOUT`] tick.
    pub fn shutdown(self) {
        self.queues.close_all();
        for handle in self.handles {
            let _ = handle.join();
        }
    }
}
