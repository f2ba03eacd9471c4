//! The decoder thread: pulls rows off a [`ReplicationSource`], normalises
//! them, and feeds the cache, activity tracker and dispatch queues.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{error, warn};

use telemetry_core::activity::ActivityTracker;
use telemetry_core::cache::SampleCache;
use telemetry_core::event::{DispatchEvent, DispatchQueues};
use telemetry_core::registry::SubscriptionRegistry;

use super::normalize::{self, DecodeError};
use super::source::{ReplicationError, ReplicationSource};
use super::ReplicationRow;

/// Transient-failure retry budget before the decoder thread gives up and
/// exits — the rest of the server keeps running on stale cache data.
const MAX_RESTART_ATTEMPTS: u32 = 3;

pub struct Pipeline {
    pub cache: Arc<SampleCache>,
    pub activity: Arc<ActivityTracker>,
    pub registry: Arc<SubscriptionRegistry>,
    pub queues: Arc<DispatchQueues>,
}

fn process_row(row: &ReplicationRow, pipeline: &Pipeline) -> Result<(), DecodeError> {
    let (patient_id, collection_ts) = normalize::extract_identity(row)?;
    let (param_type, payload) = normalize::normalize(row)?;

    pipeline.cache.update(patient_id, param_type, payload, collection_ts);
    pipeline.activity.mark_active(patient_id, param_type, Instant::now());

    if pipeline.registry.has_any(patient_id, param_type) {
        pipeline.queues.push(DispatchEvent { patient_id, param_type, collection_ts });
    }

    Ok(())
}

/// Spawns the dedicated decoder thread. The thread never touches the
/// cooperative scheduler: it blocks on `source.next_row()` for as long as
/// the upstream stream allows.
pub fn spawn(mut source: impl ReplicationSource + 'static, pipeline: Pipeline) -> JoinHandle<()> {
    thread::Builder::new()
        .name("cdc-decoder".into())
        .spawn(move || {
            let mut restart_attempts: u32 = 0;
            loop {
                match source.next_row() {
                    Ok(row) => {
                        restart_attempts = 0;
                        if let Err(err) = process_row(&row, &pipeline) {
                            warn!(table = %row.table, error = %err, "dropping row");
                        }
                    }
                    Err(err @ (ReplicationError::StreamEnded | ReplicationError::Connection(_))) => {
                        restart_attempts += 1;
                        if restart_attempts > MAX_RESTART_ATTEMPTS {
                            error!("replication stream exhausted its restart budget, decoder thread exiting");
                            break;
                        }
                        warn!(attempt = restart_attempts, error = %err, "replication stream ended, restarting");
                        thread::sleep(Duration::from_secs(restart_attempts as u64));
                        if let Err(err) = source.restart() {
                            error!(error = %err, "failed to restart replication source");
                        }
                    }
                }
            }
        })
        .expect("failed to spawn cdc-decoder thread")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cdc::source::ChannelReplicationSource;
    use std::collections::HashMap;
    use std::time::Duration as StdDuration;
    use telemetry_core::PatientId;
    use telemetry_protocol::ParamType;

    fn pressure_flow_row(patient_id: i64, ts: f64) -> ReplicationRow {
        let params = serde_json::json!({
            "pressure": {"unit": "cmH2O", "values": [1.0, 2.0]},
            "flow": {"unit": "L/min", "values": [3.0, 4.0]},
        });
        ReplicationRow {
            table: "pressure_flow_params".into(),
            values: HashMap::from([
                ("patient_id".to_string(), super::super::RawValue::Int(patient_id)),
                ("collection_time".to_string(), super::super::RawValue::Timestamp(ts)),
                ("parameters".to_string(), super::super::RawValue::Json(params)),
            ]),
        }
    }

    #[test]
    fn ingest_updates_cache_and_activity_and_gates_dispatch_on_subscription() {
        let cache = Arc::new(SampleCache::new());
        let activity = Arc::new(ActivityTracker::new());
        let registry = Arc::new(SubscriptionRegistry::new());
        let queues = Arc::new(DispatchQueues::new(1, 10));
        let pipeline = Pipeline {
            cache: cache.clone(),
            activity: activity.clone(),
            registry: registry.clone(),
            queues: queues.clone(),
        };

        let patient: PatientId = 42;
        process_row(&pressure_flow_row(patient, 1000.0), &pipeline).unwrap();

        assert!(cache.get(patient, ParamType::PressureFlow, Some(1000.0)).is_some());
        assert!(activity.is_active(patient, ParamType::PressureFlow));
        // no subscriber yet -> nothing enqueued
        assert_eq!(queues.shard(0).len(), 0);

        registry.subscribe(patient, &[ParamType::PressureFlow], 1);
        process_row(&pressure_flow_row(patient, 1001.0), &pipeline).unwrap();
        assert_eq!(queues.shard(0).len(), 1);
    }

    #[test]
    fn decode_error_on_one_row_does_not_stop_the_thread() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let bad_row = ReplicationRow { table: "pressure_flow_params".into(), values: HashMap::new() };
        tx.send(bad_row).unwrap();
        tx.send(pressure_flow_row(1, 1.0)).unwrap();
        drop(tx);

        let cache = Arc::new(SampleCache::new());
        let pipeline = Pipeline {
            cache: cache.clone(),
            activity: Arc::new(ActivityTracker::new()),
            registry: Arc::new(SubscriptionRegistry::new()),
            queues: Arc::new(DispatchQueues::new(1, 10)),
        };
        let handle = spawn(ChannelReplicationSource::new(rx), pipeline);
        handle.join().unwrap();

        assert!(cache.get(1, ParamType::PressureFlow, Some(1.0)).is_some());
    }

    #[test]
    fn stream_end_with_no_reconnect_progress_exits_after_retry_budget() {
        let (tx, rx) = crossbeam_channel::unbounded::<ReplicationRow>();
        drop(tx);
        let pipeline = Pipeline {
            cache: Arc::new(SampleCache::new()),
            activity: Arc::new(ActivityTracker::new()),
            registry: Arc::new(SubscriptionRegistry::new()),
            queues: Arc::new(DispatchQueues::new(1, 10)),
        };
        let handle = spawn(ChannelReplicationSource::new(rx), pipeline);
        // bounded linear backoff means this finishes well within a few seconds
        handle.join().unwrap();
        std::thread::sleep(StdDuration::from_millis(1));
    }
}
