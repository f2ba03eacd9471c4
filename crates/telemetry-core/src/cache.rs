//! Per-(patient, parameter) bounded ring buffer of recent decoded samples.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, RwLock};

use telemetry_protocol::ParamPayload;

use crate::{ParamType, PatientId};

/// Ring capacity chosen so a burst of arrivals during a slow dispatch still
/// allows exact-timestamp lookup for recent events.
pub const RING_CAPACITY: usize = 10;

/// One decoded, timestamped payload for one (patient, param). `collection_ts`
/// is the upstream device timestamp, not arrival time, and is compared for
/// exact equality on lookup — it is passed through verbatim, never computed.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub payload: ParamPayload,
    pub collection_ts: f64,
}

#[derive(Default)]
struct Ring {
    entries: VecDeque<Sample>,
    last_update: f64,
}

impl Ring {
    fn push(&mut self, sample: Sample) {
        if self.entries.len() == RING_CAPACITY {
            self.entries.pop_front();
        }
        self.last_update = sample.collection_ts;
        self.entries.push_back(sample);
    }

    fn get(&self, ts: Option<f64>) -> Option<Sample> {
        match ts {
            None => self.entries.back().cloned(),
            Some(ts) => self
                .entries
                .iter()
                .rev()
                .find(|s| s.collection_ts == ts)
                .or_else(|| self.entries.back())
                .cloned(),
        }
    }
}

type Key = (PatientId, ParamType);

/// Contract: `update` appends, evicting oldest at capacity; `get` returns
/// the exact-timestamp match scanning newest-first, falling back to the
/// newest sample when no match is found — this keeps the pipeline live
/// when the cache races ahead of a dispatch rather than returning nothing.
///
/// Each key owns its own lock; the outer map lock is only held long enough
/// to find or create that key's ring, never across a send.
#[derive(Default)]
pub struct SampleCache {
    rings: RwLock<HashMap<Key, Mutex<Ring>>>,
}

impl SampleCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, patient: PatientId, param: ParamType, payload: ParamPayload, ts: f64) {
        self.with_ring(patient, param, |ring| ring.push(Sample { payload, collection_ts: ts }));
    }

    pub fn get(&self, patient: PatientId, param: ParamType, ts: Option<f64>) -> Option<Sample> {
        let rings = self.rings.read().unwrap();
        rings.get(&(patient, param)).and_then(|r| r.lock().unwrap().get(ts))
    }

    /// Zero if (patient, param) has never been ingested.
    pub fn last_ts(&self, patient: PatientId, param: ParamType) -> f64 {
        let rings = self.rings.read().unwrap();
        rings
            .get(&(patient, param))
            .map(|r| r.lock().unwrap().last_update)
            .unwrap_or(0.0)
    }

    fn with_ring(&self, patient: PatientId, param: ParamType, f: impl FnOnce(&mut Ring)) {
        {
            let rings = self.rings.read().unwrap();
            if let Some(ring) = rings.get(&(patient, param)) {
                f(&mut ring.lock().unwrap());
                return;
            }
        }
        let mut rings = self.rings.write().unwrap();
        let ring = rings.entry((patient, param)).or_default();
        f(&mut ring.lock().unwrap());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> ParamPayload {
        ParamPayload::BreathCycle(serde_json::Map::new())
    }

    #[test]
    fn ring_never_exceeds_capacity() {
        let cache = SampleCache::new();
        for ts in 1..=15 {
            cache.update(1, ParamType::Ecg, payload(), ts as f64);
        }
        // get with no timestamp returns the newest
        assert_eq!(cache.get(1, ParamType::Ecg, None).unwrap().collection_ts, 15.0);
        // timestamp 3 has been evicted (only 6..=15 remain) -> falls back to newest
        assert_eq!(cache.get(1, ParamType::Ecg, Some(3.0)).unwrap().collection_ts, 15.0);
        // timestamp 10 is still present
        assert_eq!(cache.get(1, ParamType::Ecg, Some(10.0)).unwrap().collection_ts, 10.0);
    }

    #[test]
    fn get_on_unseen_key_returns_none() {
        let cache = SampleCache::new();
        assert!(cache.get(99, ParamType::PressureFlow, None).is_none());
        assert_eq!(cache.last_ts(99, ParamType::PressureFlow), 0.0);
    }

    #[test]
    fn round_trip_single_sample() {
        let cache = SampleCache::new();
        let pressure_flow = ParamPayload::PressureFlow {
            pressure: telemetry_protocol::Channel { unit: "cmH2O".into(), values: vec![1.0, 2.0] },
            flow: telemetry_protocol::Channel { unit: "L/min".into(), values: vec![3.0, 4.0] },
        };
        cache.update(42, ParamType::PressureFlow, pressure_flow.clone(), 1000.0);
        let got = cache.get(42, ParamType::PressureFlow, Some(1000.0)).unwrap();
        assert_eq!(got.payload, pressure_flow);
        assert_eq!(got.collection_ts, 1000.0);
        assert_eq!(cache.last_ts(42, ParamType::PressureFlow), 1000.0);
    }
}
