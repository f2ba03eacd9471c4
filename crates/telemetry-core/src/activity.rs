//! Liveness state machine for each (patient, param): active on ingest,
//! flipped to inactive by a periodic sweep once it goes quiet.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use tokio::time::Instant;
use tracing::info;

use crate::{ParamType, PatientId};

/// Default inactivity window; the sweeper's tick period matches it.
pub const INACTIVITY_THRESHOLD: Duration = Duration::from_secs(20);

#[derive(Debug, Clone, Copy)]
struct ActivityEntry {
    active: bool,
    last_update: Instant,
}

type Key = (PatientId, ParamType);

/// Entries are created on first ingest and never deleted — deletion would
/// lose "seen before" memory across short outages, and the map is bounded
/// by the number of distinct (patient, param) pairs ever seen, not by churn.
#[derive(Default)]
pub struct ActivityTracker {
    entries: RwLock<HashMap<Key, ActivityEntry>>,
}

impl ActivityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks (patient, param) active as of `now`. `last_update` is
    /// monotonically replaced; never decreases across calls for the same key.
    pub fn mark_active(&self, patient: PatientId, param: ParamType, now: Instant) {
        let mut entries = self.entries.write().unwrap();
        entries.insert((patient, param), ActivityEntry { active: true, last_update: now });
    }

    /// False both for entries explicitly marked inactive and for keys never
    /// seen at all.
    pub fn is_active(&self, patient: PatientId, param: ParamType) -> bool {
        self.entries
            .read()
            .unwrap()
            .get(&(patient, param))
            .map(|e| e.active)
            .unwrap_or(false)
    }

    pub fn last_update(&self, patient: PatientId, param: ParamType) -> Option<Instant> {
        self.entries.read().unwrap().get(&(patient, param)).map(|e| e.last_update)
    }

    /// Scans every entry, transitioning any whose last update is older than
    /// `threshold` to inactive, and logs the still-active roster grouped by
    /// patient.
    pub fn sweep(&self, now: Instant, threshold: Duration) -> HashMap<PatientId, Vec<ParamType>> {
        let mut entries = self.entries.write().unwrap();
        let mut roster: HashMap<PatientId, Vec<ParamType>> = HashMap::new();
        for (&(patient, param), entry) in entries.iter_mut() {
            if entry.active && now.saturating_duration_since(entry.last_update) > threshold {
                entry.active = false;
            }
            if entry.active {
                roster.entry(patient).or_default().push(param);
            }
        }
        info!(patients = roster.len(), "activity sweep complete");
        roster
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn last_update_is_monotonic_across_ingests() {
        let tracker = ActivityTracker::new();
        let t0 = Instant::now();
        tracker.mark_active(9, ParamType::BreathCycle, t0);
        tokio::time::advance(Duration::from_secs(5)).await;
        let t1 = Instant::now();
        tracker.mark_active(9, ParamType::BreathCycle, t1);
        assert!(tracker.last_update(9, ParamType::BreathCycle).unwrap() >= t1);
    }

    #[tokio::test(start_paused = true)]
    async fn reaper_flips_stale_entries_within_two_thresholds() {
        let tracker = ActivityTracker::new();
        let threshold = Duration::from_secs(20);
        tracker.mark_active(9, ParamType::BreathCycle, Instant::now());

        // at T=20 the entry is exactly at the threshold boundary, still active
        tokio::time::advance(Duration::from_secs(20)).await;
        tracker.sweep(Instant::now(), threshold);
        assert!(tracker.is_active(9, ParamType::BreathCycle));

        // by T=40 (one more threshold), the sweeper has flipped it
        tokio::time::advance(Duration::from_secs(20)).await;
        tracker.sweep(Instant::now(), threshold);
        assert!(!tracker.is_active(9, ParamType::BreathCycle));
    }

    #[test]
    fn unseen_key_is_inactive() {
        let tracker = ActivityTracker::new();
        assert!(!tracker.is_active(7, ParamType::Ecg));
    }

    #[tokio::test(start_paused = true)]
    async fn ingest_reactivates_an_inactive_entry() {
        let tracker = ActivityTracker::new();
        let threshold = Duration::from_secs(20);
        tracker.mark_active(1, ParamType::Ecg, Instant::now());
        tokio::time::advance(Duration::from_secs(41)).await;
        tracker.sweep(Instant::now(), threshold);
        assert!(!tracker.is_active(1, ParamType::Ecg));

        tracker.mark_active(1, ParamType::Ecg, Instant::now());
        assert!(tracker.is_active(1, ParamType::Ecg));
    }
}
