//! Three-level subscription index: patient → param → set of sessions.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use crate::{ParamType, PatientId};

pub type SessionId = u64;

/// Invariant: whenever an inner set becomes empty its param key is removed;
/// whenever a patient's map becomes empty the patient key is removed. This
/// keeps `has_any` O(1) and prevents unbounded growth from subscribe/
/// unsubscribe churn.
#[derive(Default)]
pub struct SubscriptionRegistry {
    inner: RwLock<HashMap<PatientId, HashMap<ParamType, HashSet<SessionId>>>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, patient: PatientId, params: &[ParamType], session: SessionId) {
        let mut inner = self.inner.write().unwrap();
        let patient_map = inner.entry(patient).or_default();
        for &param in params {
            patient_map.entry(param).or_default().insert(session);
        }
    }

    /// Removes `session` from the named params, or from every param of
    /// `patient` when `params` is empty. A no-op if `session` was never
    /// subscribed, or already removed.
    pub fn unsubscribe(&self, patient: PatientId, params: &[ParamType], session: SessionId) {
        let mut inner = self.inner.write().unwrap();
        let Some(patient_map) = inner.get_mut(&patient) else { return };

        let targets: Vec<ParamType> = if params.is_empty() {
            patient_map.keys().copied().collect()
        } else {
            params.to_vec()
        };

        for param in targets {
            if let Some(sessions) = patient_map.get_mut(&param) {
                sessions.remove(&session);
                if sessions.is_empty() {
                    patient_map.remove(&param);
                }
            }
        }

        if patient_map.is_empty() {
            inner.remove(&patient);
        }
    }

    /// Removes `session` from every (patient, param) it holds, across all
    /// patients. Used on session disconnect, where the session itself no
    /// longer needs to remember what it was subscribed to.
    pub fn unsubscribe_all(&self, session: SessionId) {
        let mut inner = self.inner.write().unwrap();
        inner.retain(|_, patient_map| {
            patient_map.retain(|_, sessions| {
                sessions.remove(&session);
                !sessions.is_empty()
            });
            !patient_map.is_empty()
        });
    }

    /// A snapshot copy, so the dispatcher can iterate without holding the
    /// registry lock across a send.
    pub fn subscribers(&self, patient: PatientId, param: ParamType) -> Vec<SessionId> {
        self.inner
            .read()
            .unwrap()
            .get(&patient)
            .and_then(|m| m.get(&param))
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn has_any(&self, patient: PatientId, param: ParamType) -> bool {
        self.inner
            .read()
            .unwrap()
            .get(&patient)
            .and_then(|m| m.get(&param))
            .map(|set| !set.is_empty())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_then_has_any() {
        let reg = SubscriptionRegistry::new();
        assert!(!reg.has_any(5, ParamType::Ecg));
        reg.subscribe(5, &[ParamType::Ecg], 1);
        assert!(reg.has_any(5, ParamType::Ecg));
        assert_eq!(reg.subscribers(5, ParamType::Ecg), vec![1]);
    }

    #[test]
    fn fan_out_to_three_sessions() {
        let reg = SubscriptionRegistry::new();
        reg.subscribe(5, &[ParamType::Ecg], 1);
        reg.subscribe(5, &[ParamType::Ecg], 2);
        reg.subscribe(5, &[ParamType::Ecg], 3);
        let mut subs = reg.subscribers(5, ParamType::Ecg);
        subs.sort_unstable();
        assert_eq!(subs, vec![1, 2, 3]);
    }

    #[test]
    fn unsubscribe_prunes_empty_keys() {
        let reg = SubscriptionRegistry::new();
        reg.subscribe(3, &[ParamType::PressureFlow, ParamType::Ecg], 7);
        reg.unsubscribe(3, &[], 7);
        assert!(!reg.has_any(3, ParamType::PressureFlow));
        assert!(!reg.has_any(3, ParamType::Ecg));
        assert!(reg.inner.read().unwrap().is_empty());
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let reg = SubscriptionRegistry::new();
        reg.subscribe(3, &[ParamType::Ecg], 7);
        reg.unsubscribe(3, &[ParamType::Ecg], 7);
        reg.unsubscribe(3, &[ParamType::Ecg], 7); // no-op, already gone
        reg.unsubscribe(4, &[ParamType::Ecg], 99); // no-op, never present
        assert!(!reg.has_any(3, ParamType::Ecg));
    }

    #[test]
    fn disconnect_cleans_up_across_all_patients() {
        let reg = SubscriptionRegistry::new();
        reg.subscribe(3, &[ParamType::PressureFlow, ParamType::Ecg], 7);
        reg.subscribe(9, &[ParamType::BreathCycle], 7);
        reg.subscribe(9, &[ParamType::BreathCycle], 8);

        reg.unsubscribe_all(7);

        assert!(!reg.has_any(3, ParamType::PressureFlow));
        assert!(!reg.has_any(3, ParamType::Ecg));
        assert!(reg.inner.read().unwrap().get(&3).is_none());
        // session 8's subscription at patient 9 survives
        assert_eq!(reg.subscribers(9, ParamType::BreathCycle), vec![8]);
    }
}
