//! `Ready` / `Reconciling` condition bookkeeping on the cluster status.
//!
//! `lastTransitionTime` only moves when the condition status flips, so
//! repeated passes with the same outcome leave the status untouched.

use chrono::Utc;
use crds::{Condition, OpenSearchClusterStatus};

/// Condition type reporting cluster readiness
pub const READY: &str = "Ready";

/// Condition type reporting that work is in progress
pub const RECONCILING: &str = "Reconciling";

/// Insert or update a condition in `conditions`.
///
/// Returns true when anything changed.
pub fn set_condition(
    conditions: &mut Vec<Condition>,
    type_: &str,
    status: bool,
    reason: &str,
    message: &str,
    generation: Option<i64>,
) -> bool {
    let status = if status { "True" } else { "False" };

    if let Some(existing) = conditions.iter_mut().find(|c| c.type_ == type_) {
        let changed = existing.status != status
            || existing.reason != reason
            || existing.message != message
            || existing.observed_generation != generation;
        if existing.status != status {
            existing.last_transition_time = Utc::now();
        }
        existing.status = status.to_string();
        existing.reason = reason.to_string();
        existing.message = message.to_string();
        existing.observed_generation = generation;
        return changed;
    }

    conditions.push(Condition {
        type_: type_.to_string(),
        status: status.to_string(),
        reason: reason.to_string(),
        message: message.to_string(),
        last_transition_time: Utc::now(),
        observed_generation: generation,
    });
    true
}

/// Find a condition by type.
pub fn find<'a>(conditions: &'a [Condition], type_: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}

/// True when the condition exists with status `True`.
pub fn is_true(conditions: &[Condition], type_: &str) -> bool {
    find(conditions, type_).is_some_and(|c| c.status == "True")
}

/// Set `Ready` and stamp `observedGeneration`.
pub fn set_ready(
    status: &mut OpenSearchClusterStatus,
    ready: bool,
    reason: &str,
    message: &str,
    generation: Option<i64>,
) -> bool {
    let changed = set_condition(&mut status.conditions, READY, ready, reason, message, generation);
    let generation_changed = status.observed_generation != generation;
    status.observed_generation = generation;
    changed || generation_changed
}

/// Set `Reconciling`.
pub fn set_reconciling(
    status: &mut OpenSearchClusterStatus,
    reconciling: bool,
    reason: &str,
    message: &str,
    generation: Option<i64>,
) -> bool {
    set_condition(&mut status.conditions, RECONCILING, reconciling, reason, message, generation)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_time_only_moves_on_flip() {
        let mut status = OpenSearchClusterStatus::default();
        assert!(set_ready(&mut status, false, "Pending", "waiting for nodes", Some(1)));
        let first = find(&status.conditions, READY).map(|c| c.last_transition_time);

        // Same status, new message: changed, but transition time kept
        assert!(set_ready(&mut status, false, "Pending", "1/3 nodes ready", Some(1)));
        let second = find(&status.conditions, READY).map(|c| c.last_transition_time);
        assert_eq!(first, second);

        // Identical call is a no-op
        assert!(!set_ready(&mut status, false, "Pending", "1/3 nodes ready", Some(1)));

        assert!(set_ready(&mut status, true, "Running", "cluster is green", Some(2)));
        assert!(is_true(&status.conditions, READY));
        assert_eq!(status.observed_generation, Some(2));
        assert_eq!(status.conditions.len(), 1);
    }

    #[test]
    fn test_ready_and_reconciling_are_independent() {
        let mut status = OpenSearchClusterStatus::default();
        set_ready(&mut status, false, "Upgrading", "upgrading data", Some(3));
        set_reconciling(&mut status, true, "Upgrading", "upgrading data", Some(3));
        assert_eq!(status.conditions.len(), 2);
        assert!(is_true(&status.conditions, RECONCILING));
        assert!(!is_true(&status.conditions, READY));

        set_reconciling(&mut status, false, "Idle", "", Some(3));
        assert!(!is_true(&status.conditions, RECONCILING));
    }
}
