//! Coordination ledger kept in `status.componentsStatus`.
//!
//! An entry `(operation, Running, pool)` marks work in flight on a node pool.
//! Cluster reconciles are serialized per key, so the ledger needs no lock.

use crds::ComponentStatus;

/// Rolling image upgrade of a node pool
pub const UPGRADE: &str = "Upgrade";

/// Replica reduction of a data pool
pub const SCALER: &str = "Scaler";

/// Status of an in-flight entry
pub const RUNNING: &str = "Running";

/// Record `operation` on `pool`. Returns false when it was already recorded.
pub fn begin(ledger: &mut Vec<ComponentStatus>, operation: &str, pool: &str) -> bool {
    if is_running(ledger, operation, pool) {
        return false;
    }
    ledger.push(ComponentStatus::new(operation, RUNNING, pool));
    true
}

/// Drop the entry for `operation` on `pool`. Returns true when one was removed.
pub fn finish(ledger: &mut Vec<ComponentStatus>, operation: &str, pool: &str) -> bool {
    let before = ledger.len();
    ledger.retain(|e| !(e.component == operation && e.description == pool));
    ledger.len() != before
}

/// Pool currently running `operation`, if any.
pub fn in_flight<'a>(ledger: &'a [ComponentStatus], operation: &str) -> Option<&'a str> {
    ledger
        .iter()
        .find(|e| e.component == operation && e.status == RUNNING)
        .map(|e| e.description.as_str())
}

/// True when `operation` is recorded on `pool`.
pub fn is_running(ledger: &[ComponentStatus], operation: &str, pool: &str) -> bool {
    ledger
        .iter()
        .any(|e| e.component == operation && e.description == pool && e.status == RUNNING)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_is_idempotent() {
        let mut ledger = Vec::new();
        assert!(begin(&mut ledger, SCALER, "data"));
        assert!(!begin(&mut ledger, SCALER, "data"));
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0], ComponentStatus::new("Scaler", "Running", "data"));
    }

    #[test]
    fn test_operations_are_tracked_separately() {
        let mut ledger = Vec::new();
        begin(&mut ledger, UPGRADE, "masters");
        begin(&mut ledger, SCALER, "data");
        assert_eq!(in_flight(&ledger, UPGRADE), Some("masters"));
        assert_eq!(in_flight(&ledger, SCALER), Some("data"));

        assert!(finish(&mut ledger, UPGRADE, "masters"));
        assert!(!finish(&mut ledger, UPGRADE, "masters"));
        assert_eq!(in_flight(&ledger, UPGRADE), None);
        assert!(is_running(&ledger, SCALER, "data"));
    }
}
